use async_trait::async_trait;
use aws_sdk_sesv2::Client as SesClient;
use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message};

use crate::error::BoxError;
use crate::notify::{Notifier, NotifyIntent, NotifyKind};

pub async fn send_text_email(
    ses: &SesClient,
    from: &str,
    to: &str,
    subject: &str,
    body_text: &str,
) -> Result<(), BoxError> {
    let subject = Content::builder().data(subject).build()?;

    let body = Body::builder()
        .text(Content::builder().data(body_text).build()?)
        .build();

    let message = Message::builder().subject(subject).body(body).build();

    ses.send_email()
        .from_email_address(from)
        .destination(Destination::builder().to_addresses(to).build())
        .content(EmailContent::builder().simple(message).build())
        .send()
        .await?;

    Ok(())
}

fn extra_str<'a>(intent: &'a NotifyIntent, key: &str) -> Option<&'a str> {
    intent.extra.as_ref().and_then(|e| e[key].as_str())
}

/// Subject and plain-text body for a notification
pub fn render(intent: &NotifyIntent) -> (String, String) {
    let event = &intent.event_id;
    match intent.kind {
        NotifyKind::Approved => {
            let amount = extra_str(intent, "amount").unwrap_or("the participation fee");
            let due = extra_str(intent, "dueDate")
                .map(|d| format!(" before {d}"))
                .unwrap_or_default();
            (
                "Bazaar application approved".to_string(),
                format!(
                    "Your application for event {event} has been approved.\n\
                     Please pay {amount}{due} to confirm your booth."
                ),
            )
        }
        NotifyKind::Rejected => {
            let reason = extra_str(intent, "reason")
                .map(|r| format!("\nReason: {r}"))
                .unwrap_or_default();
            (
                "Bazaar application rejected".to_string(),
                format!("Your application for event {event} was not accepted.{reason}"),
            )
        }
        NotifyKind::Paid => {
            let receipt = extra_str(intent, "receiptNumber").unwrap_or("-");
            (
                "Payment received".to_string(),
                format!(
                    "We received your participation fee for event {event}.\n\
                     Receipt number: {receipt}\n\
                     Visitor QR codes for your attendees are now available."
                ),
            )
        }
        NotifyKind::PaymentFailed => {
            let reason = extra_str(intent, "message").unwrap_or("The payment could not be completed.");
            (
                "Payment failed".to_string(),
                format!(
                    "Your payment for event {event} did not go through.\n{reason}\n\
                     You can retry from your applications page."
                ),
            )
        }
        NotifyKind::PaymentOverdue => (
            "Payment overdue".to_string(),
            format!("The participation fee for event {event} is past its due date."),
        ),
    }
}

pub struct SesNotifier {
    ses: SesClient,
    from: String,
}

impl SesNotifier {
    pub fn new(ses: SesClient, from: impl Into<String>) -> Self {
        Self {
            ses,
            from: from.into(),
        }
    }
}

#[async_trait]
impl Notifier for SesNotifier {
    async fn deliver(&self, intent: &NotifyIntent) -> Result<(), BoxError> {
        let (subject, body) = render(intent);
        send_text_email(&self.ses, &self.from, &intent.vendor_email, &subject, &body).await?;
        tracing::info!(
            to = %intent.vendor_email,
            kind = intent.kind.as_str(),
            "Notification email sent"
        );
        Ok(())
    }
}

/// Logs instead of sending (no SES sender configured)
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, intent: &NotifyIntent) -> Result<(), BoxError> {
        let (subject, _) = render(intent);
        tracing::info!(
            to = %intent.vendor_email,
            kind = intent.kind.as_str(),
            subject = %subject,
            "Notification (not sent, no sender configured)"
        );
        Ok(())
    }
}
