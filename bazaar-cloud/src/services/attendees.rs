//! Attendee identity records and their ID documents
//!
//! An update replaces the whole attendee list. Every entry is validated before
//! anything is uploaded or written, new documents are uploaded next, and the
//! list is persisted with one conditional write.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use shared::error::ErrorCode;
use shared::models::{Attendee, BazaarApplication, MAX_ATTENDEES, MIN_ATTENDEES};

use crate::auth::Principal;
use crate::db::ApplicationStore;
use crate::error::{ServiceError, ServiceResult};
use crate::storage::{DocumentStore, document_key};

/// Maximum ID document size (10 MiB)
pub const MAX_DOCUMENT_SIZE: usize = 10 * 1024 * 1024;

/// Accepted ID document formats
pub const SUPPORTED_FORMATS: &[&str] = &["pdf", "png", "jpg", "jpeg", "webp"];

/// Attendee metadata sent by the client
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendeeInput {
    pub name: String,
    pub email: String,
    /// Echo of an already stored document reference
    #[serde(default)]
    pub id_document_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct AttendeeSubmission {
    pub attendee: AttendeeInput,
    pub file: Option<UploadedDocument>,
}

impl AttendeeSubmission {
    pub fn new(name: &str, email: &str) -> Self {
        Self {
            attendee: AttendeeInput {
                name: name.to_string(),
                email: email.to_string(),
                id_document_path: None,
            },
            file: None,
        }
    }

    pub fn with_existing(mut self, path: &str) -> Self {
        self.attendee.id_document_path = Some(path.to_string());
        self
    }

    pub fn with_file(mut self, filename: &str, data: Vec<u8>) -> Self {
        self.file = Some(UploadedDocument {
            filename: Some(filename.to_string()),
            content_type: None,
            data,
        });
        self
    }
}

/// Where an attendee's document comes from after validation
#[derive(Debug, Clone, PartialEq)]
enum DocumentSource {
    Existing(String),
    Upload { ext: String },
}

#[derive(Debug)]
struct PlannedAttendee {
    name: String,
    email: String,
    source: DocumentSource,
}

pub fn check_count(count: usize) -> ServiceResult<()> {
    if !(MIN_ATTENDEES..=MAX_ATTENDEES).contains(&count) {
        return Err(ServiceError::validation_code(
            ErrorCode::AttendeeCountOutOfRange,
            format!("Between {MIN_ATTENDEES} and {MAX_ATTENDEES} attendees are required, got {count}"),
        ));
    }
    Ok(())
}

/// Name/email shape and email uniqueness (QR codes are keyed by email)
pub fn check_identities<'a>(
    entries: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> ServiceResult<()> {
    let mut seen: Vec<String> = Vec::new();
    for (index, (name, email)) in entries.into_iter().enumerate() {
        let number = index + 1;
        if name.trim().is_empty() {
            return Err(ServiceError::attendee(
                ErrorCode::RequiredField,
                index,
                format!("Attendee {number} is missing a name"),
            ));
        }
        let email = email.trim().to_ascii_lowercase();
        let well_formed = email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
        if !well_formed {
            return Err(ServiceError::attendee(
                ErrorCode::InvalidFormat,
                index,
                format!("Attendee {number} has an invalid email address"),
            ));
        }
        if seen.contains(&email) {
            return Err(ServiceError::attendee(
                ErrorCode::ValidationFailed,
                index,
                format!("Attendee {number} repeats the email {email}"),
            ));
        }
        seen.push(email);
    }
    Ok(())
}

/// Lowercased extension of an acceptable document
fn document_extension(index: usize, doc: &UploadedDocument) -> ServiceResult<String> {
    let number = index + 1;
    if doc.data.is_empty() {
        return Err(ServiceError::attendee(
            ErrorCode::AttendeeDocumentMissing,
            index,
            format!("The ID document for attendee {number} is empty"),
        ));
    }
    if doc.data.len() > MAX_DOCUMENT_SIZE {
        return Err(ServiceError::attendee(
            ErrorCode::DocumentTooLarge,
            index,
            format!(
                "The ID document for attendee {number} is too large: {} bytes (max {MAX_DOCUMENT_SIZE})",
                doc.data.len()
            ),
        ));
    }

    let from_name = doc
        .filename
        .as_deref()
        .and_then(|f| std::path::Path::new(f).extension())
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    let from_mime = || {
        doc.content_type.as_deref().and_then(|ct| {
            mime_guess::get_mime_extensions_str(ct)?
                .iter()
                .find(|e| SUPPORTED_FORMATS.contains(e))
                .map(|e| e.to_string())
        })
    };

    match from_name.or_else(from_mime) {
        Some(ext) if SUPPORTED_FORMATS.contains(&ext.as_str()) => Ok(ext),
        other => Err(ServiceError::attendee(
            ErrorCode::UnsupportedDocumentFormat,
            index,
            format!(
                "The ID document for attendee {number} has an unsupported format{}. Supported: pdf, png, jpg, jpeg, webp",
                other.map(|e| format!(" ({e})")).unwrap_or_default()
            ),
        )),
    }
}

/// Validate submissions against the stored list, without side effects
fn plan(existing: &[Attendee], submissions: &[AttendeeSubmission]) -> ServiceResult<Vec<PlannedAttendee>> {
    check_count(submissions.len())?;
    check_identities(
        submissions
            .iter()
            .map(|s| (s.attendee.name.as_str(), s.attendee.email.as_str())),
    )?;

    submissions
        .iter()
        .enumerate()
        .map(|(index, sub)| {
            let source = match &sub.file {
                Some(doc) => DocumentSource::Upload {
                    ext: document_extension(index, doc)?,
                },
                None => match existing_document(existing, &sub.attendee) {
                    Some(path) => DocumentSource::Existing(path),
                    None => {
                        return Err(ServiceError::attendee(
                            ErrorCode::AttendeeDocumentMissing,
                            index,
                            format!(
                                "Attendee {} ({}) has no ID document; please upload one",
                                index + 1,
                                sub.attendee.name.trim()
                            ),
                        ));
                    }
                },
            };
            Ok(PlannedAttendee {
                name: sub.attendee.name.trim().to_string(),
                email: sub.attendee.email.trim().to_string(),
                source,
            })
        })
        .collect()
}

/// Stored document this entry may keep: an echoed path must belong to the
/// application; otherwise the stored attendee with the same email supplies it
fn existing_document(existing: &[Attendee], input: &AttendeeInput) -> Option<String> {
    let stored_paths = || existing.iter().filter_map(|a| a.id_document_path.as_deref());
    if let Some(path) = input.id_document_path.as_deref().filter(|p| !p.trim().is_empty()) {
        return stored_paths().find(|p| *p == path).map(String::from);
    }
    existing
        .iter()
        .find(|a| a.has_document() && a.email.trim().eq_ignore_ascii_case(input.email.trim()))
        .and_then(|a| a.id_document_path.clone())
}

pub struct AttendeeDocumentManager {
    store: Arc<dyn ApplicationStore>,
    documents: Arc<dyn DocumentStore>,
}

impl AttendeeDocumentManager {
    pub fn new(store: Arc<dyn ApplicationStore>, documents: Arc<dyn DocumentStore>) -> Self {
        Self { store, documents }
    }

    /// Replace the caller's attendee list for `event_id`
    pub async fn update(
        &self,
        principal: &Principal,
        event_id: &str,
        mut submissions: Vec<AttendeeSubmission>,
    ) -> ServiceResult<Vec<Attendee>> {
        principal.require_vendor()?;

        let app = self
            .store
            .find_by_vendor_event(&principal.user_id, event_id)
            .await?
            .ok_or_else(ServiceError::application_not_found)?;
        ensure_accepts_updates(&app)?;

        let planned = plan(&app.attendees, &submissions)?;

        let mut attendees = Vec::with_capacity(planned.len());
        for (index, entry) in planned.into_iter().enumerate() {
            let path = match entry.source {
                DocumentSource::Existing(path) => path,
                DocumentSource::Upload { ext } => {
                    let data = submissions[index]
                        .file
                        .take()
                        .map(|f| f.data)
                        .unwrap_or_default();
                    self.upload(&app, index, &ext, data).await?
                }
            };
            attendees.push(Attendee {
                name: entry.name,
                email: entry.email,
                id_document_path: Some(path),
            });
        }

        match self
            .store
            .replace_attendees(&app.id, &attendees, Utc::now())
            .await?
        {
            Some(updated) => {
                tracing::info!(
                    application_id = %updated.id,
                    event_id = %event_id,
                    attendees = updated.attendees.len(),
                    "Attendee list updated"
                );
                Ok(updated.attendees)
            }
            None => {
                // Cancelled, rejected or paid since the read above
                match self.store.find_by_id(&app.id).await? {
                    None => Err(ServiceError::application_not_found()),
                    Some(current) => {
                        ensure_accepts_updates(&current)?;
                        Err(ServiceError::Conflict(
                            "Application changed while updating attendees; please retry".into(),
                        ))
                    }
                }
            }
        }
    }

    async fn upload(
        &self,
        app: &BazaarApplication,
        index: usize,
        ext: &str,
        data: Vec<u8>,
    ) -> ServiceResult<String> {
        let key = document_key(&app.vendor_id, &app.event_id, &data, ext);
        let content_type = mime_guess::from_ext(ext).first_or_octet_stream();
        self.documents
            .put(&key, data, content_type.essence_str())
            .await
            .map_err(|e| {
                tracing::error!(
                    application_id = %app.id,
                    attendee_index = index,
                    error = %e,
                    "ID document upload failed"
                );
                ServiceError::attendee(
                    ErrorCode::DocumentStorageFailed,
                    index,
                    format!(
                        "The ID document for attendee {} could not be stored; please retry",
                        index + 1
                    ),
                )
            })?;
        Ok(key)
    }
}

fn ensure_accepts_updates(app: &BazaarApplication) -> ServiceResult<()> {
    if app.accepts_attendee_updates() {
        return Ok(());
    }
    if app.is_paid() {
        Err(ServiceError::invalid_state(
            "Attendees cannot be changed after the participation fee is paid",
        ))
    } else {
        Err(ServiceError::invalid_state(
            "Attendees cannot be changed on a rejected application",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(name: &str, email: &str, path: Option<&str>) -> Attendee {
        Attendee {
            name: name.into(),
            email: email.into(),
            id_document_path: path.map(String::from),
        }
    }

    fn index_of(err: &ServiceError) -> Option<usize> {
        match err {
            ServiceError::Validation { attendee_index, .. } => *attendee_index,
            _ => None,
        }
    }

    #[test]
    fn test_missing_file_names_attendee_index() {
        let existing = vec![
            stored("A", "a@example.com", Some("documents/v/e/a.pdf")),
            stored("B", "b@example.com", Some("documents/v/e/b.pdf")),
        ];
        let subs = vec![
            AttendeeSubmission::new("A", "a@example.com").with_existing("documents/v/e/a.pdf"),
            AttendeeSubmission::new("B", "b@example.com").with_existing("documents/v/e/b.pdf"),
            AttendeeSubmission::new("C", "c@example.com"),
        ];
        let err = plan(&existing, &subs).unwrap_err();
        assert_eq!(index_of(&err), Some(2));
        assert!(matches!(
            err,
            ServiceError::Validation { code: ErrorCode::AttendeeDocumentMissing, .. }
        ));
    }

    #[test]
    fn test_count_bounds() {
        assert!(plan(&[], &[]).is_err());
        let six: Vec<_> = (0..6)
            .map(|i| AttendeeSubmission::new("X", &format!("x{i}@example.com")).with_file("id.pdf", vec![1]))
            .collect();
        let err = plan(&[], &six).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Validation { code: ErrorCode::AttendeeCountOutOfRange, .. }
        ));
    }

    #[test]
    fn test_new_file_replaces_existing_reference() {
        let existing = vec![stored("A", "a@example.com", Some("documents/v/e/old.pdf"))];
        let subs = vec![AttendeeSubmission::new("A", "a@example.com")
            .with_existing("documents/v/e/old.pdf")
            .with_file("new.png", vec![1, 2, 3])];
        let planned = plan(&existing, &subs).unwrap();
        assert_eq!(planned[0].source, DocumentSource::Upload { ext: "png".into() });
    }

    #[test]
    fn test_existing_document_matched_by_email() {
        let existing = vec![stored("A", "A@Example.com", Some("documents/v/e/a.pdf"))];
        let subs = vec![AttendeeSubmission::new("A", "a@example.com")];
        let planned = plan(&existing, &subs).unwrap();
        assert_eq!(
            planned[0].source,
            DocumentSource::Existing("documents/v/e/a.pdf".into())
        );
    }

    #[test]
    fn test_foreign_document_path_is_not_trusted() {
        let existing = vec![stored("A", "a@example.com", Some("documents/v/e/a.pdf"))];
        let subs = vec![AttendeeSubmission::new("B", "b@example.com")
            .with_existing("documents/other/e/x.pdf")];
        let err = plan(&existing, &subs).unwrap_err();
        assert_eq!(index_of(&err), Some(0));
    }

    #[test]
    fn test_rejects_bad_documents() {
        let too_big = AttendeeSubmission::new("A", "a@example.com")
            .with_file("id.pdf", vec![0; MAX_DOCUMENT_SIZE + 1]);
        assert!(matches!(
            plan(&[], &[too_big]).unwrap_err(),
            ServiceError::Validation { code: ErrorCode::DocumentTooLarge, .. }
        ));

        let exe = AttendeeSubmission::new("A", "a@example.com").with_file("id.exe", vec![1]);
        assert!(matches!(
            plan(&[], &[exe]).unwrap_err(),
            ServiceError::Validation { code: ErrorCode::UnsupportedDocumentFormat, .. }
        ));
    }

    #[test]
    fn test_extension_from_content_type() {
        let mut sub = AttendeeSubmission::new("A", "a@example.com").with_file("blob", vec![1]);
        if let Some(f) = sub.file.as_mut() {
            f.filename = None;
            f.content_type = Some("application/pdf".into());
        }
        let planned = plan(&[], &[sub]).unwrap();
        assert_eq!(planned[0].source, DocumentSource::Upload { ext: "pdf".into() });
    }

    #[test]
    fn test_duplicate_emails_rejected() {
        let subs = vec![
            AttendeeSubmission::new("A", "a@example.com").with_file("a.pdf", vec![1]),
            AttendeeSubmission::new("B", "A@example.com").with_file("b.pdf", vec![1]),
        ];
        assert_eq!(index_of(&plan(&[], &subs).unwrap_err()), Some(1));
    }
}
