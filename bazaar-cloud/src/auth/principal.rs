use serde::{Deserialize, Serialize};

use crate::error::{ServiceError, ServiceResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Vendor,
    EventsOffice,
    Admin,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vendor => "vendor",
            Self::EventsOffice => "events_office",
            Self::Admin => "admin",
            Self::Student => "student",
        }
    }

    /// May approve, reject and place booths
    pub fn can_review_applications(&self) -> bool {
        matches!(self, Self::EventsOffice | Self::Admin)
    }
}

/// Authenticated caller, passed explicitly into every service operation
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: String,
    pub email: String,
    pub role: Role,
    pub company_name: Option<String>,
}

impl Principal {
    pub fn new(user_id: impl Into<String>, email: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
            role,
            company_name: None,
        }
    }

    pub fn with_company(mut self, company_name: impl Into<String>) -> Self {
        self.company_name = Some(company_name.into());
        self
    }

    pub fn require_vendor(&self) -> ServiceResult<()> {
        if self.role != Role::Vendor {
            return Err(ServiceError::Forbidden("Vendor account required".into()));
        }
        Ok(())
    }

    pub fn require_reviewer(&self) -> ServiceResult<()> {
        if !self.role.can_review_applications() {
            return Err(ServiceError::Forbidden(
                "Events office or admin role required".into(),
            ));
        }
        Ok(())
    }
}
