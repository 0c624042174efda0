//! Invitation email delivery.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use crate::types::MailerError;

/// Payload handed to the transactional email provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationEmail {
    pub to: String,
    pub employee_name: String,
    pub company_name: String,
    pub temporary_password: String,
}

impl fmt::Debug for InvitationEmail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvitationEmail")
            .field("to", &self.to)
            .field("employee_name", &self.employee_name)
            .field("company_name", &self.company_name)
            .field("temporary_password", &"<redacted>")
            .finish()
    }
}

#[async_trait]
pub trait InvitationMailer: Send + Sync {
    async fn send_invitation(&self, email: &InvitationEmail) -> Result<(), MailerError>;
}

/// Writes a log line per invitation instead of sending mail.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl InvitationMailer for LogMailer {
    async fn send_invitation(&self, email: &InvitationEmail) -> Result<(), MailerError> {
        info!(
            to = %email.to,
            employee = %email.employee_name,
            company = %email.company_name,
            "invitation email sent"
        );
        Ok(())
    }
}

/// Keeps every delivered email. Can be switched to reject deliveries.
#[derive(Clone, Default)]
pub struct MemoryMailer {
    sent: Arc<RwLock<Vec<InvitationEmail>>>,
    failing: Arc<AtomicBool>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<InvitationEmail> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl InvitationMailer for MemoryMailer {
    async fn send_invitation(&self, email: &InvitationEmail) -> Result<(), MailerError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MailerError::Unavailable("memory mailer set to fail".into()));
        }
        self.sent.write().await.push(email.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email() -> InvitationEmail {
        InvitationEmail {
            to: "ada@acme.test".into(),
            employee_name: "Ada".into(),
            company_name: "Acme".into(),
            temporary_password: "aA0!secret12".into(),
        }
    }

    #[test]
    fn test_wire_format_is_camel_case() {
        let json = serde_json::to_value(email()).unwrap();
        assert_eq!(json["employeeName"], "Ada");
        assert_eq!(json["companyName"], "Acme");
        assert_eq!(json["temporaryPassword"], "aA0!secret12");
    }

    #[test]
    fn test_debug_hides_password() {
        let debug = format!("{:?}", email());
        assert!(debug.contains("ada@acme.test"));
        assert!(!debug.contains("aA0!secret12"));
    }

    #[tokio::test]
    async fn test_memory_mailer_records_and_fails_on_demand() {
        let mailer = MemoryMailer::new();
        mailer.send_invitation(&email()).await.unwrap();

        mailer.set_failing(true);
        assert!(mailer.send_invitation(&email()).await.is_err());
        assert_eq!(mailer.sent().await.len(), 1);
    }
}
