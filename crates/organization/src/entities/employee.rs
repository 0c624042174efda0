use std::fmt;
use std::str::FromStr;

use breakwise_auth::UserId;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::company::CompanyId;
use crate::types::{LedgerError, LedgerResult};

pub type EmployeeId = String;

/// Stored membership status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmployeeStatus {
    Invited,
    Active,
    Disabled,
}

impl EmployeeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmployeeStatus::Invited => "invited",
            EmployeeStatus::Active => "active",
            EmployeeStatus::Disabled => "disabled",
        }
    }
}

impl fmt::Display for EmployeeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for EmployeeStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invited" => Ok(EmployeeStatus::Invited),
            "active" => Ok(EmployeeStatus::Active),
            "disabled" => Ok(EmployeeStatus::Disabled),
            other => Err(LedgerError::Storage(format!("unknown employee status {other}"))),
        }
    }
}

/// Why a row ended up disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisableReason {
    /// The invitation deadline passed before it was accepted.
    Expired,
    /// An administrator removed the employee.
    Removed,
    /// The account or email step of an invite failed.
    ProvisioningFailed,
}

impl DisableReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisableReason::Expired => "expired",
            DisableReason::Removed => "removed",
            DisableReason::ProvisioningFailed => "provisioning_failed",
        }
    }
}

impl fmt::Display for DisableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for DisableReason {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "expired" => Ok(DisableReason::Expired),
            "removed" => Ok(DisableReason::Removed),
            "provisioning_failed" => Ok(DisableReason::ProvisioningFailed),
            other => Err(LedgerError::Storage(format!("unknown disable reason {other}"))),
        }
    }
}

/// Invitation view derived from the stored status and deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Expired,
    /// Disabled for any reason other than the deadline.
    Revoked,
}

impl fmt::Display for InvitationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Accepted => "accepted",
            InvitationStatus::Expired => "expired",
            InvitationStatus::Revoked => "revoked",
        };
        f.pad(label)
    }
}

/// Contact details for a new invitation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invitee {
    pub email: String,
    pub name: Option<String>,
    pub department: Option<String>,
}

impl Invitee {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }
}

/// A person's membership in a company, from invitation onwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub company_id: CompanyId,
    /// Set exactly once, when the invitee completes account creation.
    pub user_id: Option<UserId>,
    /// Normalized (trimmed, lowercase) address.
    pub email: String,
    pub name: Option<String>,
    pub department: Option<String>,
    pub status: EmployeeStatus,
    pub created_at: DateTime<Utc>,
    pub last_active_at: Option<DateTime<Utc>>,
    /// External HR identifier.
    pub employee_id: Option<String>,
    pub invited_at: DateTime<Utc>,
    pub invitation_expires_at: DateTime<Utc>,
    pub disabled_reason: Option<DisableReason>,
}

impl Employee {
    /// A fresh pending invitation. `email` must already be normalized.
    pub fn invited(
        company_id: impl Into<CompanyId>,
        email: String,
        name: Option<String>,
        department: Option<String>,
        now: DateTime<Utc>,
        valid_for: Duration,
    ) -> Self {
        Self {
            id: cuid2::create_id(),
            company_id: company_id.into(),
            user_id: None,
            email,
            name,
            department,
            status: EmployeeStatus::Invited,
            created_at: now,
            last_active_at: None,
            employee_id: None,
            invited_at: now,
            invitation_expires_at: now + valid_for,
            disabled_reason: None,
        }
    }

    pub fn invitation_status(&self) -> InvitationStatus {
        match (self.status, self.disabled_reason) {
            (EmployeeStatus::Invited, _) => InvitationStatus::Pending,
            (EmployeeStatus::Active, _) => InvitationStatus::Accepted,
            (EmployeeStatus::Disabled, Some(DisableReason::Expired)) => InvitationStatus::Expired,
            (EmployeeStatus::Disabled, _) => InvitationStatus::Revoked,
        }
    }

    /// Still invited with the deadline at or before `now`.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == EmployeeStatus::Invited && self.invitation_expires_at <= now
    }

    /// Whether this row claims its address within the company.
    pub fn holds_email(&self) -> bool {
        self.status != EmployeeStatus::Disabled
    }

    pub fn accept(&mut self, user_id: UserId, now: DateTime<Utc>) -> LedgerResult<()> {
        self.require(EmployeeStatus::Invited, "accept")?;
        self.status = EmployeeStatus::Active;
        self.user_id = Some(user_id);
        self.last_active_at = Some(now);
        Ok(())
    }

    pub fn expire(&mut self) -> LedgerResult<()> {
        self.require(EmployeeStatus::Invited, "expire")?;
        self.status = EmployeeStatus::Disabled;
        self.disabled_reason = Some(DisableReason::Expired);
        Ok(())
    }

    pub fn disable(&mut self, reason: DisableReason) -> LedgerResult<()> {
        if self.status == EmployeeStatus::Disabled {
            return Err(self.invalid("disable"));
        }
        self.status = EmployeeStatus::Disabled;
        self.disabled_reason = Some(reason);
        Ok(())
    }

    /// Next pending cycle for a disabled employee, as a new row.
    pub fn reinvited(&self, now: DateTime<Utc>, valid_for: Duration) -> LedgerResult<Employee> {
        self.require(EmployeeStatus::Disabled, "reinvite")?;
        let mut next = Employee::invited(
            self.company_id.clone(),
            self.email.clone(),
            self.name.clone(),
            self.department.clone(),
            now,
            valid_for,
        );
        next.employee_id = self.employee_id.clone();
        Ok(next)
    }

    fn require(&self, expected: EmployeeStatus, action: &'static str) -> LedgerResult<()> {
        if self.status == expected {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn invalid(&self, action: &'static str) -> LedgerError {
        LedgerError::InvalidTransition {
            from: self.status,
            action,
        }
    }
}
