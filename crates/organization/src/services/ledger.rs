//! Employee invitation state machine.

use std::sync::Arc;

use breakwise_auth::UserId;
use breakwise_config::InvitationConfig;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::entities::{Company, DisableReason, Employee, EmployeeStatus, Invitee};
use crate::repositories::EmployeeRepository;
use crate::types::{LedgerError, LedgerResult};
use crate::utils::normalize_email;

/// Owns every employee status change.
///
/// Each mutation is a read, a local transition and a conditional write keyed
/// on the status that was read, so two racing callers cannot both win.
#[derive(Clone)]
pub struct InvitationLedger {
    repository: Arc<dyn EmployeeRepository>,
    valid_for: Duration,
}

impl InvitationLedger {
    pub fn new(repository: Arc<dyn EmployeeRepository>, valid_for: Duration) -> Self {
        Self {
            repository,
            valid_for,
        }
    }

    pub fn from_config(repository: Arc<dyn EmployeeRepository>, config: &InvitationConfig) -> Self {
        Self::new(repository, Duration::days(i64::from(config.expiry_days)))
    }

    /// How long a new invitation stays pending.
    pub fn valid_for(&self) -> Duration {
        self.valid_for
    }

    pub async fn invite(&self, company: &Company, invitee: Invitee) -> LedgerResult<Employee> {
        self.invite_at(company, invitee, Utc::now()).await
    }

    /// Record a pending invitation issued at `now`.
    pub async fn invite_at(
        &self,
        company: &Company,
        invitee: Invitee,
        now: DateTime<Utc>,
    ) -> LedgerResult<Employee> {
        let email = normalize_email(&invitee.email)?;
        let employee = Employee::invited(
            company.id.clone(),
            email,
            invitee.name,
            invitee.department,
            now,
            self.valid_for,
        );

        self.repository.insert(&employee).await?;
        info!(
            employee_id = %employee.id,
            company_id = %company.id,
            expires_at = %employee.invitation_expires_at,
            "employee invited"
        );
        Ok(employee)
    }

    pub async fn accept(&self, employee_id: &str, user_id: UserId) -> LedgerResult<Employee> {
        self.accept_at(employee_id, user_id, Utc::now()).await
    }

    /// Link the invitee's account. Only a pending invitation can be accepted.
    pub async fn accept_at(
        &self,
        employee_id: &str,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> LedgerResult<Employee> {
        let employee = self
            .transition(employee_id, |employee| employee.accept(user_id, now))
            .await?;
        info!(employee_id = %employee.id, "invitation accepted");
        Ok(employee)
    }

    /// Close a pending invitation whose deadline passed.
    pub async fn expire(&self, employee_id: &str) -> LedgerResult<Employee> {
        let employee = self.transition(employee_id, Employee::expire).await?;
        info!(employee_id = %employee.id, "invitation expired");
        Ok(employee)
    }

    /// Remove an employee from the company. Terminal until a re-invite.
    pub async fn disable(&self, employee_id: &str) -> LedgerResult<Employee> {
        self.disable_with(employee_id, DisableReason::Removed).await
    }

    pub async fn disable_with(
        &self,
        employee_id: &str,
        reason: DisableReason,
    ) -> LedgerResult<Employee> {
        let employee = self
            .transition(employee_id, |employee| employee.disable(reason))
            .await?;
        info!(employee_id = %employee.id, %reason, "employee disabled");
        Ok(employee)
    }

    pub async fn reinvite(&self, employee_id: &str) -> LedgerResult<Employee> {
        self.reinvite_at(employee_id, Utc::now()).await
    }

    /// Start a new pending cycle for a disabled employee. The old row stays as history.
    pub async fn reinvite_at(&self, employee_id: &str, now: DateTime<Utc>) -> LedgerResult<Employee> {
        let previous = self.load(employee_id).await?;
        let next = previous.reinvited(now, self.valid_for)?;

        self.repository.insert(&next).await?;
        info!(
            employee_id = %next.id,
            previous_id = %previous.id,
            company_id = %next.company_id,
            "employee reinvited"
        );
        Ok(next)
    }

    /// Expire every invitation whose deadline is at or before `now`.
    ///
    /// Rows accepted or disabled between the listing and the write are skipped.
    pub async fn expire_overdue(&self, now: DateTime<Utc>) -> LedgerResult<Vec<Employee>> {
        let overdue = self.repository.list_overdue(now).await?;
        let mut expired = Vec::with_capacity(overdue.len());

        for employee in overdue {
            match self.expire(&employee.id).await {
                Ok(employee) => expired.push(employee),
                Err(LedgerError::InvalidTransition { from, .. }) => {
                    debug!(employee_id = %employee.id, %from, "invitation settled before expiry");
                }
                Err(err) => return Err(err),
            }
        }

        if !expired.is_empty() {
            info!(count = expired.len(), "overdue invitations expired");
        }
        Ok(expired)
    }

    pub async fn find(&self, employee_id: &str) -> LedgerResult<Option<Employee>> {
        self.repository.find(employee_id).await
    }

    pub async fn list(&self, company_id: &str) -> LedgerResult<Vec<Employee>> {
        self.repository.list_by_company(company_id).await
    }

    async fn load(&self, employee_id: &str) -> LedgerResult<Employee> {
        self.repository
            .find(employee_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(employee_id.to_string()))
    }

    async fn transition<F>(&self, employee_id: &str, apply: F) -> LedgerResult<Employee>
    where
        F: FnOnce(&mut Employee) -> LedgerResult<()>,
    {
        let mut employee = self.load(employee_id).await?;
        let expected: EmployeeStatus = employee.status;
        apply(&mut employee)?;

        if self.repository.replace(&employee, expected).await? {
            return Ok(employee);
        }

        // Another writer moved the row first; report against its current status.
        let current = self.load(employee_id).await?;
        warn!(employee_id, from = %current.status, "concurrent employee update");
        Err(LedgerError::InvalidTransition {
            from: current.status,
            action: "update",
        })
    }
}
