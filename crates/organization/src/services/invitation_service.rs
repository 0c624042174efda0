//! Invite an employee and provision their account in one call.

use std::sync::Arc;

use breakwise_auth::{AccountProvisioner, AuthError, PasswordProvisioner, UserId};
use tracing::{error, info, warn};

use super::ledger::InvitationLedger;
use super::mailer::{InvitationEmail, InvitationMailer};
use crate::entities::{Company, DisableReason, Employee, Invitee};
use crate::repositories::CompanyRepository;
use crate::types::{InvitationResult, LedgerError};

/// A pending invitation whose account exists and whose email went out.
#[derive(Debug, Clone)]
pub struct ProvisionedInvite {
    pub employee: Employee,
    /// Account id to pass to `accept` once the invitee signs in.
    pub user_id: UserId,
}

pub struct InvitationService {
    ledger: InvitationLedger,
    companies: Arc<dyn CompanyRepository>,
    passwords: PasswordProvisioner,
    accounts: Arc<dyn AccountProvisioner>,
    mailer: Arc<dyn InvitationMailer>,
}

impl InvitationService {
    pub fn new(
        ledger: InvitationLedger,
        companies: Arc<dyn CompanyRepository>,
        passwords: PasswordProvisioner,
        accounts: Arc<dyn AccountProvisioner>,
        mailer: Arc<dyn InvitationMailer>,
    ) -> Self {
        Self {
            ledger,
            companies,
            passwords,
            accounts,
            mailer,
        }
    }

    pub fn ledger(&self) -> &InvitationLedger {
        &self.ledger
    }

    /// Record the invitation, create the account and send the credentials.
    ///
    /// When any step after the ledger write fails, the fresh row is disabled
    /// as `provisioning_failed` and an account created by this call is
    /// deleted, so the address can be invited again.
    pub async fn invite_employee(
        &self,
        company_id: &str,
        invitee: Invitee,
    ) -> InvitationResult<ProvisionedInvite> {
        let company = self.company(company_id).await?;
        let employee = self.ledger.invite(&company, invitee).await?;
        self.deliver(&company, employee, Credentials::Create).await
    }

    /// Start a new pending cycle for a disabled employee and email fresh credentials.
    ///
    /// An account left from an earlier cycle keeps its id and gets a new
    /// temporary password. Failures roll back the same way as
    /// [`invite_employee`](Self::invite_employee).
    pub async fn reinvite_employee(&self, employee_id: &str) -> InvitationResult<ProvisionedInvite> {
        let previous = self
            .ledger
            .find(employee_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(employee_id.to_string()))?;
        let company = self.company(&previous.company_id).await?;

        let employee = self.ledger.reinvite(employee_id).await?;
        self.deliver(&company, employee, Credentials::Reset).await
    }

    async fn company(&self, company_id: &str) -> InvitationResult<Company> {
        let company = self
            .companies
            .find_company(company_id)
            .await?
            .ok_or_else(|| LedgerError::CompanyNotFound(company_id.to_string()))?;
        Ok(company)
    }

    async fn deliver(
        &self,
        company: &Company,
        employee: Employee,
        credentials: Credentials,
    ) -> InvitationResult<ProvisionedInvite> {
        match self.provision(company, &employee, credentials).await {
            Ok(user_id) => {
                info!(employee_id = %employee.id, %user_id, "invitation provisioned");
                Ok(ProvisionedInvite { employee, user_id })
            }
            Err(err) => {
                error!(employee_id = %employee.id, error = %err, "invitation provisioning failed");
                if let Err(rollback) = self
                    .ledger
                    .disable_with(&employee.id, DisableReason::ProvisioningFailed)
                    .await
                {
                    error!(employee_id = %employee.id, error = %rollback, "could not release failed invitation");
                }
                Err(err)
            }
        }
    }

    async fn provision(
        &self,
        company: &Company,
        employee: &Employee,
        credentials: Credentials,
    ) -> InvitationResult<UserId> {
        let password = self.passwords.generate_default()?;
        let (user_id, created) = match credentials {
            Credentials::Create => (
                self.accounts
                    .create_account(&employee.email, password.expose())
                    .await?,
                true,
            ),
            Credentials::Reset => match self
                .accounts
                .reset_password(&employee.email, password.expose())
                .await
            {
                Ok(user_id) => (user_id, false),
                Err(AuthError::UserNotFound) => (
                    self.accounts
                        .create_account(&employee.email, password.expose())
                        .await?,
                    true,
                ),
                Err(err) => return Err(err.into()),
            },
        };

        let email = InvitationEmail {
            to: employee.email.clone(),
            employee_name: employee
                .name
                .clone()
                .unwrap_or_else(|| employee.email.clone()),
            company_name: company.name.clone(),
            temporary_password: password.into_inner(),
        };
        if let Err(err) = self.mailer.send_invitation(&email).await {
            if created {
                if let Err(cleanup) = self.accounts.delete_account(&user_id).await {
                    warn!(%user_id, error = %cleanup, "could not delete account of failed invitation");
                }
            }
            return Err(err.into());
        }

        Ok(user_id)
    }
}

/// How the invitee's login is obtained.
#[derive(Debug, Clone, Copy)]
enum Credentials {
    /// A first invitation owns a brand-new account.
    Create,
    /// A re-invite reuses the account from an earlier cycle when there is one.
    Reset,
}
