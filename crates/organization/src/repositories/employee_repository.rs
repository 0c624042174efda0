//! Storage seams for companies and employees, plus the in-memory store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::entities::{Company, Employee, EmployeeStatus};
use crate::types::{LedgerError, LedgerResult};

#[async_trait]
pub trait CompanyRepository: Send + Sync {
    async fn insert_company(&self, company: &Company) -> LedgerResult<()>;
    async fn find_company(&self, company_id: &str) -> LedgerResult<Option<Company>>;
    async fn list_companies(&self) -> LedgerResult<Vec<Company>>;
}

/// Employee rows.
///
/// Implementations enforce that at most one row per company and
/// lowercase email is not `disabled`.
#[async_trait]
pub trait EmployeeRepository: Send + Sync {
    /// Store a new row, failing with `DuplicateInvite` when the address is already live.
    async fn insert(&self, employee: &Employee) -> LedgerResult<()>;

    /// Replace a row only if its stored status is still `expected`.
    ///
    /// Returns `false` when another writer changed the status first.
    async fn replace(&self, employee: &Employee, expected: EmployeeStatus) -> LedgerResult<bool>;

    async fn find(&self, employee_id: &str) -> LedgerResult<Option<Employee>>;

    /// Rows for a company, oldest invitation first.
    async fn list_by_company(&self, company_id: &str) -> LedgerResult<Vec<Employee>>;

    /// Invited rows whose deadline is at or before `now`.
    async fn list_overdue(&self, now: DateTime<Utc>) -> LedgerResult<Vec<Employee>>;
}

/// Process-local store used by tests and the console's scratch mode.
#[derive(Clone, Default)]
pub struct InMemoryEmployeeRepository {
    companies: Arc<RwLock<HashMap<String, Company>>>,
    employees: Arc<RwLock<HashMap<String, Employee>>>,
}

impl InMemoryEmployeeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CompanyRepository for InMemoryEmployeeRepository {
    async fn insert_company(&self, company: &Company) -> LedgerResult<()> {
        let mut companies = self.companies.write().await;
        if companies.contains_key(&company.id) {
            return Err(LedgerError::Storage(format!(
                "company {} already exists",
                company.id
            )));
        }
        companies.insert(company.id.clone(), company.clone());
        Ok(())
    }

    async fn find_company(&self, company_id: &str) -> LedgerResult<Option<Company>> {
        Ok(self.companies.read().await.get(company_id).cloned())
    }

    async fn list_companies(&self) -> LedgerResult<Vec<Company>> {
        let mut companies: Vec<_> = self.companies.read().await.values().cloned().collect();
        companies.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(companies)
    }
}

#[async_trait]
impl EmployeeRepository for InMemoryEmployeeRepository {
    async fn insert(&self, employee: &Employee) -> LedgerResult<()> {
        let mut employees = self.employees.write().await;

        let clash = employees.values().any(|existing| {
            existing.company_id == employee.company_id
                && existing.holds_email()
                && existing.email.eq_ignore_ascii_case(&employee.email)
        });
        if clash && employee.holds_email() {
            return Err(LedgerError::DuplicateInvite {
                email: employee.email.clone(),
            });
        }
        if employees.contains_key(&employee.id) {
            return Err(LedgerError::Storage(format!(
                "employee {} already exists",
                employee.id
            )));
        }

        employees.insert(employee.id.clone(), employee.clone());
        Ok(())
    }

    async fn replace(&self, employee: &Employee, expected: EmployeeStatus) -> LedgerResult<bool> {
        let mut employees = self.employees.write().await;
        let stored = employees
            .get_mut(&employee.id)
            .ok_or_else(|| LedgerError::NotFound(employee.id.clone()))?;

        if stored.status != expected {
            return Ok(false);
        }
        *stored = employee.clone();
        Ok(true)
    }

    async fn find(&self, employee_id: &str) -> LedgerResult<Option<Employee>> {
        Ok(self.employees.read().await.get(employee_id).cloned())
    }

    async fn list_by_company(&self, company_id: &str) -> LedgerResult<Vec<Employee>> {
        let mut rows: Vec<_> = self
            .employees
            .read()
            .await
            .values()
            .filter(|employee| employee.company_id == company_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.invited_at.cmp(&b.invited_at).then_with(|| a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn list_overdue(&self, now: DateTime<Utc>) -> LedgerResult<Vec<Employee>> {
        let mut rows: Vec<_> = self
            .employees
            .read()
            .await
            .values()
            .filter(|employee| employee.is_overdue(now))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.invitation_expires_at.cmp(&b.invitation_expires_at));
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::DisableReason;
    use chrono::Duration;

    fn invited(company: &str, email: &str, now: DateTime<Utc>) -> Employee {
        Employee::invited(company, email.into(), None, None, now, Duration::days(7))
    }

    #[tokio::test]
    async fn test_live_email_is_unique_per_company() {
        let repo = InMemoryEmployeeRepository::new();
        let now = Utc::now();

        repo.insert(&invited("co-1", "a@x.com", now)).await.unwrap();
        let duplicate = repo.insert(&invited("co-1", "a@x.com", now)).await;
        assert!(matches!(duplicate, Err(LedgerError::DuplicateInvite { .. })));

        // Another company may invite the same address.
        repo.insert(&invited("co-2", "a@x.com", now)).await.unwrap();
    }

    #[tokio::test]
    async fn test_disabled_row_frees_the_address() {
        let repo = InMemoryEmployeeRepository::new();
        let now = Utc::now();
        let mut first = invited("co-1", "a@x.com", now);
        repo.insert(&first).await.unwrap();

        first.disable(DisableReason::Removed).unwrap();
        assert!(repo.replace(&first, EmployeeStatus::Invited).await.unwrap());

        repo.insert(&invited("co-1", "a@x.com", now)).await.unwrap();
        assert_eq!(repo.list_by_company("co-1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_replace_is_conditional_on_status() {
        let repo = InMemoryEmployeeRepository::new();
        let now = Utc::now();
        let mut employee = invited("co-1", "a@x.com", now);
        repo.insert(&employee).await.unwrap();

        employee.accept("user-1".into(), now).unwrap();
        assert!(repo.replace(&employee, EmployeeStatus::Invited).await.unwrap());
        assert!(!repo.replace(&employee, EmployeeStatus::Invited).await.unwrap());

        let missing = invited("co-1", "b@x.com", now);
        assert!(matches!(
            repo.replace(&missing, EmployeeStatus::Invited).await,
            Err(LedgerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_overdue_listing() {
        let repo = InMemoryEmployeeRepository::new();
        let now = Utc::now();
        let old = invited("co-1", "old@x.com", now - Duration::days(8));
        let fresh = invited("co-1", "fresh@x.com", now);
        repo.insert(&old).await.unwrap();
        repo.insert(&fresh).await.unwrap();

        let overdue = repo.list_overdue(now).await.unwrap();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].id, old.id);
    }
}
