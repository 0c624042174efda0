//! SQLite-backed company and employee storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::employee_repository::{CompanyRepository, EmployeeRepository};
use crate::entities::{Company, DisableReason, Employee, EmployeeStatus};
use crate::types::{is_duplicate_invite, LedgerError, LedgerResult};

const EMPLOYEE_COLUMNS: &str = "id, company_id, user_id, email, name, department, status, \
     created_at, last_active_at, employee_id, invited_at, invitation_expires_at, disabled_reason";

/// Repository over the `companies` and `employees` tables.
#[derive(Clone)]
pub struct SqliteEmployeeRepository {
    pool: SqlitePool,
}

impl SqliteEmployeeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn company_from_row(row: &SqliteRow) -> LedgerResult<Company> {
    Ok(Company {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        domain: row.try_get("domain")?,
        logo_url: row.try_get("logo_url")?,
        industry: row.try_get("industry")?,
    })
}

fn employee_from_row(row: &SqliteRow) -> LedgerResult<Employee> {
    let status: String = row.try_get("status")?;
    let disabled_reason: Option<String> = row.try_get("disabled_reason")?;

    Ok(Employee {
        id: row.try_get("id")?,
        company_id: row.try_get("company_id")?,
        user_id: row.try_get("user_id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        department: row.try_get("department")?,
        status: status.parse()?,
        created_at: row.try_get("created_at")?,
        last_active_at: row.try_get("last_active_at")?,
        employee_id: row.try_get("employee_id")?,
        invited_at: row.try_get("invited_at")?,
        invitation_expires_at: row.try_get("invitation_expires_at")?,
        disabled_reason: disabled_reason
            .as_deref()
            .map(str::parse::<DisableReason>)
            .transpose()?,
    })
}

#[async_trait]
impl CompanyRepository for SqliteEmployeeRepository {
    async fn insert_company(&self, company: &Company) -> LedgerResult<()> {
        sqlx::query(
            "INSERT INTO companies (id, name, domain, logo_url, industry) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&company.id)
        .bind(&company.name)
        .bind(&company.domain)
        .bind(&company.logo_url)
        .bind(&company.industry)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_company(&self, company_id: &str) -> LedgerResult<Option<Company>> {
        let row = sqlx::query(
            "SELECT id, name, domain, logo_url, industry FROM companies WHERE id = ?",
        )
        .bind(company_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(company_from_row).transpose()
    }

    async fn list_companies(&self) -> LedgerResult<Vec<Company>> {
        let rows = sqlx::query("SELECT id, name, domain, logo_url, industry FROM companies ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(company_from_row).collect()
    }
}

#[async_trait]
impl EmployeeRepository for SqliteEmployeeRepository {
    async fn insert(&self, employee: &Employee) -> LedgerResult<()> {
        let query = format!(
            "INSERT INTO employees ({EMPLOYEE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        );

        sqlx::query(&query)
            .bind(&employee.id)
            .bind(&employee.company_id)
            .bind(&employee.user_id)
            .bind(&employee.email)
            .bind(&employee.name)
            .bind(&employee.department)
            .bind(employee.status.as_str())
            .bind(employee.created_at)
            .bind(employee.last_active_at)
            .bind(&employee.employee_id)
            .bind(employee.invited_at)
            .bind(employee.invitation_expires_at)
            .bind(employee.disabled_reason.map(|reason| reason.as_str()))
            .execute(&self.pool)
            .await
            .map_err(|err| {
                if is_duplicate_invite(&err) {
                    LedgerError::DuplicateInvite {
                        email: employee.email.clone(),
                    }
                } else {
                    LedgerError::from(err)
                }
            })?;

        Ok(())
    }

    async fn replace(&self, employee: &Employee, expected: EmployeeStatus) -> LedgerResult<bool> {
        let result = sqlx::query(
            "UPDATE employees
             SET user_id = ?, name = ?, department = ?, status = ?, last_active_at = ?,
                 employee_id = ?, invitation_expires_at = ?, disabled_reason = ?
             WHERE id = ? AND status = ?",
        )
        .bind(&employee.user_id)
        .bind(&employee.name)
        .bind(&employee.department)
        .bind(employee.status.as_str())
        .bind(employee.last_active_at)
        .bind(&employee.employee_id)
        .bind(employee.invitation_expires_at)
        .bind(employee.disabled_reason.map(|reason| reason.as_str()))
        .bind(&employee.id)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        match self.find(&employee.id).await? {
            Some(_) => Ok(false),
            None => Err(LedgerError::NotFound(employee.id.clone())),
        }
    }

    async fn find(&self, employee_id: &str) -> LedgerResult<Option<Employee>> {
        let query = format!("SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE id = ?");
        let row = sqlx::query(&query)
            .bind(employee_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(employee_from_row).transpose()
    }

    async fn list_by_company(&self, company_id: &str) -> LedgerResult<Vec<Employee>> {
        let query = format!(
            "SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE company_id = ? ORDER BY invited_at, id"
        );
        let rows = sqlx::query(&query)
            .bind(company_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(employee_from_row).collect()
    }

    async fn list_overdue(&self, now: DateTime<Utc>) -> LedgerResult<Vec<Employee>> {
        // Deadlines are compared as timestamps, not as stored text.
        let query = format!("SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE status = ?");
        let rows = sqlx::query(&query)
            .bind(EmployeeStatus::Invited.as_str())
            .fetch_all(&self.pool)
            .await?;

        let mut overdue = rows
            .iter()
            .map(employee_from_row)
            .collect::<LedgerResult<Vec<_>>>()?;
        overdue.retain(|employee| employee.is_overdue(now));
        overdue.sort_by(|a, b| a.invitation_expires_at.cmp(&b.invitation_expires_at));
        Ok(overdue)
    }
}
