//! Invitation lifecycle tests across the ledger, both stores and the provisioning flow.

use std::sync::Arc;

use breakwise_auth::{InMemoryAuthBackend, PasswordProvisioner};
use breakwise_organization::database::MIGRATOR;
use breakwise_organization::{
    Company, CompanyRepository, DisableReason, EmployeeRepository, EmployeeStatus,
    InMemoryEmployeeRepository, InvitationError, InvitationLedger, InvitationService,
    InvitationStatus, Invitee, LedgerError, MemoryMailer, SqliteEmployeeRepository,
};
use chrono::{Duration, TimeZone, Utc};
use sqlx::sqlite::SqlitePoolOptions;

async fn sqlite_repository() -> SqliteEmployeeRepository {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    MIGRATOR.run(&pool).await.unwrap();
    SqliteEmployeeRepository::new(pool)
}

/// Both stores, each with one registered company.
async fn stores() -> Vec<(&'static str, Arc<dyn EmployeeRepository>, Company)> {
    let company = Company::new("Acme", "acme.test");

    let memory = InMemoryEmployeeRepository::new();
    memory.insert_company(&company).await.unwrap();

    let sqlite = sqlite_repository().await;
    sqlite.insert_company(&company).await.unwrap();

    let memory: Arc<dyn EmployeeRepository> = Arc::new(memory);
    let sqlite: Arc<dyn EmployeeRepository> = Arc::new(sqlite);
    vec![("memory", memory, company.clone()), ("sqlite", sqlite, company)]
}

#[tokio::test]
async fn duplicate_invite_while_pending_is_rejected() {
    for (store, repository, company) in stores().await {
        let ledger = InvitationLedger::new(repository, Duration::days(7));

        ledger.invite(&company, Invitee::new("a@x.com")).await.unwrap();
        let second = ledger.invite(&company, Invitee::new("a@x.com")).await;

        assert_eq!(
            second.unwrap_err(),
            LedgerError::DuplicateInvite {
                email: "a@x.com".into()
            },
            "{store}"
        );
    }
}

#[tokio::test]
async fn duplicate_invite_while_active_is_rejected() {
    for (store, repository, company) in stores().await {
        let ledger = InvitationLedger::new(repository, Duration::days(7));

        let employee = ledger.invite(&company, Invitee::new("a@x.com")).await.unwrap();
        ledger.accept(&employee.id, "user-1".into()).await.unwrap();

        assert!(
            matches!(
                ledger.invite(&company, Invitee::new("a@x.com")).await,
                Err(LedgerError::DuplicateInvite { .. })
            ),
            "{store}"
        );
    }
}

#[tokio::test]
async fn accept_succeeds_exactly_once() {
    for (store, repository, company) in stores().await {
        let ledger = InvitationLedger::new(repository, Duration::days(7));
        let employee = ledger.invite(&company, Invitee::new("a@x.com")).await.unwrap();

        let accepted = ledger.accept(&employee.id, "user-1".into()).await.unwrap();
        assert_eq!(accepted.status, EmployeeStatus::Active, "{store}");
        assert_eq!(accepted.user_id.as_deref(), Some("user-1"), "{store}");
        assert!(accepted.last_active_at.is_some(), "{store}");

        let again = ledger.accept(&employee.id, "user-2".into()).await;
        assert_eq!(
            again.unwrap_err(),
            LedgerError::InvalidTransition {
                from: EmployeeStatus::Active,
                action: "accept"
            },
            "{store}"
        );

        let stored = ledger.find(&employee.id).await.unwrap().unwrap();
        assert_eq!(stored.user_id.as_deref(), Some("user-1"), "{store}");
    }
}

#[tokio::test]
async fn concurrent_accepts_have_one_winner() {
    for (store, repository, company) in stores().await {
        let ledger = InvitationLedger::new(repository, Duration::days(7));
        let employee = ledger.invite(&company, Invitee::new("a@x.com")).await.unwrap();

        let attempts = (0..8).map(|n| {
            let ledger = ledger.clone();
            let id = employee.id.clone();
            tokio::spawn(async move { ledger.accept(&id, format!("user-{n}")).await })
        });
        let mut winners = 0;
        for attempt in attempts.collect::<Vec<_>>() {
            match attempt.await.unwrap() {
                Ok(_) => winners += 1,
                Err(LedgerError::InvalidTransition { .. }) => {}
                Err(other) => panic!("{store}: unexpected error {other}"),
            }
        }

        assert_eq!(winners, 1, "{store}");
    }
}

#[tokio::test]
async fn accept_on_non_invited_employee_fails() {
    for (store, repository, company) in stores().await {
        let ledger = InvitationLedger::new(repository, Duration::days(7));

        let removed = ledger.invite(&company, Invitee::new("gone@x.com")).await.unwrap();
        ledger.disable(&removed.id).await.unwrap();

        assert!(
            matches!(
                ledger.accept(&removed.id, "user-1".into()).await,
                Err(LedgerError::InvalidTransition {
                    from: EmployeeStatus::Disabled,
                    ..
                })
            ),
            "{store}"
        );
    }
}

#[tokio::test]
async fn invitation_past_its_deadline_expires_and_cannot_be_accepted() {
    for (store, repository, company) in stores().await {
        let ledger = InvitationLedger::new(repository, Duration::days(7));
        let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();

        let employee = ledger
            .invite_at(&company, Invitee::new("late@x.com").with_name("Late"), t0)
            .await
            .unwrap();
        assert_eq!(employee.invitation_expires_at, t0 + Duration::days(7), "{store}");

        // Nothing is due just before the deadline.
        let early = ledger
            .expire_overdue(t0 + Duration::days(7) - Duration::hours(1))
            .await
            .unwrap();
        assert!(early.is_empty(), "{store}");

        let swept = ledger
            .expire_overdue(t0 + Duration::days(7) + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(swept.len(), 1, "{store}");

        let expired = ledger.find(&employee.id).await.unwrap().unwrap();
        assert_eq!(expired.status, EmployeeStatus::Disabled, "{store}");
        assert_eq!(expired.disabled_reason, Some(DisableReason::Expired), "{store}");
        assert_eq!(expired.invitation_status(), InvitationStatus::Expired, "{store}");

        assert!(
            matches!(
                ledger.accept(&employee.id, "user-1".into()).await,
                Err(LedgerError::InvalidTransition { .. })
            ),
            "{store}"
        );
    }
}

#[tokio::test]
async fn expire_requires_a_pending_invitation() {
    for (store, repository, company) in stores().await {
        let ledger = InvitationLedger::new(repository, Duration::days(7));
        let employee = ledger.invite(&company, Invitee::new("a@x.com")).await.unwrap();
        ledger.accept(&employee.id, "user-1".into()).await.unwrap();

        assert_eq!(
            ledger.expire(&employee.id).await.unwrap_err(),
            LedgerError::InvalidTransition {
                from: EmployeeStatus::Active,
                action: "expire"
            },
            "{store}"
        );
    }
}

#[tokio::test]
async fn reinvite_after_expiry_starts_a_fresh_cycle() {
    for (store, repository, company) in stores().await {
        let ledger = InvitationLedger::new(repository, Duration::days(7));
        let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let first = ledger
            .invite_at(&company, Invitee::new("a@x.com").with_department("Ops"), t0)
            .await
            .unwrap();
        ledger.expire(&first.id).await.unwrap();

        let t1 = t0 + Duration::days(30);
        let second = ledger.reinvite_at(&first.id, t1).await.unwrap();
        assert_ne!(second.id, first.id, "{store}");
        assert_eq!(second.invitation_status(), InvitationStatus::Pending, "{store}");
        assert_eq!(second.department.as_deref(), Some("Ops"), "{store}");
        assert_eq!(second.invitation_expires_at, t1 + Duration::days(7), "{store}");

        ledger.accept(&second.id, "user-1".into()).await.unwrap();

        let statuses: Vec<_> = ledger
            .list(&company.id)
            .await
            .unwrap()
            .iter()
            .map(|employee| employee.invitation_status())
            .collect();
        assert_eq!(
            statuses,
            vec![InvitationStatus::Expired, InvitationStatus::Accepted],
            "{store}"
        );
    }
}

struct ServiceFixture {
    service: InvitationService,
    company: Company,
    accounts: InMemoryAuthBackend,
    mailer: MemoryMailer,
}

async fn service() -> ServiceFixture {
    let repository = InMemoryEmployeeRepository::new();
    let company = Company::new("Acme", "acme.test");
    repository.insert_company(&company).await.unwrap();

    let accounts = InMemoryAuthBackend::new();
    let mailer = MemoryMailer::new();
    let service = InvitationService::new(
        InvitationLedger::new(Arc::new(repository.clone()), Duration::days(7)),
        Arc::new(repository),
        PasswordProvisioner::default(),
        Arc::new(accounts.clone()),
        Arc::new(mailer.clone()),
    );

    ServiceFixture {
        service,
        company,
        accounts,
        mailer,
    }
}

#[tokio::test]
async fn invite_employee_provisions_account_and_emails_password() {
    let fx = service().await;

    let invite = fx
        .service
        .invite_employee(&fx.company.id, Invitee::new("Ada@Acme.test").with_name("Ada"))
        .await
        .unwrap();

    let sent = fx.mailer.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "ada@acme.test");
    assert_eq!(sent[0].employee_name, "Ada");
    assert_eq!(sent[0].company_name, "Acme");
    assert_eq!(sent[0].temporary_password.len(), 12);

    // The emailed password signs the invitee in as the provisioned account.
    let session = fx
        .accounts
        .sign_in("ada@acme.test", &sent[0].temporary_password)
        .await
        .unwrap();
    assert_eq!(session.user_id(), invite.user_id);

    let accepted = fx
        .service
        .ledger()
        .accept(&invite.employee.id, invite.user_id.clone())
        .await
        .unwrap();
    assert_eq!(accepted.invitation_status(), InvitationStatus::Accepted);
}

#[tokio::test]
async fn failed_email_releases_the_invitation() {
    let fx = service().await;
    fx.mailer.set_failing(true);

    let err = fx
        .service
        .invite_employee(&fx.company.id, Invitee::new("ada@acme.test"))
        .await
        .unwrap_err();
    assert!(matches!(err, InvitationError::Mailer(_)));

    let rows = fx.service.ledger().list(&fx.company.id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, EmployeeStatus::Disabled);
    assert_eq!(rows[0].disabled_reason, Some(DisableReason::ProvisioningFailed));
    assert_eq!(rows[0].invitation_status(), InvitationStatus::Revoked);
}

#[tokio::test]
async fn failed_account_creation_releases_the_invitation() {
    let fx = service().await;
    fx.accounts.set_reachable(false);

    let err = fx
        .service
        .invite_employee(&fx.company.id, Invitee::new("ada@acme.test"))
        .await
        .unwrap_err();
    assert!(matches!(err, InvitationError::Account(_)));
    assert!(fx.mailer.sent().await.is_empty());

    // The address is free again once the backend recovers.
    fx.accounts.set_reachable(true);
    fx.service
        .invite_employee(&fx.company.id, Invitee::new("ada@acme.test"))
        .await
        .unwrap();
}

#[tokio::test]
async fn invite_can_be_retried_after_the_email_fails() {
    let fx = service().await;
    fx.mailer.set_failing(true);

    let err = fx
        .service
        .invite_employee(&fx.company.id, Invitee::new("ada@acme.test"))
        .await
        .unwrap_err();
    assert!(matches!(err, InvitationError::Mailer(_)));

    fx.mailer.set_failing(false);
    let invite = fx
        .service
        .invite_employee(&fx.company.id, Invitee::new("ada@acme.test"))
        .await
        .unwrap();

    let sent = fx.mailer.sent().await;
    assert_eq!(sent.len(), 1);
    let session = fx
        .accounts
        .sign_in("ada@acme.test", &sent[0].temporary_password)
        .await
        .unwrap();
    assert_eq!(session.user_id(), invite.user_id);
}

#[tokio::test]
async fn reinvite_after_expiry_emails_new_credentials() {
    let fx = service().await;
    let first = fx
        .service
        .invite_employee(&fx.company.id, Invitee::new("ada@acme.test").with_name("Ada"))
        .await
        .unwrap();
    fx.service.ledger().expire(&first.employee.id).await.unwrap();

    let second = fx
        .service
        .reinvite_employee(&first.employee.id)
        .await
        .unwrap();

    assert_ne!(second.employee.id, first.employee.id);
    assert_eq!(second.employee.invitation_status(), InvitationStatus::Pending);
    assert_eq!(second.user_id, first.user_id);

    let sent = fx.mailer.sent().await;
    assert_eq!(sent.len(), 2);
    assert_ne!(sent[0].temporary_password, sent[1].temporary_password);
    assert!(fx
        .accounts
        .sign_in("ada@acme.test", &sent[0].temporary_password)
        .await
        .is_err());
    fx.accounts
        .sign_in("ada@acme.test", &sent[1].temporary_password)
        .await
        .unwrap();

    let accepted = fx
        .service
        .ledger()
        .accept(&second.employee.id, second.user_id.clone())
        .await
        .unwrap();
    assert_eq!(accepted.invitation_status(), InvitationStatus::Accepted);
}

#[tokio::test]
async fn failed_reinvite_keeps_the_account_and_can_be_retried() {
    let fx = service().await;
    let first = fx
        .service
        .invite_employee(&fx.company.id, Invitee::new("ada@acme.test"))
        .await
        .unwrap();
    fx.service.ledger().expire(&first.employee.id).await.unwrap();

    fx.mailer.set_failing(true);
    let err = fx
        .service
        .reinvite_employee(&first.employee.id)
        .await
        .unwrap_err();
    assert!(matches!(err, InvitationError::Mailer(_)));

    let failed = fx
        .service
        .ledger()
        .list(&fx.company.id)
        .await
        .unwrap()
        .into_iter()
        .find(|row| row.disabled_reason == Some(DisableReason::ProvisioningFailed))
        .unwrap();

    fx.mailer.set_failing(false);
    let retried = fx.service.reinvite_employee(&failed.id).await.unwrap();
    assert_eq!(retried.user_id, first.user_id);
    assert_eq!(fx.mailer.sent().await.len(), 2);
}

#[tokio::test]
async fn reinvite_of_a_pending_invitation_is_rejected() {
    let fx = service().await;
    let invite = fx
        .service
        .invite_employee(&fx.company.id, Invitee::new("ada@acme.test"))
        .await
        .unwrap();

    let err = fx
        .service
        .reinvite_employee(&invite.employee.id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        InvitationError::Ledger(LedgerError::InvalidTransition {
            from: EmployeeStatus::Invited,
            ..
        })
    ));
    assert_eq!(fx.mailer.sent().await.len(), 1);
}

#[tokio::test]
async fn unknown_company_is_reported() {
    let fx = service().await;

    let err = fx
        .service
        .invite_employee("no-such-company", Invitee::new("ada@acme.test"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        InvitationError::Ledger(LedgerError::CompanyNotFound(_))
    ));
}
