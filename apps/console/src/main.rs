use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use breakwise_auth::{AccountProvisioner, InMemoryAuthBackend, PasswordProvisioner};
use breakwise_config::load as load_config;
use breakwise_extension::{
    InMemorySettingsSource, SurfaceController, SurfaceHandle, SurfaceKind, SurfaceState,
};
use breakwise_organization::{Company, CompanyRepository, Employee, Invitee, LogMailer};
use breakwise_runtime::{shutdown_signal, start_background, telemetry, OrganizationServices};
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser)]
#[command(name = "breakwise")]
#[command(about = "Breakwise invitation and extension tooling")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate temporary passwords
    Password {
        #[arg(long)]
        length: Option<usize>,
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
    /// Register a company
    AddCompany {
        #[arg(long)]
        name: String,
        #[arg(long)]
        domain: String,
        #[arg(long)]
        industry: Option<String>,
    },
    /// List registered companies
    Companies,
    /// Invite an employee, provision their account and send the email
    Invite {
        #[arg(long)]
        company: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        department: Option<String>,
    },
    /// Mark a pending invitation as accepted by an account
    Accept {
        #[arg(long)]
        employee: String,
        #[arg(long)]
        user: String,
    },
    /// Expire a pending invitation
    Expire {
        #[arg(long)]
        employee: String,
    },
    /// Remove an employee
    Disable {
        #[arg(long)]
        employee: String,
    },
    /// Start a new invitation cycle for a disabled employee and email new credentials
    Reinvite {
        #[arg(long)]
        employee: String,
    },
    /// List a company's employees
    List {
        #[arg(long)]
        company: String,
    },
    /// Expire overdue invitations, once or until interrupted
    Sweep {
        #[arg(long)]
        watch: bool,
    },
    /// Drive a background context and two surfaces through sign-in and sign-out
    Simulate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing().context("failed to initialise tracing")?;

    match cli.command {
        Commands::Password { length, count } => generate_passwords(length, count),
        Commands::AddCompany {
            name,
            domain,
            industry,
        } => add_company(name, domain, industry).await,
        Commands::Companies => list_companies().await,
        Commands::Invite {
            company,
            email,
            name,
            department,
        } => invite(company, email, name, department).await,
        Commands::Accept { employee, user } => {
            let services = organization().await?;
            print_employee(&services.ledger.accept(&employee, user).await?);
            Ok(())
        }
        Commands::Expire { employee } => {
            let services = organization().await?;
            print_employee(&services.ledger.expire(&employee).await?);
            Ok(())
        }
        Commands::Disable { employee } => {
            let services = organization().await?;
            print_employee(&services.ledger.disable(&employee).await?);
            Ok(())
        }
        Commands::Reinvite { employee } => reinvite(employee).await,
        Commands::List { company } => list_employees(company).await,
        Commands::Sweep { watch } => sweep(watch).await,
        Commands::Simulate => simulate().await,
    }
}

async fn organization() -> anyhow::Result<OrganizationServices> {
    let config = load_config().context("failed to load configuration")?;
    OrganizationServices::initialise(&config)
        .await
        .context("failed to initialise organization services")
}

fn generate_passwords(length: Option<usize>, count: usize) -> anyhow::Result<()> {
    let config = load_config().context("failed to load configuration")?;
    let provisioner = PasswordProvisioner::from_config(&config.password);
    let length = length.unwrap_or(provisioner.default_length());

    for _ in 0..count {
        let password = provisioner.generate(length)?;
        println!("{}", password.expose());
    }
    Ok(())
}

async fn add_company(name: String, domain: String, industry: Option<String>) -> anyhow::Result<()> {
    let services = organization().await?;
    let mut company = Company::new(name, domain);
    company.industry = industry;

    services
        .repository
        .insert_company(&company)
        .await
        .context("failed to insert company")?;
    println!("{}", company.id);
    Ok(())
}

async fn list_companies() -> anyhow::Result<()> {
    let services = organization().await?;
    let companies = services.repository.list_companies().await?;

    if companies.is_empty() {
        println!("No companies found in database");
        return Ok(());
    }

    println!("{:<26} {:<30} {:<25} {:<20}", "ID", "Name", "Domain", "Industry");
    println!("{}", "-".repeat(104));
    for company in companies {
        println!(
            "{:<26} {:<30} {:<25} {:<20}",
            company.id,
            company.name,
            company.domain,
            company.industry.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

async fn invite(
    company: String,
    email: String,
    name: Option<String>,
    department: Option<String>,
) -> anyhow::Result<()> {
    let config = load_config().context("failed to load configuration")?;
    let services = OrganizationServices::initialise(&config)
        .await
        .context("failed to initialise organization services")?;

    // Accounts live in the managed auth backend; the console stands in with a local one.
    let accounts: Arc<dyn AccountProvisioner> = Arc::new(InMemoryAuthBackend::new());
    let invitations = services.invitation_service(&config, accounts, Arc::new(LogMailer));

    let mut invitee = Invitee::new(email);
    invitee.name = name;
    invitee.department = department;

    let provisioned = invitations.invite_employee(&company, invitee).await?;
    print_employee(&provisioned.employee);
    println!("account: {}", provisioned.user_id);
    Ok(())
}

async fn reinvite(employee: String) -> anyhow::Result<()> {
    let config = load_config().context("failed to load configuration")?;
    let services = OrganizationServices::initialise(&config)
        .await
        .context("failed to initialise organization services")?;

    let accounts: Arc<dyn AccountProvisioner> = Arc::new(InMemoryAuthBackend::new());
    let invitations = services.invitation_service(&config, accounts, Arc::new(LogMailer));

    let provisioned = invitations.reinvite_employee(&employee).await?;
    print_employee(&provisioned.employee);
    println!("account: {}", provisioned.user_id);
    Ok(())
}

async fn list_employees(company: String) -> anyhow::Result<()> {
    let services = organization().await?;
    let employees = services.ledger.list(&company).await?;

    if employees.is_empty() {
        println!("No employees found for company {company}");
        return Ok(());
    }

    println!(
        "{:<26} {:<32} {:<20} {:<10} {:<10} {:<25}",
        "ID", "Email", "Name", "Status", "Invite", "Expires At"
    );
    println!("{}", "-".repeat(128));
    for employee in employees {
        println!(
            "{:<26} {:<32} {:<20} {:<10} {:<10} {:<25}",
            employee.id,
            employee.email,
            employee.name.as_deref().unwrap_or("-"),
            employee.status,
            employee.invitation_status(),
            employee.invitation_expires_at.to_rfc3339()
        );
    }
    Ok(())
}

async fn sweep(watch: bool) -> anyhow::Result<()> {
    let config = load_config().context("failed to load configuration")?;
    let services = OrganizationServices::initialise(&config)
        .await
        .context("failed to initialise organization services")?;
    let sweeper = services.sweeper(&config);

    if watch {
        sweeper.run_until(shutdown_signal()).await;
    } else {
        let expired = sweeper.sweep_once().await?;
        println!("{expired} invitation(s) expired");
    }
    Ok(())
}

fn print_employee(employee: &Employee) {
    println!("id:         {}", employee.id);
    println!("email:      {}", employee.email);
    println!("status:     {}", employee.status);
    println!("invitation: {}", employee.invitation_status());
    println!("expires at: {}", employee.invitation_expires_at.to_rfc3339());
    if let Some(user_id) = &employee.user_id {
        println!("user:       {user_id}");
    }
    if let Some(reason) = employee.disabled_reason {
        println!("reason:     {reason}");
    }
}

const SIMULATION_EMAIL: &str = "demo@breakwise.local";

async fn simulate() -> anyhow::Result<()> {
    let config = load_config().context("failed to load configuration")?;

    let auth = InMemoryAuthBackend::new();
    let password = PasswordProvisioner::from_config(&config.password).generate_default()?;
    auth.create_account(SIMULATION_EMAIL, password.expose()).await?;

    let context = start_background(
        &config,
        Arc::new(auth.clone()),
        Arc::new(InMemorySettingsSource::new()),
    );
    let handle = context.handle();

    let popup = SurfaceController::open(handle.clone(), SurfaceKind::Popup).await?;
    let dashboard = SurfaceController::open(handle.clone(), SurfaceKind::Dashboard).await?;
    report("mounted", &[&popup, &dashboard]);

    auth.sign_in(SIMULATION_EMAIL, password.expose()).await?;
    wait_for_all(&[&popup, &dashboard], |state| state.is_authenticated()).await?;
    report("signed in", &[&popup, &dashboard]);

    popup.show_exercise().await?;
    report("popup opened exercise", &[&popup, &dashboard]);

    auth.sign_out().await;
    wait_for_all(&[&popup, &dashboard], |state| {
        *state == SurfaceState::Unauthenticated
    })
    .await?;
    report("signed out", &[&popup, &dashboard]);

    popup.close().await;
    dashboard.close().await;

    let stats = handle.sync_stats();
    println!(
        "syncs: started={} coalesced={} queued={} applied={} failed={} subscribers left={}",
        stats.started,
        stats.coalesced,
        stats.queued,
        stats.applied,
        stats.failed,
        handle.subscriber_count().await?
    );

    context.shutdown().await;
    info!("simulation finished");
    Ok(())
}

async fn wait_for_all(
    surfaces: &[&SurfaceHandle],
    reached: impl Fn(&SurfaceState) -> bool,
) -> anyhow::Result<()> {
    for surface in surfaces {
        let mut snapshots = surface.watch();
        let waited = tokio::time::timeout(
            Duration::from_secs(5),
            snapshots.wait_for(|snapshot| reached(&snapshot.state)),
        )
        .await;
        match waited {
            Ok(Ok(_)) => {}
            Ok(Err(_)) => bail!("{} surface stopped", surface.kind()),
            Err(_) => bail!("{} surface did not settle", surface.kind()),
        }
    }
    Ok(())
}

fn report(step: &str, surfaces: &[&SurfaceHandle]) {
    println!("== {step}");
    for surface in surfaces {
        let snapshot = surface.snapshot();
        println!(
            "   {:<10} {:<40} {}",
            surface.kind().to_string(),
            format!("{:?}", snapshot.state),
            snapshot.user_id.as_deref().unwrap_or("-")
        );
    }
}
