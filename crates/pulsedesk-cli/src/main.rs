//! pulsedesk - command-line access to the patient monitoring backend.
//!
//! Every subcommand builds the session manager and patient store, invokes
//! one store action and prints the resulting store state. The session is
//! persisted between invocations by the configured storage backend.

mod output;

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{bail, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use pulsedesk_core::models::{Gender, NewPatient, PatientId, Role};
use pulsedesk_core::{App, Config};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable supplying the login email
const ENV_EMAIL: &str = "PULSEDESK_EMAIL";

/// Environment variable supplying the password (skips the prompt)
const ENV_PASSWORD: &str = "PULSEDESK_PASSWORD";

#[derive(Debug, Parser)]
#[command(name = "pulsedesk", version, about = "Patient monitoring from the terminal")]
struct Cli {
    /// Backend base URL (overrides config and PULSEDESK_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Log in and remember the session
    Login {
        #[arg(long)]
        email: Option<String>,
    },
    /// Create a new account (does not log in)
    Register {
        #[arg(long)]
        email: String,
        /// doctor (default) or admin
        #[arg(long)]
        role: Option<Role>,
    },
    /// Forget the saved session
    Logout,
    /// Show the logged in user
    Whoami,
    /// Patient records and vital signs
    #[command(subcommand)]
    Patients(PatientCommand),
}

#[derive(Debug, Subcommand)]
enum PatientCommand {
    /// List all patients
    List,
    /// Show one patient's record
    Show { id: String },
    /// Create a patient
    Create {
        #[arg(long)]
        name: String,
        /// Male, Female, Other or Unknown
        #[arg(long)]
        gender: Option<Gender>,
        /// YYYY-MM-DD
        #[arg(long, value_parser = parse_date)]
        birth_date: Option<NaiveDate>,
        #[arg(long)]
        contact: Option<String>,
    },
    /// Show a patient's current status
    Status { id: String },
    /// Show a patient's heartbeat series
    Heartbeats { id: String },
    /// Show record, status and heartbeat summary together
    Overview { id: String },
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NewPatient::parse_date(s).map_err(|e| format!("expected YYYY-MM-DD: {}", e))
}

/// Initialize the tracing subscriber for logging.
/// The returned guard must live until exit so buffered file logs are flushed.
fn init_tracing(log_file: Option<&PathBuf>) -> Result<Option<WorkerGuard>> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
            let dir = dir.map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("Log file path has no file name: {}", path.display()))?;
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            Ok(None)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_file.as_ref())?;

    let mut config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            let mut config = Config::default();
            config.apply_env();
            config
        }
    };
    if let Some(ref url) = cli.api_url {
        config.api_base_url = url.clone();
    }

    let app = App::new(&config)?;
    info!(base_url = %config.api_base_url, "pulsedesk starting");

    run(&cli, &app, &mut config).await
}

async fn run(cli: &Cli, app: &App, config: &mut Config) -> Result<()> {
    let out = output::Printer::new(cli.json);

    match &cli.command {
        Command::Login { email } => {
            let email = match email.clone().or_else(|| std::env::var(ENV_EMAIL).ok()) {
                Some(email) => email,
                None => prompt_email(config.last_email.as_deref())?,
            };
            let password = match std::env::var(ENV_PASSWORD) {
                Ok(password) => password,
                Err(_) => rpassword::prompt_password("Password: ")?,
            };

            if !app.session.login(&email, &password).await {
                bail!(failure("Login failed", app.session.last_error()));
            }

            config.last_email = Some(email);
            if let Err(e) = config.save() {
                warn!(error = %e, "Failed to save config");
            }
            out.session(&app.session.snapshot())
        }
        Command::Register { email, role } => {
            let password = match std::env::var(ENV_PASSWORD) {
                Ok(password) => password,
                Err(_) => rpassword::prompt_password("New password: ")?,
            };
            if !app.session.register(email, &password, role.clone()).await {
                bail!(failure("Registration failed", app.session.last_error()));
            }
            out.message(&format!("Registered {}. Log in to start a session.", email))
        }
        Command::Logout => {
            app.logout();
            if let Some(error) = app.session.last_error() {
                bail!(error);
            }
            out.message("Logged out")
        }
        Command::Whoami => {
            let session = app.session.snapshot();
            if !session.is_authenticated() {
                bail!("Not logged in");
            }
            out.session(&session)
        }
        Command::Patients(command) => {
            if !app.is_authenticated() {
                bail!("Not logged in. Run `pulsedesk login` first.");
            }
            run_patients(command, app, &out).await
        }
    }
}

async fn run_patients(command: &PatientCommand, app: &App, out: &output::Printer) -> Result<()> {
    let patients = &app.patients;

    match command {
        PatientCommand::List => {
            if !patients.fetch_all().await {
                bail!(failure("Failed to fetch patients", patients.last_error()));
            }
            out.patient_list(&patients.collection())
        }
        PatientCommand::Show { id } => {
            if !patients.fetch_details(id.as_str()).await {
                bail!(failure("Failed to fetch patient", patients.last_error()));
            }
            match patients.selected() {
                Some(patient) => out.patient(&patient),
                None => bail!("Patient {} not found", id),
            }
        }
        PatientCommand::Create {
            name,
            gender,
            birth_date,
            contact,
        } => {
            let payload = NewPatient {
                name: name.clone(),
                gender: *gender,
                birth_date: *birth_date,
                contact_info: contact.clone(),
            };
            let created = patients.create(&payload).await?;
            out.created(&created)
        }
        PatientCommand::Status { id } => {
            let id = PatientId::from(id.as_str());
            if !patients.fetch_status(&id).await {
                bail!(failure("Failed to fetch status", patients.last_error()));
            }
            match patients.status(&id) {
                Some(status) => out.status(&id, &status),
                None => bail!("No status for patient {}", id),
            }
        }
        PatientCommand::Heartbeats { id } => {
            let id = PatientId::from(id.as_str());
            if !patients.fetch_heartbeats(&id).await {
                bail!(failure("Failed to fetch heartbeats", patients.last_error()));
            }
            out.heartbeats(&patients.heartbeats(&id).unwrap_or_default())
        }
        PatientCommand::Overview { id } => {
            let id = PatientId::from(id.as_str());
            let refresh = patients.refresh_patient(&id).await;
            if !refresh.details {
                bail!(failure("Failed to fetch patient", patients.last_error()));
            }
            out.overview(
                patients.selected().as_ref(),
                patients.status(&id).as_ref(),
                patients.heartbeat_summary(&id).as_ref(),
            )?;
            if !refresh.all_succeeded() {
                if let Some(error) = patients.last_error() {
                    eprintln!("warning: {}", error);
                }
            }
            Ok(())
        }
    }
}

fn failure(action: &str, detail: Option<String>) -> String {
    match detail {
        Some(detail) => format!("{}: {}", action, detail),
        None => action.to_string(),
    }
}

fn prompt_email(last: Option<&str>) -> Result<String> {
    match last {
        Some(last) => print!("Email [{}]: ", last),
        None => print!("Email: "),
    }
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim();

    match (input.is_empty(), last) {
        (true, Some(last)) => Ok(last.to_string()),
        (true, None) => bail!("Email required"),
        (false, _) => Ok(input.to_string()),
    }
}
