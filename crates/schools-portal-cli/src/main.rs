//! schools-portal command-line entry point.

use chrono::NaiveDate;
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use serde::Serialize;

use schools_portal::{GradePeriod, PortalConfig, SchoolsClient};
use schools_portal_cli::chat::DataRequest;
use schools_portal_cli::{render, repl};

/// Environment variable read when `--password` is not given.
const PASSWORD_ENV: &str = "SCHOOLS_PORTAL_PASSWORD";

#[derive(Parser)]
#[command(
    name = "schools-portal",
    about = "Scraping client for the schools.by school portal",
    version
)]
struct Cli {
    /// Portal base URL (also SCHOOLS_PORTAL_URL).
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Per-request timeout in seconds (also SCHOOLS_PORTAL_TIMEOUT_SECS).
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

/// Optional login performed in the same session before a data request.
#[derive(Args, Clone)]
struct Credentials {
    /// Log in as this user first.
    #[arg(long)]
    username: Option<String>,

    /// Password for --username (also SCHOOLS_PORTAL_PASSWORD).
    #[arg(long)]
    password: Option<String>,
}

impl Credentials {
    fn resolve(self) -> anyhow::Result<Option<(String, String)>> {
        let Some(username) = self.username else {
            return Ok(None);
        };
        let password = resolve_password(self.password)?;
        Ok(Some((username, password)))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and report the outcome.
    Login {
        username: String,

        /// Password (also SCHOOLS_PORTAL_PASSWORD).
        #[arg(long)]
        password: Option<String>,
    },

    /// Show the schedule page.
    Schedule {
        /// Day to show (YYYY-MM-DD).
        date: Option<NaiveDate>,

        #[command(flatten)]
        credentials: Credentials,
    },

    /// Show the grades page.
    Grades {
        /// quarter, semester or year.
        period: Option<GradePeriod>,

        #[command(flatten)]
        credentials: Credentials,
    },

    /// Show the homework page.
    Homework {
        /// Day to show (YYYY-MM-DD).
        date: Option<NaiveDate>,

        #[command(flatten)]
        credentials: Credentials,
    },

    /// Show the announcements page.
    Announcements {
        #[command(flatten)]
        credentials: Credentials,
    },

    /// Show the profile page.
    Profile {
        #[command(flatten)]
        credentials: Credentials,
    },

    /// Search school sub-sites by name.
    Search { query: String },

    /// List every school sub-site.
    Subdomains,

    /// Probe well-known endpoints.
    Discover,

    /// Describe the login page's form.
    AnalyzeForm,

    /// Launch interactive REPL mode.
    Repl,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   schools-portal completions bash > ~/.local/share/bash-completion/completions/schools-portal
    ///   schools-portal completions zsh > ~/.zfunc/_schools-portal
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let json = cli.json;
    if let Err(e) = run(cli).await {
        if json {
            println!("{}", serde_json::json!({ "error": true, "message": format!("{e:#}") }));
        } else {
            eprintln!("Error: {e:#}");
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = PortalConfig::resolve(cli.base_url.as_deref(), cli.timeout)?;
    let json = cli.json;

    match cli.command {
        Commands::Login { username, password } => {
            let password = resolve_password(password)?;
            let login = username.clone();
            let outcome = SchoolsClient::scoped(config, move |client| {
                Box::pin(async move { client.authenticate(&login, &password).await })
            })
            .await?;
            emit(json, &outcome, || render::auth_outcome(&username, &outcome))?;
            if !outcome.is_success() {
                std::process::exit(1);
            }
        }

        Commands::Schedule { date, credentials } => {
            fetch(config, json, DataRequest::Schedule(date), credentials, "Schedule").await?;
        }
        Commands::Grades {
            period,
            credentials,
        } => {
            fetch(config, json, DataRequest::Grades(period), credentials, "Grades").await?;
        }
        Commands::Homework { date, credentials } => {
            fetch(config, json, DataRequest::Homework(date), credentials, "Homework").await?;
        }
        Commands::Announcements { credentials } => {
            fetch(
                config,
                json,
                DataRequest::Announcements,
                credentials,
                "Announcements",
            )
            .await?;
        }
        Commands::Profile { credentials } => {
            fetch(config, json, DataRequest::Profile, credentials, "Profile").await?;
        }

        Commands::Search { query } => {
            let owned = query.clone();
            let links = SchoolsClient::scoped(config, move |client| {
                Box::pin(async move { Ok(client.search_schools(&owned).await) })
            })
            .await?;
            emit(json, &links, || {
                render::links(&format!("Schools matching '{query}'"), &links)
            })?;
        }

        Commands::Subdomains => {
            let links = SchoolsClient::scoped(config, |client| {
                Box::pin(async move { Ok(client.get_subdomains_page().await) })
            })
            .await?;
            emit(json, &links, || render::links("School sub-sites", &links))?;
        }

        Commands::Discover => {
            let report = SchoolsClient::scoped(config, |client| {
                Box::pin(client.discover_endpoints())
            })
            .await?;
            emit(json, &report, || render::endpoint_report(&report))?;
        }

        Commands::AnalyzeForm => {
            let form = SchoolsClient::scoped(config, |client| {
                Box::pin(client.analyze_login_form())
            })
            .await?;
            emit(json, &form, || render::form_snapshot(&form))?;
        }

        Commands::Repl => {
            let handle = tokio::runtime::Handle::current();
            tokio::task::spawn_blocking(move || repl::run(config, handle)).await??;
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "schools-portal", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn resolve_password(explicit: Option<String>) -> anyhow::Result<String> {
    explicit
        .or_else(|| std::env::var(PASSWORD_ENV).ok())
        .ok_or_else(|| anyhow::anyhow!("no password: pass --password or set {PASSWORD_ENV}"))
}

/// Run one data request, logging in first in the same session when
/// credentials were given.
async fn fetch(
    config: PortalConfig,
    json: bool,
    request: DataRequest,
    credentials: Credentials,
    heading: &str,
) -> anyhow::Result<()> {
    let credentials = credentials.resolve()?;
    let result = SchoolsClient::scoped(config, move |client| {
        Box::pin(async move {
            if let Some((username, password)) = &credentials {
                let outcome = client.authenticate(username, password).await?;
                if !outcome.is_success() {
                    return Ok(Err(outcome));
                }
            }
            request.fetch(client).await.map(Ok)
        })
    })
    .await?;

    match result {
        Ok(envelope) => emit(json, &envelope, || render::envelope(heading, &envelope)),
        Err(outcome) => anyhow::bail!("{}", outcome.message()),
    }
}

fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce() -> String) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", text());
    }
    Ok(())
}
