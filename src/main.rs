//! fmr-init - first-run provisioning for a metadata registry.
//!
//! Every input is a flag with an environment-variable fallback and a
//! documented default, so the tool runs unchanged as a container init step:
//!
//! ```bash
//! FMR_PWD=changeme FMR_DB_PWD=dbsecret fmr-init
//! fmr-init verify --output /app/output/fmr.properties
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use fmr_init::properties::PropertiesFile;
use fmr_init::settings::defaults;
use fmr_init::{
    provision, DatabaseCoordinates, ProvisionError, ProvisioningRequest, RegistryEndpoint,
    RegistryProfile,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fmr-init", version, about = "Provision registry credentials, configuration and schema")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Only write the properties file.
    #[arg(long, env = "FMR_SKIP_DATABASE", global = true)]
    skip_database: bool,

    /// Echo the rendered properties file to stdout.
    #[arg(long, global = true)]
    print_config: bool,

    #[command(flatten)]
    inputs: Inputs,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Derive secrets, write the properties file and bootstrap the database (default).
    Provision,
    /// Check an existing properties file against the configured passwords.
    Verify,
}

#[derive(Args)]
struct Inputs {
    #[arg(long, env = "FMR_USER", default_value = defaults::ADMIN_USERNAME, global = true)]
    admin_username: String,

    #[arg(long, env = "FMR_PWD", default_value = defaults::ADMIN_PASSWORD, hide_env_values = true, global = true)]
    admin_password: String,

    #[arg(long, env = "FMR_DB", default_value = defaults::DATABASE_NAME, global = true)]
    db_name: String,

    #[arg(long, env = "FMR_DB_USER", default_value = defaults::DATABASE_USERNAME, global = true)]
    db_user: String,

    #[arg(long, env = "FMR_DB_PWD", default_value = defaults::DATABASE_PASSWORD, hide_env_values = true, global = true)]
    db_password: String,

    #[arg(long, env = "FMR_DB_HOST", default_value = defaults::DATABASE_HOST, global = true)]
    db_host: String,

    #[arg(long, env = "FMR_DB_PORT", default_value_t = defaults::DATABASE_PORT, global = true)]
    db_port: u16,

    #[arg(long, env = "FMR_NAME", default_value = defaults::REGISTRY_NAME, global = true)]
    registry_name: String,

    #[arg(long, env = "FMR_PROTOCOL", default_value = defaults::REGISTRY_PROTOCOL, global = true)]
    registry_protocol: String,

    #[arg(long, env = "FMR_HOST", default_value = defaults::REGISTRY_HOST, global = true)]
    registry_host: String,

    #[arg(long, env = "FMR_PORT", default_value_t = defaults::REGISTRY_PORT, global = true)]
    registry_port: u16,

    #[arg(long, env = "FMR_DEFAULT_AGENCY", default_value = defaults::DEFAULT_AGENCY, global = true)]
    default_agency: String,

    #[arg(long, env = "FMR_SUPPORTEMAIL", default_value = defaults::SUPPORT_EMAIL, global = true)]
    support_email: String,

    #[arg(long, env = "FMR_SUPPORTURL", default_value = defaults::SUPPORT_URL, global = true)]
    support_url: String,

    #[arg(long, env = "FMR_COLOUR", default_value = defaults::COLOUR, global = true)]
    colour: String,

    /// Path of the properties file.
    #[arg(long, env = "FMR_OUTPUT", default_value = defaults::OUTPUT_PATH, global = true)]
    output: PathBuf,
}

impl Inputs {
    fn into_request(self) -> Result<ProvisioningRequest, ProvisionError> {
        let database = DatabaseCoordinates {
            host: self.db_host,
            port: self.db_port,
            name: self.db_name,
            username: self.db_user,
            password: self.db_password.into(),
        };
        let profile = RegistryProfile {
            name: self.registry_name,
            endpoint: RegistryEndpoint::new(self.registry_protocol, self.registry_host, self.registry_port),
            default_agency: self.default_agency,
            support_email: self.support_email,
            support_url: self.support_url,
            colour: self.colour,
        };
        ProvisioningRequest::new(
            self.admin_username,
            self.admin_password,
            database,
            &profile,
            self.output,
        )
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fmr_init=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "provisioning failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), ProvisionError> {
    let request = cli.inputs.into_request()?;

    match cli.command.unwrap_or(Command::Provision) {
        Command::Provision => {
            let print_config = cli.print_config;
            let outcome = provision::run_with(&request, cli.skip_database, |prepared| {
                if print_config {
                    print!("{}", prepared.document());
                }
            })
            .await?;
            info!(
                path = %request.output_path().display(),
                statements = outcome.statements_applied.unwrap_or(0),
                "provisioning complete"
            );
        }
        Command::Verify => {
            let artifact = PropertiesFile::read(request.output_path())?;
            provision::verify_artifact(&artifact, &request)?;
        }
    }
    Ok(())
}
