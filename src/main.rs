use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use gp_okta::config::Config;
use gp_okta::credentials::{KeyringStore, SecretStore};
use gp_okta::device::DeviceToken;
use gp_okta::http::HttpSession;
use gp_okta::login::{PasswordSource, resolve_password};
use gp_okta::openconnect::ClientSettings;
use gp_okta::prompt::{Prompter, TerminalPrompter};
use gp_okta::{LoginError, LoginRequest, connect};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "gp-okta")]
#[command(about = "GlobalProtect VPN login through Okta, handed off to OpenConnect")]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// GlobalProtect gateway host
    gateway: Option<String>,

    /// Extra arguments passed to the VPN client (after `--`)
    #[arg(last = true)]
    client_args: Vec<String>,

    /// Okta username
    #[arg(long)]
    username: Option<String>,

    /// Okta password (prefer the keyring or the prompt)
    #[arg(long)]
    password: Option<String>,

    /// Base32 seed for the Okta software TOTP factor
    #[arg(long)]
    totp_key: Option<String>,

    /// Run the VPN client through sudo
    #[arg(long, overrides_with = "no_sudo")]
    sudo: bool,

    /// Do not use sudo, even if the config file says so
    #[arg(long)]
    no_sudo: bool,

    /// Save the password in the OS keyring after a successful login
    #[arg(long)]
    remember_password: bool,

    /// VPN client binary
    #[arg(long)]
    client: Option<String>,

    /// Config file (default: ./gp-okta.toml, then the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate default config file
    Init,
}

fn main() {
    let cli = Cli::parse();

    // Logs go to stderr; stdout belongs to the VPN client
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.verbose {
            "gp_okta=debug,warn"
        } else {
            "gp_okta=info,warn"
        })
    });
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set up logging: {}", e);
    }

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<i32, Box<dyn std::error::Error>> {
    if let Some(Commands::Init) = cli.command {
        info!("Generating default config...");
        let path = Config::default_path();
        Config::default().save(&path)?;
        println!("Created default config: {}", path.display());
        return Ok(0);
    }

    let config = Config::discover(cli.config.as_deref())?;

    let gateway = match resolve_gateway(cli.gateway, config.gateway.clone()) {
        Ok(gateway) => gateway,
        Err(e) => e.exit(),
    };

    let prompter = TerminalPrompter;
    let username = match cli.username.or(config.username.clone()) {
        Some(username) => username,
        None => prompter.username().map_err(LoginError::Prompt)?,
    };

    let store = KeyringStore;
    let (password, source) = resolve_password(cli.password, &store, &prompter, &gateway, &username)?;

    let client = ClientSettings {
        client: cli.client.unwrap_or(config.client.clone()),
        protocol: config.protocol.clone(),
        extra_args: config
            .client_args
            .iter()
            .cloned()
            .chain(cli.client_args)
            .collect(),
        elevate: if cli.sudo {
            true
        } else if cli.no_sudo {
            false
        } else {
            config.sudo
        },
    };

    let request = LoginRequest {
        gateway,
        username,
        password,
        totp_key: cli.totp_key,
        push: config.push.policy(),
    };

    let session = HttpSession::new(DeviceToken::from_machine())?;
    let remember = cli.remember_password && source != PasswordSource::Keyring;

    let code = connect(session, &request, &prompter, &client, |handoff| {
        info!("Logged in as {}, starting {}", handoff.saml_username, client.client);
        if remember {
            match store.set_password(&request.gateway, &request.username, &request.password) {
                Ok(()) => info!("Password saved to keyring"),
                Err(e) => warn!("Could not save password: {}", e),
            }
        }
    })?;

    Ok(code)
}

/// Gateway from the command line, else from the config file
fn resolve_gateway(cli: Option<String>, config: Option<String>) -> Result<String, clap::Error> {
    cli.or(config).ok_or_else(|| {
        Cli::command().error(
            ErrorKind::MissingRequiredArgument,
            "a gateway is required, either as an argument or as `gateway` in the config file",
        )
    })
}
