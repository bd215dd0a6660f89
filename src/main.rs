//! kin -- command-line front-end for the kin API client.
//!
//! Loads configuration, opens the stored session and runs one command
//! against the API: logging in and out, showing the current user, or sending
//! a raw authenticated request. Payloads are printed as pretty JSON.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use kin_client::config::Config;
use kin_client::{Client, ConsoleSink, RequestDescriptor};

// ---------------------------------------------------------------------------
// CLI argument parsing (minimal, no external crate needed)
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
enum Command {
    Login { username: String, password: String },
    WxLogin { code: String },
    Logout,
    Whoami,
    Get { path: String, query: Vec<(String, String)> },
    Post { path: String, body: Value },
    Put { path: String, body: Value },
    Delete { path: String },
    Config,
}

struct CliArgs {
    config_path: Option<PathBuf>,
    command: Command,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<CliArgs> {
    let mut args = args.into_iter();
    let mut config_path = None;
    let mut rest = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = args.next().context("--config requires a path argument")?;
                config_path = Some(PathBuf::from(path));
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("kin {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            _ => rest.push(arg),
        }
    }

    Ok(CliArgs {
        config_path,
        command: parse_command(rest)?,
    })
}

fn parse_command(args: Vec<String>) -> anyhow::Result<Command> {
    let mut args = args.into_iter();
    let Some(name) = args.next() else {
        bail!("missing command (run with --help for usage)");
    };
    let mut next = |what: &str| args.next().with_context(|| format!("{name}: missing <{what}>"));

    let command = match name.as_str() {
        "login" => Command::Login {
            username: next("username")?,
            password: next("password")?,
        },
        "wx-login" => Command::WxLogin { code: next("code")? },
        "logout" => Command::Logout,
        "whoami" => Command::Whoami,
        "get" => {
            let path = next("path")?;
            let query = args
                .by_ref()
                .map(|pair| match pair.split_once('=') {
                    Some((k, v)) => Ok((k.to_string(), v.to_string())),
                    None => bail!("get: query parameters must look like key=value, got '{pair}'"),
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            Command::Get { path, query }
        }
        "post" | "put" => {
            let path = next("path")?;
            let body = match args.next() {
                Some(raw) => serde_json::from_str(&raw)
                    .with_context(|| format!("{name}: body is not valid JSON"))?,
                None => Value::Object(Default::default()),
            };
            if name == "post" {
                Command::Post { path, body }
            } else {
                Command::Put { path, body }
            }
        }
        "delete" => Command::Delete { path: next("path")? },
        "config" => Command::Config,
        other => bail!("unknown command: {other}"),
    };

    if let Some(extra) = args.next() {
        bail!("{name}: unexpected argument '{extra}'");
    }
    Ok(command)
}

fn print_usage() {
    println!(
        "\
kin {version} -- kin API client

USAGE:
    kin [OPTIONS] <COMMAND>

COMMANDS:
    login <username> <password>   Log in and store the session
    wx-login <code>               Log in with a WeChat authorization code
    logout                        End the session
    whoami                        Show the current user
    get <path> [key=value ...]    Send an authenticated GET
    post <path> [json]            Send an authenticated POST
    put <path> [json]             Send an authenticated PUT
    delete <path>                 Send an authenticated DELETE
    config                        Show effective settings

OPTIONS:
    -c, --config <PATH>    Path to configuration file
    -h, --help             Print this help message
    -V, --version          Print version information

ENVIRONMENT:
    RUST_LOG               Override log level (e.g. RUST_LOG=debug)
    KIN_CONFIG             Alternative to --config flag
    KIN_API_BASE_URL       API base URL
",
        version = env!("CARGO_PKG_VERSION")
    );
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build Tokio runtime")?
        .block_on(async_main())
}

async fn async_main() -> anyhow::Result<()> {
    let cli = parse_args(std::env::args().skip(1))?;

    let config_path = cli
        .config_path
        .or_else(|| std::env::var("KIN_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(Config::default_path);

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    init_tracing(&config);
    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "Starting kin"
    );

    if cli.command == Command::Config {
        print_json(&serde_json::to_value(config.settings())?)?;
        return Ok(());
    }

    let client = Client::builder()
        .config(&config)
        .notice_sink(Arc::new(ConsoleSink))
        .on_login_required(|| eprintln!("Run `kin login <username> <password>` to sign in again."))
        .build()?;

    let result = run(&client, cli.command).await;
    // Let a pending session-ended dialog finish before exiting.
    client.notifier().flush().await;
    result
}

async fn run(client: &Client, command: Command) -> anyhow::Result<()> {
    let output = match command {
        Command::Login { username, password } => {
            let credential = client.login(&username, &password).await?;
            credential.user_info.unwrap_or(Value::Null)
        }
        Command::WxLogin { code } => {
            let credential = client.wx_login(&code).await?;
            credential.user_info.unwrap_or(Value::Null)
        }
        Command::Logout => {
            client.logout().await?;
            eprintln!("Logged out.");
            return Ok(());
        }
        Command::Whoami => {
            if client.credentials().read().is_none() {
                bail!("not logged in");
            }
            client.current_user().await?
        }
        Command::Get { path, query } => {
            let request = query
                .into_iter()
                .fold(RequestDescriptor::get(path), |req, (k, v)| req.with_query(k, v));
            client.send(request).await?
        }
        Command::Post { path, body } => client.post(&path, body).await?,
        Command::Put { path, body } => client.put(&path, body).await?,
        Command::Delete { path } => client.delete(&path).await?,
        Command::Config => unreachable!("handled before the client is built"),
    };
    print_json(&output)
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Tracing initialization
// ---------------------------------------------------------------------------

fn init_tracing(config: &Config) {
    // RUST_LOG env var takes precedence over config file
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.logging.level;
        EnvFilter::new(format!("kin_client={level},kin={level},warn"))
    });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(false)
        .with_line_number(false);

    if config.logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
