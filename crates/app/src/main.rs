mod shell;

use std::fmt;
use std::sync::Arc;

use crosspoint_core::Clock;
use services::quiz::load_quiz_bank;
use services::{
    AppConfig, FatalError, IdentityProvider, LocalIdentityProvider, RestIdentityProvider,
    SessionController,
};
use storage::Storage;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

#[derive(Debug, Default)]
struct Args {
    db_url: Option<String>,
    token: Option<String>,
    offline: bool,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut parsed = Self::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = Some(normalize_sqlite_url(value));
                }
                "--token" => parsed.token = Some(require_value(args, "--token")?),
                "--offline" => parsed.offline = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }
        Ok(parsed)
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- [--db <sqlite_url>] [--token <sign_in_token>] [--offline]");
    eprintln!();
    eprintln!("  --offline  sign in with a local anonymous identity instead of the hosted provider");
    eprintln!();
    eprintln!("Environment (also read from .env):");
    eprintln!("  CROSSPOINT_API_KEY, CROSSPOINT_AUTH_DOMAIN, CROSSPOINT_PROJECT_ID,");
    eprintln!("  CROSSPOINT_STORAGE_BUCKET, CROSSPOINT_MESSAGING_SENDER_ID, CROSSPOINT_APP_ID");
    eprintln!("  CROSSPOINT_NAMESPACE, CROSSPOINT_AUTH_TOKEN, CROSSPOINT_DB_URL, CROSSPOINT_QUIZ_BANK,");
    eprintln!("  CROSSPOINT_PASSING_THRESHOLD, CROSSPOINT_REVEAL_DELAY_MS, CROSSPOINT_FEED_LIMIT, RUST_LOG");
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }
    let trimmed = raw.trim();
    let path_str = trimmed.strip_prefix("sqlite:").unwrap_or(trimmed);
    let path = std::path::Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }
    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }
    Ok(())
}

fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);
    let args = Args::parse(&mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let config = AppConfig::from_env();
    init_tracing(
        config
            .as_ref()
            .map_or("info", |config| config.log_filter.as_str()),
    );
    let config = match config {
        Ok(config) => config,
        Err(err) => {
            let fatal = FatalError::Config(err);
            tracing::error!(error = %fatal, "startup blocked");
            shell::print_fatal(&fatal.user_message());
            return Err(fatal.into());
        }
    };
    tracing::debug!(?config, "configuration resolved");

    let bank = Arc::new(load_quiz_bank(config.quiz_bank_path.as_deref())?);
    let db_url = args.db_url.clone().unwrap_or_else(|| config.db_url.clone());
    prepare_sqlite_file(&db_url)?;
    let clock = Clock::system();
    let storage = Storage::sqlite(&db_url, config.namespace.clone(), clock).await?;
    tracing::info!(namespace = %config.namespace, "storage ready");

    let identity: Arc<dyn IdentityProvider> = if args.offline {
        Arc::new(LocalIdentityProvider::new())
    } else {
        Arc::new(RestIdentityProvider::from_config(&config))
    };
    let controller = SessionController::from_config(&config, identity, &storage, bank, clock);

    let token = args.token.or_else(|| config.initial_token.clone());
    if controller.bootstrap(token.as_deref()).await.is_err() {
        shell::print_screen(&controller.render());
        return Err("sign-in failed".into());
    }

    shell::run(&controller).await?;
    controller.shutdown();
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
