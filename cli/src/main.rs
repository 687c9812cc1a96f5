use std::{
    env, fs, io,
    path::{Path, PathBuf},
    process,
    sync::Arc,
};

use rate_engine_core::{
    config::{ConfigError, PricingConfig},
    import::{self, FeedRow, ImportError, RateImporter},
    models::{AuthContext, CostLedger, Role, ShipmentRequest, ValidationError},
    pricing::{BestPriceSelector, QuoteEngine, QuoteError},
    store::{RateTableStore, StoreError, TracingAuditSink},
    sync::{LockError, SqliteLockStore, SyncLockKey},
};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: rate-engine [--config <file>] <command>

commands:
  import <tenant> <role> <source> <feed.json> [--dry-run]
  quote <tenant> <role> <request.json>
  lock-status <tenant> <source>";

const LOG_ENV: &str = "RATE_ENGINE_LOG";

fn main() {
    init_logging();
    if let Err(err) = run() {
        eprintln!("rate-engine failed: {err}");
        process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[derive(Debug, Error)]
enum AppError {
    #[error("{}", USAGE)]
    Usage,
    #[error("unknown role {0:?}")]
    Role(String),
    #[error("cannot read {path}: {source}")]
    Read { path: String, source: io::Error },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("failed to start async runtime: {0}")]
    Runtime(io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error(transparent)]
    Quote(#[from] QuoteError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("cannot render output: {0}")]
    Output(serde_json::Error),
}

enum Command {
    Import {
        auth: AuthContext,
        source: String,
        feed: PathBuf,
        dry_run: bool,
    },
    Quote {
        auth: AuthContext,
        request: PathBuf,
    },
    LockStatus {
        tenant: String,
        source: String,
    },
}

fn run() -> Result<(), AppError> {
    let mut args: Vec<String> = env::args().skip(1).collect();
    let config = match take_flag_value(&mut args, "--config")? {
        Some(path) => PricingConfig::from_json_file(Path::new(&path))?,
        None => PricingConfig::default(),
    };

    match parse_command(args)? {
        Command::Import {
            auth,
            source,
            feed,
            dry_run,
        } => run_import(&config, &auth, &source, &feed, dry_run),
        Command::Quote { auth, request } => run_quote(config, &auth, &request),
        Command::LockStatus { tenant, source } => run_lock_status(&config, &tenant, &source),
    }
}

fn take_flag_value(args: &mut Vec<String>, flag: &str) -> Result<Option<String>, AppError> {
    let Some(pos) = args.iter().position(|arg| arg == flag) else {
        return Ok(None);
    };
    if pos + 1 >= args.len() {
        return Err(AppError::Usage);
    }
    let value = args.remove(pos + 1);
    args.remove(pos);
    Ok(Some(value))
}

fn parse_command(mut args: Vec<String>) -> Result<Command, AppError> {
    let dry_run = match args.iter().position(|arg| arg == "--dry-run") {
        Some(pos) => {
            args.remove(pos);
            true
        }
        None => false,
    };
    let mut args = args.into_iter();
    let command = args.next().ok_or(AppError::Usage)?;
    let rest: Vec<String> = args.collect();

    match (command.as_str(), rest.as_slice()) {
        ("import", [tenant, role, source, feed]) => Ok(Command::Import {
            auth: AuthContext::new(tenant.as_str(), parse_role(role)?),
            source: source.clone(),
            feed: PathBuf::from(feed),
            dry_run,
        }),
        ("quote", [tenant, role, request]) if !dry_run => Ok(Command::Quote {
            auth: AuthContext::new(tenant.as_str(), parse_role(role)?),
            request: PathBuf::from(request),
        }),
        ("lock-status", [tenant, source]) if !dry_run => Ok(Command::LockStatus {
            tenant: tenant.clone(),
            source: source.clone(),
        }),
        _ => Err(AppError::Usage),
    }
}

fn parse_role(raw: &str) -> Result<Role, AppError> {
    serde_json::from_value(serde_json::Value::String(raw.to_ascii_lowercase()))
        .map_err(|_| AppError::Role(raw.to_string()))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, AppError> {
    let raw = fs::read_to_string(path).map_err(|source| AppError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| AppError::Parse {
        path: path.display().to_string(),
        source,
    })
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value).map_err(AppError::Output)?;
    println!("{rendered}");
    Ok(())
}

/// Load the persisted store, or start empty when no snapshot exists yet
fn open_store(config: &PricingConfig) -> Result<RateTableStore, AppError> {
    let path = &config.store_snapshot_path;
    if path.exists() {
        Ok(RateTableStore::load_snapshot(path, Arc::new(TracingAuditSink))?)
    } else {
        tracing::info!(path = %path.display(), "no store snapshot found; starting empty");
        Ok(RateTableStore::new())
    }
}

fn run_import(
    config: &PricingConfig,
    auth: &AuthContext,
    source: &str,
    feed: &Path,
    dry_run: bool,
) -> Result<(), AppError> {
    let rows: Vec<FeedRow> = read_json(feed)?;
    if dry_run {
        let counts = import::preview(&rows)?;
        return print_json(&counts);
    }

    // the snapshot is loaded and saved while the import lock is held
    let locks = Arc::new(SqliteLockStore::open(&config.lock_db_path)?);
    let importer = RateImporter::for_snapshot(
        config.store_snapshot_path.clone(),
        Arc::new(TracingAuditSink),
        locks,
        config.clone(),
    );
    let report = importer.import(auth, source, &rows)?;
    print_json(&report)
}

fn run_quote(config: PricingConfig, auth: &AuthContext, request: &Path) -> Result<(), AppError> {
    let request: ShipmentRequest = read_json(request)?;
    let store = Arc::new(open_store(&config)?);
    let engine = Arc::new(QuoteEngine::new(store, Arc::new(CostLedger::new()), config));
    let selector = BestPriceSelector::new(engine);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(AppError::Runtime)?;
    let quote = runtime.block_on(selector.select_best_price(auth, &request))?;
    print_json(&quote.view())
}

fn run_lock_status(config: &PricingConfig, tenant: &str, source: &str) -> Result<(), AppError> {
    let locks = SqliteLockStore::open(&config.lock_db_path)?;
    let key = SyncLockKey::rate_import(tenant, source);
    match locks.status(&key)? {
        Some(record) => print_json(&record),
        None => {
            println!("{key}: never acquired");
            Ok(())
        }
    }
}
