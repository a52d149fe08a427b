//! happy-keys: account key management for happy
//!
//! Commands:
//!   pair                - pair this device by showing a code to an authenticated device
//!   approve <code>      - approve another device's pairing code from this device
//!   refresh             - exchange a signed challenge for a fresh token
//!   status              - show pairing state and account key fingerprints
//!   backup              - print the master secret as a transcribable backup key
//!   restore             - sign in from a backup key
//!   logout              - remove stored credentials and pairing keypairs
//!   config show         - print the active configuration

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use happy_auth::{
    approve_connection, open_store, parse_pairing_code, reauthenticate, refresh_token,
    CredentialStore, HyperHttpClient, PairingClient, PairingCodeKind, RelayClient, SecureStore,
};
use happy_core::config::HappyConfig;
use happy_core::{now_millis, AuthCredentials, HappyError};
use happy_crypto::encoding::to_base64;
use happy_crypto::{format_secret_key_for_backup, parse_backup_secret_key, MasterSecret};
use happy_sync::AccountContext;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "happy-keys",
    version,
    about = "happy account keys and device pairing",
    long_about = "happy-keys: pair devices, approve new devices, refresh tokens and back up the account secret"
)]
struct Cli {
    /// Path to happy.toml configuration file
    #[arg(long, short = 'c', env = "HAPPY_CONFIG")]
    config: Option<PathBuf>,

    /// Relay API base URL (overrides config)
    #[arg(long, env = "HAPPY_SERVER_URL")]
    server: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "HAPPY_LOG")]
    log: Option<String>,

    /// Log format (json, text)
    #[arg(long, env = "HAPPY_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Pair this device: show a code, wait for another device to approve it
    Pair {
        /// Storage id for the ephemeral pairing keypair (reused to resume)
        #[arg(long, default_value = "pairing")]
        id: String,
        /// Kind of code to display
        #[arg(long, value_enum, default_value = "terminal")]
        code: CodeKind,
        /// Give up after this many seconds (default: wait until Ctrl-C)
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Approve another device's pairing code using this device's credentials
    Approve {
        /// The scanned code (happy://terminal?..., happy:///account?... or web URL)
        code: String,
    },

    /// Refresh the bearer token with a signed challenge
    Refresh,

    /// Show pairing state and account key fingerprints
    Status,

    /// Print the master secret as a backup key
    Backup,

    /// Sign in on this device from a backup key
    Restore {
        /// Backup key; prompted for without echo when omitted
        #[arg(long, env = "HAPPY_BACKUP_KEY", hide_env_values = true)]
        key: Option<String>,
    },

    /// Remove stored credentials and pairing keypairs
    Logout,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CodeKind {
    Terminal,
    Web,
    Account,
}

impl From<CodeKind> for PairingCodeKind {
    fn from(kind: CodeKind) -> Self {
        match kind {
            CodeKind::Terminal => PairingCodeKind::Terminal,
            CodeKind::Web => PairingCodeKind::WebConnect,
            CodeKind::Account => PairingCodeKind::Account,
        }
    }
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

// ── Entry point ────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => HappyConfig::load(path)?,
        None => HappyConfig::default(),
    };
    if let Some(url) = &cli.server {
        config.server.url = url.clone();
    }

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli.log_format.clone().unwrap_or(match config.log.format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(&level, &format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        server = %config.server.url,
        "happy-keys starting"
    );

    let store = CredentialStore::new(open_store(config.storage.backend, &config.storage.service));
    let relay = RelayClient::new(Arc::new(HyperHttpClient::new(&config.server.url)));

    match cli.command {
        Commands::Pair { id, code, timeout } => {
            cmd_pair(&config, relay, store, &id, code.into(), timeout).await
        }
        Commands::Approve { code } => cmd_approve(&relay, &store, &code).await,
        Commands::Refresh => cmd_refresh(&config, &relay, &store).await,
        Commands::Status => cmd_status(&config, &store).await,
        Commands::Backup => cmd_backup(&store).await,
        Commands::Restore { key } => cmd_restore(&config, &relay, &store, key).await,
        Commands::Logout => {
            store.logout().await.map_err(HappyError::from)?;
            println!("Signed out; credentials removed.");
            Ok(())
        }
        Commands::Config {
            action: ConfigAction::Show,
        } => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Commands ───────────────────────────────────────────────────────────────────

async fn cmd_pair<S: SecureStore>(
    config: &HappyConfig,
    relay: RelayClient,
    store: CredentialStore<S>,
    id: &str,
    kind: PairingCodeKind,
    timeout: Option<u64>,
) -> Result<()> {
    if let Some(existing) = store.load_credentials().await.map_err(HappyError::from)? {
        if !existing.is_expired(now_millis()) {
            println!("This device is already paired. Run `happy-keys logout` first to re-pair.");
            return Ok(());
        }
    }

    let pairing = PairingClient::new(relay, store, &config.pairing);
    let session = pairing.start(id, kind).await.map_err(HappyError::from)?;

    println!("Scan or paste this code on a device that is already signed in:\n");
    println!("  {}\n", session.qr_data());

    let cancelled = Arc::new(AtomicBool::new(false));
    {
        let cancelled = Arc::clone(&cancelled);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancelled.store(true, Ordering::SeqCst);
            }
        });
    }
    let deadline = timeout.map(|secs| Instant::now() + Duration::from_secs(secs));

    let pb = spinner("pair");
    pb.set_message("waiting for approval (Ctrl-C to cancel)");
    let result = pairing
        .wait_for_authentication(&session, || {
            cancelled.load(Ordering::SeqCst) || deadline.is_some_and(|d| Instant::now() >= d)
        })
        .await;
    pb.finish_and_clear();

    match result.map_err(HappyError::from)? {
        Some(credentials) => {
            let secret = MasterSecret::from_base64(&credentials.secret)?;
            println!("Paired. Account id: {}", AccountContext::new(secret, &config.cache).manager().anon_id());
            Ok(())
        }
        None if cancelled.load(Ordering::SeqCst) => {
            println!("Cancelled. Run `happy-keys pair` again to resume with the same code.");
            Ok(())
        }
        None if deadline.is_some_and(|d| Instant::now() >= d) => {
            anyhow::bail!("timed out waiting for approval")
        }
        None => anyhow::bail!("approval response could not be decrypted; start pairing again"),
    }
}

async fn cmd_approve<S: SecureStore>(
    relay: &RelayClient,
    store: &CredentialStore<S>,
    code: &str,
) -> Result<()> {
    let credentials = require_credentials(store).await?;
    let (public_key, kind) = parse_pairing_code(code).map_err(HappyError::from)?;
    info!(?kind, "approving pairing code");

    approve_connection(relay, &credentials.token, &public_key, &credentials.secret)
        .await
        .map_err(HappyError::from)?;
    println!("Approved. The other device will finish pairing shortly.");
    Ok(())
}

async fn cmd_refresh<S: SecureStore>(
    config: &HappyConfig,
    relay: &RelayClient,
    store: &CredentialStore<S>,
) -> Result<()> {
    match reauthenticate(relay, store, config.pairing.token_ttl())
        .await
        .map_err(HappyError::from)?
    {
        Some(credentials) => {
            println!("Token refreshed; expires at {} (epoch ms).", credentials.expires_at);
            Ok(())
        }
        None => anyhow::bail!("token refresh failed; sign in again with `happy-keys pair` or `restore`"),
    }
}

async fn cmd_status<S: SecureStore>(config: &HappyConfig, store: &CredentialStore<S>) -> Result<()> {
    println!("server:  {}", config.server.url);
    println!("storage: {:?} ({})", config.storage.backend, config.storage.service);

    let Some(credentials) = store.load_credentials().await.map_err(HappyError::from)? else {
        println!("paired:  no");
        return Ok(());
    };

    let secret = MasterSecret::from_base64(&credentials.secret)?;
    let account = AccountContext::new(secret, &config.cache);
    let expired = credentials.is_expired(now_millis());

    println!("paired:  yes");
    println!("account: {}", account.manager().anon_id());
    println!("content key: {}", to_base64(&account.manager().content_public_key()));
    println!(
        "token:   {} (expires at {} epoch ms)",
        if expired { "expired" } else { "valid" },
        credentials.expires_at
    );
    Ok(())
}

async fn cmd_backup<S: SecureStore>(store: &CredentialStore<S>) -> Result<()> {
    let credentials = require_credentials(store).await?;
    let secret = MasterSecret::from_base64(&credentials.secret)?;
    println!("Write this key down and keep it somewhere safe:\n");
    println!("  {}", format_secret_key_for_backup(secret.as_bytes()));
    Ok(())
}

async fn cmd_restore<S: SecureStore>(
    config: &HappyConfig,
    relay: &RelayClient,
    store: &CredentialStore<S>,
    key: Option<String>,
) -> Result<()> {
    let input = match key {
        Some(key) => key,
        None => rpassword::prompt_password("Backup key: ").context("reading backup key")?,
    };
    let secret = MasterSecret::from_bytes(parse_backup_secret_key(&input)?);

    let token = refresh_token(relay, &secret)
        .await
        .context("the relay did not accept this backup key")?;
    let credentials =
        AuthCredentials::issued(token, secret.to_base64(), now_millis(), config.pairing.token_ttl());
    store
        .save_credentials(&credentials)
        .await
        .map_err(HappyError::from)?;

    println!(
        "Restored. Account id: {}",
        AccountContext::new(secret, &config.cache).manager().anon_id()
    );
    Ok(())
}

async fn require_credentials<S: SecureStore>(store: &CredentialStore<S>) -> Result<AuthCredentials> {
    store
        .load_credentials()
        .await
        .map_err(HappyError::from)?
        .context("this device is not paired; run `happy-keys pair` or `happy-keys restore`")
}

fn spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}") {
        pb.set_style(style);
    }
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}
