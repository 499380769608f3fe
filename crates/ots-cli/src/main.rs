//! ots: share one-time secrets from the terminal
//!
//! Commands:
//!   new [-e DURATION] [--cipher C] [--stdin]  - encrypt a secret, print its link
//!   view <URL>                                - reveal (and burn) a secret
//!   config show                               - display current configuration

mod duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use secrecy::{ExposeSecret, SecretString};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use ots_backend::HttpBackend;
use ots_core::config::{default_config_path, OtsConfig};
use ots_core::CipherKind;
use ots_crypto::ShareLink;
use ots_lifecycle::SecretClient;

use crate::duration::{format_duration, parse_duration};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "ots",
    version,
    about = "Share end-to-end encrypted one-time secrets",
    long_about = "ots: encrypt a secret locally, store only the ciphertext, and share a link \
                  that carries the key in its fragment. The server never sees the key."
)]
struct Cli {
    /// Path to config.toml (default: ~/.config/ots/config.toml)
    #[arg(long, short = 'c', env = "OTS_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log level or filter directive (overrides [logging].level; RUST_LOG wins)
    #[arg(long, env = "OTS_LOG", global = true)]
    log: Option<String>,

    /// Log output format (overrides [logging].format)
    #[arg(long, env = "OTS_LOG_FORMAT", global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create end-to-end encrypted secret
    ///
    /// The secret is stored encrypted for a duration from 5 minutes to 7 days
    /// (default 24 hours). It is deleted from the server upon retrieval, so
    /// the link works exactly once.
    New {
        /// How long the secret stays retrievable, e.g. 24h0m0s, 90m, 30s
        #[arg(long, short = 'e', value_parser = parse_duration)]
        expiration: Option<Duration>,

        /// AEAD cipher: chachapoly or aes256gcm
        #[arg(long, value_parser = parse_cipher)]
        cipher: Option<CipherKind>,

        /// Read the secret from stdin instead of a hidden prompt
        #[arg(long)]
        stdin: bool,
    },

    /// Reveal a secret from its link. This consumes it.
    View {
        /// Link produced by `ots new`
        url: String,
    },

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

fn parse_cipher(s: &str) -> Result<CipherKind, String> {
    s.parse().map_err(|_| {
        let known: Vec<&str> = CipherKind::ALL.iter().map(|c| c.as_str()).collect();
        format!("unknown cipher {s:?} (expected one of: {})", known.join(", "))
    })
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = OtsConfig::load(&config_path)
        .with_context(|| format!("loading config: {}", config_path.display()))?;

    let level = cli.log.as_deref().unwrap_or(&config.logging.level);
    let format = match cli.log_format {
        Some(format) => format,
        None => LogFormat::from_str(&config.logging.format, true)
            .map_err(|e| anyhow::anyhow!("logging.format: {e}"))?,
    };
    init_logging(level, format);
    tracing::debug!(config = %config_path.display(), "ots starting");

    match cli.command {
        Commands::New {
            expiration,
            cipher,
            stdin,
        } => cmd_new(&config, expiration, cipher, stdin).await,
        Commands::View { url } => cmd_view(&config, &url).await,
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &config_path),
    }
}

/// Install the tracing subscriber. Output goes to stderr so stdout carries
/// only the link or the revealed secret.
fn init_logging(level: &str, format: LogFormat) {
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

fn build_client(config: &OtsConfig) -> Result<SecretClient<HttpBackend>> {
    let backend = HttpBackend::from_config(&config.backend).context("configuring backend")?;
    SecretClient::from_config(backend, config).context("configuring client")
}

// ── `ots new` ─────────────────────────────────────────────────────────────────

async fn cmd_new(
    config: &OtsConfig,
    expiration: Option<Duration>,
    cipher: Option<CipherKind>,
    from_stdin: bool,
) -> Result<()> {
    let client = build_client(config)?;
    let ttl = expiration.unwrap_or_else(|| config.lifecycle.default_ttl());
    let cipher = cipher.unwrap_or(config.lifecycle.default_cipher);

    // Fail on a bad expiration before asking for the secret.
    client.validate_ttl(ttl).context("invalid --expiration")?;

    let secret = read_secret(from_stdin)?;
    if secret.expose_secret().is_empty() {
        anyhow::bail!("refusing to share an empty secret");
    }

    let link = client
        .share(secret.expose_secret().as_bytes(), ttl, cipher)
        .await
        .context("sharing secret")?;

    println!("{}", link.as_str());
    eprintln!(
        "Link expires in {} and can be opened once.",
        format_duration(ttl)
    );
    Ok(())
}

fn read_secret(from_stdin: bool) -> Result<SecretString> {
    let raw = if from_stdin {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading secret from stdin")?;
        strip_line_ending(&mut buf);
        buf
    } else {
        rpassword::prompt_password("Secret: ").context("reading secret from terminal")?
    };
    Ok(SecretString::from(raw))
}

/// Drop one trailing newline, as left by `echo` or a heredoc.
fn strip_line_ending(buf: &mut String) {
    if buf.ends_with('\n') {
        buf.pop();
        if buf.ends_with('\r') {
            buf.pop();
        }
    }
}

// ── `ots view` ────────────────────────────────────────────────────────────────

async fn cmd_view(config: &OtsConfig, url: &str) -> Result<()> {
    let client = build_client(config)?;
    let link = ShareLink::from(url);

    let plaintext = client.reveal(&link).await.map_err(|e| {
        let hint = if e.is_lifecycle_outcome() {
            "the link was already used, has expired, or never existed"
        } else if e.is_integrity_failure() {
            "the stored secret failed authentication; do not trust its source"
        } else if e.is_retryable() {
            "the backend could not be reached; the secret may already be consumed"
        } else {
            "revealing secret"
        };
        anyhow::Error::new(e).context(hint)
    })?;

    let mut out = std::io::stdout().lock();
    out.write_all(&plaintext).context("writing secret")?;
    if !plaintext.ends_with(b"\n") {
        out.write_all(b"\n").context("writing secret")?;
    }
    out.flush().context("writing secret")?;
    Ok(())
}

// ── `ots config show` ─────────────────────────────────────────────────────────

fn cmd_config_show(config: &OtsConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
