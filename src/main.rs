use anyhow::Result;
use chatvault_auth::{HttpRefresher, ManagerSettings, TokenManager, install};
use chatvault_cache::{InMemoryCache, RedisCache};
use chatvault_config::{CacheBackend, Config, LogConfig, LogFormat};
use chatvault_store::SqliteCredentialStore;
use chatvault_types::{Cache, CredentialRecord, WorkspaceId};
use clap::{Parser, Subcommand};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _};

#[derive(Parser, Debug)]
#[command(name = "chatvault", about = "chatvault — workspace credential lifecycle")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// SQLite database path (default: ~/.chatvault/credentials.db).
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print a valid access token for a workspace, refreshing it if needed.
    Token {
        /// Workspace (team) id.
        workspace: WorkspaceId,
    },
    /// Show the stored credential status of a workspace.
    Status {
        /// Workspace (team) id.
        workspace: WorkspaceId,
    },
    /// Exchange an OAuth authorization code and store the workspace credential.
    Install {
        /// Authorization code received on the redirect.
        #[arg(long)]
        code: String,
        /// Redirect URI used in the authorization request, if any.
        #[arg(long)]
        redirect_uri: Option<String>,
    },
    /// Store a credential record read from a JSON file.
    Import {
        /// Path to the credential record JSON.
        file: PathBuf,
    },
    /// Remove the stored credential of a workspace.
    Revoke {
        /// Workspace (team) id.
        workspace: WorkspaceId,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config =
        Config::load(cli.config.as_deref()).map_err(|e| anyhow::anyhow!("config error: {e}"))?;
    if let Some(db) = cli.db {
        config.store.database = Some(db);
    }
    init_logging(&config.log);

    match cli.command {
        Commands::Token { workspace } => cmd_token(&config, &workspace).await,
        Commands::Status { workspace } => cmd_status(&config, &workspace).await,
        Commands::Install { code, redirect_uri } => {
            cmd_install(&config, &code, redirect_uri.as_deref()).await
        }
        Commands::Import { file } => cmd_import(&config, file).await,
        Commands::Revoke { workspace } => cmd_revoke(&config, &workspace).await,
    }
}

async fn cmd_token(config: &Config, workspace: &WorkspaceId) -> Result<()> {
    let (client_id, client_secret) = client_credentials(config)?;
    let manager = build_manager(config, &token_endpoint(config)?).await?;
    let token = manager
        .get_valid_access_token(workspace, client_id, client_secret)
        .await
        .map_err(|e| {
            if e.needs_reauthorization() {
                anyhow::anyhow!("{e}; reinstall the app in this workspace")
            } else {
                anyhow::anyhow!(e)
            }
        })?;
    println!("{token}");
    Ok(())
}

async fn cmd_status(config: &Config, workspace: &WorkspaceId) -> Result<()> {
    let manager = build_manager(config, &token_endpoint(config)?).await?;
    let status = manager.status(workspace).await?;
    let cached = if manager.is_cached(workspace).await {
        " (cached)"
    } else {
        ""
    };
    println!("{workspace}: {status}{cached}");
    Ok(())
}

async fn cmd_install(config: &Config, code: &str, redirect_uri: Option<&str>) -> Result<()> {
    let (client_id, client_secret) = client_credentials(config)?;
    let endpoint = token_endpoint(config)?;
    let manager = build_manager(config, &endpoint).await?;
    let record = install::complete_installation(
        &manager,
        &endpoint,
        code,
        redirect_uri,
        client_id,
        client_secret,
    )
    .await
    .map_err(|e| anyhow::anyhow!("install failed: {e}"))?;

    let name = record.workspace_name.as_deref().unwrap_or("unnamed");
    eprintln!("installed into {} ({name})", record.workspace_id);
    Ok(())
}

async fn cmd_import(config: &Config, file: PathBuf) -> Result<()> {
    let raw = tokio::fs::read_to_string(&file)
        .await
        .map_err(|e| anyhow::anyhow!("cannot read {}: {e}", file.display()))?;
    let record: CredentialRecord = serde_json::from_str(&raw)?;
    let manager = build_manager(config, &token_endpoint(config)?).await?;
    manager.save_installation(&record).await?;
    eprintln!("imported credential for {}", record.workspace_id);
    Ok(())
}

async fn cmd_revoke(config: &Config, workspace: &WorkspaceId) -> Result<()> {
    let manager = build_manager(config, &token_endpoint(config)?).await?;
    manager.delete_record(workspace).await?;
    eprintln!("{workspace} revoked");
    Ok(())
}

fn client_credentials(config: &Config) -> Result<(&str, &str)> {
    let id = config.oauth.client_id.as_deref().ok_or_else(|| {
        anyhow::anyhow!("oauth.client_id is not set (or CHATVAULT_OAUTH__CLIENT_ID)")
    })?;
    let secret = config.oauth.client_secret.as_deref().ok_or_else(|| {
        anyhow::anyhow!("oauth.client_secret is not set (or CHATVAULT_OAUTH__CLIENT_SECRET)")
    })?;
    Ok((id, secret))
}

fn token_endpoint(config: &Config) -> Result<HttpRefresher> {
    let timeout = Duration::from_secs(config.lifecycle.refresh_timeout_secs);
    Ok(HttpRefresher::with_timeout(
        config.oauth.token_url.clone(),
        timeout,
    )?)
}

async fn build_manager(config: &Config, endpoint: &HttpRefresher) -> Result<TokenManager> {
    let cache: Arc<dyn Cache> = match config.cache.backend {
        CacheBackend::Memory => Arc::new(InMemoryCache::new()),
        CacheBackend::Redis => Arc::new(
            RedisCache::connect(&config.cache.redis_url, config.cache.key_prefix.clone()).await?,
        ),
    };
    let store = open_store(config).await?;
    Ok(TokenManager::new(
        cache,
        Arc::new(store),
        Arc::new(endpoint.clone()),
        ManagerSettings::from(&config.lifecycle),
    ))
}

async fn open_store(config: &Config) -> Result<SqliteCredentialStore> {
    let path = config.store.database_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let url = format!("sqlite://{}", path.display());
    SqliteCredentialStore::new(&url)
        .await
        .map_err(|e| anyhow::anyhow!("database error: {e}"))
}

/// Install the global subscriber. `RUST_LOG` takes precedence over `log.level`.
fn init_logging(cfg: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match cfg.format {
        LogFormat::Json => {
            let layer = fmt::layer()
                .json()
                .flatten_event(true)
                .with_ansi(false)
                .with_writer(std::io::stderr);
            let _ = registry.with(layer).try_init();
        }
        LogFormat::Compact => {
            let layer = fmt::layer().compact().with_writer(std::io::stderr);
            let _ = registry.with(layer).try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["chatvault", "token", "T1", "--db", "/tmp/x.db"]).unwrap();
        assert_eq!(cli.db.as_deref(), Some(std::path::Path::new("/tmp/x.db")));
        match cli.command {
            Commands::Token { workspace } => assert_eq!(workspace.as_str(), "T1"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_blank_workspace_rejected() {
        assert!(Cli::try_parse_from(["chatvault", "status", "  "]).is_err());
    }

    #[test]
    fn test_missing_client_credentials() {
        let err = client_credentials(&Config::default()).unwrap_err();
        assert!(err.to_string().contains("client_id"));
    }
}
