use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use oidc_core::audit::InMemoryAuditSink;
use oidc_core::client::ClientRegistry;
use oidc_core::config::ServerConfig;
use oidc_core::credentials::CredentialsFacade;
use oidc_core::identity_token::IdentityTokenSigner;
use oidc_core::otp::NoOtpService;
use oidc_core::storage::{InMemorySessionStorage, PostgresSessionStorage, SessionStorage, spawn_sweeper};
use oidc_core::tenant::InMemoryTenantStorage;
use oidc_core::token::{InMemoryTokenStore, TokenStore};

use oidc_http::{AppState, build_router, config};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = config::Cli::load()?;
    config::init_tracing()?;

    let server_config = Arc::new(ServerConfig::from_env().context("loading server configuration")?);
    let clients = Arc::new(ClientRegistry::from_env().context("loading client registry")?);

    let sessions: Arc<dyn SessionStorage> = match &cli.database_url {
        Some(url) => {
            let pool = sqlx::PgPool::connect(url)
                .await
                .context("connecting to the session database")?;
            let storage = PostgresSessionStorage::new(pool);
            storage.run_migrations().await?;
            Arc::new(storage)
        }
        None => Arc::new(InMemorySessionStorage::new()),
    };
    let tokens: Arc<dyn TokenStore> = Arc::new(InMemoryTokenStore::new());

    spawn_sweeper(sessions.clone(), Duration::from_secs(cli.sweep_interval_secs));
    {
        let tokens = tokens.clone();
        let interval = Duration::from_secs(cli.sweep_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match tokens.sweep_expired().await {
                    Ok(n) if n > 0 => tracing::info!(removed = n, "swept expired tokens"),
                    Ok(_) => {}
                    Err(err) => tracing::warn!(error = %err, "token sweep failed"),
                }
            }
        });
    }

    let state = AppState {
        config: server_config,
        sessions,
        tokens,
        clients,
        credentials: Arc::new(CredentialsFacade::new()),
        identity_tokens: Arc::new(IdentityTokenSigner::new()),
        audit: Arc::new(InMemoryAuditSink::new(1000)),
        otp: Arc::new(NoOtpService),
        tenants: Arc::new(InMemoryTenantStorage::new()),
        issuer: std::env::var("OIDC_ISSUER").unwrap_or_else(|_| format!("http://{}", cli.listen_addr)),
    };

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(cli.listen_addr).await?;
    tracing::info!(addr = %cli.listen_addr, "oidc-http-srv listening");
    axum::serve(listener, app).await?;
    Ok(())
}
