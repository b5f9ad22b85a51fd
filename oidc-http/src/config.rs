//! HTTP-surface configuration: bind address plus the shared
//! `oidc_core::config::ServerConfig`.

use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;

#[derive(Parser, Debug)]
#[clap(name = "OIDC authorization server")]
#[clap(about = "OpenID Connect authorization code flow provider and cookie introspection gateway", version, author)]
pub struct Cli {
    #[clap(long, env = "OIDC_LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: SocketAddr,

    #[clap(long, env = "OIDC_DATABASE_URL")]
    pub database_url: Option<String>,

    #[clap(long, env = "OIDC_SWEEP_INTERVAL_SECS", default_value = "60")]
    pub sweep_interval_secs: u64,
}

impl Cli {
    pub fn load() -> Result<Self> {
        let cli = Self::parse();
        if let Some(url) = &cli.database_url {
            anyhow::ensure!(!url.is_empty(), "OIDC_DATABASE_URL must not be empty");
        }
        Ok(cli)
    }
}

pub fn init_tracing() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))
}
