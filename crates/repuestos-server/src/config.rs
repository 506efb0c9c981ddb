//! Command-line and environment configuration for the server binary.
//!
//! | Option | Env | Default |
//! |--------|-----|---------|
//! | `--host` | `REPUESTOS_HOST` | `127.0.0.1` |
//! | `--port` | `REPUESTOS_PORT` | `8080` |
//! | `--cooldown-secs` | `REPUESTOS_COOLDOWN_SECS` | `30` |
//! | `--cache-ttl-secs` | `REPUESTOS_CACHE_TTL_SECS` | `3600` |
//! | `--store-path` | `REPUESTOS_STORE_PATH` | unset (local cache only) |
//! | `--store-ttl-days` | `REPUESTOS_STORE_TTL_DAYS` | `7` |
//! | `--generative-model` | `REPUESTOS_GENERATIVE_MODEL` | `gemini-2.0-flash` |
//! | `--no-grounding` | | `false` |
//! | `--no-synthetic-fallback` | | `false` |
//! | `--debug` | | `false` |
//!
//! Provider credentials are not flags; they are read from the environment by
//! [`SourceRegistryBuilder::with_env`].

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use repuestos_core::adapters::generative::DEFAULT_MODEL;
use repuestos_core::{CacheConfig, CooldownRegistry, SearchCache, SearchService, SourceRegistryBuilder};
use repuestos_store::{SearchStore, StoreConfig};
use tracing::info;

use crate::error::ServerError;
use crate::AppState;

/// Auto-parts price comparison API.
#[derive(Debug, Clone, Parser)]
#[command(name = "repuestos", version, about = "Auto-parts price comparison API")]
pub struct Args {
    /// Address to bind.
    #[arg(long, env = "REPUESTOS_HOST", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub host: IpAddr,

    #[arg(long, env = "REPUESTOS_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Minimum seconds between live searches from one client.
    #[arg(long, env = "REPUESTOS_COOLDOWN_SECS", default_value_t = 30)]
    pub cooldown_secs: u64,

    /// Lifetime of in-memory cache entries.
    #[arg(long, env = "REPUESTOS_CACHE_TTL_SECS", default_value_t = 3600)]
    pub cache_ttl_secs: u64,

    /// DuckDB file for the shared cache tier. Without it only the in-memory tier is used.
    #[arg(long, env = "REPUESTOS_STORE_PATH")]
    pub store_path: Option<PathBuf>,

    #[arg(long, env = "REPUESTOS_STORE_TTL_DAYS", default_value_t = 7)]
    pub store_ttl_days: u64,

    #[arg(long, env = "REPUESTOS_GENERATIVE_MODEL", default_value = DEFAULT_MODEL)]
    pub generative_model: String,

    /// Disable the web-search tool on generative requests.
    #[arg(long)]
    pub no_grounding: bool,

    /// Answer total failures with an empty list instead of approximate prices.
    #[arg(long)]
    pub no_synthetic_fallback: bool,

    /// Default log level `debug` instead of `info` when `RUST_LOG` is unset.
    #[arg(long)]
    pub debug: bool,
}

impl Args {
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub const fn default_log_filter(&self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "info"
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            local_ttl: Duration::from_secs(self.cache_ttl_secs),
            shared_ttl: Duration::from_secs(self.store_ttl_days.saturating_mul(24 * 60 * 60)),
        }
    }

    /// Wires sources, cache tiers and cooldown into the handler state.
    ///
    /// # Errors
    /// Fails when the shared store cannot be opened.
    pub fn build_state(&self) -> Result<AppState, ServerError> {
        let aggregator = SourceRegistryBuilder::new()
            .with_env()
            .with_generative_model(&self.generative_model)
            .with_grounding(!self.no_grounding)
            .with_synthetic_fallback(!self.no_synthetic_fallback)
            .build();

        let mut cache = SearchCache::new(self.cache_config());
        if let Some(path) = &self.store_path {
            let store = SearchStore::open(&StoreConfig::new(path))?;
            info!(path = %path.display(), "shared cache tier enabled");
            cache = cache.with_shared(store);
        }

        let cooldown = CooldownRegistry::new(Duration::from_secs(self.cooldown_secs));
        Ok(AppState::new(SearchService::new(aggregator, cache, cooldown)))
    }
}
