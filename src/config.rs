//! Ambient configuration (§2 AMBIENT STACK). `EngineConfig` is loaded via
//! the `config` crate's builder layered over `dotenvy`-sourced environment
//! variables — the same two crates the teacher's `Cargo.toml` carries for
//! its `AppConfig`, loaded once at bootstrap the way the teacher's
//! `main.rs` loads `AppConfig::load()`.

use serde::Deserialize;

/// Knobs for the broadcast channel backing `EventBus` subscribers and the
/// `tracing` filter installed by `init_tracing`. §6 enumerates the only
/// per-orderbook configuration surface this engine has (`createOrderbook`'s
/// bounds), so there is no connection string or topology to load here —
/// just process-wide defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the `tokio::broadcast` channel each `EventStream`
    /// subscribes to (§4.3).
    pub event_broadcast_capacity: usize,
    /// `RUST_LOG`-style filter directive applied by `init_tracing`.
    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_broadcast_capacity: 1024,
            log_filter: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load `.env` (if present), then layer `config::Environment` over the
    /// defaults: `CLEARING_EVENT_BROADCAST_CAPACITY` and `RUST_LOG`
    /// override their respective fields when set.
    pub fn load() -> Self {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let mut builder = config::Config::builder()
            .set_default("event_broadcast_capacity", defaults.event_broadcast_capacity as i64)
            .expect("static default key")
            .set_default("log_filter", defaults.log_filter.clone())
            .expect("static default key")
            .add_source(
                config::Environment::default()
                    .prefix("CLEARING")
                    .try_parsing(true),
            );
        if let Ok(log_filter) = std::env::var("RUST_LOG") {
            builder = builder
                .set_override("log_filter", log_filter)
                .expect("static override key");
        }

        builder
            .build()
            .and_then(|built| built.try_deserialize())
            .unwrap_or(defaults)
    }
}

/// Install the `tracing-subscriber` fmt layer with an env-filter, the same
/// wiring the teacher's `main.rs` installs before constructing any service.
pub fn init_tracing(config: &EngineConfig) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
