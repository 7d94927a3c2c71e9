//! Reusable EVSE service runtime.
//!
//! [`ServerHandle`] owns the full lifecycle: metrics exporter, event bus,
//! authorization registry, charging hierarchy, expiry sweepers, the logging
//! notification dispatcher and graceful shutdown.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::application::{
    build_pools, create_event_bus, spawn_notification_dispatcher, AuthorizationRegistry,
    ChargingPool, ChargingStation, ExpirySweeper, LoggingSink, SharedAuthorizationRegistry,
    SharedEventBus, SweeperHandle,
};
use crate::config::AppConfig;
use crate::domain::{EvseId, PoolId, StationId};
use crate::support::{
    system_clock, AppError, ConfigError, RequestContext, SharedClock, ShutdownCoordinator,
    ShutdownSignal,
};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

// ── Options ────────────────────────────────────────────────────────

/// Options for starting the service.
pub struct ServerOptions {
    pub config: AppConfig,
    /// Time source for every engine; tests swap in a manual clock.
    pub clock: SharedClock,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            config: AppConfig::default(),
            clock: system_clock(),
        }
    }
}

impl From<AppConfig> for ServerOptions {
    fn from(config: AppConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }
}

// ── ServerHandle ───────────────────────────────────────────────────

/// Handle to a running EVSE service.
///
/// # Examples
///
/// ```rust,no_run
/// use texnouz_evse::server::{ServerHandle, ServerOptions};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let handle = ServerHandle::start(ServerOptions::default()).await?;
///     handle.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct ServerHandle {
    /// Shared event bus for notifications.
    pub event_bus: SharedEventBus,
    /// Authorization database of the configured provider.
    pub registry: SharedAuthorizationRegistry,
    /// The configuration the service was started with.
    pub config: AppConfig,

    pools: Vec<Arc<ChargingPool>>,
    shutdown: ShutdownCoordinator,
    sweepers: Vec<SweeperHandle>,
    dispatcher: JoinHandle<()>,
}

impl ServerHandle {
    /// Start the service:
    /// 1. Install the Prometheus exporter (if enabled)
    /// 2. Seed the authorization registry
    /// 3. Build pools, stations and EVSEs from the configured topology
    /// 4. Start one reservation expiry sweeper per station
    /// 5. Start the logging notification dispatcher
    pub async fn start(opts: ServerOptions) -> Result<Self, AppError> {
        let app_cfg = opts.config;
        app_cfg.validate()?;

        info!("Starting Texnouz EVSE service...");

        if app_cfg.metrics.enabled {
            install_metrics_exporter(app_cfg.metrics.listen.as_deref())?;
        }

        // ── Event Bus ──────────────────────────────────────────
        let event_bus = create_event_bus(app_cfg.events.capacity);
        info!(capacity = app_cfg.events.capacity, "🔔 Event bus initialized");

        // ── Authorization ──────────────────────────────────────
        let registry = Arc::new(
            AuthorizationRegistry::new(app_cfg.provider_id()?, opts.clock.clone())
                .with_events(event_bus.clone()),
        );
        let seed = app_cfg.token_seed()?;
        let seeded = seed.len();
        for (identification, status) in seed {
            if !registry.add_token(identification.clone(), status) {
                warn!(token = %identification, "Duplicate token in config, keeping first entry");
            }
        }
        info!(
            provider_id = %registry.provider_id(),
            tokens = seeded,
            "🔑 Authorization registry ready"
        );

        // ── Charging hierarchy ─────────────────────────────────
        let pools = build_pools(
            &app_cfg,
            &app_cfg.engine_settings(),
            opts.clock.clone(),
            event_bus.clone(),
        )
        .await?;

        // ── Background tasks ───────────────────────────────────
        let shutdown = ShutdownCoordinator::new(SHUTDOWN_TIMEOUT);
        let shutdown_signal = shutdown.signal();

        let mut sweepers = Vec::new();
        for pool in &pools {
            for station in pool.stations().await {
                let sweeper = ExpirySweeper::new(&station)
                    .with_period(app_cfg.sweep_period())
                    .with_per_evse_timeout(app_cfg.per_evse_timeout());
                sweepers.push(sweeper.spawn(shutdown_signal.clone()));
            }
        }

        let dispatcher = spawn_notification_dispatcher(
            &event_bus,
            Arc::new(LoggingSink),
            shutdown_signal.clone(),
        );

        info!(
            pools = pools.len(),
            sweepers = sweepers.len(),
            "🚀 EVSE service started"
        );

        Ok(Self {
            event_bus,
            registry,
            config: app_cfg,
            pools,
            shutdown,
            sweepers,
            dispatcher,
        })
    }

    pub fn pools(&self) -> &[Arc<ChargingPool>] {
        &self.pools
    }

    pub fn pool(&self, id: &PoolId) -> Option<Arc<ChargingPool>> {
        self.pools.iter().find(|p| p.id() == id).cloned()
    }

    pub async fn station(&self, id: &StationId) -> Option<Arc<ChargingStation>> {
        for pool in &self.pools {
            if let Some(station) = pool.station(id).await {
                return Some(station);
            }
        }
        None
    }

    /// Pool and station that own `evse_id`.
    pub async fn locate_evse(
        &self,
        evse_id: &EvseId,
    ) -> Option<(Arc<ChargingPool>, Arc<ChargingStation>)> {
        for pool in &self.pools {
            if let Some(station) = pool.station_for_evse(evse_id).await {
                return Some((pool.clone(), station));
            }
        }
        None
    }

    /// Request context with the configured timeout, cancelled on shutdown.
    pub fn request_context(&self) -> RequestContext {
        RequestContext::new(self.config.request_timeout()).with_cancel(self.shutdown.signal().token())
    }

    /// Get a cloneable shutdown signal.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.signal()
    }

    /// Install OS signal listeners (SIGTERM, SIGINT) that trigger shutdown.
    pub fn install_signal_handler(&self) {
        self.shutdown.start_signal_listener();
    }

    /// Trigger graceful shutdown (non-blocking).
    pub fn trigger_shutdown(&self) {
        self.shutdown.signal().trigger();
    }

    /// Wait for background tasks to stop after shutdown has been triggered.
    pub async fn wait(self) {
        info!("⏳ Waiting for background tasks to complete...");

        let Self {
            shutdown,
            sweepers,
            dispatcher,
            ..
        } = self;

        let completed = shutdown
            .shutdown_with_cleanup(|| async move {
                for sweeper in sweepers {
                    sweeper.stop().await;
                }
                if let Err(e) = dispatcher.await {
                    error!("Notification dispatcher task panicked: {}", e);
                }
            })
            .await;

        if completed {
            info!("👋 Texnouz EVSE service shutdown complete");
        }
    }

    /// Trigger shutdown and wait for completion.
    pub async fn shutdown(self) {
        info!("🛑 Shutting down EVSE service...");
        self.trigger_shutdown();
        self.wait().await;
    }

    pub fn is_running(&self) -> bool {
        !self.dispatcher.is_finished()
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// The global recorder can only be installed once per process; a restart
/// within the same process keeps the first exporter.
fn install_metrics_exporter(listen: Option<&str>) -> Result<(), ConfigError> {
    static INSTALLED: AtomicBool = AtomicBool::new(false);

    let Some(listen) = listen else {
        warn!("metrics.enabled is set without metrics.listen, exporter not started");
        return Ok(());
    };
    let addr: SocketAddr = listen
        .parse()
        .map_err(|e| ConfigError::Invalid(format!("metrics.listen {}: {}", listen, e)))?;

    if INSTALLED.swap(true, Ordering::SeqCst) {
        info!("📊 Prometheus exporter already installed");
        return Ok(());
    }

    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| {
            INSTALLED.store(false, Ordering::SeqCst);
            ConfigError::Invalid(format!("failed to install Prometheus exporter: {}", e))
        })?;
    info!("📊 Prometheus metrics available at http://{}/metrics", addr);
    Ok(())
}

/// Initialize tracing (logging) from the application config.
///
/// Call this once at process startup (before [`ServerHandle::start`]).
pub fn init_tracing(config: &AppConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    match config.logging.format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        AuthStartResult, EvseStatus, Identification, ReservationRequest, ReservationResult,
    };
    use crate::application::ChargingTarget;

    const CONFIG: &str = r#"
        [provider]
        id = "DE-TNZ"

        [[tokens]]
        id = "TOKEN-1"
        status = "Authorized"

        [[pools]]
        id = "P1"

        [[pools.stations]]
        id = "S1"
        evses = ["E1", "E2"]
    "#;

    async fn start() -> ServerHandle {
        let config = AppConfig::from_toml(CONFIG).unwrap();
        ServerHandle::start(config.into()).await.unwrap()
    }

    #[tokio::test]
    async fn starts_with_configured_hierarchy() {
        let handle = start().await;
        assert_eq!(handle.pools().len(), 1);
        assert!(handle.station(&StationId::new("S1").unwrap()).await.is_some());
        let (pool, station) = handle
            .locate_evse(&EvseId::new("E2").unwrap())
            .await
            .unwrap();
        assert_eq!(pool.id().as_str(), "P1");
        assert_eq!(station.id().as_str(), "S1");
        assert!(handle.is_running());
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn seeds_authorization_registry() {
        let handle = start().await;
        let token = Identification::auth_token("TOKEN-1").unwrap();
        let result = handle
            .registry
            .authorize_start(&token, None, None, None);
        assert!(matches!(result, AuthStartResult::Authorized { .. }));
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn reserves_through_pool() {
        let handle = start().await;
        let pool = handle.pool(&PoolId::new("P1").unwrap()).unwrap();
        let target = ChargingTarget::Evse(EvseId::new("E1").unwrap());
        let request = ReservationRequest::new(
            handle.registry.provider_id().clone(),
            Identification::auth_token("TOKEN-1").unwrap(),
        );

        let result = pool
            .reserve(&handle.request_context(), Some(&target), request)
            .await;
        assert!(matches!(result, ReservationResult::Success(_)));

        let (_, station) = handle
            .locate_evse(&EvseId::new("E1").unwrap())
            .await
            .unwrap();
        let evse = station.evse(&EvseId::new("E1").unwrap()).await.unwrap();
        assert_eq!(evse.status().await, EvseStatus::Reserved);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn request_context_is_cancelled_on_shutdown() {
        let handle = start().await;
        let ctx = handle.request_context();
        assert_eq!(ctx.timeout, Duration::from_secs(30));
        assert!(!ctx.cancel.is_cancelled());

        handle.trigger_shutdown();
        assert!(ctx.cancel.is_cancelled());
        handle.wait().await;
    }

    #[tokio::test]
    async fn rejects_invalid_metrics_listen_address() {
        let mut config = AppConfig::default();
        config.metrics.enabled = true;
        config.metrics.listen = Some("not an address".into());
        let result = ServerHandle::start(config.into()).await;
        assert!(matches!(result, Err(AppError::Config(ConfigError::Invalid(_)))));
    }
}
