//! Service lifecycle controller: auto-wake and idle-sleep
//!
//! [`ServiceLifecycle`] makes a requested service (and its transitive
//! dependencies) running and health-ready before a request proceeds, and a
//! background idle monitor stops services that have gone unused past their
//! timeout. The ordering invariant is absolute: a service is never reported
//! ready while any of its dependencies are not.

pub mod process;
pub mod resolver;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::{interval, sleep, Instant};

use crate::catalog::AssetCatalog;
use crate::registry::{ActualState, DesiredState, ServiceRegistry};
use crate::types::{LifecycleError, ServiceName};
use process::ProcessController;

/// Health probing abstraction so the controller never acts on the registry's
/// cached belief. The HTTP implementation hits the service's declared health
/// endpoint; tests swap in hand-rolled fakes.
#[async_trait]
pub trait HealthProber: Send + Sync {
    /// `true` when the service answers its health endpoint.
    async fn probe(&self, service: &ServiceName, health_url: &str) -> bool;
}

/// Health probe over HTTP with a hard per-request timeout.
pub struct HttpHealthProber {
    client: reqwest::Client,
}

impl HttpHealthProber {
    pub fn new(probe_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(probe_timeout)
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

#[async_trait]
impl HealthProber for HttpHealthProber {
    async fn probe(&self, service: &ServiceName, health_url: &str) -> bool {
        match self.client.get(health_url).send().await {
            Ok(response) => {
                let healthy = response.status().is_success();
                if !healthy {
                    tracing::debug!(service = %service, status = %response.status(), "health probe unhealthy");
                }
                healthy
            }
            Err(e) => {
                tracing::debug!(service = %service, error = %e, "health probe unreachable");
                false
            }
        }
    }
}

/// Live-tunable idle-sleep settings.
#[derive(Debug, Clone, Copy)]
pub struct IdleSettings {
    pub enabled: bool,
    pub check_interval: Duration,
    pub timeout_minutes: u64,
}

/// Lifecycle controller configuration.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub readiness_timeout: Duration,
    pub poll_interval: Duration,
    pub max_poll_interval: Duration,
    pub idle: IdleSettings,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            readiness_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(500),
            max_poll_interval: Duration::from_secs(5),
            idle: IdleSettings {
                enabled: true,
                check_interval: Duration::from_secs(600),
                timeout_minutes: 30,
            },
        }
    }
}

/// Lifecycle controller operations used by the router and the admin API.
#[async_trait]
pub trait LifecycleController: Send + Sync {
    /// Make every requested service (plus dependencies) running and ready.
    async fn ensure_ready(&self, services: &[ServiceName]) -> Result<(), LifecycleError>;

    /// Manual start of one service and its dependencies.
    async fn start_service(&self, service: &ServiceName) -> Result<(), LifecycleError>;

    /// Stop one service.
    async fn stop_service(&self, service: &ServiceName) -> Result<(), LifecycleError>;

    /// Stop-then-start one service.
    async fn restart_service(&self, service: &ServiceName) -> Result<(), LifecycleError>;

    /// Pin a service against the idle monitor for a bounded window.
    async fn keep_warm(&self, service: &ServiceName, window: Duration)
        -> Result<(), LifecycleError>;
}

/// Default lifecycle controller implementation.
pub struct ServiceLifecycle {
    catalog: Arc<AssetCatalog>,
    registry: Arc<ServiceRegistry>,
    controller: Arc<dyn ProcessController>,
    prober: Arc<dyn HealthProber>,
    config: RwLock<LifecycleConfig>,
    /// One in-flight start per service name; late arrivals wait and re-probe
    /// instead of re-triggering the start command.
    start_locks: DashMap<ServiceName, Arc<Mutex<()>>>,
    shutdown: Notify,
}

impl ServiceLifecycle {
    pub fn new(
        catalog: Arc<AssetCatalog>,
        registry: Arc<ServiceRegistry>,
        controller: Arc<dyn ProcessController>,
        prober: Arc<dyn HealthProber>,
        config: LifecycleConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            catalog,
            registry,
            controller,
            prober,
            config: RwLock::new(config),
            start_locks: DashMap::new(),
            shutdown: Notify::new(),
        })
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn idle_settings(&self) -> IdleSettings {
        self.config.read().idle
    }

    pub fn set_idle_settings(&self, settings: IdleSettings) {
        self.config.write().idle = settings;
        tracing::info!(
            enabled = settings.enabled,
            timeout_minutes = settings.timeout_minutes,
            "idle-sleep settings updated"
        );
    }

    /// Spawn the periodic idle monitor. One long-lived task, independent of
    /// request traffic; stops on [`ServiceLifecycle::shutdown`].
    pub fn spawn_idle_monitor(self: &Arc<Self>) {
        let lifecycle = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(lifecycle.idle_settings().check_interval);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        lifecycle.idle_sweep().await;
                        // pick up a live interval change for the next tick
                        let current = lifecycle.idle_settings().check_interval;
                        if ticker.period() != current {
                            ticker = interval(current);
                            ticker.tick().await;
                        }
                    }
                    _ = lifecycle.shutdown.notified() => {
                        tracing::debug!("idle monitor stopped");
                        break;
                    }
                }
            }
        });
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }

    /// One pass of the idle monitor. Public so tests can tick it directly.
    /// A stop failure on one service never aborts the sweep.
    pub async fn idle_sweep(&self) {
        let settings = self.idle_settings();
        let now = chrono::Utc::now();
        for status in self.registry.snapshot() {
            let enabled = status.idle_sleep_enabled.unwrap_or(settings.enabled);
            if !enabled || status.actual != ActualState::Running {
                continue;
            }
            let timeout_minutes = status
                .idle_timeout_minutes
                .unwrap_or(settings.timeout_minutes);
            let idle = now.signed_duration_since(status.last_used);
            // negative idle means a keep-warm pin in the future
            if idle < chrono::Duration::minutes(timeout_minutes as i64) {
                continue;
            }
            tracing::info!(
                service = %status.service,
                idle_minutes = idle.num_minutes(),
                timeout_minutes,
                "idle-sleep: stopping service"
            );
            if let Err(e) = self.stop_service(&status.service).await {
                tracing::warn!(service = %status.service, error = %e, "idle-sleep stop failed");
            }
        }
    }

    /// Fresh observed state for one service: health endpoint when declared,
    /// container inspection otherwise.
    async fn probe_service(&self, service: &ServiceName) -> ActualState {
        let snapshot = self.catalog.snapshot();
        let asset = match snapshot.asset(service) {
            Some(asset) => asset,
            None => return ActualState::Unknown,
        };
        let running = match asset.endpoint("health") {
            Some(url) => self.prober.probe(service, url).await,
            None => self
                .controller
                .is_running(&asset.container_name())
                .await
                .unwrap_or(false),
        };
        if running {
            ActualState::Running
        } else {
            ActualState::Stopped
        }
    }

    /// Poll a freshly started service until it is ready, with doubling
    /// backoff, failing fast at the deadline.
    async fn wait_ready(
        &self,
        service: &ServiceName,
        deadline: Instant,
    ) -> Result<(), LifecycleError> {
        let (mut delay, max_delay, timeout) = {
            let config = self.config.read();
            (
                config.poll_interval,
                config.max_poll_interval,
                config.readiness_timeout,
            )
        };
        loop {
            if self.probe_service(service).await == ActualState::Running {
                return Ok(());
            }
            if Instant::now() + delay > deadline {
                return Err(LifecycleError::ReadinessTimeout {
                    service: service.clone(),
                    waited_secs: timeout.as_secs(),
                });
            }
            sleep(delay).await;
            delay = (delay * 2).min(max_delay);
        }
    }

    fn start_lock(&self, service: &ServiceName) -> Arc<Mutex<()>> {
        self.start_locks
            .entry(service.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Start one service and confirm readiness. Holds the per-service start
    /// lock for the whole start-and-wait so concurrent callers issue exactly
    /// one start command.
    async fn start_and_confirm(&self, service: &ServiceName) -> Result<(), LifecycleError> {
        let lock = self.start_lock(service);
        let _guard = lock.lock().await;

        // another caller may have finished the start while we waited
        if self.probe_service(service).await == ActualState::Running {
            self.registry.mark_running(service);
            return Ok(());
        }

        let container = {
            let snapshot = self.catalog.snapshot();
            snapshot
                .asset(service)
                .map(|a| a.container_name())
                .ok_or_else(|| LifecycleError::UnknownService {
                    service: service.clone(),
                })?
        };

        tracing::info!(service = %service, container = %container, "auto-wake: starting service");
        self.controller.start(&container).await.map_err(|e| {
            LifecycleError::TargetStartFailed {
                service: service.clone(),
                reason: e.to_string(),
            }
        })?;

        let deadline = Instant::now() + self.config.read().readiness_timeout;
        self.wait_ready(service, deadline).await?;

        // one-step publication: the idle sweep can never observe a freshly
        // started service with a stale last_used
        self.registry.mark_running(service);
        tracing::info!(service = %service, "service ready");
        Ok(())
    }

    /// Reclassify a start failure as a dependency failure when the failed
    /// service was only pulled in as a dependency of the request.
    fn classify(
        error: LifecycleError,
        failed: &ServiceName,
        requested: &[ServiceName],
    ) -> LifecycleError {
        if requested.iter().any(|s| s == failed) {
            return error;
        }
        let target = requested.first().cloned().unwrap_or_default();
        match error {
            LifecycleError::TargetStartFailed { service, reason } => {
                LifecycleError::DependencyStartFailed {
                    target,
                    dependency: service,
                    reason,
                }
            }
            other => other,
        }
    }
}

#[async_trait]
impl LifecycleController for ServiceLifecycle {
    async fn ensure_ready(&self, services: &[ServiceName]) -> Result<(), LifecycleError> {
        let snapshot = self.catalog.snapshot();
        let order = snapshot.graph.resolve(services)?;
        drop(snapshot);

        for service in &order {
            // always probe fresh; the registry's belief may be stale
            if self.probe_service(service).await == ActualState::Running {
                self.registry.mark_running(service);
                continue;
            }
            self.start_and_confirm(service)
                .await
                .map_err(|e| Self::classify(e, service, services))?;
        }
        Ok(())
    }

    async fn start_service(&self, service: &ServiceName) -> Result<(), LifecycleError> {
        self.ensure_ready(std::slice::from_ref(service)).await
    }

    async fn stop_service(&self, service: &ServiceName) -> Result<(), LifecycleError> {
        let container = {
            let snapshot = self.catalog.snapshot();
            snapshot
                .asset(service)
                .map(|a| a.container_name())
                .ok_or_else(|| LifecycleError::UnknownService {
                    service: service.clone(),
                })?
        };
        self.controller
            .stop(&container)
            .await
            .map_err(|e| LifecycleError::StopFailed {
                service: service.clone(),
                reason: e.to_string(),
            })?;
        self.registry.set_actual(service, ActualState::Stopped);
        self.registry.set_desired(service, DesiredState::Off);
        tracing::info!(service = %service, "service stopped");
        Ok(())
    }

    async fn restart_service(&self, service: &ServiceName) -> Result<(), LifecycleError> {
        self.stop_service(service).await?;
        self.start_service(service).await
    }

    async fn keep_warm(
        &self,
        service: &ServiceName,
        window: Duration,
    ) -> Result<(), LifecycleError> {
        if !self.registry.contains(service) {
            return Err(LifecycleError::UnknownService {
                service: service.clone(),
            });
        }
        self.registry.keep_warm(service, window);
        tracing::info!(service = %service, window_secs = window.as_secs(), "keep-warm applied");
        Ok(())
    }
}
