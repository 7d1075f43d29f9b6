//! Service registry
//!
//! Runtime state per named service: desired/actual lifecycle state, last-used
//! timestamp and idle-sleep overrides. Entries are created at startup for
//! every known service and never destroyed. Each entry sits behind its own
//! lock so `last_used`/`actual`/`desired` mutations are atomic with respect
//! to concurrent readers; in particular `mark_running` publishes the running
//! state and the refreshed `last_used` as one step, so an idle sweep can
//! never catch a freshly woken service between the two writes.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::catalog::ServiceOverrides;
use crate::types::ServiceName;

/// Observed lifecycle state of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActualState {
    Running,
    Stopped,
    /// Only until the first health probe completes.
    Unknown,
}

/// Operator intent for a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DesiredState {
    On,
    Off,
}

#[derive(Debug, Clone)]
struct EntryInner {
    desired: DesiredState,
    actual: ActualState,
    last_used: DateTime<Utc>,
    idle_sleep_enabled: Option<bool>,
    idle_timeout_minutes: Option<u64>,
}

/// Point-in-time view of one registry entry.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub service: ServiceName,
    pub desired: DesiredState,
    pub actual: ActualState,
    pub last_used: DateTime<Utc>,
    pub idle_sleep_enabled: Option<bool>,
    pub idle_timeout_minutes: Option<u64>,
}

/// Owning component for all per-service runtime state.
pub struct ServiceRegistry {
    entries: DashMap<ServiceName, Arc<Mutex<EntryInner>>>,
}

impl ServiceRegistry {
    /// Create an entry for every known service. `overrides` carries the
    /// persisted per-service idle-sleep settings.
    pub fn new<'a>(
        services: impl IntoIterator<Item = &'a ServiceName>,
        overrides: impl Fn(&str) -> Option<ServiceOverrides>,
    ) -> Self {
        let entries = DashMap::new();
        let now = Utc::now();
        for service in services {
            let persisted = overrides(service).unwrap_or_default();
            entries.insert(
                service.clone(),
                Arc::new(Mutex::new(EntryInner {
                    desired: DesiredState::Off,
                    actual: ActualState::Unknown,
                    last_used: now,
                    idle_sleep_enabled: persisted.idle_sleep_enabled,
                    idle_timeout_minutes: persisted.idle_timeout_minutes,
                })),
            );
        }
        Self { entries }
    }

    fn entry(&self, service: &str) -> Option<Arc<Mutex<EntryInner>>> {
        self.entries.get(service).map(|e| e.value().clone())
    }

    pub fn contains(&self, service: &str) -> bool {
        self.entries.contains_key(service)
    }

    /// Record a request that depends on this service. Sets desired on and
    /// refreshes `last_used` unless a keep-warm pin extends further.
    pub fn mark_used(&self, service: &str) {
        if let Some(entry) = self.entry(service) {
            let mut inner = entry.lock();
            inner.desired = DesiredState::On;
            let now = Utc::now();
            if inner.last_used < now {
                inner.last_used = now;
            }
        }
    }

    /// Publish a confirmed wake: desired on, actual running and a fresh
    /// `last_used`, all under one lock acquisition. A concurrent idle sweep
    /// can therefore never observe `Running` paired with the pre-wake
    /// `last_used`. Like [`ServiceRegistry::mark_used`], a keep-warm pin
    /// that extends further is left in place.
    pub fn mark_running(&self, service: &str) {
        if let Some(entry) = self.entry(service) {
            let mut inner = entry.lock();
            inner.desired = DesiredState::On;
            inner.actual = ActualState::Running;
            let now = Utc::now();
            if inner.last_used < now {
                inner.last_used = now;
            }
        }
    }

    /// Pin a service against the idle monitor by pushing `last_used` into
    /// the future. Expiry is implicit: once the window passes, ordinary
    /// idle accounting resumes.
    pub fn keep_warm(&self, service: &str, window: Duration) {
        if let Some(entry) = self.entry(service) {
            let mut inner = entry.lock();
            let until = Utc::now()
                + ChronoDuration::from_std(window).unwrap_or_else(|_| ChronoDuration::zero());
            if inner.last_used < until {
                inner.last_used = until;
            }
        }
    }

    pub fn set_actual(&self, service: &str, state: ActualState) {
        if let Some(entry) = self.entry(service) {
            entry.lock().actual = state;
        }
    }

    pub fn set_desired(&self, service: &str, state: DesiredState) {
        if let Some(entry) = self.entry(service) {
            entry.lock().desired = state;
        }
    }

    pub fn actual(&self, service: &str) -> Option<ActualState> {
        self.entry(service).map(|e| e.lock().actual)
    }

    pub fn last_used(&self, service: &str) -> Option<DateTime<Utc>> {
        self.entry(service).map(|e| e.lock().last_used)
    }

    /// Per-service idle-sleep override; `None` fields defer to the global
    /// settings.
    pub fn set_idle_sleep(
        &self,
        service: &str,
        enabled: Option<bool>,
        timeout_minutes: Option<u64>,
    ) {
        if let Some(entry) = self.entry(service) {
            let mut inner = entry.lock();
            inner.idle_sleep_enabled = enabled;
            inner.idle_timeout_minutes = timeout_minutes;
        }
    }

    pub fn status(&self, service: &str) -> Option<ServiceStatus> {
        self.entry(service).map(|entry| {
            let inner = entry.lock();
            ServiceStatus {
                service: service.to_string(),
                desired: inner.desired,
                actual: inner.actual,
                last_used: inner.last_used,
                idle_sleep_enabled: inner.idle_sleep_enabled,
                idle_timeout_minutes: inner.idle_timeout_minutes,
            }
        })
    }

    /// Snapshot of every entry, sorted by service name for stable output.
    pub fn snapshot(&self) -> Vec<ServiceStatus> {
        let mut all: Vec<ServiceStatus> = self
            .entries
            .iter()
            .map(|item| {
                let inner = item.value().lock();
                ServiceStatus {
                    service: item.key().clone(),
                    desired: inner.desired,
                    actual: inner.actual,
                    last_used: inner.last_used,
                    idle_sleep_enabled: inner.idle_sleep_enabled,
                    idle_timeout_minutes: inner.idle_timeout_minutes,
                }
            })
            .collect();
        all.sort_by(|a, b| a.service.cmp(&b.service));
        all
    }
}
