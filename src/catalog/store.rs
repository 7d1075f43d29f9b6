//! Asset catalog store
//!
//! Loads the catalog and alias documents at startup, validates them (fatal
//! on malformed input), and serves immutable snapshots to the request path
//! via `arc-swap`. Administrative mutations are load-modify-save under a
//! file-level lock with atomic write-replace, so a concurrent startup can
//! never observe a partially written document.

use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::types::{AliasDocument, Asset, AssetClass, CatalogDocument, AppPolicy, ServiceOverrides};
use crate::lifecycle::resolver::DependencyGraph;
use crate::types::{Capability, CatalogError, ServiceName};

/// Immutable view of the catalog taken by a request.
#[derive(Debug)]
pub struct CatalogSnapshot {
    pub document: CatalogDocument,
    pub aliases: AliasDocument,
    pub graph: DependencyGraph,
    assets_by_id: HashMap<String, usize>,
}

impl CatalogSnapshot {
    fn build(document: CatalogDocument, aliases: AliasDocument) -> Result<Self, CatalogError> {
        let mut assets_by_id = HashMap::new();
        for (idx, asset) in document.assets.iter().enumerate() {
            if assets_by_id.insert(asset.asset_id.clone(), idx).is_some() {
                return Err(CatalogError::DuplicateAsset {
                    asset_id: asset.asset_id.clone(),
                });
            }
        }

        for (capability, asset_id) in &document.bindings {
            let asset = assets_by_id
                .get(asset_id)
                .map(|idx| &document.assets[*idx])
                .ok_or_else(|| CatalogError::Invalid {
                    reason: format!(
                        "binding '{}' references unknown asset '{}'",
                        capability, asset_id
                    ),
                })?;
            if asset.class != AssetClass::Service {
                return Err(CatalogError::Invalid {
                    reason: format!(
                        "binding '{}' references non-service asset '{}'",
                        capability, asset_id
                    ),
                });
            }
        }

        let mut deps: HashMap<ServiceName, Vec<ServiceName>> = HashMap::new();
        for asset in &document.assets {
            if asset.class == AssetClass::Service {
                deps.insert(asset.asset_id.clone(), asset.depends_on().to_vec());
            }
        }
        let graph = DependencyGraph::build(deps, document.startup_order.clone())?;

        Ok(Self {
            document,
            aliases,
            graph,
            assets_by_id,
        })
    }

    pub fn asset(&self, asset_id: &str) -> Option<&Asset> {
        self.assets_by_id
            .get(asset_id)
            .map(|idx| &self.document.assets[*idx])
    }

    /// The single asset currently satisfying a capability.
    pub fn bound_asset(&self, capability: &str) -> Option<&Asset> {
        self.document
            .bindings
            .get(capability)
            .and_then(|asset_id| self.asset(asset_id))
    }

    /// Policy for an app, merged with catalog-wide defaults. An unknown app
    /// falls back to the defaults entirely.
    pub fn app_policy(&self, app_id: &str) -> AppPolicy {
        match self.asset(app_id).and_then(|a| a.policy.clone()) {
            Some(policy) => policy.merged_with(&self.document.defaults),
            None => self.document.defaults.clone(),
        }
    }

    /// Resolve a logical model name to a provider-specific physical id.
    pub fn resolve_alias(&self, logical: &str, provider: &str) -> Option<String> {
        self.aliases
            .aliases
            .get(logical)
            .and_then(|per_provider| per_provider.get(provider))
            .cloned()
    }

    /// Names of every declared service asset, in startup order.
    pub fn service_names(&self) -> Vec<ServiceName> {
        self.graph.services().cloned().collect()
    }

    /// All model names declared anywhere in the catalog (policies and
    /// defaults), deduplicated.
    pub fn declared_models(&self) -> Vec<String> {
        let mut seen = std::collections::BTreeSet::new();
        let defaults = &self.document.defaults;
        for name in defaults
            .allowed_models
            .iter()
            .chain(defaults.default_model.iter())
        {
            seen.insert(name.clone());
        }
        for asset in &self.document.assets {
            if let Some(policy) = &asset.policy {
                for name in policy.allowed_models.iter().chain(policy.default_model.iter()) {
                    seen.insert(name.clone());
                }
            }
        }
        seen.into_iter().collect()
    }
}

/// The catalog store: snapshot reads, locked mutations, atomic persistence.
pub struct AssetCatalog {
    catalog_path: PathBuf,
    alias_path: PathBuf,
    snapshot: ArcSwap<CatalogSnapshot>,
    write_lock: Mutex<()>,
}

impl AssetCatalog {
    /// Load and validate both documents. Any failure here is fatal at
    /// startup.
    pub fn load(catalog_path: &Path, alias_path: &Path) -> Result<Self, CatalogError> {
        let document: CatalogDocument = read_json(catalog_path)?;
        let aliases: AliasDocument = if alias_path.exists() {
            read_json(alias_path)?
        } else {
            AliasDocument::default()
        };
        let snapshot = CatalogSnapshot::build(document, aliases)?;
        Ok(Self {
            catalog_path: catalog_path.to_path_buf(),
            alias_path: alias_path.to_path_buf(),
            snapshot: ArcSwap::from_pointee(snapshot),
            write_lock: Mutex::new(()),
        })
    }

    /// Current immutable snapshot. Requests hold this for their lifetime so
    /// a concurrent reload never changes the catalog under them.
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.snapshot.load_full()
    }

    pub fn bound_asset(&self, capability: &str) -> Option<Asset> {
        self.snapshot().bound_asset(capability).cloned()
    }

    pub fn app_policy(&self, app_id: &str) -> AppPolicy {
        self.snapshot().app_policy(app_id)
    }

    pub fn resolve_alias(&self, logical: &str, provider: &str) -> Option<String> {
        self.snapshot().resolve_alias(logical, provider)
    }

    /// Re-read both documents from disk and swap in a fresh snapshot.
    /// Validation failures leave the current snapshot untouched.
    pub async fn reload(&self) -> Result<u64, CatalogError> {
        let _guard = self.write_lock.lock().await;
        let document: CatalogDocument = read_json(&self.catalog_path)?;
        let aliases: AliasDocument = if self.alias_path.exists() {
            read_json(&self.alias_path)?
        } else {
            AliasDocument::default()
        };
        let snapshot = CatalogSnapshot::build(document, aliases)?;
        let version = snapshot.document.version;
        self.snapshot.store(Arc::new(snapshot));
        tracing::info!(version, "catalog reloaded");
        Ok(version)
    }

    /// Create or replace an asset and persist the catalog.
    pub async fn upsert_asset(&self, asset: Asset) -> Result<(), CatalogError> {
        let _guard = self.write_lock.lock().await;
        let current = self.snapshot.load_full();
        let mut document = current.document.clone();
        match document
            .assets
            .iter_mut()
            .find(|a| a.asset_id == asset.asset_id)
        {
            Some(existing) => *existing = asset,
            None => document.assets.push(asset),
        }
        document.version += 1;
        self.commit(document, current.aliases.clone()).await
    }

    /// Rebind a capability to a different service asset. Rebinding is an
    /// explicit administrative action; exactly one asset holds a capability
    /// at a time.
    pub async fn set_binding(
        &self,
        capability: Capability,
        asset_id: String,
    ) -> Result<(), CatalogError> {
        let _guard = self.write_lock.lock().await;
        let current = self.snapshot.load_full();
        let mut document = current.document.clone();
        document.bindings.insert(capability, asset_id);
        document.version += 1;
        self.commit(document, current.aliases.clone()).await
    }

    /// Persist per-service idle-sleep overrides to the alias document.
    pub async fn save_service_overrides(
        &self,
        service: &str,
        overrides: ServiceOverrides,
    ) -> Result<(), CatalogError> {
        let _guard = self.write_lock.lock().await;
        let current = self.snapshot.load_full();
        let mut aliases = current.aliases.clone();
        aliases.services.insert(service.to_string(), overrides);
        write_atomic(&self.alias_path, &aliases)?;
        let snapshot = CatalogSnapshot::build(current.document.clone(), aliases)?;
        self.snapshot.store(Arc::new(snapshot));
        Ok(())
    }

    /// Validate, persist and swap in a mutated document.
    async fn commit(
        &self,
        document: CatalogDocument,
        aliases: AliasDocument,
    ) -> Result<(), CatalogError> {
        let snapshot = CatalogSnapshot::build(document, aliases)?;
        write_atomic(&self.catalog_path, &snapshot.document)?;
        tracing::info!(version = snapshot.document.version, "catalog saved");
        self.snapshot.store(Arc::new(snapshot));
        Ok(())
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, CatalogError> {
    let raw = std::fs::read_to_string(path).map_err(|e| CatalogError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    serde_json::from_str(&raw).map_err(|e| CatalogError::Parse {
        reason: format!("{}: {}", path.display(), e),
    })
}

/// Write-to-temp-then-rename so a concurrent reader never sees a partial
/// document.
fn write_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), CatalogError> {
    let body = serde_json::to_string_pretty(value).map_err(|e| CatalogError::Parse {
        reason: e.to_string(),
    })?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, body).map_err(|e| CatalogError::Io {
        path: tmp.display().to_string(),
        message: e.to_string(),
    })?;
    std::fs::rename(&tmp, path).map_err(|e| CatalogError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}
