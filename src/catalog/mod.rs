//! Asset catalog and policy store
//!
//! The catalog is the leaf dependency for everything else: a versioned store
//! of declared backends and applications with capability bindings, app
//! policies and the model alias table.

mod store;
mod types;

pub use store::{AssetCatalog, CatalogSnapshot};
pub use types::{
    AliasDocument, AppPolicy, Asset, AssetClass, CatalogDocument, RuntimeSpec, ServiceOverrides,
};
