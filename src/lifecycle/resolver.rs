//! Dependency graph and start-order resolution
//!
//! The graph is static: it is built once per catalog load and validated
//! there, so cycles and unknown dependencies are configuration errors, never
//! per-request failures.

use std::collections::{HashMap, HashSet};

use crate::types::{CatalogError, LifecycleError, ServiceName};

/// Static service dependency graph plus the declared total startup order.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    deps: HashMap<ServiceName, Vec<ServiceName>>,
    order: Vec<ServiceName>,
    order_index: HashMap<ServiceName, usize>,
}

impl DependencyGraph {
    /// Build and validate the graph. Rejects unknown dependencies, services
    /// missing from the startup order, orders inconsistent with the declared
    /// edges, and cycles.
    pub fn build(
        deps: HashMap<ServiceName, Vec<ServiceName>>,
        order: Vec<ServiceName>,
    ) -> Result<Self, CatalogError> {
        let order_index: HashMap<ServiceName, usize> = order
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();

        for (service, required) in &deps {
            if !order_index.contains_key(service) {
                return Err(CatalogError::Invalid {
                    reason: format!("service '{}' missing from startup_order", service),
                });
            }
            for dependency in required {
                if !deps.contains_key(dependency) {
                    return Err(CatalogError::UnknownDependency {
                        service: service.clone(),
                        dependency: dependency.clone(),
                    });
                }
                if order_index[dependency] >= order_index[service] {
                    return Err(CatalogError::Invalid {
                        reason: format!(
                            "startup_order places '{}' before its dependency '{}'",
                            service, dependency
                        ),
                    });
                }
            }
        }

        let graph = Self {
            deps,
            order,
            order_index,
        };
        graph.check_acyclic()?;
        Ok(graph)
    }

    /// Depth-first cycle check over every declared service.
    fn check_acyclic(&self) -> Result<(), CatalogError> {
        let mut done: HashSet<&str> = HashSet::new();
        let mut in_progress: HashSet<&str> = HashSet::new();
        for service in self.deps.keys() {
            self.visit(service, &mut done, &mut in_progress)?;
        }
        Ok(())
    }

    fn visit<'a>(
        &'a self,
        service: &'a str,
        done: &mut HashSet<&'a str>,
        in_progress: &mut HashSet<&'a str>,
    ) -> Result<(), CatalogError> {
        if done.contains(service) {
            return Ok(());
        }
        if !in_progress.insert(service) {
            return Err(CatalogError::CycleDetected {
                service: service.to_string(),
            });
        }
        if let Some(required) = self.deps.get(service) {
            for dependency in required {
                self.visit(dependency, done, in_progress)?;
            }
        }
        in_progress.remove(service);
        done.insert(service);
        Ok(())
    }

    /// Resolve the requested services into their full transitive closure in
    /// safe start order. The result is projected onto the declared startup
    /// order, so it is deterministic regardless of the input ordering.
    pub fn resolve(&self, requested: &[ServiceName]) -> Result<Vec<ServiceName>, LifecycleError> {
        let mut closure: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = Vec::new();

        for service in requested {
            if !self.deps.contains_key(service.as_str()) {
                return Err(LifecycleError::UnknownService {
                    service: service.clone(),
                });
            }
            stack.push(service);
        }

        while let Some(service) = stack.pop() {
            if !closure.insert(service) {
                continue;
            }
            if let Some(required) = self.deps.get(service) {
                for dependency in required {
                    stack.push(dependency);
                }
            }
        }

        Ok(self
            .order
            .iter()
            .filter(|name| closure.contains(name.as_str()))
            .cloned()
            .collect())
    }

    /// Declared direct dependencies of a service.
    pub fn dependencies_of(&self, service: &str) -> &[ServiceName] {
        self.deps
            .get(service)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Services that directly depend on `service` (reverse edges).
    pub fn consumers_of(&self, service: &str) -> Vec<ServiceName> {
        let mut consumers: Vec<ServiceName> = self
            .deps
            .iter()
            .filter(|(_, required)| required.iter().any(|d| d == service))
            .map(|(name, _)| name.clone())
            .collect();
        consumers.sort_by_key(|name| self.order_index.get(name).copied().unwrap_or(usize::MAX));
        consumers
    }

    pub fn contains(&self, service: &str) -> bool {
        self.deps.contains_key(service)
    }

    pub fn services(&self) -> impl Iterator<Item = &ServiceName> {
        self.order.iter()
    }
}
