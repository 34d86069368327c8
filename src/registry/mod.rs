//! Step Catalogue and Planning
//!
//! - [`store`] - the step registry, search, export/import, manifest
//! - [`planner`] - dependency graph, topological order, parallel batches

use std::sync::Mutex;

use once_cell::sync::Lazy;

pub mod planner;
pub mod store;

pub use planner::{create_execution_plan, DependencyNode, ExecutionPlan, PlanOptions};
pub use store::{Manifest, ManifestEntry, RegistryExport, StepFilter, StepRegistry, StepRegistryEntry};

static DEFAULT_REGISTRY: Lazy<Mutex<StepRegistry>> = Lazy::new(|| Mutex::new(StepRegistry::new()));

/// Returns the process-wide default registry.
///
/// A convenience for applications that want a single shared catalogue;
/// explicit [`StepRegistry`] instances remain the primary API.
pub fn default_registry() -> &'static Mutex<StepRegistry> {
    &DEFAULT_REGISTRY
}
