//! Orbit detect: attributes workloads to the Istio mesh whose sidecar injector would
//! manage them, by replaying the injector's own decision rules.

#![forbid(unsafe_code)]

use orbit_core::ClusterObjectRef;
use thiserror::Error;

pub mod config;
pub mod detector;
pub mod selector;

pub use config::{
    injector_config_map_name, load_injector_config, ConfigMapLookup, ConfigMapSet, InjectionPolicy, InjectorConfig,
};
pub use detector::{Detector, MeshMembership};
pub use selector::{Selector, SelectorError};

/// Namespaces whose workloads are never injected.
pub const IGNORED_NAMESPACES: &[&str] = &["kube-system", "kube-public", "kube-node-lease", "local-path-storage"];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DetectError {
    #[error("config map {} not found in {}/{}", .0.name, .0.cluster_name, .0.namespace)]
    ConfigMapNotFound(ClusterObjectRef),
    #[error("config map {0} has no 'config' key")]
    MissingConfigKey(String),
    #[error("config map {config_map}: parse 'config': {message}")]
    ParseConfig { config_map: String, message: String },
}

impl DetectError {
    /// Metric label for the failure.
    pub fn kind(&self) -> &'static str {
        match self {
            DetectError::ConfigMapNotFound(_) => "not_found",
            DetectError::MissingConfigKey(_) => "missing_key",
            DetectError::ParseConfig { .. } => "parse",
        }
    }
}

/// A non-fatal problem met while reading a mesh's injector config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anomaly {
    pub mesh: String,
    pub error: DetectError,
}

impl std::fmt::Display for Anomaly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mesh {}: {}", self.mesh, self.error)
    }
}

/// Built-in ignored namespaces plus `ORBIT_EXTRA_IGNORED_NAMESPACES` (comma-separated).
pub fn ignored_namespaces() -> Vec<String> {
    let mut out: Vec<String> = IGNORED_NAMESPACES.iter().map(|s| s.to_string()).collect();
    if let Ok(extra) = std::env::var("ORBIT_EXTRA_IGNORED_NAMESPACES") {
        for ns in extra.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if !out.iter().any(|o| o == ns) {
                out.push(ns.to_string());
            }
        }
    }
    out
}
