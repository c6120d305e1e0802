use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use metrics::counter;
use orbit_core::{Mesh, NamespaceRecord, Workload};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace, warn};

use crate::config::{load_injector_config, ConfigMapLookup, InjectionPolicy, InjectorConfig};
use crate::selector::Selector;
use crate::{ignored_namespaces, Anomaly};

pub const PROXY_CONTAINER: &str = "istio-proxy";
pub const INJECT_ANNOTATION: &str = "sidecar.istio.io/inject";
pub const INJECTION_LABEL: &str = "istio-injection";
pub const REVISION_LABEL: &str = "istio.io/rev";
pub const ISTIO_SYSTEM: &str = "istio-system";

/// Workload key (`name.namespace.cluster`) to attributed mesh key (`name.namespace`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeshMembership {
    by_workload: BTreeMap<String, String>,
}

impl MeshMembership {
    pub fn mesh_for(&self, workload: &Workload) -> Option<&str> {
        self.by_workload.get(&workload.key()).map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.by_workload.iter().map(|(w, m)| (w.as_str(), m.as_str()))
    }

    pub fn insert(&mut self, workload: &Workload, mesh: &Mesh) {
        self.by_workload.insert(workload.key(), mesh.key());
    }

    pub fn len(&self) -> usize {
        self.by_workload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_workload.is_empty()
    }
}

fn namespace_key(name: &str, cluster: &str) -> String {
    format!("{name}/{cluster}")
}

/// Decides which Istio mesh, if any, injects a workload's pods.
///
/// Build one per pass: injector configs are read once per mesh and kept for the
/// detector's lifetime.
pub struct Detector<'a> {
    config_maps: &'a dyn ConfigMapLookup,
    ignored: Vec<String>,
    injected_namespaces: FxHashSet<String>,
    configs: FxHashMap<String, InjectorConfig>,
    anomalies: Vec<Anomaly>,
}

impl<'a> Detector<'a> {
    pub fn new(namespaces: &[NamespaceRecord], config_maps: &'a dyn ConfigMapLookup) -> Self {
        let ignored = ignored_namespaces();
        let injected_namespaces = namespaces
            .iter()
            .filter(|ns| namespace_injection_enabled(ns, &ignored))
            .map(|ns| namespace_key(&ns.name, &ns.cluster))
            .collect();
        Self { config_maps, ignored, injected_namespaces, configs: FxHashMap::default(), anomalies: Vec::new() }
    }

    /// Adds namespaces whose workloads are never injected.
    pub fn with_ignored_namespaces(mut self, extra: impl IntoIterator<Item = String>) -> Self {
        for ns in extra {
            if !self.ignored.contains(&ns) {
                self.ignored.push(ns);
            }
        }
        self
    }

    pub fn anomalies(&self) -> &[Anomaly] {
        &self.anomalies
    }

    /// First mesh in `meshes` that is installed on the workload's cluster and injects it.
    /// Several Istio meshes on one cluster are not told apart.
    pub fn detect_mesh_for_workload<'m>(&mut self, workload: &Workload, meshes: &'m [Mesh]) -> Option<&'m Mesh> {
        for mesh in meshes {
            let Some(istio) = mesh.istio() else { continue };
            if istio.installation.cluster != workload.cluster() {
                continue;
            }
            if has_proxy_container(workload) {
                trace!(workload = %workload.key(), mesh = %mesh.key(), "detect: proxy container present");
                return Some(mesh);
            }
            if self.mesh_injects(workload, mesh) {
                return Some(mesh);
            }
        }
        None
    }

    pub fn attribute(&mut self, workloads: &[Workload], meshes: &[Mesh]) -> MeshMembership {
        let mut membership = MeshMembership::default();
        for w in workloads {
            if let Some(mesh) = self.detect_mesh_for_workload(w, meshes) {
                membership.insert(w, mesh);
            }
        }
        debug!(workloads = workloads.len(), attributed = membership.len(), "detect: attribution done");
        membership
    }

    fn mesh_injects(&mut self, workload: &Workload, mesh: &Mesh) -> bool {
        let namespace_injected =
            self.injected_namespaces.contains(&namespace_key(workload.namespace(), workload.cluster()));
        let key = mesh.key();
        self.load_config_once(&key, mesh);
        inject_required(&self.ignored, namespace_injected, &self.configs[&key], workload)
    }

    fn load_config_once(&mut self, key: &str, mesh: &Mesh) {
        if !self.configs.contains_key(key) {
            let cfg = match mesh.istio() {
                Some(istio) => match load_injector_config(istio, self.config_maps) {
                    Ok(cfg) => cfg,
                    Err(e) => {
                        warn!(mesh = %key, error = %e, "detect: injector config unavailable, using disabled default");
                        counter!("injector_config_load_failed_total", 1u64, "mesh" => key.to_string(), "kind" => e.kind());
                        self.anomalies.push(Anomaly { mesh: key.to_string(), error: e });
                        InjectorConfig::default()
                    }
                },
                None => InjectorConfig::default(),
            };
            self.configs.insert(key.to_string(), cfg);
        }
    }
}

fn has_proxy_container(workload: &Workload) -> bool {
    workload.containers().iter().any(|c| c.name == PROXY_CONTAINER)
}

fn namespace_injection_enabled(ns: &NamespaceRecord, ignored: &[String]) -> bool {
    if ns.name == ISTIO_SYSTEM || ignored.iter().any(|i| *i == ns.name) {
        return false;
    }
    // Any other value of the legacy label opts out.
    ns.labels.contains_key(REVISION_LABEL) || ns.labels.get(INJECTION_LABEL).map(|v| v.as_str()) == Some("enabled")
}

fn selector_matches(which: &str, selectors: &[LabelSelector], workload: &Workload) -> bool {
    selectors.iter().any(|raw| match Selector::compile(raw) {
        Ok(sel) => !sel.is_empty() && sel.matches(workload.labels()),
        Err(e) => {
            debug!(selector = which, error = %e, "detect: ignoring invalid injection selector");
            false
        }
    })
}

/// Mirrors the sidecar injector's own decision for a pod template.
pub(crate) fn inject_required(
    ignored: &[String],
    namespace_injected: bool,
    cfg: &InjectorConfig,
    workload: &Workload,
) -> bool {
    if workload.host_network() {
        return false;
    }
    if ignored.iter().any(|ns| ns == workload.namespace()) {
        return false;
    }

    let mut use_default = false;
    let mut injected = false;
    match workload.pod_annotation(INJECT_ANNOTATION).unwrap_or("").to_ascii_lowercase().as_str() {
        "y" | "yes" | "true" | "on" => injected = true,
        "" => use_default = true,
        _ => {}
    }

    if use_default && selector_matches("neverInjectSelector", &cfg.never_inject_selector, workload) {
        injected = false;
        use_default = false;
    }

    if use_default {
        if namespace_injected {
            injected = true;
            use_default = false;
        }
        if selector_matches("alwaysInjectSelector", &cfg.always_inject_selector, workload) {
            injected = true;
            use_default = false;
        }
    }

    match cfg.policy {
        InjectionPolicy::Enabled if use_default => true,
        _ if use_default => false,
        _ => injected,
    }
}
