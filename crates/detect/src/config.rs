//! Istio sidecar injector configuration and the config map lookup it is read through.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use orbit_core::{ClusterObjectRef, ConfigMapRecord, IstioMesh};
use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::DetectError;

pub const INJECTOR_CONFIG_MAP: &str = "istio-sidecar-injector";
pub const INJECTOR_CONFIG_KEY: &str = "config";

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InjectionPolicy {
    Enabled,
    #[default]
    #[serde(other)]
    Disabled,
}

/// The subset of the injector config that decides whether a pod gets a sidecar.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InjectorConfig {
    #[serde(default)]
    pub policy: InjectionPolicy,
    #[serde(default)]
    pub always_inject_selector: Vec<LabelSelector>,
    #[serde(default)]
    pub never_inject_selector: Vec<LabelSelector>,
}

impl InjectorConfig {
    pub fn parse(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }
}

/// `istio-sidecar-injector`, suffixed with the revision unless it is empty or `default`.
pub fn injector_config_map_name(revision: Option<&str>) -> String {
    match revision {
        None | Some("") | Some("default") => INJECTOR_CONFIG_MAP.to_string(),
        Some(rev) => format!("{INJECTOR_CONFIG_MAP}-{rev}"),
    }
}

pub trait ConfigMapLookup {
    fn find(&self, name: &str, namespace: &str, cluster: &str) -> Result<&ConfigMapRecord, DetectError>;
}

/// Borrowed index over config map records, keyed by `name.namespace.cluster`.
#[derive(Debug, Default)]
pub struct ConfigMapSet<'a> {
    by_key: FxHashMap<String, &'a ConfigMapRecord>,
}

impl<'a> ConfigMapSet<'a> {
    pub fn new(records: &'a [ConfigMapRecord]) -> Self {
        Self { by_key: records.iter().map(|r| (r.key(), r)).collect() }
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

impl ConfigMapLookup for ConfigMapSet<'_> {
    fn find(&self, name: &str, namespace: &str, cluster: &str) -> Result<&ConfigMapRecord, DetectError> {
        let r = ClusterObjectRef::new(name, namespace, cluster);
        self.by_key.get(&r.key()).copied().ok_or(DetectError::ConfigMapNotFound(r))
    }
}

/// Reads and parses the injector config for `istio` from `config_maps`.
pub fn load_injector_config(istio: &IstioMesh, config_maps: &dyn ConfigMapLookup) -> Result<InjectorConfig, DetectError> {
    let install = &istio.installation;
    let name = injector_config_map_name(istio.revision.as_deref());
    let cm = config_maps.find(&name, &install.namespace, &install.cluster)?;
    let raw = cm
        .data
        .get(INJECTOR_CONFIG_KEY)
        .ok_or_else(|| DetectError::MissingConfigKey(cm.key()))?;
    InjectorConfig::parse(raw).map_err(|e| DetectError::ParseConfig { config_map: cm.key(), message: e.to_string() })
}
