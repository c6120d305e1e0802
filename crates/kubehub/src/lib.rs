//! Orbit kubehub: reads the namespaces and sidecar injector config maps of the current
//! kube context and converts them into detector inputs.

#![forbid(unsafe_code)]

use std::time::Instant;

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace};
use kube::{api::ListParams, Api, Client};
use metrics::histogram;
use orbit_core::{ConfigMapRecord, InputSnapshot, NamespaceRecord};
use orbit_detect::config::INJECTOR_CONFIG_MAP;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InjectionInputs {
    pub cluster: String,
    pub namespaces: Vec<NamespaceRecord>,
    pub config_maps: Vec<ConfigMapRecord>,
}

impl InjectionInputs {
    /// Replaces everything `input` holds for this cluster with the loaded records.
    pub fn apply_to(self, input: &mut InputSnapshot) {
        input.namespaces.retain(|n| n.cluster != self.cluster);
        input.config_maps.retain(|c| c.cluster != self.cluster);
        input.namespaces.extend(self.namespaces);
        input.config_maps.extend(self.config_maps);
    }
}

pub fn namespace_record(ns: &Namespace, cluster: &str) -> NamespaceRecord {
    NamespaceRecord {
        name: ns.metadata.name.clone().unwrap_or_default(),
        cluster: cluster.to_string(),
        labels: ns.metadata.labels.clone().unwrap_or_default(),
    }
}

pub fn config_map_record(cm: &ConfigMap, cluster: &str) -> ConfigMapRecord {
    ConfigMapRecord {
        name: cm.metadata.name.clone().unwrap_or_default(),
        namespace: cm.metadata.namespace.clone().unwrap_or_default(),
        cluster: cluster.to_string(),
        data: cm.data.clone().unwrap_or_default(),
    }
}

fn is_injector_config_map(cm: &ConfigMap) -> bool {
    cm.metadata.name.as_deref().is_some_and(|n| n.starts_with(INJECTOR_CONFIG_MAP))
}

/// Lists all namespaces and the `istio-sidecar-injector*` config maps in each of
/// `mesh_namespaces`, tagging every record with `cluster`.
pub async fn load_injection_inputs(cluster: &str, mesh_namespaces: &[String]) -> Result<InjectionInputs> {
    let started = Instant::now();
    let client = Client::try_default().await.context("building kube client")?;

    let ns_api: Api<Namespace> = Api::all(client.clone());
    let namespaces: Vec<NamespaceRecord> = ns_api
        .list(&ListParams::default())
        .await
        .context("listing namespaces")?
        .items
        .iter()
        .map(|ns| namespace_record(ns, cluster))
        .collect();

    let mut config_maps = Vec::new();
    for ns in mesh_namespaces {
        let cm_api: Api<ConfigMap> = Api::namespaced(client.clone(), ns);
        let list = cm_api
            .list(&ListParams::default())
            .await
            .with_context(|| format!("listing config maps in {ns}"))?;
        let before = config_maps.len();
        config_maps.extend(list.items.iter().filter(|cm| is_injector_config_map(cm)).map(|cm| config_map_record(cm, cluster)));
        debug!(namespace = %ns, found = config_maps.len() - before, "kubehub: injector config maps");
    }

    histogram!("kubehub_load_ms", started.elapsed().as_secs_f64() * 1000.0);
    info!(cluster, namespaces = namespaces.len(), config_maps = config_maps.len(), "kubehub: injection inputs loaded");
    Ok(InjectionInputs { cluster: cluster.to_string(), namespaces, config_maps })
}
