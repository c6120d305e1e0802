//! Input snapshot: the read-only world one translation pass works against.

use serde::{Deserialize, Serialize};

use crate::{
    ConfigMapRecord, Destination, KubernetesCluster, Mesh, NamespaceRecord, ObjectRef, Secret, Workload,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InputSnapshot {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub meshes: Vec<Mesh>,
    #[serde(default)]
    pub destinations: Vec<Destination>,
    #[serde(default)]
    pub workloads: Vec<Workload>,
    #[serde(default)]
    pub secrets: Vec<Secret>,
    #[serde(default)]
    pub kubernetes_clusters: Vec<KubernetesCluster>,
    #[serde(default)]
    pub namespaces: Vec<NamespaceRecord>,
    #[serde(default)]
    pub config_maps: Vec<ConfigMapRecord>,
}

impl InputSnapshot {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    pub fn with_mesh(mut self, mesh: Mesh) -> Self {
        self.meshes.push(mesh);
        self
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destinations.push(destination);
        self
    }

    pub fn with_workload(mut self, workload: Workload) -> Self {
        self.workloads.push(workload);
        self
    }

    pub fn with_namespace(mut self, namespace: NamespaceRecord) -> Self {
        self.namespaces.push(namespace);
        self
    }

    pub fn with_config_map(mut self, config_map: ConfigMapRecord) -> Self {
        self.config_maps.push(config_map);
        self
    }

    pub fn with_secret(mut self, secret: Secret) -> Self {
        self.secrets.push(secret);
        self
    }

    pub fn with_cluster(mut self, cluster: KubernetesCluster) -> Self {
        self.kubernetes_clusters.push(cluster);
        self
    }

    pub fn find_destination(&self, r: &ObjectRef) -> Option<&Destination> {
        self.destinations.iter().find(|d| d.metadata.name == r.name && d.metadata.namespace == r.namespace)
    }

    pub fn find_mesh(&self, r: &ObjectRef) -> Option<&Mesh> {
        self.meshes.iter().find(|m| m.metadata.name == r.name && m.metadata.namespace == r.namespace)
    }

    /// Namespace records on `cluster`, in snapshot order.
    pub fn namespaces_on<'a>(&'a self, cluster: &'a str) -> impl Iterator<Item = &'a NamespaceRecord> + 'a {
        self.namespaces.iter().filter(move |n| n.cluster == cluster)
    }
}
