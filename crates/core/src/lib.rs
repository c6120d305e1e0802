//! Orbit core types: discovered mesh topology, user intent and the reporting seam
//! shared by the detector and the translators.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub mod model;
pub mod report;
pub mod snapshot;

pub use model::{
    AccessPolicySpec, AppMesh, AppliedAccessPolicy, AppliedIngressGateway, AppliedVirtualMesh,
    ConfigMapRecord, Destination, DestinationSpec, DestinationStatus, GlobalAccessPolicy,
    IdentitySelector, InstalledMesh, IstioMesh, KubeService, KubeServicePort, KubernetesCluster,
    Mesh, MeshInstallation, MeshProvider, MeshStatus, NamespaceRecord, Secret, VirtualMeshSpec,
    Workload,
};
pub use report::{CollectingReporter, LogReporter, Report, Reporter, TranslationError};
pub use snapshot::InputSnapshot;

pub mod prelude {
    pub use super::{
        ClusterObjectRef, Destination, InputSnapshot, Mesh, MeshProvider, ObjectMeta, ObjectRef,
        Reporter, TranslationError, Workload,
    };
}

/// Reference to a namespaced object in the management plane.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRef {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

impl ObjectRef {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self { name: name.into(), namespace: namespace.into() }
    }

    /// Stable identity key: `name.namespace`.
    pub fn key(&self) -> String {
        format!("{}.{}", self.name, self.namespace)
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Reference to a namespaced object living on a specific workload cluster.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct ClusterObjectRef {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub cluster_name: String,
}

impl ClusterObjectRef {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, cluster: impl Into<String>) -> Self {
        Self { name: name.into(), namespace: namespace.into(), cluster_name: cluster.into() }
    }

    /// Stable identity key: `name.namespace.cluster`.
    pub fn key(&self) -> String {
        format!("{}.{}.{}", self.name, self.namespace, self.cluster_name)
    }
}

/// Object metadata shared by inputs and outputs.
///
/// `cluster_name` is empty for objects that live in the management plane.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster_name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ObjectMeta {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self { name: name.into(), namespace: namespace.into(), ..Default::default() }
    }

    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster_name = cluster.into();
        self
    }

    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels.extend(labels);
        self
    }

    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef::new(self.name.clone(), self.namespace.clone())
    }

    pub fn cluster_object_ref(&self) -> ClusterObjectRef {
        ClusterObjectRef::new(self.name.clone(), self.namespace.clone(), self.cluster_name.clone())
    }
}
