//! Discovered topology (meshes, destinations, workloads) and the applied user intent
//! that upstream processes attach to them.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Container, PodTemplateSpec};
use serde::{Deserialize, Serialize};

use crate::{ClusterObjectRef, ObjectMeta, ObjectRef};

/// Trust domain Istio uses when the installation does not override it.
pub const DEFAULT_TRUST_DOMAIN: &str = "cluster.local";

// ---- meshes ----

/// Where a mesh control plane is installed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MeshInstallation {
    pub namespace: String,
    pub cluster: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IstioMesh {
    pub installation: MeshInstallation,
    #[serde(default = "default_trust_domain")]
    pub trust_domain: String,
    /// Control plane revision; selects a revision-suffixed injector config map.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

fn default_trust_domain() -> String {
    DEFAULT_TRUST_DOMAIN.to_string()
}

/// A provider installed into a single cluster with no extra settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InstalledMesh {
    pub installation: MeshInstallation,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppMesh {
    pub aws_name: String,
    pub region: String,
    #[serde(default)]
    pub clusters: Vec<String>,
}

/// Mesh provider variants. Adding a provider forces every translator match to handle it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum MeshProvider {
    Istio(IstioMesh),
    Linkerd(InstalledMesh),
    Osm(InstalledMesh),
    ConsulConnect(InstalledMesh),
    AppMesh(AppMesh),
}

impl MeshProvider {
    pub fn installation(&self) -> Option<&MeshInstallation> {
        match self {
            MeshProvider::Istio(istio) => Some(&istio.installation),
            MeshProvider::Linkerd(m) | MeshProvider::Osm(m) | MeshProvider::ConsulConnect(m) => Some(&m.installation),
            MeshProvider::AppMesh(_) => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            MeshProvider::Istio(_) => "istio",
            MeshProvider::Linkerd(_) => "linkerd",
            MeshProvider::Osm(_) => "osm",
            MeshProvider::ConsulConnect(_) => "consulconnect",
            MeshProvider::AppMesh(_) => "appmesh",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GlobalAccessPolicy {
    /// Leave enforcement to the provider's default (disabled for Istio).
    #[default]
    MeshDefault,
    Disabled,
    Enabled,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMeshSpec {
    #[serde(default)]
    pub meshes: Vec<ObjectRef>,
    #[serde(default)]
    pub global_access_policy: GlobalAccessPolicy,
}

/// The VirtualMesh currently applied to a mesh, as recorded on the mesh status.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppliedVirtualMesh {
    #[serde(rename = "ref")]
    pub reference: ObjectRef,
    #[serde(default)]
    pub spec: VirtualMeshSpec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppliedIngressGateway {
    pub destination_ref: ObjectRef,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MeshStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_virtual_mesh: Option<AppliedVirtualMesh>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub applied_east_west_ingress_gateways: Vec<AppliedIngressGateway>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Mesh {
    pub metadata: ObjectMeta,
    /// Written as a one-key map, `istio: {..}`, in both YAML and JSON.
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub provider: MeshProvider,
    #[serde(default)]
    pub status: MeshStatus,
}

impl Mesh {
    pub fn key(&self) -> String {
        self.metadata.object_ref().key()
    }

    pub fn object_ref(&self) -> ObjectRef {
        self.metadata.object_ref()
    }

    pub fn istio(&self) -> Option<&IstioMesh> {
        match &self.provider {
            MeshProvider::Istio(istio) => Some(istio),
            _ => None,
        }
    }

    /// Cluster hosting the control plane, when the provider is cluster-installed.
    pub fn cluster(&self) -> Option<&str> {
        self.provider.installation().map(|i| i.cluster.as_str())
    }
}

// ---- destinations ----

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KubeServicePort {
    pub port: u16,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub protocol: String,
}

/// Projection of the Kubernetes Service backing a destination.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KubeService {
    #[serde(rename = "ref")]
    pub reference: ClusterObjectRef,
    #[serde(default)]
    pub workload_selector_labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<KubeServicePort>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DestinationSpec {
    pub kube_service: KubeService,
    /// Owning mesh, when discovery already resolved it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh: Option<ObjectRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IdentitySelector {
    #[serde(default)]
    pub kube_service_account_refs: Vec<ClusterObjectRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccessPolicySpec {
    /// Empty means every source is allowed.
    #[serde(default)]
    pub source_selectors: Vec<IdentitySelector>,
    #[serde(default)]
    pub allowed_ports: Vec<u16>,
    #[serde(default)]
    pub allowed_methods: Vec<String>,
    #[serde(default)]
    pub allowed_paths: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppliedAccessPolicy {
    #[serde(rename = "ref")]
    pub reference: ObjectRef,
    #[serde(default)]
    pub spec: AccessPolicySpec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DestinationStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub applied_access_policies: Vec<AppliedAccessPolicy>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    pub metadata: ObjectMeta,
    pub spec: DestinationSpec,
    #[serde(default)]
    pub status: DestinationStatus,
}

impl Destination {
    pub fn object_ref(&self) -> ObjectRef {
        self.metadata.object_ref()
    }

    pub fn service(&self) -> &KubeService {
        &self.spec.kube_service
    }
}

// ---- workloads ----

/// A pod-template owner (deployment, statefulset, daemonset) on a workload cluster.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Workload {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub pod_template: PodTemplateSpec,
}

impl Workload {
    /// `name.namespace.cluster`
    pub fn key(&self) -> String {
        self.metadata.cluster_object_ref().key()
    }

    pub fn cluster(&self) -> &str {
        &self.metadata.cluster_name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.metadata.labels
    }

    pub fn pod_annotation(&self, key: &str) -> Option<&str> {
        self.pod_template
            .metadata
            .as_ref()
            .and_then(|m| m.annotations.as_ref())
            .and_then(|a| a.get(key))
            .map(|s| s.as_str())
    }

    pub fn containers(&self) -> &[Container] {
        self.pod_template.spec.as_ref().map(|s| s.containers.as_slice()).unwrap_or(&[])
    }

    pub fn host_network(&self) -> bool {
        self.pod_template.spec.as_ref().and_then(|s| s.host_network).unwrap_or(false)
    }
}

// ---- cluster records ----

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceRecord {
    pub name: String,
    pub cluster: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapRecord {
    pub name: String,
    pub namespace: String,
    pub cluster: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl ConfigMapRecord {
    pub fn key(&self) -> String {
        ClusterObjectRef::new(self.name.clone(), self.namespace.clone(), self.cluster.clone()).key()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
    pub metadata: ObjectMeta,
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, String>,
}

/// A workload cluster registered with the management plane.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesCluster {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster_domain: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::PodSpec;

    #[test]
    fn mesh_deserializes_with_provider_variant() {
        let yaml = r#"
metadata: { name: istiod-east, namespace: orbit }
provider:
  istio:
    installation: { namespace: istio-system, cluster: east }
status:
  appliedVirtualMesh:
    ref: { name: vm, namespace: orbit }
    spec: { globalAccessPolicy: ENABLED }
"#;
        let mesh: Mesh = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(mesh.key(), "istiod-east.orbit");
        assert_eq!(mesh.cluster(), Some("east"));
        let istio = mesh.istio().unwrap();
        assert_eq!(istio.trust_domain, DEFAULT_TRUST_DOMAIN);
        let vm = mesh.status.applied_virtual_mesh.unwrap();
        assert_eq!(vm.spec.global_access_policy, GlobalAccessPolicy::Enabled);
    }

    #[test]
    fn provider_is_a_single_key_map_in_json() {
        let mesh = Mesh {
            metadata: ObjectMeta::new("osm", "orbit"),
            provider: MeshProvider::Osm(InstalledMesh {
                installation: MeshInstallation { namespace: "osm-system".into(), cluster: "west".into(), version: String::new() },
            }),
            status: MeshStatus::default(),
        };
        let v = serde_json::to_value(&mesh).unwrap();
        assert_eq!(v["provider"]["osm"]["installation"]["cluster"], "west");
        let back: Mesh = serde_json::from_value(v).unwrap();
        assert_eq!(back, mesh);
    }

    #[test]
    fn appmesh_has_no_single_installation() {
        let p = MeshProvider::AppMesh(AppMesh { aws_name: "m".into(), region: "us-east-1".into(), clusters: vec!["a".into()] });
        assert!(p.installation().is_none());
        assert_eq!(p.type_name(), "appmesh");
    }

    #[test]
    fn workload_accessors_tolerate_missing_template_parts() {
        let w = Workload { metadata: ObjectMeta::new("w", "ns").with_cluster("c"), pod_template: PodTemplateSpec::default() };
        assert!(w.containers().is_empty());
        assert!(!w.host_network());
        assert_eq!(w.pod_annotation("x"), None);
        assert_eq!(w.key(), "w.ns.c");

        let w = Workload {
            pod_template: PodTemplateSpec {
                spec: Some(PodSpec { host_network: Some(true), ..Default::default() }),
                ..Default::default()
            },
            ..w
        };
        assert!(w.host_network());
    }
}
