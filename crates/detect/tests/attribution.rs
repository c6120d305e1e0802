#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta as KubeMeta;
use orbit_core::{
    ConfigMapRecord, InstalledMesh, IstioMesh, Mesh, MeshInstallation, MeshProvider, MeshStatus, NamespaceRecord,
    ObjectMeta, Workload,
};
use orbit_detect::{ConfigMapSet, DetectError, Detector};

const CLUSTER: &str = "cluster";
const NS: &str = "workload-ns";

fn istio_mesh(name: &str, cluster: &str) -> Mesh {
    Mesh {
        metadata: ObjectMeta::new(name, "orbit"),
        provider: MeshProvider::Istio(IstioMesh {
            installation: MeshInstallation { namespace: "istio-system".into(), cluster: cluster.into(), version: String::new() },
            trust_domain: "cluster.local".into(),
            revision: None,
        }),
        status: MeshStatus::default(),
    }
}

fn injector_cm(policy: &str) -> ConfigMapRecord {
    ConfigMapRecord {
        name: "istio-sidecar-injector".into(),
        namespace: "istio-system".into(),
        cluster: CLUSTER.into(),
        data: BTreeMap::from([("config".to_string(), format!("policy: {policy}"))]),
    }
}

fn namespace(labels: &[(&str, &str)]) -> NamespaceRecord {
    NamespaceRecord {
        name: NS.into(),
        cluster: CLUSTER.into(),
        labels: labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
    }
}

fn workload(annotation: Option<&str>, containers: &[&str], host_network: bool) -> Workload {
    Workload {
        metadata: ObjectMeta::new("w", NS).with_cluster(CLUSTER),
        pod_template: PodTemplateSpec {
            metadata: Some(KubeMeta {
                annotations: annotation
                    .map(|v| BTreeMap::from([("sidecar.istio.io/inject".to_string(), v.to_string())])),
                ..Default::default()
            }),
            spec: Some(PodSpec {
                containers: containers.iter().map(|n| Container { name: n.to_string(), ..Default::default() }).collect(),
                host_network: Some(host_network),
                ..Default::default()
            }),
        },
    }
}

fn detect(namespaces: &[NamespaceRecord], w: &Workload) -> Option<String> {
    let cms = vec![injector_cm("disabled")];
    let set = ConfigMapSet::new(&cms);
    let meshes = vec![istio_mesh("istiod", CLUSTER)];
    let mut d = Detector::new(namespaces, &set);
    d.detect_mesh_for_workload(w, &meshes).map(|m| m.key())
}

#[test]
fn annotated_for_injection() {
    assert_eq!(detect(&[namespace(&[])], &workload(Some("true"), &["app"], false)).as_deref(), Some("istiod.orbit"));
}

#[test]
fn legacy_namespace_label() {
    let ns = namespace(&[("istio-injection", "enabled")]);
    assert_eq!(detect(&[ns], &workload(None, &["app"], false)).as_deref(), Some("istiod.orbit"));
}

#[test]
fn revision_namespace_label() {
    let ns = namespace(&[("istio.io/rev", "revision-1234")]);
    assert_eq!(detect(&[ns], &workload(None, &["app"], false)).as_deref(), Some("istiod.orbit"));
}

#[test]
fn not_labeled_for_injection() {
    assert_eq!(detect(&[namespace(&[])], &workload(None, &["app"], false)), None);
}

#[test]
fn namespace_labeled_but_workload_opts_out() {
    let ns = namespace(&[("istio-injection", "enabled")]);
    assert_eq!(detect(&[ns], &workload(Some("false"), &["app"], false)), None);
    let ns = namespace(&[("istio.io/rev", "revision-1234")]);
    assert_eq!(detect(&[ns], &workload(Some("false"), &["app"], false)), None);
}

#[test]
fn proxy_container_present() {
    assert_eq!(
        detect(&[namespace(&[])], &workload(None, &["app", "istio-proxy"], false)).as_deref(),
        Some("istiod.orbit")
    );
}

#[test]
fn host_network_never_injected() {
    let ns = namespace(&[("istio-injection", "enabled")]);
    assert_eq!(detect(&[ns], &workload(Some("true"), &["app"], true)), None);
}

#[test]
fn skips_other_clusters_and_providers() {
    let cms = vec![injector_cm("enabled")];
    let set = ConfigMapSet::new(&cms);
    let meshes = vec![
        Mesh {
            metadata: ObjectMeta::new("linkerd", "orbit"),
            provider: MeshProvider::Linkerd(InstalledMesh {
                installation: MeshInstallation { namespace: "linkerd".into(), cluster: CLUSTER.into(), version: String::new() },
            }),
            status: MeshStatus::default(),
        },
        istio_mesh("istiod-remote", "other"),
        istio_mesh("istiod", CLUSTER),
    ];
    let mut d = Detector::new(&[], &set);
    let got = d.detect_mesh_for_workload(&workload(None, &["app", "istio-proxy"], false), &meshes);
    assert_eq!(got.map(|m| m.key()).as_deref(), Some("istiod.orbit"));
}

#[test]
fn enabled_policy_injects_by_default_and_first_mesh_wins() {
    let cms = vec![injector_cm("enabled")];
    let set = ConfigMapSet::new(&cms);
    let meshes = vec![istio_mesh("first", CLUSTER), istio_mesh("second", CLUSTER)];
    let mut d = Detector::new(&[], &set);
    let w = workload(None, &["app"], false);
    assert_eq!(d.detect_mesh_for_workload(&w, &meshes).map(|m| m.key()).as_deref(), Some("first.orbit"));
}

#[test]
fn missing_injector_config_is_recorded_once_per_mesh() {
    let set = ConfigMapSet::new(&[]);
    let meshes = vec![istio_mesh("istiod", CLUSTER)];
    let mut d = Detector::new(&[namespace(&[("istio-injection", "enabled")])], &set);
    let mut annotated = workload(Some("true"), &["app"], false);
    annotated.metadata.name = "w2".into();
    let workloads = vec![workload(None, &["app"], false), annotated];
    let membership = d.attribute(&workloads, &meshes);
    assert_eq!(membership.len(), 2);
    assert_eq!(membership.mesh_for(&workloads[1]), Some("istiod.orbit"));
    assert_eq!(d.anomalies().len(), 1);
    assert!(matches!(d.anomalies()[0].error, DetectError::ConfigMapNotFound(_)));
}

#[test]
fn unparsable_config_degrades_to_disabled() {
    let mut cm = injector_cm("enabled");
    cm.data.insert("config".into(), "policy: [".into());
    let cms = vec![cm];
    let set = ConfigMapSet::new(&cms);
    let meshes = vec![istio_mesh("istiod", CLUSTER)];
    let mut d = Detector::new(&[], &set);
    assert!(d.detect_mesh_for_workload(&workload(None, &["app"], false), &meshes).is_none());
    assert!(matches!(d.anomalies()[0].error, DetectError::ParseConfig { .. }));
}
