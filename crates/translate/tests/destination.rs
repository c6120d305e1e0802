#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
use orbit_core::{
    AccessPolicySpec, AppliedAccessPolicy, ClusterObjectRef, CollectingReporter, Destination, DestinationSpec,
    DestinationStatus, IdentitySelector, InputSnapshot, IstioMesh, KubeService, Mesh, MeshInstallation, MeshProvider,
    MeshStatus, ObjectMeta, ObjectRef, Report, TranslationError, Workload,
};
use orbit_output::{AuthorizationAction, AuthorizationPolicy, OutputSnapshot, RuleTo};
use orbit_translate::Translator;

fn istio(name: &str, cluster: &str, trust_domain: &str) -> Mesh {
    Mesh {
        metadata: ObjectMeta::new(name, "orbit"),
        provider: MeshProvider::Istio(IstioMesh {
            installation: MeshInstallation { namespace: "istio-system".into(), cluster: cluster.into(), version: String::new() },
            trust_domain: trust_domain.into(),
            revision: None,
        }),
        status: MeshStatus::default(),
    }
}

fn reviews(mesh: Option<ObjectRef>, policies: Vec<AppliedAccessPolicy>) -> Destination {
    service("reviews", mesh, policies)
}

fn service(name: &str, mesh: Option<ObjectRef>, policies: Vec<AppliedAccessPolicy>) -> Destination {
    Destination {
        metadata: ObjectMeta::new(format!("{name}-bookinfo-east"), "orbit"),
        spec: DestinationSpec {
            kube_service: KubeService {
                reference: ClusterObjectRef::new(name, "bookinfo", "east"),
                workload_selector_labels: BTreeMap::from([("app".to_string(), name.to_string())]),
                ports: vec![],
            },
            mesh,
        },
        status: DestinationStatus { applied_access_policies: policies },
    }
}

fn policy(name: &str, sources: &[ClusterObjectRef]) -> AppliedAccessPolicy {
    AppliedAccessPolicy {
        reference: ObjectRef::new(name, "orbit"),
        spec: AccessPolicySpec {
            source_selectors: if sources.is_empty() {
                vec![]
            } else {
                vec![IdentitySelector { kube_service_account_refs: sources.to_vec() }]
            },
            allowed_ports: vec![9080],
            allowed_methods: vec!["GET".into()],
            allowed_paths: vec![],
        },
    }
}

fn sidecar_workload() -> Workload {
    Workload {
        metadata: ObjectMeta::new("reviews-v1", "bookinfo")
            .with_cluster("east")
            .with_labels(BTreeMap::from([("app".to_string(), "reviews".to_string()), ("version".to_string(), "v1".to_string())])),
        pod_template: PodTemplateSpec {
            metadata: None,
            spec: Some(PodSpec {
                containers: vec![Container { name: "istio-proxy".into(), ..Default::default() }],
                ..Default::default()
            }),
        },
    }
}

fn translate(input: &InputSnapshot) -> (Vec<AuthorizationPolicy>, Vec<Report>) {
    let mut remote = OutputSnapshot::new("remote");
    let mut local = OutputSnapshot::new("local");
    let reporter = CollectingReporter::new();
    Translator::default().translate(input, &mut remote, &mut local, &reporter);
    (remote.authorization_policies().cloned().collect(), reporter.reports())
}

#[test]
fn renders_principals_per_source_cluster_trust_domain() {
    let input = InputSnapshot::new("s")
        .with_mesh(istio("istiod-east", "east", "east.local"))
        .with_mesh(istio("istiod-west", "west", "west.local"))
        .with_destination(reviews(
            Some(ObjectRef::new("istiod-east", "orbit")),
            vec![policy(
                "allow-productpage",
                &[
                    ClusterObjectRef::new("productpage", "bookinfo", "west"),
                    ClusterObjectRef::new("ratings", "bookinfo", "east"),
                ],
            )],
        ));
    let (policies, reports) = translate(&input);
    assert!(reports.is_empty());
    assert_eq!(policies.len(), 1);
    let ap = &policies[0];
    assert_eq!(ap.metadata.name, "access-policy-allow-productpage.orbit.reviews");
    assert_eq!(ap.metadata.namespace, "bookinfo");
    assert_eq!(ap.metadata.cluster_name, "east");
    assert_eq!(ap.spec.action, Some(AuthorizationAction::Allow));
    let rule = &ap.spec.rules[0];
    assert_eq!(
        rule.from[0].source.principals,
        vec!["east.local/ns/bookinfo/sa/ratings", "west.local/ns/bookinfo/sa/productpage"]
    );
    assert_eq!(rule.to, vec![RuleTo { operation: orbit_output::Operation { ports: vec!["9080".into()], methods: vec!["GET".into()], paths: vec![] } }]);
}

#[test]
fn no_source_selectors_allows_all_callers() {
    let input = InputSnapshot::new("s")
        .with_mesh(istio("istiod-east", "east", "cluster.local"))
        .with_destination(reviews(Some(ObjectRef::new("istiod-east", "orbit")), vec![policy("open", &[])]));
    let (policies, _) = translate(&input);
    assert!(policies[0].spec.rules[0].from.is_empty());
}

#[test]
fn unresolvable_sources_never_widen_to_allow_all() {
    let input = InputSnapshot::new("s")
        .with_mesh(istio("istiod-east", "east", "cluster.local"))
        .with_destination(reviews(
            Some(ObjectRef::new("istiod-east", "orbit")),
            vec![policy("remote-only", &[ClusterObjectRef::new("web", "frontend", "nowhere")])],
        ));
    let (policies, reports) = translate(&input);
    assert!(policies.is_empty());
    assert_eq!(reports.len(), 1);
    assert_eq!(
        reports[0].error(),
        &TranslationError::NoMeshForCluster(ClusterObjectRef::new("web", "frontend", "nowhere"))
    );
}

#[test]
fn dangling_mesh_ref_reported_per_policy() {
    let input = InputSnapshot::new("s").with_destination(reviews(
        Some(ObjectRef::new("gone", "orbit")),
        vec![policy("a", &[]), policy("b", &[])],
    ));
    let (policies, reports) = translate(&input);
    assert!(policies.is_empty());
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| matches!(r, Report::AccessPolicyToDestination { .. })));
}

#[test]
fn mesh_resolved_through_workload_attribution() {
    let input = InputSnapshot::new("s")
        .with_mesh(istio("istiod-east", "east", "cluster.local"))
        .with_workload(sidecar_workload())
        .with_destination(reviews(None, vec![policy("open", &[])]));
    let (policies, _) = translate(&input);
    assert_eq!(policies.len(), 1);

    let unattributed = InputSnapshot::new("s")
        .with_mesh(istio("istiod-east", "east", "cluster.local"))
        .with_destination(reviews(None, vec![policy("open", &[])]));
    assert!(translate(&unattributed).0.is_empty());
}

#[test]
fn shared_policy_yields_one_output_per_service() {
    let mesh = Some(ObjectRef::new("istiod-east", "orbit"));
    let input = InputSnapshot::new("s")
        .with_mesh(istio("istiod-east", "east", "cluster.local"))
        .with_destination(service("reviews", mesh.clone(), vec![policy("allow-all", &[])]))
        .with_destination(service("ratings", mesh, vec![policy("allow-all", &[])]));
    let (policies, reports) = translate(&input);
    assert!(reports.is_empty());
    assert_eq!(policies.len(), 2);
    let selected: Vec<_> = policies
        .iter()
        .map(|p| p.spec.selector.as_ref().unwrap().match_labels["app"].as_str())
        .collect();
    assert_eq!(selected, vec!["ratings", "reviews"]);
}
