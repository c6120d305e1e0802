//! Istio access control for a VirtualMesh with enforcement enabled: deny everything in
//! the control plane namespace, then re-open each east-west ingress gateway.

use std::collections::BTreeSet;

use metrics::counter;
use orbit_core::{AppliedVirtualMesh, GlobalAccessPolicy, InputSnapshot, Mesh, MeshProvider, ObjectMeta, ObjectRef, Reporter, TranslationError};
use orbit_output::meta::VIRTUAL_MESH_GVK;
use orbit_output::{
    append_parent, bounded_name, translated_labels, AuthorizationAction, AuthorizationPolicy, AuthorizationPolicySpec,
    OutputSnapshot, Rule, WorkloadSelector,
};
use tracing::{debug, warn};

pub const GLOBAL_ACCESS_CONTROL: &str = "global-access-control";
pub const ALLOW_INGRESS_GATEWAY: &str = "allow-ingress-gateway";

const TRANSLATOR: &str = "access";

#[derive(Debug, Default, Clone, Copy)]
pub struct AccessTranslator;

impl AccessTranslator {
    pub fn translate(
        &self,
        input: &InputSnapshot,
        mesh: &Mesh,
        virtual_mesh: &AppliedVirtualMesh,
        outputs: &mut OutputSnapshot,
        reporter: &dyn Reporter,
    ) {
        let MeshProvider::Istio(istio) = &mesh.provider else { return };
        match virtual_mesh.spec.global_access_policy {
            GlobalAccessPolicy::Enabled => {}
            GlobalAccessPolicy::MeshDefault | GlobalAccessPolicy::Disabled => return,
        }
        let namespace = &istio.installation.namespace;
        let cluster = &istio.installation.cluster;
        let parent = &virtual_mesh.reference;

        outputs.add(policy(
            ObjectMeta::new(GLOBAL_ACCESS_CONTROL, namespace.clone()).with_cluster(cluster.clone()),
            parent,
            AuthorizationPolicySpec::default(),
        ));

        let mut reported: BTreeSet<&ObjectRef> = BTreeSet::new();
        for gw in &mesh.status.applied_east_west_ingress_gateways {
            let Some(destination) = input.find_destination(&gw.destination_ref) else {
                if reported.insert(&gw.destination_ref) {
                    warn!(mesh = %mesh.key(), gateway = %gw.destination_ref, "access: ingress gateway destination not found");
                    counter!("reference_errors_total", 1u64, "kind" => "destination");
                    reporter.report_virtual_mesh_to_mesh(
                        mesh,
                        parent,
                        TranslationError::DestinationNotFound(gw.destination_ref.clone()),
                    );
                }
                continue;
            };
            let spec = AuthorizationPolicySpec {
                selector: Some(WorkloadSelector {
                    match_labels: destination.service().workload_selector_labels.clone(),
                }),
                action: Some(AuthorizationAction::Allow),
                rules: vec![Rule::default()],
            };
            let name = bounded_name(ALLOW_INGRESS_GATEWAY, &gw.destination_ref.key());
            outputs.add(policy(ObjectMeta::new(name, namespace.clone()).with_cluster(cluster.clone()), parent, spec));
        }
        debug!(mesh = %mesh.key(), gateways = mesh.status.applied_east_west_ingress_gateways.len(), "access: translated");
    }
}

fn policy(meta: ObjectMeta, parent: &ObjectRef, spec: AuthorizationPolicySpec) -> AuthorizationPolicy {
    let mut metadata = meta.with_labels(translated_labels(TRANSLATOR));
    append_parent(&mut metadata, VIRTUAL_MESH_GVK, parent);
    AuthorizationPolicy { metadata, spec }
}
