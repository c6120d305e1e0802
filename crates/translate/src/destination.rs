//! Access policies applied to a destination become ALLOW authorization policies next to
//! the service, naming their allowed callers by SPIFFE principal.

use metrics::counter;
use orbit_core::{
    AppliedAccessPolicy, ClusterObjectRef, Destination, InputSnapshot, Mesh, ObjectMeta, ObjectRef, Reporter,
    TranslationError,
};
use orbit_detect::MeshMembership;
use orbit_output::meta::ACCESS_POLICY_GVK;
use orbit_output::{
    append_parent, bounded_name, translated_labels, AuthorizationAction, AuthorizationPolicy, AuthorizationPolicySpec,
    Operation, OutputSnapshot, Rule, RuleFrom, RuleTo, Source, WorkloadSelector,
};
use tracing::{debug, trace, warn};

pub const ACCESS_POLICY_PREFIX: &str = "access-policy";

const TRANSLATOR: &str = "access-policy";

pub struct DestinationTranslator<'a> {
    input: &'a InputSnapshot,
    membership: &'a MeshMembership,
}

impl<'a> DestinationTranslator<'a> {
    pub fn new(input: &'a InputSnapshot, membership: &'a MeshMembership) -> Self {
        Self { input, membership }
    }

    pub fn translate(&self, destination: &Destination, outputs: &mut OutputSnapshot, reporter: &dyn Reporter) {
        let policies = &destination.status.applied_access_policies;
        if policies.is_empty() {
            return;
        }
        let Some(mesh) = self.resolve_mesh(destination, reporter) else { return };
        if mesh.istio().is_none() {
            trace!(destination = %destination.object_ref(), mesh = %mesh.key(), "destination: mesh is not istio");
            return;
        }
        for policy in policies {
            if let Some(ap) = self.translate_policy(destination, policy, reporter) {
                outputs.add(ap);
            }
        }
    }

    fn resolve_mesh(&self, destination: &Destination, reporter: &dyn Reporter) -> Option<&'a Mesh> {
        if let Some(r) = &destination.spec.mesh {
            let found = self.input.find_mesh(r);
            if found.is_none() {
                warn!(destination = %destination.object_ref(), mesh = %r, "destination: mesh not found");
                for policy in &destination.status.applied_access_policies {
                    counter!("reference_errors_total", 1u64, "kind" => "mesh");
                    reporter.report_access_policy_to_destination(
                        destination,
                        &policy.reference,
                        TranslationError::MeshNotFound(r.clone()),
                    );
                }
            }
            return found;
        }

        let svc = destination.service();
        if svc.workload_selector_labels.is_empty() {
            return None;
        }
        let mesh_key = self
            .input
            .workloads
            .iter()
            .filter(|w| w.cluster() == svc.reference.cluster_name && w.namespace() == svc.reference.namespace)
            .filter(|w| svc.workload_selector_labels.iter().all(|(k, v)| w.labels().get(k) == Some(v)))
            .find_map(|w| self.membership.mesh_for(w))?;
        self.input.meshes.iter().find(|m| m.key() == mesh_key)
    }

    fn translate_policy(
        &self,
        destination: &Destination,
        policy: &AppliedAccessPolicy,
        reporter: &dyn Reporter,
    ) -> Option<AuthorizationPolicy> {
        let svc = destination.service();
        let mut requested = 0usize;
        let mut principals = Vec::new();
        for sa in policy.spec.source_selectors.iter().flat_map(|s| &s.kube_service_account_refs) {
            requested += 1;
            match self.trust_domain(&sa.cluster_name) {
                Some(td) => principals.push(principal(td, sa)),
                None => {
                    counter!("reference_errors_total", 1u64, "kind" => "cluster");
                    reporter.report_access_policy_to_destination(
                        destination,
                        &policy.reference,
                        TranslationError::NoMeshForCluster(sa.clone()),
                    );
                }
            }
        }
        if requested > 0 && principals.is_empty() {
            debug!(destination = %destination.object_ref(), policy = %policy.reference, "destination: no source resolved, skipping policy");
            return None;
        }
        principals.sort();
        principals.dedup();

        let operation = Operation {
            ports: policy.spec.allowed_ports.iter().map(|p| p.to_string()).collect(),
            methods: policy.spec.allowed_methods.clone(),
            paths: policy.spec.allowed_paths.clone(),
        };
        let rule = Rule {
            from: if principals.is_empty() { vec![] } else { vec![RuleFrom { source: Source { principals } }] },
            to: if operation.is_empty() { vec![] } else { vec![RuleTo { operation }] },
        };

        let mut metadata = ObjectMeta::new(
            access_policy_name(&policy.reference, &svc.reference),
            svc.reference.namespace.clone(),
        )
        .with_cluster(svc.reference.cluster_name.clone())
        .with_labels(translated_labels(TRANSLATOR));
        append_parent(&mut metadata, ACCESS_POLICY_GVK, &policy.reference);

        Some(AuthorizationPolicy {
            metadata,
            spec: AuthorizationPolicySpec {
                selector: Some(WorkloadSelector { match_labels: svc.workload_selector_labels.clone() }),
                action: Some(AuthorizationAction::Allow),
                rules: vec![rule],
            },
        })
    }

    fn trust_domain(&self, cluster: &str) -> Option<&'a str> {
        self.input
            .meshes
            .iter()
            .filter_map(|m| m.istio())
            .find(|i| i.installation.cluster == cluster)
            .map(|i| i.trust_domain.as_str())
    }
}

/// One policy applied to several services in a namespace needs one output per service.
/// Service names and namespaces carry no dots, so `<name>.<namespace>.<service>` stays
/// unique within the service's namespace and cluster.
pub fn access_policy_name(policy: &ObjectRef, service: &ClusterObjectRef) -> String {
    bounded_name(ACCESS_POLICY_PREFIX, &format!("{}.{}", policy.key(), service.name))
}

/// `<trustDomain>/ns/<namespace>/sa/<name>`
pub fn principal(trust_domain: &str, sa: &ClusterObjectRef) -> String {
    format!("{trust_domain}/ns/{}/sa/{}", sa.namespace, sa.name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn principal_format() {
        let sa = ClusterObjectRef::new("productpage", "bookinfo", "west");
        assert_eq!(principal("cluster.local", &sa), "cluster.local/ns/bookinfo/sa/productpage");
    }

    #[test]
    fn access_policy_name_includes_service() {
        let ap = ObjectRef::new("allow-all", "orbit");
        let reviews = ClusterObjectRef::new("reviews", "bookinfo", "east");
        let ratings = ClusterObjectRef::new("ratings", "bookinfo", "east");
        assert_eq!(access_policy_name(&ap, &reviews), "access-policy-allow-all.orbit.reviews");
        assert_ne!(access_policy_name(&ap, &reviews), access_policy_name(&ap, &ratings));
    }
}
