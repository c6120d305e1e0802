//! Orbit output: typed mesh-provider objects and the mergeable snapshot translators
//! write into.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use orbit_core::{ObjectMeta, Secret};
use serde::{Deserialize, Serialize};
use tracing::trace;

pub mod meta;

pub use meta::{append_parent, bounded_name, name_hash, sanitize_name, translated_labels};

// ---- istio authorization policy ----

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorizationAction {
    Allow,
    Deny,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadSelector {
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub principals: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RuleFrom {
    pub source: Source,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<String>,
}

impl Operation {
    pub fn is_empty(&self) -> bool {
        self.ports.is_empty() && self.methods.is_empty() && self.paths.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RuleTo {
    pub operation: Operation,
}

/// An empty rule matches every request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub from: Vec<RuleFrom>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<RuleTo>,
}

/// An empty spec denies every request to the namespace it is placed in.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationPolicySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<WorkloadSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<AuthorizationAction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationPolicy {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: AuthorizationPolicySpec,
}

// ---- output objects ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceType {
    AuthorizationPolicy,
    Secret,
}

impl ResourceType {
    /// `<group>/<version>, Kind=<Kind>`
    pub fn gvk(self) -> &'static str {
        match self {
            ResourceType::AuthorizationPolicy => "security.istio.io/v1beta1, Kind=AuthorizationPolicy",
            ResourceType::Secret => "v1, Kind=Secret",
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceType::AuthorizationPolicy => f.write_str("AuthorizationPolicy"),
            ResourceType::Secret => f.write_str("Secret"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind")]
pub enum OutputObject {
    AuthorizationPolicy(AuthorizationPolicy),
    Secret(Secret),
}

/// Identity of an output object: `(cluster, namespace, name)`.
pub type ObjectKey = (String, String, String);

impl OutputObject {
    pub fn resource_type(&self) -> ResourceType {
        match self {
            OutputObject::AuthorizationPolicy(_) => ResourceType::AuthorizationPolicy,
            OutputObject::Secret(_) => ResourceType::Secret,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            OutputObject::AuthorizationPolicy(p) => &p.metadata,
            OutputObject::Secret(s) => &s.metadata,
        }
    }

    pub fn key(&self) -> ObjectKey {
        let m = self.metadata();
        (m.cluster_name.clone(), m.namespace.clone(), m.name.clone())
    }
}

impl From<AuthorizationPolicy> for OutputObject {
    fn from(p: AuthorizationPolicy) -> Self {
        OutputObject::AuthorizationPolicy(p)
    }
}

impl From<Secret> for OutputObject {
    fn from(s: Secret) -> Self {
        OutputObject::Secret(s)
    }
}

// ---- snapshot ----

/// Mergeable set of output objects grouped by resource type.
///
/// Within a type, objects are unique by `(cluster, namespace, name)`; adding an object
/// with an existing identity replaces it. Iteration is sorted by type then identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputSnapshot {
    name: String,
    objects: BTreeMap<ResourceType, BTreeMap<ObjectKey, OutputObject>>,
}

impl OutputSnapshot {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), objects: BTreeMap::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add(&mut self, obj: impl Into<OutputObject>) {
        let obj = obj.into();
        let rt = obj.resource_type();
        let key = obj.key();
        if self.objects.entry(rt).or_default().insert(key, obj).is_some() {
            trace!(snapshot = %self.name, kind = %rt, "output: replaced object");
        }
    }

    pub fn add_authorization_policies(&mut self, policies: impl IntoIterator<Item = AuthorizationPolicy>) {
        for p in policies {
            self.add(p);
        }
    }

    pub fn add_secrets(&mut self, secrets: impl IntoIterator<Item = Secret>) {
        for s in secrets {
            self.add(s);
        }
    }

    /// Union with `other`; on identity collisions `other`'s object wins.
    pub fn merge(&mut self, other: &OutputSnapshot) {
        for (rt, objs) in &other.objects {
            let dst = self.objects.entry(*rt).or_default();
            for (k, o) in objs {
                dst.insert(k.clone(), o.clone());
            }
        }
    }

    pub fn merged(mut self, other: &OutputSnapshot) -> Self {
        self.merge(other);
        self
    }

    pub fn for_each_object(&self, mut f: impl FnMut(&OutputObject)) {
        for objs in self.objects.values() {
            objs.values().for_each(&mut f);
        }
    }

    /// Mutable visit; the identity fields must not be changed.
    pub fn for_each_object_mut(&mut self, mut f: impl FnMut(&mut OutputObject)) {
        for objs in self.objects.values_mut() {
            objs.values_mut().for_each(&mut f);
        }
    }

    pub fn objects_of(&self, rt: ResourceType) -> impl Iterator<Item = &OutputObject> + '_ {
        self.objects.get(&rt).into_iter().flat_map(|m| m.values())
    }

    pub fn authorization_policies(&self) -> impl Iterator<Item = &AuthorizationPolicy> + '_ {
        self.objects_of(ResourceType::AuthorizationPolicy).filter_map(|o| match o {
            OutputObject::AuthorizationPolicy(p) => Some(p),
            _ => None,
        })
    }

    pub fn get(&self, rt: ResourceType, cluster: &str, namespace: &str, name: &str) -> Option<&OutputObject> {
        self.objects.get(&rt)?.get(&(cluster.to_string(), namespace.to_string(), name.to_string()))
    }

    pub fn objects(&self) -> Vec<&OutputObject> {
        self.objects.values().flat_map(|m| m.values()).collect()
    }

    pub fn len(&self) -> usize {
        self.objects.values().map(|m| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
