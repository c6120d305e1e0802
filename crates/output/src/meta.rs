//! Metadata stamped on every emitted object: translated-by labels, parent annotations
//! and length-bounded names.

use std::collections::BTreeMap;

use orbit_core::{ObjectMeta, ObjectRef};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Kubernetes object names are DNS subdomains but label values cap at 63.
pub const MAX_NAME_LEN: usize = 63;

pub const AGENT_LABEL: &str = "agent.orbit.dev";
pub const TRANSLATOR_LABEL: &str = "translator.orbit.dev";
pub const PARENTS_ANNOTATION: &str = "parents.orbit.dev";

pub const VIRTUAL_MESH_GVK: &str = "networking.orbit.dev/v1, Kind=VirtualMesh";
pub const ACCESS_POLICY_GVK: &str = "networking.orbit.dev/v1, Kind=AccessPolicy";

pub fn translated_labels(translator: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (AGENT_LABEL.to_string(), "orbit".to_string()),
        (TRANSLATOR_LABEL.to_string(), translator.to_string()),
    ])
}

/// Records `parent` under `gvk` in the parents annotation, keeping earlier entries.
///
/// The annotation is a JSON object `{"<gvk>": [{"name": .., "namespace": ..}]}`. An
/// unreadable existing value is replaced.
pub fn append_parent(meta: &mut ObjectMeta, gvk: &str, parent: &ObjectRef) {
    let mut parents: BTreeMap<String, Vec<ObjectRef>> = match meta.annotations.get(PARENTS_ANNOTATION) {
        Some(raw) => serde_json::from_str(raw).unwrap_or_else(|e| {
            debug!(object = %meta.name, error = %e, "meta: discarding unreadable parents annotation");
            BTreeMap::new()
        }),
        None => BTreeMap::new(),
    };
    let refs = parents.entry(gvk.to_string()).or_default();
    if !refs.contains(parent) {
        refs.push(parent.clone());
    }
    if let Ok(raw) = serde_json::to_string(&parents) {
        meta.annotations.insert(PARENTS_ANNOTATION.to_string(), raw);
    }
}

/// Reads back the parents annotation; empty when absent or unreadable.
pub fn parents(meta: &ObjectMeta) -> BTreeMap<String, Vec<ObjectRef>> {
    meta.annotations
        .get(PARENTS_ANNOTATION)
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_default()
}

/// Lowercases and replaces anything outside `[a-z0-9.-]` with `-`, trimming
/// non-alphanumeric ends.
pub fn sanitize_name(s: &str) -> String {
    let mapped: String = s
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '-' }
        })
        .collect();
    mapped.trim_matches(|c: char| !c.is_ascii_alphanumeric()).to_string()
}

/// First 16 hex chars of the SHA-256 of `key`.
pub fn name_hash(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    hex::encode(&digest[..8])
}

/// `<prefix>-<sanitized key>`, or `<prefix>-<name_hash(key)>` when that would exceed
/// [`MAX_NAME_LEN`].
pub fn bounded_name(prefix: &str, key: &str) -> String {
    let name = format!("{prefix}-{}", sanitize_name(key));
    if name.len() <= MAX_NAME_LEN {
        return name;
    }
    format!("{prefix}-{}", name_hash(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_name_keeps_short_keys_readable() {
        let r = ObjectRef::new("east-gw", "istio-system");
        assert_eq!(bounded_name("allow-ingress-gateway", &r.key()), "allow-ingress-gateway-east-gw.istio-system");
    }

    #[test]
    fn bounded_name_hashes_long_keys_stably() {
        let r = ObjectRef::new("a-very-long-gateway-service-name-for-testing", "istio-gateways");
        let a = bounded_name("allow-ingress-gateway", &r.key());
        assert_eq!(a, format!("allow-ingress-gateway-{}", name_hash(&r.key())));
        assert!(a.len() <= MAX_NAME_LEN);
        assert_eq!(a, bounded_name("allow-ingress-gateway", &r.key()));
        let other = ObjectRef::new("a-very-long-gateway-service-name-for-testing", "istio-gateway");
        assert_ne!(a, bounded_name("allow-ingress-gateway", &other.key()));
    }

    #[test]
    fn name_hash_is_truncated_sha256() {
        assert_eq!(name_hash(""), "e3b0c44298fc1c14");
        assert_eq!(name_hash("abc"), "ba7816bf8f01cfea");
    }

    #[test]
    fn sanitize_maps_invalid_chars() {
        assert_eq!(sanitize_name("Gw_East.istio-system"), "gw-east.istio-system");
        assert_eq!(sanitize_name("-x-"), "x");
    }

    #[test]
    fn append_parent_accumulates_without_duplicates() {
        let mut m = ObjectMeta::new("p", "ns");
        let vm = ObjectRef::new("virtual-mesh", "orbit");
        append_parent(&mut m, VIRTUAL_MESH_GVK, &vm);
        append_parent(&mut m, VIRTUAL_MESH_GVK, &vm);
        append_parent(&mut m, ACCESS_POLICY_GVK, &ObjectRef::new("ap", "orbit"));
        assert_eq!(
            m.annotations[PARENTS_ANNOTATION],
            r#"{"networking.orbit.dev/v1, Kind=AccessPolicy":[{"name":"ap","namespace":"orbit"}],"networking.orbit.dev/v1, Kind=VirtualMesh":[{"name":"virtual-mesh","namespace":"orbit"}]}"#
        );
        assert_eq!(parents(&m)[VIRTUAL_MESH_GVK], vec![vm]);
    }

    #[test]
    fn append_parent_replaces_garbage() {
        let mut m = ObjectMeta::new("p", "ns");
        m.annotations.insert(PARENTS_ANNOTATION.into(), "not json".into());
        append_parent(&mut m, VIRTUAL_MESH_GVK, &ObjectRef::new("vm", "orbit"));
        assert_eq!(parents(&m).len(), 1);
    }
}
