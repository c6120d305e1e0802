//! Per-mesh translation. Each mesh gets fresh output snapshots so that its result can be
//! kept or discarded as a unit.

use orbit_core::{InputSnapshot, Mesh, MeshProvider, Reporter};
use orbit_output::OutputSnapshot;
use tracing::trace;

pub mod access;

pub use access::AccessTranslator;

pub trait MeshTranslator: Send + Sync {
    /// Writes objects for `mesh` into `remote` (workload clusters) and `local`
    /// (management plane). Invalid user config is reported, never returned.
    fn translate(
        &self,
        input: &InputSnapshot,
        mesh: &Mesh,
        remote: &mut OutputSnapshot,
        local: &mut OutputSnapshot,
        reporter: &dyn Reporter,
    );
}

/// Dispatches on the mesh provider. Only Istio meshes have translators today.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProviderMeshTranslator {
    access: AccessTranslator,
}

impl MeshTranslator for ProviderMeshTranslator {
    fn translate(
        &self,
        input: &InputSnapshot,
        mesh: &Mesh,
        remote: &mut OutputSnapshot,
        _local: &mut OutputSnapshot,
        reporter: &dyn Reporter,
    ) {
        match &mesh.provider {
            MeshProvider::Istio(_) => {
                if let Some(vm) = &mesh.status.applied_virtual_mesh {
                    self.access.translate(input, mesh, vm, remote, reporter);
                }
            }
            MeshProvider::Linkerd(_)
            | MeshProvider::Osm(_)
            | MeshProvider::ConsulConnect(_)
            | MeshProvider::AppMesh(_) => {
                trace!(mesh = %mesh.key(), provider = mesh.provider.type_name(), "mesh: no translator for provider");
            }
        }
    }
}
