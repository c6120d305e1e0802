use std::sync::atomic::{AtomicBool, Ordering};

use orbit_core::{Destination, Mesh, ObjectRef, Reporter, TranslationError};

/// Forwards every report to the wrapped reporter and remembers whether a VirtualMesh
/// error was reported against the mesh under translation.
pub struct ReportInterceptor<'a> {
    inner: &'a dyn Reporter,
    mesh_key: String,
    failed: AtomicBool,
}

impl<'a> ReportInterceptor<'a> {
    pub fn new(inner: &'a dyn Reporter, mesh: &Mesh) -> Self {
        Self { inner, mesh_key: mesh.key(), failed: AtomicBool::new(false) }
    }

    pub fn did_fail(&self) -> bool {
        self.failed.load(Ordering::Relaxed)
    }
}

impl Reporter for ReportInterceptor<'_> {
    fn report_virtual_mesh_to_mesh(&self, mesh: &Mesh, virtual_mesh: &ObjectRef, err: TranslationError) {
        if mesh.key() == self.mesh_key {
            self.failed.store(true, Ordering::Relaxed);
        }
        self.inner.report_virtual_mesh_to_mesh(mesh, virtual_mesh, err);
    }

    fn report_access_policy_to_destination(
        &self,
        destination: &Destination,
        access_policy: &ObjectRef,
        err: TranslationError,
    ) {
        self.inner.report_access_policy_to_destination(destination, access_policy, err);
    }
}
