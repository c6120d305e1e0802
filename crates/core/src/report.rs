//! Reporting seam: translators record reference and validation errors against the
//! input resource that caused them instead of failing the pass.

use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::{ClusterObjectRef, Destination, Mesh, ObjectRef};

#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TranslationError {
    #[error("destination {0} not found")]
    DestinationNotFound(ObjectRef),
    #[error("mesh {0} not found")]
    MeshNotFound(ObjectRef),
    #[error("no istio mesh installed on cluster {} for {}", .0.cluster_name, .0.name)]
    NoMeshForCluster(ClusterObjectRef),
    #[error("invalid: {0}")]
    Invalid(String),
}

impl TranslationError {
    /// Reference errors point at a missing object; everything else is a validation error.
    pub fn is_reference(&self) -> bool {
        !matches!(self, TranslationError::Invalid(_))
    }
}

/// Receives per-resource errors produced during a translation pass.
///
/// Implementations must tolerate repeated reports for the same resource.
pub trait Reporter: Send + Sync {
    fn report_virtual_mesh_to_mesh(&self, mesh: &Mesh, virtual_mesh: &ObjectRef, err: TranslationError);

    fn report_access_policy_to_destination(
        &self,
        destination: &Destination,
        access_policy: &ObjectRef,
        err: TranslationError,
    );
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "target", rename_all = "camelCase")]
pub enum Report {
    VirtualMeshToMesh { mesh: ObjectRef, virtual_mesh: ObjectRef, error: TranslationError },
    AccessPolicyToDestination { destination: ObjectRef, access_policy: ObjectRef, error: TranslationError },
}

impl Report {
    pub fn error(&self) -> &TranslationError {
        match self {
            Report::VirtualMeshToMesh { error, .. } | Report::AccessPolicyToDestination { error, .. } => error,
        }
    }
}

impl std::fmt::Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Report::VirtualMeshToMesh { mesh, virtual_mesh, error } => {
                write!(f, "virtualmesh {virtual_mesh} on mesh {mesh}: {error}")
            }
            Report::AccessPolicyToDestination { destination, access_policy, error } => {
                write!(f, "accesspolicy {access_policy} on destination {destination}: {error}")
            }
        }
    }
}

/// Keeps every report in arrival order.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    reports: Mutex<Vec<Report>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Drains collected reports, leaving the reporter empty for the next pass.
    pub fn take(&self) -> Vec<Report> {
        std::mem::take(&mut *self.reports.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn push(&self, report: Report) {
        self.reports.lock().unwrap_or_else(PoisonError::into_inner).push(report);
    }
}

impl Reporter for CollectingReporter {
    fn report_virtual_mesh_to_mesh(&self, mesh: &Mesh, virtual_mesh: &ObjectRef, err: TranslationError) {
        self.push(Report::VirtualMeshToMesh {
            mesh: mesh.object_ref(),
            virtual_mesh: virtual_mesh.clone(),
            error: err,
        });
    }

    fn report_access_policy_to_destination(
        &self,
        destination: &Destination,
        access_policy: &ObjectRef,
        err: TranslationError,
    ) {
        self.push(Report::AccessPolicyToDestination {
            destination: destination.object_ref(),
            access_policy: access_policy.clone(),
            error: err,
        });
    }
}

/// Emits each report as a warning and keeps nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report_virtual_mesh_to_mesh(&self, mesh: &Mesh, virtual_mesh: &ObjectRef, err: TranslationError) {
        warn!(mesh = %mesh.object_ref(), virtual_mesh = %virtual_mesh, error = %err, "report: virtualmesh");
    }

    fn report_access_policy_to_destination(
        &self,
        destination: &Destination,
        access_policy: &ObjectRef,
        err: TranslationError,
    ) {
        warn!(destination = %destination.object_ref(), access_policy = %access_policy, error = %err, "report: accesspolicy");
    }
}
