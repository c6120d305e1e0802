//! Extension hook run once per pass over the merged remote outputs. Failures are
//! returned to the caller, which logs them and keeps whatever the patcher left.

use std::path::PathBuf;

use orbit_core::InputSnapshot;
use orbit_output::{OutputObject, OutputSnapshot};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("{} patcher(s) failed: {}", .0.len(), .0.join("; "))]
    Failed(Vec<String>),
}

pub trait OutputPatcher: Send + Sync {
    fn name(&self) -> &str;

    fn patch_outputs(&self, input: &InputSnapshot, outputs: &mut OutputSnapshot) -> Result<(), PatchError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPatcher;

impl OutputPatcher for NoopPatcher {
    fn name(&self) -> &str {
        "noop"
    }

    fn patch_outputs(&self, _input: &InputSnapshot, _outputs: &mut OutputSnapshot) -> Result<(), PatchError> {
        Ok(())
    }
}

/// Runs every patcher in order, even after a failure.
#[derive(Default)]
pub struct PatcherChain {
    patchers: Vec<Box<dyn OutputPatcher>>,
}

impl PatcherChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, patcher: impl OutputPatcher + 'static) -> Self {
        self.patchers.push(Box::new(patcher));
        self
    }

    pub fn len(&self) -> usize {
        self.patchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patchers.is_empty()
    }
}

impl OutputPatcher for PatcherChain {
    fn name(&self) -> &str {
        "chain"
    }

    fn patch_outputs(&self, input: &InputSnapshot, outputs: &mut OutputSnapshot) -> Result<(), PatchError> {
        let mut failures = Vec::new();
        for p in &self.patchers {
            if let Err(e) = p.patch_outputs(input, outputs) {
                warn!(patcher = p.name(), error = %e, "extension: patcher failed");
                failures.push(format!("{}: {e}", p.name()));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(PatchError::Failed(failures))
        }
    }
}

/// Upserts the objects listed in a YAML file, re-read on every pass.
#[derive(Debug, Clone)]
pub struct FilePatcher {
    path: PathBuf,
}

impl FilePatcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl OutputPatcher for FilePatcher {
    fn name(&self) -> &str {
        "file"
    }

    fn patch_outputs(&self, _input: &InputSnapshot, outputs: &mut OutputSnapshot) -> Result<(), PatchError> {
        let raw = std::fs::read_to_string(&self.path)
            .map_err(|source| PatchError::Io { path: self.path.clone(), source })?;
        if raw.trim().is_empty() {
            return Ok(());
        }
        let objects: Vec<OutputObject> = serde_yaml::from_str(&raw)
            .map_err(|e| PatchError::Parse { path: self.path.clone(), message: e.to_string() })?;
        let n = objects.len();
        for o in objects {
            outputs.add(o);
        }
        debug!(path = %self.path.display(), objects = n, "extension: file patch applied");
        Ok(())
    }
}
