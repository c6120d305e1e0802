use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use metrics::{counter, histogram};
use orbit_core::{InputSnapshot, Mesh, Reporter};
use orbit_detect::{ConfigMapSet, Detector};
use orbit_output::OutputSnapshot;
use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::{debug, error, info, info_span, warn};

use crate::destination::DestinationTranslator;
use crate::extension::{NoopPatcher, OutputPatcher};
use crate::interceptor::ReportInterceptor;
use crate::mesh::{MeshTranslator, ProviderMeshTranslator};

/// Remote and local outputs produced for one mesh in one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeshOutputs {
    pub remote: OutputSnapshot,
    pub local: OutputSnapshot,
}

impl MeshOutputs {
    fn new(mesh_key: &str) -> Self {
        Self {
            remote: OutputSnapshot::new(format!("mesh-outputs-{mesh_key}")),
            local: OutputSnapshot::new(format!("mesh-local-outputs-{mesh_key}")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationSummary {
    pub pass: u64,
    pub valid_meshes: Vec<String>,
    /// Every mesh flagged invalid, rolled back or not.
    pub invalid_meshes: Vec<String>,
    /// Invalid meshes whose last-known-good outputs were published.
    pub rolled_back_meshes: Vec<String>,
}

#[derive(Default)]
struct TranslatorState {
    /// Last outputs of each mesh that translated without a VirtualMesh error.
    cache: FxHashMap<String, MeshOutputs>,
    total_translates: u64,
}

/// Compiles input snapshots into output snapshots, one pass at a time.
///
/// A mesh whose translation reports a VirtualMesh error publishes its last valid
/// outputs instead, or nothing if it never translated cleanly. Passes are serialized.
pub struct Translator {
    mesh_translator: Box<dyn MeshTranslator>,
    patcher: Box<dyn OutputPatcher>,
    state: Mutex<TranslatorState>,
}

impl Default for Translator {
    fn default() -> Self {
        Self::new(NoopPatcher)
    }
}

impl Translator {
    pub fn new(patcher: impl OutputPatcher + 'static) -> Self {
        Self {
            mesh_translator: Box::new(ProviderMeshTranslator::default()),
            patcher: Box::new(patcher),
            state: Mutex::new(TranslatorState::default()),
        }
    }

    pub fn with_mesh_translator(mut self, mesh_translator: impl MeshTranslator + 'static) -> Self {
        self.mesh_translator = Box::new(mesh_translator);
        self
    }

    pub fn total_translates(&self) -> u64 {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).total_translates
    }

    /// Translates `input`, merging into `remote` and `local`. Errors in user config go
    /// to `reporter`; an extension patch failure is logged and otherwise ignored.
    pub fn translate(
        &self,
        input: &InputSnapshot,
        remote: &mut OutputSnapshot,
        local: &mut OutputSnapshot,
        reporter: &dyn Reporter,
    ) -> TranslationSummary {
        let started = Instant::now();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let pass = state.total_translates;
        let span = info_span!("translate", pass, snapshot = %input.name);
        let _guard = span.enter();
        info!(meshes = input.meshes.len(), destinations = input.destinations.len(), "translate: start");

        let config_maps = ConfigMapSet::new(&input.config_maps);
        let mut detector = Detector::new(&input.namespaces, &config_maps);
        let membership = detector.attribute(&input.workloads, &input.meshes);
        let destinations = DestinationTranslator::new(input, &membership);
        for destination in &input.destinations {
            destinations.translate(destination, remote, reporter);
        }

        let mut summary = TranslationSummary { pass, ..Default::default() };
        for mesh in &input.meshes {
            self.translate_mesh(&mut state.cache, input, mesh, remote, local, reporter, &mut summary);
        }

        if let Err(e) = self.patcher.patch_outputs(input, remote) {
            error!(patcher = self.patcher.name(), error = %e, "translate: extension patch failed");
            counter!("extension_patch_failed_total", 1u64);
        }

        state.total_translates += 1;
        let took_ms = started.elapsed().as_secs_f64() * 1000.0;
        counter!("translate_passes_total", 1u64);
        histogram!("translate_latency_ms", took_ms);
        info!(
            remote = remote.len(),
            local = local.len(),
            invalid = summary.invalid_meshes.len(),
            took_ms,
            "translate: done"
        );
        summary
    }

    #[allow(clippy::too_many_arguments)]
    fn translate_mesh(
        &self,
        cache: &mut FxHashMap<String, MeshOutputs>,
        input: &InputSnapshot,
        mesh: &Mesh,
        remote: &mut OutputSnapshot,
        local: &mut OutputSnapshot,
        reporter: &dyn Reporter,
        summary: &mut TranslationSummary,
    ) {
        let key = mesh.key();
        let mut fresh = MeshOutputs::new(&key);
        let interceptor = ReportInterceptor::new(reporter, mesh);
        self.mesh_translator.translate(input, mesh, &mut fresh.remote, &mut fresh.local, &interceptor);

        if !interceptor.did_fail() {
            debug!(mesh = %key, remote = fresh.remote.len(), local = fresh.local.len(), "translate: mesh valid");
            remote.merge(&fresh.remote);
            local.merge(&fresh.local);
            cache.insert(key.clone(), fresh);
            summary.valid_meshes.push(key);
            return;
        }

        counter!("mesh_translation_invalid_total", 1u64, "mesh" => key.clone());
        match cache.get(&key) {
            Some(previous) => {
                warn!(mesh = %key, "translate: mesh invalid, restoring last valid outputs");
                counter!("mesh_translation_rollback_total", 1u64, "mesh" => key.clone());
                remote.merge(&previous.remote);
                local.merge(&previous.local);
                summary.rolled_back_meshes.push(key.clone());
            }
            None => {
                warn!(mesh = %key, "translate: mesh invalid with no valid outputs yet, publishing nothing");
            }
        }
        summary.invalid_meshes.push(key);
    }
}
