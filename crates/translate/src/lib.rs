//! Orbit translate: compiles an input snapshot of meshes, destinations and applied
//! policy into Istio output objects, isolating failures per mesh.

#![forbid(unsafe_code)]

pub mod destination;
pub mod extension;
pub mod interceptor;
pub mod mesh;
pub mod translator;

pub use destination::{access_policy_name, DestinationTranslator};
pub use extension::{FilePatcher, NoopPatcher, OutputPatcher, PatchError, PatcherChain};
pub use interceptor::ReportInterceptor;
pub use mesh::{AccessTranslator, MeshTranslator, ProviderMeshTranslator};
pub use translator::{MeshOutputs, TranslationSummary, Translator};
