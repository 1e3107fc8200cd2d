// orogen/src/node/mod.rs

pub mod base;
pub mod data;
pub mod filter;
pub mod find;
pub mod fit;
pub mod grouping;
pub mod persist;
pub mod registry;
pub mod review;

pub use base::{NodeCore, NodeId, NodeKind, NodeTemplate, PipelineNode, PostRunContext};
pub use data::{FluxMonitorsNode, ListenUnknownNode, ReferenceNode, UnknownNode};
pub use filter::{AnalysisFilter, FilterAction, FilterComparator, FilterNode};
pub use find::FindReferencesNode;
pub use fit::{FigureNode, FitBlanksNode, FitFluxNode, FitICFactorNode, FitIsotopeEvolutionNode, FitSpec};
pub use grouping::{GraphGroupingNode, GroupingNode};
pub use persist::{
  BlanksPersistNode, FluxPersistNode, ICFactorPersistNode, IsotopeEvolutionPersistNode, PushNode,
};
pub use registry::NodeRegistry;
pub use review::{EmailNode, ReviewNode};

use serde_yaml::Mapping;

// Small param readers shared by node `load` implementations.

pub(crate) fn param_str(params: &Mapping, key: &str) -> Option<String> {
  params.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

pub(crate) fn param_i64(params: &Mapping, key: &str) -> Option<i64> {
  params.get(key).and_then(|v| v.as_i64())
}

pub(crate) fn param_f64(params: &Mapping, key: &str) -> Option<f64> {
  params.get(key).and_then(|v| v.as_f64())
}

pub(crate) fn param_bool(params: &Mapping, key: &str) -> Option<bool> {
  params.get(key).and_then(|v| v.as_bool())
}
