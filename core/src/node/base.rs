// orogen/src/node/base.rs

//! The node contract: one processing stage with a typed run state machine
//! (`idle -> configuring -> pre-running -> active -> ran | skipped | failed |
//! vetoed | canceled`) enforced by the engine's run loop.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::Sender;
use serde_yaml::Mapping;

use crate::core::analysis::AnalysisRecord;
use crate::core::control::RunOutcome;
use crate::core::editor::EditorRef;
use crate::core::state::EngineState;
use crate::error::EngineResult;

/// Stable identity for a node, assigned at construction. Used for veto
/// bookkeeping and resumption points instead of holding node references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

static NODE_ID: AtomicU64 = AtomicU64::new(1);

impl NodeId {
  fn next() -> Self {
    NodeId(NODE_ID.fetch_add(1, Ordering::Relaxed))
  }
}

/// Tag identifying a node variant. Replaces downcast chains for the checks
/// the engine and containers need (data-node detection, fit/persist pairing,
/// template dispatch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
  Unknowns,
  References,
  FluxMonitors,
  ListenUnknowns,
  Filter,
  Grouping,
  GraphGrouping,
  FindReferences,
  FitBlanks,
  FitICFactor,
  FitIsotopeEvolution,
  FitFlux,
  BlanksPersist,
  ICFactorPersist,
  IsotopeEvolutionPersist,
  FluxPersist,
  Ideogram,
  Spectrum,
  Series,
  InverseIsochron,
  Review,
  Push,
  Email,
}

impl NodeKind {
  /// The class tag used in template documents.
  pub fn klass(&self) -> &'static str {
    match self {
      NodeKind::Unknowns => "UnknownNode",
      NodeKind::References => "ReferenceNode",
      NodeKind::FluxMonitors => "FluxMonitorsNode",
      NodeKind::ListenUnknowns => "ListenUnknownNode",
      NodeKind::Filter => "FilterNode",
      NodeKind::Grouping => "GroupingNode",
      NodeKind::GraphGrouping => "GraphGroupingNode",
      NodeKind::FindReferences => "FindReferencesNode",
      NodeKind::FitBlanks => "FitBlanksNode",
      NodeKind::FitICFactor => "FitICFactorNode",
      NodeKind::FitIsotopeEvolution => "FitIsotopeEvolutionNode",
      NodeKind::FitFlux => "FitFluxNode",
      NodeKind::BlanksPersist => "BlanksPersistNode",
      NodeKind::ICFactorPersist => "ICFactorPersistNode",
      NodeKind::IsotopeEvolutionPersist => "IsotopeEvolutionPersistNode",
      NodeKind::FluxPersist => "FluxPersistNode",
      NodeKind::Ideogram => "IdeogramNode",
      NodeKind::Spectrum => "SpectrumNode",
      NodeKind::Series => "SeriesNode",
      NodeKind::InverseIsochron => "InverseIsochronNode",
      NodeKind::Review => "ReviewNode",
      NodeKind::Push => "PushNode",
      NodeKind::Email => "EmailNode",
    }
  }

  /// True for nodes that load/hold a named collection of analyses.
  pub fn is_data(&self) -> bool {
    matches!(
      self,
      NodeKind::Unknowns | NodeKind::References | NodeKind::FluxMonitors | NodeKind::ListenUnknowns
    )
  }

  pub fn is_listen(&self) -> bool {
    matches!(self, NodeKind::ListenUnknowns)
  }

  /// The persist kind that completes this fit kind, for the auto-link
  /// invariant.
  pub fn save_counterpart(&self) -> Option<NodeKind> {
    match self {
      NodeKind::FitBlanks => Some(NodeKind::BlanksPersist),
      NodeKind::FitICFactor => Some(NodeKind::ICFactorPersist),
      NodeKind::FitIsotopeEvolution => Some(NodeKind::IsotopeEvolutionPersist),
      NodeKind::FitFlux => Some(NodeKind::FluxPersist),
      _ => None,
    }
  }

  pub fn all() -> &'static [NodeKind] {
    &[
      NodeKind::Unknowns,
      NodeKind::References,
      NodeKind::FluxMonitors,
      NodeKind::ListenUnknowns,
      NodeKind::Filter,
      NodeKind::Grouping,
      NodeKind::GraphGrouping,
      NodeKind::FindReferences,
      NodeKind::FitBlanks,
      NodeKind::FitICFactor,
      NodeKind::FitIsotopeEvolution,
      NodeKind::FitFlux,
      NodeKind::BlanksPersist,
      NodeKind::ICFactorPersist,
      NodeKind::IsotopeEvolutionPersist,
      NodeKind::FluxPersist,
      NodeKind::Ideogram,
      NodeKind::Spectrum,
      NodeKind::Series,
      NodeKind::InverseIsochron,
      NodeKind::Review,
      NodeKind::Push,
      NodeKind::Email,
    ]
  }
}

/// Execution bookkeeping common to every node.
#[derive(Debug)]
pub struct NodeCore {
  pub id: NodeId,
  pub name: String,
  pub enabled: bool,
  pub visited: bool,
  pub active: bool,
  pub index: usize,
  pub editor: Option<EditorRef>,
  /// Presentation group label assigned by template rendering.
  pub group: Option<String>,
}

impl NodeCore {
  pub fn new(name: impl Into<String>) -> Self {
    NodeCore {
      id: NodeId::next(),
      name: name.into(),
      enabled: true,
      visited: false,
      active: false,
      index: 0,
      editor: None,
      group: None,
    }
  }

  pub fn reset(&mut self) {
    self.visited = false;
    self.active = false;
    self.editor = None;
  }
}

/// Declarative form of one node, as stored in template documents.
#[derive(Debug, Clone)]
pub struct NodeTemplate {
  pub klass: String,
  pub params: Mapping,
}

impl NodeTemplate {
  pub fn new(klass: impl Into<String>) -> Self {
    NodeTemplate {
      klass: klass.into(),
      params: Mapping::new(),
    }
  }

  pub fn with(mut self, key: &str, value: impl Into<serde_yaml::Value>) -> Self {
    self.params.insert(serde_yaml::Value::from(key), value.into());
    self
  }
}

/// Hand-off surface available to nodes during the post-run pass. The listen
/// node registers its poller here; results come back to the engine through
/// the channel, never by direct mutation from another thread.
pub struct PostRunContext {
  pub listener: Sender<Vec<AnalysisRecord>>,
}

/// One processing stage in a pipeline.
///
/// `run` must be safe to re-invoke: `rerun_with` replays the entire node
/// sequence against replayed state, so a node cannot assume it executes at
/// most once per configuration.
pub trait PipelineNode: Send {
  fn core(&self) -> &NodeCore;
  fn core_mut(&mut self) -> &mut NodeCore;
  fn kind(&self) -> NodeKind;

  fn id(&self) -> NodeId {
    self.core().id
  }

  fn name(&self) -> &str {
    &self.core().name
  }

  fn is_enabled(&self) -> bool {
    self.core().enabled
  }

  /// Accept or refuse configuration. Interactive implementations may open a
  /// dialog; headless ones validate the pre-seeded configuration.
  fn configure(&mut self, interactive: bool) -> bool {
    let _ = interactive;
    true
  }

  /// Returning false is fatal for the whole run.
  fn pre_run(&mut self, state: &mut EngineState, configure: bool) -> bool {
    let _ = (state, configure);
    true
  }

  fn run(&mut self, state: &mut EngineState) -> EngineResult<RunOutcome>;

  /// Unconditional finalization, invoked for every enabled node after the
  /// main loop finishes or aborts.
  fn post_run(&mut self, ctx: &mut PostRunContext, state: &mut EngineState) {
    let _ = (ctx, state);
  }

  fn reset(&mut self) {
    self.core_mut().reset();
  }

  /// Drops any held analysis collections. Only meaningful for data nodes.
  fn clear_data(&mut self) {}

  /// Drops only the node's own unknowns working list. `rerun_with` clears
  /// this before each node's `run` so replayed state is authoritative.
  fn clear_unknowns(&mut self) {}

  /// Applies declared template parameters.
  fn load(&mut self, params: &Mapping) -> EngineResult<()> {
    let _ = params;
    Ok(())
  }

  /// Deferred initialization once wiring is final, before the node is
  /// appended to a pipeline.
  fn finish_load(&mut self) {}

  fn to_template(&self) -> NodeTemplate {
    NodeTemplate::new(self.kind().klass())
  }

  /// Service tags this node needs when materialized from a template.
  fn required(&self) -> Vec<&'static str> {
    Vec::new()
  }

  // Fit/persist auto-link hooks; only fit nodes carry the flag.
  fn has_save_node(&self) -> bool {
    false
  }
  fn set_has_save_node(&mut self, _value: bool) {}

  /// Detector-union propagation; only IC-factor fit nodes care.
  fn set_detectors(&mut self, _detectors: &[String]) {}

  fn as_any(&self) -> &dyn Any;
  fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Implements the core accessor/Any boilerplate for a node struct with a
/// `core: NodeCore` field.
macro_rules! impl_node_boilerplate {
  () => {
    fn core(&self) -> &$crate::node::base::NodeCore {
      &self.core
    }

    fn core_mut(&mut self) -> &mut $crate::node::base::NodeCore {
      &mut self.core
    }

    fn as_any(&self) -> &dyn std::any::Any {
      self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
      self
    }
  };
}

pub(crate) use impl_node_boilerplate;
