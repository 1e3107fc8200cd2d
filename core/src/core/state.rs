// orogen/src/core/state.rs

//! The mutable context threaded through one pipeline run.

use std::collections::BTreeSet;

use crate::core::analysis::AnalysisRecord;
use crate::core::editor::EditorRef;
use crate::node::NodeId;

/// Shared mutable state for a single pipeline run.
///
/// Ownership rule: exactly one `PipelineEngine` holds a live `EngineState`
/// at a time. A fresh run replaces the instance; resuming reuses it. Nodes
/// read and mutate designated fields through `&mut` access during their own
/// step but never replace the object itself.
#[derive(Debug, Default)]
pub struct EngineState {
  pub unknowns: Vec<AnalysisRecord>,
  pub references: Vec<AnalysisRecord>,
  pub flux_monitors: Vec<AnalysisRecord>,

  /// Result artifacts accumulated across the run.
  pub editors: Vec<EditorRef>,

  pub canceled: bool,
  /// The node that vetoed, if any. Doubles as the resumption point.
  pub veto: Option<NodeId>,

  /// Populated by fit nodes for downstream persist nodes.
  pub saveable_keys: Vec<String>,
  pub saveable_fits: Vec<String>,

  // Derived caches, rebuilt when a node replaces a working collection.
  pub projects: BTreeSet<String>,
  pub union_detectors: Vec<String>,

  // Flux context.
  pub irradiation: String,
  pub level: String,
}

impl EngineState {
  pub fn new() -> Self {
    Self::default()
  }

  /// Rebuilds the derived caches from the current working collections.
  pub fn rebuild_derived(&mut self) {
    self.projects = self
      .unknowns
      .iter()
      .map(|r| r.read().project.clone())
      .filter(|p| !p.is_empty())
      .collect();

    let mut dets: BTreeSet<String> = BTreeSet::new();
    for rec in self.unknowns.iter().chain(self.references.iter()) {
      for iso in &rec.read().isotopes {
        dets.insert(iso.detector.clone());
      }
    }
    self.union_detectors = dets.into_iter().collect();
  }

  /// Largest `group_id` over the complete unknowns collection.
  pub fn max_group_id(&self) -> usize {
    self.unknowns.iter().map(|r| r.read().group_id).max().unwrap_or(0)
  }

  /// Largest `graph_id` over the complete unknowns collection.
  pub fn max_graph_id(&self) -> usize {
    self.unknowns.iter().map(|r| r.read().graph_id).max().unwrap_or(0)
  }

  /// Distinct repository identifiers referenced by the working collections.
  pub fn repository_identifiers(&self) -> BTreeSet<String> {
    self
      .unknowns
      .iter()
      .chain(self.references.iter())
      .map(|r| r.read().repository_identifier.clone())
      .filter(|n| !n.is_empty())
      .collect()
  }
}
