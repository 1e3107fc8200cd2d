// orogen/src/pipeline/definition.rs

//! The `Pipeline` container (an ordered, mutable node sequence) and the
//! `PipelineGroup` of independent parallel chains.

use std::collections::BTreeSet;

use tracing::debug;

use crate::node::base::{NodeId, PipelineNode};
use crate::node::data::{ListenUnknownNode, UnknownNode};
use crate::template::TemplateDoc;

pub struct Pipeline {
  pub name: String,
  pub nodes: Vec<Box<dyn PipelineNode>>,
}

impl Pipeline {
  pub fn new(name: impl Into<String>) -> Self {
    Pipeline {
      name: name.into(),
      nodes: Vec::new(),
    }
  }

  pub fn index_of(&self, id: NodeId) -> Option<usize> {
    self.nodes.iter().position(|n| n.id() == id)
  }

  pub fn node(&self, id: NodeId) -> Option<&dyn PipelineNode> {
    self.index_of(id).map(|i| self.nodes[i].as_ref())
  }

  pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Box<dyn PipelineNode>> {
    self.index_of(id).and_then(|i| self.nodes.get_mut(i))
  }

  pub fn contains(&self, id: NodeId) -> bool {
    self.index_of(id).is_some()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  /// Inserts `node` immediately following `after`; appends when `after` is
  /// `None` or no longer present.
  pub fn add_after(&mut self, after: Option<NodeId>, node: Box<dyn PipelineNode>) -> NodeId {
    let id = node.id();
    match after.and_then(|a| self.index_of(a)) {
      Some(idx) => self.nodes.insert(idx + 1, node),
      None => self.nodes.push(node),
    }
    self.relink();
    id
  }

  pub fn append(&mut self, node: Box<dyn PipelineNode>) -> NodeId {
    self.add_after(None, node)
  }

  pub fn remove(&mut self, id: NodeId) -> Option<Box<dyn PipelineNode>> {
    let idx = self.index_of(id)?;
    let node = self.nodes.remove(idx);
    self.relink();
    Some(node)
  }

  pub fn move_up(&mut self, id: NodeId) {
    if let Some(idx) = self.index_of(id) {
      if idx > 1 {
        self.nodes.swap(idx, idx - 1);
        self.relink();
      }
    }
  }

  pub fn move_down(&mut self, id: NodeId) {
    if let Some(idx) = self.index_of(id) {
      if idx < self.nodes.len() - 1 {
        self.nodes.swap(idx, idx + 1);
        self.relink();
      }
    }
  }

  /// Resets every node; `clear_data` additionally drops held collections on
  /// data nodes.
  pub fn reset(&mut self, clear_data: bool) {
    for node in &mut self.nodes {
      if clear_data && node.kind().is_data() {
        node.clear_data();
      }
      node.reset();
    }
  }

  /// Node indices for one execution pass.
  ///
  /// With `run_to`, the prefix up to and including it. Otherwise the suffix
  /// strictly after `start` (the whole sequence when `start` is `None` or
  /// absent). Recomputed on each call, so a pass can be restarted.
  pub fn iternodes(&self, start: Option<NodeId>, run_to: Option<NodeId>) -> Vec<usize> {
    if let Some(idx) = run_to.and_then(|id| self.index_of(id)) {
      return (0..=idx).collect();
    }

    let first = match start.and_then(|id| self.index_of(id)) {
      Some(idx) => idx + 1,
      None => 0,
    };
    (first..self.nodes.len()).collect()
  }

  /// Re-derives the fit/persist pairing invariant: a fit node is marked
  /// `has_save_node` exactly when a matching persist node follows it
  /// anywhere later in the sequence. Every mutating operation calls this.
  pub fn relink(&mut self) {
    for i in 0..self.nodes.len() {
      let Some(counterpart) = self.nodes[i].kind().save_counterpart() else {
        continue;
      };
      let has = self.nodes[i + 1..].iter().any(|n| n.kind() == counterpart);
      self.nodes[i].set_has_save_node(has);
      debug!(node = self.nodes[i].name(), has_save_node = has, "relinked");
    }
  }

  /// Repository identifiers referenced by the data nodes' held unknowns.
  pub fn get_experiment_ids(&self) -> BTreeSet<String> {
    let mut ids = BTreeSet::new();
    for node in &self.nodes {
      let held = if let Some(unknown) = node.as_any().downcast_ref::<UnknownNode>() {
        &unknown.unknowns
      } else if let Some(listen) = node.as_any().downcast_ref::<ListenUnknownNode>() {
        &listen.unknowns
      } else {
        continue;
      };
      ids.extend(
        held
          .iter()
          .map(|r| r.read().repository_identifier.clone())
          .filter(|n| !n.is_empty()),
      );
    }
    ids
  }

  /// Serializes the node sequence plus the aggregated service requirements.
  pub fn to_template(&self) -> TemplateDoc {
    let mut required: Vec<String> = Vec::new();
    for node in &self.nodes {
      for tag in node.required() {
        if !required.iter().any(|r| r == tag) {
          required.push(tag.to_string());
        }
      }
    }

    TemplateDoc::from_nodes(required, self.nodes.iter().map(|n| n.to_template()).collect())
  }
}

impl Default for Pipeline {
  fn default() -> Self {
    Pipeline::new("Pipeline 1")
  }
}

/// A named collection of independent pipelines.
pub struct PipelineGroup {
  pub pipelines: Vec<Pipeline>,
  count: usize,
}

impl PipelineGroup {
  pub fn new() -> Self {
    PipelineGroup {
      pipelines: vec![Pipeline::default()],
      count: 1,
    }
  }

  /// Appends a pipeline with the next auto-incremented default name.
  pub fn add(&mut self) -> &mut Pipeline {
    self.count += 1;
    self.pipelines.push(Pipeline::new(format!("Pipeline {}", self.count)));
    self.pipelines.last_mut().expect("just pushed")
  }

  /// Removes by position. Out-of-range indices panic (propagated, not
  /// swallowed).
  pub fn remove(&mut self, idx: usize) -> Pipeline {
    self.pipelines.remove(idx)
  }

  pub fn get_pipeline_by_node(&self, id: NodeId) -> Option<&Pipeline> {
    self.pipelines.iter().find(|p| p.contains(id))
  }

  pub fn get_pipeline_by_node_mut(&mut self, id: NodeId) -> Option<&mut Pipeline> {
    self.pipelines.iter_mut().find(|p| p.contains(id))
  }
}

impl Default for PipelineGroup {
  fn default() -> Self {
    Self::new()
  }
}
