// orogen/src/node/grouping.rs

//! Grouping nodes: assign group/graph ids over the unknowns by a record key.

use serde_yaml::Mapping;

use crate::core::control::RunOutcome;
use crate::core::state::EngineState;
use crate::error::EngineResult;
use crate::node::base::{impl_node_boilerplate, NodeCore, NodeKind, NodeTemplate, PipelineNode};
use crate::node::param_str;

fn group_by_key(state: &mut EngineState, key: &str, graph: bool) {
  let mut seen: Vec<String> = Vec::new();
  for rec in &state.unknowns {
    let value = rec.read().get_str_attr(key).unwrap_or_default();
    let gid = match seen.iter().position(|s| *s == value) {
      Some(i) => i,
      None => {
        seen.push(value);
        seen.len() - 1
      }
    };

    let mut a = rec.write();
    if graph {
      a.graph_id = gid;
    } else {
      a.group_id = gid;
    }
  }
}

pub struct GroupingNode {
  core: NodeCore,
  pub key: String,
}

impl GroupingNode {
  pub fn new() -> Self {
    GroupingNode {
      core: NodeCore::new("Grouping"),
      key: "identifier".to_string(),
    }
  }
}

impl Default for GroupingNode {
  fn default() -> Self {
    Self::new()
  }
}

impl PipelineNode for GroupingNode {
  impl_node_boilerplate!();

  fn kind(&self) -> NodeKind {
    NodeKind::Grouping
  }

  fn run(&mut self, state: &mut EngineState) -> EngineResult<RunOutcome> {
    group_by_key(state, &self.key, false);
    Ok(RunOutcome::Continue)
  }

  fn load(&mut self, params: &Mapping) -> EngineResult<()> {
    if let Some(k) = param_str(params, "key") {
      self.key = k;
    }
    Ok(())
  }

  fn to_template(&self) -> NodeTemplate {
    NodeTemplate::new(self.kind().klass()).with("key", self.key.as_str())
  }
}

pub struct GraphGroupingNode {
  core: NodeCore,
  pub key: String,
}

impl GraphGroupingNode {
  pub fn new() -> Self {
    GraphGroupingNode {
      core: NodeCore::new("Graph Grouping"),
      key: "identifier".to_string(),
    }
  }
}

impl Default for GraphGroupingNode {
  fn default() -> Self {
    Self::new()
  }
}

impl PipelineNode for GraphGroupingNode {
  impl_node_boilerplate!();

  fn kind(&self) -> NodeKind {
    NodeKind::GraphGrouping
  }

  fn run(&mut self, state: &mut EngineState) -> EngineResult<RunOutcome> {
    group_by_key(state, &self.key, true);
    Ok(RunOutcome::Continue)
  }

  fn load(&mut self, params: &Mapping) -> EngineResult<()> {
    if let Some(k) = param_str(params, "key") {
      self.key = k;
    }
    Ok(())
  }

  fn to_template(&self) -> NodeTemplate {
    NodeTemplate::new(self.kind().klass()).with("key", self.key.as_str())
  }
}
