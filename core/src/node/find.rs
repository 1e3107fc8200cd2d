// orogen/src/node/find.rs

//! Reference discovery: locate calibration analyses bracketing the current
//! unknowns through the data service.

use std::sync::Arc;

use serde_yaml::Mapping;
use tracing::{debug, warn};

use crate::core::analysis::AnalysisType;
use crate::core::control::RunOutcome;
use crate::core::state::EngineState;
use crate::error::{EngineError, EngineResult};
use crate::node::base::{impl_node_boilerplate, NodeCore, NodeKind, NodeTemplate, PipelineNode};
use crate::node::{param_i64, param_str};
use crate::services::{DataService, SERVICE_DVC};

pub struct FindReferencesNode {
  core: NodeCore,
  dvc: Arc<dyn DataService>,
  pub analysis_type: AnalysisType,
  /// Bracketing window, in hours on either side of the unknowns.
  pub hours: i64,
}

impl FindReferencesNode {
  pub fn new(dvc: Arc<dyn DataService>, analysis_type: AnalysisType) -> Self {
    let name = format!("Find {}", analysis_type.as_str());
    FindReferencesNode {
      core: NodeCore::new(name),
      dvc,
      analysis_type,
      hours: 10,
    }
  }
}

impl PipelineNode for FindReferencesNode {
  impl_node_boilerplate!();

  fn kind(&self) -> NodeKind {
    NodeKind::FindReferences
  }

  fn configure(&mut self, _interactive: bool) -> bool {
    self.hours > 0
  }

  fn run(&mut self, state: &mut EngineState) -> EngineResult<RunOutcome> {
    if state.unknowns.is_empty() {
      return Ok(RunOutcome::NoData);
    }

    let refs = self
      .dvc
      .find_references(&state.unknowns, self.analysis_type, self.hours)
      .map_err(|e| EngineError::node(self.core.name.clone(), e))?;

    if refs.is_empty() {
      warn!(
        analysis_type = self.analysis_type.as_str(),
        hours = self.hours,
        "no references found"
      );
    } else {
      debug!(count = refs.len(), "found references");
    }

    state.references = refs;
    state.rebuild_derived();
    Ok(RunOutcome::Continue)
  }

  fn load(&mut self, params: &Mapping) -> EngineResult<()> {
    if let Some(h) = param_i64(params, "hours") {
      self.hours = h;
    }
    if let Some(t) = param_str(params, "analysis_type") {
      self.analysis_type = match t.as_str() {
        "air" => AnalysisType::Air,
        "cocktail" => AnalysisType::Cocktail,
        "blank_unknown" => AnalysisType::BlankUnknown,
        _ => self.analysis_type,
      };
    }
    Ok(())
  }

  fn to_template(&self) -> NodeTemplate {
    NodeTemplate::new(self.kind().klass())
      .with("hours", self.hours)
      .with("analysis_type", self.analysis_type.as_str())
  }

  fn required(&self) -> Vec<&'static str> {
    vec![SERVICE_DVC]
  }
}
