// orogen/src/node/persist.rs

//! Persist nodes: write saveable fit selections back through the data
//! service, and push the referenced repositories.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::core::control::RunOutcome;
use crate::core::state::EngineState;
use crate::error::{EngineError, EngineResult};
use crate::node::base::{impl_node_boilerplate, NodeCore, NodeKind, PipelineNode};
use crate::services::{DataService, FitKind, SERVICE_DVC};

/// Shared body of the per-family persist nodes.
fn persist_fits(
  core: &NodeCore,
  dvc: &dyn DataService,
  fit_kind: FitKind,
  state: &mut EngineState,
) -> EngineResult<RunOutcome> {
  if state.saveable_keys.is_empty() {
    warn!(node = core.name.as_str(), "nothing saveable; fit node did not run?");
    return Ok(RunOutcome::Continue);
  }

  let records = match fit_kind {
    FitKind::Blanks | FitKind::ICFactor | FitKind::IsoEvolution => &state.unknowns,
    FitKind::Flux => &state.flux_monitors,
  };

  dvc
    .save_fits(fit_kind, records, &state.saveable_keys, &state.saveable_fits)
    .map_err(|e| EngineError::node(core.name.clone(), e))?;

  debug!(
    node = core.name.as_str(),
    keys = ?state.saveable_keys,
    "persisted fits"
  );
  Ok(RunOutcome::Continue)
}

macro_rules! persist_node {
  ($node:ident, $kind:expr, $fit_kind:expr, $name:literal) => {
    pub struct $node {
      core: NodeCore,
      dvc: Arc<dyn DataService>,
    }

    impl $node {
      pub fn new(dvc: Arc<dyn DataService>) -> Self {
        $node {
          core: NodeCore::new($name),
          dvc,
        }
      }
    }

    impl PipelineNode for $node {
      impl_node_boilerplate!();

      fn kind(&self) -> NodeKind {
        $kind
      }

      fn run(&mut self, state: &mut EngineState) -> EngineResult<RunOutcome> {
        persist_fits(&self.core, self.dvc.as_ref(), $fit_kind, state)
      }

      fn required(&self) -> Vec<&'static str> {
        vec![SERVICE_DVC]
      }
    }
  };
}

persist_node!(BlanksPersistNode, NodeKind::BlanksPersist, FitKind::Blanks, "Save Blanks");
persist_node!(ICFactorPersistNode, NodeKind::ICFactorPersist, FitKind::ICFactor, "Save ICFactor");
persist_node!(
  IsotopeEvolutionPersistNode,
  NodeKind::IsotopeEvolutionPersist,
  FitKind::IsoEvolution,
  "Save IsoEvo"
);

/// Flux persistence additionally records the irradiation/level context.
pub struct FluxPersistNode {
  core: NodeCore,
  dvc: Arc<dyn DataService>,
}

impl FluxPersistNode {
  pub fn new(dvc: Arc<dyn DataService>) -> Self {
    FluxPersistNode {
      core: NodeCore::new("Save Flux"),
      dvc,
    }
  }
}

impl PipelineNode for FluxPersistNode {
  impl_node_boilerplate!();

  fn kind(&self) -> NodeKind {
    NodeKind::FluxPersist
  }

  fn run(&mut self, state: &mut EngineState) -> EngineResult<RunOutcome> {
    let positions: Vec<(String, f64, f64)> = state
      .flux_monitors
      .iter()
      .map(|r| {
        let a = r.read();
        (a.identifier.clone(), a.age, a.age_err)
      })
      .collect();

    if positions.is_empty() {
      warn!("no flux positions to save");
      return Ok(RunOutcome::Continue);
    }

    self
      .dvc
      .save_flux(&state.irradiation, &state.level, &positions)
      .map_err(|e| EngineError::node(self.core.name.clone(), e))?;
    Ok(RunOutcome::Continue)
  }

  fn required(&self) -> Vec<&'static str> {
    vec![SERVICE_DVC]
  }
}

/// Pushes every repository referenced by the final working collections.
pub struct PushNode {
  core: NodeCore,
  dvc: Arc<dyn DataService>,
}

impl PushNode {
  pub fn new(dvc: Arc<dyn DataService>) -> Self {
    PushNode {
      core: NodeCore::new("Push"),
      dvc,
    }
  }
}

impl PipelineNode for PushNode {
  impl_node_boilerplate!();

  fn kind(&self) -> NodeKind {
    NodeKind::Push
  }

  fn run(&mut self, state: &mut EngineState) -> EngineResult<RunOutcome> {
    for name in state.repository_identifiers() {
      self
        .dvc
        .push_repository(&name)
        .map_err(|e| EngineError::node(self.core.name.clone(), e))?;
      debug!(repository = name.as_str(), "pushed");
    }
    Ok(RunOutcome::Continue)
  }

  fn required(&self) -> Vec<&'static str> {
    vec![SERVICE_DVC]
  }
}
