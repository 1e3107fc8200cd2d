// orogen/src/pipeline/execution.rs

//! The engine's run loops: `run_pipeline` and friends, `rerun_with`, and the
//! unconditional post-run pass.

use std::time::Instant;

use tracing::{debug, event, span, warn, Level};

use crate::core::analysis::AnalysisRecord;
use crate::core::control::{RunOutcome, RunStatus};
use crate::core::state::EngineState;
use crate::error::{EngineError, EngineResult};
use crate::node::base::{NodeId, PostRunContext};
use crate::pipeline::definition::Pipeline;
use crate::pipeline::engine::PipelineEngine;

/// Pushes the current detector union into any node that cares (IC-factor
/// fits track valid detectors as collections change).
fn update_detectors(pipeline: &mut Pipeline, state: &EngineState) {
  for node in &mut pipeline.nodes {
    node.set_detectors(&state.union_detectors);
  }
}

impl PipelineEngine {
  /// Runs the active pipeline against a fresh state.
  pub fn run_pipeline(&mut self) -> EngineResult<RunStatus> {
    self.run_with(None, false)
  }

  /// Continues with the existing state. The veto recorded on the state, if
  /// any, becomes the start point; veto and cancellation flags are cleared
  /// at the top of the pass.
  pub fn resume_pipeline(&mut self) -> EngineResult<RunStatus> {
    self.run_with(None, true)
  }

  /// Re-runs from just before the selected node, reusing the existing
  /// state. Without a live state this is a plain `run_pipeline`.
  pub fn run_from_pipeline(&mut self) -> EngineResult<RunStatus> {
    if self.state.is_none() {
      return self.run_pipeline();
    }

    let run_from = self.selected.and_then(|sel| {
      let pipeline = self.pipeline();
      let idx = pipeline.index_of(sel)?;
      // restart AT the node before the selection; the start point handed to
      // iternodes is exclusive, so step back once more
      let start_at = idx.saturating_sub(1);
      if start_at == 0 {
        None
      } else {
        Some(pipeline.nodes[start_at - 1].id())
      }
    });

    self.run_with(run_from, true)
  }

  fn run_with(&mut self, run_from: Option<NodeId>, reuse_state: bool) -> EngineResult<RunStatus> {
    let mut state = if reuse_state {
      self.state.take().unwrap_or_default()
    } else {
      EngineState::new()
    };

    let run_span = span!(
      Level::INFO,
      "run_pipeline",
      pipeline = self.pipeline().name.as_str(),
      num_nodes = self.pipeline().len(),
    );
    let _run_guard = run_span.enter();

    let start_node = run_from.or(state.veto);
    event!(Level::DEBUG, "pipeline run started");
    if let Some(id) = start_node {
      event!(Level::DEBUG, start = ?id, "starting mid-pipeline");
    }
    state.veto = None;
    state.canceled = false;

    let ost = Instant::now();
    let active = self.active;
    let order = self.pipeline().iternodes(start_node, None);

    {
      let pipeline = &mut self.pipeline_group.pipelines[active];
      for (idx, &i) in order.iter().enumerate() {
        let core = pipeline.nodes[i].core_mut();
        core.visited = false;
        core.index = idx;
      }
    }

    let mut status = RunStatus::Completed;
    for (idx, &i) in order.iter().enumerate() {
      let pipeline = &mut self.pipeline_group.pipelines[active];
      let node = &mut pipeline.nodes[i];
      let node_id = node.id();

      if !node.is_enabled() {
        debug!(index = idx, node = node.name(), "skip node");
        continue;
      }

      let step_span = span!(Level::INFO, "pipeline_node", node = node.name(), index = idx);
      let _step_guard = step_span.enter();

      node.core_mut().editor = None;
      node.core_mut().active = true;

      if !node.pre_run(&mut state, true) {
        node.core_mut().active = false;
        debug!(node = node.name(), "pre run failed");
        status = RunStatus::PreRunFailed { node: node_id };
        break;
      }

      let st = Instant::now();
      let outcome = node.run(&mut state);
      node.core_mut().active = false;

      let outcome = match outcome {
        Ok(o) => o,
        Err(e) => {
          // hard node failures propagate un-wrapped; no finalization pass
          self.state = Some(state);
          return Err(e);
        }
      };
      debug!(index = idx, node = node.name(), runtime = ?st.elapsed(), "node ran");

      match outcome {
        RunOutcome::Continue => {
          node.core_mut().visited = true;
          self.selected = Some(node_id);
          update_detectors(pipeline, &state);
        }
        RunOutcome::NoData => {
          warn!("No Analyses in Pipeline!");
          pipeline.reset(false);
          status = RunStatus::NoData;
          break;
        }
        RunOutcome::Veto => {
          node.core_mut().visited = true;
          state.veto = Some(node_id);
          debug!(node = pipeline.nodes[i].name(), "pipeline vetoed");
          status = RunStatus::Vetoed { node: node_id };
          break;
        }
        RunOutcome::Canceled => {
          state.canceled = true;
          debug!("pipeline canceled");
          status = RunStatus::Canceled;
          break;
        }
      }

      // nodes may also raise the flags directly on the state
      if let Some(vetoer) = state.veto {
        debug!("pipeline vetoed via state flag");
        status = RunStatus::Vetoed { node: vetoer };
        break;
      }
      if state.canceled {
        debug!("pipeline canceled via state flag");
        status = RunStatus::Canceled;
        break;
      }
    }

    event!(Level::DEBUG, runtime = ?ost.elapsed(), "pipeline run finished");

    // unconditional finalization, separate from execution success
    self.post_run(&mut state);
    self.state = Some(state);
    Ok(status)
  }

  /// Applies the configured pipeline to a different analysis set: replaces
  /// the unknowns and replays every node from the start without interactive
  /// configuration. Requires a live state from a previous run.
  pub fn rerun_with(&mut self, unknowns: Vec<AnalysisRecord>, post_run: bool) -> EngineResult<RunStatus> {
    let mut state = self
      .state
      .take()
      .ok_or_else(|| EngineError::NoState("rerun_with requires a previous run".to_string()))?;

    state.unknowns = unknowns;
    state.canceled = false;
    state.rebuild_derived();

    let run_span = span!(Level::INFO, "rerun_with", pipeline = self.pipeline().name.as_str());
    let _run_guard = run_span.enter();

    let ost = Instant::now();
    let active = self.active;
    let order = self.pipeline().iternodes(None, None);

    let mut status = RunStatus::Completed;
    for (idx, &i) in order.iter().enumerate() {
      let pipeline = &mut self.pipeline_group.pipelines[active];
      let node = &mut pipeline.nodes[i];
      let node_id = node.id();

      if !node.is_enabled() {
        debug!(index = idx, node = node.name(), "skip node");
        continue;
      }

      node.core_mut().active = true;

      if !node.pre_run(&mut state, false) {
        node.core_mut().active = false;
        debug!(node = node.name(), "pre run failed");
        status = RunStatus::PreRunFailed { node: node_id };
        break;
      }

      node.clear_unknowns();

      let st = Instant::now();
      let outcome = node.run(&mut state);
      node.core_mut().active = false;

      let outcome = match outcome {
        Ok(o) => o,
        Err(e) => {
          self.state = Some(state);
          return Err(e);
        }
      };
      debug!(index = idx, node = node.name(), runtime = ?st.elapsed(), "node ran");

      match outcome {
        RunOutcome::Continue => {
          node.core_mut().visited = true;
          self.selected = Some(node_id);
        }
        RunOutcome::NoData => {
          warn!("No Analyses in Pipeline!");
          pipeline.reset(false);
          status = RunStatus::NoData;
          break;
        }
        RunOutcome::Veto => {
          state.veto = Some(node_id);
          status = RunStatus::Vetoed { node: node_id };
          break;
        }
        RunOutcome::Canceled => {
          state.canceled = true;
          status = RunStatus::Canceled;
          break;
        }
      }

      if let Some(vetoer) = state.veto {
        status = RunStatus::Vetoed { node: vetoer };
        break;
      }
      if state.canceled {
        status = RunStatus::Canceled;
        break;
      }
    }

    debug!(runtime = ?ost.elapsed(), "rerun finished");

    if status.is_completed() && post_run {
      self.post_run(&mut state);
    }
    self.state = Some(state);
    Ok(status)
  }

  /// The post-run pass: visits *all* nodes of the pipeline (not just the
  /// executed suffix), finalizing each enabled one, then does repository
  /// bookkeeping and a status refresh over the tracked set.
  pub fn post_run(&mut self, state: &mut EngineState) {
    debug!("pipeline post run started");

    let mut ctx = PostRunContext {
      listener: self.listener_tx.clone(),
    };

    let active = self.active;
    let pipeline = &mut self.pipeline_group.pipelines[active];
    for (idx, node) in pipeline.nodes.iter_mut().enumerate() {
      if node.is_enabled() {
        debug!(index = idx, node = node.name(), "post run node");
        node.post_run(&mut ctx, state);
      } else {
        debug!(index = idx, node = node.name(), "skip node");
      }
    }
    debug!("pipeline post run finished");

    self.track_repositories(state.repository_identifiers());
    self.update_repository_status();
  }
}
