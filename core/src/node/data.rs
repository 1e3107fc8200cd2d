// orogen/src/node/data.rs

//! Data nodes: the stages that load and hold named collections of analyses.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use serde_yaml::Mapping;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::analysis::{AnalysisRecord, AnalysisType};
use crate::core::control::RunOutcome;
use crate::core::state::EngineState;
use crate::error::EngineResult;
use crate::node::base::{impl_node_boilerplate, NodeCore, NodeKind, NodeTemplate, PipelineNode, PostRunContext};
use crate::node::{param_i64, param_str};
use crate::services::{DataService, SelectionModel, SessionCtx, SERVICE_BROWSER, SERVICE_DVC};

/// Pulls the browser's current selection through the data service into a
/// working list. Returns false when nothing could be selected.
fn select_into(
  dvc: &dyn DataService,
  browser: &dyn SelectionModel,
  target: &mut Vec<AnalysisRecord>,
) -> bool {
  let records = browser.selected_records();
  if records.is_empty() {
    return false;
  }

  match dvc.make_analyses(&records) {
    Ok(analyses) => {
      if browser.append_mode() {
        target.extend(analyses);
      } else {
        *target = analyses;
      }
      !target.is_empty()
    }
    Err(e) => {
      warn!(error = %e, "failed resolving selected records");
      false
    }
  }
}

pub struct UnknownNode {
  core: NodeCore,
  dvc: Arc<dyn DataService>,
  browser: Arc<dyn SelectionModel>,
  pub unknowns: Vec<AnalysisRecord>,
  pub check_reviewed: bool,
}

impl UnknownNode {
  pub fn new(dvc: Arc<dyn DataService>, browser: Arc<dyn SelectionModel>) -> Self {
    UnknownNode {
      core: NodeCore::new("Unknowns"),
      dvc,
      browser,
      unknowns: Vec::new(),
      check_reviewed: false,
    }
  }

  pub fn set_unknowns(&mut self, unknowns: Vec<AnalysisRecord>) {
    self.unknowns = unknowns;
  }
}

impl PipelineNode for UnknownNode {
  impl_node_boilerplate!();

  fn kind(&self) -> NodeKind {
    NodeKind::Unknowns
  }

  fn configure(&mut self, interactive: bool) -> bool {
    if !interactive && !self.unknowns.is_empty() {
      return true;
    }
    select_into(self.dvc.as_ref(), self.browser.as_ref(), &mut self.unknowns)
  }

  fn run(&mut self, state: &mut EngineState) -> EngineResult<RunOutcome> {
    if self.unknowns.is_empty() {
      if !state.unknowns.is_empty() {
        // replayed against externally supplied state; nothing to contribute
        state.rebuild_derived();
        return Ok(RunOutcome::Continue);
      }
      if !self.configure(true) {
        return Ok(RunOutcome::NoData);
      }
    }

    let mut review_req: Vec<&str> = Vec::new();
    for rec in &self.unknowns {
      rec.write().group_id = 0;
      if self.check_reviewed {
        for attr in ["blanks", "iso_evo"] {
          if !review_req.contains(&attr) && !self.dvc.analysis_has_review(rec, attr) {
            review_req.push(attr);
          }
        }
      }
    }

    if !review_req.is_empty() {
      warn!(
        "The current data set has been analyzed and requires {}",
        review_req.join(",")
      );
    }

    state.unknowns.extend(self.unknowns.iter().cloned());
    state.rebuild_derived();
    Ok(RunOutcome::Continue)
  }

  fn clear_data(&mut self) {
    self.unknowns.clear();
  }

  fn clear_unknowns(&mut self) {
    self.unknowns.clear();
  }

  fn load(&mut self, params: &Mapping) -> EngineResult<()> {
    if let Some(v) = crate::node::param_bool(params, "check_reviewed") {
      self.check_reviewed = v;
    }
    Ok(())
  }

  fn to_template(&self) -> NodeTemplate {
    NodeTemplate::new(self.kind().klass()).with("check_reviewed", self.check_reviewed)
  }

  fn required(&self) -> Vec<&'static str> {
    vec![SERVICE_DVC, SERVICE_BROWSER]
  }
}

pub struct ReferenceNode {
  core: NodeCore,
  dvc: Arc<dyn DataService>,
  browser: Arc<dyn SelectionModel>,
  pub unknowns: Vec<AnalysisRecord>,
  pub references: Vec<AnalysisRecord>,
}

impl ReferenceNode {
  pub fn new(dvc: Arc<dyn DataService>, browser: Arc<dyn SelectionModel>) -> Self {
    ReferenceNode {
      core: NodeCore::new("References"),
      dvc,
      browser,
      unknowns: Vec::new(),
      references: Vec::new(),
    }
  }
}

impl PipelineNode for ReferenceNode {
  impl_node_boilerplate!();

  fn kind(&self) -> NodeKind {
    NodeKind::References
  }

  fn configure(&mut self, interactive: bool) -> bool {
    if !interactive && !self.references.is_empty() {
      return true;
    }
    select_into(self.dvc.as_ref(), self.browser.as_ref(), &mut self.references)
  }

  fn pre_run(&mut self, state: &mut EngineState, configure: bool) -> bool {
    self.unknowns = state.unknowns.clone();
    if !state.references.is_empty() {
      self.references.extend(state.references.iter().cloned());
    }

    if self.references.is_empty() && configure {
      self.configure(true);
    }

    !self.references.is_empty()
  }

  fn run(&mut self, state: &mut EngineState) -> EngineResult<RunOutcome> {
    if state.references.is_empty() {
      state.references.extend(self.references.iter().cloned());
      state.rebuild_derived();
    }
    Ok(RunOutcome::Continue)
  }

  fn clear_data(&mut self) {
    self.unknowns.clear();
    self.references.clear();
  }

  fn clear_unknowns(&mut self) {
    self.unknowns.clear();
  }

  fn required(&self) -> Vec<&'static str> {
    vec![SERVICE_DVC, SERVICE_BROWSER]
  }
}

pub struct FluxMonitorsNode {
  core: NodeCore,
  pub unknowns: Vec<AnalysisRecord>,
}

impl FluxMonitorsNode {
  pub fn new() -> Self {
    FluxMonitorsNode {
      core: NodeCore::new("Flux Monitors"),
      unknowns: Vec::new(),
    }
  }
}

impl Default for FluxMonitorsNode {
  fn default() -> Self {
    Self::new()
  }
}

impl PipelineNode for FluxMonitorsNode {
  impl_node_boilerplate!();

  fn kind(&self) -> NodeKind {
    NodeKind::FluxMonitors
  }

  fn run(&mut self, state: &mut EngineState) -> EngineResult<RunOutcome> {
    self.unknowns = state.flux_monitors.clone();
    Ok(RunOutcome::Continue)
  }

  fn clear_data(&mut self) {
    self.unknowns.clear();
  }
}

/// A data node that keeps watching for newly acquired unknowns after the
/// run finishes. The poller runs on its own thread and publishes fresh
/// analyses through the engine's listener channel; it never touches
/// engine-owned collections directly.
pub struct ListenUnknownNode {
  core: NodeCore,
  dvc: Arc<dyn DataService>,
  pub unknowns: Vec<AnalysisRecord>,
  pub hours: i64,
  pub mass_spectrometer: String,
  pub available_spectrometers: Vec<String>,
  pub exclude_uuids: Vec<Uuid>,
  /// Poll period in seconds.
  pub period: u64,
  alive: Arc<AtomicBool>,
}

impl ListenUnknownNode {
  pub fn new(dvc: Arc<dyn DataService>) -> Self {
    ListenUnknownNode {
      core: NodeCore::new("Listen Unknowns"),
      dvc,
      unknowns: Vec::new(),
      hours: 10,
      mass_spectrometer: String::new(),
      available_spectrometers: Vec::new(),
      exclude_uuids: Vec::new(),
      period: 60,
      alive: Arc::new(AtomicBool::new(false)),
    }
  }

  pub fn is_listening(&self) -> bool {
    self.alive.load(Ordering::Relaxed)
  }

  pub fn stop(&self) {
    self.alive.store(false, Ordering::Relaxed);
  }

  fn start_listening(&mut self, ctx: &mut PostRunContext) {
    if self.is_listening() {
      return;
    }
    self.alive.store(true, Ordering::Relaxed);

    let alive = Arc::clone(&self.alive);
    let dvc = Arc::clone(&self.dvc);
    let tx = ctx.listener.clone();
    let period = self.period;
    let spectrometer = self.mass_spectrometer.clone();
    let mut exclude = self.exclude_uuids.clone();
    let mut low = Utc::now() - chrono::Duration::hours(self.hours);

    thread::spawn(move || {
      while alive.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_secs(period));
        if !alive.load(Ordering::Relaxed) {
          break;
        }

        let high = Utc::now();
        let fresh = {
          let _session = SessionCtx::new(dvc.as_ref());
          dvc
            .get_analyses_by_date_range(low, high, &exclude, AnalysisType::Unknown, &spectrometer)
            .and_then(|records| dvc.make_analyses(&records))
        };

        match fresh {
          Ok(analyses) if !analyses.is_empty() => {
            exclude.extend(analyses.iter().map(|a| a.read().uuid));
            low = high;
            if tx.send(analyses).is_err() {
              // engine side dropped; nothing to report to anymore
              break;
            }
          }
          Ok(_) => {}
          Err(e) => {
            debug!(error = %e, "listen poll failed");
          }
        }
      }
    });
  }
}

impl Drop for ListenUnknownNode {
  fn drop(&mut self) {
    self.stop();
  }
}

impl PipelineNode for ListenUnknownNode {
  impl_node_boilerplate!();

  fn kind(&self) -> NodeKind {
    NodeKind::ListenUnknowns
  }

  fn run(&mut self, state: &mut EngineState) -> EngineResult<RunOutcome> {
    for rec in &self.unknowns {
      rec.write().group_id = 0;
    }
    state.unknowns.extend(self.unknowns.iter().cloned());
    state.rebuild_derived();
    Ok(RunOutcome::Continue)
  }

  fn post_run(&mut self, ctx: &mut PostRunContext, _state: &mut EngineState) {
    self.start_listening(ctx);
  }

  fn reset(&mut self) {
    self.stop();
    self.core_mut().reset();
  }

  fn clear_data(&mut self) {
    self.stop();
    self.unknowns.clear();
  }

  fn clear_unknowns(&mut self) {
    self.unknowns.clear();
  }

  fn load(&mut self, params: &Mapping) -> EngineResult<()> {
    if let Some(v) = param_i64(params, "hours") {
      self.hours = v;
    }
    if let Some(v) = param_i64(params, "period") {
      self.period = v.max(1) as u64;
    }
    if let Some(v) = param_str(params, "mass_spectrometer") {
      self.mass_spectrometer = v;
    }
    Ok(())
  }

  fn finish_load(&mut self) {
    self.available_spectrometers = self.dvc.mass_spectrometer_names();
  }

  fn to_template(&self) -> NodeTemplate {
    NodeTemplate::new(self.kind().klass())
      .with("hours", self.hours)
      .with("period", self.period as i64)
      .with("mass_spectrometer", self.mass_spectrometer.as_str())
  }

  fn required(&self) -> Vec<&'static str> {
    vec![SERVICE_DVC]
  }
}
