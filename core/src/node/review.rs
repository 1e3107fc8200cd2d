// orogen/src/node/review.rs

//! Human checkpoints: the review veto and the notification summary.

use std::sync::Arc;

use serde_yaml::Mapping;
use tracing::{debug, warn};

use crate::core::control::RunOutcome;
use crate::core::state::EngineState;
use crate::error::EngineResult;
use crate::node::base::{impl_node_boilerplate, NodeCore, NodeKind, NodeTemplate, PipelineNode};
use crate::node::param_bool;
use crate::services::{Notifier, SERVICE_NOTIFICATION};

/// Halts the run for human review of the editors produced so far. The veto
/// records this node as the resumption point; review templates can make the
/// stop permanent or auto-approved via `set_review_permanent`.
pub struct ReviewNode {
  core: NodeCore,
  pub auto_review: bool,
}

impl ReviewNode {
  pub fn new() -> Self {
    ReviewNode {
      core: NodeCore::new("Review"),
      auto_review: false,
    }
  }
}

impl Default for ReviewNode {
  fn default() -> Self {
    Self::new()
  }
}

impl PipelineNode for ReviewNode {
  impl_node_boilerplate!();

  fn kind(&self) -> NodeKind {
    NodeKind::Review
  }

  fn run(&mut self, _state: &mut EngineState) -> EngineResult<RunOutcome> {
    if self.auto_review {
      debug!("review auto-approved");
      Ok(RunOutcome::Continue)
    } else {
      Ok(RunOutcome::Veto)
    }
  }

  fn load(&mut self, params: &Mapping) -> EngineResult<()> {
    if let Some(v) = param_bool(params, "enabled") {
      self.core.enabled = v;
    }
    if let Some(v) = param_bool(params, "auto_review") {
      self.auto_review = v;
    }
    Ok(())
  }

  fn to_template(&self) -> NodeTemplate {
    NodeTemplate::new(self.kind().klass())
      .with("enabled", self.core.enabled)
      .with("auto_review", self.auto_review)
  }
}

/// Sends a short run summary through the notification service.
pub struct EmailNode {
  core: NodeCore,
  notifier: Arc<dyn Notifier>,
  pub subject: String,
}

impl EmailNode {
  pub fn new(notifier: Arc<dyn Notifier>) -> Self {
    EmailNode {
      core: NodeCore::new("Email"),
      notifier,
      subject: "Pipeline run".to_string(),
    }
  }
}

impl PipelineNode for EmailNode {
  impl_node_boilerplate!();

  fn kind(&self) -> NodeKind {
    NodeKind::Email
  }

  fn run(&mut self, state: &mut EngineState) -> EngineResult<RunOutcome> {
    let body = format!(
      "unknowns: {}\nreferences: {}\neditors: {}\nprojects: {}",
      state.unknowns.len(),
      state.references.len(),
      state.editors.len(),
      state.projects.iter().cloned().collect::<Vec<_>>().join(", ")
    );

    if let Err(e) = self.notifier.notify(&self.subject, &body) {
      // notification failure should not kill a reduction run
      warn!(error = %e, "notification failed");
    }
    Ok(RunOutcome::Continue)
  }

  fn load(&mut self, params: &Mapping) -> EngineResult<()> {
    if let Some(s) = crate::node::param_str(params, "subject") {
      self.subject = s;
    }
    Ok(())
  }

  fn to_template(&self) -> NodeTemplate {
    NodeTemplate::new(self.kind().klass()).with("subject", self.subject.as_str())
  }

  fn required(&self) -> Vec<&'static str> {
    vec![SERVICE_NOTIFICATION]
  }
}
