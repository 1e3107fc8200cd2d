// orogen/src/pipeline/engine.rs

//! The `PipelineEngine` orchestrator: owns the pipeline group, the live run
//! state, the node registry, template selection, and repository bookkeeping.
//! The run loops themselves live in `execution.rs`.

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::analysis::{AnalysisRecord, AnalysisType};
use crate::core::state::EngineState;
use crate::error::{EngineError, EngineResult};
use crate::node::base::{NodeId, NodeKind, PipelineNode};
use crate::node::data::{ListenUnknownNode, ReferenceNode, UnknownNode};
use crate::node::filter::FilterNode;
use crate::node::find::FindReferencesNode;
use crate::node::fit::{FigureNode, FitBlanksNode, FitICFactorNode, FitIsotopeEvolutionNode};
use crate::node::grouping::{GraphGroupingNode, GroupingNode};
use crate::node::persist::{
  BlanksPersistNode, ICFactorPersistNode, IsotopeEvolutionPersistNode, PushNode,
};
use crate::node::registry::NodeRegistry;
use crate::node::review::ReviewNode;
use crate::pipeline::definition::{Pipeline, PipelineGroup};
use crate::services::{RepoItem, Services};
use crate::template::{TemplateDoc, TemplateStore};

pub struct PipelineEngine {
  pub pipeline_group: PipelineGroup,
  pub(crate) active: usize,

  pub services: Services,
  registry: NodeRegistry,
  template_store: TemplateStore,

  /// Exactly one live state at a time; fresh runs replace it, resume reuses
  /// it.
  pub state: Option<EngineState>,

  pub selected: Option<NodeId>,
  pub selected_unknowns: Vec<Uuid>,
  pub selected_references: Vec<Uuid>,

  pub repositories: Vec<RepoItem>,
  pub selected_repositories: Vec<String>,

  pub selected_pipeline_template: Option<String>,
  pub available_pipeline_templates: Vec<String>,

  pub(crate) listener_tx: Sender<Vec<AnalysisRecord>>,
  listener_rx: Receiver<Vec<AnalysisRecord>>,
}

impl PipelineEngine {
  pub fn new(services: Services, template_store: TemplateStore) -> EngineResult<Self> {
    let registry = NodeRegistry::standard();
    registry.validate()?;

    let (listener_tx, listener_rx) = unbounded();
    let mut engine = PipelineEngine {
      pipeline_group: PipelineGroup::new(),
      active: 0,
      services,
      registry,
      template_store,
      state: None,
      selected: None,
      selected_unknowns: Vec::new(),
      selected_references: Vec::new(),
      repositories: Vec::new(),
      selected_repositories: Vec::new(),
      selected_pipeline_template: None,
      available_pipeline_templates: Vec::new(),
      listener_tx,
      listener_rx,
    };
    engine.load_predefined_templates();
    Ok(engine)
  }

  pub fn pipeline(&self) -> &Pipeline {
    &self.pipeline_group.pipelines[self.active]
  }

  pub fn pipeline_mut(&mut self) -> &mut Pipeline {
    &mut self.pipeline_group.pipelines[self.active]
  }

  pub fn registry(&self) -> &NodeRegistry {
    &self.registry
  }

  pub fn template_store(&self) -> &TemplateStore {
    &self.template_store
  }

  /// Appends a new pipeline to the group and makes it active.
  pub fn add_pipeline(&mut self) {
    self.pipeline_group.add();
    self.active = self.pipeline_group.pipelines.len() - 1;
    self.selected_pipeline_template = None;
  }

  pub fn set_active_pipeline(&mut self, idx: usize) {
    if idx < self.pipeline_group.pipelines.len() {
      self.active = idx;
    }
  }

  /// Clears cancellation and drops all held data, ready for a fresh run
  /// over the same configured pipeline.
  pub fn reset(&mut self) {
    if let Some(state) = &mut self.state {
      state.canceled = false;
    }
    self.pipeline_mut().reset(true);
  }

  /// Cooperative cancellation: takes effect at the next node boundary.
  pub fn cancel_run(&mut self) {
    if let Some(state) = &mut self.state {
      state.canceled = true;
    }
  }

  pub fn get_unknowns_node(&self) -> Option<NodeId> {
    self
      .pipeline()
      .nodes
      .iter()
      .find(|n| n.kind() == NodeKind::Unknowns)
      .map(|n| n.id())
  }

  pub fn get_nodes(&self, kind: NodeKind) -> Vec<NodeId> {
    self
      .pipeline()
      .nodes
      .iter()
      .filter(|n| n.kind() == kind)
      .map(|n| n.id())
      .collect()
  }

  pub fn remove_node(&mut self, id: NodeId) {
    self.pipeline_mut().remove(id);
  }

  pub fn configure(&mut self, id: NodeId) -> bool {
    match self.pipeline_mut().node_mut(id) {
      Some(node) => node.configure(true),
      None => false,
    }
  }

  pub fn review_node(&mut self, id: NodeId) {
    if let Some(node) = self.pipeline_mut().node_mut(id) {
      node.reset();
    }
  }

  // ------------------------------------------------------------------
  // grouping operations
  // ------------------------------------------------------------------

  fn set_grouping(&mut self, uuids: &[Uuid], gid: usize, graph: bool) -> EngineResult<()> {
    let state = self
      .state
      .as_mut()
      .ok_or_else(|| EngineError::NoState("grouping requires a live run state".to_string()))?;

    for rec in &state.unknowns {
      let matched = uuids.contains(&rec.read().uuid);
      if matched {
        let mut a = rec.write();
        if graph {
          a.graph_id = gid;
        } else {
          a.group_id = gid;
        }
      }
    }

    if let Some(id) = self.selected {
      if let Some(node) = self.pipeline_mut().node_mut(id) {
        if let Some(editor) = &node.core().editor {
          editor.write().force_update();
        }
      }
    }
    Ok(())
  }

  /// Assigns the next group id to the selected subset. The id is one past
  /// the maximum over the *complete* unknowns collection, never the
  /// selection's, so repeated calls cannot collide.
  pub fn unknowns_group_by_selected(&mut self) -> EngineResult<usize> {
    let gid = self
      .state
      .as_ref()
      .ok_or_else(|| EngineError::NoState("grouping requires a live run state".to_string()))?
      .max_group_id()
      + 1;
    let uuids = self.selected_unknowns.clone();
    self.set_grouping(&uuids, gid, false)?;
    Ok(gid)
  }

  pub fn unknowns_graph_group_by_selected(&mut self) -> EngineResult<usize> {
    let gid = self
      .state
      .as_ref()
      .ok_or_else(|| EngineError::NoState("grouping requires a live run state".to_string()))?
      .max_graph_id()
      + 1;
    let uuids = self.selected_unknowns.clone();
    self.set_grouping(&uuids, gid, true)?;
    Ok(gid)
  }

  /// Clears grouping on the selected subset, or everything when nothing is
  /// selected.
  pub fn unknowns_clear_grouping(&mut self) -> EngineResult<()> {
    let uuids = if self.selected_unknowns.is_empty() {
      self
        .state
        .as_ref()
        .map(|s| s.unknowns.iter().map(|r| r.read().uuid).collect())
        .unwrap_or_default()
    } else {
      self.selected_unknowns.clone()
    };
    self.set_grouping(&uuids, 0, false)
  }

  pub fn unknowns_clear_all_grouping(&mut self) -> EngineResult<()> {
    let uuids: Vec<Uuid> = self
      .state
      .as_ref()
      .map(|s| s.unknowns.iter().map(|r| r.read().uuid).collect())
      .unwrap_or_default();
    self.set_grouping(&uuids, 0, false)
  }

  // ------------------------------------------------------------------
  // add-node operations
  // ------------------------------------------------------------------

  fn last_node(&self, after: Option<NodeId>) -> Option<NodeId> {
    after.or_else(|| self.pipeline().nodes.last().map(|n| n.id()))
  }

  fn add_node(&mut self, after: Option<NodeId>, node: Box<dyn PipelineNode>) -> NodeId {
    let anchor = self.last_node(after);
    self.pipeline_mut().add_after(anchor, node)
  }

  pub fn add_data(&mut self, after: Option<NodeId>) -> NodeId {
    let node = UnknownNode::new(self.services.dvc.clone(), self.services.browser.clone());
    self.add_node(after, Box::new(node))
  }

  pub fn add_references(&mut self, after: Option<NodeId>) -> NodeId {
    let node = ReferenceNode::new(self.services.dvc.clone(), self.services.browser.clone());
    self.add_node(after, Box::new(node))
  }

  pub fn add_listen(&mut self, after: Option<NodeId>) -> NodeId {
    let node = ListenUnknownNode::new(self.services.dvc.clone());
    self.add_node(after, Box::new(node))
  }

  pub fn add_review(&mut self, after: Option<NodeId>) -> NodeId {
    self.add_node(after, Box::new(ReviewNode::new()))
  }

  pub fn add_filter(&mut self, after: Option<NodeId>) -> NodeId {
    self.add_node(after, Box::new(FilterNode::new()))
  }

  pub fn add_grouping(&mut self, after: Option<NodeId>) -> NodeId {
    self.add_node(after, Box::new(GroupingNode::new()))
  }

  pub fn add_graph_grouping(&mut self, after: Option<NodeId>) -> NodeId {
    self.add_node(after, Box::new(GraphGroupingNode::new()))
  }

  pub fn add_ideogram(&mut self, after: Option<NodeId>) -> NodeId {
    self.add_node(after, Box::new(FigureNode::ideogram()))
  }

  pub fn add_spectrum(&mut self, after: Option<NodeId>) -> NodeId {
    self.add_node(after, Box::new(FigureNode::spectrum()))
  }

  pub fn add_series(&mut self, after: Option<NodeId>) -> NodeId {
    self.add_node(after, Box::new(FigureNode::series()))
  }

  pub fn add_inverse_isochron(&mut self, after: Option<NodeId>) -> NodeId {
    self.add_node(after, Box::new(FigureNode::inverse_isochron()))
  }

  fn add_find_node(&mut self, after: Option<NodeId>, analysis_type: AnalysisType) -> Option<NodeId> {
    let mut node = FindReferencesNode::new(self.services.dvc.clone(), analysis_type);
    if !node.configure(true) {
      return None;
    }
    let id = self.add_node(after, Box::new(node));
    self.add_references(Some(id));
    Some(id)
  }

  pub fn add_find_blanks(&mut self, after: Option<NodeId>) -> Option<NodeId> {
    self.add_find_node(after, AnalysisType::BlankUnknown)
  }

  pub fn add_find_airs(&mut self, after: Option<NodeId>) -> Option<NodeId> {
    self.add_find_node(after, AnalysisType::Air)
  }

  /// Adds a blanks fit; when its configuration keeps `use_save_node`, the
  /// matching persist node is appended right after it.
  pub fn add_blanks(&mut self, after: Option<NodeId>) -> Option<NodeId> {
    let mut node = FitBlanksNode::new(self.services.fitter.clone());
    if !node.configure(true) {
      return None;
    }
    let use_save = node.use_save_node;
    let id = self.add_node(after, Box::new(node));
    if use_save {
      self.add_blanks_persist(Some(id));
    }
    Some(id)
  }

  pub fn add_icfactor(&mut self, after: Option<NodeId>) -> Option<NodeId> {
    let mut node = FitICFactorNode::new(self.services.fitter.clone());
    if !node.configure(true) {
      return None;
    }
    let use_save = node.use_save_node;
    let id = self.add_node(after, Box::new(node));
    if use_save {
      self.add_icfactor_persist(Some(id));
    }
    Some(id)
  }

  pub fn add_isotope_evolution(&mut self, after: Option<NodeId>) -> Option<NodeId> {
    let mut node = FitIsotopeEvolutionNode::new(self.services.dvc.clone(), self.services.fitter.clone());
    if !node.configure(true) {
      return None;
    }
    let use_save = node.use_save_node;
    let id = self.add_node(after, Box::new(node));
    if use_save {
      self.add_iso_evo_persist(Some(id));
    }
    Some(id)
  }

  pub fn add_blanks_persist(&mut self, after: Option<NodeId>) -> NodeId {
    self.add_node(after, Box::new(BlanksPersistNode::new(self.services.dvc.clone())))
  }

  pub fn add_icfactor_persist(&mut self, after: Option<NodeId>) -> NodeId {
    self.add_node(after, Box::new(ICFactorPersistNode::new(self.services.dvc.clone())))
  }

  pub fn add_iso_evo_persist(&mut self, after: Option<NodeId>) -> NodeId {
    self.add_node(
      after,
      Box::new(IsotopeEvolutionPersistNode::new(self.services.dvc.clone())),
    )
  }

  pub fn add_push(&mut self, after: Option<NodeId>) -> NodeId {
    self.add_node(after, Box::new(PushNode::new(self.services.dvc.clone())))
  }

  // ------------------------------------------------------------------
  // templates
  // ------------------------------------------------------------------

  pub fn set_template(&mut self, name: &str) -> EngineResult<()> {
    debug!(template = name, "set template");
    self.apply_template(name, true)?;
    self.selected_pipeline_template = Some(name.to_string());
    Ok(())
  }

  /// Chain operations append a template's nodes to the current pipeline
  /// instead of replacing it.
  pub fn chain_template(&mut self, name: &str) -> EngineResult<()> {
    self.apply_template(name, false)
  }

  pub fn chain_ideogram(&mut self) -> EngineResult<()> {
    self.chain_template("ideogram")
  }

  pub fn chain_spectrum(&mut self) -> EngineResult<()> {
    self.chain_template("spectrum")
  }

  pub fn chain_blanks(&mut self) -> EngineResult<()> {
    self.chain_template("blanks")
  }

  pub fn chain_icfactors(&mut self) -> EngineResult<()> {
    self.chain_template("icfactors")
  }

  pub fn chain_isotope_evolution(&mut self) -> EngineResult<()> {
    self.chain_template("isotope_evolutions")
  }

  fn apply_template(&mut self, name: &str, clear: bool) -> EngineResult<()> {
    let template = self.template_store.template(name)?;
    let pipeline = &mut self.pipeline_group.pipelines[self.active];

    if let Err(e) = template.render(pipeline, &self.services, &self.registry, clear, &[]) {
      warn!(
        template = name,
        error = %e,
        "invalid pipeline template; there is a syntax problem"
      );
      return Err(e);
    }

    if let Some(state) = &self.state {
      let dets = state.union_detectors.clone();
      for node in &mut self.pipeline_mut().nodes {
        node.set_detectors(&dets);
      }
    }
    self.selected = self.pipeline().nodes.first().map(|n| n.id());
    Ok(())
  }

  pub fn save_pipeline_template(&mut self, name: &str) -> EngineResult<()> {
    let doc: TemplateDoc = self.pipeline().to_template();
    self.template_store.save(name, &doc)?;
    self.load_predefined_templates();
    self.selected_pipeline_template = Some(name.to_string());
    Ok(())
  }

  /// Toggles whether the selected template's review steps stay enabled,
  /// rewriting the template file in place.
  pub fn set_review_permanent(&self, enabled: bool) -> EngineResult<()> {
    let name = self
      .selected_pipeline_template
      .as_deref()
      .ok_or_else(|| EngineError::NoState("no template selected".to_string()))?;
    self.template_store.set_review_permanent(name, enabled)
  }

  pub fn load_predefined_templates(&mut self) {
    self.available_pipeline_templates = self.template_store.available_templates(&self.services);
    debug!(count = self.available_pipeline_templates.len(), "loaded templates");
  }

  pub fn get_experiment_ids(&self) -> std::collections::BTreeSet<String> {
    self.pipeline().get_experiment_ids()
  }

  // ------------------------------------------------------------------
  // repositories
  // ------------------------------------------------------------------

  fn active_repository_names(&self) -> Vec<String> {
    if self.selected_repositories.is_empty() {
      self.repositories.iter().map(|r| r.name.clone()).collect()
    } else {
      self.selected_repositories.clone()
    }
  }

  pub fn refresh_repository_status(&mut self) {
    debug!("refresh repository status");
    let names = self.active_repository_names();
    let dvc = self.services.dvc.clone();
    for repo in self.repositories.iter_mut().filter(|r| names.contains(&r.name)) {
      if let Err(e) = repo.update(dvc.as_ref()) {
        debug!(repository = repo.name.as_str(), error = %e, "status refresh failed");
      }
    }
  }

  pub fn pull(&self) {
    debug!("pull repositories");
    for name in self.active_repository_names() {
      if let Err(e) = self.services.dvc.pull_repository(&name) {
        warn!(repository = name.as_str(), error = %e, "pull failed");
      }
    }
  }

  /// Pushes the active repositories, refreshing each status first. A
  /// repository behind its remote is refused with a warning, never pushed.
  pub fn push(&mut self) {
    debug!("push repositories");
    let names = self.active_repository_names();
    let dvc = self.services.dvc.clone();
    for repo in self.repositories.iter_mut().filter(|r| names.contains(&r.name)) {
      if let Err(e) = repo.update(dvc.as_ref()) {
        warn!(repository = repo.name.as_str(), error = %e, "status refresh failed; not pushing");
        continue;
      }
      if repo.is_behind() {
        warn!(
          repository = repo.name.as_str(),
          "is behind and needs to be updated before it can be pushed"
        );
        continue;
      }
      if let Err(e) = dvc.push_repository(&repo.name) {
        warn!(repository = repo.name.as_str(), error = %e, "push failed");
      }
    }
  }

  pub(crate) fn track_repositories(&mut self, names: impl IntoIterator<Item = String>) {
    for name in names {
      if !self.repositories.iter().any(|r| r.name == name) {
        self.repositories.push(RepoItem::new(name));
      }
    }
  }

  pub(crate) fn update_repository_status(&mut self) {
    let dvc = self.services.dvc.clone();
    for repo in &mut self.repositories {
      if let Err(e) = repo.update(dvc.as_ref()) {
        debug!(repository = repo.name.as_str(), error = %e, "status refresh failed");
      }
    }
  }

  // ------------------------------------------------------------------
  // listener hand-off
  // ------------------------------------------------------------------

  /// The endpoint listening nodes publish through. Background activity must
  /// go through this channel; engine-owned collections are only touched on
  /// the engine's own thread, in `poll_listeners`.
  pub fn listener_sender(&self) -> Sender<Vec<AnalysisRecord>> {
    self.listener_tx.clone()
  }

  /// Drains analyses published by listening nodes into the live state.
  /// This is the single point where poller results enter engine-owned
  /// collections.
  pub fn poll_listeners(&mut self) -> usize {
    let mut received = 0;
    while let Ok(batch) = self.listener_rx.try_recv() {
      received += batch.len();
      if let Some(state) = &mut self.state {
        state.unknowns = batch;
        state.rebuild_derived();
        for editor in &state.editors {
          editor.write().force_update();
        }
      }
    }
    received
  }
}
