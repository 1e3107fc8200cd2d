// orogen/src/node/fit.rs

//! Figure and fit nodes.
//!
//! Fit nodes compute statistical fits over the working collections and leave
//! their selections on the state for downstream persist nodes. The
//! regression itself is behind the pluggable `FitFunction`; this module only
//! sequences it.

use std::sync::Arc;

use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::core::analysis::AnalysisRecord;
use crate::core::control::RunOutcome;
use crate::core::editor::{Editor, EditorKind, ResultRow};
use crate::core::state::EngineState;
use crate::error::{EngineError, EngineResult};
use crate::node::base::{impl_node_boilerplate, NodeCore, NodeKind, NodeTemplate, PipelineNode};
use crate::node::{param_bool, param_str};
use crate::services::{DataService, FitFunction, SERVICE_DVC};

/// Per-chunk progress callback for long per-analysis fit loops.
pub type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// How many analyses to process between progress reports.
const PROGRESS_STEP: usize = 10;

/// One configured fit: an isotope (or detector) key, the fit kind applied to
/// it, and whether the result is marked saveable for persist nodes.
#[derive(Debug, Clone)]
pub struct FitSpec {
  pub name: String,
  pub fit: String,
  pub save: bool,
  pub goodness_threshold: Option<f64>,
}

impl FitSpec {
  pub fn new(name: impl Into<String>, fit: impl Into<String>) -> Self {
    FitSpec {
      name: name.into(),
      fit: fit.into(),
      save: true,
      goodness_threshold: None,
    }
  }
}

fn load_fit_specs(params: &Mapping) -> EngineResult<Vec<FitSpec>> {
  let Some(entries) = params.get("fits").and_then(|v| v.as_sequence()) else {
    return Ok(Vec::new());
  };

  let mut specs = Vec::new();
  for entry in entries {
    let m = entry
      .as_mapping()
      .ok_or_else(|| EngineError::Internal("fit entry is not a mapping".to_string()))?;
    let name = param_str(m, "name")
      .ok_or_else(|| EngineError::Internal("fit entry missing name".to_string()))?;
    let fit = param_str(m, "fit").unwrap_or_else(|| "linear".to_string());
    let mut spec = FitSpec::new(name, fit);
    if let Some(save) = param_bool(m, "save") {
      spec.save = save;
    }
    if let Some(g) = crate::node::param_f64(m, "goodness_threshold") {
      spec.goodness_threshold = Some(g);
    }
    specs.push(spec);
  }
  Ok(specs)
}

fn fit_specs_to_value(specs: &[FitSpec]) -> Value {
  Value::Sequence(
    specs
      .iter()
      .map(|s| {
        let mut m = Mapping::new();
        m.insert(Value::from("name"), Value::from(s.name.as_str()));
        m.insert(Value::from("fit"), Value::from(s.fit.as_str()));
        m.insert(Value::from("save"), Value::from(s.save));
        if let Some(g) = s.goodness_threshold {
          m.insert(Value::from("goodness_threshold"), Value::from(g));
        }
        Value::Mapping(m)
      })
      .collect(),
  )
}

/// Records the saveable selection for downstream persist nodes.
fn set_saveable(state: &mut EngineState, specs: &[FitSpec]) {
  state.saveable_keys = specs.iter().filter(|s| s.save).map(|s| s.name.clone()).collect();
  state.saveable_fits = specs.iter().filter(|s| s.save).map(|s| s.fit.clone()).collect();
}

fn distinct_group_ids(records: &[AnalysisRecord]) -> Vec<usize> {
  let mut gids: Vec<usize> = records.iter().map(|r| r.read().group_id).collect();
  gids.sort_unstable();
  gids.dedup();
  gids
}

fn of_group(records: &[AnalysisRecord], gid: usize) -> Vec<AnalysisRecord> {
  records.iter().filter(|r| r.read().group_id == gid).cloned().collect()
}

/// A figure-producing node: builds a plot editor over the current unknowns.
pub struct FigureNode {
  core: NodeCore,
  kind: NodeKind,
  editor_kind: EditorKind,
}

impl FigureNode {
  fn new(kind: NodeKind, editor_kind: EditorKind, name: &str) -> Self {
    FigureNode {
      core: NodeCore::new(name),
      kind,
      editor_kind,
    }
  }

  pub fn ideogram() -> Self {
    Self::new(NodeKind::Ideogram, EditorKind::Ideogram, "Ideogram")
  }

  pub fn spectrum() -> Self {
    Self::new(NodeKind::Spectrum, EditorKind::Spectrum, "Spectrum")
  }

  pub fn series() -> Self {
    Self::new(NodeKind::Series, EditorKind::Series, "Series")
  }

  pub fn inverse_isochron() -> Self {
    Self::new(NodeKind::InverseIsochron, EditorKind::InverseIsochron, "Inverse Isochron")
  }
}

impl PipelineNode for FigureNode {
  impl_node_boilerplate!();

  fn kind(&self) -> NodeKind {
    self.kind
  }

  fn run(&mut self, state: &mut EngineState) -> EngineResult<RunOutcome> {
    if state.unknowns.is_empty() {
      return Ok(RunOutcome::NoData);
    }

    let editor = Editor::new(self.editor_kind);
    editor.write().set_items(&state.unknowns);
    state.editors.push(editor.clone());
    self.core.editor = Some(editor);
    Ok(RunOutcome::Continue)
  }
}

/// Shared behavior of the reference-fit family (blanks, IC factors): fan the
/// references out by group id, one editor per group, fitting each saveable
/// key over the group's reference signals.
struct ReferenceFit {
  editor_kind: EditorKind,
  fits: Vec<FitSpec>,
}

impl ReferenceFit {
  fn run(
    &self,
    core: &mut NodeCore,
    fitter: &dyn FitFunction,
    state: &mut EngineState,
  ) -> EngineResult<RunOutcome> {
    if state.unknowns.is_empty() {
      return Ok(RunOutcome::NoData);
    }

    for (i, gid) in distinct_group_ids(&state.references).into_iter().enumerate() {
      let editor = Editor::new(self.editor_kind);
      let refs = of_group(&state.references, gid);
      let unks = of_group(&state.unknowns, gid);

      {
        let mut ed = editor.write();
        ed.set_items(&unks);
        ed.set_references(&refs);

        for spec in &self.fits {
          let points: Vec<(f64, f64)> = refs
            .iter()
            .filter_map(|r| {
              let a = r.read();
              let t = a.timestamp.timestamp() as f64;
              a.isotope(&spec.name).map(|iso| (t, iso.value))
            })
            .collect();

          let result = fitter.fit(&spec.fit, &points);
          ed.rows.push(ResultRow {
            record_id: format!("group {}", gid),
            isotope: spec.name.clone(),
            fit: spec.fit.clone(),
            intercept_value: result.value,
            intercept_error: result.error,
            percent_error: if result.value != 0.0 {
              (result.error / result.value * 100.0).abs()
            } else {
              0.0
            },
            goodness: true,
          });
        }
        ed.force_update();
      }

      if i == 0 {
        core.editor = Some(editor.clone());
      }
      state.editors.push(editor);
    }

    set_saveable(state, &self.fits);
    Ok(RunOutcome::Continue)
  }
}

pub struct FitBlanksNode {
  core: NodeCore,
  fitter: Arc<dyn FitFunction>,
  inner: ReferenceFit,
  pub use_save_node: bool,
  has_save_node: bool,
}

impl FitBlanksNode {
  pub fn new(fitter: Arc<dyn FitFunction>) -> Self {
    FitBlanksNode {
      core: NodeCore::new("Fit Blanks"),
      fitter,
      inner: ReferenceFit {
        editor_kind: EditorKind::Blanks,
        fits: Vec::new(),
      },
      use_save_node: true,
      has_save_node: false,
    }
  }

  pub fn fits(&self) -> &[FitSpec] {
    &self.inner.fits
  }

  pub fn set_fits(&mut self, fits: Vec<FitSpec>) {
    self.inner.fits = fits;
  }
}

impl PipelineNode for FitBlanksNode {
  impl_node_boilerplate!();

  fn kind(&self) -> NodeKind {
    NodeKind::FitBlanks
  }

  fn configure(&mut self, _interactive: bool) -> bool {
    !self.inner.fits.is_empty()
  }

  fn run(&mut self, state: &mut EngineState) -> EngineResult<RunOutcome> {
    self.inner.run(&mut self.core, self.fitter.as_ref(), state)
  }

  fn load(&mut self, params: &Mapping) -> EngineResult<()> {
    self.inner.fits = load_fit_specs(params)?;
    if let Some(v) = param_bool(params, "use_save_node") {
      self.use_save_node = v;
    }
    Ok(())
  }

  fn to_template(&self) -> NodeTemplate {
    NodeTemplate::new(self.kind().klass())
      .with("fits", fit_specs_to_value(&self.inner.fits))
      .with("use_save_node", self.use_save_node)
  }

  fn has_save_node(&self) -> bool {
    self.has_save_node
  }

  fn set_has_save_node(&mut self, value: bool) {
    self.has_save_node = value;
  }
}

pub struct FitICFactorNode {
  core: NodeCore,
  fitter: Arc<dyn FitFunction>,
  inner: ReferenceFit,
  pub detectors: Vec<String>,
  pub use_save_node: bool,
  has_save_node: bool,
}

impl FitICFactorNode {
  pub fn new(fitter: Arc<dyn FitFunction>) -> Self {
    FitICFactorNode {
      core: NodeCore::new("Fit ICFactor"),
      fitter,
      inner: ReferenceFit {
        editor_kind: EditorKind::ICFactor,
        fits: Vec::new(),
      },
      detectors: Vec::new(),
      use_save_node: true,
      has_save_node: false,
    }
  }

  pub fn fits(&self) -> &[FitSpec] {
    &self.inner.fits
  }

  pub fn set_fits(&mut self, fits: Vec<FitSpec>) {
    self.inner.fits = fits;
  }
}

impl PipelineNode for FitICFactorNode {
  impl_node_boilerplate!();

  fn kind(&self) -> NodeKind {
    NodeKind::FitICFactor
  }

  fn configure(&mut self, _interactive: bool) -> bool {
    !self.inner.fits.is_empty() || !self.detectors.is_empty()
  }

  fn run(&mut self, state: &mut EngineState) -> EngineResult<RunOutcome> {
    self.inner.run(&mut self.core, self.fitter.as_ref(), state)
  }

  fn load(&mut self, params: &Mapping) -> EngineResult<()> {
    self.inner.fits = load_fit_specs(params)?;
    if let Some(v) = param_bool(params, "use_save_node") {
      self.use_save_node = v;
    }
    Ok(())
  }

  fn to_template(&self) -> NodeTemplate {
    NodeTemplate::new(self.kind().klass())
      .with("fits", fit_specs_to_value(&self.inner.fits))
      .with("use_save_node", self.use_save_node)
  }

  fn has_save_node(&self) -> bool {
    self.has_save_node
  }

  fn set_has_save_node(&mut self, value: bool) {
    self.has_save_node = value;
  }

  /// Valid detectors follow the detector union of the working collections;
  /// a spec is seeded for any detector that does not have one yet.
  fn set_detectors(&mut self, detectors: &[String]) {
    self.detectors = detectors.to_vec();
    for det in detectors {
      if !self.inner.fits.iter().any(|f| f.name == *det) {
        self.inner.fits.push(FitSpec::new(det.clone(), "linear"));
      }
    }
  }
}

pub struct FitIsotopeEvolutionNode {
  core: NodeCore,
  dvc: Arc<dyn DataService>,
  fitter: Arc<dyn FitFunction>,
  pub fits: Vec<FitSpec>,
  pub use_save_node: bool,
  has_save_node: bool,
  pub progress: Option<ProgressFn>,
}

impl FitIsotopeEvolutionNode {
  pub fn new(dvc: Arc<dyn DataService>, fitter: Arc<dyn FitFunction>) -> Self {
    FitIsotopeEvolutionNode {
      core: NodeCore::new("Fit IsoEvo"),
      dvc,
      fitter,
      fits: Vec::new(),
      use_save_node: true,
      has_save_node: false,
      progress: None,
    }
  }

  fn fit_one(&self, rec: &AnalysisRecord) -> EngineResult<Vec<ResultRow>> {
    let keys: Vec<String> = self.fits.iter().map(|f| f.name.clone()).collect();
    self
      .dvc
      .load_raw_data(rec, &keys)
      .map_err(|e| EngineError::node(self.core.name.clone(), e))?;

    let mut rows = Vec::new();
    let mut a = rec.write();
    let record_id = a.record_id.clone();
    for spec in &self.fits {
      // match by isotope name, falling back to detector key
      let idx = a
        .isotopes
        .iter()
        .position(|i| i.name == spec.name)
        .or_else(|| a.isotopes.iter().position(|i| i.detector == spec.name));
      let Some(idx) = idx else {
        continue;
      };
      let iso = &mut a.isotopes[idx];

      let result = self.fitter.fit(&spec.fit, &iso.points);
      iso.value = result.value;
      iso.error = result.error;
      iso.fit = Some(spec.fit.clone());

      let pe = iso.percent_error();
      let goodness = spec.goodness_threshold.map(|g| pe < g).unwrap_or(true);
      rows.push(ResultRow {
        record_id: record_id.clone(),
        isotope: spec.name.clone(),
        fit: spec.fit.clone(),
        intercept_value: result.value,
        intercept_error: result.error,
        percent_error: pe,
        goodness,
      });
    }
    Ok(rows)
  }
}

impl PipelineNode for FitIsotopeEvolutionNode {
  impl_node_boilerplate!();

  fn kind(&self) -> NodeKind {
    NodeKind::FitIsotopeEvolution
  }

  fn configure(&mut self, _interactive: bool) -> bool {
    !self.fits.is_empty()
  }

  fn run(&mut self, state: &mut EngineState) -> EngineResult<RunOutcome> {
    if state.unknowns.is_empty() {
      return Ok(RunOutcome::NoData);
    }

    let total = state.unknowns.len();
    let mut rows = Vec::new();
    for (i, rec) in state.unknowns.iter().enumerate() {
      rows.extend(self.fit_one(rec)?);
      if (i + 1) % PROGRESS_STEP == 0 || i + 1 == total {
        if let Some(progress) = &self.progress {
          progress(i + 1, total);
        }
        debug!(done = i + 1, total, "isotope evolution fits");
      }
    }

    let editor = Editor::new(EditorKind::IsoEvolutionResults);
    {
      let mut ed = editor.write();
      ed.set_items(&state.unknowns);
      ed.rows = rows;
    }
    state.editors.push(editor.clone());
    self.core.editor = Some(editor);

    set_saveable(state, &self.fits);
    Ok(RunOutcome::Continue)
  }

  fn load(&mut self, params: &Mapping) -> EngineResult<()> {
    self.fits = load_fit_specs(params)?;
    if let Some(v) = param_bool(params, "use_save_node") {
      self.use_save_node = v;
    }
    Ok(())
  }

  fn to_template(&self) -> NodeTemplate {
    NodeTemplate::new(self.kind().klass())
      .with("fits", fit_specs_to_value(&self.fits))
      .with("use_save_node", self.use_save_node)
  }

  fn has_save_node(&self) -> bool {
    self.has_save_node
  }

  fn set_has_save_node(&mut self, value: bool) {
    self.has_save_node = value;
  }

  fn required(&self) -> Vec<&'static str> {
    vec![SERVICE_DVC]
  }
}

pub struct FitFluxNode {
  core: NodeCore,
  fitter: Arc<dyn FitFunction>,
  pub fit: String,
  pub use_save_node: bool,
  has_save_node: bool,
}

impl FitFluxNode {
  pub fn new(fitter: Arc<dyn FitFunction>) -> Self {
    FitFluxNode {
      core: NodeCore::new("Fit Flux"),
      fitter,
      fit: "plane".to_string(),
      use_save_node: true,
      has_save_node: false,
    }
  }
}

impl PipelineNode for FitFluxNode {
  impl_node_boilerplate!();

  fn kind(&self) -> NodeKind {
    NodeKind::FitFlux
  }

  fn run(&mut self, state: &mut EngineState) -> EngineResult<RunOutcome> {
    if state.flux_monitors.is_empty() {
      return Ok(RunOutcome::Canceled);
    }

    self.core.name = format!("Fit Flux {} {}", state.irradiation, state.level);

    let editor = Editor::new(EditorKind::FluxResults);
    {
      let mut ed = editor.write();
      ed.set_items(&state.flux_monitors);
      for rec in &state.flux_monitors {
        let a = rec.read();
        let points: Vec<(f64, f64)> = vec![(a.aliquot as f64, a.age)];
        let result = self.fitter.fit(&self.fit, &points);
        ed.rows.push(ResultRow {
          record_id: a.record_id.clone(),
          isotope: "j".to_string(),
          fit: self.fit.clone(),
          intercept_value: result.value,
          intercept_error: result.error,
          percent_error: 0.0,
          goodness: true,
        });
      }
      ed.force_update();
    }
    state.editors.push(editor.clone());
    self.core.editor = Some(editor);

    state.saveable_keys = vec!["j".to_string()];
    state.saveable_fits = vec![self.fit.clone()];
    Ok(RunOutcome::Continue)
  }

  fn load(&mut self, params: &Mapping) -> EngineResult<()> {
    if let Some(f) = param_str(params, "fit") {
      self.fit = f;
    }
    if let Some(v) = param_bool(params, "use_save_node") {
      self.use_save_node = v;
    }
    Ok(())
  }

  fn to_template(&self) -> NodeTemplate {
    NodeTemplate::new(self.kind().klass())
      .with("fit", self.fit.as_str())
      .with("use_save_node", self.use_save_node)
  }

  fn has_save_node(&self) -> bool {
    self.has_save_node
  }

  fn set_has_save_node(&mut self, value: bool) {
    self.has_save_node = value;
  }
}
