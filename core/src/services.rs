// orogen/src/services.rs

//! Collaborator contracts the engine depends on.
//!
//! These are specified as traits, not implementations: the data-access layer,
//! the selection browser, the notification service, and the regression math
//! are all external. The engine only relies on the surfaces below.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::core::analysis::{AnalysisRecord, AnalysisType};

/// Service tags used by template `required` lists and node wiring.
pub const SERVICE_DVC: &str = "dvc";
pub const SERVICE_BROWSER: &str = "browser";
pub const SERVICE_NOTIFICATION: &str = "notification";

/// A lightweight record descriptor as produced by the selection browser;
/// resolved into full analyses by `DataService::make_analyses`.
#[derive(Debug, Clone)]
pub struct SelectedRecord {
  pub uuid: Uuid,
  pub record_id: String,
  pub repository_identifier: String,
}

/// The fit families that can be persisted back to storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitKind {
  Blanks,
  ICFactor,
  IsoEvolution,
  Flux,
}

impl fmt::Display for FitKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      FitKind::Blanks => "blanks",
      FitKind::ICFactor => "icfactor",
      FitKind::IsoEvolution => "iso_evo",
      FitKind::Flux => "flux",
    };
    f.write_str(s)
  }
}

/// Data-access collaborator (the DVC layer in the original system).
pub trait DataService: Send + Sync {
  fn make_analyses(&self, records: &[SelectedRecord]) -> anyhow::Result<Vec<AnalysisRecord>>;

  fn get_analyses_by_date_range(
    &self,
    low: DateTime<Utc>,
    high: DateTime<Utc>,
    exclude_uuids: &[Uuid],
    analysis_type: AnalysisType,
    mass_spectrometer: &str,
  ) -> anyhow::Result<Vec<SelectedRecord>>;

  /// References bracketing the given unknowns within `hours` of their
  /// acquisition times.
  fn find_references(
    &self,
    unknowns: &[AnalysisRecord],
    analysis_type: AnalysisType,
    hours: i64,
  ) -> anyhow::Result<Vec<AnalysisRecord>>;

  fn analysis_has_review(&self, record: &AnalysisRecord, attribute: &str) -> bool;

  /// Populates the raw signal points for the named isotopes/detectors.
  fn load_raw_data(&self, record: &AnalysisRecord, keys: &[String]) -> anyhow::Result<()>;

  fn save_fits(
    &self,
    kind: FitKind,
    records: &[AnalysisRecord],
    keys: &[String],
    fits: &[String],
  ) -> anyhow::Result<()>;

  fn save_flux(&self, irradiation: &str, level: &str, positions: &[(String, f64, f64)]) -> anyhow::Result<()>;

  fn push_repository(&self, name: &str) -> anyhow::Result<()>;
  fn pull_repository(&self, name: &str) -> anyhow::Result<()>;

  /// (ahead, behind) commit counts against the repository's remote.
  fn repository_status(&self, name: &str) -> anyhow::Result<(usize, usize)>;

  fn mass_spectrometer_names(&self) -> Vec<String> {
    Vec::new()
  }

  /// Scoped resource for batched reads. Implementations may open a session
  /// in `session_begin` and dispose of it in `session_end`; see `SessionCtx`.
  fn session_begin(&self) {}
  fn session_end(&self) {}
}

/// RAII scope over `DataService::session_begin`/`session_end`.
pub struct SessionCtx<'a> {
  dvc: &'a dyn DataService,
}

impl<'a> SessionCtx<'a> {
  pub fn new(dvc: &'a dyn DataService) -> Self {
    dvc.session_begin();
    SessionCtx { dvc }
  }
}

impl Drop for SessionCtx<'_> {
  fn drop(&mut self) {
    self.dvc.session_end();
  }
}

/// The selection browser. In the GUI this is an interactive dialog; headless
/// implementations return a pre-seeded selection instead.
pub trait SelectionModel: Send + Sync {
  fn selected_records(&self) -> Vec<SelectedRecord>;

  /// True when a configure should append to, rather than replace, a data
  /// node's working list.
  fn append_mode(&self) -> bool {
    false
  }
}

/// Optional notification collaborator (email in the original system).
pub trait Notifier: Send + Sync {
  fn notify(&self, subject: &str, body: &str) -> anyhow::Result<()>;
}

/// Result of one regression over raw points.
#[derive(Debug, Clone, Copy, Default)]
pub struct FitResult {
  pub value: f64,
  pub error: f64,
  pub slope: f64,
  pub curvature: f64,
  pub n_outliers: usize,
}

/// Pluggable regression: the engine sequences fits, it does not do math.
pub trait FitFunction: Send + Sync {
  fn fit(&self, kind: &str, points: &[(f64, f64)]) -> FitResult;
}

/// Intercept = mean intensity, error = population std. A stand-in fitter
/// adequate for headless runs and tests.
#[derive(Debug, Default)]
pub struct MeanFit;

impl FitFunction for MeanFit {
  fn fit(&self, _kind: &str, points: &[(f64, f64)]) -> FitResult {
    if points.is_empty() {
      return FitResult::default();
    }
    let n = points.len() as f64;
    let mean = points.iter().map(|p| p.1).sum::<f64>() / n;
    let var = points.iter().map(|p| (p.1 - mean).powi(2)).sum::<f64>() / n;
    let (x0, y0) = points[0];
    let (x1, y1) = points[points.len() - 1];
    let slope = if x1 != x0 { (y1 - y0) / (x1 - x0) } else { 0.0 };
    FitResult {
      value: mean,
      error: var.sqrt(),
      slope,
      curvature: 0.0,
      n_outliers: 0,
    }
  }
}

/// The wiring bundle handed to nodes at construction and template render.
#[derive(Clone)]
pub struct Services {
  pub dvc: Arc<dyn DataService>,
  pub browser: Arc<dyn SelectionModel>,
  /// Browser over interpreted-age records, when the hosting app has one.
  pub interpreted_age_browser: Option<Arc<dyn SelectionModel>>,
  pub notifier: Option<Arc<dyn Notifier>>,
  pub fitter: Arc<dyn FitFunction>,
}

impl Services {
  pub fn new(dvc: Arc<dyn DataService>, browser: Arc<dyn SelectionModel>) -> Self {
    Services {
      dvc,
      browser,
      interpreted_age_browser: None,
      notifier: None,
      fitter: Arc::new(MeanFit),
    }
  }

  pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
    self.notifier = Some(notifier);
    self
  }

  pub fn with_fitter(mut self, fitter: Arc<dyn FitFunction>) -> Self {
    self.fitter = fitter;
    self
  }

  /// Availability check for template `required` lists.
  pub fn has(&self, tag: &str) -> bool {
    match tag {
      SERVICE_DVC | SERVICE_BROWSER => true,
      SERVICE_NOTIFICATION => self.notifier.is_some(),
      _ => false,
    }
  }
}

/// Tracked repository with ahead/behind bookkeeping against its remote.
#[derive(Debug, Clone)]
pub struct RepoItem {
  pub name: String,
  pub ahead: usize,
  pub behind: usize,
}

impl RepoItem {
  pub fn new(name: impl Into<String>) -> Self {
    RepoItem {
      name: name.into(),
      ahead: 0,
      behind: 0,
    }
  }

  /// Refreshes ahead/behind counts against the remote.
  pub fn update(&mut self, dvc: &dyn DataService) -> anyhow::Result<()> {
    let (ahead, behind) = dvc.repository_status(&self.name)?;
    self.ahead = ahead;
    self.behind = behind;
    Ok(())
  }

  pub fn is_behind(&self) -> bool {
    self.behind > 0
  }
}
