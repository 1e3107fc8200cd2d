// tests/common/mod.rs
#![allow(dead_code)] // Allow unused code in this common test module

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use tracing::Level;
use uuid::Uuid;

use orogen::{
  Analysis, AnalysisRecord, AnalysisType, DataService, EngineState, FitKind, Isotope, NodeCore,
  NodeKind, Notifier, PipelineEngine, PipelineNode, PostRunContext, RunOutcome, SelectedRecord,
  SelectionModel, Services, Shared, TemplateStore,
};

// --- Helper for Tracing Setup (call once per test run if needed) ---
use once_cell::sync::Lazy;
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer() // Important for tests to capture output
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

// --- Record builders ---

pub fn make_analysis(record_id: &str, project: &str, repo: &str) -> Analysis {
  let mut a = Analysis::new(record_id, AnalysisType::Unknown);
  a.identifier = record_id.split('-').next().unwrap_or(record_id).to_string();
  a.project = project.to_string();
  a.repository_identifier = repo.to_string();
  a.sample = format!("sample-{}", record_id);
  a
}

pub fn make_record(record_id: &str, project: &str, repo: &str) -> AnalysisRecord {
  Shared::new(make_analysis(record_id, project, repo))
}

pub fn with_age(rec: AnalysisRecord, age: f64) -> AnalysisRecord {
  rec.write().age = age;
  rec
}

pub fn with_isotope(rec: AnalysisRecord, name: &str, detector: &str, value: f64) -> AnalysisRecord {
  {
    let mut a = rec.write();
    a.isotopes.push(Isotope {
      name: name.to_string(),
      detector: detector.to_string(),
      points: vec![(0.0, value), (10.0, value), (20.0, value)],
      value,
      error: 0.0,
      fit: None,
    });
  }
  rec
}

pub fn ts(secs: i64) -> DateTime<Utc> {
  Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
}

pub fn uuids(records: &[AnalysisRecord]) -> Vec<Uuid> {
  records.iter().map(|r| r.read().uuid).collect()
}

pub fn record_ids(records: &[AnalysisRecord]) -> Vec<String> {
  records.iter().map(|r| r.read().record_id.clone()).collect()
}

// --- In-memory data service ---

#[derive(Default)]
pub struct MockDvc {
  pub store: Mutex<HashMap<Uuid, Analysis>>,
  pub references: Mutex<Vec<AnalysisRecord>>,
  pub date_range_records: Mutex<Vec<SelectedRecord>>,
  pub pushed: Mutex<Vec<String>>,
  pub pulled: Mutex<Vec<String>>,
  pub statuses: Mutex<HashMap<String, (usize, usize)>>,
  pub saved: Mutex<Vec<(FitKind, usize, Vec<String>)>>,
  pub flux_saves: Mutex<Vec<(String, String, usize)>>,
  pub sessions: AtomicUsize,
}

impl MockDvc {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub fn seed(&self, analysis: Analysis) -> SelectedRecord {
    let rec = SelectedRecord {
      uuid: analysis.uuid,
      record_id: analysis.record_id.clone(),
      repository_identifier: analysis.repository_identifier.clone(),
    };
    self.store.lock().insert(analysis.uuid, analysis);
    rec
  }

  pub fn set_status(&self, name: &str, ahead: usize, behind: usize) {
    self.statuses.lock().insert(name.to_string(), (ahead, behind));
  }
}

impl DataService for MockDvc {
  fn make_analyses(&self, records: &[SelectedRecord]) -> anyhow::Result<Vec<AnalysisRecord>> {
    let store = self.store.lock();
    Ok(
      records
        .iter()
        .map(|r| {
          let analysis = store.get(&r.uuid).cloned().unwrap_or_else(|| {
            let mut a = Analysis::new(r.record_id.clone(), AnalysisType::Unknown);
            a.uuid = r.uuid;
            a.repository_identifier = r.repository_identifier.clone();
            a
          });
          Shared::new(analysis)
        })
        .collect(),
    )
  }

  fn get_analyses_by_date_range(
    &self,
    _low: DateTime<Utc>,
    _high: DateTime<Utc>,
    exclude_uuids: &[Uuid],
    _analysis_type: AnalysisType,
    _mass_spectrometer: &str,
  ) -> anyhow::Result<Vec<SelectedRecord>> {
    Ok(
      self
        .date_range_records
        .lock()
        .iter()
        .filter(|r| !exclude_uuids.contains(&r.uuid))
        .cloned()
        .collect(),
    )
  }

  fn find_references(
    &self,
    _unknowns: &[AnalysisRecord],
    _analysis_type: AnalysisType,
    _hours: i64,
  ) -> anyhow::Result<Vec<AnalysisRecord>> {
    Ok(self.references.lock().clone())
  }

  fn analysis_has_review(&self, _record: &AnalysisRecord, _attribute: &str) -> bool {
    true
  }

  fn load_raw_data(&self, _record: &AnalysisRecord, _keys: &[String]) -> anyhow::Result<()> {
    Ok(())
  }

  fn save_fits(
    &self,
    kind: FitKind,
    records: &[AnalysisRecord],
    keys: &[String],
    _fits: &[String],
  ) -> anyhow::Result<()> {
    self.saved.lock().push((kind, records.len(), keys.to_vec()));
    Ok(())
  }

  fn save_flux(&self, irradiation: &str, level: &str, positions: &[(String, f64, f64)]) -> anyhow::Result<()> {
    self
      .flux_saves
      .lock()
      .push((irradiation.to_string(), level.to_string(), positions.len()));
    Ok(())
  }

  fn push_repository(&self, name: &str) -> anyhow::Result<()> {
    self.pushed.lock().push(name.to_string());
    Ok(())
  }

  fn pull_repository(&self, name: &str) -> anyhow::Result<()> {
    self.pulled.lock().push(name.to_string());
    Ok(())
  }

  fn repository_status(&self, name: &str) -> anyhow::Result<(usize, usize)> {
    Ok(self.statuses.lock().get(name).copied().unwrap_or((0, 0)))
  }

  fn mass_spectrometer_names(&self) -> Vec<String> {
    vec!["jan".to_string(), "obama".to_string()]
  }

  fn session_begin(&self) {
    self.sessions.fetch_add(1, Ordering::SeqCst);
  }
}

// --- Headless selection browser ---

#[derive(Default)]
pub struct MockBrowser {
  pub selection: Mutex<Vec<SelectedRecord>>,
}

impl MockBrowser {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub fn select(&self, records: Vec<SelectedRecord>) {
    *self.selection.lock() = records;
  }
}

impl SelectionModel for MockBrowser {
  fn selected_records(&self) -> Vec<SelectedRecord> {
    self.selection.lock().clone()
  }
}

// --- Notification recorder ---

#[derive(Default)]
pub struct MockNotifier {
  pub sent: Mutex<Vec<(String, String)>>,
}

impl Notifier for MockNotifier {
  fn notify(&self, subject: &str, body: &str) -> anyhow::Result<()> {
    self.sent.lock().push((subject.to_string(), body.to_string()));
    Ok(())
  }
}

// --- Engine construction ---

pub fn test_services() -> (Services, Arc<MockDvc>, Arc<MockBrowser>) {
  let dvc = MockDvc::new();
  let browser = MockBrowser::new();
  let services = Services::new(dvc.clone(), browser.clone());
  (services, dvc, browser)
}

pub fn test_engine() -> (PipelineEngine, Arc<MockDvc>, Arc<MockBrowser>) {
  let (services, dvc, browser) = test_services();
  let store = TemplateStore::new("templates", "user_templates");
  let engine = PipelineEngine::new(services, store).expect("registry is valid");
  (engine, dvc, browser)
}

// --- A scriptable probe node for exercising the run contract ---

pub type RunLog = Arc<Mutex<Vec<String>>>;

pub fn new_log() -> RunLog {
  Arc::new(Mutex::new(Vec::new()))
}

pub struct RecorderNode {
  core: NodeCore,
  pub log: RunLog,
  pub outcome: Arc<Mutex<RunOutcome>>,
  pub pre_run_ok: bool,
  pub fail_with: Option<String>,
}

impl RecorderNode {
  pub fn new(name: &str, log: RunLog) -> Self {
    RecorderNode {
      core: NodeCore::new(name),
      log,
      outcome: Arc::new(Mutex::new(RunOutcome::Continue)),
      pre_run_ok: true,
      fail_with: None,
    }
  }

  pub fn with_outcome(name: &str, log: RunLog, outcome: RunOutcome) -> Self {
    let node = Self::new(name, log);
    *node.outcome.lock() = outcome;
    node
  }
}

impl PipelineNode for RecorderNode {
  fn core(&self) -> &NodeCore {
    &self.core
  }

  fn core_mut(&mut self) -> &mut NodeCore {
    &mut self.core
  }

  fn kind(&self) -> NodeKind {
    NodeKind::Filter
  }

  fn pre_run(&mut self, _state: &mut EngineState, _configure: bool) -> bool {
    self.log.lock().push(format!("pre:{}", self.core.name));
    self.pre_run_ok
  }

  fn run(&mut self, _state: &mut EngineState) -> orogen::EngineResult<RunOutcome> {
    self.log.lock().push(format!("run:{}", self.core.name));
    if let Some(msg) = &self.fail_with {
      return Err(orogen::EngineError::Internal(msg.clone()));
    }
    Ok(*self.outcome.lock())
  }

  fn post_run(&mut self, _ctx: &mut PostRunContext, _state: &mut EngineState) {
    self.log.lock().push(format!("post:{}", self.core.name));
  }

  fn reset(&mut self) {
    self.log.lock().push(format!("reset:{}", self.core.name));
    self.core_mut().reset();
  }

  fn as_any(&self) -> &dyn std::any::Any {
    self
  }

  fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
    self
  }
}
