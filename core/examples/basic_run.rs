// orogen_core/examples/basic_run.rs

//! Builds a small reduction pipeline by hand and runs it end to end against
//! an in-memory data service.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::info;
use uuid::Uuid;

use orogen::{
  Analysis, AnalysisFilter, AnalysisRecord, AnalysisType, DataService, EngineError,
  FilterComparator, FilterNode, FitKind, PipelineEngine, SelectedRecord, SelectionModel, Services,
  Shared, TemplateStore, UnknownNode,
};

/// A tiny in-memory stand-in for the data-access layer.
#[derive(Default)]
struct MemoryDvc {
  store: Mutex<HashMap<Uuid, Analysis>>,
}

impl DataService for MemoryDvc {
  fn make_analyses(&self, records: &[SelectedRecord]) -> anyhow::Result<Vec<AnalysisRecord>> {
    let store = self.store.lock();
    Ok(
      records
        .iter()
        .filter_map(|r| store.get(&r.uuid).cloned().map(Shared::new))
        .collect(),
    )
  }

  fn get_analyses_by_date_range(
    &self,
    _low: DateTime<Utc>,
    _high: DateTime<Utc>,
    _exclude_uuids: &[Uuid],
    _analysis_type: AnalysisType,
    _mass_spectrometer: &str,
  ) -> anyhow::Result<Vec<SelectedRecord>> {
    Ok(Vec::new())
  }

  fn find_references(
    &self,
    _unknowns: &[AnalysisRecord],
    _analysis_type: AnalysisType,
    _hours: i64,
  ) -> anyhow::Result<Vec<AnalysisRecord>> {
    Ok(Vec::new())
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
    info!(%kind, records = records.len(), ?keys, "saving fits");
    Ok(())
  }

  fn save_flux(&self, _irradiation: &str, _level: &str, _positions: &[(String, f64, f64)]) -> anyhow::Result<()> {
    Ok(())
  }

  fn push_repository(&self, name: &str) -> anyhow::Result<()> {
    info!(repository = name, "push");
    Ok(())
  }

  fn pull_repository(&self, _name: &str) -> anyhow::Result<()> {
    Ok(())
  }

  fn repository_status(&self, _name: &str) -> anyhow::Result<(usize, usize)> {
    Ok((0, 0))
  }
}

struct NoSelection;

impl SelectionModel for NoSelection {
  fn selected_records(&self) -> Vec<SelectedRecord> {
    Vec::new()
  }
}

fn main() -> Result<(), EngineError> {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

  info!("--- Basic Run Example ---");

  let dvc = Arc::new(MemoryDvc::default());

  // seed three unknowns, one of them too old to keep
  let mut records = Vec::new();
  for (rid, project, age) in [
    ("62455-01A", "Fish Canyon", 28.2),
    ("62455-02A", "Fish Canyon", 28.3),
    ("62456-01A", "Alder Creek", 1300.0),
  ] {
    let mut a = Analysis::new(rid, AnalysisType::Unknown);
    a.project = project.to_string();
    a.repository_identifier = "IrradiationNM-300".to_string();
    a.age = age;
    records.push(SelectedRecord {
      uuid: a.uuid,
      record_id: a.record_id.clone(),
      repository_identifier: a.repository_identifier.clone(),
    });
    dvc.store.lock().insert(a.uuid, a);
  }

  let services = Services::new(dvc.clone(), Arc::new(NoSelection));
  let store = TemplateStore::new("core/templates", "user_templates");
  let mut engine = PipelineEngine::new(services, store)?;

  // data node seeded directly; a GUI would route a browser selection here
  let mut unknowns = UnknownNode::new(dvc.clone(), Arc::new(NoSelection));
  unknowns.set_unknowns(dvc.make_analyses(&records).map_err(|e| EngineError::Internal(e.to_string()))?);
  engine.pipeline_mut().append(Box::new(unknowns));

  let filter = FilterNode::new().with_filter(AnalysisFilter::new("age", FilterComparator::Gt, 100.0));
  engine.pipeline_mut().append(Box::new(filter));

  let status = engine.run_pipeline()?;
  info!(?status, "pipeline finished");

  let state = engine.state.as_ref().expect("state is live after a run");
  info!("kept {} unknowns:", state.unknowns.len());
  for rec in &state.unknowns {
    let a = rec.read();
    info!("- {} ({})", a.record_id, a.project);
  }
  info!("projects: {:?}", state.projects);

  assert_eq!(state.unknowns.len(), 2);
  Ok(())
}
