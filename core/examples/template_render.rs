// orogen_core/examples/template_render.rs

//! Renders a built-in template into a pipeline, lists the available
//! templates, and round-trips the pipeline back to a user template.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use orogen::{
  AnalysisRecord, AnalysisType, DataService, EngineError, FitKind, PipelineEngine, SelectedRecord,
  SelectionModel, Services, TemplateStore,
};

struct NullDvc;

impl DataService for NullDvc {
  fn make_analyses(&self, _records: &[SelectedRecord]) -> anyhow::Result<Vec<AnalysisRecord>> {
    Ok(Vec::new())
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
    _kind: FitKind,
    _records: &[AnalysisRecord],
    _keys: &[String],
    _fits: &[String],
  ) -> anyhow::Result<()> {
    Ok(())
  }

  fn save_flux(&self, _irradiation: &str, _level: &str, _positions: &[(String, f64, f64)]) -> anyhow::Result<()> {
    Ok(())
  }

  fn push_repository(&self, _name: &str) -> anyhow::Result<()> {
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

  let services = Services::new(Arc::new(NullDvc), Arc::new(NoSelection));
  let store = TemplateStore::new("core/templates", "user_templates");
  let mut engine = PipelineEngine::new(services, store)?;

  info!("available templates:");
  for name in &engine.available_pipeline_templates {
    info!("- {}", name);
  }

  engine.set_template("blanks")?;
  info!("rendered 'blanks':");
  for node in &engine.pipeline().nodes {
    let enabled = if node.is_enabled() { "" } else { " (disabled)" };
    info!("- {}{}", node.name(), enabled);
  }

  // chain a figure template onto the same pipeline
  engine.chain_ideogram()?;
  info!("after chaining 'ideogram': {} nodes", engine.pipeline().len());

  // the pipeline serializes back into a template document
  engine.save_pipeline_template("My Blanks")?;
  info!("saved user template 'My Blanks'");

  Ok(())
}
