// orogen/src/core/editor.rs

//! Result artifacts produced by figure and fit nodes.
//!
//! An editor is the engine-side stand-in for a result view: it records what
//! was plotted or tabulated and whether the view needs a refresh. Rendering
//! itself belongs to the hosting application.

use uuid::Uuid;

use crate::core::analysis::AnalysisRecord;
use crate::core::shared::Shared;

pub type EditorRef = Shared<Editor>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorKind {
  Ideogram,
  Spectrum,
  Series,
  InverseIsochron,
  Blanks,
  ICFactor,
  IsoEvolutionResults,
  FluxResults,
}

impl EditorKind {
  pub fn basename(&self) -> &'static str {
    match self {
      EditorKind::Ideogram => "Ideogram",
      EditorKind::Spectrum => "Spectrum",
      EditorKind::Series => "Series",
      EditorKind::InverseIsochron => "InverseIsochron",
      EditorKind::Blanks => "Blanks",
      EditorKind::ICFactor => "ICFactor",
      EditorKind::IsoEvolutionResults => "IsoEvo Results",
      EditorKind::FluxResults => "Flux Results",
    }
  }

  pub fn is_figure(&self) -> bool {
    matches!(
      self,
      EditorKind::Ideogram | EditorKind::Spectrum | EditorKind::Series | EditorKind::InverseIsochron
    )
  }
}

#[derive(Debug)]
pub struct Editor {
  pub name: String,
  pub kind: EditorKind,
  /// Uuids of the analyses shown as items.
  pub items: Vec<Uuid>,
  /// Uuids of the reference analyses, for reference-fit editors.
  pub references: Vec<Uuid>,
  pub refresh_needed: bool,
  /// Tabular rows for results editors; empty for figures.
  pub rows: Vec<ResultRow>,
}

impl Editor {
  pub fn new(kind: EditorKind) -> EditorRef {
    Shared::new(Editor {
      name: kind.basename().to_string(),
      kind,
      items: Vec::new(),
      references: Vec::new(),
      refresh_needed: false,
      rows: Vec::new(),
    })
  }
}

impl Editor {
  pub fn set_items(&mut self, records: &[AnalysisRecord]) {
    self.items = records.iter().map(|r| r.read().uuid).collect();
  }

  pub fn set_references(&mut self, records: &[AnalysisRecord]) {
    self.references = records.iter().map(|r| r.read().uuid).collect();
  }

  pub fn force_update(&mut self) {
    self.refresh_needed = true;
  }
}

/// One row of a tabular results editor (isotope-evolution or flux fits).
#[derive(Debug, Clone, Default)]
pub struct ResultRow {
  pub record_id: String,
  pub isotope: String,
  pub fit: String,
  pub intercept_value: f64,
  pub intercept_error: f64,
  pub percent_error: f64,
  pub goodness: bool,
}
