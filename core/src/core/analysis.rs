// orogen/src/core/analysis.rs

//! The analysis record model consumed by the pipeline.
//!
//! Records are owned by the data-access collaborator; the pipeline mutates
//! grouping and tagging fields in place but never destroys a record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::shared::Shared;

/// Shared handle to one analysis. All working collections hold these.
pub type AnalysisRecord = Shared<Analysis>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
  Unknown,
  BlankUnknown,
  Air,
  Cocktail,
  FluxMonitor,
}

impl AnalysisType {
  pub fn as_str(&self) -> &'static str {
    match self {
      AnalysisType::Unknown => "unknown",
      AnalysisType::BlankUnknown => "blank_unknown",
      AnalysisType::Air => "air",
      AnalysisType::Cocktail => "cocktail",
      AnalysisType::FluxMonitor => "flux_monitor",
    }
  }
}

/// One measured isotope signal on one detector.
#[derive(Debug, Clone, Default)]
pub struct Isotope {
  pub name: String,
  pub detector: String,
  /// Raw (time, intensity) pairs. Empty until `load_raw_data`.
  pub points: Vec<(f64, f64)>,
  /// Fitted intercept value and error.
  pub value: f64,
  pub error: f64,
  /// The fit kind applied, e.g. "linear", "parabolic".
  pub fit: Option<String>,
}

impl Isotope {
  pub fn percent_error(&self) -> f64 {
    if self.value == 0.0 {
      0.0
    } else {
      (self.error / self.value * 100.0).abs()
    }
  }
}

#[derive(Debug, Clone)]
pub struct Analysis {
  pub uuid: Uuid,
  /// Human-readable id, e.g. "62455-01A".
  pub record_id: String,
  pub identifier: String,
  pub aliquot: usize,
  pub analysis_type: AnalysisType,

  pub group_id: usize,
  pub graph_id: usize,

  pub repository_identifier: String,
  pub project: String,
  pub sample: String,

  pub age: f64,
  pub age_err: f64,

  pub timestamp: DateTime<Utc>,
  pub tag: String,

  pub isotopes: Vec<Isotope>,
}

impl Analysis {
  pub fn new(record_id: impl Into<String>, analysis_type: AnalysisType) -> Self {
    Analysis {
      uuid: Uuid::new_v4(),
      record_id: record_id.into(),
      identifier: String::new(),
      aliquot: 0,
      analysis_type,
      group_id: 0,
      graph_id: 0,
      repository_identifier: String::new(),
      project: String::new(),
      sample: String::new(),
      age: 0.0,
      age_err: 0.0,
      timestamp: Utc::now(),
      tag: "ok".to_string(),
      isotopes: Vec::new(),
    }
  }

  pub fn isotope_keys(&self) -> Vec<String> {
    self.isotopes.iter().map(|i| i.name.clone()).collect()
  }

  pub fn detector_keys(&self) -> Vec<String> {
    self.isotopes.iter().map(|i| i.detector.clone()).collect()
  }

  pub fn isotope(&self, name: &str) -> Option<&Isotope> {
    self.isotopes.iter().find(|i| i.name == name)
  }

  pub fn isotope_mut(&mut self, name: &str) -> Option<&mut Isotope> {
    self.isotopes.iter_mut().find(|i| i.name == name)
  }

  /// Numeric attribute lookup used by filter predicates.
  pub fn get_attr(&self, attr: &str) -> Option<f64> {
    match attr {
      "age" => Some(self.age),
      "age_err" => Some(self.age_err),
      "aliquot" => Some(self.aliquot as f64),
      "group_id" => Some(self.group_id as f64),
      "graph_id" => Some(self.graph_id as f64),
      _ => self.isotope(attr).map(|i| i.value),
    }
  }

  /// String attribute lookup used by grouping keys.
  pub fn get_str_attr(&self, attr: &str) -> Option<String> {
    match attr {
      "sample" => Some(self.sample.clone()),
      "identifier" => Some(self.identifier.clone()),
      "project" => Some(self.project.clone()),
      "repository_identifier" => Some(self.repository_identifier.clone()),
      "tag" => Some(self.tag.clone()),
      _ => None,
    }
  }
}

/// Builds shared record handles from plain analyses.
pub fn into_records(analyses: Vec<Analysis>) -> Vec<AnalysisRecord> {
  analyses.into_iter().map(Shared::new).collect()
}
