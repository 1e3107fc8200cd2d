// orogen_core/src/error.rs
use std::path::PathBuf;

use anyhow::Error as AnyhowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
  #[error("Template not found: {name}")]
  TemplateNotFound { name: String },

  #[error("Invalid template '{name}'. Source: {source}")]
  TemplateParse {
    name: String,
    #[source]
    source: serde_yaml::Error,
  },

  #[error("Failed reading template file {path}. Source: {source}")]
  TemplateIo {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("Unknown node class: {klass}")]
  UnknownNodeClass { klass: String },

  #[error("Node class '{klass}' requires the '{service}' service, which is not available")]
  MissingService { klass: String, service: String },

  #[error("Node '{name}' failed. Source: {source}")]
  Node {
    name: String,
    #[source]
    source: AnyhowError,
  },

  #[error("No pipeline state: {0}")]
  NoState(String),

  #[error("Internal engine error: {0}")]
  Internal(String),
}

impl EngineError {
  /// Wraps a collaborator-service failure as a node failure.
  pub fn node(name: impl Into<String>, source: AnyhowError) -> Self {
    EngineError::Node {
      name: name.into(),
      source,
    }
  }
}

pub type EngineResult<T, E = EngineError> = std::result::Result<T, E>;
