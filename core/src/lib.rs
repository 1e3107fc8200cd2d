// src/lib.rs

//! Orogen: a pipeline engine for staged reduction of noble-gas
//! mass-spectrometry analyses.
//!
//! The engine threads sets of analytical measurements (unknowns and
//! references) through an ordered sequence of configurable processing
//! nodes with:
//!  - A per-node run contract (`pre_run`/`run`/`post_run`) with
//!    veto/cancel/no-data stop conditions modeled as typed outcomes.
//!  - Partial re-execution: resume from a veto point, re-run from a
//!    selected node, or replay the whole chain over a different analysis
//!    set without re-prompting configuration.
//!  - Declarative templates: YAML node-list documents materialized through
//!    a validated class registry.
//!  - Repository bookkeeping over the data-version-control collaborator,
//!    including the never-push-while-behind gate.

pub mod core;
pub mod error;
pub mod node;
pub mod pipeline;
pub mod services;
pub mod template;

// --- Re-exports for the Public API ---

pub use crate::core::analysis::{into_records, Analysis, AnalysisRecord, AnalysisType, Isotope};
pub use crate::core::control::{RunOutcome, RunStatus};
pub use crate::core::editor::{Editor, EditorKind, EditorRef, ResultRow};
pub use crate::core::shared::Shared;
pub use crate::core::state::EngineState;

pub use crate::node::base::{NodeCore, NodeId, NodeKind, NodeTemplate, PipelineNode, PostRunContext};
pub use crate::node::registry::NodeRegistry;
pub use crate::node::{
  AnalysisFilter, BlanksPersistNode, EmailNode, FigureNode, FilterAction, FilterComparator,
  FilterNode, FindReferencesNode, FitBlanksNode, FitFluxNode, FitICFactorNode,
  FitIsotopeEvolutionNode, FitSpec, FluxMonitorsNode, FluxPersistNode, GraphGroupingNode,
  GroupingNode, ICFactorPersistNode, IsotopeEvolutionPersistNode, ListenUnknownNode, PushNode,
  ReferenceNode, ReviewNode, UnknownNode,
};

pub use crate::pipeline::definition::{Pipeline, PipelineGroup};
pub use crate::pipeline::engine::PipelineEngine;

pub use crate::template::{PipelineTemplate, TemplateDoc, TemplateStore};

pub use crate::services::{
  DataService, FitFunction, FitKind, FitResult, MeanFit, Notifier, RepoItem, SelectedRecord,
  SelectionModel, Services, SessionCtx,
};

pub use crate::error::{EngineError, EngineResult};
