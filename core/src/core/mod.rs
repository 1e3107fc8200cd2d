// orogen/src/core/mod.rs

pub mod analysis;
pub mod control;
pub mod editor;
pub mod shared;
pub mod state;

pub use analysis::{into_records, Analysis, AnalysisRecord, AnalysisType, Isotope};
pub use control::{RunOutcome, RunStatus};
pub use editor::{Editor, EditorKind, EditorRef, ResultRow};
pub use shared::Shared;
pub use state::EngineState;
