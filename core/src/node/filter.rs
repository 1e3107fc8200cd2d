// orogen/src/node/filter.rs

//! Predicate filtering over the unknowns collection.

use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::core::control::RunOutcome;
use crate::core::state::EngineState;
use crate::error::{EngineError, EngineResult};
use crate::node::base::{impl_node_boilerplate, NodeCore, NodeKind, NodeTemplate, PipelineNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterComparator {
  Lt,
  Le,
  Gt,
  Ge,
  Eq,
  Ne,
}

impl FilterComparator {
  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "<" => Some(FilterComparator::Lt),
      "<=" => Some(FilterComparator::Le),
      ">" => Some(FilterComparator::Gt),
      ">=" => Some(FilterComparator::Ge),
      "==" => Some(FilterComparator::Eq),
      "!=" => Some(FilterComparator::Ne),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      FilterComparator::Lt => "<",
      FilterComparator::Le => "<=",
      FilterComparator::Gt => ">",
      FilterComparator::Ge => ">=",
      FilterComparator::Eq => "==",
      FilterComparator::Ne => "!=",
    }
  }

  fn apply(&self, lhs: f64, rhs: f64) -> bool {
    match self {
      FilterComparator::Lt => lhs < rhs,
      FilterComparator::Le => lhs <= rhs,
      FilterComparator::Gt => lhs > rhs,
      FilterComparator::Ge => lhs >= rhs,
      FilterComparator::Eq => lhs == rhs,
      FilterComparator::Ne => lhs != rhs,
    }
  }
}

/// One attribute predicate. A record matching the predicate is acted on
/// (excluded or tagged).
#[derive(Debug, Clone)]
pub struct AnalysisFilter {
  pub attribute: String,
  pub comparator: FilterComparator,
  pub criterion: f64,
}

impl AnalysisFilter {
  pub fn new(attribute: impl Into<String>, comparator: FilterComparator, criterion: f64) -> Self {
    AnalysisFilter {
      attribute: attribute.into(),
      comparator,
      criterion,
    }
  }

  fn matches(&self, rec: &crate::core::analysis::Analysis) -> bool {
    rec
      .get_attr(&self.attribute)
      .map(|v| self.comparator.apply(v, self.criterion))
      .unwrap_or(false)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterAction {
  /// Remove matching records from the working collection.
  #[default]
  Exclude,
  /// Keep matching records, tag them "omit".
  Tag,
}

pub struct FilterNode {
  core: NodeCore,
  pub filters: Vec<AnalysisFilter>,
  pub action: FilterAction,
}

impl FilterNode {
  pub fn new() -> Self {
    FilterNode {
      core: NodeCore::new("Filter"),
      filters: Vec::new(),
      action: FilterAction::Exclude,
    }
  }

  pub fn with_filter(mut self, f: AnalysisFilter) -> Self {
    self.filters.push(f);
    self
  }
}

impl Default for FilterNode {
  fn default() -> Self {
    Self::new()
  }
}

impl PipelineNode for FilterNode {
  impl_node_boilerplate!();

  fn kind(&self) -> NodeKind {
    NodeKind::Filter
  }

  fn configure(&mut self, _interactive: bool) -> bool {
    !self.filters.is_empty()
  }

  fn run(&mut self, state: &mut EngineState) -> EngineResult<RunOutcome> {
    let before = state.unknowns.len();
    match self.action {
      FilterAction::Exclude => {
        state.unknowns.retain(|rec| {
          let a = rec.read();
          !self.filters.iter().any(|f| f.matches(&a))
        });
      }
      FilterAction::Tag => {
        for rec in &state.unknowns {
          let matched = {
            let a = rec.read();
            self.filters.iter().any(|f| f.matches(&a))
          };
          if matched {
            rec.write().tag = "omit".to_string();
          }
        }
      }
    }

    debug!(before, after = state.unknowns.len(), "filter applied");
    state.rebuild_derived();
    Ok(RunOutcome::Continue)
  }

  fn load(&mut self, params: &Mapping) -> EngineResult<()> {
    let Some(entries) = params.get("filters").and_then(|v| v.as_sequence()) else {
      return Ok(());
    };

    for entry in entries {
      let m = entry
        .as_mapping()
        .ok_or_else(|| EngineError::Internal("filter entry is not a mapping".to_string()))?;
      let attribute = crate::node::param_str(m, "attribute")
        .ok_or_else(|| EngineError::Internal("filter entry missing attribute".to_string()))?;
      let comp = crate::node::param_str(m, "comparator")
        .and_then(|s| FilterComparator::parse(&s))
        .ok_or_else(|| EngineError::Internal("filter entry has invalid comparator".to_string()))?;
      let criterion = crate::node::param_f64(m, "criterion").unwrap_or(0.0);
      self.filters.push(AnalysisFilter::new(attribute, comp, criterion));
    }

    if let Some(action) = crate::node::param_str(params, "action") {
      self.action = if action == "tag" { FilterAction::Tag } else { FilterAction::Exclude };
    }
    Ok(())
  }

  fn to_template(&self) -> NodeTemplate {
    let filters: Vec<Value> = self
      .filters
      .iter()
      .map(|f| {
        let mut m = Mapping::new();
        m.insert(Value::from("attribute"), Value::from(f.attribute.as_str()));
        m.insert(Value::from("comparator"), Value::from(f.comparator.as_str()));
        m.insert(Value::from("criterion"), Value::from(f.criterion));
        Value::Mapping(m)
      })
      .collect();

    let action = match self.action {
      FilterAction::Exclude => "exclude",
      FilterAction::Tag => "tag",
    };

    NodeTemplate::new(self.kind().klass())
      .with("filters", Value::Sequence(filters))
      .with("action", action)
  }
}
