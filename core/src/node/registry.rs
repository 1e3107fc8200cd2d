// orogen/src/node/registry.rs

//! The node-class registry: a string-tag to factory map used by template
//! rendering. Tags are validated up front so an unknown class fails fast
//! with a clear diagnostic instead of a late lookup error mid-render.

use std::collections::HashMap;
use std::sync::Arc;

use serde_yaml::Mapping;
use tracing::{debug, warn};

use crate::core::analysis::AnalysisType;
use crate::error::{EngineError, EngineResult};
use crate::node::base::{NodeKind, PipelineNode};
use crate::node::data::{FluxMonitorsNode, ListenUnknownNode, ReferenceNode, UnknownNode};
use crate::node::filter::FilterNode;
use crate::node::find::FindReferencesNode;
use crate::node::fit::{FigureNode, FitBlanksNode, FitFluxNode, FitICFactorNode, FitIsotopeEvolutionNode};
use crate::node::grouping::{GraphGroupingNode, GroupingNode};
use crate::node::persist::{
  BlanksPersistNode, FluxPersistNode, ICFactorPersistNode, IsotopeEvolutionPersistNode, PushNode,
};
use crate::node::review::{EmailNode, ReviewNode};
use crate::services::Services;

/// A factory builds a wired node, or `None` when a service the node needs is
/// unavailable (the render skips the entry with a warning in that case).
pub type NodeFactory = Box<dyn Fn(&Services) -> EngineResult<Option<Box<dyn PipelineNode>>> + Send + Sync>;

pub struct NodeRegistry {
  factories: HashMap<String, NodeFactory>,
}

impl NodeRegistry {
  pub fn empty() -> Self {
    NodeRegistry {
      factories: HashMap::new(),
    }
  }

  /// The full standard node set.
  pub fn standard() -> Self {
    let mut r = Self::empty();

    r.register(NodeKind::Unknowns.klass(), |s| {
      Ok(Some(Box::new(UnknownNode::new(Arc::clone(&s.dvc), Arc::clone(&s.browser)))))
    });
    r.register(NodeKind::References.klass(), |s| {
      Ok(Some(Box::new(ReferenceNode::new(
        Arc::clone(&s.dvc),
        Arc::clone(&s.browser),
      ))))
    });
    r.register(NodeKind::FluxMonitors.klass(), |_| Ok(Some(Box::new(FluxMonitorsNode::new()))));
    r.register(NodeKind::ListenUnknowns.klass(), |s| {
      Ok(Some(Box::new(ListenUnknownNode::new(Arc::clone(&s.dvc)))))
    });

    r.register(NodeKind::Filter.klass(), |_| Ok(Some(Box::new(FilterNode::new()))));
    r.register(NodeKind::Grouping.klass(), |_| Ok(Some(Box::new(GroupingNode::new()))));
    r.register(NodeKind::GraphGrouping.klass(), |_| {
      Ok(Some(Box::new(GraphGroupingNode::new())))
    });
    r.register(NodeKind::FindReferences.klass(), |s| {
      Ok(Some(Box::new(FindReferencesNode::new(
        Arc::clone(&s.dvc),
        AnalysisType::BlankUnknown,
      ))))
    });

    r.register(NodeKind::FitBlanks.klass(), |s| {
      Ok(Some(Box::new(FitBlanksNode::new(Arc::clone(&s.fitter)))))
    });
    r.register(NodeKind::FitICFactor.klass(), |s| {
      Ok(Some(Box::new(FitICFactorNode::new(Arc::clone(&s.fitter)))))
    });
    r.register(NodeKind::FitIsotopeEvolution.klass(), |s| {
      Ok(Some(Box::new(FitIsotopeEvolutionNode::new(
        Arc::clone(&s.dvc),
        Arc::clone(&s.fitter),
      ))))
    });
    r.register(NodeKind::FitFlux.klass(), |s| {
      Ok(Some(Box::new(FitFluxNode::new(Arc::clone(&s.fitter)))))
    });

    r.register(NodeKind::BlanksPersist.klass(), |s| {
      Ok(Some(Box::new(BlanksPersistNode::new(Arc::clone(&s.dvc)))))
    });
    r.register(NodeKind::ICFactorPersist.klass(), |s| {
      Ok(Some(Box::new(ICFactorPersistNode::new(Arc::clone(&s.dvc)))))
    });
    r.register(NodeKind::IsotopeEvolutionPersist.klass(), |s| {
      Ok(Some(Box::new(IsotopeEvolutionPersistNode::new(Arc::clone(&s.dvc)))))
    });
    r.register(NodeKind::FluxPersist.klass(), |s| {
      Ok(Some(Box::new(FluxPersistNode::new(Arc::clone(&s.dvc)))))
    });

    r.register(NodeKind::Ideogram.klass(), |_| Ok(Some(Box::new(FigureNode::ideogram()))));
    r.register(NodeKind::Spectrum.klass(), |_| Ok(Some(Box::new(FigureNode::spectrum()))));
    r.register(NodeKind::Series.klass(), |_| Ok(Some(Box::new(FigureNode::series()))));
    r.register(NodeKind::InverseIsochron.klass(), |_| {
      Ok(Some(Box::new(FigureNode::inverse_isochron())))
    });

    r.register(NodeKind::Review.klass(), |_| Ok(Some(Box::new(ReviewNode::new()))));
    r.register(NodeKind::Push.klass(), |s| Ok(Some(Box::new(PushNode::new(Arc::clone(&s.dvc))))));
    r.register(NodeKind::Email.klass(), |s| match &s.notifier {
      Some(notifier) => Ok(Some(Box::new(EmailNode::new(Arc::clone(notifier))))),
      None => Ok(None),
    });

    r
  }

  pub fn register<F>(&mut self, klass: &str, factory: F)
  where
    F: Fn(&Services) -> EngineResult<Option<Box<dyn PipelineNode>>> + Send + Sync + 'static,
  {
    self.factories.insert(klass.to_string(), Box::new(factory));
  }

  pub fn contains(&self, klass: &str) -> bool {
    self.factories.contains_key(klass)
  }

  /// Every standard tag must resolve. Call at startup.
  pub fn validate(&self) -> EngineResult<()> {
    for kind in NodeKind::all() {
      if !self.contains(kind.klass()) {
        return Err(EngineError::UnknownNodeClass {
          klass: kind.klass().to_string(),
        });
      }
    }
    Ok(())
  }

  /// Builds and loads a node. `Ok(None)` means the entry should be skipped
  /// because a service it needs is unavailable.
  pub fn create(
    &self,
    klass: &str,
    services: &Services,
    params: &Mapping,
  ) -> EngineResult<Option<Box<dyn PipelineNode>>> {
    let factory = self.factories.get(klass).ok_or_else(|| EngineError::UnknownNodeClass {
      klass: klass.to_string(),
    })?;

    match factory(services)? {
      Some(mut node) => {
        node.load(params)?;
        debug!(klass, "materialized node");
        Ok(Some(node))
      }
      None => {
        warn!(klass, "skipping node; required service unavailable");
        Ok(None)
      }
    }
  }
}
