// orogen/src/template.rs

//! Declarative pipeline templates.
//!
//! A template is a YAML document `{required: [...], nodes: [...]}` resolving
//! node class tags against the registry. Rendering materializes live nodes
//! into a pipeline; storage follows the builtin-then-user directory
//! convention of the original system.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::node::base::{NodeKind, NodeTemplate, PipelineNode};
use crate::node::data::UnknownNode;
use crate::node::registry::NodeRegistry;
use crate::pipeline::definition::Pipeline;
use crate::services::Services;

pub const TEMPLATE_EXTENSION: &str = "yaml";
const GROUP_KLASS: &str = "NodeGroup";

/// The serialized form of a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateDoc {
  #[serde(default)]
  pub required: Vec<String>,
  pub nodes: Vec<Value>,
}

impl TemplateDoc {
  pub fn from_nodes(required: Vec<String>, nodes: Vec<NodeTemplate>) -> Self {
    TemplateDoc {
      required,
      nodes: nodes.into_iter().map(node_template_to_value).collect(),
    }
  }

  pub fn parse(source: &str, name: &str) -> EngineResult<Self> {
    serde_yaml::from_str(source).map_err(|e| EngineError::TemplateParse {
      name: name.to_string(),
      source: e,
    })
  }

  pub fn to_yaml(&self) -> EngineResult<String> {
    serde_yaml::to_string(self).map_err(|e| EngineError::TemplateParse {
      name: "<serialize>".to_string(),
      source: e,
    })
  }

  /// Ordered class tags, with group entries flattened.
  pub fn klasses(&self) -> Vec<String> {
    let mut out = Vec::new();
    for entry in &self.nodes {
      match entry_klass(entry) {
        Some(GROUP_KLASS) => {
          if let Some(children) = entry.get("nodes").and_then(|v| v.as_sequence()) {
            out.extend(children.iter().filter_map(|c| entry_klass(c).map(str::to_string)));
          }
        }
        Some(k) => out.push(k.to_string()),
        None => {}
      }
    }
    out
  }
}

fn node_template_to_value(nt: NodeTemplate) -> Value {
  let mut m = Mapping::new();
  m.insert(Value::from("klass"), Value::from(nt.klass));
  for (k, v) in nt.params {
    m.insert(k, v);
  }
  Value::Mapping(m)
}

fn entry_klass(entry: &Value) -> Option<&str> {
  entry.get("klass").and_then(|v| v.as_str())
}

fn entry_params(entry: &Value) -> Mapping {
  entry.as_mapping().cloned().unwrap_or_default()
}

/// A named template bound to its source file.
pub struct PipelineTemplate {
  pub name: String,
  pub path: PathBuf,
}

impl PipelineTemplate {
  pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
    PipelineTemplate {
      name: name.into(),
      path: path.into(),
    }
  }

  /// Materializes this template into `pipeline`.
  ///
  /// An existing leading data node (not a listening one) is reused as the
  /// data source; otherwise a default unknowns node is synthesized from the
  /// services. With `clear`, existing nodes are discarded first — a render
  /// that fails after that point leaves the pipeline cleared, not rolled
  /// back.
  pub fn render(
    &self,
    pipeline: &mut Pipeline,
    services: &Services,
    registry: &NodeRegistry,
    clear: bool,
    exclude_klass: &[&str],
  ) -> EngineResult<()> {
    let mut datanode: Option<Box<dyn PipelineNode>> = None;
    let mut has_leading_data = false;
    if let Some(first) = pipeline.nodes.first() {
      if first.kind().is_data() && !first.kind().is_listen() {
        if clear {
          let mut node = pipeline.nodes.remove(0);
          node.core_mut().visited = false;
          datanode = Some(node);
        } else {
          // appending to an existing chain; its data source stays in place
          has_leading_data = true;
        }
      }
    }

    if clear {
      pipeline.nodes.clear();
    }

    let source = fs::read_to_string(&self.path).map_err(|e| EngineError::TemplateIo {
      path: self.path.clone(),
      source: e,
    })?;
    let doc = TemplateDoc::parse(&source, &self.name)?;

    for (i, entry) in doc.nodes.iter().enumerate() {
      let klass = entry_klass(entry).ok_or_else(|| EngineError::Internal(format!(
        "template '{}': node entry {} has no klass",
        self.name, i
      )))?;

      if exclude_klass.contains(&klass) {
        continue;
      }

      if i == 0 && klass == NodeKind::Unknowns.klass() {
        if has_leading_data {
          continue;
        }
        let mut node = datanode
          .take()
          .unwrap_or_else(|| Box::new(UnknownNode::new(services.dvc.clone(), services.browser.clone())));
        node.load(&entry_params(entry))?;
        pipeline.nodes.push(node);
        continue;
      }

      if klass == GROUP_KLASS {
        let group_name = entry.get("name").and_then(|v| v.as_str()).unwrap_or("group").to_string();
        let children = entry
          .get("nodes")
          .and_then(|v| v.as_sequence())
          .ok_or_else(|| EngineError::Internal(format!(
            "template '{}': group '{}' has no nodes",
            self.name, group_name
          )))?;

        for child in children {
          let child_klass = entry_klass(child).ok_or_else(|| EngineError::Internal(format!(
            "template '{}': group '{}' entry has no klass",
            self.name, group_name
          )))?;
          if exclude_klass.contains(&child_klass) {
            continue;
          }
          if let Some(mut node) = registry.create(child_klass, services, &entry_params(child))? {
            node.core_mut().group = Some(group_name.clone());
            node.finish_load();
            pipeline.nodes.push(node);
          }
        }
        continue;
      }

      if let Some(mut node) = registry.create(klass, services, &entry_params(entry))? {
        node.finish_load();
        pipeline.nodes.push(node);
      }
    }

    pipeline.relink();
    debug!(template = self.name.as_str(), nodes = pipeline.len(), "template rendered");
    Ok(())
  }
}

fn to_pathname(name: &str) -> String {
  let mut p = name.replace(' ', "_").to_lowercase();
  if p == "iso_evo" {
    p = "isotope_evolutions".to_string();
  }
  p
}

fn to_name(stem: &str) -> String {
  stem
    .split('_')
    .map(|w| {
      let mut cs = w.chars();
      match cs.next() {
        Some(c) => c.to_uppercase().collect::<String>() + cs.as_str(),
        None => String::new(),
      }
    })
    .collect::<Vec<_>>()
    .join(" ")
}

/// Filesystem convention resolving template names: built-in directory first,
/// user directory as fallback.
pub struct TemplateStore {
  pub builtin_dir: PathBuf,
  pub user_dir: PathBuf,
}

impl TemplateStore {
  pub fn new(builtin_dir: impl Into<PathBuf>, user_dir: impl Into<PathBuf>) -> Self {
    TemplateStore {
      builtin_dir: builtin_dir.into(),
      user_dir: user_dir.into(),
    }
  }

  /// Resolves a template name to its file. The bool is true for user paths.
  pub fn path_for(&self, name: &str) -> EngineResult<(PathBuf, bool)> {
    let filename = format!("{}.{}", to_pathname(name), TEMPLATE_EXTENSION);

    let path = self.builtin_dir.join(&filename);
    if path.is_file() {
      return Ok((path, false));
    }

    let path = self.user_dir.join(&filename);
    if path.is_file() {
      return Ok((path, true));
    }

    Err(EngineError::TemplateNotFound {
      name: name.to_string(),
    })
  }

  pub fn template(&self, name: &str) -> EngineResult<PipelineTemplate> {
    let (path, _) = self.path_for(name)?;
    Ok(PipelineTemplate::new(name, path))
  }

  /// Display names of every stored template whose `required` services are
  /// all available.
  pub fn available_templates(&self, services: &Services) -> Vec<String> {
    let mut names = Vec::new();
    for dir in [&self.builtin_dir, &self.user_dir] {
      let Ok(entries) = fs::read_dir(dir) else {
        continue;
      };
      for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(TEMPLATE_EXTENSION) {
          continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
          continue;
        };

        let Ok(source) = fs::read_to_string(&path) else {
          continue;
        };
        let Ok(doc) = TemplateDoc::parse(&source, stem) else {
          warn!(template = stem, "skipping unparseable template");
          continue;
        };

        if doc.required.iter().all(|tag| services.has(tag)) {
          let display = to_name(stem);
          if !names.contains(&display) {
            names.push(display);
          }
        } else {
          debug!(template = stem, "skipping template; required service missing");
        }
      }
    }
    names
  }

  /// Writes a document into the user template directory.
  pub fn save(&self, name: &str, doc: &TemplateDoc) -> EngineResult<PathBuf> {
    fs::create_dir_all(&self.user_dir).map_err(|e| EngineError::TemplateIo {
      path: self.user_dir.clone(),
      source: e,
    })?;

    let path = self
      .user_dir
      .join(format!("{}.{}", to_pathname(name), TEMPLATE_EXTENSION));
    fs::write(&path, doc.to_yaml()?).map_err(|e| EngineError::TemplateIo {
      path: path.clone(),
      source: e,
    })?;
    Ok(path)
  }

  /// Rewrites ReviewNode entries of the named template in place, toggling
  /// their enabled flag.
  pub fn set_review_permanent(&self, name: &str, enabled: bool) -> EngineResult<()> {
    let (path, _) = self.path_for(name)?;
    let source = fs::read_to_string(&path).map_err(|e| EngineError::TemplateIo {
      path: path.clone(),
      source: e,
    })?;

    let mut doc = TemplateDoc::parse(&source, name)?;
    for entry in &mut doc.nodes {
      if entry_klass(entry) == Some(NodeKind::Review.klass()) {
        if let Some(m) = entry.as_mapping_mut() {
          m.insert(Value::from("enabled"), Value::from(enabled));
        }
      }
    }

    fs::write(&path, doc.to_yaml()?).map_err(|e| EngineError::TemplateIo { path, source: e })?;
    Ok(())
  }
}
