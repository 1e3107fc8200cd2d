// tests/template_tests.rs
mod common;

use common::*;
use orogen::{
  DataService, EngineError, MeanFit, NodeRegistry, Pipeline, PipelineNode, PipelineTemplate,
  Services, TemplateDoc, TemplateStore, UnknownNode,
};
use serial_test::serial;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn store_with_dirs() -> (TemplateStore, TempDir, TempDir) {
  let builtin = TempDir::new().expect("builtin dir");
  let user = TempDir::new().expect("user dir");
  let store = TemplateStore::new(builtin.path(), user.path());
  (store, builtin, user)
}

fn write_template(dir: &std::path::Path, name: &str, body: &str) {
  fs::write(dir.join(format!("{}.yaml", name)), body).expect("write template");
}

const BLANKS_TEMPLATE: &str = "\
required: []
nodes:
- klass: UnknownNode
- klass: FitBlanksNode
  fits:
  - name: Ar40
    fit: linear
    save: true
- klass: BlanksPersistNode
- klass: ReviewNode
  enabled: true
";

#[test]
#[serial]
fn test_template_round_trip_reproduces_node_sequence() {
  setup_tracing();
  let (services, _dvc, _browser) = test_services();
  let registry = NodeRegistry::standard();
  let (store, _builtin, _user) = store_with_dirs();

  let mut pipeline = Pipeline::default();
  pipeline.append(Box::new(UnknownNode::new(services.dvc.clone(), services.browser.clone())));
  let mut fit = orogen::FitBlanksNode::new(Arc::new(MeanFit));
  fit.set_fits(vec![orogen::FitSpec::new("Ar40", "linear")]);
  pipeline.append(Box::new(fit));
  pipeline.append(Box::new(orogen::BlanksPersistNode::new(services.dvc.clone())));
  pipeline.append(Box::new(orogen::FigureNode::ideogram()));

  let doc = pipeline.to_template();
  store.save("Round Trip", &doc).expect("save");

  let template = store.template("Round Trip").expect("resolve");
  let mut fresh = Pipeline::default();
  template
    .render(&mut fresh, &services, &registry, true, &[])
    .expect("render");

  let original: Vec<&str> = pipeline.nodes.iter().map(|n| n.kind().klass()).collect();
  let rendered: Vec<&str> = fresh.nodes.iter().map(|n| n.kind().klass()).collect();
  assert_eq!(original, rendered);

  // loaded parameters survive the round trip
  let fit = fresh
    .nodes
    .iter()
    .find_map(|n| n.as_any().downcast_ref::<orogen::FitBlanksNode>())
    .expect("fit node");
  assert_eq!(fit.fits().len(), 1);
  assert_eq!(fit.fits()[0].name, "Ar40");
}

#[test]
#[serial]
fn test_render_reuses_leading_data_node() {
  setup_tracing();
  let (services, dvc, browser) = test_services();
  let registry = NodeRegistry::standard();
  let (store, builtin, _user) = store_with_dirs();
  write_template(builtin.path(), "blanks", BLANKS_TEMPLATE);

  let seeded = dvc.seed(make_analysis("a-01", "P", "R"));
  let mut unknowns = UnknownNode::new(dvc.clone(), browser.clone());
  unknowns.set_unknowns(dvc.make_analyses(&[seeded]).expect("make analyses"));

  let mut pipeline = Pipeline::default();
  pipeline.append(Box::new(unknowns));

  let template = store.template("blanks").expect("resolve");
  template
    .render(&mut pipeline, &services, &registry, true, &[])
    .expect("render");

  // the first rendered node is the pre-existing data node, data intact
  let first = pipeline.nodes.first().expect("has nodes");
  let held = first
    .as_any()
    .downcast_ref::<UnknownNode>()
    .map(|n| n.unknowns.len())
    .expect("unknown node");
  assert_eq!(held, 1);
  assert_eq!(pipeline.len(), 4);
}

#[test]
#[serial]
fn test_render_failure_after_clear_leaves_pipeline_cleared() {
  setup_tracing();
  let (services, _dvc, _browser) = test_services();
  let registry = NodeRegistry::standard();
  let (store, builtin, _user) = store_with_dirs();
  write_template(builtin.path(), "broken", "nodes: [klass: {]");

  let log = new_log();
  let mut pipeline = Pipeline::default();
  pipeline.append(Box::new(RecorderNode::new("existing", log)));

  let template = store.template("broken").expect("resolve");
  let err = template
    .render(&mut pipeline, &services, &registry, true, &[])
    .expect_err("parse fails");
  assert!(matches!(err, EngineError::TemplateParse { .. }));

  // acknowledged rough edge: no rollback after the destructive clear
  assert!(pipeline.is_empty());
}

#[test]
#[serial]
fn test_render_unknown_class_is_an_error() {
  setup_tracing();
  let (services, _dvc, _browser) = test_services();
  let registry = NodeRegistry::standard();
  let (store, builtin, _user) = store_with_dirs();
  write_template(builtin.path(), "bogus", "nodes:\n- klass: FrobnicateNode\n");

  let template = store.template("bogus").expect("resolve");
  let mut pipeline = Pipeline::default();
  let err = template
    .render(&mut pipeline, &services, &registry, true, &[])
    .expect_err("unknown class");
  assert!(matches!(err, EngineError::UnknownNodeClass { .. }));
}

#[test]
#[serial]
fn test_render_skips_nodes_with_missing_optional_service() {
  setup_tracing();
  let (services, _dvc, _browser) = test_services(); // no notifier wired
  let registry = NodeRegistry::standard();
  let (store, builtin, _user) = store_with_dirs();
  write_template(
    builtin.path(),
    "notify",
    "nodes:\n- klass: UnknownNode\n- klass: EmailNode\n  subject: done\n",
  );

  let template = store.template("notify").expect("resolve");
  let mut pipeline = Pipeline::default();
  template
    .render(&mut pipeline, &services, &registry, true, &[])
    .expect("render skips the email node");

  let klasses: Vec<&str> = pipeline.nodes.iter().map(|n| n.kind().klass()).collect();
  assert_eq!(klasses, ["UnknownNode"]);

  // with the service wired, the node materializes
  let notifier = Arc::new(MockNotifier::default());
  let services = services.with_notifier(notifier);
  let mut pipeline = Pipeline::default();
  template
    .render(&mut pipeline, &services, &registry, true, &[])
    .expect("render");
  let klasses: Vec<&str> = pipeline.nodes.iter().map(|n| n.kind().klass()).collect();
  assert_eq!(klasses, ["UnknownNode", "EmailNode"]);
}

#[test]
#[serial]
fn test_render_flattens_groups_with_labels() {
  setup_tracing();
  let (services, _dvc, _browser) = test_services();
  let registry = NodeRegistry::standard();
  let (store, builtin, _user) = store_with_dirs();
  write_template(
    builtin.path(),
    "grouped",
    "\
nodes:
- klass: UnknownNode
- klass: NodeGroup
  name: fits
  nodes:
  - klass: FitBlanksNode
  - klass: BlanksPersistNode
- klass: IdeogramNode
",
  );

  let template = store.template("grouped").expect("resolve");
  let mut pipeline = Pipeline::default();
  template
    .render(&mut pipeline, &services, &registry, true, &[])
    .expect("render");

  let klasses: Vec<&str> = pipeline.nodes.iter().map(|n| n.kind().klass()).collect();
  assert_eq!(
    klasses,
    ["UnknownNode", "FitBlanksNode", "BlanksPersistNode", "IdeogramNode"]
  );

  // grouping is presentation only; the label is carried, execution is flat
  assert_eq!(pipeline.nodes[1].core().group.as_deref(), Some("fits"));
  assert_eq!(pipeline.nodes[2].core().group.as_deref(), Some("fits"));
  assert_eq!(pipeline.nodes[3].core().group, None);
}

#[test]
#[serial]
fn test_exclude_klass_filters_entries() {
  setup_tracing();
  let (services, _dvc, _browser) = test_services();
  let registry = NodeRegistry::standard();
  let (store, builtin, _user) = store_with_dirs();
  write_template(builtin.path(), "blanks", BLANKS_TEMPLATE);

  let template = store.template("blanks").expect("resolve");
  let mut pipeline = Pipeline::default();
  template
    .render(&mut pipeline, &services, &registry, true, &["ReviewNode"])
    .expect("render");

  let klasses: Vec<&str> = pipeline.nodes.iter().map(|n| n.kind().klass()).collect();
  assert!(!klasses.contains(&"ReviewNode"));
}

#[test]
#[serial]
fn test_set_review_permanent_rewrites_in_place() {
  setup_tracing();
  let (store, builtin, _user) = store_with_dirs();
  write_template(builtin.path(), "blanks", BLANKS_TEMPLATE);

  store.set_review_permanent("blanks", false).expect("rewrite");

  let body = fs::read_to_string(builtin.path().join("blanks.yaml")).expect("read back");
  let doc = TemplateDoc::parse(&body, "blanks").expect("parse");

  for entry in &doc.nodes {
    let klass = entry.get("klass").and_then(|v| v.as_str()).expect("klass");
    match klass {
      "ReviewNode" => {
        assert_eq!(entry.get("enabled").and_then(|v| v.as_bool()), Some(false));
      }
      _ => {
        // only review entries are touched
        assert!(entry.get("enabled").is_none());
      }
    }
  }
}

#[test]
#[serial]
fn test_available_templates_filters_by_required_services() {
  setup_tracing();
  let (services, _dvc, _browser) = test_services(); // no notifier
  let (store, builtin, user) = store_with_dirs();

  write_template(builtin.path(), "isotope_evolutions", "required: [dvc]\nnodes:\n- klass: UnknownNode\n");
  write_template(
    builtin.path(),
    "email_report",
    "required: [notification]\nnodes:\n- klass: EmailNode\n",
  );
  write_template(user.path(), "my_custom", "required: []\nnodes:\n- klass: UnknownNode\n");

  let mut names = store.available_templates(&services);
  names.sort();
  assert_eq!(names, ["Isotope Evolutions", "My Custom"]);

  let notifier: Arc<MockNotifier> = Arc::new(MockNotifier::default());
  let services: Services = services.with_notifier(notifier);
  let mut names = store.available_templates(&services);
  names.sort();
  assert_eq!(names, ["Email Report", "Isotope Evolutions", "My Custom"]);
}

#[test]
#[serial]
fn test_user_directory_is_a_fallback() {
  setup_tracing();
  let (store, _builtin, user) = store_with_dirs();
  write_template(user.path(), "mine", "nodes:\n- klass: UnknownNode\n");

  let (path, is_user) = store.path_for("mine").expect("resolve");
  assert!(is_user);
  assert!(path.starts_with(user.path()));

  let err = store.path_for("nope").expect_err("missing");
  assert!(matches!(err, EngineError::TemplateNotFound { .. }));
}

#[test]
#[serial]
fn test_iso_evo_alias_resolves() {
  setup_tracing();
  let (store, builtin, _user) = store_with_dirs();
  write_template(builtin.path(), "isotope_evolutions", "nodes:\n- klass: UnknownNode\n");

  let (path, _) = store.path_for("Iso Evo").expect("alias resolves");
  assert!(path.ends_with("isotope_evolutions.yaml"));
}

#[test]
fn test_registry_validation_fails_fast() {
  setup_tracing();
  let empty = NodeRegistry::empty();
  let err = empty.validate().expect_err("nothing registered");
  assert!(matches!(err, EngineError::UnknownNodeClass { .. }));

  NodeRegistry::standard().validate().expect("standard set is complete");
}

#[test]
#[serial]
fn test_rendered_review_node_honors_enabled_flag() {
  setup_tracing();
  let (services, _dvc, _browser) = test_services();
  let registry = NodeRegistry::standard();
  let (store, builtin, _user) = store_with_dirs();
  write_template(builtin.path(), "blanks", BLANKS_TEMPLATE);

  store.set_review_permanent("blanks", false).expect("rewrite");

  let template = store.template("blanks").expect("resolve");
  let mut pipeline = Pipeline::default();
  template
    .render(&mut pipeline, &services, &registry, true, &[])
    .expect("render");

  let review = pipeline
    .nodes
    .iter()
    .find(|n| n.kind() == orogen::NodeKind::Review)
    .expect("review node");
  assert!(!review.is_enabled());
}
