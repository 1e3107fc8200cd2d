// tests/pipeline_execution_tests.rs
mod common;

use common::*;
use orogen::{
  AnalysisFilter, DataService, FilterComparator, FilterNode, PipelineNode, RunOutcome, RunStatus,
  UnknownNode,
};

#[test]
fn test_nodes_run_in_order() {
  setup_tracing();
  let (mut engine, _dvc, _browser) = test_engine();

  let log = new_log();
  for name in ["n0", "n1", "n2"] {
    engine.pipeline_mut().append(Box::new(RecorderNode::new(name, log.clone())));
  }

  let status = engine.run_pipeline().expect("run succeeds");
  assert_eq!(status, RunStatus::Completed);
  assert!(status.is_handled());

  let entries = log.lock().clone();
  let runs: Vec<&String> = entries.iter().filter(|e| e.starts_with("run:")).collect();
  assert_eq!(runs, ["run:n0", "run:n1", "run:n2"]);

  // every node visited, bookkeeping indices assigned in order
  for (i, node) in engine.pipeline().nodes.iter().enumerate() {
    assert!(node.core().visited, "node {} not visited", i);
    assert_eq!(node.core().index, i);
  }
}

#[test]
fn test_disabled_node_is_skipped_but_post_run_records_it() {
  setup_tracing();
  let (mut engine, _dvc, _browser) = test_engine();

  let log = new_log();
  engine.pipeline_mut().append(Box::new(RecorderNode::new("a", log.clone())));
  let skipped = engine.pipeline_mut().append(Box::new(RecorderNode::new("b", log.clone())));
  engine.pipeline_mut().append(Box::new(RecorderNode::new("c", log.clone())));

  engine
    .pipeline_mut()
    .node_mut(skipped)
    .expect("node exists")
    .core_mut()
    .enabled = false;

  let status = engine.run_pipeline().expect("run succeeds");
  assert_eq!(status, RunStatus::Completed);

  let entries = log.lock().clone();
  assert!(!entries.contains(&"run:b".to_string()));
  assert!(!entries.contains(&"pre:b".to_string()));
  // the post-run pass skips it too; only enabled nodes are finalized
  assert!(!entries.contains(&"post:b".to_string()));
  assert!(entries.contains(&"post:a".to_string()));
  assert!(entries.contains(&"post:c".to_string()));
}

#[test]
fn test_scenario_a_filter_excludes_and_projects_follow() {
  setup_tracing();
  let (mut engine, dvc, browser) = test_engine();

  let a = make_analysis("a-01", "ProjectA", "RepoX");
  let b = make_analysis("b-01", "ProjectB", "RepoX");
  let mut c = make_analysis("c-01", "ProjectC", "RepoY");
  c.age = 100.0;
  dvc.seed(a);
  dvc.seed(b);
  dvc.seed(c);

  let selected: Vec<orogen::SelectedRecord> = {
    let store = dvc.store.lock();
    store
      .values()
      .map(|an| orogen::SelectedRecord {
        uuid: an.uuid,
        record_id: an.record_id.clone(),
        repository_identifier: an.repository_identifier.clone(),
      })
      .collect()
  };
  let mut unknowns = UnknownNode::new(dvc.clone(), browser.clone());
  unknowns.set_unknowns(dvc.make_analyses(&selected).expect("make analyses"));

  let filter = FilterNode::new().with_filter(AnalysisFilter::new("age", FilterComparator::Gt, 50.0));

  engine.pipeline_mut().append(Box::new(unknowns));
  engine.pipeline_mut().append(Box::new(filter));

  let status = engine.run_pipeline().expect("run succeeds");
  assert_eq!(status, RunStatus::Completed);

  let state = engine.state.as_ref().expect("state is live");
  let mut ids = record_ids(&state.unknowns);
  ids.sort();
  assert_eq!(ids, ["a-01", "b-01"]);

  let projects: Vec<&str> = state.projects.iter().map(String::as_str).collect();
  assert_eq!(projects, ["ProjectA", "ProjectB"]);
}

#[test]
fn test_no_data_resets_whole_pipeline() {
  setup_tracing();
  let (mut engine, dvc, browser) = test_engine();

  // empty unknowns and an empty browser selection: nothing to configure from
  let unknowns = UnknownNode::new(dvc.clone(), browser.clone());
  let log = new_log();
  engine.pipeline_mut().append(Box::new(unknowns));
  engine.pipeline_mut().append(Box::new(RecorderNode::new("tail", log.clone())));

  let status = engine.run_pipeline().expect("run is handled");
  assert_eq!(status, RunStatus::NoData);
  assert!(status.is_handled());

  // the failing node never got to its suffix
  let entries = log.lock().clone();
  assert!(!entries.contains(&"run:tail".to_string()));
  // pipeline-wide reset reached every node, not just the failing one
  assert!(entries.contains(&"reset:tail".to_string()));
}

#[test]
fn test_veto_halts_suffix_but_post_run_visits_all() {
  setup_tracing();
  let (mut engine, _dvc, _browser) = test_engine();

  let log = new_log();
  engine.pipeline_mut().append(Box::new(RecorderNode::new("head", log.clone())));
  let vetoer = engine.pipeline_mut().append(Box::new(RecorderNode::with_outcome(
    "vetoer",
    log.clone(),
    RunOutcome::Veto,
  )));
  engine.pipeline_mut().append(Box::new(RecorderNode::new("tail", log.clone())));

  let status = engine.run_pipeline().expect("run returns");
  assert_eq!(status, RunStatus::Vetoed { node: vetoer });
  assert!(!status.is_handled());

  let entries = log.lock().clone();
  assert!(!entries.contains(&"run:tail".to_string()));
  // unconditional finalization still visits every enabled node
  for name in ["head", "vetoer", "tail"] {
    assert!(entries.contains(&format!("post:{}", name)), "missing post:{}", name);
  }

  let state = engine.state.as_ref().expect("state is live");
  assert_eq!(state.veto, Some(vetoer));
}

#[test]
fn test_resume_after_veto_runs_only_the_suffix() {
  setup_tracing();
  let (mut engine, _dvc, _browser) = test_engine();

  let log = new_log();
  engine.pipeline_mut().append(Box::new(RecorderNode::new("head", log.clone())));
  engine.pipeline_mut().append(Box::new(RecorderNode::with_outcome(
    "vetoer",
    log.clone(),
    RunOutcome::Veto,
  )));
  engine.pipeline_mut().append(Box::new(RecorderNode::new("tail", log.clone())));

  engine.run_pipeline().expect("first pass");
  log.lock().clear();

  let status = engine.resume_pipeline().expect("resume");
  assert_eq!(status, RunStatus::Completed);

  let entries = log.lock().clone();
  // resume starts strictly after the vetoing node with a clean flag
  assert!(!entries.contains(&"run:head".to_string()));
  assert!(!entries.contains(&"run:vetoer".to_string()));
  assert!(entries.contains(&"run:tail".to_string()));

  let state = engine.state.as_ref().expect("state is live");
  assert_eq!(state.veto, None);
}

#[test]
fn test_cancel_stops_at_node_boundary() {
  setup_tracing();
  let (mut engine, _dvc, _browser) = test_engine();

  let log = new_log();
  engine.pipeline_mut().append(Box::new(RecorderNode::new("head", log.clone())));
  engine.pipeline_mut().append(Box::new(RecorderNode::with_outcome(
    "canceler",
    log.clone(),
    RunOutcome::Canceled,
  )));
  engine.pipeline_mut().append(Box::new(RecorderNode::new("tail", log.clone())));

  let status = engine.run_pipeline().expect("run returns");
  assert_eq!(status, RunStatus::Canceled);
  assert!(status.is_handled());
  assert!(!log.lock().contains(&"run:tail".to_string()));
  assert!(engine.state.as_ref().expect("state").canceled);
}

#[test]
fn test_pre_run_failure_is_fatal_for_the_run() {
  setup_tracing();
  let (mut engine, _dvc, _browser) = test_engine();

  let log = new_log();
  let mut bad = RecorderNode::new("bad", log.clone());
  bad.pre_run_ok = false;
  let bad_id = engine.pipeline_mut().append(Box::new(bad));
  engine.pipeline_mut().append(Box::new(RecorderNode::new("tail", log.clone())));

  let status = engine.run_pipeline().expect("run returns");
  assert_eq!(status, RunStatus::PreRunFailed { node: bad_id });
  assert!(status.is_handled());

  let entries = log.lock().clone();
  assert!(!entries.contains(&"run:bad".to_string()));
  assert!(!entries.contains(&"run:tail".to_string()));
}

#[test]
fn test_node_error_propagates_unwrapped() {
  setup_tracing();
  let (mut engine, _dvc, _browser) = test_engine();

  let log = new_log();
  let mut bad = RecorderNode::new("bad", log.clone());
  bad.fail_with = Some("disk on fire".to_string());
  engine.pipeline_mut().append(Box::new(bad));
  engine.pipeline_mut().append(Box::new(RecorderNode::new("tail", log.clone())));

  let err = engine.run_pipeline().expect_err("node failure propagates");
  assert!(err.to_string().contains("disk on fire"));
  assert!(!log.lock().contains(&"run:tail".to_string()));
}

#[test]
fn test_scenario_d_run_from_selected() {
  setup_tracing();
  let (mut engine, _dvc, _browser) = test_engine();

  let log = new_log();
  let mut ids = Vec::new();
  for name in ["n0", "n1", "n2", "n3"] {
    ids.push(engine.pipeline_mut().append(Box::new(RecorderNode::new(name, log.clone()))));
  }

  engine.run_pipeline().expect("first pass");
  log.lock().clear();

  // selection on node index 2 resumes execution at index 1
  engine.selected = Some(ids[2]);
  let status = engine.run_from_pipeline().expect("run from");
  assert_eq!(status, RunStatus::Completed);

  let entries = log.lock().clone();
  let runs: Vec<&String> = entries.iter().filter(|e| e.starts_with("run:")).collect();
  assert_eq!(runs, ["run:n1", "run:n2", "run:n3"]);
}

#[test]
fn test_rerun_with_replaces_unknowns_without_reconfiguring() {
  setup_tracing();
  let (mut engine, dvc, browser) = test_engine();

  let seeded = dvc.seed(make_analysis("orig-01", "ProjectA", "RepoX"));
  let mut unknowns = UnknownNode::new(dvc.clone(), browser.clone());
  unknowns.set_unknowns(dvc.make_analyses(&[seeded]).expect("make analyses"));

  let log = new_log();
  engine.pipeline_mut().append(Box::new(unknowns));
  engine.pipeline_mut().append(Box::new(RecorderNode::new("tail", log.clone())));

  engine.run_pipeline().expect("first pass");
  assert_eq!(
    record_ids(&engine.state.as_ref().expect("state").unknowns),
    ["orig-01"]
  );

  let replacement = vec![make_record("new-01", "ProjectZ", "RepoZ")];
  let status = engine.rerun_with(replacement, true).expect("rerun");
  assert_eq!(status, RunStatus::Completed);

  let state = engine.state.as_ref().expect("state");
  assert_eq!(record_ids(&state.unknowns), ["new-01"]);
  assert!(state.projects.contains("ProjectZ"));
  assert!(log.lock().contains(&"run:tail".to_string()));
}

#[test]
fn test_rerun_without_state_is_refused() {
  setup_tracing();
  let (mut engine, _dvc, _browser) = test_engine();
  let err = engine.rerun_with(Vec::new(), true).expect_err("no live state");
  assert!(matches!(err, orogen::EngineError::NoState(_)));
}
