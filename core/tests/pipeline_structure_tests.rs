// tests/pipeline_structure_tests.rs
mod common;

use common::*;
use orogen::{
  BlanksPersistNode, DataService, FitBlanksNode, FitICFactorNode, ICFactorPersistNode, MeanFit,
  NodeId, Pipeline, PipelineGroup, PipelineNode,
};
use std::sync::Arc;

fn recorder_pipeline(names: &[&str]) -> (Pipeline, Vec<NodeId>, RunLog) {
  let log = new_log();
  let mut pipeline = Pipeline::default();
  let ids = names
    .iter()
    .map(|n| pipeline.append(Box::new(RecorderNode::new(n, log.clone()))))
    .collect();
  (pipeline, ids, log)
}

#[test]
fn test_iternodes_suffix_after_start() {
  setup_tracing();
  let (pipeline, ids, _log) = recorder_pipeline(&["n0", "n1", "n2", "n3"]);

  assert_eq!(pipeline.iternodes(None, None), vec![0, 1, 2, 3]);
  assert_eq!(pipeline.iternodes(Some(ids[1]), None), vec![2, 3]);
  assert_eq!(pipeline.iternodes(Some(ids[3]), None), Vec::<usize>::new());
}

#[test]
fn test_iternodes_prefix_up_to_inclusive() {
  setup_tracing();
  let (pipeline, ids, _log) = recorder_pipeline(&["n0", "n1", "n2", "n3"]);

  assert_eq!(pipeline.iternodes(None, Some(ids[2])), vec![0, 1, 2]);
  assert_eq!(pipeline.iternodes(None, Some(ids[0])), vec![0]);
}

#[test]
fn test_iternodes_is_restartable() {
  setup_tracing();
  let (pipeline, ids, _log) = recorder_pipeline(&["n0", "n1", "n2"]);

  // recomputed each call, not a one-shot generator
  assert_eq!(pipeline.iternodes(Some(ids[0]), None), vec![1, 2]);
  assert_eq!(pipeline.iternodes(Some(ids[0]), None), vec![1, 2]);
}

#[test]
fn test_add_after_falls_back_to_append() {
  setup_tracing();
  let (mut pipeline, ids, log) = recorder_pipeline(&["n0", "n1"]);

  // insert right after n0
  let mid = pipeline.add_after(Some(ids[0]), Box::new(RecorderNode::new("mid", log.clone())));
  assert_eq!(pipeline.index_of(mid), Some(1));

  // an id no longer in the pipeline falls back to append
  pipeline.remove(mid);
  let tail = pipeline.add_after(Some(mid), Box::new(RecorderNode::new("tail", log.clone())));
  assert_eq!(pipeline.index_of(tail), Some(2));
}

#[test]
fn test_scenario_c_move_up_guard() {
  setup_tracing();
  let (mut pipeline, ids, _log) = recorder_pipeline(&["n0", "n1", "n2"]);

  // moving the node at index 1 is a no-op
  pipeline.move_up(ids[1]);
  assert_eq!(pipeline.index_of(ids[0]), Some(0));
  assert_eq!(pipeline.index_of(ids[1]), Some(1));

  // moving the node at index 2 swaps with index 1
  pipeline.move_up(ids[2]);
  assert_eq!(pipeline.index_of(ids[2]), Some(1));
  assert_eq!(pipeline.index_of(ids[1]), Some(2));
}

#[test]
fn test_move_down_boundary() {
  setup_tracing();
  let (mut pipeline, ids, _log) = recorder_pipeline(&["n0", "n1", "n2"]);

  pipeline.move_down(ids[2]);
  assert_eq!(pipeline.index_of(ids[2]), Some(2));

  pipeline.move_down(ids[0]);
  assert_eq!(pipeline.index_of(ids[0]), Some(1));
}

#[test]
fn test_scenario_b_auto_link_on_mutation() {
  setup_tracing();

  let mut pipeline = Pipeline::default();
  let fit = pipeline.append(Box::new(FitBlanksNode::new(Arc::new(MeanFit))));
  assert!(!pipeline.node(fit).expect("fit node").has_save_node());

  let persist = pipeline.add_after(Some(fit), Box::new(BlanksPersistNode::new(MockDvc::new())));
  assert!(pipeline.node(fit).expect("fit node").has_save_node());

  pipeline.remove(persist);
  assert!(!pipeline.node(fit).expect("fit node").has_save_node());
}

#[test]
fn test_auto_link_families_are_independent() {
  setup_tracing();

  let mut pipeline = Pipeline::default();
  let blanks_fit = pipeline.append(Box::new(FitBlanksNode::new(Arc::new(MeanFit))));
  let ic_fit = pipeline.append(Box::new(FitICFactorNode::new(Arc::new(MeanFit))));
  // only the IC family has a persist counterpart downstream
  pipeline.append(Box::new(ICFactorPersistNode::new(MockDvc::new())));

  assert!(!pipeline.node(blanks_fit).expect("blanks fit").has_save_node());
  assert!(pipeline.node(ic_fit).expect("ic fit").has_save_node());
}

#[test]
fn test_auto_link_requires_persist_to_follow() {
  setup_tracing();

  // persist node placed BEFORE the fit node does not satisfy the pairing
  let mut pipeline = Pipeline::default();
  pipeline.append(Box::new(BlanksPersistNode::new(MockDvc::new())));
  let fit = pipeline.append(Box::new(FitBlanksNode::new(Arc::new(MeanFit))));

  assert!(!pipeline.node(fit).expect("fit node").has_save_node());

  // a persist appended after the fit satisfies it
  pipeline.append(Box::new(BlanksPersistNode::new(MockDvc::new())));
  assert!(pipeline.node(fit).expect("fit node").has_save_node());
}

#[test]
fn test_pipeline_group_defaults_and_naming() {
  setup_tracing();
  let mut group = PipelineGroup::new();
  assert_eq!(group.pipelines.len(), 1);
  assert_eq!(group.pipelines[0].name, "Pipeline 1");

  let p2_name = group.add().name.clone();
  assert_eq!(p2_name, "Pipeline 2");
  let p3_name = group.add().name.clone();
  assert_eq!(p3_name, "Pipeline 3");

  // removal does not reuse names
  group.remove(1);
  let p4_name = group.add().name.clone();
  assert_eq!(p4_name, "Pipeline 4");
}

#[test]
#[should_panic]
fn test_pipeline_group_remove_out_of_range_panics() {
  let mut group = PipelineGroup::new();
  group.remove(5);
}

#[test]
fn test_pipeline_group_lookup_by_node() {
  setup_tracing();
  let log = new_log();
  let mut group = PipelineGroup::new();
  let id = group.pipelines[0].append(Box::new(RecorderNode::new("a", log.clone())));
  group.add();

  let found = group.get_pipeline_by_node(id).expect("found");
  assert_eq!(found.name, "Pipeline 1");

  let other = RecorderNode::new("unattached", log);
  assert!(group.get_pipeline_by_node(other.core().id).is_none());
}

#[test]
fn test_reset_clears_data_nodes_only_when_asked() {
  setup_tracing();
  let (_services, dvc, browser) = test_services();

  let seeded = dvc.seed(make_analysis("x-01", "P", "R"));
  let mut unknowns = orogen::UnknownNode::new(dvc.clone(), browser.clone());
  unknowns.set_unknowns(dvc.make_analyses(&[seeded]).expect("make analyses"));

  let mut pipeline = Pipeline::default();
  let id = pipeline.append(Box::new(unknowns));

  pipeline.reset(false);
  let still_there = pipeline
    .node(id)
    .and_then(|n| n.as_any().downcast_ref::<orogen::UnknownNode>())
    .map(|n| n.unknowns.len())
    .expect("unknown node");
  assert_eq!(still_there, 1);

  pipeline.reset(true);
  let cleared = pipeline
    .node(id)
    .and_then(|n| n.as_any().downcast_ref::<orogen::UnknownNode>())
    .map(|n| n.unknowns.len())
    .expect("unknown node");
  assert_eq!(cleared, 0);
}
