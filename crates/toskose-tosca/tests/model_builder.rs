//! Builds full topology models from manifests written to scratch directories.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::PathBuf;

use tempfile::TempDir;
use toskose_common::error::ToskoseError;
use toskose_common::types::ImageReference;
use toskose_tosca::builder::TopologyModelBuilder;
use toskose_tosca::model::{LifecycleInput, RelationshipKind};

const HEADER: &str = "tosca_definitions_version: tosca_simple_yaml_1_0
description: thoughts application
repositories:
  docker_hub: https://registry.hub.docker.com/
";

const THOUGHTS: &str = "topology_template:
  inputs:
    api_port:
      type: integer
      default: 8080
  node_templates:
    api:
      type: tosker.nodes.Software
      artifacts:
        api_jar: artifacts/api.jar
      requirements:
        - host: maven
        - connection: dbms
      interfaces:
        Standard:
          create:
            implementation: scripts/api/create.sh
            inputs:
              jar: { get_artifact: [SELF, api_jar] }
              port: { get_input: api_port }
          start:
            implementation: scripts/api/start.sh
    gui:
      type: tosker.nodes.Software
      requirements:
        - host: node
        - connection: api
      interfaces:
        Standard:
          start:
            implementation: scripts/gui/start.sh
    maven:
      type: tosker.nodes.Container
      artifacts:
        my_image:
          file: maven:3.5.3-jdk-8
          type: tosker.artifacts.Image
          repository: docker_hub
      properties:
        ports:
          8000: { get_input: api_port }
    node:
      type: tosker.nodes.Container
      artifacts:
        my_image:
          file: node:6
          type: tosker.artifacts.Image
          repository: docker_hub
      requirements:
        - connection: api
    dbms:
      type: tosker.nodes.Container
      artifacts:
        my_image:
          file: mongo:3.4
          type: tosker.artifacts.Image.Service
          repository: docker_hub
      requirements:
        - storage:
            node: dbvolume
            relationship:
              type: tosca.relationships.AttachesTo
              properties:
                location: /data/db
    dbvolume:
      type: tosker.nodes.Volume
";

fn write_manifest(body: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("thoughts.yaml");
    std::fs::write(&path, format!("{HEADER}{body}")).expect("write manifest");
    (dir, path)
}

#[test]
fn builds_a_linked_model() {
    let (dir, path) = write_manifest(THOUGHTS);
    let model = TopologyModelBuilder::new().build(&path).expect("model");

    assert_eq!(model.name, "thoughts");
    assert_eq!(model.base_dir, dir.path());
    assert_eq!(model.containers().count(), 3);
    assert_eq!(model.software().count(), 2);
    assert_eq!(model.volumes().count(), 1);

    let maven = model.container("maven").expect("maven");
    assert_eq!(
        maven.container.source_image,
        Some(ImageReference::new("maven", "3.5.3-jdk-8"))
    );
    assert_eq!(maven.container.ports[0].host, 8000);
    assert_eq!(maven.container.ports[0].container, 8080);

    let hosted: Vec<_> = model
        .hosted_software(maven.id)
        .iter()
        .map(|s| s.node.name.clone())
        .collect();
    assert_eq!(hosted, vec!["api"]);
    assert!(!model.container("dbms").expect("dbms").container.hosts_software());
}

#[test]
fn every_software_resolves_to_one_container() {
    let (_dir, path) = write_manifest(THOUGHTS);
    let model = TopologyModelBuilder::new().build(&path).expect("model");
    for software in model.software() {
        let host = software.software.host_container.expect("host container");
        assert!(model.node(host).as_container().is_some());
    }
}

#[test]
fn back_links_are_recorded_on_targets() {
    let (_dir, path) = write_manifest(THOUGHTS);
    let model = TopologyModelBuilder::new().build(&path).expect("model");
    let maven = model.get("maven").expect("maven");
    let api = model.id_of("api").expect("api");
    assert!(
        maven
            .incoming
            .iter()
            .any(|b| b.source == api && b.kind == RelationshipKind::HostedOn)
    );
}

#[test]
fn container_connections_to_software_are_promoted() {
    let (_dir, path) = write_manifest(THOUGHTS);
    let model = TopologyModelBuilder::new().build(&path).expect("model");
    let node = model.get("node").expect("node");
    let connection = node
        .relationships_of(RelationshipKind::ConnectsTo)
        .next()
        .expect("connection");
    assert_eq!(connection.target_id(), model.id_of("maven"));
    assert_eq!(connection.alias.as_deref(), Some("api"));

    let maven = model.container("maven").expect("maven");
    assert!(maven.container.aliases.contains("api"));
}

#[test]
fn interface_inputs_are_resolved() {
    let (dir, path) = write_manifest(THOUGHTS);
    let model = TopologyModelBuilder::new()
        .input("api_port", "9090")
        .build(&path)
        .expect("model");
    let api = model.get("api").and_then(|n| n.as_software()).expect("api");
    let create = &api.interfaces[0];
    assert_eq!(create.command.path, dir.path().join("scripts/api/create.sh"));
    assert_eq!(
        create.inputs,
        vec![
            (
                "jar".to_string(),
                LifecycleInput::FileRef(toskose_tosca::model::FileArtifact {
                    name: None,
                    path: dir.path().join("artifacts/api.jar"),
                })
            ),
            ("port".to_string(), LifecycleInput::Literal("9090".into())),
        ]
    );
}

#[test]
fn software_without_host_fails() {
    let body = "topology_template:
  node_templates:
    api:
      type: tosker.nodes.Software
      interfaces:
        Standard:
          start: scripts/start.sh
";
    let (_dir, path) = write_manifest(body);
    let err = TopologyModelBuilder::new().build(&path).expect_err("no host");
    assert!(matches!(err, ToskoseError::Parsing { .. }));
}

#[test]
fn cyclic_hosting_fails() {
    let body = "topology_template:
  node_templates:
    a:
      type: tosker.nodes.Software
      requirements:
        - host: b
    b:
      type: tosker.nodes.Software
      requirements:
        - host: a
";
    let (_dir, path) = write_manifest(body);
    let err = TopologyModelBuilder::new().build(&path).expect_err("cycle");
    assert!(err.to_string().contains("cyclic"));
}

#[test]
fn nested_software_reaches_the_outer_container() {
    let body = "topology_template:
  node_templates:
    app:
      type: tosker.nodes.Software
      requirements:
        - host: runtime
    runtime:
      type: tosker.nodes.Software
      requirements:
        - host: box
    box:
      type: tosker.nodes.Container
      artifacts:
        my_image:
          file: alpine
          type: tosker.artifacts.Image
          repository: docker_hub
";
    let (_dir, path) = write_manifest(body);
    let model = TopologyModelBuilder::new().build(&path).expect("model");
    let container = model.container("box").expect("box");
    assert_eq!(model.hosted_software(container.id).len(), 2);
}

#[test]
fn unknown_relationship_target_fails() {
    let body = "topology_template:
  node_templates:
    api:
      type: tosker.nodes.Software
      requirements:
        - host: ghost
";
    let (_dir, path) = write_manifest(body);
    let err = TopologyModelBuilder::new().build(&path).expect_err("unknown target");
    assert!(err.to_string().contains("ghost"));
}
