//! Descriptor generation over hand-built topologies.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use toskose_common::types::ImageReference;
use toskose_compose::generator::{DescriptorGenerator, PortCollision};
use toskose_tosca::link;
use toskose_tosca::model::{
    BuiltImage, ContainerNode, NodeKind, PortMapping, Relationship, RelationshipKind,
    RelationshipTarget, SoftwareNode, TopologyModel, TopologyNode, VolumeNode,
};

fn container(name: &str, source: &str, ports: &[(u16, u16)]) -> TopologyNode {
    let mut def = ContainerNode::new(Some(ImageReference::parse(source).expect("reference")));
    def.ports = ports
        .iter()
        .map(|&(host, container)| PortMapping { host, container })
        .collect();
    TopologyNode::new(name, "tosker.nodes.Container", NodeKind::Container(def))
}

fn relationship(kind: RelationshipKind, target: &str, location: Option<&str>) -> Relationship {
    Relationship {
        requirement: String::from("req"),
        kind,
        target: RelationshipTarget::Name(target.to_string()),
        alias: None,
        location: location.map(str::to_string),
    }
}

fn toskose(node: &mut TopologyNode, image: &str, env: &[(&str, &str)]) {
    if let NodeKind::Container(def) = &mut node.kind {
        def.toskosed = true;
        def.built_image = Some(BuiltImage {
            image: ImageReference::parse(image).expect("reference"),
            registry_password: None,
            base_name: None,
            base_tag: None,
        });
        def.env = env
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let _ = def.aliases.insert(String::from("api"));
    }
}

fn thoughts() -> TopologyModel {
    let mut model = TopologyModel::new("thoughts", "/tmp/thoughts");

    let mut maven = container("maven", "maven:3.5.3-jdk-8", &[(8000, 8080)]);
    maven
        .relationships
        .push(relationship(RelationshipKind::DependsOn, "dbms", None));
    toskose(
        &mut maven,
        "acme/thoughts-maven:1.0",
        &[("SUPERVISORD_HTTP_PORT", "9001"), ("INPUT_PORT", "8080")],
    );

    let mut dbms = container("dbms", "mongo:3.4", &[(27017, 27017)]);
    dbms.relationships.push(relationship(
        RelationshipKind::AttachesTo,
        "dbvolume",
        Some("/data/db"),
    ));
    if let NodeKind::Container(def) = &mut dbms.kind {
        def.hostname = Some(String::from("dbms"));
    }

    let mut api = TopologyNode::new(
        "api",
        "tosker.nodes.Software",
        NodeKind::Software(SoftwareNode::default()),
    );
    api.relationships
        .push(relationship(RelationshipKind::HostedOn, "maven", None));

    let volume = TopologyNode::new(
        "dbvolume",
        "tosker.nodes.Volume",
        NodeKind::Volume(VolumeNode {
            driver_opts: vec![(String::from("type"), String::from("tmpfs"))],
        }),
    );

    for node in [maven, dbms, api, volume] {
        let _ = model.push(node).expect("unique node");
    }
    link::link(&mut model).expect("linked");
    link::extend(&mut model).expect("extended");
    model
}

#[test]
fn toskosed_container_gets_alias_init_and_restart_policy() {
    let descriptor = DescriptorGenerator::default()
        .generate(&thoughts())
        .expect("generated");

    let maven = &descriptor.document.services["maven"];
    assert_eq!(maven.image, "acme/thoughts-maven:1.0");
    assert_eq!(maven.init, Some(true));
    assert_eq!(maven.hostname, None);
    let attachment = maven.networks["toskose-network"]
        .as_ref()
        .expect("explicit attachment");
    assert_eq!(attachment.aliases, vec!["api".to_string(), "maven".to_string()]);
    assert_eq!(
        maven.deploy.as_ref().expect("deploy").restart_policy.condition,
        "on-failure"
    );
    assert_eq!(
        maven.environment,
        vec!["SUPERVISORD_HTTP_PORT=9001", "INPUT_PORT=8080"]
    );
    assert_eq!(maven.ports, vec!["8080:8000/tcp"]);
    assert_eq!(maven.depends_on, vec!["dbms"]);
}

#[test]
fn pass_through_container_keeps_default_membership() {
    let descriptor = DescriptorGenerator::default()
        .generate(&thoughts())
        .expect("generated");

    let dbms = &descriptor.document.services["dbms"];
    assert_eq!(dbms.image, "mongo:3.4");
    assert_eq!(dbms.init, None);
    assert_eq!(dbms.deploy, None);
    assert_eq!(dbms.hostname.as_deref(), Some("dbms"));
    assert!(dbms.networks["toskose-network"].is_none());
    assert_eq!(dbms.volumes, vec!["dbvolume:/data/db"]);
}

#[test]
fn volumes_carry_driver_options() {
    let descriptor = DescriptorGenerator::default()
        .generate(&thoughts())
        .expect("generated");

    let volume = descriptor.document.volumes["dbvolume"]
        .as_ref()
        .expect("driver options");
    assert_eq!(volume.driver_opts["type"], "tmpfs");
}

#[test]
fn software_nodes_are_not_services() {
    let descriptor = DescriptorGenerator::default()
        .generate(&thoughts())
        .expect("generated");

    assert_eq!(
        descriptor.document.services.keys().collect::<Vec<_>>(),
        vec!["dbms", "maven"]
    );
}

#[test]
fn host_port_collision_is_reported_without_failing() {
    let mut model = TopologyModel::new("clash", "/tmp/clash");
    let _ = model
        .push(container("first", "nginx:1", &[(80, 80)]))
        .expect("unique");
    let _ = model
        .push(container("second", "httpd:2", &[(80, 8080), (81, 8080)]))
        .expect("unique");

    let descriptor = DescriptorGenerator::default()
        .generate(&model)
        .expect("collisions do not abort generation");

    assert_eq!(
        descriptor.collisions,
        vec![
            PortCollision::Host {
                port: 80,
                container: "second".into()
            },
            PortCollision::Container {
                port: 8080,
                container: "second".into()
            },
        ]
    );
    assert_eq!(descriptor.document.services.len(), 2);
}

#[test]
fn rendered_descriptor_is_alias_free_and_parseable() {
    let descriptor = DescriptorGenerator::default()
        .generate(&thoughts())
        .expect("generated");
    let dir = tempfile::tempdir().expect("tempdir");

    let path = descriptor
        .write_to(dir.path(), "docker-compose.yml")
        .expect("written");
    let rendered = std::fs::read_to_string(path).expect("readable");

    assert!(rendered.starts_with("---\n"));
    assert!(!rendered.contains('&'));
    assert!(!rendered.contains('*'));
    let parsed: serde_yaml::Value = serde_yaml::from_str(&rendered).expect("valid yaml");
    assert_eq!(parsed["version"].as_str(), Some("3.3"));
    assert_eq!(
        parsed["networks"]["toskose-network"]["attachable"].as_bool(),
        Some(true)
    );
}

#[test]
fn container_without_image_is_a_translation_error() {
    let mut model = TopologyModel::new("broken", "/tmp/broken");
    let _ = model
        .push(TopologyNode::new(
            "ghost",
            "tosker.nodes.Container",
            NodeKind::Container(ContainerNode::new(None)),
        ))
        .expect("unique");

    let err = DescriptorGenerator::default()
        .generate(&model)
        .expect_err("no image");
    assert!(err.to_string().starts_with("translation error"));
}
