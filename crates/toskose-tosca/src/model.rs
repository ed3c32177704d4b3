//! The linked topology model.
//!
//! Nodes live in an arena owned by [`TopologyModel`] and reference each
//! other through [`NodeId`]s. Relationship targets start as names and are
//! rewritten into ids by the linking pass.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Component, Path, PathBuf};

use toskose_common::constants;
use toskose_common::error::{Result, ToskoseError};
use toskose_common::types::{ContainerRole, ImageReference};

use crate::value::ValueTree;

/// Index of a node inside its [`TopologyModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Returns the arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Kind of a relationship between two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationshipKind {
    /// The source runs inside the target.
    HostedOn,
    /// The source talks to the target over the network.
    ConnectsTo,
    /// The source must start after the target.
    DependsOn,
    /// The source mounts the target volume.
    AttachesTo,
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HostedOn => write!(f, "HostedOn"),
            Self::ConnectsTo => write!(f, "ConnectsTo"),
            Self::DependsOn => write!(f, "DependsOn"),
            Self::AttachesTo => write!(f, "AttachesTo"),
        }
    }
}

/// Target of a relationship, by name until the linking pass runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationshipTarget {
    /// Name declared in the manifest.
    Name(String),
    /// Linked node.
    Node(NodeId),
}

/// An outgoing relationship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    /// Requirement name that declared it (`host`, `connection`, ...).
    pub requirement: String,
    /// Relationship kind.
    pub kind: RelationshipKind,
    /// Target node.
    pub target: RelationshipTarget,
    /// Name under which the target is reached, when promoted to a container.
    pub alias: Option<String>,
    /// Mount location of an `AttachesTo` relationship.
    pub location: Option<String>,
}

impl Relationship {
    /// Returns the linked target, or `None` before linking.
    #[must_use]
    pub const fn target_id(&self) -> Option<NodeId> {
        match self.target {
            RelationshipTarget::Node(id) => Some(id),
            RelationshipTarget::Name(_) => None,
        }
    }
}

/// An incoming relationship, recorded on the target during linking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackLink {
    /// Node owning the outgoing relationship.
    pub source: NodeId,
    /// Relationship kind.
    pub kind: RelationshipKind,
}

/// A file shipped with the package.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileArtifact {
    /// Artifact name, when declared under a name.
    pub name: Option<String>,
    /// Absolute path on the host.
    pub path: PathBuf,
}

impl FileArtifact {
    /// Creates an artifact rooted under `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns a parsing error if `relative` is absolute or climbs out of
    /// `base_dir`.
    pub fn rebased(name: Option<String>, base_dir: &Path, relative: &str) -> Result<Self> {
        let contained = Path::new(relative)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !contained {
            tracing::error!(path = %relative, "artifact outside of the package");
            return Err(ToskoseError::parsing(format!(
                "artifact path {relative} escapes the package"
            )));
        }
        Ok(Self {
            name,
            path: base_dir.join(relative),
        })
    }

    /// Returns the file name of the artifact.
    #[must_use]
    pub fn basename(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Value of a lifecycle-operation input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleInput {
    /// A literal value.
    Literal(String),
    /// A file of the package.
    FileRef(FileArtifact),
}

/// A lifecycle operation of a software component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleInterface {
    /// Interface group (e.g. `Standard`).
    pub group: String,
    /// Operation name (e.g. `create`, `start`).
    pub operation: String,
    /// Script implementing the operation.
    pub command: FileArtifact,
    /// Inputs of the operation, in declaration order.
    pub inputs: Vec<(String, LifecycleInput)>,
}

/// A port published by a container, keyed as declared in the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortMapping {
    /// Host-side port (map key).
    pub host: u16,
    /// Container-side port (map value).
    pub container: u16,
}

/// The image produced for a container by the build step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltImage {
    /// Destination image.
    pub image: ImageReference,
    /// Registry password, if provided by the configuration.
    pub registry_password: Option<String>,
    /// Override of the toskose base image name.
    pub base_name: Option<String>,
    /// Override of the toskose base image tag.
    pub base_tag: Option<String>,
}

/// A container node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerNode {
    /// Role in the toskosing process.
    pub role: ContainerRole,
    /// Image the container is built from.
    pub source_image: Option<ImageReference>,
    /// Image produced by the build step.
    pub built_image: Option<BuiltImage>,
    /// Launch command (`command` property).
    pub command: Option<String>,
    /// Environment, in declaration order.
    pub env: Vec<(String, String)>,
    /// Published ports.
    pub ports: Vec<PortMapping>,
    /// Shared data paths (`share_data` property).
    pub share_data: Vec<String>,
    /// Software components hosted (transitively) on this container.
    pub hosted: Vec<NodeId>,
    /// Extra network aliases the container answers to.
    pub aliases: BTreeSet<String>,
    /// Network hostname set by the deployment configuration.
    pub hostname: Option<String>,
    /// Set once the container is scheduled for a supervisord rebuild.
    pub toskosed: bool,
}

impl ContainerNode {
    /// Creates a regular container with the given source image.
    #[must_use]
    pub const fn new(source_image: Option<ImageReference>) -> Self {
        Self {
            role: ContainerRole::Regular,
            source_image,
            built_image: None,
            command: None,
            env: Vec::new(),
            ports: Vec::new(),
            share_data: Vec::new(),
            hosted: Vec::new(),
            aliases: BTreeSet::new(),
            hostname: None,
            toskosed: false,
        }
    }

    /// Returns `true` for the manager container.
    #[must_use]
    pub fn is_manager(&self) -> bool {
        self.role == ContainerRole::Manager
    }

    /// Image the deployment descriptor should reference: the built image,
    /// falling back to the source image.
    #[must_use]
    pub fn final_image(&self) -> Option<&ImageReference> {
        self.built_image
            .as_ref()
            .map(|built| &built.image)
            .or(self.source_image.as_ref())
    }

    /// Returns `true` if at least one software component is hosted here.
    #[must_use]
    pub fn hosts_software(&self) -> bool {
        !self.hosted.is_empty()
    }
}

/// A software component node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SoftwareNode {
    /// Files shipped with the component.
    pub artifacts: Vec<FileArtifact>,
    /// Lifecycle operations, in declaration order.
    pub interfaces: Vec<LifecycleInterface>,
    /// Container the component ultimately runs in (set by the extension pass).
    pub host_container: Option<NodeId>,
}

impl SoftwareNode {
    /// Environment entries derived from the lifecycle inputs.
    ///
    /// Each input becomes `INPUT_<NAME>`; file inputs point to the
    /// in-container artifact location of the component.
    #[must_use]
    pub fn input_env(&self, software: &str) -> Vec<(String, String)> {
        self.interfaces
            .iter()
            .flat_map(|interface| interface.inputs.iter())
            .map(|(name, input)| {
                let value = match input {
                    LifecycleInput::Literal(v) => v.clone(),
                    LifecycleInput::FileRef(file) => {
                        constants::artifact_path(software, &file.basename())
                    }
                };
                (format!("INPUT_{}", name.to_uppercase()), value)
            })
            .collect()
    }
}

/// A volume node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeNode {
    /// Driver options (`driver_opt` property).
    pub driver_opts: Vec<(String, String)>,
}

/// Variant data of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// A container.
    Container(ContainerNode),
    /// A software component.
    Software(SoftwareNode),
    /// A volume.
    Volume(VolumeNode),
}

/// A node of the topology.
#[derive(Debug, Clone, PartialEq)]
pub struct TopologyNode {
    /// Unique name.
    pub name: String,
    /// Declared TOSCA type.
    pub type_name: String,
    /// Resolved free-form properties.
    pub properties: ValueTree,
    /// Outgoing relationships, in declaration order.
    pub relationships: Vec<Relationship>,
    /// Incoming relationships, filled by the linking pass.
    pub incoming: Vec<BackLink>,
    /// Variant data.
    pub kind: NodeKind,
}

impl TopologyNode {
    /// Creates a node without relationships.
    #[must_use]
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            properties: ValueTree::empty_map(),
            relationships: Vec::new(),
            incoming: Vec::new(),
            kind,
        }
    }

    /// Returns the container data of a container node.
    #[must_use]
    pub const fn as_container(&self) -> Option<&ContainerNode> {
        match &self.kind {
            NodeKind::Container(c) => Some(c),
            _ => None,
        }
    }

    /// Returns the software data of a software node.
    #[must_use]
    pub const fn as_software(&self) -> Option<&SoftwareNode> {
        match &self.kind {
            NodeKind::Software(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the volume data of a volume node.
    #[must_use]
    pub const fn as_volume(&self) -> Option<&VolumeNode> {
        match &self.kind {
            NodeKind::Volume(v) => Some(v),
            _ => None,
        }
    }

    /// Returns outgoing relationships of one kind.
    pub fn relationships_of(&self, kind: RelationshipKind) -> impl Iterator<Item = &Relationship> {
        self.relationships.iter().filter(move |r| r.kind == kind)
    }
}

/// A container node together with its id and generic node data.
#[derive(Debug, Clone, Copy)]
pub struct ContainerRef<'a> {
    /// Arena id.
    pub id: NodeId,
    /// Generic node data.
    pub node: &'a TopologyNode,
    /// Container data.
    pub container: &'a ContainerNode,
}

/// A software node together with its id and generic node data.
#[derive(Debug, Clone, Copy)]
pub struct SoftwareRef<'a> {
    /// Arena id.
    pub id: NodeId,
    /// Generic node data.
    pub node: &'a TopologyNode,
    /// Software data.
    pub software: &'a SoftwareNode,
}

/// The whole topology of one application.
#[derive(Debug, Clone)]
pub struct TopologyModel {
    /// Application name (manifest file stem).
    pub name: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Directory every relative artifact path is rooted in.
    pub base_dir: PathBuf,
    /// Path of the manifest the model was built from.
    pub manifest_path: PathBuf,
    /// Imported type files, by namespace.
    pub imports: Vec<(String, PathBuf)>,
    /// Resolved topology outputs.
    pub outputs: Vec<(String, ValueTree)>,
    nodes: Vec<TopologyNode>,
    index: HashMap<String, NodeId>,
}

impl TopologyModel {
    /// Creates an empty model.
    #[must_use]
    pub fn new(name: impl Into<String>, base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            name: name.into(),
            description: None,
            manifest_path: base_dir.clone(),
            base_dir,
            imports: Vec::new(),
            outputs: Vec::new(),
            nodes: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Adds a node, indexing it by name.
    ///
    /// # Errors
    ///
    /// Returns a parsing error if a node with the same name exists.
    pub fn push(&mut self, node: TopologyNode) -> Result<NodeId> {
        if self.index.contains_key(&node.name) {
            return Err(ToskoseError::parsing(format!(
                "duplicate node name: {}",
                node.name
            )));
        }
        let id = NodeId(self.nodes.len());
        let _ = self.index.insert(node.name.clone(), id);
        self.nodes.push(node);
        Ok(id)
    }

    /// Returns a node by id.
    ///
    /// Ids are only produced by this model, so the lookup cannot miss.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &TopologyNode {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut TopologyNode {
        &mut self.nodes[id.0]
    }

    /// Returns a node by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TopologyNode> {
        self.index.get(name).map(|id| self.node(*id))
    }

    /// Returns the id of a node by name.
    #[must_use]
    pub fn id_of(&self, name: &str) -> Option<NodeId> {
        self.index.get(name).copied()
    }

    /// Returns every node, in declaration order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &TopologyNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    /// Returns every container node, in declaration order.
    pub fn containers(&self) -> impl Iterator<Item = ContainerRef<'_>> {
        self.nodes().filter_map(|(id, node)| {
            node.as_container()
                .map(|container| ContainerRef { id, node, container })
        })
    }

    /// Returns every software node, in declaration order.
    pub fn software(&self) -> impl Iterator<Item = SoftwareRef<'_>> {
        self.nodes().filter_map(|(id, node)| {
            node.as_software()
                .map(|software| SoftwareRef { id, node, software })
        })
    }

    /// Returns every volume node, in declaration order.
    pub fn volumes(&self) -> impl Iterator<Item = (&TopologyNode, &VolumeNode)> {
        self.nodes
            .iter()
            .filter_map(|node| node.as_volume().map(|volume| (node, volume)))
    }

    /// Returns a container by name.
    #[must_use]
    pub fn container(&self, name: &str) -> Option<ContainerRef<'_>> {
        let id = self.id_of(name)?;
        let node = self.node(id);
        node.as_container()
            .map(|container| ContainerRef { id, node, container })
    }

    /// Returns the manager container, once the configuration added it.
    #[must_use]
    pub fn manager(&self) -> Option<ContainerRef<'_>> {
        self.containers().find(|c| c.container.is_manager())
    }

    /// Returns the software components hosted on a container.
    #[must_use]
    pub fn hosted_software(&self, container: NodeId) -> Vec<SoftwareRef<'_>> {
        self.node(container)
            .as_container()
            .map(|c| {
                c.hosted
                    .iter()
                    .filter_map(|id| {
                        let node = self.node(*id);
                        node.as_software()
                            .map(|software| SoftwareRef { id: *id, node, software })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns mutable container data, for the configuration merge.
    pub fn container_mut(&mut self, id: NodeId) -> Option<&mut ContainerNode> {
        match &mut self.nodes.get_mut(id.0)?.kind {
            NodeKind::Container(c) => Some(c),
            _ => None,
        }
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the model has no node.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
