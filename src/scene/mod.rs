//! Scene management
//!
//! Nodes live in an arena and refer to each other by [`NodeId`]. Parent and
//! child links are for traversal only; the scene owns every node and
//! material it holds.

mod camera;
mod light;
mod transform;

pub use camera::*;
pub use light::*;
pub use transform::*;

use glam::Mat4;

use crate::backend::GraphicsBackend;
use crate::error::{RenderError, RenderResult};
use crate::resources::{GpuMesh, Material};

/// Index of a node in its [`Scene`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

/// Index of a material in its [`Scene`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub(crate) usize);

/// A mesh drawn with a material at a transform relative to its parent.
///
/// Nodes without a mesh only group their children.
#[derive(Debug, Clone)]
pub struct SceneNode {
    pub name: String,
    pub mesh: Option<GpuMesh>,
    pub material: Option<MaterialId>,
    pub transform: Transform,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl SceneNode {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_drawable(&self) -> bool {
        self.mesh.is_some() && self.material.is_some()
    }
}

/// Arena of scene nodes and the materials they reference
#[derive(Debug, Default)]
pub struct Scene {
    nodes: Vec<SceneNode>,
    materials: Vec<Material>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a root node drawing `mesh` with `material`
    pub fn add_node(&mut self, name: &str, mesh: GpuMesh, material: MaterialId) -> RenderResult<NodeId> {
        self.material(material)?;
        Ok(self.insert(SceneNode {
            name: name.to_string(),
            mesh: Some(mesh),
            material: Some(material),
            transform: Transform::default(),
            parent: None,
            children: Vec::new(),
        }))
    }

    /// Add a root node that draws nothing itself
    pub fn add_group(&mut self, name: &str) -> NodeId {
        self.insert(SceneNode {
            name: name.to_string(),
            mesh: None,
            material: None,
            transform: Transform::default(),
            parent: None,
            children: Vec::new(),
        })
    }

    fn insert(&mut self, node: SceneNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub fn node(&self, id: NodeId) -> RenderResult<&SceneNode> {
        self.nodes.get(id.0).ok_or(RenderError::UnknownNode(id))
    }

    pub fn node_mut(&mut self, id: NodeId) -> RenderResult<&mut SceneNode> {
        self.nodes.get_mut(id.0).ok_or(RenderError::UnknownNode(id))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Make `child` the last child of `parent`, detaching it from any
    /// previous parent
    pub fn attach(&mut self, parent: NodeId, child: NodeId) -> RenderResult<()> {
        self.node(parent)?;
        self.node(child)?;
        let mut ancestor = Some(parent);
        while let Some(id) = ancestor {
            if id == child {
                return Err(RenderError::SceneCycle { parent, child });
            }
            ancestor = self.nodes[id.0].parent;
        }
        self.detach(child)?;
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
        Ok(())
    }

    /// Turn `child` into a root node
    pub fn detach(&mut self, child: NodeId) -> RenderResult<()> {
        if let Some(parent) = self.node_mut(child)?.parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != child);
        }
        Ok(())
    }

    /// Parent world transform times local transform, composed up to the root
    pub fn world_transform(&self, id: NodeId) -> RenderResult<Mat4> {
        let mut node = self.node(id)?;
        let mut world = node.transform.matrix();
        while let Some(parent) = node.parent {
            node = self.node(parent)?;
            world = node.transform.matrix() * world;
        }
        Ok(world)
    }

    /// `root` followed by its descendants in depth-first pre-order
    pub fn subtree(&self, root: NodeId) -> RenderResult<Vec<NodeId>> {
        self.node(root)?;
        let mut order = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id.0].children.iter().rev().copied());
        }
        Ok(order)
    }

    pub fn add_material(&mut self, material: Material) -> MaterialId {
        let id = MaterialId(self.materials.len());
        self.materials.push(material);
        id
    }

    pub fn material(&self, id: MaterialId) -> RenderResult<&Material> {
        self.materials.get(id.0).ok_or(RenderError::UnknownMaterial(id))
    }

    pub fn material_mut(&mut self, id: MaterialId) -> RenderResult<&mut Material> {
        self.materials.get_mut(id.0).ok_or(RenderError::UnknownMaterial(id))
    }

    /// Release material uniform buffers; meshes are owned by the caller
    pub fn destroy<B: GraphicsBackend>(self, backend: &mut B) {
        for material in self.materials {
            material.destroy(backend);
        }
    }
}
