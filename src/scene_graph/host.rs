//! Capabilities the X3D walker needs from whatever owns the scene graph.
//!
//! The exporter only reads through this trait and the importer only creates
//! and decorates nodes through it, so the codecs never see a concrete scene
//! type.

use std::fmt::Debug;
use std::hash::Hash;

use crate::scene_graph::camera::Camera;
use crate::scene_graph::environment::Environment;
use crate::scene_graph::light::Light;
use crate::scene_graph::material::{MaterialData, TextureRef};
use crate::scene_graph::mesh::{LightmapPlacement, MeshData};
use crate::scene_graph::transform::Transform;

/// A mesh as rendered by one node.
#[derive(Debug, Clone, Copy)]
pub struct MeshInstance<'a> {
    /// Stable identity of the shared mesh resource.
    pub key: usize,
    pub mesh: &'a MeshData,
    pub lightmap: Option<LightmapPlacement>,
}

#[derive(Debug, Clone, Copy)]
pub struct MaterialInstance<'a> {
    pub key: usize,
    pub material: &'a MaterialData,
}

pub trait SceneHost {
    type NodeId: Copy + Eq + Hash + Debug;

    fn scene_name(&self) -> &str;
    fn roots(&self) -> Vec<Self::NodeId>;
    fn node_name(&self, node: Self::NodeId) -> &str;
    fn local_transform(&self, node: Self::NodeId) -> Transform;
    fn children(&self, node: Self::NodeId) -> Vec<Self::NodeId>;
    fn mesh_data(&self, node: Self::NodeId) -> Option<MeshInstance<'_>>;
    fn material_data(&self, node: Self::NodeId) -> Option<MaterialInstance<'_>>;
    fn light_data(&self, node: Self::NodeId) -> Option<&Light>;
    fn camera_data(&self, node: Self::NodeId) -> Option<&Camera>;
    fn lightmap(&self, index: usize) -> Option<&TextureRef>;
    fn environment(&self) -> Environment;

    fn create_node(&mut self, name: &str, parent: Option<Self::NodeId>) -> Self::NodeId;
    fn set_local_transform(&mut self, node: Self::NodeId, transform: Transform);
    fn attach_mesh(&mut self, node: Self::NodeId, mesh: MeshData);
    fn attach_material(&mut self, node: Self::NodeId, material: MaterialData);
    fn attach_light(&mut self, node: Self::NodeId, light: Light);
    fn attach_camera(&mut self, node: Self::NodeId, camera: Camera);
    fn set_environment(&mut self, environment: Environment);
    /// Copies the subtree rooted at `source` under `parent`. The copy shares
    /// mesh and material resources with the original.
    fn instantiate(&mut self, source: Self::NodeId, parent: Option<Self::NodeId>)
        -> Self::NodeId;
}
