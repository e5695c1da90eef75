use glam::Vec3;
use id_arena::Id;

use crate::scene_graph::camera::Camera;
use crate::scene_graph::light::Light;
use crate::scene_graph::mesh::LightmapPlacement;
use crate::scene_graph::scene::{MaterialId, MeshId, Scene};
use crate::scene_graph::transform::Transform;

pub type ObjectId = Id<Object3D>;

#[derive(Debug, Clone)]
pub struct Object3D {
    pub name: String,
    pub transform: Transform,
    pub mesh_id: Option<MeshId>,
    pub material_id: Option<MaterialId>,
    pub lightmap: Option<LightmapPlacement>,
    pub light: Option<Light>,
    pub camera: Option<Camera>,
    pub parent_id: Option<ObjectId>,
    pub child_ids: Vec<ObjectId>,
}

impl Object3D {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn parent<'a>(&self, scene: &'a Scene) -> Option<&'a Object3D> {
        self.parent_id.and_then(|id| scene.get_object(id))
    }
}

impl Default for Object3D {
    fn default() -> Self {
        Self {
            name: String::new(),
            transform: Transform::from_translation(Vec3::ZERO),
            mesh_id: None,
            material_id: None,
            lightmap: None,
            light: None,
            camera: None,
            parent_id: None,
            child_ids: Vec::new(),
        }
    }
}
