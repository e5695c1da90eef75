use glam::Mat4;
use id_arena::{Arena, Id};

use crate::math::bounds::AABB;
use crate::scene_graph::camera::Camera;
use crate::scene_graph::environment::Environment;
use crate::scene_graph::host::{MaterialInstance, MeshInstance, SceneHost};
use crate::scene_graph::light::Light;
use crate::scene_graph::material::{MaterialData, TextureRef};
use crate::scene_graph::mesh::MeshData;
use crate::scene_graph::object3d::{Object3D, ObjectId};
use crate::scene_graph::transform::Transform;

pub type MeshId = Id<MeshData>;
pub type MaterialId = Id<MaterialData>;

pub struct Scene {
    pub name: String,
    pub objects: Arena<Object3D>,
    pub meshes: Arena<MeshData>,
    pub materials: Arena<MaterialData>,
    /// Baked lightmap atlases, addressed by `LightmapPlacement::index`.
    pub lightmaps: Vec<TextureRef>,
    pub environment: Environment,
}

impl Scene {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objects: Arena::new(),
            meshes: Arena::new(),
            materials: Arena::new(),
            lightmaps: Vec::new(),
            environment: Environment::default(),
        }
    }

    pub fn add_object(&mut self, object: Object3D) -> ObjectId {
        self.objects.alloc(object)
    }

    pub fn get_object(&self, id: ObjectId) -> Option<&Object3D> {
        self.objects.get(id)
    }

    pub fn get_object_mut(&mut self, id: ObjectId) -> Option<&mut Object3D> {
        self.objects.get_mut(id)
    }

    pub fn get_object_by_name(&self, name: &str) -> Option<ObjectId> {
        self.objects
            .iter()
            .find(|(_, object)| object.name == name)
            .map(|(id, _)| id)
    }

    pub fn add_mesh(&mut self, mesh: MeshData) -> MeshId {
        self.meshes.alloc(mesh)
    }

    pub fn get_mesh(&self, id: MeshId) -> Option<&MeshData> {
        self.meshes.get(id)
    }

    pub fn add_material(&mut self, material: MaterialData) -> MaterialId {
        self.materials.alloc(material)
    }

    pub fn get_material(&self, id: MaterialId) -> Option<&MaterialData> {
        self.materials.get(id)
    }

    /// Objects without a parent, in creation order.
    pub fn root_objects(&self) -> Vec<ObjectId> {
        self.objects
            .iter()
            .filter(|(_, object)| object.parent_id.is_none())
            .map(|(id, _)| id)
            .collect()
    }

    /// Sets the parent of an object and updates child relationships
    pub fn set_object_parent(&mut self, child_id: ObjectId, new_parent_id: Option<ObjectId>) {
        // Remove from old parent's children list
        if let Some(child) = self.objects.get(child_id) {
            if let Some(old_parent_id) = child.parent_id {
                if let Some(old_parent) = self.objects.get_mut(old_parent_id) {
                    old_parent.child_ids.retain(|&id| id != child_id);
                }
            }
        }

        // Set new parent and add to new parent's children list
        if let Some(child) = self.objects.get_mut(child_id) {
            child.parent_id = new_parent_id;

            if let Some(new_parent_id) = new_parent_id {
                if let Some(new_parent) = self.objects.get_mut(new_parent_id) {
                    new_parent.child_ids.push(child_id);
                }
            }
        }
    }

    pub fn spawn_child(&mut self, object: Object3D, parent: Option<ObjectId>) -> ObjectId {
        let object_id = self.add_object(object);
        self.set_object_parent(object_id, parent);
        object_id
    }

    pub fn world_matrix(&self, object_id: ObjectId) -> Mat4 {
        let mut matrix = Mat4::IDENTITY;
        let mut current = self.get_object(object_id);

        while let Some(object) = current {
            matrix = object.transform.local_matrix() * matrix;
            current = object.parent(self);
        }

        matrix
    }

    /// Bounds of every mesh instance in world space.
    pub fn world_bounds(&self) -> Option<AABB> {
        self.objects
            .iter()
            .filter_map(|(id, object)| {
                let mesh = self.get_mesh(object.mesh_id?)?;
                let local = mesh.bounding_box()?;
                Some(local.transformed(&self.world_matrix(id)))
            })
            .reduce(|a, b| a.union(&b))
    }

    /// Deep-copies the subtree at `source_id` under `parent`. Mesh and
    /// material resources are shared with the original.
    pub fn instantiate_subtree(
        &mut self,
        source_id: ObjectId,
        parent: Option<ObjectId>,
    ) -> ObjectId {
        let template = match self.get_object(source_id) {
            Some(object) => object.clone(),
            None => {
                log::warn!("Instantiating unknown object {:?}", source_id);
                Object3D::named("Missing")
            }
        };

        let source_children = template.child_ids.clone();
        let copy = Object3D {
            parent_id: None,
            child_ids: Vec::new(),
            ..template
        };
        let copy_id = self.spawn_child(copy, parent);

        for child_id in source_children {
            self.instantiate_subtree(child_id, Some(copy_id));
        }

        copy_id
    }
}

impl SceneHost for Scene {
    type NodeId = ObjectId;

    fn scene_name(&self) -> &str {
        &self.name
    }

    fn roots(&self) -> Vec<ObjectId> {
        self.root_objects()
    }

    fn node_name(&self, node: ObjectId) -> &str {
        self.get_object(node)
            .map(|object| object.name.as_str())
            .unwrap_or_default()
    }

    fn local_transform(&self, node: ObjectId) -> Transform {
        self.get_object(node)
            .map(|object| object.transform)
            .unwrap_or_default()
    }

    fn children(&self, node: ObjectId) -> Vec<ObjectId> {
        self.get_object(node)
            .map(|object| object.child_ids.clone())
            .unwrap_or_default()
    }

    fn mesh_data(&self, node: ObjectId) -> Option<MeshInstance<'_>> {
        let object = self.get_object(node)?;
        let mesh_id = object.mesh_id?;

        Some(MeshInstance {
            key: mesh_id.index(),
            mesh: self.get_mesh(mesh_id)?,
            lightmap: object.lightmap,
        })
    }

    fn material_data(&self, node: ObjectId) -> Option<MaterialInstance<'_>> {
        let material_id = self.get_object(node)?.material_id?;

        Some(MaterialInstance {
            key: material_id.index(),
            material: self.get_material(material_id)?,
        })
    }

    fn light_data(&self, node: ObjectId) -> Option<&Light> {
        self.get_object(node)?.light.as_ref()
    }

    fn camera_data(&self, node: ObjectId) -> Option<&Camera> {
        self.get_object(node)?.camera.as_ref()
    }

    fn lightmap(&self, index: usize) -> Option<&TextureRef> {
        self.lightmaps.get(index)
    }

    fn environment(&self) -> Environment {
        self.environment
    }

    fn create_node(&mut self, name: &str, parent: Option<ObjectId>) -> ObjectId {
        self.spawn_child(Object3D::named(name), parent)
    }

    fn set_local_transform(&mut self, node: ObjectId, transform: Transform) {
        if let Some(object) = self.get_object_mut(node) {
            object.transform = transform;
        }
    }

    fn attach_mesh(&mut self, node: ObjectId, mesh: MeshData) {
        let mesh_id = self.add_mesh(mesh);
        if let Some(object) = self.get_object_mut(node) {
            object.mesh_id = Some(mesh_id);
        }
    }

    fn attach_material(&mut self, node: ObjectId, material: MaterialData) {
        let material_id = self.add_material(material);
        if let Some(object) = self.get_object_mut(node) {
            object.material_id = Some(material_id);
        }
    }

    fn attach_light(&mut self, node: ObjectId, light: Light) {
        if let Some(object) = self.get_object_mut(node) {
            object.light = Some(light);
        }
    }

    fn attach_camera(&mut self, node: ObjectId, camera: Camera) {
        if let Some(object) = self.get_object_mut(node) {
            object.camera = Some(camera);
        }
    }

    fn set_environment(&mut self, environment: Environment) {
        self.environment = environment;
    }

    fn instantiate(&mut self, source: ObjectId, parent: Option<ObjectId>) -> ObjectId {
        self.instantiate_subtree(source, parent)
    }
}

#[cfg(test)]
mod tests {
    use glam::{Quat, Vec3};

    use super::*;

    fn triangle() -> MeshData {
        MeshData::new(
            "Tri",
            vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            vec![0, 1, 2],
        )
    }

    #[test]
    fn new_scene_is_empty() {
        let scene = Scene::new("Empty");

        assert_eq!(scene.objects.len(), 0);
        assert_eq!(scene.meshes.len(), 0);
        assert!(scene.root_objects().is_empty());
        assert!(scene.world_bounds().is_none());
    }

    #[test]
    fn create_node_links_parent_and_child() {
        let mut scene = Scene::new("Tree");
        let root = scene.create_node("Root", None);
        let child = scene.create_node("Child", Some(root));

        assert_eq!(scene.roots(), vec![root]);
        assert_eq!(SceneHost::children(&scene, root), vec![child]);

        let child_object = scene.get_object(child).unwrap();
        assert_eq!(child_object.parent(&scene).unwrap().name, "Root");
        assert_eq!(scene.get_object_by_name("Child"), Some(child));
    }

    #[test]
    fn reparenting_removes_from_old_parent() {
        let mut scene = Scene::new("Tree");
        let a = scene.create_node("A", None);
        let b = scene.create_node("B", None);
        let child = scene.create_node("Child", Some(a));

        scene.set_object_parent(child, Some(b));

        assert!(scene.get_object(a).unwrap().child_ids.is_empty());
        assert_eq!(scene.get_object(b).unwrap().child_ids, vec![child]);
    }

    #[test]
    fn world_matrix_accumulates_parents() {
        let mut scene = Scene::new("Tree");
        let root = scene.create_node("Root", None);
        scene.set_local_transform(root, Transform::from_translation(Vec3::X));
        let child = scene.create_node("Child", Some(root));
        scene.set_local_transform(
            child,
            Transform::from_trs(Vec3::Y, Quat::IDENTITY, Vec3::splat(2.0)),
        );

        let origin = scene.world_matrix(child).transform_point3(Vec3::ZERO);
        assert!(origin.abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), 1e-6));
    }

    #[test]
    fn attached_payloads_are_visible_through_host_interface() {
        let mut scene = Scene::new("Payloads");
        let node = scene.create_node("Tri", None);
        scene.attach_mesh(node, triangle());
        scene.attach_material(node, MaterialData::new("Red"));
        scene.attach_light(node, Light::new("Sun", crate::scene_graph::LightKind::Directional));

        let mesh = scene.mesh_data(node).unwrap();
        assert_eq!(mesh.mesh.triangle_count(), 1);
        assert!(mesh.lightmap.is_none());
        assert_eq!(scene.material_data(node).unwrap().material.name, "Red");
        assert_eq!(scene.light_data(node).unwrap().name, "Sun");
        assert!(scene.camera_data(node).is_none());
    }

    #[test]
    fn instantiate_copies_subtree_and_shares_meshes() {
        let mut scene = Scene::new("Instances");
        let original = scene.create_node("Original", None);
        let leaf = scene.create_node("Leaf", Some(original));
        scene.attach_mesh(leaf, triangle());
        let holder = scene.create_node("Holder", None);

        let copy = scene.instantiate(original, Some(holder));

        assert_ne!(copy, original);
        assert_eq!(scene.node_name(copy), "Original");
        let copied_leaf = SceneHost::children(&scene, copy)[0];
        assert_ne!(copied_leaf, leaf);
        assert_eq!(
            scene.get_object(copied_leaf).unwrap().mesh_id,
            scene.get_object(leaf).unwrap().mesh_id
        );
        assert_eq!(scene.meshes.len(), 1);
        assert_eq!(scene.objects.len(), 5);
    }

    #[test]
    fn world_bounds_cover_transformed_meshes() {
        let mut scene = Scene::new("Bounds");
        let node = scene.create_node("Tri", None);
        scene.attach_mesh(node, triangle());
        scene.set_local_transform(node, Transform::from_translation(Vec3::new(0.0, 0.0, 5.0)));

        let bounds = scene.world_bounds().unwrap();
        assert!(bounds.min.abs_diff_eq(Vec3::new(0.0, 0.0, 5.0), 1e-6));
        assert!(bounds.max.abs_diff_eq(Vec3::new(1.0, 1.0, 5.0), 1e-6));
    }
}
