use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use glam::{Quat, Vec2, Vec3, Vec4};
use gltf::camera::Projection;
use gltf::image::Source;
use gltf::khr_lights_punctual::Kind;

use crate::scene_graph::{
    Camera, Light, LightKind, MaterialData, MaterialId, MeshData, MeshId, Object3D, ObjectId,
    Scene, TextureRef, Transform,
};

/// Loads the default scene of a `.gltf`/`.glb` file. Images with a file URI
/// are referenced by path; embedded images are carried as pixels.
pub fn load_gltf(path: &Path) -> anyhow::Result<Scene> {
    let (document, buffers, images) =
        gltf::import(path).with_context(|| format!("Failed to load {}", path.display()))?;

    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| String::from("Scene"));

    GltfLoader::new(name, &buffers, &images, path.parent())
        .load(&document)
}

/// Loads a self-contained glTF (embedded buffers and images) from memory.
pub fn load_gltf_slice(data: &[u8], name: &str) -> anyhow::Result<Scene> {
    let (document, buffers, images) = gltf::import_slice(data)?;
    GltfLoader::new(name.to_string(), &buffers, &images, None).load(&document)
}

struct GltfLoader<'a> {
    scene: Scene,
    buffers: &'a [gltf::buffer::Data],
    images: &'a [gltf::image::Data],
    base_dir: Option<PathBuf>,
    meshes_by_primitive: HashMap<(usize, usize), MeshId>,
    materials_by_gltf: HashMap<Option<usize>, MaterialId>,
}

impl<'a> GltfLoader<'a> {
    fn new(
        name: String,
        buffers: &'a [gltf::buffer::Data],
        images: &'a [gltf::image::Data],
        base_dir: Option<&Path>,
    ) -> Self {
        Self {
            scene: Scene::new(name),
            buffers,
            images,
            base_dir: base_dir.map(Path::to_path_buf),
            meshes_by_primitive: HashMap::new(),
            materials_by_gltf: HashMap::new(),
        }
    }

    fn load(mut self, document: &gltf::Document) -> anyhow::Result<Scene> {
        let gltf_scene = document
            .default_scene()
            .or_else(|| document.scenes().next())
            .context("No scenes in gltf")?;

        if let Some(name) = gltf_scene.name() {
            self.scene.name = name.to_string();
        }

        for node in gltf_scene.nodes() {
            self.spawn_node(&node, None)?;
        }

        log::info!(
            "Loaded glTF scene {}: {} objects, {} meshes, {} materials",
            self.scene.name,
            self.scene.objects.len(),
            self.scene.meshes.len(),
            self.scene.materials.len()
        );

        Ok(self.scene)
    }

    fn spawn_node(&mut self, node: &gltf::Node, parent: Option<ObjectId>) -> anyhow::Result<()> {
        let name = node
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("Node_{}", node.index()));

        let (translation, rotation, scale) = node.transform().decomposed();
        let mut object = Object3D::named(name.clone());
        object.transform = Transform::from_trs(
            to_host_vector(Vec3::from(translation)),
            to_host_rotation(Quat::from_array(rotation)),
            Vec3::from(scale),
        );
        object.light = node.light().map(|light| convert_light(&name, &light));
        object.camera = node.camera().and_then(|camera| convert_camera(&camera));

        let object_id = self.scene.spawn_child(object, parent);

        if let Some(mesh) = node.mesh() {
            self.attach_primitives(object_id, &name, &mesh)?;
        }

        for child in node.children() {
            self.spawn_node(&child, Some(object_id))?;
        }

        Ok(())
    }

    /// The first primitive lives on the node itself; further primitives get
    /// one child node each.
    fn attach_primitives(
        &mut self,
        object_id: ObjectId,
        node_name: &str,
        mesh: &gltf::Mesh,
    ) -> anyhow::Result<()> {
        let mesh_name = mesh.name().unwrap_or(node_name);
        let mut target = Some(object_id);

        for (k, primitive) in mesh.primitives().enumerate() {
            let Some(mesh_id) = self.load_primitive(mesh, &primitive, mesh_name)? else {
                continue;
            };
            let material_id = self.load_material(&primitive.material());

            let target_id = match target.take() {
                Some(id) => id,
                None => self
                    .scene
                    .spawn_child(Object3D::named(format!("{}_{}", node_name, k)), Some(object_id)),
            };

            if let Some(object) = self.scene.get_object_mut(target_id) {
                object.mesh_id = Some(mesh_id);
                object.material_id = Some(material_id);
            }
        }

        Ok(())
    }

    fn load_primitive(
        &mut self,
        mesh: &gltf::Mesh,
        primitive: &gltf::Primitive,
        mesh_name: &str,
    ) -> anyhow::Result<Option<MeshId>> {
        let key = (mesh.index(), primitive.index());
        if let Some(&mesh_id) = self.meshes_by_primitive.get(&key) {
            return Ok(Some(mesh_id));
        }

        if primitive.mode() != gltf::mesh::Mode::Triangles {
            log::warn!(
                "Skipping unsupported primitive mode {:?} in mesh {}",
                primitive.mode(),
                mesh_name
            );
            return Ok(None);
        }

        let name = if primitive.index() == 0 {
            mesh_name.to_string()
        } else {
            format!("{}_{}", mesh_name, primitive.index())
        };

        let data = mesh_from_primitive(name, primitive, self.buffers)?;
        let mesh_id = self.scene.add_mesh(data);
        self.meshes_by_primitive.insert(key, mesh_id);

        Ok(Some(mesh_id))
    }

    fn load_material(&mut self, material: &gltf::Material) -> MaterialId {
        let key = material.index();
        if let Some(&id) = self.materials_by_gltf.get(&key) {
            return id;
        }

        let name = material
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| match key {
                Some(index) => format!("Material_{}", index),
                None => String::from("Default"),
            });

        let pbr = material.pbr_metallic_roughness();
        let base_color = Vec4::from(pbr.base_color_factor());

        let mut data = MaterialData::new(name);
        data.base_color = base_color.truncate();
        data.metalness = pbr.metallic_factor();
        data.smoothness = 1.0 - pbr.roughness_factor();
        data.emissive = Vec3::from(material.emissive_factor());
        data.albedo_texture = pbr
            .base_color_texture()
            .and_then(|info| self.texture_ref(&info.texture()));
        data.metallic_gloss_texture = pbr
            .metallic_roughness_texture()
            .and_then(|info| self.texture_ref(&info.texture()));
        data.normal_texture = material
            .normal_texture()
            .and_then(|normal| self.texture_ref(&normal.texture()));
        data.emissive_texture = material
            .emissive_texture()
            .and_then(|info| self.texture_ref(&info.texture()));

        let id = self.scene.add_material(data);
        self.materials_by_gltf.insert(key, id);
        id
    }

    fn texture_ref(&self, texture: &gltf::Texture) -> Option<TextureRef> {
        let image = texture.source();

        if let (Source::Uri { uri, .. }, Some(base)) = (image.source(), &self.base_dir) {
            if !uri.starts_with("data:") {
                return Some(TextureRef::File(base.join(uri)));
            }
        }

        let name = image
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("Image_{}", image.index()));
        let data = self.images.get(image.index())?;
        let pixels = rgba_pixels(data, &name)?;

        Some(TextureRef::Pixels {
            name,
            width: data.width,
            height: data.height,
            pixels,
        })
    }
}

fn mesh_from_primitive(
    name: String,
    primitive: &gltf::Primitive,
    buffers: &[gltf::buffer::Data],
) -> anyhow::Result<MeshData> {
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| &data[..]));

    let positions: Vec<Vec3> = reader
        .read_positions()
        .with_context(|| format!("Mesh {} has no positions", name))?
        .map(|position| to_host_vector(Vec3::from(position)))
        .collect();

    let mut indices: Vec<u32> = match reader.read_indices() {
        Some(indices) => indices.into_u32().collect(),
        None => (0..positions.len() as u32).collect(),
    };
    flip_winding(&mut indices);

    let mut mesh = MeshData::new(name, positions, indices);
    mesh.normals = reader
        .read_normals()
        .map(|normals| normals.map(|normal| to_host_vector(Vec3::from(normal))).collect());
    mesh.uv = reader
        .read_tex_coords(0)
        .map(|uvs| uvs.into_f32().map(to_host_uv).collect());
    mesh.uv2 = reader
        .read_tex_coords(1)
        .map(|uvs| uvs.into_f32().map(to_host_uv).collect());
    mesh.colors = reader
        .read_colors(0)
        .map(|colors| colors.into_rgba_f32().map(Vec4::from).collect());

    mesh.validate()
        .map_err(|reason| anyhow::anyhow!("Mesh {}: {}", mesh.name, reason))?;

    Ok(mesh)
}

fn convert_light(node_name: &str, light: &gltf::khr_lights_punctual::Light) -> Light {
    let kind = match light.kind() {
        Kind::Directional => LightKind::Directional,
        Kind::Point => LightKind::Point,
        Kind::Spot { .. } => LightKind::Spot,
    };

    let mut converted = Light::new(light.name().unwrap_or(node_name), kind);
    converted.color = Vec3::from(light.color());
    converted.intensity = light.intensity();
    if let Some(range) = light.range() {
        converted.range = range;
    }
    if let Kind::Spot {
        outer_cone_angle, ..
    } = light.kind()
    {
        converted.spot_angle = (outer_cone_angle * 2.0).to_degrees();
    }

    converted
}

fn convert_camera(camera: &gltf::Camera) -> Option<Camera> {
    let Projection::Perspective(perspective) = camera.projection() else {
        log::warn!(
            "Skipping orthographic camera {}",
            camera.name().unwrap_or("unnamed")
        );
        return None;
    };

    let mut converted = Camera::new(camera.name().unwrap_or("Camera"));
    converted.fov_y_degrees = perspective.yfov().to_degrees();
    converted.near = perspective.znear();
    if let Some(far) = perspective.zfar() {
        converted.far = far;
    }

    Some(converted)
}

/// glTF is right-handed; the scene graph uses a left-handed frame with +Z
/// forward, so depth is mirrored.
fn to_host_vector(v: Vec3) -> Vec3 {
    Vec3::new(v.x, v.y, -v.z)
}

fn to_host_rotation(q: Quat) -> Quat {
    Quat::from_xyzw(-q.x, -q.y, q.z, q.w)
}

/// glTF puts the texture origin top left.
fn to_host_uv(uv: [f32; 2]) -> Vec2 {
    Vec2::new(uv[0], 1.0 - uv[1])
}

fn flip_winding(indices: &mut [u32]) {
    for triangle in indices.chunks_exact_mut(3) {
        triangle.swap(1, 2);
    }
}

fn rgba_pixels(data: &gltf::image::Data, name: &str) -> Option<Vec<u8>> {
    match data.format {
        gltf::image::Format::R8G8B8A8 => Some(data.pixels.clone()),
        gltf::image::Format::R8G8B8 => {
            let mut rgba = Vec::with_capacity(data.pixels.len() / 3 * 4);
            for pixel in data.pixels.chunks_exact(3) {
                rgba.extend_from_slice(pixel);
                rgba.push(255);
            }
            Some(rgba)
        }
        format => {
            log::warn!("Skipping image {} with unsupported format {:?}", name, format);
            None
        }
    }
}
