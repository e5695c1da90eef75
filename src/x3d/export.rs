use std::f32::consts::PI;

use glam::{Quat, Vec3};

use crate::config::ExchangeConfig;
use crate::error::{Diagnostics, X3dError};
use crate::scene_graph::{
    Camera, Environment, Light, LightKind, LightmapPlacement, MaterialData, MaterialInstance,
    MeshInstance, SceneHost, TextureRef,
};
use crate::x3d::def_use::DefUseRegistry;
use crate::x3d::document::Element;
use crate::x3d::geometry::encode_indexed_face_set;
use crate::x3d::material::{encode_appearance, TextureUrls};
use crate::x3d::numeric;
use crate::x3d::texture_store::{lightmap_file_name, TextureStore};
use crate::x3d::transform::{encode_rotation, handedness_root, write_transform};

/// X3D viewpoints look down local -Z; host cameras look down local +Z.
pub fn viewpoint_flip() -> Quat {
    Quat::from_rotation_y(PI)
}

/// Lights shine along the owning node's forward axis.
pub const LIGHT_DIRECTION: Vec3 = Vec3::Z;

/// What a minted identifier names. Shapes and appearances carry the keys of
/// their shared resources so a repeat can be written as `USE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExportedObject {
    Transform,
    Viewpoint,
    Light,
    Shape {
        mesh: usize,
        material: Option<usize>,
    },
    Appearance {
        material: usize,
    },
    /// A lightmapped shape or appearance. Never reused.
    Instance,
}

pub struct ExportOutcome {
    pub document: Element,
    pub diagnostics: Diagnostics,
}

struct ExportContext<'a, H: SceneHost> {
    host: &'a H,
    config: &'a ExchangeConfig,
    textures: &'a mut dyn TextureStore,
    registry: DefUseRegistry<ExportedObject>,
    diagnostics: Diagnostics,
    environment: Environment,
}

/// Builds the document for the hierarchies under `roots`.
///
/// Per-node problems end up in the returned diagnostics; only I/O failures
/// while externalizing textures abort the export.
pub fn export_scene<H: SceneHost>(
    host: &H,
    roots: &[H::NodeId],
    config: &ExchangeConfig,
    textures: &mut dyn TextureStore,
) -> Result<ExportOutcome, X3dError> {
    let mut context = ExportContext {
        host,
        config,
        textures,
        registry: DefUseRegistry::new(),
        diagnostics: Diagnostics::new(),
        environment: host.environment(),
    };

    let mut scene = Element::new("Scene");
    scene.push(
        Element::new("NavigationInfo").with_attr("headlight", numeric::encode_bool(config.headlight)),
    );
    scene.push(
        Element::new("Background")
            .with_attr("skyColor", numeric::encode_vec3(context.environment.ambient_sky_color)),
    );

    let mut hierarchy = handedness_root();
    for &root in roots {
        hierarchy.push(context.export_node(root)?);
    }
    scene.push(hierarchy);

    log::info!(
        "Exported {} nodes from {} with {} identifiers",
        roots.len(),
        host.scene_name(),
        context.registry.len()
    );

    Ok(ExportOutcome {
        document: Element::new("X3D")
            .with_attr("profile", "Immersive")
            .with_attr("version", "3.3")
            .with_child(scene),
        diagnostics: context.diagnostics,
    })
}

impl<H: SceneHost> ExportContext<'_, H> {
    fn export_node(&mut self, node: H::NodeId) -> Result<Element, X3dError> {
        let host = self.host;
        let def = self.registry.mint(host.node_name(node), ExportedObject::Transform);

        let mut element = Element::new("Transform").with_attr("DEF", def);
        write_transform(&mut element, &host.local_transform(node));

        if let Some(camera) = host.camera_data(node) {
            element.push(self.export_viewpoint(camera));
        }

        if let Some(light) = host.light_data(node) {
            element.push(self.export_light(light));
        }

        if let Some(mesh) = host.mesh_data(node) {
            element.push(self.export_shape(mesh, host.material_data(node))?);
        }

        for child in host.children(node) {
            element.push(self.export_node(child)?);
        }

        Ok(element)
    }

    fn export_viewpoint(&mut self, camera: &Camera) -> Element {
        let def = self.registry.mint(&camera.name, ExportedObject::Viewpoint);

        Element::new("Viewpoint")
            .with_attr("DEF", def)
            .with_attr("position", numeric::encode_vec3(Vec3::ZERO))
            .with_attr("orientation", encode_rotation(viewpoint_flip()))
            .with_attr("fieldOfView", numeric::encode_scalar(camera.fov_y_degrees.to_radians()))
            .with_attr("zNear", numeric::encode_scalar(camera.near))
            .with_attr("zFar", numeric::encode_scalar(camera.far))
    }

    fn export_light(&mut self, light: &Light) -> Element {
        let def = self.registry.mint(&light.name, ExportedObject::Light);
        let node_name = match light.kind {
            LightKind::Point => "PointLight",
            LightKind::Spot => "SpotLight",
            LightKind::Directional => "DirectionalLight",
        };

        let mut element = Element::new(node_name).with_attr("DEF", def);

        if light.baked && self.config.baked_lights_ambient {
            element.set_attr("ambientIntensity", numeric::encode_scalar(light.intensity));
            element.set_attr("intensity", numeric::encode_scalar(0.0));
        } else {
            element.set_attr("intensity", numeric::encode_scalar(light.intensity));
        }
        element.set_attr("color", numeric::encode_vec3(light.color));

        match light.kind {
            LightKind::Spot => {
                element.set_attr("direction", numeric::encode_vec3(LIGHT_DIRECTION));
                element.set_attr(
                    "cutOffAngle",
                    numeric::encode_scalar((light.spot_angle * 0.5).to_radians()),
                );
                element.set_attr("radius", numeric::encode_scalar(light.range));
            }
            LightKind::Point => {
                element.set_attr("radius", numeric::encode_scalar(light.range));
            }
            LightKind::Directional => {
                element.set_attr("direction", numeric::encode_vec3(LIGHT_DIRECTION));
            }
        }

        element
    }

    fn export_shape(
        &mut self,
        mesh: MeshInstance<'_>,
        material: Option<MaterialInstance<'_>>,
    ) -> Result<Element, X3dError> {
        let lightmap = match (mesh.lightmap, material) {
            (Some(placement), Some(_)) if self.config.export_lightmaps => {
                self.export_lightmap(placement)?.map(|url| (placement, url))
            }
            _ => None,
        };

        let shared = ExportedObject::Shape {
            mesh: mesh.key,
            material: material.map(|material| material.key),
        };

        let mut shape = Element::new("Shape");
        if lightmap.is_none() {
            if let Some(name) = self.registry.find_name(&shared) {
                return Ok(shape.with_attr("USE", name));
            }
            shape.set_attr("DEF", self.registry.mint(&mesh.mesh.name, shared));
        } else {
            shape.set_attr("DEF", self.registry.mint(&mesh.mesh.name, ExportedObject::Instance));
        }

        if let Some(material) = material {
            let lightmap_url = lightmap.as_ref().map(|(_, url)| url.clone());
            shape.push(self.export_appearance(material, lightmap_url)?);
        }

        let placement = lightmap.map(|(placement, _)| placement);
        shape.push(encode_indexed_face_set(mesh.mesh, placement.as_ref()));

        Ok(shape)
    }

    fn export_appearance(
        &mut self,
        material: MaterialInstance<'_>,
        lightmap_url: Option<String>,
    ) -> Result<Element, X3dError> {
        let shared = ExportedObject::Appearance {
            material: material.key,
        };

        if lightmap_url.is_none() {
            if let Some(name) = self.registry.find_name(&shared) {
                return Ok(Element::new("Appearance").with_attr("USE", name));
            }
        }

        let mut urls = self.texture_urls(material.material)?;
        let identity = match lightmap_url {
            Some(_) => ExportedObject::Instance,
            None => shared,
        };
        urls.lightmap = lightmap_url;

        let def = self.registry.mint(&material.material.name, identity);
        let appearance = encode_appearance(
            material.material,
            &urls,
            self.config.material_dialect,
            self.environment.ambient_intensity,
            &mut self.diagnostics,
        );

        Ok(Element {
            attributes: vec![(String::from("DEF"), def)],
            ..appearance
        })
    }

    fn texture_urls(&mut self, material: &MaterialData) -> Result<TextureUrls, X3dError> {
        Ok(TextureUrls {
            albedo: self.export_texture(material.albedo_texture.as_ref())?,
            metallic_gloss: self.export_texture(material.metallic_gloss_texture.as_ref())?,
            normal: self.export_texture(material.normal_texture.as_ref())?,
            emissive: self.export_texture(material.emissive_texture.as_ref())?,
            lightmap: None,
        })
    }

    fn export_texture(
        &mut self,
        texture: Option<&TextureRef>,
    ) -> Result<Option<String>, X3dError> {
        let Some(texture) = texture else {
            return Ok(None);
        };

        let result = self.textures.export_texture(texture);
        self.recover(result)
    }

    fn export_lightmap(&mut self, placement: LightmapPlacement) -> Result<Option<String>, X3dError> {
        let Some(source) = self.host.lightmap(placement.index) else {
            self.diagnostics.push(X3dError::MissingResource(
                format!("lightmap {}", placement.index).into(),
            ));
            return Ok(None);
        };

        let format = self.config.lightmap_format;
        let file_name = lightmap_file_name(self.host.scene_name(), placement.index, format);
        let result = self.textures.export_lightmap(source, &file_name, format);
        self.recover(result)
    }

    /// Fatal errors propagate; the rest become diagnostics.
    fn recover<T>(&mut self, result: Result<T, X3dError>) -> Result<Option<T>, X3dError> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(error) if error.is_fatal() => Err(error),
            Err(error) => {
                self.diagnostics.push(error);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use glam::Vec4;

    use super::*;
    use crate::config::{LightmapFormat, MaterialDialect};
    use crate::scene_graph::{MeshData, Object3D, Scene, ShaderKind, Transform};

    /// Records what was asked of it instead of touching the filesystem.
    #[derive(Default)]
    struct RecordingStore {
        textures: Vec<String>,
        lightmaps: Vec<String>,
    }

    impl TextureStore for RecordingStore {
        fn export_texture(&mut self, texture: &TextureRef) -> Result<String, X3dError> {
            match texture {
                TextureRef::File(path) if !path.starts_with("missing") => {
                    let url = texture.name();
                    self.textures.push(url.clone());
                    Ok(url)
                }
                TextureRef::File(path) => Err(X3dError::MissingResource(path.clone())),
                TextureRef::Pixels { name, .. } => Ok(format!("{}.png", name)),
            }
        }

        fn export_lightmap(
            &mut self,
            _source: &TextureRef,
            file_name: &str,
            _format: LightmapFormat,
        ) -> Result<String, X3dError> {
            self.lightmaps.push(file_name.to_string());
            Ok(file_name.to_string())
        }

        fn resolve_texture(&self, url: &str) -> Result<TextureRef, X3dError> {
            Ok(TextureRef::File(PathBuf::from(url)))
        }
    }

    fn triangle(name: &str) -> MeshData {
        MeshData::new(
            name,
            vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            vec![0, 1, 2],
        )
    }

    fn export(scene: &Scene, config: &ExchangeConfig) -> (ExportOutcome, RecordingStore) {
        let mut store = RecordingStore::default();
        let outcome = export_scene(scene, &scene.root_objects(), config, &mut store).unwrap();
        (outcome, store)
    }

    fn hierarchy(outcome: &ExportOutcome) -> &Element {
        let scene = outcome.document.scene().unwrap();
        scene.child("Transform").unwrap()
    }

    #[test]
    fn document_layout() {
        let mut scene = Scene::new("Empty");
        scene.environment.ambient_sky_color = Vec3::new(0.5, 0.25, 1.0);
        scene.spawn_child(Object3D::named("Root"), None);

        let config = ExchangeConfig {
            headlight: false,
            ..Default::default()
        };
        let (outcome, _) = export(&scene, &config);
        let document_scene = outcome.document.scene().unwrap();

        let names: Vec<_> = document_scene.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["NavigationInfo", "Background", "Transform"]);
        assert_eq!(document_scene.children[0].attr("headlight"), Some("FALSE"));
        assert_eq!(document_scene.children[1].attr("skyColor"), Some("0.5 0.25 1"));

        let wrapper = hierarchy(&outcome);
        assert_eq!(wrapper.attr("scale"), Some("1 1 -1"));
        assert_eq!(wrapper.children[0].def(), Some("Root"));
        assert_eq!(wrapper.children[0].attributes[0].0, "DEF");
    }

    #[test]
    fn shared_mesh_and_material_are_written_once() {
        let mut scene = Scene::new("Shared");
        let mesh = scene.add_mesh(triangle("Crate"));
        let material = scene.add_material(MaterialData::new("Wood"));
        for name in ["A", "B"] {
            scene.spawn_child(
                Object3D {
                    mesh_id: Some(mesh),
                    material_id: Some(material),
                    ..Object3D::named(name)
                },
                None,
            );
        }

        let (outcome, _) = export(&scene, &ExchangeConfig::default());
        let wrapper = hierarchy(&outcome);

        let first = wrapper.children[0].child("Shape").unwrap();
        let second = wrapper.children[1].child("Shape").unwrap();
        assert_eq!(first.def(), Some("Crate"));
        assert!(first.child("IndexedFaceSet").is_some());
        assert_eq!(second.use_ref(), Some("Crate"));
        assert!(second.children.is_empty());
    }

    #[test]
    fn same_material_on_different_meshes_reuses_the_appearance() {
        let mut scene = Scene::new("Shared");
        let material = scene.add_material(MaterialData::new("Stone"));
        for name in ["Left", "Right"] {
            let mesh = scene.add_mesh(triangle(name));
            scene.spawn_child(
                Object3D {
                    mesh_id: Some(mesh),
                    material_id: Some(material),
                    ..Object3D::named(name)
                },
                None,
            );
        }

        let (outcome, _) = export(&scene, &ExchangeConfig::default());
        let wrapper = hierarchy(&outcome);
        let first = wrapper.children[0].child("Shape").unwrap().child("Appearance").unwrap();
        let second = wrapper.children[1].child("Shape").unwrap().child("Appearance").unwrap();

        assert_eq!(first.def(), Some("Stone"));
        assert_eq!(second.use_ref(), Some("Stone"));
    }

    #[test]
    fn lightmapped_instances_are_never_shared() {
        let mut scene = Scene::new("Baked Level");
        scene.lightmaps.push(TextureRef::File("Lightmap-0_comp_light.exr".into()));
        let mesh = scene.add_mesh(triangle("Floor"));
        let material = scene.add_material(MaterialData::new("Concrete"));
        for name in ["A", "B"] {
            scene.spawn_child(
                Object3D {
                    mesh_id: Some(mesh),
                    material_id: Some(material),
                    lightmap: Some(LightmapPlacement::new(0, Vec4::new(0.5, 0.5, 0.0, 0.0))),
                    ..Object3D::named(name)
                },
                None,
            );
        }

        let config = ExchangeConfig {
            material_dialect: MaterialDialect::Classic,
            ..Default::default()
        };
        let (outcome, store) = export(&scene, &config);
        let wrapper = hierarchy(&outcome);

        let shapes: Vec<_> = wrapper.children.iter().map(|n| n.child("Shape").unwrap()).collect();
        assert_eq!(shapes[0].def(), Some("Floor"));
        assert_eq!(shapes[1].def(), Some("Floor_1"));
        for shape in shapes {
            let layers = shape.child("Appearance").unwrap().child("MultiTexture").unwrap();
            assert_eq!(layers.children[0].attr("url"), Some("Baked_Level_Lightmap-0_comp_light.exr"));
            assert!(shape
                .child("IndexedFaceSet")
                .unwrap()
                .child("MultiTextureCoordinate")
                .is_some());
        }
        assert_eq!(store.lightmaps.len(), 2);
    }

    #[test]
    fn lightmaps_can_be_disabled() {
        let mut scene = Scene::new("Level");
        scene.lightmaps.push(TextureRef::File("lm.exr".into()));
        let mesh = scene.add_mesh(triangle("Floor"));
        let material = scene.add_material(MaterialData::new("Concrete"));
        scene.spawn_child(
            Object3D {
                mesh_id: Some(mesh),
                material_id: Some(material),
                lightmap: Some(LightmapPlacement::new(0, Vec4::new(1.0, 1.0, 0.0, 0.0))),
                ..Object3D::named("Floor")
            },
            None,
        );

        let config = ExchangeConfig {
            export_lightmaps: false,
            ..Default::default()
        };
        let (outcome, store) = export(&scene, &config);
        let shape = hierarchy(&outcome).children[0].child("Shape").unwrap();

        assert!(store.lightmaps.is_empty());
        assert!(shape.child("IndexedFaceSet").unwrap().child("MultiTextureCoordinate").is_none());
    }

    #[test]
    fn missing_lightmap_atlas_is_a_diagnostic() {
        let mut scene = Scene::new("Level");
        let mesh = scene.add_mesh(triangle("Floor"));
        let material = scene.add_material(MaterialData::new("Concrete"));
        scene.spawn_child(
            Object3D {
                mesh_id: Some(mesh),
                material_id: Some(material),
                lightmap: Some(LightmapPlacement::new(3, Vec4::new(1.0, 1.0, 0.0, 0.0))),
                ..Object3D::named("Floor")
            },
            None,
        );

        let (outcome, _) = export(&scene, &ExchangeConfig::default());
        assert_eq!(outcome.diagnostics.len(), 1);
        let shape = hierarchy(&outcome).children[0].child("Shape").unwrap();
        assert!(shape.child("IndexedFaceSet").unwrap().child("MultiTextureCoordinate").is_none());
    }

    #[test]
    fn missing_textures_are_dropped_with_a_diagnostic() {
        let mut scene = Scene::new("Level");
        let mesh = scene.add_mesh(triangle("Floor"));
        let material = scene.add_material(MaterialData {
            albedo_texture: Some(TextureRef::File("missing/albedo.png".into())),
            normal_texture: Some(TextureRef::File("textures/normal.png".into())),
            ..MaterialData::new("Concrete")
        });
        scene.spawn_child(
            Object3D {
                mesh_id: Some(mesh),
                material_id: Some(material),
                ..Object3D::named("Floor")
            },
            None,
        );

        let (outcome, store) = export(&scene, &ExchangeConfig::default());
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(store.textures, ["normal.png"]);

        let shader = hierarchy(&outcome).children[0]
            .child("Shape")
            .unwrap()
            .child("Appearance")
            .unwrap()
            .child("CommonSurfaceShader")
            .unwrap();
        assert_eq!(shader.children.len(), 1);
        assert_eq!(shader.children[0].attr("containerField"), Some("normalTexture"));
    }

    #[test]
    fn lights_carry_kind_specific_attributes() {
        let mut scene = Scene::new("Lights");
        let mut spot = Light::new("Spot", LightKind::Spot);
        spot.spot_angle = 60.0;
        spot.range = 5.0;
        let mut baked = Light::new("Sun", LightKind::Directional);
        baked.baked = true;
        baked.intensity = 0.75;

        for light in [spot, baked, Light::new("Bulb", LightKind::Point)] {
            scene.spawn_child(
                Object3D {
                    light: Some(light.clone()),
                    ..Object3D::named(&light.name)
                },
                None,
            );
        }

        let (outcome, _) = export(&scene, &ExchangeConfig::default());
        let wrapper = hierarchy(&outcome);

        let spot = wrapper.children[0].child("SpotLight").unwrap();
        assert_eq!(spot.def(), Some("Spot_1"));
        let cut_off: f32 = spot.attr("cutOffAngle").unwrap().parse().unwrap();
        assert!((cut_off - 30f32.to_radians()).abs() < 1e-6);
        assert_eq!(spot.attr("radius"), Some("5"));

        let sun = wrapper.children[1].child("DirectionalLight").unwrap();
        assert_eq!(sun.attr("ambientIntensity"), Some("0.75"));
        assert_eq!(sun.attr("intensity"), Some("0"));
        assert_eq!(sun.attr("radius"), None);

        let bulb = wrapper.children[2].child("PointLight").unwrap();
        assert_eq!(bulb.attr("intensity"), Some("1"));
        assert_eq!(bulb.attr("radius"), Some("10"));
        assert_eq!(bulb.attr("cutOffAngle"), None);
    }

    #[test]
    fn viewpoint_is_written_in_the_node_frame() {
        let mut scene = Scene::new("Cameras");
        let mut camera = Camera::new("Main Camera");
        camera.fov_y_degrees = 90.0;
        scene.spawn_child(
            Object3D {
                camera: Some(camera),
                transform: Transform::from_translation(Vec3::new(0.0, 1.0, -10.0)),
                ..Object3D::named("Main Camera")
            },
            None,
        );

        let (outcome, _) = export(&scene, &ExchangeConfig::default());
        let node = &hierarchy(&outcome).children[0];
        assert_eq!(node.def(), Some("Main_Camera"));
        assert_eq!(node.attr("translation"), Some("0 1 -10"));

        let viewpoint = node.child("Viewpoint").unwrap();
        assert_eq!(viewpoint.def(), Some("Main_Camera_1"));
        assert_eq!(viewpoint.attr("position"), Some("0 0 0"));
        let fov: f32 = viewpoint.attr("fieldOfView").unwrap().parse().unwrap();
        assert!((fov - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn unsupported_shader_is_reported_and_shape_still_written() {
        let mut scene = Scene::new("Toon");
        let mesh = scene.add_mesh(triangle("Mesh"));
        let material = scene.add_material(MaterialData {
            shader: ShaderKind::Other("Toon".into()),
            ..MaterialData::new("Toon")
        });
        scene.spawn_child(
            Object3D {
                mesh_id: Some(mesh),
                material_id: Some(material),
                ..Object3D::named("Node")
            },
            None,
        );

        let (outcome, _) = export(&scene, &ExchangeConfig::default());
        let shape = hierarchy(&outcome).children[0].child("Shape").unwrap();

        assert!(shape.child("Appearance").unwrap().children.is_empty());
        assert!(shape.child("IndexedFaceSet").is_some());
        assert!(matches!(
            outcome.diagnostics.iter().next(),
            Some(X3dError::UnsupportedMaterial(_))
        ));
    }
}
