use glam::{Quat, Vec3};

use crate::error::{Diagnostics, X3dError};
use crate::scene_graph::{Camera, Environment, Light, LightKind, MaterialData, MeshData, SceneHost, Transform};
use crate::x3d::def_use::DefUseRegistry;
use crate::x3d::document::Element;
use crate::x3d::export::{viewpoint_flip, LIGHT_DIRECTION};
use crate::x3d::geometry::decode_indexed_face_set;
use crate::x3d::material::decode_appearance;
use crate::x3d::numeric;
use crate::x3d::texture_store::TextureStore;
use crate::x3d::transform::{decode_orientation, decode_scale, decode_translation};

/// X3D's default `Viewpoint` position.
const DEFAULT_VIEWPOINT_POSITION: Vec3 = Vec3::new(0.0, 0.0, 10.0);
const DEFAULT_FIELD_OF_VIEW: f32 = std::f32::consts::FRAC_PI_4;
const DEFAULT_CUT_OFF_ANGLE: f32 = std::f32::consts::FRAC_PI_2;

/// What a `DEF` read from the document refers to.
#[derive(Debug, Clone)]
enum Imported<N> {
    Nodes(Vec<N>),
    Material(MaterialData),
    Geometry(Vec<MeshData>),
    Light(Light),
    Camera(Camera),
}

pub struct ImportOutcome<N> {
    /// Nodes created directly under the document's `Scene`.
    pub roots: Vec<N>,
    pub diagnostics: Diagnostics,
}

struct ImportContext<'a, H: SceneHost> {
    host: &'a mut H,
    textures: &'a dyn TextureStore,
    registry: DefUseRegistry<Imported<H::NodeId>>,
    diagnostics: Diagnostics,
    environment: Environment,
}

/// Creates host nodes for everything under the document's `Scene`.
///
/// Elements that fail to decode are skipped and reported in the outcome's
/// diagnostics; the rest of the document still imports.
pub fn import_document<H: SceneHost>(
    host: &mut H,
    root: &Element,
    textures: &dyn TextureStore,
) -> Result<ImportOutcome<H::NodeId>, X3dError> {
    let scene = root
        .scene()
        .ok_or_else(|| X3dError::Xml(format!("<{}> has no <Scene>", root.name)))?;

    let environment = host.environment();
    let mut context = ImportContext {
        host,
        textures,
        registry: DefUseRegistry::new(),
        diagnostics: Diagnostics::new(),
        environment,
    };

    let mut roots = Vec::new();
    for child in &scene.children {
        roots.extend(context.import_element(child, None)?);
    }

    context.host.set_environment(context.environment);
    log::info!(
        "Imported {} root nodes, {} DEF names, {} diagnostics",
        roots.len(),
        context.registry.len(),
        context.diagnostics.len()
    );

    Ok(ImportOutcome {
        roots,
        diagnostics: context.diagnostics,
    })
}

impl<H: SceneHost> ImportContext<'_, H> {
    /// Imports one element under `parent`, returning the nodes it created
    /// directly under `parent`.
    fn import_element(
        &mut self,
        element: &Element,
        parent: Option<H::NodeId>,
    ) -> Result<Vec<H::NodeId>, X3dError> {
        let result = match element.use_ref() {
            Some(name) => Ok(self.import_use(name, parent)),
            None => self.import_definition(element, parent),
        };

        match result {
            Ok(nodes) => Ok(nodes),
            Err(error) if error.is_fatal() => Err(error),
            Err(error) => {
                self.diagnostics.push(error);
                Ok(Vec::new())
            }
        }
    }

    fn import_definition(
        &mut self,
        element: &Element,
        parent: Option<H::NodeId>,
    ) -> Result<Vec<H::NodeId>, X3dError> {
        match element.name.as_str() {
            "Transform" | "Group" => self.import_transform(element, parent),
            "Shape" => self.import_shape(element, parent),
            "PointLight" | "SpotLight" | "DirectionalLight" => self.import_light(element, parent),
            "Viewpoint" => self.import_viewpoint(element, parent),
            "NavigationInfo" => {
                let headlight = self.environment.headlight;
                self.environment.headlight = self.diagnostics.recover(
                    numeric::decode_bool(element.attr("headlight"), headlight),
                    "headlight",
                    headlight,
                );
                Ok(Vec::new())
            }
            "Background" | "SolidBackground" => {
                let attribute = if element.name == "Background" { "skyColor" } else { "color" };
                let colors = self.diagnostics.recover(
                    numeric::decode_floats(element.attr(attribute).unwrap_or_default()),
                    attribute,
                    Vec::new(),
                );
                if let [r, g, b, ..] = colors[..] {
                    self.environment.ambient_sky_color = Vec3::new(r, g, b);
                }
                Ok(Vec::new())
            }
            other => {
                log::debug!("Skipping unsupported <{}>", other);
                Ok(Vec::new())
            }
        }
    }

    fn define(&mut self, element: &Element, object: Imported<H::NodeId>) {
        if let Some(name) = element.def() {
            if self.registry.register(name, object).is_some() {
                log::warn!("DEF {:?} is defined more than once; the last one wins", name);
            }
        }
    }

    fn import_use(&mut self, name: &str, parent: Option<H::NodeId>) -> Vec<H::NodeId> {
        let Some(object) = self.registry.resolve_use(name).cloned() else {
            self.diagnostics.push(X3dError::UnresolvedReference(name.to_string()));
            return Vec::new();
        };

        match object {
            Imported::Nodes(nodes) => nodes
                .into_iter()
                .map(|node| self.host.instantiate(node, parent))
                .collect(),
            Imported::Light(light) => {
                let (node, created) = self.payload_node(parent, &light.name, Transform::IDENTITY, |host, node| {
                    host.light_data(node).is_none()
                });
                self.host.attach_light(node, light);
                created.then_some(node).into_iter().collect()
            }
            Imported::Camera(camera) => {
                let (node, created) = self.payload_node(parent, &camera.name, Transform::IDENTITY, |host, node| {
                    host.camera_data(node).is_none()
                });
                self.host.attach_camera(node, camera);
                created.then_some(node).into_iter().collect()
            }
            Imported::Material(_) | Imported::Geometry(_) => {
                log::debug!("USE {:?} outside of a Shape is ignored", name);
                Vec::new()
            }
        }
    }

    fn import_transform(
        &mut self,
        element: &Element,
        parent: Option<H::NodeId>,
    ) -> Result<Vec<H::NodeId>, X3dError> {
        let diagnostics = &mut self.diagnostics;
        let transform = Transform::from_trs(
            diagnostics.recover(decode_translation(element), "translation", Vec3::ZERO),
            diagnostics.recover(decode_orientation(element, "rotation"), "rotation", Quat::IDENTITY),
            diagnostics.recover(decode_scale(element), "scale", Vec3::ONE),
        );

        let name = element.def().unwrap_or(element.name.as_str());
        let node = self.host.create_node(name, parent);
        self.host.set_local_transform(node, transform);

        for child in &element.children {
            self.import_element(child, Some(node))?;
        }

        // Registered after the children, so a subtree cannot USE itself.
        self.define(element, Imported::Nodes(vec![node]));
        Ok(vec![node])
    }

    fn import_shape(
        &mut self,
        element: &Element,
        parent: Option<H::NodeId>,
    ) -> Result<Vec<H::NodeId>, X3dError> {
        let name = element.def().unwrap_or("Shape");

        let material = element
            .child("Appearance")
            .and_then(|appearance| self.import_appearance(appearance, name));

        // A broken geometry leaves the shape without a mesh.
        let meshes = match element.child("IndexedFaceSet") {
            Some(geometry) => match self.import_geometry(geometry, name) {
                Ok(meshes) => meshes,
                Err(error) if error.is_fatal() => return Err(error),
                Err(error) => {
                    self.diagnostics.push(error);
                    Vec::new()
                }
            },
            None => {
                if let Some(geometry) = element.children.iter().find(|child| child.name != "Appearance") {
                    log::warn!("{}: <{}> geometry is not supported", name, geometry.name);
                }
                Vec::new()
            }
        };

        let mut nodes = Vec::new();
        if meshes.is_empty() {
            let node = self.host.create_node(name, parent);
            if let Some(material) = material {
                self.host.attach_material(node, material);
            }
            nodes.push(node);
        } else {
            for mesh in meshes {
                let node = self.host.create_node(&mesh.name, parent);
                self.host.attach_mesh(node, mesh);
                if let Some(material) = &material {
                    self.host.attach_material(node, material.clone());
                }
                nodes.push(node);
            }
        }

        self.define(element, Imported::Nodes(nodes.clone()));
        Ok(nodes)
    }

    fn import_appearance(&mut self, element: &Element, shape_name: &str) -> Option<MaterialData> {
        if let Some(name) = element.use_ref() {
            return match self.registry.resolve_use(name) {
                Some(Imported::Material(material)) => Some(material.clone()),
                _ => {
                    self.diagnostics.push(X3dError::UnresolvedReference(name.to_string()));
                    None
                }
            };
        }

        let name = element
            .def()
            .or_else(|| element.child("Material").and_then(Element::def))
            .unwrap_or(shape_name);

        let textures = self.textures;
        let resolve = |url: &str| textures.resolve_texture(url);
        let decoded = decode_appearance(element, name, &resolve, &mut self.diagnostics)?;

        if let Some(ambient_intensity) = decoded.ambient_intensity {
            self.environment.ambient_intensity = ambient_intensity;
        }

        self.define(element, Imported::Material(decoded.material.clone()));
        Some(decoded.material)
    }

    fn import_geometry(&mut self, element: &Element, shape_name: &str) -> Result<Vec<MeshData>, X3dError> {
        if let Some(name) = element.use_ref() {
            return Ok(match self.registry.resolve_use(name) {
                Some(Imported::Geometry(meshes)) => meshes.clone(),
                _ => {
                    self.diagnostics.push(X3dError::UnresolvedReference(name.to_string()));
                    Vec::new()
                }
            });
        }

        let name = element.def().unwrap_or(shape_name);
        let meshes = decode_indexed_face_set(element, name, &mut self.diagnostics)?;

        self.define(element, Imported::Geometry(meshes.clone()));
        Ok(meshes)
    }

    fn import_light(
        &mut self,
        element: &Element,
        parent: Option<H::NodeId>,
    ) -> Result<Vec<H::NodeId>, X3dError> {
        let light = decode_light(element, &mut self.diagnostics);

        let location = match light.kind {
            LightKind::Directional => Vec3::ZERO,
            _ => self.diagnostics.recover(
                numeric::decode_vec3(element.attr("location"), Vec3::ZERO),
                "location",
                Vec3::ZERO,
            ),
        };

        let (node, created) = self.payload_node(
            parent,
            &light.name,
            Transform::from_translation(location),
            |host, node| host.light_data(node).is_none(),
        );
        self.host.attach_light(node, light.clone());
        self.define(element, Imported::Light(light));

        Ok(created.then_some(node).into_iter().collect())
    }

    fn import_viewpoint(
        &mut self,
        element: &Element,
        parent: Option<H::NodeId>,
    ) -> Result<Vec<H::NodeId>, X3dError> {
        let name = element.def().unwrap_or(element.name.as_str());

        let diagnostics = &mut self.diagnostics;
        let mut f32_attr = |attribute: &str, default: f32| {
            diagnostics.recover(numeric::decode_f32(element.attr(attribute), default), attribute, default)
        };

        let mut camera = Camera::new(name);
        camera.fov_y_degrees = f32_attr("fieldOfView", DEFAULT_FIELD_OF_VIEW).to_degrees();
        camera.near = f32_attr("zNear", camera.near);
        camera.far = f32_attr("zFar", camera.far);

        let position = diagnostics.recover(
            numeric::decode_vec3(element.attr("position"), DEFAULT_VIEWPOINT_POSITION),
            "position",
            DEFAULT_VIEWPOINT_POSITION,
        );
        let orientation =
            diagnostics.recover(decode_orientation(element, "orientation"), "orientation", Quat::IDENTITY);
        let transform = Transform::from_translation(position);
        let transform = Transform {
            rotation: (orientation * viewpoint_flip().inverse()).normalize(),
            ..transform
        };

        let (node, created) = self.payload_node(parent, name, transform, |host, node| {
            host.camera_data(node).is_none()
        });
        self.host.attach_camera(node, camera.clone());
        self.define(element, Imported::Camera(camera));

        Ok(created.then_some(node).into_iter().collect())
    }

    /// The node a light or camera attaches to: the enclosing node when the
    /// payload sits at its origin and the slot is free, otherwise a new child.
    fn payload_node(
        &mut self,
        parent: Option<H::NodeId>,
        name: &str,
        transform: Transform,
        slot_free: impl Fn(&H, H::NodeId) -> bool,
    ) -> (H::NodeId, bool) {
        match parent {
            Some(parent) if transform.is_identity() && slot_free(&*self.host, parent) => (parent, false),
            _ => {
                let node = self.host.create_node(name, parent);
                self.host.set_local_transform(node, transform);
                (node, true)
            }
        }
    }
}

/// Attributes that do not parse fall back to X3D's defaults.
fn decode_light(element: &Element, diagnostics: &mut Diagnostics) -> Light {
    let kind = match element.name.as_str() {
        "SpotLight" => LightKind::Spot,
        "DirectionalLight" => LightKind::Directional,
        _ => LightKind::Point,
    };
    let name = element.def().unwrap_or(element.name.as_str());

    let mut vec3_attr = |attribute: &str, default: Vec3| {
        diagnostics.recover(numeric::decode_vec3(element.attr(attribute), default), attribute, default)
    };

    let mut light = Light::new(name, kind);
    light.color = vec3_attr("color", Vec3::ONE);
    let direction = match kind {
        LightKind::Point => None,
        _ => Some(vec3_attr("direction", Vec3::NEG_Z)),
    };

    let mut f32_attr = |attribute: &str, default: f32| {
        diagnostics.recover(numeric::decode_f32(element.attr(attribute), default), attribute, default)
    };

    let intensity = f32_attr("intensity", 1.0);
    let ambient_intensity = f32_attr("ambientIntensity", 0.0);
    if intensity == 0.0 && ambient_intensity > 0.0 {
        light.baked = true;
        light.intensity = ambient_intensity;
    } else {
        light.intensity = intensity;
    }

    if kind != LightKind::Directional {
        light.range = f32_attr("radius", 100.0);
    }
    if kind == LightKind::Spot {
        light.spot_angle = (f32_attr("cutOffAngle", DEFAULT_CUT_OFF_ANGLE) * 2.0).to_degrees();
    }

    if let Some(direction) = direction {
        if !direction.normalize_or_zero().abs_diff_eq(LIGHT_DIRECTION, 1e-4) {
            log::debug!("{}: direction {} is imported as the node's forward axis", light.name, direction);
        }
    }

    light
}
