//! Appearance encoding for the two material dialects.
//!
//! The in-memory model is metallic/smoothness PBR. Both wire dialects are
//! Phong-style, so the mapping is an approximation:
//!
//! | memory | wire |
//! |---|---|
//! | `base_color * (1 - metalness)` | diffuse color / factor |
//! | `(metalness, metalness, metalness)` | specular color / factor |
//! | `smoothness²` | shininess |
//!
//! Decoding inverts each row. The base color division is clamped so fully
//! metallic materials do not blow up.

use std::path::Path;

use glam::{Vec2, Vec3, Vec4};
use itertools::Itertools;

use crate::config::MaterialDialect;
use crate::error::{Diagnostics, X3dError};
use crate::scene_graph::{MaterialData, ShaderKind, TextureRef};
use crate::x3d::document::Element;
use crate::x3d::numeric;

/// Smallest `1 - metalness` the base color recovery divides by.
pub const MIN_DIFFUSE_WEIGHT: f32 = 1e-3;

const IMAGE_TEXTURE_NAMES: &[&str] = &["ImageTexture2D", "ImageTexture"];
const HDR_INTERNAL_FORMAT: &str = "rgba16f";

/// Externalized URLs for one appearance, filled in by the texture store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextureUrls {
    pub albedo: Option<String>,
    pub metallic_gloss: Option<String>,
    pub normal: Option<String>,
    pub emissive: Option<String>,
    pub lightmap: Option<String>,
}

/// A decoded appearance plus the scene-wide ambient scalar a classic
/// `Material` carries.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAppearance {
    pub material: MaterialData,
    pub ambient_intensity: Option<f32>,
}

/// Largest component of a factor triple. A uniform `(m, m, m)` yields `m`.
pub fn factor_magnitude(v: Vec3) -> f32 {
    v.max_element()
}

pub fn recover_base_color(diffuse: Vec3, metalness: f32) -> Vec3 {
    let weight = (1.0 - metalness).max(MIN_DIFFUSE_WEIGHT);
    (diffuse / weight).clamp(Vec3::ZERO, Vec3::ONE)
}

pub fn encode_appearance(
    material: &MaterialData,
    urls: &TextureUrls,
    dialect: MaterialDialect,
    ambient_intensity: f32,
    diagnostics: &mut Diagnostics,
) -> Element {
    let mut appearance = Element::new("Appearance");

    if let ShaderKind::Other(shader) = &material.shader {
        diagnostics.push(X3dError::UnsupportedMaterial(format!(
            "{} uses shader {:?}",
            material.name, shader
        )));
        return appearance;
    }

    match dialect {
        MaterialDialect::Classic => encode_classic(&mut appearance, material, urls, ambient_intensity),
        MaterialDialect::Advanced => appearance.push(encode_surface_shader(material, urls)),
    }

    appearance
}

fn diffuse_of(material: &MaterialData) -> Vec3 {
    material.base_color * (1.0 - material.metalness)
}

fn specular_of(material: &MaterialData) -> Vec3 {
    Vec3::splat(material.metalness)
}

fn shininess_of(material: &MaterialData) -> f32 {
    material.smoothness * material.smoothness
}

fn encode_classic(
    appearance: &mut Element,
    material: &MaterialData,
    urls: &TextureUrls,
    ambient_intensity: f32,
) {
    let mut layers = Vec::new();
    let mut transforms = Vec::new();

    if let Some(lightmap) = &urls.lightmap {
        layers.push(image_texture(lightmap));
        transforms.push(Element::new("TextureTransform").with_attr("scale", "1 1"));
    }

    if let Some(albedo) = &urls.albedo {
        layers.push(image_texture(albedo));
        transforms.push(tiling_transform(material.uv_tiling));
    }

    if !layers.is_empty() {
        let mode = layers.iter().map(|_| "ADD").join(" ");
        appearance.push(Element {
            children: layers,
            ..Element::new("MultiTexture").with_attr("mode", mode)
        });
        appearance.push(Element {
            children: transforms,
            ..Element::new("MultiTextureTransform")
        });
    }

    appearance.push(
        Element::new("Material")
            .with_attr("diffuseColor", numeric::encode_vec3(diffuse_of(material)))
            .with_attr("specularColor", numeric::encode_vec3(specular_of(material)))
            .with_attr("shininess", numeric::encode_scalar(shininess_of(material)))
            .with_attr("emissiveColor", numeric::encode_vec3(material.emissive))
            .with_attr("ambientIntensity", numeric::encode_scalar(ambient_intensity)),
    );
}

fn encode_surface_shader(material: &MaterialData, urls: &TextureUrls) -> Element {
    let mut shader = Element::new("CommonSurfaceShader");

    if let Some(lightmap) = &urls.lightmap {
        shader.push(surface_texture("ambientTexture", lightmap));
    }
    if let Some(albedo) = &urls.albedo {
        shader.push(
            surface_texture("diffuseTexture", albedo).with_child(tiling_transform(material.uv_tiling)),
        );
    }
    if let Some(normal) = &urls.normal {
        shader.push(surface_texture("normalTexture", normal));
    }
    if let Some(metallic_gloss) = &urls.metallic_gloss {
        shader.push(surface_texture("specularTexture", metallic_gloss));
    }
    if let Some(emissive) = &urls.emissive {
        shader.push(surface_texture("emissiveTexture", emissive));
    }

    shader
        .with_attr("ambientFactor", numeric::encode_vec3(Vec3::ONE))
        .with_attr("specularFactor", numeric::encode_vec3(specular_of(material)))
        .with_attr("diffuseFactor", numeric::encode_vec3(diffuse_of(material)))
        .with_attr("shininessFactor", numeric::encode_scalar(shininess_of(material)))
        .with_attr("emissiveFactor", numeric::encode_vec3(material.emissive))
}

fn image_texture(url: &str) -> Element {
    let mut texture = Element::new("ImageTexture2D").with_attr("url", url);

    let is_hdr = Path::new(url)
        .extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("exr"));
    if is_hdr {
        texture.push(Element::new("TextureProperties").with_attr("internalFormat", HDR_INTERNAL_FORMAT));
    }

    texture
}

fn surface_texture(container_field: &str, url: &str) -> Element {
    Element::new("SurfaceShaderTexture")
        .with_attr("containerField", container_field)
        .with_child(image_texture(url))
}

fn tiling_transform(tiling: Vec4) -> Element {
    let mut transform = Element::new("TextureTransform")
        .with_attr("scale", numeric::encode_vec2(Vec2::new(tiling.x, tiling.y)));

    let offset = Vec2::new(tiling.z, tiling.w);
    if offset != Vec2::ZERO {
        transform.set_attr("translation", numeric::encode_vec2(offset));
    }

    transform
}

/// Lightmaps are externalized as `<scene>_Lightmap-<index>_comp_light.<ext>`.
pub fn is_lightmap_url(url: &str) -> bool {
    url.contains("_comp_light.")
}

/// First entry of an `MFString` url field, with or without quotes.
pub fn first_url(text: &str) -> Option<&str> {
    let text = text.trim();
    let url = match text.strip_prefix('"') {
        Some(rest) => rest.split('"').next().unwrap_or_default(),
        None => text,
    };

    Some(url).filter(|url| !url.is_empty())
}

/// Decodes an `Appearance`. Textures are looked up through `resolve`; a
/// texture that cannot be resolved is dropped with a diagnostic, and an
/// attribute that does not parse falls back to its default. Returns `None`
/// when the appearance has children this codec does not understand.
pub fn decode_appearance(
    element: &Element,
    name: &str,
    resolve: &dyn Fn(&str) -> Result<TextureRef, X3dError>,
    diagnostics: &mut Diagnostics,
) -> Option<DecodedAppearance> {
    const KNOWN: &[&str] = &[
        "Material",
        "CommonSurfaceShader",
        "MultiTexture",
        "MultiTextureTransform",
        "ImageTexture",
        "ImageTexture2D",
        "TextureTransform",
    ];

    if let Some(unknown) = element
        .children
        .iter()
        .find(|child| !KNOWN.contains(&child.name.as_str()))
    {
        diagnostics.push(X3dError::UnsupportedMaterial(format!(
            "{}: <{}> inside Appearance",
            name, unknown.name
        )));
        return None;
    }

    let mut decoder = AppearanceDecoder {
        resolve,
        diagnostics,
    };

    let mut decoded = DecodedAppearance {
        material: MaterialData::new(name),
        ambient_intensity: None,
    };

    if let Some(shader) = element.child("CommonSurfaceShader") {
        decoder.surface_shader(shader, &mut decoded.material);
    } else {
        if let Some(material) = element.child("Material") {
            decoded.ambient_intensity = Some(decoder.classic(material, &mut decoded.material));
        }
        decoder.classic_textures(element, &mut decoded.material);
    }

    Some(decoded)
}

fn apply_phong(material: &mut MaterialData, diffuse: Vec3, specular: Vec3, shininess: f32) {
    let metalness = factor_magnitude(specular).clamp(0.0, 1.0);
    material.metalness = metalness;
    material.smoothness = shininess.clamp(0.0, 1.0).sqrt();
    material.base_color = recover_base_color(diffuse, metalness);
}

struct AppearanceDecoder<'a> {
    resolve: &'a dyn Fn(&str) -> Result<TextureRef, X3dError>,
    diagnostics: &'a mut Diagnostics,
}

impl AppearanceDecoder<'_> {
    /// Returns the classic `ambientIntensity`.
    fn classic(&mut self, element: &Element, material: &mut MaterialData) -> f32 {
        let diffuse = self.vec3(element, "diffuseColor", Vec3::splat(0.8));
        let specular = self.vec3(element, "specularColor", Vec3::ZERO);
        let shininess = self.f32(element, "shininess", 0.2);
        let ambient_intensity = self.f32(element, "ambientIntensity", 0.2);

        apply_phong(material, diffuse, specular, shininess);
        material.emissive = self.vec3(element, "emissiveColor", Vec3::ZERO);
        material.ambient_intensity = ambient_intensity;

        ambient_intensity
    }

    fn surface_shader(&mut self, element: &Element, material: &mut MaterialData) {
        let diffuse = self.vec3(element, "diffuseFactor", Vec3::splat(0.8));
        let specular = self.vec3(element, "specularFactor", Vec3::ZERO);
        let shininess = self.f32(element, "shininessFactor", 0.2);

        apply_phong(material, diffuse, specular, shininess);
        material.emissive = self.vec3(element, "emissiveFactor", Vec3::ZERO);
        material.ambient_intensity = factor_magnitude(self.vec3(element, "ambientFactor", Vec3::ONE));

        for slot in &element.children {
            let image = if IMAGE_TEXTURE_NAMES.contains(&slot.name.as_str()) {
                Some(slot)
            } else {
                slot.child_any(IMAGE_TEXTURE_NAMES)
            };
            let Some(image) = image else {
                continue;
            };

            match slot.attr("containerField").unwrap_or_default() {
                "diffuseTexture" => {
                    material.albedo_texture = self.texture(image);
                    if let Some(transform) = slot.child("TextureTransform").or_else(|| image.child("TextureTransform")) {
                        material.uv_tiling = self.tiling(transform);
                    }
                }
                "normalTexture" => material.normal_texture = self.texture(image),
                "specularTexture" => material.metallic_gloss_texture = self.texture(image),
                "emissiveTexture" => material.emissive_texture = self.texture(image),
                "ambientTexture" => log::debug!("{}: lightmap textures are not imported", material.name),
                other => log::debug!("{}: ignoring texture slot {:?}", material.name, other),
            }
        }
    }

    fn classic_textures(&mut self, element: &Element, material: &mut MaterialData) {
        if let Some(layers) = element.child("MultiTexture") {
            let albedo = layers
                .children
                .iter()
                .enumerate()
                .filter(|(_, layer)| IMAGE_TEXTURE_NAMES.contains(&layer.name.as_str()))
                .filter(|(_, layer)| !layer.attr("url").and_then(first_url).is_some_and(is_lightmap_url))
                .last();

            if let Some((index, layer)) = albedo {
                material.albedo_texture = self.texture(layer);

                let transform = element.child("MultiTextureTransform").and_then(|transforms| {
                    let transforms = transforms.children_named("TextureTransform").collect::<Vec<_>>();
                    transforms.get(index).or(transforms.last()).copied()
                });
                if let Some(transform) = transform {
                    material.uv_tiling = self.tiling(transform);
                }
            }
        } else if let Some(image) = element.child_any(IMAGE_TEXTURE_NAMES) {
            material.albedo_texture = self.texture(image);
            if let Some(transform) = element.child("TextureTransform") {
                material.uv_tiling = self.tiling(transform);
            }
        }
    }

    fn tiling(&mut self, element: &Element) -> Vec4 {
        let scale = self
            .diagnostics
            .recover(numeric::decode_vec2(element.attr("scale"), Vec2::ONE), "scale", Vec2::ONE);
        let offset = self.diagnostics.recover(
            numeric::decode_vec2(element.attr("translation"), Vec2::ZERO),
            "translation",
            Vec2::ZERO,
        );

        Vec4::new(scale.x, scale.y, offset.x, offset.y)
    }

    fn vec3(&mut self, element: &Element, attribute: &str, default: Vec3) -> Vec3 {
        self.diagnostics
            .recover(numeric::decode_vec3(element.attr(attribute), default), attribute, default)
    }

    fn f32(&mut self, element: &Element, attribute: &str, default: f32) -> f32 {
        self.diagnostics
            .recover(numeric::decode_f32(element.attr(attribute), default), attribute, default)
    }

    fn texture(&mut self, image: &Element) -> Option<TextureRef> {
        let url = image.attr("url").and_then(first_url)?;

        match (self.resolve)(url) {
            Ok(texture) => Some(texture),
            Err(error) => {
                self.diagnostics.push(error);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use approx::assert_abs_diff_eq;

    use super::*;

    fn resolve_as_file(url: &str) -> Result<TextureRef, X3dError> {
        Ok(TextureRef::File(PathBuf::from(url)))
    }

    fn decode(appearance: &Element) -> DecodedAppearance {
        decode_appearance(appearance, "Decoded", &resolve_as_file, &mut Diagnostics::new()).unwrap()
    }

    fn red_plastic() -> MaterialData {
        MaterialData {
            base_color: Vec3::new(0.8, 0.2, 0.2),
            metalness: 0.0,
            smoothness: 0.5,
            ..MaterialData::new("RedPlastic")
        }
    }

    fn encode(material: &MaterialData, urls: &TextureUrls, dialect: MaterialDialect) -> Element {
        encode_appearance(material, urls, dialect, 0.7, &mut Diagnostics::new())
    }

    #[test]
    fn classic_material_attributes() {
        let appearance = encode(&red_plastic(), &TextureUrls::default(), MaterialDialect::Classic);

        assert!(appearance.child("MultiTexture").is_none());
        let material = appearance.child("Material").unwrap();
        assert_eq!(material.attr("diffuseColor"), Some("0.8 0.2 0.2"));
        assert_eq!(material.attr("specularColor"), Some("0 0 0"));
        assert_eq!(material.attr("shininess"), Some("0.25"));
        assert_eq!(material.attr("ambientIntensity"), Some("0.7"));
    }

    #[test]
    fn classic_round_trip() {
        let original = red_plastic();
        let decoded = decode(&encode(&original, &TextureUrls::default(), MaterialDialect::Classic));

        assert_eq!(decoded.material.metalness, 0.0);
        assert_abs_diff_eq!(decoded.material.smoothness, 0.5, epsilon = 1e-6);
        assert!(decoded.material.base_color.abs_diff_eq(original.base_color, 1e-6));
        assert_eq!(decoded.ambient_intensity, Some(0.7));
    }

    #[test]
    fn advanced_round_trip_with_metalness() {
        let original = MaterialData {
            base_color: Vec3::new(0.5, 0.4, 0.9),
            metalness: 0.3,
            smoothness: 0.8,
            emissive: Vec3::new(0.1, 0.0, 0.0),
            ..MaterialData::new("Brushed")
        };

        let appearance = encode(&original, &TextureUrls::default(), MaterialDialect::Advanced);
        let shader = appearance.child("CommonSurfaceShader").unwrap();
        assert_eq!(shader.attr("ambientFactor"), Some("1 1 1"));
        assert_eq!(shader.attr("specularFactor"), Some("0.3 0.3 0.3"));

        let decoded = decode(&appearance);
        assert_eq!(decoded.material.metalness, 0.3);
        assert_abs_diff_eq!(decoded.material.smoothness, 0.8, epsilon = 1e-5);
        assert!(decoded.material.base_color.abs_diff_eq(original.base_color, 1e-5));
        assert_eq!(decoded.material.emissive, original.emissive);
        assert_eq!(decoded.material.ambient_intensity, 1.0);
        assert_eq!(decoded.ambient_intensity, None);
    }

    #[test]
    fn fully_metallic_base_color_is_clamped() {
        let base = recover_base_color(Vec3::new(0.5, 0.0, 0.0), 1.0);
        assert_eq!(base, Vec3::new(1.0, 0.0, 0.0));

        let base = recover_base_color(Vec3::new(0.0005, 0.0, 0.0), 1.0);
        assert_abs_diff_eq!(base.x, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn factor_magnitude_of_uniform_triple_is_the_component() {
        assert_eq!(factor_magnitude(Vec3::splat(0.3)), 0.3);
        assert_eq!(factor_magnitude(Vec3::new(0.1, 0.4, 0.2)), 0.4);
    }

    #[test]
    fn classic_layers_put_lightmap_first() {
        let material = MaterialData {
            uv_tiling: Vec4::new(2.0, 3.0, 0.5, 0.0),
            ..red_plastic()
        };
        let urls = TextureUrls {
            albedo: Some("bricks.png".into()),
            lightmap: Some("Level_Lightmap-0_comp_light.exr".into()),
            ..Default::default()
        };

        let appearance = encode(&material, &urls, MaterialDialect::Classic);
        let names: Vec<_> = appearance.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["MultiTexture", "MultiTextureTransform", "Material"]);

        let layers = appearance.child("MultiTexture").unwrap();
        assert_eq!(layers.attr("mode"), Some("ADD ADD"));
        assert_eq!(layers.children[0].attr("url"), Some("Level_Lightmap-0_comp_light.exr"));
        assert_eq!(
            layers.children[0].child("TextureProperties").unwrap().attr("internalFormat"),
            Some("rgba16f")
        );
        assert_eq!(layers.children[1].attr("url"), Some("bricks.png"));
        assert!(layers.children[1].children.is_empty());

        let transforms = appearance.child("MultiTextureTransform").unwrap();
        assert_eq!(transforms.children[0].attr("scale"), Some("1 1"));
        assert_eq!(transforms.children[1].attr("scale"), Some("2 3"));
        assert_eq!(transforms.children[1].attr("translation"), Some("0.5 0"));

        let decoded = decode(&appearance);
        assert_eq!(
            decoded.material.albedo_texture,
            Some(TextureRef::File(PathBuf::from("bricks.png")))
        );
        assert_eq!(decoded.material.uv_tiling, material.uv_tiling);
    }

    #[test]
    fn lightmap_only_layer_is_not_mistaken_for_albedo() {
        let urls = TextureUrls {
            lightmap: Some("Level_Lightmap-2_comp_light.png".into()),
            ..Default::default()
        };
        let appearance = encode(&red_plastic(), &urls, MaterialDialect::Classic);

        assert_eq!(appearance.child("MultiTexture").unwrap().attr("mode"), Some("ADD"));
        assert_eq!(decode(&appearance).material.albedo_texture, None);
    }

    #[test]
    fn surface_shader_texture_slots() {
        let urls = TextureUrls {
            albedo: Some("albedo.png".into()),
            metallic_gloss: Some("metal.png".into()),
            normal: Some("normal.png".into()),
            emissive: Some("glow.png".into()),
            lightmap: Some("Level_Lightmap-0_comp_light.exr".into()),
        };
        let appearance = encode(&red_plastic(), &urls, MaterialDialect::Advanced);
        let shader = appearance.child("CommonSurfaceShader").unwrap();

        let slots: Vec<_> = shader
            .children
            .iter()
            .map(|slot| slot.attr("containerField").unwrap())
            .collect();
        assert_eq!(
            slots,
            ["ambientTexture", "diffuseTexture", "normalTexture", "specularTexture", "emissiveTexture"]
        );
        assert!(shader.children[1].child("TextureTransform").is_some());

        let decoded = decode(&appearance).material;
        assert_eq!(decoded.albedo_texture, Some(TextureRef::File("albedo.png".into())));
        assert_eq!(decoded.metallic_gloss_texture, Some(TextureRef::File("metal.png".into())));
        assert_eq!(decoded.normal_texture, Some(TextureRef::File("normal.png".into())));
        assert_eq!(decoded.emissive_texture, Some(TextureRef::File("glow.png".into())));
    }

    #[test]
    fn unsupported_shader_exports_empty_appearance() {
        let material = MaterialData {
            shader: ShaderKind::Other("Toon".into()),
            ..red_plastic()
        };
        let mut diagnostics = Diagnostics::new();
        let appearance = encode_appearance(
            &material,
            &TextureUrls::default(),
            MaterialDialect::Classic,
            1.0,
            &mut diagnostics,
        );

        assert!(appearance.children.is_empty());
        assert!(matches!(
            diagnostics.iter().next(),
            Some(X3dError::UnsupportedMaterial(_))
        ));
    }

    #[test]
    fn unknown_appearance_children_skip_the_appearance() {
        let appearance = Element::new("Appearance").with_child(Element::new("ComposedShader"));
        let mut diagnostics = Diagnostics::new();

        let decoded =
            decode_appearance(&appearance, "Custom", &resolve_as_file, &mut diagnostics);
        assert!(decoded.is_none());
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn unresolvable_textures_are_dropped_with_a_diagnostic() {
        let appearance = Element::new("Appearance")
            .with_child(Element::new("ImageTexture").with_attr("url", "\"missing.png\" \"http://x/missing.png\""))
            .with_child(Element::new("Material"));
        let mut diagnostics = Diagnostics::new();
        let missing = |url: &str| -> Result<TextureRef, X3dError> {
            Err(X3dError::MissingResource(url.into()))
        };

        let decoded = decode_appearance(&appearance, "M", &missing, &mut diagnostics).unwrap();
        assert_eq!(decoded.material.albedo_texture, None);
        assert!(matches!(
            diagnostics.iter().next(),
            Some(X3dError::MissingResource(path)) if path == Path::new("missing.png")
        ));
    }

    #[test]
    fn unparsable_attribute_falls_back_to_its_default() {
        let appearance = Element::new("Appearance").with_child(
            Element::new("Material")
                .with_attr("diffuseColor", "0.8 x 0.2")
                .with_attr("shininess", "0.25"),
        );
        let mut diagnostics = Diagnostics::new();

        let decoded =
            decode_appearance(&appearance, "Broken", &resolve_as_file, &mut diagnostics).unwrap();

        assert!(decoded.material.base_color.abs_diff_eq(Vec3::splat(0.8), 1e-6));
        assert_abs_diff_eq!(decoded.material.smoothness, 0.5, epsilon = 1e-6);
        assert_eq!(diagnostics.len(), 1);
        assert!(matches!(
            diagnostics.iter().next(),
            Some(X3dError::Parse { attribute, token }) if attribute == "diffuseColor" && token == "x"
        ));
    }

    #[test]
    fn url_field_accepts_quoted_lists() {
        assert_eq!(first_url("\"a.png\" \"b.png\""), Some("a.png"));
        assert_eq!(first_url(" plain.jpg "), Some("plain.jpg"));
        assert_eq!(first_url("\"\""), None);
    }
}
