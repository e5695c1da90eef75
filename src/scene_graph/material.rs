use std::path::PathBuf;

use glam::{Vec3, Vec4};

/// Which surface model a material was authored with. Only `Standard`
/// (metallic/smoothness PBR) has a wire encoding.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ShaderKind {
    #[default]
    Standard,
    Other(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TextureRef {
    File(PathBuf),
    /// RGBA8 pixels with no backing file.
    Pixels {
        name: String,
        width: u32,
        height: u32,
        pixels: Vec<u8>,
    },
}

impl TextureRef {
    pub fn name(&self) -> String {
        match self {
            TextureRef::File(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            TextureRef::Pixels { name, .. } => name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterialData {
    pub name: String,
    pub shader: ShaderKind,
    pub base_color: Vec3,
    pub metalness: f32,
    pub smoothness: f32,
    pub emissive: Vec3,
    pub ambient_intensity: f32,
    pub albedo_texture: Option<TextureRef>,
    pub metallic_gloss_texture: Option<TextureRef>,
    pub normal_texture: Option<TextureRef>,
    pub emissive_texture: Option<TextureRef>,
    /// xy = scale, zw = offset
    pub uv_tiling: Vec4,
}

impl Default for MaterialData {
    fn default() -> Self {
        Self {
            name: String::from("Material"),
            shader: ShaderKind::Standard,
            base_color: Vec3::ONE,
            metalness: 0.0,
            smoothness: 0.5,
            emissive: Vec3::ZERO,
            ambient_intensity: 1.0,
            albedo_texture: None,
            metallic_gloss_texture: None,
            normal_texture: None,
            emissive_texture: None,
            uv_tiling: Vec4::new(1.0, 1.0, 0.0, 0.0),
        }
    }
}

impl MaterialData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}
