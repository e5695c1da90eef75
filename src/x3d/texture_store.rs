//! Externalizing textures next to the written document and finding them
//! again on import.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat, RgbaImage};

use crate::config::LightmapFormat;
use crate::error::X3dError;
use crate::scene_graph::TextureRef;

pub trait TextureStore {
    /// Writes `texture` where the document can reference it and returns the
    /// URL to put in the document.
    fn export_texture(&mut self, texture: &TextureRef) -> Result<String, X3dError>;

    /// Writes a lightmap atlas under `file_name`, converting it to `format`.
    fn export_lightmap(
        &mut self,
        source: &TextureRef,
        file_name: &str,
        format: LightmapFormat,
    ) -> Result<String, X3dError>;

    fn resolve_texture(&self, url: &str) -> Result<TextureRef, X3dError>;
}

pub fn lightmap_file_name(scene_name: &str, index: usize, format: LightmapFormat) -> String {
    format!(
        "{}_Lightmap-{}_comp_light.{}",
        scene_name.replace(' ', "_"),
        index,
        format.extension()
    )
}

/// Texture store rooted at the directory of the document being written or
/// read. Each distinct texture is written once per store.
pub struct DirectoryTextureStore {
    directory: PathBuf,
    exported: HashMap<String, String>,
}

impl DirectoryTextureStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            exported: HashMap::new(),
        }
    }

    /// Store for the directory containing `document`.
    pub fn beside(document: &Path) -> Self {
        let directory = document
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        Self::new(directory)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn cache_key(texture: &TextureRef) -> String {
        match texture {
            TextureRef::File(path) => format!("file:{}", path.display()),
            TextureRef::Pixels { name, .. } => format!("pixels:{}", name),
        }
    }

    fn copy_file(&self, source: &Path, file_name: &str) -> Result<(), X3dError> {
        if !source.is_file() {
            return Err(X3dError::MissingResource(source.to_path_buf()));
        }

        let destination = self.directory.join(file_name);
        if is_same_file(source, &destination) {
            return Ok(());
        }

        fs::copy(source, &destination).map_err(|e| X3dError::io(&destination, e))?;
        log::debug!("Copied {} to {}", source.display(), destination.display());
        Ok(())
    }

    fn write_pixels(
        &self,
        width: u32,
        height: u32,
        pixels: &[u8],
        file_name: &str,
        format: ImageFormat,
    ) -> Result<(), X3dError> {
        let destination = self.directory.join(file_name);
        let image = RgbaImage::from_raw(width, height, pixels.to_vec()).ok_or_else(|| {
            X3dError::io(
                &destination,
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("{} bytes do not form a {}x{} RGBA image", pixels.len(), width, height),
                ),
            )
        })?;

        match format {
            ImageFormat::OpenExr => DynamicImage::ImageRgba8(image)
                .into_rgba32f()
                .save_with_format(&destination, format)?,
            _ => image.save_with_format(&destination, format)?,
        }

        log::debug!("Wrote {}x{} texture to {}", width, height, destination.display());
        Ok(())
    }
}

impl TextureStore for DirectoryTextureStore {
    fn export_texture(&mut self, texture: &TextureRef) -> Result<String, X3dError> {
        let key = Self::cache_key(texture);
        if let Some(url) = self.exported.get(&key) {
            return Ok(url.clone());
        }

        let url = match texture {
            TextureRef::File(path) => {
                let file_name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .ok_or_else(|| X3dError::MissingResource(path.clone()))?;
                self.copy_file(path, &file_name)?;
                file_name
            }
            TextureRef::Pixels {
                name,
                width,
                height,
                pixels,
            } => {
                let file_name = format!("{}_{:08x}.png", sanitize(name), rand::random::<u32>());
                self.write_pixels(*width, *height, pixels, &file_name, ImageFormat::Png)?;
                file_name
            }
        };

        self.exported.insert(key, url.clone());
        Ok(url)
    }

    fn export_lightmap(
        &mut self,
        source: &TextureRef,
        file_name: &str,
        format: LightmapFormat,
    ) -> Result<String, X3dError> {
        if self.exported.values().any(|url| url == file_name) {
            return Ok(file_name.to_string());
        }

        let image_format = match format {
            LightmapFormat::Exr => ImageFormat::OpenExr,
            LightmapFormat::Png => ImageFormat::Png,
        };

        match source {
            TextureRef::File(path) if ImageFormat::from_path(path).ok() == Some(image_format) => {
                self.copy_file(path, file_name)?;
            }
            TextureRef::File(path) => {
                if !path.is_file() {
                    return Err(X3dError::MissingResource(path.clone()));
                }
                let destination = self.directory.join(file_name);
                let image = image::open(path)?;
                match format {
                    LightmapFormat::Exr => image.into_rgba32f().save_with_format(&destination, image_format)?,
                    LightmapFormat::Png => image.into_rgba8().save_with_format(&destination, image_format)?,
                }
                log::info!("Converted lightmap {} to {}", path.display(), destination.display());
            }
            TextureRef::Pixels {
                width,
                height,
                pixels,
                ..
            } => self.write_pixels(*width, *height, pixels, file_name, image_format)?,
        }

        self.exported
            .insert(format!("lightmap:{}", file_name), file_name.to_string());
        Ok(file_name.to_string())
    }

    fn resolve_texture(&self, url: &str) -> Result<TextureRef, X3dError> {
        let is_remote = url.contains("://") && !url.starts_with("file://");
        let local = url.strip_prefix("file://").unwrap_or(url);
        let path = self.directory.join(local);

        if is_remote || !path.is_file() {
            return Err(X3dError::MissingResource(path));
        }

        Ok(TextureRef::File(path))
    }
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn sanitize(name: &str) -> String {
    let name: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();

    if name.is_empty() {
        String::from("texture")
    } else {
        name
    }
}
