use std::path::Path;

use serde::{Deserialize, Serialize};

/// Which wire encoding appearances are written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialDialect {
    /// `Material` + `MultiTexture` layers.
    Classic,
    /// `CommonSurfaceShader` with per-channel texture slots.
    #[default]
    Advanced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightmapFormat {
    /// Linear HDR, copied as-is.
    #[default]
    Exr,
    /// Re-encoded to 8-bit PNG.
    Png,
}

impl LightmapFormat {
    pub fn extension(self) -> &'static str {
        match self {
            LightmapFormat::Exr => "exr",
            LightmapFormat::Png => "png",
        }
    }
}

/// Options for one export or import. Passed by reference into the top-level
/// calls and never read from anywhere else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub material_dialect: MaterialDialect,
    pub export_lightmaps: bool,
    /// Baked lights are written with `ambientIntensity` and zero direct intensity.
    pub baked_lights_ambient: bool,
    pub lightmap_format: LightmapFormat,
    pub headlight: bool,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            material_dialect: MaterialDialect::default(),
            export_lightmaps: true,
            baked_lights_ambient: true,
            lightmap_format: LightmapFormat::default(),
            headlight: true,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ExchangeConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }
}
