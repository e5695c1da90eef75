use glam::Vec3;

/// Scene-wide render settings that travel with the document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Environment {
    pub ambient_sky_color: Vec3,
    /// The single global ambient scalar written to classic materials.
    pub ambient_intensity: f32,
    pub headlight: bool,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            ambient_sky_color: Vec3::new(0.212, 0.227, 0.259),
            ambient_intensity: 1.0,
            headlight: true,
        }
    }
}
