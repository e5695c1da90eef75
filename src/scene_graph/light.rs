use glam::Vec3;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LightKind {
    Point,
    Spot,
    Directional,
}

/// A light attached to a node. Position and direction come from the node's
/// transform; the light shines along the node's forward axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    pub name: String,
    pub kind: LightKind,
    pub color: Vec3,
    pub intensity: f32,
    /// Maximum range of point and spot lights.
    pub range: f32,
    /// Full cone angle in degrees. Only meaningful for spot lights.
    pub spot_angle: f32,
    /// Contribution is baked into lightmaps rather than computed at runtime.
    pub baked: bool,
}

impl Light {
    pub fn new(name: impl Into<String>, kind: LightKind) -> Self {
        Self {
            name: name.into(),
            kind,
            color: Vec3::ONE,
            intensity: 1.0,
            range: 10.0,
            spot_angle: 30.0,
            baked: false,
        }
    }
}
