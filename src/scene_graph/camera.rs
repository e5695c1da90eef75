/// Perspective camera looking down the owning node's forward axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub name: String,
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fov_y_degrees: 60.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}
