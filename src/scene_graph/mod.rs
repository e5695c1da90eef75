pub mod camera;
pub mod environment;
pub mod host;
pub mod light;
pub mod material;
pub mod mesh;
pub mod object3d;
pub mod scene;
pub mod transform;

// Re-export main types for convenience
pub use camera::Camera;
pub use environment::Environment;
pub use host::{MaterialInstance, MeshInstance, SceneHost};
pub use light::{Light, LightKind};
pub use material::{MaterialData, ShaderKind, TextureRef};
pub use mesh::{LightmapPlacement, MeshData};
pub use object3d::{Object3D, ObjectId};
pub use scene::{MaterialId, MeshId, Scene};
pub use transform::Transform;
