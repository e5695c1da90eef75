pub mod config;
pub mod error;
pub mod gltf_loader;
pub mod math;
pub mod scene_graph;
pub mod x3d;

pub use config::{ExchangeConfig, MaterialDialect};
pub use error::{Diagnostics, X3dError};
