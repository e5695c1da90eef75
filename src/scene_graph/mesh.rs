use glam::{Vec2, Vec3, Vec4, Vec4Swizzles};

use crate::math::bounds::AABB;

/// Triangle mesh in shared form: every attribute array is parallel to
/// `positions` and `indices` holds three entries per triangle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub name: String,
    pub positions: Vec<Vec3>,
    pub normals: Option<Vec<Vec3>>,
    pub uv: Option<Vec<Vec2>>,
    /// Secondary channel, used for baked lightmaps.
    pub uv2: Option<Vec<Vec2>>,
    pub colors: Option<Vec<Vec4>>,
    pub indices: Vec<u32>,
}

/// Where one renderer instance's texels live inside a shared lightmap atlas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightmapPlacement {
    pub index: usize,
    /// xy = scale, zw = offset
    pub scale_offset: Vec4,
}

impl LightmapPlacement {
    pub fn new(index: usize, scale_offset: Vec4) -> Self {
        Self {
            index,
            scale_offset,
        }
    }

    pub fn apply(&self, uv: Vec2) -> Vec2 {
        uv * self.scale_offset.xy() + self.scale_offset.zw()
    }
}

impl MeshData {
    pub fn new(name: impl Into<String>, positions: Vec<Vec3>, indices: Vec<u32>) -> Self {
        Self {
            name: name.into(),
            positions,
            indices,
            ..Default::default()
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn triangles(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        self.indices
            .chunks_exact(3)
            .map(|triangle| [triangle[0], triangle[1], triangle[2]])
    }

    /// Checks the shared-form invariants, returning a description of the
    /// first violation.
    pub fn validate(&self) -> Result<(), String> {
        if self.indices.len() % 3 != 0 {
            return Err(format!(
                "{} indices is not a whole number of triangles",
                self.indices.len()
            ));
        }

        if let Some(index) = self
            .indices
            .iter()
            .find(|&&index| index as usize >= self.positions.len())
        {
            return Err(format!(
                "index {} out of range for {} positions",
                index,
                self.positions.len()
            ));
        }

        let vertex_count = self.positions.len();
        let attribute_lengths = [
            ("normals", self.normals.as_ref().map(Vec::len)),
            ("uv", self.uv.as_ref().map(Vec::len)),
            ("uv2", self.uv2.as_ref().map(Vec::len)),
            ("colors", self.colors.as_ref().map(Vec::len)),
        ];

        for (attribute, length) in attribute_lengths {
            if let Some(length) = length.filter(|&length| length != vertex_count) {
                return Err(format!(
                    "{} has {} entries for {} positions",
                    attribute, length, vertex_count
                ));
            }
        }

        Ok(())
    }

    pub fn bounding_box(&self) -> Option<AABB> {
        AABB::from_points(self.positions.iter().copied())
    }
}
