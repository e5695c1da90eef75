//! `IndexedFaceSet` encoding and decoding.
//!
//! On the wire a triangle mesh is a set of shared attribute pools plus a
//! `coordIndex` list of `i0 i1 i2 -1` tuples. Decoding unshares every corner
//! into its own vertex, because the in-memory mesh indexes all attributes
//! through one index buffer, and splits the result into chunks that each stay
//! under the per-buffer vertex ceiling.

use glam::{Vec2, Vec3, Vec4};

use crate::error::{Diagnostics, X3dError};
use crate::scene_graph::{LightmapPlacement, MeshData};
use crate::x3d::document::Element;
use crate::x3d::numeric;

/// Largest vertex count of one decoded mesh buffer. Divisible by three, so a
/// chunk boundary always falls between whole triangles.
pub const MAX_CHUNK_VERTICES: usize = 65_535;

pub const TRIANGLES_PER_CHUNK: usize = MAX_CHUNK_VERTICES / 3;

pub const FACE_TERMINATOR: i64 = -1;

const INDEXED_FACE_SET: &str = "IndexedFaceSet";
const TEXTURE_COORDINATE_NAMES: &[&str] = &["TextureCoordinate", "TextureCoordinate2D"];

/// Encodes a shared-form mesh. `lightmap` is the instance's atlas placement
/// when its lightmap is exported; it adds a second texture coordinate set.
pub fn encode_indexed_face_set(mesh: &MeshData, lightmap: Option<&LightmapPlacement>) -> Element {
    let coord_index = numeric::encode_ints(mesh.triangles().flat_map(|[i0, i1, i2]| {
        [i64::from(i0), i64::from(i1), i64::from(i2), FACE_TERMINATOR]
    }));

    let mut face_set = Element::new(INDEXED_FACE_SET).with_attr("coordIndex", coord_index);

    face_set.push(Element::new("Coordinate").with_attr(
        "point",
        numeric::encode_list(mesh.positions.iter().map(|p| p.to_array())),
    ));

    if let Some(normals) = &mesh.normals {
        face_set.push(Element::new("Normal").with_attr(
            "vector",
            numeric::encode_list(normals.iter().map(|n| n.to_array())),
        ));
    }

    if let Some(colors) = &mesh.colors {
        face_set.push(Element::new("ColorRGBA").with_attr(
            "color",
            numeric::encode_list(colors.iter().map(|c| c.to_array())),
        ));
    }

    let lightmap_uvs = lightmap.and_then(|placement| {
        let source = mesh.uv2.as_ref().or(mesh.uv.as_ref())?;
        Some(source.iter().map(|uv| placement.apply(*uv)).collect::<Vec<_>>())
    });

    match (lightmap_uvs, &mesh.uv) {
        (Some(lightmap_uvs), uv) => {
            // Set order matches the MultiTexture layer order: lightmap, albedo.
            let mut sets = Element::new("MultiTextureCoordinate");
            sets.push(texture_coordinate(&lightmap_uvs));
            if let Some(uv) = uv {
                sets.push(texture_coordinate(uv));
            }
            face_set.push(sets);
        }
        (None, Some(uv)) => face_set.push(texture_coordinate(uv)),
        (None, None) => {}
    }

    if lightmap.is_none() && mesh.uv2.is_some() {
        log::debug!(
            "{}: secondary UVs are only written for lightmapped instances",
            mesh.name
        );
    }

    face_set
}

fn texture_coordinate(uvs: &[Vec2]) -> Element {
    Element::new("TextureCoordinate").with_attr(
        "point",
        numeric::encode_list(uvs.iter().map(|uv| uv.to_array())),
    )
}

/// Decodes an `IndexedFaceSet` into one or more unshared meshes.
///
/// Problems with optional pools (normals, colors, texture coordinates) drop
/// that pool and are reported to `diagnostics`. Problems with the coordinates
/// or the index lists fail the whole node.
pub fn decode_indexed_face_set(
    element: &Element,
    name: &str,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<MeshData>, X3dError> {
    let pools = Pools::read(element, diagnostics)?;

    let coord_index = read_index_list(element, "coordIndex")?;
    let tex_coord_index = match element.attr("texCoordIndex") {
        Some(text) if !text.trim().is_empty() => {
            let list = read_index_list(element, "texCoordIndex")?;
            if list.len() != coord_index.len() {
                return Err(X3dError::malformed_index(
                    INDEXED_FACE_SET,
                    format!(
                        "texCoordIndex has {} entries but coordIndex has {}",
                        list.len(),
                        coord_index.len()
                    ),
                ));
            }
            Some(list)
        }
        _ => None,
    };

    let mut chunks = Vec::new();
    let mut builder = ChunkBuilder::new(&pools);

    for (face, corners) in coord_index.chunks_exact(4).enumerate() {
        let uv_corners = tex_coord_index
            .as_ref()
            .map(|list| &list[face * 4..face * 4 + 4]);

        for corner in 0..3 {
            let coord = pools.lookup_index(corners[corner], pools.positions.len(), "Coordinate")?;
            let uv = match uv_corners {
                Some(uv_corners) => uv_corners[corner],
                None => corners[corner],
            };
            builder.push_corner(&pools, coord, uv)?;
        }

        if builder.len() >= MAX_CHUNK_VERTICES {
            chunks.push(builder.finish(name, chunks.len()));
            builder = ChunkBuilder::new(&pools);
        }
    }

    if builder.len() > 0 {
        chunks.push(builder.finish(name, chunks.len()));
    }

    if chunks.len() > 1 {
        log::info!(
            "{}: split {} triangles into {} meshes",
            name,
            coord_index.len() / 4,
            chunks.len()
        );
    }

    Ok(chunks)
}

fn read_index_list(element: &Element, attribute: &str) -> Result<Vec<i64>, X3dError> {
    let list = numeric::decode_ints(element.attr(attribute).unwrap_or_default()).map_err(|e| {
        X3dError::malformed_index(INDEXED_FACE_SET, e.in_attribute(attribute).to_string())
    })?;

    if list.len() % 4 != 0 {
        return Err(X3dError::malformed_index(
            INDEXED_FACE_SET,
            format!(
                "{} has {} entries, expected whole [i0 i1 i2 -1] tuples",
                attribute,
                list.len()
            ),
        ));
    }

    Ok(list)
}

/// Shared attribute pools read from the face set's children.
struct Pools {
    positions: Vec<Vec3>,
    normals: Option<Vec<Vec3>>,
    colors: Option<Vec<Vec4>>,
    uv: Option<Vec<Vec2>>,
    uv2: Option<Vec<Vec2>>,
}

impl Pools {
    fn read(element: &Element, diagnostics: &mut Diagnostics) -> Result<Self, X3dError> {
        let positions = match element.child("Coordinate") {
            Some(coordinate) => numeric::decode_list::<3>(coordinate.attr("point").unwrap_or_default())
                .map_err(|e| e.in_attribute("point"))?
                .into_iter()
                .map(Vec3::from_array)
                .collect(),
            None => Vec::new(),
        };

        let normals = element.child("Normal").and_then(|normal| {
            optional_pool::<3>(normal, "vector", diagnostics)
                .map(|values| values.into_iter().map(Vec3::from_array).collect())
        });

        let colors = if let Some(color) = element.child("ColorRGBA") {
            optional_pool::<4>(color, "color", diagnostics)
                .map(|values| values.into_iter().map(Vec4::from_array).collect())
        } else if let Some(color) = element.child("Color") {
            optional_pool::<3>(color, "color", diagnostics)
                .map(|values| values.into_iter().map(|c| Vec3::from_array(c).extend(1.0)).collect())
        } else {
            None
        };

        // A MultiTextureCoordinate carries [lightmap, primary] when it has two
        // sets, as written by the encoder.
        let mut sets: Vec<&Element> = Vec::new();
        if let Some(multi) = element.child("MultiTextureCoordinate") {
            sets.extend(
                multi
                    .children
                    .iter()
                    .filter(|child| TEXTURE_COORDINATE_NAMES.contains(&child.name.as_str())),
            );
        } else if let Some(single) = element.child_any(TEXTURE_COORDINATE_NAMES) {
            sets.push(single);
        }

        let mut read_uvs = |set: &Element| {
            optional_pool::<2>(set, "point", diagnostics)
                .map(|values| values.into_iter().map(Vec2::from_array).collect::<Vec<_>>())
        };

        let (uv, uv2) = match sets.as_slice() {
            [] => (None, None),
            [primary] => (read_uvs(primary), None),
            [lightmap, primary, ..] => (read_uvs(primary), read_uvs(lightmap)),
        };

        Ok(Self {
            positions,
            normals,
            colors,
            uv,
            uv2,
        })
    }

    fn lookup_index(&self, index: i64, len: usize, pool: &str) -> Result<usize, X3dError> {
        usize::try_from(index)
            .ok()
            .filter(|&index| index < len)
            .ok_or_else(|| {
                X3dError::malformed_index(
                    INDEXED_FACE_SET,
                    format!("index {} out of range for {} with {} entries", index, pool, len),
                )
            })
    }
}

fn optional_pool<const N: usize>(
    element: &Element,
    attribute: &str,
    diagnostics: &mut Diagnostics,
) -> Option<Vec<[f32; N]>> {
    match numeric::decode_list::<N>(element.attr(attribute).unwrap_or_default()) {
        Ok(values) => Some(values),
        Err(error) => {
            diagnostics.push(error.in_attribute(&format!("{}@{}", element.name, attribute)));
            None
        }
    }
}

/// Growing per-corner arrays for the chunk being decoded.
struct ChunkBuilder {
    positions: Vec<Vec3>,
    normals: Option<Vec<Vec3>>,
    colors: Option<Vec<Vec4>>,
    uv: Option<Vec<Vec2>>,
    uv2: Option<Vec<Vec2>>,
}

impl ChunkBuilder {
    fn new(pools: &Pools) -> Self {
        Self {
            positions: Vec::new(),
            normals: pools.normals.as_ref().map(|_| Vec::new()),
            colors: pools.colors.as_ref().map(|_| Vec::new()),
            uv: pools.uv.as_ref().map(|_| Vec::new()),
            uv2: pools.uv2.as_ref().map(|_| Vec::new()),
        }
    }

    fn len(&self) -> usize {
        self.positions.len()
    }

    fn push_corner(&mut self, pools: &Pools, coord: usize, uv_index: i64) -> Result<(), X3dError> {
        self.positions.push(pools.positions[coord]);

        if let (Some(out), Some(pool)) = (self.normals.as_mut(), pools.normals.as_ref()) {
            out.push(pool[pools.lookup_index(coord as i64, pool.len(), "Normal")?]);
        }
        if let (Some(out), Some(pool)) = (self.colors.as_mut(), pools.colors.as_ref()) {
            out.push(pool[pools.lookup_index(coord as i64, pool.len(), "Color")?]);
        }
        if let (Some(out), Some(pool)) = (self.uv.as_mut(), pools.uv.as_ref()) {
            out.push(pool[pools.lookup_index(uv_index, pool.len(), "TextureCoordinate")?]);
        }
        if let (Some(out), Some(pool)) = (self.uv2.as_mut(), pools.uv2.as_ref()) {
            out.push(pool[pools.lookup_index(uv_index, pool.len(), "TextureCoordinate")?]);
        }

        Ok(())
    }

    fn finish(self, name: &str, chunk_index: usize) -> MeshData {
        let name = match chunk_index {
            0 => name.to_string(),
            n => format!("{}_{}", name, n),
        };
        let vertex_count = self.positions.len() as u32;

        MeshData {
            name,
            positions: self.positions,
            normals: self.normals,
            uv: self.uv,
            uv2: self.uv2,
            colors: self.colors,
            indices: (0..vertex_count).collect(),
        }
    }
}
