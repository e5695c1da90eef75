//! Rotation and transform attributes.
//!
//! Rotations travel as X3D `SFRotation` (axis + angle in radians) and live in
//! memory as unit quaternions. Radians are used at both the read and write
//! sites; there is no degree conversion anywhere in this codec.

use glam::{Quat, Vec3};

use crate::error::X3dError;
use crate::scene_graph::Transform;
use crate::x3d::document::Element;
use crate::x3d::numeric;

/// Scale of the synthetic root that converts the host's left-handed
/// coordinates to X3D's right-handed ones.
pub const HANDEDNESS_SCALE: Vec3 = Vec3::new(1.0, 1.0, -1.0);

const DEGENERATE_EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisAngle {
    pub axis: Vec3,
    pub angle: f32,
}

impl AxisAngle {
    pub const IDENTITY: AxisAngle = AxisAngle {
        axis: Vec3::Y,
        angle: 0.0,
    };
}

pub fn quat_to_axis_angle(rotation: Quat) -> AxisAngle {
    let rotation = rotation.normalize();
    // q and -q are the same rotation; pick w >= 0 so the angle is in [0, pi].
    let rotation = if rotation.w < 0.0 { -rotation } else { rotation };

    let angle = 2.0 * rotation.w.clamp(-1.0, 1.0).acos();
    let axis = rotation.xyz();
    let length = axis.length();

    if angle.abs() <= DEGENERATE_EPSILON || length <= DEGENERATE_EPSILON {
        return AxisAngle::IDENTITY;
    }

    AxisAngle {
        axis: axis / length,
        angle,
    }
}

pub fn axis_angle_to_quat(axis: Vec3, angle: f32) -> Quat {
    let length = axis.length();
    if length <= DEGENERATE_EPSILON || !angle.is_finite() {
        return Quat::IDENTITY;
    }

    Quat::from_axis_angle(axis / length, angle)
}

pub fn encode_rotation(rotation: Quat) -> String {
    let AxisAngle { axis, angle } = quat_to_axis_angle(rotation);
    numeric::encode_vec4(axis.extend(angle))
}

/// Absent rotation is the identity. X3D's default is `0 0 1 0`.
pub fn decode_rotation(text: Option<&str>) -> Result<Quat, X3dError> {
    let Some(text) = text else {
        return Ok(Quat::IDENTITY);
    };

    let values = numeric::decode_floats(text)?;
    match values.as_slice() {
        [] => Ok(Quat::IDENTITY),
        [x, y, z, angle] => Ok(axis_angle_to_quat(Vec3::new(*x, *y, *z), *angle)),
        _ => Err(X3dError::parse(text.trim())),
    }
}

/// Writes `translation`, `rotation` and `scale` onto a `Transform` element.
pub fn write_transform(element: &mut Element, transform: &Transform) {
    element.set_attr("translation", numeric::encode_vec3(transform.translation));
    element.set_attr("rotation", encode_rotation(transform.rotation));
    element.set_attr("scale", numeric::encode_vec3(transform.scale));
}

pub fn decode_translation(element: &Element) -> Result<Vec3, X3dError> {
    numeric::decode_vec3(element.attr("translation"), Vec3::ZERO)
        .map_err(|e| e.in_attribute("translation"))
}

pub fn decode_scale(element: &Element) -> Result<Vec3, X3dError> {
    numeric::decode_vec3(element.attr("scale"), Vec3::ONE).map_err(|e| e.in_attribute("scale"))
}

pub fn decode_orientation(element: &Element, attribute: &str) -> Result<Quat, X3dError> {
    decode_rotation(element.attr(attribute)).map_err(|e| e.in_attribute(attribute))
}

/// The synthetic root every exported hierarchy is wrapped in.
pub fn handedness_root() -> Element {
    Element::new("Transform").with_attr("scale", numeric::encode_vec3(HANDEDNESS_SCALE))
}
