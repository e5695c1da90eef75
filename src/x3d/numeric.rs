//! Text encoding of scalars, vectors and lists.
//!
//! Floats are written with Rust's shortest round-trippable `Display`. Lists
//! write each value followed by one space. Decoding splits on any run of
//! whitespace or commas.

use glam::{Vec2, Vec3, Vec4};
use itertools::Itertools;

use crate::error::X3dError;

pub fn encode_scalar(value: f32) -> String {
    value.to_string()
}

pub fn encode_floats(values: &[f32]) -> String {
    values.iter().join(" ")
}

pub fn encode_vec2(v: Vec2) -> String {
    encode_floats(&v.to_array())
}

pub fn encode_vec3(v: Vec3) -> String {
    encode_floats(&v.to_array())
}

pub fn encode_vec4(v: Vec4) -> String {
    encode_floats(&v.to_array())
}

pub fn encode_bool(value: bool) -> &'static str {
    if value {
        "TRUE"
    } else {
        "FALSE"
    }
}

/// Encodes a list of vectors, each component followed by a space.
pub fn encode_list<const N: usize>(values: impl IntoIterator<Item = [f32; N]>) -> String {
    let mut text = String::new();
    for value in values {
        for component in value {
            text.push_str(&component.to_string());
            text.push(' ');
        }
    }
    text
}

pub fn encode_ints(values: impl IntoIterator<Item = i64>) -> String {
    let mut text = String::new();
    for value in values {
        text.push_str(&value.to_string());
        text.push(' ');
    }
    text
}

fn tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
}

pub fn decode_floats(text: &str) -> Result<Vec<f32>, X3dError> {
    tokens(text)
        .map(|token| token.parse::<f32>().map_err(|_| X3dError::parse(token)))
        .collect()
}

pub fn decode_ints(text: &str) -> Result<Vec<i64>, X3dError> {
    tokens(text)
        .map(|token| token.parse::<i64>().map_err(|_| X3dError::parse(token)))
        .collect()
}

/// Decodes exactly `N` components. Absent or blank text yields `default`; a
/// single token is broadcast to every component. Any other count is an error.
pub fn decode_array<const N: usize>(
    text: Option<&str>,
    default: [f32; N],
) -> Result<[f32; N], X3dError> {
    let Some(text) = text else {
        return Ok(default);
    };

    let values = decode_floats(text)?;
    match values.len() {
        0 => Ok(default),
        1 => Ok([values[0]; N]),
        len if len == N => {
            let mut out = default;
            out.copy_from_slice(&values);
            Ok(out)
        }
        _ => Err(X3dError::parse(text.trim())),
    }
}

pub fn decode_f32(text: Option<&str>, default: f32) -> Result<f32, X3dError> {
    Ok(decode_array::<1>(text, [default])?[0])
}

pub fn decode_vec2(text: Option<&str>, default: Vec2) -> Result<Vec2, X3dError> {
    decode_array(text, default.to_array()).map(Vec2::from_array)
}

pub fn decode_vec3(text: Option<&str>, default: Vec3) -> Result<Vec3, X3dError> {
    decode_array(text, default.to_array()).map(Vec3::from_array)
}

pub fn decode_bool(text: Option<&str>, default: bool) -> Result<bool, X3dError> {
    match text.map(str::trim) {
        None | Some("") => Ok(default),
        Some(value) if value.eq_ignore_ascii_case("true") => Ok(true),
        Some(value) if value.eq_ignore_ascii_case("false") => Ok(false),
        Some(value) => Err(X3dError::parse(value)),
    }
}

/// Decodes a flat list into `N`-component groups. A trailing partial group
/// is an error.
pub fn decode_list<const N: usize>(text: &str) -> Result<Vec<[f32; N]>, X3dError> {
    let values = decode_floats(text)?;
    if values.len() % N != 0 {
        return Err(X3dError::parse(format!(
            "{} values is not a multiple of {}",
            values.len(),
            N
        )));
    }

    Ok(values
        .chunks_exact(N)
        .map(|chunk| {
            let mut group = [0.0; N];
            group.copy_from_slice(chunk);
            group
        })
        .collect())
}
