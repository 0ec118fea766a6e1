//! Quantized channel encodings shared by the V5 and compressed generations

use std::f32::consts::{FRAC_1_SQRT_2, SQRT_2};

use byteorder::{ByteOrder, LittleEndian};
use glam::{Quat, Vec3};

use crate::error::FormatError;

/// Largest negative `1 - (a² + b² + c²)` that is clamped to zero when
/// rebuilding the omitted quaternion component. Anything below is corrupt.
pub const QUAT_RECONSTRUCTION_EPSILON: f32 = 1e-3;

/// Maximum value of a 15-bit quaternion component
const COMPONENT_MAX: u32 = 0x7FFF;

/// Quantization step of one stored quaternion component
pub const QUAT_COMPONENT_STEP: f32 = SQRT_2 / COMPONENT_MAX as f32;

/// Per-component reconstruction error bound of a 48-bit quaternion.
///
/// Half a step on each stored component, plus the propagated error of the
/// rebuilt component (at most `√2` times the stored error per component).
pub const ROTATION_ERROR_BOUND: f32 = 3.0 * SQRT_2 / COMPONENT_MAX as f32;

/// Maximum value of a 16-bit linear channel
pub const LINEAR_MAX: f32 = u16::MAX as f32;

// ============================================================================
// Quaternion Encoding: Smallest-Three (48 bits)
// ============================================================================

/// Pack a rotation into 48 bits.
///
/// Bit layout (little-endian `u64`, low 48 bits used):
/// `[sign:1][idx:2][a:15][b:15][c:15]` from bit 47 down.
/// - idx identifies the omitted (largest magnitude) component
/// - a, b, c are the remaining components in `x, y, z, w` order
/// - sign is the sign of the omitted component; the encoder flips the
///   quaternion so it is always positive and writes 0
pub fn compress_quat(q: Quat) -> [u8; 6] {
    let q = q.normalize();
    let mut components = q.to_array();

    // 1. Index of the largest absolute component
    let mut idx = 0;
    for i in 1..4 {
        if components[i].abs() > components[idx].abs() {
            idx = i;
        }
    }

    // 2. q and -q are the same rotation: make the omitted component positive
    if components[idx] < 0.0 {
        for c in &mut components {
            *c = -*c;
        }
    }

    // 3. Quantize the remaining three: [-1/√2, 1/√2] → [0, 32767]
    let mut bits: u64 = (idx as u64) << 45;
    let mut shift = 30;
    for (i, &c) in components.iter().enumerate() {
        if i == idx {
            continue;
        }
        let v = ((c + FRAC_1_SQRT_2) / QUAT_COMPONENT_STEP)
            .round()
            .clamp(0.0, COMPONENT_MAX as f32) as u64;
        bits |= v << shift;
        shift -= 15;
    }

    let mut bytes = [0u8; 6];
    LittleEndian::write_u48(&mut bytes, bits);
    bytes
}

/// Unpack a 48-bit rotation.
///
/// `offset` is the file offset of the payload, reported on corruption.
pub fn decompress_quat(bytes: [u8; 6], offset: usize) -> Result<Quat, FormatError> {
    let bits = LittleEndian::read_u48(&bytes);

    let idx = ((bits >> 45) & 3) as usize;
    let negative = (bits >> 47) & 1 == 1;
    let component = |shift: u32| {
        ((bits >> shift) as u32 & COMPONENT_MAX) as f32 * QUAT_COMPONENT_STEP - FRAC_1_SQRT_2
    };
    let a = component(30);
    let b = component(15);
    let c = component(0);

    let sum_of_squares = a * a + b * b + c * c;
    let remainder = 1.0 - sum_of_squares;
    if remainder < -QUAT_RECONSTRUCTION_EPSILON {
        return Err(FormatError::CorruptQuantization {
            offset,
            sum_of_squares,
        });
    }
    if remainder < 0.0 {
        tracing::warn!(
            "Clamped quaternion at offset {} (sum of squares {})",
            offset,
            sum_of_squares
        );
    }
    let mut d = remainder.max(0.0).sqrt();
    if negative {
        d = -d;
    }

    let [x, y, z, w] = match idx {
        0 => [d, a, b, c],
        1 => [a, d, b, c],
        2 => [a, b, d, c],
        _ => [a, b, c, d],
    };
    Ok(Quat::from_xyzw(x, y, z, w).normalize())
}

// ============================================================================
// Linear Encoding (16 bits per axis)
// ============================================================================

/// Map `value` from `[min, max]` to `[0, 65535]`
pub fn quantize_u16(value: f32, min: f32, max: f32) -> u16 {
    let range = max - min;
    if range <= 0.0 {
        return 0;
    }
    ((value - min) / range * LINEAR_MAX).round().clamp(0.0, LINEAR_MAX) as u16
}

/// Inverse of [`quantize_u16`]
pub fn dequantize_u16(value: u16, min: f32, max: f32) -> f32 {
    (max - min) / LINEAR_MAX * value as f32 + min
}

/// Pack a vector as three 16-bit values over per-axis bounds
pub fn compress_vec3(v: Vec3, min: Vec3, max: Vec3) -> [u8; 6] {
    let values = [
        quantize_u16(v.x, min.x, max.x),
        quantize_u16(v.y, min.y, max.y),
        quantize_u16(v.z, min.z, max.z),
    ];
    let mut bytes = [0u8; 6];
    LittleEndian::write_u16_into(&values, &mut bytes);
    bytes
}

pub fn decompress_vec3(bytes: [u8; 6], min: Vec3, max: Vec3) -> Vec3 {
    let mut values = [0u16; 3];
    LittleEndian::read_u16_into(&bytes, &mut values);
    Vec3::new(
        dequantize_u16(values[0], min.x, max.x),
        dequantize_u16(values[1], min.y, max.y),
        dequantize_u16(values[2], min.z, max.z),
    )
}

/// Worst-case reconstruction error per axis for bounds `[min, max]`
pub fn linear_error_bound(min: Vec3, max: Vec3) -> Vec3 {
    (max - min) / LINEAR_MAX
}

// ============================================================================
// Time Encoding
// ============================================================================

/// Quantize frame `frame` of `frame_count` onto the 16-bit time axis
pub fn quantize_frame(frame: usize, frame_count: usize) -> u16 {
    if frame_count <= 1 {
        return 0;
    }
    let last = (frame_count - 1) as f64;
    (frame as f64 / last * LINEAR_MAX as f64).round() as u16
}

/// Frame index of a quantized time on a clip of `max_time` seconds at `frame_rate`
pub fn dequantize_frame(time: u16, max_time: f32, frame_rate: f32) -> usize {
    let seconds = time as f32 / LINEAR_MAX * max_time;
    (seconds * frame_rate).round().max(0.0) as usize
}
