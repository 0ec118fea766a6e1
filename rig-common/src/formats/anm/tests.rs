//! Tests for the ANM codecs

use super::*;
use crate::hash::elf_hash;
use crate::model::{DEFAULT_FRAME_RATE, Keyframe};
use glam::{Quat, Vec4};
use std::f32::consts::FRAC_PI_2;

fn walk() -> Animation {
    let mut anim = Animation::new(30.0, 1.0);
    anim.insert_track(Track::named("Root").with_keys(vec![
        Keyframe::new(0.0, Transform::IDENTITY),
        Keyframe::new(
            0.5,
            Transform::new(Vec3::new(0.0, 2.0, 1.0), Quat::from_rotation_y(1.0), Vec3::ONE),
        ),
        Keyframe::new(
            1.0,
            Transform::new(Vec3::new(0.0, 0.0, 3.0), Quat::from_rotation_y(2.0), Vec3::ONE),
        ),
    ]));
    anim.insert_track(Track::named("Arm").with_keys(vec![
        Keyframe::new(0.0, Transform::from_translation(Vec3::X)),
        Keyframe::new(
            1.0,
            Transform::new(Vec3::X, Quat::from_rotation_z(FRAC_PI_2), Vec3::splat(1.5)),
        ),
    ]));
    anim
}

fn constant() -> Animation {
    let pose = Transform::new(Vec3::new(1.0, 2.0, 3.0), Quat::from_rotation_x(0.3), Vec3::ONE);
    let mut anim = Animation::new(30.0, 1.0);
    anim.insert_track(Track::named("Still").with_keys(vec![Keyframe::new(0.0, pose)]));
    anim
}

fn within(a: Vec3, b: Vec3, bound: Vec3) -> bool {
    ((a - b).abs() - bound).max_element() <= 1e-5
}

fn rotation_within(a: Quat, b: Quat, bound: f32) -> bool {
    let b = if a.dot(b) < 0.0 { -b } else { b };
    (Vec4::from(a) - Vec4::from(b)).abs().max_element() <= bound + 1e-5
}

/// Compare every track of `expected` on its frame grid
fn assert_within(expected: &Animation, actual: &Animation, bound: ErrorBound) {
    assert_eq!(actual.tracks.len(), expected.tracks.len());
    for f in 0..expected.frame_count() {
        let time = frame_time(f, expected.frame_rate);
        for (&hash, track) in &expected.tracks {
            let e = track.sample(time).unwrap();
            let a = actual.sample(hash, time).unwrap();
            assert!(
                within(a.translation, e.translation, bound.translation),
                "translation of 0x{hash:08X} at frame {f}: {} vs {}",
                a.translation,
                e.translation
            );
            assert!(
                rotation_within(a.rotation, e.rotation, bound.rotation),
                "rotation of 0x{hash:08X} at frame {f}: {} vs {}",
                a.rotation,
                e.rotation
            );
            assert!(
                within(a.scale, e.scale, bound.scale),
                "scale of 0x{hash:08X} at frame {f}: {} vs {}",
                a.scale,
                e.scale
            );
        }
    }
}

fn read_i32(bytes: &[u8], at: usize) -> i32 {
    i32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
}

const EXACT: ErrorBound = ErrorBound {
    translation: Vec3::ZERO,
    rotation: 0.0,
    scale: Vec3::ZERO,
};

// ============================================================================
// Detection
// ============================================================================

#[test]
fn test_detect_version() {
    let anim = walk();
    for version in [AnmVersion::Legacy3, AnmVersion::V4, AnmVersion::V5, AnmVersion::Compressed] {
        let bytes = encode_version(&anim, version).unwrap();
        assert_eq!(detect_version(&bytes), Ok(version));
    }
}

#[test]
fn test_bad_magic() {
    let mut bytes = encode(&walk(), EncodeMode::Uncompressed).unwrap();
    bytes[0] = b'x';
    assert_eq!(decode(&bytes), Err(FormatError::BadMagic { format: "ANM" }));
}

#[test]
fn test_unsupported_version() {
    let mut bytes = encode(&walk(), EncodeMode::Uncompressed).unwrap();
    bytes[8] = 9;
    assert_eq!(
        decode(&bytes),
        Err(FormatError::UnsupportedVersion {
            format: "ANM",
            version: 9
        })
    );

    let mut bytes = encode(&walk(), EncodeMode::Compressed).unwrap();
    bytes[8] = 4;
    assert_eq!(
        decode(&bytes),
        Err(FormatError::UnsupportedVersion {
            format: "ANM",
            version: 4
        })
    );
}

#[test]
fn test_short_prefix() {
    assert!(matches!(
        detect_version(b"r3d2anmd"),
        Err(FormatError::Truncated { .. })
    ));
}

#[test]
fn test_truncated_every_generation() {
    let anim = walk();
    for version in [AnmVersion::Legacy3, AnmVersion::V4, AnmVersion::V5, AnmVersion::Compressed] {
        let bytes = encode_version(&anim, version).unwrap();
        let result = decode(&bytes[..bytes.len() - 1]);
        assert!(
            matches!(result, Err(FormatError::Truncated { .. })),
            "{}: {:?}",
            version.name(),
            result
        );
    }
}

// ============================================================================
// Uncompressed generations
// ============================================================================

#[test]
fn test_v4_roundtrip_exact() {
    let anim = walk();
    let bytes = encode(&anim, EncodeMode::Uncompressed).unwrap();
    let decoded = decode(&bytes).unwrap();

    assert_eq!(decoded.frame_rate, 30.0);
    assert_eq!(decoded.duration, 1.0);
    assert_eq!(decoded.frame_count(), 30);
    assert_within(&anim, &decoded, EXACT);
    for track in decoded.tracks.values() {
        assert_eq!(track.keys.len(), 30);
        assert_eq!(track.name, None);
    }

    // Dense clips re-encode to the same bytes
    assert_eq!(encode(&decoded, EncodeMode::Uncompressed).unwrap(), bytes);
}

#[test]
fn test_v4_resamples_onto_frame_grid() {
    let mut anim = Animation::new(30.0, 1.0);
    anim.insert_track(Track::named("Hip").with_keys(vec![
        Keyframe::new(0.0, Transform::IDENTITY),
        Keyframe::new(0.51, Transform::from_translation(Vec3::new(5.1, 0.0, 2.0))),
    ]));
    let source = anim.track(elf_hash("Hip")).unwrap();

    let decoded = decode(&encode(&anim, EncodeMode::Uncompressed).unwrap()).unwrap();
    let track = decoded.track(elf_hash("Hip")).unwrap();
    assert_eq!(track.name, None);
    assert_eq!(track.keys.len(), 30);
    for (f, key) in track.keys.iter().enumerate() {
        let time = frame_time(f, 30.0);
        assert_eq!(key.time, time);
        assert_eq!(key.transform(), source.sample(time).unwrap(), "frame {f}");
    }
    // The off-grid key itself is not kept
    assert!(track.keys.iter().all(|k| k.time != 0.51));
}

#[test]
fn test_v4_layout() {
    let bytes = encode(&walk(), EncodeMode::Uncompressed).unwrap();
    assert_eq!(&bytes[0..8], ANM_MAGIC);
    assert_eq!(read_u32(&bytes, 8), 4);
    assert_eq!(read_u32(&bytes, 12) as usize, bytes.len());
    assert_eq!(read_u32(&bytes, 16), ANM_FORMAT_TOKEN);
    // track and frame counts
    assert_eq!(read_u32(&bytes, 0x1C), 2);
    assert_eq!(read_u32(&bytes, 0x20), 30);
    // v4 stores no hash table
    assert_eq!(read_i32(&bytes, 0x28), 0);
    assert_eq!(read_i32(&bytes, 0x34), AnmdHeader::DATA_OFFSET);

    let frames_at = read_i32(&bytes, 0x3C) as usize + 12;
    assert_eq!(bytes.len() - frames_at, 2 * 30 * 12);
}

#[test]
fn test_v4_palettes_deduplicate() {
    let bytes = encode(&constant(), EncodeMode::Uncompressed).unwrap();
    let vectors = read_i32(&bytes, 0x34);
    let quats = read_i32(&bytes, 0x38);
    let frames = read_i32(&bytes, 0x3C);
    // translation + scale, one rotation
    assert_eq!((quats - vectors) / 12, 2);
    assert_eq!((frames - quats) / 16, 1);
}

#[test]
fn test_v5_roundtrip_quantizes_rotation_only() {
    let anim = walk();
    let bytes = encode_version(&anim, AnmVersion::V5).unwrap();
    let decoded = decode(&bytes).unwrap();
    assert_eq!(decoded.duration, 1.0);
    assert_within(
        &anim,
        &decoded,
        ErrorBound {
            rotation: ROTATION_ERROR_BOUND,
            ..EXACT
        },
    );
}

#[test]
fn test_v5_layout() {
    let bytes = encode_version(&walk(), AnmVersion::V5).unwrap();
    assert_eq!(read_u32(&bytes, 8), 5);
    assert_eq!(read_u32(&bytes, 0x14), 5);
    let quats = read_i32(&bytes, 0x38);
    let hashes = read_i32(&bytes, 0x28);
    let frames = read_i32(&bytes, 0x3C);
    assert_eq!((hashes - quats) % 6, 0);
    assert_eq!(frames - hashes, 2 * 4);
    assert_eq!(bytes.len() - (frames as usize + 12), 2 * 30 * 6);
}

#[test]
fn test_v5_corrupt_quaternion() {
    let mut bytes = encode_version(&walk(), AnmVersion::V5).unwrap();
    let quats_at = read_i32(&bytes, 0x38) as usize + 12;
    // Three stored components at the maximum cannot be a unit quaternion
    let bits: u64 = (0x7FFF << 30) | (0x7FFF << 15) | 0x7FFF;
    bytes[quats_at..quats_at + 6].copy_from_slice(&bits.to_le_bytes()[..6]);
    assert!(matches!(
        decode(&bytes),
        Err(FormatError::CorruptQuantization { offset, .. }) if offset == quats_at
    ));
}

#[test]
fn test_trackless_header_with_huge_frame_count() {
    for version in [AnmVersion::V4, AnmVersion::V5] {
        let mut bytes = encode_version(&walk(), version).unwrap();
        bytes[0x1C..0x20].copy_from_slice(&0u32.to_le_bytes());
        bytes[0x20..0x24].copy_from_slice(&u32::MAX.to_le_bytes());
        let decoded = decode(&bytes).unwrap();
        assert!(decoded.tracks.is_empty(), "{version:?}");
        assert_eq!(decoded.frame_rate, 30.0);
    }
}

#[test]
fn test_v4_invalid_palette_index() {
    let mut bytes = encode(&walk(), EncodeMode::Uncompressed).unwrap();
    let frames_at = read_i32(&bytes, 0x3C) as usize + 12;
    // rotation index of the first frame entry
    bytes[frames_at + 8..frames_at + 10].copy_from_slice(&u16::MAX.to_le_bytes());
    assert!(matches!(
        decode(&bytes),
        Err(FormatError::InvalidPaletteIndex { index: 65535, .. })
    ));
}

#[test]
fn test_frame_rate_snaps_to_integer() {
    let mut anim = walk();
    anim.frame_rate = 24.0;
    let decoded = decode(&encode(&anim, EncodeMode::Uncompressed).unwrap()).unwrap();
    assert_eq!(decoded.frame_rate, 24.0);

    anim.frame_rate = 29.97;
    let decoded = decode(&encode(&anim, EncodeMode::Uncompressed).unwrap()).unwrap();
    assert!((decoded.frame_rate - 29.97).abs() < 1e-3);
    assert_ne!(decoded.frame_rate, 30.0);
}

#[test]
fn test_invalid_frame_rate() {
    let mut anim = walk();
    anim.frame_rate = 0.0;
    assert_eq!(
        encode(&anim, EncodeMode::Uncompressed),
        Err(FormatError::InvalidFrameRate { frame_rate: 0.0 })
    );
}

#[test]
fn test_single_pose_gets_one_frame() {
    let mut anim = Animation::new(30.0, 0.0);
    anim.insert_track(
        Track::named("Root").with_keys(vec![Keyframe::new(0.0, Transform::from_translation(Vec3::Y))]),
    );
    let decoded = decode(&encode(&anim, EncodeMode::Uncompressed).unwrap()).unwrap();
    assert_eq!(decoded.frame_count(), 1);
    assert_eq!(
        decoded.sample(elf_hash("Root"), 0.0),
        Some(Transform::from_translation(Vec3::Y))
    );
}

#[test]
fn test_empty_tracks_are_skipped() {
    let mut anim = walk();
    anim.insert_track(Track::named("Unused"));
    let decoded = decode(&encode(&anim, EncodeMode::Uncompressed).unwrap()).unwrap();
    assert_eq!(decoded.tracks.len(), 2);
}

// ============================================================================
// Legacy generation
// ============================================================================

#[test]
fn test_legacy_roundtrip_keeps_names() {
    let mut anim = walk();
    // Legacy stores no scale
    for track in anim.tracks.values_mut() {
        for key in &mut track.keys {
            key.scale = Vec3::ONE;
        }
    }
    let bytes = encode_version(&anim, AnmVersion::Legacy3).unwrap();
    let decoded = decode(&bytes).unwrap();
    assert_within(&anim, &decoded, EXACT);
    assert_eq!(decoded.track(elf_hash("Arm")).unwrap().name.as_deref(), Some("Arm"));
    assert_eq!(bytes.len(), 28 + 2 * (32 + 4 + 30 * 28));
}

#[test]
fn test_legacy_drops_scale() {
    let decoded = decode(&encode_version(&walk(), AnmVersion::Legacy3).unwrap()).unwrap();
    for track in decoded.tracks.values() {
        assert!(track.keys.iter().all(|k| k.scale == Vec3::ONE));
    }
}

#[test]
fn test_legacy_zero_fps_defaults() {
    let mut bytes = encode_version(&walk(), AnmVersion::Legacy3).unwrap();
    bytes[0x18..0x1C].copy_from_slice(&0u32.to_le_bytes());
    assert_eq!(decode(&bytes).unwrap().frame_rate, DEFAULT_FRAME_RATE);
}

#[test]
fn test_legacy_requires_names() {
    let mut anim = Animation::new(30.0, 1.0);
    anim.insert_track(Track::new(0x1234).with_keys(vec![Keyframe::new(0.0, Transform::IDENTITY)]));
    assert_eq!(
        encode_version(&anim, AnmVersion::Legacy3),
        Err(FormatError::MissingJointName { joint_hash: 0x1234 })
    );
}

// ============================================================================
// Compressed generation
// ============================================================================

#[test]
fn test_compressed_within_error_bound() {
    let anim = walk();
    let bound = error_bound(&anim).unwrap();
    let decoded = decode(&encode(&anim, EncodeMode::Compressed).unwrap()).unwrap();
    assert!((decoded.duration - 1.0).abs() < 1e-5);
    assert_eq!(decoded.frame_rate, 30.0);
    assert_within(&anim, &decoded, bound);
}

#[test]
fn test_error_bound_is_global() {
    let bound = error_bound(&walk()).unwrap();
    assert_eq!(bound.rotation, ROTATION_ERROR_BOUND);
    // Ranges span both tracks: x from the arm, y from the root
    assert!((bound.translation.x - 1.0 / 65535.0).abs() < 1e-9);
    assert!((bound.translation.y - 2.0 / 65535.0).abs() < 1e-9);
    assert!(bound.translation.z > 0.0 && bound.translation.z < 3.0 / 65535.0);
    assert!(bound.scale.x > 0.0 && bound.scale.x < 0.5 / 65535.0);
}

#[test]
fn test_compressed_empty_clip_keeps_zero_duration() {
    let empty = Animation::new(30.0, 0.0);
    let decoded = decode(&encode(&empty, EncodeMode::Compressed).unwrap()).unwrap();
    assert_eq!(decoded.duration, 0.0);
    assert_eq!(decoded.frame_count(), 0);
    assert!(decoded.tracks.is_empty());

    // A single pose still spans one frame
    let decoded = decode(&encode(&constant(), EncodeMode::Compressed).unwrap()).unwrap();
    assert_eq!(decoded.frame_count(), 30);
}

#[test]
fn test_compressed_eliminates_constant_runs() {
    let anim = constant();
    let bytes = encode(&anim, EncodeMode::Compressed).unwrap();
    // first and last key of each channel
    assert_eq!(read_u32(&bytes, 0x1C), 6);
    assert_eq!(read_u32(&bytes, 0x18), 1);

    let decoded = decode(&bytes).unwrap();
    let track = decoded.track(elf_hash("Still")).unwrap();
    assert_eq!(track.keys.len(), 2);
    assert_within(&anim, &decoded, error_bound(&anim).unwrap());
}

#[test]
fn test_compressed_entries_sorted_by_time() {
    let bytes = encode(&walk(), EncodeMode::Compressed).unwrap();
    let count = read_u32(&bytes, 0x1C) as usize;
    let frames_at = read_i32(&bytes, 0x74) as usize + 12;
    let times: Vec<u16> = (0..count)
        .map(|i| {
            let at = frames_at + i * 10;
            u16::from_le_bytes([bytes[at], bytes[at + 1]])
        })
        .collect();
    assert!(times.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(times.first(), Some(&0));
    assert_eq!(times.last(), Some(&u16::MAX));
}

#[test]
fn test_compressed_invalid_joint_index() {
    let mut bytes = encode(&walk(), EncodeMode::Compressed).unwrap();
    let frames_at = read_i32(&bytes, 0x74) as usize + 12;
    bytes[frames_at + 2..frames_at + 4].copy_from_slice(&5u16.to_le_bytes());
    assert_eq!(
        decode(&bytes),
        Err(FormatError::InvalidTrackReference {
            index: 5,
            track_count: 2
        })
    );
}

#[test]
fn test_compressed_invalid_channel() {
    let mut bytes = encode(&walk(), EncodeMode::Compressed).unwrap();
    let frames_at = read_i32(&bytes, 0x74) as usize + 12;
    bytes[frames_at + 2..frames_at + 4].copy_from_slice(&(3u16 << 14).to_le_bytes());
    assert_eq!(
        decode(&bytes),
        Err(FormatError::InvalidChannel {
            offset: frames_at,
            channel: 3
        })
    );
}

#[test]
fn test_compressed_joint_limit() {
    let mut anim = Animation::new(30.0, 0.0);
    for i in 0..=MAX_COMPRESSED_JOINTS as u32 {
        anim.insert_track(Track::new(i).with_keys(vec![Keyframe::new(0.0, Transform::IDENTITY)]));
    }
    assert_eq!(
        encode(&anim, EncodeMode::Compressed),
        Err(FormatError::CountOverflow {
            what: "compressed joints",
            count: MAX_COMPRESSED_JOINTS + 1,
            max: MAX_COMPRESSED_JOINTS
        })
    );
}

// ============================================================================
// Quaternion quantization
// ============================================================================

#[test]
fn test_quat_sign_is_canonical() {
    let q = Quat::from_rotation_y(2.5);
    let packed = compress_quat(q);
    assert_eq!(packed, compress_quat(-q));
    assert_eq!(packed[5] & 0x80, 0);
    let restored = decompress_quat(packed, 0).unwrap();
    assert!(rotation_within(restored, q, ROTATION_ERROR_BOUND));
}

#[test]
fn test_quat_reconstruction_near_unit() {
    // a = b = 1/√2, c ≈ 0: the rebuilt component is clamped to zero
    let bits: u64 = (3 << 45) | (0x7FFF << 30) | (0x7FFF << 15) | 0x4000;
    let bytes: [u8; 6] = bits.to_le_bytes()[..6].try_into().unwrap();
    let q = decompress_quat(bytes, 0).unwrap();
    assert!(q.is_normalized());
    assert!(q.w.abs() < 1e-2);
}

#[test]
fn test_quantize_u16_degenerate_range() {
    assert_eq!(quantize_u16(5.0, 5.0, 5.0), 0);
    assert_eq!(dequantize_u16(0, 5.0, 5.0), 5.0);
    assert_eq!(quantize_u16(1.0, 0.0, 1.0), u16::MAX);
}

#[test]
fn test_version_from_str() {
    assert_eq!("compressed".parse(), Ok(AnmVersion::Compressed));
    assert_eq!("V4".parse(), Ok(AnmVersion::V4));
    assert_eq!("legacy".parse(), Ok(AnmVersion::Legacy3));
    assert!("v6".parse::<AnmVersion>().is_err());
}
