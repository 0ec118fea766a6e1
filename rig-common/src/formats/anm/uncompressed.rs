//! Palette-based ANM generations (versions 4 and 5)
//!
//! # Layout
//! ```text
//! 0x00: magic [u8; 8]          - "r3d2anmd"
//! 0x08: version u32            - 4 or 5
//! 0x0C: header                 - see `AnmdHeader`
//! 0x4C: vectors [vec3]         - translations and scales
//!
//! v4: quaternions [quat (xyzw f32)]
//!     frames [frame_count][track_count]:
//!            joint_hash u32, translation u16, scale u16, rotation u16, pad u16
//!
//! v5: quaternions [48-bit smallest-three]
//!     joint_hashes [u32; track_count]
//!     frames [frame_count][track_count]:
//!            translation u16, scale u16, rotation u16
//! ```
//!
//! Palette entries are deduplicated on encode.

use std::collections::BTreeMap;
use std::hash::Hash;

use byteorder::{ByteOrder, LittleEndian};
use glam::Quat;
use hashbrown::HashMap;

use crate::error::FormatError;
use crate::model::{Animation, Keyframe, Track, Transform, frame_time};
use crate::stream::{BinaryReader, BinaryWriter};

use super::encoding::{compress_quat, decompress_quat};
use super::header::{ANM_MAGIC, AnmdHeader, OFFSET_BASE, absolute_offset};
use super::{DenseClip, dense_animation, frame_rate_from_duration};

const VECTOR_SIZE: usize = 12;
const V4_QUAT_SIZE: usize = 16;
const V5_QUAT_SIZE: usize = 6;
const V4_FRAME_SIZE: usize = 12;
const V5_FRAME_SIZE: usize = 6;

/// Palette entries are addressed by `u16`
const MAX_PALETTE_ENTRIES: usize = u16::MAX as usize + 1;

// ============================================================================
// Palettes
// ============================================================================

/// Deduplicating value table addressed by `u16`
struct Palette<K> {
    lookup: HashMap<K, u16>,
    entries: Vec<K>,
}

impl<K: Copy + Eq + Hash> Palette<K> {
    fn new() -> Self {
        Self {
            lookup: HashMap::new(),
            entries: Vec::new(),
        }
    }

    fn insert(&mut self, key: K, what: &'static str) -> Result<u16, FormatError> {
        if let Some(&index) = self.lookup.get(&key) {
            return Ok(index);
        }
        if self.entries.len() >= MAX_PALETTE_ENTRIES {
            return Err(FormatError::CountOverflow {
                what,
                count: self.entries.len() + 1,
                max: MAX_PALETTE_ENTRIES,
            });
        }
        let index = self.entries.len() as u16;
        self.entries.push(key);
        self.lookup.insert(key, index);
        Ok(index)
    }
}

fn vector_key(v: glam::Vec3) -> [u32; 3] {
    v.to_array().map(f32::to_bits)
}

fn quat_key(q: Quat) -> [u32; 4] {
    q.to_array().map(f32::to_bits)
}

fn palette_entry<T: Copy>(palette: &[T], index: u16) -> Result<T, FormatError> {
    palette
        .get(index as usize)
        .copied()
        .ok_or(FormatError::InvalidPaletteIndex {
            index: index as usize,
            palette_len: palette.len(),
        })
}

/// Number of `size`-byte entries between two absolute offsets
fn entries_between(start: usize, end: usize, size: usize) -> usize {
    end.saturating_sub(start) / size
}

fn check_counts(
    track_count: usize,
    frame_count: usize,
    frame_size: usize,
    r: &BinaryReader,
) -> Result<(), FormatError> {
    let entries = track_count
        .checked_mul(frame_count)
        .unwrap_or(usize::MAX);
    r.ensure_array(entries, frame_size)
}

fn header_for(version: u32, clip: &DenseClip) -> AnmdHeader {
    AnmdHeader {
        resource_size: 0,
        version: if version == 5 { 5 } else { 0 },
        flags: 0,
        track_count: clip.tracks.len() as u32,
        frame_count: clip.frame_count as u32,
        frame_duration: clip.frame_rate.recip(),
        joint_hashes_offset: 0,
        vectors_offset: AnmdHeader::DATA_OFFSET,
        quaternions_offset: 0,
        frames_offset: 0,
    }
}

fn relative(position: usize) -> i32 {
    (position - OFFSET_BASE) as i32
}

// ============================================================================
// Version 4
// ============================================================================

pub(super) fn encode_v4(animation: &Animation) -> Result<Vec<u8>, FormatError> {
    let clip = DenseClip::sample(animation)?;

    let mut vectors = Palette::new();
    let mut quats = Palette::new();
    let mut frames = Vec::with_capacity(clip.frame_count * clip.tracks.len());
    for f in 0..clip.frame_count {
        for track in &clip.tracks {
            let t = &track.frames[f];
            frames.push((
                track.joint_hash,
                vectors.insert(vector_key(t.translation), "palette vectors")?,
                vectors.insert(vector_key(t.scale), "palette vectors")?,
                quats.insert(quat_key(t.rotation), "palette quaternions")?,
            ));
        }
    }

    let mut header = header_for(4, &clip);
    let mut w = BinaryWriter::new();
    w.write_bytes(ANM_MAGIC);
    w.write_u32(4);
    header.write(&mut w);

    for v in &vectors.entries {
        for &bits in v {
            w.write_f32(f32::from_bits(bits));
        }
    }
    header.quaternions_offset = relative(w.position());
    for q in &quats.entries {
        for &bits in q {
            w.write_f32(f32::from_bits(bits));
        }
    }
    header.frames_offset = relative(w.position());
    for &(hash, t, s, r) in &frames {
        w.write_u32(hash);
        w.write_u16(t);
        w.write_u16(s);
        w.write_u16(r);
        w.write_u16(0);
    }

    header.resource_size = w.position() as u32;
    patch_header(&mut w, &header);
    Ok(w.into_inner())
}

pub(super) fn decode_v4(bytes: &[u8]) -> Result<Animation, FormatError> {
    let mut r = BinaryReader::new(bytes);
    r.skip(12)?;
    let header = AnmdHeader::read(&mut r)?;
    let frame_rate = frame_rate_from_duration(header.frame_duration)?;
    let track_count = header.track_count as usize;
    let frame_count = header.frame_count as usize;

    let vectors_at = absolute_offset(header.vectors_offset, &r)?;
    let quats_at = absolute_offset(header.quaternions_offset, &r)?;
    let frames_at = absolute_offset(header.frames_offset, &r)?;

    r.seek(vectors_at)?;
    let vector_count = entries_between(vectors_at, quats_at, VECTOR_SIZE);
    r.ensure_array(vector_count, VECTOR_SIZE)?;
    let vectors = (0..vector_count)
        .map(|_| r.read_vec3())
        .collect::<Result<Vec<_>, _>>()?;

    r.seek(quats_at)?;
    let quat_count = entries_between(quats_at, frames_at, V4_QUAT_SIZE);
    r.ensure_array(quat_count, V4_QUAT_SIZE)?;
    let quats = (0..quat_count)
        .map(|_| r.read_quat())
        .collect::<Result<Vec<_>, _>>()?;

    r.seek(frames_at)?;
    check_counts(track_count, frame_count, V4_FRAME_SIZE, &r)?;
    let mut tracks: BTreeMap<u32, Track> = BTreeMap::new();
    // No frame records to read without tracks
    let frame_records = if track_count == 0 { 0 } else { frame_count };
    for f in 0..frame_records {
        let time = frame_time(f, frame_rate);
        for _ in 0..track_count {
            let hash = r.read_u32()?;
            let t = palette_entry(&vectors, r.read_u16()?)?;
            let s = palette_entry(&vectors, r.read_u16()?)?;
            let q = palette_entry(&quats, r.read_u16()?)?;
            r.skip(2)?;

            let track = tracks.entry(hash).or_insert_with(|| Track::new(hash));
            let key = Keyframe::new(time, Transform::new(t, q, s));
            match track.keys.last_mut() {
                Some(last) if last.time == time => {
                    tracing::warn!("Duplicate frame {} for track 0x{:08X}", f, hash);
                    *last = key;
                }
                _ => track.keys.push(key),
            }
        }
    }

    Ok(dense_animation(frame_rate, frame_count, tracks.into_values()))
}

// ============================================================================
// Version 5
// ============================================================================

pub(super) fn encode_v5(animation: &Animation) -> Result<Vec<u8>, FormatError> {
    let clip = DenseClip::sample(animation)?;

    let mut vectors = Palette::new();
    let mut quats = Palette::new();
    let mut frames = Vec::with_capacity(clip.frame_count * clip.tracks.len());
    for f in 0..clip.frame_count {
        for track in &clip.tracks {
            let t = &track.frames[f];
            frames.push((
                vectors.insert(vector_key(t.translation), "palette vectors")?,
                vectors.insert(vector_key(t.scale), "palette vectors")?,
                quats.insert(compress_quat(t.rotation), "palette quaternions")?,
            ));
        }
    }

    let mut header = header_for(5, &clip);
    let mut w = BinaryWriter::new();
    w.write_bytes(ANM_MAGIC);
    w.write_u32(5);
    header.write(&mut w);

    for v in &vectors.entries {
        for &bits in v {
            w.write_f32(f32::from_bits(bits));
        }
    }
    header.quaternions_offset = relative(w.position());
    for q in &quats.entries {
        w.write_bytes(q);
    }
    header.joint_hashes_offset = relative(w.position());
    for track in &clip.tracks {
        w.write_u32(track.joint_hash);
    }
    header.frames_offset = relative(w.position());
    for &(t, s, r) in &frames {
        w.write_u16(t);
        w.write_u16(s);
        w.write_u16(r);
    }

    header.resource_size = w.position() as u32;
    patch_header(&mut w, &header);
    Ok(w.into_inner())
}

pub(super) fn decode_v5(bytes: &[u8]) -> Result<Animation, FormatError> {
    let mut r = BinaryReader::new(bytes);
    r.skip(12)?;
    let header = AnmdHeader::read(&mut r)?;
    let frame_rate = frame_rate_from_duration(header.frame_duration)?;
    let track_count = header.track_count as usize;
    let frame_count = header.frame_count as usize;

    let vectors_at = absolute_offset(header.vectors_offset, &r)?;
    let quats_at = absolute_offset(header.quaternions_offset, &r)?;
    let hashes_at = absolute_offset(header.joint_hashes_offset, &r)?;
    let frames_at = absolute_offset(header.frames_offset, &r)?;

    r.seek(vectors_at)?;
    let vector_count = entries_between(vectors_at, quats_at, VECTOR_SIZE);
    r.ensure_array(vector_count, VECTOR_SIZE)?;
    let vectors = (0..vector_count)
        .map(|_| r.read_vec3())
        .collect::<Result<Vec<_>, _>>()?;

    r.seek(quats_at)?;
    let quat_count = entries_between(quats_at, hashes_at, V5_QUAT_SIZE);
    r.ensure_array(quat_count, V5_QUAT_SIZE)?;
    let mut quats = Vec::with_capacity(quat_count);
    for _ in 0..quat_count {
        let offset = r.position();
        quats.push(decompress_quat(r.read_array()?, offset)?);
    }

    r.seek(hashes_at)?;
    let hashes = r.read_u32_array(track_count)?;

    r.seek(frames_at)?;
    check_counts(track_count, frame_count, V5_FRAME_SIZE, &r)?;
    let frame_records = if track_count == 0 { 0 } else { frame_count };
    let mut frames: Vec<Vec<Transform>> = (0..track_count)
        .map(|_| Vec::with_capacity(frame_records))
        .collect();
    for _ in 0..frame_records {
        for track_frames in frames.iter_mut() {
            let t = palette_entry(&vectors, r.read_u16()?)?;
            let s = palette_entry(&vectors, r.read_u16()?)?;
            let q = palette_entry(&quats, r.read_u16()?)?;
            track_frames.push(Transform::new(t, q, s));
        }
    }

    let tracks = hashes.into_iter().zip(frames).map(|(hash, frames)| {
        Track::new(hash).with_keys(super::dense_keys(frames, frame_rate))
    });
    Ok(dense_animation(frame_rate, frame_count, tracks))
}

/// Rewrite the header once offsets and sizes are known
fn patch_header(w: &mut BinaryWriter, header: &AnmdHeader) {
    let mut patched = BinaryWriter::with_capacity(AnmdHeader::SIZE);
    header.write(&mut patched);
    for (i, chunk) in patched.into_inner().chunks_exact(4).enumerate() {
        w.patch_u32(OFFSET_BASE + i * 4, LittleEndian::read_u32(chunk));
    }
}
