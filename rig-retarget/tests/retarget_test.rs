//! Integration tests for retargeting
//!
//! Tests the full path: build skeletons -> retarget -> sample the result,
//! including a pass through the ANM and SKL codecs.

use glam::{Quat, Vec3};
use rig_common::formats::{anm, skl};
use rig_common::model::frame_time;
use rig_common::{Animation, Joint, Keyframe, Skeleton, Track, Transform};
use rig_retarget::{AutoMapOptions, JointMap, RetargetError, RetargetOptions, retarget};

/// Root -> Mid -> Tip, with the Mid -> Tip bone `length` long
fn chain(length: f32) -> Skeleton {
    Skeleton::new(
        vec![
            Joint::new("Root", None, Transform::IDENTITY),
            Joint::new("Mid", Some(0), Transform::from_translation(Vec3::Y)),
            Joint::new("Tip", Some(1), Transform::from_translation(Vec3::Y * length)),
        ],
        vec![0, 1, 2],
    )
    .unwrap()
}

/// Mid slides by `offset` and bends while the root turns
fn motion(offset: Vec3) -> Animation {
    let mut anim = Animation::new(30.0, 1.0);
    anim.insert_track(Track::named("Root").with_keys(vec![
        Keyframe::new(0.0, Transform::IDENTITY),
        Keyframe::new(1.0, Transform::from_rotation(Quat::from_rotation_y(1.0))),
    ]));
    anim.insert_track(Track::named("Mid").with_keys(vec![
        Keyframe::new(0.0, Transform::from_translation(Vec3::Y)),
        Keyframe::new(
            0.5,
            Transform::new(Vec3::Y + offset, Quat::from_rotation_x(0.4), Vec3::ONE),
        ),
    ]));
    anim
}

fn assert_same_motion(expected: &Animation, actual: &Animation, epsilon: f32) {
    for f in 0..expected.frame_count() {
        let time = frame_time(f, expected.frame_rate);
        for (&hash, track) in &expected.tracks {
            let e = track.sample(time).unwrap();
            let a = actual.sample(hash, time).unwrap();
            assert!(
                a.abs_diff_eq(&e, epsilon),
                "joint 0x{hash:08X} at frame {f}: {a:?} vs {e:?}"
            );
        }
    }
}

#[test]
fn test_identity_retarget_preserves_motion() {
    let skeleton = chain(1.0);
    let animation = motion(Vec3::new(0.5, 0.0, 0.0));
    let out = retarget(
        &skeleton,
        &animation,
        &skeleton,
        &JointMap::identity(&skeleton),
        &RetargetOptions::default(),
    )
    .unwrap();

    assert_eq!(out.frame_rate, animation.frame_rate);
    assert_eq!(out.tracks.len(), 2);
    assert_same_motion(&animation, &out, 1e-5);
}

#[test]
fn test_translation_scales_with_bone_length() {
    let d = Vec3::new(0.5, 0.0, 0.25);
    let source = chain(1.0);
    let target = chain(2.0);
    let mut animation = motion(d);
    animation.insert_track(Track::named("Tip").with_keys(vec![
        Keyframe::new(0.0, Transform::from_translation(Vec3::Y)),
        Keyframe::new(0.5, Transform::from_translation(Vec3::Y + d)),
    ]));
    let out = retarget(
        &source,
        &animation,
        &target,
        &JointMap::identity(&source),
        &RetargetOptions::default(),
    )
    .unwrap();

    // Mid -> Tip doubles, so the tip's motion doubles
    let tip = out.sample(target.joints()[2].hash, 0.5).unwrap();
    assert!(
        tip.translation.abs_diff_eq(Vec3::Y * 2.0 + d * 2.0, 1e-5),
        "Tip moved by {}",
        tip.translation - Vec3::Y * 2.0
    );

    // Root -> Mid keeps its length
    let mid = out.sample(target.joints()[1].hash, 0.5).unwrap();
    assert!(
        mid.translation.abs_diff_eq(Vec3::Y + d, 1e-5),
        "Mid moved by {}",
        mid.translation - Vec3::Y
    );
    assert!(mid.rotation.abs_diff_eq(Quat::from_rotation_x(0.4), 1e-5));

    // Roots transfer unscaled
    let root = out.sample(target.joints()[0].hash, 1.0 - 1.0 / 30.0).unwrap();
    assert!(root.translation.abs_diff_eq(Vec3::ZERO, 1e-6));
}

#[test]
fn test_unmapped_joints_keep_bind_pose() {
    let source = chain(1.0);
    let target = chain(1.0);
    let mut map = JointMap::new();
    map.insert("Mid", "Mid");
    let out = retarget(&source, &motion(Vec3::X), &target, &map, &RetargetOptions::default())
        .unwrap();
    assert_eq!(out.tracks.len(), 1);
    let pose = out.pose_at(&target, 0.5);
    assert_eq!(pose[0], target.joints()[0].local);
    assert_eq!(pose[2], target.joints()[2].local);
}

#[test]
fn test_animated_source_wins_shared_target() {
    let source = chain(1.0);
    let target = chain(1.0);
    // "Mid" comes first but only Tip moves
    let mut map = JointMap::new();
    map.insert("Mid", "Tip");
    map.insert("Tip", "Tip");
    let mut animation = Animation::new(30.0, 1.0);
    animation.insert_track(Track::named("Tip").with_keys(vec![
        Keyframe::new(0.0, Transform::from_translation(Vec3::Y)),
        Keyframe::new(1.0, Transform::from_translation(Vec3::Y + Vec3::X)),
    ]));

    let out = retarget(&source, &animation, &target, &map, &RetargetOptions::default()).unwrap();
    assert_eq!(out.tracks.len(), 1);
    let tip = out.sample(target.joints()[2].hash, 0.5).unwrap();
    assert!(tip.translation.abs_diff_eq(Vec3::Y + Vec3::X * 0.5, 1e-5), "{tip:?}");
}

#[test]
fn test_resample_frame_rate() {
    let skeleton = chain(1.0);
    let out = retarget(
        &skeleton,
        &motion(Vec3::X),
        &skeleton,
        &JointMap::identity(&skeleton),
        &RetargetOptions {
            frame_rate: Some(60.0),
        },
    )
    .unwrap();
    assert_eq!(out.frame_rate, 60.0);
    assert_eq!(out.frame_count(), 60);
    assert!(out.tracks.values().all(|t| t.keys.len() == 60));
}

#[test]
fn test_degenerate_source_bone() {
    let source = chain(0.0);
    let mut animation = motion(Vec3::X);
    animation.insert_track(
        Track::named("Tip").with_keys(vec![Keyframe::new(0.0, Transform::IDENTITY)]),
    );
    let result = retarget(
        &source,
        &animation,
        &chain(1.0),
        &JointMap::identity(&source),
        &RetargetOptions::default(),
    );
    assert!(matches!(result, Err(RetargetError::DegenerateBone { joint }) if joint == "Tip"));
}

#[test]
fn test_auto_map_through_codecs() {
    // Source joints use rig prefixes, the target does not
    let source = Skeleton::new(
        vec![
            Joint::new("C_Root", None, Transform::IDENTITY),
            Joint::new("C_Spine", Some(0), Transform::from_translation(Vec3::Y)),
            Joint::new("C_Head", Some(1), Transform::from_translation(Vec3::Y)),
        ],
        vec![0, 1, 2],
    )
    .unwrap();
    let target_bytes = skl::encode(&chain(1.0), skl::SklVersion::Modern).unwrap();
    let target = skl::decode(&target_bytes).unwrap();

    let map = JointMap::auto(&source, &target, &AutoMapOptions::default());
    assert_eq!(map.get("C_Root"), Some("Root"));
    assert_eq!(map.get("C_Spine"), None);

    let mut animation = Animation::new(30.0, 1.0);
    animation.insert_track(Track::named("C_Root").with_keys(vec![
        Keyframe::new(0.0, Transform::IDENTITY),
        Keyframe::new(1.0, Transform::from_translation(Vec3::Z)),
    ]));
    let bytes = anm::encode(&animation, anm::EncodeMode::Uncompressed).unwrap();
    let decoded = anm::decode(&bytes).unwrap();

    let out = retarget(&source, &decoded, &target, &map, &RetargetOptions::default()).unwrap();
    let root = out.sample(target.joints()[0].hash, 0.5).unwrap();
    assert!(root.translation.abs_diff_eq(Vec3::Z * 0.5, 1e-6));

    let compressed = anm::decode(&anm::encode(&out, anm::EncodeMode::Compressed).unwrap()).unwrap();
    assert_eq!(compressed.tracks.len(), 1);
}
