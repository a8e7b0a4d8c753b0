use crate::{BoneData, Skeleton, SkeletonData, TransformConstraintData, UpdateCacheItem};
use std::sync::Arc;
use test_case::test_case;

fn assert_approx(actual: f32, expected: f32) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= 1.0e-3,
        "expected {expected}, got {actual} (diff {diff})"
    );
}

fn constraint(local: bool, relative: bool) -> TransformConstraintData {
    TransformConstraintData {
        name: "follow".to_string(),
        order: 0,
        skin_required: false,
        bones: vec![1],
        target: 2,
        mix_rotate: 0.0,
        mix_x: 0.0,
        mix_y: 0.0,
        mix_scale_x: 0.0,
        mix_scale_y: 0.0,
        mix_shear_y: 0.0,
        offset_rotation: 0.0,
        offset_x: 0.0,
        offset_y: 0.0,
        offset_scale_x: 0.0,
        offset_scale_y: 0.0,
        offset_shear_y: 0.0,
        relative,
        local,
    }
}

/// root, bone at (10, 0) rotated 10, target at (0, 20) rotated 50 and scaled 2.
fn skeleton(constraint: TransformConstraintData) -> Skeleton {
    let data = SkeletonData {
        bones: vec![
            BoneData {
                name: "root".to_string(),
                ..Default::default()
            },
            BoneData {
                name: "bone".to_string(),
                parent: Some(0),
                x: 10.0,
                rotation: 10.0,
                ..Default::default()
            },
            BoneData {
                name: "target".to_string(),
                parent: Some(0),
                y: 20.0,
                rotation: 50.0,
                scale_x: 2.0,
                scale_y: 2.0,
                ..Default::default()
            },
        ],
        transform_constraints: vec![constraint],
        ..Default::default()
    };
    Skeleton::new(Arc::new(data)).unwrap()
}

#[test_case(false, false, 50.0 ; "world absolute")]
#[test_case(false, true, 60.0 ; "world relative")]
#[test_case(true, false, 50.0 ; "local absolute")]
#[test_case(true, true, 60.0 ; "local relative")]
fn rotate_mix_follows_target(local: bool, relative: bool, expected: f32) {
    let mut c = constraint(local, relative);
    c.mix_rotate = 1.0;
    let mut skeleton = skeleton(c);
    skeleton.update_world_transform();

    assert_approx(skeleton.bones[1].world_rotation_x(), expected);
    // Translation is not mixed.
    assert_approx(skeleton.bones[1].world_x, 10.0);
    assert_approx(skeleton.bones[1].world_y, 0.0);
}

#[test]
fn world_translate_mix_moves_toward_target() {
    let mut c = constraint(false, false);
    c.mix_x = 0.5;
    c.mix_y = 0.5;
    let mut skeleton = skeleton(c);
    skeleton.update_world_transform();

    assert_approx(skeleton.bones[1].world_x, 5.0);
    assert_approx(skeleton.bones[1].world_y, 10.0);
    assert_approx(skeleton.bones[1].ax, 5.0);
    assert_approx(skeleton.bones[1].ay, 10.0);
}

#[test]
fn world_rotation_offset_is_added() {
    let mut c = constraint(false, false);
    c.mix_rotate = 1.0;
    c.offset_rotation = 15.0;
    let mut skeleton = skeleton(c);
    skeleton.update_world_transform();

    assert_approx(skeleton.bones[1].world_rotation_x(), 65.0);
}

#[test]
fn local_absolute_scale_interpolates() {
    let mut c = constraint(true, false);
    c.mix_scale_x = 0.5;
    c.mix_scale_y = 1.0;
    let mut skeleton = skeleton(c);
    skeleton.update_world_transform();

    assert_approx(skeleton.bones[1].ascale_x, 1.5);
    assert_approx(skeleton.bones[1].ascale_y, 2.0);
}

#[test]
fn local_relative_adds_target_pose() {
    let mut c = constraint(true, true);
    c.mix_x = 1.0;
    c.mix_y = 1.0;
    c.mix_scale_x = 1.0;
    let mut skeleton = skeleton(c);
    skeleton.update_world_transform();

    let bone = &skeleton.bones[1];
    assert_approx(bone.ax, 10.0);
    assert_approx(bone.ay, 20.0);
    assert_approx(bone.ascale_x, 2.0);
    assert_approx(bone.world_y, 20.0);
}

#[test]
fn zero_mixes_leave_bone_alone() {
    let mut skeleton = skeleton(constraint(false, false));
    skeleton.update_world_transform();

    let bone = &skeleton.bones[1];
    assert_approx(bone.world_rotation_x(), 10.0);
    assert_approx(bone.world_x, 10.0);
    assert!(skeleton
        .update_cache_items()
        .contains(&UpdateCacheItem::Transform(0)));
}
