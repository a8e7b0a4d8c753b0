use crate::{
    Animation, AttachmentData, BoneData, CurveFrame, CurveTimeline, MixBlend, MixDirection,
    PathAttachmentData, PathConstraintData, PositionMode, RotateMode, Skeleton, SkeletonData,
    SkinData, SlotData, SpacingMode, Timeline, VertexData,
};
use std::collections::HashMap;
use std::sync::Arc;
use test_case::test_case;

fn assert_approx(actual: f32, expected: f32, tolerance: f32) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= tolerance,
        "expected {expected}, got {actual} (diff {diff})"
    );
}

/// One open curve along the x axis from 0 to 100 with the given inner control points.
fn straight_path(out0: f32, in1: f32, constant_speed: bool) -> AttachmentData {
    AttachmentData::Path(PathAttachmentData {
        name: "path".to_string(),
        vertices: VertexData::Unweighted(vec![
            [0.0, 0.0],
            [0.0, 0.0],
            [out0, 0.0],
            [in1, 0.0],
            [100.0, 0.0],
            [100.0, 0.0],
        ]),
        lengths: vec![100.0],
        closed: false,
        constant_speed,
    })
}

fn constraint(spacing_mode: SpacingMode, rotate_mode: RotateMode) -> PathConstraintData {
    PathConstraintData {
        name: "follow".to_string(),
        order: 0,
        skin_required: false,
        bones: vec![1, 2],
        target: 0,
        position_mode: PositionMode::Fixed,
        spacing_mode,
        rotate_mode,
        offset_rotation: 0.0,
        position: 10.0,
        spacing: 0.0,
        mix_rotate: 1.0,
        mix_x: 1.0,
        mix_y: 1.0,
    }
}

/// root carrying the path slot, then a two bone chain of length 20 each rotated off the path.
fn skeleton(path: AttachmentData, constraint: PathConstraintData) -> Skeleton {
    let mut default_skin = SkinData {
        name: "default".to_string(),
        ..Default::default()
    };
    default_skin.set_attachment(0, "path", path);
    let mut skins = HashMap::new();
    skins.insert("default".to_string(), default_skin);

    let data = SkeletonData {
        bones: vec![
            BoneData {
                name: "root".to_string(),
                ..Default::default()
            },
            BoneData {
                name: "first".to_string(),
                parent: Some(0),
                y: 30.0,
                rotation: 45.0,
                length: 20.0,
                ..Default::default()
            },
            BoneData {
                name: "second".to_string(),
                parent: Some(1),
                x: 20.0,
                length: 20.0,
                ..Default::default()
            },
        ],
        slots: vec![SlotData {
            name: "path".to_string(),
            bone: 0,
            attachment: Some("path".to_string()),
            ..Default::default()
        }],
        skins,
        path_constraints: vec![constraint],
        ..Default::default()
    };
    Skeleton::new(Arc::new(data)).unwrap()
}

#[test]
fn tangent_mode_places_bones_along_path() {
    let mut skeleton = skeleton(
        straight_path(100.0 / 3.0, 200.0 / 3.0, false),
        constraint(SpacingMode::Length, RotateMode::Tangent),
    );
    skeleton.update_world_transform();

    let [first, second] = [&skeleton.bones[1], &skeleton.bones[2]];
    assert_approx(first.world_x, 10.0, 1.0e-3);
    assert_approx(first.world_y, 0.0, 1.0e-3);
    assert_approx(second.world_x, 30.0, 1.0e-3);
    assert_approx(second.world_y, 0.0, 1.0e-3);
    assert_approx(first.world_rotation_x(), 0.0, 1.0e-3);
    assert_approx(second.world_rotation_x(), 0.0, 1.0e-3);
}

#[test_case(SpacingMode::Length, 5.0, 25.0 ; "length adds spacing to bone length")]
#[test_case(SpacingMode::Fixed, 15.0, 15.0 ; "fixed")]
#[test_case(SpacingMode::Percent, 0.25, 25.0 ; "percent of path length")]
#[test_case(SpacingMode::Proportional, 0.5, 50.0 ; "proportional to bone length")]
fn spacing_modes(mode: SpacingMode, spacing: f32, gap: f32) {
    let mut c = constraint(mode, RotateMode::Tangent);
    c.spacing = spacing;
    let mut skeleton = skeleton(straight_path(100.0 / 3.0, 200.0 / 3.0, false), c);
    skeleton.update_world_transform();

    assert_approx(skeleton.bones[1].world_x, 10.0, 1.0e-3);
    assert_approx(skeleton.bones[2].world_x, 10.0 + gap, 1.0e-3);
}

#[test]
fn percent_position_scales_by_path_length() {
    let mut c = constraint(SpacingMode::Length, RotateMode::Tangent);
    c.position_mode = PositionMode::Percent;
    c.position = 0.5;
    let mut skeleton = skeleton(straight_path(100.0 / 3.0, 200.0 / 3.0, false), c);
    skeleton.update_world_transform();

    assert_approx(skeleton.bones[1].world_x, 50.0, 1.0e-3);
    assert_approx(skeleton.bones[2].world_x, 70.0, 1.0e-3);
}

#[test]
fn positions_past_the_end_extrapolate_along_tangent() {
    let mut c = constraint(SpacingMode::Length, RotateMode::Tangent);
    c.position = 90.0;
    let mut skeleton = skeleton(straight_path(100.0 / 3.0, 200.0 / 3.0, false), c);
    skeleton.update_world_transform();

    assert_approx(skeleton.bones[2].world_x, 110.0, 1.0e-3);
    assert_approx(skeleton.bones[2].world_y, 0.0, 1.0e-3);
}

#[test]
fn chain_scale_stretches_bones_to_spacing() {
    let mut c = constraint(SpacingMode::Fixed, RotateMode::ChainScale);
    c.spacing = 30.0;
    let mut skeleton = skeleton(straight_path(100.0 / 3.0, 200.0 / 3.0, false), c);
    skeleton.update_world_transform();

    let first = &skeleton.bones[1];
    assert_approx(first.world_x, 10.0, 1.0e-3);
    assert_approx(first.world_scale_x(), 1.5, 1.0e-3);
    assert_approx(first.world_rotation_x(), 0.0, 1.0e-3);
    assert_approx(skeleton.bones[2].world_x, 40.0, 1.0e-3);
}

#[test]
fn constant_speed_spaces_by_arc_length() {
    let mut c = constraint(SpacingMode::Length, RotateMode::Tangent);
    c.position = 50.0;

    // Control points bunched at the start: parameter 0.5 lands at x = 18.125.
    let mut uneven = skeleton(straight_path(5.0, 10.0, false), c.clone());
    uneven.update_world_transform();
    assert_approx(uneven.bones[1].world_x, 18.125, 1.0e-3);

    let mut constant = skeleton(straight_path(5.0, 10.0, true), c);
    constant.update_world_transform();
    assert_approx(constant.bones[1].world_x, 50.0, 1.5);
}

#[test]
fn zero_mixes_skip_the_constraint() {
    let mut c = constraint(SpacingMode::Length, RotateMode::Tangent);
    c.mix_rotate = 0.0;
    c.mix_x = 0.0;
    c.mix_y = 0.0;
    let mut skeleton = skeleton(straight_path(100.0 / 3.0, 200.0 / 3.0, false), c);
    skeleton.update_world_transform();

    assert_approx(skeleton.bones[1].world_y, 30.0, 1.0e-4);
    assert_approx(skeleton.bones[1].world_rotation_x(), 45.0, 1.0e-3);
}

#[test]
fn timelines_key_position_and_mixes() {
    let mut skeleton = skeleton(
        straight_path(100.0 / 3.0, 200.0 / 3.0, false),
        constraint(SpacingMode::Length, RotateMode::Tangent),
    );
    let animation = Animation::new(
        "slide",
        vec![
            Timeline::PathConstraintPosition(CurveTimeline::new(
                0,
                vec![
                    CurveFrame::linear(0.0, [10.0]),
                    CurveFrame::linear(1.0, [50.0]),
                ],
            )),
            Timeline::PathConstraintMix(CurveTimeline::new(
                0,
                vec![CurveFrame::linear(0.5, [0.5, 0.25, 0.0])],
            )),
        ],
    );
    let apply = |skeleton: &mut Skeleton, time: f32, alpha: f32, blend: MixBlend| {
        animation.apply(skeleton, time, time, false, None, alpha, blend, MixDirection::In);
    };

    apply(&mut skeleton, 0.5, 1.0, MixBlend::Setup);
    let path = &skeleton.path_constraints[0];
    assert_approx(path.position, 30.0, 1.0e-4);
    assert_approx(path.mix_rotate, 0.5, 1.0e-6);
    assert_approx(path.mix_x, 0.25, 1.0e-6);
    assert_approx(path.mix_y, 0.0, 1.0e-6);

    // Before the mix key: setup restores, replace leaves the current value.
    apply(&mut skeleton, 0.25, 1.0, MixBlend::Setup);
    assert_approx(skeleton.path_constraints[0].position, 20.0, 1.0e-4);
    assert_approx(skeleton.path_constraints[0].mix_rotate, 1.0, 1.0e-6);

    skeleton.path_constraints[0].mix_rotate = 0.2;
    apply(&mut skeleton, 0.25, 0.5, MixBlend::Replace);
    assert_approx(skeleton.path_constraints[0].position, 20.0, 1.0e-4);
    assert_approx(skeleton.path_constraints[0].mix_rotate, 0.2, 1.0e-6);
}
