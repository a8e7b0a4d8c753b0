use crate::{
    Animation, AttachmentData, AttachmentFrame, AttachmentTimeline, BoneData, Curve, CurveFrame,
    CurveTimeline, DeformFrame, DeformTimeline, DrawOrderFrame, DrawOrderTimeline, Event,
    EventData, EventTimeline, IkConstraintData, IkConstraintTimeline, IkFrame, MeshAttachmentData,
    MixBlend, MixDirection, RegionAttachmentData, Skeleton, SkeletonData, SkinData, SlotData,
    Timeline, VertexData,
};
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::sync::Arc;
use test_case::test_case;

fn assert_approx(actual: f32, expected: f32) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= 1.0e-3,
        "expected {expected}, got {actual} (diff {diff})"
    );
}

fn region(name: &str) -> AttachmentData {
    AttachmentData::Region(RegionAttachmentData {
        name: name.to_string(),
        path: name.to_string(),
        x: 0.0,
        y: 0.0,
        rotation: 0.0,
        scale_x: 1.0,
        scale_y: 1.0,
        width: 10.0,
        height: 10.0,
        color: [1.0; 4],
    })
}

/// root, then "bone" at x 5 rotated 10 with scale x 2; slot "body" with two regions, slot "cloth"
/// with a two vertex mesh.
fn data(animations: Vec<Animation>) -> SkeletonData {
    let mut skin = SkinData {
        name: "default".to_string(),
        ..Default::default()
    };
    skin.set_attachment(0, "body", region("body"));
    skin.set_attachment(0, "alt", region("alt"));
    skin.set_attachment(
        1,
        "mesh",
        AttachmentData::Mesh(MeshAttachmentData {
            name: "mesh".to_string(),
            path: "mesh".to_string(),
            vertices: VertexData::Unweighted(vec![[0.0, 0.0], [10.0, 0.0]]),
            uvs: vec![[0.0, 0.0], [1.0, 0.0]],
            triangles: Vec::new(),
            hull_length: 2,
            color: [1.0; 4],
            timeline_attachment: None,
        }),
    );
    let mut skins = HashMap::new();
    skins.insert("default".to_string(), skin);

    SkeletonData {
        bones: vec![
            BoneData {
                name: "root".to_string(),
                ..Default::default()
            },
            BoneData {
                name: "bone".to_string(),
                parent: Some(0),
                x: 5.0,
                rotation: 10.0,
                scale_x: 2.0,
                ..Default::default()
            },
        ],
        slots: vec![
            SlotData {
                name: "body".to_string(),
                bone: 1,
                attachment: Some("body".to_string()),
                ..Default::default()
            },
            SlotData {
                name: "cloth".to_string(),
                bone: 1,
                attachment: Some("mesh".to_string()),
                ..Default::default()
            },
        ],
        skins,
        events: vec![EventData {
            name: "step".to_string(),
            ..Default::default()
        }],
        animations,
        ..Default::default()
    }
}

fn skeleton_with(timelines: Vec<Timeline>) -> (Skeleton, Animation) {
    let animation = Animation::new("anim", timelines);
    let skeleton = Skeleton::new(Arc::new(data(vec![animation.clone()]))).unwrap();
    (skeleton, animation)
}

fn apply(animation: &Animation, skeleton: &mut Skeleton, time: f32, alpha: f32, blend: MixBlend) {
    animation.apply(
        skeleton,
        time,
        time,
        false,
        None,
        alpha,
        blend,
        MixDirection::In,
    );
}

fn rotate(frames: Vec<CurveFrame<1>>) -> Timeline {
    Timeline::Rotate(CurveTimeline::new(1, frames))
}

#[test]
fn linear_rotation_is_offset_from_setup() {
    let (mut skeleton, animation) = skeleton_with(vec![rotate(vec![
        CurveFrame::linear(0.0, [0.0]),
        CurveFrame::linear(1.0, [90.0]),
    ])]);

    apply(&animation, &mut skeleton, 0.5, 1.0, MixBlend::Setup);
    assert_approx(skeleton.bones[1].rotation, 55.0);
}

#[test]
fn stepped_key_holds_until_next() {
    let (mut skeleton, animation) = skeleton_with(vec![rotate(vec![
        CurveFrame::stepped(0.0, [0.0]),
        CurveFrame::linear(1.0, [90.0]),
    ])]);

    apply(&animation, &mut skeleton, 0.99, 1.0, MixBlend::Setup);
    assert_approx(skeleton.bones[1].rotation, 10.0);
    apply(&animation, &mut skeleton, 1.0, 1.0, MixBlend::Setup);
    assert_approx(skeleton.bones[1].rotation, 100.0);
}

#[test]
fn bezier_ease_in_trails_linear() {
    let ease_in = Curve::Bezier {
        cx1: 0.5,
        cy1: 0.0,
        cx2: 1.0,
        cy2: 50.0,
    };
    let (mut skeleton, animation) = skeleton_with(vec![rotate(vec![
        CurveFrame::linear(0.0, [0.0]).with_curve(ease_in),
        CurveFrame::linear(1.0, [100.0]),
    ])]);

    apply(&animation, &mut skeleton, 0.5, 1.0, MixBlend::Setup);
    let offset = skeleton.bones[1].rotation - 10.0;
    assert!(offset > 0.0 && offset < 45.0, "offset {offset}");

    apply(&animation, &mut skeleton, 1.0, 1.0, MixBlend::Setup);
    assert_approx(skeleton.bones[1].rotation, 110.0);
}

#[test_case(true, 32.5 ; "looped wraps to half a second")]
#[test_case(false, 100.0 ; "clamped holds last key")]
fn time_past_duration(looped: bool, expected: f32) {
    let (mut skeleton, animation) = skeleton_with(vec![rotate(vec![
        CurveFrame::linear(0.0, [0.0]),
        CurveFrame::linear(2.0, [90.0]),
    ])]);
    assert_approx(animation.duration, 2.0);

    animation.apply(
        &mut skeleton,
        2.5,
        2.5,
        looped,
        None,
        1.0,
        MixBlend::Setup,
        MixDirection::In,
    );
    assert_approx(skeleton.bones[1].rotation, expected);
}

#[test]
fn events_fire_once_across_loop_boundary() {
    let (mut skeleton, animation) = skeleton_with(vec![
        rotate(vec![
            CurveFrame::linear(0.0, [0.0]),
            CurveFrame::linear(2.0, [0.0]),
        ]),
        Timeline::Event(EventTimeline {
            events: vec![
                Event::new(0.5, 0, &EventData::default()),
                Event::new(1.5, 0, &EventData::default()),
            ],
        }),
    ]);
    let fire = |skeleton: &mut Skeleton, last: f32, time: f32| {
        let mut events = Vec::new();
        animation.apply(
            skeleton,
            last,
            time,
            true,
            Some(&mut events),
            1.0,
            MixBlend::Setup,
            MixDirection::In,
        );
        events.iter().map(|e| e.time).collect::<Vec<_>>()
    };

    assert_eq!(fire(&mut skeleton, 1.8, 2.6), vec![0.5]);
    assert_eq!(fire(&mut skeleton, 0.6, 1.6), vec![1.5]);
    assert_eq!(fire(&mut skeleton, 1.6, 1.7), Vec::<f32>::new());
    assert_eq!(fire(&mut skeleton, 0.4, 1.5), vec![0.5, 1.5]);
}

#[test]
fn scale_keys_multiply_setup() {
    let (mut skeleton, animation) = skeleton_with(vec![Timeline::ScaleX(CurveTimeline::new(
        1,
        vec![CurveFrame::linear(0.0, [1.5])],
    ))]);

    apply(&animation, &mut skeleton, 0.0, 1.0, MixBlend::Setup);
    assert_approx(skeleton.bones[1].scale_x, 3.0);
}

#[test]
fn add_blend_accumulates_on_current_pose() {
    let (mut skeleton, animation) = skeleton_with(vec![Timeline::TranslateX(CurveTimeline::new(
        1,
        vec![CurveFrame::linear(0.0, [4.0])],
    ))]);

    apply(&animation, &mut skeleton, 0.0, 0.5, MixBlend::Add);
    assert_approx(skeleton.bones[1].x, 7.0);
    apply(&animation, &mut skeleton, 0.0, 0.5, MixBlend::Add);
    assert_approx(skeleton.bones[1].x, 9.0);
}

#[test]
fn replace_blend_moves_toward_key() {
    let (mut skeleton, animation) = skeleton_with(vec![rotate(vec![CurveFrame::linear(
        0.0,
        [90.0],
    )])]);

    apply(&animation, &mut skeleton, 0.0, 0.5, MixBlend::Replace);
    assert_approx(skeleton.bones[1].rotation, 55.0);
}

#[test_case(MixBlend::Setup, 1.0, 10.0 ; "setup restores setup")]
#[test_case(MixBlend::First, 0.5, 66.5 ; "first moves toward setup")]
#[test_case(MixBlend::Replace, 1.0, 123.0 ; "replace leaves current")]
#[test_case(MixBlend::Add, 1.0, 123.0 ; "add leaves current")]
fn before_first_key(blend: MixBlend, alpha: f32, expected: f32) {
    let (mut skeleton, animation) = skeleton_with(vec![rotate(vec![CurveFrame::linear(
        1.0,
        [90.0],
    )])]);
    skeleton.bones[1].rotation = 123.0;

    apply(&animation, &mut skeleton, 0.5, alpha, blend);
    assert_approx(skeleton.bones[1].rotation, expected);
}

#[test]
fn draw_order_keys_and_mix_out() {
    let (mut skeleton, animation) = skeleton_with(vec![Timeline::DrawOrder(DrawOrderTimeline {
        frames: vec![
            DrawOrderFrame {
                time: 0.0,
                draw_order: Some(vec![1, 0]),
            },
            DrawOrderFrame {
                time: 1.0,
                draw_order: None,
            },
        ],
    })]);
    assert_eq!(skeleton.draw_order, vec![0, 1]);

    apply(&animation, &mut skeleton, 0.5, 1.0, MixBlend::Replace);
    assert_eq!(skeleton.draw_order, vec![1, 0]);

    let out = |skeleton: &mut Skeleton, blend| {
        animation.apply(skeleton, 0.5, 0.5, false, None, 1.0, blend, MixDirection::Out);
    };
    out(&mut skeleton, MixBlend::Replace);
    assert_eq!(skeleton.draw_order, vec![1, 0]);
    out(&mut skeleton, MixBlend::Setup);
    assert_eq!(skeleton.draw_order, vec![0, 1]);

    apply(&animation, &mut skeleton, 0.5, 1.0, MixBlend::Replace);
    apply(&animation, &mut skeleton, 1.0, 1.0, MixBlend::Replace);
    assert_eq!(skeleton.draw_order, vec![0, 1]);
}

#[test]
fn attachment_keys_swap_and_clear() {
    let (mut skeleton, animation) = skeleton_with(vec![Timeline::Attachment(
        AttachmentTimeline {
            slot: 0,
            frames: vec![
                AttachmentFrame {
                    time: 0.0,
                    name: Some("alt".to_string()),
                },
                AttachmentFrame {
                    time: 1.0,
                    name: None,
                },
            ],
        },
    )]);

    apply(&animation, &mut skeleton, 0.5, 1.0, MixBlend::Replace);
    assert_eq!(skeleton.slots[0].attachment.as_deref(), Some("alt"));
    assert_eq!(skeleton.slot_attachment(0).map(|a| a.name()), Some("alt"));

    apply(&animation, &mut skeleton, 1.0, 1.0, MixBlend::Replace);
    assert_eq!(skeleton.slots[0].attachment, None);

    animation.apply(
        &mut skeleton,
        1.0,
        1.0,
        false,
        None,
        1.0,
        MixBlend::Setup,
        MixDirection::Out,
    );
    assert_eq!(skeleton.slots[0].attachment.as_deref(), Some("body"));
}

#[test]
fn deform_offsets_add_to_setup_vertices() {
    let (mut skeleton, animation) = skeleton_with(vec![Timeline::Deform(DeformTimeline {
        slot: 1,
        attachment: "mesh".to_string(),
        frames: vec![
            DeformFrame {
                time: 0.0,
                vertices: Vec::new(),
                curve: Curve::Linear,
            },
            DeformFrame {
                time: 1.0,
                vertices: vec![0.0, 0.0, 0.0, 10.0],
                curve: Curve::Linear,
            },
        ],
    })]);
    assert!(skeleton.slots[1].deform.is_empty());

    apply(&animation, &mut skeleton, 0.5, 1.0, MixBlend::Replace);
    assert_eq!(skeleton.slots[1].deform, vec![0.0, 0.0, 10.0, 5.0]);

    apply(&animation, &mut skeleton, 1.0, 0.5, MixBlend::Replace);
    assert_eq!(skeleton.slots[1].deform, vec![0.0, 0.0, 10.0, 7.5]);

    skeleton.set_to_setup_pose();
    assert!(skeleton.slots[1].deform.is_empty());
}

#[test]
fn deform_for_other_attachment_is_ignored() {
    let (mut skeleton, animation) = skeleton_with(vec![Timeline::Deform(DeformTimeline {
        slot: 1,
        attachment: "other".to_string(),
        frames: vec![DeformFrame {
            time: 0.0,
            vertices: vec![1.0, 1.0, 1.0, 1.0],
            curve: Curve::Linear,
        }],
    })]);

    apply(&animation, &mut skeleton, 0.0, 1.0, MixBlend::Setup);
    assert!(skeleton.slots[1].deform.is_empty());
}

#[test]
fn color_channels_interpolate() {
    let (mut skeleton, animation) = skeleton_with(vec![
        Timeline::Rgba(CurveTimeline::new(
            0,
            vec![
                CurveFrame::linear(0.0, [1.0, 1.0, 1.0, 1.0]),
                CurveFrame::linear(1.0, [0.0, 0.0, 0.0, 0.0]),
            ],
        )),
        Timeline::Alpha(CurveTimeline::new(1, vec![CurveFrame::linear(0.0, [0.0])])),
    ]);

    apply(&animation, &mut skeleton, 0.25, 1.0, MixBlend::Setup);
    for channel in skeleton.slots[0].color {
        assert_approx(channel, 0.75);
    }

    skeleton.set_to_setup_pose();
    apply(&animation, &mut skeleton, 0.25, 0.5, MixBlend::Setup);
    assert_approx(skeleton.slots[1].color[3], 0.5);
    assert_approx(skeleton.slots[1].color[0], 1.0);
}

#[test]
fn ik_timeline_mixes_constraint_values() {
    let mut data = data(Vec::new());
    data.bones.push(BoneData {
        name: "target".to_string(),
        parent: Some(0),
        y: 10.0,
        ..Default::default()
    });
    data.ik_constraints.push(IkConstraintData {
        name: "aim".to_string(),
        order: 0,
        skin_required: false,
        bones: vec![1],
        target: 2,
        mix: 1.0,
        softness: 0.0,
        bend_direction: 1,
        compress: false,
        stretch: false,
        uniform: false,
    });
    let frame = |time: f32, mix: f32, bend_direction: i32| IkFrame {
        time,
        mix,
        softness: 0.0,
        bend_direction,
        compress: false,
        stretch: false,
        curves: [Curve::Linear; 2],
    };
    let animation = Animation::new(
        "aim",
        vec![Timeline::IkConstraint(IkConstraintTimeline {
            constraint: 0,
            frames: vec![frame(0.0, 1.0, -1), frame(1.0, 0.0, 1)],
        })],
    );
    let mut skeleton = Skeleton::new(Arc::new(data)).unwrap();

    apply(&animation, &mut skeleton, 0.5, 1.0, MixBlend::Setup);
    assert_approx(skeleton.ik_constraints[0].mix, 0.5);
    assert_eq!(skeleton.ik_constraints[0].bend_direction, -1);

    animation.apply(
        &mut skeleton,
        0.5,
        0.5,
        false,
        None,
        1.0,
        MixBlend::Setup,
        MixDirection::Out,
    );
    assert_eq!(skeleton.ik_constraints[0].bend_direction, 1);
}
