use crate::{
    Animation, AnimationState, AnimationStateData, AnimationStateEvent, AttachmentData,
    AttachmentFrame, AttachmentTimeline, BoneData, CurveFrame, CurveTimeline, Error, Event,
    EventData, EventTimeline, MixBlend, RegionAttachmentData, Skeleton, SkeletonData, SkinData,
    SlotData, Timeline,
};
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::sync::Arc;

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

fn held<const N: usize>(target: usize, values: [f32; N]) -> CurveTimeline<N> {
    CurveTimeline::new(
        target,
        vec![CurveFrame::linear(0.0, values), CurveFrame::linear(1.0, values)],
    )
}

fn data() -> Arc<SkeletonData> {
    let mut skin = SkinData {
        name: "default".to_string(),
        ..Default::default()
    };
    skin.set_attachment(0, "body", region("body"));
    skin.set_attachment(0, "alt", region("alt"));
    let mut skins = HashMap::new();
    skins.insert("default".to_string(), skin);

    let step = EventData {
        name: "step".to_string(),
        ..Default::default()
    };
    let animations = vec![
        Animation::new(
            "idle",
            vec![
                Timeline::Rotate(held(1, [0.0])),
                Timeline::TranslateX(held(1, [0.0])),
            ],
        ),
        Animation::new("turn", vec![Timeline::Rotate(held(1, [90.0]))]),
        Animation::new("wave", vec![Timeline::TranslateX(held(1, [10.0]))]),
        Animation::new(
            "swap",
            vec![Timeline::Attachment(AttachmentTimeline {
                slot: 0,
                frames: vec![
                    AttachmentFrame {
                        time: 0.0,
                        name: Some("alt".to_string()),
                    },
                    AttachmentFrame {
                        time: 1.0,
                        name: Some("alt".to_string()),
                    },
                ],
            })],
        ),
        Animation::new(
            "beat",
            vec![
                Timeline::Rotate(held(1, [0.0])),
                Timeline::Event(EventTimeline {
                    events: vec![Event::new(0.25, 0, &step), Event::new(0.75, 0, &step)],
                }),
            ],
        ),
    ];

    Arc::new(SkeletonData {
        bones: vec![
            BoneData {
                name: "root".to_string(),
                ..Default::default()
            },
            BoneData {
                name: "bone".to_string(),
                parent: Some(0),
                ..Default::default()
            },
        ],
        slots: vec![SlotData {
            name: "body".to_string(),
            bone: 1,
            attachment: Some("body".to_string()),
            ..Default::default()
        }],
        skins,
        events: vec![step],
        animations,
        ..Default::default()
    })
}

fn setup() -> (AnimationState, Skeleton) {
    let data = data();
    let skeleton = Skeleton::new(Arc::clone(&data)).unwrap();
    (AnimationState::new(AnimationStateData::new(data)), skeleton)
}

/// `(animation, kind)` pairs, with fired keys rendered by their time.
fn log(state: &mut AnimationState) -> Vec<(String, String)> {
    state
        .drain_events()
        .into_iter()
        .map(|e| {
            let kind = match e.event {
                AnimationStateEvent::Start => "start".to_string(),
                AnimationStateEvent::Interrupt => "interrupt".to_string(),
                AnimationStateEvent::End => "end".to_string(),
                AnimationStateEvent::Dispose => "dispose".to_string(),
                AnimationStateEvent::Complete => "complete".to_string(),
                AnimationStateEvent::Event(event) => format!("event {}", event.time),
            };
            (e.animation, kind)
        })
        .collect()
}

fn pairs(expected: &[(&str, &str)]) -> Vec<(String, String)> {
    expected
        .iter()
        .map(|(a, k)| (a.to_string(), k.to_string()))
        .collect()
}

#[test]
fn crossfade_blends_from_previous_pose() {
    let (mut state, mut skeleton) = setup();
    state.data_mut().set_mix("idle", "turn", 0.5).unwrap();

    state.set_animation(0, "idle", true).unwrap();
    state.step(0.0, &mut skeleton);
    let turn = state.set_animation(0, "turn", true).unwrap();
    assert_approx(state.entry(turn).unwrap().mix_duration, 0.5);

    state.step(0.0, &mut skeleton);
    assert_approx(skeleton.bones[1].rotation, 0.0);

    state.step(0.25, &mut skeleton);
    assert_approx(skeleton.bones[1].rotation, 45.0);
    assert_approx(skeleton.bones[1].world_rotation_x(), 45.0);

    state.step(0.25, &mut skeleton);
    assert_approx(skeleton.bones[1].rotation, 90.0);
    assert_approx(state.entry(turn).unwrap().mix_time(), 0.5);
}

#[test]
fn additive_track_layers_on_lower_track() {
    let (mut state, mut skeleton) = setup();
    state.set_animation(0, "idle", true).unwrap();
    let wave = state.set_animation(1, "wave", true).unwrap();
    state.entry_mut(wave).unwrap().mix_blend = MixBlend::Add;

    assert!(state.step(0.0, &mut skeleton));
    assert_approx(skeleton.bones[1].x, 10.0);
    state.step(0.1, &mut skeleton);
    assert_approx(skeleton.bones[1].x, 10.0);

    state.entry_mut(wave).unwrap().alpha = 0.5;
    state.step(0.1, &mut skeleton);
    assert_approx(skeleton.bones[1].x, 5.0);
}

#[test]
fn queued_entry_starts_mix_before_previous_completes() {
    let (mut state, mut skeleton) = setup();
    state.data_mut().set_mix("idle", "turn", 0.5).unwrap();

    let idle = state.set_animation(0, "idle", false).unwrap();
    let turn = state.add_animation(0, "turn", false, 0.0).unwrap();
    assert_approx(state.entry(turn).unwrap().delay, 0.5);

    state.step(0.0, &mut skeleton);
    state.step(0.5, &mut skeleton);
    assert_eq!(state.current(0), Some(idle));

    state.step(0.1, &mut skeleton);
    assert_eq!(state.current(0), Some(turn));
    let entry = state.entry(turn).unwrap();
    assert_eq!(entry.mixing_from(), Some(idle));
    assert_approx(entry.track_time, 0.1);
    assert_approx(entry.mix_time(), 0.1);
}

#[test]
fn empty_animation_mixes_to_setup_then_clears() {
    let (mut state, mut skeleton) = setup();
    let turn = state.set_animation(0, "turn", false).unwrap();
    state.step(0.0, &mut skeleton);
    assert_approx(skeleton.bones[1].rotation, 90.0);

    let empty = state.set_empty_animation(0, 0.5).unwrap();
    assert!(state.entry(empty).unwrap().is_empty_animation());
    assert_eq!(state.entry(empty).unwrap().animation_name(), "<empty>");

    state.step(0.25, &mut skeleton);
    assert_approx(skeleton.bones[1].rotation, 45.0);
    state.step(0.25, &mut skeleton);
    assert_approx(skeleton.bones[1].rotation, 0.0);
    state.step(0.1, &mut skeleton);
    assert!(state.entry(turn).is_none());
    state.step(0.1, &mut skeleton);
    assert_eq!(state.current(0), None);
    assert!(state.entry(empty).is_none());

    assert_eq!(
        log(&mut state),
        pairs(&[
            ("turn", "start"),
            ("turn", "interrupt"),
            ("<empty>", "start"),
            ("<empty>", "complete"),
            ("turn", "end"),
            ("turn", "dispose"),
            ("<empty>", "end"),
            ("<empty>", "dispose"),
        ])
    );
}

#[test]
fn setup_attachment_returns_when_mixed_out() {
    let (mut state, mut skeleton) = setup();
    state.set_animation(0, "swap", false).unwrap();
    state.step(0.0, &mut skeleton);
    assert_eq!(skeleton.slots[0].attachment.as_deref(), Some("alt"));

    state.set_empty_animation(0, 0.0).unwrap();
    state.step(0.1, &mut skeleton);
    assert_eq!(skeleton.slots[0].attachment.as_deref(), Some("body"));
}

#[test]
fn layered_attachment_keys_apply_at_partial_alpha() {
    let (mut state, mut skeleton) = setup();
    state.set_animation(0, "idle", true).unwrap();
    let swap = state.set_animation(1, "swap", false).unwrap();
    state.entry_mut(swap).unwrap().alpha = 0.5;

    state.step(0.0, &mut skeleton);
    assert_eq!(skeleton.slots[0].attachment.as_deref(), Some("alt"));
    state.step(0.5, &mut skeleton);
    assert_eq!(skeleton.slots[0].attachment.as_deref(), Some("alt"));
}

#[test]
fn keyed_events_and_complete_are_ordered_across_loops() {
    let (mut state, mut skeleton) = setup();
    state.set_animation(0, "beat", true).unwrap();

    for delta in [0.0, 0.5, 0.6, 0.2] {
        state.step(delta, &mut skeleton);
    }

    assert_eq!(
        log(&mut state),
        pairs(&[
            ("beat", "start"),
            ("beat", "event 0.25"),
            ("beat", "event 0.75"),
            ("beat", "complete"),
            ("beat", "event 0.25"),
        ])
    );
}

#[test]
fn unknown_names_and_bad_values_are_rejected() {
    let (mut state, _) = setup();

    assert_eq!(
        state.set_animation(0, "missing", false),
        Err(Error::UnknownAnimation {
            name: "missing".to_string()
        })
    );
    assert_eq!(
        state.data().mix("idle", "missing"),
        Err(Error::UnknownAnimation {
            name: "missing".to_string()
        })
    );
    assert!(matches!(
        state.data_mut().set_mix("idle", "turn", -1.0),
        Err(Error::InvalidValue { .. })
    ));
    assert!(matches!(
        state.add_animation(0, "idle", false, f32::NAN),
        Err(Error::InvalidValue { .. })
    ));
    assert!(matches!(
        state.set_empty_animation(0, f32::NAN),
        Err(Error::InvalidValue { .. })
    ));
    assert_eq!(state.tracks_len(), 0);
}

#[test]
fn default_mix_applies_to_unset_pairs() {
    let (mut state, _) = setup();
    state.data_mut().default_mix = 0.2;
    state.data_mut().set_mix("idle", "turn", 0.4).unwrap();

    assert_approx(state.data().mix("idle", "turn").unwrap(), 0.4);
    assert_approx(state.data().mix("turn", "idle").unwrap(), 0.2);

    state.set_animation(0, "turn", false).unwrap();
    let idle = state.add_animation(0, "idle", false, 0.0).unwrap();
    assert_approx(state.entry(idle).unwrap().mix_duration, 0.2);
    assert_approx(state.entry(idle).unwrap().delay, 0.8);
}

#[test]
fn disposed_handles_go_stale() {
    let (mut state, mut skeleton) = setup();
    let first = state.set_animation(0, "idle", true).unwrap();
    state.step(0.0, &mut skeleton);

    state.clear_track(0);
    assert_eq!(state.current(0), None);
    assert!(state.entry(first).is_none());

    let second = state.set_animation(0, "idle", true).unwrap();
    assert_ne!(first, second);
    assert!(state.entry(first).is_none());
    assert!(state.entry(second).is_some());

    let kinds: Vec<_> = log(&mut state).into_iter().map(|(_, k)| k).collect();
    assert_eq!(kinds, ["start", "end", "dispose", "start"]);
}

#[test]
fn replacing_an_unapplied_entry_does_not_mix_from_it() {
    let (mut state, _) = setup();
    let idle = state.set_animation(0, "idle", true).unwrap();
    let turn = state.set_animation(0, "turn", true).unwrap();

    assert!(state.entry(idle).is_none());
    assert_eq!(state.entry(turn).unwrap().mixing_from(), None);
    assert_eq!(
        log(&mut state),
        pairs(&[
            ("idle", "start"),
            ("idle", "interrupt"),
            ("idle", "end"),
            ("idle", "dispose"),
            ("turn", "start"),
        ])
    );
}

#[test]
fn non_finite_delta_is_ignored() {
    let (mut state, _) = setup();
    let idle = state.set_animation(0, "idle", true).unwrap();

    state.update(f32::NAN);
    state.update(f32::INFINITY);
    assert_approx(state.entry(idle).unwrap().track_time, 0.0);

    state.time_scale = 2.0;
    state.update(0.25);
    assert_approx(state.entry(idle).unwrap().track_time, 0.5);
}

#[test]
fn empty_animations_cover_every_active_track() {
    let (mut state, mut skeleton) = setup();
    state.set_animation(0, "idle", true).unwrap();
    state.set_animation(2, "wave", true).unwrap();
    state.step(0.0, &mut skeleton);

    state.set_empty_animations(0.3).unwrap();
    assert_eq!(state.tracks_len(), 3);
    for track in [0, 2] {
        let entry = state.entry(state.current(track).unwrap()).unwrap();
        assert!(entry.is_empty_animation());
        assert_approx(entry.mix_duration, 0.3);
    }
    assert_eq!(state.current(1), None);

    state.clear_tracks();
    assert_eq!(state.tracks_len(), 0);
}
