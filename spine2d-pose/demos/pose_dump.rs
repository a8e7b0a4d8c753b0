//! Builds a two-bone arm reaching for an animated target, crossfades from `wave` to `reach`, and
//! prints bone world transforms as JSON.
//!
//! Usage: `pose_dump [time] [mix]` (defaults 1.0 and 0.25). `RUST_LOG=debug` shows the scheduler.

use serde_json::json;
use spine2d_pose::{
    Animation, AnimationState, AnimationStateData, AnimationStateEvent, BoneData, CurveFrame,
    CurveTimeline, IkConstraintData, Skeleton, SkeletonData, Timeline,
};
use std::sync::Arc;

fn bone(name: &str, parent: Option<usize>, x: f32, y: f32, length: f32) -> BoneData {
    BoneData {
        name: name.to_string(),
        parent,
        x,
        y,
        length,
        ..Default::default()
    }
}

fn arm() -> SkeletonData {
    let wave = Animation::new(
        "wave",
        vec![Timeline::Rotate(CurveTimeline::new(
            1,
            vec![
                CurveFrame::linear(0.0, [-20.0]),
                CurveFrame::linear(0.5, [20.0]),
                CurveFrame::linear(1.0, [-20.0]),
            ],
        ))],
    );
    let reach = Animation::new(
        "reach",
        vec![Timeline::Translate(CurveTimeline::new(
            3,
            vec![
                CurveFrame::linear(0.0, [0.0, 0.0]),
                CurveFrame::linear(1.0, [-30.0, 40.0]),
            ],
        ))],
    );

    SkeletonData {
        name: "arm".to_string(),
        bones: vec![
            bone("root", None, 0.0, 0.0, 0.0),
            bone("upper", Some(0), 0.0, 0.0, 50.0),
            bone("lower", Some(1), 50.0, 0.0, 50.0),
            bone("target", Some(0), 80.0, 20.0, 0.0),
        ],
        ik_constraints: vec![IkConstraintData {
            name: "reach".to_string(),
            order: 0,
            skin_required: false,
            bones: vec![1, 2],
            target: 3,
            mix: 1.0,
            softness: 0.0,
            bend_direction: 1,
            compress: false,
            stretch: false,
            uniform: false,
        }],
        animations: vec![wave, reach],
        ..Default::default()
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let time: f32 = args.next().map(|s| s.parse::<f32>()).transpose()?.unwrap_or(1.0);
    let mix: f32 = args.next().map(|s| s.parse::<f32>()).transpose()?.unwrap_or(0.25);

    let data = Arc::new(arm());
    let mut skeleton = Skeleton::new(Arc::clone(&data))?;
    let mut state_data = AnimationStateData::new(Arc::clone(&data));
    state_data.set_mix("wave", "reach", mix)?;
    let mut state = AnimationState::new(state_data);

    state.set_animation(0, "wave", true)?;
    state.step(0.0, &mut skeleton);
    state.add_animation(0, "reach", false, 0.0)?;

    let frame: f32 = 1.0 / 60.0;
    let mut elapsed = 0.0f32;
    while elapsed < time {
        let delta = frame.min(time - elapsed);
        state.step(delta, &mut skeleton);
        elapsed += delta;
    }

    let events: Vec<_> = state
        .drain_events()
        .into_iter()
        .filter(|e| !matches!(e.event, AnimationStateEvent::Dispose))
        .map(|e| format!("{} {:?}", e.animation, e.event))
        .collect();

    let bones: Vec<_> = skeleton
        .bones
        .iter()
        .zip(&data.bones)
        .map(|(bone, bone_data)| {
            json!({
                "name": bone_data.name,
                "world_x": bone.world_x,
                "world_y": bone.world_y,
                "rotation": bone.world_rotation_x(),
                "scale_x": bone.world_scale_x(),
                "scale_y": bone.world_scale_y(),
            })
        })
        .collect();

    let out = json!({
        "time": time,
        "events": events,
        "bones": bones,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
