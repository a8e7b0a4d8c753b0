use crate::{MixBlend, MixDirection, Skeleton, SkeletonData, Timeline, TransformMode};
use pretty_assertions::assert_eq;
use std::sync::Arc;

const ARM: &str = r#"{
    "name": "arm",
    "bones": [
        { "name": "root" },
        { "name": "upper", "parent": 0, "length": 50.0, "transform_mode": "NoScale" }
    ],
    "slots": [
        { "name": "sleeve", "bone": 1 }
    ],
    "animations": [
        {
            "name": "raise",
            "duration": 1.0,
            "timelines": [
                {
                    "Rotate": {
                        "target": 1,
                        "frames": [
                            { "time": 0.0, "values": [0.0], "curves": ["Linear"] },
                            { "time": 1.0, "values": [90.0], "curves": ["Linear"] }
                        ]
                    }
                }
            ]
        }
    ]
}"#;

#[test]
fn missing_fields_take_setup_defaults() {
    let data: SkeletonData = serde_json::from_str(ARM).unwrap();

    let upper = &data.bones[1];
    assert_eq!(upper.scale_x, 1.0);
    assert_eq!(upper.scale_y, 1.0);
    assert_eq!(upper.transform_mode, TransformMode::NoScale);
    assert_eq!(data.slots[0].color, [1.0; 4]);
    assert_eq!(data.slots[0].attachment, None);
    assert!(data.skins.is_empty());
    assert_eq!(data.validate(), Ok(()));
}

#[test]
fn deserialized_animation_poses_skeleton() {
    let data: SkeletonData = serde_json::from_str(ARM).unwrap();
    let data = Arc::new(data);
    let mut skeleton = Skeleton::new(Arc::clone(&data)).unwrap();

    let (_, raise) = data.animation("raise").unwrap();
    raise.apply(
        &mut skeleton,
        0.5,
        0.5,
        false,
        None,
        1.0,
        MixBlend::Setup,
        MixDirection::In,
    );
    skeleton.update_world_transform();

    assert!((skeleton.bones[1].rotation - 45.0).abs() < 1.0e-4);
    let [x, y] = skeleton.bones[1].local_to_world(50.0, 0.0);
    assert!((x - 35.355).abs() < 1.0e-2, "x {x}");
    assert!((y - 35.355).abs() < 1.0e-2, "y {y}");
}

#[test]
fn serialized_data_reads_back() {
    let data: SkeletonData = serde_json::from_str(ARM).unwrap();
    let json = serde_json::to_string(&data).unwrap();
    let back: SkeletonData = serde_json::from_str(&json).unwrap();

    let names = |d: &SkeletonData| d.bones.iter().map(|b| b.name.clone()).collect::<Vec<_>>();
    assert_eq!(names(&back), names(&data));
    assert_eq!(back.animations[0].duration, 1.0);
    let (Timeline::Rotate(read), Timeline::Rotate(written)) = (
        &back.animations[0].timelines[0],
        &data.animations[0].timelines[0],
    ) else {
        panic!("expected rotate timelines");
    };
    assert_eq!(read.target, written.target);
    assert_eq!(read.frames, written.frames);
}
