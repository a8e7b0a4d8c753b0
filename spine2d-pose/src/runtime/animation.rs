use crate::{
    Animation, AttachmentTimeline, Bone, BoneData, Curve, CurveFrame, CurveTimeline, DeformTimeline,
    DrawOrderTimeline, Event, EventTimeline, IkConstraintTimeline, Skeleton, Timeline, VertexData,
};
use std::sync::Arc;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MixBlend {
    /// Writes absolutely from the setup pose.
    Setup,
    /// First application of a property this frame: moves from the current value toward the key.
    First,
    /// Moves from the current value toward the key.
    Replace,
    /// Adds the key's delta from setup to the current value.
    Add,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MixDirection {
    In,
    Out,
}

pub(crate) const ANIMATION_STATE_SETUP: u32 = 1;
pub(crate) const ANIMATION_STATE_CURRENT: u32 = 2;

impl Animation {
    /// Poses the skeleton at `time`. Event keys in `(last_time, time]` are pushed to `events`.
    #[allow(clippy::too_many_arguments)]
    pub fn apply(
        &self,
        skeleton: &mut Skeleton,
        last_time: f32,
        time: f32,
        looped: bool,
        mut events: Option<&mut Vec<Event>>,
        alpha: f32,
        blend: MixBlend,
        direction: MixDirection,
    ) {
        let (mut last_time, mut time) = (last_time, time);
        if looped && self.duration > 0.0 {
            time = time.rem_euclid(self.duration);
            if last_time > 0.0 {
                last_time = last_time.rem_euclid(self.duration);
            }
        }

        for timeline in &self.timelines {
            timeline.apply(
                skeleton,
                last_time,
                time,
                events.as_deref_mut(),
                alpha,
                blend,
                direction,
            );
        }
    }
}

impl Timeline {
    #[allow(clippy::too_many_arguments)]
    pub fn apply(
        &self,
        skeleton: &mut Skeleton,
        last_time: f32,
        time: f32,
        events: Option<&mut Vec<Event>>,
        alpha: f32,
        blend: MixBlend,
        direction: MixDirection,
    ) {
        use BoneProperty::*;
        match self {
            Timeline::Rotate(t) => apply_bone(t, [Rotation], skeleton, time, alpha, blend, direction),
            Timeline::Translate(t) => apply_bone(t, [X, Y], skeleton, time, alpha, blend, direction),
            Timeline::TranslateX(t) => apply_bone(t, [X], skeleton, time, alpha, blend, direction),
            Timeline::TranslateY(t) => apply_bone(t, [Y], skeleton, time, alpha, blend, direction),
            Timeline::Scale(t) => {
                apply_bone(t, [ScaleX, ScaleY], skeleton, time, alpha, blend, direction)
            }
            Timeline::ScaleX(t) => apply_bone(t, [ScaleX], skeleton, time, alpha, blend, direction),
            Timeline::ScaleY(t) => apply_bone(t, [ScaleY], skeleton, time, alpha, blend, direction),
            Timeline::Shear(t) => {
                apply_bone(t, [ShearX, ShearY], skeleton, time, alpha, blend, direction)
            }
            Timeline::ShearX(t) => apply_bone(t, [ShearX], skeleton, time, alpha, blend, direction),
            Timeline::ShearY(t) => apply_bone(t, [ShearY], skeleton, time, alpha, blend, direction),
            Timeline::Rgba(t) => apply_color(t, 0..4, false, skeleton, time, alpha, blend),
            Timeline::Rgb(t) => apply_color(t, 0..3, false, skeleton, time, alpha, blend),
            Timeline::Alpha(t) => apply_color(t, 3..4, false, skeleton, time, alpha, blend),
            Timeline::Rgba2(t) => apply_color(t, 0..4, true, skeleton, time, alpha, blend),
            Timeline::Rgb2(t) => apply_color(t, 0..3, true, skeleton, time, alpha, blend),
            Timeline::Attachment(t) => apply_attachment(t, skeleton, time, blend, direction),
            Timeline::Deform(t) => apply_deform(t, skeleton, time, alpha, blend),
            Timeline::Event(t) => {
                if let Some(events) = events {
                    fire_events(t, last_time, time, events);
                }
            }
            Timeline::DrawOrder(t) => apply_draw_order(t, skeleton, time, blend, direction),
            Timeline::IkConstraint(t) => {
                apply_ik_constraint(t, skeleton, time, alpha, blend, direction)
            }
            Timeline::TransformConstraint(t) => {
                apply_transform_constraint(t, skeleton, time, alpha, blend)
            }
            Timeline::PathConstraintPosition(t) => {
                apply_path_constraint(t, PathProperty::Position, skeleton, time, alpha, blend)
            }
            Timeline::PathConstraintSpacing(t) => {
                apply_path_constraint(t, PathProperty::Spacing, skeleton, time, alpha, blend)
            }
            Timeline::PathConstraintMix(t) => {
                apply_path_constraint(t, PathProperty::Mix, skeleton, time, alpha, blend)
            }
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum BoneProperty {
    Rotation,
    X,
    Y,
    ScaleX,
    ScaleY,
    ShearX,
    ShearY,
}

impl BoneProperty {
    fn setup(self, data: &BoneData) -> f32 {
        match self {
            BoneProperty::Rotation => data.rotation,
            BoneProperty::X => data.x,
            BoneProperty::Y => data.y,
            BoneProperty::ScaleX => data.scale_x,
            BoneProperty::ScaleY => data.scale_y,
            BoneProperty::ShearX => data.shear_x,
            BoneProperty::ShearY => data.shear_y,
        }
    }

    fn field(self, bone: &mut Bone) -> &mut f32 {
        match self {
            BoneProperty::Rotation => &mut bone.rotation,
            BoneProperty::X => &mut bone.x,
            BoneProperty::Y => &mut bone.y,
            BoneProperty::ScaleX => &mut bone.scale_x,
            BoneProperty::ScaleY => &mut bone.scale_y,
            BoneProperty::ShearX => &mut bone.shear_x,
            BoneProperty::ShearY => &mut bone.shear_y,
        }
    }

    fn is_scale(self) -> bool {
        matches!(self, BoneProperty::ScaleX | BoneProperty::ScaleY)
    }
}

fn apply_bone<const N: usize>(
    timeline: &CurveTimeline<N>,
    properties: [BoneProperty; N],
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
    direction: MixDirection,
) {
    let data = Arc::clone(&skeleton.data);
    let (Some(bone), Some(bone_data)) = (
        skeleton.bones.get_mut(timeline.target),
        data.bones.get(timeline.target),
    ) else {
        return;
    };
    if !bone.active {
        return;
    }
    let Some(values) = sample(&timeline.frames, time) else {
        for property in properties {
            reset_before_first(property.field(bone), property.setup(bone_data), alpha, blend);
        }
        return;
    };

    for (property, value) in properties.into_iter().zip(values) {
        let setup = property.setup(bone_data);
        let current = property.field(bone);
        if property.is_scale() {
            mix_scale(current, setup, value * setup, alpha, blend, direction);
        } else {
            mix_offset(current, setup, value, alpha, blend);
        }
    }
}

fn reset_before_first(current: &mut f32, setup: f32, alpha: f32, blend: MixBlend) {
    match blend {
        MixBlend::Setup => *current = setup,
        MixBlend::First => *current += (setup - *current) * alpha,
        MixBlend::Replace | MixBlend::Add => {}
    }
}

/// Rotation, translation and shear keys are offsets from the setup value.
fn mix_offset(current: &mut f32, setup: f32, value: f32, alpha: f32, blend: MixBlend) {
    match blend {
        MixBlend::Setup => *current = setup + value * alpha,
        MixBlend::First | MixBlend::Replace => *current += (value + setup - *current) * alpha,
        MixBlend::Add => *current += value * alpha,
    }
}

/// `value` is the keyed scale already multiplied by the setup scale. Partial mixes blend
/// magnitudes so a flip snaps sign instead of passing through zero: mixing in takes the key's
/// sign, mixing out keeps the bone's.
fn mix_scale(
    current: &mut f32,
    setup: f32,
    value: f32,
    alpha: f32,
    blend: MixBlend,
    direction: MixDirection,
) {
    if alpha == 1.0 {
        match blend {
            MixBlend::Add => *current += value - setup,
            _ => *current = value,
        }
        return;
    }
    match (blend, direction) {
        (MixBlend::Add, _) => *current += (value - setup) * alpha,
        (MixBlend::Setup, MixDirection::Out) => {
            *current = setup + (value.abs() * signum(setup) - setup) * alpha;
        }
        (_, MixDirection::Out) => {
            let from = *current;
            *current = from + (value.abs() * signum(from) - from) * alpha;
        }
        (MixBlend::Setup, MixDirection::In) => {
            let from = setup.abs() * signum(value);
            *current = from + (value - from) * alpha;
        }
        (_, MixDirection::In) => {
            let from = current.abs() * signum(value);
            *current = from + (value - from) * alpha;
        }
    }
}

pub(crate) fn signum(v: f32) -> f32 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Slot color channels: `light` indexes the RGBA color; with `dark` set the frame's last three
/// values drive the dark color's RGB.
fn apply_color<const N: usize>(
    timeline: &CurveTimeline<N>,
    light: std::ops::Range<usize>,
    dark: bool,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
) {
    let data = Arc::clone(&skeleton.data);
    let (Some(slot), Some(slot_data)) = (
        skeleton.slots.get_mut(timeline.target),
        data.slots.get(timeline.target),
    ) else {
        return;
    };
    if !skeleton.bones.get(slot.bone).is_some_and(|b| b.active) {
        return;
    }

    let setup_dark = slot_data.dark_color.unwrap_or([0.0; 3]);
    let light_len = light.len();
    let Some(values) = sample(&timeline.frames, time) else {
        for channel in light {
            reset_before_first(&mut slot.color[channel], slot_data.color[channel], alpha, blend);
        }
        if dark {
            if let Some(dark_color) = slot.dark_color.as_mut() {
                for (channel, setup) in dark_color.iter_mut().zip(setup_dark) {
                    reset_before_first(channel, setup, alpha, blend);
                }
            }
        }
        return;
    };

    for (i, channel) in light.enumerate() {
        mix_channel(
            &mut slot.color[channel],
            slot_data.color[channel],
            values[i],
            alpha,
            blend,
        );
    }
    if dark {
        if let Some(dark_color) = slot.dark_color.as_mut() {
            for (i, (channel, setup)) in dark_color.iter_mut().zip(setup_dark).enumerate() {
                mix_channel(channel, setup, values[light_len + i], alpha, blend);
            }
        }
    }
}

fn mix_channel(current: &mut f32, setup: f32, value: f32, alpha: f32, blend: MixBlend) {
    if alpha == 1.0 {
        *current = value;
        return;
    }
    if blend == MixBlend::Setup {
        *current = setup;
    }
    *current += (value - *current) * alpha;
}

/// Constraint mixes: `Setup` blends from the data value, every other blend from the current one.
fn mix_constraint(current: &mut f32, setup: f32, value: f32, alpha: f32, blend: MixBlend) {
    match blend {
        MixBlend::Setup => *current = setup + (value - setup) * alpha,
        _ => *current += (value - *current) * alpha,
    }
}

impl AttachmentTimeline {
    /// Index of the key in effect at `time`, or `None` before the first key.
    pub(crate) fn frame_at(&self, time: f32) -> Option<usize> {
        search(&self.frames, time, |f| f.time)
    }
}

fn apply_attachment(
    timeline: &AttachmentTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    blend: MixBlend,
    direction: MixDirection,
) {
    let Some(slot) = skeleton.slots.get(timeline.slot) else {
        return;
    };
    if !skeleton.bones.get(slot.bone).is_some_and(|b| b.active) {
        return;
    }
    let data = Arc::clone(&skeleton.data);
    let setup_name = data
        .slots
        .get(timeline.slot)
        .and_then(|s| s.attachment.as_deref());

    if direction == MixDirection::Out {
        if blend == MixBlend::Setup {
            skeleton.set_slot_attachment(timeline.slot, setup_name);
        }
        return;
    }

    match timeline.frame_at(time) {
        None => {
            if matches!(blend, MixBlend::Setup | MixBlend::First) {
                skeleton.set_slot_attachment(timeline.slot, setup_name);
            }
        }
        Some(frame) => {
            let name = timeline.frames[frame].name.as_deref();
            skeleton.set_slot_attachment(timeline.slot, name);
        }
    }
}

fn apply_deform(
    timeline: &DeformTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
) {
    let Some(slot) = skeleton.slots.get(timeline.slot) else {
        return;
    };
    if !skeleton.bones.get(slot.bone).is_some_and(|b| b.active) {
        return;
    }
    let Some(attachment) = skeleton.slot_attachment(timeline.slot) else {
        return;
    };
    if attachment.timeline_attachment() != timeline.attachment {
        return;
    }
    let Some(vertices) = attachment.vertices() else {
        return;
    };
    // Unweighted deforms hold absolute positions; weighted ones hold offsets from zero.
    let setup: Vec<f32> = match vertices {
        VertexData::Unweighted(v) => v.iter().flat_map(|p| [p[0], p[1]]).collect(),
        VertexData::Weighted(_) => vec![0.0; vertices.deform_len()],
    };
    let len = setup.len();

    let slot = &mut skeleton.slots[timeline.slot];
    let mut blend = blend;
    if slot.deform.is_empty() {
        blend = MixBlend::Setup;
    }

    let Some(frame) = search(&timeline.frames, time, |f| f.time) else {
        match blend {
            MixBlend::Setup => slot.deform.clear(),
            MixBlend::First => {
                if alpha == 1.0 {
                    slot.deform.clear();
                    return;
                }
                if slot.deform.len() != len {
                    slot.deform = setup.clone();
                }
                for (d, s) in slot.deform.iter_mut().zip(&setup) {
                    *d += (s - *d) * alpha;
                }
            }
            MixBlend::Replace | MixBlend::Add => {}
        }
        return;
    };

    let prev = &timeline.frames[frame];
    let (next, percent) = match timeline.frames.get(frame + 1) {
        Some(next) => (next, curve_value(prev.curve, time, prev.time, 0.0, next.time, 1.0)),
        None => (prev, 0.0),
    };
    let offset = |vertices: &[f32], i: usize| vertices.get(i).copied().unwrap_or(0.0);
    let target: Vec<f32> = (0..len)
        .map(|i| {
            let a = offset(&prev.vertices, i);
            let b = offset(&next.vertices, i);
            setup[i] + a + (b - a) * percent
        })
        .collect();

    if slot.deform.len() != len {
        slot.deform = setup.clone();
    }
    let deform = &mut slot.deform;
    if alpha == 1.0 {
        if blend == MixBlend::Add {
            for ((d, t), s) in deform.iter_mut().zip(&target).zip(&setup) {
                *d += t - s;
            }
        } else {
            deform.copy_from_slice(&target);
        }
        return;
    }
    for ((d, t), s) in deform.iter_mut().zip(&target).zip(&setup) {
        match blend {
            MixBlend::Setup => *d = s + (t - s) * alpha,
            MixBlend::First | MixBlend::Replace => *d += (t - *d) * alpha,
            MixBlend::Add => *d += (t - s) * alpha,
        }
    }
}

/// Pushes events keyed in `(last_time, time]`. When `last_time > time` the animation looped, so
/// keys after `last_time` fire before keys from the start.
fn fire_events(timeline: &EventTimeline, last_time: f32, time: f32, events: &mut Vec<Event>) {
    let Some(last_key) = timeline.events.last() else {
        return;
    };
    let mut last_time = last_time;
    if last_time > time {
        fire_events(timeline, last_time, f32::MAX, events);
        last_time = -1.0;
    } else if last_time >= last_key.time {
        return;
    }
    let start = timeline.events.partition_point(|e| e.time <= last_time);
    events.extend(
        timeline.events[start..]
            .iter()
            .take_while(|e| e.time <= time)
            .cloned(),
    );
}

fn apply_draw_order(
    timeline: &DrawOrderTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    blend: MixBlend,
    direction: MixDirection,
) {
    let setup_order = |skeleton: &mut Skeleton| {
        skeleton.draw_order = (0..skeleton.slots.len()).collect();
    };
    if direction == MixDirection::Out {
        if blend == MixBlend::Setup {
            setup_order(skeleton);
        }
        return;
    }
    let Some(frame) = search(&timeline.frames, time, |f| f.time) else {
        if matches!(blend, MixBlend::Setup | MixBlend::First) {
            setup_order(skeleton);
        }
        return;
    };
    match &timeline.frames[frame].draw_order {
        Some(order) if order.len() == skeleton.slots.len() => {
            skeleton.draw_order.clone_from(order);
        }
        _ => setup_order(skeleton),
    }
}

fn apply_ik_constraint(
    timeline: &IkConstraintTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
    direction: MixDirection,
) {
    let data = Arc::clone(&skeleton.data);
    let Some(constraint) = skeleton.ik_constraints.get_mut(timeline.constraint) else {
        return;
    };
    let Some(setup) = data.ik_constraints.get(constraint.data_index()) else {
        return;
    };
    if !constraint.active {
        return;
    }

    let Some(frame) = search(&timeline.frames, time, |f| f.time) else {
        match blend {
            MixBlend::Setup => {
                constraint.mix = setup.mix;
                constraint.softness = setup.softness;
            }
            MixBlend::First => {
                constraint.mix += (setup.mix - constraint.mix) * alpha;
                constraint.softness += (setup.softness - constraint.softness) * alpha;
            }
            MixBlend::Replace | MixBlend::Add => return,
        }
        constraint.bend_direction = setup.bend_direction;
        constraint.compress = setup.compress;
        constraint.stretch = setup.stretch;
        return;
    };

    let prev = &timeline.frames[frame];
    let (mix, softness) = match timeline.frames.get(frame + 1) {
        Some(next) => (
            curve_value(prev.curves[0], time, prev.time, prev.mix, next.time, next.mix),
            curve_value(
                prev.curves[1],
                time,
                prev.time,
                prev.softness,
                next.time,
                next.softness,
            ),
        ),
        None => (prev.mix, prev.softness),
    };

    if blend == MixBlend::Setup {
        constraint.mix = setup.mix + (mix - setup.mix) * alpha;
        constraint.softness = setup.softness + (softness - setup.softness) * alpha;
        if direction == MixDirection::Out {
            constraint.bend_direction = setup.bend_direction;
            constraint.compress = setup.compress;
            constraint.stretch = setup.stretch;
            return;
        }
    } else {
        constraint.mix += (mix - constraint.mix) * alpha;
        constraint.softness += (softness - constraint.softness) * alpha;
        if direction == MixDirection::Out {
            return;
        }
    }
    constraint.bend_direction = prev.bend_direction;
    constraint.compress = prev.compress;
    constraint.stretch = prev.stretch;
}

fn apply_transform_constraint(
    timeline: &CurveTimeline<6>,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
) {
    let data = Arc::clone(&skeleton.data);
    let Some(constraint) = skeleton.transform_constraints.get_mut(timeline.target) else {
        return;
    };
    let Some(setup) = data.transform_constraints.get(constraint.data_index()) else {
        return;
    };
    if !constraint.active {
        return;
    }

    let setups = [
        setup.mix_rotate,
        setup.mix_x,
        setup.mix_y,
        setup.mix_scale_x,
        setup.mix_scale_y,
        setup.mix_shear_y,
    ];
    let currents = [
        &mut constraint.mix_rotate,
        &mut constraint.mix_x,
        &mut constraint.mix_y,
        &mut constraint.mix_scale_x,
        &mut constraint.mix_scale_y,
        &mut constraint.mix_shear_y,
    ];
    let values = sample(&timeline.frames, time);
    for (i, (current, setup)) in currents.into_iter().zip(setups).enumerate() {
        match values {
            Some(values) => mix_constraint(current, setup, values[i], alpha, blend),
            None => reset_before_first(current, setup, alpha, blend),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum PathProperty {
    Position,
    Spacing,
    Mix,
}

fn apply_path_constraint<const N: usize>(
    timeline: &CurveTimeline<N>,
    property: PathProperty,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
) {
    let data = Arc::clone(&skeleton.data);
    let Some(constraint) = skeleton.path_constraints.get_mut(timeline.target) else {
        return;
    };
    let Some(setup) = data.path_constraints.get(constraint.data_index()) else {
        return;
    };
    if !constraint.active {
        return;
    }

    let values = sample(&timeline.frames, time);
    let apply = |current: &mut f32, setup: f32, i: usize| {
        match values.as_ref().and_then(|v| v.get(i)) {
            Some(&value) => mix_constraint(current, setup, value, alpha, blend),
            None => reset_before_first(current, setup, alpha, blend),
        }
    };
    match property {
        PathProperty::Position => apply(&mut constraint.position, setup.position, 0),
        PathProperty::Spacing => apply(&mut constraint.spacing, setup.spacing, 0),
        PathProperty::Mix => {
            apply(&mut constraint.mix_rotate, setup.mix_rotate, 0);
            apply(&mut constraint.mix_x, setup.mix_x, 1);
            apply(&mut constraint.mix_y, setup.mix_y, 2);
        }
    }
}

/// Index of the last key at or before `time`, or `None` before the first key.
fn search<T>(frames: &[T], time: f32, key_time: impl Fn(&T) -> f32) -> Option<usize> {
    frames
        .partition_point(|frame| key_time(frame) <= time)
        .checked_sub(1)
}

/// Interpolated channel values at `time`, or `None` before the first key.
pub(crate) fn sample<const N: usize>(frames: &[CurveFrame<N>], time: f32) -> Option<[f32; N]> {
    let index = frames.partition_point(|f| f.time <= time);
    if index == 0 {
        return None;
    }
    let prev = &frames[index - 1];
    let Some(next) = frames.get(index) else {
        return Some(prev.values);
    };
    Some(std::array::from_fn(|i| {
        curve_value(
            prev.curves[i],
            time,
            prev.time,
            prev.values[i],
            next.time,
            next.values[i],
        )
    }))
}

/// Value between two keys. Bezier control points are in `(time, value)` space.
pub(crate) fn curve_value(
    curve: Curve,
    time: f32,
    time1: f32,
    value1: f32,
    time2: f32,
    value2: f32,
) -> f32 {
    let span = time2 - time1;
    if span.abs() <= 1.0e-12 {
        return value2;
    }
    match curve {
        Curve::Linear => value1 + (value2 - value1) * ((time - time1) / span),
        Curve::Stepped => value1,
        Curve::Bezier { cx1, cy1, cx2, cy2 } => {
            let points = bezier_points([time1, value1], [cx1, cy1], [cx2, cy2], [time2, value2]);
            bezier_value(&points, time, [time1, value1], [time2, value2])
        }
    }
}

const BEZIER_POINTS: usize = 9;

/// Samples the curve at 9 evenly spaced parameters using forward differencing.
fn bezier_points(
    start: [f32; 2],
    control1: [f32; 2],
    control2: [f32; 2],
    end: [f32; 2],
) -> [[f32; 2]; BEZIER_POINTS] {
    let mut points = [[0.0f32; 2]; BEZIER_POINTS];
    for axis in 0..2 {
        let (p0, p1, p2, p3) = (start[axis], control1[axis], control2[axis], end[axis]);
        let tmp = (p0 - p1 * 2.0 + p2) * 0.03;
        let ddd = ((p1 - p2) * 3.0 - p0 + p3) * 0.006;
        let mut dd = tmp * 2.0 + ddd;
        let mut d = (p1 - p0) * 0.3 + tmp + ddd / 6.0;
        let mut v = p0 + d;
        for point in points.iter_mut() {
            point[axis] = v;
            d += dd;
            dd += ddd;
            v += d;
        }
    }
    points
}

fn bezier_value(
    points: &[[f32; 2]; BEZIER_POINTS],
    time: f32,
    start: [f32; 2],
    end: [f32; 2],
) -> f32 {
    let lerp = |[x1, y1]: [f32; 2], [x2, y2]: [f32; 2]| {
        let span = x2 - x1;
        if span.abs() <= 1.0e-12 {
            y1
        } else {
            y1 + (time - x1) / span * (y2 - y1)
        }
    };
    let index = points.partition_point(|p| p[0] < time);
    match index {
        0 => lerp(start, points[0]),
        i if i >= BEZIER_POINTS => lerp(points[BEZIER_POINTS - 1], end),
        i => lerp(points[i - 1], points[i]),
    }
}
