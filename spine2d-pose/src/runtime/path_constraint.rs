use super::transform_constraint::wrap_radians;
use crate::{
    AttachmentData, PathAttachmentData, PathConstraintData, PositionMode, RotateMode, Skeleton,
    SpacingMode,
};
use std::sync::Arc;

const EPSILON: f32 = 1.0e-5;

/// Segments per curve when resampling for constant speed.
const CURVE_SEGMENTS: usize = 10;

/// A point on the path and the tangent angle (radians) there.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct PathSample {
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
}

/// One cubic Bezier: start, first control, second control, end.
type Curve = [f32; 8];

impl Skeleton {
    pub(crate) fn update_path_constraint(&mut self, index: usize) {
        let Some(constraint) = self.path_constraints.get(index) else {
            return;
        };
        let (mix_rotate, mix_x, mix_y) = (constraint.mix_rotate, constraint.mix_x, constraint.mix_y);
        if mix_rotate == 0.0 && mix_x == 0.0 && mix_y == 0.0 {
            return;
        }
        let data = Arc::clone(&self.data);
        let Some(constraint_data) = data.path_constraints.get(constraint.data_index()) else {
            return;
        };
        let Some(AttachmentData::Path(path)) = self.slot_attachment(constraint.target) else {
            return;
        };
        let path = path.clone();
        let bones = constraint.bones.clone();
        let (target, position, spacing) = (constraint.target, constraint.position, constraint.spacing);
        if bones.is_empty() {
            return;
        }

        let tangents = constraint_data.rotate_mode == RotateMode::Tangent;
        let scale = constraint_data.rotate_mode == RotateMode::ChainScale;
        let (spaces, lengths) = self.path_spaces(&bones, constraint_data, spacing, tangents, scale);
        let samples = self.path_world_positions(
            target,
            &path,
            constraint_data,
            position,
            &spaces,
            tangents,
        );

        let mut bone_x = samples[0].x;
        let mut bone_y = samples[0].y;
        let mut offset_rotation = constraint_data.offset_rotation;
        let tip = if offset_rotation == 0.0 {
            constraint_data.rotate_mode == RotateMode::Chain
        } else {
            let slot_bone = &self.bones[self.slots[target].bone];
            let reflect = if slot_bone.a * slot_bone.d - slot_bone.b * slot_bone.c > 0.0 {
                1.0
            } else {
                -1.0
            };
            offset_rotation = offset_rotation.to_radians() * reflect;
            false
        };

        for (i, &bone_index) in bones.iter().enumerate() {
            let length = data.bones.get(bone_index).map_or(0.0, |b| b.length);
            let Some(bone) = self.bones.get_mut(bone_index) else {
                continue;
            };
            bone.world_x += (bone_x - bone.world_x) * mix_x;
            bone.world_y += (bone_y - bone.world_y) * mix_y;

            let next = samples.get(i + 1).copied().unwrap_or_default();
            let dx = next.x - bone_x;
            let dy = next.y - bone_y;
            if scale {
                let length = lengths[i];
                if length >= EPSILON {
                    let s = ((dx * dx + dy * dy).sqrt() / length - 1.0) * mix_rotate + 1.0;
                    bone.a *= s;
                    bone.c *= s;
                }
            }
            bone_x = next.x;
            bone_y = next.y;

            if mix_rotate > 0.0 {
                let (a, b, c, d) = (bone.a, bone.b, bone.c, bone.d);
                let mut r = if tangents {
                    samples[i].rotation
                } else if spaces[i + 1] < EPSILON {
                    next.rotation
                } else {
                    dy.atan2(dx)
                };
                r -= c.atan2(a);
                if tip {
                    let (sin, cos) = r.sin_cos();
                    bone_x += (length * (cos * a - sin * c) - dx) * mix_rotate;
                    bone_y += (length * (sin * a + cos * c) - dy) * mix_rotate;
                } else {
                    r += offset_rotation;
                }
                let r = wrap_radians(r) * mix_rotate;
                let (sin, cos) = r.sin_cos();
                bone.a = cos * a - sin * c;
                bone.b = cos * b - sin * d;
                bone.c = sin * a + cos * c;
                bone.d = sin * b + cos * d;
            }

            self.update_applied_transform(bone_index);
        }
    }

    /// Spacing before each sample and, for `ChainScale`, each bone's world length.
    fn path_spaces(
        &self,
        bones: &[usize],
        data: &PathConstraintData,
        spacing: f32,
        tangents: bool,
        scale: bool,
    ) -> (Vec<f32>, Vec<f32>) {
        let spaces_count = if tangents { bones.len() } else { bones.len() + 1 };
        let mut spaces = vec![0.0f32; spaces_count];
        let mut lengths = if scale {
            vec![0.0f32; bones.len()]
        } else {
            Vec::new()
        };
        let world_length = |bone_index: usize| {
            let setup_length = self.data.bones.get(bone_index).map_or(0.0, |b| b.length);
            let bone = &self.bones[bone_index];
            let x = setup_length * bone.a;
            let y = setup_length * bone.c;
            (setup_length, (x * x + y * y).sqrt())
        };

        match data.spacing_mode {
            SpacingMode::Percent => {
                if scale {
                    for (i, &bone_index) in bones.iter().enumerate().take(spaces_count - 1) {
                        lengths[i] = world_length(bone_index).1;
                    }
                }
                spaces.iter_mut().skip(1).for_each(|s| *s = spacing);
            }
            SpacingMode::Proportional => {
                let mut sum = 0.0f32;
                for (i, &bone_index) in bones.iter().enumerate().take(spaces_count - 1) {
                    let (setup_length, length) = world_length(bone_index);
                    if setup_length < EPSILON {
                        spaces[i + 1] = spacing;
                        continue;
                    }
                    if scale {
                        lengths[i] = length;
                    }
                    spaces[i + 1] = length;
                    sum += length;
                }
                if sum > 0.0 {
                    let factor = spaces_count as f32 / sum * spacing;
                    spaces.iter_mut().skip(1).for_each(|s| *s *= factor);
                }
            }
            SpacingMode::Length | SpacingMode::Fixed => {
                let length_spacing = data.spacing_mode == SpacingMode::Length;
                for (i, &bone_index) in bones.iter().enumerate().take(spaces_count - 1) {
                    let (setup_length, length) = world_length(bone_index);
                    if setup_length < EPSILON {
                        spaces[i + 1] = spacing;
                        continue;
                    }
                    if scale {
                        lengths[i] = length;
                    }
                    let space = if length_spacing {
                        setup_length + spacing
                    } else {
                        spacing
                    };
                    spaces[i + 1] = space * length / setup_length;
                }
            }
        }
        (spaces, lengths)
    }

    /// Samples the path once per space. Returns one more sample than spaces so the chain end is
    /// always available.
    pub(crate) fn path_world_positions(
        &self,
        slot_index: usize,
        path: &PathAttachmentData,
        data: &PathConstraintData,
        mut position: f32,
        spaces: &[f32],
        tangents: bool,
    ) -> Vec<PathSample> {
        let mut out = vec![PathSample::default(); spaces.len() + 1];
        let all = self
            .compute_world_vertices(slot_index, &path.vertices)
            .into_iter()
            .flatten()
            .collect::<Vec<f32>>();
        let closed = path.closed;
        let vertices_length = all.len();
        if vertices_length < 8 {
            return out;
        }

        let multiplier = |path_length: f32| match data.spacing_mode {
            SpacingMode::Percent => path_length,
            SpacingMode::Proportional => path_length / spaces.len() as f32,
            SpacingMode::Length | SpacingMode::Fixed => 1.0,
        };

        if !path.constant_speed {
            let knots = vertices_length / 6;
            let curve_count = if closed { knots } else { knots.saturating_sub(1) };
            let lengths = &path.lengths[..curve_count.min(path.lengths.len())];
            let Some(&path_length) = lengths.last() else {
                return out;
            };
            if data.position_mode == PositionMode::Percent {
                position *= path_length;
            }
            let multiplier = multiplier(path_length);
            let curve_at = |curve: usize| -> Curve {
                if closed && curve + 1 == lengths.len() {
                    let e = vertices_length;
                    [
                        all[e - 4], all[e - 3], all[e - 2], all[e - 1], all[0], all[1], all[2],
                        all[3],
                    ]
                } else {
                    let s = curve * 6 + 2;
                    let mut c = [0.0; 8];
                    c.copy_from_slice(&all[s..s + 8]);
                    c
                }
            };

            for (i, &space) in spaces.iter().enumerate() {
                let space = space * multiplier;
                position += space;
                let mut p = position;
                if closed {
                    p = p.rem_euclid(path_length);
                } else if p < 0.0 {
                    out[i] = before_position(p, &all[2..6]);
                    continue;
                } else if p > path_length {
                    out[i] = after_position(p - path_length, &all[vertices_length - 6..vertices_length - 2]);
                    continue;
                }
                let (curve, t) = locate(lengths, p);
                out[i] = curve_position(t, &curve_at(curve), tangents || (i > 0 && space < EPSILON));
            }
            return out;
        }

        // Constant speed: flatten knots into consecutive curves sharing end points.
        let world = if closed {
            let mut world = all[2..].to_vec();
            world.extend_from_slice(&all[0..4]);
            world
        } else {
            all[2..vertices_length - 2].to_vec()
        };
        let curve_count = (world.len() - 2) / 6;
        if curve_count == 0 {
            return out;
        }
        let curve_at = |curve: usize| -> Curve {
            let mut c = [0.0; 8];
            c.copy_from_slice(&world[curve * 6..curve * 6 + 8]);
            c
        };

        let mut curve_lengths = Vec::with_capacity(curve_count);
        let mut path_length = 0.0f32;
        for curve in 0..curve_count {
            path_length += coarse_curve_length(&curve_at(curve));
            curve_lengths.push(path_length);
        }

        if data.position_mode == PositionMode::Percent {
            position *= path_length;
        }
        let multiplier = multiplier(path_length);
        let mut segments = [0.0f32; CURVE_SEGMENTS];
        let mut prev_curve = None;

        for (i, &space) in spaces.iter().enumerate() {
            let space = space * multiplier;
            position += space;
            let mut p = position;
            if closed {
                p = p.rem_euclid(path_length);
            } else if p < 0.0 {
                out[i] = before_position(p, &world[0..4]);
                continue;
            } else if p > path_length {
                let e = world.len();
                out[i] = after_position(p - path_length, &world[e - 4..e]);
                continue;
            }

            let (curve, t) = locate(&curve_lengths, p);
            let bezier = curve_at(curve);
            if prev_curve != Some(curve) {
                prev_curve = Some(curve);
                segments = segment_lengths(&bezier);
            }
            // Reparameterize by arc length within the curve.
            let (segment, st) = locate(&segments, t * segments[CURVE_SEGMENTS - 1]);
            let t = (segment as f32 + st) / CURVE_SEGMENTS as f32;
            out[i] = curve_position(t, &bezier, tangents || (i > 0 && space < EPSILON));
        }
        out
    }
}

/// Index of the first cumulative length at or beyond `p`, and the fraction of `p` within it.
fn locate(cumulative: &[f32], p: f32) -> (usize, f32) {
    let last = cumulative.len().saturating_sub(1);
    let index = cumulative.partition_point(|&l| p > l).min(last);
    let start = if index == 0 { 0.0 } else { cumulative[index - 1] };
    let span = cumulative[index] - start;
    (index, (p - start) / span)
}

fn before_position(p: f32, w: &[f32]) -> PathSample {
    let (x1, y1) = (w[0], w[1]);
    let r = (w[3] - y1).atan2(w[2] - x1);
    PathSample {
        x: x1 + p * r.cos(),
        y: y1 + p * r.sin(),
        rotation: r,
    }
}

fn after_position(p: f32, w: &[f32]) -> PathSample {
    let (x1, y1) = (w[2], w[3]);
    let r = (y1 - w[1]).atan2(x1 - w[0]);
    PathSample {
        x: x1 + p * r.cos(),
        y: y1 + p * r.sin(),
        rotation: r,
    }
}

fn curve_position(p: f32, curve: &Curve, tangents: bool) -> PathSample {
    let [x1, y1, cx1, cy1, cx2, cy2, x2, y2] = *curve;
    if p < EPSILON || p.is_nan() {
        return PathSample {
            x: x1,
            y: y1,
            rotation: (cy1 - y1).atan2(cx1 - x1),
        };
    }
    let tt = p * p;
    let ttt = tt * p;
    let u = 1.0 - p;
    let uu = u * u;
    let uuu = uu * u;
    let ut = u * p;
    let ut3 = ut * 3.0;
    let uut3 = u * ut3;
    let utt3 = ut3 * p;
    let x = x1 * uuu + cx1 * uut3 + cx2 * utt3 + x2 * ttt;
    let y = y1 * uuu + cy1 * uut3 + cy2 * utt3 + y2 * ttt;
    let rotation = if !tangents {
        0.0
    } else if p < 0.001 {
        (cy1 - y1).atan2(cx1 - x1)
    } else {
        (y - (y1 * uu + cy1 * ut * 2.0 + cy2 * tt)).atan2(x - (x1 * uu + cx1 * ut * 2.0 + cx2 * tt))
    };
    PathSample { x, y, rotation }
}

/// Forward differencing over four steps.
fn coarse_curve_length(curve: &Curve) -> f32 {
    let [x1, y1, cx1, cy1, cx2, cy2, x2, y2] = *curve;
    let tmpx = (x1 - cx1 * 2.0 + cx2) * 0.1875;
    let tmpy = (y1 - cy1 * 2.0 + cy2) * 0.1875;
    let dddfx = ((cx1 - cx2) * 3.0 - x1 + x2) * 0.09375;
    let dddfy = ((cy1 - cy2) * 3.0 - y1 + y2) * 0.09375;
    let mut ddfx = tmpx * 2.0 + dddfx;
    let mut ddfy = tmpy * 2.0 + dddfy;
    let mut dfx = (cx1 - x1) * 0.75 + tmpx + dddfx * 0.166_666_67;
    let mut dfy = (cy1 - y1) * 0.75 + tmpy + dddfy * 0.166_666_67;
    let mut length = dfx.hypot(dfy);
    dfx += ddfx;
    dfy += ddfy;
    ddfx += dddfx;
    ddfy += dddfy;
    length += dfx.hypot(dfy);
    dfx += ddfx;
    dfy += ddfy;
    length += dfx.hypot(dfy);
    dfx += ddfx + dddfx;
    dfy += ddfy + dddfy;
    length + dfx.hypot(dfy)
}

/// Cumulative lengths of the curve split into equal parameter steps.
fn segment_lengths(curve: &Curve) -> [f32; CURVE_SEGMENTS] {
    let [x1, y1, cx1, cy1, cx2, cy2, x2, y2] = *curve;
    let tmpx = (x1 - cx1 * 2.0 + cx2) * 0.03;
    let tmpy = (y1 - cy1 * 2.0 + cy2) * 0.03;
    let dddfx = ((cx1 - cx2) * 3.0 - x1 + x2) * 0.006;
    let dddfy = ((cy1 - cy2) * 3.0 - y1 + y2) * 0.006;
    let mut ddfx = tmpx * 2.0 + dddfx;
    let mut ddfy = tmpy * 2.0 + dddfy;
    let mut dfx = (cx1 - x1) * 0.3 + tmpx + dddfx * 0.166_666_67;
    let mut dfy = (cy1 - y1) * 0.3 + tmpy + dddfy * 0.166_666_67;
    let mut segments = [0.0f32; CURVE_SEGMENTS];
    let mut length = dfx.hypot(dfy);
    segments[0] = length;
    for segment in segments.iter_mut().take(8).skip(1) {
        dfx += ddfx;
        dfy += ddfy;
        ddfx += dddfx;
        ddfy += dddfy;
        length += dfx.hypot(dfy);
        *segment = length;
    }
    dfx += ddfx;
    dfy += ddfy;
    length += dfx.hypot(dfy);
    segments[8] = length;
    dfx += ddfx + dddfx;
    dfy += ddfy + dddfy;
    length += dfx.hypot(dfy);
    segments[9] = length;
    segments
}
