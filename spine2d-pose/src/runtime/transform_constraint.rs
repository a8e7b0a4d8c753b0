use super::skeleton::wrap_degrees;
use crate::{Skeleton, TransformConstraintData};
use std::f32::consts::{FRAC_PI_2, PI};

#[derive(Copy, Clone, Debug)]
struct Mix {
    rotate: f32,
    x: f32,
    y: f32,
    scale_x: f32,
    scale_y: f32,
    shear_y: f32,
}

impl Skeleton {
    pub(crate) fn update_transform_constraint(&mut self, index: usize) {
        let Some(constraint) = self.transform_constraints.get(index) else {
            return;
        };
        let mix = Mix {
            rotate: constraint.mix_rotate,
            x: constraint.mix_x,
            y: constraint.mix_y,
            scale_x: constraint.mix_scale_x,
            scale_y: constraint.mix_scale_y,
            shear_y: constraint.mix_shear_y,
        };
        if mix.rotate == 0.0
            && mix.x == 0.0
            && mix.y == 0.0
            && mix.scale_x == 0.0
            && mix.scale_y == 0.0
            && mix.shear_y == 0.0
        {
            return;
        }
        let bones = constraint.bones.clone();
        let target = constraint.target;
        let data = std::sync::Arc::clone(&self.data);
        let Some(data) = data.transform_constraints.get(constraint.data_index()) else {
            return;
        };
        if target >= self.bones.len() {
            return;
        }

        match (data.local, data.relative) {
            (false, false) => self.apply_absolute_world(&bones, target, data, mix),
            (false, true) => self.apply_relative_world(&bones, target, data, mix),
            (true, false) => self.apply_absolute_local(&bones, target, data, mix),
            (true, true) => self.apply_relative_local(&bones, target, data, mix),
        }
    }

    fn apply_absolute_world(
        &mut self,
        bones: &[usize],
        target: usize,
        data: &TransformConstraintData,
        mix: Mix,
    ) {
        let t = &self.bones[target];
        let (ta, tb, tc, td) = (t.a, t.b, t.c, t.d);
        let reflect = if ta * td - tb * tc > 0.0 { 1.0 } else { -1.0 };
        let offset_rotation = data.offset_rotation.to_radians() * reflect;
        let offset_shear_y = data.offset_shear_y.to_radians() * reflect;
        let [tx, ty] = t.local_to_world(data.offset_x, data.offset_y);
        let translate = mix.x != 0.0 || mix.y != 0.0;

        for &bone_index in bones {
            let Some(bone) = self.bones.get_mut(bone_index) else {
                continue;
            };

            if mix.rotate != 0.0 {
                let r = wrap_radians(tc.atan2(ta) - bone.c.atan2(bone.a) + offset_rotation)
                    * mix.rotate;
                rotate_matrix(&mut bone.a, &mut bone.b, &mut bone.c, &mut bone.d, r);
            }

            if translate {
                bone.world_x += (tx - bone.world_x) * mix.x;
                bone.world_y += (ty - bone.world_y) * mix.y;
            }

            if mix.scale_x != 0.0 {
                let s = (bone.a * bone.a + bone.c * bone.c).sqrt();
                if s != 0.0 {
                    let ts = (ta * ta + tc * tc).sqrt();
                    let s = (s + (ts - s + data.offset_scale_x) * mix.scale_x) / s;
                    bone.a *= s;
                    bone.c *= s;
                }
            }

            if mix.scale_y != 0.0 {
                let s = (bone.b * bone.b + bone.d * bone.d).sqrt();
                if s != 0.0 {
                    let ts = (tb * tb + td * td).sqrt();
                    let s = (s + (ts - s + data.offset_scale_y) * mix.scale_y) / s;
                    bone.b *= s;
                    bone.d *= s;
                }
            }

            if mix.shear_y > 0.0 {
                let by = bone.d.atan2(bone.b);
                let r = wrap_radians(td.atan2(tb) - tc.atan2(ta) - (by - bone.c.atan2(bone.a)));
                let r = by + (r + offset_shear_y) * mix.shear_y;
                let s = (bone.b * bone.b + bone.d * bone.d).sqrt();
                bone.b = r.cos() * s;
                bone.d = r.sin() * s;
            }

            self.update_applied_transform(bone_index);
        }
    }

    fn apply_relative_world(
        &mut self,
        bones: &[usize],
        target: usize,
        data: &TransformConstraintData,
        mix: Mix,
    ) {
        let t = &self.bones[target];
        let (ta, tb, tc, td) = (t.a, t.b, t.c, t.d);
        let reflect = if ta * td - tb * tc > 0.0 { 1.0 } else { -1.0 };
        let offset_rotation = data.offset_rotation.to_radians() * reflect;
        let offset_shear_y = data.offset_shear_y.to_radians() * reflect;
        let [tx, ty] = t.local_to_world(data.offset_x, data.offset_y);
        let translate = mix.x != 0.0 || mix.y != 0.0;

        for &bone_index in bones {
            let Some(bone) = self.bones.get_mut(bone_index) else {
                continue;
            };

            if mix.rotate != 0.0 {
                let r = wrap_radians(tc.atan2(ta) + offset_rotation) * mix.rotate;
                rotate_matrix(&mut bone.a, &mut bone.b, &mut bone.c, &mut bone.d, r);
            }

            if translate {
                bone.world_x += tx * mix.x;
                bone.world_y += ty * mix.y;
            }

            if mix.scale_x != 0.0 {
                let s = ((ta * ta + tc * tc).sqrt() - 1.0 + data.offset_scale_x) * mix.scale_x
                    + 1.0;
                bone.a *= s;
                bone.c *= s;
            }

            if mix.scale_y != 0.0 {
                let s = ((tb * tb + td * td).sqrt() - 1.0 + data.offset_scale_y) * mix.scale_y
                    + 1.0;
                bone.b *= s;
                bone.d *= s;
            }

            if mix.shear_y > 0.0 {
                let r = wrap_radians(td.atan2(tb) - tc.atan2(ta));
                let r = bone.d.atan2(bone.b) + (r - FRAC_PI_2 + offset_shear_y) * mix.shear_y;
                let s = (bone.b * bone.b + bone.d * bone.d).sqrt();
                bone.b = r.cos() * s;
                bone.d = r.sin() * s;
            }

            self.update_applied_transform(bone_index);
        }
    }

    fn apply_absolute_local(
        &mut self,
        bones: &[usize],
        target: usize,
        data: &TransformConstraintData,
        mix: Mix,
    ) {
        self.ensure_applied(target);
        let t = self.bones[target].clone();

        for &bone_index in bones {
            if bone_index >= self.bones.len() {
                continue;
            }
            self.ensure_applied(bone_index);
            let bone = &self.bones[bone_index];

            let mut rotation = bone.arotation;
            if mix.rotate != 0.0 {
                let r = wrap_degrees(t.arotation - rotation + data.offset_rotation);
                rotation += r * mix.rotate;
            }

            let x = bone.ax + (t.ax - bone.ax + data.offset_x) * mix.x;
            let y = bone.ay + (t.ay - bone.ay + data.offset_y) * mix.y;

            let scale_x =
                bone.ascale_x + (t.ascale_x - bone.ascale_x + data.offset_scale_x) * mix.scale_x;
            let scale_y =
                bone.ascale_y + (t.ascale_y - bone.ascale_y + data.offset_scale_y) * mix.scale_y;

            let mut shear_y = bone.ashear_y;
            if mix.shear_y != 0.0 {
                let r = wrap_degrees(t.ashear_y - shear_y + data.offset_shear_y);
                shear_y += r * mix.shear_y;
            }

            let shear_x = bone.ashear_x;
            self.update_bone_world_with(
                bone_index, x, y, rotation, scale_x, scale_y, shear_x, shear_y,
            );
        }
    }

    fn apply_relative_local(
        &mut self,
        bones: &[usize],
        target: usize,
        data: &TransformConstraintData,
        mix: Mix,
    ) {
        self.ensure_applied(target);
        let t = self.bones[target].clone();

        for &bone_index in bones {
            if bone_index >= self.bones.len() {
                continue;
            }
            self.ensure_applied(bone_index);
            let bone = &self.bones[bone_index];

            let rotation = bone.arotation + (t.arotation + data.offset_rotation) * mix.rotate;
            let x = bone.ax + (t.ax + data.offset_x) * mix.x;
            let y = bone.ay + (t.ay + data.offset_y) * mix.y;
            let scale_x =
                bone.ascale_x * ((t.ascale_x - 1.0 + data.offset_scale_x) * mix.scale_x + 1.0);
            let scale_y =
                bone.ascale_y * ((t.ascale_y - 1.0 + data.offset_scale_y) * mix.scale_y + 1.0);
            let shear_y = bone.ashear_y + (t.ashear_y + data.offset_shear_y) * mix.shear_y;

            let shear_x = bone.ashear_x;
            self.update_bone_world_with(
                bone_index, x, y, rotation, scale_x, scale_y, shear_x, shear_y,
            );
        }
    }
}

fn rotate_matrix(a: &mut f32, b: &mut f32, c: &mut f32, d: &mut f32, radians: f32) {
    let (sin, cos) = radians.sin_cos();
    let (a0, b0, c0, d0) = (*a, *b, *c, *d);
    *a = cos * a0 - sin * c0;
    *b = cos * b0 - sin * d0;
    *c = sin * a0 + cos * c0;
    *d = sin * b0 + cos * d0;
}

/// Wraps radians into `[-PI, PI]`.
pub(crate) fn wrap_radians(radians: f32) -> f32 {
    if radians > PI {
        radians - 2.0 * PI
    } else if radians < -PI {
        radians + 2.0 * PI
    } else {
        radians
    }
}
