use super::skeleton::wrap_degrees;
use crate::{Skeleton, TransformMode};
use std::f32::consts::PI;

/// Passes over a chain of three or more bones before the solution is accepted.
pub const IK_CHAIN_ITERATIONS: usize = 10;

const CHAIN_TOLERANCE: f32 = 1.0e-4;

impl Skeleton {
    pub(crate) fn update_ik_constraint(&mut self, index: usize) {
        let Some(constraint) = self.ik_constraints.get(index) else {
            return;
        };
        let Some(target) = self.bones.get(constraint.target) else {
            return;
        };
        let (target_x, target_y) = (target.world_x, target.world_y);
        let bones = constraint.bones.clone();
        let mix = constraint.mix;
        let softness = constraint.softness;
        let bend_direction = constraint.bend_direction;
        let compress = constraint.compress;
        let stretch = constraint.stretch;
        let uniform = self
            .data
            .ik_constraints
            .get(constraint.data_index())
            .is_some_and(|d| d.uniform);

        if mix == 0.0 {
            // The chain below the first bone is not revisited by the update cache.
            for &bone in bones.iter().skip(1) {
                self.update_bone_world(bone);
            }
            return;
        }

        match bones.as_slice() {
            [] => {}
            &[bone] => {
                self.ik_apply1(bone, target_x, target_y, compress, stretch, uniform, mix);
            }
            &[parent, child] => self.ik_apply2(
                parent,
                child,
                target_x,
                target_y,
                bend_direction,
                stretch,
                uniform,
                softness,
                mix,
            ),
            chain => self.ik_apply_chain(chain, target_x, target_y, mix),
        }
    }

    fn effective_mode(&self, bone: usize) -> TransformMode {
        match self.bones.get(bone) {
            Some(b) if b.parent_index().is_some() => b.transform_mode,
            _ => TransformMode::Normal,
        }
    }

    /// Rotates a single bone so its x axis points at the target. `compress` and `stretch` scale
    /// the bone along x so its tip reaches the target; `uniform` scales y too.
    #[allow(clippy::too_many_arguments)]
    pub fn ik_apply1(
        &mut self,
        bone_index: usize,
        target_x: f32,
        target_y: f32,
        compress: bool,
        stretch: bool,
        uniform: bool,
        alpha: f32,
    ) {
        if bone_index >= self.bones.len() {
            return;
        }
        self.ensure_applied(bone_index);
        let bone = &self.bones[bone_index];
        let length = self
            .data
            .bones
            .get(bone.data_index())
            .map_or(0.0, |d| d.length);
        let p = self.parent_transform(bone.parent_index());
        let (pa, mut pb, pc, mut pd) = (p.a, p.b, p.c, p.d);
        let mode = self.effective_mode(bone_index);

        let mut rotation_ik = -bone.ashear_x - bone.arotation;
        let (mut tx, mut ty);
        if mode == TransformMode::OnlyTranslation {
            tx = target_x - bone.world_x;
            ty = target_y - bone.world_y;
        } else {
            if mode == TransformMode::NoRotationOrReflection {
                let s = (pa * pd - pb * pc).abs() / (pa * pa + pc * pc).max(f32::EPSILON);
                let sa = pa / self.scale_x;
                let sc = pc / self.scale_y;
                pb = -sc * s * self.scale_x;
                pd = sa * s * self.scale_y;
                rotation_ik += sc.atan2(sa).to_degrees();
            }
            let x = target_x - p.world_x;
            let y = target_y - p.world_y;
            let det = pa * pd - pb * pc;
            if det.abs() <= f32::EPSILON {
                return;
            }
            tx = (x * pd - y * pb) / det - bone.ax;
            ty = (y * pa - x * pc) / det - bone.ay;
        }

        if tx.abs() <= f32::EPSILON && ty.abs() <= f32::EPSILON {
            // Target sits on the bone origin: no direction to aim at.
            rotation_ik = 0.0;
        } else {
            rotation_ik += ty.atan2(tx).to_degrees();
            if bone.ascale_x < 0.0 {
                rotation_ik += 180.0;
            }
            rotation_ik = wrap_degrees(rotation_ik);
        }

        let mut sx = bone.ascale_x;
        let mut sy = bone.ascale_y;
        if compress || stretch {
            if matches!(
                mode,
                TransformMode::NoScale | TransformMode::NoScaleOrReflection
            ) {
                tx = target_x - bone.world_x;
                ty = target_y - bone.world_y;
            }
            let b = length * sx;
            let dd = (tx * tx + ty * ty).sqrt();
            if b.abs() > 1.0e-4 && ((compress && dd < b) || (stretch && dd > b)) {
                let s = (dd / b - 1.0) * alpha + 1.0;
                sx *= s;
                if uniform {
                    sy *= s;
                }
            }
        }

        let (ax, ay, rotation, shear_x, shear_y) =
            (bone.ax, bone.ay, bone.arotation, bone.ashear_x, bone.ashear_y);
        self.update_bone_world_with(
            bone_index,
            ax,
            ay,
            rotation + rotation_ik * alpha,
            sx,
            sy,
            shear_x,
            shear_y,
        );
    }

    /// Solves a parent/child pair so the child's tip reaches the target. Uniformly scaled parents
    /// use the law of cosines, others a quadratic in the child's local frame. `softness` eases
    /// the target inward near full extension; `stretch` scales the parent when out of reach.
    #[allow(clippy::too_many_arguments)]
    pub fn ik_apply2(
        &mut self,
        parent_index: usize,
        child_index: usize,
        target_x: f32,
        target_y: f32,
        bend_direction: i32,
        stretch: bool,
        uniform: bool,
        softness: f32,
        alpha: f32,
    ) {
        if parent_index >= self.bones.len() || child_index >= self.bones.len() {
            return;
        }
        self.ensure_applied(parent_index);
        self.ensure_applied(child_index);
        if alpha == 0.0 {
            self.update_bone_world(child_index);
            return;
        }

        let bend = if bend_direction < 0 { -1.0 } else { 1.0 };
        let parent = &self.bones[parent_index];
        let child = &self.bones[child_index];
        let child_length = self
            .data
            .bones
            .get(child.data_index())
            .map_or(0.0, |d| d.length);

        let px = parent.ax;
        let py = parent.ay;
        let mut psx = parent.ascale_x;
        let mut sx = psx;
        let mut psy = parent.ascale_y;
        let mut sy = psy;
        let mut csx = child.ascale_x;
        let (os1, mut s2) = if psx < 0.0 {
            psx = -psx;
            (180.0, -1.0)
        } else {
            (0.0, 1.0)
        };
        if psy < 0.0 {
            psy = -psy;
            s2 = -s2;
        }
        let os2 = if csx < 0.0 {
            csx = -csx;
            180.0
        } else {
            0.0
        };

        let cx = child.ax;
        let u = (psx - psy).abs() <= 1.0e-4;
        let (cy, cwx, cwy) = if !u || stretch {
            (0.0, parent.a * cx + parent.world_x, parent.c * cx + parent.world_y)
        } else {
            let cy = child.ay;
            (
                cy,
                parent.a * cx + parent.b * cy + parent.world_x,
                parent.c * cx + parent.d * cy + parent.world_y,
            )
        };

        let pp = self.parent_transform(parent.parent_index());
        let (a, b, c, d) = (pp.a, pp.b, pp.c, pp.d);
        let det = a * d - b * c;
        if det.abs() <= f32::EPSILON {
            self.update_bone_world(child_index);
            return;
        }
        let id = 1.0 / det;
        let x = cwx - pp.world_x;
        let y = cwy - pp.world_y;
        let dx = (x * d - y * b) * id - px;
        let dy = (y * a - x * c) * id - py;
        let l1 = (dx * dx + dy * dy).sqrt();
        let mut l2 = child_length * csx;

        if l1 < 1.0e-4 {
            let (child_sx, child_sy, child_shx, child_shy) =
                (child.ascale_x, child.ascale_y, child.ashear_x, child.ashear_y);
            self.ik_apply1(parent_index, target_x, target_y, false, stretch, false, alpha);
            self.update_bone_world_with(
                child_index,
                cx,
                cy,
                0.0,
                child_sx,
                child_sy,
                child_shx,
                child_shy,
            );
            return;
        }

        let x = target_x - pp.world_x;
        let y = target_y - pp.world_y;
        let mut tx = (x * d - y * b) * id - px;
        let mut ty = (y * a - x * c) * id - py;
        let mut dd = tx * tx + ty * ty;
        if softness != 0.0 {
            let softness = softness * psx * (csx + 1.0) * 0.5;
            let td = dd.sqrt();
            let sd = td - l1 - l2 * psx + softness;
            if sd > 0.0 && td > 0.0 {
                let p = (sd / (softness * 2.0)).min(1.0) - 1.0;
                let p = (sd - softness * (1.0 - p * p)) / td;
                tx -= p * tx;
                ty -= p * ty;
                dd = tx * tx + ty * ty;
            }
        }

        let (a1, a2);
        if u {
            l2 *= psx;
            let mut cos = if l2 > 1.0e-4 {
                (dd - l1 * l1 - l2 * l2) / (2.0 * l1 * l2)
            } else {
                1.0
            };
            let angle;
            if cos < -1.0 {
                cos = -1.0;
                angle = PI * bend;
            } else if cos > 1.0 {
                cos = 1.0;
                angle = 0.0;
                if stretch {
                    let s = (dd.sqrt() / (l1 + l2) - 1.0) * alpha + 1.0;
                    sx *= s;
                    if uniform {
                        sy *= s;
                    }
                }
            } else {
                angle = cos.acos() * bend;
            }
            let a = l1 + l2 * cos;
            let b = l2 * angle.sin();
            a1 = (ty * a - tx * b).atan2(tx * a + ty * b);
            a2 = angle;
        } else {
            (a1, a2) = solve_non_uniform(l1, l2, psx, psy, tx, ty, dd, bend);
        }

        if !a1.is_finite() || !a2.is_finite() {
            self.update_bone_world(child_index);
            return;
        }

        let os = cy.atan2(cx) * s2;
        let parent = &self.bones[parent_index];
        let rotation = parent.arotation;
        let a1 = wrap_degrees((a1 - os).to_degrees() + os1 - rotation);
        self.update_bone_world_with(
            parent_index,
            px,
            py,
            rotation + a1 * alpha,
            sx,
            sy,
            0.0,
            0.0,
        );

        let child = &self.bones[child_index];
        let rotation = child.arotation;
        let a2 = wrap_degrees(((a2 + os).to_degrees() - child.ashear_x) * s2 + os2 - rotation);
        let (child_sx, child_sy, child_shx, child_shy) =
            (child.ascale_x, child.ascale_y, child.ashear_x, child.ashear_y);
        self.update_bone_world_with(
            child_index,
            cx,
            cy,
            rotation + a2 * alpha,
            child_sx,
            child_sy,
            child_shx,
            child_shy,
        );
    }

    /// Tip-first cyclic approximation for chains of three or more bones. Each pass swings every
    /// bone, tip to root, so the chain end points at the target; the full-strength solution is
    /// then blended in by `alpha`.
    fn ik_apply_chain(&mut self, chain: &[usize], target_x: f32, target_y: f32, alpha: f32) {
        for &bone in chain {
            self.ensure_applied(bone);
        }
        let initial = chain
            .iter()
            .map(|&i| self.bones[i].arotation)
            .collect::<Vec<_>>();
        let Some(&tip) = chain.last() else {
            return;
        };
        let tip_length = self
            .data
            .bones
            .get(self.bones[tip].data_index())
            .map_or(0.0, |d| d.length);

        for _ in 0..IK_CHAIN_ITERATIONS {
            for (k, &bone_index) in chain.iter().enumerate().rev() {
                let [ex, ey] = self.bones[tip].local_to_world(tip_length, 0.0);
                let bone = &self.bones[bone_index];
                let (bx, by) = (bone.world_x, bone.world_y);
                let (to_end_x, to_end_y) = (ex - bx, ey - by);
                let (to_target_x, to_target_y) = (target_x - bx, target_y - by);
                if to_end_x.hypot(to_end_y) <= 1.0e-4 || to_target_x.hypot(to_target_y) <= 1.0e-4
                {
                    continue;
                }
                let delta = wrap_degrees(
                    (to_target_y.atan2(to_target_x) - to_end_y.atan2(to_end_x)).to_degrees(),
                );
                let p = self.parent_transform(bone.parent_index());
                let reflected = p.a * p.d - p.b * p.c < 0.0;
                let bone = &mut self.bones[bone_index];
                bone.arotation += if reflected { -delta } else { delta };
                for &i in &chain[k..] {
                    self.update_bone_world(i);
                }
            }
            let [ex, ey] = self.bones[tip].local_to_world(tip_length, 0.0);
            if (ex - target_x).hypot(ey - target_y) < CHAIN_TOLERANCE {
                break;
            }
        }

        for (&bone_index, &start) in chain.iter().zip(&initial) {
            let bone = &mut self.bones[bone_index];
            bone.arotation = start + wrap_degrees(bone.arotation - start) * alpha;
            self.update_bone_world(bone_index);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn solve_non_uniform(
    l1: f32,
    l2: f32,
    psx: f32,
    psy: f32,
    tx: f32,
    ty: f32,
    dd: f32,
    bend: f32,
) -> (f32, f32) {
    let a = psx * l2;
    let b = psy * l2;
    let aa = a * a;
    let bb = b * b;
    let ta = ty.atan2(tx);
    let c = bb * l1 * l1 + aa * dd - aa * bb;
    let c1 = -2.0 * bb * l1;
    let c2 = bb - aa;
    let d = c1 * c1 - 4.0 * c2 * c;
    if d >= 0.0 {
        let mut q = d.sqrt();
        if c1 < 0.0 {
            q = -q;
        }
        q = -(c1 + q) * 0.5;
        let r0 = q / c2;
        let r1 = c / q;
        let r = if r0.abs() < r1.abs() { r0 } else { r1 };
        if r * r <= dd {
            let y = (dd - r * r).sqrt() * bend;
            return (ta - y.atan2(r), (y / psy).atan2((r - l1) / psx));
        }
    }

    let mut min_angle = PI;
    let mut min_x = l1 - a;
    let mut min_dist = min_x * min_x;
    let mut min_y = 0.0;
    let mut max_angle = 0.0;
    let mut max_x = l1 + a;
    let mut max_dist = max_x * max_x;
    let mut max_y = 0.0;
    let c = -a * l1 / (aa - bb);
    if (-1.0..=1.0).contains(&c) {
        let c = c.acos();
        let x = a * c.cos() + l1;
        let y = b * c.sin();
        let d = x * x + y * y;
        if d < min_dist {
            min_angle = c;
            min_dist = d;
            min_x = x;
            min_y = y;
        }
        if d > max_dist {
            max_angle = c;
            max_dist = d;
            max_x = x;
            max_y = y;
        }
    }
    if dd <= (min_dist + max_dist) * 0.5 {
        (ta - (min_y * bend).atan2(min_x), min_angle * bend)
    } else {
        (ta - (max_y * bend).atan2(max_x), max_angle * bend)
    }
}
