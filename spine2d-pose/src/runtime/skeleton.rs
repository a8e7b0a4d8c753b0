use crate::{AttachmentData, Error, SkeletonData, TransformMode, VertexData, DEFAULT_SKIN_NAME};
use log::{debug, warn};
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct Bone {
    data_index: usize,
    parent: Option<usize>,

    pub transform_mode: TransformMode,
    pub active: bool,

    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub shear_x: f32,
    pub shear_y: f32,

    pub ax: f32,
    pub ay: f32,
    pub arotation: f32,
    pub ascale_x: f32,
    pub ascale_y: f32,
    pub ashear_x: f32,
    pub ashear_y: f32,

    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub world_x: f32,
    pub world_y: f32,

    applied_valid: bool,
    sorted: bool,
}

impl Bone {
    fn new(data_index: usize, data: &crate::BoneData) -> Self {
        let mut bone = Self {
            data_index,
            parent: data.parent,
            transform_mode: data.transform_mode,
            active: !data.skin_required,
            x: 0.0,
            y: 0.0,
            rotation: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            shear_x: 0.0,
            shear_y: 0.0,
            ax: 0.0,
            ay: 0.0,
            arotation: 0.0,
            ascale_x: 1.0,
            ascale_y: 1.0,
            ashear_x: 0.0,
            ashear_y: 0.0,
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            world_x: 0.0,
            world_y: 0.0,
            applied_valid: false,
            sorted: false,
        };
        bone.set_to_setup_pose(data);
        bone
    }

    pub fn data_index(&self) -> usize {
        self.data_index
    }

    pub fn parent_index(&self) -> Option<usize> {
        self.parent
    }

    /// Whether the applied pose matches the world matrix.
    pub fn applied_valid(&self) -> bool {
        self.applied_valid
    }

    pub fn set_to_setup_pose(&mut self, data: &crate::BoneData) {
        self.transform_mode = data.transform_mode;
        self.x = data.x;
        self.y = data.y;
        self.rotation = data.rotation;
        self.scale_x = data.scale_x;
        self.scale_y = data.scale_y;
        self.shear_x = data.shear_x;
        self.shear_y = data.shear_y;
        self.copy_local_to_applied();
    }

    fn copy_local_to_applied(&mut self) {
        self.ax = self.x;
        self.ay = self.y;
        self.arotation = self.rotation;
        self.ascale_x = self.scale_x;
        self.ascale_y = self.scale_y;
        self.ashear_x = self.shear_x;
        self.ashear_y = self.shear_y;
    }

    pub fn world_rotation_x(&self) -> f32 {
        self.c.atan2(self.a).to_degrees()
    }

    pub fn world_rotation_y(&self) -> f32 {
        self.d.atan2(self.b).to_degrees()
    }

    pub fn world_scale_x(&self) -> f32 {
        (self.a * self.a + self.c * self.c).sqrt()
    }

    pub fn world_scale_y(&self) -> f32 {
        (self.b * self.b + self.d * self.d).sqrt()
    }

    /// Converts a world position into this bone's local space. A degenerate matrix maps every
    /// point to the origin.
    pub fn world_to_local(&self, world_x: f32, world_y: f32) -> [f32; 2] {
        let det = self.a * self.d - self.b * self.c;
        if det.abs() <= f32::EPSILON {
            return [0.0, 0.0];
        }
        let x = world_x - self.world_x;
        let y = world_y - self.world_y;
        [(x * self.d - y * self.b) / det, (y * self.a - x * self.c) / det]
    }

    pub fn local_to_world(&self, local_x: f32, local_y: f32) -> [f32; 2] {
        [
            self.a * local_x + self.b * local_y + self.world_x,
            self.c * local_x + self.d * local_y + self.world_y,
        ]
    }

    pub fn world_to_local_rotation(&self, world_rotation: f32) -> f32 {
        let (sin, cos) = world_rotation.to_radians().sin_cos();
        (self.a * sin - self.c * cos)
            .atan2(self.d * cos - self.b * sin)
            .to_degrees()
            + self.rotation
            - self.shear_x
    }

    pub fn local_to_world_rotation(&self, local_rotation: f32) -> f32 {
        let local_rotation = local_rotation - (self.rotation - self.shear_x);
        let (sin, cos) = local_rotation.to_radians().sin_cos();
        (cos * self.c + sin * self.d)
            .atan2(cos * self.a + sin * self.b)
            .to_degrees()
    }

    /// Rotates the world matrix. The applied pose is stale until
    /// [`Skeleton::update_applied_transform`] runs.
    pub fn rotate_world(&mut self, degrees: f32) {
        let (sin, cos) = degrees.to_radians().sin_cos();
        let (a, b, c, d) = (self.a, self.b, self.c, self.d);
        self.a = cos * a - sin * c;
        self.b = cos * b - sin * d;
        self.c = sin * a + cos * c;
        self.d = sin * b + cos * d;
        self.applied_valid = false;
    }

    #[cfg(feature = "glam")]
    pub fn world_affine(&self) -> glam::Affine2 {
        glam::Affine2::from_cols_array(&[
            self.a,
            self.c,
            self.b,
            self.d,
            self.world_x,
            self.world_y,
        ])
    }
}

#[derive(Clone, Debug)]
pub struct IkConstraint {
    data_index: usize,
    pub bones: Vec<usize>,
    pub target: usize,
    pub mix: f32,
    pub softness: f32,
    pub bend_direction: i32,
    pub compress: bool,
    pub stretch: bool,
    pub active: bool,
}

impl IkConstraint {
    pub fn data_index(&self) -> usize {
        self.data_index
    }
}

#[derive(Clone, Debug)]
pub struct TransformConstraint {
    data_index: usize,
    pub bones: Vec<usize>,
    pub target: usize,
    pub mix_rotate: f32,
    pub mix_x: f32,
    pub mix_y: f32,
    pub mix_scale_x: f32,
    pub mix_scale_y: f32,
    pub mix_shear_y: f32,
    pub active: bool,
}

impl TransformConstraint {
    pub fn data_index(&self) -> usize {
        self.data_index
    }
}

#[derive(Clone, Debug)]
pub struct PathConstraint {
    data_index: usize,
    pub bones: Vec<usize>,
    pub target: usize, // slot index
    pub position: f32,
    pub spacing: f32,
    pub mix_rotate: f32,
    pub mix_x: f32,
    pub mix_y: f32,
    pub active: bool,
}

impl PathConstraint {
    pub fn data_index(&self) -> usize {
        self.data_index
    }
}

#[derive(Clone, Debug)]
pub struct Slot {
    data_index: usize,
    pub bone: usize,
    pub attachment: Option<String>,
    pub(crate) attachment_skin: Option<String>,
    pub(crate) attachment_state: u32,
    /// Unweighted attachments store absolute vertex positions, weighted ones store offsets per
    /// bone influence. Empty when no deform is applied.
    pub deform: Vec<f32>,
    pub color: [f32; 4],
    pub dark_color: Option<[f32; 3]>,
    pub blend: crate::BlendMode,
}

impl Slot {
    pub fn data_index(&self) -> usize {
        self.data_index
    }
}

impl crate::PointAttachmentData {
    pub fn compute_world_position(&self, bone: &Bone) -> [f32; 2] {
        bone.local_to_world(self.x, self.y)
    }

    pub fn compute_world_rotation(&self, bone: &Bone) -> f32 {
        bone.local_to_world_rotation(self.rotation)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum UpdateCacheItem {
    Bone(usize),
    Ik(usize),
    Transform(usize),
    Path(usize),
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Bounds {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl Bounds {
    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }

    fn include(bounds: &mut Option<Bounds>, [x, y]: [f32; 2]) {
        match bounds {
            None => {
                *bounds = Some(Bounds {
                    min_x: x,
                    min_y: y,
                    max_x: x,
                    max_y: y,
                })
            }
            Some(b) => {
                b.min_x = b.min_x.min(x);
                b.min_y = b.min_y.min(y);
                b.max_x = b.max_x.max(x);
                b.max_y = b.max_y.max(y);
            }
        }
    }
}

/// World frame a bone composes its local pose with. Root bones use the skeleton placement.
#[derive(Copy, Clone, Debug)]
pub(crate) struct ParentTransform {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub world_x: f32,
    pub world_y: f32,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum ConstraintKind {
    Ik,
    Transform,
    Path,
}

#[derive(Clone, Debug)]
pub struct Skeleton {
    pub data: Arc<SkeletonData>,
    pub bones: Vec<Bone>,
    bone_children: Vec<Vec<usize>>,
    pub slots: Vec<Slot>,
    pub draw_order: Vec<usize>,
    pub skin: Option<String>,
    pub ik_constraints: Vec<IkConstraint>,
    pub transform_constraints: Vec<TransformConstraint>,
    pub path_constraints: Vec<PathConstraint>,
    pub x: f32,
    pub y: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    update_cache: Vec<UpdateCacheItem>,
}

impl Skeleton {
    /// Validates `data` and builds a skeleton in its setup pose. World transforms are computed by
    /// the first [`Skeleton::update_world_transform`].
    pub fn new(data: Arc<SkeletonData>) -> Result<Self, Error> {
        data.validate()?;

        let bones = data
            .bones
            .iter()
            .enumerate()
            .map(|(index, bone)| Bone::new(index, bone))
            .collect::<Vec<_>>();

        let mut bone_children = vec![Vec::new(); bones.len()];
        for (index, bone) in bones.iter().enumerate() {
            if let Some(parent) = bone.parent {
                bone_children[parent].push(index);
            }
        }

        let slots = data
            .slots
            .iter()
            .enumerate()
            .map(|(data_index, slot)| Slot {
                data_index,
                bone: slot.bone,
                attachment: None,
                attachment_skin: None,
                attachment_state: 0,
                deform: Vec::new(),
                color: slot.color,
                dark_color: slot.dark_color,
                blend: slot.blend,
            })
            .collect::<Vec<_>>();

        let ik_constraints = data
            .ik_constraints
            .iter()
            .enumerate()
            .map(|(data_index, c)| IkConstraint {
                data_index,
                bones: c.bones.clone(),
                target: c.target,
                mix: c.mix,
                softness: c.softness,
                bend_direction: c.bend_direction,
                compress: c.compress,
                stretch: c.stretch,
                active: false,
            })
            .collect();

        let transform_constraints = data
            .transform_constraints
            .iter()
            .enumerate()
            .map(|(data_index, c)| TransformConstraint {
                data_index,
                bones: c.bones.clone(),
                target: c.target,
                mix_rotate: c.mix_rotate,
                mix_x: c.mix_x,
                mix_y: c.mix_y,
                mix_scale_x: c.mix_scale_x,
                mix_scale_y: c.mix_scale_y,
                mix_shear_y: c.mix_shear_y,
                active: false,
            })
            .collect();

        let path_constraints = data
            .path_constraints
            .iter()
            .enumerate()
            .map(|(data_index, c)| PathConstraint {
                data_index,
                bones: c.bones.clone(),
                target: c.target,
                position: c.position,
                spacing: c.spacing,
                mix_rotate: c.mix_rotate,
                mix_x: c.mix_x,
                mix_y: c.mix_y,
                active: false,
            })
            .collect();

        let mut skeleton = Self {
            draw_order: (0..slots.len()).collect(),
            data,
            bones,
            bone_children,
            slots,
            skin: None,
            ik_constraints,
            transform_constraints,
            path_constraints,
            x: 0.0,
            y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            update_cache: Vec::new(),
        };
        skeleton.set_slots_to_setup_pose();
        skeleton.update_cache();
        Ok(skeleton)
    }

    pub fn find_bone(&self, name: &str) -> Option<usize> {
        self.data.find_bone(name)
    }

    pub fn find_slot(&self, name: &str) -> Option<usize> {
        self.data.find_slot(name)
    }

    pub fn bone(&self, name: &str) -> Option<&Bone> {
        self.bones.get(self.find_bone(name)?)
    }

    pub fn children(&self, bone_index: usize) -> &[usize] {
        self.bone_children
            .get(bone_index)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Bones and constraints in evaluation order.
    pub fn update_cache_items(&self) -> &[UpdateCacheItem] {
        &self.update_cache
    }

    /// Rebuilds the evaluation order. Call after changing the skin or constraint membership.
    pub fn update_cache(&mut self) {
        self.update_cache.clear();

        let data = Arc::clone(&self.data);
        for (bone, bone_data) in self.bones.iter_mut().zip(&data.bones) {
            bone.sorted = bone_data.skin_required;
            bone.active = !bone.sorted;
        }

        let skin = self.skin.as_deref().and_then(|name| data.skin(name));
        if let Some(skin) = skin {
            for &bone_index in &skin.bones {
                let mut current = Some(bone_index);
                while let Some(index) = current {
                    let Some(bone) = self.bones.get_mut(index) else {
                        break;
                    };
                    bone.sorted = false;
                    bone.active = true;
                    current = bone.parent;
                }
            }
        }

        // Stable sort: IK, then transform, then path for equal order.
        let mut constraints = Vec::new();
        constraints.extend(
            data.ik_constraints
                .iter()
                .enumerate()
                .map(|(i, c)| (c.order, ConstraintKind::Ik, i)),
        );
        constraints.extend(
            data.transform_constraints
                .iter()
                .enumerate()
                .map(|(i, c)| (c.order, ConstraintKind::Transform, i)),
        );
        constraints.extend(
            data.path_constraints
                .iter()
                .enumerate()
                .map(|(i, c)| (c.order, ConstraintKind::Path, i)),
        );
        constraints.sort_by_key(|&(order, _, _)| order);

        for (_, kind, index) in constraints {
            match kind {
                ConstraintKind::Ik => self.sort_ik_constraint(&data, index),
                ConstraintKind::Transform => self.sort_transform_constraint(&data, index),
                ConstraintKind::Path => self.sort_path_constraint(&data, index),
            }
        }

        for index in 0..self.bones.len() {
            self.sort_bone(index);
        }

        debug!(
            "rebuilt update cache: {} items, {} active bones",
            self.update_cache.len(),
            self.bones.iter().filter(|b| b.active).count()
        );
    }

    fn constraint_in_skin(&self, data: &SkeletonData, kind: ConstraintKind, index: usize) -> bool {
        let Some(skin) = self.skin.as_deref().and_then(|name| data.skin(name)) else {
            return false;
        };
        match kind {
            ConstraintKind::Ik => skin.ik_constraints.contains(&index),
            ConstraintKind::Transform => skin.transform_constraints.contains(&index),
            ConstraintKind::Path => skin.path_constraints.contains(&index),
        }
    }

    fn sort_ik_constraint(&mut self, data: &SkeletonData, index: usize) {
        let constraint_data = &data.ik_constraints[index];
        let target_active = self.bones[constraint_data.target].active;
        let active = target_active
            && (!constraint_data.skin_required
                || self.constraint_in_skin(data, ConstraintKind::Ik, index));
        self.ik_constraints[index].active = active;
        if !active {
            return;
        }

        self.sort_bone(constraint_data.target);
        let chain = &constraint_data.bones;
        for &bone in chain {
            self.sort_bone(bone);
        }
        self.update_cache.push(UpdateCacheItem::Ik(index));
        if let Some(&parent) = chain.first() {
            self.sort_reset(parent);
        }
        // The solver writes world transforms for every bone in the chain.
        for &bone in chain {
            self.bones[bone].sorted = true;
        }
    }

    fn sort_transform_constraint(&mut self, data: &SkeletonData, index: usize) {
        let constraint_data = &data.transform_constraints[index];
        let target_active = self.bones[constraint_data.target].active;
        let active = target_active
            && (!constraint_data.skin_required
                || self.constraint_in_skin(data, ConstraintKind::Transform, index));
        self.transform_constraints[index].active = active;
        if !active {
            return;
        }

        self.sort_bone(constraint_data.target);
        for &bone in &constraint_data.bones {
            if constraint_data.local {
                if let Some(parent) = self.bones[bone].parent {
                    self.sort_bone(parent);
                }
            }
            self.sort_bone(bone);
        }
        self.update_cache.push(UpdateCacheItem::Transform(index));
        for &bone in &constraint_data.bones {
            self.sort_reset(bone);
        }
        for &bone in &constraint_data.bones {
            self.bones[bone].sorted = true;
        }
    }

    fn sort_path_constraint(&mut self, data: &SkeletonData, index: usize) {
        let constraint_data = &data.path_constraints[index];
        let slot_index = constraint_data.target;
        let slot_bone = self.slots[slot_index].bone;
        let active = self.bones[slot_bone].active
            && (!constraint_data.skin_required
                || self.constraint_in_skin(data, ConstraintKind::Path, index));
        self.path_constraints[index].active = active;
        if !active {
            return;
        }

        let skin = self.skin.as_deref().and_then(|name| data.skin(name));
        let default_skin = data
            .default_skin()
            .filter(|d| skin.is_none_or(|s| s.name != d.name));
        for skin in skin.into_iter().chain(default_skin) {
            let Some(attachments) = skin.attachments.get(slot_index) else {
                continue;
            };
            for attachment in attachments.values() {
                self.sort_path_attachment(attachment, slot_bone);
            }
        }
        if let Some(attachment) = self.slot_attachment(slot_index).cloned() {
            self.sort_path_attachment(&attachment, slot_bone);
        }

        for &bone in &constraint_data.bones {
            self.sort_bone(bone);
        }
        self.update_cache.push(UpdateCacheItem::Path(index));
        for &bone in &constraint_data.bones {
            self.sort_reset(bone);
        }
        for &bone in &constraint_data.bones {
            self.bones[bone].sorted = true;
        }
    }

    fn sort_path_attachment(&mut self, attachment: &AttachmentData, slot_bone: usize) {
        let AttachmentData::Path(path) = attachment else {
            return;
        };
        match &path.vertices {
            VertexData::Unweighted(_) => self.sort_bone(slot_bone),
            VertexData::Weighted(vertices) => {
                for weight in vertices.iter().flatten() {
                    self.sort_bone(weight.bone);
                }
            }
        }
    }

    fn sort_bone(&mut self, index: usize) {
        let Some(bone) = self.bones.get(index) else {
            return;
        };
        if bone.sorted {
            return;
        }
        if let Some(parent) = bone.parent {
            self.sort_bone(parent);
        }
        self.bones[index].sorted = true;
        self.update_cache.push(UpdateCacheItem::Bone(index));
    }

    /// Marks the descendants of `index` unsorted so they are appended after the constraint.
    fn sort_reset(&mut self, index: usize) {
        for k in 0..self.bone_children[index].len() {
            let child = self.bone_children[index][k];
            if !self.bones[child].active {
                continue;
            }
            if self.bones[child].sorted {
                self.sort_reset(child);
            }
            self.bones[child].sorted = false;
        }
    }

    /// Copies every bone's local pose to its applied pose, then evaluates the update cache.
    pub fn update_world_transform(&mut self) {
        for bone in &mut self.bones {
            bone.copy_local_to_applied();
        }

        for k in 0..self.update_cache.len() {
            match self.update_cache[k] {
                UpdateCacheItem::Bone(index) => self.update_bone_world(index),
                UpdateCacheItem::Ik(index) => self.update_ik_constraint(index),
                UpdateCacheItem::Transform(index) => self.update_transform_constraint(index),
                UpdateCacheItem::Path(index) => self.update_path_constraint(index),
            }
        }
    }

    pub(crate) fn parent_transform(&self, parent: Option<usize>) -> ParentTransform {
        match parent.and_then(|p| self.bones.get(p)) {
            Some(p) => ParentTransform {
                a: p.a,
                b: p.b,
                c: p.c,
                d: p.d,
                world_x: p.world_x,
                world_y: p.world_y,
            },
            None => ParentTransform {
                a: self.scale_x,
                b: 0.0,
                c: 0.0,
                d: self.scale_y,
                world_x: self.x,
                world_y: self.y,
            },
        }
    }

    /// Recomputes a bone's world matrix from its applied pose.
    pub fn update_bone_world(&mut self, index: usize) {
        let Some(parent) = self.bones.get(index).map(|b| b.parent) else {
            return;
        };
        let frame = self.parent_transform(parent);
        let (scale_x, scale_y) = (self.scale_x, self.scale_y);
        let bone = &mut self.bones[index];
        let mode = if parent.is_some() {
            bone.transform_mode
        } else {
            TransformMode::Normal
        };
        compose_world(bone, &frame, mode, scale_x, scale_y);
        bone.applied_valid = true;
    }

    /// Sets the applied pose of a bone and recomputes its world matrix.
    #[allow(clippy::too_many_arguments)]
    pub fn update_bone_world_with(
        &mut self,
        index: usize,
        x: f32,
        y: f32,
        rotation: f32,
        scale_x: f32,
        scale_y: f32,
        shear_x: f32,
        shear_y: f32,
    ) {
        let Some(bone) = self.bones.get_mut(index) else {
            return;
        };
        bone.ax = x;
        bone.ay = y;
        bone.arotation = rotation;
        bone.ascale_x = scale_x;
        bone.ascale_y = scale_y;
        bone.ashear_x = shear_x;
        bone.ashear_y = shear_y;
        self.update_bone_world(index);
    }

    /// Recovers the applied pose from the world matrix, after world-space constraints moved it.
    /// Leaves the applied pose untouched when the parent frame is degenerate.
    pub fn update_applied_transform(&mut self, index: usize) {
        let Some(bone) = self.bones.get(index) else {
            return;
        };
        let parent = bone.parent;
        let frame = self.parent_transform(parent);
        let mode = if parent.is_some() {
            bone.transform_mode
        } else {
            TransformMode::Normal
        };

        let Some(inverse) = invert([frame.a, frame.b, frame.c, frame.d]) else {
            return;
        };
        let dx = bone.world_x - frame.world_x;
        let dy = bone.world_y - frame.world_y;
        let ax = inverse[0] * dx + inverse[1] * dy;
        let ay = inverse[2] * dx + inverse[3] * dy;

        let (sx, sy) = (self.scale_x, self.scale_y);
        let (inv_sx, inv_sy) = (reciprocal(sx), reciprocal(sy));
        let (basis, base_rotation) = match mode {
            TransformMode::Normal => ([frame.a, frame.b, frame.c, frame.d], 0.0),
            TransformMode::OnlyTranslation => ([sx, 0.0, 0.0, sy], 0.0),
            TransformMode::NoRotationOrReflection => {
                let [pa, pb, pc, pd, prx] =
                    no_rotation_basis(frame.a, frame.b, frame.c, frame.d, inv_sx, inv_sy);
                let (sin, cos) = (-prx).to_radians().sin_cos();
                let (qa, qb, qc, qd) = (pa * sx, -pb * sx, pc * sy, pd * sy);
                (
                    [
                        qa * cos + qb * sin,
                        -qa * sin + qb * cos,
                        qc * cos + qd * sin,
                        -qc * sin + qd * cos,
                    ],
                    0.0,
                )
            }
            TransformMode::NoScale | TransformMode::NoScaleOrReflection => {
                // Find the rotation whose no-scale frame points the x axis along the world x axis.
                let parent_unscaled = [
                    frame.a * inv_sx,
                    frame.b * inv_sx,
                    frame.c * inv_sy,
                    frame.d * inv_sy,
                ];
                let Some(pi) = invert(parent_unscaled) else {
                    return;
                };
                let (wx, wy) = (bone.a * inv_sx, bone.c * inv_sy);
                let rotation = (pi[2] * wx + pi[3] * wy)
                    .atan2(pi[0] * wx + pi[1] * wy)
                    .to_degrees();
                let [za, zb, zc, zd] = no_scale_basis(
                    frame.a,
                    frame.b,
                    frame.c,
                    frame.d,
                    rotation,
                    sx,
                    sy,
                    mode == TransformMode::NoScale,
                );
                ([za * sx, zb * sx, zc * sy, zd * sy], rotation)
            }
        };

        let Some(bi) = invert(basis) else {
            return;
        };
        let bone = &mut self.bones[index];
        let ra = bi[0] * bone.a + bi[1] * bone.c;
        let rb = bi[0] * bone.b + bi[1] * bone.d;
        let rc = bi[2] * bone.a + bi[3] * bone.c;
        let rd = bi[2] * bone.b + bi[3] * bone.d;

        bone.ax = ax;
        bone.ay = ay;
        bone.ashear_x = 0.0;
        bone.ascale_x = (ra * ra + rc * rc).sqrt();
        if bone.ascale_x > 1.0e-4 {
            let det = ra * rd - rb * rc;
            let local_rotation = rc.atan2(ra).to_degrees();
            let scale_y = (rb * rb + rd * rd).sqrt();
            bone.ascale_y = if det < 0.0 { -scale_y } else { scale_y };
            let y_axis = if bone.ascale_y.abs() > 1.0e-6 {
                (rd / bone.ascale_y).atan2(rb / bone.ascale_y).to_degrees()
            } else {
                local_rotation + 90.0
            };
            bone.ashear_y = wrap_degrees(y_axis - 90.0 - local_rotation);
            bone.arotation = base_rotation + local_rotation;
        } else {
            bone.ascale_x = 0.0;
            bone.ascale_y = (rb * rb + rd * rd).sqrt();
            bone.ashear_y = 0.0;
            bone.arotation = base_rotation + 90.0 - rd.atan2(rb).to_degrees();
        }
        bone.applied_valid = true;
    }

    pub(crate) fn ensure_applied(&mut self, index: usize) {
        if self.bones.get(index).is_some_and(|b| !b.applied_valid) {
            self.update_applied_transform(index);
        }
    }

    pub fn set_to_setup_pose(&mut self) {
        self.set_bones_to_setup_pose();
        self.set_slots_to_setup_pose();
    }

    /// Resets bones and constraints to setup values.
    pub fn set_bones_to_setup_pose(&mut self) {
        let data = Arc::clone(&self.data);
        for (bone, bone_data) in self.bones.iter_mut().zip(&data.bones) {
            bone.set_to_setup_pose(bone_data);
        }

        for (c, c_data) in self.ik_constraints.iter_mut().zip(&data.ik_constraints) {
            c.mix = c_data.mix;
            c.softness = c_data.softness;
            c.bend_direction = c_data.bend_direction;
            c.compress = c_data.compress;
            c.stretch = c_data.stretch;
        }

        for (c, c_data) in self
            .transform_constraints
            .iter_mut()
            .zip(&data.transform_constraints)
        {
            c.mix_rotate = c_data.mix_rotate;
            c.mix_x = c_data.mix_x;
            c.mix_y = c_data.mix_y;
            c.mix_scale_x = c_data.mix_scale_x;
            c.mix_scale_y = c_data.mix_scale_y;
            c.mix_shear_y = c_data.mix_shear_y;
        }

        for (c, c_data) in self.path_constraints.iter_mut().zip(&data.path_constraints) {
            c.position = c_data.position;
            c.spacing = c_data.spacing;
            c.mix_rotate = c_data.mix_rotate;
            c.mix_x = c_data.mix_x;
            c.mix_y = c_data.mix_y;
        }
    }

    /// Resets slot colors, attachments and the draw order to setup values.
    pub fn set_slots_to_setup_pose(&mut self) {
        self.draw_order = (0..self.slots.len()).collect();
        for index in 0..self.slots.len() {
            self.set_slot_to_setup_pose(index);
        }
    }

    pub(crate) fn set_slot_to_setup_pose(&mut self, index: usize) {
        let data = Arc::clone(&self.data);
        let (Some(slot), Some(slot_data)) = (self.slots.get_mut(index), data.slots.get(index))
        else {
            return;
        };
        slot.color = slot_data.color;
        slot.dark_color = slot_data.dark_color;
        slot.blend = slot_data.blend;
        slot.attachment = None;
        slot.attachment_skin = None;
        slot.deform.clear();
        self.set_slot_attachment(index, slot_data.attachment.as_deref());
    }

    /// Switches the skin. Attachments the old skin provided are replaced by same-named ones from
    /// the new skin; with no previous skin, setup attachments found in the new skin are attached.
    pub fn set_skin(&mut self, skin_name: Option<&str>) -> Result<(), Error> {
        if self.skin.as_deref() == skin_name {
            return Ok(());
        }
        let data = Arc::clone(&self.data);
        let new_skin = match skin_name {
            None => None,
            Some(name) => Some(data.skin(name).ok_or_else(|| Error::UnknownSkin {
                name: name.to_string(),
            })?),
        };

        if let Some(new_skin) = new_skin {
            let old_skin = self.skin.clone();
            for slot_index in 0..self.slots.len() {
                let key = match &old_skin {
                    Some(old) => {
                        let slot = &self.slots[slot_index];
                        if slot.attachment_skin.as_deref() != Some(old.as_str()) {
                            continue;
                        }
                        slot.attachment.clone()
                    }
                    None => data.slots[slot_index].attachment.clone(),
                };
                let Some(key) = key else {
                    continue;
                };
                if new_skin.attachment(slot_index, &key).is_some() {
                    self.assign_attachment(slot_index, Some((key, new_skin.name.clone())));
                }
            }
        }

        debug!("skin changed from {:?} to {:?}", self.skin, skin_name);
        self.skin = skin_name.map(str::to_string);
        self.update_cache();
        Ok(())
    }

    /// Looks up an attachment in the current skin, then the default skin.
    pub fn attachment(&self, slot_index: usize, name: &str) -> Option<&AttachmentData> {
        self.resolve_attachment(slot_index, name)
            .map(|(_, attachment)| attachment)
    }

    fn resolve_attachment(&self, slot_index: usize, name: &str) -> Option<(&str, &AttachmentData)> {
        if let Some(skin) = self.skin.as_deref().and_then(|n| self.data.skin(n)) {
            if let Some(attachment) = skin.attachment(slot_index, name) {
                return Some((&skin.name, attachment));
            }
        }
        let default_skin = self.data.default_skin()?;
        default_skin
            .attachment(slot_index, name)
            .map(|attachment| (DEFAULT_SKIN_NAME, attachment))
    }

    /// The attachment currently shown by a slot.
    pub fn slot_attachment(&self, slot_index: usize) -> Option<&AttachmentData> {
        let slot = self.slots.get(slot_index)?;
        let key = slot.attachment.as_deref()?;
        if let Some(skin) = slot.attachment_skin.as_deref().and_then(|s| self.data.skin(s)) {
            if let Some(attachment) = skin.attachment(slot_index, key) {
                return Some(attachment);
            }
        }
        self.attachment(slot_index, key)
    }

    /// Shows the named attachment on a slot, or clears it with `None`.
    pub fn set_attachment(&mut self, slot_name: &str, attachment: Option<&str>) -> Result<(), Error> {
        let slot_index = self.find_slot(slot_name).ok_or_else(|| Error::UnknownSlotName {
            name: slot_name.to_string(),
        })?;
        if let Some(name) = attachment {
            if self.attachment(slot_index, name).is_none() {
                return Err(Error::UnknownAttachment {
                    slot: slot_name.to_string(),
                    name: name.to_string(),
                });
            }
        }
        self.set_slot_attachment(slot_index, attachment);
        Ok(())
    }

    /// Resolves `name` through the skins and shows it. Names missing from every skin clear the
    /// slot.
    pub(crate) fn set_slot_attachment(&mut self, slot_index: usize, name: Option<&str>) {
        let resolved = match name {
            None => None,
            Some(name) => match self.resolve_attachment(slot_index, name) {
                Some((skin, _)) => Some((name.to_string(), skin.to_string())),
                None => {
                    debug!("slot {slot_index} has no attachment named '{name}' in any skin");
                    None
                }
            },
        };
        self.assign_attachment(slot_index, resolved);
    }

    fn assign_attachment(&mut self, slot_index: usize, resolved: Option<(String, String)>) {
        let Some(slot) = self.slots.get(slot_index) else {
            return;
        };
        let current = slot.attachment.clone().zip(slot.attachment_skin.clone());
        if current == resolved {
            return;
        }

        let old_timeline = self
            .slot_attachment(slot_index)
            .and_then(|a| a.vertices().map(|_| a.timeline_attachment().to_string()));
        let new_timeline = resolved.as_ref().and_then(|(name, skin)| {
            let attachment = self.data.skin(skin)?.attachment(slot_index, name)?;
            attachment
                .vertices()
                .map(|_| attachment.timeline_attachment().to_string())
        });

        let slot = &mut self.slots[slot_index];
        if old_timeline.is_none() || old_timeline != new_timeline {
            slot.deform.clear();
        }
        match resolved {
            Some((name, skin)) => {
                slot.attachment = Some(name);
                slot.attachment_skin = Some(skin);
            }
            None => {
                slot.attachment = None;
                slot.attachment_skin = None;
            }
        }
    }

    /// World positions of the vertices of a slot's attachment: region corners, vertex attachment
    /// vertices with deform applied, or a point attachment's position.
    pub fn vertex_world_positions(&self, slot_index: usize) -> Option<Vec<[f32; 2]>> {
        let slot = self.slots.get(slot_index)?;
        let bone = self.bones.get(slot.bone)?;
        match self.slot_attachment(slot_index)? {
            AttachmentData::Region(region) => {
                let o = region.offsets();
                Some(
                    o.chunks_exact(2)
                        .map(|p| bone.local_to_world(p[0], p[1]))
                        .collect(),
                )
            }
            AttachmentData::Point(point) => Some(vec![point.compute_world_position(bone)]),
            other => other
                .vertices()
                .map(|vertices| self.compute_world_vertices(slot_index, vertices)),
        }
    }

    pub(crate) fn compute_world_vertices(
        &self,
        slot_index: usize,
        vertices: &VertexData,
    ) -> Vec<[f32; 2]> {
        let Some(slot) = self.slots.get(slot_index) else {
            return Vec::new();
        };
        let deform = slot.deform.as_slice();
        match vertices {
            VertexData::Unweighted(v) => {
                let Some(bone) = self.bones.get(slot.bone) else {
                    return Vec::new();
                };
                let use_deform = deform.len() == v.len() * 2;
                v.iter()
                    .enumerate()
                    .map(|(i, p)| {
                        let (x, y) = if use_deform {
                            (deform[i * 2], deform[i * 2 + 1])
                        } else {
                            (p[0], p[1])
                        };
                        bone.local_to_world(x, y)
                    })
                    .collect()
            }
            VertexData::Weighted(v) => {
                let mut f = 0usize;
                v.iter()
                    .map(|influences| {
                        let mut wx = 0.0f32;
                        let mut wy = 0.0f32;
                        for weight in influences {
                            let dx = deform.get(f).copied().unwrap_or(0.0);
                            let dy = deform.get(f + 1).copied().unwrap_or(0.0);
                            f += 2;
                            let Some(b) = self.bones.get(weight.bone) else {
                                continue;
                            };
                            let [x, y] = b.local_to_world(weight.x + dx, weight.y + dy);
                            wx += x * weight.weight;
                            wy += y * weight.weight;
                        }
                        [wx, wy]
                    })
                    .collect()
            }
        }
    }

    /// Axis-aligned bounds of visible region and mesh attachments.
    pub fn bounds(&self) -> Option<Bounds> {
        let mut bounds = None;
        for &slot_index in &self.draw_order {
            let Some(slot) = self.slots.get(slot_index) else {
                continue;
            };
            if !self.bones.get(slot.bone).is_some_and(|b| b.active) {
                continue;
            }
            if !matches!(
                self.slot_attachment(slot_index),
                Some(AttachmentData::Region(_) | AttachmentData::Mesh(_))
            ) {
                continue;
            }
            for p in self.vertex_world_positions(slot_index).into_iter().flatten() {
                Bounds::include(&mut bounds, p);
            }
        }
        bounds
    }

    /// First slot, in draw order, whose bounding box attachment contains the point.
    pub fn bounding_box_at(&self, x: f32, y: f32) -> Option<usize> {
        self.draw_order.iter().copied().find(|&slot_index| {
            let Some(slot) = self.slots.get(slot_index) else {
                return false;
            };
            if !self.bones.get(slot.bone).is_some_and(|b| b.active) {
                return false;
            }
            let Some(AttachmentData::BoundingBox(bbox)) = self.slot_attachment(slot_index) else {
                return false;
            };
            polygon_contains(&self.compute_world_vertices(slot_index, &bbox.vertices), x, y)
        })
    }
}

fn polygon_contains(polygon: &[[f32; 2]], x: f32, y: f32) -> bool {
    let mut inside = false;
    let mut prev = polygon.len().wrapping_sub(1);
    for (i, &[vx, vy]) in polygon.iter().enumerate() {
        let [px, py] = polygon[prev];
        if ((vy < y && py >= y) || (py < y && vy >= y))
            && vx + (y - vy) / (py - vy) * (px - vx) < x
        {
            inside = !inside;
        }
        prev = i;
    }
    inside
}

fn compose_world(
    bone: &mut Bone,
    parent: &ParentTransform,
    mode: TransformMode,
    skeleton_scale_x: f32,
    skeleton_scale_y: f32,
) {
    let pa = parent.a;
    let pb = parent.b;
    let pc = parent.c;
    let pd = parent.d;

    bone.world_x = pa * bone.ax + pb * bone.ay + parent.world_x;
    bone.world_y = pc * bone.ax + pd * bone.ay + parent.world_y;

    match mode {
        TransformMode::Normal => {
            let [la, lb, lc, ld] = local_matrix(
                bone.arotation + bone.ashear_x,
                bone.arotation + 90.0 + bone.ashear_y,
                bone.ascale_x,
                bone.ascale_y,
            );
            bone.a = pa * la + pb * lc;
            bone.b = pa * lb + pb * ld;
            bone.c = pc * la + pd * lc;
            bone.d = pc * lb + pd * ld;
            return;
        }
        TransformMode::OnlyTranslation => {
            let [la, lb, lc, ld] = local_matrix(
                bone.arotation + bone.ashear_x,
                bone.arotation + 90.0 + bone.ashear_y,
                bone.ascale_x,
                bone.ascale_y,
            );
            bone.a = la;
            bone.b = lb;
            bone.c = lc;
            bone.d = ld;
        }
        TransformMode::NoRotationOrReflection => {
            let [pa, pb, pc, pd, prx] = no_rotation_basis(
                pa,
                pb,
                pc,
                pd,
                reciprocal(skeleton_scale_x),
                reciprocal(skeleton_scale_y),
            );
            let [la, lb, lc, ld] = local_matrix(
                bone.arotation + bone.ashear_x - prx,
                bone.arotation + bone.ashear_y - prx + 90.0,
                bone.ascale_x,
                bone.ascale_y,
            );
            bone.a = pa * la - pb * lc;
            bone.b = pa * lb - pb * ld;
            bone.c = pc * la + pd * lc;
            bone.d = pc * lb + pd * ld;
        }
        TransformMode::NoScale | TransformMode::NoScaleOrReflection => {
            let [za, zb, zc, zd] = no_scale_basis(
                pa,
                pb,
                pc,
                pd,
                bone.arotation,
                skeleton_scale_x,
                skeleton_scale_y,
                mode == TransformMode::NoScale,
            );
            let [la, lb, lc, ld] = local_matrix(
                bone.ashear_x,
                90.0 + bone.ashear_y,
                bone.ascale_x,
                bone.ascale_y,
            );
            bone.a = za * la + zb * lc;
            bone.b = za * lb + zb * ld;
            bone.c = zc * la + zd * lc;
            bone.d = zc * lb + zd * ld;
        }
    }

    bone.a *= skeleton_scale_x;
    bone.b *= skeleton_scale_x;
    bone.c *= skeleton_scale_y;
    bone.d *= skeleton_scale_y;
}

/// Columns of a local matrix built from the x and y axis angles (degrees) and scales.
fn local_matrix(rotation_x: f32, rotation_y: f32, scale_x: f32, scale_y: f32) -> [f32; 4] {
    let (sin_x, cos_x) = rotation_x.to_radians().sin_cos();
    let (sin_y, cos_y) = rotation_y.to_radians().sin_cos();
    [cos_x * scale_x, cos_y * scale_y, sin_x * scale_x, sin_y * scale_y]
}

/// Parent frame with rotation and reflection removed: `[pa, pb, pc, pd, prx]`, where `prx` is
/// the parent rotation (degrees) the child subtracts.
fn no_rotation_basis(pa: f32, pb: f32, pc: f32, pd: f32, inv_sx: f32, inv_sy: f32) -> [f32; 5] {
    let s = pa * pa + pc * pc;
    if s > 1.0e-4 {
        let s = (pa * pd - pb * pc).abs() / s;
        let pa = pa * inv_sx;
        let pc = pc * inv_sy;
        let pb = pc * s;
        let pd = pa * s;
        [pa, pb, pc, pd, pc.atan2(pa).to_degrees()]
    } else {
        [0.0, pb, 0.0, pd, 90.0 - pd.atan2(pb).to_degrees()]
    }
}

/// Parent frame with scale removed, rotated by the bone's rotation: `[za, zb, zc, zd]`.
#[allow(clippy::too_many_arguments)]
fn no_scale_basis(
    pa: f32,
    pb: f32,
    pc: f32,
    pd: f32,
    rotation: f32,
    skeleton_scale_x: f32,
    skeleton_scale_y: f32,
    keep_reflection: bool,
) -> [f32; 4] {
    let (sin, cos) = rotation.to_radians().sin_cos();
    let mut za = (pa * cos + pb * sin) * reciprocal(skeleton_scale_x);
    let mut zc = (pc * cos + pd * sin) * reciprocal(skeleton_scale_y);
    let mut s = (za * za + zc * zc).sqrt();
    if s > 1.0e-5 {
        s = 1.0 / s;
    }
    za *= s;
    zc *= s;
    s = (za * za + zc * zc).sqrt();
    if keep_reflection {
        let flip = (pa * pd - pb * pc < 0.0) != ((skeleton_scale_x < 0.0) != (skeleton_scale_y < 0.0));
        if flip {
            s = -s;
        }
    }
    let r = std::f32::consts::FRAC_PI_2 + zc.atan2(za);
    [za, r.cos() * s, zc, r.sin() * s]
}

fn reciprocal(v: f32) -> f32 {
    if v.abs() > 1.0e-12 {
        1.0 / v
    } else {
        0.0
    }
}

/// Inverse of the row-major 2x2 matrix `[a, b, c, d]`, or `None` when singular.
pub(crate) fn invert([a, b, c, d]: [f32; 4]) -> Option<[f32; 4]> {
    let det = a * d - b * c;
    if det.abs() <= 1.0e-12 || !det.is_finite() {
        return None;
    }
    let inv = 1.0 / det;
    Some([d * inv, -b * inv, -c * inv, a * inv])
}

/// Wraps degrees into `(-180, 180]`.
pub(crate) fn wrap_degrees(degrees: f32) -> f32 {
    let wrapped = (degrees + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 {
        180.0
    } else {
        wrapped
    }
}

pub(crate) fn warn_non_finite(what: &str, value: f32) -> bool {
    if value.is_finite() {
        return false;
    }
    warn!("ignoring non-finite {what}: {value}");
    true
}
