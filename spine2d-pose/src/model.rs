use crate::Error;
use std::collections::HashMap;

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BoneData {
    pub name: String,
    pub parent: Option<usize>,
    pub length: f32,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub shear_x: f32,
    pub shear_y: f32,
    pub transform_mode: TransformMode,
    pub skin_required: bool,
}

impl Default for BoneData {
    fn default() -> Self {
        Self {
            name: String::new(),
            parent: None,
            length: 0.0,
            x: 0.0,
            y: 0.0,
            rotation: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            shear_x: 0.0,
            shear_y: 0.0,
            transform_mode: TransformMode::Normal,
            skin_required: false,
        }
    }
}

/// How a bone inherits its parent's world transform.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TransformMode {
    #[default]
    Normal,
    OnlyTranslation,
    NoRotationOrReflection,
    NoScale,
    NoScaleOrReflection,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SlotData {
    pub name: String,
    pub bone: usize,
    pub attachment: Option<String>,
    pub color: [f32; 4],
    /// Two-color tint; `None` when the slot only has a light color.
    pub dark_color: Option<[f32; 3]>,
    pub blend: BlendMode,
}

impl Default for SlotData {
    fn default() -> Self {
        Self {
            name: String::new(),
            bone: 0,
            attachment: None,
            color: [1.0, 1.0, 1.0, 1.0],
            dark_color: None,
            blend: BlendMode::Normal,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BlendMode {
    #[default]
    Normal,
    Additive,
    Multiply,
    Screen,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IkConstraintData {
    pub name: String,
    pub order: i32,
    pub skin_required: bool,
    /// Constrained bones, parent first. One, two, or a longer parent-to-child chain.
    pub bones: Vec<usize>,
    pub target: usize,
    pub mix: f32,
    pub softness: f32,
    pub bend_direction: i32,
    pub compress: bool,
    pub stretch: bool,
    pub uniform: bool,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TransformConstraintData {
    pub name: String,
    pub order: i32,
    pub skin_required: bool,
    pub bones: Vec<usize>,
    pub target: usize,
    pub mix_rotate: f32,
    pub mix_x: f32,
    pub mix_y: f32,
    pub mix_scale_x: f32,
    pub mix_scale_y: f32,
    pub mix_shear_y: f32,
    pub offset_rotation: f32,
    pub offset_x: f32,
    pub offset_y: f32,
    pub offset_scale_x: f32,
    pub offset_scale_y: f32,
    pub offset_shear_y: f32,
    pub relative: bool,
    pub local: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PositionMode {
    Fixed,
    Percent,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SpacingMode {
    Length,
    Fixed,
    Percent,
    Proportional,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RotateMode {
    Tangent,
    Chain,
    ChainScale,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PathConstraintData {
    pub name: String,
    pub order: i32,
    pub skin_required: bool,
    pub bones: Vec<usize>,
    /// Slot whose current attachment must be a path.
    pub target: usize,
    pub position_mode: PositionMode,
    pub spacing_mode: SpacingMode,
    pub rotate_mode: RotateMode,
    pub offset_rotation: f32,
    pub position: f32,
    pub spacing: f32,
    pub mix_rotate: f32,
    pub mix_x: f32,
    pub mix_y: f32,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VertexWeight {
    pub bone: usize,
    pub x: f32,
    pub y: f32,
    pub weight: f32,
}

/// Vertex positions of a vertex attachment, either in the slot bone's space or weighted across
/// several bones.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VertexData {
    Unweighted(Vec<[f32; 2]>),
    Weighted(Vec<Vec<VertexWeight>>),
}

impl VertexData {
    pub fn vertex_count(&self) -> usize {
        match self {
            VertexData::Unweighted(v) => v.len(),
            VertexData::Weighted(v) => v.len(),
        }
    }

    /// Number of floats a deform buffer for these vertices holds: two per vertex when unweighted,
    /// two per bone influence when weighted.
    pub fn deform_len(&self) -> usize {
        match self {
            VertexData::Unweighted(v) => v.len() * 2,
            VertexData::Weighted(v) => v.iter().map(|w| w.len() * 2).sum(),
        }
    }

    fn bones(&self) -> impl Iterator<Item = usize> + '_ {
        let weighted = match self {
            VertexData::Unweighted(_) => None,
            VertexData::Weighted(v) => Some(v.iter().flatten().map(|w| w.bone)),
        };
        weighted.into_iter().flatten()
    }
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RegionAttachmentData {
    pub name: String,
    pub path: String,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub width: f32,
    pub height: f32,
    pub color: [f32; 4],
}

impl RegionAttachmentData {
    /// Corner offsets in bone space: bottom-left, top-left, top-right, bottom-right.
    pub fn offsets(&self) -> [f32; 8] {
        let local_x2 = self.width / 2.0;
        let local_y2 = self.height / 2.0;
        let local_x = -local_x2 * self.scale_x;
        let local_y = -local_y2 * self.scale_y;
        let local_x2 = local_x2 * self.scale_x;
        let local_y2 = local_y2 * self.scale_y;
        let radians = self.rotation.to_radians();
        let cos = radians.cos();
        let sin = radians.sin();
        let x = self.x;
        let y = self.y;
        let local_x_cos = local_x * cos + x;
        let local_x_sin = local_x * sin;
        let local_y_cos = local_y * cos + y;
        let local_y_sin = local_y * sin;
        let local_x2_cos = local_x2 * cos + x;
        let local_x2_sin = local_x2 * sin;
        let local_y2_cos = local_y2 * cos + y;
        let local_y2_sin = local_y2 * sin;
        [
            local_x_cos - local_y_sin,
            local_y_cos + local_x_sin,
            local_x_cos - local_y2_sin,
            local_y2_cos + local_x_sin,
            local_x2_cos - local_y2_sin,
            local_y2_cos + local_x2_sin,
            local_x2_cos - local_y_sin,
            local_y_cos + local_x2_sin,
        ]
    }
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeshAttachmentData {
    pub name: String,
    pub path: String,
    pub vertices: VertexData,
    pub uvs: Vec<[f32; 2]>,
    pub triangles: Vec<u32>,
    pub hull_length: usize,
    pub color: [f32; 4],
    /// Linked meshes take deform keys from the named source mesh.
    pub timeline_attachment: Option<String>,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoundingBoxAttachmentData {
    pub name: String,
    pub vertices: VertexData,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PathAttachmentData {
    pub name: String,
    /// Bezier control points: `[in, point, out]` per knot, flattened.
    pub vertices: VertexData,
    /// Cumulative length at the end of each curve.
    pub lengths: Vec<f32>,
    pub closed: bool,
    pub constant_speed: bool,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PointAttachmentData {
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClippingAttachmentData {
    pub name: String,
    pub vertices: VertexData,
    pub end_slot: Option<usize>,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AttachmentData {
    Region(RegionAttachmentData),
    Mesh(MeshAttachmentData),
    BoundingBox(BoundingBoxAttachmentData),
    Path(PathAttachmentData),
    Point(PointAttachmentData),
    Clipping(ClippingAttachmentData),
}

impl AttachmentData {
    pub fn name(&self) -> &str {
        match self {
            AttachmentData::Region(a) => &a.name,
            AttachmentData::Mesh(a) => &a.name,
            AttachmentData::BoundingBox(a) => &a.name,
            AttachmentData::Path(a) => &a.name,
            AttachmentData::Point(a) => &a.name,
            AttachmentData::Clipping(a) => &a.name,
        }
    }

    /// Vertices of the attachment when it is a vertex attachment.
    pub fn vertices(&self) -> Option<&VertexData> {
        match self {
            AttachmentData::Mesh(a) => Some(&a.vertices),
            AttachmentData::BoundingBox(a) => Some(&a.vertices),
            AttachmentData::Path(a) => Some(&a.vertices),
            AttachmentData::Clipping(a) => Some(&a.vertices),
            AttachmentData::Region(_) | AttachmentData::Point(_) => None,
        }
    }

    /// Name of the attachment whose deform timelines drive this one.
    pub fn timeline_attachment(&self) -> &str {
        match self {
            AttachmentData::Mesh(MeshAttachmentData {
                timeline_attachment: Some(source),
                ..
            }) => source,
            other => other.name(),
        }
    }
}

#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SkinData {
    pub name: String,
    /// Per slot index, attachments keyed by the name slots and timelines refer to.
    pub attachments: Vec<HashMap<String, AttachmentData>>,
    pub bones: Vec<usize>,
    pub ik_constraints: Vec<usize>,
    pub transform_constraints: Vec<usize>,
    pub path_constraints: Vec<usize>,
}

impl SkinData {
    pub fn attachment(&self, slot_index: usize, name: &str) -> Option<&AttachmentData> {
        self.attachments.get(slot_index)?.get(name)
    }

    pub fn set_attachment(&mut self, slot_index: usize, name: &str, attachment: AttachmentData) {
        if self.attachments.len() <= slot_index {
            self.attachments.resize_with(slot_index + 1, HashMap::new);
        }
        self.attachments[slot_index].insert(name.to_string(), attachment);
    }
}

#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EventData {
    pub name: String,
    pub int_value: i32,
    pub float_value: f32,
    pub string_value: String,
    pub audio_path: String,
    pub volume: f32,
    pub balance: f32,
}

/// A keyed event. Values start from the `EventData` and may be overridden per key.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Event {
    pub time: f32,
    /// Index into `SkeletonData::events`.
    pub data: usize,
    pub int_value: i32,
    pub float_value: f32,
    pub string_value: String,
    pub volume: f32,
    pub balance: f32,
}

impl Event {
    pub fn new(time: f32, data_index: usize, data: &EventData) -> Self {
        Self {
            time,
            data: data_index,
            int_value: data.int_value,
            float_value: data.float_value,
            string_value: data.string_value.clone(),
            volume: data.volume,
            balance: data.balance,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Curve {
    #[default]
    Linear,
    Stepped,
    Bezier {
        cx1: f32,
        cy1: f32,
        cx2: f32,
        cy2: f32,
    },
}

/// A keyframe with `N` animated channels, each with its own curve to the next key.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(bound(
        serialize = "[f32; N]: serde::Serialize, [Curve; N]: serde::Serialize",
        deserialize = "[f32; N]: serde::Deserialize<'de>, [Curve; N]: serde::Deserialize<'de>"
    ))
)]
pub struct CurveFrame<const N: usize> {
    pub time: f32,
    pub values: [f32; N],
    pub curves: [Curve; N],
}

impl<const N: usize> CurveFrame<N> {
    pub fn linear(time: f32, values: [f32; N]) -> Self {
        Self {
            time,
            values,
            curves: [Curve::Linear; N],
        }
    }

    pub fn stepped(time: f32, values: [f32; N]) -> Self {
        Self {
            time,
            values,
            curves: [Curve::Stepped; N],
        }
    }

    pub fn with_curve(mut self, curve: Curve) -> Self {
        self.curves = [curve; N];
        self
    }
}

/// Keyframes driving `N` channels of one bone, slot or constraint.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(bound(
        serialize = "CurveFrame<N>: serde::Serialize",
        deserialize = "CurveFrame<N>: serde::Deserialize<'de>"
    ))
)]
pub struct CurveTimeline<const N: usize> {
    /// Bone, slot or constraint index, depending on the timeline kind.
    pub target: usize,
    pub frames: Vec<CurveFrame<N>>,
}

impl<const N: usize> CurveTimeline<N> {
    pub fn new(target: usize, frames: Vec<CurveFrame<N>>) -> Self {
        Self { target, frames }
    }
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AttachmentFrame {
    pub time: f32,
    pub name: Option<String>,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AttachmentTimeline {
    pub slot: usize,
    pub frames: Vec<AttachmentFrame>,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeformFrame {
    pub time: f32,
    /// Offsets added to the setup vertices; empty means no offset.
    pub vertices: Vec<f32>,
    pub curve: Curve,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeformTimeline {
    pub slot: usize,
    /// Attachment name the keys apply to, matched against `AttachmentData::timeline_attachment`.
    pub attachment: String,
    pub frames: Vec<DeformFrame>,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EventTimeline {
    pub events: Vec<Event>,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DrawOrderFrame {
    pub time: f32,
    /// Slot indices in draw order; `None` restores the setup order.
    pub draw_order: Option<Vec<usize>>,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DrawOrderTimeline {
    pub frames: Vec<DrawOrderFrame>,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IkFrame {
    pub time: f32,
    pub mix: f32,
    pub softness: f32,
    pub bend_direction: i32,
    pub compress: bool,
    pub stretch: bool,
    pub curves: [Curve; 2],
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IkConstraintTimeline {
    pub constraint: usize,
    pub frames: Vec<IkFrame>,
}

/// Closed set of animated properties.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Timeline {
    Rotate(CurveTimeline<1>),
    Translate(CurveTimeline<2>),
    TranslateX(CurveTimeline<1>),
    TranslateY(CurveTimeline<1>),
    Scale(CurveTimeline<2>),
    ScaleX(CurveTimeline<1>),
    ScaleY(CurveTimeline<1>),
    Shear(CurveTimeline<2>),
    ShearX(CurveTimeline<1>),
    ShearY(CurveTimeline<1>),
    /// r, g, b, a
    Rgba(CurveTimeline<4>),
    Rgb(CurveTimeline<3>),
    Alpha(CurveTimeline<1>),
    /// light r, g, b, a then dark r, g, b
    Rgba2(CurveTimeline<7>),
    /// light r, g, b then dark r, g, b
    Rgb2(CurveTimeline<6>),
    Attachment(AttachmentTimeline),
    Deform(DeformTimeline),
    Event(EventTimeline),
    DrawOrder(DrawOrderTimeline),
    IkConstraint(IkConstraintTimeline),
    /// rotate, x, y, scale x, scale y, shear y
    TransformConstraint(CurveTimeline<6>),
    PathConstraintPosition(CurveTimeline<1>),
    PathConstraintSpacing(CurveTimeline<1>),
    /// rotate, x, y
    PathConstraintMix(CurveTimeline<3>),
}

/// Identity of one animated property. Deform keys are per slot and attachment name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct PropertyId {
    kind: u32,
    index: usize,
    attachment: Option<String>,
}

pub(crate) mod property {
    use super::PropertyId;

    pub const ROTATE: u32 = 0;
    pub const X: u32 = 1;
    pub const Y: u32 = 2;
    pub const SCALE_X: u32 = 3;
    pub const SCALE_Y: u32 = 4;
    pub const SHEAR_X: u32 = 5;
    pub const SHEAR_Y: u32 = 6;
    pub const RGB: u32 = 7;
    pub const ALPHA: u32 = 8;
    pub const RGB2: u32 = 9;
    pub const ATTACHMENT: u32 = 10;
    pub const DEFORM: u32 = 11;
    pub const EVENT: u32 = 12;
    pub const DRAW_ORDER: u32 = 13;
    pub const IK_CONSTRAINT: u32 = 14;
    pub const TRANSFORM_CONSTRAINT: u32 = 15;
    pub const PATH_CONSTRAINT_POSITION: u32 = 16;
    pub const PATH_CONSTRAINT_SPACING: u32 = 17;
    pub const PATH_CONSTRAINT_MIX: u32 = 18;

    pub fn id(kind: u32, index: usize) -> PropertyId {
        PropertyId {
            kind,
            index,
            attachment: None,
        }
    }

    pub fn deform(slot: usize, attachment: &str) -> PropertyId {
        PropertyId {
            kind: DEFORM,
            index: slot,
            attachment: Some(attachment.to_string()),
        }
    }
}

impl Timeline {
    /// Ids of every property this timeline writes. The first id identifies the timeline kind.
    pub(crate) fn property_ids(&self) -> Vec<PropertyId> {
        use property::*;
        let one = |kind: u32, index: usize| vec![id(kind, index)];
        let two = |a: u32, b: u32, index: usize| vec![id(a, index), id(b, index)];
        match self {
            Timeline::Rotate(t) => one(ROTATE, t.target),
            Timeline::Translate(t) => two(X, Y, t.target),
            Timeline::TranslateX(t) => one(X, t.target),
            Timeline::TranslateY(t) => one(Y, t.target),
            Timeline::Scale(t) => two(SCALE_X, SCALE_Y, t.target),
            Timeline::ScaleX(t) => one(SCALE_X, t.target),
            Timeline::ScaleY(t) => one(SCALE_Y, t.target),
            Timeline::Shear(t) => two(SHEAR_X, SHEAR_Y, t.target),
            Timeline::ShearX(t) => one(SHEAR_X, t.target),
            Timeline::ShearY(t) => one(SHEAR_Y, t.target),
            Timeline::Rgba(t) => two(RGB, ALPHA, t.target),
            Timeline::Rgb(t) => one(RGB, t.target),
            Timeline::Alpha(t) => one(ALPHA, t.target),
            Timeline::Rgba2(t) => vec![id(RGB, t.target), id(ALPHA, t.target), id(RGB2, t.target)],
            Timeline::Rgb2(t) => two(RGB, RGB2, t.target),
            Timeline::Attachment(t) => one(ATTACHMENT, t.slot),
            Timeline::Deform(t) => vec![deform(t.slot, &t.attachment)],
            Timeline::Event(_) => vec![id(EVENT, 0)],
            Timeline::DrawOrder(_) => vec![id(DRAW_ORDER, 0)],
            Timeline::IkConstraint(t) => one(IK_CONSTRAINT, t.constraint),
            Timeline::TransformConstraint(t) => one(TRANSFORM_CONSTRAINT, t.target),
            Timeline::PathConstraintPosition(t) => one(PATH_CONSTRAINT_POSITION, t.target),
            Timeline::PathConstraintSpacing(t) => one(PATH_CONSTRAINT_SPACING, t.target),
            Timeline::PathConstraintMix(t) => one(PATH_CONSTRAINT_MIX, t.target),
        }
    }

    /// Time of the last keyframe, or 0 for an empty timeline.
    pub fn duration(&self) -> f32 {
        self.frame_times().last().copied().unwrap_or(0.0)
    }

    pub(crate) fn frame_times(&self) -> Vec<f32> {
        fn times<const N: usize>(t: &CurveTimeline<N>) -> Vec<f32> {
            t.frames.iter().map(|f| f.time).collect()
        }
        match self {
            Timeline::Rotate(t)
            | Timeline::TranslateX(t)
            | Timeline::TranslateY(t)
            | Timeline::ScaleX(t)
            | Timeline::ScaleY(t)
            | Timeline::ShearX(t)
            | Timeline::ShearY(t)
            | Timeline::Alpha(t)
            | Timeline::PathConstraintPosition(t)
            | Timeline::PathConstraintSpacing(t) => times(t),
            Timeline::Translate(t) | Timeline::Scale(t) | Timeline::Shear(t) => times(t),
            Timeline::Rgba(t) => times(t),
            Timeline::Rgb(t) => times(t),
            Timeline::Rgba2(t) => times(t),
            Timeline::Rgb2(t) => times(t),
            Timeline::TransformConstraint(t) => times(t),
            Timeline::PathConstraintMix(t) => times(t),
            Timeline::Attachment(t) => t.frames.iter().map(|f| f.time).collect(),
            Timeline::Deform(t) => t.frames.iter().map(|f| f.time).collect(),
            Timeline::Event(t) => t.events.iter().map(|e| e.time).collect(),
            Timeline::DrawOrder(t) => t.frames.iter().map(|f| f.time).collect(),
            Timeline::IkConstraint(t) => t.frames.iter().map(|f| f.time).collect(),
        }
    }
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Animation {
    pub name: String,
    pub timelines: Vec<Timeline>,
    pub duration: f32,
}

impl Animation {
    /// Creates an animation whose duration is the last keyframe time across all timelines.
    pub fn new(name: impl Into<String>, timelines: Vec<Timeline>) -> Self {
        let duration = timelines
            .iter()
            .map(Timeline::duration)
            .fold(0.0f32, f32::max);
        Self {
            name: name.into(),
            timelines,
            duration,
        }
    }

    pub(crate) fn has_any_property(&self, ids: &[PropertyId]) -> bool {
        self.timelines
            .iter()
            .any(|t| t.property_ids().iter().any(|id| ids.contains(id)))
    }
}

#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SkeletonData {
    pub name: String,
    pub bones: Vec<BoneData>,
    pub slots: Vec<SlotData>,
    /// Skins by name. The skin named `default` holds attachments visible without a skin.
    pub skins: HashMap<String, SkinData>,
    pub events: Vec<EventData>,
    pub animations: Vec<Animation>,
    pub ik_constraints: Vec<IkConstraintData>,
    pub transform_constraints: Vec<TransformConstraintData>,
    pub path_constraints: Vec<PathConstraintData>,
}

pub const DEFAULT_SKIN_NAME: &str = "default";

impl SkeletonData {
    pub fn find_bone(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }

    pub fn find_slot(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.name == name)
    }

    pub fn find_event(&self, name: &str) -> Option<usize> {
        self.events.iter().position(|e| e.name == name)
    }

    pub fn find_ik_constraint(&self, name: &str) -> Option<usize> {
        self.ik_constraints.iter().position(|c| c.name == name)
    }

    pub fn find_transform_constraint(&self, name: &str) -> Option<usize> {
        self.transform_constraints.iter().position(|c| c.name == name)
    }

    pub fn find_path_constraint(&self, name: &str) -> Option<usize> {
        self.path_constraints.iter().position(|c| c.name == name)
    }

    pub fn animation(&self, name: &str) -> Option<(usize, &Animation)> {
        self.animations
            .iter()
            .enumerate()
            .find(|(_, a)| a.name == name)
    }

    pub fn skin(&self, name: &str) -> Option<&SkinData> {
        self.skins.get(name)
    }

    pub fn default_skin(&self) -> Option<&SkinData> {
        self.skins.get(DEFAULT_SKIN_NAME)
    }

    /// Checks referential integrity. Every index must point at an existing item, parents must
    /// precede their children, IK chains must follow the hierarchy, and keyframe times must
    /// strictly increase.
    pub fn validate(&self) -> Result<(), Error> {
        let bone_count = self.bones.len();
        let slot_count = self.slots.len();

        for (index, bone) in self.bones.iter().enumerate() {
            if let Some(parent) = bone.parent {
                if parent >= index {
                    return Err(Error::InvalidBoneParent {
                        bone: bone.name.clone(),
                        parent,
                    });
                }
            }
        }

        let check_bone = |owner: &str, bone: usize| {
            if bone < bone_count {
                Ok(())
            } else {
                Err(Error::UnknownBone {
                    owner: owner.to_string(),
                    index: bone,
                })
            }
        };
        let check_slot = |owner: &str, slot: usize| {
            if slot < slot_count {
                Ok(())
            } else {
                Err(Error::UnknownSlot {
                    owner: owner.to_string(),
                    index: slot,
                })
            }
        };

        for slot in &self.slots {
            check_bone(&slot.name, slot.bone)?;
        }

        for ik in &self.ik_constraints {
            check_bone(&ik.name, ik.target)?;
            if ik.bones.is_empty() {
                return Err(Error::InvalidIkChain {
                    name: ik.name.clone(),
                });
            }
            for &bone in &ik.bones {
                check_bone(&ik.name, bone)?;
            }
            for pair in ik.bones.windows(2) {
                if self.bones[pair[1]].parent != Some(pair[0]) {
                    return Err(Error::InvalidIkChain {
                        name: ik.name.clone(),
                    });
                }
            }
        }

        for c in &self.transform_constraints {
            check_bone(&c.name, c.target)?;
            for &bone in &c.bones {
                check_bone(&c.name, bone)?;
            }
        }

        for c in &self.path_constraints {
            check_slot(&c.name, c.target)?;
            for &bone in &c.bones {
                check_bone(&c.name, bone)?;
            }
        }

        for skin in self.skins.values() {
            for &bone in &skin.bones {
                check_bone(&skin.name, bone)?;
            }
            let constraint = |kind: &'static str, index: usize, len: usize| {
                if index < len {
                    Ok(())
                } else {
                    Err(Error::UnknownConstraint {
                        owner: skin.name.clone(),
                        kind,
                        index,
                    })
                }
            };
            for &c in &skin.ik_constraints {
                constraint("ik", c, self.ik_constraints.len())?;
            }
            for &c in &skin.transform_constraints {
                constraint("transform", c, self.transform_constraints.len())?;
            }
            for &c in &skin.path_constraints {
                constraint("path", c, self.path_constraints.len())?;
            }
            if skin.attachments.len() > slot_count {
                return Err(Error::UnknownSlot {
                    owner: skin.name.clone(),
                    index: skin.attachments.len() - 1,
                });
            }
            for attachment in skin.attachments.iter().flat_map(|m| m.values()) {
                if let Some(vertices) = attachment.vertices() {
                    for bone in vertices.bones() {
                        check_bone(attachment.name(), bone)?;
                    }
                }
                if let AttachmentData::Clipping(ClippingAttachmentData {
                    end_slot: Some(end),
                    ..
                }) = attachment
                {
                    check_slot(attachment.name(), *end)?;
                }
            }
        }

        for animation in &self.animations {
            for timeline in &animation.timelines {
                self.validate_timeline(&animation.name, timeline)?;
            }
        }

        Ok(())
    }

    fn validate_timeline(&self, animation: &str, timeline: &Timeline) -> Result<(), Error> {
        let times = timeline.frame_times();
        // Several events may share an instant; every other key time strictly increases.
        let unsorted = match timeline {
            Timeline::Event(_) => times.windows(2).any(|w| w[1] < w[0]),
            _ => times.windows(2).any(|w| w[1] <= w[0]),
        };
        if unsorted {
            return Err(Error::UnsortedKeyframes {
                animation: animation.to_string(),
            });
        }

        let (target, len, kind) = match timeline {
            Timeline::Rotate(t)
            | Timeline::TranslateX(t)
            | Timeline::TranslateY(t)
            | Timeline::ScaleX(t)
            | Timeline::ScaleY(t)
            | Timeline::ShearX(t)
            | Timeline::ShearY(t) => (t.target, self.bones.len(), "bone"),
            Timeline::Translate(t) | Timeline::Scale(t) | Timeline::Shear(t) => {
                (t.target, self.bones.len(), "bone")
            }
            Timeline::Alpha(t) => (t.target, self.slots.len(), "slot"),
            Timeline::Rgba(t) => (t.target, self.slots.len(), "slot"),
            Timeline::Rgb(t) => (t.target, self.slots.len(), "slot"),
            Timeline::Rgba2(t) => (t.target, self.slots.len(), "slot"),
            Timeline::Rgb2(t) => (t.target, self.slots.len(), "slot"),
            Timeline::Attachment(t) => (t.slot, self.slots.len(), "slot"),
            Timeline::Deform(t) => (t.slot, self.slots.len(), "slot"),
            Timeline::Event(t) => {
                for event in &t.events {
                    if event.data >= self.events.len() {
                        return Err(Error::UnknownEvent {
                            animation: animation.to_string(),
                            index: event.data,
                        });
                    }
                }
                return Ok(());
            }
            Timeline::DrawOrder(t) => {
                for order in t.frames.iter().filter_map(|f| f.draw_order.as_ref()) {
                    if order.len() != self.slots.len() {
                        return Err(Error::InvalidValue {
                            message: format!(
                                "draw order in {animation} lists {} slots, skeleton has {}",
                                order.len(),
                                self.slots.len()
                            ),
                        });
                    }
                    for &slot in order {
                        if slot >= self.slots.len() {
                            return Err(Error::UnknownSlot {
                                owner: animation.to_string(),
                                index: slot,
                            });
                        }
                    }
                }
                return Ok(());
            }
            Timeline::IkConstraint(t) => (t.constraint, self.ik_constraints.len(), "ik"),
            Timeline::TransformConstraint(t) => {
                (t.target, self.transform_constraints.len(), "transform")
            }
            Timeline::PathConstraintPosition(t) | Timeline::PathConstraintSpacing(t) => {
                (t.target, self.path_constraints.len(), "path")
            }
            Timeline::PathConstraintMix(t) => (t.target, self.path_constraints.len(), "path"),
        };

        if target < len {
            return Ok(());
        }
        Err(match kind {
            "bone" => Error::UnknownBone {
                owner: animation.to_string(),
                index: target,
            },
            "slot" => Error::UnknownSlot {
                owner: animation.to_string(),
                index: target,
            },
            kind => Error::UnknownConstraint {
                owner: animation.to_string(),
                kind,
                index: target,
            },
        })
    }
}
