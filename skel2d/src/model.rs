use std::collections::{HashMap, HashSet};
use std::ops::Mul;
use std::sync::Arc;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color::new(1.0, 1.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn from_rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self::new(
            r as f32 / 255.0,
            g as f32 / 255.0,
            b as f32 / 255.0,
            a as f32 / 255.0,
        )
    }

    /// Parses `RRGGBBAA` or `RRGGBB` hex.
    pub fn from_hex(value: &str) -> Option<Self> {
        let value = value.trim().trim_start_matches('#');
        let channel = |i: usize| u8::from_str_radix(value.get(i * 2..i * 2 + 2)?, 16).ok();
        match value.len() {
            6 => Some(Self::from_rgba8(channel(0)?, channel(1)?, channel(2)?, 255)),
            8 => Some(Self::from_rgba8(
                channel(0)?,
                channel(1)?,
                channel(2)?,
                channel(3)?,
            )),
            _ => None,
        }
    }

    pub fn lerp(self, to: Color, t: f32) -> Color {
        Color::new(
            self.r + (to.r - self.r) * t,
            self.g + (to.g - self.g) * t,
            self.b + (to.b - self.b) * t,
            self.a + (to.a - self.a) * t,
        )
    }

    pub fn premultiplied(self) -> Color {
        Color::new(self.r * self.a, self.g * self.a, self.b * self.a, self.a)
    }

    pub fn clamped(self) -> Color {
        Color::new(
            self.r.clamp(0.0, 1.0),
            self.g.clamp(0.0, 1.0),
            self.b.clamp(0.0, 1.0),
            self.a.clamp(0.0, 1.0),
        )
    }

    /// Packs to RGBA8 with `r` in the lowest byte.
    pub fn to_packed(self) -> u32 {
        let c = self.clamped();
        let q = |v: f32| (v * 255.0).round() as u32;
        q(c.r) | (q(c.g) << 8) | (q(c.b) << 16) | (q(c.a) << 24)
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::WHITE
    }
}

impl Mul for Color {
    type Output = Color;

    fn mul(self, rhs: Color) -> Color {
        Color::new(self.r * rhs.r, self.g * rhs.g, self.b * rhs.b, self.a * rhs.a)
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum BlendMode {
    #[default]
    Normal,
    Additive,
    Multiply,
    Screen,
}

/// How a bone composes its parent's world transform.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Inherit {
    #[default]
    Normal,
    OnlyTranslation,
    NoRotationOrReflection,
    NoScale,
}

#[derive(Clone, Debug)]
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
    pub inherit: Inherit,
}

impl BoneData {
    pub fn new(name: impl Into<String>, parent: Option<usize>) -> Self {
        Self {
            name: name.into(),
            parent,
            length: 0.0,
            x: 0.0,
            y: 0.0,
            rotation: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            shear_x: 0.0,
            shear_y: 0.0,
            inherit: Inherit::Normal,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SlotData {
    pub name: String,
    pub bone: usize,
    pub color: Color,
    /// Second tint applied to the texture's dark pixels. Alpha is unused.
    pub dark_color: Option<Color>,
    pub attachment: Option<String>,
    pub blend: BlendMode,
}

impl SlotData {
    pub fn new(name: impl Into<String>, bone: usize) -> Self {
        Self {
            name: name.into(),
            bone,
            color: Color::WHITE,
            dark_color: None,
            attachment: None,
            blend: BlendMode::Normal,
        }
    }
}

/// Textured quad centered on its local offset.
#[derive(Clone, Debug)]
pub struct RegionAttachment {
    pub name: String,
    pub path: String,
    pub color: Color,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub width: f32,
    pub height: f32,
}

impl RegionAttachment {
    pub fn new(name: impl Into<String>, width: f32, height: f32) -> Self {
        let name = name.into();
        Self {
            path: name.clone(),
            name,
            color: Color::WHITE,
            x: 0.0,
            y: 0.0,
            rotation: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            width,
            height,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct VertexWeight {
    pub bone: usize,
    pub x: f32,
    pub y: f32,
    pub weight: f32,
}

#[derive(Clone, Debug)]
pub enum MeshVertices {
    /// Positions in the slot bone's space.
    Unweighted(Vec<[f32; 2]>),
    /// Per vertex, the bones influencing it.
    Weighted(Vec<Vec<VertexWeight>>),
}

impl MeshVertices {
    pub fn len(&self) -> usize {
        match self {
            MeshVertices::Unweighted(v) => v.len(),
            MeshVertices::Weighted(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Debug)]
pub struct MeshGeometry {
    pub vertices: MeshVertices,
    /// Region-relative UVs, one per vertex.
    pub uvs: Vec<[f32; 2]>,
    pub triangles: Vec<u16>,
    pub hull_length: usize,
}

#[derive(Clone, Debug)]
pub struct MeshAttachment {
    pub name: String,
    pub path: String,
    pub color: Color,
    pub geometry: Arc<MeshGeometry>,
}

/// Mesh sharing another mesh's geometry, with its own texture path and tint.
#[derive(Clone, Debug)]
pub struct LinkedMeshAttachment {
    pub name: String,
    pub path: String,
    pub color: Color,
    pub parent: String,
    pub parent_skin: Option<String>,
    pub geometry: Arc<MeshGeometry>,
}

#[derive(Clone, Debug)]
pub struct ClippingAttachment {
    pub name: String,
    pub end_slot: Option<usize>,
    pub vertices: MeshVertices,
}

#[derive(Clone, Debug)]
pub enum Attachment {
    Region(RegionAttachment),
    Mesh(MeshAttachment),
    LinkedMesh(LinkedMeshAttachment),
    Clipping(ClippingAttachment),
}

impl Attachment {
    pub fn name(&self) -> &str {
        match self {
            Attachment::Region(a) => &a.name,
            Attachment::Mesh(a) => &a.name,
            Attachment::LinkedMesh(a) => &a.name,
            Attachment::Clipping(a) => &a.name,
        }
    }

    /// Atlas region path for textured attachments.
    pub fn texture_path(&self) -> Option<&str> {
        match self {
            Attachment::Region(a) => Some(&a.path),
            Attachment::Mesh(a) => Some(&a.path),
            Attachment::LinkedMesh(a) => Some(&a.path),
            Attachment::Clipping(_) => None,
        }
    }

    pub fn color(&self) -> Color {
        match self {
            Attachment::Region(a) => a.color,
            Attachment::Mesh(a) => a.color,
            Attachment::LinkedMesh(a) => a.color,
            Attachment::Clipping(_) => Color::WHITE,
        }
    }

    pub fn mesh_geometry(&self) -> Option<&Arc<MeshGeometry>> {
        match self {
            Attachment::Mesh(a) => Some(&a.geometry),
            Attachment::LinkedMesh(a) => Some(&a.geometry),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Skin {
    pub name: String,
    attachments: Vec<HashMap<String, Attachment>>,
}

impl Skin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attachments: Vec::new(),
        }
    }

    pub fn set_attachment(&mut self, slot: usize, name: impl Into<String>, attachment: Attachment) {
        if self.attachments.len() <= slot {
            self.attachments.resize_with(slot + 1, HashMap::new);
        }
        self.attachments[slot].insert(name.into(), attachment);
    }

    pub fn attachment(&self, slot: usize, name: &str) -> Option<&Attachment> {
        self.attachments.get(slot)?.get(name)
    }

    /// Iterates `(slot index, attachment name, attachment)`.
    pub fn attachments(&self) -> impl Iterator<Item = (usize, &str, &Attachment)> {
        self.attachments.iter().enumerate().flat_map(|(slot, map)| {
            map.iter()
                .map(move |(name, attachment)| (slot, name.as_str(), attachment))
        })
    }

    pub(crate) fn slot_capacity(&self) -> usize {
        self.attachments.len()
    }
}

/// Interpolation from a key to the one after it.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub enum Curve {
    #[default]
    Linear,
    Stepped,
    /// Cubic bezier through (0,0), (cx1,cy1), (cx2,cy2), (1,1) over the key interval.
    Bezier { cx1: f32, cy1: f32, cx2: f32, cy2: f32 },
}

impl Curve {
    /// Maps linear progress `p` in `[0, 1]` through the curve.
    pub fn ease(self, p: f32) -> f32 {
        match self {
            Curve::Linear => p,
            Curve::Stepped => 0.0,
            Curve::Bezier { cx1, cy1, cx2, cy2 } => bezier_ease(p, cx1, cy1, cx2, cy2),
        }
    }
}

fn bezier_ease(p: f32, cx1: f32, cy1: f32, cx2: f32, cy2: f32) -> f32 {
    if p <= 0.0 {
        return 0.0;
    }
    if p >= 1.0 {
        return 1.0;
    }
    let cx1 = cx1.clamp(0.0, 1.0);
    let cx2 = cx2.clamp(0.0, 1.0);
    let cubic = |t: f32, c1: f32, c2: f32| {
        let u = 1.0 - t;
        3.0 * u * u * t * c1 + 3.0 * u * t * t * c2 + t * t * t
    };

    // x(t) is monotonic for control x in [0, 1].
    let (mut lo, mut hi) = (0.0f32, 1.0f32);
    let mut t = p;
    for _ in 0..24 {
        let x = cubic(t, cx1, cx2);
        if (x - p).abs() < 1.0e-6 {
            break;
        }
        if x < p {
            lo = t;
        } else {
            hi = t;
        }
        t = 0.5 * (lo + hi);
    }
    cubic(t, cy1, cy2)
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Keyframe<T> {
    pub time: f32,
    pub value: T,
    pub curve: Curve,
}

impl<T> Keyframe<T> {
    pub fn new(time: f32, value: T) -> Self {
        Self {
            time,
            value,
            curve: Curve::Linear,
        }
    }

    pub fn with_curve(mut self, curve: Curve) -> Self {
        self.curve = curve;
        self
    }
}

/// Something an animation can key. Used to decide how crossfades treat each property.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Property {
    Rotate(usize),
    Translate(usize),
    Scale(usize),
    Shear(usize),
    Attachment(usize),
    Color(usize),
    DarkColor(usize),
}

/// Keyed bone channel. Rotate and translate/shear values are offsets from the setup pose,
/// scale values multiply it.
#[derive(Clone, Debug)]
pub enum BoneTimeline {
    Rotate {
        bone: usize,
        frames: Vec<Keyframe<f32>>,
    },
    Translate {
        bone: usize,
        frames: Vec<Keyframe<[f32; 2]>>,
    },
    Scale {
        bone: usize,
        frames: Vec<Keyframe<[f32; 2]>>,
    },
    Shear {
        bone: usize,
        frames: Vec<Keyframe<[f32; 2]>>,
    },
}

impl BoneTimeline {
    pub fn bone(&self) -> usize {
        match self {
            BoneTimeline::Rotate { bone, .. }
            | BoneTimeline::Translate { bone, .. }
            | BoneTimeline::Scale { bone, .. }
            | BoneTimeline::Shear { bone, .. } => *bone,
        }
    }

    pub fn property(&self) -> Property {
        match self {
            BoneTimeline::Rotate { bone, .. } => Property::Rotate(*bone),
            BoneTimeline::Translate { bone, .. } => Property::Translate(*bone),
            BoneTimeline::Scale { bone, .. } => Property::Scale(*bone),
            BoneTimeline::Shear { bone, .. } => Property::Shear(*bone),
        }
    }

    pub(crate) fn key_times(&self) -> Vec<f32> {
        match self {
            BoneTimeline::Rotate { frames, .. } => frames.iter().map(|f| f.time).collect(),
            BoneTimeline::Translate { frames, .. }
            | BoneTimeline::Scale { frames, .. }
            | BoneTimeline::Shear { frames, .. } => frames.iter().map(|f| f.time).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AttachmentKey {
    pub time: f32,
    pub name: Option<String>,
}

#[derive(Clone, Debug)]
pub struct AttachmentTimeline {
    pub slot: usize,
    pub frames: Vec<AttachmentKey>,
}

#[derive(Clone, Debug)]
pub struct ColorTimeline {
    pub slot: usize,
    pub frames: Vec<Keyframe<Color>>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventData {
    pub name: String,
    pub int_value: i32,
    pub float_value: f32,
    pub string_value: Option<String>,
}

/// A keyed occurrence of an [`EventData`], with its own payload.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub time: f32,
    pub name: String,
    pub int_value: i32,
    pub float_value: f32,
    pub string_value: Option<String>,
}

impl Event {
    pub fn from_data(data: &EventData, time: f32) -> Self {
        Self {
            time,
            name: data.name.clone(),
            int_value: data.int_value,
            float_value: data.float_value,
            string_value: data.string_value.clone(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Animation {
    pub name: String,
    pub duration: f32,
    pub bone_timelines: Vec<BoneTimeline>,
    pub attachment_timelines: Vec<AttachmentTimeline>,
    pub color_timelines: Vec<ColorTimeline>,
    /// Keys a slot's dark color. Only valid for slots with a setup dark color.
    pub dark_color_timelines: Vec<ColorTimeline>,
    /// Sorted by time.
    pub events: Vec<Event>,
    pub(crate) keyed: HashSet<Property>,
}

impl Animation {
    pub fn new(name: impl Into<String>, duration: f32) -> Self {
        Self {
            name: name.into(),
            duration,
            ..Default::default()
        }
    }

    pub(crate) fn empty() -> Self {
        Self::new("<empty>", 0.0)
    }

    /// Whether any timeline of this animation drives `property`.
    ///
    /// Only populated once the animation is part of built skeleton data.
    pub fn keys(&self, property: Property) -> bool {
        self.keyed.contains(&property)
    }

    pub(crate) fn index_properties(&mut self) {
        let bone = self.bone_timelines.iter().map(BoneTimeline::property);
        let attachment = self
            .attachment_timelines
            .iter()
            .map(|t| Property::Attachment(t.slot));
        let color = self.color_timelines.iter().map(|t| Property::Color(t.slot));
        let dark = self
            .dark_color_timelines
            .iter()
            .map(|t| Property::DarkColor(t.slot));
        self.keyed = bone.chain(attachment).chain(color).chain(dark).collect();
    }

    /// Time of the last key across all timelines and events.
    pub fn last_key_time(&self) -> f32 {
        let bone = self
            .bone_timelines
            .iter()
            .flat_map(|t| t.key_times().into_iter());
        let attachment = self
            .attachment_timelines
            .iter()
            .flat_map(|t| t.frames.iter().map(|f| f.time));
        let color = self
            .color_timelines
            .iter()
            .chain(&self.dark_color_timelines)
            .flat_map(|t| t.frames.iter().map(|f| f.time));
        let events = self.events.iter().map(|e| e.time);
        bone.chain(attachment)
            .chain(color)
            .chain(events)
            .fold(0.0, f32::max)
    }
}

/// Spring that lets a bone lag behind its animated position.
#[derive(Clone, Debug)]
pub struct PhysicsConstraintData {
    pub name: String,
    pub bone: usize,
    /// Share of the bone's world movement the spring resists, in `[0, 1]`.
    pub inertia: f32,
    pub strength: f32,
    /// Velocity damping per second.
    pub damping: f32,
    pub mass_inverse: f32,
    /// Fixed simulation step in seconds.
    pub step: f32,
    pub mix: f32,
}

impl PhysicsConstraintData {
    pub fn new(name: impl Into<String>, bone: usize) -> Self {
        Self {
            name: name.into(),
            bone,
            inertia: 1.0,
            strength: 100.0,
            damping: 5.0,
            mass_inverse: 1.0,
            step: 1.0 / 60.0,
            mix: 1.0,
        }
    }
}

/// Validated, immutable skeleton definition shared by every instance.
///
/// Built by [`crate::SkeletonDataBuilder`] or one of the loaders.
#[derive(Debug)]
pub struct SkeletonData {
    pub(crate) version: Option<String>,
    pub(crate) bones: Vec<BoneData>,
    pub(crate) update_order: Vec<usize>,
    pub(crate) slots: Vec<SlotData>,
    pub(crate) skins: Vec<Skin>,
    pub(crate) events: Vec<EventData>,
    pub(crate) animations: Vec<Arc<Animation>>,
    pub(crate) physics_constraints: Vec<PhysicsConstraintData>,
    pub(crate) animation_index: HashMap<String, usize>,
}

impl SkeletonData {
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn bones(&self) -> &[BoneData] {
        &self.bones
    }

    /// Bone indices with every parent before its children.
    pub fn update_order(&self) -> &[usize] {
        &self.update_order
    }

    pub fn slots(&self) -> &[SlotData] {
        &self.slots
    }

    pub fn skins(&self) -> &[Skin] {
        &self.skins
    }

    pub fn events(&self) -> &[EventData] {
        &self.events
    }

    pub fn animations(&self) -> &[Arc<Animation>] {
        &self.animations
    }

    pub fn physics_constraints(&self) -> &[PhysicsConstraintData] {
        &self.physics_constraints
    }

    pub fn find_bone(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }

    pub fn find_slot(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.name == name)
    }

    pub fn skin(&self, name: &str) -> Option<&Skin> {
        self.skins.iter().find(|s| s.name == name)
    }

    pub fn default_skin(&self) -> Option<&Skin> {
        self.skin("default")
    }

    pub fn event(&self, name: &str) -> Option<&EventData> {
        self.events.iter().find(|e| e.name == name)
    }

    pub fn find_animation(&self, name: &str) -> Option<usize> {
        self.animation_index.get(name).copied()
    }

    pub fn animation(&self, name: &str) -> Option<&Arc<Animation>> {
        self.animations.get(self.find_animation(name)?)
    }

    /// Looks up `name` for `slot` in `skin`, falling back to the default skin.
    pub fn attachment(&self, skin: Option<&str>, slot: usize, name: &str) -> Option<&Attachment> {
        skin.and_then(|s| self.skin(s))
            .and_then(|s| s.attachment(slot, name))
            .or_else(|| self.default_skin()?.attachment(slot, name))
    }
}
