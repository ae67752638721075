use crate::runtime::physics::PhysicsState;
use crate::{
    Attachment, BlendMode, BoneData, Color, Convention, Error, Inherit, SkeletonData, SlotData,
    default_convention,
};
use std::sync::Arc;

/// What `update_world_transform` does with physics constraints.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Physics {
    /// Physics state is neither stepped nor applied.
    None,
    /// Physics state restarts from the current pose.
    Reset,
    /// Physics state is stepped to the skeleton's time and applied.
    Update,
}

/// Whether world transforms reflect the current local pose.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PoseState {
    /// Local pose changed since the last `update_world_transform`.
    Stale,
    /// World transforms are current.
    Posed,
}

#[derive(Clone, Debug)]
pub struct Bone {
    pub parent: Option<usize>,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub shear_x: f32,
    pub shear_y: f32,
    pub inherit: Inherit,

    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub world_x: f32,
    pub world_y: f32,
}

impl Bone {
    fn from_data(data: &BoneData) -> Self {
        Self {
            parent: data.parent,
            x: data.x,
            y: data.y,
            rotation: data.rotation,
            scale_x: data.scale_x,
            scale_y: data.scale_y,
            shear_x: data.shear_x,
            shear_y: data.shear_y,
            inherit: data.inherit,
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            world_x: 0.0,
            world_y: 0.0,
        }
    }

    fn set_to_setup_pose(&mut self, data: &BoneData) {
        self.x = data.x;
        self.y = data.y;
        self.rotation = data.rotation;
        self.scale_x = data.scale_x;
        self.scale_y = data.scale_y;
        self.shear_x = data.shear_x;
        self.shear_y = data.shear_y;
        self.inherit = data.inherit;
    }

    pub fn local_to_world(&self, x: f32, y: f32) -> [f32; 2] {
        [
            self.a * x + self.b * y + self.world_x,
            self.c * x + self.d * y + self.world_y,
        ]
    }

    /// Inverse of [`Bone::local_to_world`]. A degenerate basis maps everything to the origin.
    pub fn world_to_local(&self, x: f32, y: f32) -> [f32; 2] {
        let det = self.a * self.d - self.b * self.c;
        if det.abs() <= f32::EPSILON {
            return [0.0, 0.0];
        }
        let inv = 1.0 / det;
        let dx = x - self.world_x;
        let dy = y - self.world_y;
        [
            (dx * self.d - dy * self.b) * inv,
            (dy * self.a - dx * self.c) * inv,
        ]
    }

    pub fn world_rotation_x(&self) -> f32 {
        self.c.atan2(self.a).to_degrees()
    }

    pub fn world_scale_x(&self) -> f32 {
        (self.a * self.a + self.c * self.c).sqrt()
    }

    pub fn world_scale_y(&self) -> f32 {
        (self.b * self.b + self.d * self.d).sqrt()
    }

    #[cfg(feature = "glam")]
    pub fn world_affine(&self) -> glam::Affine2 {
        glam::Affine2::from_cols(
            glam::Vec2::new(self.a, self.c),
            glam::Vec2::new(self.b, self.d),
            glam::Vec2::new(self.world_x, self.world_y),
        )
    }

    fn world(&self) -> ParentWorld {
        ParentWorld {
            a: self.a,
            b: self.b,
            c: self.c,
            d: self.d,
            x: self.world_x,
            y: self.world_y,
        }
    }

    fn local_basis(&self) -> (f32, f32, f32, f32) {
        let rx = (self.rotation + self.shear_x).to_radians();
        let ry = (self.rotation + 90.0 + self.shear_y).to_radians();
        (
            rx.cos() * self.scale_x,
            ry.cos() * self.scale_y,
            rx.sin() * self.scale_x,
            ry.sin() * self.scale_y,
        )
    }

    fn update_root(&mut self, skeleton_x: f32, skeleton_y: f32, sx: f32, sy: f32) {
        let (la, lb, lc, ld) = self.local_basis();
        self.a = la * sx;
        self.b = lb * sx;
        self.c = lc * sy;
        self.d = ld * sy;
        self.world_x = self.x * sx + skeleton_x;
        self.world_y = self.y * sy + skeleton_y;
    }

    fn update_child(&mut self, parent: ParentWorld, sx: f32, sy: f32) {
        let ParentWorld {
            a: mut pa,
            b: mut pb,
            c: mut pc,
            d: mut pd,
            ..
        } = parent;
        self.world_x = pa * self.x + pb * self.y + parent.x;
        self.world_y = pc * self.x + pd * self.y + parent.y;

        match self.inherit {
            Inherit::Normal => {
                let (la, lb, lc, ld) = self.local_basis();
                self.a = pa * la + pb * lc;
                self.b = pa * lb + pb * ld;
                self.c = pc * la + pd * lc;
                self.d = pc * lb + pd * ld;
                return;
            }
            Inherit::OnlyTranslation => {
                let (la, lb, lc, ld) = self.local_basis();
                self.a = la;
                self.b = lb;
                self.c = lc;
                self.d = ld;
            }
            Inherit::NoRotationOrReflection => {
                pa /= sx;
                pc /= sy;
                let mut s = pa * pa + pc * pc;
                let parent_rotation;
                if s > 0.0001 {
                    s = (pa * pd / sy - pb / sx * pc).abs() / s;
                    pb = pc * s;
                    pd = pa * s;
                    parent_rotation = pc.atan2(pa).to_degrees();
                } else {
                    pa = 0.0;
                    pc = 0.0;
                    parent_rotation = 90.0 - pd.atan2(pb).to_degrees();
                }
                let rx = (self.rotation + self.shear_x - parent_rotation).to_radians();
                let ry = (self.rotation + self.shear_y - parent_rotation + 90.0).to_radians();
                let la = rx.cos() * self.scale_x;
                let lb = ry.cos() * self.scale_y;
                let lc = rx.sin() * self.scale_x;
                let ld = ry.sin() * self.scale_y;
                self.a = pa * la - pb * lc;
                self.b = pa * lb - pb * ld;
                self.c = pc * la + pd * lc;
                self.d = pc * lb + pd * ld;
            }
            Inherit::NoScale => {
                let r = self.rotation.to_radians();
                let (sin, cos) = r.sin_cos();
                let mut za = (pa * cos + pb * sin) / sx;
                let mut zc = (pc * cos + pd * sin) / sy;
                let len = (za * za + zc * zc).sqrt();
                if len > 0.00001 {
                    za /= len;
                    zc /= len;
                }
                let mut s = (za * za + zc * zc).sqrt();
                if (pa * pd - pb * pc < 0.0) != ((sx < 0.0) != (sy < 0.0)) {
                    s = -s;
                }
                let zr = std::f32::consts::FRAC_PI_2 + zc.atan2(za);
                let zb = zr.cos() * s;
                let zd = zr.sin() * s;
                let shear_x = self.shear_x.to_radians();
                let shear_y = (90.0 + self.shear_y).to_radians();
                let la = shear_x.cos() * self.scale_x;
                let lb = shear_y.cos() * self.scale_y;
                let lc = shear_x.sin() * self.scale_x;
                let ld = shear_y.sin() * self.scale_y;
                self.a = za * la + zb * lc;
                self.b = za * lb + zb * ld;
                self.c = zc * la + zd * lc;
                self.d = zc * lb + zd * ld;
            }
        }

        // Modes that drop parent scale still honour the skeleton's own scale.
        self.a *= sx;
        self.b *= sx;
        self.c *= sy;
        self.d *= sy;
    }
}

#[derive(Copy, Clone, Debug)]
struct ParentWorld {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    x: f32,
    y: f32,
}

#[derive(Clone, Debug)]
pub struct Slot {
    pub bone: usize,
    pub color: Color,
    /// `None` for single-color slots.
    pub dark_color: Option<Color>,
    pub blend: BlendMode,
    pub(crate) attachment: Option<String>,
}

impl Slot {
    fn from_data(data: &SlotData) -> Self {
        Self {
            bone: data.bone,
            color: data.color,
            dark_color: data.dark_color,
            blend: data.blend,
            attachment: data.attachment.clone(),
        }
    }

    pub fn attachment_name(&self) -> Option<&str> {
        self.attachment.as_deref()
    }
}

/// A posable instance of shared [`SkeletonData`].
#[derive(Clone, Debug)]
pub struct Skeleton {
    data: Arc<SkeletonData>,
    pub(crate) bones: Vec<Bone>,
    pub(crate) slots: Vec<Slot>,
    draw_order: Vec<usize>,
    skin: Option<String>,
    pub color: Color,
    x: f32,
    y: f32,
    scale_x: f32,
    scale_y: f32,
    convention: Convention,
    time: f32,
    physics: Vec<PhysicsState>,
    physics_by_bone: Vec<Option<usize>>,
    pose: PoseState,
}

impl Skeleton {
    /// Creates an instance in the setup pose using the process-wide [`Convention`].
    pub fn new(data: Arc<SkeletonData>) -> Self {
        Self::with_convention(data, default_convention())
    }

    pub fn with_convention(data: Arc<SkeletonData>, convention: Convention) -> Self {
        let bones = data.bones().iter().map(Bone::from_data).collect();
        let slots = data.slots().iter().map(Slot::from_data).collect();
        let draw_order = (0..data.slots().len()).collect();

        let mut physics_by_bone = vec![None; data.bones().len()];
        for (index, constraint) in data.physics_constraints().iter().enumerate() {
            physics_by_bone[constraint.bone] = Some(index);
        }
        let physics = vec![PhysicsState::default(); data.physics_constraints().len()];

        Self {
            data,
            bones,
            slots,
            draw_order,
            skin: None,
            color: Color::WHITE,
            x: 0.0,
            y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            convention,
            time: 0.0,
            physics,
            physics_by_bone,
            pose: PoseState::Stale,
        }
    }

    pub fn data(&self) -> &Arc<SkeletonData> {
        &self.data
    }

    pub fn convention(&self) -> Convention {
        self.convention
    }

    pub fn pose_state(&self) -> PoseState {
        self.pose
    }

    pub fn is_posed(&self) -> bool {
        self.pose == PoseState::Posed
    }

    pub(crate) fn mark_stale(&mut self) {
        self.pose = PoseState::Stale;
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    pub fn bone(&self, index: usize) -> Option<&Bone> {
        self.bones.get(index)
    }

    /// Mutable access to a bone's local pose. Marks the pose stale.
    pub fn bone_mut(&mut self, index: usize) -> Option<&mut Bone> {
        self.pose = PoseState::Stale;
        self.bones.get_mut(index)
    }

    pub fn find_bone(&self, name: &str) -> Option<usize> {
        self.data.find_bone(name)
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)
    }

    pub fn slot_mut(&mut self, index: usize) -> Option<&mut Slot> {
        self.slots.get_mut(index)
    }

    pub fn find_slot(&self, name: &str) -> Option<usize> {
        self.data.find_slot(name)
    }

    pub fn draw_order(&self) -> &[usize] {
        &self.draw_order
    }

    /// Replaces the draw order. `order` must be a permutation of the slot indices.
    pub fn set_draw_order(&mut self, order: Vec<usize>) -> Result<(), Error> {
        let mut seen = vec![false; self.slots.len()];
        let valid = order.len() == self.slots.len()
            && order
                .iter()
                .all(|&i| i < seen.len() && !std::mem::replace(&mut seen[i], true));
        if !valid {
            return Err(Error::InvalidValue {
                message: format!("draw order {order:?} is not a permutation of slot indices"),
            });
        }
        self.draw_order = order;
        Ok(())
    }

    pub fn skin(&self) -> Option<&str> {
        self.skin.as_deref()
    }

    pub fn set_skin(&mut self, name: Option<&str>) -> Result<(), Error> {
        if let Some(name) = name {
            if self.data.skin(name).is_none() {
                return Err(Error::UnknownSkin {
                    name: name.to_string(),
                });
            }
        }
        self.skin = name.map(str::to_string);
        Ok(())
    }

    /// The attachment currently shown by `slot`, resolved through the active skin.
    pub fn slot_attachment(&self, slot: usize) -> Option<&Attachment> {
        let name = self.slots.get(slot)?.attachment.as_deref()?;
        self.data.attachment(self.skin.as_deref(), slot, name)
    }

    pub fn set_attachment(&mut self, slot_name: &str, attachment: Option<&str>) -> Result<(), Error> {
        let slot = self.find_slot(slot_name).ok_or_else(|| Error::InvalidValue {
            message: format!("unknown slot '{slot_name}'"),
        })?;
        if let Some(name) = attachment {
            if self.data.attachment(self.skin.as_deref(), slot, name).is_none() {
                return Err(Error::InvalidValue {
                    message: format!("slot '{slot_name}' has no attachment '{name}'"),
                });
            }
        }
        self.slots[slot].attachment = attachment.map(str::to_string);
        Ok(())
    }

    pub(crate) fn set_slot_attachment(&mut self, slot: usize, attachment: Option<&str>) {
        if let Some(s) = self.slots.get_mut(slot) {
            s.attachment = attachment.map(str::to_string);
        }
    }

    pub fn x(&self) -> f32 {
        self.x
    }

    pub fn y(&self) -> f32 {
        self.y
    }

    pub fn set_position(&mut self, x: f32, y: f32) {
        self.x = x;
        self.y = y;
        self.pose = PoseState::Stale;
    }

    pub fn scale_x(&self) -> f32 {
        self.scale_x
    }

    pub fn scale_y(&self) -> f32 {
        self.scale_y
    }

    pub fn set_scale(&mut self, scale_x: f32, scale_y: f32) {
        self.scale_x = scale_x;
        self.scale_y = scale_y;
        self.pose = PoseState::Stale;
    }

    /// Clock used by physics constraints.
    pub fn time(&self) -> f32 {
        self.time
    }

    /// Advances the physics clock.
    pub fn update(&mut self, delta: f32) {
        if delta.is_finite() {
            self.time += delta;
        }
    }

    pub fn set_to_setup_pose(&mut self) {
        self.set_bones_to_setup_pose();
        self.set_slots_to_setup_pose();
    }

    pub fn set_bones_to_setup_pose(&mut self) {
        for (bone, data) in self.bones.iter_mut().zip(self.data.bones()) {
            bone.set_to_setup_pose(data);
        }
        self.pose = PoseState::Stale;
    }

    /// Resets slot colors, attachments and the draw order.
    pub fn set_slots_to_setup_pose(&mut self) {
        self.reset_slots();
        self.draw_order = (0..self.slots.len()).collect();
    }

    pub(crate) fn reset_slots(&mut self) {
        for (slot, data) in self.slots.iter_mut().zip(self.data.slots()) {
            slot.color = data.color;
            slot.dark_color = data.dark_color;
            slot.blend = data.blend;
            slot.attachment = data.attachment.clone();
        }
    }

    /// Recomputes every bone's world transform, parents first.
    pub fn update_world_transform(&mut self, physics: Physics) {
        let data = Arc::clone(&self.data);
        let sx = self.scale_x;
        let sy = self.scale_y * self.convention.y_sign();

        for &index in data.update_order() {
            match data.bones()[index].parent {
                None => self.bones[index].update_root(self.x, self.y, sx, sy),
                Some(parent) => {
                    let parent = self.bones[parent].world();
                    self.bones[index].update_child(parent, sx, sy);
                }
            }

            if let Some(constraint) = self.physics_by_bone[index] {
                self.physics[constraint].apply(
                    &data.physics_constraints()[constraint],
                    &mut self.bones[index],
                    physics,
                    self.time,
                );
            }
        }

        self.pose = PoseState::Posed;
    }
}
