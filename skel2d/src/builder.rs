use crate::{
    Animation, Attachment, BoneData, Color, Error, EventData, LinkedMeshAttachment,
    MeshGeometry, MeshVertices, PhysicsConstraintData, SkeletonData, Skin, SlotData,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A linked mesh waiting for its parent mesh to be resolved.
#[derive(Clone, Debug)]
pub struct LinkedMeshRef {
    pub name: String,
    pub path: String,
    pub color: Color,
    /// Skin holding the parent mesh. `None` means the skin the linked mesh is added to.
    pub parent_skin: Option<String>,
    pub parent: String,
}

#[derive(Clone, Debug)]
struct PendingLinkedMesh {
    skin: String,
    slot: usize,
    mesh: LinkedMeshRef,
}

/// Mutable staging area for [`SkeletonData`]. `build` validates everything once.
#[derive(Clone, Debug, Default)]
pub struct SkeletonDataBuilder {
    pub version: Option<String>,
    pub bones: Vec<BoneData>,
    pub slots: Vec<SlotData>,
    pub skins: Vec<Skin>,
    pub events: Vec<EventData>,
    pub animations: Vec<Animation>,
    pub physics_constraints: Vec<PhysicsConstraintData>,
    linked_meshes: Vec<PendingLinkedMesh>,
}

impl SkeletonDataBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bone(&mut self, bone: BoneData) -> usize {
        self.bones.push(bone);
        self.bones.len() - 1
    }

    pub fn add_slot(&mut self, slot: SlotData) -> usize {
        self.slots.push(slot);
        self.slots.len() - 1
    }

    /// Returns the skin named `name`, creating it when missing.
    pub fn skin_mut(&mut self, name: &str) -> &mut Skin {
        let index = match self.skins.iter().position(|s| s.name == name) {
            Some(index) => index,
            None => {
                self.skins.push(Skin::new(name));
                self.skins.len() - 1
            }
        };
        &mut self.skins[index]
    }

    pub fn add_linked_mesh(&mut self, skin: &str, slot: usize, mesh: LinkedMeshRef) {
        self.linked_meshes.push(PendingLinkedMesh {
            skin: skin.to_string(),
            slot,
            mesh,
        });
    }

    pub fn add_animation(&mut self, animation: Animation) {
        self.animations.push(animation);
    }

    pub fn build(mut self) -> Result<Arc<SkeletonData>, Error> {
        let update_order = bone_update_order(&self.bones)?;
        check_unique("bone", self.bones.iter().map(|b| b.name.as_str()))?;
        check_unique("slot", self.slots.iter().map(|s| s.name.as_str()))?;
        check_unique("skin", self.skins.iter().map(|s| s.name.as_str()))?;
        check_unique("event", self.events.iter().map(|e| e.name.as_str()))?;
        check_unique("animation", self.animations.iter().map(|a| a.name.as_str()))?;

        for slot in &self.slots {
            if slot.bone >= self.bones.len() {
                return Err(Error::invalid_data(format!(
                    "slot '{}' references bone index {} (bone count {})",
                    slot.name,
                    slot.bone,
                    self.bones.len()
                )));
            }
        }

        self.resolve_linked_meshes()?;
        for skin in &self.skins {
            check_skin(skin, self.slots.len(), self.bones.len())?;
        }

        for constraint in &self.physics_constraints {
            if constraint.bone >= self.bones.len() {
                return Err(Error::invalid_data(format!(
                    "physics constraint '{}' references bone index {}",
                    constraint.name, constraint.bone
                )));
            }
            if !(constraint.step > 0.0 && constraint.step.is_finite()) {
                return Err(Error::invalid_data(format!(
                    "physics constraint '{}' has non-positive step {}",
                    constraint.name, constraint.step
                )));
            }
        }

        let mut animation_index = HashMap::with_capacity(self.animations.len());
        let mut animations = Vec::with_capacity(self.animations.len());
        for (index, mut animation) in self.animations.into_iter().enumerate() {
            check_animation(&animation, self.bones.len(), &self.slots)?;
            animation
                .events
                .sort_by(|a, b| a.time.total_cmp(&b.time));
            animation.index_properties();
            animation_index.insert(animation.name.clone(), index);
            animations.push(Arc::new(animation));
        }

        log::debug!(
            "built skeleton data: {} bones, {} slots, {} skins, {} animations",
            self.bones.len(),
            self.slots.len(),
            self.skins.len(),
            animations.len()
        );

        Ok(Arc::new(SkeletonData {
            version: self.version,
            bones: self.bones,
            update_order,
            slots: self.slots,
            skins: self.skins,
            events: self.events,
            animations,
            physics_constraints: self.physics_constraints,
            animation_index,
        }))
    }

    fn resolve_linked_meshes(&mut self) -> Result<(), Error> {
        for pending in std::mem::take(&mut self.linked_meshes) {
            let parent_skin = pending.mesh.parent_skin.as_deref().unwrap_or(&pending.skin);
            let geometry = self
                .skins
                .iter()
                .find(|s| s.name == parent_skin)
                .and_then(|s| s.attachment(pending.slot, &pending.mesh.parent))
                .and_then(Attachment::mesh_geometry)
                .cloned()
                .ok_or_else(|| {
                    Error::invalid_data(format!(
                        "linked mesh '{}' has no parent mesh '{}' in skin '{}'",
                        pending.mesh.name, pending.mesh.parent, parent_skin
                    ))
                })?;

            let LinkedMeshRef {
                name,
                path,
                color,
                parent_skin,
                parent,
            } = pending.mesh;
            let attachment = Attachment::LinkedMesh(LinkedMeshAttachment {
                name: name.clone(),
                path,
                color,
                parent,
                parent_skin,
                geometry,
            });
            self.skin_mut(&pending.skin)
                .set_attachment(pending.slot, name, attachment);
        }
        Ok(())
    }
}

/// Orders bones parent-first and rejects malformed hierarchies.
fn bone_update_order(bones: &[BoneData]) -> Result<Vec<usize>, Error> {
    if bones.is_empty() {
        return Err(Error::InvalidHierarchy {
            bone: String::new(),
            message: "skeleton has no bones".to_string(),
        });
    }

    let mut children = vec![Vec::new(); bones.len()];
    let mut roots = Vec::new();
    for (index, bone) in bones.iter().enumerate() {
        match bone.parent {
            None => roots.push(index),
            Some(parent) if parent == index => {
                return Err(Error::InvalidHierarchy {
                    bone: bone.name.clone(),
                    message: "bone is its own parent".to_string(),
                });
            }
            Some(parent) if parent >= bones.len() => {
                return Err(Error::InvalidHierarchy {
                    bone: bone.name.clone(),
                    message: format!(
                        "parent index {parent} out of range (bone count {})",
                        bones.len()
                    ),
                });
            }
            Some(parent) => children[parent].push(index),
        }
    }

    // Every bone has at most one parent, so a walk from the roots visits each reachable bone
    // once. Whatever is left over hangs off a cycle.
    let mut order = Vec::with_capacity(bones.len());
    let mut stack: Vec<usize> = roots.iter().rev().copied().collect();
    while let Some(index) = stack.pop() {
        order.push(index);
        stack.extend(children[index].iter().rev().copied());
    }

    if order.len() != bones.len() {
        let visited: HashSet<usize> = order.iter().copied().collect();
        let bone = (0..bones.len())
            .find(|i| !visited.contains(i))
            .map(|i| bones[i].name.clone())
            .unwrap_or_default();
        return Err(Error::InvalidHierarchy {
            bone,
            message: "bone is part of a parent cycle".to_string(),
        });
    }
    Ok(order)
}

fn check_unique<'a>(kind: &str, names: impl Iterator<Item = &'a str>) -> Result<(), Error> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(Error::invalid_data(format!("duplicate {kind} name '{name}'")));
        }
    }
    Ok(())
}

fn check_vertices(
    vertices: &MeshVertices,
    bone_count: usize,
    context: impl Fn() -> String,
) -> Result<(), Error> {
    if let MeshVertices::Weighted(weights) = vertices {
        for weight in weights.iter().flatten() {
            if weight.bone >= bone_count {
                return Err(Error::invalid_data(format!(
                    "{}: weighted vertex references bone index {}",
                    context(),
                    weight.bone
                )));
            }
        }
    }
    Ok(())
}

fn check_geometry(
    geometry: &MeshGeometry,
    bone_count: usize,
    context: impl Fn() -> String,
) -> Result<(), Error> {
    check_vertices(&geometry.vertices, bone_count, &context)?;
    let count = geometry.vertices.len();
    if geometry.uvs.len() != count {
        return Err(Error::invalid_data(format!(
            "{}: {} uvs for {} vertices",
            context(),
            geometry.uvs.len(),
            count
        )));
    }
    if geometry.triangles.len() % 3 != 0 {
        return Err(Error::invalid_data(format!(
            "{}: triangle index count {} is not a multiple of 3",
            context(),
            geometry.triangles.len()
        )));
    }
    if let Some(&bad) = geometry.triangles.iter().find(|&&i| usize::from(i) >= count) {
        return Err(Error::invalid_data(format!(
            "{}: triangle index {bad} out of range",
            context()
        )));
    }
    Ok(())
}

fn check_skin(skin: &Skin, slot_count: usize, bone_count: usize) -> Result<(), Error> {
    if skin.slot_capacity() > slot_count {
        return Err(Error::invalid_data(format!(
            "skin '{}' references slot index {} (slot count {slot_count})",
            skin.name,
            skin.slot_capacity() - 1
        )));
    }
    for (slot, name, attachment) in skin.attachments() {
        let context = || format!("skin '{}', slot {slot}, attachment '{name}'", skin.name);
        match attachment {
            Attachment::Region(_) => {}
            Attachment::Mesh(mesh) => check_geometry(&mesh.geometry, bone_count, context)?,
            Attachment::LinkedMesh(_) => {}
            Attachment::Clipping(clip) => {
                check_vertices(&clip.vertices, bone_count, &context)?;
                if clip.vertices.len() < 3 {
                    return Err(Error::invalid_data(format!(
                        "{}: clipping polygon needs at least 3 vertices",
                        context()
                    )));
                }
                if clip.end_slot.is_some_and(|end| end >= slot_count) {
                    return Err(Error::invalid_data(format!(
                        "{}: clipping end slot out of range",
                        context()
                    )));
                }
            }
        }
    }
    Ok(())
}

fn check_sorted(times: impl Iterator<Item = f32>, context: impl Fn() -> String) -> Result<(), Error> {
    let mut last = f32::NEG_INFINITY;
    for time in times {
        if !time.is_finite() || time < last {
            return Err(Error::invalid_data(format!(
                "{}: key times must be finite and ascending",
                context()
            )));
        }
        last = time;
    }
    Ok(())
}

fn check_animation(animation: &Animation, bone_count: usize, slots: &[SlotData]) -> Result<(), Error> {
    let slot_count = slots.len();
    if !(animation.duration >= 0.0 && animation.duration.is_finite()) {
        return Err(Error::invalid_data(format!(
            "animation '{}' has invalid duration {}",
            animation.name, animation.duration
        )));
    }
    for timeline in &animation.bone_timelines {
        if timeline.bone() >= bone_count {
            return Err(Error::invalid_data(format!(
                "animation '{}' keys bone index {}",
                animation.name,
                timeline.bone()
            )));
        }
        check_sorted(timeline.key_times().into_iter(), || {
            format!("animation '{}', {:?}", animation.name, timeline.property())
        })?;
    }
    for timeline in &animation.attachment_timelines {
        if timeline.slot >= slot_count {
            return Err(Error::invalid_data(format!(
                "animation '{}' keys attachments of slot index {}",
                animation.name, timeline.slot
            )));
        }
        check_sorted(timeline.frames.iter().map(|f| f.time), || {
            format!("animation '{}', attachment slot {}", animation.name, timeline.slot)
        })?;
    }
    for timeline in &animation.color_timelines {
        if timeline.slot >= slot_count {
            return Err(Error::invalid_data(format!(
                "animation '{}' keys color of slot index {}",
                animation.name, timeline.slot
            )));
        }
        check_sorted(timeline.frames.iter().map(|f| f.time), || {
            format!("animation '{}', color slot {}", animation.name, timeline.slot)
        })?;
    }
    for timeline in &animation.dark_color_timelines {
        if !slots.get(timeline.slot).is_some_and(|s| s.dark_color.is_some()) {
            return Err(Error::invalid_data(format!(
                "animation '{}' keys dark color of slot index {} without a setup dark color",
                animation.name, timeline.slot
            )));
        }
        check_sorted(timeline.frames.iter().map(|f| f.time), || {
            format!("animation '{}', dark color slot {}", animation.name, timeline.slot)
        })?;
    }
    Ok(())
}
