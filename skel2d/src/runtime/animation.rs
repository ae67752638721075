use crate::{
    Animation, AttachmentKey, Bone, BoneData, BoneTimeline, Color, Keyframe, Property, Skeleton,
};
use std::sync::Arc;

/// How sampled values combine with the pose already on the skeleton.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum MixBlend {
    /// Interpolate from the current value toward the sampled one by the weight.
    #[default]
    Replace,
    /// Add the sampled offset from setup, scaled by the weight.
    Add,
}

/// Applies `animation` at `time` onto `skeleton` with a single weight.
///
/// Non-looping time clamps to the duration, looping time wraps.
pub fn apply_animation(
    animation: &Animation,
    skeleton: &mut Skeleton,
    time: f32,
    looped: bool,
    alpha: f32,
    blend: MixBlend,
) {
    let time = animation_time(animation.duration, time, looped);
    apply_animation_at(animation, skeleton, time, blend, |_| alpha, true);
    skeleton.mark_stale();
}

pub(crate) fn animation_time(duration: f32, time: f32, looped: bool) -> f32 {
    if looped && duration > 0.0 {
        time.rem_euclid(duration)
    } else {
        time.min(duration)
    }
}

pub(crate) trait Interpolate: Copy {
    fn interpolate(self, to: Self, t: f32) -> Self;
}

impl Interpolate for f32 {
    fn interpolate(self, to: Self, t: f32) -> Self {
        self + (to - self) * t
    }
}

impl Interpolate for [f32; 2] {
    fn interpolate(self, to: Self, t: f32) -> Self {
        [
            self[0] + (to[0] - self[0]) * t,
            self[1] + (to[1] - self[1]) * t,
        ]
    }
}

impl Interpolate for Color {
    fn interpolate(self, to: Self, t: f32) -> Self {
        self.lerp(to, t)
    }
}

/// Value of a keyed channel at `time`, or `None` before the first key.
pub(crate) fn sample<T: Interpolate>(frames: &[Keyframe<T>], time: f32) -> Option<T> {
    let first = frames.first()?;
    if time < first.time {
        return None;
    }
    let next = frames.partition_point(|f| f.time <= time);
    let current = &frames[next - 1];
    let Some(after) = frames.get(next) else {
        return Some(current.value);
    };
    let span = after.time - current.time;
    if span <= 0.0 {
        return Some(after.value);
    }
    let p = ((time - current.time) / span).clamp(0.0, 1.0);
    Some(current.value.interpolate(after.value, current.curve.ease(p)))
}

fn sample_attachment(frames: &[AttachmentKey], time: f32) -> Option<&AttachmentKey> {
    let next = frames.partition_point(|f| f.time <= time);
    next.checked_sub(1).map(|i| &frames[i])
}

fn mix(current: f32, target: f32, weight: f32) -> f32 {
    if weight >= 1.0 {
        target
    } else {
        current + (target - current) * weight
    }
}

fn wrap_degrees(delta: f32) -> f32 {
    delta - 360.0 * (delta / 360.0).round()
}

fn blend_rotation(bone: &mut Bone, setup: &BoneData, value: f32, weight: f32, blend: MixBlend) {
    match blend {
        MixBlend::Replace if weight >= 1.0 => bone.rotation = setup.rotation + value,
        MixBlend::Replace => {
            let delta = wrap_degrees(setup.rotation + value - bone.rotation);
            bone.rotation += delta * weight;
        }
        MixBlend::Add => bone.rotation += value * weight,
    }
}

fn blend_pair(current: [&mut f32; 2], target: [f32; 2], offset: [f32; 2], weight: f32, blend: MixBlend) {
    for ((current, target), offset) in current.into_iter().zip(target).zip(offset) {
        *current = match blend {
            MixBlend::Replace => mix(*current, target, weight),
            MixBlend::Add => *current + offset * weight,
        };
    }
}

fn apply_bone_timeline(
    timeline: &BoneTimeline,
    bone: &mut Bone,
    setup: &BoneData,
    time: f32,
    weight: f32,
    blend: MixBlend,
) {
    match timeline {
        BoneTimeline::Rotate { frames, .. } => {
            if let Some(value) = sample(frames, time) {
                blend_rotation(bone, setup, value, weight, blend);
            }
        }
        BoneTimeline::Translate { frames, .. } => {
            if let Some([x, y]) = sample(frames, time) {
                blend_pair(
                    [&mut bone.x, &mut bone.y],
                    [setup.x + x, setup.y + y],
                    [x, y],
                    weight,
                    blend,
                );
            }
        }
        BoneTimeline::Scale { frames, .. } => {
            if let Some([x, y]) = sample(frames, time) {
                let target = [setup.scale_x * x, setup.scale_y * y];
                blend_pair(
                    [&mut bone.scale_x, &mut bone.scale_y],
                    target,
                    [target[0] - setup.scale_x, target[1] - setup.scale_y],
                    weight,
                    blend,
                );
            }
        }
        BoneTimeline::Shear { frames, .. } => {
            if let Some([x, y]) = sample(frames, time) {
                blend_pair(
                    [&mut bone.shear_x, &mut bone.shear_y],
                    [setup.shear_x + x, setup.shear_y + y],
                    [x, y],
                    weight,
                    blend,
                );
            }
        }
    }
}

/// Applies every timeline of `animation` at an already wrapped/clamped `time`.
///
/// `weight` gives the blend weight per keyed property. Attachment swaps are discrete and only
/// applied when `discrete` is set.
pub(crate) fn apply_animation_at(
    animation: &Animation,
    skeleton: &mut Skeleton,
    time: f32,
    blend: MixBlend,
    weight: impl Fn(Property) -> f32,
    discrete: bool,
) {
    let data = Arc::clone(skeleton.data());

    for timeline in &animation.bone_timelines {
        let w = weight(timeline.property());
        if w <= 0.0 {
            continue;
        }
        let index = timeline.bone();
        let (Some(bone), Some(setup)) = (skeleton.bones.get_mut(index), data.bones().get(index))
        else {
            continue;
        };
        apply_bone_timeline(timeline, bone, setup, time, w, blend);
    }

    for timeline in &animation.color_timelines {
        let w = weight(Property::Color(timeline.slot));
        if w <= 0.0 {
            continue;
        }
        let (Some(slot), Some(setup)) = (
            skeleton.slots.get_mut(timeline.slot),
            data.slots().get(timeline.slot),
        ) else {
            continue;
        };
        if let Some(target) = sample(&timeline.frames, time) {
            slot.color = match blend {
                MixBlend::Replace if w >= 1.0 => target,
                MixBlend::Replace => slot.color.lerp(target, w),
                MixBlend::Add => Color::new(
                    slot.color.r + (target.r - setup.color.r) * w,
                    slot.color.g + (target.g - setup.color.g) * w,
                    slot.color.b + (target.b - setup.color.b) * w,
                    slot.color.a + (target.a - setup.color.a) * w,
                ),
            };
        }
    }

    for timeline in &animation.dark_color_timelines {
        let w = weight(Property::DarkColor(timeline.slot));
        if w <= 0.0 {
            continue;
        }
        let (Some(slot), Some(setup)) = (
            skeleton.slots.get_mut(timeline.slot),
            data.slots().get(timeline.slot),
        ) else {
            continue;
        };
        let (Some(dark), Some(setup_dark)) = (slot.dark_color, setup.dark_color) else {
            continue;
        };
        if let Some(target) = sample(&timeline.frames, time) {
            slot.dark_color = Some(match blend {
                MixBlend::Replace if w >= 1.0 => target,
                MixBlend::Replace => dark.lerp(target, w),
                MixBlend::Add => Color::new(
                    dark.r + (target.r - setup_dark.r) * w,
                    dark.g + (target.g - setup_dark.g) * w,
                    dark.b + (target.b - setup_dark.b) * w,
                    1.0,
                ),
            });
        }
    }

    if discrete {
        for timeline in &animation.attachment_timelines {
            if weight(Property::Attachment(timeline.slot)) <= 0.0 {
                continue;
            }
            if let Some(key) = sample_attachment(&timeline.frames, time) {
                skeleton.set_slot_attachment(timeline.slot, key.name.as_deref());
            }
        }
    }
}
