use crate::{
    Animation, AnimationState, AnimationStateData, Attachment, AttachmentKey, AttachmentTimeline,
    BoneData, BoneTimeline, Keyframe, RegionAttachment, Skeleton, SkeletonData,
    SkeletonDataBuilder, SlotData, TrackEventKind,
};
use std::sync::Arc;

fn assert_approx(actual: f32, expected: f32) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= 1.0e-4,
        "expected {expected}, got {actual} (diff {diff})"
    );
}

fn constant(name: &str, timeline: BoneTimeline) -> Animation {
    let mut animation = Animation::new(name, 1.0);
    animation.bone_timelines.push(timeline);
    animation
}

fn show(name: &str, attachment: &str) -> Animation {
    let mut animation = Animation::new(name, 1.0);
    animation.attachment_timelines.push(AttachmentTimeline {
        slot: 0,
        frames: vec![AttachmentKey {
            time: 0.0,
            name: Some(attachment.to_string()),
        }],
    });
    animation
}

/// Bone 0 is keyed by `lift` (rotation 40) and `raise` (rotation 100). Only `lift` moves it.
fn rig() -> Arc<SkeletonData> {
    let mut builder = SkeletonDataBuilder::new();
    builder.add_bone(BoneData::new("root", None));
    let slot = builder.add_slot(SlotData::new("badge", 0));
    for name in ["a", "b"] {
        builder.skin_mut("default").set_attachment(
            slot,
            name,
            Attachment::Region(RegionAttachment::new(name, 4.0, 4.0)),
        );
    }

    let mut lift = constant(
        "lift",
        BoneTimeline::Rotate {
            bone: 0,
            frames: vec![Keyframe::new(0.0, 40.0)],
        },
    );
    lift.bone_timelines.push(BoneTimeline::Translate {
        bone: 0,
        frames: vec![Keyframe::new(0.0, [10.0, 0.0])],
    });
    builder.add_animation(lift);
    builder.add_animation(constant(
        "raise",
        BoneTimeline::Rotate {
            bone: 0,
            frames: vec![Keyframe::new(0.0, 100.0)],
        },
    ));
    builder.add_animation(constant(
        "drop",
        BoneTimeline::Rotate {
            bone: 0,
            frames: vec![Keyframe::new(0.0, -60.0)],
        },
    ));
    builder.add_animation(show("show-a", "a"));
    builder.add_animation(show("show-b", "b"));
    builder.build().unwrap()
}

fn setup(mix: f32) -> (AnimationState, Skeleton) {
    let data = rig();
    let mut state_data = AnimationStateData::new(Arc::clone(&data));
    state_data.set_mix("lift", "raise", mix).unwrap();
    state_data.default_mix = mix;
    (
        AnimationState::new(Arc::new(state_data)),
        Skeleton::new(data),
    )
}

fn rotation(state: &AnimationState, skeleton: &mut Skeleton) -> f32 {
    state.apply(skeleton).unwrap();
    skeleton.bone(0).unwrap().rotation
}

#[test]
fn crossfade_moves_from_old_pose_to_new_pose() {
    let (mut state, mut skeleton) = setup(1.0);
    state.set_animation(0, "lift", true).unwrap();
    state.update(0.1);
    assert_approx(rotation(&state, &mut skeleton), 40.0);

    let entry = state.set_animation(0, "raise", true).unwrap();
    assert_eq!(entry.mix_duration, 1.0);
    assert_eq!(entry.mixing_from().unwrap().animation_name(), "lift");
    assert_approx(rotation(&state, &mut skeleton), 40.0);

    let mut previous = 40.0;
    for _ in 0..4 {
        state.update(0.25);
        let mix = state.current(0).unwrap().mix_fraction();
        let value = rotation(&state, &mut skeleton);
        assert_approx(value, 40.0 + 60.0 * mix);
        assert!(value >= previous);
        previous = value;
    }
    assert_approx(previous, 100.0);
    assert!(state.current(0).unwrap().mixing_from().is_none());
}

#[test]
fn property_only_keyed_by_outgoing_fades_to_setup() {
    let (mut state, mut skeleton) = setup(1.0);
    state.set_animation(0, "lift", true).unwrap();
    state.set_animation(0, "raise", true).unwrap();
    state.update(0.25);

    state.apply(&mut skeleton).unwrap();
    assert_approx(skeleton.bone(0).unwrap().x, 7.5);

    state.update(1.0);
    state.apply(&mut skeleton).unwrap();
    assert_approx(skeleton.bone(0).unwrap().x, 0.0);
}

#[test]
fn zero_mix_switches_immediately_and_ends_previous() {
    let (mut state, mut skeleton) = setup(0.0);
    state.set_animation(0, "lift", true).unwrap();
    state.set_animation(0, "raise", true).unwrap();
    assert_approx(rotation(&state, &mut skeleton), 100.0);

    state.update(0.01);
    assert!(state.current(0).unwrap().mixing_from().is_none());
    let ended: Vec<_> = state
        .drain_events()
        .filter(|e| e.kind == TrackEventKind::End)
        .map(|e| e.animation)
        .collect();
    assert_eq!(ended, ["lift"]);
}

#[test]
fn interrupted_crossfade_chains_entries() {
    let (mut state, mut skeleton) = setup(1.0);
    state.set_animation(0, "lift", true).unwrap();
    state.set_animation(0, "raise", true).unwrap();
    state.update(0.5);
    state.set_animation(0, "drop", true).unwrap();

    let current = state.current(0).unwrap();
    let middle = current.mixing_from().unwrap();
    assert_eq!(middle.animation_name(), "raise");
    assert_eq!(middle.mixing_from().unwrap().animation_name(), "lift");

    // raise over lift at half mix gives 70; drop has not faded in yet.
    assert_approx(rotation(&state, &mut skeleton), 70.0);

    state.update(0.5);
    let value = rotation(&state, &mut skeleton);
    assert!(value < 70.0 && value > -60.0, "rotation {value}");

    state.update(1.0);
    assert!(state.current(0).unwrap().mixing_from().is_none());
    assert_approx(rotation(&state, &mut skeleton), -60.0);
}

#[test]
fn empty_animation_mixes_out_and_clears_track() {
    let (mut state, mut skeleton) = setup(0.0);
    state.set_animation(0, "lift", true).unwrap();
    state.update(0.1);
    state.set_empty_animation(0, 1.0);

    state.update(0.5);
    assert_approx(rotation(&state, &mut skeleton), 20.0);

    state.update(0.6);
    assert!(state.current(0).is_none());
    assert_approx(rotation(&state, &mut skeleton), 0.0);
}

#[test]
fn attachments_follow_incoming_entry_during_mix() {
    let (mut state, mut skeleton) = setup(1.0);
    state.set_animation(0, "show-a", true).unwrap();
    state.update(0.1);
    state.apply(&mut skeleton).unwrap();
    assert_eq!(skeleton.slot(0).unwrap().attachment_name(), Some("a"));

    state.set_animation(0, "show-b", true).unwrap();
    state.update(0.1);
    state.apply(&mut skeleton).unwrap();
    assert_eq!(skeleton.slot(0).unwrap().attachment_name(), Some("b"));
}

#[test]
fn lower_track_shows_through_partial_alpha() {
    let (mut state, mut skeleton) = setup(0.0);
    state.set_animation(0, "lift", true).unwrap();
    state.set_animation(1, "raise", true).unwrap().alpha = 0.5;
    state.update(0.1);

    assert_approx(rotation(&state, &mut skeleton), 70.0);
}
