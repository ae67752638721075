use crate::{
    Animation, AnimationState, AnimationStateData, BoneData, BoneTimeline, ErrorKind, Event,
    EventData, Keyframe, Skeleton, SkeletonData, SkeletonDataBuilder, TrackEventKind,
};
use std::sync::Arc;

fn assert_approx(actual: f32, expected: f32) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= 1.0e-4,
        "expected {expected}, got {actual} (diff {diff})"
    );
}

fn rotate(name: &str, duration: f32, keys: &[(f32, f32)]) -> Animation {
    let mut animation = Animation::new(name, duration);
    animation.bone_timelines.push(BoneTimeline::Rotate {
        bone: 0,
        frames: keys.iter().map(|&(t, v)| Keyframe::new(t, v)).collect(),
    });
    animation
}

fn rig() -> Arc<SkeletonData> {
    let mut builder = SkeletonDataBuilder::new();
    builder.add_bone(BoneData::new("root", None));
    builder.events.push(EventData {
        name: "step".to_string(),
        int_value: 3,
        ..EventData::default()
    });

    let mut walk = rotate("walk", 1.0, &[(0.0, 0.0), (1.0, 100.0)]);
    walk.events.push(Event::from_data(&builder.events[0], 0.5));
    builder.add_animation(walk);
    builder.add_animation(rotate("wave", 2.0, &[(0.0, -20.0), (2.0, 20.0)]));
    builder.add_animation(rotate("hold", 1.0, &[(0.0, 45.0)]));
    builder.build().unwrap()
}

fn state_and_skeleton() -> (AnimationState, Skeleton) {
    let data = rig();
    let state = AnimationState::new(Arc::new(AnimationStateData::new(Arc::clone(&data))));
    (state, Skeleton::new(data))
}

fn kinds(state: &mut AnimationState) -> Vec<(String, TrackEventKind)> {
    state
        .drain_events()
        .map(|e| (e.animation, e.kind))
        .collect()
}

#[test]
fn unknown_animation_leaves_track_alone() {
    let (mut state, _) = state_and_skeleton();
    state.set_animation(0, "walk", true).unwrap();

    let err = state.set_animation(0, "fly", true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AnimationNotFound);
    assert!(state.add_animation(0, "fly", true, 0.0).is_err());
    assert_eq!(state.current(0).unwrap().animation_name(), "walk");
    assert_eq!(state.queued(0), 0);
}

#[test]
fn looping_track_wraps_and_reports_completion() {
    let (mut state, mut skeleton) = state_and_skeleton();
    state.set_animation(0, "walk", true).unwrap();
    state.update(0.6);
    state.update(0.6);

    let entry = state.current(0).unwrap();
    assert_approx(entry.track_time(), 1.2);
    assert_approx(entry.animation_time(), 0.2);
    assert_eq!(entry.completed_loops(), 1);

    state.apply(&mut skeleton).unwrap();
    assert_approx(skeleton.bone(0).unwrap().rotation, 20.0);

    let events = kinds(&mut state);
    assert_eq!(events[0], ("walk".to_string(), TrackEventKind::Start));
    assert!(events.contains(&("walk".to_string(), TrackEventKind::Complete)));
}

#[test]
fn non_looping_track_clamps_at_end() {
    let (mut state, mut skeleton) = state_and_skeleton();
    state.set_animation(0, "wave", false).unwrap();
    state.update(5.0);

    let entry = state.current(0).unwrap();
    assert!(entry.is_complete());
    assert_approx(entry.animation_time(), 2.0);

    state.apply(&mut skeleton).unwrap();
    assert_approx(skeleton.bone(0).unwrap().rotation, 20.0);
}

#[test]
fn keyed_events_fire_once_when_crossed() {
    let (mut state, _) = state_and_skeleton();
    state.set_animation(0, "walk", false).unwrap();
    state.update(0.4);
    state.drain_events().for_each(drop);

    state.update(0.2);
    let fired: Vec<_> = state
        .drain_events()
        .filter_map(|e| match e.kind {
            TrackEventKind::Event(event) => Some(event),
            _ => None,
        })
        .collect();
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].name, "step");
    assert_eq!(fired[0].int_value, 3);

    state.update(0.2);
    assert!(
        !state
            .drain_events()
            .any(|e| matches!(e.kind, TrackEventKind::Event(_)))
    );
}

#[test]
fn entry_alpha_and_time_scales() {
    let (mut state, mut skeleton) = state_and_skeleton();
    state.time_scale = 2.0;
    let entry = state.set_animation(0, "walk", false).unwrap();
    entry.alpha = 0.5;
    entry.time_scale = 0.5;

    state.update(0.25);
    assert_approx(state.current(0).unwrap().track_time(), 0.25);

    state.apply(&mut skeleton).unwrap();
    assert_approx(skeleton.bone(0).unwrap().rotation, 12.5);
}

#[test]
fn higher_tracks_apply_over_lower_ones() {
    let (mut state, mut skeleton) = state_and_skeleton();
    state.set_animation(1, "hold", false).unwrap();
    state.set_animation(0, "walk", false).unwrap();
    state.update(0.5);

    state.apply(&mut skeleton).unwrap();
    assert_approx(skeleton.bone(0).unwrap().rotation, 45.0);
    let order: Vec<_> = state.tracks().map(|e| e.track_index()).collect();
    assert_eq!(order, [0, 1]);
}

#[test]
fn queued_entry_starts_when_previous_completes() {
    let (mut state, mut skeleton) = state_and_skeleton();
    state.set_animation(0, "walk", false).unwrap();
    state.add_animation(0, "hold", false, 0.0).unwrap();
    assert_eq!(state.queued(0), 1);

    state.update(0.9);
    assert_eq!(state.current(0).unwrap().animation_name(), "walk");

    state.update(0.2);
    let entry = state.current(0).unwrap();
    assert_eq!(entry.animation_name(), "hold");
    assert_approx(entry.track_time(), 0.1);
    assert_eq!(state.queued(0), 0);

    state.apply(&mut skeleton).unwrap();
    assert_approx(skeleton.bone(0).unwrap().rotation, 45.0);

    let events = kinds(&mut state);
    let walk_interrupt = events
        .iter()
        .position(|e| *e == ("walk".to_string(), TrackEventKind::Interrupt))
        .unwrap();
    let hold_start = events
        .iter()
        .position(|e| *e == ("hold".to_string(), TrackEventKind::Start))
        .unwrap();
    assert!(walk_interrupt < hold_start);
    assert!(events.contains(&("walk".to_string(), TrackEventKind::End)));
}

#[test]
fn delayed_entry_is_not_applied_before_delay() {
    let (mut state, mut skeleton) = state_and_skeleton();
    state.add_animation(0, "hold", false, 0.5).unwrap();

    state.update(0.25);
    state.apply(&mut skeleton).unwrap();
    assert_approx(skeleton.bone(0).unwrap().rotation, 0.0);

    state.update(0.5);
    assert_approx(state.current(0).unwrap().track_time(), 0.25);
    state.apply(&mut skeleton).unwrap();
    assert_approx(skeleton.bone(0).unwrap().rotation, 45.0);
}

#[test]
fn clearing_tracks_returns_to_setup_pose() {
    let (mut state, mut skeleton) = state_and_skeleton();
    state.set_animation(0, "hold", true).unwrap();
    state.update(0.1);
    state.clear_tracks();
    assert!(state.current(0).is_none());

    state.apply(&mut skeleton).unwrap();
    assert_approx(skeleton.bone(0).unwrap().rotation, 0.0);
    assert!(kinds(&mut state).contains(&("hold".to_string(), TrackEventKind::End)));
}

#[test]
fn invalid_deltas_are_ignored() {
    let (mut state, _) = state_and_skeleton();
    state.set_animation(0, "walk", true).unwrap();
    state.update(-1.0);
    state.update(f32::NAN);
    state.update(0.0);
    assert_eq!(state.current(0).unwrap().track_time(), 0.0);
}

#[test]
fn apply_rejects_foreign_skeleton() {
    let (mut state, _) = state_and_skeleton();
    state.set_animation(0, "walk", true).unwrap();
    let mut other = Skeleton::new(rig());

    let err = state.apply(&mut other).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StateMisuse);
}

#[test]
fn apply_leaves_world_transforms_stale() {
    let (mut state, mut skeleton) = state_and_skeleton();
    skeleton.update_world_transform(crate::Physics::None);
    state.set_animation(0, "walk", true).unwrap();
    state.apply(&mut skeleton).unwrap();
    assert!(!skeleton.is_posed());
}

#[test]
fn looping_pose_depends_only_on_total_elapsed_time() {
    let pose_after = |deltas: &[f32]| {
        let (mut state, mut skeleton) = state_and_skeleton();
        state.set_animation(0, "walk", true).unwrap();
        for &delta in deltas {
            state.update(delta);
        }
        state.apply(&mut skeleton).unwrap();
        let entry = state.current(0).unwrap();
        (
            entry.animation_time(),
            entry.completed_loops(),
            skeleton.bone(0).unwrap().rotation,
        )
    };

    let (time, loops, rotation) = pose_after(&[2.5]);
    assert_approx(time, 0.5);
    assert_eq!(loops, 2);
    assert_approx(rotation, 50.0);
    for deltas in [&[1.25, 1.25][..], &[0.3, 2.2], &[0.5, 0.5, 0.5, 0.5, 0.5]] {
        let (t, l, r) = pose_after(deltas);
        assert_approx(t, time);
        assert_eq!(l, loops, "{deltas:?}");
        assert!((r - rotation).abs() < 1.0e-3, "{deltas:?}: {r} vs {rotation}");
    }

    let (time, loops, rotation) = pose_after(&[1000.25]);
    assert_approx(time, 0.25);
    assert_eq!(loops, 1000);
    assert_approx(rotation, 25.0);
    let (t, l, r) = pose_after(&[500.125, 500.125]);
    assert_eq!((t, l), (time, loops));
    assert_approx(r, rotation);
}

#[test]
fn replaced_queue_entries_still_end() {
    let (mut state, _) = state_and_skeleton();
    state.set_animation(0, "walk", true).unwrap();
    state.add_animation(0, "hold", false, 5.0).unwrap();
    kinds(&mut state);

    state.set_animation(0, "wave", true).unwrap();
    assert_eq!(state.queued(0), 0);
    let events = kinds(&mut state);
    assert!(events.contains(&("hold".to_string(), TrackEventKind::End)));
    assert!(!events.contains(&("hold".to_string(), TrackEventKind::Start)));

    state.add_animation(0, "walk", true, 5.0).unwrap();
    kinds(&mut state);
    state.clear_track(0);
    let ended: Vec<_> = kinds(&mut state)
        .into_iter()
        .filter(|(_, kind)| *kind == TrackEventKind::End)
        .map(|(name, _)| name)
        .collect();
    // wave, the walk it was mixing from, and the queued walk.
    assert_eq!(ended.len(), 3, "{ended:?}");
    assert!(ended.iter().any(|n| n == "wave"));
}
