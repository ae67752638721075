use crate::runtime::animation::apply_animation_at;
use crate::{Animation, Error, Event, MixBlend, Property, Skeleton, SkeletonData};
use std::collections::{BTreeMap, HashMap, VecDeque, btree_map};
use std::sync::Arc;

/// Crossfade durations between animations of one [`SkeletonData`].
#[derive(Clone, Debug)]
pub struct AnimationStateData {
    skeleton_data: Arc<SkeletonData>,
    pub default_mix: f32,
    mixes: HashMap<(usize, usize), f32>,
}

impl AnimationStateData {
    pub fn new(skeleton_data: Arc<SkeletonData>) -> Self {
        Self {
            skeleton_data,
            default_mix: 0.0,
            mixes: HashMap::new(),
        }
    }

    pub fn skeleton_data(&self) -> &Arc<SkeletonData> {
        &self.skeleton_data
    }

    pub fn set_mix(&mut self, from: &str, to: &str, duration: f32) -> Result<(), Error> {
        let from = self.find(from)?;
        let to = self.find(to)?;
        self.mixes.insert((from, to), duration.max(0.0));
        Ok(())
    }

    /// Mix duration from one animation index to another, falling back to `default_mix`.
    pub fn mix(&self, from: usize, to: usize) -> f32 {
        self.mixes
            .get(&(from, to))
            .copied()
            .unwrap_or(self.default_mix)
    }

    fn mix_between(&self, from: Option<usize>, to: Option<usize>) -> f32 {
        match (from, to) {
            (Some(from), Some(to)) => self.mix(from, to),
            _ => self.default_mix,
        }
    }

    fn find(&self, name: &str) -> Result<usize, Error> {
        self.skeleton_data
            .find_animation(name)
            .ok_or_else(|| Error::AnimationNotFound {
                name: name.to_string(),
            })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TrackEventKind {
    /// The entry became the current entry of its track.
    Start,
    /// Another entry replaced this one; it may still be mixing out.
    Interrupt,
    /// A loop finished, or a non-looping entry reached its end.
    Complete,
    /// The entry will not be applied anymore.
    End,
    /// A keyed user event was crossed.
    Event(Event),
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrackEvent {
    pub track_index: usize,
    pub animation: String,
    pub kind: TrackEventKind,
}

/// One animation playing (or queued) on a track.
#[derive(Clone, Debug)]
pub struct TrackEntry {
    track_index: usize,
    animation_index: Option<usize>,
    animation: Arc<Animation>,
    pub looped: bool,
    /// Seconds before the entry starts. For queued entries, counted from the start of the
    /// entry before it.
    pub delay: f32,
    pub time_scale: f32,
    pub alpha: f32,
    pub mix_duration: f32,
    pub mix_blend: MixBlend,
    track_time: f32,
    animation_time: f32,
    events_from: Option<f32>,
    completed_loops: u32,
    completed: bool,
    mix_time: f32,
    mixing_from: Option<Box<TrackEntry>>,
    clear_when_mixed: bool,
}

impl TrackEntry {
    fn new(
        track_index: usize,
        animation_index: Option<usize>,
        animation: Arc<Animation>,
        looped: bool,
    ) -> Self {
        Self {
            track_index,
            animation_index,
            animation,
            looped,
            delay: 0.0,
            time_scale: 1.0,
            alpha: 1.0,
            mix_duration: 0.0,
            mix_blend: MixBlend::Replace,
            track_time: 0.0,
            animation_time: 0.0,
            events_from: None,
            completed_loops: 0,
            completed: false,
            mix_time: 0.0,
            mixing_from: None,
            clear_when_mixed: false,
        }
    }

    pub fn track_index(&self) -> usize {
        self.track_index
    }

    pub fn animation(&self) -> &Arc<Animation> {
        &self.animation
    }

    pub fn animation_name(&self) -> &str {
        &self.animation.name
    }

    /// Seconds played since the entry started, unwrapped.
    pub fn track_time(&self) -> f32 {
        self.track_time
    }

    /// Time sampled from the animation: wrapped when looping, clamped otherwise.
    pub fn animation_time(&self) -> f32 {
        self.animation_time
    }

    pub fn completed_loops(&self) -> u32 {
        self.completed_loops
    }

    /// Non-looping entries: whether the end was reached. Looping entries: whether at least one
    /// loop finished.
    pub fn is_complete(&self) -> bool {
        self.completed
    }

    pub fn mix_time(&self) -> f32 {
        self.mix_time
    }

    pub fn mixing_from(&self) -> Option<&TrackEntry> {
        self.mixing_from.as_deref()
    }

    /// Weight of this entry over the one it is mixing from, in `[0, 1]`.
    pub fn mix_fraction(&self) -> f32 {
        if self.mixing_from.is_none() || self.mix_duration <= 0.0 {
            1.0
        } else {
            (self.mix_time / self.mix_duration).min(1.0)
        }
    }

    /// Track time at which the current loop (or the whole animation) ends.
    fn track_complete(&self) -> f32 {
        let duration = self.animation.duration;
        if self.looped && duration > 0.0 {
            duration * ((self.track_time / duration).floor() + 1.0)
        } else {
            duration
        }
    }

    fn event(&self, kind: TrackEventKind) -> TrackEvent {
        TrackEvent {
            track_index: self.track_index,
            animation: self.animation.name.clone(),
            kind,
        }
    }

    fn push_keyed_events(&self, after: Option<f32>, up_to: f32, sink: &mut Vec<TrackEvent>) {
        for event in &self.animation.events {
            let crossed = after.is_none_or(|after| event.time > after) && event.time <= up_to;
            if crossed {
                sink.push(self.event(TrackEventKind::Event(event.clone())));
            }
        }
    }

    /// Moves the entry forward by `delta` of its own time. Events go to `sink` when given.
    fn advance(&mut self, delta: f32, mut sink: Option<&mut Vec<TrackEvent>>) {
        if delta <= 0.0 {
            return;
        }
        self.track_time += delta;
        let duration = self.animation.duration;
        let previous = self.animation_time;
        let after = self.events_from;

        if self.looped && duration > 0.0 {
            let total = previous + delta;
            let wraps = (total / duration).floor();
            if wraps >= 1.0 {
                self.animation_time = total.rem_euclid(duration);
                self.completed_loops = self.completed_loops.saturating_add(wraps as u32);
                self.completed = true;
                if let Some(sink) = sink.as_deref_mut() {
                    self.push_keyed_events(after, duration, sink);
                    sink.push(self.event(TrackEventKind::Complete));
                    self.push_keyed_events(None, self.animation_time, sink);
                }
            } else {
                self.animation_time = total;
                if let Some(sink) = sink.as_deref_mut() {
                    self.push_keyed_events(after, total, sink);
                }
            }
        } else {
            self.animation_time = (previous + delta).min(duration);
            if let Some(sink) = sink.as_deref_mut() {
                self.push_keyed_events(after, self.animation_time, sink);
            }
            if !self.completed && self.track_time >= duration {
                self.completed = true;
                if let Some(sink) = sink.as_deref_mut() {
                    sink.push(self.event(TrackEventKind::Complete));
                }
            }
        }
        self.events_from = Some(self.animation_time);
    }

    /// Advances the entries this one is mixing from and drops them once the mix is done.
    fn update_mixing_from(&mut self, delta: f32, sink: &mut Vec<TrackEvent>) {
        let Some(from) = self.mixing_from.as_deref_mut() else {
            return;
        };
        from.advance(delta * from.time_scale, None);
        from.update_mixing_from(delta, sink);

        self.mix_time += delta;
        if self.mix_time >= self.mix_duration {
            if let Some(from) = self.mixing_from.take() {
                from.end(sink);
            }
        }
    }

    /// Emits `End` for this entry and everything it was mixing from.
    fn end(self, sink: &mut Vec<TrackEvent>) {
        let mut next = Some(Box::new(self));
        while let Some(mut entry) = next {
            sink.push(entry.event(TrackEventKind::End));
            next = entry.mixing_from.take();
        }
    }
}

#[derive(Clone, Debug)]
struct Track {
    current: TrackEntry,
    queue: VecDeque<TrackEntry>,
}

impl Track {
    /// Emits `End` for queued entries that will never play.
    fn discard_queue(&mut self, sink: &mut Vec<TrackEvent>) {
        for entry in self.queue.drain(..) {
            sink.push(entry.event(TrackEventKind::End));
        }
    }

    fn end(mut self, sink: &mut Vec<TrackEvent>) {
        self.discard_queue(sink);
        self.current.end(sink);
    }
}

/// Plays and crossfades animations on numbered tracks and poses a [`Skeleton`] with them.
#[derive(Clone, Debug)]
pub struct AnimationState {
    data: Arc<AnimationStateData>,
    tracks: BTreeMap<usize, Track>,
    events: Vec<TrackEvent>,
    empty: Arc<Animation>,
    pub time_scale: f32,
}

impl AnimationState {
    pub fn new(data: Arc<AnimationStateData>) -> Self {
        Self {
            data,
            tracks: BTreeMap::new(),
            events: Vec::new(),
            empty: Arc::new(Animation::empty()),
            time_scale: 1.0,
        }
    }

    pub fn data(&self) -> &Arc<AnimationStateData> {
        &self.data
    }

    pub fn current(&self, track_index: usize) -> Option<&TrackEntry> {
        self.tracks.get(&track_index).map(|t| &t.current)
    }

    pub fn current_mut(&mut self, track_index: usize) -> Option<&mut TrackEntry> {
        self.tracks.get_mut(&track_index).map(|t| &mut t.current)
    }

    /// Current entries in ascending track order.
    pub fn tracks(&self) -> impl Iterator<Item = &TrackEntry> {
        self.tracks.values().map(|t| &t.current)
    }

    pub fn queued(&self, track_index: usize) -> usize {
        self.tracks.get(&track_index).map_or(0, |t| t.queue.len())
    }

    /// Takes the events produced since the last call, oldest first.
    pub fn drain_events(&mut self) -> std::vec::Drain<'_, TrackEvent> {
        self.events.drain(..)
    }

    fn lookup(&self, name: &str) -> Result<(usize, Arc<Animation>), Error> {
        let data = self.data.skeleton_data();
        let index = data
            .find_animation(name)
            .ok_or_else(|| Error::AnimationNotFound {
                name: name.to_string(),
            })?;
        Ok((index, Arc::clone(&data.animations()[index])))
    }

    /// Plays `name` on `track_index` right away, crossfading from whatever played there.
    ///
    /// Queued entries on the track are discarded. On error no track changes.
    pub fn set_animation(
        &mut self,
        track_index: usize,
        name: &str,
        looped: bool,
    ) -> Result<&mut TrackEntry, Error> {
        let (index, animation) = self.lookup(name)?;
        Ok(self.set_entry(TrackEntry::new(track_index, Some(index), animation, looped)))
    }

    /// Queues `name` after the last entry of `track_index`.
    ///
    /// A positive `delay` counts from the start of the previous entry. Otherwise the entry starts
    /// when the previous one completes, minus the mix duration, plus `delay`.
    pub fn add_animation(
        &mut self,
        track_index: usize,
        name: &str,
        looped: bool,
        delay: f32,
    ) -> Result<&mut TrackEntry, Error> {
        let (index, animation) = self.lookup(name)?;
        Ok(self.queue_entry(
            TrackEntry::new(track_index, Some(index), animation, looped),
            delay,
        ))
    }

    /// Crossfades `track_index` to the setup pose (or the tracks below) and then clears it.
    pub fn set_empty_animation(&mut self, track_index: usize, mix_duration: f32) -> &mut TrackEntry {
        let mut entry = TrackEntry::new(track_index, None, Arc::clone(&self.empty), false);
        entry.clear_when_mixed = true;
        let entry = self.set_entry(entry);
        entry.mix_duration = mix_duration.max(0.0);
        entry
    }

    pub fn add_empty_animation(
        &mut self,
        track_index: usize,
        mix_duration: f32,
        delay: f32,
    ) -> &mut TrackEntry {
        let mut entry = TrackEntry::new(track_index, None, Arc::clone(&self.empty), false);
        entry.clear_when_mixed = true;
        entry.mix_duration = mix_duration.max(0.0);
        self.queue_entry(entry, delay)
    }

    pub fn clear_track(&mut self, track_index: usize) {
        if let Some(track) = self.tracks.remove(&track_index) {
            track.end(&mut self.events);
        }
    }

    pub fn clear_tracks(&mut self) {
        for (_, track) in std::mem::take(&mut self.tracks) {
            track.end(&mut self.events);
        }
    }

    fn set_entry(&mut self, mut entry: TrackEntry) -> &mut TrackEntry {
        let track_index = entry.track_index;
        if let Some(mut previous) = self.tracks.remove(&track_index) {
            previous.discard_queue(&mut self.events);
            let previous = previous.current;
            entry.mix_duration = self
                .data
                .mix_between(previous.animation_index, entry.animation_index);
            self.events.push(previous.event(TrackEventKind::Interrupt));
            entry.mixing_from = Some(Box::new(previous));
        }
        self.events.push(entry.event(TrackEventKind::Start));

        let track = self.tracks.entry(track_index).or_insert(Track {
            current: entry,
            queue: VecDeque::new(),
        });
        &mut track.current
    }

    fn queue_entry(&mut self, mut entry: TrackEntry, delay: f32) -> &mut TrackEntry {
        let track = match self.tracks.entry(entry.track_index) {
            btree_map::Entry::Vacant(slot) => {
                entry.delay = delay.max(0.0);
                self.events.push(entry.event(TrackEventKind::Start));
                let track = slot.insert(Track {
                    current: entry,
                    queue: VecDeque::new(),
                });
                return &mut track.current;
            }
            btree_map::Entry::Occupied(slot) => slot.into_mut(),
        };

        let last = track.queue.back().unwrap_or(&track.current);
        if !entry.clear_when_mixed {
            entry.mix_duration = self
                .data
                .mix_between(last.animation_index, entry.animation_index);
        }
        entry.delay = if delay > 0.0 {
            delay
        } else {
            (delay + last.track_complete() - entry.mix_duration).max(0.0)
        };
        track.queue.push_back(entry);
        let last = track.queue.len() - 1;
        &mut track.queue[last]
    }

    /// Advances every track by `delta` seconds, scaled by `time_scale`.
    pub fn update(&mut self, delta: f32) {
        if !delta.is_finite() || delta < 0.0 {
            log::warn!("ignoring animation update with delta {delta}");
            return;
        }
        let delta = delta * self.time_scale;
        if delta == 0.0 {
            return;
        }

        let mut finished = Vec::new();
        for (&track_index, track) in self.tracks.iter_mut() {
            if update_track(track, delta, &mut self.events) {
                finished.push(track_index);
            }
        }
        for track_index in finished {
            self.clear_track(track_index);
        }
    }

    /// Poses `skeleton` from its setup pose with every track, lowest track first.
    ///
    /// Leaves world transforms stale; call `update_world_transform` before drawing.
    pub fn apply(&self, skeleton: &mut Skeleton) -> Result<(), Error> {
        if !Arc::ptr_eq(skeleton.data(), self.data.skeleton_data()) {
            log::warn!("animation state applied to a skeleton of different skeleton data");
            return Err(Error::state_misuse(
                "skeleton was not created from this animation state's skeleton data",
            ));
        }

        skeleton.set_bones_to_setup_pose();
        skeleton.reset_slots();
        for track in self.tracks.values() {
            if track.current.delay > 0.0 {
                continue;
            }
            apply_entry(&track.current, skeleton, track.current.alpha, None);
        }
        skeleton.mark_stale();
        Ok(())
    }
}

/// Returns true when the track should be cleared.
fn update_track(track: &mut Track, delta: f32, sink: &mut Vec<TrackEvent>) -> bool {
    let mut scaled = delta * track.current.time_scale;
    if track.current.delay > 0.0 {
        track.current.delay -= scaled;
        if track.current.delay > 0.0 {
            return false;
        }
        scaled = -track.current.delay;
        track.current.delay = 0.0;
    }

    let switch_at = track.queue.front().map(|next| next.delay);
    if let Some(switch_at) = switch_at {
        let overshoot = track.current.track_time + scaled - switch_at;
        if overshoot >= 0.0 {
            track.current.advance((scaled - overshoot).max(0.0), Some(&mut *sink));
            if let Some(mut next) = track.queue.pop_front() {
                next.delay = 0.0;
                let unscaled = if track.current.time_scale != 0.0 {
                    overshoot / track.current.time_scale
                } else {
                    0.0
                };
                let previous = std::mem::replace(&mut track.current, next);
                sink.push(previous.event(TrackEventKind::Interrupt));
                sink.push(track.current.event(TrackEventKind::Start));
                track.current.mixing_from = Some(Box::new(previous));
                let own = unscaled * track.current.time_scale;
                track.current.advance(own, Some(&mut *sink));
                track.current.update_mixing_from(unscaled, sink);
            }
            return is_finished(track);
        }
    }

    track.current.advance(scaled, Some(&mut *sink));
    track.current.update_mixing_from(delta, sink);
    is_finished(track)
}

fn is_finished(track: &Track) -> bool {
    track.current.clear_when_mixed && track.current.mixing_from.is_none() && track.queue.is_empty()
}

/// Applies `entry` over whatever it mixes from. `next` is the entry replacing this one and how
/// far its mix has progressed.
fn apply_entry(
    entry: &TrackEntry,
    skeleton: &mut Skeleton,
    alpha: f32,
    next: Option<(&Animation, f32)>,
) {
    let own_mix = entry.mix_fraction();
    if let Some(from) = entry.mixing_from.as_deref() {
        apply_entry(from, skeleton, alpha, Some((entry.animation.as_ref(), own_mix)));
    }

    let weight = |property: Property| {
        let base = match next {
            Some((next, mix)) if !next.keys(property) => alpha * (1.0 - mix),
            _ => alpha,
        };
        base * own_mix
    };
    apply_animation_at(
        &entry.animation,
        skeleton,
        entry.animation_time,
        entry.mix_blend,
        weight,
        next.is_none(),
    );
}
