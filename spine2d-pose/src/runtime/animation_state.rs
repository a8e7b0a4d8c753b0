use super::animation::{sample, signum, ANIMATION_STATE_CURRENT, ANIMATION_STATE_SETUP};
use super::skeleton::warn_non_finite;
use crate::{
    Animation, AttachmentTimeline, CurveTimeline, Error, Event, MixBlend, MixDirection,
    PropertyId, Skeleton, SkeletonData, Timeline,
};
use log::{debug, trace};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

const EMPTY_ANIMATION_NAME: &str = "<empty>";

static EMPTY_ANIMATION: Animation = Animation {
    name: String::new(),
    timelines: Vec::new(),
    duration: 0.0,
};

fn animation_of(data: &SkeletonData, index: Option<usize>) -> &Animation {
    index
        .and_then(|i| data.animations.get(i))
        .unwrap_or(&EMPTY_ANIMATION)
}

fn invalid_mix(mix_duration: f32) -> Result<(), Error> {
    if mix_duration.is_nan() || mix_duration < 0.0 {
        return Err(Error::InvalidValue {
            message: format!("mix duration must be >= 0, got {mix_duration}"),
        });
    }
    Ok(())
}

/// Mix durations between animation pairs.
#[derive(Clone, Debug)]
pub struct AnimationStateData {
    pub skeleton_data: Arc<SkeletonData>,
    /// Used for pairs without an explicit mix.
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

    pub fn set_mix(&mut self, from: &str, to: &str, duration: f32) -> Result<(), Error> {
        invalid_mix(duration)?;
        let from_index = self.find_animation(from)?;
        let to_index = self.find_animation(to)?;
        self.mixes.insert((from_index, to_index), duration);
        Ok(())
    }

    /// Mix duration from one named animation to another.
    pub fn mix(&self, from: &str, to: &str) -> Result<f32, Error> {
        let from_index = self.find_animation(from)?;
        let to_index = self.find_animation(to)?;
        Ok(self.mix_duration(Some(from_index), Some(to_index)))
    }

    fn find_animation(&self, name: &str) -> Result<usize, Error> {
        self.skeleton_data
            .animation(name)
            .map(|(index, _)| index)
            .ok_or_else(|| Error::UnknownAnimation {
                name: name.to_string(),
            })
    }

    fn mix_duration(&self, from: Option<usize>, to: Option<usize>) -> f32 {
        from.zip(to)
            .and_then(|key| self.mixes.get(&key).copied())
            .unwrap_or(self.default_mix)
    }
}

/// How a mixing-out entry applies one of its timelines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TimelineMode {
    /// Another entry already keyed the property: blend on top of it.
    Subsequent,
    /// First to key the property and the next entry does not key it: mix out from setup.
    First,
    /// Held at full alpha because a later entry keys the property.
    HoldFirst,
    HoldSubsequent,
    /// Held until the entry that stops keying the property has mixed in.
    HoldMix,
}

/// Generational reference to a track entry. Stale once the entry is disposed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TrackEntryHandle {
    index: usize,
    generation: u32,
}

#[derive(Clone, Debug)]
pub struct TrackEntry {
    track_index: usize,
    animation: Option<usize>,
    animation_name: String,

    pub looped: bool,
    /// Plays the animation backward. Events are not fired.
    pub reverse: bool,
    /// Keeps the previous entry's poses at full strength while this one mixes in.
    pub hold_previous: bool,
    pub delay: f32,
    pub track_time: f32,
    pub track_end: f32,
    pub time_scale: f32,
    pub alpha: f32,
    pub mix_duration: f32,
    pub mix_blend: MixBlend,
    pub animation_start: f32,
    pub animation_end: f32,
    /// While mixing out, events fire only while the mix percentage is below this.
    pub event_threshold: f32,
    pub attachment_threshold: f32,
    pub draw_order_threshold: f32,

    animation_last: f32,
    next_animation_last: f32,
    track_last: f32,
    next_track_last: f32,
    mix_time: f32,
    interrupt_alpha: f32,
    total_alpha: f32,
    mixing_from: Option<TrackEntryHandle>,
    mixing_to: Option<TrackEntryHandle>,
    timeline_mode: Vec<TimelineMode>,
    timeline_hold_mix: Vec<Option<TrackEntryHandle>>,
    timelines_rotation: Vec<f32>,
}

impl TrackEntry {
    fn new(track_index: usize, animation: Option<usize>, data: &SkeletonData, looped: bool) -> Self {
        let resolved = animation_of(data, animation);
        let animation_name = match animation {
            Some(_) => resolved.name.clone(),
            None => EMPTY_ANIMATION_NAME.to_string(),
        };
        Self {
            track_index,
            animation,
            animation_name,
            looped,
            reverse: false,
            hold_previous: false,
            delay: 0.0,
            track_time: 0.0,
            track_end: i32::MAX as f32,
            time_scale: 1.0,
            alpha: 1.0,
            mix_duration: 0.0,
            mix_blend: MixBlend::Replace,
            animation_start: 0.0,
            animation_end: resolved.duration,
            event_threshold: 0.0,
            attachment_threshold: 0.0,
            draw_order_threshold: 0.0,
            animation_last: -1.0,
            next_animation_last: -1.0,
            track_last: -1.0,
            next_track_last: -1.0,
            mix_time: 0.0,
            interrupt_alpha: 1.0,
            total_alpha: 0.0,
            mixing_from: None,
            mixing_to: None,
            timeline_mode: Vec::new(),
            timeline_hold_mix: Vec::new(),
            timelines_rotation: Vec::new(),
        }
    }

    pub fn track_index(&self) -> usize {
        self.track_index
    }

    /// Index into `SkeletonData::animations`, or `None` for the empty animation.
    pub fn animation_index(&self) -> Option<usize> {
        self.animation
    }

    pub fn animation_name(&self) -> &str {
        &self.animation_name
    }

    pub fn is_empty_animation(&self) -> bool {
        self.animation.is_none()
    }

    pub fn mix_time(&self) -> f32 {
        self.mix_time
    }

    pub fn mixing_from(&self) -> Option<TrackEntryHandle> {
        self.mixing_from
    }

    pub fn mixing_to(&self) -> Option<TrackEntryHandle> {
        self.mixing_to
    }

    pub fn animation_last(&self) -> f32 {
        self.animation_last
    }

    /// Sets the time events were last fired up to, so the next apply fires keys after it.
    pub fn set_animation_last(&mut self, animation_last: f32) {
        self.animation_last = animation_last;
        self.next_animation_last = animation_last;
    }

    /// Animation time for the current track time, wrapped when looping and clamped otherwise.
    pub fn animation_time(&self) -> f32 {
        if self.looped {
            let duration = self.animation_end - self.animation_start;
            if duration == 0.0 {
                return self.animation_start;
            }
            return self.track_time % duration + self.animation_start;
        }
        (self.track_time + self.animation_start).min(self.animation_end)
    }

    /// Track time at which the current loop or the animation completes.
    pub fn track_complete(&self) -> f32 {
        let duration = self.animation_end - self.animation_start;
        if duration != 0.0 {
            if self.looped {
                return duration * (1.0 + (self.track_time / duration).trunc());
            }
            if self.track_time < duration {
                return duration;
            }
        }
        self.track_time
    }

    pub fn is_complete(&self) -> bool {
        self.track_time >= self.animation_end - self.animation_start
    }

    /// Forgets the rotation directions chosen for mixing, so the next mix takes the shortest path.
    pub fn reset_rotation_directions(&mut self) {
        self.timelines_rotation.clear();
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum AnimationStateEvent {
    Start,
    Interrupt,
    End,
    Dispose,
    Complete,
    Event(Event),
}

/// One queued scheduler notification.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackEvent {
    pub track_index: usize,
    pub entry: TrackEntryHandle,
    pub animation: String,
    pub event: AnimationStateEvent,
}

#[derive(Clone, Debug)]
struct EntrySlot {
    generation: u32,
    entry: Option<TrackEntry>,
}

#[derive(Clone, Debug, Default)]
struct Track {
    current: Option<TrackEntryHandle>,
    queue: VecDeque<TrackEntryHandle>,
}

/// Plays, queues and crossfades animations on numbered tracks. Higher tracks layer on lower ones.
#[derive(Debug)]
pub struct AnimationState {
    data: AnimationStateData,
    tracks: Vec<Track>,
    entries: Vec<EntrySlot>,
    free: Vec<usize>,
    events: Vec<TrackEvent>,
    disposed: Vec<TrackEntryHandle>,
    property_ids: HashSet<PropertyId>,
    animations_changed: bool,
    unkeyed_state: u32,
    pub time_scale: f32,
}

impl AnimationState {
    pub fn new(data: AnimationStateData) -> Self {
        Self {
            data,
            tracks: Vec::new(),
            entries: Vec::new(),
            free: Vec::new(),
            events: Vec::new(),
            disposed: Vec::new(),
            property_ids: HashSet::new(),
            animations_changed: false,
            unkeyed_state: 0,
            time_scale: 1.0,
        }
    }

    pub fn data(&self) -> &AnimationStateData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut AnimationStateData {
        &mut self.data
    }

    pub fn tracks_len(&self) -> usize {
        self.tracks.len()
    }

    pub fn current(&self, track_index: usize) -> Option<TrackEntryHandle> {
        self.tracks.get(track_index)?.current
    }

    pub fn entry(&self, handle: TrackEntryHandle) -> Option<&TrackEntry> {
        let slot = self.entries.get(handle.index)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    pub fn entry_mut(&mut self, handle: TrackEntryHandle) -> Option<&mut TrackEntry> {
        let slot = self.entries.get_mut(handle.index)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.entry.as_mut()
    }

    /// Takes the notifications queued since the last call, in the order they happened.
    pub fn drain_events(&mut self) -> Vec<TrackEvent> {
        let events = std::mem::take(&mut self.events);
        for event in &events {
            trace!(
                "track {} '{}': {:?}",
                event.track_index,
                event.animation,
                event.event
            );
        }
        events
    }

    /// Plays an animation now, replacing the track's current entry and discarding queued ones.
    pub fn set_animation(
        &mut self,
        track_index: usize,
        animation_name: &str,
        looped: bool,
    ) -> Result<TrackEntryHandle, Error> {
        let animation = self.data.find_animation(animation_name)?;
        Ok(self.set_animation_at(track_index, Some(animation), looped))
    }

    /// Queues an animation after the track's last entry. A `delay <= 0` starts it when the
    /// previous entry completes, minus the mix duration, offset by `delay`.
    pub fn add_animation(
        &mut self,
        track_index: usize,
        animation_name: &str,
        looped: bool,
        delay: f32,
    ) -> Result<TrackEntryHandle, Error> {
        let animation = self.data.find_animation(animation_name)?;
        if !delay.is_finite() {
            return Err(Error::InvalidValue {
                message: format!("delay must be finite, got {delay}"),
            });
        }
        Ok(self.add_animation_at(track_index, Some(animation), looped, delay))
    }

    /// Mixes the track out to the setup pose over `mix_duration`, then clears it.
    pub fn set_empty_animation(
        &mut self,
        track_index: usize,
        mix_duration: f32,
    ) -> Result<TrackEntryHandle, Error> {
        invalid_mix(mix_duration)?;
        let handle = self.set_animation_at(track_index, None, false);
        if let Some(entry) = self.entry_mut(handle) {
            entry.mix_duration = mix_duration;
            entry.track_end = mix_duration;
        }
        Ok(handle)
    }

    pub fn add_empty_animation(
        &mut self,
        track_index: usize,
        mix_duration: f32,
        delay: f32,
    ) -> Result<TrackEntryHandle, Error> {
        invalid_mix(mix_duration)?;
        if !delay.is_finite() {
            return Err(Error::InvalidValue {
                message: format!("delay must be finite, got {delay}"),
            });
        }
        let handle = self.add_animation_at(track_index, None, false, delay);
        if let Some(entry) = self.entry_mut(handle) {
            if delay <= 0.0 {
                entry.delay += entry.mix_duration - mix_duration;
            }
            entry.mix_duration = mix_duration;
            entry.track_end = mix_duration;
        }
        Ok(handle)
    }

    /// Mixes every track out to the setup pose.
    pub fn set_empty_animations(&mut self, mix_duration: f32) -> Result<(), Error> {
        invalid_mix(mix_duration)?;
        for track_index in 0..self.tracks.len() {
            if self.tracks[track_index].current.is_some() {
                self.set_empty_animation(track_index, mix_duration)?;
            }
        }
        Ok(())
    }

    /// Removes every entry on the track without mixing. The skeleton keeps its last pose.
    pub fn clear_track(&mut self, track_index: usize) {
        let Some(current) = self.current(track_index) else {
            return;
        };
        debug!("clearing track {track_index}");
        self.queue(current, AnimationStateEvent::End);
        self.clear_next(track_index);

        let mut entry = current;
        while let Some(from) = self.entry(entry).and_then(|e| e.mixing_from) {
            self.queue(from, AnimationStateEvent::End);
            if let Some(e) = self.entry_mut(entry) {
                e.mixing_from = None;
                e.mixing_to = None;
            }
            entry = from;
        }

        self.tracks[track_index].current = None;
        self.drain();
    }

    pub fn clear_tracks(&mut self) {
        for track_index in 0..self.tracks.len() {
            self.clear_track(track_index);
        }
        self.tracks.clear();
        self.drain();
    }

    /// Advances track times by `delta` seconds, starting queued entries and finishing mixes.
    pub fn update(&mut self, delta: f32) {
        if warn_non_finite("animation state delta", delta) {
            return;
        }
        let delta = delta * self.time_scale;

        for track_index in 0..self.tracks.len() {
            let Some(current) = self.tracks[track_index].current else {
                continue;
            };
            let Some(entry) = self.entry_mut(current) else {
                self.tracks[track_index].current = None;
                continue;
            };
            entry.animation_last = entry.next_animation_last;
            entry.track_last = entry.next_track_last;

            let mut current_delta = delta * entry.time_scale;
            if entry.delay > 0.0 {
                entry.delay -= current_delta;
                if entry.delay > 0.0 {
                    continue;
                }
                current_delta = -entry.delay;
                entry.delay = 0.0;
            }
            let (track_last, time_scale, track_end, mixing_from) = (
                entry.track_last,
                entry.time_scale,
                entry.track_end,
                entry.mixing_from,
            );

            if let Some(&next) = self.tracks[track_index].queue.front() {
                // Switch once the next entry's delay has passed, carrying over the leftover time.
                let next_time = track_last - self.entry(next).map_or(0.0, |n| n.delay);
                if next_time >= 0.0 {
                    self.tracks[track_index].queue.pop_front();
                    if let Some(n) = self.entry_mut(next) {
                        n.delay = 0.0;
                        if time_scale != 0.0 {
                            n.track_time += (next_time / time_scale + delta) * n.time_scale;
                        }
                    }
                    if let Some(e) = self.entry_mut(current) {
                        e.track_time += current_delta;
                    }
                    self.set_current(track_index, next, true);
                    let mut walk = next;
                    while let Some(from) = self.entry(walk).and_then(|e| e.mixing_from) {
                        if let Some(e) = self.entry_mut(walk) {
                            e.mix_time += delta;
                        }
                        walk = from;
                    }
                    continue;
                }
            } else if track_last >= track_end && mixing_from.is_none() {
                debug!("track {track_index} reached its end");
                self.tracks[track_index].current = None;
                self.queue(current, AnimationStateEvent::End);
                self.clear_next(track_index);
                continue;
            }

            if mixing_from.is_some() && self.update_mixing_from(current, delta) {
                // Every entry this one was mixing from has finished.
                let from = self.entry_mut(current).and_then(|e| e.mixing_from.take());
                if let Some(f) = from.and_then(|f| self.entry_mut(f)) {
                    f.mixing_to = None;
                }
                let mut walk = from;
                while let Some(f) = walk {
                    self.queue(f, AnimationStateEvent::End);
                    walk = self.entry(f).and_then(|e| e.mixing_from);
                }
            }

            if let Some(e) = self.entry_mut(current) {
                e.track_time += current_delta;
            }
        }

        self.drain();
    }

    /// Returns true when every entry this one mixes from has finished mixing out.
    fn update_mixing_from(&mut self, to: TrackEntryHandle, delta: f32) -> bool {
        let Some(from) = self.entry(to).and_then(|e| e.mixing_from) else {
            return true;
        };
        let finished = self.update_mixing_from(from, delta);

        let Some(f) = self.entry_mut(from) else {
            return finished;
        };
        f.animation_last = f.next_animation_last;
        f.track_last = f.next_track_last;
        let (from_total_alpha, from_mixing_from, from_interrupt_alpha) =
            (f.total_alpha, f.mixing_from, f.interrupt_alpha);

        let Some(t) = self.entry(to) else {
            return finished;
        };
        let (mix_time, mix_duration) = (t.mix_time, t.mix_duration);

        // The mix must have been applied at least once, and fully faded unless it was a cut.
        if mix_time > 0.0 && mix_time >= mix_duration {
            if from_total_alpha == 0.0 || mix_duration == 0.0 {
                if let Some(t) = self.entry_mut(to) {
                    t.mixing_from = from_mixing_from;
                    t.interrupt_alpha = from_interrupt_alpha;
                }
                if let Some(ff) = from_mixing_from.and_then(|ff| self.entry_mut(ff)) {
                    ff.mixing_to = Some(to);
                }
                self.queue(from, AnimationStateEvent::End);
            }
            return finished;
        }

        if let Some(f) = self.entry_mut(from) {
            f.track_time += delta * f.time_scale;
        }
        if let Some(t) = self.entry_mut(to) {
            t.mix_time += delta;
        }
        false
    }

    /// Poses the skeleton from every track. Returns true if any entry was applied.
    pub fn apply(&mut self, skeleton: &mut Skeleton) -> bool {
        if self.animations_changed {
            self.update_timeline_modes();
        }
        let data = Arc::clone(&self.data.skeleton_data);
        let mut applied = false;

        for track_index in 0..self.tracks.len() {
            let Some(current) = self.tracks[track_index].current else {
                continue;
            };
            let Some(entry) = self.entry(current) else {
                continue;
            };
            if entry.delay > 0.0 {
                continue;
            }
            applied = true;
            let blend = if track_index == 0 {
                MixBlend::First
            } else {
                entry.mix_blend
            };

            let mut mix = entry.alpha;
            if entry.mixing_from.is_some() {
                mix *= self.apply_mixing_from(current, skeleton, blend, &data);
            } else if entry.track_time >= entry.track_end
                && self.tracks[track_index].queue.is_empty()
            {
                mix = 0.0;
            }

            let Some(entry) = self.entry_mut(current) else {
                continue;
            };
            let animation = animation_of(&data, entry.animation);
            let animation_last = entry.animation_last;
            let animation_time = entry.animation_time();
            let reverse = entry.reverse;
            let apply_time = if reverse {
                animation.duration - animation_time
            } else {
                animation_time
            };
            let count = animation.timelines.len();
            let modes = entry.timeline_mode.clone();
            let first_frame = entry.timelines_rotation.len() != count * 2;
            if first_frame {
                entry.timelines_rotation = vec![0.0; count * 2];
            }
            let mut rotation = std::mem::take(&mut entry.timelines_rotation);

            let mut fired = Vec::new();
            let mut events = (!reverse).then_some(&mut fired);
            let unkeyed_state = self.unkeyed_state;

            if (track_index == 0 && mix == 1.0) || blend == MixBlend::Add {
                for timeline in &animation.timelines {
                    match timeline {
                        Timeline::Attachment(t) => {
                            apply_attachment_timeline(t, skeleton, apply_time, blend, true, unkeyed_state)
                        }
                        _ => timeline.apply(
                            skeleton,
                            animation_last,
                            apply_time,
                            events.as_deref_mut(),
                            mix,
                            blend,
                            MixDirection::In,
                        ),
                    }
                }
            } else {
                for (i, timeline) in animation.timelines.iter().enumerate() {
                    let timeline_blend = match modes.get(i) {
                        Some(TimelineMode::Subsequent) => blend,
                        _ => MixBlend::Setup,
                    };
                    match timeline {
                        Timeline::Rotate(t) => apply_rotate_timeline(
                            timeline,
                            t,
                            skeleton,
                            apply_time,
                            mix,
                            timeline_blend,
                            &mut rotation[i * 2..i * 2 + 2],
                            first_frame,
                        ),
                        Timeline::Attachment(t) => apply_attachment_timeline(
                            t,
                            skeleton,
                            apply_time,
                            blend,
                            true,
                            unkeyed_state,
                        ),
                        _ => timeline.apply(
                            skeleton,
                            animation_last,
                            apply_time,
                            events.as_deref_mut(),
                            mix,
                            timeline_blend,
                            MixDirection::In,
                        ),
                    }
                }
            }

            if let Some(entry) = self.entry_mut(current) {
                entry.timelines_rotation = rotation;
            }
            self.queue_events(current, animation_time, &fired);
            if let Some(entry) = self.entry_mut(current) {
                entry.next_animation_last = animation_time;
                entry.next_track_last = entry.track_time;
            }
        }

        // Slots no timeline keyed this frame go back to their setup attachment.
        let setup_state = self.unkeyed_state.wrapping_add(ANIMATION_STATE_SETUP);
        for slot_index in 0..skeleton.slots.len() {
            if skeleton.slots[slot_index].attachment_state == setup_state {
                let name = data
                    .slots
                    .get(slot_index)
                    .and_then(|s| s.attachment.as_deref());
                skeleton.set_slot_attachment(slot_index, name);
            }
        }
        self.unkeyed_state = self.unkeyed_state.wrapping_add(2);

        self.drain();
        applied
    }

    /// Advances by `delta`, applies every track and updates world transforms.
    pub fn step(&mut self, delta: f32, skeleton: &mut Skeleton) -> bool {
        self.update(delta);
        let applied = self.apply(skeleton);
        skeleton.update_world_transform();
        applied
    }

    /// Applies the entries `to` is mixing from, oldest first. Returns the mix percentage of `to`.
    fn apply_mixing_from(
        &mut self,
        to: TrackEntryHandle,
        skeleton: &mut Skeleton,
        blend: MixBlend,
        data: &SkeletonData,
    ) -> f32 {
        let Some(to_entry) = self.entry(to) else {
            return 1.0;
        };
        let Some(from) = to_entry.mixing_from else {
            return 1.0;
        };
        let (to_mix_time, to_mix_duration, interrupt_alpha) = (
            to_entry.mix_time,
            to_entry.mix_duration,
            to_entry.interrupt_alpha,
        );
        if self.entry(from).is_some_and(|f| f.mixing_from.is_some()) {
            self.apply_mixing_from(from, skeleton, blend, data);
        }

        let Some(f) = self.entry_mut(from) else {
            return 1.0;
        };
        let mut blend = blend;
        let mix = if to_mix_duration == 0.0 {
            // Single frame mix to undo the mixing-from changes.
            if blend == MixBlend::First {
                blend = MixBlend::Setup;
            }
            1.0
        } else {
            if blend != MixBlend::First {
                blend = f.mix_blend;
            }
            (to_mix_time / to_mix_duration).min(1.0)
        };

        let attachments = mix < f.attachment_threshold;
        let draw_order = mix < f.draw_order_threshold;
        let animation = animation_of(data, f.animation);
        let count = animation.timelines.len();
        let alpha_hold = f.alpha * interrupt_alpha;
        let alpha_mix = alpha_hold * (1.0 - mix);
        let animation_last = f.animation_last;
        let animation_time = f.animation_time();
        let (apply_time, collect_events) = if f.reverse {
            (animation.duration - animation_time, false)
        } else {
            (animation_time, mix < f.event_threshold)
        };
        let modes = f.timeline_mode.clone();
        let hold_mix = f.timeline_hold_mix.clone();
        let first_frame = f.timelines_rotation.len() != count * 2;
        if first_frame {
            f.timelines_rotation = vec![0.0; count * 2];
        }
        let mut rotation = std::mem::take(&mut f.timelines_rotation);

        let mut fired = Vec::new();
        let mut events = collect_events.then_some(&mut fired);
        let unkeyed_state = self.unkeyed_state;

        if blend == MixBlend::Add {
            for timeline in &animation.timelines {
                timeline.apply(
                    skeleton,
                    animation_last,
                    apply_time,
                    events.as_deref_mut(),
                    alpha_mix,
                    blend,
                    MixDirection::Out,
                );
            }
        } else {
            let mut total_alpha = 0.0;
            for (i, timeline) in animation.timelines.iter().enumerate() {
                let is_draw_order = matches!(timeline, Timeline::DrawOrder(_));
                let (timeline_blend, alpha) = match modes.get(i).copied() {
                    Some(TimelineMode::Subsequent) => {
                        if !draw_order && is_draw_order {
                            continue;
                        }
                        (blend, alpha_mix)
                    }
                    Some(TimelineMode::First) | None => (MixBlend::Setup, alpha_mix),
                    Some(TimelineMode::HoldSubsequent) => (blend, alpha_hold),
                    Some(TimelineMode::HoldFirst) => (MixBlend::Setup, alpha_hold),
                    Some(TimelineMode::HoldMix) => {
                        let holder = hold_mix
                            .get(i)
                            .copied()
                            .flatten()
                            .and_then(|h| self.entry(h));
                        let fade = match holder {
                            Some(h) if h.mix_duration > 0.0 => {
                                (1.0 - h.mix_time / h.mix_duration).max(0.0)
                            }
                            Some(_) => 0.0,
                            None => 1.0,
                        };
                        (MixBlend::Setup, alpha_hold * fade)
                    }
                };
                total_alpha += alpha;

                match timeline {
                    Timeline::Rotate(t) => apply_rotate_timeline(
                        timeline,
                        t,
                        skeleton,
                        apply_time,
                        alpha,
                        timeline_blend,
                        &mut rotation[i * 2..i * 2 + 2],
                        first_frame,
                    ),
                    Timeline::Attachment(t) => apply_attachment_timeline(
                        t,
                        skeleton,
                        apply_time,
                        timeline_blend,
                        attachments,
                        unkeyed_state,
                    ),
                    _ => {
                        let direction = if draw_order
                            && is_draw_order
                            && timeline_blend == MixBlend::Setup
                        {
                            MixDirection::In
                        } else {
                            MixDirection::Out
                        };
                        timeline.apply(
                            skeleton,
                            animation_last,
                            apply_time,
                            events.as_deref_mut(),
                            alpha,
                            timeline_blend,
                            direction,
                        );
                    }
                }
            }
            if let Some(f) = self.entry_mut(from) {
                f.total_alpha = total_alpha;
            }
        }

        if let Some(f) = self.entry_mut(from) {
            f.timelines_rotation = rotation;
        }
        if to_mix_duration > 0.0 {
            self.queue_events(from, animation_time, &fired);
        }
        if let Some(f) = self.entry_mut(from) {
            f.next_animation_last = animation_time;
            f.next_track_last = f.track_time;
        }
        mix
    }

    /// Queues fired keys and `Complete`. Keys before the loop wrap come before `Complete`.
    fn queue_events(&mut self, handle: TrackEntryHandle, animation_time: f32, fired: &[Event]) {
        let Some(entry) = self.entry(handle) else {
            return;
        };
        let (start, end) = (entry.animation_start, entry.animation_end);
        let duration = end - start;
        let track_last_wrapped = entry.track_last % duration;
        let complete = if entry.looped {
            duration == 0.0 || track_last_wrapped > entry.track_time % duration
        } else {
            animation_time >= end && entry.animation_last < end
        };

        let split = fired
            .iter()
            .position(|e| e.time < track_last_wrapped)
            .unwrap_or(fired.len());
        let (before, after) = fired.split_at(split);
        for event in before.iter().filter(|e| e.time <= end) {
            self.queue(handle, AnimationStateEvent::Event(event.clone()));
        }
        if complete {
            self.queue(handle, AnimationStateEvent::Complete);
        }
        for event in after.iter().filter(|e| e.time >= start) {
            self.queue(handle, AnimationStateEvent::Event(event.clone()));
        }
    }

    fn set_animation_at(
        &mut self,
        track_index: usize,
        animation: Option<usize>,
        looped: bool,
    ) -> TrackEntryHandle {
        let mut interrupt = true;
        let mut current = self.expand_to_index(track_index);
        if let Some(cur) = current {
            let never_applied = self
                .entry(cur)
                .is_some_and(|e| e.next_track_last == -1.0);
            if never_applied {
                // Don't mix from an entry that was never applied.
                let from = self.entry(cur).and_then(|e| e.mixing_from);
                self.tracks[track_index].current = from;
                self.queue(cur, AnimationStateEvent::Interrupt);
                self.queue(cur, AnimationStateEvent::End);
                self.clear_next(track_index);
                current = from;
                interrupt = false;
            } else {
                self.clear_next(track_index);
            }
        }
        let handle = self.new_entry(track_index, animation, looped, current);
        self.set_current(track_index, handle, interrupt);
        debug!(
            "track {track_index} set to '{}'",
            self.entry(handle).map_or("", |e| e.animation_name())
        );
        self.drain();
        handle
    }

    fn add_animation_at(
        &mut self,
        track_index: usize,
        animation: Option<usize>,
        looped: bool,
        delay: f32,
    ) -> TrackEntryHandle {
        self.expand_to_index(track_index);
        let track = &self.tracks[track_index];
        let last = track.queue.back().copied().or(track.current);

        let handle = self.new_entry(track_index, animation, looped, last);
        let mut delay = delay;
        match last {
            None => {
                self.set_current(track_index, handle, true);
                self.drain();
            }
            Some(last) => {
                self.tracks[track_index].queue.push_back(handle);
                if delay <= 0.0 {
                    let track_complete = self.entry(last).map_or(0.0, TrackEntry::track_complete);
                    let mix_duration = self.entry(handle).map_or(0.0, |e| e.mix_duration);
                    delay += track_complete - mix_duration;
                }
            }
        }
        if let Some(entry) = self.entry_mut(handle) {
            entry.delay = delay;
        }
        debug!(
            "track {track_index} queued '{}' with delay {delay}",
            self.entry(handle).map_or("", |e| e.animation_name())
        );
        handle
    }

    fn new_entry(
        &mut self,
        track_index: usize,
        animation: Option<usize>,
        looped: bool,
        last: Option<TrackEntryHandle>,
    ) -> TrackEntryHandle {
        let mut entry = TrackEntry::new(track_index, animation, &self.data.skeleton_data, looped);
        if let Some(last) = last.and_then(|h| self.entry(h)) {
            entry.mix_duration = self.data.mix_duration(last.animation, animation);
        }
        self.alloc(entry)
    }

    fn set_current(&mut self, track_index: usize, current: TrackEntryHandle, interrupt: bool) {
        let from = self.expand_to_index(track_index);
        self.tracks[track_index].current = Some(current);

        if let Some(from) = from {
            if interrupt {
                self.queue(from, AnimationStateEvent::Interrupt);
            }
            let interrupted = self.entry(from).and_then(|f| {
                (f.mixing_from.is_some() && f.mix_duration > 0.0)
                    .then(|| (f.mix_time / f.mix_duration).min(1.0))
            });
            if let Some(e) = self.entry_mut(current) {
                e.mixing_from = Some(from);
                e.mix_time = 0.0;
                // Keep the percentage of the interrupted mix.
                if let Some(percent) = interrupted {
                    e.interrupt_alpha *= percent;
                }
            }
            if let Some(f) = self.entry_mut(from) {
                f.mixing_to = Some(current);
                f.timelines_rotation.clear();
            }
        }

        self.queue(current, AnimationStateEvent::Start);
    }

    fn expand_to_index(&mut self, track_index: usize) -> Option<TrackEntryHandle> {
        if track_index >= self.tracks.len() {
            self.tracks.resize_with(track_index + 1, Track::default);
            return None;
        }
        self.tracks[track_index].current
    }

    fn clear_next(&mut self, track_index: usize) {
        let queued: Vec<_> = self.tracks[track_index].queue.drain(..).collect();
        for handle in queued {
            self.queue(handle, AnimationStateEvent::Dispose);
        }
    }

    fn update_timeline_modes(&mut self) {
        self.animations_changed = false;
        self.property_ids.clear();

        for track_index in 0..self.tracks.len() {
            let Some(mut entry) = self.tracks[track_index].current else {
                continue;
            };
            while let Some(from) = self.entry(entry).and_then(|e| e.mixing_from) {
                entry = from;
            }
            let mut walk = Some(entry);
            while let Some(handle) = walk {
                let Some(e) = self.entry(handle) else {
                    break;
                };
                walk = e.mixing_to;
                if e.mixing_to.is_none() || e.mix_blend != MixBlend::Add {
                    self.compute_hold(handle);
                }
            }
        }
    }

    fn compute_hold(&mut self, handle: TrackEntryHandle) {
        let data = Arc::clone(&self.data.skeleton_data);
        let Some(entry) = self.entry(handle) else {
            return;
        };
        let animation = animation_of(&data, entry.animation);
        let to = entry.mixing_to.and_then(|to| self.entry(to)).map(|to| {
            (
                to.hold_previous,
                animation_of(&data, to.animation),
                to.mixing_to,
            )
        });
        let count = animation.timelines.len();
        let mut modes = vec![TimelineMode::First; count];
        let mut hold_mix = vec![None; count];

        match to {
            Some((true, _, _)) => {
                for (i, timeline) in animation.timelines.iter().enumerate() {
                    modes[i] = if self.add_property_ids(&timeline.property_ids()) {
                        TimelineMode::HoldFirst
                    } else {
                        TimelineMode::HoldSubsequent
                    };
                }
            }
            _ => {
                for (i, timeline) in animation.timelines.iter().enumerate() {
                    let ids = timeline.property_ids();
                    if !self.add_property_ids(&ids) {
                        modes[i] = TimelineMode::Subsequent;
                        continue;
                    }
                    let Some((_, to_animation, to_mixing_to)) = to else {
                        continue;
                    };
                    let discrete = matches!(
                        timeline,
                        Timeline::Attachment(_) | Timeline::DrawOrder(_) | Timeline::Event(_)
                    );
                    if discrete || !to_animation.has_any_property(&ids) {
                        continue;
                    }
                    modes[i] = TimelineMode::HoldFirst;
                    let mut next = to_mixing_to;
                    while let Some(n) = next.and_then(|n| self.entry(n).map(|e| (n, e))) {
                        let (next_handle, next_entry) = n;
                        if animation_of(&data, next_entry.animation).has_any_property(&ids) {
                            next = next_entry.mixing_to;
                            continue;
                        }
                        if next_entry.mix_duration > 0.0 {
                            modes[i] = TimelineMode::HoldMix;
                            hold_mix[i] = Some(next_handle);
                        }
                        break;
                    }
                }
            }
        }

        if let Some(entry) = self.entry_mut(handle) {
            entry.timeline_mode = modes;
            entry.timeline_hold_mix = hold_mix;
        }
    }

    /// Records the ids and returns true if any was not recorded before.
    fn add_property_ids(&mut self, ids: &[PropertyId]) -> bool {
        let before = self.property_ids.len();
        self.property_ids.extend(ids.iter().cloned());
        self.property_ids.len() != before
    }

    fn alloc(&mut self, entry: TrackEntry) -> TrackEntryHandle {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.entries[index];
            slot.entry = Some(entry);
            return TrackEntryHandle {
                index,
                generation: slot.generation,
            };
        }
        self.entries.push(EntrySlot {
            generation: 0,
            entry: Some(entry),
        });
        TrackEntryHandle {
            index: self.entries.len() - 1,
            generation: 0,
        }
    }

    fn queue(&mut self, handle: TrackEntryHandle, event: AnimationStateEvent) {
        let Some(entry) = self.entry(handle) else {
            return;
        };
        let record = TrackEvent {
            track_index: entry.track_index,
            entry: handle,
            animation: entry.animation_name.clone(),
            event,
        };
        match record.event {
            AnimationStateEvent::Start => self.animations_changed = true,
            AnimationStateEvent::End => {
                self.animations_changed = true;
                let dispose = TrackEvent {
                    event: AnimationStateEvent::Dispose,
                    ..record.clone()
                };
                self.events.push(record);
                self.events.push(dispose);
                self.disposed.push(handle);
                return;
            }
            AnimationStateEvent::Dispose => self.disposed.push(handle),
            _ => {}
        }
        self.events.push(record);
    }

    /// Frees entries disposed since the last drain. Their handles go stale.
    fn drain(&mut self) {
        for handle in std::mem::take(&mut self.disposed) {
            let Some(slot) = self.entries.get_mut(handle.index) else {
                continue;
            };
            if slot.generation != handle.generation || slot.entry.is_none() {
                continue;
            }
            slot.entry = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(handle.index);
        }
    }
}

fn apply_attachment_timeline(
    timeline: &AttachmentTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    blend: MixBlend,
    attachments: bool,
    unkeyed_state: u32,
) {
    let Some(slot) = skeleton.slots.get(timeline.slot) else {
        return;
    };
    if !skeleton.bones.get(slot.bone).is_some_and(|b| b.active) {
        return;
    }

    let name = match timeline.frame_at(time) {
        Some(frame) => Some(timeline.frames[frame].name.clone()),
        None if matches!(blend, MixBlend::Setup | MixBlend::First) => Some(
            skeleton
                .data
                .slots
                .get(timeline.slot)
                .and_then(|s| s.attachment.clone()),
        ),
        None => None,
    };
    if let Some(name) = name {
        skeleton.set_slot_attachment(timeline.slot, name.as_deref());
        if attachments {
            skeleton.slots[timeline.slot].attachment_state =
                unkeyed_state.wrapping_add(ANIMATION_STATE_CURRENT);
        }
    }

    // Not set this frame: restore the setup attachment after all tracks are applied.
    let slot = &mut skeleton.slots[timeline.slot];
    if slot.attachment_state <= unkeyed_state {
        slot.attachment_state = unkeyed_state.wrapping_add(ANIMATION_STATE_SETUP);
    }
}

/// Rotation mixing that keeps the direction chosen on the first frame, so a crossfade between
/// rotations more than 180 degrees apart does not flip midway. `state` holds the accumulated
/// total and the last difference.
#[allow(clippy::too_many_arguments)]
fn apply_rotate_timeline(
    timeline: &Timeline,
    rotate: &CurveTimeline<1>,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
    state: &mut [f32],
    first_frame: bool,
) {
    if first_frame {
        state[0] = 0.0;
    }
    if alpha == 1.0 {
        timeline.apply(skeleton, 0.0, time, None, 1.0, blend, MixDirection::In);
        return;
    }

    let data = Arc::clone(&skeleton.data);
    let (Some(bone), Some(bone_data)) = (
        skeleton.bones.get_mut(rotate.target),
        data.bones.get(rotate.target),
    ) else {
        return;
    };
    if !bone.active {
        return;
    }
    let setup = bone_data.rotation;
    let (r1, r2) = match sample(&rotate.frames, time) {
        None => match blend {
            MixBlend::Setup => {
                bone.rotation = setup;
                return;
            }
            MixBlend::First => (bone.rotation, setup),
            MixBlend::Replace | MixBlend::Add => return,
        },
        Some([value]) => {
            let from = if blend == MixBlend::Setup {
                setup
            } else {
                bone.rotation
            };
            (from, setup + value)
        }
    };

    let diff = shortest_angle(r2 - r1);
    let total = if diff == 0.0 {
        state[0]
    } else {
        let (mut last_total, last_diff) = if first_frame {
            (0.0, diff)
        } else {
            (state[0], state[1])
        };
        let current = diff > 0.0;
        let mut dir = last_total >= 0.0;
        // A sign change near 0 (not 180) is a cross; after a full turn it is a loop.
        if signum(last_diff) != signum(diff) && last_diff.abs() <= 90.0 {
            if last_total.abs() > 180.0 {
                last_total += 360.0 * signum(last_total);
            }
            dir = current;
        }
        let mut total = diff + last_total - last_total % 360.0;
        if dir != current {
            total += 360.0 * signum(last_total);
        }
        state[0] = total;
        total
    };
    state[1] = diff;
    bone.rotation = r1 + total * alpha;
}

/// Wraps a rotation difference into `[-180, 180)`.
fn shortest_angle(diff: f32) -> f32 {
    let turns = 16384 - (16384.499999999996_f64 - f64::from(diff) / 360.0) as i32;
    diff - (turns as f32) * 360.0
}
