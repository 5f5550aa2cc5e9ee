//! The player's state machine.
//!
//! All mutation of player state goes through [`PlayerState::dispatch`], which takes an
//! [`Action`] and returns the [`Effect`]s the caller has to carry out against the audio engine.
//! The state never touches a [`Sound`](crate::audio::Sound) itself; instead every acquisition is
//! tagged with a generation number, and anything that comes back with an older generation is
//! stale and gets thrown away.

use std::time::Duration;

use log::{debug, error, info};

use crate::{
    audio::SoundStatus,
    queue::{Queue, Record},
};

/// How far (in seconds) a reported position may be from a pending seek target and still count as
/// confirming it.
const SEEK_TOLERANCE_SECS: u64 = 1;

/// An [`Action`] corresponds to a mutation of the player state. Actions are semantic: 'the user
/// wants to go to the next record', not 'the user pressed c'.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// (Re)acquire the resource for the currently selected record.
    LoadRecord,
    /// A load finished.
    ResourceReady { generation: u64, duration: Option<Duration> },
    /// A load failed.
    ResourceFailed { generation: u64, error: String },
    /// The resource's status changed.
    Tick { generation: u64, status: SoundStatus },
    /// Jump to the given second.
    Seek(u64),
    /// The resource refused a seek. `position` is where it actually is.
    SeekFailed { generation: u64, position: Duration, error: String },
    /// The user dragged the progress bar to the given (fractional) second.
    Scrub(f64),
    Rewind,
    PlayPause,
    Next,
    /// The player is going away; release everything.
    Teardown,
}

/// Something the owner of the audio engine has to do in response to an [`Action`].
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Start loading `uri`, positioned at `start_at`, and report back with `generation`.
    Load { generation: u64, uri: String, start_at: Duration },
    /// The sound loaded for `generation` should become the one that's played.
    Attach { generation: u64 },
    /// The sound loaded for `generation` is stale and should be unloaded without being attached.
    Discard { generation: u64 },
    /// Release the sound for `generation`.
    Unload { generation: u64 },
    Seek { generation: u64, to: Duration },
    /// Query the sound's status and flip it between playing and paused.
    TogglePlayback { generation: u64 },
    Report(Diagnostic),
}

/// Things that went wrong (or just didn't happen) that are worth a line in the log, but never
/// worth bothering the user about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Play/pause was requested before the resource finished loading.
    NotLoaded,
    /// The resource said it was unloaded in a status update.
    ResourceUnloaded { generation: u64 },
    LoadFailed { generation: u64, error: String },
    SeekFailed { generation: u64, error: String },
    /// Something arrived for a generation we no longer care about.
    Stale { generation: u64, current: u64 },
}

impl Diagnostic {
    pub fn log(&self) {
        match self {
            Diagnostic::NotLoaded => info!("Not loaded yet, cannot play"),
            Diagnostic::ResourceUnloaded { generation } => {
                error!("Sound {generation} reported itself as unloaded")
            }
            Diagnostic::LoadFailed { generation, error } => {
                error!("Failed to load sound {generation}: {error}")
            }
            Diagnostic::SeekFailed { generation, error } => {
                error!("Seeking sound {generation} failed: {error}")
            }
            Diagnostic::Stale { generation, current } => {
                debug!("Ignoring sound {generation}, current is {current}")
            }
        }
    }
}

/// Where we are with the (at most one) audio resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceSlot {
    /// Nothing held, nothing in flight.
    Idle,
    Loading { generation: u64 },
    Ready { generation: u64 },
    /// Torn down. Nothing will be loaded again.
    Released,
}

impl ResourceSlot {
    fn held(self) -> Option<u64> {
        match self {
            ResourceSlot::Loading { generation } | ResourceSlot::Ready { generation } => {
                Some(generation)
            }
            ResourceSlot::Idle | ResourceSlot::Released => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlayerState {
    queue: Queue,
    placeholder: Record,
    /// `None` means there's no record, which only happens if the queue is empty.
    current_record_index: Option<usize>,
    current_time: u64,
    total_duration: u64,
    /// Exact length reported by the loaded resource, if it reported one.
    resource_duration: Option<Duration>,
    slot: ResourceSlot,
    generation: u64,
    /// A seek we've asked the resource for but haven't seen a status update confirm.
    pending_seek: Option<u64>,
    rewind_seconds: u64,
}

impl PlayerState {
    pub fn new(queue: Queue, placeholder: Record, rewind_seconds: u64) -> Self {
        let current_record_index = if queue.is_empty() { None } else { Some(0) };
        let mut state = Self {
            queue,
            placeholder,
            current_record_index,
            current_time: 0,
            total_duration: 0,
            resource_duration: None,
            slot: ResourceSlot::Idle,
            generation: 0,
            pending_seek: None,
            rewind_seconds,
        };
        state.total_duration = state.record().duration_secs();
        state
    }

    /// The selected record, or the placeholder if nothing is selected.
    pub fn record(&self) -> &Record {
        self.current_record_index.and_then(|i| self.queue.get(i)).unwrap_or(&self.placeholder)
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn current_record_index(&self) -> Option<usize> {
        self.current_record_index
    }

    /// The index with `-1` standing in for "no record".
    pub fn current_record_index_signed(&self) -> i64 {
        self.current_record_index.map_or(-1, |i| i as i64)
    }

    pub fn current_time(&self) -> u64 {
        self.current_time
    }

    pub fn total_duration(&self) -> u64 {
        self.total_duration
    }

    pub fn slot(&self) -> ResourceSlot {
        self.slot
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn pending_seek(&self) -> Option<u64> {
        self.pending_seek
    }

    pub fn dispatch(&mut self, action: Action) -> Vec<Effect> {
        use Action::*;
        let mut effects = vec![];
        match action {
            LoadRecord => self.load_record(&mut effects),
            ResourceReady { generation, duration } => {
                if !self.is_current(generation, ResourceSlot::Loading { generation }) {
                    effects.push(Effect::Discard { generation });
                    effects.push(self.stale(generation));
                    return effects;
                }
                self.slot = ResourceSlot::Ready { generation };
                if let Some(duration) = duration {
                    self.total_duration = ceil_secs(duration);
                }
                self.resource_duration = duration;
                effects.push(Effect::Attach { generation });
                if let Some(target) = self.pending_seek {
                    effects.push(Effect::Seek { generation, to: self.seek_position(target) });
                }
            }
            ResourceFailed { generation, error } => {
                if !self.is_current(generation, ResourceSlot::Loading { generation }) {
                    effects.push(self.stale(generation));
                    return effects;
                }
                self.slot = ResourceSlot::Idle;
                self.pending_seek = None;
                effects.push(Effect::Report(Diagnostic::LoadFailed { generation, error }));
            }
            Tick { generation, status } => {
                // stale ticks are routine (the old sound's last update racing a next), so they
                // don't even get a diagnostic
                if !self.is_current(generation, ResourceSlot::Ready { generation }) {
                    return effects;
                }
                if !status.is_loaded {
                    effects.push(Effect::Report(Diagnostic::ResourceUnloaded { generation }));
                    return effects;
                }
                let position = ceil_secs(status.position);
                match self.pending_seek {
                    Some(target) if position.abs_diff(target) <= SEEK_TOLERANCE_SECS => {
                        self.pending_seek = None;
                        self.current_time = position;
                    }
                    Some(_) => (),
                    None => self.current_time = position,
                }
            }
            Seek(seconds) => self.seek(seconds, &mut effects),
            SeekFailed { generation, position, error } => {
                if !self.is_current(generation, ResourceSlot::Ready { generation }) {
                    return effects;
                }
                // nothing is going to confirm the target, so trust the resource again
                self.pending_seek = None;
                self.current_time = ceil_secs(position);
                effects.push(Effect::Report(Diagnostic::SeekFailed { generation, error }));
            }
            Scrub(seconds) => {
                let seconds = if seconds.is_finite() && seconds > 0.0 { seconds.floor() } else { 0.0 };
                self.seek(seconds as u64, &mut effects);
            }
            Rewind => self.seek(self.current_time.saturating_sub(self.rewind_seconds), &mut effects),
            PlayPause => match self.slot {
                ResourceSlot::Ready { generation } => {
                    effects.push(Effect::TogglePlayback { generation })
                }
                _ => effects.push(Effect::Report(Diagnostic::NotLoaded)),
            },
            Next => {
                let Some(index) = self.current_record_index else {
                    self.current_time = 0;
                    return effects;
                };
                let next = (index + 1).min(self.queue.len() - 1);
                self.current_time = 0;
                if next != index {
                    self.current_record_index = Some(next);
                    self.load_record(&mut effects);
                } else {
                    // last record: there's nothing to advance to, so just go back to its start
                    self.seek(0, &mut effects);
                }
            }
            Teardown => {
                if let Some(generation) = self.slot.held() {
                    effects.push(Effect::Unload { generation });
                }
                if self.slot != ResourceSlot::Released {
                    self.generation += 1;
                }
                self.slot = ResourceSlot::Released;
                self.pending_seek = None;
            }
        }
        effects
    }

    fn load_record(&mut self, effects: &mut Vec<Effect>) {
        if self.slot == ResourceSlot::Released {
            return;
        }
        self.total_duration = self.record().duration_secs();
        self.resource_duration = None;
        self.pending_seek = None;
        if let Some(generation) = self.slot.held() {
            effects.push(Effect::Unload { generation });
        }
        self.generation += 1;
        let uri = self.record().uri.clone();
        if uri.is_empty() {
            debug!("Record {:?} has no uri, not loading anything", self.record().description);
            self.slot = ResourceSlot::Idle;
            return;
        }
        self.slot = ResourceSlot::Loading { generation: self.generation };
        effects.push(Effect::Load {
            generation: self.generation,
            uri,
            start_at: Duration::from_secs(self.current_time),
        });
    }

    fn seek(&mut self, seconds: u64, effects: &mut Vec<Effect>) {
        let target = if self.total_duration > 0 { seconds.min(self.total_duration) } else { seconds };
        self.current_time = target;
        match self.slot {
            ResourceSlot::Ready { generation } => {
                self.pending_seek = Some(target);
                effects.push(Effect::Seek { generation, to: self.seek_position(target) });
            }
            // the seek gets sent once the load finishes
            ResourceSlot::Loading { .. } => self.pending_seek = Some(target),
            ResourceSlot::Idle | ResourceSlot::Released => (),
        }
    }

    /// Where to actually seek the resource for a target in whole seconds. The displayed duration
    /// is rounded up, so its last second can lie past the real end of the audio.
    fn seek_position(&self, seconds: u64) -> Duration {
        let to = Duration::from_secs(seconds);
        match self.resource_duration {
            Some(end) => to.min(Duration::from_millis(end.as_millis() as u64)),
            None => to,
        }
    }

    fn is_current(&self, generation: u64, expected: ResourceSlot) -> bool {
        generation == self.generation && self.slot == expected
    }

    fn stale(&self, generation: u64) -> Effect {
        Effect::Report(Diagnostic::Stale { generation, current: self.generation })
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    duration.as_millis().div_ceil(1000) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(description: &str, duration: f64, uri: &str) -> Record {
        Record { description: description.into(), duration, uri: uri.into() }
    }

    fn ab_queue() -> Queue {
        Queue::new(vec![record("A", 30.0, "a"), record("B", 20.0, "b")])
    }

    fn player(queue: Queue) -> PlayerState {
        PlayerState::new(queue, Record::placeholder(""), 10)
    }

    /// A player for the A/B queue whose first sound has finished loading.
    fn ready_player() -> PlayerState {
        let mut player = player(ab_queue());
        player.dispatch(Action::LoadRecord);
        let generation = player.generation();
        player.dispatch(Action::ResourceReady { generation, duration: None });
        player
    }

    fn loaded_at(seconds: u64) -> SoundStatus {
        SoundStatus {
            is_loaded: true,
            is_playing: true,
            position: Duration::from_secs(seconds),
            duration: None,
        }
    }

    fn reports(effects: &[Effect]) -> Vec<&Diagnostic> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Report(diagnostic) => Some(diagnostic),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn initial_state_selects_first_record() {
        let player = player(ab_queue());
        assert_eq!(player.current_record_index(), Some(0));
        assert_eq!(player.record().description, "A");
        assert_eq!(player.total_duration(), 30, "duration should come from the record before load");
        assert_eq!(player.current_time(), 0);
        assert_eq!(player.slot(), ResourceSlot::Idle);
    }

    #[test]
    fn empty_queue_uses_placeholder() {
        let mut player = player(Queue::default());
        assert_eq!(player.current_record_index(), None);
        assert_eq!(player.current_record_index_signed(), -1);
        assert_eq!(player.record(), &Record::placeholder(""));
        assert_eq!(player.total_duration(), 5);
        assert!(player.dispatch(Action::LoadRecord).is_empty(), "empty uri shouldn't load");
        assert!(player.dispatch(Action::Next).is_empty());
        assert_eq!(player.current_record_index_signed(), -1);
    }

    #[test]
    fn configured_placeholder_is_loaded() {
        let mut player = PlayerState::new(Queue::default(), Record::placeholder("horn.mp3"), 10);
        let effects = player.dispatch(Action::LoadRecord);
        assert_eq!(
            effects,
            vec![Effect::Load { generation: 1, uri: "horn.mp3".into(), start_at: Duration::ZERO }]
        );
    }

    #[test]
    fn rewind_floors_at_zero() {
        for t in [0, 1, 9, 10, 11, 25, 30] {
            let mut player = ready_player();
            player.dispatch(Action::Seek(t));
            player.dispatch(Action::Rewind);
            assert_eq!(player.current_time(), t.saturating_sub(10), "rewind from {t}");
        }
    }

    #[test]
    fn rewind_seeks_the_resource() {
        let mut player = ready_player();
        let generation = player.generation();
        player.dispatch(Action::Seek(25));
        let effects = player.dispatch(Action::Rewind);
        assert_eq!(effects, vec![Effect::Seek { generation, to: Duration::from_secs(15) }]);
        assert_eq!(player.pending_seek(), Some(15));
    }

    #[test]
    fn next_clamps_at_end() {
        for n in 1..5 {
            for i in 0..n {
                let queue: Queue =
                    (0..n).map(|j| record(&j.to_string(), 10.0, &j.to_string())).collect();
                let mut player = player(queue);
                player.current_record_index = Some(i);
                player.current_time = 7;
                player.dispatch(Action::Next);
                assert_eq!(player.current_record_index(), Some((i + 1).min(n - 1)));
                assert_eq!(player.current_time(), 0);
            }
        }
    }

    #[test]
    fn next_three_times_on_two_records() {
        let mut player = ready_player();
        for _ in 0..3 {
            player.current_time = 12;
            player.dispatch(Action::Next);
            assert_eq!(player.current_time(), 0);
        }
        assert_eq!(player.current_record_index(), Some(1));
        assert_eq!(player.record().description, "B");
    }

    #[test]
    fn next_releases_then_acquires() {
        let mut player = ready_player();
        let old = player.generation();
        let effects = player.dispatch(Action::Next);
        assert_eq!(
            effects,
            vec![
                Effect::Unload { generation: old },
                Effect::Load { generation: old + 1, uri: "b".into(), start_at: Duration::ZERO },
            ]
        );
        assert_eq!(player.total_duration(), 20);
        assert_eq!(player.slot(), ResourceSlot::Loading { generation: old + 1 });
    }

    #[test]
    fn next_on_last_record_restarts_it() {
        let mut player = ready_player();
        player.dispatch(Action::Next);
        let generation = player.generation();
        player.dispatch(Action::ResourceReady { generation, duration: None });
        player.current_time = 15;
        let effects = player.dispatch(Action::Next);
        assert_eq!(effects, vec![Effect::Seek { generation, to: Duration::ZERO }]);
        assert_eq!(player.current_time(), 0);
    }

    #[test]
    fn resource_duration_overrides_record() {
        let mut player = player(ab_queue());
        player.dispatch(Action::LoadRecord);
        let generation = player.generation();
        let effects = player.dispatch(Action::ResourceReady {
            generation,
            duration: Some(Duration::from_millis(41_200)),
        });
        assert_eq!(effects, vec![Effect::Attach { generation }]);
        assert_eq!(player.total_duration(), 42);
    }

    #[test]
    fn play_pause_before_load_is_dropped() {
        let mut player = player(ab_queue());
        player.dispatch(Action::LoadRecord);
        let effects = player.dispatch(Action::PlayPause);
        assert_eq!(effects, vec![Effect::Report(Diagnostic::NotLoaded)]);
        assert_eq!(reports(&effects).len(), 1);
        assert_eq!(player.slot(), ResourceSlot::Loading { generation: 1 });
    }

    #[test]
    fn play_pause_when_ready_toggles() {
        let mut player = ready_player();
        let generation = player.generation();
        assert_eq!(
            player.dispatch(Action::PlayPause),
            vec![Effect::TogglePlayback { generation }]
        );
    }

    #[test]
    fn ticks_update_time() {
        let mut player = ready_player();
        let generation = player.generation();
        let status = SoundStatus { position: Duration::from_millis(3_200), ..loaded_at(0) };
        player.dispatch(Action::Tick { generation, status });
        assert_eq!(player.current_time(), 4);
    }

    #[test]
    fn stale_results_are_ignored() {
        let mut player = ready_player();
        let old = player.generation();
        player.dispatch(Action::Next);

        player.dispatch(Action::Tick { generation: old, status: loaded_at(25) });
        assert_eq!(player.current_time(), 0);

        let effects = player.dispatch(Action::ResourceReady { generation: old, duration: None });
        assert_eq!(effects[0], Effect::Discard { generation: old });
        assert_eq!(player.slot(), ResourceSlot::Loading { generation: old + 1 });
    }

    #[test]
    fn unloaded_tick_is_reported_without_state_change() {
        let mut player = ready_player();
        let generation = player.generation();
        player.dispatch(Action::Tick { generation, status: loaded_at(5) });
        let status = SoundStatus { is_loaded: false, ..Default::default() };
        let effects = player.dispatch(Action::Tick { generation, status });
        assert_eq!(effects, vec![Effect::Report(Diagnostic::ResourceUnloaded { generation })]);
        assert_eq!(player.current_time(), 5);
    }

    #[test]
    fn seek_waits_for_confirmation() {
        let mut player = ready_player();
        let generation = player.generation();
        player.dispatch(Action::Scrub(20.7));
        assert_eq!(player.current_time(), 20);

        // an update from before the seek landed shouldn't undo it
        player.dispatch(Action::Tick { generation, status: loaded_at(3) });
        assert_eq!(player.current_time(), 20);
        assert_eq!(player.pending_seek(), Some(20));

        player.dispatch(Action::Tick { generation, status: loaded_at(20) });
        assert_eq!(player.pending_seek(), None);
        player.dispatch(Action::Tick { generation, status: loaded_at(21) });
        assert_eq!(player.current_time(), 21);
    }

    #[test]
    fn seek_clamps_to_duration() {
        let mut player = ready_player();
        player.dispatch(Action::Seek(500));
        assert_eq!(player.current_time(), 30);
    }

    #[test]
    fn seek_past_real_end_is_clamped_to_it() {
        let mut player = player(ab_queue());
        player.dispatch(Action::LoadRecord);
        let generation = player.generation();
        let duration = Some(Duration::from_millis(2_500));
        player.dispatch(Action::ResourceReady { generation, duration });
        assert_eq!(player.total_duration(), 3);

        let effects = player.dispatch(Action::Scrub(3.0));
        assert_eq!(effects, vec![Effect::Seek { generation, to: Duration::from_millis(2_500) }]);
        assert_eq!(player.current_time(), 3);

        let status = SoundStatus { position: Duration::from_millis(2_500), ..loaded_at(0) };
        player.dispatch(Action::Tick { generation, status });
        assert_eq!(player.pending_seek(), None);
    }

    #[test]
    fn failed_seek_resyncs_with_resource() {
        let mut player = ready_player();
        let generation = player.generation();
        player.dispatch(Action::Seek(20));
        let effects = player.dispatch(Action::SeekFailed {
            generation,
            position: Duration::from_secs(3),
            error: "out of range".into(),
        });
        assert_eq!(
            effects,
            vec![Effect::Report(Diagnostic::SeekFailed { generation, error: "out of range".into() })]
        );
        assert_eq!(player.pending_seek(), None);
        assert_eq!(player.current_time(), 3);

        for t in 4..18 {
            player.dispatch(Action::Tick { generation, status: loaded_at(t) });
            assert_eq!(player.current_time(), t);
        }
    }

    #[test]
    fn stale_seek_failure_is_ignored() {
        let mut player = ready_player();
        let old = player.generation();
        player.dispatch(Action::Next);
        let effects = player.dispatch(Action::SeekFailed {
            generation: old,
            position: Duration::from_secs(9),
            error: "gone".into(),
        });
        assert!(effects.is_empty());
        assert_eq!(player.current_time(), 0);
    }

    #[test]
    fn seek_during_load_is_sent_when_ready() {
        let mut player = player(ab_queue());
        player.dispatch(Action::LoadRecord);
        let generation = player.generation();
        assert!(player.dispatch(Action::Seek(12)).is_empty());
        let effects = player.dispatch(Action::ResourceReady { generation, duration: None });
        assert_eq!(
            effects,
            vec![
                Effect::Attach { generation },
                Effect::Seek { generation, to: Duration::from_secs(12) },
            ]
        );
    }

    #[test]
    fn failed_load_is_reported() {
        let mut player = player(ab_queue());
        player.dispatch(Action::LoadRecord);
        let effects =
            player.dispatch(Action::ResourceFailed { generation: 1, error: "nope".into() });
        assert_eq!(
            effects,
            vec![Effect::Report(Diagnostic::LoadFailed { generation: 1, error: "nope".into() })]
        );
        assert_eq!(player.slot(), ResourceSlot::Idle);
        assert_eq!(player.dispatch(Action::PlayPause), vec![Effect::Report(Diagnostic::NotLoaded)]);
    }

    #[test]
    fn teardown_unloads_exactly_once() {
        let mut player = ready_player();
        let generation = player.generation();
        assert_eq!(player.dispatch(Action::Teardown), vec![Effect::Unload { generation }]);
        assert!(player.dispatch(Action::Teardown).is_empty());
        assert!(player.dispatch(Action::LoadRecord).is_empty());
    }

    #[test]
    fn load_completing_after_teardown_is_discarded() {
        let mut player = player(ab_queue());
        player.dispatch(Action::LoadRecord);
        let generation = player.generation();
        assert_eq!(player.dispatch(Action::Teardown), vec![Effect::Unload { generation }]);
        let effects = player.dispatch(Action::ResourceReady { generation, duration: None });
        assert_eq!(effects[0], Effect::Discard { generation });
        assert_eq!(player.slot(), ResourceSlot::Released);
    }
}
