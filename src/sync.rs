//! Tap-to-sync: stamp lyric lines with playback positions as the operator
//! taps along.

use crate::error::{LyrvidError, LyrvidResult};
use crate::store::LyricStore;

/// External playback collaborator (an audio element, a fake clock in tests,
/// or the offline export clock).
pub trait PlaybackClock {
    fn current_time(&self) -> f64;
    fn seek(&mut self, secs: f64);
    fn play(&mut self);
    fn pause(&mut self);
    /// Total media duration, or `None` when nothing is loaded.
    fn duration(&self) -> Option<f64>;
}

/// Grace period after the last tap before the session auto-stops.
const DRAIN_SECS: f64 = 1.5;

#[derive(Clone, Copy, Debug, PartialEq)]
enum SyncState {
    Idle,
    Syncing { cursor: usize },
    /// All lines tapped; waiting out the grace period.
    Draining { since: f64 },
}

/// Drives a sync session over a [`LyricStore`] and a [`PlaybackClock`].
///
/// Starting a session wipes all recorded start times, locks the store
/// against structural edits, and restarts playback from zero. Each tap
/// stamps the next line with the clock's current position.
pub struct SyncEngine {
    state: SyncState,
}

impl Default for SyncEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncEngine {
    pub fn new() -> Self {
        Self {
            state: SyncState::Idle,
        }
    }

    pub fn is_syncing(&self) -> bool {
        !matches!(self.state, SyncState::Idle)
    }

    /// Index of the next line to be stamped, while syncing.
    pub fn cursor(&self) -> Option<usize> {
        match self.state {
            SyncState::Syncing { cursor } => Some(cursor),
            _ => None,
        }
    }

    pub fn start(
        &mut self,
        store: &mut LyricStore,
        clock: &mut impl PlaybackClock,
    ) -> LyrvidResult<()> {
        if store.is_empty() {
            return Err(LyrvidError::validation("no lyric lines loaded"));
        }
        if clock.duration().is_none() {
            return Err(LyrvidError::validation("no audio loaded"));
        }

        store.reset_all_start_times();
        store.lock();
        clock.seek(0.0);
        clock.play();
        self.state = SyncState::Syncing { cursor: 0 };
        Ok(())
    }

    /// Stamp the line under the cursor with the current playback position.
    ///
    /// Ignored outside a session. The final tap starts the drain period.
    pub fn tap(&mut self, store: &mut LyricStore, clock: &impl PlaybackClock) {
        let SyncState::Syncing { cursor } = self.state else {
            return;
        };

        let now = clock.current_time();
        store.record_tap(cursor, now);

        let next = cursor + 1;
        if next >= store.len() {
            self.state = SyncState::Draining { since: now };
        } else {
            self.state = SyncState::Syncing { cursor: next };
        }
    }

    /// Advance session housekeeping; call once per UI/render tick.
    pub fn tick(&mut self, store: &mut LyricStore, clock: &mut impl PlaybackClock) {
        if let SyncState::Draining { since } = self.state
            && clock.current_time() - since >= DRAIN_SECS
        {
            self.stop(store, clock);
        }
    }

    /// End the session: pause playback and release the store's edit lock.
    pub fn stop(&mut self, store: &mut LyricStore, clock: &mut impl PlaybackClock) {
        if matches!(self.state, SyncState::Idle) {
            return;
        }
        clock.pause();
        store.unlock();
        self.state = SyncState::Idle;
    }
}
