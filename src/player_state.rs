//! Atomic state machine coordinating the pipeline's producer/consumer threads.
//!
//! Mirrors the reference implementation's `PlayerStateManager`: a single
//! atomic state cell, CAS-based transitions validated against a fixed
//! graph, and an observer list notified outside the lock that guards it
//! (callbacks may re-enter the manager, so the notification mutex is never
//! held while invoking them).

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::warn;
use parking_lot::{Condvar, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PlayerState {
    Idle = 0,
    Opening = 1,
    Stopped = 2,
    Playing = 3,
    Paused = 4,
    Seeking = 5,
    Buffering = 6,
    Error = 7,
}

impl PlayerState {
    fn from_u8(v: u8) -> Self {
        use PlayerState::*;
        match v {
            0 => Idle,
            1 => Opening,
            2 => Stopped,
            3 => Playing,
            4 => Paused,
            5 => Seeking,
            6 => Buffering,
            _ => Error,
        }
    }

    pub fn name(self) -> &'static str {
        use PlayerState::*;
        match self {
            Idle => "Idle",
            Opening => "Opening",
            Stopped => "Stopped",
            Playing => "Playing",
            Paused => "Paused",
            Seeking => "Seeking",
            Buffering => "Buffering",
            Error => "Error",
        }
    }
}

/// The transition table from spec §4.4, encoded as an allow-list.
fn is_valid_transition(from: PlayerState, to: PlayerState) -> bool {
    use PlayerState::*;
    matches!(
        (from, to),
        (Idle, Opening)
            | (Opening, Stopped)
            | (Opening, Error)
            | (Stopped, Idle)
            | (Stopped, Playing)
            | (Stopped, Seeking)
            | (Playing, Stopped)
            | (Playing, Paused)
            | (Playing, Seeking)
            | (Playing, Buffering)
            | (Playing, Error)
            | (Paused, Stopped)
            | (Paused, Playing)
            | (Paused, Seeking)
            | (Seeking, Stopped)
            | (Seeking, Playing)
            | (Seeking, Paused)
            | (Seeking, Buffering)
            | (Seeking, Error)
            | (Buffering, Stopped)
            | (Buffering, Playing)
            | (Buffering, Error)
            | (Error, Idle)
            | (Error, Stopped)
    )
}

type ChangeCallback = Arc<dyn Fn(PlayerState, PlayerState) + Send + Sync>;

struct Observers {
    next_id: i32,
    callbacks: Vec<(i32, ChangeCallback)>,
}

pub struct PlayerStateManager {
    state: AtomicU8,
    observers: Mutex<Observers>,
    pause_mutex: Mutex<()>,
    pause_cv: Condvar,
}

impl Default for PlayerStateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerStateManager {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(PlayerState::Idle as u8),
            observers: Mutex::new(Observers {
                next_id: 0,
                callbacks: Vec::new(),
            }),
            pause_mutex: Mutex::new(()),
            pause_cv: Condvar::new(),
        }
    }

    pub fn get_state(&self) -> PlayerState {
        PlayerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_idle(&self) -> bool {
        self.get_state() == PlayerState::Idle
    }
    pub fn is_opening(&self) -> bool {
        self.get_state() == PlayerState::Opening
    }
    pub fn is_stopped(&self) -> bool {
        self.get_state() == PlayerState::Stopped
    }
    pub fn is_playing(&self) -> bool {
        self.get_state() == PlayerState::Playing
    }
    pub fn is_paused(&self) -> bool {
        self.get_state() == PlayerState::Paused
    }
    pub fn is_seeking(&self) -> bool {
        self.get_state() == PlayerState::Seeking
    }
    pub fn is_buffering(&self) -> bool {
        self.get_state() == PlayerState::Buffering
    }
    pub fn is_error(&self) -> bool {
        self.get_state() == PlayerState::Error
    }

    pub fn should_stop(&self) -> bool {
        matches!(
            self.get_state(),
            PlayerState::Idle | PlayerState::Stopped | PlayerState::Error
        )
    }

    pub fn should_pause(&self) -> bool {
        matches!(
            self.get_state(),
            PlayerState::Paused | PlayerState::Buffering | PlayerState::Seeking
        )
    }

    /// Blocks until `Playing` or `should_stop()`. `timeout == None` waits
    /// forever. Returns true if resumed, false on timeout or stop.
    pub fn wait_for_resume(&self, timeout: Option<Duration>) -> bool {
        if !self.should_pause() {
            return !self.should_stop();
        }
        let mut guard = self.pause_mutex.lock();
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if self.should_stop() {
                return false;
            }
            if !self.should_pause() {
                return true;
            }
            match deadline {
                None => self.pause_cv.wait(&mut guard),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return !self.should_stop() && !self.should_pause();
                    }
                    self.pause_cv.wait_for(&mut guard, deadline - now);
                }
            }
        }
    }

    /// Atomic CAS with retry on contention; rejects invalid transitions
    /// without retrying (they are not a race, they're just illegal).
    pub fn request_state_change(&self, target: PlayerState) -> bool {
        loop {
            let current_raw = self.state.load(Ordering::Acquire);
            let current = PlayerState::from_u8(current_raw);
            if current == target {
                return true;
            }
            if !is_valid_transition(current, target) {
                warn!(
                    "rejected player state transition {} -> {}",
                    current.name(),
                    target.name()
                );
                return false;
            }
            if self
                .state
                .compare_exchange(
                    current_raw,
                    target as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                self.notify_state_change(current, target);
                if !matches!(target, PlayerState::Paused | PlayerState::Buffering | PlayerState::Seeking) {
                    let _guard = self.pause_mutex.lock();
                    self.pause_cv.notify_all();
                }
                return true;
            }
        }
    }

    fn notify_state_change(&self, old: PlayerState, new: PlayerState) {
        // Snapshot the callback list under the lock, then invoke outside it
        // so a callback calling back into the manager cannot deadlock.
        let snapshot: Vec<ChangeCallback> = {
            let observers = self.observers.lock();
            observers.callbacks.iter().map(|(_, cb)| cb.clone()).collect()
        };
        for cb in snapshot {
            cb(old, new);
        }
    }

    pub fn register_state_change_callback(
        &self,
        callback: impl Fn(PlayerState, PlayerState) + Send + Sync + 'static,
    ) -> i32 {
        let mut observers = self.observers.lock();
        let id = observers.next_id;
        observers.next_id += 1;
        observers.callbacks.push((id, Arc::new(callback)));
        id
    }

    pub fn unregister_state_change_callback(&self, id: i32) {
        let mut observers = self.observers.lock();
        observers.callbacks.retain(|(cb_id, _)| *cb_id != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions_from_playing() {
        let m = PlayerStateManager::new();
        assert!(m.request_state_change(PlayerState::Opening));
        assert!(m.request_state_change(PlayerState::Stopped));
        assert!(m.request_state_change(PlayerState::Playing));
        assert!(m.request_state_change(PlayerState::Paused));
        assert!(!m.request_state_change(PlayerState::Opening));
        assert_eq!(m.get_state(), PlayerState::Paused);
        assert!(m.request_state_change(PlayerState::Playing));
        assert!(m.request_state_change(PlayerState::Stopped));
    }

    #[test]
    fn should_stop_predicate() {
        let m = PlayerStateManager::new();
        assert!(m.should_stop());
        m.request_state_change(PlayerState::Opening);
        assert!(!m.should_stop());
    }

    #[test]
    fn observer_fires_on_transition() {
        let m = PlayerStateManager::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        m.register_state_change_callback(move |old, new| {
            seen2.lock().push((old, new));
        });
        m.request_state_change(PlayerState::Opening);
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(seen.lock()[0], (PlayerState::Idle, PlayerState::Opening));
    }
}
