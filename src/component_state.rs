//! Self-reported run state for individual pipeline stages.
//!
//! Separate from [`crate::player_state::PlayerStateManager`]: each of the
//! capture/encode/decode/render threads publishes its own `ComponentState`
//! purely for diagnostics, independent of the shared state machine that
//! gates whether the pipeline as a whole should run.

use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ComponentState {
    Idle = 0,
    Running = 1,
    Paused = 2,
    Stopping = 3,
}

impl ComponentState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ComponentState::Idle,
            1 => ComponentState::Running,
            2 => ComponentState::Paused,
            _ => ComponentState::Stopping,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ComponentState::Idle => "Idle",
            ComponentState::Running => "Running",
            ComponentState::Paused => "Paused",
            ComponentState::Stopping => "Stopping",
        }
    }
}

/// A lock-free cell a single thread owns and everyone else may read.
pub struct ComponentStateCell(AtomicU8);

impl Default for ComponentStateCell {
    fn default() -> Self {
        Self::new(ComponentState::Idle)
    }
}

impl ComponentStateCell {
    pub fn new(initial: ComponentState) -> Self {
        Self(AtomicU8::new(initial as u8))
    }

    pub fn get(&self) -> ComponentState {
        ComponentState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: ComponentState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let cell = ComponentStateCell::default();
        assert_eq!(cell.get(), ComponentState::Idle);
        cell.set(ComponentState::Running);
        assert_eq!(cell.get(), ComponentState::Running);
    }
}
