//! Debounced config-file auto-save, driven by [`crate::timer::Timer`]
//! rather than a bespoke executor (the reference design's secondary
//! thread-pool for this is out of scope per spec §1; SPEC_FULL.md §1
//! substitutes the L0 `Timer` instead).
//!
//! Watches a config file with `notify` and, per [`super::AutoSavePolicy`],
//! either saves immediately on change or coalesces a burst of changes into
//! one save after `debounce_ms` of quiet.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{error, warn};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};

use super::AutoSavePolicy;
use crate::timer::{Timer, TimerFactory};

/// Invoked once a debounce window closes (or immediately, under
/// [`AutoSavePolicy::Immediate`]) to persist the current in-memory config.
pub type SaveCallback = Box<dyn Fn() + Send + Sync>;

/// Owns the filesystem watcher and the debounce timer for one config
/// file. Dropping it stops both.
pub struct ConfigWatcher {
    _fs_watcher: Option<RecommendedWatcher>,
    debounce_timer: Option<Timer>,
    dirty: Arc<AtomicBool>,
}

impl ConfigWatcher {
    /// `policy == Manual` or `OnExit` returns a watcher that observes
    /// nothing; the caller is expected to call `save()` itself at the
    /// appropriate point (manual call, or process-exit handler).
    pub fn start(path: PathBuf, policy: AutoSavePolicy, debounce_ms: u64, on_save: SaveCallback) -> Self {
        if policy == AutoSavePolicy::Manual || policy == AutoSavePolicy::OnExit {
            return Self {
                _fs_watcher: None,
                debounce_timer: None,
                dirty: Arc::new(AtomicBool::new(false)),
            };
        }

        let dirty = Arc::new(AtomicBool::new(false));
        let on_save: Arc<SaveCallback> = Arc::new(on_save);

        let debounce_timer = if policy == AutoSavePolicy::Debounced {
            let dirty_for_timer = dirty.clone();
            let on_save_for_timer = on_save.clone();
            let timer = TimerFactory::create_repeating(
                debounce_ms,
                Arc::new(move || {
                    if dirty_for_timer.swap(false, Ordering::SeqCst) {
                        (on_save_for_timer)();
                    }
                }),
            );
            timer.start();
            Some(timer)
        } else {
            None
        };

        let dirty_for_watch = dirty.clone();
        let on_save_for_watch = on_save.clone();
        let immediate = policy == AutoSavePolicy::Immediate;
        let watch_result = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(_event) => {
                    if immediate {
                        (on_save_for_watch)();
                    } else {
                        dirty_for_watch.store(true, Ordering::SeqCst);
                    }
                }
                Err(e) => warn!("config file watch error: {e}"),
            },
            notify::Config::default(),
        );

        let fs_watcher = match watch_result {
            Ok(mut watcher) => {
                if let Err(e) = watcher.watch(&path, RecursiveMode::NonRecursive) {
                    error!("failed to watch config file {}: {e}", path.display());
                    None
                } else {
                    Some(watcher)
                }
            }
            Err(e) => {
                error!("failed to create config file watcher: {e}");
                None
            }
        };

        Self {
            _fs_watcher: fs_watcher,
            debounce_timer,
            dirty,
        }
    }

    /// True if a change has been observed but not yet flushed (debounced
    /// policy only).
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        if let Some(timer) = &self.debounce_timer {
            timer.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_policy_creates_no_watcher() {
        let watcher = ConfigWatcher::start(PathBuf::from("/tmp/nonexistent.toml"), AutoSavePolicy::Manual, 100, Box::new(|| {}));
        assert!(!watcher.is_dirty());
    }
}
