//! Standalone or high-precision periodic/one-shot timer with callback.
//!
//! Each timer owns a dedicated thread. Drift is handled by computing the
//! next deadline relative to the prior scheduled deadline rather than the
//! wake time, unless the accumulated deadline has fallen far enough behind
//! wall-clock that honoring it would cause a burst of catch-up fires, in
//! which case the deadline is advanced to "now + interval".

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPrecision {
    /// ~±1 ms, resource-light; uses interruptible condition waits.
    Standard,
    /// ~±0.1 ms; uses OS-specific high-resolution sleeps.
    HighPrecision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerType {
    OneShot,
    Repeating,
}

pub type Callback = Arc<dyn Fn() + Send + Sync>;

struct Config {
    interval: Duration,
    kind: TimerType,
    precision: TimerPrecision,
    callback: Option<Callback>,
}

/// A single-shot or repeating periodic callback driver.
pub struct Timer {
    config: Mutex<Config>,
    running: Arc<AtomicBool>,
    should_stop: Arc<AtomicBool>,
    execution_count: Arc<AtomicU64>,
    last_execution_millis: Arc<AtomicU64>,
    epoch: Instant,
    thread: Mutex<Option<JoinHandle<()>>>,
    // Generation counter: bumped on every start so a stale worker thread
    // from a prior Start() can tell it has been superseded and exit quietly.
    generation: Arc<AtomicU64>,
}

impl Timer {
    pub fn new(
        interval: Duration,
        kind: TimerType,
        precision: TimerPrecision,
        callback: Option<Callback>,
    ) -> Self {
        Self {
            config: Mutex::new(Config {
                interval,
                kind,
                precision,
                callback,
            }),
            running: Arc::new(AtomicBool::new(false)),
            should_stop: Arc::new(AtomicBool::new(false)),
            execution_count: Arc::new(AtomicU64::new(0)),
            last_execution_millis: Arc::new(AtomicU64::new(0)),
            epoch: Instant::now(),
            thread: Mutex::new(None),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn set_callback(&self, callback: Callback) {
        self.config.lock().unwrap().callback = Some(callback);
    }

    pub fn set_interval(&self, interval: Duration) {
        let was_running = self.is_running();
        self.config.lock().unwrap().interval = interval;
        if was_running {
            self.restart();
        }
    }

    pub fn set_type(&self, kind: TimerType) {
        self.config.lock().unwrap().kind = kind;
    }

    pub fn set_precision(&self, precision: TimerPrecision) {
        let was_running = self.is_running();
        self.config.lock().unwrap().precision = precision;
        if was_running {
            self.restart();
        }
    }

    /// Returns true if it started the timer; false if already running.
    pub fn start(&self) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.should_stop.store(false, Ordering::SeqCst);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let (interval, kind, precision, callback) = {
            let cfg = self.config.lock().unwrap();
            (cfg.interval, cfg.kind, cfg.precision, cfg.callback.clone())
        };

        let running = self.running.clone();
        let should_stop = self.should_stop.clone();
        let execution_count = self.execution_count.clone();
        let last_execution_millis = self.last_execution_millis.clone();
        let epoch = self.epoch;
        let my_generation = self.generation.clone();

        let handle = std::thread::spawn(move || {
            let mut next_deadline = Instant::now() + interval;
            loop {
                if should_stop.load(Ordering::SeqCst) || my_generation.load(Ordering::SeqCst) != generation {
                    break;
                }
                let now = Instant::now();
                if now < next_deadline {
                    let remaining = next_deadline - now;
                    match precision {
                        TimerPrecision::HighPrecision => high_precision_sleep(remaining),
                        TimerPrecision::Standard => std::thread::sleep(remaining),
                    }
                }
                if should_stop.load(Ordering::SeqCst) || my_generation.load(Ordering::SeqCst) != generation {
                    break;
                }

                if let Some(cb) = &callback {
                    execute_callback(cb);
                }
                execution_count.fetch_add(1, Ordering::SeqCst);
                last_execution_millis.store(epoch.elapsed().as_millis() as u64, Ordering::SeqCst);

                if kind == TimerType::OneShot {
                    break;
                }

                next_deadline += interval;
                let now = Instant::now();
                if now > next_deadline + interval {
                    // Fallen far behind; resync instead of bursting catch-up fires.
                    next_deadline = now + interval;
                }
            }
            running.store(false, Ordering::SeqCst);
        });

        *self.thread.lock().unwrap() = Some(handle);
        true
    }

    /// Synchronous with respect to the timer thread.
    pub fn stop(&self) -> bool {
        if !self.running.load(Ordering::SeqCst) {
            return false;
        }
        self.should_stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread.lock().unwrap().take() {
            let _ = handle.join();
        }
        true
    }

    pub fn restart(&self) -> bool {
        self.stop();
        self.start()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn interval(&self) -> Duration {
        self.config.lock().unwrap().interval
    }

    pub fn kind(&self) -> TimerType {
        self.config.lock().unwrap().kind
    }

    pub fn precision(&self) -> TimerPrecision {
        self.config.lock().unwrap().precision
    }

    pub fn execution_count(&self) -> u64 {
        self.execution_count.load(Ordering::SeqCst)
    }

    pub fn reset_execution_count(&self) {
        self.execution_count.store(0, Ordering::SeqCst);
    }

    /// Milliseconds since this timer was constructed, at the moment its
    /// callback last returned. `0` if it has never fired.
    pub fn last_execution_time(&self) -> Duration {
        Duration::from_millis(self.last_execution_millis.load(Ordering::SeqCst))
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn execute_callback(cb: &Callback) {
    // Exceptions escaping the callback are caught and logged, never allowed
    // to tear down the timer thread.
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb()));
    if let Err(_) = result {
        log::error!("Timer callback panicked; timer continues running");
    }
}

#[cfg(unix)]
fn high_precision_sleep(duration: Duration) {
    let nanos = libc::timespec {
        tv_sec: duration.as_secs() as libc::time_t,
        tv_nsec: duration.subsec_nanos() as libc::c_long,
    };
    unsafe {
        libc::nanosleep(&nanos, std::ptr::null_mut());
    }
}

#[cfg(not(unix))]
fn high_precision_sleep(duration: Duration) {
    std::thread::sleep(duration);
}

pub struct TimerFactory;

impl TimerFactory {
    pub fn create_repeating(interval_ms: u64, callback: Callback) -> Timer {
        Timer::new(
            Duration::from_millis(interval_ms),
            TimerType::Repeating,
            TimerPrecision::Standard,
            Some(callback),
        )
    }

    pub fn create_high_precision_repeating(interval_ms: u64, callback: Callback) -> Timer {
        Timer::new(
            Duration::from_millis(interval_ms),
            TimerType::Repeating,
            TimerPrecision::HighPrecision,
            Some(callback),
        )
    }

    pub fn create_one_shot(delay_ms: u64, callback: Callback) -> Timer {
        Timer::new(
            Duration::from_millis(delay_ms),
            TimerType::OneShot,
            TimerPrecision::Standard,
            Some(callback),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn repeating_timer_fires_multiple_times() {
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let timer = TimerFactory::create_repeating(
            10,
            Arc::new(move || {
                count2.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert!(timer.start());
        std::thread::sleep(Duration::from_millis(55));
        timer.stop();
        assert!(count.load(Ordering::SeqCst) >= 3);
    }

    #[test]
    fn one_shot_timer_fires_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let timer = TimerFactory::create_one_shot(
            10,
            Arc::new(move || {
                count2.fetch_add(1, Ordering::SeqCst);
            }),
        );
        timer.start();
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!timer.is_running());
    }

    #[test]
    fn start_twice_returns_false() {
        let timer = Timer::new(Duration::from_millis(50), TimerType::Repeating, TimerPrecision::Standard, None);
        assert!(timer.start());
        assert!(!timer.start());
        timer.stop();
    }

    #[test]
    fn callback_panic_does_not_kill_timer() {
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let timer = TimerFactory::create_repeating(
            10,
            Arc::new(move || {
                count2.fetch_add(1, Ordering::SeqCst);
                panic!("boom");
            }),
        );
        timer.start();
        std::thread::sleep(Duration::from_millis(55));
        timer.stop();
        assert!(count.load(Ordering::SeqCst) >= 2);
    }
}
