//! Token-bucket-shaped send-rate limiter.
//!
//! Within one pacing interval, up to `max_packets_per_batch` sends are
//! allowed; once the interval rolls over, the batch counter resets. Note
//! `can_send` itself performs the rollover reset — callers that poll
//! `can_send` without ever calling `on_packet_sent` get unlimited sends once
//! the interval has elapsed, matching the reference behavior exactly.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct PacerConfig {
    pub pacing_interval_ms: u32,
    pub max_packets_per_batch: u32,
}

impl Default for PacerConfig {
    fn default() -> Self {
        Self {
            pacing_interval_ms: 5,
            max_packets_per_batch: 10,
        }
    }
}

pub struct Pacer {
    config: PacerConfig,
    last_send_time: Instant,
    packets_in_batch: u32,
}

impl Pacer {
    pub fn new(config: PacerConfig) -> Self {
        Self {
            config,
            last_send_time: Instant::now(),
            packets_in_batch: 0,
        }
    }

    pub fn can_send(&mut self) -> bool {
        let elapsed = self.last_send_time.elapsed();
        if elapsed >= Duration::from_millis(self.config.pacing_interval_ms as u64) {
            self.packets_in_batch = 0;
            return true;
        }
        self.packets_in_batch < self.config.max_packets_per_batch
    }

    pub fn on_packet_sent(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_send_time);
        if elapsed >= Duration::from_millis(self.config.pacing_interval_ms as u64) {
            self.last_send_time = now;
            self.packets_in_batch = 1;
        } else {
            self.packets_in_batch += 1;
        }
    }

    pub fn reset(&mut self) {
        self.last_send_time = Instant::now();
        self.packets_in_batch = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_burst_up_to_batch_limit() {
        let mut pacer = Pacer::new(PacerConfig {
            pacing_interval_ms: 1000,
            max_packets_per_batch: 3,
        });
        for _ in 0..3 {
            assert!(pacer.can_send());
            pacer.on_packet_sent();
        }
        assert!(!pacer.can_send());
    }

    #[test]
    fn reset_clears_batch_counter() {
        let mut pacer = Pacer::new(PacerConfig {
            pacing_interval_ms: 1000,
            max_packets_per_batch: 1,
        });
        pacer.on_packet_sent();
        assert!(!pacer.can_send());
        pacer.reset();
        assert!(pacer.can_send());
    }

    #[test]
    fn interval_rollover_reopens_batch() {
        let mut pacer = Pacer::new(PacerConfig {
            pacing_interval_ms: 10,
            max_packets_per_batch: 1,
        });
        pacer.on_packet_sent();
        assert!(!pacer.can_send());
        std::thread::sleep(Duration::from_millis(25));
        assert!(pacer.can_send());
    }
}
