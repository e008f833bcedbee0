use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Default time window for speed calculation.
const DEFAULT_WINDOW: Duration = Duration::from_secs(5);

/// Default cap on retained samples.
const DEFAULT_MAX_SAMPLES: usize = 100;

#[derive(Debug, Clone, Copy)]
struct SpeedSample {
    bytes: u64,
    timestamp: Instant,
}

/// Calculates transfer speed using a sliding window of samples.
#[derive(Debug, Clone)]
pub struct SpeedCalculator {
    samples: VecDeque<SpeedSample>,
    max_samples: usize,
    window: Duration,
}

impl SpeedCalculator {
    /// Creates a new calculator.
    ///
    /// - `window`: time window for speed calculation (default 5 s).
    /// - `max_samples`: maximum retained samples (default 100).
    pub fn new(window: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            samples: VecDeque::new(),
            max_samples: max_samples.unwrap_or(DEFAULT_MAX_SAMPLES).max(2),
            window: window.unwrap_or(DEFAULT_WINDOW),
        }
    }

    /// Records `bytes` transferred now.
    pub fn record(&mut self, bytes: u64) {
        self.record_at(bytes, Instant::now());
    }

    /// Records `bytes` transferred at `timestamp`.
    pub fn record_at(&mut self, bytes: u64, timestamp: Instant) {
        self.samples.push_back(SpeedSample { bytes, timestamp });

        if let Some(cutoff) = timestamp.checked_sub(self.window) {
            while self
                .samples
                .front()
                .is_some_and(|sample| sample.timestamp < cutoff)
            {
                self.samples.pop_front();
            }
        }

        while self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }
    }

    /// Average speed in bytes/second within the window.
    ///
    /// Returns 0.0 with fewer than 2 samples. The first sample only marks the
    /// start of the window; its bytes are not counted.
    pub fn bytes_per_second(&self) -> f64 {
        let (Some(first), Some(last)) = (self.samples.front(), self.samples.back()) else {
            return 0.0;
        };
        if self.samples.len() < 2 {
            return 0.0;
        }
        let elapsed = last.timestamp.duration_since(first.timestamp);
        if elapsed.is_zero() {
            return 0.0;
        }
        let bytes: u64 = self.samples.iter().skip(1).map(|s| s.bytes).sum();
        bytes as f64 / elapsed.as_secs_f64()
    }

    /// Estimated time to move `remaining_bytes`. `None` while speed is zero.
    pub fn eta(&self, remaining_bytes: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        Duration::try_from_secs_f64(remaining_bytes as f64 / speed).ok()
    }
}

impl Default for SpeedCalculator {
    fn default() -> Self {
        Self::new(None, None)
    }
}
