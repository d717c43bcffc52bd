use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Instant;

/// Millisecond time source used for response-time measurement.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> f64;
}

/// Monotonic wall clock anchored at construction.
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Replays scripted readings; repeats the last one once the script runs out.
#[derive(Debug, Default)]
pub struct ManualClock {
    readings: Mutex<VecDeque<f64>>,
    last: Mutex<f64>,
}

impl ManualClock {
    pub fn new<I: IntoIterator<Item = f64>>(readings: I) -> Self {
        Self {
            readings: Mutex::new(readings.into_iter().collect()),
            last: Mutex::new(0.0),
        }
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        let next = self.readings.lock().ok().and_then(|mut q| q.pop_front());
        match self.last.lock() {
            Ok(mut last) => {
                if let Some(v) = next {
                    *last = v;
                }
                *last
            }
            Err(_) => next.unwrap_or_default(),
        }
    }
}
