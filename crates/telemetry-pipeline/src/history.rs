use std::collections::VecDeque;

/// Bounded FIFO of `(timestamp, value)` pairs for one sensor.
#[derive(Debug, Clone)]
pub struct ChannelHistory {
    capacity: usize,
    entries: VecDeque<(f64, f64)>,
}

impl ChannelHistory {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a value, evicting the oldest entry once full.
    pub fn push(&mut self, timestamp: f64, value: f64) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((timestamp, value));
    }

    pub fn iter(&self) -> impl Iterator<Item = &(f64, f64)> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Arithmetic mean of every held value.
    pub fn average(&self) -> Option<f64> {
        if self.entries.is_empty() {
            return None;
        }
        // Running mean: identical inputs reproduce the input exactly.
        let mut mean = 0.0;
        for (n, (_, v)) in self.entries.iter().enumerate() {
            mean += (v - mean) / (n + 1) as f64;
        }
        Some(mean)
    }

    /// Rate of change between the endpoints of the oldest `window` entries.
    ///
    /// Uses entry 0 and entry `window - 1` once the history holds at least `window`
    /// entries, otherwise entry 0 and the newest entry. Elapsed times below one unit
    /// scale the result by `1 / elapsed` a second time. `None` with fewer than two
    /// entries, a window below two, or a non-positive elapsed time.
    pub fn rate(&self, window: usize) -> Option<f64> {
        if self.entries.len() < 2 || window < 2 {
            return None;
        }
        let end = window.min(self.entries.len()) - 1;
        let (t0, v0) = self.entries[0];
        let (t1, v1) = self.entries[end];
        let elapsed = t1 - t0;
        if elapsed.is_nan() || elapsed <= 0.0 {
            return None;
        }
        let mut rate = (v1 - v0) / elapsed;
        if elapsed < 1.0 {
            rate *= 1.0 / elapsed;
        }
        Some(rate)
    }
}
