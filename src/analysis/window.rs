use std::collections::VecDeque;

/// Fixed-capacity FIFO of the most recent metric values.
#[derive(Debug, Clone)]
pub struct TrailingWindow {
    capacity: usize,
    values: VecDeque<f64>,
}

impl TrailingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            values: VecDeque::with_capacity(capacity),
        }
    }

    pub fn is_full(&self) -> bool {
        self.values.len() >= self.capacity
    }

    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }

        #[allow(clippy::cast_precision_loss)]
        let mean = self.values.iter().sum::<f64>() / self.values.len() as f64;
        Some(mean)
    }

    /// Append a value, evicting and returning the oldest one when full.
    pub fn push(&mut self, value: f64) -> Option<f64> {
        let evicted = if self.is_full() {
            self.values.pop_front()
        } else {
            None
        };
        self.values.push_back(value);
        evicted
    }
}
