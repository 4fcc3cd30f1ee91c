use std::collections::VecDeque;

/// Fixed-capacity rolling window over the most recent samples.
///
/// Pushing into a full window evicts the oldest sample, so every update is
/// O(1) and memory never grows past the capacity chosen at construction.
/// Numeric windows keep a running sum which makes `mean()` O(1) as well.
#[derive(Debug, Clone)]
pub struct RollingWindow<T> {
    samples: VecDeque<T>,
    capacity: usize,
}

impl<T> RollingWindow<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, returning the one evicted to make room (if any).
    pub fn push(&mut self, value: T) -> Option<T> {
        let evicted = if self.samples.len() == self.capacity {
            self.samples.pop_front()
        } else {
            None
        };
        self.samples.push_back(value);
        evicted
    }

    /// Drop samples from the old end while `predicate` holds.
    pub fn pop_front_while<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&T) -> bool,
    {
        let mut removed = 0;
        while self.samples.front().is_some_and(&mut predicate) {
            self.samples.pop_front();
            removed += 1;
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn front(&self) -> Option<&T> {
        self.samples.front()
    }

    pub fn back(&self) -> Option<&T> {
        self.samples.back()
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator + '_ {
        self.samples.iter()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Rolling window of `f64` samples with an O(1) running mean.
#[derive(Debug, Clone)]
pub struct RollingMean {
    window: RollingWindow<f64>,
    sum: f64,
}

impl RollingMean {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: RollingWindow::new(capacity),
            sum: 0.0,
        }
    }

    pub fn push(&mut self, value: f64) {
        self.sum += value;
        if let Some(evicted) = self.window.push(value) {
            self.sum -= evicted;
        }
        // Cancellation can leave a tiny negative remainder.
        if self.sum < 0.0 {
            self.sum = 0.0;
        }
    }

    /// Mean of the window, 0 when empty.
    pub fn mean(&self) -> f64 {
        if self.window.is_empty() {
            0.0
        } else {
            self.sum / self.window.len() as f64
        }
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.window.capacity()
    }

    pub fn clear(&mut self) {
        self.window.clear();
        self.sum = 0.0;
    }
}
