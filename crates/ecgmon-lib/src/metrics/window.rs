use std::collections::VecDeque;

/// Fixed-capacity FIFO over one numeric feature.
///
/// Mean and variance are only reported once the window holds more than `warmup` entries, so
/// the first few beats after start or reset cannot trip a rule on their own.
#[derive(Debug, Clone)]
pub struct FeatureWindow {
    values: VecDeque<f64>,
    capacity: usize,
    warmup: usize,
}

impl FeatureWindow {
    pub fn new(capacity: usize, warmup: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
            warmup,
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True once statistics are defined.
    pub fn is_warm(&self) -> bool {
        self.values.len() > self.warmup
    }

    pub fn mean(&self) -> Option<f64> {
        if !self.is_warm() {
            return None;
        }
        Some(self.raw_mean())
    }

    /// Population variance (divides by N) of the current contents.
    pub fn variance(&self) -> Option<f64> {
        if !self.is_warm() {
            return None;
        }
        let mean = self.raw_mean();
        let n = self.values.len() as f64;
        Some(self.values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n)
    }

    pub fn max(&self) -> Option<f64> {
        self.values.iter().copied().reduce(f64::max)
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    fn raw_mean(&self) -> f64 {
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }
}
