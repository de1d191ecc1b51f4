// ABOUTME: Windowed median filter over signed 64-bit samples
// ABOUTME: Ring buffer of insertion order plus a sorted view for O(log N) median lookup

use std::collections::VecDeque;

/// Fixed-size windowed median filter.
///
/// Mirrors `MEDIANFILTER_Insert`/`MEDIANFILTER_isFull` from the original C median filter: a ring
/// buffer holds insertion order so the oldest sample can be evicted, and a parallel sorted buffer
/// gives the middle element in O(log N) lookup + O(N) shift per insert, which is fine for the
/// window sizes this client uses (<= ~200).
#[derive(Debug, Clone)]
pub struct MedianFilter {
    capacity: usize,
    order: VecDeque<i64>,
    sorted: Vec<i64>,
    full: bool,
}

impl MedianFilter {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "median filter capacity must be positive");
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            sorted: Vec::with_capacity(capacity),
            full: false,
        }
    }

    /// Insert a new sample, evicting the oldest if the window is full, and return the current
    /// median (of whatever samples are currently in the window).
    pub fn insert(&mut self, value: i64) -> i64 {
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                if let Ok(idx) = self.sorted.binary_search(&oldest) {
                    self.sorted.remove(idx);
                }
            }
            self.full = true;
        }

        self.order.push_back(value);
        let idx = self.sorted.partition_point(|&v| v < value);
        self.sorted.insert(idx, value);

        self.sorted[self.sorted.len() / 2]
    }

    /// True once `capacity` inserts have occurred since the last `reset()`. Never flips back to
    /// false except via `reset()`.
    pub fn is_full(&self) -> bool {
        self.full
    }

    pub fn reset(&mut self) {
        self.order.clear();
        self.sorted.clear();
        self.full = false;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_of_single_sample_is_itself() {
        let mut f = MedianFilter::new(5);
        assert_eq!(f.insert(42), 42);
        assert!(!f.is_full());
    }

    #[test]
    fn full_flips_true_exactly_on_nth_insert() {
        let mut f = MedianFilter::new(3);
        f.insert(1);
        assert!(!f.is_full());
        f.insert(2);
        assert!(!f.is_full());
        f.insert(3);
        assert!(f.is_full());
    }

    #[test]
    fn full_never_flips_back_without_reset() {
        let mut f = MedianFilter::new(3);
        for v in [1, 2, 3, 4, 5, 6] {
            f.insert(v);
        }
        assert!(f.is_full());
        f.reset();
        assert!(!f.is_full());
    }

    #[test]
    fn median_stays_within_window_bounds() {
        let mut f = MedianFilter::new(5);
        let samples = [10, -5, 3, 100, -20, 7, 0, 42];
        for &s in &samples {
            let m = f.insert(s);
            let window_start = 0.max(samples.iter().position(|&x| x == s).unwrap() as i64 - 4);
            let window: Vec<i64> = samples[window_start as usize..=samples
                .iter()
                .position(|&x| x == s)
                .unwrap()]
                .to_vec();
            assert!(m >= *window.iter().min().unwrap());
            assert!(m <= *window.iter().max().unwrap());
        }
    }

    #[test]
    fn eviction_drops_oldest_not_a_duplicate() {
        let mut f = MedianFilter::new(3);
        f.insert(5);
        f.insert(5);
        f.insert(5);
        assert_eq!(f.insert(100), 5);
        assert_eq!(f.len(), 3);
    }
}
