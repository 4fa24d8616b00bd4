//! A fixed-length sliding window of plot values.

use std::collections::VecDeque;

/// A window of the most recent `capacity` values. It starts out full of
/// zeros and never changes length: every value pushed onto the tail drops
/// one value off the head.
#[derive(Debug, Clone, PartialEq)]
pub struct RollingBuffer {
    data: VecDeque<f64>,
    capacity: usize,
}

impl RollingBuffer {
    /// A window of `capacity` zeros.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: VecDeque::from(vec![0.0; capacity]),
            capacity,
        }
    }

    /// Number of values the window holds.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of values, which is always [`Self::capacity`].
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Only true for a zero-capacity window.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Overwrite every value with zero.
    pub fn reset(&mut self) {
        self.data.iter_mut().for_each(|v| *v = 0.0);
    }

    /// Append one value, dropping the oldest.
    pub fn push(&mut self, value: f64) {
        if self.capacity == 0 {
            return;
        }
        self.data.pop_front();
        self.data.push_back(value);
    }

    /// Append every value in order, dropping as many from the head.
    pub fn extend<I: IntoIterator<Item = f64>>(&mut self, values: I) {
        for value in values {
            self.push(value);
        }
    }

    /// Append `count` copies of `value`.
    pub fn push_repeated(&mut self, value: f64, count: usize) {
        self.extend(std::iter::repeat(value).take(count.min(self.capacity)));
    }

    /// The values, oldest first.
    pub fn values(&self) -> Vec<f64> {
        self.data.iter().copied().collect()
    }

    /// The most recently pushed value.
    pub fn latest(&self) -> Option<f64> {
        self.data.back().copied()
    }

    /// `(index, value)` pairs, ready for a chart dataset.
    pub fn points(&self) -> Vec<(f64, f64)> {
        self.data
            .iter()
            .enumerate()
            .map(|(i, &v)| (i as f64, v))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_full_of_zeros() {
        let buf = RollingBuffer::new(4);
        assert_eq!(buf.len(), 4);
        assert_eq!(buf.values(), vec![0.0; 4]);
    }

    #[test]
    fn pushing_slides_the_window() {
        let mut buf = RollingBuffer::new(5);
        for force in [10.0, 20.0, 30.0, 40.0, 50.0, 60.0] {
            buf.push(force);
            assert_eq!(buf.len(), 5);
        }
        assert_eq!(buf.values(), vec![20.0, 30.0, 40.0, 50.0, 60.0]);
    }

    #[test]
    fn extend_longer_than_capacity_keeps_the_tail() {
        let mut buf = RollingBuffer::new(3);
        buf.extend((1..=7).map(f64::from));
        assert_eq!(buf.values(), vec![5.0, 6.0, 7.0]);
    }

    #[test]
    fn repeated_values_and_reset() {
        let mut buf = RollingBuffer::new(4);
        buf.push(1.0);
        buf.push_repeated(9.0, 2);
        assert_eq!(buf.values(), vec![0.0, 1.0, 9.0, 9.0]);
        buf.push_repeated(3.0, 0);
        assert_eq!(buf.values(), vec![0.0, 1.0, 9.0, 9.0]);
        buf.reset();
        assert_eq!(buf.values(), vec![0.0; 4]);
    }

    #[test]
    fn points_are_indexed_from_zero() {
        let mut buf = RollingBuffer::new(2);
        buf.push(0.5);
        assert_eq!(buf.points(), vec![(0.0, 0.0), (1.0, 0.5)]);
        assert_eq!(buf.latest(), Some(0.5));
    }
}
