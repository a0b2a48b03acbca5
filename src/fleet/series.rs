//! Bounded time series fed by the sample tick and read by charting.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Active-worker count at one sample tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub seq: u64,
    pub at_ms: u64,
    pub recorded_at: DateTime<Utc>,
    pub active_workers: usize,
}

/// Total fleet earnings at one sample tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarningsSample {
    pub seq: u64,
    pub at_ms: u64,
    pub recorded_at: DateTime<Utc>,
    pub total_earnings: f64,
}

/// Fixed-capacity series; pushing past capacity evicts the oldest point.
#[derive(Debug, Clone)]
pub struct TimeSeries<T> {
    points: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> TimeSeries<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, point: T) {
        self.points.push_back(point);
        while self.points.len() > self.capacity {
            self.points.pop_front();
        }
    }

    /// Points oldest first.
    pub fn to_vec(&self) -> Vec<T> {
        self.points.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.points.iter()
    }

    pub fn latest(&self) -> Option<&T> {
        self.points.back()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Both series, as handed to charting collaborators.
#[derive(Debug, Clone, Serialize)]
pub struct SeriesSnapshot {
    pub performance: Vec<PerformanceSample>,
    pub earnings: Vec<EarningsSample>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_past_capacity() {
        let mut series = TimeSeries::new(50);
        for i in 1..=51u64 {
            series.push(i);
        }
        assert_eq!(series.len(), 50);
        let points = series.to_vec();
        assert_eq!(points.first(), Some(&2));
        assert_eq!(points.last(), Some(&51));
        assert!(points.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn below_capacity_keeps_everything() {
        let mut series = TimeSeries::new(5);
        series.push("a");
        series.push("b");
        assert_eq!(series.to_vec(), vec!["a", "b"]);
        assert_eq!(series.latest(), Some(&"b"));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut series = TimeSeries::new(0);
        series.push(1);
        series.push(2);
        assert_eq!(series.capacity(), 1);
        assert_eq!(series.to_vec(), vec![2]);
    }
}
