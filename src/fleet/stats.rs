//! Aggregate metrics derived from the worker table.

use serde::Serialize;

use crate::worker::{Worker, WorkerId, WorkerStatus, WorkerType, round_cents};

/// The three headline numbers. Recomputed on demand, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct AggregateMetrics {
    pub total_workers: usize,
    pub active_workers: usize,
    /// Full precision; round at the display edge.
    pub total_earnings: f64,
}

impl AggregateMetrics {
    pub fn compute<'a>(workers: impl IntoIterator<Item = &'a Worker>) -> Self {
        workers
            .into_iter()
            .fold(Self::default(), |mut metrics, worker| {
                metrics.total_workers += 1;
                if worker.status() == WorkerStatus::Working {
                    metrics.active_workers += 1;
                }
                metrics.total_earnings += worker.earnings();
                metrics
            })
    }
}

/// Per-status worker counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatusCounts {
    pub working: usize,
    pub idle: usize,
    pub error: usize,
    pub offline: usize,
}

impl StatusCounts {
    pub fn record(&mut self, status: WorkerStatus) {
        match status {
            WorkerStatus::Working => self.working += 1,
            WorkerStatus::Idle => self.idle += 1,
            WorkerStatus::Error => self.error += 1,
            WorkerStatus::Offline => self.offline += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopPerformer {
    pub id: WorkerId,
    #[serde(rename = "type")]
    pub worker_type: WorkerType,
    pub tasks_completed: u64,
    pub earnings: f64,
}

/// Everything the dashboard header and sidebar show.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FleetStats {
    #[serde(flatten)]
    pub metrics: AggregateMetrics,
    pub status: StatusCounts,
    pub top_performers: Vec<TopPerformer>,
}

impl FleetStats {
    pub fn compute<'a>(workers: impl IntoIterator<Item = &'a Worker> + Clone, top: usize) -> Self {
        let metrics = AggregateMetrics::compute(workers.clone());

        let mut status = StatusCounts::default();
        let mut ranked: Vec<&Worker> = Vec::new();
        for worker in workers {
            status.record(worker.status());
            ranked.push(worker);
        }

        ranked.sort_by(|a, b| {
            b.earnings()
                .total_cmp(&a.earnings())
                .then_with(|| a.id().cmp(b.id()))
        });
        let top_performers = ranked
            .into_iter()
            .take(top)
            .map(|w| TopPerformer {
                id: w.id().clone(),
                worker_type: w.worker_type(),
                tasks_completed: w.tasks_completed(),
                earnings: round_cents(w.earnings()),
            })
            .collect();

        Self {
            metrics,
            status,
            top_performers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::PerformanceMode;

    #[test]
    fn empty_fleet_has_zero_metrics() {
        let workers: Vec<Worker> = Vec::new();
        assert_eq!(AggregateMetrics::compute(&workers), AggregateMetrics::default());
    }

    #[test]
    fn counts_offline_workers() {
        let workers: Vec<Worker> = (0..3)
            .map(|i| {
                Worker::new(
                    WorkerId::new(format!("w{i}")),
                    WorkerType::Research,
                    PerformanceMode::Balanced,
                )
            })
            .collect();

        let stats = FleetStats::compute(&workers, 5);
        assert_eq!(stats.metrics.total_workers, 3);
        assert_eq!(stats.metrics.active_workers, 0);
        assert_eq!(stats.status.offline, 3);
        assert_eq!(stats.top_performers.len(), 3);
    }

    #[test]
    fn top_performers_truncates() {
        let workers: Vec<Worker> = (0..8)
            .map(|i| {
                Worker::new(
                    WorkerId::new(format!("w{i}")),
                    WorkerType::Survey,
                    PerformanceMode::Speed,
                )
            })
            .collect();
        let stats = FleetStats::compute(&workers, 5);
        assert_eq!(stats.top_performers.len(), 5);
        // Equal earnings fall back to id order.
        assert_eq!(stats.top_performers[0].id, WorkerId::new("w0"));
    }
}
