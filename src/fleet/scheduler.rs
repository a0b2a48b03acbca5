//! Virtual-clock timer wheel shared by every worker in a fleet.
//!
//! Each worker owns two timer slots: a delay slot (idle delay or fault
//! recovery) and a progress slot. Arming an occupied slot replaces the
//! existing timer, so a worker never has two live timers racing on the same
//! slot.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::worker::WorkerId;

/// Which of a worker's timers an entry occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerSlot {
    Delay,
    Progress,
}

/// What a timer does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    /// Idle delay elapsed: pick up a task.
    StartTask,
    /// Advance the current task's progress.
    ProgressTick,
    /// Fault recovery delay elapsed.
    Recover,
}

impl TimerAction {
    pub fn slot(&self) -> TimerSlot {
        match self {
            Self::StartTask | Self::Recover => TimerSlot::Delay,
            Self::ProgressTick => TimerSlot::Progress,
        }
    }
}

/// A timer that came due.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredTimer {
    pub worker_id: WorkerId,
    pub action: TimerAction,
    pub fires_at: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SlotKey {
    worker_id: WorkerId,
    slot: TimerSlot,
}

/// Ordering key: fire time, then arming order for ties.
type QueueKey = (Duration, u64);

#[derive(Debug, Default)]
pub struct TimerWheel {
    queue: BTreeMap<QueueKey, (SlotKey, TimerAction)>,
    slots: HashMap<SlotKey, QueueKey>,
    seq: u64,
}

impl TimerWheel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer in the action's slot, cancelling whatever was there.
    pub fn arm(&mut self, worker_id: &WorkerId, action: TimerAction, fires_at: Duration) {
        let key = SlotKey {
            worker_id: worker_id.clone(),
            slot: action.slot(),
        };
        if let Some(previous) = self.slots.remove(&key) {
            self.queue.remove(&previous);
        }
        self.seq += 1;
        let queue_key = (fires_at, self.seq);
        self.queue.insert(queue_key, (key.clone(), action));
        self.slots.insert(key, queue_key);
    }

    /// Cancel one slot. Returns whether a timer was pending.
    pub fn cancel(&mut self, worker_id: &WorkerId, slot: TimerSlot) -> bool {
        let key = SlotKey {
            worker_id: worker_id.clone(),
            slot,
        };
        match self.slots.remove(&key) {
            Some(queue_key) => {
                self.queue.remove(&queue_key);
                true
            }
            None => false,
        }
    }

    /// Cancel every timer a worker owns.
    pub fn cancel_all(&mut self, worker_id: &WorkerId) {
        self.cancel(worker_id, TimerSlot::Delay);
        self.cancel(worker_id, TimerSlot::Progress);
    }

    /// Whether the worker has a timer pending in `slot`.
    pub fn is_pending(&self, worker_id: &WorkerId, slot: TimerSlot) -> bool {
        self.slots.contains_key(&SlotKey {
            worker_id: worker_id.clone(),
            slot,
        })
    }

    /// The action pending in a slot, if any.
    pub fn pending_action(&self, worker_id: &WorkerId, slot: TimerSlot) -> Option<TimerAction> {
        let key = SlotKey {
            worker_id: worker_id.clone(),
            slot,
        };
        let queue_key = self.slots.get(&key)?;
        self.queue.get(queue_key).map(|(_, action)| *action)
    }

    /// Remove and return the earliest timer due at or before `now`.
    pub fn pop_due(&mut self, now: Duration) -> Option<FiredTimer> {
        let (&queue_key, _) = self.queue.iter().next()?;
        if queue_key.0 > now {
            return None;
        }
        let (key, action) = self.queue.remove(&queue_key)?;
        self.slots.remove(&key);
        Some(FiredTimer {
            worker_id: key.worker_id,
            action,
            fires_at: queue_key.0,
        })
    }

    /// Get the next timer fire time.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.queue.keys().next().map(|(at, _)| *at)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> WorkerId {
        WorkerId::new(s)
    }

    #[test]
    fn timer_lifecycle() {
        let mut wheel = TimerWheel::new();
        let w = id("w1");

        wheel.arm(&w, TimerAction::StartTask, Duration::from_secs(10));
        assert!(wheel.is_pending(&w, TimerSlot::Delay));
        assert_eq!(wheel.next_deadline(), Some(Duration::from_secs(10)));

        assert!(wheel.pop_due(Duration::from_secs(5)).is_none());
        assert!(wheel.is_pending(&w, TimerSlot::Delay));

        let fired = wheel.pop_due(Duration::from_secs(15)).unwrap();
        assert_eq!(fired.worker_id, w);
        assert_eq!(fired.action, TimerAction::StartTask);
        assert_eq!(fired.fires_at, Duration::from_secs(10));
        assert!(wheel.is_empty());
        assert!(!wheel.is_pending(&w, TimerSlot::Delay));
    }

    #[test]
    fn arming_occupied_slot_replaces_timer() {
        let mut wheel = TimerWheel::new();
        let w = id("w1");

        wheel.arm(&w, TimerAction::StartTask, Duration::from_secs(3));
        wheel.arm(&w, TimerAction::Recover, Duration::from_secs(30));

        assert_eq!(wheel.len(), 1);
        assert_eq!(
            wheel.pending_action(&w, TimerSlot::Delay),
            Some(TimerAction::Recover)
        );
        assert!(wheel.pop_due(Duration::from_secs(10)).is_none());
    }

    #[test]
    fn slots_are_independent() {
        let mut wheel = TimerWheel::new();
        let w = id("w1");

        wheel.arm(&w, TimerAction::StartTask, Duration::from_secs(5));
        wheel.arm(&w, TimerAction::ProgressTick, Duration::from_secs(6));
        assert_eq!(wheel.len(), 2);

        assert!(wheel.cancel(&w, TimerSlot::Progress));
        assert!(!wheel.cancel(&w, TimerSlot::Progress));
        assert!(wheel.is_pending(&w, TimerSlot::Delay));
    }

    #[test]
    fn cancel_all_clears_worker_only() {
        let mut wheel = TimerWheel::new();
        let a = id("a");
        let b = id("b");

        wheel.arm(&a, TimerAction::StartTask, Duration::from_secs(1));
        wheel.arm(&a, TimerAction::ProgressTick, Duration::from_secs(2));
        wheel.arm(&b, TimerAction::StartTask, Duration::from_secs(3));

        wheel.cancel_all(&a);
        assert_eq!(wheel.len(), 1);
        assert!(wheel.is_pending(&b, TimerSlot::Delay));
    }

    #[test]
    fn fires_in_time_then_arming_order() {
        let mut wheel = TimerWheel::new();
        wheel.arm(&id("late"), TimerAction::StartTask, Duration::from_secs(20));
        wheel.arm(&id("first"), TimerAction::StartTask, Duration::from_secs(5));
        wheel.arm(&id("second"), TimerAction::StartTask, Duration::from_secs(5));

        let now = Duration::from_secs(30);
        let order: Vec<String> = std::iter::from_fn(|| wheel.pop_due(now))
            .map(|t| t.worker_id.to_string())
            .collect();
        assert_eq!(order, vec!["first", "second", "late"]);
    }
}
