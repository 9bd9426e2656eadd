//! Min-heap timer service.
//!
//! Alarms are keyed by name and carry an arbitrary payload. A waiter blocked
//! in [`AlarmManager::wait_for_next_alarm`] is woken on every mutation and
//! recomputes its sleep, so a newly added earlier alarm is never overslept.

use compact_str::CompactString;
use parking_lot::Mutex;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alarm<E> {
    pub name: CompactString,
    pub fire_at: Instant,
    pub payload: E,
}

/// Heap entry; ordered by fire time, then insertion order.
#[derive(Debug)]
struct Scheduled<E> {
    seq: u64,
    alarm: Alarm<E>,
}

impl<E> Scheduled<E> {
    fn key(&self) -> (Instant, u64) {
        (self.alarm.fire_at, self.seq)
    }
}

impl<E> PartialEq for Scheduled<E> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<E> Eq for Scheduled<E> {}

impl<E> PartialOrd for Scheduled<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Scheduled<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

pub struct AlarmManager<E> {
    heap: Mutex<BinaryHeap<Reverse<Scheduled<E>>>>,
    seq: AtomicU64,
    wake: Notify,
}

impl<E> AlarmManager<E> {
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            seq: AtomicU64::new(0),
            wake: Notify::new(),
        }
    }

    /// Schedule `payload` to fire at `fire_at`, replacing any alarm with the
    /// same name.
    pub fn add_alarm(&self, name: impl Into<CompactString>, fire_at: Instant, payload: E) {
        let name = name.into();
        let seq = self.seq.fetch_add(1, AtomicOrdering::Relaxed);
        {
            let mut heap = self.heap.lock();
            heap.retain(|Reverse(entry)| entry.alarm.name != name);
            debug!(alarm = %name, "Adding alarm");
            heap.push(Reverse(Scheduled {
                seq,
                alarm: Alarm {
                    name,
                    fire_at,
                    payload,
                },
            }));
        }
        self.wake.notify_waiters();
    }

    /// Remove the named alarm. Returns whether it was scheduled.
    pub fn cancel_alarm(&self, name: &str) -> bool {
        let removed = {
            let mut heap = self.heap.lock();
            let before = heap.len();
            heap.retain(|Reverse(entry)| entry.alarm.name != name);
            heap.len() != before
        };
        if removed {
            debug!(alarm = %name, "Cancelled alarm");
            self.wake.notify_waiters();
        }
        removed
    }

    /// Move the named alarm to a new fire time. Returns whether it was
    /// scheduled.
    pub fn update_alarm(&self, name: &str, fire_at: Instant) -> bool {
        let found = {
            let mut heap = self.heap.lock();
            let mut entries = std::mem::take(&mut *heap).into_vec();
            let found = match entries.iter_mut().find(|Reverse(e)| e.alarm.name == name) {
                Some(Reverse(entry)) => {
                    entry.alarm.fire_at = fire_at;
                    true
                }
                None => false,
            };
            *heap = BinaryHeap::from(entries);
            found
        };
        if found {
            self.wake.notify_waiters();
        }
        found
    }

    pub fn contains(&self, name: &str) -> bool {
        self.heap
            .lock()
            .iter()
            .any(|Reverse(entry)| entry.alarm.name == name)
    }

    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.lock().is_empty()
    }

    pub fn next_fire_time(&self) -> Option<Instant> {
        self.heap.lock().peek().map(|Reverse(entry)| entry.alarm.fire_at)
    }

    /// Pop the earliest alarm if it is due.
    fn pop_due(&self, now: Instant) -> Result<Alarm<E>, Option<Instant>> {
        let mut heap = self.heap.lock();
        match heap.peek().map(|Reverse(entry)| entry.alarm.fire_at) {
            Some(fire_at) if fire_at <= now => {
                heap.pop().map(|Reverse(entry)| entry.alarm).ok_or(None)
            }
            next => Err(next),
        }
    }

    /// Wait until an alarm is due and return it, removed from the heap.
    ///
    /// Returns `None` once `timeout` elapses with nothing due. Without a
    /// timeout, waits indefinitely.
    pub async fn wait_for_next_alarm(&self, timeout: Option<Duration>) -> Option<Alarm<E>> {
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            // Register interest before inspecting the heap so a mutation in
            // between still wakes us.
            let notified = self.wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let now = Instant::now();
            let next = match self.pop_due(now) {
                Ok(alarm) => {
                    debug!(alarm = %alarm.name, "Alarm fired");
                    return Some(alarm);
                }
                Err(next) => next,
            };

            if deadline.is_some_and(|d| now >= d) {
                return None;
            }

            let wake_at = match (next, deadline) {
                (Some(next), Some(deadline)) => Some(next.min(deadline)),
                (next, deadline) => next.or(deadline),
            };

            match wake_at {
                Some(at) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(at) => {}
                        _ = &mut notified => {}
                    }
                }
                None => notified.await,
            }
        }
    }
}

impl<E> Default for AlarmManager<E> {
    fn default() -> Self {
        Self::new()
    }
}
