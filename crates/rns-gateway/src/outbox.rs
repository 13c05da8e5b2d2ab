//! Bounded retry outbox for persistence writes.
//!
//! A write that fails on its first try is queued here and retried with
//! exponential backoff until it succeeds or its attempt budget runs out.
//!
//! Invariants:
//! - the queue never holds more than `capacity` entries; the oldest is
//!   dropped to make room
//! - an entry is never retried before its `next_attempt_at`
//! - writes for one sku reach the backend in the order they were issued:
//!   a write arriving while an earlier one for its sku is queued or in
//!   flight is parked behind it
//! - the outbox lock is never held across a backend call
//! - every dropped write is handed back to the caller as a
//!   [`PersistenceWriteFailure`] so it can be logged

use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::{PersistenceGateway, PersistenceWrite};

/// `last_error` of a write parked behind an earlier one for its sku.
pub const PARKED: &str = "queued behind an earlier write for the same sku";

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per write, the first one included.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// `initial_delay * multiplier^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return self.initial_delay.min(self.max_delay);
        }
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exp);
        if !delay_ms.is_finite() || delay_ms >= self.max_delay.as_millis() as f64 {
            return self.max_delay;
        }
        Duration::from_millis(delay_ms as u64)
    }
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OutboxEntry {
    /// Issue order; the queue is kept sorted on it.
    pub seq: u64,
    pub write: PersistenceWrite,
    /// Attempts made so far.
    pub attempts: u32,
    pub next_attempt_at: Instant,
    pub last_error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Exhausted,
    Evicted,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::Exhausted => f.write_str("retries exhausted"),
            DropReason::Evicted => f.write_str("evicted from full outbox"),
        }
    }
}

/// A write the outbox gave up on.
#[derive(Debug, Clone)]
pub struct PersistenceWriteFailure {
    pub write: PersistenceWrite,
    pub attempts: u32,
    pub last_error: String,
    pub reason: DropReason,
}

#[derive(Debug, Default)]
pub struct DrainReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub requeued: usize,
    pub dropped: Vec<PersistenceWriteFailure>,
}

// ---------------------------------------------------------------------------
// Outbox
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct RetryOutbox {
    policy: RetryPolicy,
    capacity: usize,
    queue: VecDeque<OutboxEntry>,
    /// Skus with an entry currently being retried outside the lock.
    in_flight: BTreeSet<String>,
    next_seq: u64,
    dropped_total: u64,
}

impl RetryOutbox {
    pub fn new(policy: RetryPolicy, capacity: usize) -> Self {
        Self {
            policy,
            capacity: capacity.max(1),
            queue: VecDeque::new(),
            in_flight: BTreeSet::new(),
            next_seq: 0,
            dropped_total: 0,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Queued entries; entries being retried right now are not counted.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Queued plus in flight.
    pub fn pending(&self) -> usize {
        self.queue.len() + self.in_flight.len()
    }

    /// Writes dropped since start, exhausted and evicted alike.
    pub fn dropped_total(&self) -> u64 {
        self.dropped_total
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutboxEntry> {
        self.queue.iter()
    }

    /// True when a new write for `sku` must wait behind the outbox.
    pub fn blocks(&self, sku: &str) -> bool {
        self.in_flight.contains(sku) || self.queue.iter().any(|e| e.write.sku() == sku)
    }

    /// Queue a write whose first attempt just failed.
    ///
    /// Returns the write that had to be dropped, if any: this one when the
    /// policy allows a single attempt, or the oldest entry when full.
    pub fn enqueue(
        &mut self,
        write: PersistenceWrite,
        error: String,
        now: Instant,
    ) -> Option<PersistenceWriteFailure> {
        let entry = OutboxEntry {
            seq: self.issue_seq(),
            write,
            attempts: 1,
            next_attempt_at: now + self.policy.delay_for_attempt(0),
            last_error: error,
        };
        if entry.attempts >= self.policy.max_attempts {
            return Some(self.drop_entry(entry, DropReason::Exhausted));
        }
        self.push(entry)
    }

    /// Queue a write that has not been tried yet because an earlier write
    /// for its sku is still pending. It becomes due as soon as it reaches
    /// the head of its sku.
    pub fn park(&mut self, write: PersistenceWrite, now: Instant) -> Option<PersistenceWriteFailure> {
        let entry = OutboxEntry {
            seq: self.issue_seq(),
            write,
            attempts: 0,
            next_attempt_at: now,
            last_error: PARKED.to_string(),
        };
        self.push(entry)
    }

    /// Remove and return the due head entry of every sku that has nothing
    /// in flight, oldest first. Returned entries are marked in flight until
    /// handed back through [`complete`](Self::complete) or
    /// [`requeue`](Self::requeue).
    pub fn take_due(&mut self, now: Instant) -> Vec<OutboxEntry> {
        let mut due = Vec::new();
        let mut heads: BTreeSet<String> = BTreeSet::new();
        let mut keep = VecDeque::with_capacity(self.queue.len());
        for entry in self.queue.drain(..) {
            let sku = entry.write.sku().to_string();
            let is_head = !self.in_flight.contains(&sku) && heads.insert(sku.clone());
            if is_head && entry.next_attempt_at <= now {
                self.in_flight.insert(sku);
                due.push(entry);
            } else {
                heads.insert(sku);
                keep.push_back(entry);
            }
        }
        self.queue = keep;
        due
    }

    /// An entry taken by [`take_due`](Self::take_due) reached the backend.
    pub fn complete(&mut self, entry: &OutboxEntry) {
        self.in_flight.remove(entry.write.sku());
    }

    /// Put back an entry whose retry failed. Errors once the budget is spent.
    pub fn requeue(
        &mut self,
        mut entry: OutboxEntry,
        error: String,
        now: Instant,
    ) -> Result<Option<PersistenceWriteFailure>, PersistenceWriteFailure> {
        self.in_flight.remove(entry.write.sku());
        entry.attempts += 1;
        entry.last_error = error;
        if entry.attempts >= self.policy.max_attempts {
            return Err(self.drop_entry(entry, DropReason::Exhausted));
        }
        entry.next_attempt_at = now + self.policy.delay_for_attempt(entry.attempts - 1);
        Ok(self.push(entry))
    }

    fn issue_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn push(&mut self, entry: OutboxEntry) -> Option<PersistenceWriteFailure> {
        let evicted = if self.queue.len() >= self.capacity {
            self.queue
                .pop_front()
                .map(|oldest| self.drop_entry(oldest, DropReason::Evicted))
        } else {
            None
        };
        let at = self.queue.partition_point(|e| e.seq < entry.seq);
        self.queue.insert(at, entry);
        evicted
    }

    fn drop_entry(&mut self, entry: OutboxEntry, reason: DropReason) -> PersistenceWriteFailure {
        self.dropped_total += 1;
        PersistenceWriteFailure {
            write: entry.write,
            attempts: entry.attempts,
            last_error: entry.last_error,
            reason,
        }
    }
}

/// Retry everything due at `now` against `gateway`.
///
/// The lock is taken only to pick entries and to hand them back, so the
/// writer and status readers are never stuck behind a slow backend. Entries
/// parked behind a write that succeeds are picked up in the same call.
pub async fn drain_due(
    outbox: &Mutex<RetryOutbox>,
    gateway: &dyn PersistenceGateway,
    now: Instant,
) -> DrainReport {
    let mut report = DrainReport::default();
    loop {
        let due = outbox.lock().await.take_due(now);
        if due.is_empty() {
            return report;
        }
        for entry in due {
            report.attempted += 1;
            let result = entry.write.apply(gateway).await;
            let mut ob = outbox.lock().await;
            match result {
                Ok(()) => {
                    ob.complete(&entry);
                    report.succeeded += 1;
                }
                Err(e) => match ob.requeue(entry, e.to_string(), now) {
                    Ok(evicted) => {
                        report.requeued += 1;
                        report.dropped.extend(evicted);
                    }
                    Err(failure) => report.dropped.push(failure),
                },
            }
        }
    }
}
