#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `coalescer` holds the pending and in-flight request lists shared between
//! the dispatcher and the worker pool. Its job is request coalescing:
//! concurrent requests for the same `(pathname, mtime)` pair are merged onto
//! one [`WorkItem`] so only one worker ever computes the digest, and every
//! waiting client is recorded on that item's client list.
//!
//! # Design
//!
//! - `pending` is a size-ordered queue: [`Coalescer::admit`] inserts new
//!   work after every existing entry whose file is the same size or
//!   smaller, so workers that drain the front of the queue hash small files
//!   first, a best-effort fairness policy that needs no priority queue.
//! - `in_flight` is a `HashMap<WorkKey, WorkItem>` keyed by pathname and
//!   mtime, giving O(1) admission checks against work a worker has already
//!   claimed, which matters once the pending queue is long.
//! - Both lists live behind one [`std::sync::Mutex`] paired with a
//!   [`std::sync::Condvar`]; a worker blocks on the condvar until
//!   [`Coalescer::admit`] wakes it or [`Coalescer::shutdown`] tells every
//!   waiter to drain and exit.

use std::collections::{HashMap, VecDeque};
use std::sync::{Condvar, Mutex};

use protocol::ErrorCode;
use thiserror::Error;

/// Placeholder for future fallible admission paths.
///
/// [`Coalescer::admit`] has no way to fail today: it does no I/O, and
/// allocation failure is not a reachable error in safe Rust. This type
/// exists so `admit`'s signature would not need to change if a fallible
/// admission path is ever added.
#[derive(Debug, Error)]
pub enum CoalescerError {}

/// Identifies a unit of coalesced work by the file it hashes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkKey {
    /// Requested pathname, exactly as the client sent it.
    pub pathname: String,
    /// Modification time observed when the request was admitted.
    pub mtime: i64,
}

/// A unit of work: one file to hash, and every client PID waiting on it.
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// Requested pathname.
    pub pathname: String,
    /// Modification time observed at admission, or `0` if `stat` failed.
    pub mtime: i64,
    /// File size observed at admission, used only for pending-queue order.
    pub filesize: u64,
    /// Error observed while admitting this item (currently only ever
    /// `Some(ErrorCode::Stat)`, when the admitting `stat` call failed). When
    /// set, the worker publishes this error without attempting to open the
    /// file.
    pub deferred_err: Option<ErrorCode>,
    /// PIDs of every client waiting on this item's result, most recent
    /// first: each new coalesced request is inserted at the head.
    pub clients: Vec<i32>,
}

impl WorkItem {
    /// The key workers use to find this item in the in-flight map.
    #[must_use]
    pub fn key(&self) -> WorkKey {
        WorkKey {
            pathname: self.pathname.clone(),
            mtime: self.mtime,
        }
    }
}

/// Outcome of [`Coalescer::admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitOutcome {
    /// The request was merged onto an existing pending or in-flight item;
    /// no worker needs to be woken.
    Coalesced,
    /// The request became a new pending item; a worker was signalled.
    Admitted,
}

struct State {
    pending: VecDeque<WorkItem>,
    in_flight: HashMap<WorkKey, WorkItem>,
    shutting_down: bool,
}

/// Shared pending/in-flight request state for the dispatcher and worker pool.
pub struct Coalescer {
    state: Mutex<State>,
    cond: Condvar,
}

impl Coalescer {
    /// Builds an empty coalescer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                pending: VecDeque::new(),
                in_flight: HashMap::new(),
                shutting_down: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Admits a client's request for `pathname`.
    ///
    /// If a pending or in-flight item already exists for the same
    /// `(pathname, mtime)` pair, `client_pid` is added to its client list
    /// and no new work is created. Otherwise a new [`WorkItem`] is inserted
    /// into the pending queue, ordered after every item whose file is the
    /// same size or smaller, and a worker is woken.
    pub fn admit(
        &self,
        pathname: &str,
        mtime: i64,
        filesize: u64,
        deferred_err: Option<ErrorCode>,
        client_pid: i32,
    ) -> AdmitOutcome {
        let mut state = self.state.lock().expect("coalescer mutex poisoned");

        if let Some(item) = state
            .in_flight
            .values_mut()
            .find(|item| item.pathname == pathname && item.mtime == mtime)
        {
            item.clients.insert(0, client_pid);
            return AdmitOutcome::Coalesced;
        }

        let mut insert_at = state.pending.len();
        for (idx, curr) in state.pending.iter_mut().enumerate() {
            if curr.pathname == pathname && curr.mtime == mtime {
                curr.clients.insert(0, client_pid);
                return AdmitOutcome::Coalesced;
            }
            if filesize < curr.filesize {
                insert_at = idx;
                break;
            }
        }

        state.pending.insert(
            insert_at,
            WorkItem {
                pathname: pathname.to_owned(),
                mtime,
                filesize,
                deferred_err,
                clients: vec![client_pid],
            },
        );
        self.cond.notify_one();
        AdmitOutcome::Admitted
    }

    /// Blocks until a pending item is available, then moves it to the
    /// in-flight map and returns it.
    ///
    /// Returns `None` once [`Coalescer::shutdown`] has been called and the
    /// pending queue has fully drained; callers use this to end their
    /// worker loop.
    pub fn next_work_item(&self) -> Option<WorkItem> {
        let mut state = self.state.lock().expect("coalescer mutex poisoned");
        loop {
            if let Some(item) = state.pending.pop_front() {
                state.in_flight.insert(item.key(), item.clone());
                return Some(item);
            }
            if state.shutting_down {
                return None;
            }
            state = self.cond.wait(state).expect("coalescer mutex poisoned");
        }
    }

    /// Removes `key` from the in-flight map once its digest has been
    /// computed, returning the item so the caller can fan the response out
    /// to every waiting client.
    pub fn complete(&self, key: &WorkKey) -> Option<WorkItem> {
        let mut state = self.state.lock().expect("coalescer mutex poisoned");
        state.in_flight.remove(key)
    }

    /// Marks the coalescer as shutting down and wakes every worker blocked
    /// in [`Coalescer::next_work_item`] so they can drain the remaining
    /// pending queue and exit.
    pub fn shutdown(&self) {
        let mut state = self.state.lock().expect("coalescer mutex poisoned");
        state.shutting_down = true;
        self.cond.notify_all();
    }

    /// Number of items currently pending, for diagnostics and tests.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.state.lock().expect("coalescer mutex poisoned").pending.len()
    }
}

impl Default for Coalescer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_request_is_admitted() {
        let c = Coalescer::new();
        assert_eq!(c.admit("/tmp/a", 1, 10, None, 100), AdmitOutcome::Admitted);
        assert_eq!(c.pending_len(), 1);
    }

    #[test]
    fn duplicate_pending_request_coalesces() {
        let c = Coalescer::new();
        assert_eq!(c.admit("/tmp/a", 1, 10, None, 100), AdmitOutcome::Admitted);
        assert_eq!(c.admit("/tmp/a", 1, 10, None, 200), AdmitOutcome::Coalesced);
        assert_eq!(c.pending_len(), 1);

        let item = c.next_work_item().unwrap();
        assert_eq!(item.clients, vec![200, 100]);
    }

    #[test]
    fn different_mtime_is_a_distinct_item() {
        let c = Coalescer::new();
        c.admit("/tmp/a", 1, 10, None, 100);
        assert_eq!(c.admit("/tmp/a", 2, 10, None, 200), AdmitOutcome::Admitted);
        assert_eq!(c.pending_len(), 2);
    }

    #[test]
    fn pending_queue_orders_by_filesize_ascending() {
        let c = Coalescer::new();
        c.admit("/tmp/big", 1, 300, None, 1);
        c.admit("/tmp/small", 1, 10, None, 2);
        c.admit("/tmp/mid", 1, 100, None, 3);

        let first = c.next_work_item().unwrap();
        let second = c.next_work_item().unwrap();
        let third = c.next_work_item().unwrap();
        assert_eq!(first.pathname, "/tmp/small");
        assert_eq!(second.pathname, "/tmp/mid");
        assert_eq!(third.pathname, "/tmp/big");
    }

    #[test]
    fn equal_filesize_keeps_arrival_order() {
        let c = Coalescer::new();
        c.admit("/tmp/first", 1, 50, None, 1);
        c.admit("/tmp/second", 1, 50, None, 2);

        let first = c.next_work_item().unwrap();
        let second = c.next_work_item().unwrap();
        assert_eq!(first.pathname, "/tmp/first");
        assert_eq!(second.pathname, "/tmp/second");
    }

    #[test]
    fn request_in_flight_still_coalesces() {
        let c = Coalescer::new();
        c.admit("/tmp/a", 1, 10, None, 100);
        let item = c.next_work_item().unwrap();
        assert_eq!(item.pathname, "/tmp/a");

        assert_eq!(c.admit("/tmp/a", 1, 10, None, 200), AdmitOutcome::Coalesced);
        let completed = c.complete(&item.key()).unwrap();
        assert_eq!(completed.clients, vec![200, 100]);
    }

    #[test]
    fn stat_failure_is_carried_as_deferred_error() {
        let c = Coalescer::new();
        c.admit("/tmp/missing", 0, 0, Some(ErrorCode::Stat), 1);
        let item = c.next_work_item().unwrap();
        assert_eq!(item.deferred_err, Some(ErrorCode::Stat));
    }

    #[test]
    fn complete_on_unknown_key_returns_none() {
        let c = Coalescer::new();
        let key = WorkKey {
            pathname: "/tmp/missing".to_owned(),
            mtime: 0,
        };
        assert!(c.complete(&key).is_none());
    }

    #[test]
    fn coalescer_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CoalescerError>();
    }

    #[test]
    fn shutdown_unblocks_waiting_worker() {
        use std::sync::Arc;
        use std::thread;

        let c = Arc::new(Coalescer::new());
        let worker = {
            let c = Arc::clone(&c);
            thread::spawn(move || c.next_work_item())
        };

        c.shutdown();
        assert!(worker.join().unwrap().is_none());
    }
}
