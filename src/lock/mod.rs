//! Fair writer lock
//!
//! A ticket lock: every requester draws the next ticket and waits until the
//! lock is serving that ticket, so the lock is granted strictly in request
//! order. Holding the lock is represented by a `WriterPermit`, a move-only
//! guard that releases on drop. A permit can be released exactly once, no
//! matter how the holder exits.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct TicketState {
    /// Ticket handed to the next requester
    next_ticket: u64,
    /// Ticket currently allowed to hold the lock
    now_serving: u64,
    /// Whether the ticket being served has been claimed
    held: bool,
    /// Tickets whose requesters gave up waiting; skipped when reached
    abandoned: BTreeSet<u64>,
}

/// First-come, first-served mutual exclusion
#[derive(Debug, Default)]
pub struct FairLock {
    state: Mutex<TicketState>,
    turn: Condvar,
}

impl FairLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the lock is granted to this caller
    pub fn acquire(self: &Arc<Self>) -> WriterPermit {
        let mut state = self.state.lock();
        let ticket = state.next_ticket;
        state.next_ticket += 1;

        while state.now_serving != ticket {
            self.turn.wait(&mut state);
        }
        state.held = true;

        WriterPermit {
            lock: Arc::clone(self),
            ticket,
        }
    }

    /// Wait at most `timeout` for the lock.
    ///
    /// A requester that times out gives up its place in the queue; requesters
    /// behind it keep their relative order.
    pub fn try_acquire_for(self: &Arc<Self>, timeout: Duration) -> Option<WriterPermit> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        let ticket = state.next_ticket;
        state.next_ticket += 1;

        while state.now_serving != ticket {
            if self.turn.wait_until(&mut state, deadline).timed_out() {
                if state.now_serving == ticket {
                    break;
                }
                state.abandoned.insert(ticket);
                return None;
            }
        }
        state.held = true;

        Some(WriterPermit {
            lock: Arc::clone(self),
            ticket,
        })
    }

    /// True while some permit is alive
    pub fn is_held(&self) -> bool {
        self.state.lock().held
    }

    /// Number of requesters currently waiting for the lock
    pub fn queued(&self) -> usize {
        let state = self.state.lock();
        let outstanding = state.next_ticket - state.now_serving;
        outstanding as usize - usize::from(state.held) - state.abandoned.len()
    }

    fn release(&self, ticket: u64) {
        let mut state = self.state.lock();
        debug_assert_eq!(state.now_serving, ticket, "released a permit out of turn");
        state.held = false;
        state.now_serving += 1;
        loop {
            let next = state.now_serving;
            if !state.abandoned.remove(&next) {
                break;
            }
            state.now_serving += 1;
        }
        drop(state);
        self.turn.notify_all();
    }
}

/// Proof of holding the writer lock; released when dropped
#[derive(Debug)]
#[must_use = "the writer lock is released as soon as the permit is dropped"]
pub struct WriterPermit {
    lock: Arc<FairLock>,
    ticket: u64,
}

impl WriterPermit {
    /// Position of this permit in the grant order
    pub fn ticket(&self) -> u64 {
        self.ticket
    }
}

impl Drop for WriterPermit {
    fn drop(&mut self) {
        self.lock.release(self.ticket);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn wait_for_queue(lock: &FairLock, len: usize) {
        while lock.queued() < len {
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_acquire_and_release() {
        let lock = Arc::new(FairLock::new());
        assert!(!lock.is_held());

        let permit = lock.acquire();
        assert!(lock.is_held());
        assert_eq!(permit.ticket(), 0);

        drop(permit);
        assert!(!lock.is_held());

        let permit = lock.acquire();
        assert_eq!(permit.ticket(), 1);
    }

    #[test]
    fn test_grants_in_request_order() {
        let lock = Arc::new(FairLock::new());
        let order = Arc::new(Mutex::new(Vec::new()));
        let first = lock.acquire();

        let mut handles = Vec::new();
        for id in 0..5 {
            let thread_lock = Arc::clone(&lock);
            let order = Arc::clone(&order);
            handles.push(thread::spawn(move || {
                let _permit = thread_lock.acquire();
                order.lock().push(id);
            }));
            wait_for_queue(&lock, id + 1);
        }

        drop(first);
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
        assert!(!lock.is_held());
    }

    #[test]
    fn test_try_acquire_times_out_while_held() {
        let lock = Arc::new(FairLock::new());
        let _held = lock.acquire();

        assert!(lock.try_acquire_for(Duration::from_millis(20)).is_none());
        assert_eq!(lock.queued(), 0);
    }

    #[test]
    fn test_abandoned_ticket_is_skipped() {
        let lock = Arc::new(FairLock::new());
        let held = lock.acquire();

        // ticket 1 gives up, ticket 2 waits
        assert!(lock.try_acquire_for(Duration::from_millis(10)).is_none());

        let waiter = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || lock.acquire().ticket())
        };
        wait_for_queue(&lock, 1);

        drop(held);
        assert_eq!(waiter.join().unwrap(), 2);
        assert!(!lock.is_held());
    }

    #[test]
    fn test_try_acquire_succeeds_when_free() {
        let lock = Arc::new(FairLock::new());
        let permit = lock.try_acquire_for(Duration::from_millis(10));
        assert!(permit.is_some());
        assert!(lock.is_held());
    }
}
