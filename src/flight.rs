/// Single-flight coordination of token refreshes
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Outcome delivered to a waiting request: the new token, or `None` when
/// the refresh failed.
pub type RefreshOutcome = Option<String>;

/// Role handed out by [`RefreshFlight::join`]
#[derive(Debug)]
pub enum Ticket {
    /// The caller must perform the refresh and settle the flight
    Leader(LeaderGuard),
    /// A refresh is already running; await the receiver for its outcome
    Follower(oneshot::Receiver<RefreshOutcome>),
}

#[derive(Debug, Default)]
struct FlightState {
    in_flight: bool,
    waiters: VecDeque<oneshot::Sender<RefreshOutcome>>,
}

/// Refresh-in-flight flag plus the queue of requests blocked on it.
///
/// Check-and-set of the flag happens inside one critical section that never
/// awaits, so exactly one caller becomes leader per flight. Draining the
/// queue and clearing the flag happen in one critical section too, so the
/// queue is empty whenever the flag is false.
#[derive(Debug, Default)]
pub struct RefreshFlight {
    state: Mutex<FlightState>,
}

impl RefreshFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a refresh, or join the one already running.
    pub fn join(self: &Arc<Self>) -> Ticket {
        let mut state = self.state.lock();
        if state.in_flight {
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            tracing::debug!(pending = state.waiters.len(), "Joined in-flight token refresh");
            Ticket::Follower(rx)
        } else {
            state.in_flight = true;
            Ticket::Leader(LeaderGuard {
                flight: Arc::clone(self),
                settled: false,
            })
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.state.lock().in_flight
    }

    /// Number of requests waiting on the current flight
    pub fn pending(&self) -> usize {
        self.state.lock().waiters.len()
    }

    fn settle(&self, outcome: RefreshOutcome) -> usize {
        let waiters = {
            let mut state = self.state.lock();
            state.in_flight = false;
            std::mem::take(&mut state.waiters)
        };

        let count = waiters.len();
        for waiter in waiters {
            // A waiter whose request was dropped has nothing to resume
            let _ = waiter.send(outcome.clone());
        }
        count
    }
}

/// Held by the caller performing the refresh.
///
/// Dropping it without calling [`LeaderGuard::settle`] settles the flight as
/// failed, so a cancelled leader never strands its followers.
#[derive(Debug)]
pub struct LeaderGuard {
    flight: Arc<RefreshFlight>,
    settled: bool,
}

impl LeaderGuard {
    /// End the flight and resolve every queued request in enqueue order.
    ///
    /// Returns how many requests were waiting.
    pub fn settle(mut self, outcome: RefreshOutcome) -> usize {
        self.settled = true;
        self.flight.settle(outcome)
    }
}

impl Drop for LeaderGuard {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!("Token refresh abandoned before completion");
            self.flight.settle(None);
        }
    }
}
