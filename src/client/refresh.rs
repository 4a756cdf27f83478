//! Single-flight coordination for access token refresh.
//!
//! The first caller to hit an expired access token becomes the leader and
//! performs the refresh. Callers arriving while it runs are parked in FIFO
//! order and resumed with the leader's result. The state lock is only held
//! for the state transition itself, never across the refresh request.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("token refresh failed")]
pub struct RefreshFailed;

/// New access token, or the failure every parked caller shares.
pub type RefreshResult = Result<String, RefreshFailed>;

enum GateState {
    Idle,
    Refreshing {
        waiters: VecDeque<oneshot::Sender<RefreshResult>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePhase {
    Idle,
    Refreshing,
}

pub struct RefreshGate {
    state: Mutex<GateState>,
}

/// What a caller must do after entering the gate.
pub enum Turn<'a> {
    Leader(RefreshLease<'a>),
    Follower(oneshot::Receiver<RefreshResult>),
}

/// Held by the leader. Dropping it unfinished releases the followers with a failure.
pub struct RefreshLease<'a> {
    gate: &'a RefreshGate,
    finished: bool,
}

impl Default for RefreshGate {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshGate {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState::Idle),
        }
    }

    pub fn enter(&self) -> Turn<'_> {
        let mut state = self.lock();
        if let GateState::Refreshing { waiters } = &mut *state {
            let (tx, rx) = oneshot::channel();
            waiters.push_back(tx);
            return Turn::Follower(rx);
        }

        *state = GateState::Refreshing {
            waiters: VecDeque::new(),
        };
        Turn::Leader(RefreshLease {
            gate: self,
            finished: false,
        })
    }

    pub fn phase(&self) -> GatePhase {
        match &*self.lock() {
            GateState::Idle => GatePhase::Idle,
            GateState::Refreshing { .. } => GatePhase::Refreshing,
        }
    }

    pub fn waiting(&self) -> usize {
        match &*self.lock() {
            GateState::Idle => 0,
            GateState::Refreshing { waiters } => waiters.len(),
        }
    }

    fn release(&self, result: RefreshResult) {
        let waiters = match std::mem::replace(&mut *self.lock(), GateState::Idle) {
            GateState::Refreshing { waiters } => waiters,
            GateState::Idle => VecDeque::new(),
        };

        for waiter in waiters {
            // A follower that went away no longer needs the result
            let _ = waiter.send(result.clone());
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        // Transitions never panic while holding the lock
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RefreshLease<'_> {
    pub fn complete(mut self, result: RefreshResult) {
        self.finished = true;
        self.gate.release(result);
    }
}

impl Drop for RefreshLease<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.gate.release(Err(RefreshFailed));
        }
    }
}

/// Waits for the leader's result. A leader that vanished counts as a failure.
pub async fn wait_for(receiver: oneshot::Receiver<RefreshResult>) -> RefreshResult {
    receiver.await.unwrap_or(Err(RefreshFailed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_caller_leads_and_others_follow() {
        let gate = RefreshGate::new();

        let lease = match gate.enter() {
            Turn::Leader(lease) => lease,
            Turn::Follower(_) => panic!("first caller must lead"),
        };
        assert_eq!(gate.phase(), GatePhase::Refreshing);

        let mut followers = Vec::new();
        for _ in 0..3 {
            match gate.enter() {
                Turn::Follower(rx) => followers.push(rx),
                Turn::Leader(_) => panic!("only one leader per refresh"),
            }
        }
        assert_eq!(gate.waiting(), 3);

        lease.complete(Ok("evt_access_new".to_string()));
        assert_eq!(gate.phase(), GatePhase::Idle);

        for rx in followers {
            assert_eq!(wait_for(rx).await, Ok("evt_access_new".to_string()));
        }
    }

    #[tokio::test]
    async fn failure_reaches_every_follower() {
        let gate = RefreshGate::new();
        let Turn::Leader(lease) = gate.enter() else {
            panic!("first caller must lead");
        };
        let Turn::Follower(rx) = gate.enter() else {
            panic!("second caller must follow");
        };

        lease.complete(Err(RefreshFailed));
        assert_eq!(wait_for(rx).await, Err(RefreshFailed));
    }

    #[tokio::test]
    async fn dropped_lease_releases_followers() {
        let gate = RefreshGate::new();
        let Turn::Leader(lease) = gate.enter() else {
            panic!("first caller must lead");
        };
        let Turn::Follower(rx) = gate.enter() else {
            panic!("second caller must follow");
        };

        drop(lease);
        assert_eq!(gate.phase(), GatePhase::Idle);
        assert_eq!(wait_for(rx).await, Err(RefreshFailed));

        // The gate is usable again
        assert!(matches!(gate.enter(), Turn::Leader(_)));
    }
}
