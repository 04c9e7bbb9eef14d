//! Single-flight renewal bookkeeping.
//!
//! The `renewing` flag and the queue of callers waiting on it live behind one
//! synchronous mutex. `admit` checks and sets the flag in a single critical section
//! with no await inside, so two callers can never both become the leader.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::http::{ApiRequest, ApiResponse};

/// A call parked while a renewal is running; settled in FIFO order once it finishes.
pub struct PendingCall {
    pub request: ApiRequest,
    reply: oneshot::Sender<ClientResult<ApiResponse>>,
}

impl PendingCall {
    pub fn settle(self, result: ClientResult<ApiResponse>) {
        // Receiver gone means the caller stopped waiting
        let _ = self.reply.send(result);
    }
}

#[derive(Default)]
struct RenewalState {
    renewing: bool,
    queue: VecDeque<PendingCall>,
}

pub enum Admission<'a> {
    /// Caller must perform the renewal and then settle the guard.
    Leader { guard: RenewalGuard<'a>, request: ApiRequest },
    /// A renewal is running; the reply arrives once it settles.
    Queued(oneshot::Receiver<ClientResult<ApiResponse>>),
    /// The credential the request failed with has already been replaced; just retry.
    AlreadyRenewed { request: ApiRequest },
    /// No credential is held (never signed in, or a failed renewal or logout cleared it).
    /// Nothing to renew; the authorization failure stands.
    SignedOut,
}

#[derive(Default)]
pub struct RenewalCoordinator {
    state: Mutex<RenewalState>,
    issued: AtomicU64,
}

impl RenewalCoordinator {
    pub fn new() -> Self { Self::default() }

    /// Decide what a caller that just saw a 401 should do.
    ///
    /// `sent_with` is the credential the failed request carried, `current` the one in the
    /// store right now. Renewal only starts while a credential is held.
    pub fn admit(&self, request: ApiRequest, sent_with: Option<&str>, current: Option<&str>) -> Admission<'_> {
        let mut st = self.state.lock();
        if st.renewing {
            let (tx, rx) = oneshot::channel();
            st.queue.push_back(PendingCall { request, reply: tx });
            debug!(target: "renewal", "queued behind running renewal (depth={})", st.queue.len());
            return Admission::Queued(rx);
        }
        let Some(current) = current else {
            return Admission::SignedOut;
        };
        if sent_with != Some(current) {
            return Admission::AlreadyRenewed { request };
        }
        st.renewing = true;
        self.issued.fetch_add(1, Ordering::SeqCst);
        Admission::Leader { guard: RenewalGuard { coord: self, settled: false }, request }
    }

    pub fn is_renewing(&self) -> bool { self.state.lock().renewing }

    /// Number of renewals started over the coordinator's lifetime.
    pub fn renewals_issued(&self) -> u64 { self.issued.load(Ordering::SeqCst) }

    fn take(&self) -> Vec<PendingCall> {
        let mut st = self.state.lock();
        st.renewing = false;
        st.queue.drain(..).collect()
    }
}

/// Held by the leader for the duration of a renewal. Dropping it unsettled (the leader's
/// future was cancelled) still clears the flag and fails the waiters instead of stranding them.
pub struct RenewalGuard<'a> {
    coord: &'a RenewalCoordinator,
    settled: bool,
}

impl RenewalGuard<'_> {
    /// Clear `renewing` and hand back the queue in arrival order.
    pub fn settle(mut self) -> Vec<PendingCall> {
        self.settled = true;
        self.coord.take()
    }
}

impl Drop for RenewalGuard<'_> {
    fn drop(&mut self) {
        if self.settled { return; }
        for p in self.coord.take() {
            p.settle(Err(ClientError::network("renewal_abandoned", "credential renewal was cancelled")));
        }
    }
}
