//! Pending calls grouped into named collections.
//!
//! Each [`PendingCall`] owns the sending half of a one-shot channel; the
//! receiving half is handed to whoever enqueued the call as a
//! [`Settlement`]. Settling marks the entry finished and completes the
//! channel exactly once. Entries stay in the collection until swept.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::SettlementError;
use crate::names::CollectionName;

/// Status code carried by a superseded outcome.
pub const SUPERSEDED_CODE: u16 = 204;

/// Status text carried by a superseded outcome.
pub const SUPERSEDED_STATUS: &str = "Replacing previous call with the more recent call instead";

/// Unique identifier of a pending call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallId(Uuid);

impl CallId {
    pub fn new() -> Self {
        CallId(Uuid::new_v4())
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Outcome delivered to a call that was replaced by a more recent one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superseded {
    pub code: u16,
    pub status: &'static str,
}

impl Default for Superseded {
    fn default() -> Self {
        Superseded {
            code: SUPERSEDED_CODE,
            status: SUPERSEDED_STATUS,
        }
    }
}

/// How a pending call was settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Resolved(T),
    Rejected(T),
    Superseded(Superseded),
}

impl<T> Outcome<T> {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Resolved(_) => OutcomeKind::Resolved,
            Outcome::Rejected(_) => OutcomeKind::Rejected,
            Outcome::Superseded(_) => OutcomeKind::Superseded,
        }
    }

    pub fn is_superseded(&self) -> bool {
        matches!(self, Outcome::Superseded(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Resolved,
    Rejected,
    Superseded,
}

/// Which entry a settlement applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// The entry with this id, if it is still unfinished.
    Id(CallId),
    /// The first unfinished entry in request order.
    Oldest,
    /// The last unfinished entry in request order.
    Newest,
}

/// Abort capability of the in-flight operation behind a pending call.
pub trait Transport: Send {
    fn abort(&self);
}

impl Transport for AbortHandle {
    fn abort(&self) {
        AbortHandle::abort(self);
    }
}

impl<R: Send + 'static> Transport for JoinHandle<R> {
    fn abort(&self) {
        JoinHandle::abort(self);
    }
}

impl Transport for CancellationToken {
    fn abort(&self) {
        self.cancel();
    }
}

/// Observer side of a pending call.
///
/// Resolves once the call is settled. There is no timeout: a call that is
/// never settled stays pending until the queue itself is dropped.
#[derive(Debug)]
pub struct Settlement<T> {
    rx: oneshot::Receiver<Outcome<T>>,
}

impl<T> Settlement<T> {
    /// Take the outcome without waiting. `None` while the call is unsettled.
    ///
    /// Once an outcome has been taken the settlement reports
    /// [`SettlementError::Dropped`] on any further probe.
    pub fn try_outcome(&mut self) -> Option<Result<Outcome<T>, SettlementError>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(Ok(outcome)),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(SettlementError::Dropped)),
        }
    }
}

impl<T> Future for Settlement<T> {
    type Output = Result<Outcome<T>, SettlementError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.map_err(|_| SettlementError::Dropped))
    }
}

/// Read-only view of a pending call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSnapshot {
    pub id: CallId,
    pub finished: bool,
    pub created_at: Duration,
    pub has_transport: bool,
    pub settled: Option<OutcomeKind>,
    /// True for the stand-in returned when a collection has nothing unresolved.
    /// Its id is never stored, so it cannot be found or settled later.
    pub detached: bool,
}

impl CallSnapshot {
    pub(crate) fn detached(created_at: Duration) -> Self {
        CallSnapshot {
            id: CallId::new(),
            finished: false,
            created_at,
            has_transport: false,
            settled: None,
            detached: true,
        }
    }
}

pub(crate) struct PendingCall<T> {
    id: CallId,
    sender: Option<oneshot::Sender<Outcome<T>>>,
    transport: Option<Box<dyn Transport>>,
    finished: bool,
    created_at: Duration,
    settled: Option<OutcomeKind>,
}

impl<T> PendingCall<T> {
    pub(crate) fn snapshot(&self) -> CallSnapshot {
        CallSnapshot {
            id: self.id,
            finished: self.finished,
            created_at: self.created_at,
            has_transport: self.transport.is_some(),
            settled: self.settled,
            detached: false,
        }
    }

    /// Finish the call with `outcome`. No-op if it already finished.
    fn settle(&mut self, outcome: Outcome<T>) -> bool {
        if self.finished {
            return false;
        }
        self.finished = true;
        self.settled = Some(outcome.kind());
        if let Some(sender) = self.sender.take() {
            // The observer may have stopped listening; the call is finished either way.
            let _ = sender.send(outcome);
        }
        true
    }
}

/// Ordered pending calls of one named collection.
pub(crate) struct CallCollection<T> {
    name: CollectionName,
    entries: Vec<PendingCall<T>>,
}

impl<T> CallCollection<T> {
    pub(crate) fn new(name: CollectionName) -> Self {
        CallCollection {
            name,
            entries: Vec::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn enqueue(&mut self, now: Duration) -> (CallId, Settlement<T>) {
        let (sender, rx) = oneshot::channel();
        let id = CallId::new();
        self.entries.push(PendingCall {
            id,
            sender: Some(sender),
            transport: None,
            finished: false,
            created_at: now,
            settled: None,
        });
        (id, Settlement { rx })
    }

    pub(crate) fn find(&self, id: CallId) -> Option<&PendingCall<T>> {
        self.entries.iter().find(|call| call.id == id)
    }

    pub(crate) fn find_unresolved(&self, prefer_newest: bool) -> Option<&PendingCall<T>> {
        if prefer_newest {
            self.entries.iter().rev().find(|call| !call.finished)
        } else {
            self.entries.iter().find(|call| !call.finished)
        }
    }

    pub(crate) fn has_unresolved(&self) -> bool {
        self.entries.iter().any(|call| !call.finished)
    }

    /// Settle the entry picked by `target`. Returns whether anything changed.
    pub(crate) fn settle(&mut self, target: Target, outcome: Outcome<T>) -> bool {
        let index = match target {
            Target::Id(id) => self.entries.iter().position(|call| call.id == id),
            Target::Oldest => self.entries.iter().position(|call| !call.finished),
            Target::Newest => self.entries.iter().rposition(|call| !call.finished),
        };
        match index {
            Some(index) => self.entries[index].settle(outcome),
            None => false,
        }
    }

    /// Attach the abort capability of an in-flight operation to an unfinished entry.
    pub(crate) fn attach_transport(&mut self, id: CallId, transport: Box<dyn Transport>) -> bool {
        match self.entries.iter_mut().find(|call| call.id == id && !call.finished) {
            Some(call) => {
                call.transport = Some(transport);
                true
            }
            None => false,
        }
    }

    /// Abort and supersede every unfinished entry except `skip`.
    ///
    /// Returns the number of entries superseded.
    pub(crate) fn abort_all(&mut self, skip: Option<CallId>) -> usize {
        let mut superseded = 0;
        for call in self
            .entries
            .iter_mut()
            .filter(|call| !call.finished && Some(call.id) != skip)
        {
            if let Some(transport) = &call.transport {
                transport.abort();
            }
            call.settle(Outcome::Superseded(Superseded::default()));
            log::debug!("Call {} in '{}' superseded", call.id, self.name);
            superseded += 1;
        }
        superseded
    }

    /// Drop every finished entry. Returns the number removed.
    pub(crate) fn sweep(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|call| !call.finished);
        before - self.entries.len()
    }
}
