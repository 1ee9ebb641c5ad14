//! # Correlated Request/Response Engine
//!
//! Pairs responses with the requests that caused them through a tracker id
//! carried on both legs.
//!
//! ## Lifecycle
//!
//! ```text
//! send ──► pending[tracker] ──┬─ resolve(tracker) ──► continuation(Ok)
//!                             └─ tick past deadline ─► continuation(Err(TimedOut))
//! ```
//!
//! Whichever happens first removes the entry, so the continuation runs exactly
//! once and a late response finds nothing to resolve.
//!
//! ## Tracker Ids
//!
//! Ids increase monotonically and wrap at `u32::MAX`. The pending table is
//! bounded far below 2^32, and an id that is still pending is skipped on wrap.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};

use crate::channel::{Destination, MessageChannel, NetworkChannel};
use crate::error::{RequestError, SessionError, SessionResult};

/// Token pairing a response with its request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackerId(pub u32);

impl fmt::Display for TrackerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Callback receiving the outcome of one request.
pub type Continuation<R> = Box<dyn FnOnce(Result<R, RequestError>) + Send>;

struct PendingRequest<R> {
    on_response: Continuation<R>,
    deadline: Option<Duration>,
    elapsed: Duration,
}

/// Table of in-flight requests expecting responses of type `R`.
pub struct RequestEngine<R> {
    pending: HashMap<TrackerId, PendingRequest<R>>,
    next_tracker: u32,
    max_pending: usize,
}

impl<R: Send + 'static> RequestEngine<R> {
    /// Creates an engine holding at most `max_pending` requests.
    #[must_use]
    pub fn new(max_pending: usize) -> Self {
        Self {
            pending: HashMap::new(),
            next_tracker: 0,
            max_pending,
        }
    }

    fn allocate(&mut self) -> SessionResult<TrackerId> {
        if self.pending.len() >= self.max_pending {
            return Err(SessionError::RequestTableFull {
                limit: self.max_pending,
            });
        }
        loop {
            let tracker = TrackerId(self.next_tracker);
            self.next_tracker = self.next_tracker.wrapping_add(1);
            if !self.pending.contains_key(&tracker) {
                return Ok(tracker);
            }
        }
    }

    /// Sends a request and stores its continuation.
    ///
    /// `build` receives the allocated tracker and returns the destination and
    /// encoded frame. The continuation runs exactly once: with the response,
    /// with [`RequestError::TimedOut`] once `deadline` elapses, or with
    /// [`RequestError::Rejected`] if the request never left.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is full, `build` fails or the channel
    /// refuses the frame. The continuation has already been told by then.
    pub fn send<B, F>(
        &mut self,
        channel: &mut dyn MessageChannel,
        build: B,
        deadline: Option<Duration>,
        on_response: F,
    ) -> SessionResult<TrackerId>
    where
        B: FnOnce(TrackerId) -> SessionResult<(Destination, Vec<u8>)>,
        F: FnOnce(Result<R, RequestError>) + Send + 'static,
    {
        let tracker = match self.allocate() {
            Ok(tracker) => tracker,
            Err(e) => {
                tracing::warn!("Request not sent: {e}");
                on_response(Err(RequestError::Rejected(e.to_string())));
                return Err(e);
            }
        };

        let sent = build(tracker)
            .and_then(|(destination, frame)| {
                channel.send(NetworkChannel::Reliable, destination, frame)
            });
        if let Err(e) = sent {
            tracing::warn!(%tracker, "Request not sent: {e}");
            on_response(Err(RequestError::Rejected(e.to_string())));
            return Err(e);
        }

        self.pending.insert(
            tracker,
            PendingRequest {
                on_response: Box::new(on_response),
                deadline,
                elapsed: Duration::ZERO,
            },
        );
        tracing::debug!(%tracker, "Request sent");
        Ok(tracker)
    }

    /// Fails a request before any round-trip.
    pub fn fail_immediately<F>(&self, on_response: F, error: RequestError)
    where
        F: FnOnce(Result<R, RequestError>),
    {
        tracing::debug!("Request short-circuited: {error}");
        on_response(Err(error));
    }

    /// Sends a request whose outcome is collected by polling.
    ///
    /// Failures to send are delivered through the waiter.
    pub fn wait<B>(
        &mut self,
        channel: &mut dyn MessageChannel,
        build: B,
        deadline: Duration,
    ) -> ResponseWaiter<R>
    where
        B: FnOnce(TrackerId) -> SessionResult<(Destination, Vec<u8>)>,
    {
        let (sender, receiver) = bounded(1);
        let tracker = self
            .send(channel, build, Some(deadline), ResponseWaiter::deliver_to(sender))
            .ok();
        ResponseWaiter { receiver, tracker }
    }

    /// Hands a response to its pending request.
    ///
    /// Returns false, silently, if nothing is pending under `tracker`: the
    /// response is a duplicate or arrived after the deadline.
    pub fn resolve(&mut self, tracker: TrackerId, response: R) -> bool {
        let Some(pending) = self.pending.remove(&tracker) else {
            tracing::debug!(%tracker, "Dropping response with no pending request");
            return false;
        };
        (pending.on_response)(Ok(response));
        true
    }

    /// Advances every deadline by `dt` and fails the requests that expired.
    ///
    /// Returns the number of requests that timed out.
    pub fn tick(&mut self, dt: Duration) -> usize {
        let mut expired = Vec::new();
        for (tracker, pending) in &mut self.pending {
            pending.elapsed += dt;
            if pending.deadline.is_some_and(|d| pending.elapsed >= d) {
                expired.push(*tracker);
            }
        }
        expired.sort_unstable();

        for tracker in &expired {
            if let Some(pending) = self.pending.remove(tracker) {
                tracing::warn!(%tracker, "Request timed out");
                (pending.on_response)(Err(RequestError::TimedOut));
            }
        }
        expired.len()
    }

    /// Returns true if `tracker` still awaits a response.
    #[must_use]
    pub fn is_pending(&self, tracker: TrackerId) -> bool {
        self.pending.contains_key(&tracker)
    }

    /// Number of requests awaiting a response.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Fails every pending request with `error`.
    pub fn clear(&mut self, error: &RequestError) {
        let mut drained: Vec<_> = self.pending.drain().collect();
        drained.sort_unstable_by_key(|(tracker, _)| *tracker);
        for (_, pending) in drained {
            (pending.on_response)(Err(error.clone()));
        }
    }
}

impl<R> fmt::Debug for RequestEngine<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestEngine")
            .field("pending", &self.pending.len())
            .field("next_tracker", &self.next_tracker)
            .field("max_pending", &self.max_pending)
            .finish()
    }
}

/// One-shot slot a polling task checks once per tick.
#[derive(Debug)]
pub struct ResponseWaiter<R> {
    receiver: Receiver<Result<R, RequestError>>,
    tracker: Option<TrackerId>,
}

impl<R: Send + 'static> ResponseWaiter<R> {
    /// Creates an unfilled waiter and the continuation that fills it.
    #[must_use]
    pub fn channel() -> (Continuation<R>, Self) {
        let (sender, receiver) = bounded(1);
        let waiter = Self {
            receiver,
            tracker: None,
        };
        (Box::new(Self::deliver_to(sender)), waiter)
    }

    fn deliver_to(
        sender: Sender<Result<R, RequestError>>,
    ) -> impl FnOnce(Result<R, RequestError>) + Send {
        move |result| {
            // The waiter may already be gone; the result is then unwanted.
            let _ = sender.try_send(result);
        }
    }

    /// Tracker of the underlying request, if it was sent.
    #[must_use]
    pub const fn tracker(&self) -> Option<TrackerId> {
        self.tracker
    }

    /// Takes the outcome if it has arrived.
    ///
    /// A waiter whose continuation was dropped unfired reports
    /// [`RequestError::SessionEnded`].
    #[must_use]
    pub fn poll(&self) -> Option<Result<R, RequestError>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(RequestError::SessionEnded)),
        }
    }
}
