//! The Node struct is a convenience wrapper around the transport and the
//! session manager. It owns everything a Cyphal/CAN participant keeps between
//! calls: the outgoing frame queue, one transfer-ID counter per output
//! session, the table of requests waiting for a response, and a set of
//! diagnostic counters.
//!
//! The node never touches hardware by itself. A driver pulls frames with
//! [`Node::pop_frame`] (or lets [`Node::flush`] write them to an
//! `embedded-hal` peripheral) and pushes received frames into
//! [`Node::receive_frame`]. Call [`Node::update`] periodically to expire
//! stale state.

use embedded_hal::blocking::can;
use embedded_time::Clock;
use streaming_iterator::StreamingIterator;

use crate::config::NodeConfig;
use crate::data_type::{Deserialize, Message, Serialize, ServiceRequest, ServiceResponse};
use crate::diagnostics::Diagnostics;
use crate::request::{
    PendingRequests, RequestError, RequestHandle, ResponseError, ResponseMatch,
};
use crate::session::{SessionManager, SubscriptionError};
use crate::time::Timestamp;
use crate::transfer::{Transfer, TransferKind, TransferMetadata};
use crate::transport::can::{Can, CanFrame};
use crate::transport::Transport;
use crate::tx::{TransferIdCounters, TxQueue};
use crate::types::*;
use crate::{Priority, RxError, Subscription, TxError, MAX_PAYLOAD_SIZE};

/// Cyphal/CAN node.
///
/// * `S`: session manager doing reassembly.
/// * `Q`: transmit queue capacity, in frames.
/// * `R`: outstanding request capacity (power of two).
/// * `T`: transfer-ID counter capacity (power of two).
pub struct Node<S, C, const Q: usize, const R: usize, const T: usize>
where
    S: SessionManager<C>,
    C: Clock,
{
    id: Option<NodeId>,

    /// A clock to get instants inside the node
    clock: C,

    /// Session manager. Public so subscriptions can be managed directly.
    pub sessions: S,

    tx_queue: TxQueue<CanFrame<C>, Q>,
    requests: PendingRequests<C, R>,
    transfer_ids: TransferIdCounters<T>,
    config: NodeConfig<C>,
    diagnostics: Diagnostics,
}

impl<S, C, const Q: usize, const R: usize, const T: usize> Node<S, C, Q, R, T>
where
    S: SessionManager<C>,
    C: Clock,
{
    /// `id` of `None` makes an anonymous node, which can only publish
    /// single-frame messages.
    pub fn new(id: Option<NodeId>, clock: C, sessions: S, config: NodeConfig<C>) -> Self {
        Self {
            id,
            clock,
            sessions,
            tx_queue: TxQueue::new(),
            requests: PendingRequests::new(),
            transfer_ids: TransferIdCounters::new(),
            config,
            diagnostics: Diagnostics::default(),
        }
    }

    pub fn node_id(&self) -> Option<NodeId> {
        self.id
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn config(&self) -> &NodeConfig<C> {
        &self.config
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Receive messages of type `M`. `extent` defaults to `M::EXTENT`.
    pub fn subscribe_message<M: Message>(
        &mut self,
        extent: Option<usize>,
    ) -> Result<(), SubscriptionError> {
        self.sessions.subscribe(Subscription::new(
            TransferKind::Message,
            M::SUBJECT_ID,
            extent.unwrap_or(M::EXTENT),
            self.config.transfer_timeout,
        ))
    }

    /// Receive requests of service `P`, to be answered with [`Node::respond`].
    pub fn subscribe_requests<P: ServiceRequest>(&mut self) -> Result<(), SubscriptionError> {
        self.sessions.subscribe(Subscription::new(
            TransferKind::Request,
            P::SERVICE_ID,
            P::EXTENT,
            self.config.transfer_timeout,
        ))
    }

    /// Serialize and queue a message. Returns the transfer-ID it went out with.
    pub fn publish<M: Message>(
        &mut self,
        message: &M,
        priority: Option<Priority>,
    ) -> Result<TransferId, TxError> {
        let mut buffer = [0u8; MAX_PAYLOAD_SIZE];
        let len = self.serialize(message, &mut buffer)?;
        let transfer_id = self.transfer_ids.next(M::SUBJECT_ID, None)?;

        let transfer = Transfer {
            metadata: TransferMetadata {
                timestamp: self.now()?,
                priority: priority.unwrap_or(self.config.default_priority),
                transfer_kind: TransferKind::Message,
                port_id: M::SUBJECT_ID,
                remote_node_id: None,
                transfer_id,
            },
            payload: &buffer[..len],
        };
        self.transmit(&transfer)?;
        Ok(transfer_id)
    }

    /// Send a request to `server`. The response is collected in the
    /// background; redeem the handle with [`Node::take_response`].
    pub fn request<P: ServiceRequest>(
        &mut self,
        server: NodeId,
        request: &P,
        priority: Option<Priority>,
    ) -> Result<RequestHandle<P::Response>, TxError> {
        let local = self.id.ok_or(TxError::ServiceNoSourceID)?;
        if server > NODE_ID_MAX || server == local {
            return Err(TxError::InvalidNodeId);
        }

        let mut buffer = [0u8; MAX_PAYLOAD_SIZE];
        let len = self.serialize(request, &mut buffer)?;

        if !self
            .sessions
            .is_subscribed(TransferKind::Response, P::SERVICE_ID)
        {
            self.sessions.subscribe(Subscription::new(
                TransferKind::Response,
                P::SERVICE_ID,
                <P::Response as ServiceResponse>::EXTENT,
                self.config.transfer_timeout,
            ))?;
        }

        let transfer_id = self.transfer_ids.next(P::SERVICE_ID, Some(server))?;
        let now = self.now()?;
        let key = self
            .requests
            .register(P::SERVICE_ID, server, transfer_id, now)
            .map_err(|err| match err {
                RequestError::DuplicateSession => TxError::DuplicateSession,
                RequestError::TableFull => TxError::RequestTableFull,
            })?;

        let transfer = Transfer {
            metadata: TransferMetadata {
                timestamp: now,
                priority: priority.unwrap_or(self.config.default_priority),
                transfer_kind: TransferKind::Request,
                port_id: P::SERVICE_ID,
                remote_node_id: Some(server),
                transfer_id,
            },
            payload: &buffer[..len],
        };
        if let Err(err) = self.transmit(&transfer) {
            self.requests.cancel(&key);
            return Err(err);
        }
        Ok(RequestHandle::new(key))
    }

    /// Answer a received request. Priority and transfer-ID are taken from
    /// the request.
    pub fn respond<P: ServiceResponse>(
        &mut self,
        request: &TransferMetadata<C>,
        response: &P,
    ) -> Result<(), TxError> {
        if request.transfer_kind != TransferKind::Request {
            return Err(TxError::NotARequest);
        }
        let client = request
            .remote_node_id
            .ok_or(TxError::ServiceNoDestinationID)?;

        let mut buffer = [0u8; MAX_PAYLOAD_SIZE];
        let len = self.serialize(response, &mut buffer)?;

        let transfer = Transfer {
            metadata: TransferMetadata {
                timestamp: self.now()?,
                priority: request.priority,
                transfer_kind: TransferKind::Response,
                port_id: request.port_id,
                remote_node_id: Some(client),
                transfer_id: request.transfer_id,
            },
            payload: &buffer[..len],
        };
        self.transmit(&transfer)
    }

    /// Collect the response to an earlier request. `Ok(None)` while it
    /// hasn't arrived yet; the handle is spent once this returns `Ok(Some)`.
    pub fn take_response<P: Deserialize>(
        &mut self,
        handle: &RequestHandle<P>,
    ) -> Result<Option<P>, ResponseError> {
        match self.requests.take(&handle.key())? {
            Some(payload) => Ok(Some(P::deserialize(&payload)?)),
            None => Ok(None),
        }
    }

    /// True while `handle` still waits for its response.
    pub fn is_pending<P>(&self, handle: &RequestHandle<P>) -> bool {
        self.requests.is_pending(&handle.key())
    }

    /// Next frame for the bus, oldest first.
    pub fn pop_frame(&mut self) -> Option<CanFrame<C>> {
        self.tx_queue.pop()
    }

    pub fn peek_frame(&self) -> Option<&CanFrame<C>> {
        self.tx_queue.front()
    }

    pub fn pending_frames(&self) -> usize {
        self.tx_queue.len()
    }

    /// Attempts to receive frame. Returns error when frame is invalid,
    /// `Some(Transfer)` at the end of a message or request transfer, and
    /// `None` otherwise. Responses are matched against outstanding requests
    /// and never returned here.
    pub fn try_receive_frame<'a>(
        &'a mut self,
        frame: &'a CanFrame<C>,
    ) -> Result<Option<Transfer<'a, C>>, RxError> {
        bump(&mut self.diagnostics.frames_received);

        let frame = match <Can as Transport<C>>::rx_process_frame(&self.id, frame) {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(None),
            Err(err) => {
                #[cfg(feature = "defmt")]
                defmt::debug!("dropped frame: {}", err);
                self.diagnostics.record_rx_error(&err);
                return Err(err);
            }
        };

        match self.sessions.ingest(frame) {
            Ok(Some(transfer)) => {
                bump(&mut self.diagnostics.transfers_received);
                if transfer.metadata.transfer_kind != TransferKind::Response {
                    return Ok(Some(transfer));
                }

                if self.requests.on_response(&transfer) == ResponseMatch::Unmatched {
                    #[cfg(feature = "defmt")]
                    defmt::debug!(
                        "unsolicited response on service {}",
                        transfer.metadata.port_id
                    );
                    bump(&mut self.diagnostics.unmatched_responses);
                }
                Ok(None)
            }
            Ok(None) => Ok(None),
            Err(err) => {
                let err = RxError::SessionError(err);
                #[cfg(feature = "defmt")]
                defmt::debug!("dropped frame: {}", err);
                self.diagnostics.record_rx_error(&err);
                Err(err)
            }
        }
    }

    /// Same as [`Node::try_receive_frame`], with rejected frames only
    /// showing up in the diagnostics.
    pub fn receive_frame<'a>(&'a mut self, frame: &'a CanFrame<C>) -> Option<Transfer<'a, C>> {
        self.try_receive_frame(frame).ok().flatten()
    }

    /// Housekeeping: drop partial transfers and, if a request timeout is
    /// configured, unanswered requests that are too old.
    pub fn update(&mut self, now: Timestamp<C>) {
        let timed_out = self.sessions.update_sessions(now);
        add(&mut self.diagnostics.session_timeouts, timed_out);

        if let Some(timeout) = self.config.request_timeout {
            let expired = self.requests.expire(now, timeout);
            #[cfg(feature = "defmt")]
            if expired > 0 {
                defmt::warn!("{} requests expired without response", expired);
            }
            add(&mut self.diagnostics.expired_requests, expired);
        }
    }

    /// Write every queued frame to `bus`. Stops at the first bus error,
    /// leaving the failed frame at the head of the queue.
    ///
    /// Frames the driver's frame type cannot represent are dropped and
    /// counted in [`Diagnostics::unsendable_frames`].
    pub fn flush<B: can::Can>(&mut self, bus: &mut B) -> Result<usize, B::Error> {
        let mut sent = 0;
        while let Some(frame) = self.tx_queue.front() {
            match frame.to_hal::<B::Frame>() {
                Some(frame) => {
                    bus.transmit(&frame)?;
                    sent += 1;
                }
                None => {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("driver rejected frame {=u32:#x}", frame.id.as_raw());
                    bump(&mut self.diagnostics.unsendable_frames);
                }
            }
            self.tx_queue.pop();
        }
        Ok(sent)
    }

    fn now(&self) -> Result<Timestamp<C>, TxError> {
        self.clock.try_now().map_err(|_| TxError::Clock)
    }

    fn serialize<V: Serialize>(&self, value: &V, buffer: &mut [u8]) -> Result<usize, TxError> {
        let len = value.serialize(buffer)?;
        if len > self.config.payload_limit() {
            return Err(TxError::PayloadTooLarge);
        }
        Ok(len)
    }

    /// Queue every frame of `transfer`, or none of them.
    ///
    /// Low-level entry point: the caller picks the transfer-ID, no counter
    /// is touched.
    pub fn transmit(&mut self, transfer: &Transfer<C>) -> Result<(), TxError> {
        if transfer.payload.len() > self.config.payload_limit() {
            return Err(TxError::PayloadTooLarge);
        }

        let count = <Can as Transport<C>>::frame_count(transfer.payload.len());
        if count > self.tx_queue.free() {
            #[cfg(feature = "defmt")]
            defmt::warn!("tx queue full, {} frames needed", count);
            bump(&mut self.diagnostics.queue_full);
            return Err(TxError::QueueFull);
        }

        let mut frames = <Can as Transport<C>>::transmit(transfer, self.id)?;
        while let Some(frame) = frames.next() {
            self.tx_queue.push(frame.clone())?;
        }

        #[cfg(feature = "defmt")]
        defmt::trace!(
            "queued transfer {} on port {} ({} frames)",
            transfer.metadata.transfer_id,
            transfer.metadata.port_id,
            count
        );
        add(&mut self.diagnostics.frames_queued, count);
        bump(&mut self.diagnostics.transfers_sent);
        Ok(())
    }
}

fn bump(counter: &mut u32) {
    *counter = counter.saturating_add(1);
}

fn add(counter: &mut u32, amount: usize) {
    let amount = u32::try_from(amount).unwrap_or(u32::MAX);
    *counter = counter.saturating_add(amount);
}
