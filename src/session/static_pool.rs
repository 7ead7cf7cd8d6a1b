//! Fixed-capacity session manager built on `heapless` containers.
//!
//! Every subscription owns a map from source node-ID to a reassembly slot,
//! and every slot owns a buffer of `EXTENT` bytes, so the whole manager is
//! sized at compile time: `SUBS * SESSIONS * EXTENT` bytes of payload.
//! `SESSIONS` must be a power of two.

use core::cmp::min;

use embedded_time::Clock;
use heapless::{FnvIndexMap, Vec};

use super::{SessionError, SessionManager, SubscriptionError};
use crate::internal::InternalRxFrame;
use crate::time::{self, Timestamp};
use crate::transfer::{Transfer, TransferKind};
use crate::transport::SessionMetadata;
use crate::types::*;
use crate::Subscription;

/// Reassembly state for one (subscription, source) pair.
struct Session<T, C: Clock, const EXTENT: usize> {
    /// Timestamp of the first frame of the latest transfer.
    timestamp: Timestamp<C>,
    in_progress: bool,
    total_payload_size: usize,
    payload: Vec<u8, EXTENT>,
    transfer_id: TransferId,
    md: T,
}

impl<T: SessionMetadata<C>, C: Clock, const EXTENT: usize> Session<T, C, EXTENT> {
    fn new(transfer_id: TransferId, timestamp: Timestamp<C>) -> Self {
        Self {
            timestamp,
            in_progress: true,
            total_payload_size: 0,
            payload: Vec::new(),
            transfer_id,
            md: T::new(),
        }
    }

    fn reset(&mut self) {
        self.in_progress = false;
        self.total_payload_size = 0;
        self.payload.clear();
        self.md = T::new();
    }

    fn accept_frame(
        &mut self,
        frame: InternalRxFrame<C>,
        extent: usize,
    ) -> Result<Option<Transfer<C>>, SessionError> {
        if let Err(err) = self.md.update(&frame) {
            self.reset();
            return Err(err);
        }

        // Read in payload, truncating to the extent. The transport trailer is
        // stored like data and cut off once the transfer completes.
        let room = extent.saturating_sub(self.payload.len());
        let copy_len = min(frame.payload.len(), room);
        self.payload
            .extend_from_slice(&frame.payload[..copy_len])
            .map_err(|_| SessionError::OutOfSpace)?;
        self.total_payload_size += frame.payload.len();

        if !frame.end_of_transfer {
            return Ok(None);
        }

        // The buffer stays readable until the next start frame for this source.
        self.in_progress = false;
        if !self.md.is_valid(&frame) {
            return Err(SessionError::CrcMismatch);
        }
        if !frame.is_single_frame() {
            let data_len = self
                .total_payload_size
                .checked_sub(T::TRAILER_SIZE)
                .ok_or(SessionError::CrcMismatch)?;
            self.payload.truncate(min(self.payload.len(), data_len));
        }

        Ok(Some(Transfer::from_frame(
            frame,
            self.timestamp,
            &self.payload,
        )))
    }
}

struct SubscriptionSlot<T, C: Clock, const SESSIONS: usize, const EXTENT: usize> {
    sub: Subscription<C>,
    sessions: FnvIndexMap<NodeId, Session<T, C, EXTENT>, SESSIONS>,
}

impl<T: SessionMetadata<C>, C: Clock, const SESSIONS: usize, const EXTENT: usize>
    SubscriptionSlot<T, C, SESSIONS, EXTENT>
{
    fn update<'a>(
        &'a mut self,
        frame: InternalRxFrame<'a, C>,
    ) -> Result<Option<Transfer<'a, C>>, SessionError> {
        let extent = self.sub.extent;

        // Anonymous transfers are single-frame and have no session to track.
        let source = match frame.source_node_id {
            Some(source) => source,
            None => {
                let payload = frame.payload;
                let len = min(payload.len(), extent);
                return Ok(Some(Transfer::from_frame(
                    frame,
                    frame.timestamp,
                    &payload[..len],
                )));
            }
        };

        // A start frame always replaces whatever was in progress.
        if frame.start_of_transfer {
            let session = Session::new(frame.transfer_id, frame.timestamp);
            if let Some(existing) = self.sessions.get_mut(&source) {
                *existing = session;
            } else {
                self.evict_idle();
                self.sessions
                    .insert(source, session)
                    .map_err(|_| SessionError::OutOfSpace)?;
            }
        }

        let timeout = self.sub.timeout;
        let session = match self.sessions.get_mut(&source) {
            Some(session) if session.in_progress => session,
            _ => return Err(SessionError::NewSessionNoStart),
        };

        if !frame.start_of_transfer {
            if time::expired::<C>(timeout, frame.timestamp, Some(session.timestamp)) {
                session.reset();
                return Err(SessionError::Timeout);
            }
            if session.transfer_id != frame.transfer_id {
                session.reset();
                return Err(SessionError::InvalidTransferId);
            }
        }

        session.accept_frame(frame, extent)
    }

    /// Frees one idle slot if the map is full.
    fn evict_idle(&mut self) {
        if self.sessions.len() < self.sessions.capacity() {
            return;
        }
        let idle = self
            .sessions
            .iter()
            .find(|(_, session)| !session.in_progress)
            .map(|(source, _)| *source);
        if let Some(source) = idle {
            self.sessions.remove(&source);
        }
    }

    /// Drops sessions that saw no start frame within the timeout.
    /// Returns how many of them were mid-transfer.
    fn expire(&mut self, now: Timestamp<C>) -> usize {
        let timeout = self.sub.timeout;
        let mut stale: Vec<NodeId, SESSIONS> = Vec::new();
        let mut dropped = 0;

        for (source, session) in self.sessions.iter() {
            if time::expired::<C>(timeout, now, Some(session.timestamp)) {
                // Can't overflow, both containers hold SESSIONS entries
                let _ = stale.push(*source);
                if session.in_progress {
                    dropped += 1;
                }
            }
        }
        for source in stale.iter() {
            self.sessions.remove(source);
        }

        dropped
    }
}

/// Session manager with compile-time capacity.
///
/// - `SUBS`: number of subscriptions.
/// - `SESSIONS`: concurrent sources per subscription (power of two).
/// - `EXTENT`: largest extent any subscription may request.
pub struct StaticSessionManager<
    T,
    C: Clock,
    const SUBS: usize,
    const SESSIONS: usize,
    const EXTENT: usize,
> {
    subscriptions: Vec<SubscriptionSlot<T, C, SESSIONS, EXTENT>, SUBS>,
}

impl<T, C, const SUBS: usize, const SESSIONS: usize, const EXTENT: usize>
    StaticSessionManager<T, C, SUBS, SESSIONS, EXTENT>
where
    T: SessionMetadata<C>,
    C: Clock,
{
    pub fn new() -> Self {
        Self {
            subscriptions: Vec::new(),
        }
    }

    /// Number of sources currently tracked for a subscription.
    pub fn session_count(&self, transfer_kind: TransferKind, port_id: PortId) -> usize {
        self.subscriptions
            .iter()
            .find(|slot| slot.sub.transfer_kind == transfer_kind && slot.sub.port_id == port_id)
            .map_or(0, |slot| slot.sessions.len())
    }
}

impl<T, C, const SUBS: usize, const SESSIONS: usize, const EXTENT: usize> Default
    for StaticSessionManager<T, C, SUBS, SESSIONS, EXTENT>
where
    T: SessionMetadata<C>,
    C: Clock,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, C, const SUBS: usize, const SESSIONS: usize, const EXTENT: usize> SessionManager<C>
    for StaticSessionManager<T, C, SUBS, SESSIONS, EXTENT>
where
    T: SessionMetadata<C>,
    C: Clock,
{
    fn ingest<'a>(
        &'a mut self,
        frame: InternalRxFrame<'a, C>,
    ) -> Result<Option<Transfer<'a, C>>, SessionError> {
        match self
            .subscriptions
            .iter_mut()
            .find(|slot| Self::matches_sub(&slot.sub, &frame))
        {
            Some(slot) => slot.update(frame),
            None => Ok(None),
        }
    }

    fn update_sessions(&mut self, timestamp: Timestamp<C>) -> usize {
        self.subscriptions
            .iter_mut()
            .map(|slot| slot.expire(timestamp))
            .sum()
    }

    fn subscribe(&mut self, subscription: Subscription<C>) -> Result<(), SubscriptionError> {
        if subscription.extent > EXTENT {
            return Err(SubscriptionError::ExtentTooLarge);
        }
        if self.is_subscribed(subscription.transfer_kind, subscription.port_id) {
            return Err(SubscriptionError::SubscriptionExists);
        }

        self.subscriptions
            .push(SubscriptionSlot {
                sub: subscription,
                sessions: FnvIndexMap::new(),
            })
            .map_err(|_| SubscriptionError::OutOfSpace)
    }

    fn unsubscribe(
        &mut self,
        transfer_kind: TransferKind,
        port_id: PortId,
    ) -> Result<(), SubscriptionError> {
        let index = self
            .subscriptions
            .iter()
            .position(|slot| {
                slot.sub.transfer_kind == transfer_kind && slot.sub.port_id == port_id
            })
            .ok_or(SubscriptionError::SubscriptionDoesNotExist)?;
        self.subscriptions.swap_remove(index);
        Ok(())
    }

    fn is_subscribed(&self, transfer_kind: TransferKind, port_id: PortId) -> bool {
        self.subscriptions
            .iter()
            .any(|slot| slot.sub.transfer_kind == transfer_kind && slot.sub.port_id == port_id)
    }
}
