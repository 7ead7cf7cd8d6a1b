//! Outstanding service requests.
//!
//! Every request we send is recorded under (service-ID, server node-ID,
//! transfer-ID). A response carrying the same triple completes it; anything
//! else is unsolicited and dropped. The payload is copied out of the session
//! buffer so the caller can collect it whenever convenient.

use core::marker::PhantomData;

use embedded_time::duration::Generic;
use embedded_time::Clock;
use heapless::{FnvIndexMap, Vec};

use crate::data_type::DeserializeError;
use crate::time::{self, Timestamp};
use crate::transfer::{Transfer, TransferKind};
use crate::types::*;
use crate::MAX_PAYLOAD_SIZE;

/// Identifies one request/response exchange.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RequestKey {
    pub service_id: PortId,
    pub server: NodeId,
    pub transfer_id: TransferId,
}

/// Returned by [`crate::Node::request`]; redeem it with
/// [`crate::Node::take_response`].
#[derive(Debug)]
pub struct RequestHandle<R> {
    key: RequestKey,
    _response: PhantomData<fn() -> R>,
}

impl<R> RequestHandle<R> {
    pub(crate) fn new(key: RequestKey) -> Self {
        Self {
            key,
            _response: PhantomData,
        }
    }

    pub fn key(&self) -> RequestKey {
        self.key
    }
}

impl<R> Clone for RequestHandle<R> {
    fn clone(&self) -> Self {
        Self::new(self.key)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RequestError {
    /// Same key is already waiting for a response.
    #[error("request already pending")]
    DuplicateSession,
    #[error("pending request table full")]
    TableFull,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResponseError {
    /// Handle was never issued, was already redeemed, or expired.
    #[error("unknown request")]
    Unknown,
    #[error("response could not be decoded: {0}")]
    Decode(#[from] DeserializeError),
}

/// Outcome of offering a response transfer to the table.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResponseMatch {
    /// Stored against the request it answers.
    Dispatched(RequestKey),
    /// No request is waiting for this response.
    Unmatched,
}

struct PendingRequest<C: Clock> {
    issued: Timestamp<C>,
    response: Option<Vec<u8, MAX_PAYLOAD_SIZE>>,
}

/// Fixed-capacity table of outstanding requests. `N` must be a power of two.
pub struct PendingRequests<C: Clock, const N: usize> {
    pending: FnvIndexMap<RequestKey, PendingRequest<C>, N>,
}

impl<C: Clock, const N: usize> PendingRequests<C, N> {
    pub fn new() -> Self {
        Self {
            pending: FnvIndexMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn register(
        &mut self,
        service_id: PortId,
        server: NodeId,
        transfer_id: TransferId,
        issued: Timestamp<C>,
    ) -> Result<RequestKey, RequestError> {
        let key = RequestKey {
            service_id,
            server,
            transfer_id,
        };
        if self.pending.contains_key(&key) {
            return Err(RequestError::DuplicateSession);
        }
        self.pending
            .insert(
                key,
                PendingRequest {
                    issued,
                    response: None,
                },
            )
            .map_err(|_| RequestError::TableFull)?;
        Ok(key)
    }

    /// Forget a request, e.g. because it never made it onto the bus.
    pub fn cancel(&mut self, key: &RequestKey) -> bool {
        self.pending.remove(key).is_some()
    }

    /// True while no response has arrived for `key`.
    pub fn is_pending(&self, key: &RequestKey) -> bool {
        matches!(self.pending.get(key), Some(entry) if entry.response.is_none())
    }

    /// Offer a received transfer. Only the first response to a request is kept.
    pub fn on_response(&mut self, transfer: &Transfer<C>) -> ResponseMatch {
        let metadata = &transfer.metadata;
        let server = match (metadata.transfer_kind, metadata.remote_node_id) {
            (TransferKind::Response, Some(server)) => server,
            _ => return ResponseMatch::Unmatched,
        };
        let key = RequestKey {
            service_id: metadata.port_id,
            server,
            transfer_id: metadata.transfer_id,
        };

        match self.pending.get_mut(&key) {
            Some(entry) if entry.response.is_none() => {
                let len = core::cmp::min(transfer.payload.len(), MAX_PAYLOAD_SIZE);
                // Length is clamped to capacity above
                entry.response = Vec::from_slice(&transfer.payload[..len]).ok();
                ResponseMatch::Dispatched(key)
            }
            _ => ResponseMatch::Unmatched,
        }
    }

    /// Hand out the response payload once, removing the entry.
    /// `Ok(None)` while still waiting.
    pub fn take(
        &mut self,
        key: &RequestKey,
    ) -> Result<Option<Vec<u8, MAX_PAYLOAD_SIZE>>, ResponseError> {
        let answered = match self.pending.get(key) {
            Some(entry) => entry.response.is_some(),
            None => return Err(ResponseError::Unknown),
        };
        if !answered {
            return Ok(None);
        }
        Ok(self.pending.remove(key).and_then(|entry| entry.response))
    }

    /// Drop requests still unanswered after `timeout`. Answered ones wait
    /// for the caller. Returns how many were dropped.
    pub fn expire(&mut self, now: Timestamp<C>, timeout: Generic<C::T>) -> usize {
        let mut stale: Vec<RequestKey, N> = Vec::new();
        for (key, entry) in self.pending.iter() {
            if entry.response.is_none() && time::expired::<C>(Some(timeout), now, Some(entry.issued))
            {
                // Can't overflow, both containers hold N entries
                let _ = stale.push(*key);
            }
        }
        for key in stale.iter() {
            self.pending.remove(key);
        }
        stale.len()
    }
}

impl<C: Clock, const N: usize> Default for PendingRequests<C, N> {
    fn default() -> Self {
        Self::new()
    }
}
