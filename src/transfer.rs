//! This module describes the transport-agnostic concept of a transfer,
//! which boils down to some metadata to uniquely identify it, as well
//! as a serialized buffer of data, which encodes DSDL-based data.

use embedded_time::Clock;

use crate::data_type::{DeserializeError, Deserialize};
use crate::internal::InternalRxFrame;
use crate::time::Timestamp;
use crate::types::*;
use crate::Priority;

/// Protocol-level transfer types.
#[derive(Copy, Clone, Debug, Ord, PartialOrd, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferKind {
    Message,
    Response,
    Request,
}

/// Everything that identifies a transfer apart from its payload.
#[derive(Debug)]
pub struct TransferMetadata<C: Clock> {
    /// Reception time of the first frame, or creation time for outgoing transfers.
    pub timestamp: Timestamp<C>,
    pub priority: Priority,
    pub transfer_kind: TransferKind,
    pub port_id: PortId,
    /// Source for received transfers, destination for outgoing services.
    /// `None` for broadcast messages and anonymous sources.
    pub remote_node_id: Option<NodeId>,
    pub transfer_id: TransferId,
}

impl<C: Clock> Clone for TransferMetadata<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C: Clock> Copy for TransferMetadata<C> {}

/// Application representation of a Cyphal transfer.
///
/// This will be passed out on successful reception of full transfers,
/// as well as given to the transport to be split into frames.
#[derive(Debug)]
pub struct Transfer<'a, C: Clock> {
    pub metadata: TransferMetadata<C>,
    pub payload: &'a [u8],
}

// I don't want to impl convert::From because I need to pull in extra data
impl<'a, C: Clock> Transfer<'a, C> {
    pub fn from_frame(
        frame: InternalRxFrame<C>,
        timestamp: Timestamp<C>,
        payload: &'a [u8],
    ) -> Self {
        Self {
            metadata: TransferMetadata {
                timestamp,
                priority: frame.priority,
                transfer_kind: frame.transfer_kind,
                port_id: frame.port_id,
                remote_node_id: frame.source_node_id,
                transfer_id: frame.transfer_id,
            },
            payload,
        }
    }

    /// Deserialize the payload as `T`.
    pub fn decode<T: Deserialize>(&self) -> Result<T, DeserializeError> {
        T::deserialize(self.payload)
    }
}
