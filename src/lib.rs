//! Cyphal/CAN transfer engine.
//!
//! This crate turns serialized transfers into classic CAN frames and back.
//! It covers the 29-bit identifier layout, the tail byte, multi-frame
//! fragmentation with CRC-16, per-source reassembly, outgoing transfer-ID
//! bookkeeping, and matching of service responses to outstanding requests.
//!
//! The [`Node`] type ties those pieces together. Frames go in through
//! [`Node::receive_frame`] and come out through [`Node::pop_frame`] (or
//! [`Node::flush`] straight onto an `embedded-hal` CAN peripheral). Nothing
//! here allocates, so the crate runs in `no_std` environments; the `std`
//! feature only adds a wall-clock [`time::StdClock`].

#![cfg_attr(not(any(test, feature = "std")), no_std)]

use embedded_time::duration::Generic;
use embedded_time::Clock;
use num_derive::{FromPrimitive, ToPrimitive};

pub use streaming_iterator::StreamingIterator;

pub mod config;
pub mod crc16;
pub mod data_type;
pub mod diagnostics;
pub mod dsdl;
pub mod internal;
pub mod node;
pub mod request;
pub mod session;
pub mod time;
pub mod transfer;
pub mod transport;
pub mod tx;
pub mod types;

pub use config::NodeConfig;
pub use node::Node;
pub use transfer::{Transfer, TransferKind, TransferMetadata};
pub use types::*;

use crate::data_type::SerializeError;
use crate::session::{SessionError, SubscriptionError};

/// Largest serialized payload a single transfer may carry, in bytes.
pub const MAX_PAYLOAD_SIZE: usize = 128;

/// Protocol errors possible from receiving incoming frames.
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxError {
    /// Frame carried no bytes, not even a tail byte.
    #[error("frame is empty")]
    FrameEmpty,
    /// Start-of-transfer frame with the toggle bit cleared.
    #[error("start of transfer without toggle bit set")]
    TransferStartMissingToggle,
    /// Only the last frame of a transfer may use less than the full MTU.
    #[error("non-last frame does not fill the MTU")]
    NonLastUnderUtilization,
    /// Reserved identifier bits are set, or source equals destination.
    #[error("invalid CAN identifier")]
    InvalidCanId,
    /// Anonymous transfers must fit in a single frame.
    #[error("anonymous transfer spans multiple frames")]
    AnonNotSingleFrame,
    /// Frame was well-formed but reassembly rejected it.
    #[error("session error: {0}")]
    SessionError(#[from] SessionError),
}

/// Errors raised while preparing a transfer for transmission.
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxError {
    /// Serialized payload exceeds the configured maximum.
    #[error("payload too large")]
    PayloadTooLarge,
    /// Not enough room in the transmit queue for every frame of the transfer.
    #[error("transmit queue full")]
    QueueFull,
    /// No free slot to track another transfer-ID counter.
    #[error("transfer-ID table full")]
    TransferIdTableFull,
    /// No free slot to track another outstanding request.
    #[error("pending request table full")]
    RequestTableFull,
    /// A request with the same service, server, and transfer-ID is still outstanding.
    #[error("request session already pending")]
    DuplicateSession,
    /// Anonymous nodes can only emit single-frame messages.
    #[error("anonymous transfer does not fit in a single frame")]
    AnonNotSingleFrame,
    /// Service transfers need a local node-ID.
    #[error("service transfer without source node-ID")]
    ServiceNoSourceID,
    /// Service transfers need a remote node-ID.
    #[error("service transfer without destination node-ID")]
    ServiceNoDestinationID,
    /// Subject or service ID outside the range the identifier can carry.
    #[error("port ID out of range")]
    InvalidPortId,
    /// Node-ID outside 0..=127, or a service addressed to ourselves.
    #[error("node ID out of range")]
    InvalidNodeId,
    /// Only received requests can be answered.
    #[error("transfer is not a service request")]
    NotARequest,
    /// Clock could not produce a timestamp.
    #[error("clock unavailable")]
    Clock,
    /// Could not install the subscription needed to collect a response.
    #[error("subscription error: {0}")]
    Subscription(#[from] SubscriptionError),
    /// Value could not be serialized.
    #[error("serialization error: {0}")]
    Serialize(SerializeError),
}

impl From<SerializeError> for TxError {
    fn from(err: SerializeError) -> Self {
        match err {
            SerializeError::BufferTooSmall => TxError::PayloadTooLarge,
            other => TxError::Serialize(other),
        }
    }
}

/// Transfer priority. Lower numeric values win arbitration.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, FromPrimitive, ToPrimitive,
)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Priority {
    Exceptional = 0,
    Immediate = 1,
    Fast = 2,
    High = 3,
    #[default]
    Nominal = 4,
    Low = 5,
    Slow = 6,
    Optional = 7,
}

/// Simple subscription type to describe what transfers a session manager
/// should reassemble.
#[derive(Debug)]
pub struct Subscription<C: Clock> {
    pub transfer_kind: TransferKind,
    pub port_id: PortId,
    /// Bytes of payload kept per transfer. Anything past this is dropped.
    pub extent: usize,
    /// Maximum time between the first and last frame of a transfer.
    /// `None` lets a partial transfer wait forever.
    pub timeout: Option<Generic<C::T>>,
}

impl<C: Clock> Subscription<C> {
    pub fn new(
        transfer_kind: TransferKind,
        port_id: PortId,
        extent: usize,
        timeout: Option<Generic<C::T>>,
    ) -> Self {
        Self {
            transfer_kind,
            port_id,
            extent,
            timeout,
        }
    }
}

impl<C: Clock> Clone for Subscription<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C: Clock> Copy for Subscription<C> {}
