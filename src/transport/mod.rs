//! Transport-specific functionality.
//!
//! A transport needs 2 implementations:
//! - SessionMetadata trait
//! - Transport trait
//!
//! Take a look at the CAN implementation for an example.

pub mod can;

use embedded_time::Clock;
use streaming_iterator::StreamingIterator;

use crate::internal::InternalRxFrame;
use crate::session::SessionError;
use crate::transfer::Transfer;
use crate::NodeId;
use crate::{RxError, TxError};

/// Describes any transport-specific metadata required to construct a session.
///
/// In the example of CAN, you need to keep track of the toggle bit,
/// as well as the CRC for multi-frame transfers. This trait lets us pull that
/// code out of the generic processing and into more modular implementations.
pub trait SessionMetadata<C: Clock> {
    /// Create a fresh instance of session metadata.
    fn new() -> Self;

    /// Update metadata with an incoming frame's information.
    fn update(&mut self, frame: &InternalRxFrame<C>) -> Result<(), SessionError>;

    /// Final check to see if transfer was successful.
    fn is_valid(&self, frame: &InternalRxFrame<C>) -> bool;

    /// Bytes of transport overhead at the end of a multi-frame payload.
    const TRAILER_SIZE: usize;
}

/// This trait is to be implemented on a unit struct, in order to be specified
/// for different transport types.
pub trait Transport<C: Clock> {
    type Frame: Clone;
    type FrameIter<'a>: StreamingIterator<Item = Self::Frame>
    where
        C: 'a;

    const MTU_SIZE: usize;

    /// Number of frames `transmit` will yield for a payload of this length.
    fn frame_count(payload_len: usize) -> usize;

    /// Process a frame, returning the internal transport-independant representation,
    /// or errors if invalid. `Ok(None)` means the frame is addressed to someone else.
    fn rx_process_frame<'a>(
        node_id: &Option<NodeId>,
        frame: &'a Self::Frame,
    ) -> Result<Option<InternalRxFrame<'a, C>>, RxError>;

    /// Prepare an iterator of frames to send out on the wire.
    fn transmit<'a>(
        transfer: &'a Transfer<'a, C>,
        node_id: Option<NodeId>,
    ) -> Result<Self::FrameIter<'a>, TxError>;
}
