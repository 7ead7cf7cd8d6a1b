//! Frame representation shared between transports and session managers.

use embedded_time::Clock;

use crate::time::Timestamp;
use crate::transfer::TransferKind;
use crate::types::*;
use crate::Priority;

/// A received frame after the transport has decoded its identifier and tail
/// byte. Custom session managers consume these.
#[derive(Debug)]
pub struct InternalRxFrame<'a, C: Clock> {
    pub timestamp: Timestamp<C>,
    pub priority: Priority,
    pub transfer_kind: TransferKind,
    pub port_id: PortId,
    pub source_node_id: Option<NodeId>,
    pub destination_node_id: Option<NodeId>,
    pub transfer_id: TransferId,
    pub start_of_transfer: bool,
    pub end_of_transfer: bool,
    pub toggle: bool,
    /// Frame data with the tail byte stripped.
    pub payload: &'a [u8],
}

impl<'a, C: Clock> Clone for InternalRxFrame<'a, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, C: Clock> Copy for InternalRxFrame<'a, C> {}

impl<'a, C: Clock> InternalRxFrame<'a, C> {
    pub fn is_single_frame(&self) -> bool {
        self.start_of_transfer && self.end_of_transfer
    }
}
