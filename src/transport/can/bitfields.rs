//! # Cyphal/CAN bitfield primitives.
//!
//! These types describe the bit patterns of both the CAN ID and tail bytes.
//! As well as providing convenient constructor/accessor functions these types
//! are able to do some of the more basic checks that they are valid.

use bitfield::bitfield;
use num_traits::{FromPrimitive, ToPrimitive};

use crate::transfer::TransferKind;
use crate::types::*;
use crate::{Priority, RxError, TxError};

/// Largest 29-bit extended identifier.
pub const CAN_ID_MAX: u32 = 0x1FFF_FFFF;

bitfield! {
    /// Structure declaring bitfields of a message frame.
    #[derive(Copy, Clone, Debug)]
    pub struct CanMessageId(u32);
    /// Priority level.
    pub u8, priority, set_priority: 28, 26;
    /// Is this a service?
    pub bool, is_svc, set_svc: 25;
    /// Is this an anonymous message (i.e. no source ID)?
    pub bool, is_anon, set_anon: 24;
    /// Reserved, must be 0.
    pub bool, rsvd23, set_rsvd23: 23;
    /// Reserved, transmitted as 1 and ignored on receive.
    pub bool, rsvd22, set_rsvd22: 22;
    /// Reserved, transmitted as 1 and ignored on receive.
    pub bool, rsvd21, set_rsvd21: 21;
    /// Port ID of the message being sent.
    pub PortId, subject_id, set_subject_id: 20, 8;
    /// Reserved, must be 0.
    pub bool, rsvd7, set_rsvd7: 7;
    /// Node ID of the message's source.
    pub NodeId, source_id, set_source_id: 6, 0;
}

impl CanMessageId {
    /// Build a raw message identifier. An anonymous message (no source)
    /// carries `pseudo_id` in the source field instead.
    pub fn new(
        priority: Priority,
        subject_id: PortId,
        source_id: Option<NodeId>,
        pseudo_id: NodeId,
    ) -> Result<u32, TxError> {
        if subject_id > SUBJECT_ID_MAX {
            return Err(TxError::InvalidPortId);
        }
        let is_anon = source_id.is_none();
        let source_id = source_id.unwrap_or(pseudo_id & NODE_ID_MAX);
        if source_id > NODE_ID_MAX {
            return Err(TxError::InvalidNodeId);
        }

        let mut id = CanMessageId(0);
        id.set_priority(priority.to_u8().ok_or(TxError::InvalidPortId)?);
        id.set_svc(false);
        id.set_anon(is_anon);
        id.set_rsvd23(false);
        id.set_rsvd22(true);
        id.set_rsvd21(true);
        id.set_subject_id(subject_id);
        id.set_rsvd7(false);
        id.set_source_id(source_id);
        Ok(id.0)
    }

    /// Is this a valid message ID?
    pub fn valid(&self) -> bool {
        !self.is_svc() && !self.rsvd23() && !self.rsvd7()
    }
}

bitfield! {
    /// Structure declaring bitfields of a service frame.
    #[derive(Copy, Clone, Debug)]
    pub struct CanServiceId(u32);
    /// Priority level.
    pub u8, priority, set_priority: 28, 26;
    /// Is this a service message?
    pub bool, is_svc, set_svc: 25;
    /// Is this a request? (or a response?)
    pub bool, is_req, set_req: 24;
    /// Reserved bit, must be set to 0
    pub bool, rsvd23, set_rsvd23: 23;
    /// Service port ID
    pub PortId, service_id, set_service_id: 22, 14;
    /// Destination node ID
    pub NodeId, destination_id, set_destination_id: 13, 7;
    /// Source node ID
    pub NodeId, source_id, set_source_id: 6, 0;
}

impl CanServiceId {
    pub fn new(
        priority: Priority,
        is_request: bool,
        service_id: PortId,
        destination: NodeId,
        source: NodeId,
    ) -> Result<u32, TxError> {
        if service_id > SERVICE_ID_MAX {
            return Err(TxError::InvalidPortId);
        }
        if destination > NODE_ID_MAX || source > NODE_ID_MAX || destination == source {
            return Err(TxError::InvalidNodeId);
        }

        let mut id = CanServiceId(0);
        id.set_priority(priority.to_u8().ok_or(TxError::InvalidPortId)?);
        id.set_svc(true);
        id.set_req(is_request);
        id.set_rsvd23(false);
        id.set_service_id(service_id);
        id.set_destination_id(destination);
        id.set_source_id(source);
        Ok(id.0)
    }

    /// Is this a valid service ID?
    pub fn valid(&self) -> bool {
        self.is_svc() && !self.rsvd23() && self.source_id() != self.destination_id()
    }
}

bitfield! {
    /// Tail byte of frame data. Received at end of every frame.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct TailByte(u8);
    /// Is this the start of the transfer?
    pub bool, start_of_transfer, set_start_of_transfer: 7;
    /// Is this the end of the transfer?
    pub bool, end_of_transfer, set_end_of_transfer: 6;
    /// Toggle bit to ensure messages are received in order.
    pub bool, toggle, set_toggle: 5;
    /// Transfer ID to ensure the correct messages are being received.
    pub TransferId, transfer_id, set_transfer_id: 4, 0;
}

impl TailByte {
    pub fn new(is_start: bool, is_end: bool, toggle: bool, transfer_id: TransferId) -> Self {
        let mut byte = TailByte(0);
        byte.set_start_of_transfer(is_start);
        byte.set_end_of_transfer(is_end);
        byte.set_toggle(toggle);
        byte.set_transfer_id(transfer_id & TRANSFER_ID_MAX);
        byte
    }

    pub fn is_single_frame(&self) -> bool {
        self.start_of_transfer() && self.end_of_transfer()
    }
}

/// Decoded view of a 29-bit Cyphal/CAN identifier.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CanIdHeader {
    pub priority: Priority,
    pub transfer_kind: TransferKind,
    /// Subject-ID for messages, service-ID for requests and responses.
    pub port_id: PortId,
    /// `None` for anonymous messages.
    pub source: Option<NodeId>,
    /// `None` for messages.
    pub destination: Option<NodeId>,
}

impl CanIdHeader {
    /// Pack the header into a raw identifier. Anonymous messages get a
    /// source field of 0; use [`CanMessageId::new`] to pick a pseudo-ID.
    pub fn encode(&self) -> Result<u32, TxError> {
        match self.transfer_kind {
            TransferKind::Message => {
                if self.destination.is_some() {
                    return Err(TxError::InvalidNodeId);
                }
                CanMessageId::new(self.priority, self.port_id, self.source, 0)
            }
            TransferKind::Request | TransferKind::Response => CanServiceId::new(
                self.priority,
                self.transfer_kind == TransferKind::Request,
                self.port_id,
                self.destination.ok_or(TxError::ServiceNoDestinationID)?,
                self.source.ok_or(TxError::ServiceNoSourceID)?,
            ),
        }
    }

    /// Unpack a raw identifier, rejecting reserved-bit violations.
    pub fn decode(raw: u32) -> Result<Self, RxError> {
        if raw > CAN_ID_MAX {
            return Err(RxError::InvalidCanId);
        }
        if CanServiceId(raw).is_svc() {
            let id = CanServiceId(raw);
            if !id.valid() {
                return Err(RxError::InvalidCanId);
            }
            Ok(Self {
                priority: Priority::from_u8(id.priority()).ok_or(RxError::InvalidCanId)?,
                transfer_kind: if id.is_req() {
                    TransferKind::Request
                } else {
                    TransferKind::Response
                },
                port_id: id.service_id(),
                source: Some(id.source_id()),
                destination: Some(id.destination_id()),
            })
        } else {
            let id = CanMessageId(raw);
            if !id.valid() {
                return Err(RxError::InvalidCanId);
            }
            Ok(Self {
                priority: Priority::from_u8(id.priority()).ok_or(RxError::InvalidCanId)?,
                transfer_kind: TransferKind::Message,
                port_id: id.subject_id(),
                source: if id.is_anon() {
                    None
                } else {
                    Some(id.source_id())
                },
                destination: None,
            })
        }
    }
}
