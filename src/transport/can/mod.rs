//! Cyphal/CAN transport implementation.
//!
//! Classic CAN only: 8-byte frames, 29-bit extended identifiers, 7 bytes of
//! payload per frame plus the tail byte.

use arrayvec::ArrayVec;
use embedded_hal::can::{ExtendedId, Frame, Id};
use embedded_time::{Clock, Instant};
use num_traits::Zero;
use streaming_iterator::StreamingIterator;

use super::{SessionMetadata, Transport};
use crate::crc16::{self, Crc16};
use crate::internal::InternalRxFrame;
use crate::session::SessionError;
use crate::time::Timestamp;
use crate::transfer::{Transfer, TransferKind};
use crate::types::*;
use crate::{RxError, TxError};

mod bitfields;
#[cfg(test)]
pub(crate) mod fake_payload;

pub use bitfields::*;

pub const MTU_SIZE: usize = 8;
/// Payload bytes per frame once the tail byte is accounted for.
pub const CHUNK_SIZE: usize = MTU_SIZE - 1;
/// Trailing transfer CRC on multi-frame transfers.
pub const CRC_SIZE: usize = 2;

/// Unit struct for declaring transport type
#[derive(Copy, Clone, Debug)]
pub struct Can;

/// Number of frames needed for `payload_len` bytes of transfer payload.
pub const fn frame_count(payload_len: usize) -> usize {
    if payload_len <= CHUNK_SIZE {
        1
    } else {
        (payload_len + CRC_SIZE + CHUNK_SIZE - 1) / CHUNK_SIZE
    }
}

impl<C: Clock> Transport<C> for Can {
    type Frame = CanFrame<C>;
    type FrameIter<'a> = CanIter<'a, C> where C: 'a;

    const MTU_SIZE: usize = MTU_SIZE;

    fn frame_count(payload_len: usize) -> usize {
        frame_count(payload_len)
    }

    fn rx_process_frame<'a>(
        node_id: &Option<NodeId>,
        frame: &'a Self::Frame,
    ) -> Result<Option<InternalRxFrame<'a, C>>, RxError> {
        // Frames cannot be empty. They must at least have a tail byte.
        let tail_byte = frame.tail_byte()?;

        // Protocol version states SOT must have toggle set
        if tail_byte.start_of_transfer() && !tail_byte.toggle() {
            return Err(RxError::TransferStartMissingToggle);
        }
        // Non-last frames must use the MTU fully
        if !tail_byte.end_of_transfer() && frame.payload.len() < MTU_SIZE {
            return Err(RxError::NonLastUnderUtilization);
        }

        let header = CanIdHeader::decode(frame.id.as_raw())?;

        let destination_node_id = match (header.transfer_kind, header.destination) {
            (TransferKind::Message, _) => {
                // Anonymous transfers can only be single-frame transfers
                if header.source.is_none() && !tail_byte.is_single_frame() {
                    return Err(RxError::AnonNotSingleFrame);
                }
                None
            }
            // Ignore frames not meant for us
            (_, Some(destination)) if *node_id != Some(destination) => return Ok(None),
            (_, Some(destination)) => Some(destination),
            (_, None) => return Err(RxError::InvalidCanId),
        };

        Ok(Some(InternalRxFrame {
            timestamp: frame.timestamp,
            priority: header.priority,
            transfer_kind: header.transfer_kind,
            port_id: header.port_id,
            source_node_id: header.source,
            destination_node_id,
            transfer_id: tail_byte.transfer_id(),
            start_of_transfer: tail_byte.start_of_transfer(),
            end_of_transfer: tail_byte.end_of_transfer(),
            toggle: tail_byte.toggle(),
            payload: frame.chunk(),
        }))
    }

    fn transmit<'a>(
        transfer: &'a Transfer<'a, C>,
        node_id: Option<NodeId>,
    ) -> Result<Self::FrameIter<'a>, TxError> {
        CanIter::new(transfer, node_id)
    }
}

/// Iterator type to transmit a transfer.
///
/// By splitting transmission into an iterator I can easily `.collect()` it for a handy
/// array, store it in another object, or just bulk transfer it all at once, without
/// having to commit to any proper memory model.
///
/// Multi-frame transfers are emitted as if the big-endian CRC were appended to the
/// payload, so the CRC may straddle the last two frames.
#[derive(Debug)]
pub struct CanIter<'a, C: Clock> {
    transfer: &'a Transfer<'a, C>,
    frame_id: ExtendedId,
    crc: [u8; CRC_SIZE],
    /// Payload length plus CRC, if any.
    total: usize,
    offset: usize,
    toggle: bool,
    is_start: bool,
    can_frame: Option<CanFrame<C>>,
}

impl<'a, C: Clock> CanIter<'a, C> {
    pub fn new(transfer: &'a Transfer<'a, C>, node_id: Option<NodeId>) -> Result<Self, TxError> {
        let metadata = &transfer.metadata;
        let payload = transfer.payload;

        let raw_id = match metadata.transfer_kind {
            TransferKind::Message => {
                if node_id.is_none() && payload.len() > CHUNK_SIZE {
                    return Err(TxError::AnonNotSingleFrame);
                }

                // Anonymous sources get a pseudo-ID derived from the payload, so
                // two anonymous nodes publishing different data don't collide.
                let pseudo_id = crc16::compute(payload) & NODE_ID_MAX;
                CanMessageId::new(metadata.priority, metadata.port_id, node_id, pseudo_id)?
            }
            TransferKind::Request | TransferKind::Response => {
                let source = node_id.ok_or(TxError::ServiceNoSourceID)?;
                let destination = metadata
                    .remote_node_id
                    .ok_or(TxError::ServiceNoDestinationID)?;
                CanServiceId::new(
                    metadata.priority,
                    metadata.transfer_kind == TransferKind::Request,
                    metadata.port_id,
                    destination,
                    source,
                )?
            }
        };
        let frame_id = ExtendedId::new(raw_id).ok_or(TxError::InvalidPortId)?;

        let (crc, total) = if payload.len() <= CHUNK_SIZE {
            ([0; CRC_SIZE], payload.len())
        } else {
            (crc16::compute(payload).to_be_bytes(), payload.len() + CRC_SIZE)
        };

        Ok(Self {
            transfer,
            frame_id,
            crc,
            total,
            offset: 0,
            toggle: true,
            is_start: true,
            can_frame: None,
        })
    }

    fn byte_at(&self, index: usize) -> u8 {
        let payload = self.transfer.payload;
        match payload.get(index) {
            Some(byte) => *byte,
            None => self.crc[index - payload.len()],
        }
    }
}

impl<'a, C: Clock> StreamingIterator for CanIter<'a, C> {
    type Item = CanFrame<C>;

    fn advance(&mut self) {
        // An empty payload still produces one frame carrying only the tail byte.
        if self.offset >= self.total && !self.is_start {
            self.can_frame = None;
            return;
        }

        let len = core::cmp::min(self.total - self.offset, CHUNK_SIZE);
        let is_end = self.offset + len == self.total;

        let mut chunk = [0u8; CHUNK_SIZE];
        for (slot, index) in chunk.iter_mut().zip(self.offset..self.offset + len) {
            *slot = self.byte_at(index);
        }
        let tail = TailByte::new(
            self.is_start,
            is_end,
            self.toggle,
            self.transfer.metadata.transfer_id,
        );
        self.can_frame = CanFrame::from_chunk(
            self.transfer.metadata.timestamp,
            self.frame_id.as_raw(),
            &chunk[..len],
            tail,
        );

        self.offset += len;
        self.toggle = !self.toggle;
        self.is_start = false;
    }

    fn get(&self) -> Option<&Self::Item> {
        self.can_frame.as_ref()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = if self.is_start {
            frame_count(self.transfer.payload.len())
        } else {
            (self.total - self.offset + CHUNK_SIZE - 1) / CHUNK_SIZE
        };
        (remaining, Some(remaining))
    }
}

/// Extended CAN frame (the only one supported by Cyphal/CAN)
#[derive(Debug)]
pub struct CanFrame<C: Clock> {
    pub timestamp: Timestamp<C>,
    pub id: ExtendedId,
    /// Frame data, tail byte included.
    pub payload: ArrayVec<[u8; MTU_SIZE]>,
}

impl<C: Clock> Clone for CanFrame<C> {
    fn clone(&self) -> Self {
        Self {
            timestamp: self.timestamp,
            id: self.id,
            payload: self.payload.clone(),
        }
    }
}

impl<C: Clock> CanFrame<C> {
    /// Build a frame from a raw 29-bit identifier and up to 8 data bytes.
    pub fn new(timestamp: Timestamp<C>, id: u32, data: &[u8]) -> Option<Self> {
        let id = ExtendedId::new(id)?;
        let mut payload = ArrayVec::new();
        payload.try_extend_from_slice(data).ok()?;
        Some(Self {
            timestamp,
            id,
            payload,
        })
    }

    /// Build a frame from up to 7 payload bytes and a tail byte.
    pub fn from_chunk(
        timestamp: Timestamp<C>,
        id: u32,
        chunk: &[u8],
        tail: TailByte,
    ) -> Option<Self> {
        if chunk.len() > CHUNK_SIZE {
            return None;
        }
        let mut frame = Self::new(timestamp, id, chunk)?;
        frame.payload.push(tail.0);
        Some(frame)
    }

    pub fn tail_byte(&self) -> Result<TailByte, RxError> {
        self.payload
            .last()
            .map(|byte| TailByte(*byte))
            .ok_or(RxError::FrameEmpty)
    }

    /// Frame data without the tail byte.
    pub fn chunk(&self) -> &[u8] {
        match self.payload.split_last() {
            Some((_, chunk)) => chunk,
            None => &[],
        }
    }

    /// Convert into a frame type of a CAN peripheral driver.
    pub fn to_hal<F: Frame>(&self) -> Option<F> {
        F::new(self.id, &self.payload)
    }

    /// Convert from a driver frame. Standard-ID and remote frames have no
    /// meaning in Cyphal/CAN and yield `None`.
    pub fn from_hal<F: Frame>(timestamp: Timestamp<C>, frame: &F) -> Option<Self> {
        match frame.id() {
            Id::Extended(id) if frame.is_data_frame() => {
                Self::new(timestamp, id.as_raw(), frame.data())
            }
            _ => None,
        }
    }
}

/// Lets drivers written against `embedded-hal` construct frames directly.
/// Frames built this way carry a zero timestamp; stamp them before handing
/// them to the node if reassembly timeouts matter.
impl<C: Clock> Frame for CanFrame<C>
where
    C::T: Zero,
{
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        let id = match id.into() {
            Id::Extended(id) => id,
            Id::Standard(_) => return None,
        };
        let mut payload = ArrayVec::new();
        payload.try_extend_from_slice(data).ok()?;
        Some(CanFrame {
            timestamp: Instant::new(C::T::zero()),
            id,
            payload,
        })
    }

    fn new_remote(_id: impl Into<Id>, _dlc: usize) -> Option<Self> {
        None
    }

    fn is_extended(&self) -> bool {
        true
    }

    fn is_remote_frame(&self) -> bool {
        false
    }

    fn id(&self) -> Id {
        Id::Extended(self.id)
    }

    fn dlc(&self) -> usize {
        self.payload.len()
    }

    fn data(&self) -> &[u8] {
        &self.payload
    }
}

/// Keeps track of toggle bit and CRC during frame processing.
#[derive(Debug)]
pub struct CanMetadata {
    /// Toggle value the next frame must carry.
    toggle: bool,
    crc: Crc16,
}

impl<C: Clock> SessionMetadata<C> for CanMetadata {
    const TRAILER_SIZE: usize = CRC_SIZE;

    fn new() -> Self {
        Self {
            toggle: true,
            crc: Crc16::init(),
        }
    }

    fn update(&mut self, frame: &InternalRxFrame<C>) -> Result<(), SessionError> {
        // Single frame transfers don't need to be validated
        if frame.is_single_frame() {
            return Ok(());
        }

        if frame.toggle != self.toggle {
            return Err(SessionError::ToggleMismatch);
        }

        // NOTE: payload is evaluated even if data is truncated
        self.crc.digest(frame.payload);
        self.toggle = !self.toggle;
        Ok(())
    }

    fn is_valid(&self, frame: &InternalRxFrame<C>) -> bool {
        frame.is_single_frame() || self.crc.get_crc() == 0x0000
    }
}
