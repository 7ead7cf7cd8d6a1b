//! Identifier types shared across the stack.

pub type NodeId = u16;
pub type PortId = u16;
pub type TransferId = u8;

pub use crate::time::Timestamp;

/// Highest node-ID representable on Cyphal/CAN.
pub const NODE_ID_MAX: NodeId = 127;
/// Highest subject-ID (13 bits).
pub const SUBJECT_ID_MAX: PortId = 8191;
/// Highest service-ID (9 bits).
pub const SERVICE_ID_MAX: PortId = 511;
/// Transfer-IDs are 5 bits wide and wrap after this value.
pub const TRANSFER_ID_MAX: TransferId = 31;

/// Transfer-ID that follows `transfer_id`, wrapping back to 0 after 31.
pub const fn next_transfer_id(transfer_id: TransferId) -> TransferId {
    transfer_id.wrapping_add(1) & TRANSFER_ID_MAX
}
