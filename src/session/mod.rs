//! Session management.
//!
//! Cyphal defines a session as an identifier of a collection of transfers
//! between a given set of agents. A session manager owns the subscriptions
//! and the reassembly state of every in-progress transfer. A library user
//! can implement their own manager to fit a different memory model using
//! the SessionManager trait; [`StaticSessionManager`] is the fixed-capacity
//! one shipped here.

use embedded_time::Clock;

use crate::internal::InternalRxFrame;
use crate::time::Timestamp;
use crate::transfer::{Transfer, TransferKind};
use crate::types::*;
use crate::Subscription;

mod static_pool;

pub use static_pool::StaticSessionManager;

/// Reasons a frame was dropped during reassembly.
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionError {
    /// No free reassembly slot for a new source.
    #[error("no free session slot")]
    OutOfSpace,
    /// Continuation frame without a transfer in progress.
    #[error("continuation frame without a start frame")]
    NewSessionNoStart,
    /// Continuation frame belongs to a different transfer than the one in progress.
    #[error("transfer-ID does not match the transfer in progress")]
    InvalidTransferId,
    /// Frame arrived out of order or was duplicated.
    #[error("toggle bit mismatch")]
    ToggleMismatch,
    /// Transfer completed but the CRC residue was not zero.
    #[error("transfer CRC mismatch")]
    CrcMismatch,
    /// Transfer took longer than the subscription timeout.
    #[error("transfer timed out")]
    Timeout,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SubscriptionError {
    #[error("no free subscription slot")]
    OutOfSpace,
    #[error("subscription already exists")]
    SubscriptionExists,
    #[error("subscription does not exist")]
    SubscriptionDoesNotExist,
    /// Extent is larger than the manager's per-session buffer.
    #[error("extent exceeds session buffer")]
    ExtentTooLarge,
}

/// Trait to declare a session manager. This is responsible for managing
/// subscriptions and ongoing sessions.
///
/// The intent here is to provide an interface to easily define
/// what management strategy you want to implement. This allows you to
/// select different models based on e.g. your memory allocation strategy,
/// or if a model provided by this crate does not suffice, you can implement
/// your own.
pub trait SessionManager<C: Clock> {
    /// Process incoming frame. Returns the transfer once its last frame arrives.
    fn ingest<'a>(
        &'a mut self,
        frame: InternalRxFrame<'a, C>,
    ) -> Result<Option<Transfer<'a, C>>, SessionError>;

    /// Housekeeping function called to clean up timed-out sessions.
    /// Returns how many partial transfers were discarded.
    fn update_sessions(&mut self, timestamp: Timestamp<C>) -> usize;

    /// Add a subscription. Frames for ports without one are ignored.
    fn subscribe(&mut self, subscription: Subscription<C>) -> Result<(), SubscriptionError>;

    /// Remove a subscription along with its in-progress sessions.
    fn unsubscribe(
        &mut self,
        transfer_kind: TransferKind,
        port_id: PortId,
    ) -> Result<(), SubscriptionError>;

    fn is_subscribed(&self, transfer_kind: TransferKind, port_id: PortId) -> bool;

    /// Helper function to match frames to the correct subscription.
    ///
    /// It's not necessary to use this in your implementation, you may have
    /// a more efficient way to check.
    fn matches_sub(subscription: &Subscription<C>, frame: &InternalRxFrame<C>) -> bool {
        // Order is chosen to short circuit the most common inconsistencies.
        frame.port_id == subscription.port_id && frame.transfer_kind == subscription.transfer_kind
    }
}
