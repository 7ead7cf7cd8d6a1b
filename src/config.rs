//! Runtime knobs for a [`crate::Node`].

use embedded_time::duration::Generic;
use embedded_time::Clock;

use crate::{Priority, MAX_PAYLOAD_SIZE};

#[derive(Debug)]
pub struct NodeConfig<C: Clock> {
    /// Largest serialized payload accepted for transmission. Clamped to
    /// [`MAX_PAYLOAD_SIZE`].
    pub max_payload_size: usize,
    /// Priority used by [`crate::Node::publish`] and
    /// [`crate::Node::request`] when the caller passes `None`.
    pub default_priority: Priority,
    /// Drop requests that got no response within this time. `None` keeps
    /// them until the response arrives or the handle is redeemed.
    pub request_timeout: Option<Generic<C::T>>,
    /// Reassembly timeout for subscriptions made through the node.
    /// `None` never times out.
    pub transfer_timeout: Option<Generic<C::T>>,
}

impl<C: Clock> NodeConfig<C> {
    pub(crate) fn payload_limit(&self) -> usize {
        core::cmp::min(self.max_payload_size, MAX_PAYLOAD_SIZE)
    }
}

impl<C: Clock> Default for NodeConfig<C> {
    fn default() -> Self {
        Self {
            max_payload_size: MAX_PAYLOAD_SIZE,
            default_priority: Priority::Nominal,
            request_timeout: None,
            transfer_timeout: None,
        }
    }
}
