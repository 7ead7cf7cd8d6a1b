//! Hand-written bindings for the standard DSDL types this crate uses.
//!
//! The module tree mirrors the DSDL namespace: `uavcan.node.Heartbeat.1.0`
//! lives at [`uavcan::node::heartbeat_1_0`].

pub mod uavcan;
