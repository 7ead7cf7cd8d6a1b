//! `uavcan.node` namespace.

pub mod execute_command_1_0;
pub mod heartbeat_1_0;
