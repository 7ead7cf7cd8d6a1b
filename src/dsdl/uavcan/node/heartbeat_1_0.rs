//! `uavcan.node.Heartbeat.1.0`, published by every node at least once per second.

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive, ToPrimitive};

use crate::data_type::{
    Deserialize, DeserializeError, Message, Reader, Serialize, SerializeError, Writer,
};
use crate::types::PortId;

#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Health {
    Nominal = 0,
    Advisory = 1,
    Caution = 2,
    Warning = 3,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    Operational = 0,
    Initialization = 1,
    Maintenance = 2,
    SoftwareUpdate = 3,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Heartbeat {
    /// Seconds since the node started.
    pub uptime: u32,
    pub health: Health,
    pub mode: Mode,
    pub vendor_specific_status_code: u8,
}

impl Heartbeat {
    pub const SERIALIZED_SIZE: usize = 7;
}

impl Serialize for Heartbeat {
    fn serialize(&self, buffer: &mut [u8]) -> Result<usize, SerializeError> {
        let mut writer = Writer::new(buffer);
        writer.u32(self.uptime)?;
        writer.u8(self.health.to_u8().ok_or(SerializeError::ValueOutOfRange)?)?;
        writer.u8(self.mode.to_u8().ok_or(SerializeError::ValueOutOfRange)?)?;
        writer.u8(self.vendor_specific_status_code)?;
        Ok(writer.finish())
    }
}

impl Deserialize for Heartbeat {
    fn deserialize(payload: &[u8]) -> Result<Self, DeserializeError> {
        let mut reader = Reader::new(payload);
        let uptime = reader.u32();
        // health is 2 bits, mode is 3 bits; the rest of each byte is padding
        let health = Health::from_u8(reader.u8() & 0b11).ok_or(DeserializeError::InvalidValue)?;
        let mode = Mode::from_u8(reader.u8() & 0b111).ok_or(DeserializeError::InvalidValue)?;
        Ok(Self {
            uptime,
            health,
            mode,
            vendor_specific_status_code: reader.u8(),
        })
    }
}

impl Message for Heartbeat {
    const SUBJECT_ID: PortId = 7509;
    const EXTENT: usize = 12;
}
