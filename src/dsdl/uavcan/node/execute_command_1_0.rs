//! `uavcan.node.ExecuteCommand.1.0`: ask a node to run a command.

use heapless::Vec;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive, ToPrimitive};

use crate::data_type::{
    Deserialize, DeserializeError, Reader, Serialize, SerializeError, ServiceRequest,
    ServiceResponse, Writer,
};
use crate::types::PortId;

pub const SERVICE_ID: PortId = 435;

/// Longest command parameter, in bytes.
pub const PARAMETER_CAPACITY: usize = 112;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    /// Standard commands count down from 65535; lower values are vendor-specific.
    pub command: u16,
    pub parameter: Vec<u8, PARAMETER_CAPACITY>,
}

impl Request {
    pub const COMMAND_RESTART: u16 = 65535;
    pub const COMMAND_POWER_OFF: u16 = 65534;
    pub const COMMAND_BEGIN_SOFTWARE_UPDATE: u16 = 65533;
    pub const COMMAND_FACTORY_RESET: u16 = 65532;
    pub const COMMAND_EMERGENCY_STOP: u16 = 65531;
    pub const COMMAND_STORE_PERSISTENT_STATES: u16 = 65530;

    pub const MAX_SERIALIZED_SIZE: usize = 3 + PARAMETER_CAPACITY;

    pub fn new(command: u16, parameter: &[u8]) -> Result<Self, SerializeError> {
        Ok(Self {
            command,
            parameter: Vec::from_slice(parameter).map_err(|_| SerializeError::ValueOutOfRange)?,
        })
    }
}

impl Serialize for Request {
    fn serialize(&self, buffer: &mut [u8]) -> Result<usize, SerializeError> {
        let mut writer = Writer::new(buffer);
        writer.u16(self.command)?;
        writer.u8(self.parameter.len() as u8)?;
        writer.bytes(&self.parameter)?;
        Ok(writer.finish())
    }
}

impl Deserialize for Request {
    fn deserialize(payload: &[u8]) -> Result<Self, DeserializeError> {
        let mut reader = Reader::new(payload);
        let command = reader.u16();
        let len = reader.u8() as usize;
        if len > PARAMETER_CAPACITY {
            return Err(DeserializeError::ArrayLength);
        }

        let mut parameter = [0u8; PARAMETER_CAPACITY];
        reader.bytes(&mut parameter[..len]);
        Ok(Self {
            command,
            parameter: Vec::from_slice(&parameter[..len])
                .map_err(|_| DeserializeError::ArrayLength)?,
        })
    }
}

impl ServiceRequest for Request {
    const SERVICE_ID: PortId = SERVICE_ID;
    const EXTENT: usize = Request::MAX_SERIALIZED_SIZE;
    type Response = Response;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    Success = 0,
    Failure = 1,
    NotAuthorized = 2,
    BadCommand = 3,
    BadParameter = 4,
    BadState = 5,
    InternalError = 6,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Response {
    pub status: Status,
}

impl Response {
    /// Status byte followed by 48 reserved bits.
    pub const SERIALIZED_SIZE: usize = 7;
}

impl Serialize for Response {
    fn serialize(&self, buffer: &mut [u8]) -> Result<usize, SerializeError> {
        let mut writer = Writer::new(buffer);
        writer.u8(self.status.to_u8().ok_or(SerializeError::ValueOutOfRange)?)?;
        writer.skip(Self::SERIALIZED_SIZE - 1)?;
        Ok(writer.finish())
    }
}

impl Deserialize for Response {
    fn deserialize(payload: &[u8]) -> Result<Self, DeserializeError> {
        let status = Reader::new(payload).u8();
        Ok(Self {
            status: Status::from_u8(status).ok_or(DeserializeError::InvalidValue)?,
        })
    }
}

impl ServiceResponse for Response {
    const EXTENT: usize = Response::SERIALIZED_SIZE;
}
