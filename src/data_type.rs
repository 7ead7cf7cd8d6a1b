//! Serialization traits for DSDL data types.
//!
//! Types are serialized little-endian, byte-aligned, into a caller-provided
//! buffer. Deserialization follows the implicit zero-extension rule: reading
//! past the end of a received payload yields zeros, so a shorter (older)
//! encoding still decodes.

use crate::types::PortId;

#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SerializeError {
    /// Output buffer cannot hold the serialized value.
    #[error("buffer too small")]
    BufferTooSmall,
    /// A field holds a value its wire representation can't express.
    #[error("value out of range")]
    ValueOutOfRange,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeserializeError {
    /// Array length prefix exceeds the declared capacity.
    #[error("array length exceeds capacity")]
    ArrayLength,
    /// Byte does not map to any variant of an enumeration.
    #[error("invalid enumeration value")]
    InvalidValue,
}

pub trait Serialize {
    /// Write the value into `buffer`, returning the number of bytes used.
    fn serialize(&self, buffer: &mut [u8]) -> Result<usize, SerializeError>;
}

pub trait Deserialize: Sized {
    fn deserialize(payload: &[u8]) -> Result<Self, DeserializeError>;
}

/// A type published on a fixed subject.
pub trait Message: Serialize + Deserialize {
    const SUBJECT_ID: PortId;
    /// Receive buffer size needed to hold any version of this type.
    const EXTENT: usize;
}

/// Request half of a service with a fixed service-ID.
pub trait ServiceRequest: Serialize + Deserialize {
    const SERVICE_ID: PortId;
    const EXTENT: usize;
    type Response: ServiceResponse;
}

/// Response half of a service.
pub trait ServiceResponse: Serialize + Deserialize {
    const EXTENT: usize;
}

/// Sequential little-endian writer over a byte buffer.
pub(crate) struct Writer<'a> {
    buffer: &'a mut [u8],
    offset: usize,
}

impl<'a> Writer<'a> {
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    pub fn bytes(&mut self, data: &[u8]) -> Result<(), SerializeError> {
        let end = self.offset + data.len();
        self.buffer
            .get_mut(self.offset..end)
            .ok_or(SerializeError::BufferTooSmall)?
            .copy_from_slice(data);
        self.offset = end;
        Ok(())
    }

    pub fn u8(&mut self, value: u8) -> Result<(), SerializeError> {
        self.bytes(&[value])
    }

    pub fn u16(&mut self, value: u16) -> Result<(), SerializeError> {
        self.bytes(&value.to_le_bytes())
    }

    pub fn u32(&mut self, value: u32) -> Result<(), SerializeError> {
        self.bytes(&value.to_le_bytes())
    }

    /// Zero padding.
    pub fn skip(&mut self, len: usize) -> Result<(), SerializeError> {
        let end = self.offset + len;
        self.buffer
            .get_mut(self.offset..end)
            .ok_or(SerializeError::BufferTooSmall)?
            .fill(0);
        self.offset = end;
        Ok(())
    }

    pub fn finish(self) -> usize {
        self.offset
    }
}

/// Sequential little-endian reader with implicit zero extension.
pub(crate) struct Reader<'a> {
    payload: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    pub fn new(payload: &'a [u8]) -> Self {
        Self { payload, offset: 0 }
    }

    pub fn u8(&mut self) -> u8 {
        let value = self.payload.get(self.offset).copied().unwrap_or(0);
        self.offset += 1;
        value
    }

    pub fn u16(&mut self) -> u16 {
        u16::from_le_bytes([self.u8(), self.u8()])
    }

    pub fn u32(&mut self) -> u32 {
        u32::from_le_bytes([self.u8(), self.u8(), self.u8(), self.u8()])
    }

    /// Fill `out` from the payload, zero-extended.
    pub fn bytes(&mut self, out: &mut [u8]) {
        for byte in out.iter_mut() {
            *byte = self.u8();
        }
    }
}
