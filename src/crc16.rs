//! CRC-16/CCITT-FALSE, the transfer CRC used by Cyphal/CAN.
//!
//! Polynomial 0x1021, initial value 0xFFFF, no reflection, no final XOR.
//! Running the CRC over a payload followed by its own big-endian CRC leaves a
//! residue of zero, which is how multi-frame transfers are validated on receive.

const POLY: u16 = 0x1021;
const INITIAL: u16 = 0xFFFF;

static TABLE: [u16; 256] = make_table();

const fn make_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Running CRC state.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Crc16(u16);

impl Crc16 {
    pub fn init() -> Self {
        Self(INITIAL)
    }

    pub fn digest<T: ?Sized + AsRef<[u8]>>(&mut self, data: &T) {
        for byte in data.as_ref() {
            let index = ((self.0 >> 8) as u8 ^ byte) as usize;
            self.0 = (self.0 << 8) ^ TABLE[index];
        }
    }

    pub fn get_crc(&self) -> u16 {
        self.0
    }
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::init()
    }
}

/// CRC of `data` from a fresh state.
pub fn compute(data: &[u8]) -> u16 {
    let mut crc = Crc16::init();
    crc.digest(data);
    crc.get_crc()
}

/// Checks a buffer whose last two bytes are the big-endian CRC of the rest.
pub fn verify(data: &[u8]) -> bool {
    data.len() >= 2 && compute(data) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_value() {
        assert_eq!(compute(b"123456789"), 0x29B1);
        assert_eq!(compute(&[]), 0xFFFF);
    }

    #[test]
    fn matches_reference_implementation() {
        let payload = b"I want a double espresso with cream";

        let mut ref_impl = crc_any::CRCu16::crc16ccitt_false();
        ref_impl.digest(payload);

        assert_eq!(ref_impl.get_crc(), compute(payload));
    }

    #[test]
    fn digest_in_chunks() {
        let payload = b"123456789123456789";

        let mut crc = Crc16::init();
        for chunk in payload.chunks(7) {
            crc.digest(chunk);
        }

        assert_eq!(crc.get_crc(), compute(payload));
    }

    #[test]
    fn residue_is_zero() {
        let mut buffer = [0u8; 11];
        buffer[..9].copy_from_slice(b"123456789");
        buffer[9..].copy_from_slice(&compute(b"123456789").to_be_bytes());
        assert!(verify(&buffer));

        buffer[3] ^= 0x10;
        assert!(!verify(&buffer));
        assert!(!verify(&[0x29]));
    }
}
