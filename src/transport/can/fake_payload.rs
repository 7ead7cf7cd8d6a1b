//! Generates the frames of a synthetic transfer, independently of `CanIter`,
//! so the receive path can be tested against a second encoder.

use super::{TailByte, CHUNK_SIZE, MTU_SIZE};
use crate::{crc16::Crc16, types::TransferId};

pub struct FakePayloadIter {
    frame_amount: usize,
    crc: Option<Crc16>,
    act_frame: usize,
    fake_data_count: u8,
    transfer_id: TransferId,
}

impl FakePayloadIter {
    fn new(frame_amount: usize, transfer_id: TransferId) -> Self {
        Self {
            crc: match frame_amount {
                1 => None,
                _ => Some(Crc16::init()),
            },
            frame_amount,
            act_frame: 0,
            fake_data_count: 0,
            transfer_id,
        }
    }

    pub fn single_frame(transfer_id: TransferId) -> Self {
        Self::new(1, transfer_id)
    }

    pub fn multi_frame(frame_amount: usize, transfer_id: TransferId) -> Self {
        Self::new(frame_amount, transfer_id)
    }

    /// Payload the receiver should hand out for `frame_amount` frames.
    pub fn expected_payload(frame_amount: usize) -> impl Iterator<Item = u8> {
        let len = match frame_amount {
            1 => CHUNK_SIZE,
            n => n * CHUNK_SIZE - 2,
        };
        (0..len).map(|byte| byte as u8)
    }
}

impl Iterator for FakePayloadIter {
    type Item = [u8; MTU_SIZE];

    fn next(&mut self) -> Option<Self::Item> {
        if self.act_frame == self.frame_amount {
            return None;
        }

        let start = self.act_frame == 0;
        let end = self.act_frame == self.frame_amount - 1;
        let mut frame = [0u8; MTU_SIZE];

        // The last frame of a multi-frame transfer ends with the CRC.
        let data_len = match (self.crc.is_some(), end) {
            (true, true) => CHUNK_SIZE - 2,
            _ => CHUNK_SIZE,
        };
        for byte in frame[..data_len].iter_mut() {
            *byte = self.fake_data_count;
            self.fake_data_count = self.fake_data_count.wrapping_add(1);
        }

        if let Some(crc) = self.crc.as_mut() {
            crc.digest(&frame[..data_len]);
            if end {
                frame[CHUNK_SIZE - 2..CHUNK_SIZE].copy_from_slice(&crc.get_crc().to_be_bytes());
            }
        }

        frame[CHUNK_SIZE] = TailByte::new(start, end, self.act_frame % 2 == 0, self.transfer_id).0;
        self.act_frame += 1;
        Some(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc16;

    #[test]
    fn single_frame_has_no_crc() {
        let frames: Vec<_> = FakePayloadIter::single_frame(9).collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0][CHUNK_SIZE], TailByte::new(true, true, true, 9).0);
        assert!(frames[0][..CHUNK_SIZE]
            .iter()
            .copied()
            .eq(FakePayloadIter::expected_payload(1)));
    }

    #[test]
    fn multi_frame_ends_with_crc() {
        let frames: Vec<_> = FakePayloadIter::multi_frame(3, 5).collect();
        let stream: Vec<u8> = frames
            .iter()
            .flat_map(|frame| frame[..CHUNK_SIZE].iter().copied())
            .collect();

        assert!(crc16::verify(&stream));
        assert!(stream[..stream.len() - 2]
            .iter()
            .copied()
            .eq(FakePayloadIter::expected_payload(3)));

        let toggles: Vec<bool> = frames
            .iter()
            .map(|frame| TailByte(frame[CHUNK_SIZE]).toggle())
            .collect();
        assert_eq!(toggles, [true, false, true]);
        assert!(TailByte(frames[2][CHUNK_SIZE]).end_of_transfer());
    }
}
