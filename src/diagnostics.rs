//! Counters for everything the node drops or rejects.
//!
//! Dropping a bad frame is normal operation on a shared bus, so the receive
//! path never surfaces it as a hard failure. These counters are the only
//! trace it leaves (plus a `defmt` log line with the `defmt` feature).

use crate::session::SessionError;
use crate::RxError;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Diagnostics {
    pub frames_received: u32,
    pub frames_queued: u32,
    pub transfers_received: u32,
    pub transfers_sent: u32,
    /// Arbitration IDs with reserved bits set or impossible addressing.
    pub malformed_ids: u32,
    /// Empty frames, start frames without toggle, short non-last frames,
    /// anonymous multi-frame transfers.
    pub invalid_frames: u32,
    /// Continuation frames with no transfer in progress.
    pub orphan_frames: u32,
    pub toggle_errors: u32,
    pub transfer_id_errors: u32,
    pub crc_errors: u32,
    /// Partial transfers abandoned on timeout.
    pub session_timeouts: u32,
    /// No reassembly slot available for a new source.
    pub out_of_sessions: u32,
    pub unmatched_responses: u32,
    pub expired_requests: u32,
    pub queue_full: u32,
    /// Queued frames the bus driver's frame type could not hold.
    pub unsendable_frames: u32,
}

impl Diagnostics {
    pub fn record_rx_error(&mut self, err: &RxError) {
        let counter = match err {
            RxError::InvalidCanId => &mut self.malformed_ids,
            RxError::FrameEmpty
            | RxError::TransferStartMissingToggle
            | RxError::NonLastUnderUtilization
            | RxError::AnonNotSingleFrame => &mut self.invalid_frames,
            RxError::SessionError(err) => match err {
                SessionError::NewSessionNoStart => &mut self.orphan_frames,
                SessionError::InvalidTransferId => &mut self.transfer_id_errors,
                SessionError::ToggleMismatch => &mut self.toggle_errors,
                SessionError::CrcMismatch => &mut self.crc_errors,
                SessionError::Timeout => &mut self.session_timeouts,
                SessionError::OutOfSpace => &mut self.out_of_sessions,
            },
        };
        *counter = counter.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_are_bucketed() {
        let mut diagnostics = Diagnostics::default();
        diagnostics.record_rx_error(&RxError::FrameEmpty);
        diagnostics.record_rx_error(&RxError::NonLastUnderUtilization);
        diagnostics.record_rx_error(&RxError::InvalidCanId);
        diagnostics.record_rx_error(&RxError::SessionError(SessionError::CrcMismatch));
        diagnostics.record_rx_error(&RxError::SessionError(SessionError::NewSessionNoStart));
        diagnostics.record_rx_error(&RxError::SessionError(SessionError::InvalidTransferId));

        assert_eq!(diagnostics.invalid_frames, 2);
        assert_eq!(diagnostics.malformed_ids, 1);
        assert_eq!(diagnostics.crc_errors, 1);
        assert_eq!(diagnostics.orphan_frames, 1);
        assert_eq!(diagnostics.transfer_id_errors, 1);
        assert_eq!(diagnostics.toggle_errors, 0);
    }
}
