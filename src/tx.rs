//! Outgoing side: the frame queue and per-destination transfer-ID counters.

use heapless::{Deque, FnvIndexMap};

use crate::types::*;
use crate::TxError;

/// FIFO of frames waiting for the bus. Transfers are enqueued whole or not at all.
pub struct TxQueue<F, const N: usize> {
    frames: Deque<F, N>,
}

impl<F, const N: usize> TxQueue<F, N> {
    pub const fn new() -> Self {
        Self {
            frames: Deque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Number of frames that can still be pushed.
    pub fn free(&self) -> usize {
        N - self.frames.len()
    }

    pub fn push(&mut self, frame: F) -> Result<(), TxError> {
        self.frames.push_back(frame).map_err(|_| TxError::QueueFull)
    }

    pub fn front(&self) -> Option<&F> {
        self.frames.front()
    }

    pub fn pop(&mut self) -> Option<F> {
        self.frames.pop_front()
    }
}

impl<F, const N: usize> Default for TxQueue<F, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Counter key. Messages are keyed by subject with no destination.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
struct CounterKey {
    port_id: PortId,
    destination: Option<NodeId>,
}

/// Next transfer-ID per (port, destination). `N` must be a power of two.
pub struct TransferIdCounters<const N: usize> {
    counters: FnvIndexMap<CounterKey, TransferId, N>,
}

impl<const N: usize> TransferIdCounters<N> {
    pub fn new() -> Self {
        Self {
            counters: FnvIndexMap::new(),
        }
    }

    /// Transfer-ID the next transfer on this key will use.
    pub fn peek(&self, port_id: PortId, destination: Option<NodeId>) -> TransferId {
        self.counters
            .get(&CounterKey {
                port_id,
                destination,
            })
            .copied()
            .unwrap_or(0)
    }

    /// Take the current transfer-ID and advance the counter, wrapping at 32.
    pub fn next(
        &mut self,
        port_id: PortId,
        destination: Option<NodeId>,
    ) -> Result<TransferId, TxError> {
        let key = CounterKey {
            port_id,
            destination,
        };
        match self.counters.get_mut(&key) {
            Some(counter) => {
                let transfer_id = *counter;
                *counter = next_transfer_id(transfer_id);
                Ok(transfer_id)
            }
            None => {
                self.counters
                    .insert(key, next_transfer_id(0))
                    .map_err(|_| TxError::TransferIdTableFull)?;
                Ok(0)
            }
        }
    }
}

impl<const N: usize> Default for TransferIdCounters<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_wraps() {
        let mut counters = TransferIdCounters::<4>::new();
        for expected in 0..=TRANSFER_ID_MAX {
            assert_eq!(counters.next(435, Some(27)), Ok(expected));
        }
        assert_eq!(counters.next(435, Some(27)), Ok(0));
        assert_eq!(counters.peek(435, Some(27)), 1);
    }

    #[test]
    fn counters_are_independent() {
        let mut counters = TransferIdCounters::<4>::new();
        assert_eq!(counters.next(435, Some(27)), Ok(0));
        assert_eq!(counters.next(435, Some(27)), Ok(1));
        assert_eq!(counters.next(435, Some(28)), Ok(0));
        assert_eq!(counters.next(435, None), Ok(0));
        assert_eq!(counters.next(7509, None), Ok(0));
        assert_eq!(counters.peek(435, Some(27)), 2);
        assert_eq!(counters.peek(1, None), 0);
    }

    #[test]
    fn counter_table_full() {
        let mut counters = TransferIdCounters::<2>::new();
        counters.next(1, None).unwrap();
        counters.next(2, None).unwrap();
        assert_eq!(counters.next(3, None), Err(TxError::TransferIdTableFull));
        // Existing keys keep working
        assert_eq!(counters.next(1, None), Ok(1));
    }

    #[test]
    fn queue_is_fifo() {
        let mut queue = TxQueue::<u8, 2>::new();
        assert_eq!(queue.free(), 2);
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        assert_eq!(queue.push(3), Err(TxError::QueueFull));
        assert_eq!(queue.front(), Some(&1));
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), None);
        assert!(queue.is_empty());
    }
}
