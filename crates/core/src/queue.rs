//! Thread-safe min-heap of block events ordered by block timestamp.

use crate::event::BlockEvent;
use metafs_types::ChainKind;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Mutex;

struct Ordered(BlockEvent);

impl Ordered {
    /// Ties are broken by chain then height so ordering is stable.
    fn key(&self) -> (u64, ChainKind, u64) {
        (self.0.timestamp_ms, self.0.chain, self.0.height)
    }
}

impl PartialEq for Ordered {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Ordered {}

impl PartialOrd for Ordered {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ordered {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Priority queue of pending block events; any caller may push or pop.
#[derive(Default)]
pub struct EventQueue {
    heap: Mutex<BinaryHeap<Reverse<Ordered>>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BinaryHeap<Reverse<Ordered>>> {
        self.heap.lock().expect("EventQueue lock is poisoned")
    }

    pub fn push(&self, event: BlockEvent) {
        self.lock().push(Reverse(Ordered(event)));
    }

    /// Timestamp and chain of the earliest event, without removing it.
    pub fn peek(&self) -> Option<(u64, ChainKind)> {
        self.lock()
            .peek()
            .map(|Reverse(Ordered(event))| (event.timestamp_ms, event.chain))
    }

    pub fn pop(&self) -> Option<BlockEvent> {
        self.lock().pop().map(|Reverse(Ordered(event))| event)
    }

    /// Removes the earliest event belonging to `chain`, if any. Linear scan;
    /// only the deadlock-escape path uses this.
    pub fn pop_for_chain(&self, chain: ChainKind) -> Option<BlockEvent> {
        let mut heap = self.lock();
        let mut rest: Vec<Reverse<Ordered>> = heap.drain().collect();
        let target = rest
            .iter()
            .enumerate()
            .filter(|(_, Reverse(event))| event.0.chain == chain)
            .min_by_key(|(_, Reverse(event))| event.key())
            .map(|(i, _)| i);
        let found = target.map(|i| rest.swap_remove(i));
        heap.extend(rest);
        found.map(|Reverse(Ordered(event))| event)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Distinct chains with at least one queued event.
    pub fn chains_present(&self) -> Vec<ChainKind> {
        let heap = self.lock();
        let mut chains: Vec<ChainKind> = heap.iter().map(|Reverse(event)| event.0.chain).collect();
        chains.sort();
        chains.dedup();
        chains
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::BlockPayload;
    use metafs_types::tx::RawBlock;

    fn event(chain: ChainKind, height: u64, timestamp_ms: u64) -> BlockEvent {
        BlockEvent::new(
            chain,
            height,
            timestamp_ms,
            BlockPayload::Full(RawBlock {
                hash: format!("{chain}-{height}"),
                height,
                time: timestamp_ms / 1000,
                tx: vec![],
            }),
        )
    }

    #[test]
    fn pops_in_timestamp_order_regardless_of_push_order() {
        let queue = EventQueue::new();
        queue.push(event(ChainKind::Btc, 3, 300));
        queue.push(event(ChainKind::Mvc, 1, 100));
        queue.push(event(ChainKind::Doge, 2, 200));

        let order: Vec<u64> = std::iter::from_fn(|| queue.pop())
            .map(|e| e.timestamp_ms)
            .collect();
        assert_eq!(order, vec![100, 200, 300]);
        assert!(queue.is_empty());
    }

    #[test]
    fn peek_does_not_remove() {
        let queue = EventQueue::new();
        queue.push(event(ChainKind::Btc, 1, 50));
        assert_eq!(queue.peek(), Some((50, ChainKind::Btc)));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn pop_for_chain_takes_earliest_of_that_chain_only() {
        let queue = EventQueue::new();
        queue.push(event(ChainKind::Btc, 1, 100));
        queue.push(event(ChainKind::Mvc, 1, 150));
        queue.push(event(ChainKind::Btc, 2, 200));

        let taken = queue.pop_for_chain(ChainKind::Btc).unwrap();
        assert_eq!((taken.chain, taken.timestamp_ms), (ChainKind::Btc, 100));
        // The rest of the heap is intact and still ordered.
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().unwrap().timestamp_ms, 150);
        assert_eq!(queue.pop().unwrap().timestamp_ms, 200);
    }

    #[test]
    fn pop_for_chain_on_absent_chain_is_none() {
        let queue = EventQueue::new();
        queue.push(event(ChainKind::Btc, 1, 100));
        assert!(queue.pop_for_chain(ChainKind::Doge).is_none());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn chains_present_deduplicates() {
        let queue = EventQueue::new();
        queue.push(event(ChainKind::Btc, 1, 100));
        queue.push(event(ChainKind::Btc, 2, 200));
        queue.push(event(ChainKind::Doge, 5, 150));
        assert_eq!(
            queue.chains_present(),
            vec![ChainKind::Btc, ChainKind::Doge]
        );
    }
}
