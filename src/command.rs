//! Outbound command queue shared between producers and the read loop.
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, PoisonError},
};

#[derive(Debug, Clone, Default)]
/// Outbound commands waiting for the read loop.
///
/// Clones share one queue, so any thread may hold a handle and enqueue
/// fully serialized commands. The read loop writes them verbatim, in
/// order, once per iteration.
pub struct CommandQueue {
    inner: Arc<Mutex<VecDeque<Vec<u8>>>>,
}

impl CommandQueue {
    /// Empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a complete command frame. Never blocks on I/O.
    pub fn enqueue(&self, command: impl Into<Vec<u8>>) {
        self.lock().push_back(command.into());
    }

    /// Take everything queued so far, oldest first.
    pub fn drain(&self) -> Vec<Vec<u8>> {
        self.lock().drain(..).collect()
    }

    /// Number of commands waiting
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True if nothing is waiting
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop everything waiting and return how many commands were dropped.
    pub fn clear(&self) -> usize {
        let mut queue = self.lock();
        let count = queue.len();
        queue.clear();
        count
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Vec<u8>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::thread;

    #[test]
    fn fifo_across_clones() {
        let queue = CommandQueue::new();
        let producer = queue.clone();
        producer.enqueue(vec![1, 2]);
        producer.enqueue(&b"\x03"[..]);
        queue.enqueue([4u8; 2].to_vec());
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.drain(), vec![vec![1, 2], vec![3], vec![4, 4]]);
        assert!(producer.is_empty());
    }

    #[test]
    fn concurrent_producers() {
        let queue = CommandQueue::new();
        let handles: Vec<_> = (0..4u8)
            .map(|id| {
                let queue = queue.clone();
                thread::spawn(move || {
                    for seq in 0..25u8 {
                        queue.enqueue(vec![id, seq]);
                    }
                })
            })
            .collect();
        for hdl in handles {
            hdl.join().unwrap();
        }
        let cmds = queue.drain();
        assert_eq!(cmds.len(), 100);
        // per producer order is preserved
        for id in 0..4u8 {
            let seqs: Vec<u8> = cmds.iter().filter(|c| c[0] == id).map(|c| c[1]).collect();
            assert_eq!(seqs, (0..25).collect::<Vec<u8>>());
        }
    }

    #[test]
    fn clear_counts() {
        let queue = CommandQueue::new();
        queue.enqueue(vec![0xB5]);
        queue.enqueue(vec![0x62]);
        assert_eq!(queue.clear(), 2);
        assert!(queue.drain().is_empty());
    }
}
