//! Queue acceptance tests.
//!
//! # Acceptance Criteria
//!
//! - N producers x M nodes pushed, N consumers: every node popped exactly once
//! - Single producer / single consumer: values observed in push order
//! - Popping an empty queue reports empty without blocking

use super::common::default_substrate;
use fastpath::{CpuIdle, LinkedQueue, NodeArena, NodeHandle};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

/// Packet-like payload carried through the queue.
#[derive(Debug, Clone, Copy)]
struct Frame {
    producer: u32,
    seq: u32,
    checksum: u64,
}

impl Frame {
    fn new(producer: u32, seq: u32) -> Self {
        Self {
            producer,
            seq,
            checksum: 0,
        }
    }

    fn seal(&mut self) {
        self.checksum = (u64::from(self.producer) << 32) | u64::from(self.seq);
    }

    fn is_sealed(&self) -> bool {
        self.checksum == (u64::from(self.producer) << 32) | u64::from(self.seq)
    }
}

/// Eight producers push 10 000 nodes each while eight consumers drain the queue.
#[test]
fn test_conservation_8x10000() -> anyhow::Result<()> {
    const PRODUCERS: u32 = 8;
    const CONSUMERS: usize = 8;
    const PER_PRODUCER: u32 = 10_000;
    const TOTAL: usize = (PRODUCERS * PER_PRODUCER) as usize;

    let substrate = default_substrate()?;
    let (arena, handles) = NodeArena::with_capacity(TOTAL, |i| {
        let i = u32::try_from(i).unwrap();
        Frame::new(i / PER_PRODUCER, i % PER_PRODUCER)
    })?;
    let queue: Arc<LinkedQueue<Frame>> = Arc::new(substrate.queue(Arc::new(arena)));
    let popped = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(PRODUCERS as usize + CONSUMERS));

    let mut handles = handles.into_iter();
    let producers: Vec<_> = (0..PRODUCERS)
        .map(|_| {
            let batch: Vec<NodeHandle> = handles.by_ref().take(PER_PRODUCER as usize).collect();
            let queue = Arc::clone(&queue);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                for mut node in batch {
                    // Payload written before push must be visible to the popper
                    queue.arena().get_mut(&mut node).seal();
                    queue.push(node);
                }
            })
        })
        .collect();

    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let popped = Arc::clone(&popped);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                let mut frames = Vec::new();
                start.wait();
                while popped.load(Ordering::Acquire) < TOTAL {
                    if let Some(node) = queue.pop() {
                        frames.push(*queue.arena().get(&node));
                        popped.fetch_add(1, Ordering::AcqRel);
                    } else {
                        CpuIdle::pause();
                    }
                }
                frames
            })
        })
        .collect();

    for producer in producers {
        producer.join().expect("producer panicked");
    }

    let mut seen = HashSet::with_capacity(TOTAL);
    for consumer in consumers {
        for frame in consumer.join().expect("consumer panicked") {
            assert!(frame.is_sealed(), "payload not visible: {frame:?}");
            assert!(
                seen.insert((frame.producer, frame.seq)),
                "duplicate pop: {frame:?}"
            );
        }
    }

    assert_eq!(seen.len(), TOTAL);
    assert!(queue.pop().is_none());
    Ok(())
}

/// A single producer and consumer observe values 1..=K in order.
#[test]
fn test_spsc_fifo() -> anyhow::Result<()> {
    const K: u64 = 50_000;

    let substrate = default_substrate()?;
    let (arena, handles) = NodeArena::from_values(1..=K)?;
    let queue = Arc::new(substrate.queue(Arc::new(arena)));

    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            for node in handles {
                queue.push(node);
            }
        })
    };

    let mut expected = 1;
    while expected <= K {
        match queue.pop() {
            Some(node) => {
                assert_eq!(*queue.arena().get(&node), expected);
                expected += 1;
            }
            None => CpuIdle::pause(),
        }
    }

    producer.join().expect("producer panicked");
    Ok(())
}

/// Pop on a never-filled and a drained queue both report empty.
#[test]
fn test_empty_pop() -> anyhow::Result<()> {
    let substrate = default_substrate()?;
    let (arena, handles) = NodeArena::from_values(["a", "b"])?;
    let queue = substrate.queue(Arc::new(arena));

    assert!(queue.pop().is_none());
    for node in handles {
        queue.push(node);
    }
    assert_eq!(queue.drain().len(), 2);
    assert!(queue.pop().is_none());
    assert!(queue.is_empty());
    Ok(())
}

/// Nodes recycled between a free list and a work queue are never lost.
#[test]
fn test_free_list_round_trip() -> anyhow::Result<()> {
    const NODES: usize = 64;
    const WORKERS: usize = 4;
    const ROUNDS: usize = 10_000;

    let substrate = default_substrate()?;
    let (arena, handles) = NodeArena::with_capacity(NODES, |_| 0u32)?;
    let arena = Arc::new(arena);
    let free = Arc::new(substrate.queue(Arc::clone(&arena)));
    let work = Arc::new(substrate.queue(Arc::clone(&arena)));
    for node in handles {
        free.push(node);
    }

    let workers: Vec<_> = (0..WORKERS)
        .map(|_| {
            let free = Arc::clone(&free);
            let work = Arc::clone(&work);
            let arena = Arc::clone(&arena);
            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    if let Some(mut node) = free.pop() {
                        *arena.get_mut(&mut node) += 1;
                        work.push(node);
                    }
                    if let Some(node) = work.pop() {
                        free.push(node);
                    }
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().expect("worker panicked");
    }

    let mut all = free.drain();
    all.extend(work.drain());
    let indices: HashSet<usize> = all.iter().map(NodeHandle::index).collect();
    assert_eq!(all.len(), NODES);
    assert_eq!(indices.len(), NODES);
    Ok(())
}
