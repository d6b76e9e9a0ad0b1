//!
//! Integration tests for channel handoff
//!
//! Producers tag every item so consumers can check that nothing was lost or
//! delivered twice.
//!

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use concord_std_channels::{BoundedBuffer, Channel, LinkedQueue, Peek, SynchronousChannel};

const PRODUCERS: u64 = 4;
const PER_PRODUCER: u64 = 2_000;

fn tag(producer: u64, seq: u64) -> u64 {
    producer * 1_000_000 + seq
}

/// Run producers and consumers over `channel`, returning every item taken.
fn exchange<C: Channel<u64> + 'static>(channel: Arc<C>, consumers: u64) -> Vec<u64> {
    let total = PRODUCERS * PER_PRODUCER;
    assert_eq!(total % consumers, 0);

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let channel = Arc::clone(&channel);
            thread::spawn(move || {
                for seq in 0..PER_PRODUCER {
                    channel.put(tag(p, seq)).unwrap();
                }
            })
        })
        .collect();
    let takers: Vec<_> = (0..consumers)
        .map(|_| {
            let channel = Arc::clone(&channel);
            thread::spawn(move || {
                (0..total / consumers)
                    .map(|_| channel.take().unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    for h in producers {
        h.join().unwrap();
    }
    takers.into_iter().flat_map(|h| h.join().unwrap()).collect()
}

fn assert_conserved(items: &[u64]) {
    let expected: u64 = (0..PRODUCERS)
        .map(|p| (0..PER_PRODUCER).map(|seq| tag(p, seq)).sum::<u64>())
        .sum();
    assert_eq!(items.len() as u64, PRODUCERS * PER_PRODUCER);
    assert_eq!(items.iter().sum::<u64>(), expected);
    let distinct: HashSet<_> = items.iter().collect();
    assert_eq!(distinct.len(), items.len());
}

#[test]
fn test_linked_queue_spsc_preserves_order() {
    let queue = Arc::new(LinkedQueue::new());
    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            for i in 0..10_000u32 {
                queue.put(i).unwrap();
            }
        })
    };
    let received: Vec<u32> = (0..10_000).map(|_| queue.take().unwrap()).collect();
    producer.join().unwrap();
    assert_eq!(received, (0..10_000).collect::<Vec<_>>());
    assert!(queue.is_empty());
}

#[test]
fn test_linked_queue_conserves_items() {
    let queue = Arc::new(LinkedQueue::new());
    let items = exchange(Arc::clone(&queue), 4);
    assert_conserved(&items);
    assert_eq!(queue.try_take(), None);
}

#[test]
fn test_linked_queue_per_producer_order() {
    let queue = Arc::new(LinkedQueue::new());
    let items = exchange(Arc::clone(&queue), 1);
    for p in 0..PRODUCERS {
        let seen: Vec<u64> = items.iter().copied().filter(|t| t / 1_000_000 == p).collect();
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }
}

#[test]
fn test_bounded_buffer_conserves_items() {
    let buffer = Arc::new(BoundedBuffer::new(8).unwrap());
    let items = exchange(buffer, 2);
    assert_conserved(&items);
}

#[test]
fn test_synchronous_channel_conserves_items() {
    let channel = Arc::new(SynchronousChannel::new());
    let items = exchange(Arc::clone(&channel), 4);
    assert_conserved(&items);
    assert_eq!(channel.waiting_takers(), 0);
    assert_eq!(channel.peek(), None);
}

#[test]
fn test_rendezvous_peek_empty_around_exchange() {
    let channel = Arc::new(SynchronousChannel::new());
    assert_eq!(channel.peek(), None);
    let taker = {
        let channel = Arc::clone(&channel);
        thread::spawn(move || channel.poll(Duration::from_secs(5)).unwrap())
    };
    channel.put(String::from("x")).unwrap();
    assert_eq!(taker.join().unwrap().as_deref(), Some("x"));
    assert_eq!(channel.peek(), None);
}
