//! Producer-consumer over a bounded FIFO.
//!
//! One mutex guards the queue; producers park on `not_full`, consumers on
//! `not_empty`. Each successful operation wakes one thread of the other role.
//! Both wait loops re-check their predicate after every wake-up, so spurious
//! wake-ups and lost notifications cannot let the length leave `0..=capacity`.

use crate::error::{Result, UnitError};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, Span};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub len: usize,
    pub high_water: usize,
    pub producer_waits: usize,
    pub consumer_waits: usize,
}

#[derive(Debug)]
struct State<T> {
    items: VecDeque<T>,
    interrupted: bool,
    high_water: usize,
    producer_waits: usize,
    consumer_waits: usize,
}

#[derive(Debug)]
pub struct BoundedQueue<T> {
    state: Mutex<State<T>>,
    not_full: Condvar,
    not_empty: Condvar,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(UnitError::InvalidCapacity);
        }

        Ok(Self {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity),
                interrupted: false,
                high_water: 0,
                producer_waits: 0,
                consumer_waits: 0,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Block while the queue is full, then append `item`.
    pub fn produce(&self, item: T) -> Result<()> {
        let mut state = self.state.lock();
        loop {
            if state.interrupted {
                return Err(UnitError::Interrupted);
            }
            if state.items.len() < self.capacity {
                break;
            }
            state.producer_waits += 1;
            info!(capacity = self.capacity, "buffer full, producer waiting");
            self.not_full.wait(&mut state);
        }

        state.items.push_back(item);
        let len = state.items.len();
        state.high_water = state.high_water.max(len);
        debug!(len, "produced");

        self.not_empty.notify_one();
        Ok(())
    }

    /// Block while the queue is empty, then remove the oldest item.
    ///
    /// Items already queued are still handed out after `interrupt`; only a
    /// consumer facing an empty queue gets `Interrupted`.
    pub fn consume(&self) -> Result<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                debug!(len = state.items.len(), "consumed");
                self.not_full.notify_one();
                return Ok(item);
            }
            if state.interrupted {
                return Err(UnitError::Interrupted);
            }
            state.consumer_waits += 1;
            info!("buffer empty, consumer waiting");
            self.not_empty.wait(&mut state);
        }
    }

    /// Wake every blocked producer and consumer and make further blocking
    /// calls fail with `Interrupted`.
    pub fn interrupt(&self) {
        let mut state = self.state.lock();
        state.interrupted = true;
        drop(state);

        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.state.lock();
        QueueStats {
            len: state.items.len(),
            high_water: state.high_water,
            producer_waits: state.producer_waits,
            consumer_waits: state.consumer_waits,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerConsumerReport {
    pub produced: u32,
    pub consumed: Vec<u32>,
    pub stats: QueueStats,
}

impl ProducerConsumerReport {
    /// True when the consumer saw exactly `1..=produced`, in order.
    pub fn in_order(&self) -> bool {
        self.consumed.iter().copied().eq(1..=self.produced)
    }
}

/// Interrupts the queue on drop unless disarmed. Each side of the pipeline
/// holds one, so an early error or a panic on one side wakes the other
/// instead of leaving it parked on a condvar.
struct InterruptOnDrop<'a, T> {
    queue: &'a BoundedQueue<T>,
    armed: bool,
}

impl<'a, T> InterruptOnDrop<'a, T> {
    fn new(queue: &'a BoundedQueue<T>) -> Self {
        Self { queue, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<T> Drop for InterruptOnDrop<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            debug!("pipeline side failed, interrupting queue");
            self.queue.interrupt();
        }
    }
}

/// One producer pushes `1..=items`, one consumer pops the same number.
/// Sleeping after each step sets each side's pace.
pub fn run_producer_consumer(
    capacity: usize,
    items: u32,
    producer_pace: Duration,
    consumer_pace: Duration,
) -> Result<ProducerConsumerReport> {
    let queue = Arc::new(BoundedQueue::new(capacity)?);
    let span = Span::current();

    let producer_queue = Arc::clone(&queue);
    let producer_span = span.clone();
    let producer = thread::Builder::new()
        .name("producer".to_string())
        .spawn(move || -> Result<()> {
            let _entered = producer_span.enter();
            let guard = InterruptOnDrop::new(&*producer_queue);
            for item in 1..=items {
                producer_queue.produce(item)?;
                info!(item, "produced");
                thread::sleep(producer_pace);
            }
            guard.disarm();
            Ok(())
        })?;

    let consumer_queue = Arc::clone(&queue);
    let consumer = thread::Builder::new()
        .name("consumer".to_string())
        .spawn(move || -> Result<Vec<u32>> {
            let _entered = span.enter();
            let guard = InterruptOnDrop::new(&*consumer_queue);
            let mut seen = Vec::with_capacity(items as usize);
            for _ in 0..items {
                let item = consumer_queue.consume()?;
                info!(item, "consumed");
                seen.push(item);
                thread::sleep(consumer_pace);
            }
            guard.disarm();
            Ok(seen)
        });
    let consumer = match consumer {
        Ok(handle) => handle,
        Err(err) => {
            // Nobody will drain the queue; release the producer before
            // reporting.
            queue.interrupt();
            let _ = producer.join();
            return Err(err.into());
        }
    };

    // Join both sides before propagating either failure.
    let produced = producer
        .join()
        .map_err(|_| UnitError::WorkerPanicked { name: "producer".to_string() })
        .and_then(|result| result);
    let consumed = consumer
        .join()
        .map_err(|_| UnitError::WorkerPanicked { name: "consumer".to_string() })
        .and_then(|result| result);
    produced?;
    let consumed = consumed?;

    Ok(ProducerConsumerReport {
        produced: items,
        consumed,
        stats: queue.stats(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::Instant;
    use tracing_test::traced_test;

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            BoundedQueue::<u32>::new(0),
            Err(UnitError::InvalidCapacity)
        ));
    }

    #[test]
    fn test_fifo_single_thread() {
        let queue = BoundedQueue::new(3).unwrap();
        queue.produce("a").unwrap();
        queue.produce("b").unwrap();
        queue.produce("c").unwrap();

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.consume().unwrap(), "a");
        assert_eq!(queue.consume().unwrap(), "b");
        assert_eq!(queue.consume().unwrap(), "c");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_slow_consumer_sees_every_item_in_order() {
        let report =
            run_producer_consumer(5, 10, Duration::from_millis(2), Duration::from_millis(6)).unwrap();

        assert_eq!(report.consumed, (1..=10).collect::<Vec<_>>());
        assert!(report.in_order());
        assert!(report.stats.high_water <= 5);
        assert_eq!(report.stats.len, 0);
    }

    #[test]
    fn test_fast_producer_fills_buffer_and_waits() {
        let report = run_producer_consumer(2, 8, Duration::ZERO, Duration::from_millis(10)).unwrap();

        assert!(report.in_order());
        assert_eq!(report.stats.high_water, 2);
        assert!(report.stats.producer_waits > 0);
    }

    #[test]
    #[traced_test]
    fn test_full_buffer_is_logged() {
        run_producer_consumer(1, 4, Duration::ZERO, Duration::from_millis(10)).unwrap();
        assert!(logs_contain("buffer full, producer waiting"));
    }

    #[test]
    fn test_interrupt_wakes_blocked_consumer() {
        let queue = Arc::new(BoundedQueue::<u32>::new(1).unwrap());
        let waiter = Arc::clone(&queue);
        let handle = thread::spawn(move || waiter.consume());

        thread::sleep(Duration::from_millis(50));
        queue.interrupt();

        assert!(matches!(handle.join().unwrap(), Err(UnitError::Interrupted)));
    }

    #[test]
    fn test_interrupt_wakes_blocked_producer() {
        let queue = Arc::new(BoundedQueue::new(1).unwrap());
        queue.produce(1).unwrap();

        let waiter = Arc::clone(&queue);
        let start = Instant::now();
        let handle = thread::spawn(move || waiter.produce(2));

        thread::sleep(Duration::from_millis(50));
        queue.interrupt();

        assert!(matches!(handle.join().unwrap(), Err(UnitError::Interrupted)));
        assert!(start.elapsed() < Duration::from_secs(5));
        // The item queued before the interrupt is still handed out.
        assert_eq!(queue.consume().unwrap(), 1);
        assert!(matches!(queue.consume(), Err(UnitError::Interrupted)));
    }

    #[test]
    fn test_failing_side_releases_blocked_producer() {
        let queue = Arc::new(BoundedQueue::new(1).unwrap());
        queue.produce(1).unwrap();

        let waiter = Arc::clone(&queue);
        let producer = thread::spawn(move || waiter.produce(2));
        thread::sleep(Duration::from_millis(50));

        let failing = Arc::clone(&queue);
        let consumer = thread::spawn(move || {
            let _guard = InterruptOnDrop::new(&*failing);
            panic!("consumer gave up");
        });

        assert!(consumer.join().is_err());
        assert!(matches!(producer.join().unwrap(), Err(UnitError::Interrupted)));
    }

    #[test]
    fn test_disarmed_guard_leaves_queue_usable() {
        let queue = BoundedQueue::new(2).unwrap();
        InterruptOnDrop::new(&queue).disarm();

        queue.produce(7).unwrap();
        assert_eq!(queue.consume().unwrap(), 7);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn test_handoff_preserves_order(
            capacity in 1usize..5,
            items in proptest::collection::vec(any::<i32>(), 0..40),
        ) {
            let queue = Arc::new(BoundedQueue::new(capacity).unwrap());
            let expected = items.clone();
            let count = items.len();

            let producer_queue = Arc::clone(&queue);
            let producer = thread::spawn(move || {
                for item in items {
                    producer_queue.produce(item).unwrap();
                }
            });

            let received: Vec<i32> = (0..count).map(|_| queue.consume().unwrap()).collect();
            producer.join().unwrap();

            prop_assert_eq!(received, expected);
            prop_assert!(queue.stats().high_water <= capacity);
        }
    }
}
