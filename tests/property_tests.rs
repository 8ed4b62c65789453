use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use udprelay::common::RecordingObserver;
use udprelay::frame::HEADER_LEN;
use udprelay::{DatagramRecord, Dispatcher, FramedQueue, ObserverRegistry, QueueCapacity};

fn record_strategy(max_len: usize) -> impl Strategy<Value = DatagramRecord> {
    (prop::collection::vec(any::<u8>(), 0..=max_len), any::<u32>(), any::<u16>())
        .prop_map(|(payload, ip, port)| DatagramRecord::new(payload, ip, port))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: records that fit come back unchanged and in enqueue order
    #[test]
    fn fitting_records_dequeue_in_order(
        records in prop::collection::vec(record_strategy(128), 0..32),
    ) {
        let queue = FramedQueue::new(QueueCapacity::Bytes(32 * (HEADER_LEN + 128)), 128);

        for record in &records {
            prop_assert!(queue.enqueue(record));
        }
        for record in &records {
            let dequeued = queue.try_dequeue();
            prop_assert_eq!(dequeued.as_ref(), Some(record));
        }
        prop_assert!(queue.try_dequeue().is_none());
    }

    /// Property: a rejected enqueue changes nothing already buffered
    #[test]
    fn overflow_leaves_buffered_records_intact(
        records in prop::collection::vec(record_strategy(64), 1..40),
        capacity in (HEADER_LEN + 64)..1024usize,
    ) {
        let queue = FramedQueue::new(QueueCapacity::Bytes(capacity), 64);
        let mut accepted = Vec::new();

        for record in records {
            let before = queue.buffered_bytes();
            let fits = before + HEADER_LEN + record.len() <= capacity;
            let queued = queue.enqueue(&record);
            prop_assert_eq!(queued, fits);
            if queued {
                accepted.push(record);
            } else {
                prop_assert_eq!(queue.buffered_bytes(), before);
            }
            prop_assert!(queue.buffered_bytes() <= capacity);
        }

        for record in &accepted {
            let dequeued = queue.try_dequeue();
            prop_assert_eq!(dequeued.as_ref(), Some(record));
        }
        prop_assert!(queue.is_empty());
    }

    /// Property: one dispatch step delivers everything buffered, once, in order
    #[test]
    fn dispatch_delivers_each_record_once(
        records in prop::collection::vec(record_strategy(32), 0..16),
    ) {
        let queue = Arc::new(FramedQueue::new(QueueCapacity::Records(16), 32));
        let registry = Arc::new(ObserverRegistry::new(2));
        let recorder = Arc::new(RecordingObserver::default());
        registry.register(recorder.clone()).unwrap();
        let dispatcher = Dispatcher::new(Arc::clone(&queue), registry);

        for record in &records {
            prop_assert!(queue.enqueue(record));
        }
        let report = dispatcher.dispatch();

        prop_assert_eq!(report.delivered, records.len());
        prop_assert_eq!(recorder.records(), records);
    }

    /// Property: the scheduled hook delivers everything enqueued, in order
    #[test]
    fn scheduled_hook_delivers_in_order(
        records in prop::collection::vec(record_strategy(32), 1..16),
    ) {
        tokio_test::block_on(async {
            let queue = Arc::new(FramedQueue::new(QueueCapacity::Records(16), 32));
            let registry = Arc::new(ObserverRegistry::new(2));
            let recorder = Arc::new(RecordingObserver::default());
            registry.register(recorder.clone())
                .map_err(|e| TestCaseError::fail(format!("Register failed: {}", e)))?;
            let task = Arc::new(Dispatcher::new(Arc::clone(&queue), registry))
                .spawn(&Handle::current());

            for record in &records {
                prop_assert!(queue.enqueue(record));
                tokio::task::yield_now().await;
            }

            let drained = tokio::time::timeout(Duration::from_secs(5), async {
                while recorder.count() < records.len() {
                    tokio::task::yield_now().await;
                }
            })
            .await;
            task.abort();

            prop_assert!(drained.is_ok());
            prop_assert_eq!(recorder.records(), records);
            Ok(())
        })?;
    }
}
