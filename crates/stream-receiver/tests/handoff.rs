use std::collections::{HashSet, VecDeque};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use bytes::Bytes;
use stream_receiver::{
    AccessUnit, AuOutcome, AuSyncType, ClockSample, DecoderBuffer, DiscardReason, ListenerFns,
    LocalClock, ReceiverConfig, ReceiverError, ReceiverState, SlotIndex, StreamReceiver,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    ConfigReady(Vec<u8>, Vec<u8>),
    BufferReady(usize, ClockSample, AuSyncType),
}

struct StepClock(Arc<Mutex<u64>>);

impl LocalClock for StepClock {
    fn now_us(&self) -> u64 {
        let mut t = self.0.lock().unwrap();
        *t += 1_000;
        *t
    }
}

/// Listener that answers `get_free_buffer` from a scripted list of sentinel
/// values and records every other call.
fn scripted(pool_size: usize, answers: Vec<i32>) -> (ListenerFns, Arc<Mutex<Vec<Call>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut answers = VecDeque::from(answers);

    let config_calls = Arc::clone(&calls);
    let ready_calls = Arc::clone(&calls);
    let listener = ListenerFns::with_sentinel(
        move |sps, pps| {
            config_calls
                .lock()
                .unwrap()
                .push(Call::ConfigReady(sps.to_vec(), pps.to_vec()));
            (0..pool_size).map(|_| DecoderBuffer::with_capacity(1024)).collect()
        },
        move || answers.pop_front().unwrap_or(-1),
        move |slot, sample, sync| {
            ready_calls
                .lock()
                .unwrap()
                .push(Call::BufferReady(slot.get(), sample, sync))
        },
    );
    (listener, calls)
}

fn receiver(listener: ListenerFns) -> StreamReceiver {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    StreamReceiver::with_clock(
        ReceiverConfig::default(),
        Box::new(listener),
        Box::new(StepClock(Arc::new(Mutex::new(0)))),
    )
}

fn config_calls(calls: &Arc<Mutex<Vec<Call>>>) -> usize {
    calls
        .lock()
        .unwrap()
        .iter()
        .filter(|c| matches!(c, Call::ConfigReady(..)))
        .count()
}

fn configure(rx: &mut StreamReceiver) -> Result<ReceiverState, ReceiverError> {
    rx.submit_parameter_sets(
        Some(Bytes::from_static(&[0x67])),
        Some(Bytes::from_static(&[0x68])),
    )
}

fn au(ts: u32) -> AccessUnit {
    AccessUnit::new(Bytes::from_static(&[0x00, 0x00, 0x00, 0x01, 0x41, 0x9A]), ts)
}

#[test]
fn test_two_slot_pool_scenario() {
    let (listener, calls) = scripted(2, vec![0, 1, -1]);
    let mut rx = receiver(listener);

    let state = rx
        .submit_parameter_sets(
            Some(Bytes::from_static(&[0x01, 0x02])),
            Some(Bytes::from_static(&[0x03])),
        )
        .unwrap();
    assert_eq!(state, ReceiverState::Ready);
    assert_eq!(rx.pool().unwrap().size(), 2);

    let outcomes: Vec<AuOutcome> = [0u32, 3000, 6000]
        .into_iter()
        .map(|ts| rx.submit_access_unit(au(ts)).unwrap())
        .collect();
    assert!(matches!(outcomes[0], AuOutcome::Delivered { .. }));
    assert!(matches!(outcomes[1], AuOutcome::Delivered { .. }));
    assert_eq!(outcomes[2], AuOutcome::Dropped);
    assert_eq!(rx.stats().dropped_au_count, 1);

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0], Call::ConfigReady(vec![0x01, 0x02], vec![0x03]));
    match (&calls[1], &calls[2]) {
        (Call::BufferReady(0, first, _), Call::BufferReady(1, second, _)) => {
            assert!(first.rtp_extended_timestamp < second.rtp_extended_timestamp);
            assert!(first.local_timestamp < second.local_timestamp);
        }
        other => panic!("unexpected calls: {:?}", other),
    }
}

#[test]
fn test_gate_fires_once_for_any_submission_order() {
    let sps = || Some(Bytes::from_static(&[0x67, 0x42]));
    let pps = || Some(Bytes::from_static(&[0x68]));
    let empty = || Some(Bytes::new());

    let sequences: Vec<Vec<(Option<Bytes>, Option<Bytes>)>> = vec![
        vec![(sps(), None), (None, pps()), (sps(), pps())],
        vec![(None, pps()), (sps(), None), (None, pps())],
        vec![(sps(), empty()), (None, None), (sps(), pps()), (sps(), pps())],
        vec![(empty(), empty()), (None, pps()), (None, pps()), (sps(), None)],
    ];

    for steps in sequences {
        let (listener, calls) = scripted(1, vec![]);
        let mut rx = receiver(listener);
        for (s, p) in steps {
            let _ = rx.submit_parameter_sets(s, p);
        }
        assert_eq!(config_calls(&calls), 1);
        assert_eq!(rx.state(), ReceiverState::Ready);
    }
}

#[test]
fn test_gate_never_fires_without_both_sets() {
    let (listener, calls) = scripted(1, vec![]);
    let mut rx = receiver(listener);

    assert_eq!(
        rx.submit_parameter_sets(Some(Bytes::from_static(&[0x67])), None),
        Ok(ReceiverState::AwaitingConfig)
    );
    assert_eq!(
        rx.submit_parameter_sets(None, Some(Bytes::new())),
        Err(ReceiverError::InvalidParameter { kind: "PPS", len: 0 })
    );
    assert_eq!(rx.state(), ReceiverState::AwaitingConfig);
    assert_eq!(config_calls(&calls), 0);
}

#[test]
fn test_busy_slot_never_reissued_before_release() {
    // the decoder side misbehaves and offers slot 0 twice in a row
    let (listener, calls) = scripted(2, vec![0, 0, 1, 0]);
    let mut rx = receiver(listener);
    configure(&mut rx).unwrap();
    let releaser = rx.releaser().unwrap();

    assert!(matches!(rx.submit_access_unit(au(0)), Ok(AuOutcome::Delivered { .. })));
    assert_eq!(rx.submit_access_unit(au(3000)), Ok(AuOutcome::Dropped));
    assert!(matches!(rx.submit_access_unit(au(6000)), Ok(AuOutcome::Delivered { .. })));

    releaser.release(SlotIndex::new(0)).unwrap();
    let outcome = rx.submit_access_unit(au(9000)).unwrap();
    assert!(matches!(outcome, AuOutcome::Delivered { slot, .. } if slot == SlotIndex::new(0)));

    let slots: Vec<usize> = calls
        .lock()
        .unwrap()
        .iter()
        .filter_map(|c| match c {
            Call::BufferReady(slot, ..) => Some(*slot),
            _ => None,
        })
        .collect();
    assert_eq!(slots, vec![0, 1, 0]);
}

#[test]
fn test_drop_is_reflected_in_next_delivery() {
    let (listener, calls) = scripted(2, vec![0, -1, 1]);
    let mut rx = receiver(listener);
    configure(&mut rx).unwrap();

    rx.submit_access_unit(au(0).with_sync(true)).unwrap();
    let before = rx.stats().dropped_au_count;
    assert_eq!(rx.submit_access_unit(au(3000)), Ok(AuOutcome::Dropped));
    assert_eq!(rx.stats().dropped_au_count, before + 1);
    rx.submit_access_unit(au(6000)).unwrap();

    let syncs: Vec<AuSyncType> = calls
        .lock()
        .unwrap()
        .iter()
        .filter_map(|c| match c {
            Call::BufferReady(_, _, sync) => Some(*sync),
            _ => None,
        })
        .collect();
    assert_eq!(syncs, vec![AuSyncType::Sync, AuSyncType::NonSyncFrameLost]);
}

#[test]
fn test_delivered_timestamps_strictly_increase_across_wrap() {
    let answers: Vec<i32> = (0..8).map(|i| i % 4).collect();
    let (listener, calls) = scripted(4, answers);
    let mut rx = receiver(listener);
    configure(&mut rx).unwrap();
    let releaser = rx.releaser().unwrap();

    let mut ts = u32::MAX - 3 * 3000;
    for i in 0..8 {
        if i >= 4 {
            releaser.release(SlotIndex::new(i % 4)).unwrap();
        }
        rx.submit_access_unit(au(ts)).unwrap();
        ts = ts.wrapping_add(3000);
    }

    let stamps: Vec<u64> = calls
        .lock()
        .unwrap()
        .iter()
        .filter_map(|c| match c {
            Call::BufferReady(_, sample, _) => Some(sample.rtp_extended_timestamp),
            _ => None,
        })
        .collect();
    assert_eq!(stamps.len(), 8);
    assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    assert!(stamps[7] > u32::MAX as u64);
}

#[test]
fn test_halted_receiver_is_silent() {
    let (listener, calls) = scripted(2, vec![0, 1]);
    let mut rx = receiver(listener);

    assert_eq!(rx.submit_access_unit(au(0)), Err(ReceiverError::NotConfigured));
    assert_eq!(rx.state(), ReceiverState::Halted);

    assert_eq!(
        configure(&mut rx),
        Ok(ReceiverState::Halted)
    );
    assert_eq!(rx.submit_access_unit(au(3000)), Ok(AuOutcome::Ignored));
    assert!(calls.lock().unwrap().is_empty());
}

#[test]
fn test_no_decoder_buffers_halts() {
    let (listener, calls) = scripted(0, vec![0]);
    let mut rx = receiver(listener);

    assert_eq!(
        configure(&mut rx),
        Err(ReceiverError::NoDecoderBuffers)
    );
    assert!(rx.is_halted());
    assert_eq!(rx.submit_access_unit(au(0)), Ok(AuOutcome::Ignored));
    assert_eq!(config_calls(&calls), 1);
    assert_eq!(calls.lock().unwrap().len(), 1);
}

#[test]
fn test_release_from_decoder_thread() {
    const POOL: usize = 3;
    const FRAMES: u32 = 200;

    let free: Arc<Mutex<VecDeque<usize>>> = Arc::default();
    let (ready_tx, ready_rx) = mpsc::channel::<usize>();

    let free_cfg = Arc::clone(&free);
    let free_get = Arc::clone(&free);
    let listener = ListenerFns::new(
        move |_, _| {
            free_cfg.lock().unwrap().extend(0..POOL);
            (0..POOL).map(|_| DecoderBuffer::with_capacity(64)).collect()
        },
        move || free_get.lock().unwrap().pop_front().map(SlotIndex::new),
        move |slot, _, _| {
            let _ = ready_tx.send(slot.get());
        },
    );

    let mut rx = receiver(listener);
    configure(&mut rx).unwrap();
    let releaser = rx.releaser().unwrap();

    let decoder_free = Arc::clone(&free);
    let decoder = thread::spawn(move || {
        let mut seen = 0usize;
        for slot in ready_rx {
            releaser.release(SlotIndex::new(slot)).unwrap();
            decoder_free.lock().unwrap().push_back(slot);
            seen += 1;
        }
        seen
    });

    let mut outstanding = HashSet::new();
    for i in 0..FRAMES {
        if let AuOutcome::Delivered { slot, .. } = rx.submit_access_unit(au(i * 3000)).unwrap() {
            outstanding.insert(slot);
        }
        let pool = rx.pool().unwrap();
        assert!(pool.busy_count() <= POOL);
    }

    let stats = rx.stats();
    assert_eq!(stats.output_au_count + stats.dropped_au_count, FRAMES as u64);
    assert!(stats.output_au_count >= POOL as u64);

    drop(rx);
    let seen = decoder.join().unwrap();
    assert_eq!(seen as u64, stats.output_au_count);
    assert!(!outstanding.is_empty());
}

#[test]
fn test_oversize_au_keeps_consumer_slot_in_circulation() {
    let free: Arc<Mutex<VecDeque<usize>>> = Arc::default();
    let ready: Arc<Mutex<Vec<usize>>> = Arc::default();

    let free_cfg = Arc::clone(&free);
    let free_get = Arc::clone(&free);
    let ready_cb = Arc::clone(&ready);
    let listener = ListenerFns::new(
        move |_, _| {
            free_cfg.lock().unwrap().push_back(0);
            vec![DecoderBuffer::with_capacity(4)]
        },
        move || free_get.lock().unwrap().pop_front().map(SlotIndex::new),
        move |slot, _, _| ready_cb.lock().unwrap().push(slot.get()),
    );
    let mut rx = receiver(listener);
    configure(&mut rx).unwrap();
    let releaser = rx.releaser().unwrap();

    let big = AccessUnit::new(Bytes::from_static(&[0x41; 16]), 0);
    assert_eq!(
        rx.submit_access_unit(big),
        Ok(AuOutcome::Discarded(DiscardReason::Oversize))
    );

    for i in 1..4u32 {
        let small = AccessUnit::new(Bytes::from_static(&[0x41]), i * 3000);
        let outcome = rx.submit_access_unit(small).unwrap();
        assert!(matches!(outcome, AuOutcome::Delivered { .. }), "au {i}: {outcome:?}");

        // decoder consumes the slot and hands it back
        let slot = ready.lock().unwrap().pop().unwrap();
        releaser.release(SlotIndex::new(slot)).unwrap();
        free.lock().unwrap().push_back(slot);
    }
    assert_eq!(rx.stats().dropped_au_count, 0);
    assert_eq!(rx.stats().output_au_count, 3);
}
