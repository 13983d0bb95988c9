//! Integration tests for the serial engine
//!
//! These tests drive the public facades against simulated devices on an
//! in-memory duplex stream:
//! - Tuner relay commands and telemetry against the virtual tuner
//! - Command queue overflow on the single-slot tuner queue
//! - Icom confirmation and polling against the virtual rig
//! - Kenwood init, reports and unknown frames against a scripted peer
//! - Retry, shutdown and link loss in the engine core

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lz_engine::{EngineOptions, Radio, RadioEvent, Tuner};
use lz_protocol::atu::{AtuCodec, AtuCommand, AtuFrame};
use lz_protocol::rig::{IcomPlugin, KenwoodPlugin};
use lz_protocol::{Confirmation, RadioMode, Transaction, Vfo};
use lz_sim::{
    run_virtual_device_task, ResponseMode, VirtualDevice, VirtualDeviceCommand, VirtualIcom,
    VirtualTuner,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::{broadcast, mpsc};

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;

    pub const WAIT: Duration = Duration::from_secs(2);

    /// Serve a virtual device on one end of a duplex, returning the other end
    pub fn spawn_device<D>(
        device: D,
    ) -> (
        DuplexStream,
        mpsc::Sender<VirtualDeviceCommand>,
        broadcast::Receiver<D::State>,
    )
    where
        D: VirtualDevice + 'static,
    {
        let (host, device_stream) = tokio::io::duplex(1024);
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (state_tx, state_rx) = broadcast::channel(64);
        tokio::spawn(run_virtual_device_task(device_stream, device, cmd_rx, state_tx));
        (host, cmd_tx, state_rx)
    }

    /// Wait for a broadcast value matching `pred`
    pub async fn next_matching<T: Clone>(
        rx: &mut broadcast::Receiver<T>,
        mut pred: impl FnMut(&T) -> bool,
    ) -> T {
        tokio::time::timeout(WAIT, async {
            loop {
                match rx.recv().await {
                    Ok(value) if pred(&value) => return value,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => panic!("channel closed"),
                }
            }
        })
        .await
        .expect("timed out waiting for a matching value")
    }

    /// Poll `cond` until it holds
    pub async fn eventually(mut cond: impl FnMut() -> bool) {
        tokio::time::timeout(WAIT, async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition never held")
    }

    /// Read exactly `len` bytes from the device side of a link
    pub async fn read_bytes(stream: &mut DuplexStream, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        tokio::time::timeout(WAIT, stream.read_exact(&mut buf))
            .await
            .expect("timed out reading")
            .expect("read failed");
        buf
    }
}

use helpers::*;

// ============================================================================
// Tuner
// ============================================================================

#[tokio::test]
async fn test_tuner_relays_reach_device() {
    let (link, _cmd_tx, mut states) = spawn_device(VirtualTuner::new("sim"));
    let tuner = Tuner::start(link, &EngineOptions::tuner());

    assert!(tuner.set_c1(300));
    next_matching(&mut states, |s| s.relays.c == 300).await;

    eventually(|| tuner.is_ready_to_accept_command()).await;
    assert!(tuner.set_l(700));
    eventually(|| tuner.is_ready_to_accept_command()).await;
    assert!(tuner.set_antenna(2));

    let state = next_matching(&mut states, |s| s.relays.antenna == Some(2)).await;
    assert_eq!(state.relays.c, 300);
    assert_eq!(state.relays.l, 700);
    assert_eq!(tuner.state().relays, state.relays);

    tuner.disconnect().await;
}

#[tokio::test]
async fn test_tuner_readings_after_adc_request() {
    let (link, _cmd_tx, mut states) = spawn_device(VirtualTuner::new("sim"));
    let tuner = Tuner::start(link, &EngineOptions::tuner());

    let telemetry = Arc::new(AtomicUsize::new(0));
    let counter = telemetry.clone();
    tuner.add_listener(Arc::new(move |frame: &AtuFrame| {
        if matches!(frame, AtuFrame::Telemetry(_)) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }));

    assert!(!tuner.request_adc_values());
    assert!(tuner.enable_tune_mode());
    next_matching(&mut states, |s| s.tune_mode).await;

    eventually(|| tuner.is_ready_to_accept_command()).await;
    assert!(tuner.request_adc_values());
    eventually(|| tuner.readings().is_some()).await;

    let readings = tuner.readings().unwrap();
    assert!(readings.forward > 0);
    assert!(readings.swr >= 1.0);
    assert_eq!(telemetry.load(Ordering::SeqCst), 1);

    tuner.disconnect().await;
}

#[tokio::test]
async fn test_tuner_queue_overflow_keeps_committed_state() {
    let (link, _cmd_tx, _states) = spawn_device(VirtualTuner::new("sim"));
    let tuner = Tuner::start(link, &EngineOptions::tuner());

    // Nothing has run yet, so the single slot is still taken
    assert!(tuner.set_c1(1));
    assert!(!tuner.is_ready_to_accept_command());
    assert!(!tuner.set_c1(2));
    assert_eq!(tuner.state().relays.c, 1);

    // Same value again is already current
    assert!(tuner.set_c1(1));

    eventually(|| tuner.is_ready_to_accept_command()).await;
    assert!(tuner.set_c1(2));
    assert_eq!(tuner.state().relays.c, 2);

    tuner.disconnect().await;
}

#[tokio::test]
async fn test_tuner_rejects_out_of_range() {
    let (link, _cmd_tx, _states) = spawn_device(VirtualTuner::new("sim"));
    let tuner = Tuner::start(link, &EngineOptions::tuner());

    assert!(!tuner.set_c1(0x1000));
    assert!(!tuner.set_l(0x1000));
    assert!(!tuner.set_antenna(3));
    assert_eq!(tuner.state(), Default::default());

    tuner.disconnect().await;
}

#[tokio::test]
async fn test_tuner_disconnect_flushes_queued_command() {
    let (link, _cmd_tx, mut states) = spawn_device(VirtualTuner::new("sim"));
    let tuner = Tuner::start(link, &EngineOptions::tuner());

    assert!(tuner.set_tune_controls(100, 200, true));
    tuner.disconnect().await;

    let state = next_matching(&mut states, |s| s.relays.c == 100).await;
    assert_eq!(state.relays.l, 200);
    assert!(state.relays.c2_active);
}

// ============================================================================
// Icom
// ============================================================================

#[tokio::test]
async fn test_icom_set_frequency_confirmed() {
    let (link, _cmd_tx, mut states) = spawn_device(VirtualIcom::new("sim"));
    let radio = Radio::start(Arc::new(IcomPlugin::new()), link, &EngineOptions::radio());
    let mut events = radio.subscribe();

    radio.set_frequency(7_012_000, Vfo::Current);

    next_matching(&mut states, |s| s.frequency_hz == 7_012_000).await;
    next_matching(&mut events, |e| {
        *e == RadioEvent::Confirmation {
            confirmation: Confirmation::Positive,
        }
    })
    .await;

    radio.disconnect().await;
}

#[tokio::test]
async fn test_icom_poll_reports_frequency_and_mode() {
    let (link, _cmd_tx, _states) = spawn_device(VirtualIcom::new("sim"));
    let radio = Radio::start(Arc::new(IcomPlugin::new()), link, &EngineOptions::radio());
    let mut events = radio.subscribe();

    radio.poll();

    next_matching(&mut events, |e| {
        *e == RadioEvent::Frequency {
            hz: 14_025_000,
            vfo: Vfo::Current,
        }
    })
    .await;
    next_matching(&mut events, |e| {
        *e == RadioEvent::Mode {
            mode: RadioMode::Cw,
            vfo: Vfo::Current,
        }
    })
    .await;

    radio.disconnect().await;
}

#[tokio::test]
async fn test_icom_transceive_announcement() {
    let mut rig = VirtualIcom::new("sim");
    let announcement = rig.tune_to(3_525_000);
    let (link, cmd_tx, _states) = spawn_device(rig);
    let radio = Radio::start(Arc::new(IcomPlugin::new()), link, &EngineOptions::radio());
    let mut events = radio.subscribe();

    cmd_tx
        .send(VirtualDeviceCommand::Inject(announcement))
        .await
        .unwrap();

    next_matching(&mut events, |e| {
        matches!(e, RadioEvent::Frequency { hz: 3_525_000, .. })
    })
    .await;

    radio.disconnect().await;
}

#[tokio::test]
async fn test_icom_rejection_reported() {
    let (link, cmd_tx, _states) = spawn_device(VirtualIcom::new("sim"));
    cmd_tx
        .send(VirtualDeviceCommand::SetResponseMode(ResponseMode::Reject))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    let radio = Radio::start(Arc::new(IcomPlugin::new()), link, &EngineOptions::radio());
    let mut events = radio.subscribe();

    radio.set_mode(RadioMode::Usb, Vfo::Current);

    next_matching(&mut events, |e| {
        *e == RadioEvent::Confirmation {
            confirmation: Confirmation::Negative,
        }
    })
    .await;

    radio.disconnect().await;
}

// ============================================================================
// Kenwood
// ============================================================================

#[tokio::test]
async fn test_kenwood_init_and_reports() {
    let (link, mut rig) = tokio::io::duplex(1024);
    let radio = Radio::start(Arc::new(KenwoodPlugin::new()), link, &EngineOptions::radio());
    let mut events = radio.subscribe();

    assert_eq!(read_bytes(&mut rig, 4).await, b"AI2;");

    rig.write_all(b"FA00014025000;").await.unwrap();
    next_matching(&mut events, |e| {
        *e == RadioEvent::Frequency {
            hz: 14_025_000,
            vfo: Vfo::A,
        }
    })
    .await;

    rig.write_all(b"PS1;").await.unwrap();
    next_matching(&mut events, |e| {
        *e == RadioEvent::Unsupported {
            data: "PS1;".into(),
        }
    })
    .await;

    radio.set_mode(RadioMode::Cw, Vfo::Current);
    assert_eq!(read_bytes(&mut rig, 4).await, b"MD3;");

    radio.disconnect().await;
}

#[tokio::test]
async fn test_kenwood_frame_split_across_reads() {
    let (link, mut rig) = tokio::io::duplex(1024);
    let radio = Radio::start(Arc::new(KenwoodPlugin::new()), link, &EngineOptions::radio());
    let mut events = radio.subscribe();
    read_bytes(&mut rig, 4).await;

    rig.write_all(b"IF00003530220   ").await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    rig.write_all(b"   019000000030000080;").await.unwrap();

    next_matching(&mut events, |e| *e == RadioEvent::ActiveVfo { vfo: Vfo::A }).await;

    radio.disconnect().await;
}

#[tokio::test]
async fn test_kenwood_disconnect_sends_nothing_extra() {
    let (link, mut rig) = tokio::io::duplex(1024);
    let radio = Radio::start(Arc::new(KenwoodPlugin::new()), link, &EngineOptions::radio());
    read_bytes(&mut rig, 4).await;

    radio.disconnect().await;

    let mut rest = Vec::new();
    rig.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());
}

// ============================================================================
// Engine core
// ============================================================================

mod engine_core {
    use super::*;
    use lz_engine::Engine;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
    use tokio::time::Instant;

    fn tuner_packet() -> Vec<u8> {
        AtuCommand::TuneMode { enabled: true }.encode().to_vec()
    }

    #[tokio::test]
    async fn test_negative_confirmation_retried_until_positive() {
        let (link, mut device) = tokio::io::duplex(1024);
        let engine = Engine::start("test", link, AtuCodec::new(), &EngineOptions::tuner());

        assert!(engine.enqueue(
            Transaction::new(tuner_packet())
                .with_confirmation()
                .with_timeout(Duration::from_millis(500))
                .with_retries(2),
        ));

        assert_eq!(read_bytes(&mut device, 7).await, tuner_packet());
        device
            .write_all(&AtuFrame::NegativeConfirmation.encode())
            .await
            .unwrap();

        assert_eq!(read_bytes(&mut device, 7).await, tuner_packet());
        device
            .write_all(&AtuFrame::PositiveConfirmation.encode())
            .await
            .unwrap();

        let mut extra = [0u8; 1];
        let third = tokio::time::timeout(Duration::from_millis(100), device.read(&mut extra)).await;
        assert!(third.is_err(), "no third attempt after a positive confirmation");

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_silent_device_exhausts_retries() {
        let (link, cmd_tx, mut states) = spawn_device(VirtualTuner::new("sim"));
        cmd_tx
            .send(VirtualDeviceCommand::SetResponseMode(ResponseMode::Silent))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let engine = Engine::start("test", link, AtuCodec::new(), &EngineOptions::tuner());

        assert!(engine.enqueue(
            Transaction::new(tuner_packet())
                .with_confirmation()
                .with_timeout(Duration::from_millis(20))
                .with_retries(2),
        ));

        next_matching(&mut states, |s| s.commands_received == 3).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(states.try_recv().is_err(), "no attempts beyond the retry budget");

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_confirmation_wait() {
        let (link, mut device) = tokio::io::duplex(1024);
        let engine = Engine::start("test", link, AtuCodec::new(), &EngineOptions::tuner());

        assert!(engine.enqueue(
            Transaction::new(tuner_packet())
                .with_confirmation()
                .with_timeout(Duration::from_secs(10)),
        ));
        read_bytes(&mut device, 7).await;

        let started = Instant::now();
        tokio::time::timeout(Duration::from_secs(1), engine.shutdown())
            .await
            .expect("shutdown blocked on the pending wait");
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_link_loss_marks_disconnected() {
        let (link, device) = tokio::io::duplex(1024);
        let engine = Engine::<AtuFrame>::start("test", link, AtuCodec::new(), &EngineOptions::tuner());
        assert!(engine.is_connected());

        drop(device);
        eventually(|| !engine.is_connected()).await;
        assert!(!engine.enqueue(Transaction::new(tuner_packet())));

        engine.shutdown().await;
    }

    /// A link whose first read fails, then behaves like the wrapped stream
    struct FlakyLink {
        inner: DuplexStream,
        failed: bool,
    }

    impl AsyncRead for FlakyLink {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if !self.failed {
                self.failed = true;
                return Poll::Ready(Err(io::Error::other("framing error")));
            }
            Pin::new(&mut self.inner).poll_read(cx, buf)
        }
    }

    impl AsyncWrite for FlakyLink {
        fn poll_write(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Pin::new(&mut self.inner).poll_write(cx, buf)
        }

        fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_flush(cx)
        }

        fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_shutdown(cx)
        }
    }

    #[tokio::test]
    async fn test_read_error_keeps_engine_running() {
        let (inner, mut device) = tokio::io::duplex(1024);
        let link = FlakyLink {
            inner,
            failed: false,
        };
        let engine = Engine::start("test", link, AtuCodec::new(), &EngineOptions::tuner());
        let mut frames = engine.subscribe();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(engine.is_connected());

        device
            .write_all(&AtuFrame::PositiveConfirmation.encode())
            .await
            .unwrap();
        next_matching(&mut frames, |f| *f == AtuFrame::PositiveConfirmation).await;

        assert!(engine.enqueue(Transaction::new(tuner_packet())));
        assert_eq!(read_bytes(&mut device, 7).await, tuner_packet());

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_garbage_does_not_block_frames() {
        let (link, mut device) = tokio::io::duplex(4096);
        let options = EngineOptions {
            garbage_limit: 16,
            ..EngineOptions::tuner()
        };
        let engine = Engine::start("test", link, AtuCodec::new(), &options);
        let mut frames = engine.subscribe();

        device.write_all(&[0x55; 64]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        device
            .write_all(&AtuFrame::PositiveConfirmation.encode())
            .await
            .unwrap();

        next_matching(&mut frames, |f| *f == AtuFrame::PositiveConfirmation).await;

        engine.shutdown().await;
    }
}

// ============================================================================
// Property-based tests
// ============================================================================

mod proptest_tests {
    use super::*;
    use lz_engine::{CatCodec, ReceiveAssembler};
    use lz_protocol::atu::RawTelemetry;
    use proptest::prelude::*;

    fn kenwood_frame() -> impl Strategy<Value = String> {
        prop_oneof![
            (0u64..60_000_000).prop_map(|hz| format!("FA{:011};", hz)),
            (0u64..60_000_000).prop_map(|hz| format!("FB{:011};", hz)),
            prop::sample::select(vec!["MD1;", "MD2;", "MD3;", "FR0;", "FR1;", "PS1;"])
                .prop_map(str::to_string),
        ]
    }

    fn decode_in_chunks(stream: &[u8], chunk: usize) -> Vec<RadioEvent> {
        let mut assembler = ReceiveAssembler::new(CatCodec::new(Arc::new(KenwoodPlugin::new())));
        stream
            .chunks(chunk)
            .flat_map(|part| assembler.on_bytes_received(part))
            .collect()
    }

    fn atu_frame() -> impl Strategy<Value = AtuFrame> {
        prop_oneof![
            Just(AtuFrame::PositiveConfirmation),
            Just(AtuFrame::NegativeConfirmation),
            (any::<u16>(), any::<u16>(), any::<u16>(), any::<u16>()).prop_map(
                |(forward, backward, antenna, supply)| {
                    AtuFrame::Telemetry(RawTelemetry {
                        forward,
                        backward,
                        antenna,
                        supply,
                    })
                }
            ),
        ]
    }

    /// Line noise between frames, never containing a marker byte
    fn noise() -> impl Strategy<Value = Vec<u8>> {
        proptest::collection::vec(0u8..0xFE, 0..8)
    }

    fn decode_atu_in_chunks(stream: &[u8], chunk: usize) -> Vec<AtuFrame> {
        let mut assembler = ReceiveAssembler::new(AtuCodec::new());
        stream
            .chunks(chunk)
            .flat_map(|part| assembler.on_bytes_received(part))
            .collect()
    }

    proptest! {
        #[test]
        fn tuner_read_boundaries_do_not_change_frames(
            parts in proptest::collection::vec((noise(), atu_frame()), 1..12),
            chunk in 1usize..16,
        ) {
            let mut stream = Vec::new();
            for (garbage, frame) in &parts {
                stream.extend_from_slice(garbage);
                stream.extend(frame.encode());
            }
            let expected: Vec<AtuFrame> = parts.iter().map(|(_, frame)| *frame).collect();

            prop_assert_eq!(decode_atu_in_chunks(&stream, stream.len()), expected.clone());
            prop_assert_eq!(decode_atu_in_chunks(&stream, chunk), expected);
        }

        #[test]
        fn read_boundaries_do_not_change_events(
            frames in proptest::collection::vec(kenwood_frame(), 1..10),
            chunk in 1usize..16,
        ) {
            let stream = frames.concat().into_bytes();
            let whole = decode_in_chunks(&stream, stream.len());
            prop_assert_eq!(whole.len(), frames.len());
            prop_assert_eq!(decode_in_chunks(&stream, chunk), whole);
        }
    }
}
