//! Virtual device actor task
//!
//! Owns a [`VirtualDevice`] and serves it over an async stream. The task's
//! select loop:
//! - reads host bytes from the stream and writes the device's replies
//! - handles control commands from a channel
//! - emits state snapshots via a broadcast channel when the device changes

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::{ResponseMode, VirtualDevice};

/// Commands that can be sent to a virtual device actor
#[derive(Debug, Clone)]
pub enum VirtualDeviceCommand {
    /// Change how the device answers
    SetResponseMode(ResponseMode),
    /// Send bytes to the host unprompted, e.g. a transceive frame
    Inject(Vec<u8>),
    /// Stop the actor
    Shutdown,
}

/// Run the virtual device actor task
///
/// Returns when the stream closes, on [`VirtualDeviceCommand::Shutdown`], or
/// when every command sender is dropped.
pub async fn run_virtual_device_task<S, D>(
    mut stream: S,
    mut device: D,
    mut cmd_rx: mpsc::Receiver<VirtualDeviceCommand>,
    state_tx: broadcast::Sender<D::State>,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    D: VirtualDevice,
{
    let mut buf = [0u8; 1024];
    info!("Starting virtual device task for {}", device.id());

    let mut last_state = device.state();
    let _ = state_tx.send(last_state.clone());

    loop {
        tokio::select! {
            result = stream.read(&mut buf) => {
                match result {
                    Ok(0) => {
                        debug!("Virtual device stream closed for {}", device.id());
                        break;
                    }
                    Ok(n) => {
                        let data = &buf[..n];
                        debug!(
                            "Virtual device {} received {} bytes: {:02X?}",
                            device.id(), n, data
                        );

                        let reply = device.process_bytes(data);
                        if !reply.is_empty() {
                            debug!("Virtual device {} replies {:02X?}", device.id(), reply);
                            stream.write_all(&reply).await?;
                            stream.flush().await?;
                        }

                        let state = device.state();
                        if state != last_state {
                            debug!("Virtual device {} state changed: {:?}", device.id(), state);
                            let _ = state_tx.send(state.clone());
                            last_state = state;
                        }
                    }
                    Err(e) => {
                        warn!("Virtual device {} stream error: {}", device.id(), e);
                        return Err(e);
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(VirtualDeviceCommand::SetResponseMode(mode)) => {
                        info!("Virtual device {} response mode set to {:?}", device.id(), mode);
                        device.set_response_mode(mode);
                    }
                    Some(VirtualDeviceCommand::Inject(bytes)) => {
                        debug!("Virtual device {} sends unprompted {:02X?}", device.id(), bytes);
                        stream.write_all(&bytes).await?;
                        stream.flush().await?;
                    }
                    Some(VirtualDeviceCommand::Shutdown) => {
                        info!("Shutdown requested for virtual device {}", device.id());
                        break;
                    }
                    None => {
                        debug!("Command channel closed for virtual device {}", device.id());
                        break;
                    }
                }
            }
        }
    }

    info!("Virtual device task ended for {}", device.id());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{VirtualIcom, VirtualTuner};
    use lz_protocol::atu::{AtuCommand, AtuFrame};
    use std::time::Duration;

    #[tokio::test]
    async fn test_tuner_task_replies_and_emits_state() {
        let (mut host, device_stream) = tokio::io::duplex(1024);
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (state_tx, mut state_rx) = broadcast::channel(8);

        let task = tokio::spawn(run_virtual_device_task(
            device_stream,
            VirtualTuner::new("test"),
            cmd_rx,
            state_tx,
        ));

        let initial = state_rx.recv().await.unwrap();
        assert!(!initial.tune_mode);

        host.write_all(&AtuCommand::TuneMode { enabled: true }.encode())
            .await
            .unwrap();

        let mut reply = [0u8; 3];
        tokio::time::timeout(Duration::from_millis(100), host.read_exact(&mut reply))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.to_vec(), AtuFrame::PositiveConfirmation.encode());

        let state = tokio::time::timeout(Duration::from_millis(100), state_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(state.tune_mode);

        drop(cmd_tx);
        let _ = task.await;
    }

    #[tokio::test]
    async fn test_inject_reaches_host() {
        let (mut host, device_stream) = tokio::io::duplex(1024);
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (state_tx, _state_rx) = broadcast::channel(8);

        let mut rig = VirtualIcom::new("test");
        let announcement = rig.tune_to(7_030_000);
        let task = tokio::spawn(run_virtual_device_task(device_stream, rig, cmd_rx, state_tx));

        cmd_tx
            .send(VirtualDeviceCommand::Inject(announcement.clone()))
            .await
            .unwrap();
        let mut received = vec![0u8; announcement.len()];
        tokio::time::timeout(Duration::from_millis(100), host.read_exact(&mut received))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, announcement);

        cmd_tx.send(VirtualDeviceCommand::Shutdown).await.unwrap();
        let result = tokio::time::timeout(Duration::from_millis(100), task)
            .await
            .unwrap();
        assert!(result.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_stream_close_ends_task() {
        let (host, device_stream) = tokio::io::duplex(64);
        let (_cmd_tx, cmd_rx) = mpsc::channel(8);
        let (state_tx, _state_rx) = broadcast::channel(8);

        let task = tokio::spawn(run_virtual_device_task(
            device_stream,
            VirtualTuner::new("test"),
            cmd_rx,
            state_tx,
        ));
        drop(host);

        let result = tokio::time::timeout(Duration::from_millis(100), task)
            .await
            .unwrap();
        assert!(result.unwrap().is_ok());
    }
}
