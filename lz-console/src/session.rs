//! One console session: connect, poll, print events, disconnect

use std::io;
use std::time::Duration;

use anyhow::{bail, Context};
use lz_engine::{Radio, RadioConfig, Tuner, TunerConfig};
use lz_protocol::atu::AtuFrame;
use lz_protocol::rig::icom::{address_for_model, DEFAULT_CIV_ADDRESS};
use lz_protocol::PluginRegistry;
use lz_sim::{
    run_virtual_device_task, VirtualDevice, VirtualDeviceCommand, VirtualIcom, VirtualTuner,
};
use serde_json::json;
use tokio::io::DuplexStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::settings::ConsoleSettings;

/// A simulated device running behind a duplex stream
struct Simulation {
    name: &'static str,
    commands: mpsc::Sender<VirtualDeviceCommand>,
    task: JoinHandle<io::Result<()>>,
}

impl Simulation {
    fn spawn<D>(name: &'static str, device: D) -> (DuplexStream, Self)
    where
        D: VirtualDevice + 'static,
    {
        let (host, device_stream) = tokio::io::duplex(1024);
        let (commands, cmd_rx) = mpsc::channel(8);
        let (state_tx, _) = broadcast::channel(16);
        let task = tokio::spawn(run_virtual_device_task(device_stream, device, cmd_rx, state_tx));
        info!("Simulating {}", name);
        (
            host,
            Self {
                name,
                commands,
                task,
            },
        )
    }

    async fn stop(self) {
        let _ = self.commands.send(VirtualDeviceCommand::Shutdown).await;
        match self.task.await {
            Ok(Ok(())) => debug!("Simulated {} stopped", self.name),
            Ok(Err(e)) => warn!("Simulated {} failed: {}", self.name, e),
            Err(e) => warn!("Simulated {} task panicked: {}", self.name, e),
        }
    }
}

fn start_radio(
    config: &RadioConfig,
    registry: &PluginRegistry,
    simulate: bool,
    simulations: &mut Vec<Simulation>,
) -> anyhow::Result<Option<Radio>> {
    if !simulate {
        let radio = Radio::connect(config, registry)
            .with_context(|| format!("Cannot connect radio on {}", config.serial.port))?;
        return Ok(Some(radio));
    }

    let plugin = registry.get(&config.rig)?;
    if plugin.manufacturer() != "Icom" {
        warn!("No simulator for {}, radio skipped", plugin.name());
        return Ok(None);
    }
    let address = address_for_model(plugin.model()).unwrap_or(DEFAULT_CIV_ADDRESS);
    let (link, simulation) = Simulation::spawn("radio", VirtualIcom::with_address("radio", address));
    simulations.push(simulation);
    Ok(Some(Radio::start(plugin, link, &config.engine)))
}

fn start_tuner(
    config: &TunerConfig,
    simulate: bool,
    simulations: &mut Vec<Simulation>,
) -> anyhow::Result<Tuner> {
    if !simulate {
        return Tuner::connect(config)
            .with_context(|| format!("Cannot connect tuner on {}", config.serial.port));
    }
    let (link, simulation) = Simulation::spawn("tuner", VirtualTuner::new("tuner"));
    simulations.push(simulation);
    Ok(Tuner::start(link, &config.engine))
}

/// Next value from an optional subscription, pending forever without one
async fn next_from<T: Clone>(rx: &mut Option<broadcast::Receiver<T>>) -> T {
    loop {
        let Some(receiver) = rx.as_mut() else {
            return std::future::pending::<T>().await;
        };
        match receiver.recv().await {
            Ok(value) => return value,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Console fell behind, {} events skipped", n)
            }
            Err(broadcast::error::RecvError::Closed) => *rx = None,
        }
    }
}

/// Run until Ctrl-C
pub async fn run(settings: ConsoleSettings) -> anyhow::Result<()> {
    let registry = PluginRegistry::builtin();
    let mut simulations = Vec::new();

    let radio = match &settings.radio {
        Some(config) => start_radio(config, &registry, settings.simulate, &mut simulations)?,
        None => None,
    };
    let tuner = match &settings.tuner {
        Some(config) => Some(start_tuner(config, settings.simulate, &mut simulations)?),
        None => None,
    };
    if radio.is_none() && tuner.is_none() {
        bail!("Nothing to do: no radio or tuner configured");
    }

    let mut radio_events = radio.as_ref().map(Radio::subscribe);
    let mut tuner_frames = tuner.as_ref().map(Tuner::subscribe);

    if let Some(tuner) = &tuner {
        tuner.enable_tune_mode();
    }

    let mut poll = interval(Duration::from_millis(settings.poll_interval_ms.max(1)));
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut telemetry = interval(Duration::from_millis(settings.telemetry_interval_ms.max(1)));
    telemetry.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    info!("Session running, Ctrl-C to stop");
    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    warn!("Cannot listen for Ctrl-C: {}", e);
                }
                break;
            }
            _ = poll.tick(), if radio.is_some() => {
                if let Some(radio) = &radio {
                    if radio.is_ready_to_accept_command() {
                        radio.poll();
                    }
                }
            }
            _ = telemetry.tick(), if tuner.is_some() => {
                if let Some(tuner) = &tuner {
                    if tuner.state().tune_mode && tuner.is_ready_to_accept_command() {
                        tuner.request_adc_values();
                    }
                }
            }
            event = next_from(&mut radio_events) => {
                println!("{}", json!({ "device": "radio", "event": event }));
            }
            frame = next_from(&mut tuner_frames) => {
                if let AtuFrame::Telemetry(raw) = frame {
                    println!("{}", json!({ "device": "tuner", "readings": raw.readings() }));
                }
            }
        }
    }

    info!("Shutting down");
    if let Some(tuner) = tuner {
        tuner.disable_tune_mode();
        tuner.disconnect().await;
    }
    if let Some(radio) = radio {
        radio.disconnect().await;
    }
    for simulation in simulations {
        simulation.stop().await;
    }
    Ok(())
}
