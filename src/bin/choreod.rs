//! `choreod` – daemon that runs wheel choreography programs against motor
//! and sensor hardware and serves the NDJSON control protocol over TCP.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use choreo::clock::{Clock, SystemClock};
use choreo::config::ChoreoConfig;
use choreo::core::ControlCore;
use choreo::hardware::motors::{MockMotorDriver, MotorDriver};
use choreo::hardware::sensors::{MockSensorSource, SensorBatch, SensorSource};
use choreo::language::SyntaxError;
use choreo::service::{ControlRequest, SaveReport, Service};
use choreo::store::{ProgramLibrary, ProgramStore};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = env::args().skip(1);
    let mut config_path = PathBuf::from("choreo.json");
    let mut listen_override: Option<String> = None;
    let mut mock_hardware = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = match args.next() {
                    Some(path) => path,
                    None => {
                        eprintln!("--config requires a path argument");
                        print_usage();
                        bail!("missing value for --config");
                    }
                };
                config_path = PathBuf::from(path);
            }
            "--listen" => {
                let addr = match args.next() {
                    Some(addr) => addr,
                    None => {
                        eprintln!("--listen requires an address argument");
                        print_usage();
                        bail!("missing value for --listen");
                    }
                };
                listen_override = Some(addr);
            }
            "--mock" => {
                mock_hardware = true;
            }
            "--help" | "-h" => {
                print_usage();
                return Ok(());
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                bail!("invalid command-line argument");
            }
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = ChoreoConfig::load_or_create(&config_path)?;
    if let Some(addr) = listen_override {
        config.listen_addr = addr;
    }
    config.validate()?;

    if !mock_hardware {
        bail!("no physical hardware bindings are compiled in; run with --mock");
    }
    let mut driver: Box<dyn MotorDriver> = Box::new(MockMotorDriver::new());
    let mut sensors: Box<dyn SensorSource> = Box::new(MockSensorSource::new(
        &config.devices,
        config.bits_per_device,
    ));

    driver
        .initialize()
        .context("Failed to initialize motor driver")?;

    let (sensor_tx, sensor_rx) = mpsc::channel(64);
    let readings = sensors
        .start(sensor_tx)
        .context("Failed to start sensor source")?;

    let store = ProgramStore::open(
        &config.data_root.join("programs"),
        &config.default_program_name,
        &config.default_program_code,
    )?;

    let clock = SystemClock;
    let mut core = ControlCore::new(&config);
    let positions = core
        .seed_decoder(&readings, clock.now())
        .context("Failed to seed shaft decoder")?;
    for (device, wheel) in &positions {
        info!(device = %device, position = wheel.position, "wheel position seeded");
    }

    if let Some(program) = store.library().current() {
        match core.load_program(&program.code, clock.now()) {
            Ok(()) => info!(program = %program.name, "current program loaded"),
            Err(errors) => {
                for err in &errors {
                    error!(line = ?err.line, message = %err.message, "program compile error");
                }
            }
        }
    }

    let (control_tx, control_rx) = mpsc::channel(16);
    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!(addr = %listener.local_addr()?, "choreod listening");

    let service = Service::new(control_tx);
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(%peer, "client connected");
                    let service = service.clone();
                    tokio::spawn(async move {
                        let (read_half, write_half) = stream.into_split();
                        if let Err(err) =
                            service.handle(BufReader::new(read_half), write_half).await
                        {
                            debug!(%peer, error = %err, "connection closed with error");
                        }
                    });
                }
                Err(err) => {
                    error!(error = %err, "failed to accept connection");
                }
            }
        }
    });

    run_control_loop(&config, clock, core, store, driver.as_mut(), sensor_rx, control_rx).await;

    driver.stop();
    sensors.stop();
    info!("choreod stopped");
    Ok(())
}

/// The daemon's single writer: every mutation of the core happens here, in
/// one task, whether it came from a timer, the sensors, or a client.
async fn run_control_loop(
    config: &ChoreoConfig,
    clock: SystemClock,
    mut core: ControlCore,
    mut store: ProgramStore,
    driver: &mut dyn MotorDriver,
    mut sensor_rx: mpsc::Receiver<SensorBatch>,
    mut control_rx: mpsc::Receiver<ControlRequest>,
) {
    let mut power_tick = tokio::time::interval(Duration::from_millis(config.apply_power_every_ms));
    let mut program_tick =
        tokio::time::interval(Duration::from_millis(config.step_program_every_ms));

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = power_tick.tick() => {
                core.on_power_tick(clock.now(), driver);
            }
            _ = program_tick.tick() => {
                core.on_program_tick(clock.now());
            }
            Some(batch) = sensor_rx.recv() => {
                core.on_sensor_batch(&batch, clock.now());
            }
            Some(request) = control_rx.recv() => {
                handle_control(request, &mut core, &mut store, clock.now());
            }
            _ = &mut shutdown => {
                info!("shutdown signal received");
                core.stop_all();
                core.on_power_tick(clock.now(), driver);
                break;
            }
        }
    }
}

fn handle_control(
    request: ControlRequest,
    core: &mut ControlCore,
    store: &mut ProgramStore,
    now: DateTime<Utc>,
) {
    match request {
        ControlRequest::Status { reply } => {
            let _ = reply.send(core.status());
        }
        ControlRequest::GetPrograms { reply } => {
            let _ = reply.send(store.library().clone());
        }
        ControlRequest::SavePrograms { library, reply } => {
            let _ = reply.send(save_programs(library, core, store, now));
        }
        ControlRequest::RunProgram { reply } => {
            let _ = reply.send(run_current_program(core, store, now));
        }
        ControlRequest::StopAll { reply } => {
            core.stop_all();
            let _ = reply.send(());
        }
    }
}

fn save_programs(
    library: ProgramLibrary,
    core: &mut ControlCore,
    store: &mut ProgramStore,
    now: DateTime<Utc>,
) -> Result<SaveReport, String> {
    let current_code_changed = store.set_library(library).map_err(|err| err.to_string())?;
    let mut compile_errors = Vec::new();
    if current_code_changed {
        if let Err(errors) = run_current_program(core, store, now) {
            core.unload_program();
            compile_errors = errors;
        }
    }
    Ok(SaveReport {
        current_code_changed,
        compile_errors,
    })
}

fn run_current_program(
    core: &mut ControlCore,
    store: &ProgramStore,
    now: DateTime<Utc>,
) -> Result<(), Vec<SyntaxError>> {
    let Some(program) = store.library().current() else {
        return Err(vec![SyntaxError::new(None, "no program selected")]);
    };
    core.load_program(&program.code, now)
}

fn print_usage() {
    eprintln!(
        "Usage: choreod [--config PATH] [--listen ADDR] [--mock]\n\
         \n\
         Options:\n\
           --config PATH Configuration file (default: choreo.json; created if absent)\n\
           --listen ADDR Listen on TCP ADDR instead of the configured address\n\
           --mock        Run with mock motors and sensors instead of real hardware\n"
    );
}
