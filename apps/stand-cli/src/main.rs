use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use command_compiler::{compile_request_counted, IntentRequest};
use command_transport::{JsonLinesPublisher, JsonLinesSource, SampleSource, TransportError};
use device_registry as devreg;
use sequencer::{RestMode, RunOutcome, SequenceRunner, SequencerConfig, Step};
use telemetry_pipeline::{
    record_file_name, spawn_ingest_worker, BoxedRecorder, PipelineConfig, SnapshotRecorder,
    TelemetryPipeline, WorkerOptions,
};

#[derive(Parser, Debug)]
#[command(
    name = "stand",
    version,
    about = "Test-stand command compiler and telemetry tools",
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Mode {
    Closed,
    Default,
}

impl From<Mode> for RestMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Closed => RestMode::Closed,
            Mode::Default => RestMode::Default,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load and validate a stand config, then summarise it
    Check {
        #[arg(long)]
        config: PathBuf,
    },
    /// Compile one operator intent and print the commands as JSON lines
    Compile {
        #[arg(long)]
        config: PathBuf,
        /// Actuator kind: solenoid, poweredDevice, servo or gpio
        #[arg(long = "type")]
        kind: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        state: String,
        /// Print prometheus metrics to stderr when done
        #[arg(long, action = ArgAction::SetTrue)]
        metrics: bool,
    },
    /// Build (and optionally execute) a plan that drives every actuator to rest
    Rest {
        #[arg(long)]
        config: PathBuf,
        #[arg(long, value_enum, default_value_t = Mode::Closed)]
        mode: Mode,
        /// Publish the plan as JSON lines on stdout, honouring waits
        #[arg(long, action = ArgAction::SetTrue)]
        execute: bool,
        #[arg(long, default_value_t = 2000)]
        settle_ms: u64,
        #[arg(long, default_value_t = 100)]
        spacing_ms: u64,
        /// Print prometheus metrics to stderr when done
        #[arg(long, action = ArgAction::SetTrue)]
        metrics: bool,
    },
    /// Stream sample batches through the telemetry pipeline
    Ingest {
        #[arg(long)]
        config: PathBuf,
        /// JSON-lines batch file, or `-` for stdin
        #[arg(long, default_value = "-")]
        input: String,
        #[arg(long, default_value_t = 100)]
        capacity: usize,
        #[arg(long, default_value_t = 50)]
        rate_window: usize,
        #[arg(long, default_value_t = 256)]
        queue_depth: usize,
        #[arg(long, action = ArgAction::SetTrue)]
        no_calibration: bool,
        /// CSV output file, or a directory to create a dated file in
        #[arg(long)]
        record: Option<PathBuf>,
        /// Print prometheus metrics to stderr when done
        #[arg(long, action = ArgAction::SetTrue)]
        metrics: bool,
    },
    /// Replace a sensor's calibration points and save the config
    Calibrate {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        sensor: String,
        /// Calibration pair as RAW:REFERENCE (repeatable)
        #[arg(long = "point", value_parser = parse_point, required = true)]
        points: Vec<(f64, f64)>,
        #[arg(long)]
        degree: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { config } => check(&config),
        Commands::Compile {
            config,
            kind,
            name,
            state,
            metrics,
        } => compile(&config, kind, name, state, metrics),
        Commands::Rest {
            config,
            mode,
            execute,
            settle_ms,
            spacing_ms,
            metrics,
        } => {
            let cfg = SequencerConfig {
                settle_wait: Duration::from_millis(settle_ms),
                command_spacing: Duration::from_millis(spacing_ms),
            };
            rest(&config, mode.into(), execute, cfg, metrics).await
        }
        Commands::Ingest {
            config,
            input,
            capacity,
            rate_window,
            queue_depth,
            no_calibration,
            record,
            metrics,
        } => {
            let pipeline = PipelineConfig {
                history_capacity: capacity,
                rate_window,
                calibration_enabled: !no_calibration,
            };
            ingest(&config, &input, pipeline, queue_depth, record.as_deref(), metrics).await
        }
        Commands::Calibrate {
            config,
            sensor,
            points,
            degree,
        } => calibrate(&config, &sensor, points, degree),
    }
}

fn setup_tracing() {
    // Best-effort; stdout is reserved for command and snapshot output
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .try_init();
}

fn parse_point(s: &str) -> Result<(f64, f64), String> {
    let (raw, reference) = s
        .split_once(':')
        .ok_or_else(|| format!("expected RAW:REFERENCE, got '{s}'"))?;
    let raw: f64 = raw
        .trim()
        .parse()
        .map_err(|e| format!("bad raw value '{raw}': {e}"))?;
    let reference: f64 = reference
        .trim()
        .parse()
        .map_err(|e| format!("bad reference value '{reference}': {e}"))?;
    Ok((raw, reference))
}

fn check(path: &Path) -> Result<()> {
    let registry = devreg::load_registry_file(path)?;
    let summary = registry.summary();
    println!(
        "sensors={} relays={} servos={} gpios={} calibrated={}",
        summary.sensors, summary.relays, summary.servos, summary.gpios, summary.calibrated_sensors
    );
    for sensor in registry.sensors() {
        let cal = &sensor.calibration;
        if cal.is_identity() {
            println!("{}\t{}\t{}\tuncalibrated", sensor.name, sensor.address, sensor.unit);
        } else {
            println!(
                "{}\t{}\t{}\tdegree={} slope={:.6} intercept={:.6}",
                sensor.name,
                sensor.address,
                sensor.unit,
                cal.degree(),
                cal.slope(),
                cal.intercept()
            );
        }
    }
    for relay in registry.relays() {
        println!("relay\t{}\t{}\t{}", relay.channel, relay.name, relay.polarity);
    }
    for servo in registry.servos() {
        println!(
            "servo\t{}\t{}\topen={} close={}",
            servo.channel, servo.name, servo.open_angle, servo.close_angle
        );
    }
    for gpio in registry.gpios() {
        println!("gpio\t{}\t{}", gpio.pin, gpio.name);
    }
    Ok(())
}

fn compile(path: &Path, kind: String, name: String, state: String, metrics: bool) -> Result<()> {
    let registry = devreg::load_registry_file(path)?;
    let hub = devreg::MetricsHub::new().map_err(|e| anyhow::anyhow!(e))?;
    hub.record_registry(&registry.summary());
    let request = IntentRequest {
        kind: Some(kind),
        name: Some(name),
        state: Some(state),
    };
    let compiled = compile_request_counted(&request, &registry, &hub.stand);
    if metrics {
        eprint!("{}", hub.encode_text());
    }
    let commands = compiled.with_context(|| format!("compiling {request:?}"))?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for command in &commands {
        writeln!(out, "{}", serde_json::to_string(command)?)?;
    }
    Ok(())
}

async fn rest(
    path: &Path,
    mode: RestMode,
    execute: bool,
    cfg: SequencerConfig,
    metrics: bool,
) -> Result<()> {
    let registry = devreg::load_registry_file(path)?;
    let steps = sequencer::all_to_rest_state_with(mode, &registry, &cfg)
        .with_context(|| format!("building {mode:?} rest plan"))?;

    if !execute {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        for step in &steps {
            writeln!(out, "{}", serde_json::to_string(step)?)?;
        }
        return Ok(());
    }

    let commands = steps.iter().filter(|s| matches!(s, Step::Command(_))).count();
    info!(steps = steps.len(), commands, "executing rest plan");
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping at the next step");
            cancel_tx.send_replace(true);
        }
    });

    let publisher = JsonLinesPublisher::new(io::stdout());
    let hub = devreg::MetricsHub::new().map_err(|e| anyhow::anyhow!(e))?;
    hub.record_registry(&registry.summary());
    let report = SequenceRunner::new(cfg)
        .with_metrics(hub.stand.clone())
        .run(steps, publisher, cancel_rx)
        .await;
    if metrics {
        eprint!("{}", hub.encode_text());
    }
    let report = report?;
    match report.outcome {
        RunOutcome::Completed => info!(
            run_id = %report.run_id,
            published = report.commands_published,
            "rest plan completed"
        ),
        RunOutcome::Cancelled { next_step } => warn!(
            run_id = %report.run_id,
            next_step,
            published = report.commands_published,
            "rest plan cancelled"
        ),
    }
    Ok(())
}

async fn ingest(
    path: &Path,
    input: &str,
    config: PipelineConfig,
    queue_depth: usize,
    record: Option<&Path>,
    metrics: bool,
) -> Result<()> {
    let registry = devreg::load_registry_file(path)?;
    let hub = devreg::MetricsHub::new().map_err(|e| anyhow::anyhow!(e))?;
    hub.record_registry(&registry.summary());

    let recorder: Option<BoxedRecorder> = match record {
        Some(target) => {
            let file: Box<dyn Write + Send> = Box::new(BufWriter::new(open_record_file(target)?));
            Some(SnapshotRecorder::new(file, &registry)?)
        }
        None => None,
    };

    let handle = devreg::RegistryHandle::new(registry);
    let pipeline = TelemetryPipeline::new(config).with_metrics(hub.stand.clone());
    let worker = spawn_ingest_worker(
        handle,
        pipeline,
        WorkerOptions {
            queue_depth,
            metrics: Some(hub.stand.clone()),
            recorder,
        },
    );

    let reader: Box<dyn BufRead> = if input == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file = File::open(input).with_context(|| format!("opening {input}"))?;
        Box::new(BufReader::new(file))
    };
    let mut source = JsonLinesSource::new(reader);
    let mut batches = 0u64;
    loop {
        match source.recv(None) {
            Ok(batch) => {
                batches += 1;
                if let Err(e) = worker.sender.try_submit(batch) {
                    warn!(error = %e, batch = batches, "batch not queued");
                }
                tokio::task::yield_now().await;
            }
            Err(TransportError::Closed) => break,
            Err(TransportError::InvalidRecord(msg)) => warn!(%msg, "skipping malformed record"),
            Err(e) => return Err(e).context("reading sample input"),
        }
    }

    let (pipeline, recorder) = worker.shutdown().await?;
    if let Some(recorder) = recorder {
        info!(rows = recorder.rows(), "recording finished");
    }
    info!(batches, "input exhausted");
    println!("{}", serde_json::to_string_pretty(&pipeline.snapshot())?);
    if metrics {
        eprint!("{}", hub.encode_text());
    }
    Ok(())
}

fn open_record_file(target: &Path) -> Result<File> {
    if !target.is_dir() {
        return File::create(target).with_context(|| format!("creating {}", target.display()));
    }
    let now = time::OffsetDateTime::now_utc();
    for index in 0..u32::MAX {
        let candidate = target.join(record_file_name(now, index)?);
        if !candidate.exists() {
            info!(path = %candidate.display(), "recording to");
            return File::create(&candidate)
                .with_context(|| format!("creating {}", candidate.display()));
        }
    }
    bail!("no free recording file name in {}", target.display())
}

fn calibrate(
    path: &Path,
    sensor: &str,
    points: Vec<(f64, f64)>,
    degree: Option<usize>,
) -> Result<()> {
    let mut config = devreg::load_config_file(path)?;
    let handle = devreg::RegistryHandle::new(devreg::DeviceRegistry::load(&config)?);
    let previous = handle
        .current()
        .sensor_by_name(sensor)
        .map(|s| s.degree)
        .with_context(|| format!("sensor '{sensor}' not found"))?;

    let calibration = devreg::Calibration::fit(&points, degree.unwrap_or(previous))
        .with_context(|| format!("fitting {} points for {sensor}", points.len()))?;
    config.set_sensor_calibration(sensor, points, degree)?;
    handle.replace(devreg::DeviceRegistry::load(&config)?);
    devreg::save_config_file(path, &config)?;

    let coefficients: Vec<String> = calibration
        .coefficients()
        .iter()
        .map(|c| format!("{c:.6}"))
        .collect();
    println!("{sensor}: coefficients [{}]", coefficients.join(", "));
    info!(sensor, path = %path.display(), "calibration saved");
    Ok(())
}
