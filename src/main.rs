//! Activity Sensor Agent CLI
//!
//! Replays or streams body-tracking events through the activity pipeline.

use activity_sensor_agent::{
    catalog,
    config::Config,
    core::RequirementRegistry,
    geometry::CameraPoint,
    localizer::{load_templates, TemplateLocalizer},
    objects::{ChannelTagSource, ObjectDetector, ObjectTable, TagRead},
    pipeline::{FramePipeline, PipelineEvent},
    record::CsvFileSink,
    stats::{create_shared_log_with_persistence, SessionLog},
    tracking::TrackingEvent,
    VERSION,
};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "activity-sensor")]
#[command(version = VERSION)]
#[command(about = "Infers room activities from body tracking", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the per-user config location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline over tracking events (JSON lines)
    Run {
        /// Event file; reads standard input when omitted
        #[arg(long)]
        frames: Option<PathBuf>,

        /// Tag reads for the object detector (JSON lines)
        #[arg(long)]
        tags: Option<PathBuf>,

        /// Override the records directory
        #[arg(long)]
        records: Option<PathBuf>,

        /// Re-launch the agent when the uptime watchdog fires
        #[arg(long)]
        restart: bool,
    },

    /// List the activity catalogue
    Activities,

    /// Locate furniture templates in a point cloud (JSON array of points)
    Locate {
        #[arg(long)]
        cloud: PathBuf,
    },

    /// Show cumulative statistics
    Status,

    /// Show configuration
    Config {
        /// Write the effective configuration back to disk
        #[arg(long)]
        save: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    let result = load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        Commands::Run {
            frames,
            tags,
            records,
            restart,
        } => cmd_run(config, frames, tags, records, restart),
        Commands::Activities => cmd_activities(&config),
        Commands::Locate { cloud } => cmd_locate(&config, &cloud),
        Commands::Status => cmd_status(&config),
        Commands::Config { save } => cmd_config(&config, cli.config.as_deref(), save),
    });

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    config.context("could not load configuration")
}

fn cmd_run(
    mut config: Config,
    frames: Option<PathBuf>,
    tags: Option<PathBuf>,
    records: Option<PathBuf>,
    restart: bool,
) -> Result<()> {
    println!("Activity Sensor Agent v{VERSION}");
    println!();

    if let Some(records) = records {
        config.records_path = records;
    }
    if let Err(e) = config.ensure_directories() {
        warn!("Could not create directories: {e}");
    }

    let registry = RequirementRegistry::with_builtins();
    let activities = catalog::load_activities(&config.activities_path, &registry)
        .context("could not load the activity catalogue")?;
    println!("  Activities: {}", activities.len());
    println!("  Records: {}", config.records_path.display());

    let stats = create_shared_log_with_persistence(config.data_path.join("session_stats.json"));
    let sink = Box::new(CsvFileSink::new(&config.records_path));
    let mut pipeline = FramePipeline::new(&config, activities, sink).with_stats(stats.clone());
    println!("  Instance ID: {}", stats.instance_id());

    let templates = load_templates(&config.localizer.templates, &config.localizer.template_dir);
    if templates.is_empty() {
        println!("  Template localization: disabled");
    } else {
        println!("  Template localization: {} templates", templates.len());
        pipeline = pipeline.with_localizer(TemplateLocalizer::new(
            config.localizer.clone(),
            config.display,
            config.tilt_degrees,
            templates,
        ));
    }

    // Held until shutdown so the detector's source stays connected.
    let mut _tag_sender = None;
    if let Some(path) = tags {
        let (sender, source) = ChannelTagSource::channel();
        let reads = read_json_lines::<TagRead>(&path)?;
        let queued = ChannelTagSource::replay(&sender, reads);
        debug!("Queued {queued} recorded tag reads");
        _tag_sender = Some(sender);

        let table = ObjectTable::shared(&config.objects.objects);
        let detector = ObjectDetector::new(config.objects.clone(), table, Box::new(source));
        pipeline = pipeline.with_object_detector(detector);
        println!("  Object detection: {} objects", config.objects.objects.len());
    }

    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Could not set Ctrl+C handler: {e}");
    }

    let (sender, receiver) = unbounded();
    spawn_event_reader(frames, sender)?;

    // Timers run on the event clock, advanced by wall time between events.
    let mut clock: Option<(DateTime<Utc>, Instant)> = None;
    let mut restart_due = false;

    while running.load(Ordering::SeqCst) {
        let events = match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => {
                clock = Some((event.timestamp(), Instant::now()));
                pipeline.handle(event)
            }
            Err(RecvTimeoutError::Timeout) => match clock {
                Some((at, seen)) => pipeline.tick(event_clock(at, seen)),
                None => Vec::new(),
            },
            Err(RecvTimeoutError::Disconnected) => {
                info!("Tracking input finished");
                break;
            }
        };

        for event in events {
            report(&event);
            if matches!(event, PipelineEvent::RestartRequested { .. }) && restart {
                restart_due = true;
            }
        }

        if restart_due {
            break;
        }
    }

    println!();
    println!("Stopping...");
    let now = clock.map_or_else(Utc::now, |(at, seen)| event_clock(at, seen));
    for event in pipeline.shutdown(now) {
        report(&event);
    }

    println!();
    println!("{}", stats.summary());

    if restart_due {
        relaunch()?;
    }
    Ok(())
}

fn event_clock(at: DateTime<Utc>, seen: Instant) -> DateTime<Utc> {
    at + chrono::Duration::from_std(seen.elapsed()).unwrap_or_else(|_| chrono::Duration::zero())
}

fn spawn_event_reader(frames: Option<PathBuf>, sender: Sender<TrackingEvent>) -> Result<()> {
    let reader: Box<dyn BufRead + Send> = match frames {
        Some(path) => Box::new(BufReader::new(
            File::open(&path).with_context(|| format!("could not open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    thread::Builder::new()
        .name("tracking-reader".to_string())
        .spawn(move || {
            for (index, line) in reader.lines().enumerate() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("Tracking input failed: {e}");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<TrackingEvent>(&line) {
                    Ok(event) => {
                        if sender.send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Skipping tracking line {}: {e}", index + 1),
                }
            }
        })
        .context("could not spawn the tracking reader")?;

    Ok(())
}

fn read_json_lines<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path).with_context(|| format!("could not open {}", path.display()))?;
    let mut items = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(item) => items.push(item),
            Err(e) => warn!("Skipping {} line {}: {e}", path.display(), index + 1),
        }
    }
    Ok(items)
}

fn report(event: &PipelineEvent) {
    match event {
        PipelineEvent::SensorConnected { at } => {
            println!("[{}] Sensor connected", at.format("%H:%M:%S"))
        }
        PipelineEvent::SensorUnavailable { at } => {
            println!("[{}] Sensor unavailable", at.format("%H:%M:%S"))
        }
        PipelineEvent::SessionStarted { at } => {
            println!("[{}] Recording started", at.format("%H:%M:%S"))
        }
        PipelineEvent::SessionStopped { at } => {
            println!("[{}] Recording stopped", at.format("%H:%M:%S"))
        }
        PipelineEvent::OccurrenceOpened { activity, start } => {
            println!("[{}] {activity} started", start.format("%H:%M:%S"))
        }
        PipelineEvent::OccurrenceClosed(row) => println!(
            "[{}] {} ended ({}s)",
            row.end.format("%H:%M:%S"),
            row.activity,
            row.duration().num_seconds()
        ),
        PipelineEvent::TemplatesLocated(placements) => {
            for p in placements.iter().filter(|p| p.accepted) {
                println!(
                    "  {} at ({:.0}, {:.0}) {}x{}",
                    p.name, p.location.x, p.location.y, p.location.width, p.location.height
                );
            }
        }
        PipelineEvent::RestartRequested { at } => {
            println!("[{}] Restart requested", at.format("%H:%M:%S"))
        }
        PipelineEvent::StopScheduled { .. } | PipelineEvent::StopCancelled { .. } => {}
    }
}

fn relaunch() -> Result<()> {
    let exe = std::env::current_exe().context("could not find the agent executable")?;
    println!("Restarting {}", exe.display());
    std::process::Command::new(exe)
        .args(std::env::args_os().skip(1))
        .spawn()
        .context("could not relaunch the agent")?;
    Ok(())
}

fn cmd_activities(config: &Config) -> Result<()> {
    let registry = RequirementRegistry::with_builtins();
    let activities = catalog::load_activities(&config.activities_path, &registry)?;

    println!("Activities ({})", config.activities_path.display());
    println!("==========");
    if activities.is_empty() {
        println!("  (none)");
    }
    for activity in &activities {
        let area = match &activity.area {
            activity_sensor_agent::AreaSource::Static(r) => {
                format!("({}, {}) {}x{}", r.x, r.y, r.width, r.height)
            }
            activity_sensor_agent::AreaSource::Template(name) => format!("template '{name}'"),
        };
        println!(
            "  {}: {area}, orientation {:#x}, at least {} people",
            activity.name,
            activity.orientations.bits(),
            activity.min_people
        );
        if !activity.postures.is_empty() {
            println!("    postures: {}", activity.postures.join(", "));
        }
        if !activity.objects.is_empty() {
            println!("    objects: {}", activity.object_names().join(", "));
        }
        let requirements = activity.requirement_names();
        if !requirements.is_empty() {
            println!("    requirements: {}", requirements.join(", "));
        }
    }
    Ok(())
}

fn cmd_locate(config: &Config, cloud: &Path) -> Result<()> {
    let content = std::fs::read_to_string(cloud)
        .with_context(|| format!("could not read {}", cloud.display()))?;
    let points: Vec<CameraPoint> =
        serde_json::from_str(&content).context("point cloud is not a JSON array of points")?;

    let templates = load_templates(&config.localizer.templates, &config.localizer.template_dir);
    if templates.is_empty() {
        bail!("no templates could be loaded from {}", config.localizer.template_dir.display());
    }

    let localizer = TemplateLocalizer::new(
        config.localizer.clone(),
        config.display,
        config.tilt_degrees,
        templates,
    );
    let result = localizer.scan_now(&points);

    println!("Height map: {} filled cells", result.filled_cells);
    for p in &result.placements {
        println!(
            "  {}: top-left {:?}, mean error {:.2}, area ({:.0}, {:.0}) {}x{}{}",
            p.name,
            p.top_left,
            p.mean_error,
            p.location.x,
            p.location.y,
            p.location.width,
            p.location.height,
            if p.accepted { "" } else { " (rejected)" }
        );
    }
    Ok(())
}

fn cmd_status(config: &Config) -> Result<()> {
    println!("Activity Sensor Agent Status");
    println!("============================");
    println!();
    println!("Configuration:");
    println!("  Tilt: {} degrees", config.tilt_degrees);
    println!("  Stop interval: {}ms", config.session.stop_interval.as_millis());
    println!("  Activity debounce: {}ms", config.session.activity_debounce.as_millis());
    println!("  Restart after: {}s", config.session.restart_after.as_secs());
    println!("  Records: {}", config.records_path.display());
    println!();

    let stats_path = config.data_path.join("session_stats.json");
    if stats_path.exists() {
        let stats = SessionLog::with_persistence(stats_path).stats();
        println!("Cumulative Statistics:");
        println!("  Frames processed: {}", stats.frames_processed);
        println!("  Person observations: {}", stats.person_observations);
        println!("  Recording sessions: {}", stats.sessions_started);
        println!("  Activity occurrences: {}", stats.occurrences_recorded);
        println!("  Template scans: {}", stats.localizer_scans);
        println!("  Sensor disconnects: {}", stats.sensor_disconnects);
    } else {
        println!("No statistics recorded yet.");
    }
    Ok(())
}

fn cmd_config(config: &Config, path: Option<&Path>, save: bool) -> Result<()> {
    let target = path.map_or_else(Config::config_path, Path::to_path_buf);
    println!("Configuration file: {}", target.display());
    println!();
    println!("{}", serde_json::to_string_pretty(config)?);

    if save {
        config.save_to(&target)?;
        println!();
        println!("Saved.");
    }
    Ok(())
}
