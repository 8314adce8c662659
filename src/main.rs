use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;

use fractal_sound::trace::{iterations_per_frame, OrbitTrace};
use fractal_sound::{
    EngineConfig, MapKind, OutputDevice, PacedDevice, Point, RealtimeAudioEngine,
};

/// Status lines printed per second
const STATUS_RATE_HZ: u64 = 4;

#[derive(Parser, Debug)]
#[command(name = "fractal-sound")]
#[command(about = "Play the orbit of an iterated map as stereo audio")]
struct Args {
    /// Map index (0-7) or name
    #[arg(long, default_value = "mandelbrot", value_parser = parse_map)]
    map: MapKind,

    /// Seed point as x,y
    #[arg(long, default_value = "-0.5,0.0", value_parser = parse_point, allow_hyphen_values = true)]
    seed: Point,

    /// External (Julia) parameter point as x,y
    #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
    julia: Option<Point>,

    /// Let the volume decay instead of holding it
    #[arg(long)]
    no_sustain: bool,

    /// Playback duration in seconds
    #[arg(long, default_value_t = 5)]
    seconds: u64,

    /// Engine configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Consume buffers in real time without opening an audio device
    #[arg(long)]
    headless: bool,
}

fn parse_map(value: &str) -> std::result::Result<MapKind, String> {
    MapKind::from_name(value).ok_or_else(|| {
        let names: Vec<&str> = MapKind::ALL.iter().map(|m| m.name()).collect();
        format!("unknown map '{value}' (expected 0-7 or one of: {})", names.join(", "))
    })
}

fn parse_point(value: &str) -> std::result::Result<Point, String> {
    let (x, y) = value
        .split_once(',')
        .ok_or_else(|| format!("expected x,y but got '{value}'"))?;
    let x: f64 = x.trim().parse().map_err(|e| format!("bad x '{x}': {e}"))?;
    let y: f64 = y.trim().parse().map_err(|e| format!("bad y '{y}': {e}"))?;
    Ok(Point::new(x, y))
}

#[cfg(feature = "streaming")]
fn open_device(headless: bool) -> Box<dyn OutputDevice> {
    if headless {
        Box::new(PacedDevice::new())
    } else {
        Box::new(fractal_sound::RodioDevice::new())
    }
}

#[cfg(not(feature = "streaming"))]
fn open_device(headless: bool) -> Box<dyn OutputDevice> {
    if !headless {
        log::warn!("built without the \"streaming\" feature; running headless");
    }
    Box::new(PacedDevice::new())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let mut engine = RealtimeAudioEngine::new(config, open_device(args.headless))
        .context("Invalid engine configuration")?;
    engine.start().context("Failed to start audio engine")?;

    let control = engine.control();
    control.set_sustain(!args.no_sustain);
    control.set_map(args.map, args.julia);
    control.set_target_point(args.seed.x, args.seed.y);

    let settings = control.settings();
    println!(
        "Playing {} from ({:.4}, {:.4}){} for {}s{}",
        settings.map,
        settings.seed.x,
        settings.seed.y,
        settings
            .parameter
            .map(|p| format!(" with parameter ({:.4}, {:.4})", p.x, p.y))
            .unwrap_or_default(),
        args.seconds,
        if settings.sustain { "" } else { ", decaying" }
    );

    let mut trace = OrbitTrace::new(settings.seed);
    let frames_per_status = (config.target_fps as u64 / STATUS_RATE_HZ).max(1) as usize;
    let trace_steps = iterations_per_frame(config.max_frequency, config.target_fps) * frames_per_status;

    let started = Instant::now();
    let deadline = started + Duration::from_secs(args.seconds);
    while Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1000 / STATUS_RATE_HZ));

        let status = control.status();
        let visible = trace
            .points(settings.map, settings.effective_parameter(), config.escape_radius_sq)
            .len();
        if !status.paused {
            trace.advance(
                settings.map,
                settings.effective_parameter(),
                config.escape_radius_sq,
                trace_steps,
            );
        }

        println!(
            "[{:>5.2}s] point ({:+.5}, {:+.5})  volume {:>7.1}  trace {:>3}  {}",
            started.elapsed().as_secs_f32(),
            status.point.x,
            status.point.y,
            status.volume,
            visible,
            if status.paused { "escaped" } else { "playing" }
        );
    }

    engine.stop();

    let stats = engine.stats();
    println!(
        "Callbacks: {}  submitted: {}  errors: {}  skipped: {}  live chunks: {}  silent chunks: {}",
        stats.callbacks,
        stats.submitted,
        stats.submit_errors,
        stats.skipped_slots,
        stats.live_chunks,
        stats.silent_chunks
    );
    Ok(())
}
