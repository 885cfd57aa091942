use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use rolling_stats::Stats;

use beatscope::audio::{
    AudioCapture, AudioSource, SourcePlayer, ToneSource, WavFileSource, list_input_devices,
};
use beatscope::mesh::MemoryDevice;
use beatscope::state::SavedState;
use beatscope::tracker::DirtyQuads;
use beatscope::{
    ListenMode, PhaseProcessor, ScopeConfig, SourceRegistry, SourceShared, ViewWindow,
    WaveformDisplay,
};

#[derive(Parser, Debug)]
#[command(name = "beatscope")]
#[command(about = "Beat-synchronised phase scope (headless)", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Read the local source from a WAV file instead of an input device
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Use the test tone as the local source
    #[arg(long)]
    tone: bool,

    /// Compare against a remote source read from this WAV file
    #[arg(short, long)]
    remote: Option<PathBuf>,

    /// Input device name
    #[arg(long)]
    device: Option<String>,

    #[arg(long)]
    list_devices: bool,

    /// Tempo in BPM (overrides the config file)
    #[arg(short, long)]
    bpm: Option<f64>,

    #[arg(short, long, value_enum)]
    listen_mode: Option<ListenMode>,

    /// Local delay in samples
    #[arg(short, long, default_value_t = 0, allow_hyphen_values = true)]
    delay: i32,

    /// Delay applied to the remote source in samples
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    remote_delay: i32,

    /// Invert the remote source's phase
    #[arg(long)]
    invert_remote: bool,

    /// Restore local parameters from a saved state file
    #[arg(long)]
    load_state: Option<PathBuf>,

    /// Write local parameters to this file on exit
    #[arg(long)]
    save_state: Option<PathBuf>,

    /// Stop after this many seconds
    #[arg(long)]
    duration: Option<f64>,

    /// Seconds between status lines
    #[arg(long, default_value_t = 1.0)]
    status_interval: f64,

    /// Process files as fast as possible instead of in real time
    #[arg(long)]
    fast: bool,

    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

const FRAME_INTERVAL: Duration = Duration::from_millis(33);

enum Input {
    Device { _capture: AudioCapture },
    Player(SourcePlayer),
}

impl Input {
    fn is_finished(&self) -> bool {
        match self {
            Input::Device { .. } => false,
            Input::Player(player) => player.status().is_finished(),
        }
    }
}

fn start_local(
    args: &Args,
    config: &ScopeConfig,
    shared: &Arc<SourceShared>,
) -> anyhow::Result<Input> {
    let processor = PhaseProcessor::new(Arc::clone(shared));
    let bpm = config.capture.bpm;
    let block = config.audio.buffer_size;
    let realtime = !args.fast;

    if let Some(path) = &args.input {
        let source = WavFileSource::new(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        return Ok(Input::Player(SourcePlayer::spawn(
            Box::new(source),
            processor,
            bpm,
            block,
            realtime,
        )));
    }

    if args.tone {
        let tone = ToneSource::new(config.audio.sample_rate);
        return Ok(Input::Player(SourcePlayer::spawn(
            Box::new(tone),
            processor,
            bpm,
            block,
            realtime,
        )));
    }

    let capture = AudioCapture::new(&config.audio, args.device.as_deref(), processor, bpm)?;
    Ok(Input::Device { _capture: capture })
}

fn start_remote(
    args: &Args,
    config: &ScopeConfig,
    shared: &Arc<SourceShared>,
) -> anyhow::Result<Option<SourcePlayer>> {
    let Some(path) = &args.remote else {
        return Ok(None);
    };
    let source: Box<dyn AudioSource> = Box::new(
        WavFileSource::new(path).with_context(|| format!("Failed to open {}", path.display()))?,
    );
    Ok(Some(SourcePlayer::spawn(
        source,
        PhaseProcessor::new(Arc::clone(shared)),
        config.capture.bpm,
        config.audio.buffer_size,
        !args.fast,
    )))
}

fn describe(dirty: DirtyQuads, num_quads: usize) -> String {
    match dirty {
        DirtyQuads::Clean => "clean".to_string(),
        DirtyQuads::Full => "full".to_string(),
        other => format!("{} quads", other.quad_count(num_quads)),
    }
}

fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

fn print_summary(label: &str, stats: &Stats<f32>) {
    if stats.count == 0 {
        return;
    }
    println!(
        "{:<16} mean {:>9.1}  std {:>9.1}  min {:>8.0}  max {:>8.0}  ({} frames)",
        label, stats.mean, stats.std_dev, stats.min, stats.max, stats.count
    );
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .parse_default_env()
        .init();

    if args.list_devices {
        let devices = list_input_devices()?;
        if devices.is_empty() {
            eprintln!("No input devices found.");
        } else {
            for name in &devices {
                println!("{}", name);
            }
        }
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => ScopeConfig::load(path)?,
        None => ScopeConfig::default(),
    };
    if let Some(bpm) = args.bpm {
        config.capture.bpm = bpm;
    }
    if let Some(mode) = args.listen_mode {
        config.capture.listen_mode = mode;
    }
    config.validate()?;

    let mut registry = SourceRegistry::new();
    let local = Arc::new(SourceShared::new(
        config.capture.max_sample_rate,
        config.capture.min_bpm,
    ));
    local.set_listen_mode(config.capture.listen_mode);
    local.set_delay(args.delay);

    let saved = match &args.load_state {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let saved = SavedState::from_json(&text)?;
            saved.apply(&local);
            Some(saved)
        }
        None => None,
    };
    let local_handle = match saved.as_ref().and_then(|s| s.given_name.clone()) {
        Some(name) => registry.add_named(Arc::clone(&local), name),
        None => registry.add(Arc::clone(&local)),
    };

    let remote = args.remote.as_ref().map(|_| {
        Arc::new(SourceShared::new(
            config.capture.max_sample_rate,
            config.capture.min_bpm,
        ))
    });
    let remote_handle = remote.as_ref().map(|remote| {
        remote.set_delay(args.remote_delay);
        remote.set_invert_phase(args.invert_remote);
        remote.set_listen_mode(config.capture.listen_mode);
        registry.add(Arc::clone(remote))
    });

    println!("=== beatscope ===");
    println!("Tempo: {} BPM", config.capture.bpm);
    println!("Listen mode: {}", config.capture.listen_mode);
    for (handle, name, source) in registry.iter() {
        println!(
            "Source {}: {} (delay {}, phase {})",
            handle.index(),
            name,
            source.delay(),
            if source.invert_phase() { "inverted" } else { "normal" }
        );
    }
    println!();

    let input = start_local(&args, &config, &local)?;
    let remote_player = match &remote {
        Some(shared) => start_remote(&args, &config, shared)?,
        None => None,
    };

    let num_quads = config.display.num_quads;
    let mut display = WaveformDisplay::new(&config.display)?;
    display.set_viewport_width(num_quads as f32);
    let mut device = MemoryDevice::new();

    let started = Instant::now();
    let status_interval = Duration::from_secs_f64(args.status_interval.max(0.05));
    let mut last_status = Instant::now();
    let mut first_frame = true;
    let mut bytes_since_status = 0usize;
    let mut quads_per_frame: Stats<f32> = Stats::new();
    let mut bytes_per_frame: Stats<f32> = Stats::new();

    loop {
        let report = display.update(
            &local,
            remote_handle.zip(remote.as_deref()),
            ViewWindow::FULL,
            first_frame,
        );
        first_frame = false;
        let stats = display.submit(&mut device)?;
        bytes_since_status += stats.bytes_uploaded;
        quads_per_frame.update(report.quads_rebuilt as f32);
        bytes_per_frame.update(stats.bytes_uploaded as f32);
        device.clear_log();

        if last_status.elapsed() >= status_interval {
            let beat = local.beat();
            let mut line = format!(
                "{}  capacity {:>6}  cursor {:>6}  local {:>9}  uploaded {:>7} B",
                timestamp(),
                beat.capacity(),
                beat.cursor(),
                describe(report.local, num_quads),
                bytes_since_status
            );
            if let (Some(dirty), Some(shared)) = (report.remote, &remote) {
                line.push_str(&format!(
                    "  remote {:>9}  combined {}",
                    describe(dirty, num_quads),
                    if report.remote_combined {
                        "yes"
                    } else {
                        "capacity mismatch"
                    }
                ));
                let errors = shared.take_errors();
                if !errors.is_empty() {
                    line.push_str(&format!("  remote errors {}", errors));
                }
            }
            let errors = local.take_errors();
            line.push_str(&format!("  errors {}", errors));
            println!("{}", line);

            bytes_since_status = 0;
            last_status = Instant::now();
        }

        if args
            .duration
            .is_some_and(|d| started.elapsed().as_secs_f64() >= d)
        {
            break;
        }
        if input.is_finished() && remote_player.as_ref().is_none_or(|p| p.status().is_finished()) {
            log::info!("All sources finished");
            break;
        }
        thread::sleep(FRAME_INTERVAL);
    }

    display.release(&mut device);
    drop(input);
    drop(remote_player);

    println!();
    print_summary("Quads rebuilt", &quads_per_frame);
    print_summary("Bytes uploaded", &bytes_per_frame);

    if let Some(path) = &args.save_state {
        let name = registry.name(local_handle).ok();
        let state = SavedState::capture(&local, name);
        std::fs::write(path, state.to_json()?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Saved state to {}", path.display());
    }

    Ok(())
}
