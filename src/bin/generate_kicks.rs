use anyhow::{Context, Result};
use beatscope::save_wav;
use beatscope::simulation::{
    ClickConfig, HissConfig, HumConfig, KickConfig, NoiseConfig, apply_noise, estimate_offset,
    generate_kick_pair,
};
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "generate_kicks")]
#[command(about = "Generate pairs of kick drum WAV files with a known offset between them")]
struct Args {
    /// TOML kick and noise configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output directory
    #[arg(short, long, default_value = "data/kicks")]
    output_dir: PathBuf,

    /// Offsets in samples: comma-separated (e.g., "0,40,-120") or range
    /// (e.g., "-200:200:50")
    #[arg(long, default_value = "0,40,-120", allow_hyphen_values = true)]
    offsets: String,

    /// Tempo in BPM
    #[arg(short, long, default_value_t = 120.0)]
    bpm: f32,

    /// Base seed for reproducibility
    #[arg(short, long)]
    seed: Option<u64>,

    /// Signal duration in seconds
    #[arg(short, long, default_value_t = 4.0)]
    duration: f32,

    /// Sample rate in Hz
    #[arg(long, default_value_t = 48000)]
    sample_rate: u32,

    /// Output filename prefix
    #[arg(long, default_value = "kick")]
    prefix: String,

    /// Generate manifest.json
    #[arg(long)]
    manifest: bool,

    /// Hiss SNR in dB (CLI override)
    #[arg(long)]
    snr: Option<f32>,

    /// Mean clicks per second (CLI override)
    #[arg(long)]
    click_rate: Option<f32>,

    /// Mains hum frequency in Hz (CLI override)
    #[arg(long)]
    hum: Option<f32>,

    /// Hum level relative to the kick track in dB
    #[arg(long, default_value_t = -30.0, allow_hyphen_values = true)]
    hum_level: f32,
}

#[derive(Debug, Deserialize, Default)]
struct TomlConfig {
    kick: Option<KickConfig>,
    hiss: Option<HissConfig>,
    clicks: Option<ClickConfig>,
    hum: Option<HumConfig>,
}

#[derive(Debug, serde::Serialize)]
struct ManifestEntry {
    local: String,
    remote: String,
    offset: i64,
    measured_offset: i64,
    seed: u64,
}

#[derive(Debug, serde::Serialize)]
struct Manifest {
    sample_rate: u32,
    bpm: f32,
    duration: f32,
    pairs: Vec<ManifestEntry>,
}

fn parse_offsets(s: &str) -> Result<Vec<i64>> {
    let parts: Vec<&str> = s.split(':').collect();
    match parts.len() {
        1 => s
            .split(',')
            .map(|p| p.trim().parse::<i64>().context("Invalid offset value"))
            .collect(),
        3 => {
            let start: i64 = parts[0].trim().parse().context("Invalid start value")?;
            let end: i64 = parts[1].trim().parse().context("Invalid end value")?;
            let step: i64 = parts[2].trim().parse().context("Invalid step value")?;
            if step <= 0 {
                anyhow::bail!("Step must be positive");
            }
            Ok((start..=end).step_by(step as usize).collect())
        }
        _ => anyhow::bail!("Invalid range format. Use 'start:end:step'"),
    }
}

fn load_toml_config(path: &PathBuf) -> Result<TomlConfig> {
    let content = fs::read_to_string(path).context("Failed to read config file")?;
    toml::from_str(&content).context("Failed to parse config file")
}

fn build_noise_config(toml: &TomlConfig, args: &Args, seed: u64) -> NoiseConfig {
    let mut config = NoiseConfig {
        seed: Some(seed),
        hiss: toml.hiss.clone(),
        clicks: toml.clicks.clone(),
        hum: toml.hum.clone(),
    };
    if let Some(snr) = args.snr {
        config = config.with_hiss(snr);
    }
    if let Some(rate) = args.click_rate {
        let amplitude = config.clicks.as_ref().map_or(0.5, |c| c.amplitude);
        config = config.with_clicks(rate, amplitude);
    }
    if let Some(frequency) = args.hum {
        config = config.with_hum(frequency, args.hum_level);
    }
    config
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::init();

    fs::create_dir_all(&args.output_dir).context("Failed to create output directory")?;

    let toml_config = if let Some(ref config_path) = args.config {
        load_toml_config(config_path)?
    } else {
        TomlConfig::default()
    };
    let kick = toml_config.kick.clone().unwrap_or_default();

    let offsets = parse_offsets(&args.offsets)?;
    let base_seed = args.seed.unwrap_or(0);
    let max_lag = offsets.iter().map(|o| o.unsigned_abs()).max().unwrap_or(0) as usize + 16;

    let mut manifest_entries = Vec::new();
    for (index, &offset) in offsets.iter().enumerate() {
        let seed = base_seed + index as u64 * 1000;
        let (mut local, mut remote) =
            generate_kick_pair(args.duration, args.sample_rate, args.bpm, offset, &kick);

        let measured_offset = estimate_offset(&local, &remote, max_lag);

        let noise_config = build_noise_config(&toml_config, &args, seed);
        if !noise_config.is_clean() {
            apply_noise(&mut local, args.sample_rate, &noise_config);
            apply_noise(
                &mut remote,
                args.sample_rate,
                &noise_config.clone().with_seed(seed + 1),
            );
        }

        let local_name = format!("{}_o{:+05}_local.wav", args.prefix, offset);
        let remote_name = format!("{}_o{:+05}_remote.wav", args.prefix, offset);
        save_wav(
            args.output_dir.join(&local_name),
            &[&local],
            args.sample_rate,
        )
        .context("Failed to write WAV file")?;
        save_wav(
            args.output_dir.join(&remote_name),
            &[&remote],
            args.sample_rate,
        )
        .context("Failed to write WAV file")?;

        if measured_offset != offset {
            log::warn!(
                "Offset {} measures as {} before noise",
                offset,
                measured_offset
            );
        }

        manifest_entries.push(ManifestEntry {
            local: local_name,
            remote: remote_name,
            offset,
            measured_offset,
            seed,
        });
        eprint!("\rGenerating: {}/{}", index + 1, offsets.len());
    }
    eprintln!();

    if args.manifest {
        let manifest = Manifest {
            sample_rate: args.sample_rate,
            bpm: args.bpm,
            duration: args.duration,
            pairs: manifest_entries,
        };
        let manifest_path = args.output_dir.join("manifest.json");
        let manifest_json =
            serde_json::to_string_pretty(&manifest).context("Failed to serialize manifest")?;
        fs::write(&manifest_path, manifest_json).context("Failed to write manifest")?;
        eprintln!("Manifest written to: {}", manifest_path.display());
    }

    eprintln!(
        "Generated {} pairs in {}",
        offsets.len(),
        args.output_dir.display()
    );
    Ok(())
}
