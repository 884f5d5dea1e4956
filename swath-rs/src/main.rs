//! Sandbox: generates a synthetic SWATH run and splits it into maps
//!
//! ```bash
//! # in memory
//! swath_sandbox --cycles 100 --windows 32
//!
//! # disk cache with a pre-scan
//! swath_sandbox --cache-dir /tmp/swath --pre-scan -v
//!
//! # settings from a TOML file
//! swath_sandbox --config swath.toml
//! ```

use anyhow::Result;
use anyhow_ext::Context;
use clap::Parser;
use log::info;
use std::path::PathBuf;

use swath::model::{Precursor, Spectrum, SpectrumData, SpectrumHeader};
use swath::{CacheMode, MsDataConsumer, PeakEncoding, SwathConfig, SwathFileLoader, SwathMap};

#[derive(Parser)]
#[command(name = "swath_sandbox")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// TOML configuration file (flags below override it)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Cache maps on disk in this directory
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Run a metadata-only pass first
    #[arg(long)]
    pre_scan: bool,

    /// Threads used to reload cached maps
    #[arg(short = 't', long)]
    threads: Option<usize>,

    /// Peak encoding of the disk cache (low_res, high_res, no_loss)
    #[arg(long)]
    peak_encoding: Option<String>,

    /// Number of acquisition cycles
    #[arg(long, default_value = "50")]
    cycles: usize,

    /// Number of isolation windows per cycle
    #[arg(long, default_value = "16")]
    windows: usize,

    /// Width of each isolation window (m/z)
    #[arg(long, default_value = "25.0")]
    window_width: f64,

    /// Peaks per spectrum
    #[arg(long, default_value = "200")]
    peaks: usize,

    /// Drop the precursor of every n-th MS2 spectrum
    #[arg(long)]
    drop_precursor_every: Option<usize>,
}

/// Synthetic interleaved run: one MS1 then every window, for each cycle
struct SyntheticRun {
    cycles: usize,
    windows: usize,
    window_width: f64,
    peaks: usize,
    drop_precursor_every: Option<usize>,
}

impl SyntheticRun {
    const FIRST_WINDOW_MZ: f64 = 400.0;
    const CYCLE_TIME: f32 = 3.2;

    fn spectrum_count(&self) -> usize {
        self.cycles * (self.windows + 1)
    }

    fn data(&self, seed: usize, start_mz: f64, end_mz: f64) -> SpectrumData {
        let step = (end_mz - start_mz) / self.peaks.max(1) as f64;
        let mz_array = (0..self.peaks).map(|i| start_mz + i as f64 * step).collect();
        let intensity_array = (0..self.peaks)
            .map(|i| ((seed * 31 + i * 17) % 1000) as f32 * 10.0)
            .collect();
        SpectrumData::new(mz_array, intensity_array)
    }

    fn read(&self, consumer: &mut dyn MsDataConsumer) -> Result<()> {
        consumer.set_expected_size(self.spectrum_count(), 0);

        let mut id = 0usize;
        let mut ms2_idx = 0usize;
        for cycle in 0..self.cycles {
            let time = cycle as f32 * Self::CYCLE_TIME;

            let header = SpectrumHeader::new(id as i64, format!("scan={}", id + 1), 1, time);
            consumer.consume_spectrum(Spectrum::new(header, self.data(id, 350.0, 1500.0)))?;
            id += 1;

            for w in 0..self.windows {
                let lower = Self::FIRST_WINDOW_MZ + w as f64 * self.window_width;
                let upper = lower + self.window_width;
                let mut header = SpectrumHeader::new(
                    id as i64,
                    format!("scan={}", id + 1),
                    2,
                    time + (w + 1) as f32 * Self::CYCLE_TIME / (self.windows + 1) as f32,
                );

                let drop = self.drop_precursor_every.is_some_and(|n| n > 0 && ms2_idx % n == n - 1);
                if !drop {
                    let center = (lower + upper) / 2.0;
                    header = header.with_precursor(Precursor::new(center, center - lower, upper - center));
                }

                consumer.consume_spectrum(Spectrum::new(header, self.data(id, 100.0, 2000.0)))?;
                id += 1;
                ms2_idx += 1;
            }
        }

        Ok(())
    }
}

fn build_config(cli: &Cli) -> Result<SwathConfig> {
    let mut config = match cli.config.as_ref() {
        Some(path) => SwathConfig::from_toml_file(path).dot()?,
        None => SwathConfig::default(),
    };

    if let Some(dir) = cli.cache_dir.as_ref() {
        std::fs::create_dir_all(dir).dot()?;
        config.cache_mode = CacheMode::Disk;
        config.cache_directory = Some(dir.clone());
    }
    if cli.pre_scan {
        config.use_pre_scan = true;
    }
    if cli.threads.is_some() {
        config.threads = cli.threads;
    }
    if let Some(name) = cli.peak_encoding.as_deref() {
        config.peak_encoding = PeakEncoding::from_name(name)
            .ok_or_else(|| anyhow::anyhow!("unknown peak encoding '{}'", name))?;
    }

    config.validate()?;
    Ok(config)
}

fn print_summary(maps: &[SwathMap]) -> Result<()> {
    println!("{:>6} {:>10} {:>10} {:>9} {:>8}", "map", "lower", "upper", "spectra", "cached");
    for (i, map) in maps.iter().enumerate() {
        let name = if map.ms1 { "MS1".to_string() } else { i.to_string() };
        println!(
            "{:>6} {:>10.3} {:>10.3} {:>9} {:>8}",
            name,
            map.lower,
            map.upper,
            map.len(),
            map.spectra.is_cached()
        );
    }

    // spot check: read back the last spectrum of each map
    for map in maps.iter().filter(|m| !m.is_empty()) {
        let last = map.spectra.get_spectrum(map.len() - 1).dot()?;
        info!("last spectrum of [{}, {}]: '{}', {} peaks", map.lower, map.upper, last.header.title, last.data.peaks_count());
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let config = build_config(&cli)?;
    let run = SyntheticRun {
        cycles: cli.cycles,
        windows: cli.windows,
        window_width: cli.window_width,
        peaks: cli.peaks,
        drop_precursor_every: cli.drop_precursor_every,
    };

    info!(
        "generating {} spectra ({} cycles x {} windows), cache mode: {}",
        run.spectrum_count(),
        run.cycles,
        run.windows,
        config.cache_mode
    );

    let loader = SwathFileLoader::new(config)?;
    let maps = loader.load(|consumer: &mut dyn MsDataConsumer| run.read(consumer))?;

    print_summary(&maps)
}
