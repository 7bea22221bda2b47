use clap::{Parser, Subcommand};
use serde::Serialize;
use slotwatch::collab::{AnnounceError, CaptureError, CaptureRect, DebugFrame, DebugSink};
use slotwatch::image::io::{load_gray_image, resize_gray};
use slotwatch::{
    Command, CommandSender, DetectionLoop, FrameCapture, Matcher, OwnedImage, ReferenceBank, ReferenceStore,
    WatchConfig,
};
use std::fs;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing_subscriber::EnvFilter;

const EXAMPLE_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.json"));

#[derive(Parser, Debug)]
#[command(author, version, about = "Slotwatch CLI (JSON config driven)")]
struct Cli {
    /// Path to the JSON configuration file. Defaults apply when it is missing.
    #[arg(short, long, value_name = "FILE", default_value = "slotwatch.json")]
    config: PathBuf,
    /// Print an example config and exit.
    #[arg(long)]
    print_example: bool,
    /// Enable tracing output (RUST_LOG refines the filter).
    #[arg(long)]
    trace: bool,
    /// Like --trace, but with debug-level events (per-slot coordinates).
    #[arg(short, long)]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Compress every reference image in a directory into the cache file.
    Ingest {
        /// Reference directory (config `reference_dir` by default).
        dir: Option<PathBuf>,
        /// Cache file to write (config `cache_file` by default).
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Worker threads.
        #[arg(short, long)]
        workers: Option<usize>,
        /// zlib level 0..=9.
        #[arg(short, long)]
        level: Option<u32>,
    },
    /// Write the original bytes of one reference.
    Get {
        name: String,
        /// Output file; prints the byte count when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List cached references.
    List,
    /// Remove the cache file.
    Clear,
    /// Score one slot-sized image against every reference.
    Match { image: PathBuf },
    /// Run the detection loop against a screenshot file.
    ///
    /// The file is re-read whenever it changes. Commands are read from stdin,
    /// one per line: left, right, up, down, toggle, capture <name>, reload, quit.
    Watch {
        #[arg(long, value_name = "FILE")]
        screen: PathBuf,
        /// Start with monitoring enabled.
        #[arg(long)]
        monitor: bool,
        /// Log per-slot scores every tick.
        #[arg(long)]
        debug: bool,
    },
}

#[derive(Debug, Serialize)]
struct ScoreRecord {
    name: String,
    score: f32,
}

#[derive(Debug, Serialize)]
struct MatchOutput {
    label: Option<String>,
    threshold: f32,
    best: Option<ScoreRecord>,
    scores: Vec<ScoreRecord>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.trace || cli.verbose {
        let directive = if cli.verbose {
            "slotwatch=debug"
        } else {
            "slotwatch=info"
        };
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive(directive.parse()?))
            .with_target(false)
            .init();
    }

    if cli.print_example {
        println!("{EXAMPLE_JSON}");
        return Ok(());
    }

    let config = if cli.config.exists() {
        WatchConfig::load(&cli.config)?
    } else {
        WatchConfig::default()
    };

    let Some(command) = cli.command else {
        return Err("no subcommand given; see --help".into());
    };

    match command {
        Cmd::Ingest {
            dir,
            output,
            workers,
            level,
        } => {
            let dir = dir.unwrap_or_else(|| config.reference_dir.clone());
            let output = output.unwrap_or_else(|| config.cache_file.clone());
            let (ok, text) = slotwatch::ingest_directory(
                &dir,
                Some(&output),
                workers.or(config.workers),
                level.unwrap_or(config.compression_level),
            );
            println!("{text}");
            if !ok {
                std::process::exit(1);
            }
        }
        Cmd::Get { name, output } => {
            let store = open_store(&config)?;
            match store.get(&name)? {
                Some(bytes) => match output {
                    Some(path) => fs::write(path, bytes)?,
                    None => println!("{name}: {} bytes", bytes.len()),
                },
                None => return Err(format!("no reference named '{name}'").into()),
            }
        }
        Cmd::List => {
            let store = open_store(&config)?;
            store.load()?;
            let snapshot = store.snapshot();
            for image in snapshot.iter() {
                println!(
                    "{}\t{}\t{}",
                    image.name(),
                    image.original_size(),
                    image.compressed_size()
                );
            }
            println!("{} references", snapshot.len());
        }
        Cmd::Clear => {
            open_store(&config)?.clear()?;
            println!("Cache cleared");
        }
        Cmd::Match { image } => {
            let store = open_store(&config)?;
            store.load()?;
            let (width, height) = config.slot_size();
            let live = resize_gray(&load_gray_image(&image)?, width, height)?;
            let bank = ReferenceBank::prepare(&store.snapshot(), width, height);
            let matcher = Matcher::new(config.threshold)?;
            let result = matcher.best_match(live.view(), &bank);
            let output = MatchOutput {
                label: result.label.clone(),
                threshold: matcher.threshold(),
                best: result.best.map(|(name, score)| ScoreRecord { name, score }),
                scores: matcher
                    .scores(live.view(), &bank)
                    .into_iter()
                    .map(|(name, score)| ScoreRecord { name, score })
                    .collect(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Cmd::Watch {
            screen,
            monitor,
            debug,
        } => {
            let config = WatchConfig {
                monitor_on_start: monitor || config.monitor_on_start,
                ..config
            };
            let store = Arc::new(open_store(&config)?);
            let detection = DetectionLoop::new(
                config,
                store,
                ScreenFile::new(screen),
                |text: &str| -> Result<(), AnnounceError> {
                    println!("{text}");
                    Ok(())
                },
            )?;
            let detection = if debug {
                detection.with_debug_sink(ScoreLog)
            } else {
                detection
            };
            let handle = detection.spawn()?;
            let commands = handle.commands();
            // The loop stops only through stdin (`quit` or EOF), and the reader
            // returns right after sending that Stop, so both threads can be joined.
            let reader = std::thread::Builder::new()
                .name("slotwatch-stdin".into())
                .spawn(move || read_commands(std::io::stdin().lock(), &commands))?;
            if let Some(summary) = handle.join() {
                eprintln!("{} ticks, {} announcements", summary.ticks, summary.events);
            }
            if reader.join().is_err() {
                return Err("stdin reader panicked".into());
            }
        }
    }

    Ok(())
}

/// Forwards input lines to the loop until `quit` or end of input, then
/// sends `Stop`.
fn read_commands(input: impl BufRead, commands: &CommandSender) {
    for line in input.lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<Command>() {
            Ok(Command::Stop) => break,
            Ok(command) => {
                if !commands.send(command) {
                    return;
                }
            }
            Err(err) => eprintln!("{err}"),
        }
    }
    commands.stop();
}

fn open_store(config: &WatchConfig) -> slotwatch::SlotWatchResult<ReferenceStore> {
    ReferenceStore::open(&config.cache_file, config.compression_level)
}

/// Screenshot file standing in for the screen; re-read when it changes.
struct ScreenFile {
    path: PathBuf,
    frame: Option<(SystemTime, OwnedImage)>,
}

impl ScreenFile {
    fn new(path: PathBuf) -> Self {
        Self { path, frame: None }
    }

    fn refresh(&mut self) -> Result<&OwnedImage, CaptureError> {
        let modified = modified(&self.path)?;
        let stale = self
            .frame
            .as_ref()
            .map_or(true, |(seen, _)| *seen != modified);
        if stale {
            let image = load_gray_image(&self.path)
                .map_err(|err| CaptureError::Unavailable(err.to_string()))?;
            self.frame = Some((modified, image));
        }
        match &self.frame {
            Some((_, image)) => Ok(image),
            None => Err(CaptureError::Unavailable("no frame".into())),
        }
    }
}

fn modified(path: &Path) -> Result<SystemTime, CaptureError> {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map_err(|err| CaptureError::Unavailable(format!("{}: {err}", path.display())))
}

impl slotwatch::Capture for ScreenFile {
    fn capture(&mut self, rect: CaptureRect) -> Result<OwnedImage, CaptureError> {
        FrameCapture::crop(self.refresh()?, rect)
    }
}

struct ScoreLog;

impl DebugSink for ScoreLog {
    fn annotate(&mut self, frame: &DebugFrame) {
        for (slot, annotation) in frame.slots.iter().enumerate() {
            tracing::debug!(
                slot = slot + 1,
                label = annotation.label.as_deref().unwrap_or(""),
                score = annotation.score.unwrap_or(f32::NAN),
                captured = annotation.captured,
                dx = frame.offset.dx,
                dy = frame.offset.dy,
                "slot annotation"
            );
        }
    }
}
