// Partita command-line front end.
//
// Every subcommand that produces a composition ends in the same export step:
// ABC, MusicXML, MIDI and a JSON record side by side in the output directory.
//
// Usage:
//   partita generate --style bach --title "Morning Invention" [--seed N]
//   partita transcribe take.wav [--title T]
//   partita import piece.mid | piece.json
//   partita assemble page1.jpg page2.jpg ... -o score.pdf
//
// Global flags: --config FILE (JSON, partial files fill in defaults),
// --out-dir DIR, --quiet (errors only).

use clap::{Parser, Subcommand};
use partita_document::{PageImage, assemble_pdf};
use partita_music::audio::load_audio;
use partita_music::export::{Rendered, file_stem};
use partita_music::generator::{ComposeRequest, Generator};
use partita_music::midi::load_midi;
use partita_music::style::StyleProfile;
use partita_music::transcribe::transcribe;
use partita_music::{Composition, MusicError, PartitaConfig};
use partita_prng::Prng;
use std::error::Error;
use std::fmt::Display;
use std::io::Write as _;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "partita")]
#[command(about = "Compose, transcribe and engrave scores", long_about = None)]
struct Cli {
    /// JSON config file; omitted fields keep their defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory for generated files
    #[arg(short = 'd', long, global = true, default_value = ".")]
    out_dir: PathBuf,

    /// Suppress informational messages (only errors)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compose a new piece in a named style
    Generate {
        /// Style label, e.g. "bach" or "beethoven"; unknown labels still work
        #[arg(short, long, default_value = "bach")]
        style: String,

        #[arg(short, long, default_value = "Untitled")]
        title: String,

        #[arg(long)]
        subtitle: Option<String>,

        /// Seed for a reproducible piece (random if omitted)
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Transcribe a monophonic recording (WAV, MP3, FLAC, OGG)
    Transcribe {
        input: PathBuf,

        #[arg(short, long)]
        title: Option<String>,
    },
    /// Import a MIDI file or composition JSON
    Import { input: PathBuf },
    /// Combine rendered JPEG pages into one PDF
    Assemble {
        #[arg(required = true)]
        pages: Vec<PathBuf>,

        #[arg(short, long)]
        output: PathBuf,
    },
}

/// Progress printer. Silent under `--quiet`.
struct Console {
    quiet: bool,
}

impl Console {
    fn line(&self, msg: impl Display) {
        if !self.quiet {
            println!("{msg}");
        }
    }

    /// Overwrite the current line, for progress counters.
    fn status(&self, msg: impl Display) {
        if !self.quiet {
            print!("\r{msg}");
            let _ = std::io::stdout().flush();
        }
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let console = Console { quiet: cli.quiet };
    let config = match &cli.config {
        Some(path) => {
            let config = PartitaConfig::load(path)?;
            console.line(format_args!("Config: {}", path.display()));
            config
        }
        None => PartitaConfig::default(),
    };

    match cli.command {
        Command::Generate {
            style,
            title,
            subtitle,
            seed,
        } => generate(&console, &config, &cli.out_dir, style, title, subtitle, seed),
        Command::Transcribe { input, title } => {
            transcribe_file(&console, &config, &cli.out_dir, &input, title)
        }
        Command::Import { input } => import(&console, &config, &cli.out_dir, &input),
        Command::Assemble { pages, output } => assemble(&console, &pages, &output),
    }
}

fn generate(
    console: &Console,
    config: &PartitaConfig,
    out_dir: &Path,
    style: String,
    title: String,
    subtitle: Option<String>,
    seed: Option<u64>,
) -> Result<(), Box<dyn Error>> {
    let seed = seed.unwrap_or_else(|| Prng::from_entropy().next_u64());
    let profile = StyleProfile::from_label(&style);

    console.line("=== Partita ===");
    console.line(format_args!("Style: {style} (profile {})", profile.name()));
    console.line(format_args!("Seed: {seed}"));
    console.line("");

    console.line(format_args!("[1/3] Composing \"{title}\"..."));
    let request = ComposeRequest {
        style,
        title,
        subtitle,
    };
    let comp = Generator::from_config(config).compose(&request, &mut Prng::new(seed));
    console.line(format_args!(
        "  {} notes over {:.0} beats at {} BPM.",
        comp.note_count(),
        comp.end_beat(),
        comp.tempo
    ));

    export(console, config, out_dir, &comp, 2, 3)
}

fn transcribe_file(
    console: &Console,
    config: &PartitaConfig,
    out_dir: &Path,
    input: &Path,
    title: Option<String>,
) -> Result<(), Box<dyn Error>> {
    console.line(format_args!("[1/4] Decoding {}...", input.display()));
    let audio = load_audio(input)?;
    console.line(format_args!(
        "  {:.1}s at {} Hz, {} channel(s).",
        audio.duration_seconds(),
        audio.sample_rate,
        audio.source_channels
    ));

    console.line("[2/4] Tracking pitch...");
    let mut last_percent = None;
    let comp = transcribe(
        &audio.samples,
        audio.sample_rate,
        &config.transcriber,
        |progress| {
            let percent = (progress.fraction * 100.0).floor() as u32;
            if last_percent != Some(percent) {
                last_percent = Some(percent);
                match progress.eta_seconds {
                    Some(eta) => {
                        console.status(format_args!("  {percent:3}% (about {eta:.0}s left)  "))
                    }
                    None => console.status(format_args!("  {percent:3}%")),
                }
            }
            ControlFlow::Continue(())
        },
    );
    console.line("");
    let mut comp = comp?.normalized(&config.grid);
    if let Some(title) = title {
        comp.title = title;
    } else if let Some(stem) = input.file_stem().and_then(|s| s.to_str()) {
        comp.title = stem.to_string();
    }
    console.line(format_args!("  {} notes detected.", comp.note_count()));

    export(console, config, out_dir, &comp, 3, 4)
}

fn import(
    console: &Console,
    config: &PartitaConfig,
    out_dir: &Path,
    input: &Path,
) -> Result<(), Box<dyn Error>> {
    console.line(format_args!("[1/3] Reading {}...", input.display()));
    let ext = input
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let comp = match ext.as_str() {
        "mid" | "midi" => load_midi(input, &config.grid)?,
        "json" => Composition::from_json(&std::fs::read_to_string(input)?, &config.grid)?,
        _ => {
            return Err(MusicError::Decode(format!(
                "don't know how to import '.{ext}' files (expected .mid or .json)"
            ))
            .into());
        }
    };
    console.line(format_args!(
        "  \"{}\": {} track(s), {} notes.",
        comp.title,
        comp.tracks.len(),
        comp.note_count()
    ));

    export(console, config, out_dir, &comp, 2, 3)
}

/// Render and write every format; prints stages `step` and `step + 1`.
fn export(
    console: &Console,
    config: &PartitaConfig,
    out_dir: &Path,
    comp: &Composition,
    step: u32,
    total: u32,
) -> Result<(), Box<dyn Error>> {
    console.line(format_args!("[{step}/{total}] Rendering notation..."));
    let rendered = Rendered::render(comp, config)?;
    console.line(format_args!(
        "  ABC {} bytes, MusicXML {} bytes, MIDI {} bytes.",
        rendered.abc.len(),
        rendered.musicxml.len(),
        rendered.midi.len()
    ));

    console.line(format_args!(
        "[{}/{total}] Writing files to {}...",
        step + 1,
        out_dir.display()
    ));
    for path in rendered.write_all(out_dir, &file_stem(&comp.title))? {
        console.line(format_args!("  {}", path.display()));
    }
    Ok(())
}

fn assemble(console: &Console, pages: &[PathBuf], output: &Path) -> Result<(), Box<dyn Error>> {
    console.line(format_args!("[1/2] Reading {} page(s)...", pages.len()));
    let mut images = Vec::with_capacity(pages.len());
    for path in pages {
        let image = PageImage::from_jpeg(std::fs::read(path)?)
            .map_err(|e| format!("{}: {e}", path.display()))?;
        console.line(format_args!(
            "  {}: {}x{} px",
            path.display(),
            image.width,
            image.height
        ));
        images.push(image);
    }

    console.line(format_args!("[2/2] Writing {}...", output.display()));
    let pdf = assemble_pdf(&images)?;
    std::fs::write(output, &pdf)?;
    console.line(format_args!("  Done! {} bytes.", pdf.len()));
    Ok(())
}
