use std::io::BufRead;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use oisc::image::{self, HELLO, HI};
use oisc::memory::{DEFAULT_MEMORY_LIMIT, MAX_MEMORY_LIMIT};
use oisc::{Exit, Image, Machine, MachineConfig, Stdio};
use tracing::info;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "OISC_LOG";

#[derive(Parser)]
#[command(name = "oisc", about = "A SUBLEQ one-instruction machine")]
struct Cli {
    /// Largest memory extent, in cells (at most 2^28).
    #[arg(
        long,
        global = true,
        default_value_t = DEFAULT_MEMORY_LIMIT,
        value_parser = parse_memory_limit
    )]
    memory_limit: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a program text file to completion on stdin/stdout.
    Run {
        program: PathBuf,

        /// Give up after this many instructions.
        #[arg(long)]
        step_limit: Option<u64>,
    },
    /// Load an image and evaluate each line read from stdin.
    Repl {
        /// Image file (`*.br` for brotli-compressed). Defaults to the
        /// built-in monitor.
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Run the sample programs, then load an image and talk to it.
    Demo {
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Brotli-compress an image text file.
    Pack { input: PathBuf, output: PathBuf },
}

/// Parse a memory limit, bounded so the buffer can actually be allocated.
fn parse_memory_limit(s: &str) -> Result<usize, String> {
    let limit = s
        .parse::<usize>()
        .map_err(|e| format!("invalid memory limit: {e}"))?;
    if limit == 0 || limit > MAX_MEMORY_LIMIT {
        return Err(format!(
            "memory limit must be between 1 and {MAX_MEMORY_LIMIT} cells"
        ));
    }
    Ok(limit)
}

fn setup_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> anyhow::Result<()> {
    setup_tracing();
    let cli = Cli::parse();
    let config = MachineConfig {
        memory_limit: cli.memory_limit,
    };

    match cli.command {
        Command::Run {
            program,
            step_limit,
        } => run(&program, step_limit, config),
        Command::Repl { image } => repl(image.as_deref(), config),
        Command::Demo { image } => demo(image.as_deref(), config),
        Command::Pack { input, output } => pack(&input, &output),
    }
}

fn load_image(path: Option<&Path>) -> anyhow::Result<Image> {
    match path {
        Some(path) => {
            Image::from_path(path).with_context(|| format!("loading image {}", path.display()))
        }
        None => Ok(Image::monitor()),
    }
}

fn run(program: &Path, step_limit: Option<u64>, config: MachineConfig) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(program)
        .with_context(|| format!("reading {}", program.display()))?;
    let mut machine = Machine::with_config(Stdio::new(), config);
    machine
        .load_from_text(&text, true)
        .with_context(|| format!("loading {}", program.display()))?;

    let start = std::time::Instant::now();
    match step_limit {
        Some(limit) => machine.run_for(limit)?,
        None => machine.run()?,
    };
    machine.console_mut().flush();
    info!(
        steps = machine.steps(),
        elapsed = ?start.elapsed(),
        "halted"
    );
    Ok(())
}

fn repl(image: Option<&Path>, config: MachineConfig) -> anyhow::Result<()> {
    let image = load_image(image)?;
    let mut machine = Machine::with_config(Stdio::new(), config);
    machine.load(&image)?;

    for line in std::io::stdin().lock().lines() {
        let line = line.context("reading stdin")?;
        if machine.eval(&line)? == Exit::Halted {
            machine.console_mut().flush();
            return Ok(());
        }
        machine.console_mut().flush();
    }

    // Out of lines: let the image see end of input from the live console.
    machine.run()?;
    machine.console_mut().flush();
    Ok(())
}

fn demo(image: Option<&Path>, config: MachineConfig) -> anyhow::Result<()> {
    let image = load_image(image)?;
    let mut machine = Machine::with_config(Stdio::new(), config);

    machine.load_from_text(HI, true)?;
    machine.run()?;
    machine.putch(b'\n'.into());
    machine.load_from_text(HELLO, true)?;
    machine.run()?;

    machine.load(&image)?;
    info!(cells = image.len(), "image loaded");
    for command in [".( IMAGE LOADED) cr", ".( READY) cr"] {
        if machine.eval(command)? == Exit::Halted {
            bail!("image halted while evaluating {command:?}");
        }
    }
    machine.console_mut().flush();
    Ok(())
}

fn pack(input: &Path, output: &Path) -> anyhow::Result<()> {
    let text =
        std::fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
    // Refuse to pack something that would not load.
    let parsed = Image::from_text(&text).with_context(|| format!("parsing {}", input.display()))?;
    let compressed = image::compress(&text)?;
    std::fs::write(output, &compressed)
        .with_context(|| format!("writing {}", output.display()))?;
    info!(
        cells = parsed.len(),
        raw = text.len(),
        compressed = compressed.len(),
        "image packed"
    );
    Ok(())
}
