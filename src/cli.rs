// Command-line interface.
//
// Subcommands: `encode`, `decode`, `info`.  Stats go to stderr (or as JSON
// with `--json`); logging is routed through env_logger with `-v` raising
// the filter level.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::engine::DeltaConfig;
use crate::hash::config::{MAX_BLOCK, MIN_BLOCK};
use crate::io::{decode_file, encode_file};
use crate::wire::window::{self, WinFlags, WindowHeader};

const DEFAULT_LEVEL: u32 = 6;
const DEFAULT_WINSIZE: usize = 1 << 23; // 8 MiB

// ---------------------------------------------------------------------------
// Byte size parsing (supports K, M, G suffixes)
// ---------------------------------------------------------------------------

fn parse_byte_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size string".into());
    }
    let (num_part, multiplier) = match s.as_bytes().last() {
        Some(b'k' | b'K') => (&s[..s.len() - 1], 1024u64),
        Some(b'm' | b'M') => (&s[..s.len() - 1], 1024 * 1024),
        Some(b'g' | b'G') => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        _ => (s, 1u64),
    };
    let num: u64 = num_part
        .trim()
        .parse()
        .map_err(|e| format!("invalid size '{s}': {e}"))?;
    num.checked_mul(multiplier)
        .ok_or_else(|| format!("size overflow: '{s}'"))
}

// ---------------------------------------------------------------------------
// Clap definition
// ---------------------------------------------------------------------------

/// Windowed binary delta encoder/decoder.
#[derive(Parser, Debug)]
#[command(
    name = "windelta",
    version,
    about = "Windowed binary delta encoder/decoder",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Force overwrite existing output files.
    #[arg(short = 'f', long, global = true)]
    force: bool,

    /// Quiet mode (suppress non-error output).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Output stats as JSON to stderr.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Delta encode a target file against a source file.
    Encode(EncodeArgs),
    /// Reconstruct a target file from a source file and a delta.
    Decode(DecodeArgs),
    /// Print the window headers of a delta without decoding it.
    Info(InfoArgs),
}

#[derive(Args, Debug)]
struct EncodeArgs {
    /// Source (reference) file; omit to encode without a reference.
    #[arg(short = 's', long = "source")]
    source: Option<PathBuf>,

    /// Target file to encode.
    input: PathBuf,

    /// Delta output file.
    output: PathBuf,

    /// Compression level (0-9; 0 = store only).
    #[arg(short = 'l', long, default_value_t = DEFAULT_LEVEL)]
    level: u32,

    /// Target window size (accepts K/M/G suffixes).
    #[arg(short = 'w', long = "window-size", value_parser = parse_byte_size)]
    window_size: Option<u64>,

    /// Matcher block width (16-64), overriding the level profile.
    #[arg(short = 'B', long = "block-size")]
    block_size: Option<usize>,

    /// Do not emit per-window checksums.
    #[arg(long = "no-checksum")]
    no_checksum: bool,
}

#[derive(Args, Debug)]
struct DecodeArgs {
    /// Source (reference) file; omit if the delta was encoded without one.
    #[arg(short = 's', long = "source")]
    source: Option<PathBuf>,

    /// Delta file to decode.
    input: PathBuf,

    /// Reconstructed output file.
    output: PathBuf,

    /// Largest window to accept (guards decode memory).
    #[arg(long = "max-window", value_parser = parse_byte_size)]
    max_window: Option<u64>,
}

#[derive(Args, Debug)]
struct InfoArgs {
    /// Delta file to inspect.
    input: PathBuf,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Run the CLI; exits the process on error.
pub fn run() {
    let cli = Cli::parse();

    let filter = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let result = match &cli.command {
        Cmd::Encode(args) => cmd_encode(&cli, args),
        Cmd::Decode(args) => cmd_decode(&cli, args),
        Cmd::Info(args) => cmd_info(args),
    };

    if let Err(msg) = result {
        eprintln!("windelta: {msg}");
        process::exit(1);
    }
}

fn check_overwrite(path: &PathBuf, force: bool) -> Result<(), String> {
    if path.exists() && !force {
        return Err(format!(
            "output file {} exists (use --force to overwrite)",
            path.display()
        ));
    }
    Ok(())
}

fn cmd_encode(cli: &Cli, args: &EncodeArgs) -> Result<(), String> {
    check_overwrite(&args.output, cli.force)?;
    if let Some(b) = args.block_size
        && !(MIN_BLOCK..=MAX_BLOCK).contains(&b)
    {
        return Err(format!("block size must be {MIN_BLOCK}..={MAX_BLOCK}"));
    }

    let config = DeltaConfig {
        level: args.level,
        window_size: args.window_size.map_or(DEFAULT_WINSIZE, |w| w as usize),
        block_size: args.block_size,
        checksum: !args.no_checksum,
        ..Default::default()
    };

    let stats = encode_file(args.source.as_deref(), &args.input, &args.output, &config)
        .map_err(|e| e.to_string())?;

    if cli.json_output {
        let json = serde_json::json!({
            "command": "encode",
            "source_size": stats.source_size,
            "target_size": stats.target_size,
            "delta_size": stats.delta_size,
            "windows": stats.windows,
            "ratio": ratio(stats.delta_size, stats.target_size),
        });
        eprintln!("{json}");
    } else if !cli.quiet {
        eprintln!(
            "encoded {} -> {} bytes ({} windows, ratio {:.3})",
            stats.target_size,
            stats.delta_size,
            stats.windows,
            ratio(stats.delta_size, stats.target_size)
        );
    }
    Ok(())
}

fn cmd_decode(cli: &Cli, args: &DecodeArgs) -> Result<(), String> {
    check_overwrite(&args.output, cli.force)?;

    let config = DeltaConfig {
        max_window: args.max_window.unwrap_or(window::HARD_MAX_WINDOW),
        ..Default::default()
    };

    let stats = decode_file(args.source.as_deref(), &args.input, &args.output, &config)
        .map_err(|e| e.to_string())?;

    if cli.json_output {
        let json = serde_json::json!({
            "command": "decode",
            "source_size": stats.source_size,
            "delta_size": stats.delta_size,
            "output_size": stats.output_size,
            "windows": stats.windows,
        });
        eprintln!("{json}");
    } else if !cli.quiet {
        eprintln!(
            "decoded {} -> {} bytes ({} windows)",
            stats.delta_size, stats.output_size, stats.windows
        );
    }
    Ok(())
}

fn cmd_info(args: &InfoArgs) -> Result<(), String> {
    let file = File::open(&args.input).map_err(|e| e.to_string())?;
    let mut reader = BufReader::new(file);

    window::read_stream_header(&mut reader).map_err(|e| e.to_string())?;
    println!("format: WDELTA v0");

    let mut index = 0u64;
    loop {
        let raw = window::read_window(&mut reader, window::HARD_MAX_WINDOW)
            .map_err(|e| e.to_string())?;
        let Some(raw) = raw else { break };
        print_window(index, &raw.header);
        index += 1;
    }
    println!("windows: {index}");
    Ok(())
}

fn print_window(index: u64, h: &WindowHeader) {
    let mut flags = Vec::new();
    if h.flags.contains(WinFlags::SOURCE) {
        flags.push("SOURCE");
    }
    if h.flags.contains(WinFlags::CHECKSUM) {
        flags.push("CHECKSUM");
    }
    println!(
        "window {index}: flags [{}] target {} insts {} (inst {} / addr {} / data {} bytes){}{}",
        flags.join(" "),
        h.tgt_len,
        h.inst_count,
        h.inst_len,
        h.addr_len,
        h.data_len,
        if h.flags.contains(WinFlags::SOURCE) {
            format!(" source {}+{}", h.src_offset, h.src_len)
        } else {
            String::new()
        },
        h.adler32
            .map(|a| format!(" adler32 {a:#010x}"))
            .unwrap_or_default(),
    );
}

fn ratio(delta: u64, target: u64) -> f64 {
    if target == 0 {
        return 0.0;
    }
    delta as f64 / target as f64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
