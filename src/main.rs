//! Main entry point for the zipstream CLI application.
//!
//! This binary lists the entries of a ZIP archive, or extracts one entry,
//! reading the archive once from front to back whether it comes from an
//! HTTP URL or the local filesystem.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::warn;

use zipstream::logging::init_logging;
use zipstream::{
    Cli, ExtractionResult, Fetch, HttpFetcher, ListedEntry, LocalFetcher, ZipExtractor,
};

/// Exit status when the requested entry is not in the archive
const EXIT_NOT_FOUND: u8 = 3;
/// Exit status after Ctrl-C, as a shell would report SIGINT
const EXIT_INTERRUPTED: u8 = 130;

/// Application entry point.
///
/// Parses command-line arguments, picks a fetcher for the archive location
/// and runs the pipeline until it completes or the user interrupts it.
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_config());

    // Dropping the pipeline on Ctrl-C closes the connection and removes
    // any partially written output file
    tokio::select! {
        result = run(&cli) => match result {
            Ok(code) => code,
            Err(err) => {
                eprintln!("zipstream: {err:#}");
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, aborting transfer");
            ExitCode::from(EXIT_INTERRUPTED)
        }
    }
}

async fn run(cli: &Cli) -> Result<ExitCode> {
    if cli.is_http_url() {
        let fetcher = HttpFetcher::new(cli.fetch_config())?;
        process_zip(ZipExtractor::new(fetcher), cli).await
    } else {
        process_zip(ZipExtractor::new(LocalFetcher), cli).await
    }
}

/// Process a ZIP archive based on CLI options.
///
/// - List mode (no entry, `-l` or `-v`): display archive contents
/// - Extract mode: stream the named entry to stdout or to a file
async fn process_zip<F: Fetch>(extractor: ZipExtractor<F>, cli: &Cli) -> Result<ExitCode> {
    let Some(target) = cli.entry.as_deref().filter(|_| !cli.list) else {
        return list_files(&extractor, cli).await;
    };

    let result = if cli.pipe {
        let mut stdout = tokio::io::stdout();
        extractor
            .extract(&cli.archive, target, &mut stdout)
            .await
            .with_context(|| format!("failed to extract {target} from {}", cli.archive))?
    } else {
        let output_path = output_path(cli, target);

        // Handle existing files based on overwrite options
        if output_path.exists() && !cli.overwrite {
            if !cli.is_quiet() {
                if cli.never_overwrite {
                    eprintln!("Skipping: {} (file exists)", output_path.display());
                } else {
                    eprintln!("Skipping: {} (use -o to overwrite)", output_path.display());
                }
            }
            return Ok(ExitCode::SUCCESS);
        }

        if !cli.is_quiet() {
            println!("  extracting: {}", target);
        }
        extractor
            .extract_to_file(&cli.archive, target, &output_path)
            .await
            .with_context(|| format!("failed to extract {target} from {}", cli.archive))?
    };

    match result {
        ExtractionResult::Found { .. } => Ok(ExitCode::SUCCESS),
        ExtractionResult::NotFound => {
            if !cli.is_very_quiet() {
                eprintln!("zipstream: {}: entry not found in {}", target, cli.archive);
            }
            Ok(ExitCode::from(EXIT_NOT_FOUND))
        }
    }
}

/// Where an extracted entry is written: `-d` directory (or the current
/// one), keeping the archive path unless `-j` junks it.
fn output_path(cli: &Cli, target: &str) -> PathBuf {
    let file_name = if cli.junk_paths {
        Path::new(target)
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| target.to_string())
    } else {
        target.to_string()
    };

    match cli.extract_dir {
        Some(ref dir) => PathBuf::from(dir).join(file_name),
        None => PathBuf::from(file_name),
    }
}

/// List files in the ZIP archive.
///
/// - Simple format (`-l`): just entry paths, one per line
/// - Verbose format (`-v`): table with sizes, compression ratio, timestamps and kind
async fn list_files<F: Fetch>(extractor: &ZipExtractor<F>, cli: &Cli) -> Result<ExitCode> {
    let listing = extractor
        .list(&cli.archive)
        .await
        .with_context(|| format!("failed to list {}", cli.archive))?;

    if !cli.verbose {
        for entry in &listing {
            println!("{}", entry.path);
        }
        return Ok(ExitCode::SUCCESS);
    }

    println!(
        "{:>10}  {:>10}  {:>5}  {:>10}  {:>5}  {:<9}  Name",
        "Length", "Size", "Cmpr", "Date", "Time", "Kind"
    );
    println!("{}", "-".repeat(80));

    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;
    let mut file_count = 0usize;

    for entry in &listing {
        print_entry(entry);

        // Accumulate totals (excluding directories)
        if !entry.is_directory() {
            total_uncompressed += entry.size;
            total_compressed += entry.compressed_size;
            file_count += 1;
        }
    }

    println!("{}", "-".repeat(80));
    println!(
        "{:>10}  {:>10}  {}  {:>30}  {} files",
        total_uncompressed,
        total_compressed,
        ratio(total_compressed, total_uncompressed),
        "",
        file_count
    );

    Ok(ExitCode::SUCCESS)
}

fn print_entry(entry: &ListedEntry) {
    let (year, month, day) = entry.mod_date();
    let (hour, minute, _second) = entry.mod_time();

    println!(
        "{:>10}  {:>10}  {}  {:04}-{:02}-{:02}  {:02}:{:02}  {:<9}  {}",
        entry.size,
        entry.compressed_size,
        ratio(entry.compressed_size, entry.size),
        year,
        month,
        day,
        hour,
        minute,
        entry.kind.to_string(),
        entry.path
    );
}

/// Compression ratio as percentage saved
fn ratio(compressed: u64, uncompressed: u64) -> String {
    if uncompressed > 0 && compressed <= uncompressed {
        format!("{:>4}%", 100 - (compressed * 100 / uncompressed))
    } else {
        "  0%".to_string()
    }
}
