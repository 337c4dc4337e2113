//! Customs Stats CLI - Fetch e-Stat customs statistics for a list of HS codes
//!
//! # Main Commands
//!
//! ```bash
//! customs-stats serve                          # Start HTTP server (port 3000)
//! customs-stats fetch codes.csv --year 2023    # Run the pipeline, write CSV
//! ```
//!
//! # Debug Commands (for development)
//!
//! ```bash
//! customs-stats codes codes.csv                # Just parse the HS code list
//! ```

use chrono::Local;
use clap::{Parser, Subcommand};
use customs_stats::{
    download_file_name, read_code_file, run, Config, ExportOptions, ReaderOptions, RunRequest,
};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "customs-stats")]
#[command(about = "Fetch e-Stat customs trade statistics for a list of HS codes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Full pipeline: HS code CSV → e-Stat → shaped CSV
    Fetch {
        /// Input CSV file (HSコード, 品目 columns)
        input: PathBuf,

        /// Target year
        #[arg(short, long)]
        year: i32,

        /// e-Stat application id (default: APP_ID from the environment)
        #[arg(long)]
        app_id: Option<String>,

        /// Output CSV file (default: timestamped name in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also write the table as JSON
        #[arg(long)]
        json: Option<PathBuf>,

        /// Fall back to UTF-8 (BOM) instead of replacing characters cp932 lacks
        #[arg(long)]
        strict_encoding: bool,
    },

    /// Parse an HS code CSV and print the codes
    Codes {
        /// Input CSV file
        input: PathBuf,

        /// CSV delimiter (auto-detect if not specified)
        #[arg(short, long)]
        delimiter: Option<char>,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Fetch {
            input,
            year,
            app_id,
            output,
            json,
            strict_encoding,
        } => {
            cmd_fetch(
                &input,
                year,
                app_id,
                output.as_deref(),
                json.as_deref(),
                strict_encoding,
            )
            .await
        }

        Commands::Codes { input, delimiter } => cmd_codes(&input, delimiter),

        Commands::Serve { port } => cmd_serve(port).await,
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

async fn cmd_fetch(
    input: &Path,
    year: i32,
    app_id: Option<String>,
    output: Option<&Path>,
    json_output: Option<&Path>,
    strict_encoding: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Processing: {}", input.display());

    let config = Config::from_env()?;
    let bytes = fs::read(input)?;

    let mut request = RunRequest::new(year, bytes);
    request.app_id = app_id;
    if strict_encoding {
        request = request.with_export_options(ExportOptions::strict());
    }

    let report = run(&config, &request).await?;

    if !report.warnings.is_empty() {
        eprintln!("\n⚠️  Warnings ({}):", report.warnings.len());
        for warning in report.warnings.iter().take(20) {
            eprintln!("   - {}", warning);
        }
    }

    if let Some(json_path) = json_output {
        let json = serde_json::to_string_pretty(&report.table)?;
        fs::write(json_path, json)?;
        eprintln!("   💾 JSON saved to: {}", json_path.display());
    }

    match report.export {
        Some(ref csv) => {
            let path = output.map(Path::to_path_buf).unwrap_or_else(|| {
                PathBuf::from(download_file_name(year, Local::now().naive_local()))
            });
            fs::write(&path, &csv.bytes)?;
            eprintln!("   💾 CSV ({}) saved to: {}", csv.encoding.name(), path.display());
        }
        None => eprintln!("   ❌ No CSV written (export failed)"),
    }

    eprintln!("\n✨ {}", report.message());
    Ok(())
}

fn cmd_codes(input: &Path, delimiter: Option<char>) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Parsing HS code list: {}", input.display());

    let options = ReaderOptions {
        delimiter: delimiter.map(delimiter_byte).transpose()?,
        ..ReaderOptions::default()
    };
    let result = read_code_file(input, &options)?;

    eprintln!("   Encoding: {}", result.encoding.name());
    eprintln!(
        "   Delimiter: '{}'{}",
        format_delimiter(result.delimiter),
        if delimiter.is_none() { " (auto-detected)" } else { "" }
    );
    eprintln!("   Columns: {}", result.headers.join(", "));
    eprintln!(
        "✅ {} rows, {} unique HS code(s)",
        result.row_count,
        result.codes.len()
    );

    let json = serde_json::to_string_pretty(result.codes.entries())?;
    println!("{}", json);

    Ok(())
}

/// CSV delimiters are single bytes; anything outside ASCII is rejected.
fn delimiter_byte(c: char) -> Result<u8, String> {
    u8::try_from(c)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| format!("Delimiter must be a single ASCII character, got '{}'", c))
}

fn format_delimiter(d: u8) -> String {
    match d {
        b'\t' => "\\t".to_string(),
        c => char::from(c).to_string(),
    }
}

async fn cmd_serve(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    customs_stats::server::start_server(port).await
}
