//! tomesplit - chapter splitter for EPUB and PDF ebooks

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use tomesplit::{
    DetectionMode, OutputFormat, SplitSettings, detect::detect, read_document, split,
};

#[derive(Parser)]
#[command(name = "tomesplit")]
#[command(version, about = "Split EPUB and PDF ebooks into per-chapter files", long_about = None)]
#[command(after_help = "EXAMPLES:
    tomesplit book.epub -o chapters/         Split into chapters/
    tomesplit book.pdf -o out/ --format epub Split and convert to EPUB
    tomesplit -i book.epub                   Show detected chapters")]
struct Cli {
    /// Input file (EPUB or PDF)
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output directory (created if absent)
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    output: PathBuf,

    /// Output format for chapter files
    #[arg(short, long, value_enum, default_value_t = FormatArg::Same)]
    format: FormatArg,

    /// Filename template ({title}, {chapter_num}, {chapter_title})
    #[arg(short, long, value_name = "PATTERN")]
    pattern: Option<String>,

    /// Manual chapter boundaries as unit indices, e.g. 3,10,25
    #[arg(short, long, value_name = "INDICES", value_delimiter = ',')]
    boundaries: Vec<usize>,

    /// Structural query matched against TOC titles and unit names
    #[arg(short = 'q', long, value_name = "QUERY")]
    query: Option<String>,

    /// Outline levels used as chapter boundaries
    #[arg(long, value_name = "DEPTH", default_value_t = 1)]
    depth: usize,

    /// Do not copy source metadata into chapter files
    #[arg(long)]
    no_metadata: bool,

    /// Show detected chapters without splitting
    #[arg(short, long)]
    info: bool,

    /// Emit the report as JSON
    #[arg(long)]
    json: bool,

    /// Suppress output messages
    #[arg(long)]
    quiet: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    /// Same format as the input file
    Same,
    Pdf,
    Epub,
}

#[derive(Serialize)]
struct ReportLine {
    chapter: usize,
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = build_settings(&cli);

    let result = if cli.info {
        show_info(&cli, &settings)
    } else {
        run_split(&cli, &settings)
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn build_settings(cli: &Cli) -> SplitSettings {
    let mut settings = SplitSettings::default();
    settings.output_format = match cli.format {
        FormatArg::Same => OutputFormat::SameAsInput,
        FormatArg::Pdf => OutputFormat::Pdf,
        FormatArg::Epub => OutputFormat::Epub,
    };
    if let Some(pattern) = &cli.pattern {
        settings.naming_pattern = pattern.clone();
    }
    if !cli.boundaries.is_empty() {
        settings.detection_mode = DetectionMode::Manual;
        settings.manual_boundaries = cli.boundaries.clone();
    }
    if let Some(query) = &cli.query {
        settings.detection_mode = DetectionMode::Query;
        settings.query = query.clone();
    }
    settings.outline_depth = cli.depth;
    settings.preserve_metadata = !cli.no_metadata;
    settings
}

fn show_info(cli: &Cli, settings: &SplitSettings) -> tomesplit::Result<ExitCode> {
    let document = read_document(&cli.input)?;
    let spans = detect(&document, settings)?;

    println!("File: {}", cli.input.display());
    println!("Title: {}", document.title());
    if let Some(author) = document.metadata.get("author") {
        println!("Author: {author}");
    }
    if let Some(publisher) = document.metadata.get("publisher") {
        println!("Publisher: {publisher}");
    }
    println!("Content units: {}", document.len());
    println!("Outline entries: {}", document.outline.len());
    println!("Chapters:");
    for span in &spans {
        println!(
            "  {:>3}. {} (units {}..{})",
            span.index, span.title, span.start_unit_index, span.end_unit_index
        );
    }

    Ok(ExitCode::SUCCESS)
}

fn run_split(cli: &Cli, settings: &SplitSettings) -> tomesplit::Result<ExitCode> {
    let report = split(&cli.input, settings, &cli.output)?;

    if cli.json {
        let lines: Vec<ReportLine> = report
            .iter()
            .map(|r| ReportLine {
                chapter: r.chapter_index,
                title: r.chapter_title.clone(),
                path: r.output_path.clone(),
                error: r.error.as_ref().map(|e| e.to_string()),
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&lines).unwrap_or_else(|_| "[]".to_string())
        );
    } else if !cli.quiet {
        for result in &report {
            match (&result.output_path, &result.error) {
                (Some(path), _) => {
                    println!("{:>3}. {} -> {}", result.chapter_index, result.chapter_title, path.display());
                }
                (None, Some(e)) => {
                    println!("{:>3}. {} -> failed: {e}", result.chapter_index, result.chapter_title);
                }
                (None, None) => {}
            }
        }
        println!(
            "{} of {} chapters written",
            report.succeeded(),
            report.len()
        );
    }

    if report.succeeded() == 0 && !report.is_empty() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
