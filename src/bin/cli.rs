#![cfg(not(tarpaulin_include))]

use clap::Parser;
use emotion_report::config::{ModelArgs, RunArgs};
use emotion_report::downloader::{to_csv, to_xlsx};
use emotion_report::graph::{ChartOptions, render_pie_svg};
use emotion_report::loader::load_table;
use emotion_report::report::Report;
use log::info;
use std::path::PathBuf;
use std::time::Instant;

/// Classify one column of a spreadsheet from the terminal
#[derive(Parser, Debug)]
#[command(name = "emotion-cli")]
#[command(about = "Classify one spreadsheet column and print the emotion report", long_about = None)]
struct Cli {
    /// Spreadsheet to read (.xlsx, .xls or .csv)
    input: PathBuf,

    /// Column to classify; without it the available columns are listed
    #[arg(short, long)]
    column: Option<String>,

    /// Write the report as CSV
    #[arg(long)]
    export_csv: Option<PathBuf>,

    /// Write the report as XLSX
    #[arg(long)]
    export_xlsx: Option<PathBuf>,

    /// Write the pie chart as SVG
    #[arg(long)]
    chart: Option<PathBuf>,

    #[command(flatten)]
    model: ModelArgs,

    #[command(flatten)]
    run: RunArgs,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let table = load_table(&cli.input)?;

    let Some(column) = cli.column.as_deref() else {
        println!("Columns in {} ({} rows):", cli.input.display(), table.row_count());
        for name in &table.columns {
            println!("  {}", name);
        }
        return Ok(());
    };

    let settings = cli.run.settings();
    let handle = cli.model.handle();

    let start = Instant::now();
    let labels = settings
        .classifier()
        .classify_column(&handle, &table, column)?;
    info!("Classification took {:.1}s", start.elapsed().as_secs_f64());

    let report = Report::from_labels(&labels, settings.colors);

    println!("{:<16} {:>8} {:>9}  {}", "label", "count", "percent", "color");
    for entry in &report.entries {
        println!(
            "{:<16} {:>8} {:>8.1}%  {}",
            entry.label, entry.count, entry.percentage, entry.color
        );
    }
    println!("{:<16} {:>8}", "total", report.total);

    if let Some(path) = &cli.export_csv {
        std::fs::write(path, to_csv(&report)?)?;
        println!("Wrote {}", path.display());
    }
    if let Some(path) = &cli.export_xlsx {
        std::fs::write(path, to_xlsx(&report)?)?;
        println!("Wrote {}", path.display());
    }
    if let Some(path) = &cli.chart {
        let options = ChartOptions {
            title: format!("Emotions in '{}'", column),
            style: settings.chart,
            ..ChartOptions::default()
        };
        std::fs::write(path, render_pie_svg(&report, &options)?)?;
        println!("Wrote {}", path.display());
    }

    Ok(())
}
