use lab_copilot::aggregate::aggregate;
use lab_copilot::charts::build_chart;
use lab_copilot::data_utils::frame_records;
use lab_copilot::ingestion::load_upload;
use lab_copilot::profiler::profile;
use lab_copilot::query::filter;
use lab_copilot::safe_json::to_safe_value;
use lab_copilot::statistics::describe;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use polars::prelude::DataFrame;
use serde::Serialize;
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lab-copilot")]
#[command(about = "Profile, filter, aggregate and chart tabular lab data")]
#[command(version)]
struct Args {
    /// CSV, Excel or ZIP file to load
    file: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Per-column metadata for every table in the file
    Profile,
    /// Descriptive statistics
    Describe,
    /// Keep rows matching a boolean expression, e.g. "age > 30 and gene_A < 0.5"
    Filter {
        expression: String,

        /// Maximum rows to print
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
    /// Group by one column and reduce another
    Aggregate {
        group_column: String,
        value_column: String,

        /// mean, sum, count, min, max, median or std
        #[arg(long, default_value = "mean")]
        func: String,
    },
    /// Emit a Plotly figure as JSON
    Plot {
        /// bar, pie, scatter, line, histogram or box
        plot_type: String,
        x_column: String,

        #[arg(long)]
        y: Option<String>,

        #[arg(long)]
        title: Option<String>,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let value = to_safe_value(value)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn load(path: &PathBuf) -> Result<Vec<(String, DataFrame)>> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let upload = load_upload(&bytes, &filename)?;
    info!(
        "Loaded {} table(s) from {}",
        upload.tables.len(),
        path.display()
    );
    Ok(upload.tables)
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let tables = load(&args.file)?;

    if let Commands::Profile = args.command {
        let profiles = tables
            .iter()
            .map(|(name, df)| Ok(json!({"filename": name, "columns": profile(df)?})))
            .collect::<Result<Vec<_>>>()?;
        return print_json(&profiles);
    }

    // Everything else works on the last table, the one an upload makes active
    let Some((name, df)) = tables.last() else {
        bail!("No tables found in {}", args.file.display());
    };
    info!("Using table {}", name);

    match args.command {
        Commands::Profile => Ok(()),
        Commands::Describe => print_json(&describe(df)?),
        Commands::Filter { expression, limit } => {
            let result = filter(df, &expression)?;
            print_json(&json!({
                "row_count": result.height(),
                "data": frame_records(&result, Some(limit))?,
            }))
        }
        Commands::Aggregate {
            group_column,
            value_column,
            func,
        } => {
            let result = aggregate(df, &group_column, &value_column, &func)?;
            print_json(&frame_records(&result, None)?)
        }
        Commands::Plot {
            plot_type,
            x_column,
            y,
            title,
        } => print_json(&build_chart(
            df,
            &plot_type,
            &x_column,
            y.as_deref(),
            title.as_deref(),
        )?),
    }
}
