use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use flatgeobuf::{filter, geojson as fgb_geojson, open_file_with_config, Config, Rect};

#[derive(Parser)]
#[command(author, version, about = "Read FlatGeobuf files or URLs, optionally filtered by bbox")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the decoded header: geometry type, columns, feature count,
    /// and whether a packed r-tree index is present.
    Info {
        /// FlatGeobuf file path or http(s):// URL
        source: String,
    },

    /// Stream matching features as newline-delimited GeoJSON
    /// (https://geojsonlines.org).
    Select {
        /// FlatGeobuf file path or http(s):// URL
        source: String,

        /// Bbox filter as "min_x,min_y,max_x,max_y". Omit to read every
        /// feature.
        #[arg(short, long)]
        bbox: Option<String>,

        /// Apply the exact polygon-vs-bbox post filter (spec §6's
        /// `intersects` collaborator) instead of accepting every node-level
        /// envelope hit. Has no effect without --bbox.
        #[arg(long)]
        exact: bool,

        /// Output file (use '-' or omit for stdout).
        #[arg(short, long, default_value = "-")]
        output: String,

        /// Override the default 256 KiB request-coalescing threshold.
        #[arg(long)]
        extra_request_threshold: Option<usize>,
    },
}

fn parse_bbox(s: &str) -> Result<Rect> {
    let parts: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .with_context(|| format!("bbox must be four comma-separated numbers, got {s:?}"))?;
    let [min_x, min_y, max_x, max_y] = parts[..] else {
        bail!("bbox must have exactly 4 components, got {}", parts.len());
    };
    Ok(Rect::new(min_x, min_y, max_x, max_y))
}

fn get_writer(output: &str) -> Result<Box<dyn Write>> {
    match output {
        "-" => Ok(Box::new(io::stdout())),
        path => Ok(Box::new(BufWriter::new(File::create(path)?))),
    }
}

fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

fn run_info(source: &str) -> Result<()> {
    if is_url(source) {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(async {
            let reader = flatgeobuf::open_http(source).await?;
            print_header(reader.header());
            anyhow::Ok(())
        })?;
    } else {
        let file = File::open(source).with_context(|| format!("opening {source}"))?;
        let reader = open_file_with_config(file, Config::default())?;
        print_header(reader.header());
    }
    Ok(())
}

fn print_header(header: &flatgeobuf::fb::HeaderMeta) {
    println!("geometry_type: {:?}", header.geometry_type);
    println!("features_count: {}", header.features_count);
    println!("index_node_size: {}", header.index_node_size);
    println!("columns:");
    for column in &header.columns {
        println!("  {} ({:?})", column.name, column.column_type);
    }
}

fn run_select(
    source: &str,
    bbox: Option<String>,
    exact: bool,
    output: &str,
    extra_request_threshold: Option<usize>,
) -> Result<()> {
    let rect = bbox.as_deref().map(parse_bbox).transpose()?;
    let config = match extra_request_threshold {
        Some(t) => Config::new(t),
        None => Config::default(),
    };
    let mut writer = get_writer(output)?;

    if is_url(source) {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(async {
            let mut reader = flatgeobuf::open_http_with_config(source, config).await?;
            let mut features = reader.select(rect).await?;
            while let Some(feature) = features.next().await {
                let feature = feature?;
                write_feature(&mut writer, &feature, rect, exact)?;
            }
            anyhow::Ok(())
        })?;
    } else {
        let file = File::open(source).with_context(|| format!("opening {source}"))?;
        let mut reader = open_file_with_config(file, config)?;
        let mut features = reader.select(rect)?;
        for feature in &mut features {
            let feature = feature?;
            write_feature(&mut writer, &feature, rect, exact)?;
        }
    }
    Ok(())
}

fn write_feature(
    writer: &mut dyn Write,
    feature: &flatgeobuf::Feature,
    rect: Option<Rect>,
    exact: bool,
) -> Result<()> {
    if exact {
        let Some(rect) = rect else {
            bail!("--exact requires --bbox");
        };
        let passes = feature
            .geometry
            .as_ref()
            .map(|g| filter::intersects_exact(g, rect))
            .unwrap_or(false);
        if !passes {
            return Ok(());
        }
    }
    let gj = fgb_geojson::to_geojson_feature(feature)?;
    writeln!(writer, "{}", serde_json::to_string(&gj)?)?;
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Info { source } => run_info(&source),
        Commands::Select {
            source,
            bbox,
            exact,
            output,
            extra_request_threshold,
        } => run_select(&source, bbox, exact, &output, extra_request_threshold),
    }
}
