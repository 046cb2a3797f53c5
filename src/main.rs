use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use std::{
    io::Write,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use sales_ranking::{
    output, render, Config, Consolidated, GroupRegistry, Metric, NegativeTonnage, Period, Pipeline,
    Summary, Table, TextRenderer,
};

/// Ranks the products of a sales export by tonnage, revenue and margin.
///
/// Writes one text report per metric, a general summary and a consolidated
/// workbook into a `Sales Ranking - <Month> <Year>` directory.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Sales export: a CSV file, or an xlsx/xlsm/xls/ods workbook
    input: PathBuf,

    /// TOML config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Product groups file, one `GROUP NAME | code, code` per line
    /// [default: the built-in group table]
    #[arg(short, long, value_name = "FILE")]
    groups: Option<PathBuf>,

    /// Worksheet to read [default: the first one]
    #[arg(long)]
    sheet: Option<String>,

    /// Zero-based row holding the column names [default: 8]
    #[arg(long, value_name = "ROW")]
    header_row: Option<usize>,

    /// Entries per ranking page [default: 5]
    #[arg(short, long, value_name = "N")]
    page_size: Option<NonZeroUsize>,

    /// Metrics to rank by, comma-separated [default: tonnage,revenue,margin]
    #[arg(short, long, value_delimiter = ',', value_parser = parse_metric)]
    metrics: Vec<Metric>,

    /// Directory to write the reports under [default: .]
    #[arg(short, long, value_name = "DIR")]
    out: Option<PathBuf>,

    /// Free bytes the output directory needs before each report is written;
    /// 0 turns the check off [default: 1 GiB]
    #[arg(long, value_name = "BYTES")]
    min_free_space: Option<u64>,

    /// Leave rows with negative real quantity out of the tonnage ranking
    #[arg(long)]
    drop_negative_tonnage: bool,

    /// Don't write the general summary
    #[arg(long)]
    no_summary: bool,

    /// Don't write the consolidated workbook
    #[arg(long)]
    no_consolidated: bool,

    /// Log more detail (repeat for trace output)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    /// Loads the config file, if any, and applies the command-line overrides.
    fn config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)
                .with_context(|| format!("reading config {}", path.display()))?,
            None => Config::default(),
        };
        if let Some(groups) = &self.groups {
            config.groups = Some(groups.clone());
        }
        if let Some(sheet) = &self.sheet {
            config.sheet = Some(sheet.clone());
        }
        if let Some(row) = self.header_row {
            config.header_row = row;
        }
        if let Some(size) = self.page_size {
            config.page_size = size;
        }
        if !self.metrics.is_empty() {
            config.metrics.clone_from(&self.metrics);
        }
        if let Some(out) = &self.out {
            config.output_dir.clone_from(out);
        }
        if let Some(bytes) = self.min_free_space {
            config.min_free_space = bytes;
        }
        if self.drop_negative_tonnage {
            config.negative_tonnage = NegativeTonnage::Exclude;
        }
        Ok(config)
    }
}

fn parse_metric(s: &str) -> std::result::Result<Metric, String> {
    s.parse().map_err(|e: sales_ranking::Error| e.to_string())
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    let config = args.config()?;

    let groups = match &config.groups {
        Some(path) => GroupRegistry::from_file(path)
            .with_context(|| format!("reading groups {}", path.display()))?,
        None => GroupRegistry::builtin()?,
    };
    let table = Table::from_path(&args.input, &config)
        .with_context(|| format!("reading {}", args.input.display()))?;
    if table.skipped() > 0 {
        warn!(skipped = table.skipped(), "some rows could not be loaded");
    }
    info!(rows = table.rows().len(), groups = groups.len(), "loaded export");

    let period = Period::of_table(&table);
    let dir = output::create_report_dir(&config.output_dir, period)?;
    let pipeline = Pipeline::from_config(&groups, &config);
    let mut failed = 0;
    for &metric in &config.metrics {
        if let Err(err) = write_ranking(&pipeline, &table, metric, &dir, &config) {
            error!(%metric, "ranking failed: {err:#}");
            failed += 1;
        }
    }
    if !args.no_summary {
        if let Err(err) = write_summary(&table, &config, &dir, period) {
            error!("summary failed: {err:#}");
            failed += 1;
        }
    }
    if !args.no_consolidated {
        if let Err(err) = write_consolidated(&table, &groups, &config, &dir, period) {
            error!("consolidated workbook failed: {err:#}");
            failed += 1;
        }
    }
    if failed > 0 {
        bail!("{failed} report(s) failed");
    }
    info!(dir = %dir.display(), "done");
    Ok(())
}

fn write_ranking(
    pipeline: &Pipeline<'_>,
    table: &Table,
    metric: Metric,
    dir: &Path,
    config: &Config,
) -> Result<()> {
    let report = pipeline.run(table, metric);
    if report.is_empty() {
        warn!(%metric, "no rows to rank");
    }
    output::ensure_free_space(dir, config.min_free_space)?;
    let path = dir.join(output::metric_file_name(metric, report.period, config.page_size));
    output::write_atomically(&path, |file| {
        let mut text = TextRenderer::new(String::new());
        render(&report, &mut text)?;
        file.write_all(text.into_inner().as_bytes())?;
        Ok(())
    })
    .with_context(|| format!("writing {}", path.display()))?;
    info!(%metric, path = %path.display(), "wrote ranking");
    Ok(())
}

fn write_summary(table: &Table, config: &Config, dir: &Path, period: Option<Period>) -> Result<()> {
    let summary = Summary::build(table, &config.columns)?;
    output::ensure_free_space(dir, config.min_free_space)?;
    let path = dir.join(output::summary_file_name(period));
    output::write_atomically(&path, |file| Ok(write!(file, "{summary}")?))
        .with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), "wrote summary");
    Ok(())
}

fn write_consolidated(
    table: &Table,
    groups: &GroupRegistry,
    config: &Config,
    dir: &Path,
    period: Option<Period>,
) -> Result<()> {
    let consolidated = Consolidated::build(table, groups, &config.columns)?;
    output::ensure_free_space(dir, config.min_free_space)?;
    let path = dir.join(output::workbook_file_name(period));
    consolidated
        .write_xlsx(&path)
        .with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), rows = consolidated.rows.len(), "wrote consolidated workbook");
    Ok(())
}
