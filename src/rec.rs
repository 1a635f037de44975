use log::{debug, info, warn};

use resource_accounting::report::UsageColumns;
use resource_accounting::*;
use snafu::{prelude::*, Snafu};

use std::fs;
use std::path::Path;

use chrono::Datelike;
use serde_json::json;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::Args;
use crate::rec::config_reader::*;
use crate::rec::io_source::FsSource;

mod config_reader;
mod io_common;
mod io_source;
mod report_csv;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RecError {
    #[snafu(display("Error opening file {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("The workbook {path} has no worksheet"))]
    EmptyExcel { path: String },
    #[snafu(display("Error opening file {path}"))]
    OpeningCsv { source: csv::Error, path: String },
    #[snafu(display("Error reading line {lineno} of {path}"))]
    CsvLineParse {
        source: csv::Error,
        path: String,
        lineno: usize,
    },
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing the configuration {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error writing the output"))]
    SerializingJson { source: serde_json::Error },
    #[snafu(display("Error writing file {path}"))]
    WritingOutput {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Invalid month {value:?}, expected YYYY-MM"))]
    InvalidMonth { value: String },
    #[snafu(display("Invalid delimiter {value:?}, expected a single character"))]
    InvalidDelimiter { value: String },
    #[snafu(display("Unknown output format {value:?}, expected csv or json"))]
    UnknownFormat { value: String },
    #[snafu(display("Unknown membership status {value:?} for cluster {cluster}, expected MS or NMS"))]
    UnknownStatus { cluster: String, value: String },
    #[snafu(display("Reconciliation error"))]
    Accounting { source: AccountingError },
    #[snafu(display("Difference detected between the produced table and the reference {path}"))]
    ReferenceMismatch { path: String },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type BRecResult<T> = Result<T, Box<RecError>>;

fn fail<T>(message: String) -> BRecResult<T> {
    Err(Box::new(RecError::Whatever {
        message,
        source: None,
    }))
}

/// Everything needed for one run, once the configuration and the command
/// line are merged.
#[derive(Debug, Clone)]
struct RunSettings {
    layout: Layout,
    clusters: Vec<ClusterDefinition>,
    year: i32,
    month: Option<Month>,
    out: Option<String>,
    format: OutputFormat,
    reference: Option<String>,
    verbose: bool,
}

fn resolve_settings(args: &Args) -> BRecResult<RunSettings> {
    let (config, config_dir) = match &args.config {
        Some(p) => {
            let config = read_config(p)?;
            let dir = Path::new(p).parent().map(|d| d.to_path_buf());
            (config, dir)
        }
        None => (RecConfig::default(), None),
    };
    debug!("resolve_settings: config: {:?}", config);

    let month = match &args.month {
        Some(s) => Some(Month::parse(s).context(InvalidMonthSnafu { value: s.clone() })?),
        None => None,
    };
    let year = match (args.year, month) {
        (Some(y), Some(m)) if y != m.year => {
            return fail(format!("The year {} does not match the month {}", y, m));
        }
        (Some(y), _) => y,
        (None, Some(m)) => m.year,
        (None, None) => chrono::Local::now().year(),
    };

    let layout = Layout::new(&config, args.data.as_deref(), config_dir.as_deref())?;
    let clusters = config.cluster_definitions()?;
    let format_name = args
        .format
        .clone()
        .or_else(|| config.output_format.clone())
        .unwrap_or_else(|| "csv".to_string());

    Ok(RunSettings {
        layout,
        clusters,
        year,
        month,
        out: args.out.clone().or_else(|| config.output_path.clone()),
        format: OutputFormat::parse(&format_name)?,
        reference: args.reference.clone(),
        verbose: args.verbose,
    })
}

pub fn run(args: &Args) -> BRecResult<()> {
    let settings = resolve_settings(args)?;
    info!(
        "run: year {} month {:?} data {:?}",
        settings.year, settings.month, settings.layout
    );

    let source = FsSource::new(settings.layout.clone());
    let naming = source.naming_dictionary()?;
    let mut collab = Collaboration::new(naming).with_clusters(settings.clusters.clone());

    if !collab
        .ensure_year(&source, settings.year)
        .context(AccountingSnafu {})?
    {
        return fail(format!("No membership roster for {}", settings.year));
    }

    let usage = match settings.month {
        Some(month) => {
            if collab
                .ensure_month(&source, month)
                .context(AccountingSnafu {})?
            {
                Some(collab.usage_columns(month))
            } else {
                warn!("run: no usage report for {}, usage columns skipped", month);
                None
            }
        }
        None => None,
    };

    if settings.verbose {
        for m in collab.visible_members() {
            debug!("{}", m);
        }
    }

    let rendered = match settings.format {
        OutputFormat::Csv => report_csv::render(&collab, usage.as_ref()),
        OutputFormat::Json => {
            let js = build_summary_js(&collab, settings.year, usage.as_ref());
            serde_json::to_string_pretty(&js).context(SerializingJsonSnafu {})?
        }
    };

    write_output(settings.out.as_deref(), &rendered)?;

    if let Some(reference_path) = &settings.reference {
        check_reference(reference_path, &rendered)?;
    }
    Ok(())
}

fn build_summary_js(collab: &Collaboration, year: i32, usage: Option<&UsageColumns>) -> JSValue {
    json!({
        "year": year,
        "shortfallThresholdPct": report::SHORTFALL_THRESHOLD_PCT,
        "members": collab.list_members(),
        "totals": collab.totals(),
        "usage": usage,
    })
}

fn write_output(out: Option<&str>, rendered: &str) -> BRecResult<()> {
    match out {
        None | Some("") | Some("stdout") => {
            println!("{}", rendered);
        }
        Some(path) => {
            info!("write_output: writing {}", path);
            fs::write(path, rendered).context(WritingOutputSnafu { path })?;
        }
    }
    Ok(())
}

fn check_reference(path: &str, rendered: &str) -> BRecResult<()> {
    let reference = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    if reference.trim_end() != rendered.trim_end() {
        warn!("Found differences with the reference {}", path);
        print_diff(reference.trim_end(), rendered.trim_end(), "\n");
        return Err(Box::new(RecError::ReferenceMismatch {
            path: path.to_string(),
        }));
    }
    info!("check_reference: output matches {}", path);
    Ok(())
}
