use clap::Parser;

/// This is a reconciliation program for the computing resources pledged, required and used by the funding agencies.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) The JSON configuration describing where the extracts are and how they are named.
    /// For more information about the file format, read the manual of the resource_accounting crate.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (directory) The root directory of the extracts. Setting this option overrides the dataRoot
    /// that may be specified with the --config option.
    #[clap(short, long, value_parser)]
    pub data: Option<String>,

    /// (default: the current year) The year to reconcile.
    #[clap(short, long, value_parser)]
    pub year: Option<i32>,

    /// (YYYY-MM, optional) If specified, the usage of this month is added to the table.
    /// The year is then taken from the month.
    #[clap(short, long, value_parser)]
    pub month: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the table will be written to the given
    /// location. Setting this option overrides the path that may be specified with the --config option.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (csv or json, default csv) The format of the table.
    #[clap(long, value_parser)]
    pub format: Option<String>,

    /// (file path) A reference file containing an expected table. If provided, pledgerec will
    /// check that the produced table matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
