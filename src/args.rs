use clap::Parser;

/// This is a ranked-choice poll tabulation program.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The JSON document holding the poll and its ballots. The expected shape is
    /// {"poll": {"prompt": ..., "choices": [...]}, "ballots": [{"rankOrder": [...]}, ...]}.
    #[clap(short, long, value_parser)]
    pub input: String,

    /// (file path, 'stdout' or empty) If specified, the outcome of the poll will be written in
    /// JSON format to the given location instead of the standard output.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path) A reference file containing the expected outcome in JSON format. If provided,
    /// pollrank will check that the tabulated outcome matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// Seed for the last-place tie-break. Runs with the same seed over the same ballots are
    /// fully reproducible. Defaults to a clock-derived value.
    #[clap(long, value_parser)]
    pub seed: Option<u64>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
