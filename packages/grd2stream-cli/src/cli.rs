use clap::{Args, Parser, Subcommand};
use grd2stream_rs::{BridgeMode, OutputFormat, SeedPoint};

#[derive(Parser)]
#[command(
    name = "flowline",
    version,
    about = "Trace streamlines through velocity grids with grd2stream",
    long_about = "Trace flowlines through a pair of velocity-component grids with grd2stream.\n\
                  grd2stream and its GMT 6 conda environment are installed on first use.\n\
                  Set $GRD2STREAM_CONDA_ROOT or use --conda-root to choose the conda install."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub toolchain: ToolchainArgs,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

/// Overrides for where conda and grd2stream live
#[derive(Args, Clone, Default)]
pub struct ToolchainArgs {
    /// JSON configuration file
    #[arg(long, env = "GRD2STREAM_CONFIG", global = true)]
    pub config: Option<String>,

    /// Conda install root
    #[arg(long, global = true)]
    pub conda_root: Option<String>,

    /// Name of the GMT conda environment
    #[arg(long, global = true)]
    pub env_name: Option<String>,

    /// Execution mode: auto, native or wsl
    #[arg(long, global = true, value_parser = parse_bridge)]
    pub bridge: Option<BridgeMode>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Trace a streamline and write it as GeoJSON
    Run(RunArgs),
    /// Install conda, the GMT environment and grd2stream
    Setup(SetupArgs),
    /// Show platform, resolved paths and installation state
    Status(StatusArgs),
    /// Convert saved grd2stream output to GeoJSON
    Parse(ParseArgs),
    /// Convert many saved grd2stream outputs
    Batch(BatchArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// First velocity-component grid (x direction)
    #[arg(long)]
    pub grid1: String,

    /// Second velocity-component grid (y direction)
    #[arg(long)]
    pub grid2: String,

    /// Seed coordinate as "x,y"; read from stdin when omitted
    #[arg(long, value_parser = parse_seed, allow_hyphen_values = true)]
    pub seed: Option<SeedPoint>,

    /// Trace against the flow direction
    #[arg(long, default_value_t = false)]
    pub backward: bool,

    /// Integration step size
    #[arg(long)]
    pub step_size: Option<f64>,

    /// Maximum integration time
    #[arg(long)]
    pub max_time: Option<f64>,

    /// Maximum number of integration steps
    #[arg(long)]
    pub max_steps: Option<u64>,

    /// Output columns: default, extended or extended-with-time
    #[arg(long, default_value = "default", value_parser = parse_format)]
    pub format: OutputFormat,

    /// Layer name written into the GeoJSON
    #[arg(long, default_value = "Streamline")]
    pub name: String,

    /// GeoJSON output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Also keep the raw grd2stream output in this file
    #[arg(long)]
    pub raw_output: Option<String>,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,

    /// Run the configured binary without checking the installation
    #[arg(long, default_value_t = false)]
    pub no_provision: bool,

    /// Install missing components and retry failed verification without asking
    #[arg(short, long, default_value_t = false)]
    pub yes: bool,

    /// Maximum reinstall attempts after a failed verification
    #[arg(long, default_value_t = 2)]
    pub max_retries: u32,

    /// Fail instead of skipping malformed output rows
    #[arg(long, default_value_t = false)]
    pub strict: bool,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct SetupArgs {
    /// Only report what is installed
    #[arg(long, default_value_t = false)]
    pub check: bool,

    /// Install without asking
    #[arg(short, long, default_value_t = false)]
    pub yes: bool,

    /// Do not install conda
    #[arg(long, default_value_t = false)]
    pub skip_runtime: bool,

    /// Do not create the GMT environment
    #[arg(long, default_value_t = false)]
    pub skip_env: bool,

    /// Do not build grd2stream
    #[arg(long, default_value_t = false)]
    pub skip_build: bool,

    /// Maximum reinstall attempts after a failed verification
    #[arg(long, default_value_t = 2)]
    pub max_retries: u32,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct ParseArgs {
    /// grd2stream output file, or "-" for stdin
    #[arg(long)]
    pub input: String,

    /// Output columns the file was produced with
    #[arg(long, default_value = "default", value_parser = parse_format)]
    pub format: OutputFormat,

    /// Layer name (default: input file stem)
    #[arg(long)]
    pub name: Option<String>,

    /// GeoJSON output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,

    /// Fail instead of skipping malformed rows
    #[arg(long, default_value_t = false)]
    pub strict: bool,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct BatchArgs {
    /// Glob pattern matching grd2stream output files (e.g., "runs/*.txt")
    #[arg(long)]
    pub pattern: String,

    /// Directory for one GeoJSON file per input (default: JSONL on stdout)
    #[arg(long)]
    pub output_dir: Option<String>,

    /// Output columns the files were produced with
    #[arg(long, default_value = "default", value_parser = parse_format)]
    pub format: OutputFormat,

    /// Keep going after a file fails
    #[arg(long, default_value_t = false)]
    pub continue_on_error: bool,

    /// List matching files and exit
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

pub fn parse_seed(s: &str) -> Result<SeedPoint, String> {
    s.parse()
}

pub fn parse_format(s: &str) -> Result<OutputFormat, String> {
    s.parse()
}

pub fn parse_bridge(s: &str) -> Result<BridgeMode, String> {
    s.parse()
}
