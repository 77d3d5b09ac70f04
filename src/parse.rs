use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use quakewatch::{FixedPosition, Scope};

#[derive(Parser)]
#[command(name = "quakewatch")]
#[command(about = "Browse recent earthquakes and report a felt quake")]
#[command(version = "0.1")]
pub(crate) struct Args {
    /// Feed source backing the event lists
    #[arg(short, long, value_enum, default_value = "static")]
    pub provider: ProviderKind,

    /// Base URL of the live query API
    #[arg(long, env = "QUAKEWATCH_QUERY_API")]
    pub query_api: Option<String>,

    /// Base URL of the pre-rendered latest-event files
    #[arg(long, env = "QUAKEWATCH_STATIC_FILES")]
    pub static_files: Option<String>,

    /// Base URL of the alternate seismic portal
    #[arg(long, env = "QUAKEWATCH_SEISMIC_PORTAL")]
    pub seismic_portal: Option<String>,

    /// Base URL of the reporting API
    #[arg(long, env = "QUAKEWATCH_GEOWEB")]
    pub geoweb: Option<String>,

    /// Request timeout in seconds
    #[arg(short, long, default_value = "10")]
    pub timeout: u64,

    /// File holding the device key, first-run flag and cached report
    #[arg(short, long, default_value = "quakewatch-cache.json")]
    pub store: String,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum ProviderKind {
    Static,
    Live,
    Portal,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// List recent events for a scope
    List {
        /// national, continental or global
        #[arg(long, default_value = "national")]
        scope: Scope,

        /// Refresh every scope concurrently before listing
        #[arg(short, long)]
        all: bool,

        /// Number of additional pages to load
        #[arg(long, default_value = "0")]
        pages: u32,

        /// Write the listed events to this CSV file
        #[arg(short, long)]
        output: Option<String>,

        #[command(flatten)]
        position: PositionArgs,
    },
    /// Show one event by id
    Show {
        id: String,

        #[command(flatten)]
        position: PositionArgs,
    },
    /// Submit a "felt it" report
    Report {
        #[command(flatten)]
        report: ReportArgs,

        #[command(flatten)]
        auth: AuthArgs,
    },
    /// Request a new device API key
    ApiKey {
        #[command(flatten)]
        auth: AuthArgs,
    },
    /// Send the report cached after a failed submission
    Resend {
        #[command(flatten)]
        auth: AuthArgs,
    },
}

#[derive(ClapArgs)]
pub(crate) struct PositionArgs {
    /// Latitude of the observer
    #[arg(long, requires = "lon", allow_negative_numbers = true)]
    pub lat: Option<f64>,

    /// Longitude of the observer
    #[arg(long, requires = "lat", allow_negative_numbers = true)]
    pub lon: Option<f64>,

    /// Horizontal accuracy of the position in metres
    #[arg(long)]
    pub accuracy: Option<f64>,
}

impl PositionArgs {
    pub fn fixed(&self) -> Option<FixedPosition> {
        Some(FixedPosition {
            latitude: self.lat?,
            longitude: self.lon?,
            accuracy: self.accuracy,
        })
    }
}

#[derive(ClapArgs)]
pub(crate) struct ReportArgs {
    /// Event the report refers to
    #[arg(long)]
    pub reference: Option<String>,

    #[command(flatten)]
    pub position: PositionArgs,

    #[arg(long)]
    pub postal_code: Option<String>,

    #[arg(long, default_value = "")]
    pub place: String,

    #[arg(long, default_value = "")]
    pub street: String,

    #[arg(long, default_value = "")]
    pub floor: String,

    /// Felt intensity class chosen by the user
    #[arg(long)]
    pub class: Option<u8>,

    #[arg(long)]
    pub comment: Option<String>,

    #[arg(long)]
    pub contact: Option<String>,

    /// Objects fell over or off shelves
    #[arg(long)]
    pub items_dropped: bool,

    /// Keep the report for `resend` if delivery fails
    #[arg(long)]
    pub cache_on_failure: bool,
}

#[derive(ClapArgs)]
pub(crate) struct AuthArgs {
    /// User for the reporting API's basic authorization
    #[arg(long, env = "QUAKEWATCH_AUTH_USER")]
    pub auth_user: String,

    /// Password for the reporting API's basic authorization
    #[arg(long, env = "QUAKEWATCH_AUTH_PASSWORD", hide_env_values = true)]
    pub auth_password: String,
}
