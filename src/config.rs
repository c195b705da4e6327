//! Startup configuration.
//!
//! Every setting is a command-line flag with an environment variable
//! fallback, so the service runs unchanged on a container platform that only
//! sets `PORT` and `GCP_BUCKET_NAME`.

use std::path::PathBuf;
use std::time::Duration;

use clap::builder::FalseyValueParser;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};

use crate::converter::ConverterSettings;
use crate::crs::CrsMatch;
use crate::store::TransferPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    pub bucket: String,
    pub port: u16,
    pub signed_url_ttl: Duration,
    pub transfer_timeout: Duration,
    pub transfer_retries: u32,
    pub crs_match: CrsMatch,
    pub staging_dir: Option<PathBuf>,
    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,
    pub log_json: bool,
}

pub fn command() -> Command {
    Command::new("gis-converter")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Converts vector files stored in a bucket between formats and coordinate systems")
        .arg(
            Arg::new("bucket")
                .long("bucket")
                .env("GCP_BUCKET_NAME")
                .required(true)
                .help("Bucket holding source files and conversion results"),
        )
        .arg(
            Arg::new("port")
                .long("port")
                .env("PORT")
                .default_value("8080")
                .value_parser(value_parser!(u16))
                .help("Port to listen on"),
        )
        .arg(
            Arg::new("signed-url-ttl")
                .long("signed-url-ttl")
                .env("CONVERTER_SIGNED_URL_TTL_SECS")
                .default_value("900")
                .value_parser(value_parser!(u64).range(1..))
                .help("Seconds a returned download url stays valid"),
        )
        .arg(
            Arg::new("transfer-timeout")
                .long("transfer-timeout")
                .env("CONVERTER_TRANSFER_TIMEOUT_SECS")
                .default_value("120")
                .value_parser(value_parser!(u64).range(1..))
                .help("Timeout in seconds for each storage call"),
        )
        .arg(
            Arg::new("transfer-retries")
                .long("transfer-retries")
                .env("CONVERTER_TRANSFER_RETRIES")
                .default_value("0")
                .value_parser(value_parser!(u32))
                .help("Extra attempts after a transient storage failure"),
        )
        .arg(
            Arg::new("crs-match")
                .long("crs-match")
                .env("CONVERTER_CRS_MATCH")
                .default_value("exact")
                .value_parser(value_parser!(CrsMatch))
                .help("How input and output CRS identifiers are compared"),
        )
        .arg(
            Arg::new("staging-dir")
                .long("staging-dir")
                .env("CONVERTER_STAGING_DIR")
                .value_parser(value_parser!(PathBuf))
                .help("Directory for per-request staging areas (default: system temp dir)"),
        )
        .arg(
            Arg::new("log")
                .long("log")
                .env("CONVERTER_LOG")
                .default_value("info")
                .help("tracing filter; RUST_LOG takes precedence when set"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .env("CONVERTER_LOG_JSON")
                .action(ArgAction::SetTrue)
                .value_parser(FalseyValueParser::new())
                .help("Emit newline-delimited JSON log records"),
        )
}

impl Config {
    pub fn from_matches(matches: &ArgMatches) -> Self {
        let secs = |id: &str| Duration::from_secs(matches.get_one::<u64>(id).copied().unwrap_or_default());
        Self {
            bucket: matches.get_one::<String>("bucket").cloned().unwrap_or_default(),
            port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
            signed_url_ttl: secs("signed-url-ttl"),
            transfer_timeout: secs("transfer-timeout"),
            transfer_retries: matches.get_one::<u32>("transfer-retries").copied().unwrap_or(0),
            crs_match: matches.get_one::<CrsMatch>("crs-match").copied().unwrap_or_default(),
            staging_dir: matches.get_one::<PathBuf>("staging-dir").cloned(),
            log_level: matches
                .get_one::<String>("log")
                .cloned()
                .unwrap_or_else(|| "info".to_owned()),
            log_json: matches.get_flag("log-json"),
        }
    }

    pub fn converter_settings(&self) -> ConverterSettings {
        ConverterSettings {
            signed_url_ttl: self.signed_url_ttl,
            transfer: TransferPolicy {
                timeout: self.transfer_timeout,
                retries: self.transfer_retries,
            },
            crs_match: self.crs_match,
            staging_root: self.staging_dir.clone(),
        }
    }
}
