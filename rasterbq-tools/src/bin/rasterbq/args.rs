use clap::value_t;
use rasterbq_tools::{arg, args_parser, flag, opt};
use std::path::PathBuf;

use rasterbq::crs::Crs;
use rasterbq_tools::bigquery::TableRef;
use rasterbq_tools::upload::UploadOptions;

/// Program arguments
pub enum Args {
    Upload(UploadArgs),
    Describe(DescribeArgs),
    Info(InfoArgs),
}

pub struct UploadArgs {
    /// Raster input
    pub input: PathBuf,
    /// Destination table (absent for NDJSON output)
    pub table: Option<TableRef>,
    /// Write rows to a file instead of BigQuery
    pub ndjson: Option<PathBuf>,
    /// Service account key file
    pub credentials: Option<PathBuf>,
    pub opts: UploadOptions,
}

pub struct DescribeArgs {
    pub table: TableRef,
    pub limit: usize,
    pub credentials: Option<PathBuf>,
}

pub struct InfoArgs {
    pub input: PathBuf,
    /// Write the summary to a file instead of stdout
    pub output: Option<PathBuf>,
}

pub fn parse_cmd_line() -> Args {
    use clap::*;
    let matches = args_parser!("rasterbq")
        .about("Load raster files into BigQuery tables.")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommand(
            SubCommand::with_name("upload")
                .about("Upload one raster band as block records")
                .arg(
                    arg!("input")
                        .required(true)
                        .help("Input path (raster dataset)"),
                )
                .arg(
                    arg!("table")
                        .required_unless("ndjson")
                        .help("Destination table (project.dataset.table)"),
                )
                .arg(opt!("band").short("b").help("Band to upload (default: 1)"))
                .arg(
                    opt!("chunk size")
                        .short("c")
                        .help("Records per insert batch (default: 1000)"),
                )
                .arg(opt!("input crs").help("Override the raster CRS (e.g. EPSG:4326)"))
                .arg(flag!("quadbin").help("Attach a quadbin cell to every record"))
                .arg(
                    opt!("quadbin resolution")
                        .help("Quadbin resolution (default: picked from the block extent)"),
                )
                .arg(opt!("credentials").help(
                    "Service account key file (default: $GOOGLE_APPLICATION_CREDENTIALS)",
                ))
                .arg(
                    opt!("ndjson")
                        .help("Write rows to a newline-delimited JSON file instead of BigQuery"),
                ),
        )
        .subcommand(
            SubCommand::with_name("describe")
                .about("Print the first rows of an uploaded table")
                .arg(
                    arg!("table")
                        .required(true)
                        .help("Table to read (project.dataset.table)"),
                )
                .arg(
                    opt!("limit")
                        .short("n")
                        .help("Number of rows to fetch (default: 10)"),
                )
                .arg(opt!("credentials").help(
                    "Service account key file (default: $GOOGLE_APPLICATION_CREDENTIALS)",
                )),
        )
        .subcommand(
            SubCommand::with_name("info")
                .about("Print band and block information of a raster")
                .arg(
                    arg!("input")
                        .required(true)
                        .help("Input path (raster dataset)"),
                )
                .arg(
                    opt!("output")
                        .short("o")
                        .help("Write the summary to a file instead of stdout"),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        ("upload", Some(matches)) => {
            let input = value_t!(matches, "input", PathBuf).unwrap_or_else(|e| e.exit());
            let ndjson = value_t!(matches, "ndjson", PathBuf).ok();
            let table = if matches.is_present("table") {
                Some(value_t!(matches, "table", TableRef).unwrap_or_else(|e| e.exit()))
            } else {
                None
            };
            let opts = UploadOptions {
                band: value_t!(matches, "band", isize).unwrap_or_else(|_| 1),
                chunk_size: value_t!(matches, "chunk size", usize).unwrap_or_else(|_| 1000),
                input_crs: if matches.is_present("input crs") {
                    Some(value_t!(matches, "input crs", Crs).unwrap_or_else(|e| e.exit()))
                } else {
                    None
                },
                quadbin: matches.is_present("quadbin"),
                quadbin_resolution: value_t!(matches, "quadbin resolution", u8).ok(),
            };
            Args::Upload(UploadArgs {
                input,
                table,
                ndjson,
                credentials: value_t!(matches, "credentials", PathBuf).ok(),
                opts,
            })
        }
        ("describe", Some(matches)) => Args::Describe(DescribeArgs {
            table: value_t!(matches, "table", TableRef).unwrap_or_else(|e| e.exit()),
            limit: value_t!(matches, "limit", usize).unwrap_or_else(|_| 10),
            credentials: value_t!(matches, "credentials", PathBuf).ok(),
        }),
        ("info", Some(matches)) => Args::Info(InfoArgs {
            input: value_t!(matches, "input", PathBuf).unwrap_or_else(|e| e.exit()),
            output: value_t!(matches, "output", PathBuf).ok(),
        }),
        _ => unreachable!(),
    }
}
