// Main function
rasterbq_tools::async_main!(run());

use anyhow::{anyhow, Context};
use rasterbq::inspect::RasterInfo;
use rasterbq::record::PixelType;
use rasterbq_tools::bigquery::*;
use rasterbq_tools::upload::upload_raster;
use rasterbq_tools::{utils::*, Result};
use std::path::Path;

async fn run() -> Result<()> {
    // Parse command line
    match parse_cmd_line() {
        Args::Upload(args) => upload(args).await,
        Args::Describe(args) => describe(args).await,
        Args::Info(args) => info(args),
    }
}

fn token_provider(credentials: Option<&Path>) -> Result<TokenProvider> {
    match credentials {
        Some(path) => TokenProvider::from_key_file(path),
        None => TokenProvider::from_env(),
    }
}

async fn upload(args: UploadArgs) -> Result<()> {
    let ds = read_dataset(&args.input)?;

    let total = if let Some(path) = &args.ndjson {
        let file = std::fs::File::create(path)
            .with_context(|| format!("creating output {}", path.display()))?;
        let mut sink = NdjsonSink {
            writer: std::io::BufWriter::new(file),
        };
        let total = upload_raster(&ds, &args.opts, &mut sink).await?;
        use std::io::Write;
        sink.writer.flush()?;
        total
    } else {
        let table = args
            .table
            .ok_or_else(|| anyhow!("no destination table given"))?;
        eprintln!("Loading raster file to table {}...", table);

        let client = BigQueryClient::new(token_provider(args.credentials.as_deref())?);
        let ty = PixelType::from_band_type(ds.rasterband(args.opts.band)?.band_type())?;
        client
            .ensure_table(&table, &record_schema(args.opts.band, ty, args.opts.quadbin))
            .await?;

        let mut sink = BigQuerySink {
            client: &client,
            table,
        };
        upload_raster(&ds, &args.opts, &mut sink).await?
    };

    eprintln!("Done. {} records written.", total);
    Ok(())
}

async fn describe(args: DescribeArgs) -> Result<()> {
    let client = BigQueryClient::new(token_provider(args.credentials.as_deref())?);
    let rows = client.peek_rows(&args.table, args.limit).await?;
    print_json(&rows)?;
    Ok(())
}

fn info(args: InfoArgs) -> Result<()> {
    let ds = read_dataset(&args.input)?;
    let info = RasterInfo::from_dataset(&ds)?;
    match &args.output {
        Some(path) => write_json(path, &info),
        None => print_json(&info),
    }
}

mod args;
use args::{parse_cmd_line, Args, DescribeArgs, InfoArgs, UploadArgs};
