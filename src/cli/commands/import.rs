//! Import command - bulk-populate the cache

use crate::cli::ImportArgs;
use crate::config::Config;
use crate::error::GateResult;
use crate::importer;
use console::style;

/// Run the bulk importer and print a summary.
pub async fn import(args: ImportArgs, config: &Config) -> GateResult<()> {
    let workers = if args.no_parallel {
        1
    } else {
        args.workers.unwrap_or(config.import.workers)
    };
    let bucket = args.bucket.unwrap_or_else(|| config.import.bucket.clone());

    let report = importer::run(config, &args.file, args.dest, workers, &bucket).await?;

    println!(
        "all done. total {}, {} {}, {} {}",
        report.total,
        style("success:").green(),
        report.succeeded,
        style("failed:").red(),
        report.failed,
    );
    Ok(())
}
