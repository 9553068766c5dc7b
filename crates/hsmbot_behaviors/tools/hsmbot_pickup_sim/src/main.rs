use anyhow::{bail, Context, Result};
use hsmbot_core::Outcome;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hsmbot_pickup_sim::config::Config;
use hsmbot_pickup_sim::sim;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let config = Config::from_args();

    let filter = EnvFilter::try_new(&config.log_level)
        .with_context(|| format!("parse log filter '{}'", config.log_level))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let runner = sim::build(&config).context("build pickup scenario")?;
    info!("{}", runner.dispatcher().graph().render());

    let mut firings = runner.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match firings.recv().await {
                Ok(record) => info!(
                    at = ?record.at,
                    "{} {} {}",
                    record.sources.join(","),
                    record.kind,
                    record.destinations.join(",")
                ),
                Err(RecvError::Lagged(n)) => warn!("firing stream lagged, {n} records skipped"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let summary = runner.run().await.context("pickup run")?;
    let _ = printer.await;

    for report in &summary.reports {
        info!(source = %report.source, kind = %report.kind, payload = ?report.payload, "root report");
    }
    info!(
        outcome = ?summary.outcome,
        firings = summary.firings,
        elapsed = ?summary.elapsed,
        "pickup finished"
    );

    match summary.outcome {
        Some(Outcome::Completed) => Ok(()),
        other => bail!("pickup did not complete: {other:?}"),
    }
}
