use anyhow::Context;
use stalegate_config::StalegateConfig;
use stalegate_core::Master;
use tracing::{error, warn};
use utils::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cfg = StalegateConfig::load().context("failed to load configuration")?;

    let report = cfg.validate();
    for warning in report.warnings() {
        warn!(target: "stalegate::config", "{warning}");
    }
    if report.has_errors() {
        for err in report.errors() {
            error!(target: "stalegate::config", "{err}");
        }
        anyhow::bail!("invalid configuration:\n{}", report.format());
    }
    cfg.log_summary();

    let master = Master::new(cfg)?;
    master.run().await
}
