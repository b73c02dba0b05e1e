use anyhow::Context;
use log::info;
use syracuse_pb::AnalysisConfig;

#[global_allocator]
static ALLOC: snmalloc_rs::SnMalloc = snmalloc_rs::SnMalloc;

fn main() -> anyhow::Result<()> {
    // Setup logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AnalysisConfig::default();
    let report = syracuse_pb::run(&config)
        .with_context(|| format!("analysis of {} failed", config.in_dir.display()))?;

    info!(
        "Moran's I of mean soil lead: {:.4} (pseudo p = {:?})",
        report.moran.i, report.moran.p_sim
    );
    info!(
        "Spatial lag rho = {:.4}, pseudo R2 = {:.4}",
        report.ml_lag.rho, report.ml_lag.pr2
    );
    info!("Summary written to {}", report.outputs.summary.display());
    Ok(())
}
