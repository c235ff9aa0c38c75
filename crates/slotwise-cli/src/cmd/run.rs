use crate::output::{print_json, print_report};
use crate::root::config_root;
use anyhow::Context;
use slotwise_core::agents;
use slotwise_core::chain::ChainClient;
use slotwise_core::config::{ChainBackend, Config, WarnLevel};
use slotwise_core::scheduler::{discover_targets, Scheduler, SchedulerSettings};
use slotwise_core::sim::SimChain;
use slotwise_core::store::ActedEpochCache;
use slotwise_core::submit::BatchSubmitter;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;

pub fn run(config_path: &Path, max_steps: Option<u64>, json: bool) -> anyhow::Result<()> {
    let config = Config::load(config_path).context("failed to load config")?;
    for w in config.validate() {
        if w.level == WarnLevel::Warning {
            tracing::warn!("{}", w.message);
        }
    }
    config.ensure_valid()?;

    let root = config_root(config_path);
    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(async move {
        let chain: Arc<dyn ChainClient> = match config.chain.backend {
            ChainBackend::Sim => Arc::new(SimChain::new(config.chain.sim.clone())),
        };
        let targets = discover_targets(chain.as_ref(), &config.filter).await?;
        let cache = ActedEpochCache::open(config.cache.open(&root, config.agent)?)
            .context("failed to load acted-epoch cache")?;
        let executor = agents::build(&config)?;
        tracing::info!(agent = %config.agent, targets = targets.len(), "starting");

        let mut scheduler = Scheduler::new(
            chain,
            executor,
            cache,
            targets,
            SchedulerSettings::from_config(&config),
            BatchSubmitter::new(config.submit.policy()),
        );

        let shutdown = scheduler.shutdown_handle();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, stopping after current step");
                shutdown.store(true, Ordering::SeqCst);
            }
        });

        anyhow::Ok(scheduler.run(max_steps).await?)
    })?;

    match (report, json) {
        (Some(r), true) => print_json(&r)?,
        (Some(r), false) => print_report(&r),
        (None, true) => print_json(&serde_json::Value::Null)?,
        (None, false) => println!("No block processed."),
    }
    Ok(())
}
