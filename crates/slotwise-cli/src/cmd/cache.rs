use crate::output::{print_json, print_table};
use crate::root::config_root;
use anyhow::Context;
use clap::Subcommand;
use slotwise_core::config::Config;
use slotwise_core::store::EpochStore;
use std::path::Path;

#[derive(Subcommand)]
pub enum CacheSubcommand {
    /// List the last acted epoch per target
    Show,

    /// Record an epoch for a target, overwriting whatever is stored
    Set { target: String, epoch: u64 },

    /// Forget one target, or every target when none is given
    Reset { target: Option<String> },
}

pub fn run(config_path: &Path, subcmd: CacheSubcommand, json: bool) -> anyhow::Result<()> {
    let config = Config::load(config_path).context("failed to load config")?;
    let root = config_root(config_path);
    let mut store = config
        .cache
        .open(&root, config.agent)
        .context("failed to open acted-epoch cache")?;

    match subcmd {
        CacheSubcommand::Show => show(store.as_ref(), json),
        CacheSubcommand::Set { target, epoch } => {
            store.save(&target, epoch)?;
            println!("{target}: epoch {epoch}");
            Ok(())
        }
        CacheSubcommand::Reset { target: Some(target) } => {
            if store.remove(&target)? {
                println!("Forgot {target}");
            } else {
                println!("{target} had no record");
            }
            Ok(())
        }
        CacheSubcommand::Reset { target: None } => {
            let all = store.load_all()?;
            for target in all.keys() {
                store.remove(target)?;
            }
            println!("Forgot {} target(s)", all.len());
            Ok(())
        }
    }
}

fn show(store: &dyn EpochStore, json: bool) -> anyhow::Result<()> {
    let records = store.load_all()?;
    if json {
        return print_json(&records);
    }
    if records.is_empty() {
        println!("No epochs recorded.");
        return Ok(());
    }
    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|(t, e)| vec![t.clone(), e.to_string()])
        .collect();
    print_table(&["TARGET", "LAST EPOCH"], &rows);
    Ok(())
}
