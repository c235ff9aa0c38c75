use crate::output::{print_json, print_table};
use anyhow::Context;
use slotwise_core::batch::{pack, BatchLimits};
use slotwise_core::types::{Payload, PendingAction};

pub fn run(
    max_batch_size: u64,
    max_targets: usize,
    specs: &[String],
    json: bool,
) -> anyhow::Result<()> {
    let actions = specs
        .iter()
        .map(|s| parse_spec(s))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let batches = pack(&actions, BatchLimits::new(max_batch_size, max_targets));

    if json {
        let value: Vec<Vec<serde_json::Value>> = batches
            .iter()
            .map(|b| {
                b.iter()
                    .map(|a| serde_json::json!({ "target": a.target, "units": a.size() }))
                    .collect()
            })
            .collect();
        return print_json(&value);
    }

    let rows: Vec<Vec<String>> = batches
        .iter()
        .enumerate()
        .map(|(i, b)| {
            let parts: Vec<String> = b.iter().map(|a| format!("{}={}", a.target, a.size())).collect();
            let total: u64 = b.iter().map(PendingAction::size).sum();
            vec![(i + 1).to_string(), total.to_string(), parts.join(" ")]
        })
        .collect();
    print_table(&["BATCH", "SIZE", "ACTIONS"], &rows);
    Ok(())
}

/// `target=units` into a quantity action. Epoch and slot are irrelevant to
/// packing and left at zero.
fn parse_spec(spec: &str) -> anyhow::Result<PendingAction> {
    let (target, units) = spec
        .split_once('=')
        .with_context(|| format!("expected target=units, got '{spec}'"))?;
    if target.is_empty() {
        anyhow::bail!("missing target in '{spec}'");
    }
    let units: u64 = units
        .trim()
        .parse()
        .with_context(|| format!("invalid units in '{spec}'"))?;
    Ok(PendingAction::new(target.trim(), 0, 0, Payload::Quantity { units }))
}
