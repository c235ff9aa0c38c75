use crate::output::{print_fields, print_json};
use slotwise_core::clock::EpochPosition;

pub fn run(seconds_per_epoch: u64, at: Option<u64>, json: bool) -> anyhow::Result<()> {
    let now = super::now_or(at);
    let Some(pos) = EpochPosition::at(now, seconds_per_epoch) else {
        anyhow::bail!("seconds per epoch must be greater than zero");
    };

    if json {
        let value = serde_json::json!({
            "timestamp": now,
            "position": pos,
            "next_slot": pos.next_slot(),
        });
        return print_json(&value);
    }

    print_fields(&[
        ("timestamp", now.to_string()),
        ("epoch", pos.epoch.to_string()),
        ("slot", pos.slot.to_string()),
        ("next slot", pos.next_slot().to_string()),
        ("elapsed", format!("{}s", pos.seconds_elapsed)),
        ("left", format!("{}s", pos.seconds_left)),
    ]);
    Ok(())
}
