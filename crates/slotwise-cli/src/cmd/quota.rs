use crate::output::{print_fields, print_json};
use anyhow::Context;
use slotwise_core::quota::{QuotaCalculator, WEEK_SECONDS};

pub fn run(
    budget: f64,
    targets: usize,
    at: Option<u64>,
    interval: u64,
    json: bool,
) -> anyhow::Result<()> {
    let calc = QuotaCalculator::new(WEEK_SECONDS, interval).context("invalid interval")?;
    let now = super::now_or(at);
    let expected = calc.expected_quota(now, budget, targets);

    if json {
        let value = serde_json::json!({
            "timestamp": now,
            "week_start": calc.week_start(now),
            "intervals_per_week": calc.intervals_per_week(),
            "intervals_elapsed": calc.intervals_elapsed(now),
            "next_interval_start": calc.next_interval_start(now),
            "expected_per_target": expected,
        });
        return print_json(&value);
    }

    print_fields(&[
        ("week start", calc.week_start(now).to_string()),
        (
            "intervals",
            format!(
                "{} of {} elapsed",
                calc.intervals_elapsed(now),
                calc.intervals_per_week()
            ),
        ),
        ("next interval", calc.next_interval_start(now).to_string()),
        ("expected/target", format!("{expected:.4}")),
    ]);
    Ok(())
}
