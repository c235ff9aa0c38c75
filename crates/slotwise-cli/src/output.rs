use serde::Serialize;
use slotwise_core::report::CycleReport;
use slotwise_core::types::Outcome;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Left-aligned columns separated by two spaces, with a dashed rule under
/// the header.
pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.len());
        }
    }

    let line = |cells: Vec<&str>| {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(c, &w)| format!("{c:w$}"))
            .collect();
        println!("{}", padded.join("  ").trim_end());
    };

    let rule: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    line(headers.to_vec());
    line(rule.iter().map(String::as_str).collect());
    for row in rows {
        line(row.iter().map(String::as_str).collect());
    }
}

/// Key/value lines with the keys aligned.
pub fn print_fields(fields: &[(&str, String)]) {
    let width = fields.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    for (k, v) in fields {
        println!("{k:width$}  {v}");
    }
}

pub fn print_report(report: &CycleReport) {
    if report.entries.is_empty() {
        println!(
            "block {}: nothing due ({} agent)",
            report.block.number, report.agent
        );
        return;
    }
    let rows: Vec<Vec<String>> = report
        .entries
        .iter()
        .map(|e| {
            let detail = match &e.outcome {
                Outcome::Success { tx_ref } => tx_ref.clone(),
                Outcome::Reverted { reason, .. } => reason.clone(),
                Outcome::Skipped { reason } => reason.to_string(),
            };
            vec![
                e.target.clone(),
                e.epoch.to_string(),
                e.size.to_string(),
                e.outcome.label().to_string(),
                detail,
            ]
        })
        .collect();
    print_table(&["TARGET", "EPOCH", "SIZE", "OUTCOME", "DETAIL"], &rows);
    println!(
        "\nblock {}: {} succeeded, {} failed",
        report.block.number,
        report.successes(),
        report.failures()
    );
}
