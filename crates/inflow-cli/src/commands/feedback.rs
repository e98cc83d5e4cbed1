//! Category correction command

use std::path::Path;

use anyhow::{bail, Context, Result};
use inflow_core::{CategorySplit, FeedbackType};

use super::{format_cents, open_db};

/// A user correction is ground truth
const USER_CONFIDENCE: f64 = 100.0;

pub fn cmd_feedback(
    db_path: &Path,
    no_encrypt: bool,
    fingerprint: &str,
    splits: &str,
    kind: &str,
) -> Result<()> {
    let feedback_type: FeedbackType = kind
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))
        .context("Unknown feedback kind; expected manual_edit, quick_accept or quick_reject")?;
    let corrected = parse_splits(splits)?;

    let db = open_db(db_path, no_encrypt)?;
    let transaction = db
        .transaction_by_fingerprint(fingerprint)
        .context("Failed to look up transaction")?
        .with_context(|| format!("No transaction with fingerprint {}", fingerprint))?;

    let feedback = db
        .record_feedback(fingerprint, &transaction.splits, &corrected, feedback_type)
        .context("Failed to record feedback")?;

    println!(
        "✅ Recorded correction for {} {} on {}",
        transaction.merchant_normalized,
        format_cents(transaction.amount_cents),
        transaction.posted_date
    );
    for split in &feedback.corrected_splits {
        println!("   {} {:.0}%", split.category, split.percentage);
    }

    Ok(())
}

/// Parse "Groceries:60,Household:40" into a split list.
/// Validation of the percentages happens in the recorder.
fn parse_splits(input: &str) -> Result<Vec<CategorySplit>> {
    let mut splits = Vec::new();
    for pair in input.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let Some((category, percent)) = pair.rsplit_once(':') else {
            bail!("Malformed split '{}'; expected Category:percent", pair);
        };
        let percentage: f64 = percent
            .trim()
            .parse()
            .with_context(|| format!("Malformed percentage in '{}'", pair))?;
        splits.push(CategorySplit {
            category: category.trim().to_string(),
            percentage,
            confidence: USER_CONFIDENCE,
        });
    }
    if splits.is_empty() {
        bail!("No splits given; expected e.g. \"Groceries:60,Household:40\"");
    }
    Ok(splits)
}
