//! Pattern analysis and recurring-charge commands

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use inflow_core::PatternAnalyzer;

use super::{format_cents, open_db, truncate};

pub fn cmd_analyze(db_path: &Path, no_encrypt: bool, org: i64, days: i64, json: bool) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;
    let start = (Utc::now() - Duration::days(days)).date_naive();

    let analyzer = PatternAnalyzer::new(db);
    let analysis = analyzer
        .analyze(org, start, None)
        .context("Pattern analysis failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
        return Ok(());
    }

    println!();
    println!(
        "📈 Spending Analysis  {} – {}",
        analysis.window_start, analysis.window_end
    );
    println!("   ─────────────────────────────────────────────────");

    if !analysis.recurring.is_empty() {
        println!();
        println!("   Recurring charges:");
        for p in &analysis.recurring {
            println!(
                "   🔁 {:<24} {:<9} {:>9}  {} charges, {:.0}% confidence, next ~{}",
                truncate(&p.merchant, 24),
                p.frequency,
                format_cents(p.average_amount_cents),
                p.occurrences,
                p.confidence,
                p.next_expected_date
            );
        }
    }

    if !analysis.categories.is_empty() {
        println!();
        println!("   By category:");
        for c in &analysis.categories {
            println!(
                "   {:<22} {:>10}  {:>5.1}%  ({} transactions, {}/month)",
                truncate(&c.category, 22),
                format_cents(c.total_cents),
                c.percent_of_total,
                c.transaction_count,
                format_cents(c.monthly_average_cents)
            );
        }
    }

    if !analysis.trends.is_empty() {
        println!();
        println!("   Month over month:");
        for t in &analysis.trends {
            let change = match t.change_percent {
                Some(pct) if pct >= 0.0 => format!("+{:.1}%", pct),
                Some(pct) => format!("{:.1}%", pct),
                None => "—".to_string(),
            };
            println!(
                "   {}  {:>10}  {:>8}  ({} transactions{})",
                t.month,
                format_cents(t.total_cents),
                change,
                t.transaction_count,
                t.dominant_category
                    .as_deref()
                    .map(|c| format!(", mostly {}", c))
                    .unwrap_or_default()
            );
        }
    }

    println!();
    println!(
        "   {} merchants across {} categories",
        analysis.summary.unique_merchants, analysis.summary.distinct_categories
    );
    if let Some(largest) = &analysis.summary.largest_expense {
        println!(
            "   Largest expense: {} at {} on {}",
            format_cents(largest.amount_cents),
            largest.merchant,
            largest.date
        );
    }
    println!(
        "   Average transaction: {}",
        format_cents(analysis.summary.average_transaction_cents)
    );

    Ok(())
}

pub fn cmd_recurring(db_path: &Path, no_encrypt: bool, org: i64, days: i64) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;
    let start = (Utc::now() - Duration::days(days)).date_naive();

    let analyzer = PatternAnalyzer::new(db);
    let patterns = analyzer
        .recurring(org, start, None)
        .context("Recurring detection failed")?;

    if patterns.is_empty() {
        println!("No recurring charges detected in the last {} days", days);
        return Ok(());
    }

    println!();
    println!("🔁 Recurring Charges ({} found)", patterns.len());
    println!("   ─────────────────────────────────────────────────");
    for p in &patterns {
        println!(
            "   {:<24} {:<9} {:>9}  {:<16} {} charges, {:.0}% confidence",
            truncate(&p.merchant, 24),
            p.frequency,
            format_cents(p.average_amount_cents),
            truncate(&p.category, 16),
            p.occurrences,
            p.confidence
        );
        println!(
            "      last {}, next expected ~{}",
            p.last_date, p.next_expected_date
        );
    }

    Ok(())
}
