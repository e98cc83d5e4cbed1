//! Pattern analysis over committed transactions
//!
//! Detects recurring charges and derives category, merchant and
//! month-over-month insights for an organization's transaction window.
//! Every result is ephemeral: a pure function of the store's current
//! state, recomputed on demand and never persisted.
//!
//! All money math is integer cents. Percentages and confidence scores are
//! computed as floats at the edges only.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{Datelike, NaiveDate, Utc};
use tracing::debug;

use crate::db::Database;
use crate::error::Result;
use crate::models::{
    AnalysisSummary, CategoryInsight, Frequency, LargestExpense, MerchantInsight,
    PatternAnalysis, RecurringPattern, Transaction, TrendInsight,
};

/// Minimum charges of a merchant/category group before a cadence is
/// considered
const MIN_OCCURRENCES: usize = 3;

/// Confidence scoring: base + per-occurrence bonus - interval jitter penalty
const CONFIDENCE_BASE: f64 = 45.0;
const CONFIDENCE_PER_OCCURRENCE: f64 = 10.0;
const CONFIDENCE_OCCURRENCE_CAP: usize = 6;
const CONFIDENCE_JITTER_WEIGHT: f64 = 30.0;
const CONFIDENCE_MAX: f64 = 95.0;

pub struct PatternAnalyzer {
    db: Database,
}

impl PatternAnalyzer {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Full analysis for an organization's posted-date window.
    /// `end = None` means "up to today".
    pub fn analyze(
        &self,
        organization_id: i64,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> Result<PatternAnalysis> {
        let transactions = self
            .db
            .transactions_in_window(organization_id, start, end)?;
        let window_end = end.unwrap_or_else(|| Utc::now().date_naive());
        debug!(
            organization_id,
            transactions = transactions.len(),
            start = %start,
            end = %window_end,
            "Running pattern analysis"
        );
        Ok(analyze_transactions(
            organization_id,
            start,
            window_end,
            &transactions,
        ))
    }

    /// Recurring charges only (cheaper than a full analysis)
    pub fn recurring(
        &self,
        organization_id: i64,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> Result<Vec<RecurringPattern>> {
        let transactions = self
            .db
            .transactions_in_window(organization_id, start, end)?;
        Ok(detect_recurring(&transactions))
    }
}

/// Analyze a transaction slice. Pure; the analyzer methods only add the
/// store lookup on top.
pub fn analyze_transactions(
    organization_id: i64,
    window_start: NaiveDate,
    window_end: NaiveDate,
    transactions: &[Transaction],
) -> PatternAnalysis {
    PatternAnalysis {
        organization_id,
        window_start,
        window_end,
        recurring: detect_recurring(transactions),
        categories: category_insights(transactions),
        merchants: merchant_insights(transactions),
        trends: trend_insights(transactions),
        summary: summarize(transactions),
    }
}

/// Detect recurring charges: same normalized merchant and primary
/// category with a steady inter-arrival interval matching one of the
/// cadence bands.
pub fn detect_recurring(transactions: &[Transaction]) -> Vec<RecurringPattern> {
    let mut groups: HashMap<(&str, &str), Vec<&Transaction>> = HashMap::new();
    for tx in transactions.iter().filter(|t| t.amount_cents < 0) {
        groups
            .entry((tx.merchant_normalized.as_str(), tx.primary_category()))
            .or_default()
            .push(tx);
    }

    let mut patterns = Vec::new();
    for ((merchant, category), group) in groups {
        if let Some(pattern) = pattern_from_group(merchant, category, &group) {
            patterns.push(pattern);
        }
    }

    patterns.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.merchant.cmp(&b.merchant))
    });
    patterns
}

fn pattern_from_group(
    merchant: &str,
    category: &str,
    group: &[&Transaction],
) -> Option<RecurringPattern> {
    let mut dates: Vec<NaiveDate> = group.iter().map(|t| t.posted_date).collect();
    dates.sort();
    dates.dedup();
    if dates.len() < MIN_OCCURRENCES {
        return None;
    }

    let gaps: Vec<i64> = dates
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).num_days())
        .collect();
    let mean_gap = gaps.iter().sum::<i64>() as f64 / gaps.len() as f64;
    let frequency = Frequency::classify(mean_gap)?;

    // Every individual gap must also sit inside the band; a mean that
    // happens to land on 30 from gaps of 10 and 50 is not a pattern
    let (expected, tolerance) = frequency.band();
    if gaps
        .iter()
        .any(|gap| (gap - expected).abs() > tolerance)
    {
        return None;
    }

    let jitter = gaps
        .iter()
        .map(|gap| (gap - expected).abs() as f64)
        .sum::<f64>()
        / gaps.len() as f64;
    let confidence = (CONFIDENCE_BASE
        + CONFIDENCE_PER_OCCURRENCE * dates.len().min(CONFIDENCE_OCCURRENCE_CAP) as f64
        - CONFIDENCE_JITTER_WEIGHT * (jitter / tolerance as f64))
        .clamp(0.0, CONFIDENCE_MAX);

    let total: i64 = group.iter().map(|t| t.amount_cents.abs()).sum();
    let last_date = *dates.last().expect("group is non-empty");

    Some(RecurringPattern {
        merchant: merchant.to_string(),
        category: category.to_string(),
        frequency,
        occurrences: dates.len(),
        average_amount_cents: total / group.len() as i64,
        confidence,
        last_date,
        next_expected_date: last_date + chrono::Duration::days(median(&gaps)),
    })
}

/// Median of observed gaps in whole days; even-length runs average the
/// two middle values
fn median(values: &[i64]) -> i64 {
    let mut gaps = values.to_vec();
    gaps.sort();
    let mid = gaps.len() / 2;
    if gaps.len() % 2 == 1 {
        gaps[mid]
    } else {
        (gaps[mid - 1] + gaps[mid]) / 2
    }
}

/// Per-category spend aggregates, expenses only. A split transaction
/// contributes to each of its categories proportionally to the split
/// percentage.
pub fn category_insights(transactions: &[Transaction]) -> Vec<CategoryInsight> {
    struct Acc {
        total_cents: i64,
        transaction_count: usize,
    }

    let mut by_category: HashMap<&str, Acc> = HashMap::new();
    let mut months: HashSet<(i32, u32)> = HashSet::new();
    for tx in transactions.iter().filter(|t| t.amount_cents < 0) {
        months.insert((tx.posted_date.year(), tx.posted_date.month()));
        for split in &tx.splits {
            let share = split_cents(tx.amount_cents.abs(), split.percentage);
            if share == 0 {
                continue;
            }
            let acc = by_category.entry(split.category.as_str()).or_insert(Acc {
                total_cents: 0,
                transaction_count: 0,
            });
            acc.total_cents += share;
            acc.transaction_count += 1;
        }
    }

    let grand_total: i64 = by_category.values().map(|a| a.total_cents).sum();
    let month_count = months.len().max(1) as i64;

    let mut insights: Vec<CategoryInsight> = by_category
        .into_iter()
        .map(|(category, acc)| CategoryInsight {
            category: category.to_string(),
            total_cents: acc.total_cents,
            transaction_count: acc.transaction_count,
            average_cents: acc.total_cents / acc.transaction_count.max(1) as i64,
            monthly_average_cents: acc.total_cents / month_count,
            percent_of_total: if grand_total > 0 {
                acc.total_cents as f64 / grand_total as f64 * 100.0
            } else {
                0.0
            },
        })
        .collect();
    insights.sort_by(|a, b| b.total_cents.cmp(&a.total_cents));
    insights
}

/// Per-merchant spend aggregates, expenses only
pub fn merchant_insights(transactions: &[Transaction]) -> Vec<MerchantInsight> {
    struct Acc {
        total_cents: i64,
        transaction_count: usize,
        categories: HashSet<String>,
        first_seen: NaiveDate,
        last_seen: NaiveDate,
    }

    let mut by_merchant: HashMap<&str, Acc> = HashMap::new();
    for tx in transactions.iter().filter(|t| t.amount_cents < 0) {
        let acc = by_merchant
            .entry(tx.merchant_normalized.as_str())
            .or_insert(Acc {
                total_cents: 0,
                transaction_count: 0,
                categories: HashSet::new(),
                first_seen: tx.posted_date,
                last_seen: tx.posted_date,
            });
        acc.total_cents += tx.amount_cents.abs();
        acc.transaction_count += 1;
        for split in &tx.splits {
            acc.categories.insert(split.category.clone());
        }
        acc.first_seen = acc.first_seen.min(tx.posted_date);
        acc.last_seen = acc.last_seen.max(tx.posted_date);
    }

    let mut insights: Vec<MerchantInsight> = by_merchant
        .into_iter()
        .map(|(merchant, acc)| MerchantInsight {
            merchant: merchant.to_string(),
            total_cents: acc.total_cents,
            transaction_count: acc.transaction_count,
            distinct_categories: acc.categories.len(),
            first_seen: acc.first_seen,
            last_seen: acc.last_seen,
        })
        .collect();
    insights.sort_by(|a, b| b.total_cents.cmp(&a.total_cents));
    insights
}

/// Month-over-month spend trend, expenses only, chronological. Only
/// months with at least one expense appear; `change_percent` compares
/// each month against the previous spending month, so a month after a
/// gap is measured against the last month that had spend. The first
/// month has no baseline and its `change_percent` is None.
pub fn trend_insights(transactions: &[Transaction]) -> Vec<TrendInsight> {
    struct Acc {
        total_cents: i64,
        transaction_count: usize,
        by_category: HashMap<String, i64>,
    }

    // BTreeMap keeps "YYYY-MM" keys chronologically sorted
    let mut by_month: BTreeMap<String, Acc> = BTreeMap::new();
    for tx in transactions.iter().filter(|t| t.amount_cents < 0) {
        let month = format!("{:04}-{:02}", tx.posted_date.year(), tx.posted_date.month());
        let acc = by_month.entry(month).or_insert(Acc {
            total_cents: 0,
            transaction_count: 0,
            by_category: HashMap::new(),
        });
        acc.total_cents += tx.amount_cents.abs();
        acc.transaction_count += 1;
        for split in &tx.splits {
            *acc.by_category.entry(split.category.clone()).or_default() +=
                split_cents(tx.amount_cents.abs(), split.percentage);
        }
    }

    let mut trends = Vec::with_capacity(by_month.len());
    let mut previous_total: Option<i64> = None;
    for (month, acc) in by_month {
        let change_percent = match previous_total {
            Some(prev) if prev > 0 => {
                Some((acc.total_cents - prev) as f64 / prev as f64 * 100.0)
            }
            _ => None,
        };
        let dominant_category = acc
            .by_category
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(category, _)| category.clone());
        previous_total = Some(acc.total_cents);
        trends.push(TrendInsight {
            month,
            total_cents: acc.total_cents,
            transaction_count: acc.transaction_count,
            dominant_category,
            change_percent,
        });
    }
    trends
}

/// Window-level totals and the single largest expense
pub fn summarize(transactions: &[Transaction]) -> AnalysisSummary {
    let expenses: Vec<&Transaction> = transactions
        .iter()
        .filter(|t| t.amount_cents < 0)
        .collect();

    let merchants: HashSet<&str> = expenses
        .iter()
        .map(|t| t.merchant_normalized.as_str())
        .collect();
    let categories: HashSet<&str> = expenses
        .iter()
        .flat_map(|t| t.splits.iter().map(|s| s.category.as_str()))
        .collect();

    let largest_expense = expenses
        .iter()
        .min_by_key(|t| t.amount_cents)
        .map(|t| LargestExpense {
            merchant: t.merchant_normalized.clone(),
            amount_cents: t.amount_cents.abs(),
            date: t.posted_date,
        });

    let total: i64 = expenses.iter().map(|t| t.amount_cents.abs()).sum();
    AnalysisSummary {
        unique_merchants: merchants.len(),
        distinct_categories: categories.len(),
        largest_expense,
        average_transaction_cents: total / expenses.len().max(1) as i64,
    }
}

/// A split's share of an absolute amount, rounded to whole cents
fn split_cents(abs_amount_cents: i64, percentage: f64) -> i64 {
    (abs_amount_cents as f64 * percentage / 100.0).round() as i64
}
