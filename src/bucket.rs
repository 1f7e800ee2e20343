//! Bucketing and gap-filling shared by every table that groups by period.

use crate::dates::{MonthKey, WeekKey};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Cost per lead used when no weekly cost history exists.
pub const DEFAULT_COST_PER_LEAD: f64 = 20.0;

/// Something that folds records of type `R` into a running total.
pub trait Accumulate<R>: Default {
    fn add(&mut self, record: &R);
}

// Plain record count.
impl<R> Accumulate<R> for usize {
    fn add(&mut self, _record: &R) {
        *self += 1;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation<K: Ord, A> {
    pub buckets: BTreeMap<K, A>,
    /// Records the key function could not place.
    pub skipped: usize,
}

impl<K: Ord, A> Aggregation<K, A> {
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// Groups `records` by `key`, folding each into its bucket's accumulator.
///
/// Every record either lands in exactly one bucket or is counted in
/// `skipped` when `key` returns `None`.
pub fn aggregate<'a, R, K, A, F>(records: impl IntoIterator<Item = &'a R>, key: F) -> Aggregation<K, A>
where
    R: 'a,
    K: Ord,
    A: Accumulate<R>,
    F: Fn(&R) -> Option<K>,
{
    let mut buckets: BTreeMap<K, A> = BTreeMap::new();
    let mut skipped = 0;

    for record in records {
        match key(record) {
            Some(k) => buckets.entry(k).or_default().add(record),
            None => skipped += 1,
        }
    }

    Aggregation { buckets, skipped }
}

fn is_false(b: &bool) -> bool {
    !*b
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyBucket {
    pub week: WeekKey,
    pub total_cost: f64,
    pub leads_total: u64,
    pub leads_price: f64,
    /// Synthesized from client counts rather than read from the cost sheet.
    #[serde(default, skip_serializing_if = "is_false")]
    pub estimated: bool,
}

impl WeeklyBucket {
    pub fn from_totals(week: WeekKey, total_cost: f64, leads_total: u64) -> Self {
        WeeklyBucket {
            week,
            total_cost,
            leads_total,
            leads_price: if leads_total > 0 {
                total_cost / leads_total as f64
            } else {
                0.0
            },
            estimated: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MonthlyBucket {
    pub month: MonthKey,
    pub cost: f64,
    pub count: u64,
}

/// Σ cost / Σ leads over `known`, or `None` when there are no leads to divide by.
pub fn average_cost_per_lead(known: &[WeeklyBucket]) -> Option<f64> {
    let leads: u64 = known.iter().map(|b| b.leads_total).sum();
    let cost: f64 = known.iter().map(|b| b.total_cost).sum();
    (leads > 0).then(|| cost / leads as f64)
}

/// Unions `known` with an estimated bucket for every week in `implied` that
/// `known` lacks, sorted chronologically.
///
/// `implied` maps week to the number of client records that fell in it. An
/// estimated bucket costs `count * average_cost_per_lead(known)`, falling back
/// to `default_cost_per_lead` without history.
pub fn fill_weekly_gaps(
    known: Vec<WeeklyBucket>,
    implied: &BTreeMap<WeekKey, usize>,
    default_cost_per_lead: f64,
) -> Vec<WeeklyBucket> {
    let existing: HashSet<WeekKey> = known.iter().map(|b| b.week).collect();
    let cost_per_lead = average_cost_per_lead(&known).unwrap_or(default_cost_per_lead);

    let mut weeks = known;
    for (week, &count) in implied {
        if existing.contains(week) {
            continue;
        }
        let leads = count as u64;
        let mut bucket = WeeklyBucket::from_totals(*week, leads as f64 * cost_per_lead, leads);
        bucket.estimated = true;
        weeks.push(bucket);
    }

    weeks.sort_by_key(|b| b.week.sort_index());
    weeks
}

/// Pairs each cost-sheet month with its client count, then appends months
/// that have clients but no cost row at zero cost. Sorted by month.
pub fn merge_monthly(costs: Vec<(MonthKey, f64)>, counts: &BTreeMap<MonthKey, usize>) -> Vec<MonthlyBucket> {
    let mut months: Vec<MonthlyBucket> = costs
        .into_iter()
        .map(|(month, cost)| MonthlyBucket {
            month,
            cost,
            count: counts.get(&month).copied().unwrap_or(0) as u64,
        })
        .collect();

    let present: HashSet<MonthKey> = months.iter().map(|m| m.month).collect();
    for (month, &count) in counts {
        if !present.contains(month) {
            months.push(MonthlyBucket {
                month: *month,
                cost: 0.0,
                count: count as u64,
            });
        }
    }

    months.sort_by_key(|m| m.month);
    months
}
