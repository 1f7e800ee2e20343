//! LifeCAR platform metrics: daily rows from the CSV export, rolled up by
//! week and month.

use crate::bucket::{self, Accumulate, Aggregation};
use crate::dates::{self, MonthKey, WeekKey};
use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref ISO_DATE_REGEX: Regex = Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecarDaily {
    pub date: NaiveDate,
    pub spend: f64,
    pub followers: u64,
    pub interactions: u64,
    pub impressions: u64,
    pub private_messages: u64,
}

fn parse_float(field: Option<&str>) -> f64 {
    field
        .and_then(|f| f.trim().parse::<f64>().ok())
        .filter(|f| f.is_finite())
        .unwrap_or(0.0)
}

fn parse_count(field: Option<&str>) -> u64 {
    parse_float(field).max(0.0).trunc() as u64
}

/// Daily rows from a LifeCAR export, sorted by date.
///
/// Columns are positional: date, spend, followers, interactions,
/// impressions, private messages. Rows whose first column is not a
/// `YYYY-MM-DD` date (the header, the `合计` summary) are ignored.
pub fn parse_daily(text: &str) -> Vec<LifecarDaily> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.trim_start_matches('\u{feff}').as_bytes());

    let mut days: Vec<LifecarDaily> = reader
        .records()
        .filter_map(|record| record.ok())
        .filter(|record| record.len() >= 6)
        .filter_map(|record| {
            let raw_date = record.get(0)?;
            if !ISO_DATE_REGEX.is_match(raw_date) {
                return None;
            }
            let date = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d").ok()?;
            Some(LifecarDaily {
                date,
                spend: parse_float(record.get(1)),
                followers: parse_count(record.get(2)),
                interactions: parse_count(record.get(3)),
                impressions: parse_count(record.get(4)),
                private_messages: parse_count(record.get(5)),
            })
        })
        .collect();

    days.sort_by_key(|d| d.date);
    days
}

/// Inclusive date filter; an absent bound is open.
pub fn filter_by_date_range(
    days: &[LifecarDaily],
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Vec<LifecarDaily> {
    days.iter()
        .filter(|d| start.is_none_or(|s| d.date >= s))
        .filter(|d| end.is_none_or(|e| d.date <= e))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Totals {
    days: usize,
    spend: f64,
    followers: u64,
    interactions: u64,
    impressions: u64,
    private_messages: u64,
}

impl Accumulate<LifecarDaily> for Totals {
    fn add(&mut self, day: &LifecarDaily) {
        self.days += 1;
        self.spend += day.spend;
        self.followers += day.followers;
        self.interactions += day.interactions;
        self.impressions += day.impressions;
        self.private_messages += day.private_messages;
    }
}

impl Totals {
    fn avg_daily(&self, total: f64) -> f64 {
        if self.days > 0 {
            total / self.days as f64
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecarWeekly {
    pub week: WeekKey,
    pub total_spend: f64,
    pub total_followers: u64,
    pub total_interactions: u64,
    pub total_impressions: u64,
    pub total_private_messages: u64,
    pub avg_daily_spend: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecarMonthly {
    pub month: MonthKey,
    pub total_spend: f64,
    pub total_followers: u64,
    pub total_interactions: u64,
    pub total_impressions: u64,
    pub total_private_messages: u64,
    pub avg_daily_spend: f64,
    pub avg_daily_interactions: f64,
    /// Cost per thousand impressions.
    pub cpm: f64,
    /// Cost per interaction.
    pub cpi: f64,
}

pub fn aggregate_by_week(days: &[LifecarDaily]) -> Vec<LifecarWeekly> {
    let by_week: Aggregation<WeekKey, Totals> =
        bucket::aggregate(days, |d| Some(dates::week_key(d.date)));
    by_week
        .buckets
        .into_iter()
        .map(|(week, t)| LifecarWeekly {
            week,
            total_spend: t.spend,
            total_followers: t.followers,
            total_interactions: t.interactions,
            total_impressions: t.impressions,
            total_private_messages: t.private_messages,
            avg_daily_spend: t.avg_daily(t.spend),
        })
        .collect()
}

pub fn aggregate_by_month(days: &[LifecarDaily]) -> Vec<LifecarMonthly> {
    let by_month: Aggregation<MonthKey, Totals> =
        bucket::aggregate(days, |d| Some(dates::month_key(d.date)));
    by_month
        .buckets
        .into_iter()
        .map(|(month, t)| LifecarMonthly {
            month,
            total_spend: t.spend,
            total_followers: t.followers,
            total_interactions: t.interactions,
            total_impressions: t.impressions,
            total_private_messages: t.private_messages,
            avg_daily_spend: t.avg_daily(t.spend),
            avg_daily_interactions: t.avg_daily(t.interactions as f64),
            cpm: if t.impressions > 0 {
                t.spend / t.impressions as f64 * 1000.0
            } else {
                0.0
            },
            cpi: if t.interactions > 0 {
                t.spend / t.interactions as f64
            } else {
                0.0
            },
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LifecarReport {
    pub daily: Vec<LifecarDaily>,
    pub weekly: Vec<LifecarWeekly>,
    pub monthly: Vec<LifecarMonthly>,
}

pub fn build_report(text: &str, start: Option<NaiveDate>, end: Option<NaiveDate>) -> LifecarReport {
    let daily = filter_by_date_range(&parse_daily(text), start, end);
    LifecarReport {
        weekly: aggregate_by_week(&daily),
        monthly: aggregate_by_month(&daily),
        daily,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = "\u{feff}时间,消费,粉丝,互动,展现,私信
合计5条记录,65,9,63,8600,5
2025-07-31,20,3,20,2000,1
2025-07-29,10,1,10,1000,0
2025-08-01,15.5,2,13,2600,2
2025-08-04,19.5,3,20,3000,2
not-a-date,1,1,1,1,1
2025-08-05,1
";

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_dated_rows_in_order() {
        let days = parse_daily(EXPORT);
        let dates: Vec<NaiveDate> = days.iter().map(|d| d.date).collect();
        assert_eq!(
            dates,
            [ymd(2025, 7, 29), ymd(2025, 7, 31), ymd(2025, 8, 1), ymd(2025, 8, 4)]
        );
        assert_eq!(days[2].spend, 15.5);
        assert_eq!(days[2].impressions, 2600);
    }

    #[test]
    fn weekly_uses_shared_week_keys() {
        let weekly = aggregate_by_week(&parse_daily(EXPORT));
        let keys: Vec<String> = weekly.iter().map(|w| w.week.to_string()).collect();
        assert_eq!(keys, ["2025/wk31", "2025/wk32"]);

        assert_eq!(weekly[0].total_spend, 45.5);
        assert_eq!(weekly[0].total_followers, 6);
        assert!((weekly[0].avg_daily_spend - 45.5 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn monthly_ratios() {
        let monthly = aggregate_by_month(&parse_daily(EXPORT));
        assert_eq!(monthly.len(), 2);

        let july = &monthly[0];
        assert_eq!(july.month.to_string(), "2025-07");
        assert_eq!(july.total_spend, 30.0);
        assert_eq!(july.cpm, 30.0 / 3000.0 * 1000.0);
        assert_eq!(july.cpi, 1.0);
        assert_eq!(july.avg_daily_interactions, 15.0);
    }

    #[test]
    fn zero_denominators_give_zero_ratios() {
        let days = vec![LifecarDaily {
            date: ymd(2025, 9, 1),
            spend: 12.0,
            followers: 0,
            interactions: 0,
            impressions: 0,
            private_messages: 0,
        }];
        let monthly = aggregate_by_month(&days);
        assert_eq!(monthly[0].cpm, 0.0);
        assert_eq!(monthly[0].cpi, 0.0);
    }

    #[test]
    fn report_respects_date_range() {
        let report = build_report(EXPORT, Some(ymd(2025, 8, 1)), None);
        assert_eq!(report.daily.len(), 2);
        assert_eq!(report.monthly.len(), 1);
        assert_eq!(report.monthly[0].month.to_string(), "2025-08");

        let report = build_report(EXPORT, None, Some(ymd(2025, 7, 31)));
        assert_eq!(report.daily.len(), 2);

        let json = serde_json::to_value(&report.daily[0]).unwrap();
        assert_eq!(json["date"], "2025-07-29");
        assert_eq!(json["privateMessages"], 0);
    }
}
