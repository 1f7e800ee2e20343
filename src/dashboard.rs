//! Turns a marketing workbook into the dashboard tables.
//!
//! | table            | sheet                  |
//! |------------------|------------------------|
//! | broker_data      | `Clients_info（new）`  |
//! | weekly_data      | `weekly_data`          |
//! | monthly_data     | `monthly_data` (+ `monthly_count`) |
//! | daily_cost_data  | `database_marketing`   |
//!
//! Every column is looked up by its localized header first and an English
//! fallback second.

use crate::brokers::{self, BrokerShare};
use crate::bucket::{self, Aggregation, MonthlyBucket, WeeklyBucket};
use crate::cell::{CellValue, Row};
use crate::dates::{self, MonthKey, WeekKey};
use crate::spreadsheet::Workbook;
use chrono::NaiveDate;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const CLIENT_SHEET: &str = "Clients_info（new）";
pub const WEEKLY_SHEET: &str = "weekly_data";
pub const MONTHLY_SHEET: &str = "monthly_data";
pub const MONTHLY_COUNT_SHEET: &str = "monthly_count";
pub const DAILY_SHEET: &str = "database_marketing";

/// Daily spend is recorded in CNY; the dashboard reports AUD.
pub const CNY_PER_AUD: f64 = 4.72;

const NO: &[&str] = &["No.", "no"];
const BROKER: &[&str] = &["Broker", "broker"];
const CLIENT_DATE: &[&str] = &["日期", "date"];
const WECHAT: &[&str] = &["微信", "wechat"];
const SOURCE: &[&str] = &["来源", "source"];

const WEEK: &[&str] = &["Week", "week"];
const TOTAL_COST: &[&str] = &["消费总额（aud)", "totalCost"];
const LEADS_TOTAL: &[&str] = &["Leads总数", "leadsTotal"];
const LEADS_PRICE: &[&str] = &["Leads单价（aud）", "leadsPrice"];

const MONTH: &[&str] = &["月份", "month"];
const MONTH_COST: &[&str] = &["消费总额（aud)", "cost"];
const COUNT_MONTH: &[&str] = &["Month", "month"];
const COUNT: &[&str] = &["Count", "count"];

const DAILY_DATE: &[&str] = &["时间", "date"];
const DAILY_COST: &[&str] = &["消费", "cost"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessOptions {
    pub cny_per_aud: f64,
    pub default_cost_per_lead: f64,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        ProcessOptions {
            cny_per_aud: CNY_PER_AUD,
            default_cost_per_lead: bucket::DEFAULT_COST_PER_LEAD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRecord {
    pub no: CellValue,
    pub broker: String,
    /// Kept as found in the sheet: a day serial or a date string.
    pub date: CellValue,
    pub wechat: CellValue,
    pub source: CellValue,
}

impl ClientRecord {
    pub fn from_row(row: &Row) -> Self {
        ClientRecord {
            no: row.pick(NO),
            broker: brokers::canonical_broker(row.pick_text(BROKER).as_deref()),
            date: row.pick(CLIENT_DATE),
            wechat: row.pick(WECHAT),
            source: row.pick(SOURCE),
        }
    }

    pub fn resolved_date(&self) -> Option<NaiveDate> {
        dates::resolve(&self.date).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyCost {
    pub date: CellValue,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DashboardData {
    pub broker_data: Vec<ClientRecord>,
    pub weekly_data: Vec<WeeklyBucket>,
    pub monthly_data: Vec<MonthlyBucket>,
    pub daily_cost_data: Vec<DailyCost>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecordCounts {
    pub broker_data: usize,
    pub weekly_data: usize,
    pub monthly_data: usize,
    pub daily_cost_data: usize,
}

impl DashboardData {
    pub fn record_counts(&self) -> RecordCounts {
        RecordCounts {
            broker_data: self.broker_data.len(),
            weekly_data: self.weekly_data.len(),
            monthly_data: self.monthly_data.len(),
            daily_cost_data: self.daily_cost_data.len(),
        }
    }
}

/// Client count per week, skipping clients whose date does not resolve.
pub fn clients_by_week(clients: &[ClientRecord]) -> Aggregation<WeekKey, usize> {
    bucket::aggregate(clients, |c| c.resolved_date().map(dates::week_key))
}

pub fn clients_by_month(clients: &[ClientRecord]) -> Aggregation<MonthKey, usize> {
    bucket::aggregate(clients, |c| c.resolved_date().map(dates::month_key))
}

fn weekly_row(row: &Row) -> Option<WeeklyBucket> {
    let week = row.pick_text(WEEK)?.parse::<WeekKey>().ok()?;
    Some(WeeklyBucket {
        week,
        total_cost: row.pick_f64(TOTAL_COST),
        leads_total: row.pick_f64(LEADS_TOTAL).max(0.0).round() as u64,
        leads_price: row.pick_f64(LEADS_PRICE),
        estimated: false,
    })
}

fn read_weekly(rows: &[Row], clients: &[ClientRecord], options: &ProcessOptions) -> Vec<WeeklyBucket> {
    let mut known = Vec::with_capacity(rows.len());
    for row in rows {
        match weekly_row(row) {
            Some(bucket) => known.push(bucket),
            None => warn!("Skipping weekly row without a week key: {:?}", row.pick(WEEK)),
        }
    }
    known.sort_by_key(|b| b.week.sort_index());

    let by_week = clients_by_week(clients);
    let weeks = bucket::fill_weekly_gaps(known, &by_week.buckets, options.default_cost_per_lead);

    let total_leads: u64 = weeks.iter().map(|w| w.leads_total).sum();
    info!(
        "Enhanced weekly data: {} weeks, {} total leads",
        weeks.len(),
        total_leads
    );
    weeks
}

fn read_month_counts(rows: &[Row]) -> BTreeMap<MonthKey, usize> {
    let mut counts = BTreeMap::new();
    for row in rows {
        match MonthKey::from_cell(&row.pick(COUNT_MONTH)) {
            Some(month) => {
                *counts.entry(month).or_insert(0) += row.pick_f64(COUNT).max(0.0).round() as usize;
            }
            None => warn!("Skipping monthly_count row: {:?}", row.pick(COUNT_MONTH)),
        }
    }
    counts
}

fn read_monthly(workbook: &Workbook, rows: &[Row], clients: &[ClientRecord]) -> Vec<MonthlyBucket> {
    let mut costs = Vec::with_capacity(rows.len());
    for row in rows {
        match MonthKey::from_cell(&row.pick(MONTH)) {
            Some(month) => costs.push((month, row.pick_f64(MONTH_COST))),
            None => warn!("Skipping monthly row without a month: {:?}", row.pick(MONTH)),
        }
    }

    let counts = if clients.is_empty() {
        workbook
            .sheet(MONTHLY_COUNT_SHEET)
            .map(|sheet| read_month_counts(&sheet.rows))
            .unwrap_or_default()
    } else {
        clients_by_month(clients).buckets
    };

    let months = bucket::merge_monthly(costs, &counts);
    info!(
        "Processed {} monthly records with actual client counts",
        months.len()
    );
    months
}

/// Build every dashboard table the workbook has sheets for.
pub fn process_workbook(workbook: &Workbook, options: &ProcessOptions) -> DashboardData {
    let mut data = DashboardData::default();

    match workbook.sheet(CLIENT_SHEET) {
        Some(sheet) => {
            info!("Found {} raw client records", sheet.rows.len());
            data.broker_data = sheet.rows.iter().map(ClientRecord::from_row).collect();
            let skipped = clients_by_week(&data.broker_data).skipped;
            if skipped > 0 {
                warn!("{} client records have no usable date", skipped);
            }
        }
        None => info!(
            "Sheet {:?} not found. Available sheets: {:?}",
            CLIENT_SHEET,
            workbook.sheet_names()
        ),
    }

    if let Some(sheet) = workbook.sheet(WEEKLY_SHEET) {
        data.weekly_data = read_weekly(&sheet.rows, &data.broker_data, options);
    }

    if let Some(sheet) = workbook.sheet(MONTHLY_SHEET) {
        data.monthly_data = read_monthly(workbook, &sheet.rows, &data.broker_data);
    }

    if let Some(sheet) = workbook.sheet(DAILY_SHEET) {
        data.daily_cost_data = sheet
            .rows
            .iter()
            .map(|row| DailyCost {
                date: row.pick(DAILY_DATE),
                cost: row.pick_f64(DAILY_COST) / options.cny_per_aud,
            })
            .collect();
        info!("Processed {} daily cost records", data.daily_cost_data.len());
    }

    info!("Excel processing completed");
    data
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRange {
    pub start: String,
    pub end: String,
}

/// Headline numbers shown above the charts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overview {
    pub total_clients: usize,
    pub active_brokers: usize,
    /// Σ weekly cost / client count.
    pub average_cost_per_client: Option<f64>,
    pub date_range: Option<DataRange>,
    pub distribution: Vec<BrokerShare>,
}

pub fn overview(data: &DashboardData) -> Overview {
    let distribution = brokers::broker_distribution(data.broker_data.iter().map(|c| c.broker.as_str()));
    let total_clients = data.broker_data.len();
    let total_cost: f64 = data.weekly_data.iter().map(|w| w.total_cost).sum();

    let mut resolved: Vec<NaiveDate> = data
        .broker_data
        .iter()
        .filter_map(ClientRecord::resolved_date)
        .collect();
    resolved.sort();

    let date_range = match (resolved.first(), resolved.last()) {
        (Some(first), Some(last)) => Some(DataRange {
            start: first.format("%b %Y").to_string(),
            end: last.format("%b %Y").to_string(),
        }),
        _ => None,
    };

    Overview {
        total_clients,
        active_brokers: distribution.len(),
        average_cost_per_client: (total_clients > 0 && !data.weekly_data.is_empty())
            .then(|| total_cost / total_clients as f64),
        date_range,
        distribution,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{self, tests::Cell};
    use crate::spreadsheet::Sheet;

    fn row(cells: &[(&str, CellValue)]) -> Row {
        cells.iter().cloned().collect()
    }

    fn client(no: f64, broker: &str, date: CellValue) -> Row {
        row(&[
            ("No.", CellValue::Number(no)),
            ("Broker", broker.into()),
            ("日期", date),
            ("来源", "小红书".into()),
        ])
    }

    fn week_row(week: &str, cost: f64, leads: f64, price: f64) -> Row {
        row(&[
            ("Week", week.into()),
            ("消费总额（aud)", cost.into()),
            ("Leads总数", leads.into()),
            ("Leads单价（aud）", price.into()),
        ])
    }

    fn marketing_workbook() -> Workbook {
        Workbook::new(vec![
            Sheet::new(
                CLIENT_SHEET,
                vec![
                    // 2025-07-14 and 2025-07-15: 2025/wk29
                    client(1.0, "yuki", CellValue::Number(45852.0)),
                    client(2.0, "Linudo", CellValue::from("7/15/25")),
                    // 2025-07-28 .. 2025-07-30: 2025/wk31, no cost row
                    client(3.0, "Ziv", CellValue::Number(45866.0)),
                    client(4.0, "ruofan", CellValue::from("2025-07-29")),
                    client(5.0, "", CellValue::Number(45868.0)),
                    client(6.0, "Ziv", CellValue::from("someday")),
                    // 2025-08-01
                    client(7.0, "Zoe", CellValue::Number(45870.0)),
                ],
            ),
            Sheet::new(
                WEEKLY_SHEET,
                vec![
                    week_row("2025/wk30", 300.0, 10.0, 30.0),
                    week_row("2025/wk29", 100.0, 10.0, 10.0),
                    week_row("total", 400.0, 20.0, 20.0),
                ],
            ),
            Sheet::new(
                MONTHLY_SHEET,
                vec![
                    row(&[("月份", "2025/07".into()), ("消费总额（aud)", 1200.0.into())]),
                    row(&[("月份", "2025/06".into()), ("消费总额（aud)", 800.0.into())]),
                ],
            ),
            Sheet::new(
                DAILY_SHEET,
                vec![row(&[("时间", "2025-07-01".into()), ("消费", 47.2.into())])],
            ),
        ])
    }

    #[test]
    fn clients_are_normalized() {
        let data = process_workbook(&marketing_workbook(), &ProcessOptions::default());
        let brokers: Vec<&str> = data.broker_data.iter().map(|c| c.broker.as_str()).collect();
        assert_eq!(brokers, ["Yuki", "Linduo", "Ziv", "Yuki", "未知", "Ziv", "Zoe"]);
        assert_eq!(data.broker_data[1].date, CellValue::from("7/15/25"));
    }

    #[test]
    fn weekly_sheet_is_sorted_and_gap_filled() {
        let data = process_workbook(&marketing_workbook(), &ProcessOptions::default());
        let weeks: Vec<String> = data.weekly_data.iter().map(|w| w.week.to_string()).collect();
        assert_eq!(weeks, ["2025/wk29", "2025/wk30", "2025/wk31"]);

        let gap = &data.weekly_data[2];
        assert!(gap.estimated);
        assert_eq!(gap.leads_total, 4);
        // (100 + 300) / (10 + 10)
        assert_eq!(gap.total_cost, 4.0 * 20.0);

        // wk29 keeps the sheet's numbers even though two clients resolve there
        assert_eq!(data.weekly_data[0].leads_total, 10);
        assert!(!data.weekly_data[0].estimated);
    }

    #[test]
    fn monthly_counts_come_from_clients() {
        let data = process_workbook(&marketing_workbook(), &ProcessOptions::default());
        let months: Vec<(String, f64, u64)> = data
            .monthly_data
            .iter()
            .map(|m| (m.month.to_string(), m.cost, m.count))
            .collect();
        assert_eq!(
            months,
            vec![
                ("2025-06".to_string(), 800.0, 0),
                ("2025-07".to_string(), 1200.0, 5),
                ("2025-08".to_string(), 0.0, 1),
            ]
        );
    }

    #[test]
    fn monthly_count_sheet_used_without_clients() {
        let workbook = Workbook::new(vec![
            Sheet::new(
                MONTHLY_SHEET,
                vec![row(&[("月份", "2025/07".into()), ("消费总额（aud)", 1200.0.into())])],
            ),
            Sheet::new(
                MONTHLY_COUNT_SHEET,
                vec![row(&[("Month", "2025/07".into()), ("Count", 42.0.into())])],
            ),
        ]);

        let data = process_workbook(&workbook, &ProcessOptions::default());
        assert_eq!(data.monthly_data.len(), 1);
        assert_eq!(data.monthly_data[0].count, 42);
    }

    #[test]
    fn daily_cost_is_converted_to_aud() {
        let data = process_workbook(&marketing_workbook(), &ProcessOptions::default());
        assert_eq!(data.daily_cost_data.len(), 1);
        assert!((data.daily_cost_data[0].cost - 10.0).abs() < 1e-9);
    }

    #[test]
    fn missing_sheets_give_empty_tables() {
        let data = process_workbook(&Workbook::default(), &ProcessOptions::default());
        assert_eq!(data, DashboardData::default());
        assert_eq!(data.record_counts(), RecordCounts::default());
    }

    #[test]
    fn weekly_without_history_uses_default_cost() {
        let workbook = Workbook::new(vec![
            Sheet::new(CLIENT_SHEET, vec![client(1.0, "Ziv", CellValue::Number(45866.0))]),
            Sheet::new(WEEKLY_SHEET, Vec::new()),
        ]);
        let options = ProcessOptions {
            default_cost_per_lead: 35.0,
            ..ProcessOptions::default()
        };

        let data = process_workbook(&workbook, &options);
        assert_eq!(data.weekly_data.len(), 1);
        assert_eq!(data.weekly_data[0].total_cost, 35.0);
    }

    #[test]
    fn overview_numbers() {
        let data = process_workbook(&marketing_workbook(), &ProcessOptions::default());
        let overview = overview(&data);

        assert_eq!(overview.total_clients, 7);
        assert_eq!(overview.active_brokers, 5);
        assert_eq!(overview.distribution[0].broker, "Yuki");
        // (100 + 300 + 80) / 7
        let average = overview.average_cost_per_client.unwrap();
        assert!((average - 480.0 / 7.0).abs() < 1e-9);

        let range = overview.date_range.unwrap();
        assert_eq!(range.start, "Jul 2025");
        assert_eq!(range.end, "Aug 2025");
    }

    #[test]
    fn json_contract_matches_dashboard() {
        let data = process_workbook(&marketing_workbook(), &ProcessOptions::default());
        let json = serde_json::to_value(&data).unwrap();

        assert_eq!(json["broker_data"][0]["broker"], "Yuki");
        assert_eq!(json["broker_data"][0]["date"], 45852.0);
        assert_eq!(json["weekly_data"][0]["week"], "2025/wk29");
        assert_eq!(json["weekly_data"][0]["leadsPrice"], 10.0);
        assert!(json["weekly_data"][0].get("estimated").is_none());
        assert_eq!(json["weekly_data"][2]["estimated"], true);
        assert_eq!(json["monthly_data"][1]["month"], "2025-07");
    }

    #[test]
    fn processes_a_real_xlsx() {
        let bytes = loader::tests::xlsx_bytes(&[
            (
                CLIENT_SHEET,
                vec![
                    vec![Cell::Text("No."), Cell::Text("Broker"), Cell::Text("日期")],
                    vec![Cell::Number(1.0), Cell::Text("Yuki"), Cell::Number(45866.0)],
                    vec![Cell::Number(2.0), Cell::Text("ziv"), Cell::Text("7/29/25")],
                ],
            ),
            (
                WEEKLY_SHEET,
                vec![
                    vec![Cell::Text("Week"), Cell::Text("消费总额（aud)"), Cell::Text("Leads总数")],
                    vec![Cell::Text("2025/wk30"), Cell::Number(250.0), Cell::Number(10.0)],
                ],
            ),
        ]);

        let workbook = loader::from_excel_bytes(&bytes).unwrap();
        let data = process_workbook(&workbook, &ProcessOptions::default());

        assert_eq!(data.broker_data.len(), 2);
        assert_eq!(data.broker_data[1].broker, "Ziv");
        assert_eq!(data.weekly_data.len(), 2);
        assert_eq!(data.weekly_data[1].week.to_string(), "2025/wk31");
        assert_eq!(data.weekly_data[1].total_cost, 2.0 * 25.0);
        assert!(data.monthly_data.is_empty());
    }
}
