#![cfg(not(tarpaulin_include))]
use chrono::NaiveDate;
use leads::bucket::{self, WeeklyBucket};
use leads::dates::{self, WeekKey};
use std::collections::BTreeMap;

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn main() {
    println!("=== Week Key Test Suite ===\n");

    println!("Test 1: Serial and text dates agree");
    let from_serial = dates::from_serial(45866.0).unwrap();
    let from_text = dates::parse_date_text("7/28/25").unwrap();
    assert_eq!(from_serial, ymd(2025, 7, 28));
    assert_eq!(from_serial, from_text);
    println!("45866 and 7/28/25 both resolve to {} - PASS\n", from_serial);

    println!("Test 2: Week keys through a year boundary");
    for (date, expected) in [
        (ymd(2024, 12, 29), "2024/wk52"),
        (ymd(2024, 12, 30), "2024/wk53"),
        (ymd(2025, 1, 5), "2025/wk01"),
        (ymd(2025, 1, 6), "2025/wk02"),
        (ymd(2025, 7, 28), "2025/wk31"),
    ] {
        let key = dates::week_key(date);
        assert_eq!(key.to_string(), expected);
        assert!(key.contains(date));
        println!("  {} -> {}", date, key);
    }
    println!("PASS\n");

    println!("Test 3: Keys sort chronologically");
    let mut keys: Vec<WeekKey> = ["2025/wk02", "2024/wk52", "2025/wk10", "2025/wk01"]
        .iter()
        .map(|k| k.parse().unwrap())
        .collect();
    keys.sort_by_key(|k| k.sort_index());
    let sorted: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
    assert_eq!(sorted, ["2024/wk52", "2025/wk01", "2025/wk02", "2025/wk10"]);
    println!("{:?} - PASS\n", sorted);

    println!("Test 4: Gap filling");
    let week = |w| WeekKey::new(2025, w).unwrap();
    let known = vec![
        WeeklyBucket::from_totals(week(30), 300.0, 10),
        WeeklyBucket::from_totals(week(32), 100.0, 10),
    ];
    let clients = BTreeMap::from([(week(30), 10), (week(31), 4), (week(32), 10)]);
    let filled = bucket::fill_weekly_gaps(known, &clients, bucket::DEFAULT_COST_PER_LEAD);
    assert_eq!(filled.len(), 3);
    assert_eq!(filled[1].week, week(31));
    assert!(filled[1].estimated);
    assert_eq!(filled[1].leads_total, 4);
    assert_eq!(filled[1].total_cost, 80.0);
    println!(
        "{} estimated at {} for {} leads - PASS\n",
        filled[1].week, filled[1].total_cost, filled[1].leads_total
    );

    println!("All week key tests passed!");
}
