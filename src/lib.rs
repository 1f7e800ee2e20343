/*!
# Leads Dashboard

Backend for a marketing dashboard: it reads the team's lead-tracking workbook
and the LifeCAR campaign export, and serves chart-ready tables over HTTP.

## Architecture

### Ingestion Layer
- **Technologies**: calamine, csv
- **Key Components**:
  - Workbook Loader - Reads `.xlsx`/`.xlsm` bytes into header-keyed rows, retrying while Excel holds the file
  - CSV Loader - Strips the BOM and summary rows from platform exports

### Processing Layer
- **Core Components**:
  - Date Resolver - Day serials and date strings to calendar dates, week keys (`YYYY/wkNN`) and month keys (`YYYY-MM`)
  - Bucket Aggregator - Generic grouping of records under ordered keys
  - Gap Filler - Estimates cost for weeks that have clients but no cost row
  - Broker Normalizer - Maps spelling variants to canonical broker names

### Service Layer
- **Technologies**: axum, tokio, tower-http
- JSON endpoints, multipart upload, snapshot files under the public directory

## Modules

- **cell**: Raw cell values and header-keyed rows
- **spreadsheet**: Sheets and workbooks as loaded
- **dates**: Date resolution and period keys
- **bucket**: Aggregation, weekly gap filling, monthly merge
- **brokers**: Broker aliases and distribution
- **loader**: Workbook and CSV ingestion
- **dashboard**: Workbook to dashboard tables
- **lifecar**: LifeCAR daily, weekly and monthly metrics
- **saving**: JSON snapshots and the saved LifeCAR export
- **config**: Command line and environment settings
- **app**: Routing and handlers

## REST API Endpoints

- `GET /api/excel-data` - Tables built from the local workbook
- `POST /api/excel-data` - Tables built from an uploaded workbook or CSV
- `POST /api/refresh-data` - Regenerates the JSON snapshots
- `GET /api/snapshot/{name}` - One snapshot table
- `GET /api/lifecar?start&end` - LifeCAR report for a date range
- `GET /api/brokers` - Headline numbers and broker distribution
*/

pub mod brokers;
pub mod bucket;
pub mod cell;
pub mod dashboard;
pub mod dates;
pub mod error;
pub mod lifecar;
pub mod loader;
pub mod saving;
pub mod spreadsheet;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod config;

pub use cell::{CellValue, Row};
pub use dashboard::{DashboardData, ProcessOptions, process_workbook};
pub use dates::{MonthKey, WeekKey};
pub use error::{DashboardError, Result};
pub use spreadsheet::{Sheet, Workbook};
