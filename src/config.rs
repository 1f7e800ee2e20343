use crate::bucket::DEFAULT_COST_PER_LEAD;
use crate::dashboard::{CNY_PER_AUD, ProcessOptions};
use crate::loader::RetryPolicy;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Server settings. Every flag can also come from a `DASHBOARD_*` variable.
#[derive(Parser, Debug, Clone)]
#[command(name = "dashboard")]
#[command(about = "Serves lead and campaign tables built from the marketing workbook", long_about = None)]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "DASHBOARD_BIND", default_value = "127.0.0.1:3000")]
    pub bind: SocketAddr,

    /// Local workbook read by GET /api/excel-data and the refresh job
    #[arg(long, env = "DASHBOARD_DATA_FILE", default_value = "marketing_data.xlsm")]
    pub data_file: PathBuf,

    /// Directory for JSON snapshots and the saved LifeCAR export; also served as static files
    #[arg(long, env = "DASHBOARD_PUBLIC_DIR", default_value = "public")]
    pub public_dir: PathBuf,

    #[arg(long, env = "DASHBOARD_CNY_PER_AUD", default_value_t = CNY_PER_AUD)]
    pub cny_per_aud: f64,

    /// Cost per lead assumed for estimated weeks when there is no cost history
    #[arg(long, env = "DASHBOARD_DEFAULT_COST_PER_LEAD", default_value_t = DEFAULT_COST_PER_LEAD)]
    pub default_cost_per_lead: f64,

    /// Attempts at reading a workbook that another program holds open
    #[arg(long, env = "DASHBOARD_READ_RETRIES", default_value_t = 3)]
    pub read_retries: u32,

    #[arg(long, env = "DASHBOARD_RETRY_DELAY_MS", default_value_t = 1000)]
    pub retry_delay_ms: u64,

    /// Shell command run by POST /api/refresh-data instead of the built-in refresh
    #[arg(long, env = "DASHBOARD_REFRESH_COMMAND")]
    pub refresh_command: Option<String>,

    #[arg(long, env = "DASHBOARD_MAX_UPLOAD_BYTES", default_value_t = 50 * 1024 * 1024)]
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.read_retries.max(1),
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn process_options(&self) -> ProcessOptions {
        ProcessOptions {
            cny_per_aud: self.cny_per_aud,
            default_cost_per_lead: self.default_cost_per_lead,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let config = Config::try_parse_from([
            "dashboard",
            "--bind",
            "0.0.0.0:8080",
            "--data-file",
            "/srv/marketing.xlsx",
            "--read-retries",
            "0",
            "--retry-delay-ms",
            "250",
            "--refresh-command",
            "node manual-refresh.js",
        ])
        .unwrap();

        assert_eq!(config.bind.port(), 8080);
        assert_eq!(config.data_file, PathBuf::from("/srv/marketing.xlsx"));
        assert_eq!(config.retry_policy().attempts, 1);
        assert_eq!(config.retry_policy().delay, Duration::from_millis(250));
        assert_eq!(config.refresh_command.as_deref(), Some("node manual-refresh.js"));
    }

    #[test]
    fn rejects_bad_bind_address() {
        assert!(Config::try_parse_from(["dashboard", "--bind", "not-an-addr"]).is_err());
    }
}
