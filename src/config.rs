use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::rates::DEFAULT_BASE_URL;

#[derive(Parser, Debug, Clone)]
#[clap(about = "WebSocket chat relay with currency exchange lookups", version)]
pub struct Config {
    #[clap(long, env = "EXCHANGE_CHAT_LISTEN", default_value = "127.0.0.1:8080", help = "Address to accept WebSocket clients on.")]
    pub listen: String,

    #[clap(long, env = "EXCHANGE_CHAT_RATES_URL", default_value = DEFAULT_BASE_URL, help = "Rate API URL; the DD.MM.YYYY date is appended.")]
    pub rates_url: String,

    #[clap(long, env = "EXCHANGE_CHAT_CURRENCIES", value_delimiter = ',', default_value = "USD,EUR", help = "Currency codes reported by the exchange command.")]
    pub currencies: Vec<String>,

    #[clap(long, env = "EXCHANGE_CHAT_LOG_FILE", default_value = "chat.log", help = "File that exchange results are appended to.")]
    pub log_file: PathBuf,

    #[clap(long, env = "EXCHANGE_CHAT_FETCH_TIMEOUT_SECS", default_value_t = 10, help = "Timeout in seconds for each rate request.")]
    pub fetch_timeout_secs: u64,

    #[clap(long, env = "EXCHANGE_CHAT_LOG_LEVEL", default_value = "info", help = "Logging level (trace, debug, info, warn, error), overridden by RUST_LOG.")]
    pub log_level: String,

    #[clap(long, env = "EXCHANGE_CHAT_WORKERS", default_value_t = 0, help = "Runtime worker threads, 0 for one per CPU.")]
    pub workers: usize,

    #[clap(long, help = "Report to tokio-console instead of logging to stdout.")]
    pub console: bool,
}

impl Config {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}
