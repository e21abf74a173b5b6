//! Currency rate lookups.
//!
//! [`RateFetcher`] turns "the last N days for these currencies" into one
//! dated request per day against a [`RateSource`], and [`HttpRateSource`] is
//! the production source speaking to the bank's public JSON API.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Days, Local, NaiveDate};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{FetchError, RateError};

/// Longest lookback a single query may span, in days.
pub const MAX_LOOKBACK_DAYS: i64 = 10;

pub const DEFAULT_BASE_URL: &str =
    "https://api.privatbank.ua/p24api/pubinfo?json&exchange&coursid=5&date=";

const DATE_FORMAT: &str = "%d.%m.%Y";

/// One currency entry of a rate source response.
///
/// Prices are kept as raw JSON: only rows for requested currencies must carry
/// usable ones, so an odd row for some other currency does not spoil the day.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Quote {
    pub ccy: String,
    #[serde(default)]
    pub sale: serde_json::Value,
    #[serde(default)]
    pub buy: serde_json::Value,
}

impl Quote {
    /// Sale and buy prices as text, if both are present.
    pub fn prices(&self) -> Option<(String, String)> {
        Some((price_text(&self.sale)?, price_text(&self.buy)?))
    }
}

// The API sends prices as strings; accept bare numbers too.
fn price_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Something that can answer "what were the rates on this date".
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn fetch_day(&self, date: NaiveDate) -> Result<Vec<Quote>, FetchError>;
}

/// Rate source backed by a long-lived HTTP client.
///
/// The client and its connection pool are created once and reused for every
/// query; they are released when the last owner drops the source.
#[derive(Debug, Clone)]
pub struct HttpRateSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRateSource {
    /// `base_url` gets the `DD.MM.YYYY` date appended verbatim.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(HttpRateSource {
            client,
            base_url: base_url.into(),
        })
    }

    fn url_for(&self, date: NaiveDate) -> String {
        format!("{}{}", self.base_url, date.format(DATE_FORMAT))
    }
}

#[async_trait]
impl RateSource for HttpRateSource {
    async fn fetch_day(&self, date: NaiveDate) -> Result<Vec<Quote>, FetchError> {
        let url = self.url_for(date);
        debug!("GET {}", url);

        let transport = |e: reqwest::Error| FetchError::Transport {
            date,
            reason: e.to_string(),
        };
        let response = self.client.get(&url).send().await.map_err(transport)?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(FetchError::Status {
                date,
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(transport)?;
        serde_json::from_str(&body).map_err(|e| FetchError::Malformed {
            date,
            reason: e.to_string(),
        })
    }
}

/// A single rendered rate: one currency on one date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteLine {
    pub date: NaiveDate,
    pub currency: String,
    pub sale: String,
    pub buy: String,
}

impl fmt::Display for QuoteLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: sale {}, buy {}",
            self.date.format(DATE_FORMAT),
            self.currency,
            self.sale,
            self.buy
        )
    }
}

/// Result of a rate query, newest date first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateReport {
    pub lines: Vec<QuoteLine>,
}

impl RateReport {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl fmt::Display for RateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{line}")?;
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct RateFetcher {
    source: Arc<dyn RateSource>,
}

impl RateFetcher {
    pub fn new(source: impl RateSource + 'static) -> Self {
        RateFetcher {
            source: Arc::new(source),
        }
    }

    /// Rates for the `days` days ending today, keeping only `codes`.
    ///
    /// # Arguments
    /// - `days`: How many days back to look, today included (1 to 10).
    /// - `codes`: Upper-case 3-letter currency codes to keep.
    ///
    /// # Returns
    /// The report, newest date first, or `InvalidArgument` before any lookup
    /// when the arguments are out of range.
    pub async fn get_rates(&self, days: i64, codes: &[String]) -> Result<RateReport, RateError> {
        self.get_rates_on(Local::now().date_naive(), days, codes).await
    }

    /// Same as [`get_rates`](Self::get_rates) with an explicit "today".
    ///
    /// Any failed day fails the whole query; nothing partial is returned.
    pub async fn get_rates_on(
        &self,
        today: NaiveDate,
        days: i64,
        codes: &[String],
    ) -> Result<RateReport, RateError> {
        validate(days, codes)?;

        let mut report = RateReport::default();
        for offset in 0..days.unsigned_abs() {
            let date = today
                .checked_sub_days(Days::new(offset))
                .ok_or_else(|| RateError::InvalidArgument(format!("{today} minus {offset} days")))?;
            let quotes = self.source.fetch_day(date).await?;
            for quote in quotes.into_iter().filter(|q| codes.contains(&q.ccy)) {
                let (sale, buy) = quote.prices().ok_or_else(|| FetchError::Malformed {
                    date,
                    reason: format!("no usable price for {}", quote.ccy),
                })?;
                report.lines.push(QuoteLine {
                    date,
                    currency: quote.ccy,
                    sale,
                    buy,
                });
            }
        }
        info!("fetched {} rate lines for {} day(s)", report.lines.len(), days);
        Ok(report)
    }
}

fn validate(days: i64, codes: &[String]) -> Result<(), RateError> {
    if !(1..=MAX_LOOKBACK_DAYS).contains(&days) {
        return Err(RateError::InvalidArgument(format!(
            "day count must be between 1 and {MAX_LOOKBACK_DAYS}, got {days}"
        )));
    }
    if codes.is_empty() {
        return Err(RateError::InvalidArgument("no currency codes given".to_string()));
    }
    if let Some(bad) = codes
        .iter()
        .find(|c| c.len() != 3 || !c.bytes().all(|b| b.is_ascii_uppercase()))
    {
        return Err(RateError::InvalidArgument(format!("not a currency code: {bad:?}")));
    }
    Ok(())
}
