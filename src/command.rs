use std::sync::Arc;

use tracing::{debug, warn};

use crate::activity_log::ActivityLog;
use crate::broadcast::Broadcaster;
use crate::rates::RateFetcher;
use crate::session::Session;

pub const GREETING: &str = "Hi Server";
pub const GREETING_REPLY: &str = "Привіт мої любі!";

const RATE_COMMAND: &str = "exchange";

/// What an inbound chat message asks the server to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    RateQuery { days: i64 },
    Greeting,
    Plain { text: String },
}

impl Command {
    /// Classifies a text frame. Every input maps to some command.
    ///
    /// ```
    /// use exchange_chat::command::Command;
    ///
    /// assert_eq!(Command::parse("Exchange 3"), Command::RateQuery { days: 3 });
    /// assert_eq!(Command::parse("exchange abc"), Command::RateQuery { days: 1 });
    /// assert_eq!(Command::parse("Hi Server"), Command::Greeting);
    /// ```
    pub fn parse(text: &str) -> Self {
        if text.to_lowercase().starts_with(RATE_COMMAND) {
            let days = text.split_whitespace().nth(1).map_or(1, parse_days);
            Command::RateQuery { days }
        } else if text == GREETING {
            Command::Greeting
        } else {
            Command::Plain {
                text: text.to_string(),
            }
        }
    }
}

/// Reads the day-count argument of a rate query.
///
/// Anything integer-shaped keeps its value, clamped to `i64`, so range checks
/// downstream see it; any other token falls back to one day.
fn parse_days(arg: &str) -> i64 {
    let digits = arg.strip_prefix(['+', '-']).unwrap_or(arg);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return 1;
    }
    arg.parse().unwrap_or(if arg.starts_with('-') { i64::MIN } else { i64::MAX })
}

/// Carries out commands on behalf of a session.
#[derive(Clone)]
pub struct Router {
    broadcaster: Broadcaster,
    fetcher: RateFetcher,
    log: Arc<ActivityLog>,
    currencies: Vec<String>,
}

impl Router {
    pub fn new(
        broadcaster: Broadcaster,
        fetcher: RateFetcher,
        log: Arc<ActivityLog>,
        currencies: Vec<String>,
    ) -> Self {
        Router {
            broadcaster,
            fetcher,
            log,
            currencies,
        }
    }

    pub async fn dispatch(&self, session: &Session, text: &str) {
        let command = Command::parse(text);
        debug!("{} -> {:?}", session.name(), command);

        match command {
            Command::RateQuery { days } => self.exchange(session, days).await,
            Command::Greeting => {
                self.broadcaster.broadcast(&format!("{}: {}", session.name(), text));
                self.broadcaster.broadcast(GREETING_REPLY);
            }
            Command::Plain { text } => {
                self.broadcaster.broadcast(&format!("{}: {}", session.name(), text));
            }
        }
    }

    async fn exchange(&self, session: &Session, days: i64) {
        let report = match self.fetcher.get_rates(days, &self.currencies).await {
            Ok(report) => report,
            Err(e) => {
                warn!("exchange for {} failed: {}", session.name(), e);
                if let Err(e) = self
                    .broadcaster
                    .send_to(session, &format!("exchange failed: {e}"))
                {
                    debug!("could not report failure: {}", e);
                }
                return;
            }
        };

        let text = if report.is_empty() {
            format!("no rates found for {}", self.currencies.join(", "))
        } else {
            report.to_string()
        };
        self.broadcaster.broadcast(&text);

        if let Err(e) = self.log.append(&text).await {
            warn!("failed to write {}: {}", self.log.path().display(), e);
        }
    }
}
