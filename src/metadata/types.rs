use reqwest::StatusCode;

/// Error types for metadata fetching, distinguishing retryable from terminal failures
#[derive(Debug, Clone)]
pub enum FetchError {
    /// Transient failures (5xx, 429, timeout, connection error)
    Retryable(String),
    /// Permanent failures (4xx, parse error)
    Terminal(String),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Retryable(_))
    }

    pub(crate) fn from_status(source: &str, status: StatusCode) -> Self {
        let msg = format!("{source} returned status {}", status.as_u16());
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            FetchError::Retryable(msg)
        } else {
            FetchError::Terminal(msg)
        }
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Retryable(msg) => write!(f, "retryable: {msg}"),
            FetchError::Terminal(msg) => write!(f, "terminal: {msg}"),
        }
    }
}

impl std::error::Error for FetchError {}

/// Window of a trending list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrendingPeriod {
    Now,
    Daily,
    #[default]
    Weekly,
    Monthly,
    Yearly,
    Forever,
}

impl TrendingPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendingPeriod::Now => "now",
            TrendingPeriod::Daily => "daily",
            TrendingPeriod::Weekly => "weekly",
            TrendingPeriod::Monthly => "monthly",
            TrendingPeriod::Yearly => "yearly",
            TrendingPeriod::Forever => "forever",
        }
    }
}

impl std::fmt::Display for TrendingPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TrendingPeriod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "now" => Ok(TrendingPeriod::Now),
            "daily" => Ok(TrendingPeriod::Daily),
            "weekly" => Ok(TrendingPeriod::Weekly),
            "monthly" => Ok(TrendingPeriod::Monthly),
            "yearly" => Ok(TrendingPeriod::Yearly),
            "forever" => Ok(TrendingPeriod::Forever),
            other => anyhow::bail!(
                "unknown period \"{other}\" (use now, daily, weekly, monthly, yearly, forever)"
            ),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            FetchError::Retryable(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::from_status("server", status)
        } else {
            FetchError::Terminal(err.to_string())
        }
    }
}
