use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// India Standard Time, UTC+05:30. Both supported venues trade on it.
const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

/// Market venue. Selects both the symbol universe and the storage destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Exchange {
    Nse,
    Bse,
}

/// Raised when an exchange code does not name a supported venue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown exchange code '{0}' (expected one of: NSE, BSE)")]
pub struct UnknownExchange(pub String);

impl Exchange {
    pub const ALL: [Exchange; 2] = [Exchange::Nse, Exchange::Bse];

    /// Upper-case venue code, as used on the command line and in config.
    pub fn code(&self) -> &'static str {
        match self {
            Exchange::Nse => "NSE",
            Exchange::Bse => "BSE",
        }
    }

    /// Provider suffix appended to a bare ticker.
    pub fn suffix(&self) -> &'static str {
        match self {
            Exchange::Nse => ".NS",
            Exchange::Bse => ".BO",
        }
    }

    /// Registry column flagging a symbol as listed on this venue.
    pub fn listing_flag(&self) -> &'static str {
        match self {
            Exchange::Nse => "innse",
            Exchange::Bse => "inbse",
        }
    }

    /// Fixed offset of the venue's wall clock from UTC.
    pub fn utc_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(IST_OFFSET_SECS).expect("IST offset is within ±24h")
    }

    /// Qualify a bare ticker with this venue's suffix.
    ///
    /// Tickers that already carry the suffix are returned unchanged.
    pub fn qualify(&self, ticker: &str) -> String {
        let ticker = ticker.trim();
        if ticker.ends_with(self.suffix()) {
            ticker.to_string()
        } else {
            format!("{ticker}{}", self.suffix())
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Exchange {
    type Err = UnknownExchange;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        Exchange::ALL
            .into_iter()
            .find(|e| e.code().eq_ignore_ascii_case(code))
            .ok_or_else(|| UnknownExchange(s.to_string()))
    }
}
