//! # Path addressing
//!
//! A [`Path`] is a dot-separated address into the store's object graph,
//! e.g. `"binance.public.tickers.BTCUSDT.bid"`. Numeric segments address
//! array elements. Paths parse from and render back to the wire string form
//! so a worker can prefix every emitted path with its venue name before
//! forwarding to the host (§6: "every `path` is prefixed with the venue
//! name so the host can route into its mirror").

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(k) => f.write_str(k),
            PathSegment::Index(i) => write!(f, "{i}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Path(pub Vec<PathSegment>);

impl Path {
    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }

    pub fn key(key: impl Into<String>) -> Self {
        Self(vec![PathSegment::Key(key.into())])
    }

    pub fn push_key(mut self, key: impl Into<String>) -> Self {
        self.0.push(PathSegment::Key(key.into()));
        self
    }

    pub fn push_index(mut self, index: usize) -> Self {
        self.0.push(PathSegment::Index(index));
        self
    }

    pub fn prefixed_with(&self, venue: &str) -> Self {
        let mut segments = Vec::with_capacity(self.0.len() + 1);
        segments.push(PathSegment::Key(venue.to_string()));
        segments.extend(self.0.iter().cloned());
        Self(segments)
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("empty path segment in {0:?}")]
pub struct PathParseError(String);

impl FromStr for Path {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut segments = Vec::new();
        for part in s.split('.') {
            if part.is_empty() {
                return Err(PathParseError(s.to_string()));
            }
            if let Ok(idx) = part.parse::<usize>() {
                segments.push(PathSegment::Index(idx));
            } else {
                segments.push(PathSegment::Key(part.to_string()));
            }
        }
        Ok(Path(segments))
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        s.parse().expect("malformed path literal")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_display() {
        let p: Path = "binance.public.tickers.BTCUSDT.bid".into();
        assert_eq!(p.to_string(), "binance.public.tickers.BTCUSDT.bid");
    }

    #[test]
    fn numeric_segments_parse_as_index() {
        let p: Path = "binance.private.A1.positions.2.upnl".into();
        assert_eq!(
            p.segments()[4],
            PathSegment::Index(2)
        );
    }

    #[test]
    fn prefixing_adds_venue_as_leading_key() {
        let p = Path::key("public").push_key("tickers").push_key("BTCUSDT");
        let prefixed = p.prefixed_with("binance");
        assert_eq!(prefixed.to_string(), "binance.public.tickers.BTCUSDT");
    }
}
