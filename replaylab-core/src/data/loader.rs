//! Candle loading policy: try the remote provider, fall back to the local file.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::csv_source::LocalCandleFile;
use super::provider::{CandleRequest, DataSource, RemoteCandleSource};
use crate::domain::Candle;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadedCandles {
    pub candles: Vec<Candle>,
    pub source: DataSource,
    /// Non-fatal notes about what was tried, e.g. a rate limit or a stale feed.
    pub status: Vec<String>,
}

/// Remote first, local file second. Neither failing is fatal: the result may
/// simply be empty with `source == DataSource::None`.
pub fn load_candles(
    remote: Option<&dyn RemoteCandleSource>,
    request: &CandleRequest,
    local: Option<&LocalCandleFile>,
) -> LoadedCandles {
    let mut status = Vec::new();

    if let Some(remote) = remote {
        if !remote.is_available() {
            status.push(format!("{} unavailable", remote.name()));
        } else {
            let response = remote.fetch(request);
            if response.rate_limited {
                status.push(format!("{} rate limited", remote.name()));
            }
            if let Some(error) = &response.error {
                status.push(format!("{}: {error}", remote.name()));
            }
            if response.stale {
                status.push(format!("{} data is stale", remote.name()));
            }
            if response.is_usable() {
                info!(
                    provider = remote.name(),
                    candles = response.candles.len(),
                    stale = response.stale,
                    "using remote candles"
                );
                return LoadedCandles {
                    candles: response.candles,
                    source: DataSource::Remote,
                    status,
                };
            }
            if response.error.is_none() && !response.rate_limited {
                status.push(format!("{} returned no candles", remote.name()));
            }
        }
        warn!(ticker = %request.ticker(), notes = ?status, "falling back to local candles");
    }

    if let Some(local) = local {
        match local.load() {
            Ok(candles) if !candles.is_empty() => {
                info!(path = %local.path().display(), candles = candles.len(), "using local candles");
                return LoadedCandles {
                    candles,
                    source: DataSource::LocalFile,
                    status,
                };
            }
            Ok(_) => status.push(format!("{} has no candles", local.path().display())),
            Err(e) => {
                warn!(error = %e, "local candle file unusable");
                status.push(e.to_string());
            }
        }
    }

    LoadedCandles {
        candles: Vec::new(),
        source: DataSource::None,
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::provider::{RemoteResponse, Timespan};
    use std::io::Write;

    struct Canned {
        available: bool,
        response: RemoteResponse,
    }

    impl RemoteCandleSource for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        fn fetch(&self, _request: &CandleRequest) -> RemoteResponse {
            self.response.clone()
        }

        fn is_available(&self) -> bool {
            self.available
        }
    }

    fn request() -> CandleRequest {
        CandleRequest::new("EUR", "USD", 1, Timespan::Hour, 30)
    }

    fn local_file(dir: &tempfile::TempDir) -> LocalCandleFile {
        let path = dir.path().join("candles.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "timestamp,Open,High,Low,Close,Volume").unwrap();
        writeln!(f, "1700000000,1.0,1.1,0.9,1.05,5").unwrap();
        LocalCandleFile::new(path)
    }

    #[test]
    fn remote_success_wins() {
        let remote = Canned {
            available: true,
            response: RemoteResponse::ok(vec![Candle::new(1, 1.0, 1.0, 1.0, 1.0, 0.0)]),
        };
        let loaded = load_candles(Some(&remote), &request(), None);
        assert_eq!(loaded.source, DataSource::Remote);
        assert!(loaded.status.is_empty());
    }

    #[test]
    fn rate_limit_falls_back_to_local() {
        let dir = tempfile::tempdir().unwrap();
        let local = local_file(&dir);
        let remote = Canned {
            available: true,
            response: RemoteResponse {
                rate_limited: true,
                error: Some("slow down".into()),
                ..RemoteResponse::default()
            },
        };
        let loaded = load_candles(Some(&remote), &request(), Some(&local));
        assert_eq!(loaded.source, DataSource::LocalFile);
        assert_eq!(loaded.candles.len(), 1);
        assert!(loaded.status.iter().any(|s| s.contains("rate limited")));
    }

    #[test]
    fn nothing_available() {
        let remote = Canned {
            available: false,
            response: RemoteResponse::default(),
        };
        let missing = LocalCandleFile::new("/nonexistent/candles.csv");
        let loaded = load_candles(Some(&remote), &request(), Some(&missing));
        assert_eq!(loaded.source, DataSource::None);
        assert!(loaded.candles.is_empty());
        assert_eq!(loaded.status.len(), 2);
    }
}
