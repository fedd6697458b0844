//! HTTP client for the ranking API served by `magic-web`

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::plan::RankedQuote;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:3000";

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Ranking API error: {0}")]
    Api(String),
}

/// `{ ok, rows?, error? }` as every list endpoint answers
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    #[serde(default = "Vec::new")]
    rows: Vec<T>,
    #[serde(default)]
    error: Option<String>,
}

impl<T> Envelope<T> {
    fn into_rows(self) -> Result<Vec<T>, ClientError> {
        if self.ok {
            Ok(self.rows)
        } else {
            Err(ClientError::Api(
                self.error.unwrap_or_else(|| "unknown error".to_string()),
            ))
        }
    }
}

#[derive(Debug, Deserialize)]
struct RankRow {
    ticker: String,
    #[serde(default)]
    final_rank: Option<i64>,
}

#[derive(Clone)]
pub struct RankingClient {
    client: Client,
    base_url: String,
}

impl RankingClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_rows<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Vec<T>, ClientError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        // Error responses still carry the envelope; fall back to the raw body
        match serde_json::from_str::<Envelope<T>>(&body) {
            Ok(envelope) => envelope.into_rows(),
            Err(_) if !status.is_success() => {
                Err(ClientError::Api(format!("{}: {}", status, body)))
            }
            Err(e) => Err(ClientError::Api(format!("unexpected response: {}", e))),
        }
    }

    /// `GET /api/ranks` with the tickers comma-joined into one encoded value
    fn ranks_request(&self, tickers: &[String]) -> RequestBuilder {
        let url = format!("{}/api/ranks", self.base_url);
        debug!(url = %url, count = tickers.len(), "Fetching ranks");
        self.client.get(url).query(&[("tickers", tickers.join(","))])
    }

    /// `final_rank` per requested ticker; unranked tickers map to `None`.
    /// An empty list makes no request.
    pub async fn ranks(&self, tickers: &[String]) -> Result<HashMap<String, Option<i64>>, ClientError> {
        if tickers.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<RankRow> = self.get_rows(self.ranks_request(tickers)).await?;
        debug!(count = rows.len(), "Fetched ranks");
        Ok(rows.into_iter().map(|r| (r.ticker, r.final_rank)).collect())
    }

    /// Top-ranked tickers with their prices, best first
    pub async fn buy_candidates(&self) -> Result<Vec<RankedQuote>, ClientError> {
        let url = format!("{}/api/buy", self.base_url);
        debug!(url = %url, "Fetching buy candidates");
        let rows: Vec<RankedQuote> = self.get_rows(self.client.get(url)).await?;
        debug!(count = rows.len(), "Fetched buy candidates");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_envelope_ok_rows() {
        let env: Envelope<RankedQuote> = serde_json::from_str(
            r#"{"ok":true,"rows":[{"ticker":"BBAS3","price":25.0,"final_rank":1}]}"#,
        )
        .unwrap();
        let rows = env.into_rows().unwrap();
        assert_eq!(rows[0].ticker, "BBAS3");
        assert_eq!(rows[0].price, Some(dec!(25)));
    }

    #[test]
    fn test_ranks_request_encodes_tickers() {
        let client = RankingClient::new("http://127.0.0.1:9/").unwrap();
        let request = client
            .ranks_request(&["A&B".to_string(), "C+D".to_string()])
            .build()
            .unwrap();
        assert_eq!(request.url().path(), "/api/ranks");
        assert_eq!(request.url().query(), Some("tickers=A%26B%2CC%2BD"));
    }

    #[test]
    fn test_envelope_error() {
        let env: Envelope<RankRow> =
            serde_json::from_str(r#"{"ok":false,"error":"Missing tickers"}"#).unwrap();
        match env.into_rows() {
            Err(ClientError::Api(msg)) => assert_eq!(msg, "Missing tickers"),
            other => panic!("expected api error, got {:?}", other.map(|r| r.len())),
        }
    }

    #[test]
    fn test_rank_rows_with_nulls() {
        let env: Envelope<RankRow> = serde_json::from_str(
            r#"{"ok":true,"rows":[{"ticker":"ITSA4","final_rank":3},{"ticker":"XXXX3","final_rank":null}]}"#,
        )
        .unwrap();
        let rows = env.into_rows().unwrap();
        assert_eq!(rows[1].final_rank, None);
    }

    #[tokio::test]
    async fn test_ranks_empty_list_skips_request() {
        // Nothing listens on port 9; an attempted request would error
        let client = RankingClient::new("http://127.0.0.1:9/").unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:9");
        assert!(client.ranks(&[]).await.unwrap().is_empty());
    }
}
