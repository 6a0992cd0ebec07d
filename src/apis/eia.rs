use crate::app::ports::{HttpClientPort, HttpGetResult};
use crate::constants::SourceType;
use crate::error::{PipelineError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::types::BronzeRow;

/// A single series object from the EIA `series` endpoint:
///
/// ```json
/// {"series_id": "PET.RWTC.D", "name": "...", "units": "Dollars per Barrel",
///  "data": [["20240105", 75.12], ["20240104", "74.50"]]}
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct EiaSeries {
    pub series_id: Option<String>,
    pub name: Option<String>,
    pub units: Option<String>,
    #[serde(default)]
    pub data: Vec<Vec<Value>>,
}

/// Parsed series plus the raw response it came from
#[derive(Debug, Clone)]
pub struct FetchedSeries {
    pub series: EiaSeries,
    pub response: HttpGetResult,
    /// Request URL with the api key removed, safe to log and archive
    pub redacted_url: String,
}

/// One `[date, value]` pair after coercion
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesPoint {
    pub date: Option<NaiveDate>,
    pub series_id: String,
    pub value: Option<f64>,
}

pub struct EiaClient {
    http: Arc<dyn HttpClientPort>,
    base_url: String,
    api_key: String,
}

impl EiaClient {
    pub fn new(http: Arc<dyn HttpClientPort>, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    pub fn series_url(&self, series_id: &str) -> Result<String> {
        let url = reqwest::Url::parse_with_params(
            &self.base_url,
            &[("api_key", self.api_key.as_str()), ("series_id", series_id)],
        )
        .map_err(|e| PipelineError::Config(format!("invalid EIA base url '{}': {}", self.base_url, e)))?;
        Ok(url.to_string())
    }

    pub fn redacted_url(&self, series_id: &str) -> Result<String> {
        let url = reqwest::Url::parse_with_params(&self.base_url, &[("series_id", series_id)])
            .map_err(|e| PipelineError::Config(format!("invalid EIA base url '{}': {}", self.base_url, e)))?;
        Ok(url.to_string())
    }

    #[instrument(skip(self))]
    pub async fn fetch_series(&self, series_id: &str) -> Result<FetchedSeries> {
        let url = self.series_url(series_id)?;
        let response = self.http.get(&url).await?;
        debug!(status = response.status, bytes = response.bytes.len(), "EIA response");
        let series = parse_series_payload(series_id, &response)?;
        Ok(FetchedSeries {
            series,
            response,
            redacted_url: self.redacted_url(series_id)?,
        })
    }
}

/// Extract the first series from an EIA response body.
pub fn parse_series_payload(series_id: &str, response: &HttpGetResult) -> Result<EiaSeries> {
    let payload: Value = match serde_json::from_slice(&response.bytes) {
        Ok(v) => v,
        Err(e) if !response.is_success() => {
            return Err(PipelineError::Api {
                message: format!("EIA returned HTTP {} for {}: {}", response.status, series_id, e),
            })
        }
        Err(e) => return Err(e.into()),
    };

    // Error bodies look like {"request": {...}, "data": {"error": "..."}}
    if let Some(msg) = payload.pointer("/data/error").and_then(Value::as_str) {
        return Err(PipelineError::Api {
            message: format!("EIA rejected {}: {}", series_id, msg),
        });
    }
    if !response.is_success() {
        return Err(PipelineError::Api {
            message: format!("EIA returned HTTP {} for {}", response.status, series_id),
        });
    }

    let first = payload
        .get("series")
        .and_then(Value::as_array)
        .and_then(|list| list.first())
        .cloned()
        .ok_or_else(|| PipelineError::NotFound(format!("No series data returned for {}", series_id)))?;
    Ok(serde_json::from_value(first)?)
}

/// Convert `data` pairs into points. Bad dates and non-numeric values become `None`.
pub fn series_to_points(series: &EiaSeries, requested_id: &str) -> Vec<SeriesPoint> {
    let series_id = series
        .series_id
        .clone()
        .unwrap_or_else(|| requested_id.to_string());
    series
        .data
        .iter()
        .map(|pair| SeriesPoint {
            date: pair.first().and_then(parse_eia_date_value),
            series_id: series_id.clone(),
            value: pair.get(1).and_then(parse_value),
        })
        .collect()
}

/// Tag points with their source and ingest time
pub fn points_to_bronze(
    points: Vec<SeriesPoint>,
    source_type: SourceType,
    ingested_at: DateTime<Utc>,
) -> Vec<BronzeRow> {
    points
        .into_iter()
        .map(|p| BronzeRow {
            date: p.date,
            series_id: p.series_id,
            value: p.value,
            source_type,
            ingested_at,
        })
        .collect()
}

fn parse_eia_date_value(v: &Value) -> Option<NaiveDate> {
    match v {
        Value::String(s) => parse_eia_date(s),
        Value::Number(n) => parse_eia_date(&n.to_string()),
        _ => None,
    }
}

/// EIA period formats: `YYYYMMDD`, `YYYYMM`, `YYYY`, and ISO `YYYY-MM-DD` / `YYYY-MM`.
pub fn parse_eia_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.chars().all(|c| c.is_ascii_digit()) {
        return match s.len() {
            8 => NaiveDate::parse_from_str(s, "%Y%m%d").ok(),
            6 => {
                let year = s[0..4].parse().ok()?;
                let month = s[4..6].parse().ok()?;
                NaiveDate::from_ymd_opt(year, month, 1)
            }
            4 => NaiveDate::from_ymd_opt(s.parse().ok()?, 1, 1),
            _ => None,
        };
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    // "2024-01"
    let (y, m) = s.split_once('-')?;
    if y.len() == 4 && m.len() == 2 {
        return NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, 1);
    }
    None
}

fn parse_value(v: &Value) -> Option<f64> {
    let f = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    f.is_finite().then_some(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct Canned {
        status: u16,
        body: Value,
    }

    #[async_trait]
    impl HttpClientPort for Canned {
        async fn get(&self, url: &str) -> Result<HttpGetResult> {
            assert!(url.contains("api_key=secret"));
            let bytes = serde_json::to_vec(&self.body).unwrap();
            Ok(HttpGetResult {
                status: self.status,
                content_length: bytes.len() as u64,
                bytes,
                content_type: "application/json".to_string(),
                etag: None,
                last_modified: None,
            })
        }
    }

    fn client(status: u16, body: Value) -> EiaClient {
        EiaClient::new(Arc::new(Canned { status, body }), "https://api.eia.gov/series/", "secret")
    }

    #[test]
    fn parses_eia_period_formats() {
        assert_eq!(parse_eia_date("20240105"), NaiveDate::from_ymd_opt(2024, 1, 5));
        assert_eq!(parse_eia_date("2024-01-05"), NaiveDate::from_ymd_opt(2024, 1, 5));
        assert_eq!(parse_eia_date("202403"), NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(parse_eia_date("2024-03"), NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(parse_eia_date("2024"), NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(parse_eia_date("20241345"), None);
        assert_eq!(parse_eia_date("last friday"), None);
    }

    #[test]
    fn coerces_points() {
        let series: EiaSeries = serde_json::from_value(json!({
            "series_id": "PET.RWTC.D",
            "data": [["20240105", 75.12], ["20240104", "74.50"], ["garbage", 1.0], ["20240103", null], ["20240102", "n/a"]]
        }))
        .unwrap();
        let points = series_to_points(&series, "ignored");
        assert_eq!(points.len(), 5);
        assert_eq!(points[0].value, Some(75.12));
        assert_eq!(points[1].value, Some(74.5));
        assert_eq!(points[2].date, None);
        assert_eq!(points[3].value, None);
        assert_eq!(points[4].value, None);
        assert!(points.iter().all(|p| p.series_id == "PET.RWTC.D"));
    }

    #[tokio::test]
    async fn fetch_returns_first_series_and_redacts_key() {
        let c = client(
            200,
            json!({"series": [{"series_id": "PET.RWTC.D", "data": [["20240105", 75.12]]}]}),
        );
        let fetched = c.fetch_series("PET.RWTC.D").await.unwrap();
        assert_eq!(fetched.series.data.len(), 1);
        assert!(!fetched.redacted_url.contains("secret"));
        assert!(fetched.redacted_url.contains("series_id=PET.RWTC.D"));
    }

    #[tokio::test]
    async fn empty_series_is_an_error() {
        let err = client(200, json!({"series": []}))
            .fetch_series("PET.RWTC.D")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No series data returned for PET.RWTC.D");
    }

    #[tokio::test]
    async fn eia_error_body_surfaces_message() {
        let err = client(200, json!({"request": {}, "data": {"error": "invalid api_key"}}))
            .fetch_series("PET.RWTC.D")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid api_key"));
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let err = client(503, json!({"series": [{"data": []}]}))
            .fetch_series("PET.RWTC.D")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Api { .. }));
    }
}
