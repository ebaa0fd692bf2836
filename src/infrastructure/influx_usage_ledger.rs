// InfluxDB usage ledger implementation
use crate::application::repositories::UsageLedger;
use crate::domain::irrigation::UsageRecord;
use crate::infrastructure::config::{prepare_query, InfluxSettings};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct InfluxUsageLedger {
    host: String,
    token: String,
    database: String,
    retention_policy: String,
    usage_query: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct InfluxQLResponse {
    results: Vec<InfluxQLResult>,
}

#[derive(Debug, Deserialize)]
struct InfluxQLResult {
    #[serde(default)]
    series: Option<Vec<InfluxQLSeries>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InfluxQLSeries {
    columns: Vec<String>,
    values: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    tags: Option<HashMap<String, String>>,
}

impl InfluxUsageLedger {
    pub fn new(settings: InfluxSettings) -> Self {
        Self {
            host: settings.host.trim_end_matches('/').to_string(),
            token: settings.token,
            database: settings.database,
            retention_policy: settings.retention_policy,
            usage_query: settings.usage_query,
            client: reqwest::Client::new(),
        }
    }

    fn build_query_url(&self, query: &str) -> String {
        let encoded_query = urlencoding::encode(query);
        format!(
            "{}/query?db={}&rp={}&q={}",
            self.host, self.database, self.retention_policy, encoded_query
        )
    }

    fn usage_query(&self, farm_id: &str, since: DateTime<Utc>) -> String {
        let mut vars = HashMap::new();
        // Single quotes would terminate the InfluxQL string literal
        vars.insert("farm".to_string(), farm_id.replace('\'', "\\'"));
        vars.insert(
            "since".to_string(),
            since.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        prepare_query(&self.usage_query, &vars)
    }

    async fn execute_query(&self, query: &str) -> Result<InfluxQLResponse> {
        let url = self.build_query_url(query);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Token {}", self.token))
            .header("Accept", "application/json")
            .send()
            .await
            .context("Failed to send request to InfluxDB")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("InfluxDB query failed with status {}: {}", status, body);
        }

        let data = response
            .json::<InfluxQLResponse>()
            .await
            .context("Failed to parse InfluxDB response")?;

        if let Some(result) = data.results.first() {
            if let Some(error) = &result.error {
                anyhow::bail!("InfluxDB query error: {}", error);
            }
        }

        Ok(data)
    }
}

/// Extract usage rows; the zone comes from the `zone` tag when grouped by it.
fn records_from_response(response: &InfluxQLResponse) -> Vec<UsageRecord> {
    let mut records = Vec::new();

    let Some(series_list) = response.results.first().and_then(|r| r.series.as_ref()) else {
        return records;
    };

    for series in series_list {
        let time_idx = series.columns.iter().position(|c| c == "time").unwrap_or(0);
        let value_idx = series
            .columns
            .iter()
            .position(|c| c == "gallons" || c == "sum" || c == "value")
            .unwrap_or(1);
        let zone = series.tags.as_ref().and_then(|t| t.get("zone")).cloned();

        for row in &series.values {
            let (Some(time), Some(gallons)) = (
                row.get(time_idx).and_then(|v| v.as_str()),
                row.get(value_idx).and_then(|v| v.as_f64()),
            ) else {
                continue;
            };

            match DateTime::parse_from_rfc3339(time) {
                Ok(at) => records.push(UsageRecord {
                    at: at.with_timezone(&Utc),
                    zone: zone.clone(),
                    gallons,
                }),
                Err(e) => tracing::debug!("Skipping usage row with bad time {}: {}", time, e),
            }
        }
    }

    records
}

#[async_trait]
impl UsageLedger for InfluxUsageLedger {
    async fn usage_since(&self, farm_id: &str, since: DateTime<Utc>) -> Result<Vec<UsageRecord>> {
        let query = self.usage_query(farm_id, since);
        tracing::debug!("Executing usage query: {}", query);

        let response = self.execute_query(&query).await?;
        let records = records_from_response(&response);

        tracing::debug!("Found {} usage records for farm {}", records.len(), farm_id);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ledger() -> InfluxUsageLedger {
        InfluxUsageLedger::new(InfluxSettings {
            host: "http://influx:8086/".to_string(),
            token: "secret".to_string(),
            database: "farm".to_string(),
            retention_policy: "autogen".to_string(),
            usage_query: "SELECT gallons FROM usage WHERE farm='${farm}' AND time >= '${since}'"
                .to_string(),
        })
    }

    #[test]
    fn test_usage_query_and_url() {
        let ledger = ledger();
        let since = Utc.with_ymd_and_hms(2023, 6, 2, 15, 0, 0).unwrap();
        let query = ledger.usage_query("farm1", since);
        assert_eq!(
            query,
            "SELECT gallons FROM usage WHERE farm='farm1' AND time >= '2023-06-02T15:00:00Z'"
        );

        let url = ledger.build_query_url("SELECT 1");
        assert_eq!(url, "http://influx:8086/query?db=farm&rp=autogen&q=SELECT%201");
    }

    #[test]
    fn test_farm_id_quotes_escaped() {
        let since = Utc.with_ymd_and_hms(2023, 6, 2, 0, 0, 0).unwrap();
        let query = ledger().usage_query("o'brien", since);
        assert!(query.contains("farm='o\\'brien'"));
    }

    #[test]
    fn test_records_from_grouped_response() {
        let body = r#"{
            "results": [{
                "series": [
                    {
                        "name": "irrigation_usage",
                        "tags": {"zone": "north"},
                        "columns": ["time", "gallons"],
                        "values": [
                            ["2023-06-16T06:00:00Z", 60.5],
                            ["2023-06-16T07:00:00Z", null],
                            ["not-a-time", 3.0]
                        ]
                    },
                    {
                        "name": "irrigation_usage",
                        "columns": ["time", "gallons"],
                        "values": [["2023-06-15T06:00:00Z", 12]]
                    }
                ]
            }]
        }"#;
        let response: InfluxQLResponse = serde_json::from_str(body).unwrap();
        let records = records_from_response(&response);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].zone.as_deref(), Some("north"));
        assert_eq!(records[0].gallons, 60.5);
        assert_eq!(records[1].zone, None);
        assert_eq!(records[1].gallons, 12.0);
    }

    #[test]
    fn test_empty_response_has_no_records() {
        let response: InfluxQLResponse = serde_json::from_str(r#"{"results":[{}]}"#).unwrap();
        assert!(records_from_response(&response).is_empty());
    }
}
