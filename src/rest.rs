use anyhow::Context;
use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

use crate::config::RestConfig;
use crate::error::LookupError;
use crate::lookup::{GradeSource, SearchTerms};
use crate::models::{StudentRecord, StudentStatus};

pub const ID_COLUMN: &str = "Número de ID";
pub const EMAIL_COLUMN: &str = "Dirección de correo";

/// Grade table served by PostgREST (Supabase `/rest/v1`).
pub struct RestGradeSource {
    client: reqwest::Client,
    endpoint: Url,
    api_key: String,
}

impl RestGradeSource {
    pub fn new(config: &RestConfig) -> anyhow::Result<Self> {
        let endpoint = format!(
            "{}/rest/v1/{}",
            config.base_url.as_str().trim_end_matches('/'),
            config.table
        );
        let endpoint = Url::parse(&endpoint)
            .with_context(|| format!("invalid grade service endpoint {endpoint}"))?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl GradeSource for RestGradeSource {
    async fn find(&self, terms: &SearchTerms) -> Result<Vec<StudentRecord>, LookupError> {
        let filter = or_filter(terms);
        debug!(endpoint = %self.endpoint, %filter, "querying grade service");

        let response = self
            .client
            .get(self.endpoint.clone())
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&[("select", "*"), ("or", filter.as_str())])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(LookupError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let rows: Vec<RemoteRow> =
            serde_json::from_str(&body).map_err(|err| LookupError::Decode(err.to_string()))?;
        Ok(rows.into_iter().map(StudentRecord::from).collect())
    }
}

/// Builds the PostgREST `or` filter. Every value is quoted, so reserved
/// characters in the search term (`,`, `.`, `:`, `(`, `)`) stay literal.
pub fn or_filter(terms: &SearchTerms) -> String {
    format!(
        "(\"{ID_COLUMN}\".eq.{},\"{EMAIL_COLUMN}\".ilike.{})",
        quote_value(&terms.id),
        quote_value(&escape_like(&terms.email))
    )
}

fn quote_value(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// `ilike` would otherwise treat `%` and `_` as wildcards.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[derive(Debug, Deserialize)]
struct RemoteRow {
    #[serde(rename = "Nombre", deserialize_with = "label")]
    name: String,
    #[serde(rename = "Número de ID", deserialize_with = "label")]
    id: String,
    #[serde(rename = "Dirección de correo", deserialize_with = "label")]
    email: String,
    #[serde(rename = "% Actividades realizadas", default, deserialize_with = "fraction")]
    completion_rate: Option<f64>,
    #[serde(rename = "Nota", deserialize_with = "label")]
    grade: String,
    #[serde(rename = "Condición del estudiante", deserialize_with = "label")]
    status: String,
}

impl From<RemoteRow> for StudentRecord {
    fn from(row: RemoteRow) -> Self {
        StudentRecord {
            name: row.name,
            id: row.id,
            email: row.email,
            completion_rate: row.completion_rate,
            grade: row.grade,
            status: StudentStatus::from(row.status),
        }
    }
}

/// Text columns that some tables store as numbers, such as `Nota`.
fn label<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(text) => Ok(text),
        Value::Number(number) => Ok(number.to_string()),
        Value::Bool(flag) => Ok(flag.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected text or number, got {other}"
        ))),
    }
}

fn fraction<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Number(number) => number
            .as_f64()
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom("completion rate out of range")),
        Value::String(text) if text.trim().is_empty() => Ok(None),
        Value::String(text) => text
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid completion rate `{text}`"))),
        other => Err(serde::de::Error::custom(format!(
            "expected a completion rate, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;

    fn source_for(server: &MockServer) -> RestGradeSource {
        let config = RestConfig {
            base_url: Url::parse(&server.base_url()).unwrap(),
            api_key: "anon-key".to_string(),
            table: "grades".to_string(),
            timeout: Duration::from_secs(5),
        };
        RestGradeSource::new(&config).unwrap()
    }

    #[test]
    fn filter_quotes_reserved_characters() {
        let terms = SearchTerms::parse(" Ana.Perez@Example.com ").unwrap();
        assert_eq!(
            or_filter(&terms),
            "(\"Número de ID\".eq.\"Ana.Perez@Example.com\",\
             \"Dirección de correo\".ilike.\"ana.perez@example.com\")"
        );

        let hostile = SearchTerms::parse("1001,\"x\").or(a.eq.1").unwrap();
        assert_eq!(
            or_filter(&hostile),
            "(\"Número de ID\".eq.\"1001,\\\"x\\\").or(a.eq.1\",\
             \"Dirección de correo\".ilike.\"1001,\\\"x\\\").or(a.eq.1\")"
        );
    }

    #[test]
    fn like_wildcards_are_escaped() {
        let terms = SearchTerms::parse("a_b%c@x.com").unwrap();
        assert!(or_filter(&terms).ends_with(".ilike.\"a\\\\_b\\\\%c@x.com\")"));
    }

    #[tokio::test]
    async fn sends_keys_and_filter() {
        let server = MockServer::start_async().await;
        let terms = SearchTerms::parse("1001").unwrap();
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/rest/v1/grades")
                    .header("apikey", "anon-key")
                    .header("authorization", "Bearer anon-key")
                    .query_param("select", "*")
                    .query_param("or", or_filter(&terms));
                then.status(200).json_body(json!([{
                    "Nombre": "Ana Pérez",
                    "Número de ID": "1001",
                    "Dirección de correo": "ana.perez@example.com",
                    "% Actividades realizadas": 0.873,
                    "Nota": 9,
                    "Condición del estudiante": "Promociona",
                    "Comisión": "K1021"
                }]));
            })
            .await;

        let rows = source_for(&server).find(&terms).await.unwrap();
        mock.assert_async().await;

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Ana Pérez");
        assert_eq!(rows[0].id, "1001");
        assert_eq!(rows[0].grade, "9");
        assert!((rows[0].completion_rate.unwrap() - 0.873).abs() < 1e-9);
        assert_eq!(rows[0].status, StudentStatus::Promotes);
    }

    #[tokio::test]
    async fn null_completion_rate_keeps_the_row() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/rest/v1/grades");
                then.status(200).json_body(json!([{
                    "Nombre": "Ana Pérez",
                    "Número de ID": "1001",
                    "Dirección de correo": "ana.perez@example.com",
                    "% Actividades realizadas": null,
                    "Nota": "9",
                    "Condición del estudiante": "Promociona"
                }]));
            })
            .await;

        let source = source_for(&server);
        let outcome = crate::lookup::lookup(&source, "1001").await.unwrap();
        match outcome {
            crate::models::LookupOutcome::Found(rows) => {
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0].completion_rate, None);
                assert_eq!(crate::lookup::format_completion_rate(rows[0].completion_rate), "-");
            }
            other => panic!("expected the record, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_array_is_no_rows() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/rest/v1/grades");
                then.status(200).json_body(json!([]));
            })
            .await;

        let terms = SearchTerms::parse("nonexistent@x.com").unwrap();
        let rows = source_for(&server).find(&terms).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/rest/v1/grades");
                then.status(401).body("{\"message\":\"Invalid API key\"}");
            })
            .await;

        let terms = SearchTerms::parse("1001").unwrap();
        let err = source_for(&server).find(&terms).await.unwrap_err();
        match err {
            LookupError::Status { status, body } => {
                assert_eq!(status, 401);
                assert!(body.contains("Invalid API key"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn malformed_rows_are_decode_errors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/rest/v1/grades");
                then.status(200).json_body(json!([{ "Nombre": "Ana Pérez" }]));
            })
            .await;

        let terms = SearchTerms::parse("1001").unwrap();
        let err = source_for(&server).find(&terms).await.unwrap_err();
        assert!(matches!(err, LookupError::Decode(_)));
    }
}
