// src/ingest/providers/http.rs
//! Sample source backed by the sensor platform's JSON API.
//!
//! `GET {base}/sensors/samples?sensors=a,b&start=..&end=..` with an optional
//! bearer token. Timestamps are RFC 3339.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;

use crate::ingest::types::SampleSource;
use crate::model::{LocationSeries, Sample};

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    locations: Vec<WireLocation>,
}

#[derive(Debug, Deserialize)]
struct WireLocation {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    samples: Vec<WireSample>,
}

#[derive(Debug, Deserialize)]
struct WireSample {
    timestamp: DateTime<Utc>,
    #[serde(rename = "in", default)]
    count_in: u64,
    #[serde(rename = "out", default)]
    count_out: u64,
    #[serde(default)]
    returning: Option<f64>,
    #[serde(default)]
    visit_duration: Option<f64>,
    #[serde(default, alias = "outside_traffic")]
    outside: Option<f64>,
}

impl From<WireSample> for Sample {
    fn from(w: WireSample) -> Self {
        Sample {
            timestamp: w.timestamp,
            count_in: w.count_in,
            count_out: w.count_out,
            returning: w.returning,
            visit_duration: w.visit_duration,
            outside_traffic: w.outside,
        }
    }
}

pub struct HttpSampleSource {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpSampleSource {
    pub fn new(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building sample source http client")?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
            client,
        })
    }

    pub(crate) fn parse_response(body: &str) -> Result<Vec<LocationSeries>> {
        let resp: WireResponse =
            serde_json::from_str(body).context("parsing sample source response")?;
        Ok(resp
            .locations
            .into_iter()
            .map(|l| LocationSeries {
                name: l.name.unwrap_or_else(|| l.id.clone()),
                id: l.id,
                samples: l.samples.into_iter().map(Sample::from).collect(),
            })
            .collect())
    }
}

#[async_trait]
impl SampleSource for HttpSampleSource {
    async fn fetch(
        &self,
        sensor_ids: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LocationSeries>> {
        let url = format!("{}/sensors/samples", self.base_url);
        let mut req = self.client.get(&url).query(&[
            ("sensors", sensor_ids.join(",")),
            ("start", start.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("end", end.to_rfc3339_opts(SecondsFormat::Secs, true)),
        ]);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.context("sample source http get()")?;
        let status = resp.status();
        let body = resp.text().await.context("sample source http .text()")?;
        if !status.is_success() {
            anyhow::bail!("sample source returned {status}");
        }
        Self::parse_response(&body)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
