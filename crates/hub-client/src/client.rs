//! The process/catalog API client.

use bytes::Bytes;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use cube_store::constants::{
    DEFAULT_NUM_RETRIES, DEFAULT_RETRY_BACKOFF_BASE, DEFAULT_RETRY_BACKOFF_MAX,
    DEFAULT_SH_API_URL, DEFAULT_SH_OAUTH2_URL,
};
use cube_store::{
    CubeStoreError, DatasetCatalog, FeatureQuery, SampleType, TileFeature, TileProvider,
    TileRequest, TileResponse,
};

use crate::auth::TokenProvider;
use crate::{HubClientError, Result};

/// Configuration for the API client.
///
/// Credentials default to the `SH_CLIENT_ID` / `SH_CLIENT_SECRET` environment
/// variables, read exactly once by [`ClientConfig::from_env`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub oauth2_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub num_retries: u32,
    pub retry_backoff_base: f64,
    /// Base backoff delay in milliseconds.
    pub retry_backoff_max: u64,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_SH_API_URL.to_string(),
            oauth2_url: DEFAULT_SH_OAUTH2_URL.to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            num_retries: DEFAULT_NUM_RETRIES,
            retry_backoff_base: DEFAULT_RETRY_BACKOFF_BASE,
            retry_backoff_max: DEFAULT_RETRY_BACKOFF_MAX,
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl ClientConfig {
    /// Read credentials from the process environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("SH_CLIENT_ID") {
            config.client_id = val;
        }
        if let Ok(val) = std::env::var("SH_CLIENT_SECRET") {
            config.client_secret = val;
        }

        config
    }
}

/// Blocking client for the process and catalog APIs.
pub struct SentinelHubClient {
    http: reqwest::blocking::Client,
    auth: TokenProvider,
    config: ClientConfig,
    catalog: DatasetCatalog,
}

impl SentinelHubClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        let auth = TokenProvider::new(
            http.clone(),
            config.oauth2_url.clone(),
            config.client_id.clone(),
            config.client_secret.clone(),
        );

        Ok(Self {
            http,
            auth,
            config,
            catalog: DatasetCatalog::new(),
        })
    }

    /// The process API `data.type` for a request: the BYOC collection when
    /// one is configured, otherwise the dataset's catalog collection.
    fn data_type(&self, request: &TileRequest) -> String {
        if let Some(collection_id) = &request.collection_id {
            return format!("byoc-{}", collection_id);
        }
        self.catalog
            .dataset(&request.dataset_name)
            .map(|entry| entry.collection.to_string())
            .unwrap_or_else(|| request.dataset_name.clone())
    }

    fn process_body(&self, request: &TileRequest) -> Value {
        json!({
            "input": {
                "bounds": {
                    "bbox": request.bbox.as_tuple(),
                    "properties": { "crs": request.crs_uri },
                },
                "data": [{
                    "type": self.data_type(request),
                    "dataFilter": {
                        "timeRange": {
                            "from": utc_z(request.time_range.start),
                            "to": utc_z(request.time_range.end),
                        },
                        "mosaickingOrder": request.mosaicking_order.as_str(),
                    },
                    "processing": {
                        "upsampling": request.upsampling.as_str(),
                        "downsampling": request.downsampling.as_str(),
                    },
                }],
            },
            "output": {
                "width": request.width,
                "height": request.height,
                "responses": [{
                    "identifier": "default",
                    "format": { "type": "application/octet-stream" },
                }],
            },
            "evalscript": build_evalscript(&request.band_names, request.sample_type),
        })
    }

    /// Send a request, retrying 429 and 5xx responses with backoff.
    fn send_with_retry<F>(&self, build: F) -> Result<reqwest::blocking::Response>
    where
        F: Fn() -> reqwest::blocking::RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            let response = build().send()?;
            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            let retryable = status.as_u16() == 429 || status.is_server_error();
            if !retryable || attempt >= self.config.num_retries {
                let message = response.text().unwrap_or_default();
                return Err(HubClientError::Status {
                    status: status.as_u16(),
                    message,
                });
            }

            let delay = backoff_delay(
                self.config.retry_backoff_max,
                self.config.retry_backoff_base,
                attempt,
            );
            warn!(
                status = status.as_u16(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                "retrying request"
            );
            std::thread::sleep(delay);
            attempt += 1;
        }
    }

    fn get_tile_features(&self, query: &FeatureQuery) -> Result<Vec<TileFeature>> {
        let token = self.auth.access_token()?;
        let url = format!("{}/api/v1/catalog/1.0.0/search", self.config.api_url);
        let body = json!({
            "collections": [query.collection],
            "bbox": query.bbox.as_tuple(),
            "datetime": format!(
                "{}/{}",
                utc_z(query.time_range.start),
                utc_z(query.time_range.end)
            ),
            "limit": query.limit,
            "next": query.offset,
        });

        debug!(collection = %query.collection, offset = query.offset, "catalog search");
        let response = self.send_with_retry(|| {
            self.http
                .post(&url)
                .bearer_auth(&token)
                .json(&body)
        })?;

        let page: Value = response
            .json()
            .map_err(|e| HubClientError::Decode(e.to_string()))?;
        let features = page
            .get("features")
            .cloned()
            .ok_or_else(|| HubClientError::Decode("catalog page without features".to_string()))?;
        serde_json::from_value(features).map_err(|e| HubClientError::Decode(e.to_string()))
    }

    fn get_data(&self, request: &TileRequest) -> Result<TileResponse> {
        let token = self.auth.access_token()?;
        let url = format!("{}/api/v1/process", self.config.api_url);
        let body = self.process_body(request);

        let response = self.send_with_retry(|| {
            self.http
                .post(&url)
                .bearer_auth(&token)
                .header(reqwest::header::ACCEPT, "application/octet-stream")
                .json(&body)
        })?;

        let width = header_u32(&response, "SH-Width")?;
        let height = header_u32(&response, "SH-Height")?;
        let components = header_u32(&response, "SH-Components")?;
        let sample_type: SampleType = header_str(&response, "SH-SampleType")?
            .parse()
            .map_err(|e: CubeStoreError| HubClientError::Decode(e.to_string()))?;

        let content: Bytes = response.bytes()?;

        Ok(TileResponse {
            width,
            height,
            components,
            sample_type,
            content,
        })
    }
}

impl TileProvider for SentinelHubClient {
    fn fetch_features(&self, query: &FeatureQuery) -> cube_store::Result<Vec<TileFeature>> {
        self.get_tile_features(query)
            .map_err(|e| CubeStoreError::Catalog(e.to_string()))
    }

    fn fetch_tile(&self, request: &TileRequest) -> cube_store::Result<TileResponse> {
        self.get_data(request)
            .map_err(|e| CubeStoreError::Provider(e.to_string()))
    }
}

/// Generate the evalscript returning the requested bands in order.
fn build_evalscript(band_names: &[String], sample_type: SampleType) -> String {
    let inputs = band_names
        .iter()
        .map(|name| format!("\"{}\"", name))
        .collect::<Vec<_>>()
        .join(", ");
    let samples = band_names
        .iter()
        .map(|name| format!("sample.{}", name))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"//VERSION=3
function setup() {{
  return {{
    input: [{{ bands: [{inputs}] }}],
    output: {{ bands: {count}, sampleType: "{sample_type}" }},
  }};
}}
function evaluatePixel(sample) {{
  return [{samples}];
}}
"#,
        inputs = inputs,
        count = band_names.len(),
        sample_type = sample_type,
        samples = samples,
    )
}

fn backoff_delay(max_ms: u64, base: f64, attempt: u32) -> Duration {
    let scaled = max_ms as f64 * base.powi(attempt.min(i32::MAX as u32) as i32);
    Duration::from_millis(scaled as u64)
}

fn utc_z(instant: chrono::DateTime<chrono::Utc>) -> String {
    instant.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn header_str<'a>(response: &'a reqwest::blocking::Response, name: &str) -> Result<&'a str> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| HubClientError::Decode(format!("missing header {}", name)))
}

fn header_u32(response: &reqwest::blocking::Response, name: &str) -> Result<u32> {
    header_str(response, name)?
        .parse()
        .map_err(|_| HubClientError::Decode(format!("malformed header {}", name)))
}
