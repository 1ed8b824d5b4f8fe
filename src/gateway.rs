use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::ApiSettings;
use crate::data::{CountryDetail, RawCountry, WorldTotal};

const HOST_HEADER: &str = "x-rapidapi-host";
const KEY_HEADER: &str = "x-rapidapi-key";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid value for header {name}")]
    InvalidHeader { name: &'static str },
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Read-only access to the covid-19-data API.
///
/// Every call is a single GET that either yields the decoded list or an
/// error; there is no retry and no caching.
#[derive(Clone)]
pub struct Gateway {
    client: reqwest::Client,
    endpoint: String,
}

impl Gateway {
    pub fn new(api: &ApiSettings) -> Result<Self, GatewayError> {
        let key = api
            .key
            .as_ref()
            .map(|key| key.expose_secret().as_str())
            .unwrap_or_default();

        let mut headers = HeaderMap::new();
        headers.insert(
            HOST_HEADER,
            HeaderValue::from_str(&api.host).map_err(|_| GatewayError::InvalidHeader { name: HOST_HEADER })?,
        );
        let mut key_value =
            HeaderValue::from_str(key).map_err(|_| GatewayError::InvalidHeader { name: KEY_HEADER })?;
        key_value.set_sensitive(true);
        headers.insert(KEY_HEADER, key_value);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(GatewayError::Client)?;

        Ok(Gateway {
            client,
            endpoint: api.endpoint.trim_end_matches('/').to_string(),
        })
    }

    pub async fn fetch_world_total(&self) -> Result<Vec<WorldTotal>, GatewayError> {
        self.get_json(format!("{}/totals", self.endpoint)).await
    }

    pub async fn fetch_countries(&self) -> Result<Vec<RawCountry>, GatewayError> {
        self.get_json(format!("{}/help/countries", self.endpoint)).await
    }

    /// The code is passed through as given; unknown codes are for the API to reject.
    pub async fn fetch_country_detail(&self, code: &str) -> Result<Vec<CountryDetail>, GatewayError> {
        let url = format!(
            "{}/country/code?code={}",
            self.endpoint,
            urlencoding::encode(code)
        );
        self.get_json(url).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T, GatewayError> {
        log::debug!("GET {}", url);

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(source) => return Err(GatewayError::Transport { url, source }),
        };

        let status = response.status();
        if !status.is_success() {
            log::warn!("{} answered {}", url, status);
            return Err(GatewayError::Status { url, status });
        }

        match response.json::<T>().await {
            Ok(body) => Ok(body),
            Err(source) => Err(GatewayError::Decode { url, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use secrecy::SecretString;
    use serde_json::json;

    fn settings_for(server: &MockServer) -> ApiSettings {
        ApiSettings {
            endpoint: server.base_url(),
            host: "covid-19-data.p.rapidapi.com".to_string(),
            key: Some(SecretString::new("test-key".to_string())),
        }
    }

    #[tokio::test]
    async fn world_total_sends_auth_headers() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/totals")
                    .header("x-rapidapi-host", "covid-19-data.p.rapidapi.com")
                    .header("x-rapidapi-key", "test-key");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(json!([{
                        "confirmed": 1000, "recovered": 500, "critical": 10, "deaths": 20,
                        "lastChange": "2024-01-01T00:00:00+00:00", "lastUpdate": "2024-01-01T00:00:00+00:00"
                    }]));
            })
            .await;

        let gateway = Gateway::new(&settings_for(&server)).unwrap();
        let totals = gateway.fetch_world_total().await.unwrap();

        mock.assert_async().await;
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].confirmed, 1000);
        assert!(totals[0].last_update.is_some());
    }

    #[tokio::test]
    async fn countries_keep_null_fields_for_ingestion() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/help/countries");
                then.status(200).json_body(json!([
                    {"name": "Afghanistan", "alpha2code": "AF", "alpha3code": "AFG", "latitude": 33.93911, "longitude": 67.709953},
                    {"name": "Nowhere", "alpha2code": "NW", "alpha3code": null, "latitude": null, "longitude": 2.0}
                ]));
            })
            .await;

        let gateway = Gateway::new(&settings_for(&server)).unwrap();
        let countries = gateway.fetch_countries().await.unwrap();

        assert_eq!(countries.len(), 2);
        assert_eq!(countries[0].alpha3code.as_deref(), Some("AFG"));
        assert_eq!(countries[1].latitude, None);
    }

    #[tokio::test]
    async fn country_detail_passes_code_in_query() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/country/code").query_param("code", "it");
                then.status(200).json_body(json!([{
                    "country": "Italy", "code": "IT", "confirmed": 250000, "recovered": 1,
                    "critical": 2, "deaths": 3, "latitude": 41.87194, "longitude": 12.56738,
                    "lastChange": null, "lastUpdate": null
                }]));
            })
            .await;

        let gateway = Gateway::new(&settings_for(&server)).unwrap();
        let detail = gateway.fetch_country_detail("it").await.unwrap();

        mock.assert_async().await;
        assert_eq!(detail[0].country, "Italy");
        assert_eq!(detail[0].confirmed, 250000);
    }

    #[tokio::test]
    async fn rate_limited_response_is_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/totals");
                then.status(429).body("Too many requests");
            })
            .await;

        let gateway = Gateway::new(&settings_for(&server)).unwrap();
        let result = gateway.fetch_world_total().await;

        assert!(matches!(
            result,
            Err(GatewayError::Status { status, .. }) if status == reqwest::StatusCode::TOO_MANY_REQUESTS
        ));
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/help/countries");
                then.status(200).body("{\"message\":\"You are not subscribed to this API.\"}");
            })
            .await;

        let gateway = Gateway::new(&settings_for(&server)).unwrap();
        let result = gateway.fetch_countries().await;

        assert!(matches!(result, Err(GatewayError::Decode { .. })));
    }

    #[test]
    fn trailing_slash_in_endpoint_is_ignored() {
        let api = ApiSettings {
            endpoint: "https://example.test/".to_string(),
            ..ApiSettings::default()
        };
        let gateway = Gateway::new(&api).unwrap();
        assert_eq!(gateway.endpoint, "https://example.test");
    }
}
