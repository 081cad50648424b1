//! Access to the remote Cosmicflows calculator service.

use std::time::Duration;

use reqwest::blocking::Client;
use thiserror::Error;

use crate::config::CalculatorConfig;
use crate::core::types::Calculator;
use crate::processors::normalize::RawResponse;
use crate::processors::query::QueryRequest;

/// Network or service failure for a single request.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("invalid JSON from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{0}")]
    Other(String),
}

/// Anything that can answer a calculator query.
///
/// Implementations are shared across the fetch pool, hence `Sync`.
pub trait CalculatorClient: Sync {
    fn fetch(&self, request: &QueryRequest) -> Result<RawResponse, TransportError>;
}

impl<F> CalculatorClient for F
where
    F: Fn(&QueryRequest) -> Result<RawResponse, TransportError> + Sync,
{
    fn fetch(&self, request: &QueryRequest) -> Result<RawResponse, TransportError> {
        self(request)
    }
}

/// Blocking HTTP client for the public calculator API.
///
/// Sends `GET {base_url}/{CALC}calculator/api.php` with the JSON request
/// body and `Content-type: application/json`.
#[derive(Debug, Clone)]
pub struct HttpCalculatorClient {
    client: Client,
    base_url: String,
}

impl HttpCalculatorClient {
    pub fn new(config: &CalculatorConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(config.max_concurrent_requests)
            .build()
            .map_err(TransportError::Client)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// API endpoint for a calculator backend.
    pub fn endpoint(&self, calculator: Calculator) -> String {
        endpoint_url(&self.base_url, calculator)
    }
}

fn endpoint_url(base_url: &str, calculator: Calculator) -> String {
    format!(
        "{}/{}calculator/api.php",
        base_url.trim_end_matches('/'),
        calculator.as_str()
    )
}

impl CalculatorClient for HttpCalculatorClient {
    fn fetch(&self, request: &QueryRequest) -> Result<RawResponse, TransportError> {
        let url = self.endpoint(request.calculator());

        let response = self
            .client
            .get(&url)
            .json(request)
            .send()
            .map_err(|source| TransportError::Request {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url,
                status: status.as_u16(),
            });
        }

        response
            .json::<RawResponse>()
            .map_err(|source| TransportError::Decode { url, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::query::build;
    use serde_json::json;

    #[test]
    fn test_endpoint_url() {
        assert_eq!(
            endpoint_url("http://edd.ifa.hawaii.edu", Calculator::Nam),
            "http://edd.ifa.hawaii.edu/NAMcalculator/api.php"
        );
        assert_eq!(
            endpoint_url("http://localhost:8080/", Calculator::Cf3),
            "http://localhost:8080/CF3calculator/api.php"
        );
    }

    #[test]
    fn test_client_uses_configured_base_url() {
        let config = CalculatorConfig {
            base_url: "http://example.test/".to_string(),
            ..CalculatorConfig::default()
        };
        let client = HttpCalculatorClient::new(&config).unwrap();
        assert_eq!(
            client.endpoint(Calculator::Cf3),
            "http://example.test/CF3calculator/api.php"
        );
    }

    #[test]
    fn test_closure_client() {
        let client = |req: &QueryRequest| -> Result<RawResponse, TransportError> {
            let (alpha, delta) = req.coordinate();
            Ok(json!({"message": "Success", "RA": alpha, "Dec": delta}))
        };
        let req = build(1.0, 2.0, "galactic", "distance", 10.0, "NAM").unwrap();
        let body = client.fetch(&req).unwrap();
        assert_eq!(body["RA"], json!(1.0));
    }

    #[test]
    fn test_unusable_base_url_is_transport_error() {
        // Rejected while building the request, before any socket is opened
        for base_url in ["http://not a host", "ftp://calculator.invalid"] {
            let config = CalculatorConfig {
                base_url: base_url.to_string(),
                timeout_secs: 2,
                ..CalculatorConfig::default()
            };
            let client = HttpCalculatorClient::new(&config).unwrap();
            let req = build(1.0, 2.0, "galactic", "distance", 10.0, "NAM").unwrap();

            let err = client.fetch(&req).unwrap_err();
            assert!(
                matches!(err, TransportError::Request { .. }),
                "{}: {}",
                base_url,
                err
            );
        }
    }
}
