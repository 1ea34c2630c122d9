//! HTTP client for the registration gateway.
//!
//! Gateway contract:
//! - `POST /register {deviceID, publicKey}` -> 201 | 400 | 409 | 500
//! - `GET /public-key/{deviceID}` -> 200 {publicKey} | 500
//!
//! The 409 case maps to `RegisterOutcome::AlreadyRegistered`; an empty
//! `publicKey` in a 200 lookup response is treated as not found.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::client::{DirectoryClient, DirectoryError, RegisterOutcome};
use stc_crypto::PublicKey;

#[derive(Clone)]
pub struct HttpDirectoryClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    #[serde(rename = "deviceID")]
    device_id: &'a str,
    #[serde(rename = "publicKey")]
    public_key: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    details: String,
}

#[derive(Deserialize)]
struct PublicKeyBody {
    #[serde(rename = "publicKey", default)]
    public_key: String,
}

impl HttpDirectoryClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, DirectoryError> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(|e| DirectoryError::Http(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn error_detail(resp: reqwest::Response) -> String {
        match resp.json::<ErrorBody>().await {
            Ok(body) if !body.details.is_empty() => body.details,
            Ok(body) => body.error,
            Err(e) => e.to_string(),
        }
    }
}

#[async_trait]
impl DirectoryClient for HttpDirectoryClient {
    async fn register(
        &self,
        device_id: &str,
        public_key: &PublicKey,
    ) -> Result<RegisterOutcome, DirectoryError> {
        let url = format!("{}/register", self.base_url);
        let body = RegisterRequest {
            device_id,
            public_key: BASE64.encode(public_key.as_bytes()),
        };

        let resp = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| DirectoryError::Http(e.to_string()))?;

        match resp.status() {
            StatusCode::CREATED => Ok(RegisterOutcome::Registered),
            StatusCode::CONFLICT => Ok(RegisterOutcome::AlreadyRegistered),
            StatusCode::BAD_REQUEST => {
                Err(DirectoryError::Validation(Self::error_detail(resp).await))
            }
            other => Err(DirectoryError::RegistrationFailed(format!(
                "status={} detail={}",
                other,
                Self::error_detail(resp).await
            ))),
        }
    }

    async fn lookup(&self, device_id: &str) -> Result<PublicKey, DirectoryError> {
        let url = format!("{}/public-key/{}", self.base_url, device_id);

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DirectoryError::Http(e.to_string()))?;

        match resp.status() {
            StatusCode::OK => {
                let body: PublicKeyBody = resp
                    .json()
                    .await
                    .map_err(|e| DirectoryError::BadResponse(e.to_string()))?;
                if body.public_key.is_empty() {
                    return Err(DirectoryError::NotFound(device_id.to_string()));
                }
                let bytes = BASE64
                    .decode(body.public_key.as_bytes())
                    .map_err(|e| DirectoryError::BadResponse(e.to_string()))?;
                PublicKey::from_bytes(&bytes)
                    .map_err(|e| DirectoryError::BadResponse(e.to_string()))
            }
            // The gateway folds "not found" into its 500 class; resolve
            // read failures to NotFound only when the detail says so.
            other => {
                let detail = Self::error_detail(resp).await;
                if other == StatusCode::INTERNAL_SERVER_ERROR
                    && detail.to_ascii_lowercase().contains("not found")
                {
                    Err(DirectoryError::NotFound(device_id.to_string()))
                } else {
                    Err(DirectoryError::ReadFailed(format!(
                        "status={} detail={}",
                        other, detail
                    )))
                }
            }
        }
    }
}
