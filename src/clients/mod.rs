//! Adapters for the services this one depends on.
//!
//! Every adapter reports transport failures and timeouts as
//! [`ClientError::Unavailable`] so callers can tell "the remote said no" apart
//! from "the remote could not be reached".

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

pub mod identity;
pub mod inventory;

pub use identity::{Identity, IdentityClient, JwtIdentityClient, RemoteIdentityClient};
pub use inventory::{
    AdjustmentCall, HttpInventoryClient, InMemoryInventory, InventoryClient, Product,
    StockAdjustment, StockCheck,
};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("resource not found")]
    NotFound,

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("client configuration error: {0}")]
    Configuration(String),
}

pub type ClientResult<T> = Result<T, ClientError>;

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::InvalidResponse(err.to_string())
        } else {
            ClientError::Unavailable(err.to_string())
        }
    }
}

/// Builds a client whose every request is bounded by the given timeouts.
pub fn http_client(connect_timeout: Duration, request_timeout: Duration) -> ClientResult<Client> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(request_timeout)
        .build()
        .map_err(|e| ClientError::Configuration(format!("failed to build http client: {e}")))
}

pub(crate) async fn decode_json<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(ClientError::NotFound);
    }
    if status.is_server_error() {
        return Err(ClientError::Unavailable(format!("upstream returned {status}")));
    }
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(ClientError::Rejected {
            status: status.as_u16(),
            message,
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|e| ClientError::InvalidResponse(e.to_string()))
}

pub(crate) fn trim_base_url(base_url: impl Into<String>) -> String {
    base_url.into().trim_end_matches('/').to_string()
}
