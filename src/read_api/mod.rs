//! Interface to an asynchronous OCR service shaped like Azure's Read API.
//!
//! Recognition happens in two steps: we submit an image and get back an
//! [`OperationId`], and then we ask for the status of that operation until
//! it's done. [`ReadApi`] describes those two calls, so that the polling
//! logic doesn't care whether it's talking to Azure or to a test double.

use std::{fmt, str::FromStr};

use reqwest::Url;

use crate::prelude::*;

pub use self::types::{AnalyzeResult, OperationStatus, ReadOperationResult};

pub mod azure;
pub mod types;

/// Identifies one asynchronous recognition job.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OperationId(String);

impl OperationId {
    /// Extract the operation ID from an `Operation-Location` value.
    ///
    /// The ID is the last path segment, so
    /// `https://host/vision/v3.2/read/analyzeResults/abc-123` yields `abc-123`.
    /// A bare ID is accepted as-is.
    pub fn from_operation_location(location: &str) -> Result<Self> {
        // A URL with nothing after the host names a server, not an operation.
        let names_host_only = Url::parse(location)
            .map(|url| url.has_host() && url.path().trim_matches('/').is_empty())
            .unwrap_or(false);
        if names_host_only {
            return Err(anyhow!(
                "Operation location {:?} has no operation ID in its path",
                location
            ));
        }
        let path = location
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .trim_end_matches('/');
        let id = path.rsplit('/').next().unwrap_or_default().trim();
        if id.is_empty() {
            return Err(anyhow!(
                "Could not find an operation ID in operation location {:?}",
                location
            ));
        }
        Ok(Self(id.to_owned()))
    }

    /// The ID as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for OperationId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_operation_location(s)
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The two calls we need from a Read-style OCR service.
#[async_trait]
pub trait ReadApi: Send + Sync {
    /// Submit an image for recognition, returning the new operation's ID.
    ///
    /// `language` is a BCP-47 hint such as `"ja"`.
    async fn submit(&self, image: Vec<u8>, language: &str) -> Result<OperationId>;

    /// Fetch the current state of an operation.
    async fn get_read_result(&self, id: &OperationId) -> Result<ReadOperationResult>;
}
