//! OCR using the Azure Computer Vision Read API (v3.2).

use std::{error, fmt, time::Duration};

use keen_retry::{ExponentialJitter, ResolvedResult};
use reqwest::{
    Response, StatusCode, Url,
    header::{CONTENT_TYPE, HeaderValue},
};

use crate::{
    config::AzureConfig,
    prelude::*,
    retry::{
        IsKnownTransient, RequestRetryResult, retry_result_ok, try_fatal,
        try_potentially_transient,
    },
};

use super::{
    OperationId, ReadApi, ReadOperationResult,
    types::{ErrorDetails, ErrorResponse},
};

/// Header used to pass our subscription key.
const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Header holding the URL of a newly-created operation.
const OPERATION_LOCATION_HEADER: &str = "Operation-Location";

/// Path of the Read API, relative to the resource endpoint.
const READ_API_PATH: [&str; 3] = ["vision", "v3.2", "read"];

/// The longest we're willing to wait for a single HTTP request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Client for the Read API of a single Azure resource.
#[derive(Debug)]
pub struct AzureReadClient {
    /// Shared HTTP client.
    http: reqwest::Client,

    /// Where to connect, and how to authenticate.
    config: AzureConfig,
}

impl AzureReadClient {
    /// Create a new client.
    pub fn new(config: AzureConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Could not create HTTP client")?;
        Ok(Self { http, config })
    }

    /// Build a URL below the Read API root.
    fn read_api_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.config.endpoint().clone();
        url.path_segments_mut()
            .map_err(|_| {
                anyhow!("Azure endpoint cannot be a base URL: {}", self.config.endpoint())
            })?
            .pop_if_empty()
            .extend(READ_API_PATH)
            .extend(segments);
        Ok(url)
    }

    /// The URL we `POST` images to.
    fn analyze_url(&self, language: &str) -> Result<Url> {
        let mut url = self.read_api_url(&["analyze"])?;
        url.query_pairs_mut().append_pair("language", language);
        Ok(url)
    }

    /// The URL we poll for results.
    fn analyze_results_url(&self, id: &OperationId) -> Result<Url> {
        self.read_api_url(&["analyzeResults", id.as_str()])
    }

    /// Make one attempt to submit an image.
    async fn submit_once(
        &self,
        image: &[u8],
        language: &str,
    ) -> RequestRetryResult<OperationId> {
        let url = try_fatal!(self.analyze_url(language));
        let response = try_potentially_transient!(
            self.http
                .post(url)
                .header(SUBSCRIPTION_KEY_HEADER, self.config.key())
                .header(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"))
                .body(image.to_vec())
                .send()
                .await
        );
        let response = try_potentially_transient!(check_status(response).await);

        let location = try_fatal!(
            response
                .headers()
                .get(OPERATION_LOCATION_HEADER)
                .ok_or_else(|| anyhow!(
                    "Azure response did not include an {OPERATION_LOCATION_HEADER} header"
                ))
                .and_then(|value| value
                    .to_str()
                    .context("Operation location was not valid ASCII"))
        );
        debug!(%location, "Submitted image");
        retry_result_ok(try_fatal!(OperationId::from_operation_location(location)))
    }

    /// Make one attempt to fetch an operation's state.
    async fn get_read_result_once(
        &self,
        id: &OperationId,
    ) -> RequestRetryResult<ReadOperationResult> {
        let url = try_fatal!(self.analyze_results_url(id));
        let response = try_potentially_transient!(
            self.http
                .get(url)
                .header(SUBSCRIPTION_KEY_HEADER, self.config.key())
                .send()
                .await
        );
        let response = try_potentially_transient!(check_status(response).await);
        let result = try_potentially_transient!(response.json::<ReadOperationResult>().await);
        trace!(?result, "Read result");
        retry_result_ok(result)
    }
}

#[async_trait]
impl ReadApi for AzureReadClient {
    #[instrument(level = "debug", skip_all, fields(bytes = image.len(), language = %language))]
    async fn submit(&self, image: Vec<u8>, language: &str) -> Result<OperationId> {
        with_retries("submit image", || self.submit_once(&image, language)).await
    }

    #[instrument(level = "debug", skip_all, fields(id = %id))]
    async fn get_read_result(&self, id: &OperationId) -> Result<ReadOperationResult> {
        with_retries("get read result", || self.get_read_result_once(id)).await
    }
}

/// Run a request, retrying transient failures with exponential backoff.
async fn with_retries<T, F, Fut>(what: &str, attempt: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = RequestRetryResult<T>>,
{
    let jitter = ExponentialJitter::FromBackoffRange {
        backoff_range_millis: 500..=15_000,
        re_attempts: 4,
        jitter_ratio: 0.2,
    };

    let result = attempt()
        .await
        .retry_with_async(|_| attempt())
        .with_exponential_jitter(|| jitter)
        .await
        .inspect_recovered(|_, _, retry_errors_list| {
            warn!(
                "{what} suceeded after retrying {} times (failed attempts: [{}])",
                retry_errors_list.len(),
                keen_retry::loggable_retry_errors(retry_errors_list)
            )
        })
        .inspect_given_up(|_, retry_errors_list, fatal_error| {
            error!(
                "{what} FAILED after exhausting all {} retrying attempts with error {fatal_error:?}. Previous transient failures: [{}]",
                retry_errors_list.len(),
                keen_retry::loggable_retry_errors(retry_errors_list)
            )
        });

    match result {
        ResolvedResult::Ok { output, .. } | ResolvedResult::Recovered { output, .. } => {
            Ok(output)
        }
        ResolvedResult::Fatal { error, .. } => {
            Err(error.context(format!("Could not {what}")))
        }
        ResolvedResult::GivenUp { fatal_error, .. }
        | ResolvedResult::Unrecoverable { fatal_error, .. } => {
            Err(fatal_error.context(format!("Could not {what}")))
        }
    }
}

/// A non-2xx response from Azure.
#[derive(Debug)]
pub struct ServiceError {
    /// The HTTP status.
    status: StatusCode,

    /// The decoded error payload, if the body had one.
    details: Option<ErrorDetails>,

    /// The raw body, used when there was no error payload.
    body: String,
}

impl ServiceError {
    /// Build an error from a failed response, consuming its body.
    async fn from_response(response: Response) -> Self {
        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => {
                debug!("Could not read body of {status} response: {err:?}");
                String::new()
            }
        };
        let details = serde_json::from_str::<ErrorResponse>(&body)
            .ok()
            .map(|response| response.error);
        Self {
            status,
            details,
            body,
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Azure returned {}", self.status)?;
        match &self.details {
            Some(details) => write!(f, ": {details}"),
            None if !self.body.trim().is_empty() => write!(f, ": {}", self.body.trim()),
            None => Ok(()),
        }
    }
}

impl error::Error for ServiceError {}

impl IsKnownTransient for ServiceError {
    fn is_known_transient(&self) -> bool {
        self.status.is_known_transient()
    }
}

/// Turn non-2xx responses into a [`ServiceError`].
async fn check_status(response: Response) -> Result<Response, ServiceError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(ServiceError::from_response(response).await)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tokio::{
        io::{AsyncBufReadExt as _, AsyncReadExt as _, AsyncWriteExt as _, BufReader},
        net::TcpListener,
    };

    use super::*;
    use crate::read_api::OperationStatus;

    fn client(endpoint: &str) -> AzureReadClient {
        AzureReadClient::new(AzureConfig::new("key", endpoint).unwrap()).unwrap()
    }

    /// Build a raw HTTP/1.1 response that closes its connection.
    fn http_response(status: &str, headers: &[(&str, &str)], body: &str) -> String {
        let mut response = format!("HTTP/1.1 {status}\r\n");
        for (name, value) in headers {
            response.push_str(&format!("{name}: {value}\r\n"));
        }
        response.push_str(&format!(
            "Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        ));
        response
    }

    /// Serve `responses` in order, one per connection, on a local port.
    ///
    /// Returns the server's base URL and the request heads it has seen.
    async fn serve(responses: Vec<String>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(vec![]));
        let seen = requests.clone();
        tokio::spawn(async move {
            for response in responses {
                let (stream, _) = listener.accept().await.unwrap();
                let mut stream = BufReader::new(stream);
                let mut head = String::new();
                let mut content_length = 0;
                loop {
                    let mut line = String::new();
                    if stream.read_line(&mut line).await.unwrap() == 0 || line == "\r\n" {
                        break;
                    }
                    if let Some(value) =
                        line.to_ascii_lowercase().strip_prefix("content-length:")
                    {
                        content_length = value.trim().parse().unwrap();
                    }
                    head.push_str(&line);
                }
                let mut body = vec![0; content_length];
                stream.read_exact(&mut body).await.unwrap();
                seen.lock().unwrap().push(head);

                let stream = stream.get_mut();
                stream.write_all(response.as_bytes()).await.unwrap();
                stream.shutdown().await.ok();
            }
        });
        (format!("http://{addr}/"), requests)
    }

    #[tokio::test]
    async fn test_submit_returns_operation_id() {
        let (endpoint, requests) = serve(vec![http_response(
            "202 Accepted",
            &[(
                "Operation-Location",
                "https://example.com/vision/v3.2/read/analyzeResults/abc-123",
            )],
            "",
        )])
        .await;
        let id = client(&endpoint)
            .submit(b"image".to_vec(), "ja")
            .await
            .unwrap();
        assert_eq!(id.as_str(), "abc-123");

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let head = requests[0].to_ascii_lowercase();
        assert!(head.starts_with("post /vision/v3.2/read/analyze?language=ja "));
        assert!(head.contains("ocp-apim-subscription-key: key"));
        assert!(head.contains("content-type: application/octet-stream"));
    }

    #[tokio::test]
    async fn test_submit_without_operation_location_is_fatal() {
        let (endpoint, requests) = serve(vec![
            http_response("202 Accepted", &[], ""),
            http_response("202 Accepted", &[], ""),
        ])
        .await;
        let err = client(&endpoint)
            .submit(b"image".to_vec(), "ja")
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("Operation-Location"));
        assert_eq!(requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_client_error_is_fatal_and_reports_details() {
        let body = r#"{"error":{"code":"InvalidImageFormat","message":"Input data is not a valid image."}}"#;
        let (endpoint, requests) = serve(vec![
            http_response("400 Bad Request", &[("Content-Type", "application/json")], body),
            http_response("400 Bad Request", &[("Content-Type", "application/json")], body),
        ])
        .await;
        let err = client(&endpoint)
            .submit(b"not an image".to_vec(), "ja")
            .await
            .unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("Could not submit image"));
        assert!(message.contains(
            "Azure returned 400 Bad Request: InvalidImageFormat: Input data is not a valid image."
        ));
        assert_eq!(requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_truncated_error_body_still_reports_status() {
        let truncated =
            "HTTP/1.1 400 Bad Request\r\nContent-Length: 100\r\nConnection: close\r\n\r\n{\"error\""
                .to_owned();
        let (endpoint, requests) = serve(vec![truncated]).await;
        let err = client(&endpoint)
            .submit(b"image".to_vec(), "ja")
            .await
            .unwrap_err();
        assert!(format!("{err:#}").ends_with("Azure returned 400 Bad Request"));
        assert_eq!(requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_read_result_retries_unavailable() {
        let (endpoint, requests) = serve(vec![
            http_response("503 Service Unavailable", &[], "busy"),
            http_response(
                "200 OK",
                &[("Content-Type", "application/json")],
                r#"{"status":"running"}"#,
            ),
        ])
        .await;
        let id = OperationId::from_operation_location("abc-123").unwrap();
        let result = client(&endpoint).get_read_result(&id).await.unwrap();
        assert_eq!(result.status, OperationStatus::Running);

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        for head in requests.iter() {
            assert!(head.starts_with("GET /vision/v3.2/read/analyzeResults/abc-123 "));
        }
    }

    #[test]
    fn test_analyze_url() {
        let client = client("https://example.cognitiveservices.azure.com/");
        assert_eq!(
            client.analyze_url("ja").unwrap().as_str(),
            "https://example.cognitiveservices.azure.com/vision/v3.2/read/analyze?language=ja"
        );
    }

    #[test]
    fn test_analyze_results_url_without_trailing_slash() {
        let client = client("https://example.cognitiveservices.azure.com");
        let id = OperationId::from_operation_location("abc-123").unwrap();
        assert_eq!(
            client.analyze_results_url(&id).unwrap().as_str(),
            "https://example.cognitiveservices.azure.com/vision/v3.2/read/analyzeResults/abc-123"
        );
    }

    #[test]
    fn test_service_error_display() {
        let err = ServiceError {
            status: StatusCode::BAD_REQUEST,
            details: Some(ErrorDetails {
                code: Some("InvalidImageFormat".to_owned()),
                message: Some("Input data is not a valid image.".to_owned()),
            }),
            body: String::new(),
        };
        assert_eq!(
            err.to_string(),
            "Azure returned 400 Bad Request: InvalidImageFormat: Input data is not a valid image."
        );
        assert!(!err.is_known_transient());

        let err = ServiceError {
            status: StatusCode::TOO_MANY_REQUESTS,
            details: None,
            body: "slow down".to_owned(),
        };
        assert_eq!(err.to_string(), "Azure returned 429 Too Many Requests: slow down");
        assert!(err.is_known_transient());
    }
}
