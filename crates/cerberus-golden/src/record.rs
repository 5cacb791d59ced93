use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::error::Result;
use crate::masker::SecretMasker;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
use crate::types::{GoldenData, HttpCall, Metadata, RecordedRequest, RecordedResponse};

/// Transport wrapper that forwards every request to the underlying
/// transport and buffers the (request, response, timestamp) triple.
///
/// The buffer holds raw, unmasked traffic; masking happens when the
/// recordings are harvested. One writer per recording session; sessions
/// must not share a buffer.
pub struct RecordingTransport {
    inner: Arc<dyn HttpTransport>,
    calls: Mutex<Vec<HttpCall>>,
}

impl RecordingTransport {
    pub fn new(inner: Arc<dyn HttpTransport>) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn raw_calls(&self) -> Vec<HttpCall> {
        self.calls.lock().unwrap().clone()
    }

    fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl HttpTransport for RecordingTransport {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let recorded_request = RecordedRequest {
            method: request.method.clone(),
            url: request.full_url()?,
            headers: request.headers.clone(),
            params: request.params.clone(),
            body: request.body.clone(),
        };

        let response = self.inner.execute(request).await?;
        debug!(method = %request.method, url = %request.url, "recorded HTTP call");

        let call = HttpCall {
            request: recorded_request,
            response: RecordedResponse {
                status_code: response.status,
                headers: response.headers.clone(),
                content: response.body.clone(),
            },
            timestamp: Utc::now().to_rfc3339(),
        };
        self.calls.lock().unwrap().push(call);

        Ok(response)
    }
}

/// Recording session: hands out its wrapping transport for injection into
/// clients and harvests masked recordings afterwards.
pub struct Recorder {
    transport: Arc<RecordingTransport>,
    masker: SecretMasker,
}

impl Recorder {
    /// Record real network traffic.
    pub fn new(secrets: Vec<String>) -> Self {
        Self::wrapping(Arc::new(ReqwestTransport::new()), secrets)
    }

    /// Record traffic flowing through an arbitrary inner transport.
    pub fn wrapping(inner: Arc<dyn HttpTransport>, secrets: Vec<String>) -> Self {
        Self {
            transport: Arc::new(RecordingTransport::new(inner)),
            masker: SecretMasker::new(secrets),
        }
    }

    /// The transport to thread through clients for the duration of the
    /// session.
    pub fn transport(&self) -> Arc<dyn HttpTransport> {
        self.transport.clone()
    }

    /// All recorded calls, masked. No caller ever observes raw secrets.
    pub fn recordings(&self) -> Vec<HttpCall> {
        self.transport
            .raw_calls()
            .iter()
            .map(|call| self.masker.mask_call(call))
            .collect()
    }

    pub fn clear(&self) {
        self.transport.clear();
    }

    /// Persist `{metadata, recordings}` as a single JSON document,
    /// creating parent directories.
    pub fn save_golden_data(&self, path: &Path, metadata: Metadata) -> Result<()> {
        let golden = GoldenData {
            metadata,
            recordings: self.recordings(),
        };
        golden.save(path)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::error::GoldenError;

    /// Inner transport returning a canned response embedding the request
    /// URL, so tests can observe pass-through.
    struct EchoTransport;

    #[async_trait]
    impl HttpTransport for EchoTransport {
        async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
            Ok(HttpResponse {
                status: 200,
                headers: HashMap::from([(
                    "content-type".to_string(),
                    "text/plain".to_string(),
                )]),
                body: format!("echo {}", request.full_url()?),
            })
        }
    }

    #[tokio::test]
    async fn forwards_and_buffers_calls() {
        let recorder = Recorder::wrapping(Arc::new(EchoTransport), vec![]);
        let transport = recorder.transport();

        let request = HttpRequest::get("https://api.example/a").param("q", "1");
        let response = transport.execute(&request).await.unwrap();
        assert_eq!(response.status, 200);

        let recordings = recorder.recordings();
        assert_eq!(recordings.len(), 1);
        assert_eq!(recordings[0].request.url, "https://api.example/a?q=1");
        assert!(recordings[0].response.content.starts_with("echo"));
        assert!(!recordings[0].timestamp.is_empty());
    }

    #[tokio::test]
    async fn recordings_are_masked_on_harvest() {
        let recorder = Recorder::wrapping(Arc::new(EchoTransport), vec!["s3cret".to_string()]);
        let transport = recorder.transport();

        let request = HttpRequest::get("https://api.example/q").param("appid", "s3cret");
        transport.execute(&request).await.unwrap();

        let serialized = serde_json::to_string(&recorder.recordings()).unwrap();
        assert!(!serialized.contains("s3cret"));
    }

    #[tokio::test]
    async fn saved_file_contains_no_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("golden/echo.json");

        let recorder = Recorder::wrapping(Arc::new(EchoTransport), vec!["hunter2".to_string()]);
        let transport = recorder.transport();
        transport
            .execute(&HttpRequest::get("https://api.example/q").param("key", "hunter2"))
            .await
            .unwrap();

        recorder
            .save_golden_data(
                &path,
                Metadata {
                    description: "echo scenario".to_string(),
                    ..Default::default()
                },
            )
            .unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("hunter2"));
        let loaded = GoldenData::load(&path).unwrap();
        assert_eq!(loaded.metadata.description, "echo scenario");
        assert_eq!(loaded.recordings.len(), 1);
    }

    #[tokio::test]
    async fn clear_drops_the_buffer() {
        let recorder = Recorder::wrapping(Arc::new(EchoTransport), vec![]);
        let transport = recorder.transport();
        transport
            .execute(&HttpRequest::get("https://api.example/"))
            .await
            .unwrap();
        recorder.clear();
        assert!(recorder.recordings().is_empty());
    }

    #[tokio::test]
    async fn inner_transport_errors_propagate_unrecorded() {
        struct FailTransport;

        #[async_trait]
        impl HttpTransport for FailTransport {
            async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
                Err(GoldenError::ReplayMiss {
                    method: request.method.clone(),
                    url: request.url.clone(),
                })
            }
        }

        let recorder = Recorder::wrapping(Arc::new(FailTransport), vec![]);
        let transport = recorder.transport();
        let result = transport
            .execute(&HttpRequest::get("https://api.example/"))
            .await;
        assert!(result.is_err());
        assert!(recorder.recordings().is_empty());
    }
}
