use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::info;

use super::stream::WsChannel;
use super::{AnalysisBackend, AnalysisResult, StreamingChannel, TransportError};

/// Per-request timeout. Bounds teardown when a session is cancelled with an
/// upload in flight.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct RecordingsResponse {
    recordings: Vec<String>,
}

/// HTTP + WebSocket client for the analysis backend.
///
/// Routes follow the service's v1 API:
/// - `POST {api}/audio/process`: multipart upload, returns an analysis result
/// - `POST {api}/audio/store`: persist a recording
/// - `GET/DELETE {api}/audio/recordings[/{name}]`: manage stored recordings
/// - `{stream}`: WebSocket accepting binary chunks, emitting result frames
pub struct BackendClient {
    http: reqwest::Client,
    api_url: String,
    stream_url: String,
}

impl BackendClient {
    pub fn new(api_url: &str, stream_url: &str) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            stream_url: stream_url.to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path)
    }

    fn audio_part(blob: Vec<u8>, name: &str) -> Result<Part, TransportError> {
        Part::bytes(blob)
            .file_name(name.to_string())
            .mime_str("audio/wav")
            .map_err(|e| TransportError::Request(e.to_string()))
    }
}

fn request_error(e: reqwest::Error) -> TransportError {
    if e.is_connect() {
        TransportError::ConnectFailed(e.to_string())
    } else {
        TransportError::Request(e.to_string())
    }
}

#[async_trait::async_trait]
impl AnalysisBackend for BackendClient {
    async fn process(&self, blob: Vec<u8>, name: &str) -> Result<AnalysisResult, TransportError> {
        let form = Form::new().part("file", Self::audio_part(blob, name)?);

        let response = self
            .http
            .post(self.endpoint("audio/process"))
            .multipart(form)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Http(status.as_u16()));
        }

        let result: AnalysisResult = response
            .json()
            .await
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;

        info!(
            "Analysis complete: {} (confidence {:.2})",
            result.prediction, result.confidence
        );

        Ok(result)
    }

    async fn store(&self, blob: Vec<u8>, name: &str) -> Result<(), TransportError> {
        let size = blob.len();
        let form = Form::new().part("file", Self::audio_part(blob, name)?);

        let response = self
            .http
            .post(self.endpoint("audio/store"))
            .multipart(form)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Http(status.as_u16()));
        }

        info!("Stored recording {} ({} bytes)", name, size);

        Ok(())
    }

    async fn list_recordings(&self) -> Result<Vec<String>, TransportError> {
        let response = self
            .http
            .get(self.endpoint("audio/recordings"))
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Http(status.as_u16()));
        }

        let body: RecordingsResponse = response
            .json()
            .await
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;

        Ok(body.recordings)
    }

    async fn fetch_recording(&self, name: &str) -> Result<Vec<u8>, TransportError> {
        let response = self
            .http
            .get(self.endpoint(&format!("audio/recordings/{}", name)))
            .send()
            .await
            .map_err(request_error)?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(TransportError::NotFound(name.to_string())),
            status if !status.is_success() => Err(TransportError::Http(status.as_u16())),
            _ => {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| TransportError::Request(e.to_string()))?;
                Ok(bytes.to_vec())
            }
        }
    }

    async fn delete_recording(&self, name: &str) -> Result<(), TransportError> {
        let response = self
            .http
            .delete(self.endpoint(&format!("audio/recordings/{}", name)))
            .send()
            .await
            .map_err(request_error)?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(TransportError::NotFound(name.to_string())),
            status if !status.is_success() => Err(TransportError::Http(status.as_u16())),
            _ => {
                info!("Deleted recording {}", name);
                Ok(())
            }
        }
    }

    async fn open_stream(
        &self,
        results: mpsc::Sender<AnalysisResult>,
    ) -> Result<Box<dyn StreamingChannel>, TransportError> {
        let channel = WsChannel::connect(&self.stream_url, results).await?;
        Ok(Box::new(channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slash() {
        let client = BackendClient::new("http://localhost:8000/api/v1/", "ws://x").unwrap();
        assert_eq!(
            client.endpoint("audio/process"),
            "http://localhost:8000/api/v1/audio/process"
        );
    }
}
