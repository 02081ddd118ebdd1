use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{info, warn};

use super::{AnalysisResult, StreamingChannel, TransportError};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// WebSocket implementation of the live streaming channel.
///
/// Chunks go out as binary frames on the write half; a spawned reader task
/// parses incoming text frames as analysis results and forwards them to the
/// result sink. Results arrive whenever the backend produces them, not in
/// lockstep with sends.
pub struct WsChannel {
    write: WsSink,
    reader_task: tokio::task::JoinHandle<()>,
    closed: bool,
}

impl WsChannel {
    pub async fn connect(
        url: &str,
        results: mpsc::Sender<AnalysisResult>,
    ) -> Result<Self, TransportError> {
        info!("Opening streaming channel to {}", url);

        let (ws, _response) = connect_async(url)
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        let (write, mut read) = ws.split();

        let reader_task = tokio::spawn(async move {
            while let Some(message) = read.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<AnalysisResult>(&text) {
                            Ok(result) => {
                                if results.send(result).await.is_err() {
                                    // Result sink dropped; nobody is listening
                                    break;
                                }
                            }
                            Err(e) => warn!("Unparseable result frame: {}", e),
                        }
                    }
                    Ok(Message::Close(_)) => {
                        info!("Streaming channel closed by backend");
                        break;
                    }
                    Ok(_) => {} // ping/pong and binary frames are ignored
                    Err(e) => {
                        warn!("Streaming channel read error: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(Self {
            write,
            reader_task,
            closed: false,
        })
    }
}

#[async_trait::async_trait]
impl StreamingChannel for WsChannel {
    async fn send_chunk(&mut self, chunk: &[u8]) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::ChannelClosed);
        }

        self.write
            .send(Message::Binary(chunk.to_vec()))
            .await
            .map_err(|e| match e {
                tokio_tungstenite::tungstenite::Error::ConnectionClosed
                | tokio_tungstenite::tungstenite::Error::AlreadyClosed => {
                    TransportError::ChannelClosed
                }
                other => TransportError::Request(other.to_string()),
            })
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Err(e) = self.write.send(Message::Close(None)).await {
            warn!("Failed to send close frame: {}", e);
        }
        let _ = self.write.close().await;
        self.reader_task.abort();

        info!("Streaming channel closed");
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        // The reader task must not outlive the channel
        self.reader_task.abort();
    }
}
