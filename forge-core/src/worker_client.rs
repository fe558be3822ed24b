//! Worker Client (§4.E): the four HTTP operations against a node's
//! `base_url`, plus the health probe and progress-socket operations SPEC_FULL
//! adds (§4.E "new"). Grounded on `original_source/app/services/comfy_client.py`
//! for the wire shapes, and on the ping-keepalive shape of
//! `cli/src/clients/worker.rs::connect` (combined with the
//! `tokio::select!`-over-read/keepalive loop of
//! `cloud-service/src/api/connect.rs::proxy_worker_connection`), adapted from
//! a gRPC log proxy to a plain HTTP+WS worker protocol client.

use futures_util::{SinkExt, StreamExt};
use reqwest::multipart;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message;

use forge_compiler::{SchemaCatalog, StagingError};

const PROGRESS_KEEPALIVE: Duration = Duration::from_secs(20);

#[derive(Debug, Clone)]
pub enum WorkerEventKind {
    Progress { value: f64, max: f64 },
    Done,
    Error { message: String },
}

#[derive(Debug, Clone)]
pub struct WorkerEvent {
    pub prompt_id: Option<String>,
    pub kind: WorkerEventKind,
}

#[derive(Deserialize)]
struct SubmitResponse {
    prompt_id: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    #[serde(alias = "filename")]
    name: Option<String>,
    subfolder: Option<String>,
}

/// HTTP(+WS) client for one worker node's `base_url`. One instance is shared
/// across all nodes; `base_url` is passed per call the way the teacher's
/// `GrpcClient` takes a channel URI per call rather than per client.
#[derive(Clone)]
pub struct WorkerHttpClient {
    http: reqwest::Client,
}

impl WorkerHttpClient {
    /// Connect timeout 10s / read timeout 60s, per §4.E and §5 Timeouts.
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .expect("reqwest client builds with static config");
        Self { http }
    }

    /// `POST {base}/prompt`. Wraps `prompt` under a `"prompt"` key if the
    /// caller passed a bare node map.
    pub async fn submit(
        &self,
        base_url: &str,
        prompt: Map<String, Value>,
        extra_pnginfo: Option<Value>,
    ) -> Result<String, StagingError> {
        let mut body = Map::new();
        body.insert("prompt".to_string(), Value::Object(prompt));
        if let Some(extra) = extra_pnginfo {
            body.insert("extra_pnginfo".to_string(), extra);
        }

        let response = self
            .http
            .post(format!("{base_url}/prompt"))
            .json(&Value::Object(body))
            .send()
            .await
            .map_err(|e| StagingError::BackendUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StagingError::BackendError { status, body });
        }

        let parsed: SubmitResponse = response
            .json()
            .await
            .map_err(|e| StagingError::BackendError { status: 200, body: e.to_string() })?;
        Ok(parsed.prompt_id)
    }

    /// `GET {base}/history/{prompt_id}`. `None` if unknown or still
    /// running/pending/queued (§4.E).
    pub async fn history(&self, base_url: &str, prompt_id: &str) -> Result<Option<Value>, StagingError> {
        let response = self
            .http
            .get(format!("{base_url}/history/{prompt_id}"))
            .send()
            .await
            .map_err(|e| StagingError::BackendUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StagingError::BackendError { status, body });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| StagingError::BackendError { status: 200, body: e.to_string() })?;

        let Some(entry) = body.get(prompt_id) else {
            return Ok(None);
        };
        let status_str = entry
            .get("status")
            .and_then(|s| s.get("status_str"))
            .and_then(Value::as_str)
            .unwrap_or("");
        if matches!(status_str, "running" | "pending" | "queued") {
            return Ok(None);
        }
        Ok(Some(entry.clone()))
    }

    /// `GET {base}/object_info` (§4.A).
    pub async fn object_info(&self, base_url: &str) -> Result<SchemaCatalog, StagingError> {
        let response = self
            .http
            .get(format!("{base_url}/object_info"))
            .send()
            .await
            .map_err(|e| StagingError::BackendUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StagingError::BackendError { status, body });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| StagingError::BackendError { status: 200, body: e.to_string() })?;
        Ok(SchemaCatalog::from_object_info(&body))
    }

    /// `POST {base}/upload/image`, falling back to `{base}/api/upload/image`
    /// per §4.C ("both trailing and `api`-prefixed upload paths are
    /// attempted").
    pub async fn upload_image(
        &self,
        base_url: &str,
        name: &str,
        bytes: bytes::Bytes,
        subfolder: &str,
        overwrite: bool,
    ) -> Result<String, StagingError> {
        for path in ["upload/image", "api/upload/image"] {
            let form = multipart::Form::new()
                .part("image", multipart::Part::bytes(bytes.to_vec()).file_name(name.to_string()))
                .text("subfolder", subfolder.to_string())
                .text("overwrite", overwrite.to_string());

            let response = self
                .http
                .post(format!("{base_url}/{path}"))
                .multipart(form)
                .send()
                .await
                .map_err(|e| StagingError::BackendUnavailable(e.to_string()))?;

            if response.status().as_u16() == 404 {
                continue;
            }
            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                return Err(StagingError::BackendError { status, body });
            }

            let parsed: UploadResponse = response
                .json()
                .await
                .map_err(|e| StagingError::BackendError { status: 200, body: e.to_string() })?;
            let remote_name = parsed.name.unwrap_or_else(|| name.to_string());
            return Ok(match parsed.subfolder.filter(|s| !s.is_empty()) {
                Some(sub) => format!("{sub}/{remote_name}"),
                None => remote_name,
            });
        }
        Err(StagingError::BackendUnavailable(format!(
            "{base_url} has no working upload endpoint"
        )))
    }

    /// `GET {base}/system_stats` (§4.F): any 200 counts as alive. Timeout 5s.
    pub async fn system_stats(&self, base_url: &str) -> Result<(), StagingError> {
        let response = self
            .http
            .get(format!("{base_url}/system_stats"))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| StagingError::BackendUnavailable(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(StagingError::BackendError {
                status: response.status().as_u16(),
                body: String::new(),
            })
        }
    }

    /// Opens `{base_ws}/ws?clientId=...` and returns a channel of parsed
    /// events. A background task keeps the connection alive (ping every
    /// `PROGRESS_KEEPALIVE`) and forwards parsed frames until the socket
    /// closes or errors, at which point the channel is dropped and the
    /// receiver observes end-of-stream — mirroring the transport-exception
    /// handling §4.H specifies ("write status=RUNNING, message=disconnected
    /// and exit without altering the Job").
    pub async fn connect_progress(
        &self,
        base_url: &str,
        client_id: &str,
    ) -> Result<mpsc::Receiver<WorkerEvent>, StagingError> {
        let ws_url = to_ws_url(base_url, client_id)?;
        let request = ws_url
            .into_client_request()
            .map_err(|e| StagingError::BackendUnavailable(format!("bad websocket request: {e}")))?;

        let (ws_stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| StagingError::BackendUnavailable(format!("websocket connect failed: {e}")))?;
        let (mut write, mut read) = ws_stream.split();

        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            let mut keepalive = time::interval(PROGRESS_KEEPALIVE);
            loop {
                tokio::select! {
                    _ = keepalive.tick() => {
                        if write.send(Message::Ping(Vec::new())).await.is_err() {
                            break;
                        }
                    }
                    message = read.next() => {
                        match message {
                            Some(Ok(Message::Text(text))) => {
                                if let Some(event) = parse_event(&text) {
                                    if tx.send(event).await.is_err() {
                                        break;
                                    }
                                }
                            }
                            Some(Ok(Message::Binary(data))) => {
                                if let Ok(text) = String::from_utf8(data) {
                                    if let Some(event) = parse_event(&text) {
                                        if tx.send(event).await.is_err() {
                                            break;
                                        }
                                    }
                                }
                            }
                            Some(Ok(Message::Pong(_))) => {}
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Err(_)) => break,
                            _ => {}
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}

impl Default for WorkerHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

fn to_ws_url(base_url: &str, client_id: &str) -> Result<url::Url, StagingError> {
    let mut url =
        url::Url::parse(base_url).map_err(|e| StagingError::BackendUnavailable(format!("bad base_url: {e}")))?;
    let ws_scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(ws_scheme)
        .map_err(|_| StagingError::BackendUnavailable("cannot rewrite scheme to ws(s)".into()))?;
    url.set_path("ws");
    url.query_pairs_mut().append_pair("clientId", client_id);
    Ok(url)
}

/// Parses one worker event frame. Recognizes the event kinds named in §4.H:
/// `progress` updates `value`/`max`; `executed`/`execution_success`/`done`
/// terminate with `Done`; `execution_error`/`error` terminate with `Error`.
/// Anything else is ignored (the tracker only cares about these three).
fn parse_event(text: &str) -> Option<WorkerEvent> {
    let value: Value = serde_json::from_str(text).ok()?;
    let event_type = value.get("type").and_then(Value::as_str)?;
    let data = value.get("data");
    let prompt_id = data
        .and_then(|d| d.get("prompt_id"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let kind = match event_type {
        "progress" => {
            let value_num = data.and_then(|d| d.get("value")).and_then(Value::as_f64).unwrap_or(0.0);
            let max_num = data.and_then(|d| d.get("max")).and_then(Value::as_f64).unwrap_or(1.0);
            WorkerEventKind::Progress { value: value_num, max: max_num }
        }
        "executed" | "execution_success" | "done" => WorkerEventKind::Done,
        "execution_error" | "error" => {
            let message = data
                .and_then(|d| d.get("exception_message").or_else(|| d.get("message")))
                .and_then(Value::as_str)
                .unwrap_or("execution error")
                .to_string();
            WorkerEventKind::Error { message }
        }
        _ => return None,
    };

    Some(WorkerEvent { prompt_id, kind })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_progress_event() {
        let text = r#"{"type":"progress","data":{"prompt_id":"P1","value":5,"max":20}}"#;
        let event = parse_event(text).unwrap();
        assert_eq!(event.prompt_id.as_deref(), Some("P1"));
        assert!(matches!(event.kind, WorkerEventKind::Progress { value, max } if value == 5.0 && max == 20.0));
    }

    #[test]
    fn parses_terminal_events() {
        let done = parse_event(r#"{"type":"executed","data":{"prompt_id":"P1"}}"#).unwrap();
        assert!(matches!(done.kind, WorkerEventKind::Done));

        let err = parse_event(r#"{"type":"execution_error","data":{"prompt_id":"P1","exception_message":"boom"}}"#)
            .unwrap();
        assert!(matches!(err.kind, WorkerEventKind::Error { message } if message == "boom"));
    }

    #[test]
    fn ignores_unknown_event_types() {
        assert!(parse_event(r#"{"type":"status","data":{}}"#).is_none());
    }
}
