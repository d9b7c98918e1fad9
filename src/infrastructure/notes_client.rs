use crate::infrastructure::error::InfraError;
use crate::infrastructure::schedule_parser::RawPayload;
use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use url::Url;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreatedBlock {
    pub id: Option<String>,
}

#[async_trait]
pub trait NotesApiClient: Send + Sync {
    /// Raw block payload for `date_param` (`today` or `YYYY-MM-DD`).
    /// A missing daily note is reported as [`InfraError::NoteNotFound`].
    async fn fetch_blocks(&self, date_param: &str) -> Result<RawPayload, InfraError>;

    async fn create_daily_note(&self, date_param: &str) -> Result<(), InfraError>;

    async fn create_block(
        &self,
        markdown: &str,
        date_param: &str,
    ) -> Result<CreatedBlock, InfraError>;

    async fn update_block(&self, block_id: &str, markdown: &str) -> Result<(), InfraError>;

    async fn delete_blocks(&self, block_ids: &[String]) -> Result<(), InfraError>;
}

/// Fetches a day's blocks, creating the daily note and retrying once when
/// the remote reports that none exists yet.
pub async fn fetch_schedule<C>(client: &C, date_param: &str) -> Result<RawPayload, InfraError>
where
    C: NotesApiClient + ?Sized,
{
    match client.fetch_blocks(date_param).await {
        Err(InfraError::NoteNotFound) => {
            tracing::info!(date = date_param, "no daily note yet; creating one");
            client.create_daily_note(date_param).await?;
            client.fetch_blocks(date_param).await
        }
        other => other,
    }
}

#[derive(Debug, Serialize)]
struct NewTextBlock<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    markdown: &'a str,
}

#[derive(Debug, Serialize)]
struct BlockPosition<'a> {
    position: &'static str,
    date: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateBlocksRequest<'a> {
    blocks: [NewTextBlock<'a>; 1],
    position: BlockPosition<'a>,
}

impl<'a> CreateBlocksRequest<'a> {
    fn at_end_of(markdown: &'a str, date_param: &'a str) -> Self {
        Self {
            blocks: [NewTextBlock {
                kind: "text",
                markdown,
            }],
            position: BlockPosition {
                position: "end",
                date: date_param,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct BlockReplacement<'a> {
    id: &'a str,
    markdown: &'a str,
}

#[derive(Debug, Serialize)]
struct UpdateBlocksRequest<'a> {
    blocks: [BlockReplacement<'a>; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteBlocksRequest<'a> {
    block_ids: &'a [String],
}

/// Id of a freshly created block: `items[0].id`, else `blocks[0].id`.
fn created_block_id(body: &Value) -> Option<String> {
    ["items", "blocks"].into_iter().find_map(|field| {
        match body.get(field)?.get(0)?.get("id")? {
            Value::String(id) if !id.trim().is_empty() => Some(id.trim().to_string()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    })
}

#[derive(Debug, Clone)]
pub struct ReqwestNotesApiClient {
    client: Client,
    base_url: Url,
}

impl ReqwestNotesApiClient {
    pub fn new(base_url: &str) -> Result<Self, InfraError> {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Result<Self, InfraError> {
        let base_url = Url::parse(base_url.trim()).map_err(|error| {
            InfraError::InvalidConfig(format!("invalid api url `{base_url}`: {error}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(InfraError::InvalidConfig(format!(
                "api url `{base_url}` cannot be a base"
            )));
        }
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn blocks_endpoint(&self) -> Result<Url, InfraError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                InfraError::InvalidConfig("api url cannot be a base".to_string())
            })?;
            segments.pop_if_empty();
            segments.push("blocks");
        }
        Ok(url)
    }

    async fn send_json<B: Serialize + Sync>(
        &self,
        method: Method,
        body: &B,
        context: &str,
    ) -> Result<Response, InfraError> {
        let endpoint = self.blocks_endpoint()?;
        let response = self
            .client
            .request(method, endpoint)
            .json(body)
            .send()
            .await
            .map_err(|error| InfraError::Network(format!("{context}: {error}")))?;
        ensure_success(response, context)
    }
}

fn status_error(status: StatusCode, context: &str) -> Option<InfraError> {
    if status.is_success() {
        None
    } else {
        Some(InfraError::remote(status.as_u16(), context))
    }
}

/// A 404 on fetch means the daily note does not exist yet.
fn fetch_status_error(status: StatusCode) -> Option<InfraError> {
    if status == StatusCode::NOT_FOUND {
        return Some(InfraError::NoteNotFound);
    }
    status_error(status, "failed to fetch")
}

fn ensure_success(response: Response, context: &str) -> Result<Response, InfraError> {
    match status_error(response.status(), context) {
        Some(error) => Err(error),
        None => Ok(response),
    }
}

/// The block exists once the create succeeded, so an unreadable body only
/// costs the id.
fn created_block_from_body(body: &str) -> CreatedBlock {
    let id = match serde_json::from_str::<Value>(body) {
        Ok(parsed) => created_block_id(&parsed),
        Err(error) => {
            tracing::warn!(%error, "create response body is not JSON");
            None
        }
    };
    if id.is_none() {
        tracing::warn!("create response did not include a block id");
    }
    CreatedBlock { id }
}

async fn read_body(response: Response, context: &str) -> Result<String, InfraError> {
    response
        .text()
        .await
        .map_err(|error| InfraError::Network(format!("failed reading {context} response: {error}")))
}

#[async_trait]
impl NotesApiClient for ReqwestNotesApiClient {
    async fn fetch_blocks(&self, date_param: &str) -> Result<RawPayload, InfraError> {
        let endpoint = self.blocks_endpoint()?;
        let response = self
            .client
            .get(endpoint)
            .query(&[("date", date_param)])
            .send()
            .await
            .map_err(|error| {
                InfraError::Network(format!("network error while fetching blocks: {error}"))
            })?;

        if let Some(error) = fetch_status_error(response.status()) {
            return Err(error);
        }
        let body = read_body(response, "fetch").await?;
        Ok(RawPayload::from_body(body))
    }

    async fn create_daily_note(&self, date_param: &str) -> Result<(), InfraError> {
        let request = CreateBlocksRequest::at_end_of("", date_param);
        self.send_json(Method::POST, &request, "failed to create daily note")
            .await?;
        Ok(())
    }

    async fn create_block(
        &self,
        markdown: &str,
        date_param: &str,
    ) -> Result<CreatedBlock, InfraError> {
        let request = CreateBlocksRequest::at_end_of(markdown, date_param);
        let response = self
            .send_json(Method::POST, &request, "failed to create")
            .await?;
        let body = read_body(response, "create").await?;
        Ok(created_block_from_body(&body))
    }

    async fn update_block(&self, block_id: &str, markdown: &str) -> Result<(), InfraError> {
        let request = UpdateBlocksRequest {
            blocks: [BlockReplacement {
                id: block_id,
                markdown,
            }],
        };
        self.send_json(Method::PUT, &request, "failed to update")
            .await?;
        Ok(())
    }

    async fn delete_blocks(&self, block_ids: &[String]) -> Result<(), InfraError> {
        let request = DeleteBlocksRequest { block_ids };
        self.send_json(Method::DELETE, &request, "failed to delete")
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::thread;

    #[test]
    fn create_request_positions_block_at_end_of_date() {
        let request = CreateBlocksRequest::at_end_of("- [ ] Buy milk", "2026-02-17");
        assert_eq!(
            serde_json::to_value(&request).expect("serialize"),
            json!({
                "blocks": [{ "type": "text", "markdown": "- [ ] Buy milk" }],
                "position": { "position": "end", "date": "2026-02-17" }
            })
        );
    }

    #[test]
    fn update_and_delete_requests_match_wire_shape() {
        let update = UpdateBlocksRequest {
            blocks: [BlockReplacement {
                id: "b1",
                markdown: "`9:00 AM - 10:00 AM` - Plan",
            }],
        };
        assert_eq!(
            serde_json::to_value(&update).expect("serialize"),
            json!({ "blocks": [{ "id": "b1", "markdown": "`9:00 AM - 10:00 AM` - Plan" }] })
        );

        let ids = vec!["a".to_string(), "b".to_string()];
        let delete = DeleteBlocksRequest { block_ids: &ids };
        assert_eq!(
            serde_json::to_value(&delete).expect("serialize"),
            json!({ "blockIds": ["a", "b"] })
        );
    }

    #[test]
    fn created_id_prefers_items_then_blocks() {
        assert_eq!(
            created_block_id(&json!({ "items": [{ "id": "i1" }], "blocks": [{ "id": "b1" }] })),
            Some("i1".to_string())
        );
        assert_eq!(
            created_block_id(&json!({ "items": [], "blocks": [{ "id": 42 }] })),
            Some("42".to_string())
        );
        assert_eq!(created_block_id(&json!({ "ok": true })), None);
    }

    #[test]
    fn blocks_endpoint_appends_segment_to_base_path() {
        let client =
            ReqwestNotesApiClient::new("https://notes.example.com/api/v1").expect("client");
        assert_eq!(
            client.blocks_endpoint().expect("endpoint").as_str(),
            "https://notes.example.com/api/v1/blocks"
        );

        let client =
            ReqwestNotesApiClient::new("https://notes.example.com/api/v1/").expect("client");
        assert_eq!(
            client.blocks_endpoint().expect("endpoint").as_str(),
            "https://notes.example.com/api/v1/blocks"
        );
    }

    #[test]
    fn invalid_base_url_is_a_config_error() {
        assert!(matches!(
            ReqwestNotesApiClient::new("not a url"),
            Err(InfraError::InvalidConfig(_))
        ));
        assert!(matches!(
            ReqwestNotesApiClient::new("mailto:me@example.com"),
            Err(InfraError::InvalidConfig(_))
        ));
    }

    #[test]
    fn fetch_maps_not_found_apart_from_other_failures() {
        assert!(fetch_status_error(StatusCode::OK).is_none());
        assert!(matches!(
            fetch_status_error(StatusCode::NOT_FOUND),
            Some(InfraError::NoteNotFound)
        ));
        assert_eq!(
            fetch_status_error(StatusCode::SERVICE_UNAVAILABLE).and_then(|error| error.status()),
            Some(503)
        );
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, "failed to update"),
            Some(InfraError::Remote { status: 404, .. })
        ));
    }

    #[test]
    fn unreadable_create_body_keeps_the_block_without_id() {
        assert_eq!(created_block_from_body(""), CreatedBlock { id: None });
        assert_eq!(created_block_from_body("<ok/>"), CreatedBlock { id: None });
        assert_eq!(
            created_block_from_body(r#"{ "items": [{ "id": "i9" }] }"#),
            CreatedBlock {
                id: Some("i9".to_string())
            }
        );
    }

    fn read_request(stream: &mut TcpStream) {
        let mut request = Vec::new();
        let mut chunk = [0_u8; 1024];
        loop {
            let read = match stream.read(&mut chunk) {
                Ok(0) | Err(_) => return,
                Ok(read) => read,
            };
            request.extend_from_slice(&chunk[..read]);
            let Some(header_end) = request.windows(4).position(|window| window == b"\r\n\r\n")
            else {
                continue;
            };
            let headers = String::from_utf8_lossy(&request[..header_end]).to_ascii_lowercase();
            let body_length = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if request.len() >= header_end + 4 + body_length {
                return;
            }
        }
    }

    /// Answers a single request with `status_line` and `body`, returning the api base url.
    fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let address = listener.local_addr().expect("local address");
        thread::spawn(move || {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            read_request(&mut stream);
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes());
        });
        format!("http://{address}/api/v1")
    }

    fn local_client(base_url: &str) -> ReqwestNotesApiClient {
        let client = Client::builder().no_proxy().build().expect("http client");
        ReqwestNotesApiClient::with_client(client, base_url).expect("notes client")
    }

    #[tokio::test]
    async fn http_not_found_on_fetch_is_note_not_found() {
        let client = local_client(&serve_once("404 Not Found", ""));

        let error = client.fetch_blocks("today").await.expect_err("missing note");

        assert!(matches!(error, InfraError::NoteNotFound));
    }

    #[tokio::test]
    async fn http_server_error_is_remote_with_status() {
        let client = local_client(&serve_once("503 Service Unavailable", ""));
        let error = client.fetch_blocks("today").await.expect_err("server error");
        assert!(matches!(error, InfraError::Remote { status: 503, .. }));

        let client = local_client(&serve_once("404 Not Found", ""));
        let error = client.update_block("b1", "- [x] Done").await.expect_err("gone");
        assert!(matches!(error, InfraError::Remote { status: 404, .. }));
    }

    #[tokio::test]
    async fn http_create_with_empty_body_succeeds_without_id() {
        let client = local_client(&serve_once("200 OK", ""));

        let created = client
            .create_block("- [ ] Buy milk", "today")
            .await
            .expect("created");

        assert_eq!(created, CreatedBlock { id: None });
    }

    #[tokio::test]
    async fn http_fetch_returns_body_payload() {
        let client = local_client(&serve_once("200 OK", r#"{ "blocks": [] }"#));

        let payload = client.fetch_blocks("2026-02-17").await.expect("payload");

        assert_eq!(payload, RawPayload::Json(json!({ "blocks": [] })));
    }

    enum FetchResponse {
        Missing,
        Payload(RawPayload),
        Fail(u16),
    }

    struct FakeNotesClient {
        fetches: Mutex<VecDeque<FetchResponse>>,
        fetch_calls: AtomicUsize,
        daily_note_calls: AtomicUsize,
        daily_note_fails: bool,
    }

    impl FakeNotesClient {
        fn new(fetches: Vec<FetchResponse>) -> Self {
            Self {
                fetches: Mutex::new(fetches.into()),
                fetch_calls: AtomicUsize::new(0),
                daily_note_calls: AtomicUsize::new(0),
                daily_note_fails: false,
            }
        }
    }

    #[async_trait]
    impl NotesApiClient for FakeNotesClient {
        async fn fetch_blocks(&self, _date_param: &str) -> Result<RawPayload, InfraError> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            match self.fetches.lock().expect("fetch lock").pop_front() {
                Some(FetchResponse::Missing) | None => Err(InfraError::NoteNotFound),
                Some(FetchResponse::Payload(payload)) => Ok(payload),
                Some(FetchResponse::Fail(status)) => Err(InfraError::remote(status, "fetch")),
            }
        }

        async fn create_daily_note(&self, _date_param: &str) -> Result<(), InfraError> {
            self.daily_note_calls.fetch_add(1, Ordering::SeqCst);
            if self.daily_note_fails {
                return Err(InfraError::remote(500, "daily note"));
            }
            Ok(())
        }

        async fn create_block(
            &self,
            _markdown: &str,
            _date_param: &str,
        ) -> Result<CreatedBlock, InfraError> {
            Ok(CreatedBlock::default())
        }

        async fn update_block(&self, _block_id: &str, _markdown: &str) -> Result<(), InfraError> {
            Ok(())
        }

        async fn delete_blocks(&self, _block_ids: &[String]) -> Result<(), InfraError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn missing_note_is_created_then_fetched_once_more() {
        let client = FakeNotesClient::new(vec![
            FetchResponse::Missing,
            FetchResponse::Payload(RawPayload::Json(json!({ "blocks": [] }))),
        ]);

        let payload = fetch_schedule(&client, "today").await.expect("payload");

        assert_eq!(payload, RawPayload::Json(json!({ "blocks": [] })));
        assert_eq!(client.fetch_calls.load(Ordering::SeqCst), 2);
        assert_eq!(client.daily_note_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn second_not_found_is_not_retried_again() {
        let client = FakeNotesClient::new(vec![FetchResponse::Missing, FetchResponse::Missing]);

        let error = fetch_schedule(&client, "2026-02-17")
            .await
            .expect_err("still missing");

        assert!(matches!(error, InfraError::NoteNotFound));
        assert_eq!(client.fetch_calls.load(Ordering::SeqCst), 2);
        assert_eq!(client.daily_note_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn daily_note_failure_stops_the_chain() {
        let mut client = FakeNotesClient::new(vec![FetchResponse::Missing]);
        client.daily_note_fails = true;

        let error = fetch_schedule(&client, "today").await.expect_err("create fails");

        assert_eq!(error.status(), Some(500));
        assert_eq!(client.fetch_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn other_http_errors_skip_daily_note_creation() {
        let client = FakeNotesClient::new(vec![FetchResponse::Fail(503)]);

        let error = fetch_schedule(&client, "today").await.expect_err("server error");

        assert_eq!(error.status(), Some(503));
        assert_eq!(client.daily_note_calls.load(Ordering::SeqCst), 0);
    }
}
