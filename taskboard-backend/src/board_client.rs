/// Remote side of the board: a gateway that talks to a taskboard server over
/// HTTP, and a push feed that follows its `/ws` channel.
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::StatusCode;
use std::sync::Arc;
use taskboard_core::client::BoardSession;
use taskboard_core::events::BoardEvent;
use taskboard_core::gateway::{CardGateway, GatewayError};
use taskboard_core::types::{Card, CardPatch, NewCard, ReorderRequest};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::api::ErrorResponse;

/// [`CardGateway`] over the server's REST API.
#[derive(Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn card_url(&self, card_id: &str) -> String {
        format!(
            "{}/api/cards/{}",
            self.base_url,
            utf8_percent_encode(card_id, NON_ALPHANUMERIC)
        )
    }
}

fn transport_error(e: reqwest::Error) -> GatewayError {
    GatewayError::Retryable(e.to_string())
}

/// Classify a non-success response the way the in-process gateway
/// classifies store errors.
async fn check(resp: reqwest::Response, subject: &str) -> Result<reqwest::Response, GatewayError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.json::<ErrorResponse>().await.ok();
    let error = body
        .as_ref()
        .map(|b| b.error.clone())
        .unwrap_or_else(|| status.to_string());

    Err(match status {
        StatusCode::NOT_FOUND => GatewayError::NotFound(subject.to_string()),
        StatusCode::CONFLICT => {
            GatewayError::StaleReference(body.map(|b| b.missing).unwrap_or_default())
        }
        s if s.is_server_error() => GatewayError::Retryable(error),
        _ => GatewayError::Rejected(error),
    })
}

impl CardGateway for HttpGateway {
    async fn list_cards(&self) -> Result<Vec<Card>, GatewayError> {
        let resp = self
            .client
            .get(format!("{}/api/cards", self.base_url))
            .send()
            .await
            .map_err(transport_error)?;
        let resp = check(resp, "cards").await?;
        resp.json().await.map_err(transport_error)
    }

    async fn create_card(&self, new_card: NewCard) -> Result<Card, GatewayError> {
        let resp = self
            .client
            .post(format!("{}/api/cards", self.base_url))
            .json(&new_card)
            .send()
            .await
            .map_err(transport_error)?;
        let resp = check(resp, &new_card.title).await?;
        resp.json().await.map_err(transport_error)
    }

    async fn update_card(&self, card_id: &str, patch: CardPatch) -> Result<Card, GatewayError> {
        let resp = self
            .client
            .put(self.card_url(card_id))
            .json(&patch)
            .send()
            .await
            .map_err(transport_error)?;
        let resp = check(resp, card_id).await?;
        resp.json().await.map_err(transport_error)
    }

    async fn delete_card(&self, card_id: &str) -> Result<(), GatewayError> {
        let resp = self
            .client
            .delete(self.card_url(card_id))
            .send()
            .await
            .map_err(transport_error)?;
        check(resp, card_id).await?;
        Ok(())
    }

    async fn commit_order(&self, column_id: &str, card_ids: Vec<String>) -> Result<(), GatewayError> {
        let request = ReorderRequest {
            column_id: column_id.to_string(),
            card_ids,
        };
        let resp = self
            .client
            .put(format!("{}/api/cards/reorder", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;
        check(resp, column_id).await?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("WebSocket error: {0}")]
    Socket(#[from] WsError),

    #[error("Malformed event: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Board events arriving on a server's `/ws` channel.
pub struct PushFeed<S = WebSocketStream<MaybeTlsStream<TcpStream>>> {
    stream: S,
}

impl PushFeed {
    /// Connect to `{base_url}/ws`; `http(s)://` is rewritten to `ws(s)://`.
    pub async fn connect(base_url: &str) -> Result<Self, FeedError> {
        let ws_url = format!(
            "{}/ws",
            base_url
                .trim_end_matches('/')
                .replace("http://", "ws://")
                .replace("https://", "wss://")
        );
        let (stream, _) = tokio_tungstenite::connect_async(&ws_url).await?;
        log::info!(target: "taskboard.push", "Connected to {}", ws_url);
        Ok(Self { stream })
    }
}

impl<S> PushFeed<S>
where
    S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin,
{
    pub fn from_stream(stream: S) -> Self {
        Self { stream }
    }

    /// The next event, or `None` once the server closes the channel.
    pub async fn next_event(&mut self) -> Option<Result<BoardEvent, FeedError>> {
        while let Some(msg) = self.stream.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => return Some(Err(e.into())),
            };
            let text = match msg {
                Message::Text(t) => t.to_string(),
                Message::Close(_) => {
                    log::info!(target: "taskboard.push", "Server closed push channel");
                    return None;
                }
                Message::Ping(data) => {
                    if let Err(e) = self.stream.send(Message::Pong(data)).await {
                        return Some(Err(e.into()));
                    }
                    continue;
                }
                _ => continue,
            };
            return Some(serde_json::from_str(&text).map_err(FeedError::from));
        }
        None
    }
}

/// Drive `session` from `feed` until the channel closes.
///
/// Reloads once first, so events published before the feed connected are
/// covered. Gateway failures during a reload are logged and left for the
/// next event to retry; malformed frames are skipped.
pub async fn follow_feed<G, S>(
    session: Arc<Mutex<BoardSession<G>>>,
    mut feed: PushFeed<S>,
) -> Result<(), FeedError>
where
    G: CardGateway,
    S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin,
{
    if let Err(e) = session.lock().await.reconcile_full().await {
        log::warn!(target: "taskboard.session", "Initial reload failed: {}", e);
    }

    while let Some(item) = feed.next_event().await {
        let event = match item {
            Ok(event) => event,
            Err(FeedError::Decode(e)) => {
                log::warn!(target: "taskboard.push", "Skipping malformed event: {}", e);
                continue;
            }
            Err(e) => return Err(e),
        };
        let mut session = session.lock().await;
        if let Err(e) = session.handle_event(&event).await {
            log::warn!(
                target: "taskboard.session",
                "Failed to apply {}: {}",
                event.kind(),
                e
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::spawn_server;
    use crate::state::AppState;
    use std::collections::VecDeque;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use taskboard_core::broadcast::ChangeBroadcaster;
    use taskboard_core::client::{DragEnd, MoveOutcome};
    use taskboard_core::config::BoardColumns;
    use taskboard_core::gateway::PersistenceGateway;
    use taskboard_core::storage::local::LocalCardStore;

    /// Replays queued frames; its sending half is already closed.
    struct HalfClosedSocket {
        incoming: VecDeque<Message>,
    }

    impl Stream for HalfClosedSocket {
        type Item = Result<Message, WsError>;

        fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            Poll::Ready(self.incoming.pop_front().map(Ok))
        }
    }

    impl Sink<Message> for HalfClosedSocket {
        type Error = WsError;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
            Poll::Ready(Err(WsError::ConnectionClosed))
        }

        fn start_send(self: Pin<&mut Self>, _item: Message) -> Result<(), WsError> {
            Err(WsError::ConnectionClosed)
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
            Poll::Ready(Err(WsError::ConnectionClosed))
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_unanswerable_ping_ends_feed() {
        let event = serde_json::to_string(&BoardEvent::OrderingChanged).unwrap();
        let mut feed = PushFeed::from_stream(HalfClosedSocket {
            incoming: VecDeque::from(vec![
                Message::Ping(vec![1u8].into()),
                Message::Text(event.into()),
            ]),
        });

        assert!(matches!(
            feed.next_event().await,
            Some(Err(FeedError::Socket(WsError::ConnectionClosed)))
        ));
    }

    #[tokio::test]
    async fn test_follow_feed_stops_on_dead_socket() {
        let session = Arc::new(Mutex::new(BoardSession::new(HttpGateway::new(
            "http://127.0.0.1:9",
        ))));
        let feed = PushFeed::from_stream(HalfClosedSocket {
            incoming: VecDeque::from(vec![Message::Ping(vec![1u8].into())]),
        });

        let result = follow_feed(session, feed).await;
        assert!(matches!(result, Err(FeedError::Socket(_))));
    }

    async fn start_server(dir: &tempfile::TempDir) -> String {
        let store = LocalCardStore::open(&dir.path().join("cards.json"), BoardColumns::default())
            .unwrap();
        let state = AppState {
            gateway: PersistenceGateway::new(Arc::new(store), ChangeBroadcaster::new(64)),
            port: 0,
            bind_address: "127.0.0.1".to_string(),
        };
        let (port, _handle) = spawn_server(state, std::future::pending()).await.unwrap();
        format!("http://127.0.0.1:{}", port)
    }

    async fn wait_until<F: Fn(&BoardSession<HttpGateway>) -> bool>(
        session: &Arc<Mutex<BoardSession<HttpGateway>>>,
        done: F,
    ) -> bool {
        for _ in 0..100 {
            if done(&*session.lock().await) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_http_gateway_classifies_errors() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = HttpGateway::new(&start_server(&dir).await);

        let card = gateway.create_card(NewCard::titled("A")).await.unwrap();
        assert_eq!(card.column_id, "To Do");
        assert_eq!(gateway.list_cards().await.unwrap(), vec![card.clone()]);

        assert_eq!(
            gateway.delete_card("missing").await,
            Err(GatewayError::NotFound("missing".into()))
        );
        assert_eq!(
            gateway
                .commit_order("Done", vec![card.id.clone(), "ghost".into()])
                .await,
            Err(GatewayError::StaleReference(vec!["ghost".into()]))
        );
        assert!(matches!(
            gateway
                .create_card(NewCard::titled("B").in_column("Nowhere"))
                .await,
            Err(GatewayError::Rejected(_))
        ));
        // The rejected batch left the card where it was.
        assert_eq!(gateway.list_cards().await.unwrap(), vec![card]);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_retryable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let gateway = HttpGateway::new(&format!("http://127.0.0.1:{}", port));
        let err = gateway.list_cards().await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_list_honours_etag() {
        let dir = tempfile::tempdir().unwrap();
        let base = start_server(&dir).await;
        let client = reqwest::Client::new();
        let url = format!("{}/api/cards", base);

        let first = client.get(&url).send().await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let etag = first.headers()["etag"].to_str().unwrap().to_string();

        let cached = client
            .get(&url)
            .header("if-none-match", &etag)
            .send()
            .await
            .unwrap();
        assert_eq!(cached.status(), StatusCode::NOT_MODIFIED);

        HttpGateway::new(&base)
            .create_card(NewCard::titled("A"))
            .await
            .unwrap();
        let fresh = client
            .get(&url)
            .header("if-none-match", &etag)
            .send()
            .await
            .unwrap();
        assert_eq!(fresh.status(), StatusCode::OK);
        assert_ne!(fresh.headers()["etag"].to_str().unwrap(), etag);
    }

    #[tokio::test]
    async fn test_etag_from_previous_run_is_not_reused() {
        let dir = tempfile::tempdir().unwrap();
        let first_run = start_server(&dir).await;
        HttpGateway::new(&first_run)
            .create_card(NewCard::titled("A"))
            .await
            .unwrap();
        let client = reqwest::Client::new();
        let resp = client
            .get(format!("{}/api/cards", first_run))
            .send()
            .await
            .unwrap();
        let etag = resp.headers()["etag"].to_str().unwrap().to_string();

        // Same data file, fresh process state.
        let second_run = start_server(&dir).await;
        HttpGateway::new(&second_run)
            .create_card(NewCard::titled("B"))
            .await
            .unwrap();
        let resp = client
            .get(format!("{}/api/cards", second_run))
            .header("if-none-match", &etag)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let cards: Vec<Card> = resp.json().await.unwrap();
        assert_eq!(cards.len(), 2);
    }

    #[tokio::test]
    async fn test_traversal_in_card_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let base = start_server(&dir).await;
        let resp = reqwest::Client::new()
            .delete(format!("{}/api/cards/..%2F..%2Fetc", base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_sessions_converge_over_push_channel() {
        let dir = tempfile::tempdir().unwrap();
        let base = start_server(&dir).await;

        let mut first = BoardSession::connect(HttpGateway::new(&base)).await.unwrap();
        let second = Arc::new(Mutex::new(BoardSession::new(HttpGateway::new(&base))));
        let feed = PushFeed::connect(&base).await.unwrap();
        tokio::spawn(follow_feed(second.clone(), feed));

        let a = first.create_card(NewCard::titled("A")).await.unwrap();
        let b = first.create_card(NewCard::titled("B")).await.unwrap();
        let c = first
            .create_card(NewCard::titled("C").in_column("Done"))
            .await
            .unwrap();

        let outcome = first
            .move_card(DragEnd::to(&b.id, "To Do", "Done", 0))
            .await
            .unwrap();
        assert!(matches!(outcome, MoveOutcome::Committed(_)));
        first.delete_card(&a.id).await.unwrap();

        let done: Vec<String> = first
            .snapshot()
            .column("Done")
            .iter()
            .map(|card| card.id.clone())
            .collect();
        assert_eq!(done, vec![b.id.clone(), c.id.clone()]);

        let expected = first.snapshot().positions();
        assert!(
            wait_until(&second, |s| s.snapshot().positions() == expected).await,
            "second session never caught up"
        );

        first.reconcile_full().await.unwrap();
        assert_eq!(first.snapshot().positions(), expected);
    }
}
