use async_trait::async_trait;
use futures::{future, stream::BoxStream, Stream, StreamExt};
use shared::{domain::MatchId, protocol::MatchSnapshot};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, Message},
};
use tracing::{debug, info};
use url::Url;

use crate::error::TransportError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    Snapshot(MatchSnapshot),
    /// Keep-alive traffic with no state attached.
    Heartbeat,
}

/// Finite stream of events for one connection. Reconnecting starts a new one.
pub type PushStream = BoxStream<'static, Result<PushEvent, TransportError>>;

#[async_trait]
pub trait PushConnector: Send + Sync {
    async fn connect(&self, match_id: &MatchId) -> Result<PushStream, TransportError>;
}

pub struct MissingPushConnector;

#[async_trait]
impl PushConnector for MissingPushConnector {
    async fn connect(&self, match_id: &MatchId) -> Result<PushStream, TransportError> {
        Err(TransportError::Push(format!(
            "push channel unavailable for match {match_id}"
        )))
    }
}

pub struct WsPushConnector {
    ws_base: Url,
}

impl WsPushConnector {
    pub fn new(server_url: &str) -> Result<Self, TransportError> {
        let ws_base = if server_url.starts_with("https://") {
            server_url.replacen("https://", "wss://", 1)
        } else if server_url.starts_with("http://") {
            server_url.replacen("http://", "ws://", 1)
        } else {
            return Err(TransportError::InvalidUrl(
                "server_url must start with http:// or https://".to_string(),
            ));
        };
        let ws_base = Url::parse(ws_base.trim_end_matches('/'))
            .map_err(|err| TransportError::InvalidUrl(err.to_string()))?;
        Ok(Self { ws_base })
    }

    pub fn channel_url(&self, match_id: &MatchId) -> Result<Url, TransportError> {
        let mut url = self.ws_base.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::InvalidUrl(self.ws_base.to_string()))?
            .pop_if_empty()
            .extend(["ws", "match"]);
        url.query_pairs_mut().append_pair("id", match_id.as_str());
        Ok(url)
    }
}

#[async_trait]
impl PushConnector for WsPushConnector {
    async fn connect(&self, match_id: &MatchId) -> Result<PushStream, TransportError> {
        let url = self.channel_url(match_id)?;
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|err| TransportError::Push(format!("failed to connect {url}: {err}")))?;
        info!(match_id = %match_id, "push: channel connected");

        let (_, ws_reader) = ws_stream.split();
        Ok(frames_to_events(ws_reader))
    }
}

/// Ends at the first close frame. Control frames other than ping/pong are dropped.
pub(crate) fn frames_to_events<S>(frames: S) -> PushStream
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Send + 'static,
{
    frames
        .take_while(|frame| future::ready(!matches!(frame, Ok(Message::Close(_)))))
        .filter_map(|frame| future::ready(decode_frame(frame)))
        .boxed()
}

pub(crate) fn decode_frame(
    frame: Result<Message, tungstenite::Error>,
) -> Option<Result<PushEvent, TransportError>> {
    match frame {
        Ok(Message::Text(text)) => Some(decode_snapshot(text.as_bytes())),
        Ok(Message::Binary(bytes)) => Some(decode_snapshot(&bytes)),
        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => Some(Ok(PushEvent::Heartbeat)),
        Ok(Message::Close(_)) | Ok(Message::Frame(_)) => None,
        Err(err) => {
            debug!("push: receive failed: {err}");
            Some(Err(TransportError::Push(format!("receive failed: {err}"))))
        }
    }
}

fn decode_snapshot(payload: &[u8]) -> Result<PushEvent, TransportError> {
    serde_json::from_slice::<MatchSnapshot>(payload)
        .map(PushEvent::Snapshot)
        .map_err(|err| TransportError::Decode(format!("invalid push payload: {err}")))
}

#[cfg(test)]
#[path = "tests/push_tests.rs"]
mod tests;
