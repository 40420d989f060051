//! Event feed connection: subscribe request and length-prefixed JSON frames.

use async_trait::async_trait;
use projection::Event;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{Result, SubscriberError};

/// Upper bound on a single feed frame. A block batch holds the state delta of
/// one block, which stays far below this.
const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// The subscribe request sent once after connecting.
///
/// `last_known_block_ids` lets the feed resume from the newest id it still
/// recognizes; everything after it is redelivered.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub action: String,
    pub last_known_block_ids: Vec<String>,
}

impl SubscribeRequest {
    pub fn new(known_block_ids: &[String]) -> Self {
        Self {
            action: "subscribe".to_string(),
            last_known_block_ids: known_block_ids.to_vec(),
        }
    }
}

/// A source of per-block event batches.
#[async_trait]
pub trait EventFeed: Send {
    /// Opens the connection and subscribes, replaying from the newest block
    /// id in `known_block_ids` the feed recognizes.
    async fn connect(&mut self, known_block_ids: &[String]) -> Result<()>;

    /// Reads the next event batch. `Ok(None)` means the feed closed cleanly.
    async fn next_batch(&mut self) -> Result<Option<Vec<Event>>>;
}

/// TCP feed speaking `u32`-BE length-prefixed JSON frames.
pub struct TcpEventFeed {
    addr: String,
    stream: Option<TcpStream>,
}

impl TcpEventFeed {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            stream: None,
        }
    }
}

#[async_trait]
impl EventFeed for TcpEventFeed {
    #[tracing::instrument(skip(self, known_block_ids), fields(addr = %self.addr))]
    async fn connect(&mut self, known_block_ids: &[String]) -> Result<()> {
        let mut stream = TcpStream::connect(&self.addr).await?;
        let request = serde_json::to_vec(&SubscribeRequest::new(known_block_ids))?;
        write_frame(&mut stream, &request).await?;
        tracing::info!(known = known_block_ids.len(), "subscribed to event feed");
        self.stream = Some(stream);
        Ok(())
    }

    async fn next_batch(&mut self) -> Result<Option<Vec<Event>>> {
        let stream = self.stream.as_mut().ok_or(SubscriberError::NotConnected)?;
        let Some(frame) = read_frame(stream).await? else {
            self.stream = None;
            return Ok(None);
        };
        let events: Vec<Event> = serde_json::from_slice(&frame)?;
        Ok(Some(events))
    }
}

/// Writes one length-prefixed frame.
pub(crate) async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one length-prefixed frame. `Ok(None)` on EOF at a frame boundary.
pub(crate) async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    }
    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_FRAME_LEN {
        return Err(SubscriberError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frame_round_trip() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        write_frame(&mut client, b"hello").await.unwrap();
        let frame = read_frame(&mut server).await.unwrap();
        assert_eq!(frame, Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn eof_at_frame_boundary_is_clean_close() {
        let (client, mut server) = tokio::io::duplex(1024);
        drop(client);

        assert!(read_frame(&mut server).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn eof_inside_frame_is_an_error() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        client.write_all(&10u32.to_be_bytes()).await.unwrap();
        client.write_all(b"abc").await.unwrap();
        drop(client);

        assert!(read_frame(&mut server).await.is_err());
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        client
            .write_all(&(u32::MAX).to_be_bytes())
            .await
            .unwrap();

        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, SubscriberError::FrameTooLarge { .. }));
    }

    #[tokio::test]
    async fn event_batch_survives_the_wire() {
        let (mut client, mut server) = tokio::io::duplex(64 * 1024);

        let batch = vec![projection::Event::block_commit(7, "block-7")];
        let payload = serde_json::to_vec(&batch).unwrap();
        write_frame(&mut client, &payload).await.unwrap();

        let frame = read_frame(&mut server).await.unwrap().unwrap();
        let decoded: Vec<Event> = serde_json::from_slice(&frame).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].attribute("block_num"), Some("7"));
        assert_eq!(decoded[0].attribute("block_id"), Some("block-7"));
    }

    #[test]
    fn subscribe_request_shape() {
        let request = SubscribeRequest::new(&["aa".to_string(), "bb".to_string()]);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["action"], "subscribe");
        assert_eq!(json["last_known_block_ids"][0], "aa");
        assert_eq!(json["last_known_block_ids"][1], "bb");
    }

    #[tokio::test]
    async fn next_batch_without_connect_fails() {
        let mut feed = TcpEventFeed::new("localhost:0");
        assert!(matches!(
            feed.next_batch().await,
            Err(SubscriberError::NotConnected)
        ));
    }
}
