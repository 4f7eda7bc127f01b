//! Line-oriented stand-in for a chat service.
//!
//! Inbound messages are read from stdin as `<user_id> <chat_id> <text>`;
//! everything the bot sends is written to stdout.

use std::sync::atomic::{AtomicI64, Ordering};

use actors::{BoxError, CallFuture, OutgoingMedia, Transport};
use futures_util::FutureExt;
use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::Mutex;

/// A message received from a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub user_id: i64,
    pub chat_id: i64,
    pub message_id: i64,
    pub text: String,
}

impl Inbound {
    /// Group chats have negative ids.
    pub fn is_group(&self) -> bool {
        self.chat_id < 0
    }
}

/// Parses inbound lines and hands out message ids.
#[derive(Debug, Default)]
pub struct InboundReader {
    next_message_id: AtomicI64,
}

impl InboundReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one line; `None` if it is blank or malformed.
    pub fn parse(&self, line: &str) -> Option<Inbound> {
        let mut parts = line.trim().splitn(3, char::is_whitespace);
        let user_id = parts.next()?.parse().ok()?;
        let chat_id = parts.next()?.parse().ok()?;
        let text = parts.next()?.trim();
        if text.is_empty() {
            return None;
        }

        Some(Inbound {
            user_id,
            chat_id,
            message_id: self.next_message_id.fetch_add(1, Ordering::Relaxed) + 1,
            text: text.to_string(),
        })
    }
}

/// Writes outbound messages to stdout, one per line.
pub struct ConsoleTransport {
    out: Mutex<Stdout>,
}

impl ConsoleTransport {
    pub fn new() -> Self {
        Self {
            out: Mutex::new(tokio::io::stdout()),
        }
    }

    async fn write_line(&self, line: String) -> Result<(), BoxError> {
        let mut out = self.out.lock().await;
        out.write_all(line.as_bytes()).await?;
        out.write_all(b"\n").await?;
        out.flush().await?;
        Ok(())
    }
}

impl Default for ConsoleTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn reply_suffix(reply_to: Option<i64>) -> String {
    reply_to.map_or_else(String::new, |id| format!(" (reply to #{id})"))
}

/// One-line rendering of a media delivery.
pub fn describe_media(chat_id: i64, media: &OutgoingMedia, reply_to: Option<i64>) -> String {
    let mut line = format!(
        "[chat {}]{} video {}",
        chat_id,
        reply_suffix(reply_to),
        media.path.display()
    );
    if let (Some(w), Some(h)) = (media.info.width, media.info.height) {
        line.push_str(&format!(" {w}x{h}"));
    }
    if let Some(secs) = media.info.duration_secs {
        line.push_str(&format!(" {secs}s"));
    }
    if let Some(caption) = &media.caption {
        line.push_str(&format!(" \"{caption}\""));
    }
    line
}

impl Transport for ConsoleTransport {
    fn send_text<'a>(
        &'a self,
        chat_id: i64,
        text: &'a str,
        reply_to: Option<i64>,
    ) -> CallFuture<'a, ()> {
        let line = format!("[chat {}]{} {}", chat_id, reply_suffix(reply_to), text);
        self.write_line(line).boxed()
    }

    fn send_media<'a>(
        &'a self,
        chat_id: i64,
        media: &'a OutgoingMedia,
        reply_to: Option<i64>,
    ) -> CallFuture<'a, ()> {
        self.write_line(describe_media(chat_id, media, reply_to)).boxed()
    }

    fn send_progress_signal(&self, chat_id: i64) -> CallFuture<'_, ()> {
        tracing::debug!(chat_id, "upload_video");
        async { Ok(()) }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use actors::MediaInfo;

    use super::*;

    #[test]
    fn parses_user_chat_and_text() {
        let reader = InboundReader::new();

        let first = reader.parse("42 -100 look https://instagram.com/reel/x");
        assert_eq!(
            first,
            Some(Inbound {
                user_id: 42,
                chat_id: -100,
                message_id: 1,
                text: "look https://instagram.com/reel/x".into(),
            })
        );
        assert!(first.is_some_and(|m| m.is_group()));

        let second = reader.parse("  7 7 /stats  ");
        assert_eq!(second.map(|m| (m.message_id, m.text)), Some((2, "/stats".into())));
    }

    #[test]
    fn rejects_malformed_lines() {
        let reader = InboundReader::new();
        assert_eq!(reader.parse(""), None);
        assert_eq!(reader.parse("abc 1 hi"), None);
        assert_eq!(reader.parse("1 2"), None);
        assert_eq!(reader.parse("1 2   "), None);
    }

    #[test]
    fn media_line_lists_known_metadata() {
        let media = OutgoingMedia {
            path: PathBuf::from("downloads/abc.mp4"),
            info: MediaInfo {
                width: Some(1080),
                height: Some(1920),
                duration_secs: Some(9),
                rotation: None,
            },
            caption: Some("via bot".into()),
        };

        assert_eq!(
            describe_media(5, &media, Some(3)),
            "[chat 5] (reply to #3) video downloads/abc.mp4 1080x1920 9s \"via bot\""
        );
    }
}
