use std::io;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::message::Identity;

const LINE_ENDINGS: &[char] = &['\n', '\r'];

/// Longest line accepted from a peer, line ending included.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientToServer {
    Hello { identity: Identity },
    Chat { text: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerToClient {
    Welcome {
        name: String,
    },
    Chat {
        name: String,
        text: String,
        when: DateTime<Utc>,
    },
    Error {
        message: String,
    },
}

pub async fn read_message<R, T>(reader: &mut R) -> io::Result<Option<T>>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    match read_frame(reader).await? {
        Some(line) => serde_json::from_str(&line).map(Some).map_err(to_io_error),
        None => Ok(None),
    }
}

/// Reads the next non-empty line, without its line ending.
///
/// A line longer than [`MAX_FRAME_LEN`] is rejected as `InvalidData` rather
/// than buffered.
pub async fn read_frame<R>(reader: &mut R) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        let read = (&mut *reader)
            .take(MAX_FRAME_LEN as u64)
            .read_line(&mut line)
            .await?;
        if read == 0 {
            return Ok(None);
        }
        if read == MAX_FRAME_LEN && !line.ends_with('\n') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame longer than {MAX_FRAME_LEN} bytes"),
            ));
        }

        match line.trim_end_matches(LINE_ENDINGS) {
            "" => continue,
            frame => return Ok(Some(frame.to_string())),
        }
    }
}

pub async fn write_message<W, T>(writer: &mut W, message: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let encoded = serde_json::to_vec(message).map_err(to_io_error)?;
    write_frame(writer, &encoded).await
}

/// Writes `frame` followed by a newline and flushes so peers get timely updates.
pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

fn to_io_error(err: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hello_carries_identity_bag() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let mut reader = tokio::io::BufReader::new(reader);
        let hello = ClientToServer::Hello {
            identity: Identity::named("alice").with("provider", "github"),
        };

        write_message(&mut writer, &hello).await.expect("write hello");
        let parsed = read_message::<_, ClientToServer>(&mut reader)
            .await
            .expect("read hello")
            .expect("expected hello");

        assert_eq!(hello, parsed);
    }

    #[tokio::test]
    async fn blank_lines_are_skipped() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let mut reader = tokio::io::BufReader::new(reader);

        writer
            .write_all(b"\r\n\n{\"type\":\"chat\",\"text\":\"hi\"}\r\n")
            .await
            .expect("write raw");
        drop(writer);

        let parsed = read_message::<_, ClientToServer>(&mut reader)
            .await
            .expect("read chat");
        assert_eq!(
            parsed,
            Some(ClientToServer::Chat {
                text: "hi".into()
            })
        );
        assert_eq!(read_frame(&mut reader).await.expect("eof"), None);
    }

    #[tokio::test]
    async fn unterminated_oversized_line_is_rejected() {
        let (mut writer, reader) = tokio::io::duplex(MAX_FRAME_LEN * 2);
        let mut reader = tokio::io::BufReader::new(reader);

        writer
            .write_all(&vec![b'a'; MAX_FRAME_LEN + 16])
            .await
            .expect("write raw");

        let err = read_frame(&mut reader).await.expect_err("should reject");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn line_at_the_limit_is_accepted() {
        let (mut writer, reader) = tokio::io::duplex(MAX_FRAME_LEN * 2);
        let mut reader = tokio::io::BufReader::new(reader);
        let body = "b".repeat(MAX_FRAME_LEN - 1);

        write_frame(&mut writer, body.as_bytes()).await.expect("write");

        assert_eq!(read_frame(&mut reader).await.expect("read"), Some(body));
    }

    #[tokio::test]
    async fn malformed_json_is_invalid_data() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let mut reader = tokio::io::BufReader::new(reader);

        write_frame(&mut writer, b"not json").await.expect("write");

        let err = read_message::<_, ClientToServer>(&mut reader)
            .await
            .expect_err("should reject");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
