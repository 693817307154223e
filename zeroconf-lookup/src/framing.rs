//! Native-messaging framing: a 4-byte little-endian length followed by
//! that many bytes, in both directions.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use shared::protocol::LOOKUP_COMMAND;
use shared::types::{CommandMessage, ResultEnvelope};

/// Upper bound for an incoming command body
pub const MAX_COMMAND_LEN: u32 = 1024 * 1024;

const LENGTH_PREFIX: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("missing input: expected {expected} bytes, received {received}")]
    MissingInput { expected: usize, received: usize },

    #[error("command length {0} exceeds the size limit")]
    TooLarge(u32),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize result: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Lookup,
    Unrecognized(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Length prefix as raw bytes, for the browser
    Binary,
    /// Length as a text banner, for a terminal
    Readable,
}

/// Read until `buf` is full or the stream ends. Returns the bytes read.
async fn read_full<R: AsyncRead + Unpin>(input: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = input.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Read one frame body.
///
/// `Ok(None)` means the stream ended before any byte arrived. A stream
/// ending anywhere else is [`FramingError::MissingInput`].
pub async fn read_frame<R: AsyncRead + Unpin>(input: &mut R) -> Result<Option<Vec<u8>>, FramingError> {
    let mut prefix = [0u8; LENGTH_PREFIX];
    let received = read_full(input, &mut prefix).await?;
    if received == 0 {
        return Ok(None);
    }
    if received < LENGTH_PREFIX {
        return Err(FramingError::MissingInput { expected: LENGTH_PREFIX, received });
    }

    let length = u32::from_le_bytes(prefix);
    tracing::debug!("expect {} message bytes", length);
    if length > MAX_COMMAND_LEN {
        return Err(FramingError::TooLarge(length));
    }

    let expected = length as usize;
    let mut body = vec![0u8; expected];
    let received = read_full(input, &mut body).await?;
    if received < expected {
        return Err(FramingError::MissingInput { expected, received });
    }

    Ok(Some(body))
}

/// Interpret a command body. Never fails: anything that is not a lookup
/// request comes back as [`Command::Unrecognized`].
pub fn parse_command(body: &[u8]) -> Command {
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(trimmed);

    if unquoted == LOOKUP_COMMAND {
        tracing::debug!("found Lookup (plain)");
        return Command::Lookup;
    }

    let unescaped = unquoted.replace("\\\"", "\"");
    match serde_json::from_str::<CommandMessage>(&unescaped) {
        Ok(message) if message.cmd == LOOKUP_COMMAND => {
            tracing::debug!("found Lookup (JSON)");
            Command::Lookup
        }
        Ok(message) => Command::Unrecognized(message.cmd),
        Err(_) => Command::Unrecognized(unquoted.to_string()),
    }
}

/// Read and interpret one command. `Ok(None)` if no command was sent.
pub async fn read_command<R: AsyncRead + Unpin>(input: &mut R) -> Result<Option<Command>, FramingError> {
    Ok(read_frame(input).await?.map(|body| parse_command(&body)))
}

/// Serialize the envelope as indented JSON.
pub fn encode_envelope(envelope: &ResultEnvelope) -> Result<Vec<u8>, FramingError> {
    Ok(serde_json::to_vec_pretty(envelope)?)
}

/// Prefix `payload` with its little-endian length.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(LENGTH_PREFIX + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Write the envelope in the given mode and flush.
pub async fn write_envelope<W: AsyncWrite + Unpin>(
    output: &mut W,
    envelope: &ResultEnvelope,
    mode: OutputMode,
) -> Result<(), FramingError> {
    let payload = encode_envelope(envelope)?;

    match mode {
        OutputMode::Binary => {
            output.write_all(&encode_frame(&payload)).await?;
        }
        OutputMode::Readable => {
            let banner = format!("==> {} bytes <==\n", payload.len());
            output.write_all(banner.as_bytes()).await?;
            output.write_all(&payload).await?;
            output.write_all(b"\n").await?;
        }
    }

    output.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use shared::types::Server;

    fn sample_envelope() -> ResultEnvelope {
        ResultEnvelope::new(
            "Rust (mDNSResponder)",
            vec![Server {
                name: "MyServer".to_string(),
                txt: vec!["path=/".to_string()],
                target: "host.local".to_string(),
                port: 80,
                a: Ipv4Addr::new(192, 168, 1, 5),
                url: "http://192.168.1.5:80/".to_string(),
            }],
        )
    }

    #[tokio::test]
    async fn test_empty_stream_is_no_command() {
        let mut input: &[u8] = &[];
        assert!(read_command(&mut input).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_short_length_prefix() {
        let mut input: &[u8] = &[6, 0];
        let err = read_command(&mut input).await.unwrap_err();
        assert!(matches!(err, FramingError::MissingInput { expected: 4, received: 2 }));
    }

    #[tokio::test]
    async fn test_short_body_is_missing_input() {
        let mut bytes = 10u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"Lookup");
        let mut input: &[u8] = &bytes;

        let err = read_command(&mut input).await.unwrap_err();
        assert!(matches!(err, FramingError::MissingInput { expected: 10, received: 6 }));
    }

    #[tokio::test]
    async fn test_oversized_length_is_rejected() {
        let bytes = (MAX_COMMAND_LEN + 1).to_le_bytes();
        let mut input: &[u8] = &bytes;
        let err = read_command(&mut input).await.unwrap_err();
        assert!(matches!(err, FramingError::TooLarge(_)));
    }

    #[tokio::test]
    async fn test_lookup_variants() {
        let bodies: [&[u8]; 4] = [
            b"\"Lookup\"",
            b"Lookup",
            br#"{"cmd": "Lookup"}"#,
            br#""{\"cmd\":\"Lookup\"}""#,
        ];
        for body in bodies {
            let bytes = encode_frame(body);
            let mut input: &[u8] = &bytes;
            assert_eq!(
                read_command(&mut input).await.unwrap(),
                Some(Command::Lookup),
                "body {:?}",
                String::from_utf8_lossy(body),
            );
        }
    }

    #[test]
    fn test_unrecognized_commands() {
        assert_eq!(
            parse_command(br#"{"cmd": "Install"}"#),
            Command::Unrecognized("Install".to_string()),
        );
        assert_eq!(
            parse_command(b"\"Hello\""),
            Command::Unrecognized("Hello".to_string()),
        );
        assert_eq!(
            parse_command(b"\"\"Lookup\"\""),
            Command::Unrecognized("\"Lookup\"".to_string()),
        );
    }

    #[tokio::test]
    async fn test_envelope_frame_round_trip() {
        let envelope = sample_envelope();
        let payload = encode_envelope(&envelope).unwrap();

        let mut written = Vec::new();
        write_envelope(&mut written, &envelope, OutputMode::Binary).await.unwrap();
        assert_eq!(&written[..4], &(payload.len() as u32).to_le_bytes());

        let mut input: &[u8] = &written;
        let body = read_frame(&mut input).await.unwrap().unwrap();
        assert_eq!(body, payload);

        let decoded: ResultEnvelope = serde_json::from_slice(&body).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[tokio::test]
    async fn test_readable_mode() {
        let envelope = sample_envelope();
        let payload = encode_envelope(&envelope).unwrap();

        let mut written = Vec::new();
        write_envelope(&mut written, &envelope, OutputMode::Readable).await.unwrap();
        let text = String::from_utf8(written).unwrap();

        let banner = format!("==> {} bytes <==\n", payload.len());
        assert!(text.starts_with(&banner));
        assert!(text.contains("\n  \"version\": 2,"));
        assert!(text.ends_with("}\n"));
    }
}
