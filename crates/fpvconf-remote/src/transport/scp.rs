//! SCP wire framing over an exec channel
//!
//! Only single regular files are copied. Directory trees are mirrored one
//! file at a time by [`RemoteTransport`](crate::RemoteTransport), because
//! devices list directories with `ls` rather than over `scp -r`.
//!
//! Sink side (`scp -t`): wait for `\0`, send `C<mode> <size> <name>\n`,
//! wait for `\0`, send the bytes and a trailing `\0`, wait for `\0`.
//! Source side (`scp -f`): send `\0`, read the `C` header, send `\0`,
//! read `size` bytes plus one status byte, send `\0`.

use fpvconf_core::commands::shell_quote;

use crate::error::TransportError;

pub const OK: u8 = 0;
pub const WARNING: u8 = 1;
pub const FATAL: u8 = 2;

/// Command that starts a remote sink writing to `remote_path`
pub fn sink_command(remote_path: &str) -> String {
    format!("scp -t {}", shell_quote(remote_path))
}

/// Command that starts a remote source reading `remote_path`
pub fn source_command(remote_path: &str) -> String {
    format!("scp -f {}", shell_quote(remote_path))
}

/// Last path component, as sent in the `C` header
pub fn file_name(remote_path: &str) -> &str {
    remote_path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|n| !n.is_empty())
        .unwrap_or("file")
}

/// `C` record announcing one regular file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub mode: u32,
    pub size: u64,
    pub name: String,
}

impl FileHeader {
    pub fn new(mode: u32, size: u64, name: impl Into<String>) -> Self {
        Self {
            mode,
            size,
            name: name.into(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        format!("C{:04o} {} {}\n", self.mode & 0o7777, self.size, self.name).into_bytes()
    }

    /// Parse a header line without its trailing newline
    pub fn decode(line: &str) -> Result<Self, TransportError> {
        let body = line
            .strip_prefix('C')
            .ok_or_else(|| TransportError::Protocol(format!("expected C record, got '{}'", line)))?;
        let mut parts = body.splitn(3, ' ');
        let (Some(mode), Some(size), Some(name)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(TransportError::Protocol(format!("malformed C record '{}'", line)));
        };
        let mode = u32::from_str_radix(mode, 8)
            .map_err(|_| TransportError::Protocol(format!("bad mode '{}'", mode)))?;
        let size = size
            .parse::<u64>()
            .map_err(|_| TransportError::Protocol(format!("bad size '{}'", size)))?;
        Ok(Self::new(mode, size, name))
    }
}

/// Status reply from the remote scp process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ok,
    Warning(String),
    Fatal(String),
}

impl Reply {
    pub fn into_result(self) -> Result<(), TransportError> {
        match self {
            Self::Ok => Ok(()),
            Self::Warning(msg) | Self::Fatal(msg) => Err(remote_error(&msg)),
        }
    }
}

/// Map a remote `scp:` message onto a transport error
pub fn remote_error(message: &str) -> TransportError {
    let message = message.trim();
    if message.contains("No such file") {
        TransportError::NotFound(message.to_string())
    } else {
        TransportError::TransferFailed(message.to_string())
    }
}

/// Take one newline-terminated line off the front of `buf`
pub fn take_line(buf: &mut Vec<u8>) -> Option<String> {
    let pos = buf.iter().position(|b| *b == b'\n')?;
    let line: Vec<u8> = buf.drain(..=pos).collect();
    Some(String::from_utf8_lossy(&line[..pos]).into_owned())
}

/// Take exactly `n` bytes off the front of `buf`
pub fn take_exact(buf: &mut Vec<u8>, n: usize) -> Option<Vec<u8>> {
    if buf.len() < n {
        return None;
    }
    Some(buf.drain(..n).collect())
}

/// Decode a status reply; `None` until enough bytes have arrived
pub fn take_reply(buf: &mut Vec<u8>) -> Option<Result<Reply, TransportError>> {
    let first = *buf.first()?;
    match first {
        OK => {
            buf.remove(0);
            Some(Ok(Reply::Ok))
        }
        WARNING | FATAL => {
            let line = take_line(buf)?;
            let msg = line[1..].to_string();
            Some(Ok(if first == WARNING {
                Reply::Warning(msg)
            } else {
                Reply::Fatal(msg)
            }))
        }
        other => Some(Err(TransportError::Protocol(format!(
            "unexpected scp status byte 0x{:02x}",
            other
        )))),
    }
}

/// Decode the first record sent by a source; errors surface as `Err`
pub fn take_source_header(buf: &mut Vec<u8>) -> Option<Result<FileHeader, TransportError>> {
    match *buf.first()? {
        b'C' => {
            let line = take_line(buf)?;
            Some(FileHeader::decode(&line))
        }
        WARNING | FATAL => {
            let line = take_line(buf)?;
            Some(Err(remote_error(&line[1..])))
        }
        b'D' | b'T' => Some(Err(TransportError::Protocol(
            "directory and timestamp records are not supported".into(),
        ))),
        other => Some(Err(TransportError::Protocol(format!(
            "unexpected scp record 0x{:02x}",
            other
        )))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_encode() {
        let header = FileHeader::new(0o644, 12, "wfb.conf");
        assert_eq!(header.encode(), b"C0644 12 wfb.conf\n");
    }

    #[test]
    fn test_header_decode() {
        let header = FileHeader::decode("C0755 4096 my file.bin").unwrap();
        assert_eq!(header, FileHeader::new(0o755, 4096, "my file.bin"));
        assert!(FileHeader::decode("C0644 x name").is_err());
        assert!(FileHeader::decode("D0755 0 dir").is_err());
    }

    #[test]
    fn test_commands_quote_path() {
        assert_eq!(sink_command("/tmp/uImage"), "scp -t '/tmp/uImage'");
        assert_eq!(source_command("/etc/wfb.conf"), "scp -f '/etc/wfb.conf'");
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("/etc/majestic.yaml"), "majestic.yaml");
        assert_eq!(file_name("drone.key"), "drone.key");
        assert_eq!(file_name("/"), "file");
    }

    #[test]
    fn test_take_reply_waits_for_full_message() {
        let mut buf = b"\x01scp: /etc/x: Perm".to_vec();
        assert!(take_reply(&mut buf).is_none());
        buf.extend_from_slice(b"ission denied\n\x00");
        let reply = take_reply(&mut buf).unwrap().unwrap();
        assert_eq!(reply, Reply::Warning("scp: /etc/x: Permission denied".into()));
        assert_eq!(take_reply(&mut buf).unwrap().unwrap(), Reply::Ok);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_source_header_and_payload() {
        let mut buf = b"C0644 5 hello\nworld\x00".to_vec();
        let header = take_source_header(&mut buf).unwrap().unwrap();
        assert_eq!(header.size, 5);
        assert_eq!(take_exact(&mut buf, 5).unwrap(), b"world");
        assert_eq!(take_reply(&mut buf).unwrap().unwrap(), Reply::Ok);
    }

    #[test]
    fn test_missing_remote_file_is_not_found() {
        let mut buf = b"\x01scp: /etc/nope: No such file or directory\n".to_vec();
        let err = take_source_header(&mut buf).unwrap().unwrap_err();
        assert!(matches!(err, TransportError::NotFound(_)));
    }

    #[test]
    fn test_garbage_status_is_protocol_error() {
        let mut buf = b"?".to_vec();
        assert!(matches!(
            take_reply(&mut buf),
            Some(Err(TransportError::Protocol(_)))
        ));
    }
}
