//! APDU responses as sent back by the emulated card
//!
//! Scripted scenario responses are arbitrary bytes chosen by the operator, so
//! a [`Response`] is stored as the raw wire bytes. The trailing status word is
//! exposed when present but never required.

use bytes::{BufMut, Bytes, BytesMut};

use crate::status::StatusWord;
use crate::{Error, hex};

/// Response bytes returned to the reader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    bytes: Bytes,
}

impl Response {
    /// A response made only of a status word
    pub fn status(status: impl Into<StatusWord>) -> Self {
        Self {
            bytes: Bytes::copy_from_slice(&status.into().to_bytes()),
        }
    }

    /// A response carrying `payload` followed by `status`
    pub fn with_payload(payload: impl AsRef<[u8]>, status: impl Into<StatusWord>) -> Self {
        let payload = payload.as_ref();
        let mut buffer = BytesMut::with_capacity(payload.len() + 2);
        buffer.put_slice(payload);
        buffer.put_slice(&status.into().to_bytes());
        Self {
            bytes: buffer.freeze(),
        }
    }

    /// Wrap raw bytes as-is
    pub fn raw(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Decode a scripted hex response
    pub fn from_hex(text: &str) -> Result<Self, Error> {
        hex::parse_hex(text).map(Self::raw)
    }

    /// Raw wire bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume into the wire bytes
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    /// Trailing status word, when the response is at least two bytes long
    pub fn status_word(&self) -> Option<StatusWord> {
        match self.bytes.len() {
            len if len >= 2 => Some(StatusWord::new(self.bytes[len - 2], self.bytes[len - 1])),
            _ => None,
        }
    }

    /// Split into payload and status word
    pub fn split(&self) -> Result<(&[u8], StatusWord), Error> {
        let status = self
            .status_word()
            .ok_or(Error::ResponseTooShort(self.bytes.len()))?;
        Ok((&self.bytes[..self.bytes.len() - 2], status))
    }

    /// Uppercase hex of the wire bytes
    pub fn to_hex(&self) -> String {
        hex::encode_upper(&self.bytes)
    }
}

impl From<StatusWord> for Response {
    fn from(status: StatusWord) -> Self {
        Self::status(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::common;
    use hex_literal::hex;

    #[test]
    fn test_status_only() {
        let resp = Response::from(common::FILE_NOT_FOUND);
        assert_eq!(resp.as_bytes(), hex!("6A82"));
        assert_eq!(resp.status_word(), Some(common::FILE_NOT_FOUND));
        assert_eq!(resp.split().unwrap(), (&[][..], common::FILE_NOT_FOUND));
    }

    #[test]
    fn test_payload_and_status() {
        let resp = Response::with_payload(hex!("6F10"), common::SUCCESS);
        assert_eq!(resp.to_hex(), "6F109000");
        assert_eq!(resp.split().unwrap(), (&hex!("6F10")[..], common::SUCCESS));
    }

    #[test]
    fn test_scripted_hex() {
        let resp = Response::from_hex("01 02 90 00").unwrap();
        assert_eq!(resp.as_bytes(), hex!("01029000"));

        // scripted responses may be shorter than a status word
        let resp = Response::from_hex("").unwrap();
        assert!(resp.status_word().is_none());
        assert!(matches!(resp.split(), Err(Error::ResponseTooShort(0))));
    }
}
