//! `SELECT` by-name recognition
//!
//! Readers pick a card application by sending `00 A4 04 xx Lc <AID> [Le]`.
//! Recognition here is deliberately looser than [`Command::from_bytes`](crate::Command::from_bytes): a
//! command is a select as soon as its header matches, and the AID is whatever
//! the `Lc` byte announces, trailing bytes ignored. A truncated body yields an
//! empty AID rather than an error.

use bytes::Bytes;

use crate::command::{CLA_ISO7816, INS_SELECT, P1_SELECT_BY_NAME};
use crate::hex::encode_upper;

/// A `SELECT` by-name command seen by the card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Select {
    aid: Bytes,
}

impl Select {
    /// Recognise a select command in raw APDU bytes
    ///
    /// Returns `None` when the header is not `00 A4 04`.
    pub fn from_raw(apdu: &[u8]) -> Option<Self> {
        if apdu.len() < 4
            || apdu[0] != CLA_ISO7816
            || apdu[1] != INS_SELECT
            || apdu[2] != P1_SELECT_BY_NAME
        {
            return None;
        }

        let aid = match apdu.get(4) {
            Some(&lc) if apdu.len() >= 5 + lc as usize => {
                Bytes::copy_from_slice(&apdu[5..5 + lc as usize])
            }
            _ => Bytes::new(),
        };

        Some(Self { aid })
    }

    /// Raw AID bytes
    pub const fn aid(&self) -> &Bytes {
        &self.aid
    }

    /// AID as uppercase hex
    pub fn aid_hex(&self) -> String {
        encode_upper(&self.aid)
    }

    /// Whether the selected AID equals `aid`, compared case-insensitively as hex
    pub fn targets(&self, aid: &str) -> bool {
        self.aid_hex().eq_ignore_ascii_case(aid.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_select_recognition() {
        let select = Select::from_raw(&hex!("00A4040007F0010203040506")).unwrap();
        assert_eq!(select.aid_hex(), "F0010203040506");
        assert!(select.targets("f0010203040506"));
        assert!(!select.targets("F00102030405"));

        // Le after the AID is ignored
        let select = Select::from_raw(&hex!("00A4040007F001020304050600")).unwrap();
        assert_eq!(select.aid_hex(), "F0010203040506");
    }

    #[test]
    fn test_non_select_commands() {
        assert!(Select::from_raw(&hex!("00B0000000")).is_none());
        // select by file identifier
        assert!(Select::from_raw(&hex!("00A40000023F00")).is_none());
        assert!(Select::from_raw(&hex!("00A404")).is_none());
    }

    #[test]
    fn test_truncated_select_has_empty_aid() {
        let select = Select::from_raw(&hex!("00A4040000")).unwrap();
        assert!(select.aid().is_empty());
        assert!(select.targets(""));

        let select = Select::from_raw(&hex!("00A4040007F001")).unwrap();
        assert!(select.aid().is_empty());

        // header only
        let select = Select::from_raw(&hex!("00A40400")).unwrap();
        assert!(select.aid().is_empty());
    }
}
