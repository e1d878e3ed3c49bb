//! Card-side types for APDU (Application Protocol Data Unit) handling
//!
//! A reader talks to a card by sending command APDUs and receiving response
//! APDUs as described by ISO/IEC 7816-4. Where a host-side library builds
//! commands and parses responses, an emulated card does the reverse: it
//! inspects the commands a reader sends and assembles the bytes to answer with.
//!
//! ## Overview
//!
//! - [`Command`] splits command APDUs into their fields
//! - [`Select`] recognises `SELECT` by-name commands and extracts their AID
//! - [`StatusWord`] and [`Response`] build answers
//! - [`hex`](crate::hex) holds the hex helpers shared by scripted scenarios
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

// Re-export bytes for convenience
pub use bytes::Bytes;

pub mod command;
pub mod error;
pub mod hex;
pub mod response;
pub mod select;
pub mod status;

pub use command::{Case, Command};
pub use error::{Error, ResultExt};
pub use response::Response;
pub use select::Select;
pub use status::StatusWord;

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::hex::{encode_upper, is_valid_aid, normalize_aid, parse_hex};
    pub use crate::status::common as status;
    pub use crate::{Bytes, Command, Error, Response, ResultExt, Select, StatusWord};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reexports() {
        let cmd = Command::from_bytes(&[0x00, 0xA4, 0x04, 0x00]).unwrap();
        assert!(cmd.is_select_by_name());
        assert!(Select::from_raw(&[0x00, 0xA4, 0x04, 0x00]).is_some());

        let resp = Response::status(status::common::SUCCESS);
        assert_eq!(resp.as_bytes(), &[0x90, 0x00]);
        assert_eq!(resp.status_word(), Some(StatusWord::new(0x90, 0x00)));
    }
}
