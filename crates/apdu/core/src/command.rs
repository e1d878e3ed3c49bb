//! Command APDUs as the card receives them
//!
//! Only the short-length layouts of ISO/IEC 7816-4 are understood. Scripted
//! exchanges compare raw bytes, so a parsed [`Command`] only feeds
//! diagnostics and select recognition.

use bytes::Bytes;
use tracing::trace;

use crate::Error;

/// ISO 7816-4 interindustry class byte
pub const CLA_ISO7816: u8 = 0x00;

/// SELECT instruction byte
pub const INS_SELECT: u8 = 0xA4;

/// SELECT P1 value for selection by DF name (AID)
pub const P1_SELECT_BY_NAME: u8 = 0x04;

/// Which optional fields follow the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum Case {
    /// Header only
    #[display("case 1")]
    HeaderOnly,
    /// Header and Le
    #[display("case 2")]
    ExpectsData,
    /// Header, Lc and data
    #[display("case 3")]
    CarriesData,
    /// Header, Lc, data and Le
    #[display("case 4")]
    CarriesAndExpects,
}

/// A short command APDU split into its fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Class byte
    pub cla: u8,
    /// Instruction byte
    pub ins: u8,
    /// Parameter 1
    pub p1: u8,
    /// Parameter 2
    pub p2: u8,
    /// Data field, empty when absent
    pub data: Bytes,
    /// Expected response length
    pub le: Option<u8>,
}

impl Command {
    /// Split raw bytes into header, data and Le
    ///
    /// A single byte after the header is read as Le. Anything else must be
    /// `Lc` followed by exactly `Lc` data bytes and at most one Le byte.
    pub fn from_bytes(apdu: &[u8]) -> Result<Self, Error> {
        let [cla, ins, p1, p2, body @ ..] = apdu else {
            return Err(Error::InvalidCommandLength(apdu.len()));
        };

        let (data, le) = match body {
            [] => (Bytes::new(), None),
            [le] => (Bytes::new(), Some(*le)),
            [lc, rest @ ..] => {
                let lc = *lc as usize;
                match rest.len().checked_sub(lc) {
                    Some(0) => (Bytes::copy_from_slice(rest), None),
                    Some(1) => (Bytes::copy_from_slice(&rest[..lc]), Some(rest[lc])),
                    _ => return Err(Error::InvalidCommandLength(apdu.len())),
                }
            }
        };

        let command = Self {
            cla: *cla,
            ins: *ins,
            p1: *p1,
            p2: *p2,
            data,
            le,
        };
        trace!(
            cla = format_args!("{:#04x}", command.cla),
            ins = format_args!("{:#04x}", command.ins),
            case = %command.case(),
            data_len = command.data.len(),
            "Parsed command APDU"
        );
        Ok(command)
    }

    /// Layout the command arrived in
    pub const fn case(&self) -> Case {
        match (self.data.is_empty(), self.le.is_some()) {
            (true, false) => Case::HeaderOnly,
            (true, true) => Case::ExpectsData,
            (false, false) => Case::CarriesData,
            (false, true) => Case::CarriesAndExpects,
        }
    }

    /// Whether this command is a `SELECT` by DF name
    pub const fn is_select_by_name(&self) -> bool {
        self.cla == CLA_ISO7816 && self.ins == INS_SELECT && self.p1 == P1_SELECT_BY_NAME
    }
}
