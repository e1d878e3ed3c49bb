//! Status words closing every response

use std::fmt;

/// Status Word (SW1-SW2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusWord {
    /// First status byte (SW1)
    pub sw1: u8,
    /// Second status byte (SW2)
    pub sw2: u8,
}

impl StatusWord {
    /// Create a new status word
    pub const fn new(sw1: u8, sw2: u8) -> Self {
        Self { sw1, sw2 }
    }

    /// The two status bytes in wire order
    pub const fn to_bytes(self) -> [u8; 2] {
        [self.sw1, self.sw2]
    }

    /// `90 00`
    pub const fn is_success(self) -> bool {
        self.sw1 == 0x90 && self.sw2 == 0x00
    }
}

impl From<[u8; 2]> for StatusWord {
    fn from([sw1, sw2]: [u8; 2]) -> Self {
        Self::new(sw1, sw2)
    }
}

impl From<u16> for StatusWord {
    fn from(status: u16) -> Self {
        status.to_be_bytes().into()
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}{:02X}", self.sw1, self.sw2)
    }
}

/// Fallback answers an emulated card chooses between
pub mod common {
    use super::StatusWord;

    /// 90 00, normal processing
    pub const SUCCESS: StatusWord = StatusWord::new(0x90, 0x00);
    /// 6A 82, file or application not found
    pub const FILE_NOT_FOUND: StatusWord = StatusWord::new(0x6A, 0x82);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_word_forms() {
        let sw = StatusWord::from(0x6A82);
        assert_eq!(sw, common::FILE_NOT_FOUND);
        assert_eq!(sw.to_bytes(), [0x6A, 0x82]);
        assert_eq!(sw.to_string(), "6A82");
        assert_eq!(StatusWord::from([0x90, 0x00]), common::SUCCESS);
        assert!(common::SUCCESS.is_success());
        assert!(!sw.is_success());
    }
}
