//! Identifier types shared by the correlation engine and the protocol layer.

use std::fmt;

/// Correlation token carried by a request frame and echoed by its response.
///
/// The space is `1..=255`. [`FrameId::NONE`] (zero) tells the radio that no
/// response is wanted, so it is never allocated to a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FrameId(pub u8);

impl FrameId {
    /// Reserved "fire-and-forget" identifier.
    pub const NONE: FrameId = FrameId(0);

    /// Lowest allocatable identifier.
    pub const MIN: FrameId = FrameId(1);

    /// Highest allocatable identifier.
    pub const MAX: FrameId = FrameId(u8::MAX);

    /// Number of identifiers that can be outstanding at once.
    pub const SPACE: usize = u8::MAX as usize;

    /// Raw byte value as it appears on the wire.
    pub fn get(self) -> u8 {
        self.0
    }

    /// Whether this identifier requests a correlated response.
    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl From<u8> for FrameId {
    fn from(value: u8) -> Self {
        FrameId(value)
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An inbound unit that may answer an outstanding request.
///
/// Implemented by decoded protocol frames. Frames that never carry a
/// correlation token (received data, modem status) return `None`.
pub trait Correlated {
    /// The frame ID this frame answers, if any.
    fn frame_id(&self) -> Option<FrameId>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_id_none_is_zero() {
        assert!(FrameId::NONE.is_none());
        assert!(!FrameId::MIN.is_none());
        assert_eq!(FrameId::NONE.get(), 0);
    }

    #[test]
    fn frame_id_space() {
        assert_eq!(FrameId::SPACE, 255);
        assert_eq!(FrameId::MAX.get(), 255);
    }

    #[test]
    fn frame_id_display() {
        assert_eq!(FrameId(42).to_string(), "42");
        assert_eq!(FrameId::from(9), FrameId(9));
    }
}
