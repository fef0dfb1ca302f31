// save_error.rs: failures raised by the pools, the pointer coder and save/load

use std::io;

use crate::defines::{HousesType, Kind};
use crate::target::Target;

#[derive(Debug)]
pub enum SaveError {
    /// The byte stream could not be opened.
    StreamOpenFailed(io::Error),
    /// The file was written by a build with a different object layout.
    FormatVersionMismatch { expected: u32, found: u32 },
    /// A size prefix disagrees with the compiled image size.
    ObjectSizeMismatch { kind: Kind, expected: usize, found: i64 },
    /// The stream moved fewer bytes than required.
    ShortReadOrWrite { expected: usize, actual: usize },
    /// A stored target does not name a live object of an accepted kind.
    DanglingHandleOnDecode { owner: Kind, field: &'static str, target: Target },
    /// A pool has no free slot. The only recoverable variant.
    PoolExhausted(Kind),
    /// The host's extension block failed to save or load.
    HostHookFailed(String),
    /// An image was tagged with a different kind than the one expected.
    TypeTagMismatch { expected: Kind, found: u8 },
    /// A link was in the wrong state for the current pass.
    PointerState { field: &'static str, detail: &'static str },
    /// A unit was coded or decoded out of dependency order.
    CodingOrder(String),
    /// Two active houses have the same house type, so house ids are ambiguous.
    DuplicateHouse(HousesType),
    /// Structurally invalid stream contents.
    InvalidData(String),
    Io(io::Error),
}

pub type SaveResult<T> = Result<T, SaveError>;

impl SaveError {
    /// Everything except pool exhaustion aborts the whole save or load.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SaveError::PoolExhausted(_))
    }
}

impl std::fmt::Display for SaveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SaveError::StreamOpenFailed(e) => write!(f, "Couldn't open save stream: {}", e),
            SaveError::FormatVersionMismatch { expected, found } => write!(
                f,
                "Save file version mismatch: expected {:#010x}, found {:#010x}",
                expected, found
            ),
            SaveError::ObjectSizeMismatch { kind, expected, found } => write!(
                f,
                "Object size mismatch for {}: expected {} bytes, file has {}",
                kind, expected, found
            ),
            SaveError::ShortReadOrWrite { expected, actual } => {
                write!(f, "Short read or write: {} of {} bytes", actual, expected)
            }
            SaveError::DanglingHandleOnDecode { owner, field, target } => write!(
                f,
                "Dangling reference in {}.{}: {} names no live object",
                owner, field, target
            ),
            SaveError::PoolExhausted(kind) => write!(f, "No free {} slots", kind),
            SaveError::HostHookFailed(msg) => write!(f, "Host extension failed: {}", msg),
            SaveError::TypeTagMismatch { expected, found } => {
                write!(f, "Expected a {} image, found type tag {}", expected, found)
            }
            SaveError::PointerState { field, detail } => write!(f, "Pointer state error in {}: {}", field, detail),
            SaveError::CodingOrder(msg) => write!(f, "Pointer coding order violated: {}", msg),
            SaveError::DuplicateHouse(ht) => write!(f, "More than one {} house", ht.name()),
            SaveError::InvalidData(msg) => write!(f, "Invalid save data: {}", msg),
            SaveError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for SaveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SaveError::StreamOpenFailed(e) | SaveError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for SaveError {
    fn from(e: io::Error) -> Self {
        SaveError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_only_exhaustion_is_recoverable() {
        assert!(SaveError::PoolExhausted(Kind::Anim).is_recoverable());
        assert!(!SaveError::HostHookFailed("x".into()).is_recoverable());
        assert!(!SaveError::FormatVersionMismatch { expected: 1, found: 2 }.is_recoverable());
        assert!(!SaveError::DuplicateHouse(HousesType::Bad).is_recoverable());
    }

    #[test]
    fn test_display_and_source() {
        let e = SaveError::DanglingHandleOnDecode {
            owner: Kind::Unit,
            field: "house",
            target: Target::build(Kind::House, 3),
        };
        assert_eq!(e.to_string(), "Dangling reference in unit.house: house#3 names no live object");

        let io_err: SaveError = io::Error::new(io::ErrorKind::Other, "disk").into();
        assert!(io_err.source().is_some());
        assert!(SaveError::PoolExhausted(Kind::Unit).source().is_none());
        assert_eq!(SaveError::DuplicateHouse(HousesType::Bad).to_string(), "More than one BadGuy house");
    }
}
