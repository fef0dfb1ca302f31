// target.rs: stable object handles

use crate::defines::Kind;

/// Position-independent name for an object: the kind in the top 8 bits and
/// the slot index in the low 24. Zero means "nothing".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Target(u32);

impl Target {
    pub const NONE: Target = Target(0);
    pub const INDEX_MASK: u32 = 0x00FF_FFFF;
    pub const KIND_SHIFT: u32 = 24;

    /// Pure encoding; the index is masked to 24 bits and not range checked.
    pub const fn build(kind: Kind, index: usize) -> Target {
        Target(((kind as u32) << Self::KIND_SHIFT) | (index as u32 & Self::INDEX_MASK))
    }

    pub fn cell(cell: i16) -> Target {
        Target::build(Kind::Cell, cell as u16 as usize)
    }

    pub const fn from_bits(bits: u32) -> Target {
        Target(bits)
    }

    pub const fn to_bits(self) -> u32 {
        self.0
    }

    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    pub const fn kind_bits(self) -> u8 {
        (self.0 >> Self::KIND_SHIFT) as u8
    }

    /// None when the kind byte is not a known kind.
    pub fn kind(self) -> Option<Kind> {
        Kind::from_u8(self.kind_bits())
    }

    pub const fn index(self) -> usize {
        (self.0 & Self::INDEX_MASK) as usize
    }

    pub fn as_cell(self) -> Option<i16> {
        if self.kind() == Some(Kind::Cell) {
            Some(self.index() as u16 as i16)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind() {
            _ if self.is_none() => f.write_str("none"),
            Some(kind) => write!(f, "{}#{}", kind, self.index()),
            None => write!(f, "?{}#{}", self.kind_bits(), self.index()),
        }
    }
}

/// A live reference to a pooled object. The generation is bumped every
/// time the slot is freed, so a handle kept past a free never resolves to
/// whatever gets allocated into the slot next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    pub kind: Kind,
    pub index: u32,
    pub generation: u32,
}

impl Handle {
    pub fn new(kind: Kind, index: usize, generation: u32) -> Handle {
        Handle {
            kind,
            index: index as u32 & Target::INDEX_MASK,
            generation,
        }
    }

    pub fn index(self) -> usize {
        self.index as usize
    }

    /// Drops the generation.
    pub fn as_target(self) -> Target {
        Target::build(self.kind, self.index as usize)
    }

    /// kind:8 | index:24 | generation:32
    pub fn to_bits(self) -> u64 {
        ((self.as_target().to_bits() as u64) << 32) | self.generation as u64
    }

    pub fn from_bits(bits: u64) -> Option<Handle> {
        let target = Target::from_bits((bits >> 32) as u32);
        let kind = target.kind()?;
        if !kind.is_pool() {
            return None;
        }
        Some(Handle::new(kind, target.index(), bits as u32))
    }
}

/// A reference field inside a simulation object.
///
/// `Coded` only exists between the two halves of a save or load; outside
/// that window every link is `None`, `Live` or `Cell`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Link {
    #[default]
    None,
    Live(Handle),
    Cell(i16),
    Coded(Target),
}

impl Link {
    pub fn is_none(self) -> bool {
        matches!(self, Link::None)
    }

    pub fn is_coded(self) -> bool {
        matches!(self, Link::Coded(_))
    }

    pub fn handle(self) -> Option<Handle> {
        match self {
            Link::Live(h) => Some(h),
            _ => None,
        }
    }

    pub fn cell(self) -> Option<i16> {
        match self {
            Link::Cell(c) => Some(c),
            _ => None,
        }
    }
}

impl From<Handle> for Link {
    fn from(h: Handle) -> Link {
        Link::Live(h)
    }
}

impl From<Option<Handle>> for Link {
    fn from(h: Option<Handle>) -> Link {
        h.map_or(Link::None, Link::Live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_none_is_zero() {
        assert_eq!(Target::NONE.to_bits(), 0);
        assert!(Target::build(Kind::None, 0).is_none());
        assert!(!Target::build(Kind::House, 0).is_none());
    }

    #[test]
    fn test_target_layout() {
        let t = Target::build(Kind::Unit, 37);
        assert_eq!(t.to_bits(), ((Kind::Unit as u32) << 24) | 37);
        assert_eq!(t.kind(), Some(Kind::Unit));
        assert_eq!(t.index(), 37);
    }

    #[test]
    fn test_target_masks_index() {
        let t = Target::build(Kind::Anim, 0x0123_4567);
        assert_eq!(t.kind(), Some(Kind::Anim));
        assert_eq!(t.index(), 0x23_4567);
    }

    #[test]
    fn test_cell_targets() {
        let t = Target::cell(4095);
        assert_eq!(t.as_cell(), Some(4095));
        assert_eq!(Target::build(Kind::Unit, 5).as_cell(), None);
    }

    #[test]
    fn test_handle_bits() {
        let h = Handle::new(Kind::Building, 499, 0xDEAD_BEEF);
        assert_eq!(Handle::from_bits(h.to_bits()), Some(h));
        assert_eq!(h.as_target(), Target::build(Kind::Building, 499));
        assert_eq!(Handle::from_bits((Target::cell(3).to_bits() as u64) << 32), None);
    }

    #[test]
    fn test_unknown_kind_byte() {
        let t = Target::from_bits(0xFE00_0001);
        assert_eq!(t.kind(), None);
        assert_eq!(format!("{}", t), "?254#1");
    }
}
