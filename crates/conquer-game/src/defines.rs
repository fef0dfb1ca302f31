// defines.rs: object kinds, house and layer enums, engine limits

use bitflags::bitflags;

// ============================================================
// Limits
// ============================================================

/// Bytes reserved for the description at the front of a save file,
/// including the CR-LF, NUL and CTRL-Z trailer.
pub const DESCRIP_MAX: usize = 44;

pub const WAYPT_COUNT: usize = 28;

pub const MAP_CELL_W: usize = 64;
pub const MAP_CELL_H: usize = 64;
pub const MAP_CELL_TOTAL: usize = MAP_CELL_W * MAP_CELL_H;

/// Overlapper slots per cell.
pub const OVERLAPPER_COUNT: usize = 3;

pub const AIRCRAFT_MAX: usize = 100;
pub const ANIM_MAX: usize = 200;
pub const BUILDING_MAX: usize = 500;
pub const BULLET_MAX: usize = 50;
pub const FACTORY_MAX: usize = 32;
pub const HOUSE_MAX: usize = 12;
pub const INFANTRY_MAX: usize = 500;
pub const OVERLAY_MAX: usize = 1;
pub const SMUDGE_MAX: usize = 1;
pub const TEAM_MAX: usize = 60;
pub const TEMPLATE_MAX: usize = 1;
pub const TERRAIN_MAX: usize = 500;
pub const TRIGGER_MAX: usize = 80;
pub const UNIT_MAX: usize = 500;
pub const TEAMTYPE_MAX: usize = 60;

// ============================================================
// Kind
// ============================================================

/// Runtime type of anything a Target can name.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Kind {
    #[default]
    None = 0,
    House,
    TeamType,
    Team,
    Trigger,
    Aircraft,
    Anim,
    Building,
    Bullet,
    Infantry,
    Overlay,
    Smudge,
    Template,
    Terrain,
    Unit,
    Factory,
    Cell,
    Special,
}

impl Kind {
    /// Every pooled kind, in the order pools are written to a save file.
    pub const POOLS: [Kind; 15] = [
        Kind::House,
        Kind::TeamType,
        Kind::Team,
        Kind::Trigger,
        Kind::Aircraft,
        Kind::Anim,
        Kind::Building,
        Kind::Bullet,
        Kind::Infantry,
        Kind::Overlay,
        Kind::Smudge,
        Kind::Template,
        Kind::Terrain,
        Kind::Unit,
        Kind::Factory,
    ];

    pub const COUNT: usize = Kind::Special as usize + 1;

    pub fn from_u8(v: u8) -> Option<Kind> {
        Some(match v {
            0 => Kind::None,
            1 => Kind::House,
            2 => Kind::TeamType,
            3 => Kind::Team,
            4 => Kind::Trigger,
            5 => Kind::Aircraft,
            6 => Kind::Anim,
            7 => Kind::Building,
            8 => Kind::Bullet,
            9 => Kind::Infantry,
            10 => Kind::Overlay,
            11 => Kind::Smudge,
            12 => Kind::Template,
            13 => Kind::Terrain,
            14 => Kind::Unit,
            15 => Kind::Factory,
            16 => Kind::Cell,
            17 => Kind::Special,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Kind::None => "none",
            Kind::House => "house",
            Kind::TeamType => "teamtype",
            Kind::Team => "team",
            Kind::Trigger => "trigger",
            Kind::Aircraft => "aircraft",
            Kind::Anim => "anim",
            Kind::Building => "building",
            Kind::Bullet => "bullet",
            Kind::Infantry => "infantry",
            Kind::Overlay => "overlay",
            Kind::Smudge => "smudge",
            Kind::Template => "template",
            Kind::Terrain => "terrain",
            Kind::Unit => "unit",
            Kind::Factory => "factory",
            Kind::Cell => "cell",
            Kind::Special => "special",
        }
    }

    /// True for kinds that live in a slot pool.
    pub fn is_pool(self) -> bool {
        !matches!(self, Kind::None | Kind::Cell | Kind::Special)
    }

    pub fn bit(self) -> KindSet {
        KindSet::from_bits_truncate(1 << (self as u32))
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    /// A set of kinds; used to say what a reference field may point at.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct KindSet: u32 {
        const HOUSE    = 1 << 1;
        const TEAMTYPE = 1 << 2;
        const TEAM     = 1 << 3;
        const TRIGGER  = 1 << 4;
        const AIRCRAFT = 1 << 5;
        const ANIM     = 1 << 6;
        const BUILDING = 1 << 7;
        const BULLET   = 1 << 8;
        const INFANTRY = 1 << 9;
        const OVERLAY  = 1 << 10;
        const SMUDGE   = 1 << 11;
        const TEMPLATE = 1 << 12;
        const TERRAIN  = 1 << 13;
        const UNIT     = 1 << 14;
        const FACTORY  = 1 << 15;
        const CELL     = 1 << 16;
        const SPECIAL  = 1 << 17;

        /// Mobile objects.
        const FOOT   = Self::INFANTRY.bits() | Self::UNIT.bits() | Self::AIRCRAFT.bits();
        /// Objects that belong to a house and can fight.
        const TECHNO = Self::FOOT.bits() | Self::BUILDING.bits();
        /// Map decorations: overlays, smudges and templates.
        const DECORATION = Self::OVERLAY.bits() | Self::SMUDGE.bits() | Self::TEMPLATE.bits();
        /// Anything that can sit on the map and be targeted as an object.
        const OBJECT = Self::TECHNO.bits()
            | Self::TERRAIN.bits()
            | Self::BULLET.bits()
            | Self::ANIM.bits()
            | Self::DECORATION.bits();
        /// Navigation and targeting computers may also hold a cell.
        const DESTINATION = Self::OBJECT.bits() | Self::CELL.bits();
    }
}

impl KindSet {
    pub fn has(self, kind: Kind) -> bool {
        kind != Kind::None && self.contains(kind.bit())
    }

    /// Pooled kinds in this set, in save-file order.
    pub fn pool_kinds(self) -> impl Iterator<Item = Kind> {
        Kind::POOLS.into_iter().filter(move |k| self.has(*k))
    }
}

// ============================================================
// Houses, layers, theaters
// ============================================================

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HousesType {
    #[default]
    Good = 0,
    Bad,
    Neutral,
    Jp,
    Multi1,
    Multi2,
    Multi3,
    Multi4,
    Multi5,
    Multi6,
}

impl HousesType {
    pub const COUNT: usize = 10;

    pub const ALL: [HousesType; HousesType::COUNT] = [
        HousesType::Good,
        HousesType::Bad,
        HousesType::Neutral,
        HousesType::Jp,
        HousesType::Multi1,
        HousesType::Multi2,
        HousesType::Multi3,
        HousesType::Multi4,
        HousesType::Multi5,
        HousesType::Multi6,
    ];

    pub fn from_u8(v: u8) -> Option<HousesType> {
        HousesType::ALL.get(v as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            HousesType::Good => "GoodGuy",
            HousesType::Bad => "BadGuy",
            HousesType::Neutral => "Neutral",
            HousesType::Jp => "Special",
            HousesType::Multi1 => "Multi1",
            HousesType::Multi2 => "Multi2",
            HousesType::Multi3 => "Multi3",
            HousesType::Multi4 => "Multi4",
            HousesType::Multi5 => "Multi5",
            HousesType::Multi6 => "Multi6",
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerType {
    Ground = 0,
    Air,
    Top,
}

impl LayerType {
    pub const COUNT: usize = 3;
    pub const ALL: [LayerType; LayerType::COUNT] = [LayerType::Ground, LayerType::Air, LayerType::Top];
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Theater {
    #[default]
    Temperate = 0,
    Desert,
    Winter,
}

impl Theater {
    pub fn from_u8(v: u8) -> Option<Theater> {
        match v {
            0 => Some(Theater::Temperate),
            1 => Some(Theater::Desert),
            2 => Some(Theater::Winter),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_u8() {
        for v in 0..Kind::COUNT as u8 {
            let kind = Kind::from_u8(v).unwrap();
            assert_eq!(kind as u8, v);
        }
        assert_eq!(Kind::from_u8(Kind::COUNT as u8), None);
    }

    #[test]
    fn test_kind_sets() {
        assert!(KindSet::TECHNO.has(Kind::Building));
        assert!(!KindSet::FOOT.has(Kind::Building));
        assert!(KindSet::OBJECT.has(Kind::Anim));
        assert!(KindSet::OBJECT.has(Kind::Overlay));
        assert!(KindSet::OBJECT.has(Kind::Template));
        assert!(!KindSet::OBJECT.has(Kind::Team));
        assert!(!KindSet::OBJECT.has(Kind::Cell));
        assert!(KindSet::DESTINATION.has(Kind::Cell));
        assert!(!KindSet::all().has(Kind::None));
    }

    #[test]
    fn test_pool_kinds_in_save_order() {
        let foot: Vec<Kind> = KindSet::FOOT.pool_kinds().collect();
        assert_eq!(foot, vec![Kind::Aircraft, Kind::Infantry, Kind::Unit]);
        assert!(Kind::POOLS.iter().all(|k| k.is_pool()));
        assert!(!Kind::Cell.is_pool());
    }
}
