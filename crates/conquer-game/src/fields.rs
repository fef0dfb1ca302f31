// fields.rs: reference-field descriptor tables for the pointer coder

use std::sync::OnceLock;

use crate::defines::{Kind, KindSet};

/// Identifies one reference field. Objects map these to their `Link`
/// members with a `match`, the same way every class is visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldId {
    // ObjectClass layer
    Next,
    Trigger,

    // TechnoClass layer
    House,
    CargoHold,
    Radio,
    TarCom,

    // FootClass layer
    Team,
    Member,
    NavCom,

    // Team
    TeamClass,
    TeamHouse,
    TeamMember,
    TeamTarget,

    // Trigger
    TriggerTeam,

    // Anim
    AnimObject,
    VirtualAnim,

    // Bullet
    Payback,
    BulletTarget,

    // Building
    Factory,

    // Factory
    FactoryObject,
    FactoryHouse,

    // Map cells
    Occupier,
    Overlapper0,
    Overlapper1,
    Overlapper2,
    CellTrigger,

    // Map, layers and globals
    PendingObject,
    LayerEntry,
    PlayerPtr,
    Selection,
}

/// Which shared layer of an object a field lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldLayer {
    Object,
    Techno,
    Foot,
    Own,
}

impl FieldId {
    pub fn layer(self) -> FieldLayer {
        match self {
            FieldId::Next | FieldId::Trigger => FieldLayer::Object,
            FieldId::House | FieldId::CargoHold | FieldId::Radio | FieldId::TarCom => FieldLayer::Techno,
            FieldId::Team | FieldId::Member | FieldId::NavCom => FieldLayer::Foot,
            _ => FieldLayer::Own,
        }
    }
}

/// How a live reference is turned into a stored target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkCoding {
    /// `Target(kind, slot index)`.
    Slot,
    /// `Target(House, house type)`, read from the referenced house itself.
    /// Needs the house pool to be live while coding and decoding.
    HouseId,
}

/// What decode does with a target that names no live object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingPolicy {
    Fatal,
    /// Clear the link and log it; cell occupancy is rebuilt by the host.
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDesc {
    pub name: &'static str,
    pub field: FieldId,
    pub accepts: KindSet,
    pub coding: LinkCoding,
    pub missing: MissingPolicy,
}

impl FieldDesc {
    const fn slot(name: &'static str, field: FieldId, accepts: KindSet) -> FieldDesc {
        FieldDesc { name, field, accepts, coding: LinkCoding::Slot, missing: MissingPolicy::Fatal }
    }

    const fn house(name: &'static str, field: FieldId) -> FieldDesc {
        FieldDesc { name, field, accepts: KindSet::HOUSE, coding: LinkCoding::HouseId, missing: MissingPolicy::Fatal }
    }

    const fn clearable(name: &'static str, field: FieldId, accepts: KindSet) -> FieldDesc {
        FieldDesc { name, field, accepts, coding: LinkCoding::Slot, missing: MissingPolicy::Clear }
    }
}

// ============================================================
// Per-layer tables
// ============================================================

pub fn object_fields() -> Vec<FieldDesc> {
    vec![
        FieldDesc::slot("next",        FieldId::Next,        KindSet::OBJECT),
        FieldDesc::slot("trigger",     FieldId::Trigger,     KindSet::TRIGGER),
    ]
}

pub fn techno_fields() -> Vec<FieldDesc> {
    vec![
        FieldDesc::house("house",      FieldId::House),
        FieldDesc::slot("cargo_hold",  FieldId::CargoHold,   KindSet::FOOT),
        FieldDesc::slot("radio",       FieldId::Radio,       KindSet::TECHNO),
        FieldDesc::slot("tar_com",     FieldId::TarCom,      KindSet::DESTINATION),
    ]
}

pub fn foot_fields() -> Vec<FieldDesc> {
    vec![
        FieldDesc::slot("team",        FieldId::Team,        KindSet::TEAM),
        FieldDesc::slot("member",      FieldId::Member,      KindSet::FOOT),
        FieldDesc::slot("nav_com",     FieldId::NavCom,      KindSet::DESTINATION),
    ]
}

fn own_fields(kind: Kind) -> Vec<FieldDesc> {
    match kind {
        Kind::Team => vec![
            FieldDesc::slot("class",   FieldId::TeamClass,   KindSet::TEAMTYPE),
            FieldDesc::house("house",  FieldId::TeamHouse),
            FieldDesc::slot("member",  FieldId::TeamMember,  KindSet::FOOT),
            FieldDesc::slot("target",  FieldId::TeamTarget,  KindSet::DESTINATION),
        ],
        Kind::Trigger => vec![
            FieldDesc::slot("team",    FieldId::TriggerTeam, KindSet::TEAMTYPE),
        ],
        Kind::Anim => vec![
            FieldDesc::slot("object",  FieldId::AnimObject,  KindSet::OBJECT),
            FieldDesc::slot("virtual", FieldId::VirtualAnim, KindSet::ANIM),
        ],
        Kind::Bullet => vec![
            FieldDesc::slot("payback", FieldId::Payback,     KindSet::TECHNO),
            FieldDesc::slot("tar_com", FieldId::BulletTarget, KindSet::DESTINATION),
        ],
        Kind::Building => vec![
            FieldDesc::slot("factory", FieldId::Factory,     KindSet::FACTORY),
        ],
        Kind::Factory => vec![
            FieldDesc::slot("object",  FieldId::FactoryObject, KindSet::TECHNO),
            FieldDesc::house("house",  FieldId::FactoryHouse),
        ],
        _ => Vec::new(),
    }
}

/// Composes the layers a kind inherits, base layer first, so every
/// field is listed exactly once.
fn compose(kind: Kind) -> Vec<FieldDesc> {
    let mut fields = Vec::new();
    let bit = kind.bit();
    if KindSet::OBJECT.contains(bit) {
        fields.extend(object_fields());
    }
    if KindSet::TECHNO.contains(bit) {
        fields.extend(techno_fields());
    }
    if KindSet::FOOT.contains(bit) {
        fields.extend(foot_fields());
    }
    fields.extend(own_fields(kind));
    fields
}

static FIELD_TABLES: OnceLock<Vec<Vec<FieldDesc>>> = OnceLock::new();

/// Reference fields of a pooled kind.
pub fn fields_for(kind: Kind) -> &'static [FieldDesc] {
    let tables = FIELD_TABLES.get_or_init(|| {
        (0..Kind::COUNT as u8)
            .map(|v| match Kind::from_u8(v) {
                Some(k) if k.is_pool() => compose(k),
                _ => Vec::new(),
            })
            .collect()
    });
    &tables[kind as usize]
}

pub static CELL_FIELDS: [FieldDesc; 5] = [
    FieldDesc::clearable("occupier",    FieldId::Occupier,    KindSet::OBJECT),
    FieldDesc::clearable("overlapper0", FieldId::Overlapper0, KindSet::OBJECT),
    FieldDesc::clearable("overlapper1", FieldId::Overlapper1, KindSet::OBJECT),
    FieldDesc::clearable("overlapper2", FieldId::Overlapper2, KindSet::OBJECT),
    FieldDesc::slot("cell_trigger",     FieldId::CellTrigger, KindSet::TRIGGER),
];

pub static PENDING_OBJECT: FieldDesc = FieldDesc::slot("pending_object", FieldId::PendingObject, KindSet::TECHNO);
pub static LAYER_ENTRY: FieldDesc = FieldDesc::slot("layer", FieldId::LayerEntry, KindSet::OBJECT);
pub static PLAYER_PTR: FieldDesc = FieldDesc::house("player_ptr", FieldId::PlayerPtr);
pub static SELECTION: FieldDesc = FieldDesc::slot("selection", FieldId::Selection, KindSet::OBJECT);

/// Kinds a set of fields has to dereference while coding, which is what
/// orders the coding passes.
pub fn reads_of(fields: &[FieldDesc]) -> KindSet {
    if fields.iter().any(|f| f.coding == LinkCoding::HouseId) {
        KindSet::HOUSE
    } else {
        KindSet::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_each_field_listed_once() {
        for kind in Kind::POOLS {
            let mut seen = HashSet::new();
            for f in fields_for(kind) {
                assert!(seen.insert(f.field), "{:?} listed twice for {}", f.field, kind);
            }
        }
    }

    #[test]
    fn test_layers_compose_base_first() {
        let unit: Vec<FieldId> = fields_for(Kind::Unit).iter().map(|f| f.field).collect();
        assert_eq!(
            unit,
            vec![
                FieldId::Next,
                FieldId::Trigger,
                FieldId::House,
                FieldId::CargoHold,
                FieldId::Radio,
                FieldId::TarCom,
                FieldId::Team,
                FieldId::Member,
                FieldId::NavCom,
            ]
        );
        let building: Vec<FieldId> = fields_for(Kind::Building).iter().map(|f| f.field).collect();
        assert_eq!(building.last(), Some(&FieldId::Factory));
        assert!(!building.contains(&FieldId::NavCom));
    }

    #[test]
    fn test_houses_and_types_have_no_links() {
        assert!(fields_for(Kind::House).is_empty());
        assert!(fields_for(Kind::TeamType).is_empty());
        assert!(fields_for(Kind::Cell).is_empty());
    }

    #[test]
    fn test_reads_follow_house_coding() {
        assert_eq!(reads_of(fields_for(Kind::Infantry)), KindSet::HOUSE);
        assert_eq!(reads_of(fields_for(Kind::Factory)), KindSet::HOUSE);
        assert_eq!(reads_of(fields_for(Kind::Anim)), KindSet::empty());
        assert_eq!(reads_of(&CELL_FIELDS), KindSet::empty());
    }

    #[test]
    fn test_field_layers() {
        assert_eq!(FieldId::Trigger.layer(), FieldLayer::Object);
        assert_eq!(FieldId::Radio.layer(), FieldLayer::Techno);
        assert_eq!(FieldId::NavCom.layer(), FieldLayer::Foot);
        assert_eq!(FieldId::Factory.layer(), FieldLayer::Own);
    }
}
