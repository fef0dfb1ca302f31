// team.rs: team templates and the teams built from them

use bitflags::bitflags;

use crate::defines::{HousesType, Kind};
use crate::fields::FieldId;
use crate::ioobj::{ImageReader, ImageWriter, SaveImage, IMAGE_HEADER_SIZE, LINK_SIZE};
use crate::object::{link_fields, name_bytes, name_str, read_houses_type, SimObject};
use crate::save_error::SaveResult;
use crate::target::Link;

pub const TEAMTYPE_NAME_LEN: usize = 8;
pub const MAX_TEAM_CLASSES: usize = 5;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TeamTypeFlags: u8 {
        const ROUNDABOUT   = 1 << 0;
        const SUICIDE      = 1 << 1;
        const AUTOCREATE   = 1 << 2;
        const PREBUILD     = 1 << 3;
        const REINFORCABLE = 1 << 4;
    }
}

/// One line of a team template: so many of a given object type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeamMember {
    pub kind: u8,
    pub type_id: u8,
    pub quantity: u8,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TeamTypeClass {
    pub name: [u8; TEAMTYPE_NAME_LEN],
    pub house: HousesType,
    pub flags: TeamTypeFlags,
    pub max_allowed: u8,
    pub recruit_priority: u8,
    pub class_count: u8,
    pub members: [TeamMember; MAX_TEAM_CLASSES],
    pub mission_count: u8,
}

impl TeamTypeClass {
    pub fn name(&self) -> String {
        name_str(&self.name)
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name_bytes(name);
    }
}

impl SaveImage for TeamTypeClass {
    const KIND: Kind = Kind::TeamType;
    const IMAGE_SIZE: usize = IMAGE_HEADER_SIZE + TEAMTYPE_NAME_LEN + 5 + 3 * MAX_TEAM_CLASSES + 1;

    fn write_fields(&self, w: &mut ImageWriter) -> SaveResult<()> {
        w.bytes(&self.name);
        w.u8(self.house as u8);
        w.u8(self.flags.bits());
        w.u8(self.max_allowed);
        w.u8(self.recruit_priority);
        w.u8(self.class_count);
        for m in &self.members {
            w.u8(m.kind);
            w.u8(m.type_id);
            w.u8(m.quantity);
        }
        w.u8(self.mission_count);
        Ok(())
    }

    fn read_fields(r: &mut ImageReader) -> SaveResult<Self> {
        let name = r.bytes::<TEAMTYPE_NAME_LEN>()?;
        let house = read_houses_type(r)?;
        let flags = TeamTypeFlags::from_bits_truncate(r.u8()?);
        let max_allowed = r.u8()?;
        let recruit_priority = r.u8()?;
        let class_count = r.u8()?;
        let mut members = [TeamMember::default(); MAX_TEAM_CLASSES];
        for m in &mut members {
            m.kind = r.u8()?;
            m.type_id = r.u8()?;
            m.quantity = r.u8()?;
        }
        Ok(TeamTypeClass {
            name,
            house,
            flags,
            max_allowed,
            recruit_priority,
            class_count,
            members,
            mission_count: r.u8()?,
        })
    }
}

impl SimObject for TeamTypeClass {
    fn link(&self, _field: FieldId) -> Option<Link> {
        None
    }

    fn link_mut(&mut self, _field: FieldId) -> Option<&mut Link> {
        None
    }
}

// ============================================================
// TeamClass
// ============================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TeamClass {
    /// The template this team was built from.
    pub class: Link,
    pub house: Link,
    /// First member; the rest chain through `FootCore::member`.
    pub member: Link,
    pub target: Link,
    pub total: u8,
    pub risk: u8,
    pub is_forced_active: bool,
    pub current_mission: u8,
}

impl SaveImage for TeamClass {
    const KIND: Kind = Kind::Team;
    const IMAGE_SIZE: usize = IMAGE_HEADER_SIZE + 4 * LINK_SIZE + 4;

    fn write_fields(&self, w: &mut ImageWriter) -> SaveResult<()> {
        w.link("class", self.class)?;
        w.link("house", self.house)?;
        w.link("member", self.member)?;
        w.link("target", self.target)?;
        w.u8(self.total);
        w.u8(self.risk);
        w.bool(self.is_forced_active);
        w.u8(self.current_mission);
        Ok(())
    }

    fn read_fields(r: &mut ImageReader) -> SaveResult<Self> {
        Ok(TeamClass {
            class: r.link()?,
            house: r.link()?,
            member: r.link()?,
            target: r.link()?,
            total: r.u8()?,
            risk: r.u8()?,
            is_forced_active: r.bool()?,
            current_mission: r.u8()?,
        })
    }
}

impl SimObject for TeamClass {
    link_fields! {
        TeamClass => class,
        TeamHouse => house,
        TeamMember => member,
        TeamTarget => target,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ioobj::{build_image, parse_image};

    #[test]
    fn test_teamtype_image() {
        let mut tt = TeamTypeClass {
            house: HousesType::Bad,
            flags: TeamTypeFlags::AUTOCREATE | TeamTypeFlags::SUICIDE,
            class_count: 2,
            ..TeamTypeClass::default()
        };
        tt.set_name("ATK1");
        tt.members[1] = TeamMember { kind: Kind::Unit as u8, type_id: 3, quantity: 4 };

        let image = build_image(&tt).unwrap();
        assert_eq!(image.len(), TeamTypeClass::IMAGE_SIZE);
        let back: TeamTypeClass = parse_image(&image).unwrap();
        assert_eq!(back, tt);
        assert_eq!(back.name(), "ATK1");
    }

    #[test]
    fn test_team_link_fields() {
        let mut team = TeamClass::default();
        *team.link_mut(FieldId::TeamTarget).unwrap() = Link::Cell(77);
        assert_eq!(team.link(FieldId::TeamTarget), Some(Link::Cell(77)));
        assert_eq!(team.link(FieldId::House), None);
    }
}
