// techno.rs: aircraft, infantry, vehicles and buildings

use crate::defines::{Kind, MAP_CELL_W};
use crate::fields::FieldId;
use crate::ioobj::{ImageReader, ImageWriter, SaveImage, IMAGE_HEADER_SIZE, LINK_SIZE};
use crate::object::{link_fields, FootCore, ObjectCore, SimObject, TechnoCore};
use crate::save_error::{SaveError, SaveResult};
use crate::target::Link;

// ============================================================
// AircraftClass
// ============================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AircraftClass {
    pub object: ObjectCore,
    pub techno: TechnoCore,
    pub foot: FootCore,
    pub aircraft_type: u8,
    pub altitude: i16,
    pub is_landing: bool,
}

impl SaveImage for AircraftClass {
    const KIND: Kind = Kind::Aircraft;
    const IMAGE_SIZE: usize =
        IMAGE_HEADER_SIZE + ObjectCore::IMAGE_SIZE + TechnoCore::IMAGE_SIZE + FootCore::IMAGE_SIZE + 4;

    fn write_fields(&self, w: &mut ImageWriter) -> SaveResult<()> {
        self.object.write(w)?;
        self.techno.write(w)?;
        self.foot.write(w)?;
        w.u8(self.aircraft_type);
        w.i16(self.altitude);
        w.bool(self.is_landing);
        Ok(())
    }

    fn read_fields(r: &mut ImageReader) -> SaveResult<Self> {
        Ok(AircraftClass {
            object: ObjectCore::read(r)?,
            techno: TechnoCore::read(r)?,
            foot: FootCore::read(r)?,
            aircraft_type: r.u8()?,
            altitude: r.i16()?,
            is_landing: r.bool()?,
        })
    }
}

impl SimObject for AircraftClass {
    link_fields! {
        Next => object.next,
        Trigger => object.trigger,
        House => techno.house,
        CargoHold => techno.cargo_hold,
        Radio => techno.radio,
        TarCom => techno.tar_com,
        Team => foot.team,
        Member => foot.member,
        NavCom => foot.nav_com,
    }
}

// ============================================================
// InfantryClass
// ============================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InfantryClass {
    pub object: ObjectCore,
    pub techno: TechnoCore,
    pub foot: FootCore,
    pub infantry_type: u8,
    pub fear: u8,
    pub is_prone: bool,
}

impl SaveImage for InfantryClass {
    const KIND: Kind = Kind::Infantry;
    const IMAGE_SIZE: usize =
        IMAGE_HEADER_SIZE + ObjectCore::IMAGE_SIZE + TechnoCore::IMAGE_SIZE + FootCore::IMAGE_SIZE + 3;

    fn write_fields(&self, w: &mut ImageWriter) -> SaveResult<()> {
        self.object.write(w)?;
        self.techno.write(w)?;
        self.foot.write(w)?;
        w.u8(self.infantry_type);
        w.u8(self.fear);
        w.bool(self.is_prone);
        Ok(())
    }

    fn read_fields(r: &mut ImageReader) -> SaveResult<Self> {
        Ok(InfantryClass {
            object: ObjectCore::read(r)?,
            techno: TechnoCore::read(r)?,
            foot: FootCore::read(r)?,
            infantry_type: r.u8()?,
            fear: r.u8()?,
            is_prone: r.bool()?,
        })
    }
}

impl SimObject for InfantryClass {
    link_fields! {
        Next => object.next,
        Trigger => object.trigger,
        House => techno.house,
        CargoHold => techno.cargo_hold,
        Radio => techno.radio,
        TarCom => techno.tar_com,
        Team => foot.team,
        Member => foot.member,
        NavCom => foot.nav_com,
    }
}

// ============================================================
// UnitClass
// ============================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitClass {
    pub object: ObjectCore,
    pub techno: TechnoCore,
    pub foot: FootCore,
    pub unit_type: u8,
    pub tiberium: u8,
    pub is_harvesting: bool,
}

impl SaveImage for UnitClass {
    const KIND: Kind = Kind::Unit;
    const IMAGE_SIZE: usize =
        IMAGE_HEADER_SIZE + ObjectCore::IMAGE_SIZE + TechnoCore::IMAGE_SIZE + FootCore::IMAGE_SIZE + 3;

    fn write_fields(&self, w: &mut ImageWriter) -> SaveResult<()> {
        self.object.write(w)?;
        self.techno.write(w)?;
        self.foot.write(w)?;
        w.u8(self.unit_type);
        w.u8(self.tiberium);
        w.bool(self.is_harvesting);
        Ok(())
    }

    fn read_fields(r: &mut ImageReader) -> SaveResult<Self> {
        Ok(UnitClass {
            object: ObjectCore::read(r)?,
            techno: TechnoCore::read(r)?,
            foot: FootCore::read(r)?,
            unit_type: r.u8()?,
            tiberium: r.u8()?,
            is_harvesting: r.bool()?,
        })
    }
}

impl SimObject for UnitClass {
    link_fields! {
        Next => object.next,
        Trigger => object.trigger,
        House => techno.house,
        CargoHold => techno.cargo_hold,
        Radio => techno.radio,
        TarCom => techno.tar_com,
        Team => foot.team,
        Member => foot.member,
        NavCom => foot.nav_com,
    }
}

// ============================================================
// BuildingClass
// ============================================================

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildingType {
    #[default]
    Power = 0,
    Barracks,
    Refinery,
    Weapons,
    Construction,
    Tower,
    Helipad,
}

impl BuildingType {
    pub const ALL: [BuildingType; 7] = [
        BuildingType::Power,
        BuildingType::Barracks,
        BuildingType::Refinery,
        BuildingType::Weapons,
        BuildingType::Construction,
        BuildingType::Tower,
        BuildingType::Helipad,
    ];

    pub fn from_u8(v: u8) -> Option<BuildingType> {
        BuildingType::ALL.get(v as usize).copied()
    }

    /// Cells covered by the building, as offsets from its top-left cell.
    pub fn occupy_list(self) -> &'static [i16] {
        const W: i16 = MAP_CELL_W as i16;
        match self {
            BuildingType::Tower => &[0],
            BuildingType::Power | BuildingType::Barracks | BuildingType::Helipad => &[0, 1, W, W + 1],
            BuildingType::Weapons => &[0, 1, 2, W, W + 1, W + 2],
            BuildingType::Refinery | BuildingType::Construction => {
                &[0, 1, 2, W, W + 1, W + 2, 2 * W, 2 * W + 1, 2 * W + 2]
            }
        }
    }

    pub fn is_factory(self) -> bool {
        matches!(self, BuildingType::Barracks | BuildingType::Weapons | BuildingType::Helipad)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildingClass {
    pub object: ObjectCore,
    pub techno: TechnoCore,
    pub building_type: BuildingType,
    /// Production in progress, if this is a factory building.
    pub factory: Link,
    pub power: i16,
    pub is_repairing: bool,
}

impl SaveImage for BuildingClass {
    const KIND: Kind = Kind::Building;
    const IMAGE_SIZE: usize =
        IMAGE_HEADER_SIZE + ObjectCore::IMAGE_SIZE + TechnoCore::IMAGE_SIZE + 1 + LINK_SIZE + 2 + 1;

    fn write_fields(&self, w: &mut ImageWriter) -> SaveResult<()> {
        self.object.write(w)?;
        self.techno.write(w)?;
        w.u8(self.building_type as u8);
        w.link("factory", self.factory)?;
        w.i16(self.power);
        w.bool(self.is_repairing);
        Ok(())
    }

    fn read_fields(r: &mut ImageReader) -> SaveResult<Self> {
        let object = ObjectCore::read(r)?;
        let techno = TechnoCore::read(r)?;
        let bt = r.u8()?;
        let building_type = BuildingType::from_u8(bt)
            .ok_or_else(|| SaveError::InvalidData(format!("bad building type {}", bt)))?;
        Ok(BuildingClass {
            object,
            techno,
            building_type,
            factory: r.link()?,
            power: r.i16()?,
            is_repairing: r.bool()?,
        })
    }
}

impl SimObject for BuildingClass {
    link_fields! {
        Next => object.next,
        Trigger => object.trigger,
        House => techno.house,
        CargoHold => techno.cargo_hold,
        Radio => techno.radio,
        TarCom => techno.tar_com,
        Factory => factory,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::fields_for;
    use crate::ioobj::{build_image, parse_image};
    use crate::target::Target;

    fn coded(kind: Kind, index: usize) -> Link {
        Link::Coded(Target::build(kind, index))
    }

    #[test]
    fn test_every_listed_field_is_reachable() {
        fn check<T: SimObject>() {
            let mut obj = T::default();
            for desc in fields_for(T::KIND) {
                assert!(obj.link(desc.field).is_some(), "{}.{}", T::KIND, desc.name);
                assert!(obj.link_mut(desc.field).is_some(), "{}.{}", T::KIND, desc.name);
            }
        }
        check::<AircraftClass>();
        check::<InfantryClass>();
        check::<UnitClass>();
        check::<BuildingClass>();
    }

    #[test]
    fn test_unit_image() {
        let mut unit = UnitClass { unit_type: 4, tiberium: 17, is_harvesting: true, ..UnitClass::default() };
        unit.object.coord = 0x0A0B_0C0D;
        unit.techno.house = coded(Kind::House, 1);
        unit.foot.team = coded(Kind::Team, 2);
        unit.foot.nav_com = Link::Coded(Target::cell(130));

        let image = build_image(&unit).unwrap();
        assert_eq!(image.len(), UnitClass::IMAGE_SIZE);
        assert_eq!(parse_image::<UnitClass>(&image).unwrap(), unit);
    }

    #[test]
    fn test_building_image_and_factory_link() {
        let mut b = BuildingClass { building_type: BuildingType::Weapons, power: -20, ..BuildingClass::default() };
        *b.link_mut(FieldId::Factory).unwrap() = coded(Kind::Factory, 0);
        let image = build_image(&b).unwrap();
        assert_eq!(image.len(), BuildingClass::IMAGE_SIZE);
        let back: BuildingClass = parse_image(&image).unwrap();
        assert_eq!(back.factory, coded(Kind::Factory, 0));
        assert_eq!(back.building_type, BuildingType::Weapons);
    }

    #[test]
    fn test_occupy_lists() {
        assert_eq!(BuildingType::Tower.occupy_list(), &[0]);
        assert_eq!(BuildingType::Weapons.occupy_list().len(), 6);
        assert!(BuildingType::Construction.occupy_list().contains(&(2 * MAP_CELL_W as i16 + 2)));
        assert!(BuildingType::Barracks.is_factory());
        assert!(!BuildingType::Power.is_factory());
    }
}
