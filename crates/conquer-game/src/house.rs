// house.rs: player and computer sides

use crate::defines::{HousesType, Kind};
use crate::fields::FieldId;
use crate::ioobj::{ImageReader, ImageWriter, SaveImage, IMAGE_HEADER_SIZE};
use crate::object::{read_houses_type, SimObject};
use crate::save_error::SaveResult;
use crate::target::{Handle, Link};

/// Counts rebuilt from the object pools after every load; never saved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitTrackers {
    pub aircraft: u16,
    pub infantry: u16,
    pub units: u16,
    pub buildings: u16,
}

impl UnitTrackers {
    /// Counts one more object of `kind`; anything that is not a foot
    /// soldier, vehicle or aircraft counts as a building. Sticks at the
    /// top of the range.
    pub fn count(&mut self, kind: Kind) {
        let n = match kind {
            Kind::Aircraft => &mut self.aircraft,
            Kind::Infantry => &mut self.infantry,
            Kind::Unit => &mut self.units,
            _ => &mut self.buildings,
        };
        *n = n.saturating_add(1);
    }

    pub fn total(&self) -> u32 {
        self.aircraft as u32 + self.infantry as u32 + self.units as u32 + self.buildings as u32
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HouseClass {
    pub house_type: HousesType,
    pub credits: i32,
    /// Bit per `HousesType`.
    pub allies: u16,
    pub is_human: bool,
    pub is_defeated: bool,
    pub enemy: Option<HousesType>,

    pub trackers: UnitTrackers,
    /// Triggers owned by this house, rebuilt after load.
    pub triggers: Vec<Handle>,
}

const NO_ENEMY: u8 = 0xFF;

impl HouseClass {
    pub fn is_ally(&self, other: HousesType) -> bool {
        self.allies & (1 << other as u16) != 0
    }

    pub fn make_ally(&mut self, other: HousesType) {
        self.allies |= 1 << other as u16;
    }
}

impl SaveImage for HouseClass {
    const KIND: Kind = Kind::House;
    const IMAGE_SIZE: usize = IMAGE_HEADER_SIZE + 1 + 4 + 2 + 1 + 1 + 1;

    fn write_fields(&self, w: &mut ImageWriter) -> SaveResult<()> {
        w.u8(self.house_type as u8);
        w.i32(self.credits);
        w.u16(self.allies);
        w.bool(self.is_human);
        w.bool(self.is_defeated);
        w.u8(self.enemy.map_or(NO_ENEMY, |h| h as u8));
        Ok(())
    }

    fn read_fields(r: &mut ImageReader) -> SaveResult<Self> {
        let house_type = read_houses_type(r)?;
        let credits = r.i32()?;
        let allies = r.u16()?;
        let is_human = r.bool()?;
        let is_defeated = r.bool()?;
        let enemy = match r.u8()? {
            NO_ENEMY => None,
            v => HousesType::from_u8(v),
        };
        Ok(HouseClass {
            house_type,
            credits,
            allies,
            is_human,
            is_defeated,
            enemy,
            ..HouseClass::default()
        })
    }
}

impl SimObject for HouseClass {
    fn link(&self, _field: FieldId) -> Option<Link> {
        None
    }

    fn link_mut(&mut self, _field: FieldId) -> Option<&mut Link> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ioobj::{build_image, parse_image};

    #[test]
    fn test_trackers_saturate() {
        let mut t = UnitTrackers { infantry: u16::MAX - 1, ..UnitTrackers::default() };
        for _ in 0..3 {
            t.count(Kind::Infantry);
        }
        t.count(Kind::Building);
        t.count(Kind::Aircraft);
        assert_eq!(t.infantry, u16::MAX);
        assert_eq!(t.buildings, 1);
        assert_eq!(t.aircraft, 1);
        assert_eq!(t.total(), u16::MAX as u32 + 2);
    }

    #[test]
    fn test_house_image_skips_runtime_state() {
        let mut house = HouseClass {
            house_type: HousesType::Bad,
            credits: 5000,
            is_human: false,
            enemy: Some(HousesType::Good),
            ..HouseClass::default()
        };
        house.make_ally(HousesType::Neutral);
        house.trackers.units = 12;

        let image = build_image(&house).unwrap();
        assert_eq!(image.len(), HouseClass::IMAGE_SIZE);
        let back: HouseClass = parse_image(&image).unwrap();
        assert_eq!(back.house_type, HousesType::Bad);
        assert_eq!(back.enemy, Some(HousesType::Good));
        assert!(back.is_ally(HousesType::Neutral));
        assert_eq!(back.trackers, UnitTrackers::default());
    }
}
