// trigger.rs: scenario event/action triggers

use crate::defines::{HousesType, Kind};
use crate::fields::FieldId;
use crate::ioobj::{ImageReader, ImageWriter, SaveImage, IMAGE_HEADER_SIZE, LINK_SIZE};
use crate::object::{link_fields, name_bytes, name_str, read_houses_type, SimObject};
use crate::save_error::{SaveError, SaveResult};
use crate::target::Link;

pub const TRIGGER_NAME_LEN: usize = 8;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerEvent {
    #[default]
    None = 0,
    PlayerEntered,
    Discovered,
    Attacked,
    Destroyed,
    AnyEvent,
    UnitsDestroyed,
    BuildingsDestroyed,
    AllDestroyed,
    Credits,
    Time,
    NoFactories,
    CiviliansEvacuated,
    BuildBuilding,
}

impl TriggerEvent {
    pub fn from_u8(v: u8) -> Option<TriggerEvent> {
        use TriggerEvent::*;
        [
            None, PlayerEntered, Discovered, Attacked, Destroyed, AnyEvent, UnitsDestroyed,
            BuildingsDestroyed, AllDestroyed, Credits, Time, NoFactories, CiviliansEvacuated,
            BuildBuilding,
        ]
        .get(v as usize)
        .copied()
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerAction {
    #[default]
    None = 0,
    Win,
    Lose,
    BeginProduction,
    CreateTeam,
    DestroyTeam,
    AllHunt,
    Reinforcement,
    Airstrike,
    Nuke,
    Autocreate,
}

impl TriggerAction {
    pub fn from_u8(v: u8) -> Option<TriggerAction> {
        use TriggerAction::*;
        [
            None, Win, Lose, BeginProduction, CreateTeam, DestroyTeam, AllHunt, Reinforcement,
            Airstrike, Nuke, Autocreate,
        ]
        .get(v as usize)
        .copied()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriggerClass {
    pub name: [u8; TRIGGER_NAME_LEN],
    pub event: TriggerEvent,
    pub action: TriggerAction,
    pub house: HousesType,
    /// Team template created or destroyed by the action.
    pub team: Link,
    pub is_persistent: bool,
    pub data: i32,
}

impl TriggerClass {
    pub fn name(&self) -> String {
        name_str(&self.name)
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name_bytes(name);
    }
}

impl SaveImage for TriggerClass {
    const KIND: Kind = Kind::Trigger;
    const IMAGE_SIZE: usize = IMAGE_HEADER_SIZE + TRIGGER_NAME_LEN + 3 + LINK_SIZE + 1 + 4;

    fn write_fields(&self, w: &mut ImageWriter) -> SaveResult<()> {
        w.bytes(&self.name);
        w.u8(self.event as u8);
        w.u8(self.action as u8);
        w.u8(self.house as u8);
        w.link("team", self.team)?;
        w.bool(self.is_persistent);
        w.i32(self.data);
        Ok(())
    }

    fn read_fields(r: &mut ImageReader) -> SaveResult<Self> {
        let name = r.bytes::<TRIGGER_NAME_LEN>()?;
        let event = r.u8()?;
        let event = TriggerEvent::from_u8(event)
            .ok_or_else(|| SaveError::InvalidData(format!("bad trigger event {}", event)))?;
        let action = r.u8()?;
        let action = TriggerAction::from_u8(action)
            .ok_or_else(|| SaveError::InvalidData(format!("bad trigger action {}", action)))?;
        Ok(TriggerClass {
            name,
            event,
            action,
            house: read_houses_type(r)?,
            team: r.link()?,
            is_persistent: r.bool()?,
            data: r.i32()?,
        })
    }
}

impl SimObject for TriggerClass {
    link_fields! {
        TriggerTeam => team,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ioobj::{build_image, parse_image};
    use crate::target::Target;

    #[test]
    fn test_trigger_image() {
        let mut trig = TriggerClass {
            event: TriggerEvent::Time,
            action: TriggerAction::CreateTeam,
            house: HousesType::Bad,
            team: Link::Coded(Target::build(Kind::TeamType, 3)),
            is_persistent: true,
            data: 120,
            ..TriggerClass::default()
        };
        trig.set_name("tm1");
        let image = build_image(&trig).unwrap();
        assert_eq!(image.len(), TriggerClass::IMAGE_SIZE);
        assert_eq!(parse_image::<TriggerClass>(&image).unwrap(), trig);
    }

    #[test]
    fn test_bad_event_rejected() {
        let trig = TriggerClass::default();
        let mut image = build_image(&trig).unwrap();
        image[2 + TRIGGER_NAME_LEN] = 200;
        assert!(parse_image::<TriggerClass>(&image).is_err());
    }
}
