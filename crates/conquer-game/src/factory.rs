// factory.rs: production in progress

use crate::defines::Kind;
use crate::fields::FieldId;
use crate::ioobj::{ImageReader, ImageWriter, SaveImage, IMAGE_HEADER_SIZE, LINK_SIZE};
use crate::object::{link_fields, SimObject};
use crate::save_error::SaveResult;
use crate::target::Link;

/// Production steps from start to completion.
pub const STEP_COUNT: i16 = 54;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactoryClass {
    /// The object under construction, held in limbo until done.
    pub object: Link,
    pub house: Link,
    pub is_suspended: bool,
    /// Credits still owed for the object.
    pub balance: i32,
    pub stage: i16,
}

impl FactoryClass {
    pub fn is_completed(&self) -> bool {
        self.stage >= STEP_COUNT
    }

    pub fn completion(&self) -> i32 {
        (self.stage.clamp(0, STEP_COUNT) as i32 * 100) / STEP_COUNT as i32
    }
}

impl SaveImage for FactoryClass {
    const KIND: Kind = Kind::Factory;
    const IMAGE_SIZE: usize = IMAGE_HEADER_SIZE + 2 * LINK_SIZE + 1 + 4 + 2;

    fn write_fields(&self, w: &mut ImageWriter) -> SaveResult<()> {
        w.link("object", self.object)?;
        w.link("house", self.house)?;
        w.bool(self.is_suspended);
        w.i32(self.balance);
        w.i16(self.stage);
        Ok(())
    }

    fn read_fields(r: &mut ImageReader) -> SaveResult<Self> {
        Ok(FactoryClass {
            object: r.link()?,
            house: r.link()?,
            is_suspended: r.bool()?,
            balance: r.i32()?,
            stage: r.i16()?,
        })
    }
}

impl SimObject for FactoryClass {
    link_fields! {
        FactoryObject => object,
        FactoryHouse => house,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ioobj::{build_image, parse_image};
    use crate::target::Target;

    #[test]
    fn test_factory_image() {
        let f = FactoryClass {
            object: Link::Coded(Target::build(Kind::Unit, 8)),
            house: Link::Coded(Target::build(Kind::House, 0)),
            balance: 700,
            stage: 27,
            ..FactoryClass::default()
        };
        let image = build_image(&f).unwrap();
        assert_eq!(image.len(), FactoryClass::IMAGE_SIZE);
        assert_eq!(parse_image::<FactoryClass>(&image).unwrap(), f);
        assert_eq!(f.completion(), 50);
        assert!(!f.is_completed());
    }
}
