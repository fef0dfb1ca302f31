// terrain.rs: overlays, smudges, templates and terrain objects

use crate::defines::Kind;
use crate::fields::FieldId;
use crate::ioobj::{ImageReader, ImageWriter, SaveImage, IMAGE_HEADER_SIZE};
use crate::object::{link_fields, ObjectCore, SimObject};
use crate::save_error::SaveResult;
use crate::target::Link;

/// Map decorations that are nothing more than an object plus a type byte.
macro_rules! decoration {
    ($name:ident, $kind:expr, $type_field:ident) => {
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct $name {
            pub object: ObjectCore,
            pub $type_field: u8,
        }

        impl SaveImage for $name {
            const KIND: Kind = $kind;
            const IMAGE_SIZE: usize = IMAGE_HEADER_SIZE + ObjectCore::IMAGE_SIZE + 1;

            fn write_fields(&self, w: &mut ImageWriter) -> SaveResult<()> {
                self.object.write(w)?;
                w.u8(self.$type_field);
                Ok(())
            }

            fn read_fields(r: &mut ImageReader) -> SaveResult<Self> {
                Ok($name {
                    object: ObjectCore::read(r)?,
                    $type_field: r.u8()?,
                })
            }
        }

        impl SimObject for $name {
            link_fields! {
                Next => object.next,
                Trigger => object.trigger,
            }
        }
    };
}

decoration!(OverlayClass, Kind::Overlay, overlay_type);
decoration!(SmudgeClass, Kind::Smudge, smudge_type);
decoration!(TemplateClass, Kind::Template, template_type);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TerrainClass {
    pub object: ObjectCore,
    pub terrain_type: u8,
    pub is_on_fire: bool,
}

impl SaveImage for TerrainClass {
    const KIND: Kind = Kind::Terrain;
    const IMAGE_SIZE: usize = IMAGE_HEADER_SIZE + ObjectCore::IMAGE_SIZE + 2;

    fn write_fields(&self, w: &mut ImageWriter) -> SaveResult<()> {
        self.object.write(w)?;
        w.u8(self.terrain_type);
        w.bool(self.is_on_fire);
        Ok(())
    }

    fn read_fields(r: &mut ImageReader) -> SaveResult<Self> {
        Ok(TerrainClass {
            object: ObjectCore::read(r)?,
            terrain_type: r.u8()?,
            is_on_fire: r.bool()?,
        })
    }
}

impl SimObject for TerrainClass {
    link_fields! {
        Next => object.next,
        Trigger => object.trigger,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ioobj::{build_image, parse_image};

    #[test]
    fn test_decoration_images_are_tagged_by_kind() {
        let smudge = SmudgeClass { smudge_type: 5, ..SmudgeClass::default() };
        let image = build_image(&smudge).unwrap();
        assert_eq!(image[0], Kind::Smudge as u8);
        assert_eq!(image.len(), SmudgeClass::IMAGE_SIZE);
        assert_eq!(parse_image::<SmudgeClass>(&image).unwrap().smudge_type, 5);
        assert!(parse_image::<OverlayClass>(&image).is_err());
    }

    #[test]
    fn test_terrain_image() {
        let tree = TerrainClass { terrain_type: 12, is_on_fire: true, ..TerrainClass::default() };
        let image = build_image(&tree).unwrap();
        assert_eq!(parse_image::<TerrainClass>(&image).unwrap(), tree);
    }
}
