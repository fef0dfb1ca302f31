// anim.rs: animations and projectiles

use crate::defines::Kind;
use crate::fields::FieldId;
use crate::ioobj::{ImageReader, ImageWriter, SaveImage, IMAGE_HEADER_SIZE, LINK_SIZE};
use crate::object::{link_fields, ObjectCore, SimObject};
use crate::save_error::SaveResult;
use crate::target::Link;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnimClass {
    pub object: ObjectCore,
    pub anim_type: u8,
    /// Object the animation is attached to and follows.
    pub attached: Link,
    /// Stand-in animation rendered in place of this one.
    pub virtual_anim: Link,
    pub loops: u8,
    pub delay: u8,
}

impl SaveImage for AnimClass {
    const KIND: Kind = Kind::Anim;
    const IMAGE_SIZE: usize = IMAGE_HEADER_SIZE + ObjectCore::IMAGE_SIZE + 1 + 2 * LINK_SIZE + 2;

    fn write_fields(&self, w: &mut ImageWriter) -> SaveResult<()> {
        self.object.write(w)?;
        w.u8(self.anim_type);
        w.link("object", self.attached)?;
        w.link("virtual", self.virtual_anim)?;
        w.u8(self.loops);
        w.u8(self.delay);
        Ok(())
    }

    fn read_fields(r: &mut ImageReader) -> SaveResult<Self> {
        Ok(AnimClass {
            object: ObjectCore::read(r)?,
            anim_type: r.u8()?,
            attached: r.link()?,
            virtual_anim: r.link()?,
            loops: r.u8()?,
            delay: r.u8()?,
        })
    }
}

impl SimObject for AnimClass {
    link_fields! {
        Next => object.next,
        Trigger => object.trigger,
        AnimObject => attached,
        VirtualAnim => virtual_anim,
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulletClass {
    pub object: ObjectCore,
    pub bullet_type: u8,
    /// Who fired it; credited with the kill.
    pub payback: Link,
    pub tar_com: Link,
    pub speed: u8,
}

impl SaveImage for BulletClass {
    const KIND: Kind = Kind::Bullet;
    const IMAGE_SIZE: usize = IMAGE_HEADER_SIZE + ObjectCore::IMAGE_SIZE + 1 + 2 * LINK_SIZE + 1;

    fn write_fields(&self, w: &mut ImageWriter) -> SaveResult<()> {
        self.object.write(w)?;
        w.u8(self.bullet_type);
        w.link("payback", self.payback)?;
        w.link("tar_com", self.tar_com)?;
        w.u8(self.speed);
        Ok(())
    }

    fn read_fields(r: &mut ImageReader) -> SaveResult<Self> {
        Ok(BulletClass {
            object: ObjectCore::read(r)?,
            bullet_type: r.u8()?,
            payback: r.link()?,
            tar_com: r.link()?,
            speed: r.u8()?,
        })
    }
}

impl SimObject for BulletClass {
    link_fields! {
        Next => object.next,
        Trigger => object.trigger,
        Payback => payback,
        BulletTarget => tar_com,
    }
}
