// object.rs: layers shared by every map object, and the pooled-object trait

use bitflags::bitflags;

use crate::defines::HousesType;
use crate::fields::FieldId;
use crate::ioobj::{ImageReader, ImageWriter, SaveImage, LINK_SIZE};
use crate::save_error::{SaveError, SaveResult};
use crate::target::Link;

/// A pooled simulation object whose reference fields the coder can visit.
pub trait SimObject: SaveImage + Default + Clone + Send + Sync + 'static {
    fn link(&self, field: FieldId) -> Option<Link>;
    fn link_mut(&mut self, field: FieldId) -> Option<&mut Link>;
}

/// Generates `link`/`link_mut` from a `FieldId => member.path` list.
macro_rules! link_fields {
    ($($id:ident => $($path:ident).+),* $(,)?) => {
        fn link(&self, field: FieldId) -> Option<Link> {
            match field {
                $(FieldId::$id => Some(self.$($path).+),)*
                _ => None,
            }
        }

        fn link_mut(&mut self, field: FieldId) -> Option<&mut Link> {
            match field {
                $(FieldId::$id => Some(&mut self.$($path).+),)*
                _ => None,
            }
        }
    };
}
pub(crate) use link_fields;

pub(crate) fn read_houses_type(r: &mut ImageReader) -> SaveResult<HousesType> {
    let v = r.u8()?;
    HousesType::from_u8(v).ok_or_else(|| SaveError::InvalidData(format!("bad house type {}", v)))
}

/// Fixed-length name field, NUL padded.
pub fn name_bytes<const N: usize>(name: &str) -> [u8; N] {
    let mut out = [0u8; N];
    let n = name.len().min(N);
    out[..n].copy_from_slice(&name.as_bytes()[..n]);
    out
}

pub fn name_str(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ObjectFlags: u8 {
        const IN_LIMBO  = 1 << 0;
        const IS_DOWN   = 1 << 1;
        const SELECTED  = 1 << 2;
        const ANIMATING = 1 << 3;
        const TO_DAMAGE = 1 << 4;
    }
}

// ============================================================
// ObjectClass layer
// ============================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectCore {
    pub coord: u32,
    pub strength: i16,
    pub flags: ObjectFlags,
    /// Next object in the same cell or layer chain.
    pub next: Link,
    pub trigger: Link,
}

impl ObjectCore {
    pub const IMAGE_SIZE: usize = 4 + 2 + 1 + 2 * LINK_SIZE;

    pub fn write(&self, w: &mut ImageWriter) -> SaveResult<()> {
        w.u32(self.coord);
        w.i16(self.strength);
        w.u8(self.flags.bits());
        w.link("next", self.next)?;
        w.link("trigger", self.trigger)
    }

    pub fn read(r: &mut ImageReader) -> SaveResult<Self> {
        Ok(ObjectCore {
            coord: r.u32()?,
            strength: r.i16()?,
            flags: ObjectFlags::from_bits_truncate(r.u8()?),
            next: r.link()?,
            trigger: r.link()?,
        })
    }

    pub fn is_in_limbo(&self) -> bool {
        self.flags.contains(ObjectFlags::IN_LIMBO)
    }
}

// ============================================================
// TechnoClass layer
// ============================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TechnoCore {
    pub house: Link,
    /// First passenger; further passengers chain through their `next`.
    pub cargo_hold: Link,
    /// Radio contact (a transport, a helipad, a repair bay...).
    pub radio: Link,
    pub tar_com: Link,
    pub ammo: i16,
}

impl TechnoCore {
    pub const IMAGE_SIZE: usize = 4 * LINK_SIZE + 2;

    pub fn write(&self, w: &mut ImageWriter) -> SaveResult<()> {
        w.link("house", self.house)?;
        w.link("cargo_hold", self.cargo_hold)?;
        w.link("radio", self.radio)?;
        w.link("tar_com", self.tar_com)?;
        w.i16(self.ammo);
        Ok(())
    }

    pub fn read(r: &mut ImageReader) -> SaveResult<Self> {
        Ok(TechnoCore {
            house: r.link()?,
            cargo_hold: r.link()?,
            radio: r.link()?,
            tar_com: r.link()?,
            ammo: r.i16()?,
        })
    }
}

// ============================================================
// FootClass layer
// ============================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FootCore {
    pub team: Link,
    /// Next member of the same team.
    pub member: Link,
    pub nav_com: Link,
    pub speed: u8,
}

impl FootCore {
    pub const IMAGE_SIZE: usize = 3 * LINK_SIZE + 1;

    pub fn write(&self, w: &mut ImageWriter) -> SaveResult<()> {
        w.link("team", self.team)?;
        w.link("member", self.member)?;
        w.link("nav_com", self.nav_com)?;
        w.u8(self.speed);
        Ok(())
    }

    pub fn read(r: &mut ImageReader) -> SaveResult<Self> {
        Ok(FootCore {
            team: r.link()?,
            member: r.link()?,
            nav_com: r.link()?,
            speed: r.u8()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defines::Kind;
    use crate::target::Target;

    #[test]
    fn test_core_sizes_match_writers() {
        let coded = Link::Coded(Target::NONE);
        let obj = ObjectCore { next: coded, trigger: coded, ..ObjectCore::default() };
        let techno = TechnoCore { house: coded, cargo_hold: coded, radio: coded, tar_com: coded, ammo: 3 };
        let foot = FootCore { team: coded, member: coded, nav_com: coded, speed: 9 };

        let mut w = ImageWriter::with_capacity(64);
        obj.write(&mut w).unwrap();
        assert_eq!(w.len(), ObjectCore::IMAGE_SIZE);
        techno.write(&mut w).unwrap();
        assert_eq!(w.len(), ObjectCore::IMAGE_SIZE + TechnoCore::IMAGE_SIZE);
        foot.write(&mut w).unwrap();
        assert_eq!(w.len(), ObjectCore::IMAGE_SIZE + TechnoCore::IMAGE_SIZE + FootCore::IMAGE_SIZE);
    }

    #[test]
    fn test_core_read_back() {
        let obj = ObjectCore {
            coord: 0x0102_0304,
            strength: -5,
            flags: ObjectFlags::SELECTED | ObjectFlags::IS_DOWN,
            next: Link::Coded(Target::build(Kind::Unit, 4)),
            trigger: Link::None,
        };
        let mut w = ImageWriter::with_capacity(16);
        obj.write(&mut w).unwrap();
        let bytes = w.into_inner();
        let back = ObjectCore::read(&mut ImageReader::new(&bytes)).unwrap();
        assert_eq!(back.coord, obj.coord);
        assert_eq!(back.flags, obj.flags);
        assert_eq!(back.next, obj.next);
        assert_eq!(back.trigger, Link::None);
    }

    #[test]
    fn test_names() {
        let n: [u8; 8] = name_bytes("ATTACK-LONGNAME");
        assert_eq!(&n, b"ATTACK-L");
        assert_eq!(name_str(&name_bytes::<8>("GDI1")), "GDI1");
    }
}
