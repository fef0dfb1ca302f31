// ioobj.rs: fixed-size object images and pool regions

use log::debug;
use rayon::prelude::*;

use conquer_common::files::ByteStream;

use crate::defines::Kind;
use crate::heap::SlotPool;
use crate::save_error::{SaveError, SaveResult};
use crate::target::{Link, Target};

/// Above this many live objects a pool builds its images in parallel.
/// Below it, sequential serialization has less overhead.
pub const PARALLEL_SAVE_THRESHOLD: usize = 32;

/// Bytes every image starts with: the type tag and the active flag.
pub const IMAGE_HEADER_SIZE: usize = 2;

/// Bytes a link occupies in an image.
pub const LINK_SIZE: usize = 4;

// ============================================================
// Stream helpers
// ============================================================

pub fn write_bytes(stream: &mut dyn ByteStream, buf: &[u8]) -> SaveResult<()> {
    let n = stream.write(buf)?;
    if n != buf.len() {
        return Err(SaveError::ShortReadOrWrite { expected: buf.len(), actual: n });
    }
    Ok(())
}

pub fn read_bytes(stream: &mut dyn ByteStream, buf: &mut [u8]) -> SaveResult<()> {
    let n = stream.read(buf)?;
    if n != buf.len() {
        return Err(SaveError::ShortReadOrWrite { expected: buf.len(), actual: n });
    }
    Ok(())
}

pub fn write_i32(stream: &mut dyn ByteStream, val: i32) -> SaveResult<()> {
    write_bytes(stream, &val.to_le_bytes())
}

pub fn read_i32(stream: &mut dyn ByteStream) -> SaveResult<i32> {
    let mut buf = [0u8; 4];
    read_bytes(stream, &mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

pub fn write_u32(stream: &mut dyn ByteStream, val: u32) -> SaveResult<()> {
    write_bytes(stream, &val.to_le_bytes())
}

pub fn read_u32(stream: &mut dyn ByteStream) -> SaveResult<u32> {
    let mut buf = [0u8; 4];
    read_bytes(stream, &mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Reads a count that must be in `0..=max`.
pub fn read_count(stream: &mut dyn ByteStream, max: usize, what: &str) -> SaveResult<usize> {
    let count = read_i32(stream)?;
    if count < 0 || count as usize > max {
        return Err(SaveError::InvalidData(format!("{} count {} exceeds {}", what, count, max)));
    }
    Ok(count as usize)
}

/// Writes a link that the coder has already turned into a target.
pub fn write_link(stream: &mut dyn ByteStream, field: &'static str, link: Link) -> SaveResult<()> {
    write_u32(stream, coded_bits(field, link)?)
}

pub fn read_link(stream: &mut dyn ByteStream) -> SaveResult<Link> {
    Ok(link_from_bits(read_u32(stream)?))
}

/// The zero target was written for an empty link and reads back as one.
fn link_from_bits(bits: u32) -> Link {
    match Target::from_bits(bits) {
        Target::NONE => Link::None,
        target => Link::Coded(target),
    }
}

fn coded_bits(field: &'static str, link: Link) -> SaveResult<u32> {
    match link {
        Link::None => Ok(Target::NONE.to_bits()),
        Link::Coded(t) => Ok(t.to_bits()),
        Link::Live(_) | Link::Cell(_) => Err(SaveError::PointerState {
            field,
            detail: "live link reached the writer",
        }),
    }
}

// ============================================================
// Object images
// ============================================================

/// Builds one object's image.
pub struct ImageWriter {
    buf: Vec<u8>,
}

impl ImageWriter {
    pub fn with_capacity(n: usize) -> Self {
        Self { buf: Vec::with_capacity(n) }
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn bool(&mut self, v: bool) {
        self.buf.push(v as u8);
    }

    pub fn i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    pub fn link(&mut self, field: &'static str, link: Link) -> SaveResult<()> {
        let bits = coded_bits(field, link)?;
        self.u32(bits);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Walks one object's image. The image length has already been checked
/// against the compiled size, so running off the end means a layout bug
/// and is reported as invalid data rather than a panic.
pub struct ImageReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ImageReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> SaveResult<[u8; N]> {
        let end = self.pos + N;
        let slice = self
            .buf
            .get(self.pos..end)
            .ok_or_else(|| SaveError::InvalidData(format!("image ends at byte {}", self.buf.len())))?;
        self.pos = end;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    pub fn u8(&mut self) -> SaveResult<u8> {
        Ok(self.take::<1>()?[0])
    }

    pub fn bool(&mut self) -> SaveResult<bool> {
        Ok(self.u8()? != 0)
    }

    pub fn i16(&mut self) -> SaveResult<i16> {
        Ok(i16::from_le_bytes(self.take()?))
    }

    pub fn u16(&mut self) -> SaveResult<u16> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    pub fn i32(&mut self) -> SaveResult<i32> {
        Ok(i32::from_le_bytes(self.take()?))
    }

    pub fn u32(&mut self) -> SaveResult<u32> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    pub fn bytes<const N: usize>(&mut self) -> SaveResult<[u8; N]> {
        self.take()
    }

    pub fn link(&mut self) -> SaveResult<Link> {
        Ok(link_from_bits(self.u32()?))
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

/// An object with a fixed-size, self-describing save image.
///
/// `IMAGE_SIZE` counts the two header bytes (type tag and active flag)
/// written by `build_image`; the implementor only writes its own fields.
pub trait SaveImage: Sized {
    const KIND: Kind;
    const IMAGE_SIZE: usize;

    fn write_fields(&self, w: &mut ImageWriter) -> SaveResult<()>;
    fn read_fields(r: &mut ImageReader) -> SaveResult<Self>;
}

pub fn build_image<T: SaveImage>(obj: &T) -> SaveResult<Vec<u8>> {
    let mut w = ImageWriter::with_capacity(T::IMAGE_SIZE);
    w.u8(T::KIND as u8);
    w.bool(true);
    obj.write_fields(&mut w)?;
    if w.len() != T::IMAGE_SIZE {
        return Err(SaveError::ObjectSizeMismatch {
            kind: T::KIND,
            expected: T::IMAGE_SIZE,
            found: w.len() as i64,
        });
    }
    Ok(w.into_inner())
}

pub fn parse_image<T: SaveImage>(image: &[u8]) -> SaveResult<T> {
    let mut r = ImageReader::new(image);
    let tag = r.u8()?;
    if tag != T::KIND as u8 {
        return Err(SaveError::TypeTagMismatch { expected: T::KIND, found: tag });
    }
    if !r.bool()? {
        return Err(SaveError::InvalidData(format!("inactive {} image", T::KIND)));
    }
    let obj = T::read_fields(&mut r)?;
    if r.remaining() != 0 {
        return Err(SaveError::ObjectSizeMismatch {
            kind: T::KIND,
            expected: T::IMAGE_SIZE,
            found: (T::IMAGE_SIZE - r.remaining()) as i64,
        });
    }
    Ok(obj)
}

/// `[size: i32][image]`
pub fn write_object<T: SaveImage>(stream: &mut dyn ByteStream, obj: &T) -> SaveResult<()> {
    let image = build_image(obj)?;
    write_i32(stream, image.len() as i32)?;
    write_bytes(stream, &image)
}

/// Reads a size-prefixed image. A size that differs from this build's
/// image size means the file came from a different layout.
pub fn read_object<T: SaveImage>(stream: &mut dyn ByteStream) -> SaveResult<T> {
    let size = read_i32(stream)?;
    if size < 0 || size as usize != T::IMAGE_SIZE {
        return Err(SaveError::ObjectSizeMismatch {
            kind: T::KIND,
            expected: T::IMAGE_SIZE,
            found: size as i64,
        });
    }
    let mut image = vec![0u8; T::IMAGE_SIZE];
    read_bytes(stream, &mut image)?;
    parse_image(&image)
}

// ============================================================
// Pool regions
// ============================================================

fn serialize_slot_to_buffer<T: SaveImage>(index: usize, obj: &T) -> SaveResult<(usize, Vec<u8>)> {
    let image = build_image(obj)?;
    let mut buf = Vec::with_capacity(8 + image.len());
    buf.extend_from_slice(&(index as i32).to_le_bytes());
    buf.extend_from_slice(&(image.len() as i32).to_le_bytes());
    buf.extend_from_slice(&image);
    Ok((index, buf))
}

/// `[active_count: i32]` then `[index: i32][size: i32][image]` per live slot.
pub fn save_pool<T>(pool: &SlotPool<T>, stream: &mut dyn ByteStream, parallel: bool) -> SaveResult<()>
where
    T: SaveImage + Sync,
{
    let in_use = pool.active_indices();
    write_i32(stream, in_use.len() as i32)?;

    if parallel && in_use.len() > PARALLEL_SAVE_THRESHOLD {
        let mut serialized: Vec<(usize, Vec<u8>)> = in_use
            .par_iter()
            .filter_map(|&i| pool.get_index(i).map(|obj| (i, obj)))
            .map(|(i, obj)| serialize_slot_to_buffer(i, obj))
            .collect::<SaveResult<Vec<_>>>()?;

        // Deterministic order regardless of scheduling
        serialized.sort_by_key(|(idx, _)| *idx);

        for (_, buffer) in serialized {
            write_bytes(stream, &buffer)?;
        }
    } else {
        for (handle, obj) in pool.iter_active() {
            write_i32(stream, handle.index() as i32)?;
            write_object(stream, obj)?;
        }
    }

    debug!("saved {} {} objects", in_use.len(), T::KIND);
    Ok(())
}

/// Inverse of `save_pool`. The pool must already be empty.
pub fn load_pool<T>(pool: &mut SlotPool<T>, stream: &mut dyn ByteStream) -> SaveResult<()>
where
    T: SaveImage + Default,
{
    let count = read_count(stream, pool.capacity(), T::KIND.name())?;
    for _ in 0..count {
        let index = read_i32(stream)?;
        if index < 0 {
            return Err(SaveError::InvalidData(format!("negative {} index {}", T::KIND, index)));
        }
        let obj = read_object::<T>(stream)?;
        pool.allocate_at(index as usize, obj)?;
    }
    debug!("loaded {} {} objects", count, T::KIND);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use conquer_common::files::{MemFile, OpenMode};

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Crate {
        weight: i32,
        owner: Link,
        sealed: bool,
    }

    impl SaveImage for Crate {
        const KIND: Kind = Kind::Overlay;
        const IMAGE_SIZE: usize = IMAGE_HEADER_SIZE + 4 + LINK_SIZE + 1;

        fn write_fields(&self, w: &mut ImageWriter) -> SaveResult<()> {
            w.i32(self.weight);
            w.link("owner", self.owner)?;
            w.bool(self.sealed);
            Ok(())
        }

        fn read_fields(r: &mut ImageReader) -> SaveResult<Self> {
            Ok(Crate {
                weight: r.i32()?,
                owner: r.link()?,
                sealed: r.bool()?,
            })
        }
    }

    fn coded_crate(weight: i32) -> Crate {
        Crate {
            weight,
            owner: Link::Coded(Target::build(Kind::House, 2)),
            sealed: weight % 2 == 0,
        }
    }

    fn writer() -> MemFile {
        let mut m = MemFile::new();
        m.open(OpenMode::Write).unwrap();
        m
    }

    fn reader(m: &MemFile) -> MemFile {
        let mut r = m.share();
        r.open(OpenMode::Read).unwrap();
        r
    }

    #[test]
    fn test_write_object_layout() {
        let mut m = writer();
        write_object(&mut m, &coded_crate(-1)).unwrap();
        let bytes = m.contents();
        assert_eq!(bytes.len(), 4 + Crate::IMAGE_SIZE);
        assert_eq!(&bytes[0..4], &(Crate::IMAGE_SIZE as i32).to_le_bytes());
        assert_eq!(bytes[4], Kind::Overlay as u8);
        assert_eq!(bytes[5], 1);
        assert_eq!(&bytes[6..10], &(-1i32).to_le_bytes());

        let back: Crate = read_object(&mut reader(&m)).unwrap();
        assert_eq!(back, coded_crate(-1));
    }

    #[test]
    fn test_empty_link_reads_back_empty() {
        let mut m = writer();
        let empty = Crate { weight: 7, ..Crate::default() };
        write_object(&mut m, &empty).unwrap();
        write_link(&mut m, "owner", Link::None).unwrap();

        let mut r = reader(&m);
        let back: Crate = read_object(&mut r).unwrap();
        assert_eq!(back, empty);
        assert_eq!(back.owner, Link::None);
        assert_eq!(read_link(&mut r).unwrap(), Link::None);
    }

    #[test]
    fn test_live_link_is_rejected_by_writer() {
        let mut m = writer();
        let live = Crate {
            owner: Link::Cell(3),
            ..Crate::default()
        };
        assert!(matches!(
            write_object(&mut m, &live),
            Err(SaveError::PointerState { field: "owner", .. })
        ));
    }

    #[test]
    fn test_size_gate() {
        let mut m = writer();
        write_i32(&mut m, Crate::IMAGE_SIZE as i32 + 1).unwrap();
        write_bytes(&mut m, &[0u8; 32]).unwrap();
        match read_object::<Crate>(&mut reader(&m)) {
            Err(SaveError::ObjectSizeMismatch { kind, expected, found }) => {
                assert_eq!(kind, Kind::Overlay);
                assert_eq!(expected, Crate::IMAGE_SIZE);
                assert_eq!(found, Crate::IMAGE_SIZE as i64 + 1);
            }
            other => panic!("expected size mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_type_tag_gate() {
        let mut image = build_image(&coded_crate(4)).unwrap();
        image[0] = Kind::Smudge as u8;
        assert!(matches!(
            parse_image::<Crate>(&image),
            Err(SaveError::TypeTagMismatch { expected: Kind::Overlay, found }) if found == Kind::Smudge as u8
        ));
    }

    #[test]
    fn test_short_read() {
        let mut m = writer();
        write_i32(&mut m, Crate::IMAGE_SIZE as i32).unwrap();
        write_bytes(&mut m, &[Kind::Overlay as u8, 1, 0]).unwrap();
        assert!(matches!(
            read_object::<Crate>(&mut reader(&m)),
            Err(SaveError::ShortReadOrWrite { actual: 3, .. })
        ));
    }

    fn filled_pool(n: usize, capacity: usize) -> SlotPool<Crate> {
        let mut pool = SlotPool::new(Kind::Overlay, capacity);
        for i in 0..n {
            let h = pool.allocate().unwrap();
            *pool.get_mut(h).unwrap() = coded_crate(i as i32);
        }
        pool
    }

    #[test]
    fn test_pool_region_sparse_indices() {
        let mut pool = filled_pool(5, 8);
        let gone = pool.handle_at(1).unwrap();
        pool.free(gone);
        let gone = pool.handle_at(3).unwrap();
        pool.free(gone);

        let mut m = writer();
        save_pool(&pool, &mut m, false).unwrap();

        let mut loaded: SlotPool<Crate> = SlotPool::new(Kind::Overlay, 8);
        load_pool(&mut loaded, &mut reader(&m)).unwrap();
        assert_eq!(loaded.active_indices(), vec![0, 2, 4]);
        assert_eq!(loaded.get_index(4), pool.get_index(4));
    }

    #[test]
    fn test_parallel_and_sequential_regions_match() {
        let pool = filled_pool(PARALLEL_SAVE_THRESHOLD * 3, 128);
        let mut seq = writer();
        save_pool(&pool, &mut seq, false).unwrap();
        let mut par = writer();
        save_pool(&pool, &mut par, true).unwrap();
        assert_eq!(seq.contents(), par.contents());
    }

    #[test]
    fn test_region_count_over_capacity() {
        let pool = filled_pool(4, 4);
        let mut m = writer();
        save_pool(&pool, &mut m, false).unwrap();

        let mut small: SlotPool<Crate> = SlotPool::new(Kind::Overlay, 3);
        assert!(matches!(
            load_pool(&mut small, &mut reader(&m)),
            Err(SaveError::InvalidData(_))
        ));
    }
}
