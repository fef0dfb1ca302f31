// map.rs: the cell grid, pending placement and display layers

use std::io::SeekFrom;

use bitflags::bitflags;
use log::debug;

use conquer_common::files::ByteStream;

use crate::defines::{Kind, LayerType, Theater, MAP_CELL_TOTAL, MAP_CELL_W, OVERLAPPER_COUNT};
use crate::fields::FieldId;
use crate::ioobj::{
    read_bytes, read_count, read_link, read_object, read_u32, write_bytes, write_i32, write_link,
    write_object, write_u32, ImageReader, ImageWriter, SaveImage, IMAGE_HEADER_SIZE, LINK_SIZE,
};
use crate::object::SimObject;
use crate::save_error::{SaveError, SaveResult};
use crate::target::Link;
use crate::techno::BuildingType;

pub const TEMPLATE_NONE: u8 = 0xFF;
pub const OVERLAY_NONE: u8 = 0xFF;
pub const SMUDGE_NONE: u8 = 0xFF;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CellFlags: u8 {
        const IS_MAPPED   = 1 << 0;
        const IS_VISIBLE  = 1 << 1;
        /// A trigger is attached; its target follows the cell image.
        const IS_TRIGGER  = 1 << 2;
        const IS_WAYPOINT = 1 << 3;
        const HAS_FLAG    = 1 << 4;
    }
}

// ============================================================
// CellClass
// ============================================================

#[derive(Debug, Clone, PartialEq)]
pub struct CellClass {
    pub flags: CellFlags,
    pub template_type: u8,
    pub icon: u8,
    pub overlay: u8,
    pub overlay_data: u8,
    pub smudge: u8,
    /// Object standing in the cell; further occupants chain through `next`.
    pub occupier: Link,
    /// Objects whose graphics spill over into this cell.
    pub overlappers: [Link; OVERLAPPER_COUNT],
    /// Saved outside the image, and only when `IS_TRIGGER` is set.
    pub trigger: Link,
}

impl Default for CellClass {
    fn default() -> Self {
        CellClass {
            flags: CellFlags::empty(),
            template_type: TEMPLATE_NONE,
            icon: 0,
            overlay: OVERLAY_NONE,
            overlay_data: 0,
            smudge: SMUDGE_NONE,
            occupier: Link::None,
            overlappers: [Link::None; OVERLAPPER_COUNT],
            trigger: Link::None,
        }
    }
}

impl CellClass {
    /// Only cells that differ from a blank cell go into the save file.
    pub fn should_save(&self) -> bool {
        self.smudge != SMUDGE_NONE
            || self.template_type != TEMPLATE_NONE
            || self.overlay != OVERLAY_NONE
            || !self.flags.is_empty()
            || !self.occupier.is_none()
            || self.overlappers.iter().any(|l| !l.is_none())
    }

    pub fn set_trigger(&mut self, trigger: Link) {
        self.flags.set(CellFlags::IS_TRIGGER, !trigger.is_none());
        self.trigger = trigger;
    }

    /// Adds an overlapper in the first free slot; false when all are taken.
    pub fn add_overlapper(&mut self, obj: Link) -> bool {
        match self.overlappers.iter_mut().find(|l| l.is_none()) {
            Some(slot) => {
                *slot = obj;
                true
            }
            None => false,
        }
    }
}

impl SaveImage for CellClass {
    const KIND: Kind = Kind::Cell;
    const IMAGE_SIZE: usize = IMAGE_HEADER_SIZE + 6 + (1 + OVERLAPPER_COUNT) * LINK_SIZE;

    fn write_fields(&self, w: &mut ImageWriter) -> SaveResult<()> {
        w.u8(self.flags.bits());
        w.u8(self.template_type);
        w.u8(self.icon);
        w.u8(self.overlay);
        w.u8(self.overlay_data);
        w.u8(self.smudge);
        w.link("occupier", self.occupier)?;
        for o in &self.overlappers {
            w.link("overlapper", *o)?;
        }
        Ok(())
    }

    fn read_fields(r: &mut ImageReader) -> SaveResult<Self> {
        let mut cell = CellClass {
            flags: CellFlags::from_bits_truncate(r.u8()?),
            template_type: r.u8()?,
            icon: r.u8()?,
            overlay: r.u8()?,
            overlay_data: r.u8()?,
            smudge: r.u8()?,
            occupier: r.link()?,
            ..CellClass::default()
        };
        for o in cell.overlappers.iter_mut() {
            *o = r.link()?;
        }
        Ok(cell)
    }
}

impl SimObject for CellClass {
    fn link(&self, field: FieldId) -> Option<Link> {
        match field {
            FieldId::Occupier => Some(self.occupier),
            FieldId::Overlapper0 => Some(self.overlappers[0]),
            FieldId::Overlapper1 => Some(self.overlappers[1]),
            FieldId::Overlapper2 => Some(self.overlappers[2]),
            FieldId::CellTrigger => Some(self.trigger),
            _ => None,
        }
    }

    fn link_mut(&mut self, field: FieldId) -> Option<&mut Link> {
        match field {
            FieldId::Occupier => Some(&mut self.occupier),
            FieldId::Overlapper0 => Some(&mut self.overlappers[0]),
            FieldId::Overlapper1 => Some(&mut self.overlappers[1]),
            FieldId::Overlapper2 => Some(&mut self.overlappers[2]),
            FieldId::CellTrigger => Some(&mut self.trigger),
            _ => None,
        }
    }
}

// ============================================================
// Map header
// ============================================================

/// Scalar map state plus the object waiting to be placed by the player.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapHeader {
    pub map_x: u8,
    pub map_y: u8,
    pub width: u8,
    pub height: u8,
    pub pending_object: Link,
}

impl SaveImage for MapHeader {
    const KIND: Kind = Kind::Special;
    const IMAGE_SIZE: usize = IMAGE_HEADER_SIZE + 4 + LINK_SIZE;

    fn write_fields(&self, w: &mut ImageWriter) -> SaveResult<()> {
        w.u8(self.map_x);
        w.u8(self.map_y);
        w.u8(self.width);
        w.u8(self.height);
        w.link("pending_object", self.pending_object)
    }

    fn read_fields(r: &mut ImageReader) -> SaveResult<Self> {
        Ok(MapHeader {
            map_x: r.u8()?,
            map_y: r.u8()?,
            width: r.u8()?,
            height: r.u8()?,
            pending_object: r.link()?,
        })
    }
}

// ============================================================
// Layers
// ============================================================

/// An ordered list of object references, e.g. the logic list or one of
/// the ground/air/top draw layers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerClass {
    pub entries: Vec<Link>,
}

impl LayerClass {
    pub fn add(&mut self, obj: Link) {
        if !obj.is_none() && !self.entries.contains(&obj) {
            self.entries.push(obj);
        }
    }

    pub fn remove(&mut self, obj: Link) -> bool {
        match self.entries.iter().position(|l| *l == obj) {
            Some(i) => {
                self.entries.remove(i);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// `[count: i32]` then one target per entry.
    pub fn save(&self, stream: &mut dyn ByteStream, field: &'static str) -> SaveResult<()> {
        write_i32(stream, self.entries.len() as i32)?;
        for link in &self.entries {
            write_link(stream, field, *link)?;
        }
        Ok(())
    }

    pub fn load(&mut self, stream: &mut dyn ByteStream, max: usize, what: &str) -> SaveResult<()> {
        let count = read_count(stream, max, what)?;
        self.entries.clear();
        self.entries.reserve(count);
        for _ in 0..count {
            self.entries.push(read_link(stream)?);
        }
        Ok(())
    }
}

// ============================================================
// MapClass
// ============================================================

#[derive(Debug, Clone, PartialEq)]
pub struct MapClass {
    pub theater: Theater,
    pub header: MapHeader,
    pub cells: Vec<CellClass>,
    /// Building type of the pending object, rebuilt after load.
    pub pending_type: Option<BuildingType>,
    /// Cells the placement cursor covers, rebuilt after load.
    pub cursor_occupy: Vec<i16>,
    pub layers: [LayerClass; LayerType::COUNT],
}

impl Default for MapClass {
    fn default() -> Self {
        MapClass {
            theater: Theater::default(),
            header: MapHeader::default(),
            cells: vec![CellClass::default(); MAP_CELL_TOTAL],
            pending_type: None,
            cursor_occupy: Vec::new(),
            layers: Default::default(),
        }
    }
}

pub fn cell_number(x: usize, y: usize) -> i16 {
    (y * MAP_CELL_W + x) as i16
}

impl MapClass {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets every cell and layer; keeps the allocation.
    pub fn clear(&mut self) {
        self.theater = Theater::default();
        self.header = MapHeader::default();
        for cell in self.cells.iter_mut() {
            *cell = CellClass::default();
        }
        self.pending_type = None;
        self.cursor_occupy.clear();
        for layer in self.layers.iter_mut() {
            layer.clear();
        }
    }

    pub fn cell(&self, cell: i16) -> Option<&CellClass> {
        usize::try_from(cell).ok().and_then(|c| self.cells.get(c))
    }

    pub fn cell_mut(&mut self, cell: i16) -> Option<&mut CellClass> {
        usize::try_from(cell).ok().and_then(move |c| self.cells.get_mut(c))
    }

    pub fn layer(&self, layer: LayerType) -> &LayerClass {
        &self.layers[layer as usize]
    }

    pub fn layer_mut(&mut self, layer: LayerType) -> &mut LayerClass {
        &mut self.layers[layer as usize]
    }

    pub fn saved_cell_count(&self) -> usize {
        self.cells.iter().filter(|c| c.should_save()).count()
    }

    /// Theater, header image, then the cells that need saving. The cell
    /// count is written as a placeholder and patched once it is known.
    pub fn save(&self, stream: &mut dyn ByteStream) -> SaveResult<()> {
        write_bytes(stream, &[self.theater as u8])?;
        write_object(stream, &self.header)?;

        let count_pos = stream.seek(SeekFrom::Current(0))?;
        write_u32(stream, 0)?;

        let mut count = 0u32;
        for (index, cell) in self.cells.iter().enumerate() {
            if !cell.should_save() {
                continue;
            }
            write_bytes(stream, &(index as i16).to_le_bytes())?;
            write_object(stream, cell)?;
            if cell.flags.contains(CellFlags::IS_TRIGGER) {
                write_link(stream, "cell_trigger", cell.trigger)?;
            }
            count += 1;
        }

        stream.seek(SeekFrom::Start(count_pos))?;
        write_u32(stream, count)?;
        stream.seek(SeekFrom::End(0))?;

        debug!("saved {} of {} cells", count, MAP_CELL_TOTAL);
        Ok(())
    }

    pub fn load(&mut self, stream: &mut dyn ByteStream) -> SaveResult<()> {
        let mut theater = [0u8; 1];
        read_bytes(stream, &mut theater)?;
        self.theater = Theater::from_u8(theater[0])
            .ok_or_else(|| SaveError::InvalidData(format!("bad theater {}", theater[0])))?;
        self.header = read_object(stream)?;

        let count = read_u32(stream)? as usize;
        if count > MAP_CELL_TOTAL {
            return Err(SaveError::InvalidData(format!("cell count {} exceeds {}", count, MAP_CELL_TOTAL)));
        }
        for _ in 0..count {
            let mut number = [0u8; 2];
            read_bytes(stream, &mut number)?;
            let number = i16::from_le_bytes(number);
            let mut cell: CellClass = read_object(stream)?;
            if cell.flags.contains(CellFlags::IS_TRIGGER) {
                cell.trigger = read_link(stream)?;
            }
            let slot = self
                .cell_mut(number)
                .ok_or_else(|| SaveError::InvalidData(format!("cell number {} out of range", number)))?;
            *slot = cell;
        }

        debug!("loaded {} cells", count);
        Ok(())
    }

    /// Ground, air and top layers, in that order.
    pub fn save_layers(&self, stream: &mut dyn ByteStream) -> SaveResult<()> {
        for layer in &self.layers {
            layer.save(stream, "layer")?;
        }
        Ok(())
    }

    pub fn load_layers(&mut self, stream: &mut dyn ByteStream, max: usize) -> SaveResult<()> {
        for layer in self.layers.iter_mut() {
            layer.load(stream, max, "layer")?;
        }
        Ok(())
    }
}

/// Reads a `[count][targets]` list of up to `max` entries; shared by the
/// selection lists in the globals block.
pub(crate) fn read_link_list(stream: &mut dyn ByteStream, max: usize, what: &str) -> SaveResult<Vec<Link>> {
    let count = read_count(stream, max, what)?;
    (0..count).map(|_| read_link(stream)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ioobj::{build_image, parse_image};
    use crate::target::Target;
    use conquer_common::files::{MemFile, OpenMode};

    fn coded(kind: Kind, index: usize) -> Link {
        Link::Coded(Target::build(kind, index))
    }

    #[test]
    fn test_blank_cell_is_not_saved() {
        let mut cell = CellClass::default();
        assert!(!cell.should_save());
        cell.icon = 7;
        assert!(!cell.should_save());
        cell.smudge = 2;
        assert!(cell.should_save());
    }

    #[test]
    fn test_cell_image() {
        let mut cell = CellClass { template_type: 3, icon: 9, ..CellClass::default() };
        cell.occupier = coded(Kind::Unit, 5);
        cell.overlappers[2] = coded(Kind::Anim, 1);
        let image = build_image(&cell).unwrap();
        assert_eq!(image.len(), CellClass::IMAGE_SIZE);
        assert_eq!(parse_image::<CellClass>(&image).unwrap(), cell);
    }

    #[test]
    fn test_overlapper_slots() {
        let mut cell = CellClass::default();
        for i in 0..OVERLAPPER_COUNT {
            assert!(cell.add_overlapper(coded(Kind::Anim, i)));
        }
        assert!(!cell.add_overlapper(coded(Kind::Anim, 9)));
    }

    #[test]
    fn test_map_block_sparse_cells_and_patched_count() {
        let mut map = MapClass::new();
        map.theater = Theater::Desert;
        map.header.width = 62;
        map.header.pending_object = Link::None;
        map.cells[10].smudge = 1;
        map.cells[200].occupier = coded(Kind::Infantry, 4);
        map.cells[300].set_trigger(coded(Kind::Trigger, 2));

        let mut m = MemFile::new();
        m.open(OpenMode::Write).unwrap();
        map.save(&mut m).unwrap();

        // theater + [size][header] + count + 3 * ([cell][size][image]) + trigger
        let expected = 1
            + 4 + MapHeader::IMAGE_SIZE
            + 4
            + 3 * (2 + 4 + CellClass::IMAGE_SIZE)
            + 4;
        assert_eq!(m.len(), expected);
        let bytes = m.contents();
        let count_at = 1 + 4 + MapHeader::IMAGE_SIZE;
        assert_eq!(&bytes[count_at..count_at + 4], &3u32.to_le_bytes());

        let mut r = m.share();
        r.open(OpenMode::Read).unwrap();
        let mut back = MapClass::new();
        back.load(&mut r).unwrap();
        assert_eq!(back.theater, Theater::Desert);
        assert_eq!(back.header.width, 62);
        assert_eq!(back.cells[10].smudge, 1);
        assert_eq!(back.cells[200].occupier, coded(Kind::Infantry, 4));
        assert_eq!(back.cells[300].trigger, coded(Kind::Trigger, 2));
        assert_eq!(back.saved_cell_count(), 3);
    }

    #[test]
    fn test_live_header_link_rejected() {
        let mut map = MapClass::new();
        map.header.pending_object = Link::Cell(4);
        let mut m = MemFile::new();
        m.open(OpenMode::Write).unwrap();
        assert!(matches!(map.save(&mut m), Err(SaveError::PointerState { .. })));
    }

    #[test]
    fn test_layer_add_skips_repeats() {
        let mut layer = LayerClass::default();
        layer.add(coded(Kind::Unit, 1));
        layer.add(coded(Kind::Unit, 1));
        layer.add(Link::None);
        layer.add(coded(Kind::Unit, 2));
        assert_eq!(layer.entries, vec![coded(Kind::Unit, 1), coded(Kind::Unit, 2)]);
    }

    #[test]
    fn test_cell_numbers() {
        assert_eq!(cell_number(3, 2), 131);
        let map = MapClass::new();
        assert!(map.cell(-1).is_none());
        assert!(map.cell(MAP_CELL_TOTAL as i16).is_none());
        assert!(map.cell(0).is_some());
    }
}
