// globals.rs: score, AI base plan and the miscellaneous scenario globals

use bytemuck::{Pod, Zeroable};
use log::debug;

use conquer_common::files::ByteStream;

use crate::defines::{HousesType, WAYPT_COUNT};
use crate::ioobj::{read_bytes, read_count, read_i32, read_link, write_bytes, write_i32, write_link};
use crate::map::read_link_list;
use crate::save_error::{SaveError, SaveResult};
use crate::target::Link;

pub const BASE_NODE_MAX: usize = 100;
pub const BRIEFING_MAX: usize = 512;
pub const VIEW_COUNT: usize = 4;

/// Reads a size prefix and checks it against the compiled size of `T`.
fn read_block_size<T>(stream: &mut dyn ByteStream, what: &str) -> SaveResult<()> {
    let size = read_i32(stream)?;
    if size < 0 || size as usize != std::mem::size_of::<T>() {
        return Err(SaveError::InvalidData(format!(
            "{} block is {} bytes, expected {}",
            what,
            size,
            std::mem::size_of::<T>()
        )));
    }
    Ok(())
}

fn write_pod<T: Pod>(stream: &mut dyn ByteStream, value: &T) -> SaveResult<()> {
    write_i32(stream, std::mem::size_of::<T>() as i32)?;
    write_bytes(stream, bytemuck::bytes_of(value))
}

fn read_pod<T: Pod>(stream: &mut dyn ByteStream, what: &str) -> SaveResult<T> {
    read_block_size::<T>(stream, what)?;
    let mut value = T::zeroed();
    read_bytes(stream, bytemuck::bytes_of_mut(&mut value))?;
    Ok(value)
}

// ============================================================
// Score
// ============================================================

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct ScoreClass {
    pub elapsed_time: u32,
    pub score: i32,
    pub nod_units_killed: i32,
    pub gdi_units_killed: i32,
    pub nod_buildings_destroyed: i32,
    pub gdi_buildings_destroyed: i32,
    pub civilians_killed: i32,
    pub nod_harvested: i32,
    pub gdi_harvested: i32,
    pub real_time: u32,
}

impl ScoreClass {
    pub fn save(&self, stream: &mut dyn ByteStream) -> SaveResult<()> {
        write_pod(stream, self)
    }

    pub fn load(stream: &mut dyn ByteStream) -> SaveResult<ScoreClass> {
        read_pod(stream, "score")
    }
}

// ============================================================
// AI base plan
// ============================================================

/// One building the computer player wants at a given cell.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct BaseNode {
    pub building: i32,
    pub cell: i32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BaseClass {
    pub house: HousesType,
    pub nodes: Vec<BaseNode>,
}

impl BaseClass {
    pub fn clear(&mut self) {
        self.house = HousesType::default();
        self.nodes.clear();
    }

    /// `[node size][house][count][nodes]`
    pub fn save(&self, stream: &mut dyn ByteStream) -> SaveResult<()> {
        write_i32(stream, std::mem::size_of::<BaseNode>() as i32)?;
        write_i32(stream, self.house as i32)?;
        write_i32(stream, self.nodes.len() as i32)?;
        write_bytes(stream, bytemuck::cast_slice(&self.nodes))
    }

    pub fn load(stream: &mut dyn ByteStream) -> SaveResult<BaseClass> {
        read_block_size::<BaseNode>(stream, "base node")?;
        let house = read_i32(stream)?;
        let house = u8::try_from(house)
            .ok()
            .and_then(HousesType::from_u8)
            .ok_or_else(|| SaveError::InvalidData(format!("bad base house {}", house)))?;
        let count = read_count(stream, BASE_NODE_MAX, "base node")?;
        let mut raw = vec![0u8; count * std::mem::size_of::<BaseNode>()];
        read_bytes(stream, &mut raw)?;
        let nodes = raw
            .chunks_exact(std::mem::size_of::<BaseNode>())
            .map(bytemuck::pod_read_unaligned::<BaseNode>)
            .collect();
        Ok(BaseClass { house, nodes })
    }
}

// ============================================================
// Miscellaneous globals
// ============================================================

/// Flat scenario state saved as one block.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct MiscScalars {
    pub scenario: i32,
    pub frame: i32,
    pub win_movie: i32,
    pub lose_movie: i32,
    pub brief_movie: i32,
    pub action_movie: i32,
    pub scen_dir: i32,
    pub scen_var: i32,
    pub carry_over_money: i32,
    pub carry_over_percent: i32,
    pub build_level: i32,
    pub end_countdown: i32,
    pub views: [i32; VIEW_COUNT],
    /// Cell per waypoint, -1 when unset.
    pub waypoints: [i32; WAYPT_COUNT],
}

impl Default for MiscScalars {
    fn default() -> Self {
        MiscScalars {
            scenario: 1,
            frame: 0,
            win_movie: -1,
            lose_movie: -1,
            brief_movie: -1,
            action_movie: -1,
            scen_dir: 0,
            scen_var: 0,
            carry_over_money: 0,
            carry_over_percent: 0,
            build_level: 10,
            end_countdown: 0,
            views: [-1; VIEW_COUNT],
            waypoints: [-1; WAYPT_COUNT],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MiscValues {
    pub scalars: MiscScalars,
    /// The house the local player controls.
    pub player_ptr: Link,
    /// Per-house current selection.
    pub selections: [Vec<Link>; HousesType::COUNT],
    pub briefing_text: String,
}

impl Default for MiscValues {
    fn default() -> Self {
        MiscValues {
            scalars: MiscScalars::default(),
            player_ptr: Link::None,
            selections: Default::default(),
            briefing_text: String::new(),
        }
    }
}

impl MiscValues {
    pub fn clear(&mut self) {
        *self = MiscValues::default();
    }

    /// `[player][scalars][briefing]` then one selection list per house.
    pub fn save(&self, stream: &mut dyn ByteStream) -> SaveResult<()> {
        write_link(stream, "player_ptr", self.player_ptr)?;
        write_pod(stream, &self.scalars)?;

        let mut n = self.briefing_text.len().min(BRIEFING_MAX);
        while !self.briefing_text.is_char_boundary(n) {
            n -= 1;
        }
        let text = &self.briefing_text.as_bytes()[..n];
        write_bytes(stream, &(text.len() as u16).to_le_bytes())?;
        write_bytes(stream, text)?;

        for list in &self.selections {
            write_i32(stream, list.len() as i32)?;
            for link in list {
                write_link(stream, "selection", *link)?;
            }
        }
        Ok(())
    }

    pub fn load(stream: &mut dyn ByteStream, max_selected: usize) -> SaveResult<MiscValues> {
        let player_ptr = read_link(stream)?;
        let scalars = read_pod::<MiscScalars>(stream, "misc")?;

        let mut len = [0u8; 2];
        read_bytes(stream, &mut len)?;
        let len = u16::from_le_bytes(len) as usize;
        if len > BRIEFING_MAX {
            return Err(SaveError::InvalidData(format!("briefing of {} bytes", len)));
        }
        let mut text = vec![0u8; len];
        read_bytes(stream, &mut text)?;
        let briefing_text = String::from_utf8_lossy(&text).into_owned();

        let mut misc = MiscValues { scalars, player_ptr, briefing_text, ..MiscValues::default() };
        for list in misc.selections.iter_mut() {
            *list = read_link_list(stream, max_selected, "selection")?;
        }
        debug!("loaded misc block, frame {}", misc.scalars.frame);
        Ok(misc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defines::Kind;
    use crate::target::Target;
    use conquer_common::files::{MemFile, OpenMode};

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
    fn test_score_block() {
        let score = ScoreClass { elapsed_time: 900, score: 1200, gdi_harvested: 45, ..ScoreClass::default() };
        let mut m = writer();
        score.save(&mut m).unwrap();
        assert_eq!(m.len(), 4 + std::mem::size_of::<ScoreClass>());
        assert_eq!(ScoreClass::load(&mut reader(&m)).unwrap(), score);
    }

    #[test]
    fn test_score_block_size_checked() {
        let mut m = writer();
        write_i32(&mut m, 12).unwrap();
        write_bytes(&mut m, &[0u8; 12]).unwrap();
        assert!(matches!(ScoreClass::load(&mut reader(&m)), Err(SaveError::InvalidData(_))));
    }

    #[test]
    fn test_base_block() {
        let base = BaseClass {
            house: HousesType::Bad,
            nodes: vec![BaseNode { building: 0, cell: 1000 }, BaseNode { building: 3, cell: 1130 }],
        };
        let mut m = writer();
        base.save(&mut m).unwrap();
        assert_eq!(m.len(), 12 + 2 * 8);
        assert_eq!(BaseClass::load(&mut reader(&m)).unwrap(), base);
    }

    #[test]
    fn test_misc_block() {
        let mut misc = MiscValues::default();
        misc.scalars.frame = 4410;
        misc.scalars.waypoints[25] = 2080;
        misc.player_ptr = Link::Coded(Target::build(Kind::House, HousesType::Good as usize));
        misc.selections[0] = vec![Link::Coded(Target::build(Kind::Unit, 3))];
        misc.briefing_text = "Destroy the Nod base.".to_string();

        let mut m = writer();
        misc.save(&mut m).unwrap();
        let back = MiscValues::load(&mut reader(&m), 16).unwrap();
        assert_eq!(back, misc);
        assert_eq!(back.scalars.waypoints[0], -1);
    }

    #[test]
    fn test_long_briefing_cut_on_char_boundary() {
        let mut misc = MiscValues::default();
        // 'é' is two bytes, so byte 512 falls inside the 256th one
        misc.briefing_text = format!("a{}", "é".repeat(300));

        let mut m = writer();
        misc.save(&mut m).unwrap();
        let back = MiscValues::load(&mut reader(&m), 16).unwrap();
        assert_eq!(back.briefing_text.len(), BRIEFING_MAX - 1);
        assert!(!back.briefing_text.contains('\u{FFFD}'));
        assert!(misc.briefing_text.starts_with(&back.briefing_text));
    }

    #[test]
    fn test_selection_over_limit() {
        let mut misc = MiscValues::default();
        misc.selections[1] = (0..5).map(|i| Link::Coded(Target::build(Kind::Infantry, i))).collect();
        let mut m = writer();
        misc.save(&mut m).unwrap();
        assert!(MiscValues::load(&mut reader(&m), 4).is_err());
    }
}
