// saveload.rs: Save_Game / Load_Game

use log::{error, info, warn};

use conquer_common::files::{ByteStream, FsContext, OpenMode};

use crate::anim::{AnimClass, BulletClass};
use crate::coder::{code_all_pointers, compact_lists, decode_all_pointers, finalize_load};
use crate::defines::{Kind, DESCRIP_MAX};
use crate::factory::FactoryClass;
use crate::globals::{BaseClass, BaseNode, MiscScalars, MiscValues, ScoreClass};
use crate::house::HouseClass;
use crate::ioobj::{read_bytes, read_u32, write_bytes, write_u32, SaveImage};
use crate::map::{CellClass, MapHeader};
use crate::save_error::{SaveError, SaveResult};
use crate::team::{TeamClass, TeamTypeClass};
use crate::techno::{AircraftClass, BuildingClass, InfantryClass, UnitClass};
use crate::terrain::{OverlayClass, SmudgeClass, TemplateClass, TerrainClass};
use crate::trigger::TriggerClass;
use crate::world::WorldRegistry;

const IMAGE_SIZE_TOTAL: usize = HouseClass::IMAGE_SIZE
    + TeamTypeClass::IMAGE_SIZE
    + TeamClass::IMAGE_SIZE
    + TriggerClass::IMAGE_SIZE
    + AircraftClass::IMAGE_SIZE
    + AnimClass::IMAGE_SIZE
    + BuildingClass::IMAGE_SIZE
    + BulletClass::IMAGE_SIZE
    + InfantryClass::IMAGE_SIZE
    + OverlayClass::IMAGE_SIZE
    + SmudgeClass::IMAGE_SIZE
    + TemplateClass::IMAGE_SIZE
    + TerrainClass::IMAGE_SIZE
    + UnitClass::IMAGE_SIZE
    + FactoryClass::IMAGE_SIZE
    + CellClass::IMAGE_SIZE
    + MapHeader::IMAGE_SIZE
    + std::mem::size_of::<ScoreClass>()
    + std::mem::size_of::<BaseNode>()
    + std::mem::size_of::<MiscScalars>();

/// Changes whenever any saved layout changes size, so a file from a build
/// with a different layout is refused before anything is read.
pub const SAVEGAME_VERSION: u32 = (DESCRIP_MAX + 0x0100_0003 + IMAGE_SIZE_TOTAL) as u32;

/// Largest host block accepted from a file.
pub const HOST_BLOCK_MAX: usize = 1 << 24;

const DESCRIP_TEXT_MAX: usize = DESCRIP_MAX - 4;

/// The description and header fields at the front of a save file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavefileInfo {
    pub description: String,
    pub scenario: u32,
    pub house: u32,
    pub version: u32,
}

/// Points at which `save_game` and `load_game` report progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStage {
    Header,
    HostBlock,
    Map,
    Pool(Kind),
    Layers,
    Score,
    Base,
    Misc,
    Done,
}

/// Extension data owned by whoever embeds the core.
///
/// `save` and `load` handle the block written ahead of the map.
/// `code_pointers` and `decode_pointers` run as the host unit of the code
/// and decode passes, after the misc globals.
pub trait HostHook {
    fn save(&mut self, out: &mut Vec<u8>) -> Result<(), String>;
    fn load(&mut self, data: &[u8]) -> Result<(), String>;

    fn code_pointers(&mut self, _world: &WorldRegistry) -> Result<(), String> {
        Ok(())
    }

    fn decode_pointers(&mut self, _world: &WorldRegistry) -> Result<(), String> {
        Ok(())
    }
}

/// Optional callbacks for one save or load.
pub struct SaveHooks<'a> {
    pub progress: Option<&'a mut dyn FnMut(SaveStage)>,
    pub host: Option<&'a mut dyn HostHook>,
    /// Build large pools' images on the rayon pool.
    pub parallel: bool,
}

impl Default for SaveHooks<'_> {
    fn default() -> Self {
        SaveHooks { progress: None, host: None, parallel: true }
    }
}

impl<'a> SaveHooks<'a> {
    pub fn with_progress(mut self, progress: &'a mut dyn FnMut(SaveStage)) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_host(mut self, host: &'a mut dyn HostHook) -> Self {
        self.host = Some(host);
        self
    }

    fn report(&mut self, stage: SaveStage) {
        if let Some(progress) = self.progress.as_mut() {
            progress(stage);
        }
    }
}

// ============================================================
// Header
// ============================================================

fn description_bytes(descr: &str) -> [u8; DESCRIP_MAX] {
    let mut out = [0u8; DESCRIP_MAX];
    let mut n = descr.len().min(DESCRIP_TEXT_MAX);
    while !descr.is_char_boundary(n) {
        n -= 1;
    }
    out[..n].copy_from_slice(&descr.as_bytes()[..n]);
    out[n] = b'\r';
    out[n + 1] = b'\n';
    out[n + 2] = 0;
    out[n + 3] = 26;
    out
}

fn description_str(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == b'\r' || b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn write_header(stream: &mut dyn ByteStream, info: &SavefileInfo) -> SaveResult<()> {
    write_bytes(stream, &description_bytes(&info.description))?;
    write_u32(stream, info.scenario)?;
    write_u32(stream, info.house)?;
    write_u32(stream, info.version)
}

fn read_header(stream: &mut dyn ByteStream) -> SaveResult<SavefileInfo> {
    let mut descr = [0u8; DESCRIP_MAX];
    read_bytes(stream, &mut descr)?;
    Ok(SavefileInfo {
        description: description_str(&descr),
        scenario: read_u32(stream)?,
        house: read_u32(stream)?,
        version: read_u32(stream)?,
    })
}

fn check_version(info: &SavefileInfo) -> SaveResult<()> {
    if info.version != SAVEGAME_VERSION {
        return Err(SaveError::FormatVersionMismatch { expected: SAVEGAME_VERSION, found: info.version });
    }
    Ok(())
}

// ============================================================
// Save
// ============================================================

fn write_body(
    world: &WorldRegistry,
    stream: &mut dyn ByteStream,
    info: &SavefileInfo,
    hooks: &mut SaveHooks,
) -> SaveResult<()> {
    hooks.report(SaveStage::Header);
    write_header(stream, info)?;

    hooks.report(SaveStage::HostBlock);
    let mut block = Vec::new();
    if let Some(host) = hooks.host.as_deref_mut() {
        host.save(&mut block).map_err(SaveError::HostHookFailed)?;
    }
    write_u32(stream, block.len() as u32)?;
    write_bytes(stream, &block)?;

    hooks.report(SaveStage::Map);
    world.map.save(stream)?;

    for pool in world.pools() {
        hooks.report(SaveStage::Pool(pool.kind()));
        pool.save(stream, hooks.parallel)?;
    }

    hooks.report(SaveStage::Layers);
    world.logic.save(stream, "logic")?;
    world.map.save_layers(stream)?;

    hooks.report(SaveStage::Score);
    world.score.save(stream)?;

    hooks.report(SaveStage::Base);
    world.base.save(stream)?;

    hooks.report(SaveStage::Misc);
    world.misc.save(stream)
}

/// Writes the whole world to `stream`.
///
/// Links are coded for the duration of the write and always decoded again
/// before returning, whether or not the write succeeded. Layer and
/// selection entries naming dead objects are dropped first.
pub fn save_game(
    world: &mut WorldRegistry,
    stream: &mut dyn ByteStream,
    descr: &str,
    mut hooks: SaveHooks,
) -> SaveResult<()> {
    let info = SavefileInfo {
        description: descr.to_string(),
        scenario: world.misc.scalars.scenario as u32,
        house: world
            .player_house()
            .and_then(|h| world.get::<HouseClass>(h))
            .map_or(0, |h| h.house_type as u32),
        version: SAVEGAME_VERSION,
    };

    if let Err(e) = stream.open(OpenMode::Write) {
        error!("Save_Game: couldn't open stream: {}", e);
        return Err(SaveError::StreamOpenFailed(e));
    }

    compact_lists(world);
    let result = code_all_pointers(world, hooks.host.as_deref_mut())
        .and_then(|()| write_body(world, stream, &info, &mut hooks));
    let decoded = decode_all_pointers(world, hooks.host.as_deref_mut());
    stream.close();
    compact_lists(world);

    let result = result.and(decoded);
    match &result {
        Ok(()) => {
            hooks.report(SaveStage::Done);
            info!("Save_Game: \"{}\" ({} objects)", descr, world.total_active());
        }
        Err(e) => error!("Save_Game failed: {}", e),
    }
    result
}

// ============================================================
// Load
// ============================================================

fn read_body(world: &mut WorldRegistry, stream: &mut dyn ByteStream, hooks: &mut SaveHooks) -> SaveResult<()> {
    hooks.report(SaveStage::HostBlock);
    let len = read_u32(stream)? as usize;
    if len > HOST_BLOCK_MAX {
        return Err(SaveError::InvalidData(format!("host block of {} bytes", len)));
    }
    let mut block = vec![0u8; len];
    read_bytes(stream, &mut block)?;
    match hooks.host.as_deref_mut() {
        Some(host) => host.load(&block).map_err(SaveError::HostHookFailed)?,
        None if !block.is_empty() => warn!("no host to take {} bytes of extension data", block.len()),
        None => {}
    }

    hooks.report(SaveStage::Map);
    world.map.load(stream)?;

    for pool in world.pools_mut() {
        hooks.report(SaveStage::Pool(pool.kind()));
        pool.load(stream)?;
    }

    let max_objects = world.limits.object_capacity();
    hooks.report(SaveStage::Layers);
    world.logic.load(stream, max_objects, "logic")?;
    world.map.load_layers(stream, max_objects)?;

    hooks.report(SaveStage::Score);
    world.score = ScoreClass::load(stream)?;

    hooks.report(SaveStage::Base);
    world.base = BaseClass::load(stream)?;

    hooks.report(SaveStage::Misc);
    world.misc = MiscValues::load(stream, max_objects)?;
    Ok(())
}

/// Replaces the world with the contents of `stream`.
///
/// A file with the wrong version is refused before the world is touched.
/// Any later failure leaves the world cleared.
pub fn load_game(
    world: &mut WorldRegistry,
    stream: &mut dyn ByteStream,
    mut hooks: SaveHooks,
) -> SaveResult<SavefileInfo> {
    stream.open(OpenMode::Read).map_err(SaveError::StreamOpenFailed)?;

    hooks.report(SaveStage::Header);
    let info = match read_header(stream).and_then(|info| check_version(&info).map(|()| info)) {
        Ok(info) => info,
        Err(e) => {
            stream.close();
            error!("Load_Game refused: {}", e);
            return Err(e);
        }
    };

    world.clear_scenario();
    let result = read_body(world, stream, &mut hooks).and_then(|()| {
        world.check_house_types()?;
        world.set_all_coded();
        decode_all_pointers(world, hooks.host.as_deref_mut())?;
        finalize_load(world);
        Ok(())
    });
    stream.close();

    match result {
        Ok(()) => {
            hooks.report(SaveStage::Done);
            info!("Load_Game: \"{}\" (scenario {})", info.description, info.scenario);
            Ok(info)
        }
        Err(e) => {
            error!("Load_Game failed: {}", e);
            world.clear_scenario();
            Err(e)
        }
    }
}

/// Reads only the header; used to list save slots.
pub fn get_savefile_info(stream: &mut dyn ByteStream) -> SaveResult<SavefileInfo> {
    stream.open(OpenMode::Read).map_err(SaveError::StreamOpenFailed)?;
    let info = read_header(stream);
    stream.close();
    let info = info?;
    check_version(&info)?;
    Ok(info)
}

// ============================================================
// Numbered save slots
// ============================================================

pub fn save_game_id(
    fs: &FsContext,
    id: u32,
    world: &mut WorldRegistry,
    descr: &str,
    hooks: SaveHooks,
) -> SaveResult<()> {
    let mut file = fs.savegame_file(id);
    save_game(world, &mut file, descr, hooks)
}

pub fn load_game_id(fs: &FsContext, id: u32, world: &mut WorldRegistry, hooks: SaveHooks) -> SaveResult<SavefileInfo> {
    let mut file = fs.savegame_file(id);
    load_game(world, &mut file, hooks)
}

pub fn savefile_info_id(fs: &FsContext, id: u32) -> SaveResult<SavefileInfo> {
    let mut file = fs.savegame_file(id);
    get_savefile_info(&mut file)
}
