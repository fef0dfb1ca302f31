// coder.rs: turning live links into targets for a save, and back again
//
// Every link in the world belongs to one code unit: the map, one pool,
// the layer lists, the misc globals or the host's extension data. A unit
// is coded by gathering its links, computing the replacements against an
// immutable world, and only then writing them back, so a unit is either
// fully coded or untouched. Decode skips units that were never coded,
// which is what lets an aborted save put the graph back exactly, and runs
// every coded unit even after one fails, so nothing is left coded.

use log::{debug, info, warn};

use crate::defines::{HousesType, Kind, KindSet, LayerType, MAP_CELL_TOTAL};
use crate::fields::{
    fields_for, reads_of, FieldDesc, LinkCoding, MissingPolicy, CELL_FIELDS, LAYER_ENTRY, PENDING_OBJECT,
    PLAYER_PTR, SELECTION,
};
use crate::heap::PoolState;
use crate::house::HouseClass;
use crate::object::SimObject;
use crate::save_error::{SaveError, SaveResult};
use crate::saveload::HostHook;
use crate::target::{Link, Target};
use crate::world::WorldRegistry;

// ============================================================
// Code units and the coding plan
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeUnit {
    Map,
    Pool(Kind),
    Layers,
    Misc,
    Host,
}

impl CodeUnit {
    /// Every unit in canonical order; ties in the plan resolve this way.
    pub fn canonical() -> Vec<CodeUnit> {
        let mut units = vec![CodeUnit::Map];
        units.extend(Kind::POOLS.iter().map(|&k| CodeUnit::Pool(k)));
        units.extend([CodeUnit::Layers, CodeUnit::Misc, CodeUnit::Host]);
        units
    }

    /// Kinds this unit dereferences while coding or decoding its links.
    pub fn reads(self) -> KindSet {
        match self {
            CodeUnit::Map => reads_of(&CELL_FIELDS) | reads_of(std::slice::from_ref(&PENDING_OBJECT)),
            CodeUnit::Pool(kind) => reads_of(fields_for(kind)),
            CodeUnit::Layers => reads_of(std::slice::from_ref(&LAYER_ENTRY)),
            CodeUnit::Misc => reads_of(&[PLAYER_PTR, SELECTION]),
            // extension data may name houses by id
            CodeUnit::Host => KindSet::HOUSE,
        }
    }

    /// Kinds whose objects this unit owns.
    pub fn provides(self) -> KindSet {
        match self {
            CodeUnit::Pool(kind) => kind.bit(),
            _ => KindSet::empty(),
        }
    }
}

impl std::fmt::Display for CodeUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodeUnit::Map => f.write_str("map"),
            CodeUnit::Pool(kind) => write!(f, "{} pool", kind),
            CodeUnit::Layers => f.write_str("layers"),
            CodeUnit::Misc => f.write_str("misc"),
            CodeUnit::Host => f.write_str("host"),
        }
    }
}

/// A unit together with the kinds it declares it reads.
#[derive(Debug, Clone, Copy)]
pub struct UnitDecl {
    pub unit: CodeUnit,
    pub reads: KindSet,
}

/// The order units are coded in, and the order they are decoded in.
///
/// A unit that reads a kind must be coded while that kind's pool is still
/// live, so it comes before the provider in `code`; on decode the
/// provider has to be live again first, so it comes after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodingPlan {
    pub code: Vec<CodeUnit>,
    pub decode: Vec<CodeUnit>,
}

impl CodingPlan {
    /// The plan for the standard set of units, with reads taken from the
    /// field descriptors.
    pub fn standard() -> SaveResult<CodingPlan> {
        let decls: Vec<UnitDecl> = CodeUnit::canonical()
            .into_iter()
            .map(|unit| UnitDecl { unit, reads: unit.reads() })
            .collect();
        CodingPlan::build(&decls)
    }

    pub fn build(decls: &[UnitDecl]) -> SaveResult<CodingPlan> {
        let n = decls.len();
        // reader -> providers it reads
        let mut edges = vec![Vec::new(); n];
        for (r, reader) in decls.iter().enumerate() {
            for (p, provider) in decls.iter().enumerate() {
                if !reader.reads.intersects(provider.unit.provides()) {
                    continue;
                }
                if r == p {
                    return Err(SaveError::CodingOrder(format!("{} reads its own objects", reader.unit)));
                }
                edges[r].push(p);
            }
        }

        let code = kahn(n, |from| edges[from].clone()).map_err(|stuck| cycle_error(decls, &stuck))?;

        let mut reversed = vec![Vec::new(); n];
        for (r, providers) in edges.iter().enumerate() {
            for &p in providers {
                reversed[p].push(r);
            }
        }
        let decode = kahn(n, |from| reversed[from].clone()).map_err(|stuck| cycle_error(decls, &stuck))?;

        Ok(CodingPlan {
            code: code.into_iter().map(|i| decls[i].unit).collect(),
            decode: decode.into_iter().map(|i| decls[i].unit).collect(),
        })
    }
}

/// Topological order, always taking the lowest-numbered ready node. On a
/// cycle returns the nodes that could not be placed.
fn kahn<F>(n: usize, successors: F) -> Result<Vec<usize>, Vec<usize>>
where
    F: Fn(usize) -> Vec<usize>,
{
    let mut indegree = vec![0usize; n];
    for from in 0..n {
        for to in successors(from) {
            indegree[to] += 1;
        }
    }

    let mut placed = vec![false; n];
    let mut order = Vec::with_capacity(n);
    while order.len() < n {
        let next = (0..n).find(|&i| !placed[i] && indegree[i] == 0);
        let Some(next) = next else {
            return Err((0..n).filter(|&i| !placed[i]).collect());
        };
        placed[next] = true;
        order.push(next);
        for to in successors(next) {
            indegree[to] -= 1;
        }
    }
    Ok(order)
}

fn cycle_error(decls: &[UnitDecl], stuck: &[usize]) -> SaveError {
    let names: Vec<String> = stuck.iter().map(|&i| decls[i].unit.to_string()).collect();
    SaveError::CodingOrder(format!("dependency cycle between {}", names.join(", ")))
}

// ============================================================
// Link sites
// ============================================================

/// Where one link lives in the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Site {
    Slot(Kind, usize),
    Cell(usize),
    Pending,
    Logic(usize),
    Layer(usize, usize),
    Player,
    Selection(usize, usize),
}

struct Gathered {
    site: Site,
    owner: Kind,
    desc: &'static FieldDesc,
    link: Link,
}

fn gather(world: &WorldRegistry, unit: CodeUnit) -> Vec<Gathered> {
    let mut out = Vec::new();
    let mut push = |site, owner, desc: &'static FieldDesc, link: Link| {
        if !link.is_none() {
            out.push(Gathered { site, owner, desc, link });
        }
    };

    match unit {
        CodeUnit::Map => {
            push(Site::Pending, Kind::Special, &PENDING_OBJECT, world.map.header.pending_object);
            for (index, cell) in world.map.cells.iter().enumerate() {
                for desc in CELL_FIELDS.iter() {
                    if let Some(link) = cell.link(desc.field) {
                        push(Site::Cell(index), Kind::Cell, desc, link);
                    }
                }
            }
        }
        CodeUnit::Pool(kind) => {
            if let Some(pool) = world.pool(kind) {
                for index in pool.active_indices() {
                    for desc in fields_for(kind) {
                        if let Some(link) = pool.link(index, desc.field) {
                            push(Site::Slot(kind, index), kind, desc, link);
                        }
                    }
                }
            }
        }
        CodeUnit::Layers => {
            for (i, link) in world.logic.entries.iter().enumerate() {
                push(Site::Logic(i), Kind::Special, &LAYER_ENTRY, *link);
            }
            for layer in LayerType::ALL {
                for (i, link) in world.map.layer(layer).entries.iter().enumerate() {
                    push(Site::Layer(layer as usize, i), Kind::Special, &LAYER_ENTRY, *link);
                }
            }
        }
        CodeUnit::Misc => {
            push(Site::Player, Kind::Special, &PLAYER_PTR, world.misc.player_ptr);
            for (house, list) in world.misc.selections.iter().enumerate() {
                for (i, link) in list.iter().enumerate() {
                    push(Site::Selection(house, i), Kind::Special, &SELECTION, *link);
                }
            }
        }
        CodeUnit::Host => {}
    }
    out
}

fn site_mut<'w>(world: &'w mut WorldRegistry, site: Site, desc: &FieldDesc) -> Option<&'w mut Link> {
    match site {
        Site::Slot(kind, index) => world.pool_mut(kind)?.link_mut(index, desc.field),
        Site::Cell(index) => world.map.cells.get_mut(index)?.link_mut(desc.field),
        Site::Pending => Some(&mut world.map.header.pending_object),
        Site::Logic(i) => world.logic.entries.get_mut(i),
        Site::Layer(layer, i) => world.map.layers.get_mut(layer)?.entries.get_mut(i),
        Site::Player => Some(&mut world.misc.player_ptr),
        Site::Selection(house, i) => world.misc.selections.get_mut(house)?.get_mut(i),
    }
}

fn unit_state(world: &WorldRegistry, unit: CodeUnit) -> PoolState {
    match unit {
        CodeUnit::Map => world.states.map,
        CodeUnit::Pool(kind) => world.pool(kind).map_or(PoolState::Live, |p| p.state()),
        CodeUnit::Layers => world.states.layers,
        CodeUnit::Misc => world.states.misc,
        CodeUnit::Host => world.states.host,
    }
}

fn set_unit_state(world: &mut WorldRegistry, unit: CodeUnit, state: PoolState) {
    match unit {
        CodeUnit::Map => world.states.map = state,
        CodeUnit::Pool(kind) => {
            if let Some(pool) = world.pool_mut(kind) {
                pool.set_state(state);
            }
        }
        CodeUnit::Layers => world.states.layers = state,
        CodeUnit::Misc => world.states.misc = state,
        CodeUnit::Host => world.states.host = state,
    }
}

fn houses_live(world: &WorldRegistry, owner: Kind, desc: &FieldDesc, pass: &str) -> SaveResult<()> {
    if world.houses.state() != PoolState::Live {
        return Err(SaveError::CodingOrder(format!(
            "{}.{} {} while the house pool is coded",
            owner, desc.name, pass
        )));
    }
    Ok(())
}

// ============================================================
// Code
// ============================================================

fn code_link(world: &WorldRegistry, owner: Kind, desc: &FieldDesc, link: Link) -> SaveResult<Link> {
    match link {
        Link::None => Ok(Link::None),
        Link::Coded(_) => Err(SaveError::PointerState { field: desc.name, detail: "link is already coded" }),
        Link::Cell(cell) => {
            if !desc.accepts.has(Kind::Cell) {
                return Err(SaveError::PointerState { field: desc.name, detail: "field does not take cells" });
            }
            if !(0..MAP_CELL_TOTAL as i16).contains(&cell) {
                return Err(SaveError::PointerState { field: desc.name, detail: "cell is off the map" });
            }
            Ok(Link::Coded(Target::cell(cell)))
        }
        Link::Live(handle) => {
            if !world.is_live(handle) {
                debug!("{}.{}: stale {} handle coded as none", owner, desc.name, handle.kind);
                return Ok(Link::None);
            }
            if !desc.accepts.has(handle.kind) {
                return Err(SaveError::PointerState {
                    field: desc.name,
                    detail: "handle of a kind the field does not accept",
                });
            }
            match desc.coding {
                LinkCoding::Slot => Ok(Link::Coded(handle.as_target())),
                LinkCoding::HouseId => {
                    houses_live(world, owner, desc, "coded")?;
                    let house = world.get::<HouseClass>(handle).ok_or(SaveError::PointerState {
                        field: desc.name,
                        detail: "house handle names no house",
                    })?;
                    // the id names a house type, so it has to name this house
                    if world.find_house(house.house_type) != Some(handle) {
                        return Err(SaveError::DuplicateHouse(house.house_type));
                    }
                    Ok(Link::Coded(Target::build(Kind::House, house.house_type as usize)))
                }
            }
        }
    }
}

fn code_unit(world: &mut WorldRegistry, unit: CodeUnit, host: Option<&mut (dyn HostHook + '_)>) -> SaveResult<usize> {
    if unit == CodeUnit::Host {
        if let Some(host) = host {
            host.code_pointers(world).map_err(SaveError::HostHookFailed)?;
        }
        set_unit_state(world, unit, PoolState::Coded);
        return Ok(0);
    }

    let gathered = gather(world, unit);
    let coded: Vec<Link> = gathered
        .iter()
        .map(|g| code_link(world, g.owner, g.desc, g.link))
        .collect::<SaveResult<_>>()?;

    for (g, link) in gathered.iter().zip(coded) {
        if let Some(slot) = site_mut(world, g.site, g.desc) {
            *slot = link;
        }
    }
    set_unit_state(world, unit, PoolState::Coded);
    Ok(gathered.len())
}

/// Codes every unit in plan order. On error the units coded so far stay
/// coded; `decode_all_pointers` restores them.
pub fn code_all_pointers(world: &mut WorldRegistry, mut host: Option<&mut (dyn HostHook + '_)>) -> SaveResult<()> {
    let plan = CodingPlan::standard()?;
    let mut total = 0;
    for unit in plan.code {
        if unit_state(world, unit) == PoolState::Coded {
            return Err(SaveError::CodingOrder(format!("{} is already coded", unit)));
        }
        total += code_unit(world, unit, host.as_deref_mut())?;
    }
    debug!("coded {} links", total);
    Ok(())
}

// ============================================================
// Decode
// ============================================================

fn missing(owner: Kind, desc: &FieldDesc, target: Target) -> SaveResult<Link> {
    match desc.missing {
        MissingPolicy::Clear => {
            debug!("{}.{}: {} is gone, cleared", owner, desc.name, target);
            Ok(Link::None)
        }
        MissingPolicy::Fatal => Err(SaveError::DanglingHandleOnDecode { owner, field: desc.name, target }),
    }
}

fn decode_link(world: &WorldRegistry, owner: Kind, desc: &FieldDesc, link: Link) -> SaveResult<Link> {
    let target = match link {
        Link::None => return Ok(Link::None),
        Link::Live(_) | Link::Cell(_) => {
            return Err(SaveError::PointerState { field: desc.name, detail: "link is not coded" })
        }
        Link::Coded(t) => t,
    };
    if target.is_none() {
        return Ok(Link::None);
    }

    let kind = match target.kind() {
        Some(kind) if desc.accepts.has(kind) => kind,
        _ => return missing(owner, desc, target),
    };

    if kind == Kind::Cell {
        return match target.as_cell() {
            Some(cell) if (0..MAP_CELL_TOTAL as i16).contains(&cell) => Ok(Link::Cell(cell)),
            _ => missing(owner, desc, target),
        };
    }

    let handle = match desc.coding {
        LinkCoding::Slot => world.pool(kind).and_then(|p| p.handle_at(target.index())),
        LinkCoding::HouseId => {
            houses_live(world, owner, desc, "decoded")?;
            u8::try_from(target.index())
                .ok()
                .and_then(HousesType::from_u8)
                .and_then(|ht| world.find_house(ht))
        }
    };
    match handle {
        Some(h) => Ok(Link::Live(h)),
        None => missing(owner, desc, target),
    }
}

/// Decodes one unit and marks it live. A link that cannot be decoded is
/// left empty and the first such error is returned.
fn decode_unit(world: &mut WorldRegistry, unit: CodeUnit, host: Option<&mut (dyn HostHook + '_)>) -> SaveResult<()> {
    if unit == CodeUnit::Host {
        let result = match host {
            Some(host) => host.decode_pointers(world).map_err(SaveError::HostHookFailed),
            None => Ok(()),
        };
        set_unit_state(world, unit, PoolState::Live);
        return result;
    }

    let gathered = gather(world, unit);
    let mut first_error = None;
    let decoded: Vec<Link> = gathered
        .iter()
        .map(|g| {
            decode_link(world, g.owner, g.desc, g.link).unwrap_or_else(|e| {
                warn!("{}.{}: {}", g.owner, g.desc.name, e);
                first_error.get_or_insert(e);
                Link::None
            })
        })
        .collect();

    for (g, link) in gathered.iter().zip(decoded) {
        if let Some(slot) = site_mut(world, g.site, g.desc) {
            *slot = link;
        }
    }
    set_unit_state(world, unit, PoolState::Live);
    first_error.map_or(Ok(()), Err)
}

/// Decodes every coded unit in plan order; units still live are skipped.
/// A failing unit does not stop the units after it, and the first error
/// is returned once every unit is live again.
pub fn decode_all_pointers(world: &mut WorldRegistry, mut host: Option<&mut (dyn HostHook + '_)>) -> SaveResult<()> {
    let plan = CodingPlan::standard()?;
    let mut first_error = None;
    for unit in plan.decode {
        if unit_state(world, unit) != PoolState::Coded {
            continue;
        }
        if let Err(e) = decode_unit(world, unit, host.as_deref_mut()) {
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}

/// Links currently in the coded state, across every unit.
pub fn count_coded_links(world: &WorldRegistry) -> usize {
    CodeUnit::canonical()
        .into_iter()
        .map(|unit| gather(world, unit).iter().filter(|g| g.link.is_coded()).count())
        .sum()
}

// ============================================================
// Post-load fixups
// ============================================================

fn retained(world: &WorldRegistry, list: &[Link]) -> Vec<Link> {
    list.iter()
        .copied()
        .filter(|link| match link {
            Link::None => false,
            Link::Live(handle) => world.is_live(*handle),
            Link::Cell(_) | Link::Coded(_) => true,
        })
        .collect()
}

/// Drops layer and selection entries that are empty or whose objects are
/// gone. Returns how many were dropped.
pub fn compact_lists(world: &mut WorldRegistry) -> usize {
    let mut dropped = 0;

    let kept = retained(world, &world.logic.entries);
    dropped += world.logic.entries.len() - kept.len();
    world.logic.entries = kept;

    for i in 0..world.map.layers.len() {
        let kept = retained(world, &world.map.layers[i].entries);
        dropped += world.map.layers[i].entries.len() - kept.len();
        world.map.layers[i].entries = kept;
    }

    for i in 0..world.misc.selections.len() {
        let kept = retained(world, &world.misc.selections[i]);
        dropped += world.misc.selections[i].len() - kept.len();
        world.misc.selections[i] = kept;
    }

    if dropped > 0 {
        debug!("dropped {} stale layer and selection entries", dropped);
    }
    dropped
}

/// Rebuilds the state that is derived rather than saved: the pending
/// placement footprint, house trackers and trigger lists, and the layer
/// and selection lists minus entries whose objects did not survive.
pub fn finalize_load(world: &mut WorldRegistry) {
    let pending = world
        .map
        .header
        .pending_object
        .handle()
        .and_then(|h| world.buildings.get(h))
        .map(|b| b.building_type);
    world.map.pending_type = pending;
    world.map.cursor_occupy = pending.map(|bt| bt.occupy_list().to_vec()).unwrap_or_default();

    let mut trackers = Vec::new();
    for (_, obj) in world.aircraft.iter_active() {
        trackers.push((obj.techno.house, Kind::Aircraft));
    }
    for (_, obj) in world.infantry.iter_active() {
        trackers.push((obj.techno.house, Kind::Infantry));
    }
    for (_, obj) in world.units.iter_active() {
        trackers.push((obj.techno.house, Kind::Unit));
    }
    for (_, obj) in world.buildings.iter_active() {
        trackers.push((obj.techno.house, Kind::Building));
    }
    let triggers: Vec<_> = world
        .triggers
        .iter_active()
        .filter_map(|(handle, trig)| world.find_house(trig.house).map(|house| (house, handle)))
        .collect();

    for (_, house) in world.houses.iter_active_mut() {
        house.trackers = Default::default();
        house.triggers.clear();
    }
    for (link, kind) in trackers {
        if let Some(house) = link.handle().and_then(|h| world.houses.get_mut(h)) {
            house.trackers.count(kind);
        }
    }
    for (house, trigger) in triggers {
        if let Some(house) = world.houses.get_mut(house) {
            house.triggers.push(trigger);
        }
    }

    compact_lists(world);

    info!("load fixups done: {} objects, pending {:?}", world.total_active(), world.map.pending_type);
}
