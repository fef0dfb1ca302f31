// world.rs: the registry that owns every pool, the map and the scenario globals

use log::{debug, info};

use conquer_common::cvar::{CvarContext, CvarFlags};
use conquer_common::files::ByteStream;

use crate::anim::{AnimClass, BulletClass};
use crate::defines::*;
use crate::factory::FactoryClass;
use crate::fields::FieldId;
use crate::globals::{BaseClass, MiscValues, ScoreClass};
use crate::heap::{PoolState, SlotPool};
use crate::house::HouseClass;
use crate::ioobj::{load_pool, save_pool};
use crate::map::{LayerClass, MapClass};
use crate::object::{ObjectCore, SimObject, TechnoCore};
use crate::save_error::{SaveError, SaveResult};
use crate::target::{Handle, Link, Target};
use crate::team::{TeamClass, TeamTypeClass};
use crate::techno::{AircraftClass, BuildingClass, InfantryClass, UnitClass};
use crate::terrain::{OverlayClass, SmudgeClass, TemplateClass, TerrainClass};
use crate::trigger::TriggerClass;

// ============================================================
// Pool limits
// ============================================================

/// Slot count for every pooled kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolLimits {
    caps: [usize; Kind::COUNT],
}

impl Default for PoolLimits {
    fn default() -> Self {
        let mut caps = [0; Kind::COUNT];
        caps[Kind::House as usize] = HOUSE_MAX;
        caps[Kind::TeamType as usize] = TEAMTYPE_MAX;
        caps[Kind::Team as usize] = TEAM_MAX;
        caps[Kind::Trigger as usize] = TRIGGER_MAX;
        caps[Kind::Aircraft as usize] = AIRCRAFT_MAX;
        caps[Kind::Anim as usize] = ANIM_MAX;
        caps[Kind::Building as usize] = BUILDING_MAX;
        caps[Kind::Bullet as usize] = BULLET_MAX;
        caps[Kind::Infantry as usize] = INFANTRY_MAX;
        caps[Kind::Overlay as usize] = OVERLAY_MAX;
        caps[Kind::Smudge as usize] = SMUDGE_MAX;
        caps[Kind::Template as usize] = TEMPLATE_MAX;
        caps[Kind::Terrain as usize] = TERRAIN_MAX;
        caps[Kind::Unit as usize] = UNIT_MAX;
        caps[Kind::Factory as usize] = FACTORY_MAX;
        PoolLimits { caps }
    }
}

impl PoolLimits {
    pub fn capacity(&self, kind: Kind) -> usize {
        self.caps[kind as usize]
    }

    pub fn set(&mut self, kind: Kind, capacity: usize) {
        if kind.is_pool() {
            self.caps[kind as usize] = capacity.min(Target::INDEX_MASK as usize + 1);
        }
    }

    pub fn with(mut self, kind: Kind, capacity: usize) -> Self {
        self.set(kind, capacity);
        self
    }

    /// Upper bound on how many map objects can exist at once; bounds the
    /// layer and selection lists read from a file.
    pub fn object_capacity(&self) -> usize {
        KindSet::OBJECT.pool_kinds().map(|k| self.capacity(k)).sum()
    }

    pub fn cvar_name(kind: Kind) -> String {
        format!("max_{}", kind.name())
    }

    /// Registers an archived `max_<kind>` variable per pool; changes apply
    /// the next time a registry is built.
    pub fn register_cvars(ctx: &mut CvarContext) {
        let defaults = PoolLimits::default();
        for kind in Kind::POOLS {
            ctx.get(
                &Self::cvar_name(kind),
                &defaults.capacity(kind).to_string(),
                CvarFlags::ARCHIVE,
            );
        }
    }

    /// Reads the `max_<kind>` variables; unset or non-positive values keep
    /// the default.
    pub fn from_cvars(ctx: &CvarContext) -> PoolLimits {
        let mut limits = PoolLimits::default();
        for kind in Kind::POOLS {
            let value = ctx.variable_value(&Self::cvar_name(kind));
            if value >= 1.0 {
                limits.set(kind, value as usize);
            }
        }
        limits
    }
}

// ============================================================
// Erased pool access
// ============================================================

/// What the coder and the orchestrator need from a pool without knowing
/// its object type.
pub trait PoolAccess {
    fn kind(&self) -> Kind;
    fn state(&self) -> PoolState;
    fn set_state(&mut self, state: PoolState);
    fn capacity(&self) -> usize;
    fn active_count(&self) -> usize;
    fn active_indices(&self) -> Vec<usize>;
    fn handle_at(&self, index: usize) -> Option<Handle>;
    fn is_live(&self, handle: Handle) -> bool;
    fn link(&self, index: usize, field: FieldId) -> Option<Link>;
    fn link_mut(&mut self, index: usize, field: FieldId) -> Option<&mut Link>;
    fn free(&mut self, handle: Handle) -> bool;
    fn free_all(&mut self);
    fn save(&self, stream: &mut dyn ByteStream, parallel: bool) -> SaveResult<()>;
    fn load(&mut self, stream: &mut dyn ByteStream) -> SaveResult<()>;
}

impl<T: SimObject> PoolAccess for SlotPool<T> {
    fn kind(&self) -> Kind {
        SlotPool::kind(self)
    }

    fn state(&self) -> PoolState {
        SlotPool::state(self)
    }

    fn set_state(&mut self, state: PoolState) {
        SlotPool::set_state(self, state)
    }

    fn capacity(&self) -> usize {
        SlotPool::capacity(self)
    }

    fn active_count(&self) -> usize {
        SlotPool::active_count(self)
    }

    fn active_indices(&self) -> Vec<usize> {
        SlotPool::active_indices(self)
    }

    fn handle_at(&self, index: usize) -> Option<Handle> {
        SlotPool::handle_at(self, index)
    }

    fn is_live(&self, handle: Handle) -> bool {
        SlotPool::is_live(self, handle)
    }

    fn link(&self, index: usize, field: FieldId) -> Option<Link> {
        self.get_index(index).and_then(|obj| obj.link(field))
    }

    fn link_mut(&mut self, index: usize, field: FieldId) -> Option<&mut Link> {
        self.get_index_mut(index).and_then(|obj| obj.link_mut(field))
    }

    fn free(&mut self, handle: Handle) -> bool {
        SlotPool::free(self, handle)
    }

    fn free_all(&mut self) {
        SlotPool::free_all(self)
    }

    fn save(&self, stream: &mut dyn ByteStream, parallel: bool) -> SaveResult<()> {
        save_pool(self, stream, parallel)
    }

    fn load(&mut self, stream: &mut dyn ByteStream) -> SaveResult<()> {
        load_pool(self, stream)
    }
}

/// Typed access from an object type to its pool in the registry.
pub trait PoolMember: SimObject {
    fn pool(world: &WorldRegistry) -> &SlotPool<Self>;
    fn pool_mut(world: &mut WorldRegistry) -> &mut SlotPool<Self>;
}

macro_rules! pool_member {
    ($($ty:ty => $field:ident),* $(,)?) => {
        $(
            impl PoolMember for $ty {
                fn pool(world: &WorldRegistry) -> &SlotPool<Self> {
                    &world.$field
                }
                fn pool_mut(world: &mut WorldRegistry) -> &mut SlotPool<Self> {
                    &mut world.$field
                }
            }
        )*
    };
}

pool_member! {
    HouseClass => houses,
    TeamTypeClass => team_types,
    TeamClass => teams,
    TriggerClass => triggers,
    AircraftClass => aircraft,
    AnimClass => anims,
    BuildingClass => buildings,
    BulletClass => bullets,
    InfantryClass => infantry,
    OverlayClass => overlays,
    SmudgeClass => smudges,
    TemplateClass => templates,
    TerrainClass => terrains,
    UnitClass => units,
    FactoryClass => factories,
}

// ============================================================
// Resolved references
// ============================================================

/// A borrowed object of any pooled kind.
#[derive(Debug, Clone, Copy)]
pub enum ObjectRef<'a> {
    House(&'a HouseClass),
    TeamType(&'a TeamTypeClass),
    Team(&'a TeamClass),
    Trigger(&'a TriggerClass),
    Aircraft(&'a AircraftClass),
    Anim(&'a AnimClass),
    Building(&'a BuildingClass),
    Bullet(&'a BulletClass),
    Infantry(&'a InfantryClass),
    Overlay(&'a OverlayClass),
    Smudge(&'a SmudgeClass),
    Template(&'a TemplateClass),
    Terrain(&'a TerrainClass),
    Unit(&'a UnitClass),
    Factory(&'a FactoryClass),
}

impl<'a> ObjectRef<'a> {
    pub fn kind(&self) -> Kind {
        match self {
            ObjectRef::House(_) => Kind::House,
            ObjectRef::TeamType(_) => Kind::TeamType,
            ObjectRef::Team(_) => Kind::Team,
            ObjectRef::Trigger(_) => Kind::Trigger,
            ObjectRef::Aircraft(_) => Kind::Aircraft,
            ObjectRef::Anim(_) => Kind::Anim,
            ObjectRef::Building(_) => Kind::Building,
            ObjectRef::Bullet(_) => Kind::Bullet,
            ObjectRef::Infantry(_) => Kind::Infantry,
            ObjectRef::Overlay(_) => Kind::Overlay,
            ObjectRef::Smudge(_) => Kind::Smudge,
            ObjectRef::Template(_) => Kind::Template,
            ObjectRef::Terrain(_) => Kind::Terrain,
            ObjectRef::Unit(_) => Kind::Unit,
            ObjectRef::Factory(_) => Kind::Factory,
        }
    }

    /// The shared object layer, for anything that sits on the map.
    pub fn object(&self) -> Option<&'a ObjectCore> {
        match *self {
            ObjectRef::Aircraft(o) => Some(&o.object),
            ObjectRef::Anim(o) => Some(&o.object),
            ObjectRef::Building(o) => Some(&o.object),
            ObjectRef::Bullet(o) => Some(&o.object),
            ObjectRef::Infantry(o) => Some(&o.object),
            ObjectRef::Overlay(o) => Some(&o.object),
            ObjectRef::Smudge(o) => Some(&o.object),
            ObjectRef::Template(o) => Some(&o.object),
            ObjectRef::Terrain(o) => Some(&o.object),
            ObjectRef::Unit(o) => Some(&o.object),
            _ => None,
        }
    }

    pub fn techno(&self) -> Option<&'a TechnoCore> {
        match *self {
            ObjectRef::Aircraft(o) => Some(&o.techno),
            ObjectRef::Building(o) => Some(&o.techno),
            ObjectRef::Infantry(o) => Some(&o.techno),
            ObjectRef::Unit(o) => Some(&o.techno),
            _ => None,
        }
    }

    pub fn as_house(&self) -> Option<&'a HouseClass> {
        match *self {
            ObjectRef::House(h) => Some(h),
            _ => None,
        }
    }
}

// ============================================================
// WorldRegistry
// ============================================================

/// Code/decode state of the parts of the world that are not pools.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitStates {
    pub map: PoolState,
    pub layers: PoolState,
    pub misc: PoolState,
    pub host: PoolState,
}

/// Everything a save file captures. Built once from `PoolLimits` and
/// cleared between scenarios.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldRegistry {
    pub limits: PoolLimits,
    pub houses: SlotPool<HouseClass>,
    pub team_types: SlotPool<TeamTypeClass>,
    pub teams: SlotPool<TeamClass>,
    pub triggers: SlotPool<TriggerClass>,
    pub aircraft: SlotPool<AircraftClass>,
    pub anims: SlotPool<AnimClass>,
    pub buildings: SlotPool<BuildingClass>,
    pub bullets: SlotPool<BulletClass>,
    pub infantry: SlotPool<InfantryClass>,
    pub overlays: SlotPool<OverlayClass>,
    pub smudges: SlotPool<SmudgeClass>,
    pub templates: SlotPool<TemplateClass>,
    pub terrains: SlotPool<TerrainClass>,
    pub units: SlotPool<UnitClass>,
    pub factories: SlotPool<FactoryClass>,
    pub map: MapClass,
    /// Every object that gets an AI tick, in processing order.
    pub logic: LayerClass,
    pub score: ScoreClass,
    pub base: BaseClass,
    pub misc: MiscValues,
    pub states: UnitStates,
}

impl Default for WorldRegistry {
    fn default() -> Self {
        WorldRegistry::new(PoolLimits::default())
    }
}

impl WorldRegistry {
    pub fn new(limits: PoolLimits) -> Self {
        let cap = |kind: Kind| limits.capacity(kind);
        WorldRegistry {
            houses: SlotPool::new(Kind::House, cap(Kind::House)),
            team_types: SlotPool::new(Kind::TeamType, cap(Kind::TeamType)),
            teams: SlotPool::new(Kind::Team, cap(Kind::Team)),
            triggers: SlotPool::new(Kind::Trigger, cap(Kind::Trigger)),
            aircraft: SlotPool::new(Kind::Aircraft, cap(Kind::Aircraft)),
            anims: SlotPool::new(Kind::Anim, cap(Kind::Anim)),
            buildings: SlotPool::new(Kind::Building, cap(Kind::Building)),
            bullets: SlotPool::new(Kind::Bullet, cap(Kind::Bullet)),
            infantry: SlotPool::new(Kind::Infantry, cap(Kind::Infantry)),
            overlays: SlotPool::new(Kind::Overlay, cap(Kind::Overlay)),
            smudges: SlotPool::new(Kind::Smudge, cap(Kind::Smudge)),
            templates: SlotPool::new(Kind::Template, cap(Kind::Template)),
            terrains: SlotPool::new(Kind::Terrain, cap(Kind::Terrain)),
            units: SlotPool::new(Kind::Unit, cap(Kind::Unit)),
            factories: SlotPool::new(Kind::Factory, cap(Kind::Factory)),
            map: MapClass::new(),
            logic: LayerClass::default(),
            score: ScoreClass::default(),
            base: BaseClass::default(),
            misc: MiscValues::default(),
            states: UnitStates::default(),
            limits,
        }
    }

    /// Every pool, in save-file order.
    pub fn pools(&self) -> [&dyn PoolAccess; 15] {
        [
            &self.houses,
            &self.team_types,
            &self.teams,
            &self.triggers,
            &self.aircraft,
            &self.anims,
            &self.buildings,
            &self.bullets,
            &self.infantry,
            &self.overlays,
            &self.smudges,
            &self.templates,
            &self.terrains,
            &self.units,
            &self.factories,
        ]
    }

    pub fn pools_mut(&mut self) -> [&mut dyn PoolAccess; 15] {
        [
            &mut self.houses,
            &mut self.team_types,
            &mut self.teams,
            &mut self.triggers,
            &mut self.aircraft,
            &mut self.anims,
            &mut self.buildings,
            &mut self.bullets,
            &mut self.infantry,
            &mut self.overlays,
            &mut self.smudges,
            &mut self.templates,
            &mut self.terrains,
            &mut self.units,
            &mut self.factories,
        ]
    }

    pub fn pool(&self, kind: Kind) -> Option<&dyn PoolAccess> {
        Some(match kind {
            Kind::House => &self.houses,
            Kind::TeamType => &self.team_types,
            Kind::Team => &self.teams,
            Kind::Trigger => &self.triggers,
            Kind::Aircraft => &self.aircraft,
            Kind::Anim => &self.anims,
            Kind::Building => &self.buildings,
            Kind::Bullet => &self.bullets,
            Kind::Infantry => &self.infantry,
            Kind::Overlay => &self.overlays,
            Kind::Smudge => &self.smudges,
            Kind::Template => &self.templates,
            Kind::Terrain => &self.terrains,
            Kind::Unit => &self.units,
            Kind::Factory => &self.factories,
            Kind::None | Kind::Cell | Kind::Special => return None,
        })
    }

    pub fn pool_mut(&mut self, kind: Kind) -> Option<&mut dyn PoolAccess> {
        Some(match kind {
            Kind::House => &mut self.houses,
            Kind::TeamType => &mut self.team_types,
            Kind::Team => &mut self.teams,
            Kind::Trigger => &mut self.triggers,
            Kind::Aircraft => &mut self.aircraft,
            Kind::Anim => &mut self.anims,
            Kind::Building => &mut self.buildings,
            Kind::Bullet => &mut self.bullets,
            Kind::Infantry => &mut self.infantry,
            Kind::Overlay => &mut self.overlays,
            Kind::Smudge => &mut self.smudges,
            Kind::Template => &mut self.templates,
            Kind::Terrain => &mut self.terrains,
            Kind::Unit => &mut self.units,
            Kind::Factory => &mut self.factories,
            Kind::None | Kind::Cell | Kind::Special => return None,
        })
    }

    // ---- typed access ----

    /// Allocates a default object. A full pool is reported as the
    /// recoverable `PoolExhausted`.
    pub fn spawn<T: PoolMember>(&mut self) -> SaveResult<Handle> {
        let handle = T::pool_mut(self).allocate().ok_or(SaveError::PoolExhausted(T::KIND))?;
        self.admit(handle)
    }

    pub fn spawn_with<T: PoolMember>(&mut self, obj: T) -> SaveResult<Handle> {
        let handle = T::pool_mut(self).allocate().ok_or(SaveError::PoolExhausted(T::KIND))?;
        if let Some(slot) = T::pool_mut(self).get_mut(handle) {
            *slot = obj;
        }
        self.admit(handle)
    }

    /// Keeps a new house only if no other house has its type.
    fn admit(&mut self, handle: Handle) -> SaveResult<Handle> {
        if handle.kind == Kind::House {
            if let Err(e) = self.check_house_types() {
                self.free(handle);
                return Err(e);
            }
        }
        Ok(handle)
    }

    /// House references are saved as house types, which only works while
    /// every active house has a type of its own.
    pub fn check_house_types(&self) -> SaveResult<()> {
        let mut seen = 0u32;
        for (_, house) in self.houses.iter_active() {
            let bit = 1u32 << house.house_type as u32;
            if seen & bit != 0 {
                return Err(SaveError::DuplicateHouse(house.house_type));
            }
            seen |= bit;
        }
        Ok(())
    }

    pub fn get<T: PoolMember>(&self, handle: Handle) -> Option<&T> {
        T::pool(self).get(handle)
    }

    pub fn get_mut<T: PoolMember>(&mut self, handle: Handle) -> Option<&mut T> {
        T::pool_mut(self).get_mut(handle)
    }

    pub fn free(&mut self, handle: Handle) -> bool {
        match self.pool_mut(handle.kind) {
            Some(pool) => pool.free(handle),
            None => false,
        }
    }

    pub fn is_live(&self, handle: Handle) -> bool {
        self.pool(handle.kind).is_some_and(|p| p.is_live(handle))
    }

    // ---- resolution ----

    fn object_at(&self, kind: Kind, index: usize) -> Option<ObjectRef<'_>> {
        Some(match kind {
            Kind::House => ObjectRef::House(self.houses.get_index(index)?),
            Kind::TeamType => ObjectRef::TeamType(self.team_types.get_index(index)?),
            Kind::Team => ObjectRef::Team(self.teams.get_index(index)?),
            Kind::Trigger => ObjectRef::Trigger(self.triggers.get_index(index)?),
            Kind::Aircraft => ObjectRef::Aircraft(self.aircraft.get_index(index)?),
            Kind::Anim => ObjectRef::Anim(self.anims.get_index(index)?),
            Kind::Building => ObjectRef::Building(self.buildings.get_index(index)?),
            Kind::Bullet => ObjectRef::Bullet(self.bullets.get_index(index)?),
            Kind::Infantry => ObjectRef::Infantry(self.infantry.get_index(index)?),
            Kind::Overlay => ObjectRef::Overlay(self.overlays.get_index(index)?),
            Kind::Smudge => ObjectRef::Smudge(self.smudges.get_index(index)?),
            Kind::Template => ObjectRef::Template(self.templates.get_index(index)?),
            Kind::Terrain => ObjectRef::Terrain(self.terrains.get_index(index)?),
            Kind::Unit => ObjectRef::Unit(self.units.get_index(index)?),
            Kind::Factory => ObjectRef::Factory(self.factories.get_index(index)?),
            Kind::None | Kind::Cell | Kind::Special => return None,
        })
    }

    /// The object currently in the slot a target names. None for the
    /// sentinel, non-pool kinds, out-of-range indices and free slots.
    pub fn resolve_target(&self, target: Target) -> Option<ObjectRef<'_>> {
        if target.is_none() {
            return None;
        }
        self.object_at(target.kind()?, target.index())
    }

    /// Like `resolve_target`, but a handle issued before its slot was
    /// freed never resolves, even once the slot is reused.
    pub fn resolve(&self, handle: Handle) -> Option<ObjectRef<'_>> {
        if !self.is_live(handle) {
            return None;
        }
        self.object_at(handle.kind, handle.index())
    }

    pub fn resolve_link(&self, link: Link) -> Option<ObjectRef<'_>> {
        self.resolve(link.handle()?)
    }

    /// First active house of the given type.
    pub fn find_house(&self, house_type: HousesType) -> Option<Handle> {
        self.houses
            .iter_active()
            .find(|(_, h)| h.house_type == house_type)
            .map(|(handle, _)| handle)
    }

    pub fn player_house(&self) -> Option<Handle> {
        self.misc.player_ptr.handle().filter(|h| self.houses.is_live(*h))
    }

    pub fn total_active(&self) -> usize {
        self.pools().iter().map(|p| p.active_count()).sum()
    }

    /// Marks every unit coded; a freshly read file holds nothing but targets.
    pub fn set_all_coded(&mut self) {
        for pool in self.pools_mut() {
            pool.set_state(PoolState::Coded);
        }
        self.states = UnitStates {
            map: PoolState::Coded,
            layers: PoolState::Coded,
            misc: PoolState::Coded,
            host: PoolState::Coded,
        };
    }

    /// Frees every object and resets the map, layers and globals.
    pub fn clear_scenario(&mut self) {
        let before = self.total_active();
        for pool in self.pools_mut() {
            pool.free_all();
        }
        self.map.clear();
        self.logic.clear();
        self.score = ScoreClass::default();
        self.base.clear();
        self.misc.clear();
        self.states = UnitStates::default();
        if before > 0 {
            debug!("cleared scenario ({} objects freed)", before);
        }
    }

    pub fn summary(&self) {
        for pool in self.pools() {
            if pool.active_count() > 0 {
                info!("{:>10}: {:4} of {:4}", pool.kind(), pool.active_count(), pool.capacity());
            }
        }
        info!(
            "{:>10}: {} saved cells, logic {}, layers {}/{}/{}",
            "map",
            self.map.saved_cell_count(),
            self.logic.len(),
            self.map.layer(LayerType::Ground).len(),
            self.map.layer(LayerType::Air).len(),
            self.map.layer(LayerType::Top).len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_world() -> WorldRegistry {
        let mut limits = PoolLimits::default();
        for kind in Kind::POOLS {
            limits.set(kind, 4);
        }
        WorldRegistry::new(limits)
    }

    #[test]
    fn test_default_limits() {
        let limits = PoolLimits::default();
        assert_eq!(limits.capacity(Kind::Anim), 200);
        assert_eq!(limits.capacity(Kind::Factory), 32);
        assert_eq!(limits.capacity(Kind::Cell), 0);
        let world = WorldRegistry::default();
        assert_eq!(world.infantry.capacity(), 500);
    }

    #[test]
    fn test_limits_from_cvars() {
        let mut ctx = CvarContext::new();
        PoolLimits::register_cvars(&mut ctx);
        assert_eq!(ctx.variable_value("max_unit"), UNIT_MAX as f32);
        ctx.set("max_bullet", "8");
        ctx.set("max_unit", "0");
        let limits = PoolLimits::from_cvars(&ctx);
        assert_eq!(limits.capacity(Kind::Bullet), 8);
        assert_eq!(limits.capacity(Kind::Unit), UNIT_MAX);
    }

    #[test]
    fn test_spawn_exhaustion_is_recoverable() {
        let mut world = small_world();
        for _ in 0..4 {
            world.spawn::<BulletClass>().unwrap();
        }
        let err = world.spawn::<BulletClass>().unwrap_err();
        assert!(matches!(err, SaveError::PoolExhausted(Kind::Bullet)));
        assert!(err.is_recoverable());
        // the world keeps working
        assert_eq!(world.bullets.active_count(), 4);
        assert!(world.spawn::<UnitClass>().is_ok());
    }

    #[test]
    fn test_anim_slot_reuse_scenario() {
        let mut world = small_world();
        let handles: Vec<Handle> = (0..3).map(|_| world.spawn::<AnimClass>().unwrap()).collect();
        assert_eq!(handles.iter().map(|h| h.index()).collect::<Vec<_>>(), vec![0, 1, 2]);

        let captured = handles[1];
        assert_eq!(captured.as_target(), Target::build(Kind::Anim, 1));
        assert!(world.free(captured));

        let reused = world.spawn::<AnimClass>().unwrap();
        assert_eq!(reused.index(), 1);

        // the handle captured before the free must not see the new occupant
        assert!(world.resolve(captured).is_none());
        assert!(world.resolve(reused).is_some());
        // a bare target carries no generation and names whatever is there now
        assert_eq!(world.resolve_target(captured.as_target()).map(|o| o.kind()), Some(Kind::Anim));
    }

    #[test]
    fn test_resolve_target_rejects() {
        let mut world = small_world();
        world.spawn::<UnitClass>().unwrap();
        assert!(world.resolve_target(Target::NONE).is_none());
        assert!(world.resolve_target(Target::build(Kind::Unit, 3)).is_none());
        assert!(world.resolve_target(Target::build(Kind::Unit, 99)).is_none());
        assert!(world.resolve_target(Target::cell(5)).is_none());
        assert!(world.resolve_target(Target::from_bits(0xEE00_0000)).is_none());
        assert!(world.resolve_target(Target::build(Kind::Unit, 0)).is_some());
    }

    #[test]
    fn test_find_house_and_player() {
        let mut world = small_world();
        world.spawn_with(HouseClass { house_type: HousesType::Bad, ..HouseClass::default() }).unwrap();
        let good = world.spawn_with(HouseClass { house_type: HousesType::Good, ..HouseClass::default() }).unwrap();
        assert_eq!(world.find_house(HousesType::Good), Some(good));
        assert_eq!(world.find_house(HousesType::Neutral), None);
        world.misc.player_ptr = good.into();
        assert_eq!(world.player_house(), Some(good));
        world.free(good);
        assert_eq!(world.player_house(), None);
    }

    #[test]
    fn test_second_house_of_a_type_refused() {
        let mut world = small_world();
        let bad = world.spawn_with(HouseClass { house_type: HousesType::Bad, ..HouseClass::default() }).unwrap();
        let err = world.spawn_with(HouseClass { house_type: HousesType::Bad, ..HouseClass::default() }).unwrap_err();
        assert!(matches!(err, SaveError::DuplicateHouse(HousesType::Bad)));
        assert!(!err.is_recoverable());
        assert_eq!(world.houses.active_count(), 1);
        assert_eq!(world.find_house(HousesType::Bad), Some(bad));

        // a default house is Good, so only one fits
        world.spawn::<HouseClass>().unwrap();
        assert!(world.spawn::<HouseClass>().is_err());
        assert_eq!(world.houses.active_count(), 2);
        world.check_house_types().unwrap();
    }

    #[test]
    fn test_object_ref_layers() {
        let mut world = small_world();
        let h = world.spawn::<InfantryClass>().unwrap();
        world.get_mut::<InfantryClass>(h).unwrap().techno.ammo = 3;
        let obj = world.resolve(h).unwrap();
        assert_eq!(obj.kind(), Kind::Infantry);
        assert!(obj.object().is_some());
        assert_eq!(obj.techno().map(|t| t.ammo), Some(3));
        let t = world.spawn::<TriggerClass>().unwrap();
        assert!(world.resolve(t).unwrap().object().is_none());
    }

    #[test]
    fn test_clear_scenario() {
        let mut world = small_world();
        let u = world.spawn::<UnitClass>().unwrap();
        world.logic.add(u.into());
        world.map.cells[5].occupier = u.into();
        world.misc.scalars.frame = 100;
        world.units.set_state(PoolState::Coded);
        world.clear_scenario();
        assert_eq!(world.total_active(), 0);
        assert!(world.logic.is_empty());
        assert!(world.map.cells[5].occupier.is_none());
        assert_eq!(world.misc.scalars.frame, 0);
        assert_eq!(world.units.state(), PoolState::Live);
        assert!(world.resolve(u).is_none());
    }
}
