// skirmish.rs: a randomly populated scenario, used by the save tool and tests

use log::{info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::anim::{AnimClass, BulletClass};
use crate::coder::finalize_load;
use crate::defines::{HousesType, Kind, LayerType, Theater, MAP_CELL_W};
use crate::factory::{FactoryClass, STEP_COUNT};
use crate::globals::BaseNode;
use crate::house::HouseClass;
use crate::map::{cell_number, CellFlags};
use crate::object::{FootCore, ObjectCore, ObjectFlags, TechnoCore};
use crate::save_error::SaveResult;
use crate::target::{Handle, Link};
use crate::team::{TeamClass, TeamMember, TeamTypeClass, TeamTypeFlags};
use crate::techno::{AircraftClass, BuildingClass, BuildingType, InfantryClass, UnitClass};
use crate::terrain::{OverlayClass, SmudgeClass, TemplateClass, TerrainClass};
use crate::trigger::{TriggerAction, TriggerClass, TriggerEvent};
use crate::world::{PoolMember, WorldRegistry};

/// Order in which each house lays out its base.
const BUILD_ORDER: [BuildingType; 7] = [
    BuildingType::Construction,
    BuildingType::Power,
    BuildingType::Barracks,
    BuildingType::Weapons,
    BuildingType::Refinery,
    BuildingType::Helipad,
    BuildingType::Tower,
];

/// Bases sit in four-row bands from the top; everything mobile goes below.
const BASE_BAND: usize = 4;
const FIELD_FIRST_ROW: usize = 40;
const MAX_BASE_BUILDINGS: usize = 15;
const TIBERIUM: u8 = 6;

#[derive(Debug, Clone)]
pub struct SkirmishOptions {
    pub seed: u64,
    pub houses: usize,
    /// Buildings per house.
    pub buildings: usize,
    /// The mobile counts are totals, shared out between houses.
    pub units: usize,
    pub infantry: usize,
    pub aircraft: usize,
    pub anims: usize,
    pub bullets: usize,
    pub terrain: usize,
}

impl Default for SkirmishOptions {
    fn default() -> Self {
        SkirmishOptions {
            seed: 1,
            houses: 3,
            buildings: 6,
            units: 12,
            infantry: 16,
            aircraft: 3,
            anims: 6,
            bullets: 4,
            terrain: 10,
        }
    }
}

/// How much of the requested scenario fit in the world's pools.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SkirmishReport {
    pub spawned: usize,
    pub skipped: usize,
}

struct Side {
    house_type: HousesType,
    house: Handle,
    team_type: Option<Handle>,
    team: Option<Handle>,
    trigger: Option<Handle>,
    buildings: Vec<(Handle, i16)>,
    units: Vec<Handle>,
}

struct Builder<'w> {
    world: &'w mut WorldRegistry,
    rng: StdRng,
    /// Unoccupied cells for mobile objects, consumed from the end.
    field: Vec<i16>,
    report: SkirmishReport,
}

fn cell_coord(cell: i16) -> u32 {
    let x = (cell as u32) % MAP_CELL_W as u32;
    let y = (cell as u32) / MAP_CELL_W as u32;
    ((y * 256 + 128) << 16) | (x * 256 + 128)
}

fn placed(cell: i16, next: Link, strength: i16) -> ObjectCore {
    ObjectCore { coord: cell_coord(cell), strength, next, ..ObjectCore::default() }
}

fn in_limbo(strength: i16) -> ObjectCore {
    ObjectCore { strength, flags: ObjectFlags::IN_LIMBO, ..ObjectCore::default() }
}

impl<'w> Builder<'w> {
    /// Pool exhaustion only skips the object.
    fn spawn<T: PoolMember>(&mut self, obj: T) -> SaveResult<Option<Handle>> {
        match self.world.spawn_with(obj) {
            Ok(handle) => {
                self.report.spawned += 1;
                Ok(Some(handle))
            }
            Err(e) if e.is_recoverable() => {
                warn!("skirmish: {}", e);
                self.report.skipped += 1;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn occupant(&self, cell: i16) -> Link {
        self.world.map.cell(cell).map_or(Link::None, |c| c.occupier)
    }

    fn occupy(&mut self, cell: i16, obj: Handle) {
        if let Some(c) = self.world.map.cell_mut(cell) {
            c.occupier = obj.into();
        }
    }

    fn show(&mut self, obj: Handle, layer: LayerType) {
        self.world.logic.add(obj.into());
        self.world.map.layer_mut(layer).add(obj.into());
    }

    fn random_cell(&mut self) -> i16 {
        let x = self.rng.gen_range(1..MAP_CELL_W - 1);
        let y = self.rng.gen_range(1..MAP_CELL_W - 1);
        cell_number(x, y)
    }

    // ---- houses, teams, triggers ----

    fn sides(&mut self, count: usize) -> SaveResult<Vec<Side>> {
        let types = &HousesType::ALL[..count.clamp(1, HousesType::COUNT)];
        let mut sides = Vec::new();
        for (i, &house_type) in types.iter().enumerate() {
            let mut house = HouseClass {
                house_type,
                credits: self.rng.gen_range(500..10_000),
                is_human: i == 0,
                enemy: (types.len() > 1).then(|| types[(i + 1) % types.len()]),
                ..HouseClass::default()
            };
            house.make_ally(house_type);
            let Some(handle) = self.spawn(house)? else { continue };
            sides.push(Side {
                house_type,
                house: handle,
                team_type: None,
                team: None,
                trigger: None,
                buildings: Vec::new(),
                units: Vec::new(),
            });
        }
        Ok(sides)
    }

    fn teams(&mut self, side: &mut Side) -> SaveResult<()> {
        let is_human = self.world.get::<HouseClass>(side.house).is_some_and(|h| h.is_human);

        if !is_human {
            let mut tt = TeamTypeClass {
                house: side.house_type,
                flags: TeamTypeFlags::AUTOCREATE,
                max_allowed: self.rng.gen_range(1..4),
                recruit_priority: self.rng.gen_range(0..8),
                class_count: 2,
                mission_count: 1,
                ..TeamTypeClass::default()
            };
            tt.members[0] = TeamMember { kind: Kind::Unit as u8, type_id: 1, quantity: 3 };
            tt.members[1] = TeamMember { kind: Kind::Infantry as u8, type_id: 0, quantity: 4 };
            tt.set_name(&format!("{}atk", side.house_type.name()));
            side.team_type = self.spawn(tt)?;

            if let Some(class) = side.team_type {
                let target = Link::Cell(self.random_cell());
                let team = TeamClass {
                    class: class.into(),
                    house: side.house.into(),
                    target,
                    risk: self.rng.gen_range(0..10),
                    ..TeamClass::default()
                };
                side.team = self.spawn(team)?;
            }
        }

        let mut trigger = TriggerClass {
            event: if is_human { TriggerEvent::AllDestroyed } else { TriggerEvent::Time },
            action: if is_human { TriggerAction::Win } else { TriggerAction::CreateTeam },
            house: side.house_type,
            team: side.team_type.into(),
            is_persistent: !is_human,
            data: self.rng.gen_range(0..40),
            ..TriggerClass::default()
        };
        trigger.set_name(&format!("{}{}", if is_human { "win" } else { "atk" }, side.house_type as u8));
        side.trigger = self.spawn(trigger)?;
        Ok(())
    }

    // ---- bases ----

    /// Something for a factory building to be working on.
    fn product(&mut self, bt: BuildingType, house: Link) -> SaveResult<Option<Handle>> {
        let techno = TechnoCore { house, ..TechnoCore::default() };
        match bt {
            BuildingType::Barracks => {
                self.spawn(InfantryClass { object: in_limbo(50), techno, infantry_type: 1, ..InfantryClass::default() })
            }
            BuildingType::Helipad => {
                self.spawn(AircraftClass { object: in_limbo(90), techno, aircraft_type: 0, ..AircraftClass::default() })
            }
            _ => self.spawn(UnitClass { object: in_limbo(200), techno, unit_type: 2, ..UnitClass::default() }),
        }
    }

    fn base(&mut self, side: &mut Side, band: usize, count: usize) -> SaveResult<()> {
        let house: Link = side.house.into();
        for i in 0..count.min(MAX_BASE_BUILDINGS) {
            let bt = BUILD_ORDER[i % BUILD_ORDER.len()];
            let origin = cell_number(1 + 4 * i, 1 + BASE_BAND * band);
            let building = BuildingClass {
                object: placed(origin, Link::None, 400),
                techno: TechnoCore { house, ..TechnoCore::default() },
                building_type: bt,
                power: if bt == BuildingType::Power { 100 } else { -20 },
                ..BuildingClass::default()
            };
            let Some(handle) = self.spawn(building)? else { continue };

            for &offset in bt.occupy_list() {
                self.occupy(origin + offset, handle);
            }
            // the shadow spills into the cell beyond the footprint
            let last = bt.occupy_list().last().copied().unwrap_or(0);
            if let Some(c) = self.world.map.cell_mut(origin + last + 1) {
                c.add_overlapper(handle.into());
            }
            self.show(handle, LayerType::Ground);

            if bt.is_factory() {
                let Some(product) = self.product(bt, house)? else { continue };
                let factory = FactoryClass {
                    object: product.into(),
                    house,
                    is_suspended: self.rng.gen_bool(0.2),
                    balance: self.rng.gen_range(0..1500),
                    stage: self.rng.gen_range(0..STEP_COUNT),
                };
                if let Some(factory) = self.spawn(factory)? {
                    if let Some(b) = self.world.get_mut::<BuildingClass>(handle) {
                        b.factory = factory.into();
                    }
                }
            }
            side.buildings.push((handle, origin));
        }

        // the first building remembers the trigger that fires when it dies
        if let (Some(&(first, _)), Some(trigger)) = (side.buildings.first(), side.trigger) {
            if let Some(b) = self.world.get_mut::<BuildingClass>(first) {
                b.object.trigger = trigger.into();
            }
        }

        let mapped = CellFlags::IS_MAPPED | CellFlags::IS_VISIBLE;
        let is_human = self.world.get::<HouseClass>(side.house).is_some_and(|h| h.is_human);
        if is_human {
            for y in 0..BASE_BAND {
                for x in 0..MAP_CELL_W {
                    if let Some(c) = self.world.map.cell_mut(cell_number(x, BASE_BAND * band + y)) {
                        c.flags |= mapped;
                    }
                }
            }
        }
        Ok(())
    }

    // ---- forces ----

    fn forces(
        &mut self,
        side: &mut Side,
        enemy: Option<Handle>,
        units: usize,
        infantry: usize,
        aircraft: usize,
    ) -> SaveResult<()> {
        let house: Link = side.house.into();
        let team: Link = side.team.into();
        let mut team_members = Vec::new();
        let enemy_target = |rng: &mut StdRng, cell: i16| -> Link {
            match enemy {
                Some(b) if rng.gen_bool(0.5) => b.into(),
                _ => Link::Cell(cell),
            }
        };

        for i in 0..units {
            let Some(cell) = self.field.pop() else { break };
            let goal = self.random_cell();
            let tar_com = enemy_target(&mut self.rng, goal);
            let mut techno = TechnoCore { house, tar_com, ammo: self.rng.gen_range(0..5), ..TechnoCore::default() };

            // the first unit is an APC with a passenger aboard
            if i == 0 {
                let passenger = InfantryClass {
                    object: in_limbo(50),
                    techno: TechnoCore { house, ..TechnoCore::default() },
                    ..InfantryClass::default()
                };
                techno.cargo_hold = self.spawn(passenger)?.into();
            }

            let unit = UnitClass {
                object: placed(cell, Link::None, self.rng.gen_range(100..300)),
                techno,
                foot: FootCore { nav_com: Link::Cell(goal), speed: 6, ..FootCore::default() },
                unit_type: if i == 0 { 0 } else { self.rng.gen_range(1..6) },
                tiberium: 0,
                is_harvesting: false,
            };
            let Some(handle) = self.spawn(unit)? else { continue };
            self.occupy(cell, handle);
            self.show(handle, LayerType::Ground);
            side.units.push(handle);
            if !team.is_none() && team_members.len() < 3 {
                team_members.push(handle);
            }
        }

        // infantry shares cells in pairs, chained through `next`
        let mut squad_cell = None;
        for _ in 0..infantry {
            let cell = match squad_cell.take() {
                Some(cell) => cell,
                None => {
                    let Some(cell) = self.field.pop() else { break };
                    squad_cell = Some(cell);
                    cell
                }
            };
            let inf = InfantryClass {
                object: placed(cell, self.occupant(cell), 50),
                techno: TechnoCore { house, ..TechnoCore::default() },
                foot: FootCore { nav_com: Link::Cell(cell), speed: 4, ..FootCore::default() },
                infantry_type: self.rng.gen_range(0..5),
                fear: self.rng.gen_range(0..50),
                is_prone: self.rng.gen_bool(0.3),
            };
            let Some(handle) = self.spawn(inf)? else { continue };
            self.occupy(cell, handle);
            self.show(handle, LayerType::Ground);
        }

        let helipad = side
            .buildings
            .iter()
            .find(|(b, _)| self.world.get::<BuildingClass>(*b).is_some_and(|b| b.building_type == BuildingType::Helipad))
            .map(|(b, _)| *b);
        for _ in 0..aircraft {
            let goal = self.random_cell();
            let cell = self.random_cell();
            let tar_com = enemy_target(&mut self.rng, goal);
            let plane = AircraftClass {
                object: placed(cell, Link::None, 90),
                techno: TechnoCore { house, radio: helipad.into(), tar_com, ammo: 4, ..TechnoCore::default() },
                foot: FootCore { nav_com: Link::Cell(goal), speed: 20, ..FootCore::default() },
                aircraft_type: self.rng.gen_range(0..3),
                altitude: 256,
                is_landing: false,
            };
            let Some(handle) = self.spawn(plane)? else { continue };
            self.show(handle, LayerType::Air);
        }

        // team roster: the team points at the first member, members chain on
        if let Some(team) = side.team {
            for (i, &member) in team_members.iter().enumerate() {
                let next: Link = team_members.get(i + 1).copied().into();
                if let Some(u) = self.world.get_mut::<UnitClass>(member) {
                    u.foot.team = team.into();
                    u.foot.member = next;
                }
            }
            if let Some(t) = self.world.get_mut::<TeamClass>(team) {
                t.member = team_members.first().copied().into();
                t.total = team_members.len() as u8;
            }
        }
        Ok(())
    }

    // ---- neutral objects and terrain ----

    fn effects(&mut self, sides: &[Side], anims: usize, bullets: usize) -> SaveResult<()> {
        let shooters: Vec<Handle> = sides.iter().flat_map(|s| s.units.iter().copied()).collect();
        let targets: Vec<Handle> = sides.iter().flat_map(|s| s.buildings.iter().map(|(b, _)| *b)).collect();

        let mut previous: Option<Handle> = None;
        for i in 0..anims {
            let attached = if i % 2 == 0 { shooters.choose(&mut self.rng).copied() } else { None };
            let cell = self.random_cell();
            let anim = AnimClass {
                object: placed(cell, Link::None, 0),
                anim_type: self.rng.gen_range(0..20),
                attached: attached.into(),
                virtual_anim: if i % 3 == 2 { previous.into() } else { Link::None },
                loops: self.rng.gen_range(1..4),
                delay: self.rng.gen_range(0..8),
            };
            let Some(handle) = self.spawn(anim)? else { continue };
            self.show(handle, LayerType::Top);
            previous = Some(handle);
        }

        for _ in 0..bullets {
            let cell = self.random_cell();
            let tar_com = match targets.choose(&mut self.rng) {
                Some(&b) => b.into(),
                None => Link::Cell(self.random_cell()),
            };
            let bullet = BulletClass {
                object: placed(cell, Link::None, 1),
                bullet_type: self.rng.gen_range(0..10),
                payback: shooters.choose(&mut self.rng).copied().into(),
                tar_com,
                speed: 40,
            };
            let Some(handle) = self.spawn(bullet)? else { continue };
            self.show(handle, LayerType::Air);
        }
        Ok(())
    }

    fn scenery(&mut self, terrain: usize) -> SaveResult<()> {
        for _ in 0..terrain {
            let Some(cell) = self.field.pop() else { break };
            let tree = TerrainClass {
                object: placed(cell, Link::None, 800),
                terrain_type: self.rng.gen_range(0..18),
                is_on_fire: false,
            };
            if let Some(handle) = self.spawn(tree)? {
                self.occupy(cell, handle);
            }
        }

        let cell = self.random_cell();
        self.spawn(OverlayClass { object: placed(cell, Link::None, 0), overlay_type: TIBERIUM })?;
        self.spawn(SmudgeClass { object: placed(cell, Link::None, 0), smudge_type: 1 })?;
        self.spawn(TemplateClass { object: placed(cell, Link::None, 0), template_type: 3 })?;

        for _ in 0..60 {
            let (template, icon) = (self.rng.gen_range(0..20), self.rng.gen_range(0..9));
            let cell = self.random_cell();
            if let Some(c) = self.world.map.cell_mut(cell) {
                c.template_type = template;
                c.icon = icon;
            }
        }
        for _ in 0..30 {
            let density = self.rng.gen_range(0..12);
            let cell = self.random_cell();
            if let Some(c) = self.world.map.cell_mut(cell) {
                c.overlay = TIBERIUM;
                c.overlay_data = density;
            }
        }
        for _ in 0..10 {
            let smudge = self.rng.gen_range(0..5);
            let cell = self.random_cell();
            if let Some(c) = self.world.map.cell_mut(cell) {
                c.smudge = smudge;
            }
        }
        Ok(())
    }

    // ---- scenario globals ----

    fn globals(&mut self, sides: &[Side]) -> SaveResult<()> {
        let Some(player) = sides.first() else { return Ok(()) };
        self.world.misc.player_ptr = player.house.into();

        let theaters = [Theater::Temperate, Theater::Desert, Theater::Winter];
        self.world.map.theater = theaters[self.rng.gen_range(0..theaters.len())];
        self.world.map.header.map_x = 1;
        self.world.map.header.map_y = 1;
        self.world.map.header.width = (MAP_CELL_W - 2) as u8;
        self.world.map.header.height = (MAP_CELL_W - 2) as u8;

        // a power plant waiting to be placed
        let pending = BuildingClass {
            object: in_limbo(400),
            techno: TechnoCore { house: player.house.into(), ..TechnoCore::default() },
            building_type: BuildingType::Power,
            power: 100,
            ..BuildingClass::default()
        };
        self.world.map.header.pending_object = self.spawn(pending)?.into();

        // an enemy trigger fires when the player walks into a cell
        if let Some(enemy) = sides.get(1) {
            let mut trig = TriggerClass {
                event: TriggerEvent::PlayerEntered,
                action: TriggerAction::Reinforcement,
                house: enemy.house_type,
                team: enemy.team_type.into(),
                ..TriggerClass::default()
            };
            trig.set_name("ambush");
            if let Some(trig) = self.spawn(trig)? {
                let cell = cell_number(MAP_CELL_W / 2, FIELD_FIRST_ROW - 1);
                if let Some(c) = self.world.map.cell_mut(cell) {
                    c.set_trigger(trig.into());
                }
            }
        }

        let home = player.buildings.first().map_or(cell_number(2, 2), |&(_, cell)| cell);
        let waypoints = [(0, cell_number(MAP_CELL_W / 2, 50)), (1, cell_number(10, 60)), (25, home)];
        for (wp, cell) in waypoints {
            self.world.misc.scalars.waypoints[wp] = cell as i32;
            if let Some(c) = self.world.map.cell_mut(cell) {
                c.flags |= CellFlags::IS_WAYPOINT;
            }
        }

        let scalars = &mut self.world.misc.scalars;
        scalars.scenario = self.rng.gen_range(1..=15);
        scalars.frame = self.rng.gen_range(0..20_000);
        scalars.scen_dir = self.rng.gen_range(0..2);
        scalars.build_level = scalars.scenario.min(10);
        scalars.views[0] = home as i32;
        self.world.misc.briefing_text = format!(
            "Scenario {}: hold the line against {} hostile forces.",
            scalars.scenario,
            sides.len().saturating_sub(1)
        );

        let selected: Vec<Link> = player.units.iter().take(3).map(|&u| u.into()).collect();
        self.world.misc.selections[player.house_type as usize] = selected;

        let score = &mut self.world.score;
        score.elapsed_time = self.world.misc.scalars.frame as u32;
        score.score = self.rng.gen_range(0..5000);
        score.nod_units_killed = self.rng.gen_range(0..40);
        score.gdi_units_killed = self.rng.gen_range(0..40);
        score.nod_harvested = self.rng.gen_range(0..3000);
        score.gdi_harvested = self.rng.gen_range(0..3000);

        let planner = sides.get(1).unwrap_or(player);
        self.world.base.house = planner.house_type;
        self.world.base.nodes = planner
            .buildings
            .iter()
            .filter_map(|&(b, cell)| {
                let bt = self.world.get::<BuildingClass>(b)?.building_type;
                Some(BaseNode { building: bt as i32, cell: cell as i32 })
            })
            .collect();
        Ok(())
    }
}

fn share(total: usize, parts: usize, i: usize) -> usize {
    total / parts + usize::from(i < total % parts)
}

/// Fills an empty world with a small battle: houses with bases, teams and
/// triggers, mobile forces with cargo and team rosters, effects, terrain,
/// cell decoration and the scenario globals. Every reference is live.
///
/// Pools that run out only drop the objects that did not fit.
pub fn populate(world: &mut WorldRegistry, opts: &SkirmishOptions) -> SaveResult<SkirmishReport> {
    world.clear_scenario();

    let mut field: Vec<i16> = (FIELD_FIRST_ROW..MAP_CELL_W - 1)
        .flat_map(|y| (1..MAP_CELL_W - 1).map(move |x| cell_number(x, y)))
        .collect();
    let mut rng = StdRng::seed_from_u64(opts.seed);
    field.shuffle(&mut rng);

    let mut b = Builder { world: &mut *world, rng, field, report: SkirmishReport::default() };

    let mut sides = b.sides(opts.houses)?;
    for side in sides.iter_mut() {
        b.teams(side)?;
    }
    for (band, side) in sides.iter_mut().enumerate() {
        b.base(side, band, opts.buildings)?;
    }

    let n = sides.len().max(1);
    for i in 0..sides.len() {
        let enemy = sides[(i + 1) % n].buildings.first().map(|&(b, _)| b).filter(|_| n > 1);
        let (units, infantry, aircraft) =
            (share(opts.units, n, i), share(opts.infantry, n, i), share(opts.aircraft, n, i));
        b.forces(&mut sides[i], enemy, units, infantry, aircraft)?;
    }

    b.effects(&sides, opts.anims, opts.bullets)?;
    b.scenery(opts.terrain)?;
    b.globals(&sides)?;

    let report = b.report;
    finalize_load(world);
    info!(
        "skirmish {}: {} objects spawned, {} skipped",
        opts.seed, report.spawned, report.skipped
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coder::{code_all_pointers, count_coded_links, decode_all_pointers};
    use crate::world::PoolLimits;

    #[test]
    fn test_populate_is_deterministic() {
        let mut a = WorldRegistry::default();
        let mut b = WorldRegistry::default();
        populate(&mut a, &SkirmishOptions { seed: 99, ..SkirmishOptions::default() }).unwrap();
        populate(&mut b, &SkirmishOptions { seed: 99, ..SkirmishOptions::default() }).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_populate_fills_every_pool() {
        let mut world = WorldRegistry::default();
        let report = populate(&mut world, &SkirmishOptions::default()).unwrap();
        assert_eq!(report.skipped, 0);
        for pool in world.pools() {
            assert!(pool.active_count() > 0, "{} is empty", pool.kind());
        }
        assert_eq!(report.spawned, world.total_active());

        assert!(world.player_house().is_some());
        assert!(world.map.pending_type.is_some());
        assert!(world.map.cells.iter().any(|c| c.flags.contains(CellFlags::IS_TRIGGER)));
        assert!(world.map.cells.iter().any(|c| c.overlappers.iter().any(|o| !o.is_none())));
        assert!(world.units.iter_active().any(|(_, u)| !u.techno.cargo_hold.is_none()));
        assert!(world.teams.iter_active().all(|(_, t)| !t.member.is_none()));
        assert_eq!(world.misc.scalars.waypoints[25], world.misc.scalars.views[0]);
    }

    #[test]
    fn test_houses_are_unique() {
        let mut world = WorldRegistry::default();
        populate(&mut world, &SkirmishOptions { houses: 40, ..SkirmishOptions::default() }).unwrap();
        let types: Vec<_> = world.houses.iter_active().map(|(_, h)| h.house_type).collect();
        assert_eq!(types.len(), HousesType::COUNT);
        for (i, t) in types.iter().enumerate() {
            assert!(!types[i + 1..].contains(t));
        }
    }

    #[test]
    fn test_infantry_chains_through_next() {
        let mut world = WorldRegistry::default();
        populate(&mut world, &SkirmishOptions::default()).unwrap();
        let chained = world
            .infantry
            .iter_active()
            .filter(|(_, i)| matches!(world.resolve_link(i.object.next), Some(o) if o.kind() == Kind::Infantry))
            .count();
        assert!(chained > 0);
    }

    #[test]
    fn test_trackers_match_ownership() {
        let mut world = WorldRegistry::default();
        populate(&mut world, &SkirmishOptions::default()).unwrap();
        for (handle, house) in world.houses.iter_active() {
            let owned = world.buildings.iter_active().filter(|(_, b)| b.techno.house == Link::Live(handle)).count();
            assert_eq!(house.trackers.buildings as usize, owned);
            assert!(!house.triggers.is_empty());
        }
    }

    #[test]
    fn test_every_link_survives_coding() {
        let mut world = WorldRegistry::default();
        populate(&mut world, &SkirmishOptions { seed: 5, ..SkirmishOptions::default() }).unwrap();
        let before = world.clone();
        code_all_pointers(&mut world, None).unwrap();
        assert!(count_coded_links(&world) > 0);
        decode_all_pointers(&mut world, None).unwrap();
        assert_eq!(world, before);
    }

    #[test]
    fn test_exhaustion_only_skips() {
        let mut limits = PoolLimits::default();
        for kind in Kind::POOLS {
            limits.set(kind, 2);
        }
        let mut world = WorldRegistry::new(limits);
        let report = populate(&mut world, &SkirmishOptions::default()).unwrap();
        assert!(report.skipped > 0);
        assert_eq!(report.spawned, world.total_active());
        assert!(world.units.is_full());
    }
}
