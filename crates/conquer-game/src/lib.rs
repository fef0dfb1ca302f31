// Scenario persistence: object pools, reference coding and the save file.

pub mod defines;
pub mod target;
pub mod save_error;
pub mod heap;
pub mod ioobj;
pub mod fields;
pub mod object;
pub mod house;
pub mod team;
pub mod trigger;
pub mod techno;
pub mod anim;
pub mod terrain;
pub mod factory;
pub mod map;
pub mod globals;
pub mod world;
pub mod coder;
pub mod saveload;
pub mod skirmish;
