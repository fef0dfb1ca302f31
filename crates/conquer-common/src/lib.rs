// Shared engine services: byte streams, save paths, console variables.

pub mod cvar;
pub mod files;
