// conquer-savetool: builds, inspects and verifies scenario save files
//
// Usage:
//   conquer-savetool demo [--seed N] [--slot N] [--descr TEXT]
//   conquer-savetool info --slot N
//   conquer-savetool verify --slot N
//   conquer-savetool roundtrip [--seed N]
//   conquer-savetool list
//
// Common options:
//   --savedir DIR       where SAVEGAME.nnn files live
//   --config FILE       cvar script to run first (default conquer.cfg)
//   --set NAME=VALUE    set a cvar, may be repeated
//   --write-config      write archived cvars back to the config file

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use log::{debug, info, warn};

use conquer_common::cvar::{self, CvarFlags};
use conquer_common::files::{FsContext, MemFile, DEFAULT_SAVEDIR};
use conquer_game::saveload::{
    get_savefile_info, load_game, load_game_id, save_game, save_game_id, savefile_info_id, SaveHooks, SaveStage,
    SAVEGAME_VERSION,
};
use conquer_game::skirmish::{populate, SkirmishOptions};
use conquer_game::world::{PoolLimits, WorldRegistry};

const DEFAULT_CONFIG: &str = "conquer.cfg";

fn parse_arg<T: std::str::FromStr>(args: &[String], flag: &str, default: T) -> Result<T> {
    match args.windows(2).find(|w| w[0] == flag) {
        Some(w) => w[1].parse::<T>().map_err(|_| anyhow!("bad value for {}: {}", flag, w[1])),
        None => Ok(default),
    }
}

fn arg_str<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}

// ============================================================
// Configuration
// ============================================================

fn register_cvars() {
    cvar::cvar_init();
    cvar::with_cvar_ctx(|ctx| {
        ctx.get("savedir", DEFAULT_SAVEDIR, CvarFlags::ARCHIVE);
        ctx.get("developer", "0", CvarFlags::empty());
        ctx.get("save_parallel", "1", CvarFlags::ARCHIVE);
        PoolLimits::register_cvars(ctx);
    });
}

/// Runs the config script, then the `--set` overrides. Returns the number
/// of variables set.
fn apply_config(args: &[String], config: &Path) -> Result<usize> {
    let mut count = 0;
    if config.exists() {
        let text = fs::read_to_string(config).with_context(|| format!("reading {}", config.display()))?;
        count += cvar::with_cvar_ctx(|ctx| ctx.exec_text(&text)).unwrap_or(0);
    }

    for w in args.windows(2).filter(|w| w[0] == "--set") {
        let (name, value) = w[1].split_once('=').ok_or_else(|| anyhow!("--set expects NAME=VALUE, got {}", w[1]))?;
        cvar::cvar_set(name.trim(), value.trim());
        count += 1;
    }
    Ok(count)
}

fn write_config(config: &Path) -> Result<()> {
    let mut out = Vec::new();
    cvar::with_cvar_ctx(|ctx| ctx.write_variables(&mut out))
        .ok_or_else(|| anyhow!("cvars not initialized"))??;
    fs::write(config, out).with_context(|| format!("writing {}", config.display()))?;
    info!("wrote {}", config.display());
    Ok(())
}

fn init_logging() {
    let level = if cvar::cvar_variable_value("developer") != 0.0 { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

struct Tool {
    fs: FsContext,
    limits: PoolLimits,
    parallel: bool,
}

impl Tool {
    fn from_cvars(args: &[String]) -> Tool {
        let savedir = arg_str(args, "--savedir")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(cvar::cvar_variable_string("savedir")));
        let limits = cvar::with_cvar_ctx(|ctx| PoolLimits::from_cvars(ctx)).unwrap_or_default();
        Tool {
            fs: FsContext::new(savedir),
            limits,
            parallel: cvar::cvar_variable_value("save_parallel") != 0.0,
        }
    }

    fn world(&self) -> WorldRegistry {
        WorldRegistry::new(self.limits.clone())
    }

    fn hooks<'a>(&self, progress: &'a mut dyn FnMut(SaveStage)) -> SaveHooks<'a> {
        SaveHooks { parallel: self.parallel, ..SaveHooks::default() }.with_progress(progress)
    }
}

fn log_stage(stage: SaveStage) {
    debug!("  {:?}", stage);
}

// ============================================================
// Commands
// ============================================================

fn cmd_demo(tool: &Tool, args: &[String]) -> Result<()> {
    let seed = parse_arg(args, "--seed", 1u64)?;
    let slot = parse_arg(args, "--slot", 0u32)?;
    let descr = arg_str(args, "--descr").map(str::to_string).unwrap_or_else(|| format!("Skirmish {}", seed));

    let mut world = tool.world();
    let report = populate(&mut world, &SkirmishOptions { seed, ..SkirmishOptions::default() })?;
    if report.skipped > 0 {
        warn!("{} objects did not fit in the pools", report.skipped);
    }
    world.summary();

    let mut progress = log_stage;
    save_game_id(&tool.fs, slot, &mut world, &descr, tool.hooks(&mut progress))?;
    println!("saved \"{}\" to {}", descr, tool.fs.savegame_path(slot).display());
    Ok(())
}

fn cmd_info(tool: &Tool, args: &[String]) -> Result<()> {
    let slot = parse_arg(args, "--slot", 0u32)?;
    let info = savefile_info_id(&tool.fs, slot)?;
    println!("slot:        {}", slot);
    println!("description: {}", info.description);
    println!("scenario:    {}", info.scenario);
    println!("house:       {}", info.house);
    println!("version:     {:#010x}", info.version);
    Ok(())
}

/// Loads a slot, then saves it again in memory; the bytes must match.
fn cmd_verify(tool: &Tool, args: &[String]) -> Result<()> {
    let slot = parse_arg(args, "--slot", 0u32)?;
    let path = tool.fs.savegame_path(slot);
    let on_disk = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;

    let mut world = tool.world();
    let mut progress = log_stage;
    let info = load_game_id(&tool.fs, slot, &mut world, tool.hooks(&mut progress))?;
    world.summary();

    let mut mem = MemFile::new();
    save_game(&mut world, &mut mem, &info.description, tool.hooks(&mut progress))?;
    if mem.contents() != on_disk {
        bail!("{} does not re-save identically ({} vs {} bytes)", path.display(), mem.len(), on_disk.len());
    }
    println!("{}: ok ({} bytes)", path.display(), on_disk.len());
    Ok(())
}

/// Builds a scenario and pushes it through save, load and save in memory.
fn cmd_roundtrip(tool: &Tool, args: &[String]) -> Result<()> {
    let seed = parse_arg(args, "--seed", 1u64)?;
    let mut world = tool.world();
    populate(&mut world, &SkirmishOptions { seed, ..SkirmishOptions::default() })?;

    let mut progress = log_stage;
    let first = MemFile::new();
    save_game(&mut world, &mut first.share(), "roundtrip", tool.hooks(&mut progress))?;

    let mut loaded = tool.world();
    load_game(&mut loaded, &mut first.share(), tool.hooks(&mut progress))?;
    let second = MemFile::new();
    save_game(&mut loaded, &mut second.share(), "roundtrip", tool.hooks(&mut progress))?;

    if first.contents() != second.contents() {
        bail!("seed {}: re-saved file differs ({} vs {} bytes)", seed, first.len(), second.len());
    }
    let header = get_savefile_info(&mut first.share())?;
    println!(
        "seed {}: {} objects, {} bytes, version {:#010x}, ok",
        seed,
        loaded.total_active(),
        first.len(),
        header.version
    );
    Ok(())
}

fn cmd_list(tool: &Tool) -> Result<()> {
    let slots = tool.fs.list_savegames();
    if slots.is_empty() {
        println!("no save games in {}", tool.fs.savedir.display());
    }
    for slot in slots {
        match savefile_info_id(&tool.fs, slot) {
            Ok(info) => println!("{:03}  {:<40}  scenario {}", slot, info.description, info.scenario),
            Err(e) => println!("{:03}  ({})", slot, e),
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("roundtrip");

    register_cvars();
    let config = PathBuf::from(arg_str(&args, "--config").unwrap_or(DEFAULT_CONFIG));
    let set = apply_config(&args, &config)?;
    init_logging();
    debug!("{} cvars set from config and command line", set);
    info!("conquer-savetool {} (save format {:#010x})", env!("CARGO_PKG_VERSION"), SAVEGAME_VERSION);

    let tool = Tool::from_cvars(&args);
    match command {
        "demo" => cmd_demo(&tool, &args)?,
        "info" => cmd_info(&tool, &args)?,
        "verify" => cmd_verify(&tool, &args)?,
        "roundtrip" => cmd_roundtrip(&tool, &args)?,
        "list" => cmd_list(&tool)?,
        other => bail!("unknown command {:?}; try demo, info, verify, roundtrip or list", other),
    }

    if args.iter().any(|a| a == "--write-config") {
        write_config(&config)?;
    }
    cvar::cvar_shutdown();
    Ok(())
}
