// cvar.rs: console variables used as the engine's configuration layer

use std::collections::HashMap;

use bitflags::bitflags;
use log::{debug, warn};
use parking_lot::Mutex;

bitflags! {
    /// Behaviour flags attached to a console variable.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CvarFlags: u32 {
        /// Written out by `write_variables` so it survives a restart.
        const ARCHIVE = 1 << 0;
    }
}

/// A console variable.
#[derive(Debug, Clone)]
pub struct Cvar {
    pub name: String,
    pub string: String,
    pub flags: CvarFlags,
    pub value: f32,
}

/// The full cvar system context.
pub struct CvarContext {
    pub cvar_vars: Vec<Cvar>,
    /// O(1) cvar lookup by name -> index in cvar_vars
    cvar_index: HashMap<String, usize>,
}

impl CvarContext {
    pub fn new() -> Self {
        Self {
            cvar_vars: Vec::new(),
            cvar_index: HashMap::new(),
        }
    }

    /// Names may not contain whitespace or quotes, since `write_variables`
    /// output has to parse back through `exec_text`.
    pub fn name_validate(name: &str) -> bool {
        !name.is_empty() && !name.contains(|c: char| c.is_whitespace() || c == '"')
    }

    pub fn find_var_index(&self, name: &str) -> Option<usize> {
        self.cvar_index.get(name).copied()
    }

    pub fn find_var(&self, name: &str) -> Option<&Cvar> {
        self.cvar_index.get(name).map(|&idx| &self.cvar_vars[idx])
    }

    /// Get the floating-point value of a cvar. Returns 0 if not found.
    pub fn variable_value(&self, name: &str) -> f32 {
        self.find_var(name).map_or(0.0, |var| var.value)
    }

    /// Get the string value of a cvar. Returns "" if not found.
    pub fn variable_string(&self, name: &str) -> &str {
        self.find_var(name).map_or("", |var| var.string.as_str())
    }

    /// Get or create a cvar. If it already exists, the value is not changed
    /// but flags are OR'd in.
    pub fn get(&mut self, name: &str, value: &str, flags: CvarFlags) -> Option<usize> {
        if !Self::name_validate(name) {
            warn!("invalid cvar name {:?}", name);
            return None;
        }

        if let Some(&idx) = self.cvar_index.get(name) {
            self.cvar_vars[idx].flags |= flags;
            return Some(idx);
        }

        let idx = self.cvar_vars.len();
        self.cvar_vars.push(Cvar {
            name: name.to_string(),
            string: value.to_string(),
            flags,
            value: parse_value(value),
        });
        self.cvar_index.insert(name.to_string(), idx);

        Some(idx)
    }

    /// Set a cvar value, creating the variable if it does not exist.
    pub fn set(&mut self, name: &str, value: &str) -> Option<usize> {
        let idx = match self.find_var_index(name) {
            Some(idx) => idx,
            None => return self.get(name, value, CvarFlags::empty()),
        };

        let var = &mut self.cvar_vars[idx];
        if value != var.string {
            debug!("{} = \"{}\"", name, value);
            var.string = value.to_string();
            var.value = parse_value(value);
        }
        Some(idx)
    }

    /// Write all archived cvars to a writer.
    pub fn write_variables(&self, writer: &mut dyn std::io::Write) -> std::io::Result<()> {
        for var in &self.cvar_vars {
            if var.flags.contains(CvarFlags::ARCHIVE) {
                writeln!(writer, "set {} \"{}\"", var.name, var.string)?;
            }
        }
        Ok(())
    }

    /// Runs `set <name> <value>` lines, as produced by `write_variables`.
    /// Blank lines and `//` comments are skipped. Returns how many
    /// variables were set.
    pub fn exec_text(&mut self, text: &str) -> usize {
        let mut count = 0;
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with("//") {
                continue;
            }
            match parse_set_line(line) {
                Some((name, value)) => {
                    if self.set(name, value).is_some() {
                        count += 1;
                    }
                }
                None => warn!("line {}: expected `set <variable> <value>`", lineno + 1),
            }
        }
        count
    }
}

impl Default for CvarContext {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_value(s: &str) -> f32 {
    s.trim().parse::<f32>().unwrap_or(0.0)
}

fn parse_set_line(line: &str) -> Option<(&str, &str)> {
    let rest = line.strip_prefix("set")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let rest = rest.trim_start();
    let name_end = rest.find(char::is_whitespace)?;
    let (name, value) = rest.split_at(name_end);
    let value = value.trim();
    let value = match value.strip_prefix('"') {
        Some(quoted) => quoted.strip_suffix('"')?,
        None => value,
    };
    Some((name, value))
}

// ============================================================
// Global singleton and free-function wrappers
// ============================================================

static CVAR_CTX: Mutex<Option<CvarContext>> = Mutex::new(None);

pub fn cvar_init() {
    *CVAR_CTX.lock() = Some(CvarContext::new());
}

pub fn cvar_shutdown() {
    *CVAR_CTX.lock() = None;
}

pub fn cvar_set(name: &str, value: &str) {
    if let Some(ref mut c) = *CVAR_CTX.lock() {
        c.set(name, value);
    }
}

pub fn cvar_variable_value(name: &str) -> f32 {
    CVAR_CTX.lock().as_ref().map_or(0.0, |c| c.variable_value(name))
}

pub fn cvar_variable_string(name: &str) -> String {
    CVAR_CTX
        .lock()
        .as_ref()
        .map_or(String::new(), |c| c.variable_string(name).to_string())
}

/// Access the global context with a closure. Returns None if not initialized.
pub fn with_cvar_ctx<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&mut CvarContext) -> R,
{
    CVAR_CTX.lock().as_mut().map(f)
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cvar_get_and_find() {
        let mut ctx = CvarContext::new();
        ctx.get("max_units", "500", CvarFlags::empty());
        assert_eq!(ctx.variable_value("max_units"), 500.0);
        assert_eq!(ctx.variable_string("max_units"), "500");
    }

    #[test]
    fn test_cvar_get_creates_once() {
        let mut ctx = CvarContext::new();
        ctx.get("savedir", "save", CvarFlags::empty());
        ctx.get("savedir", "other", CvarFlags::ARCHIVE);
        assert_eq!(ctx.variable_string("savedir"), "save");
        assert!(ctx.find_var("savedir").unwrap().flags.contains(CvarFlags::ARCHIVE));
    }

    #[test]
    fn test_cvar_rejects_bad_names() {
        let mut ctx = CvarContext::new();
        assert!(ctx.get("two words", "1", CvarFlags::empty()).is_none());
        assert!(ctx.get("", "1", CvarFlags::empty()).is_none());
    }

    #[test]
    fn test_cvar_set_existing_and_new() {
        let mut ctx = CvarContext::new();
        ctx.get("max_anims", "200", CvarFlags::ARCHIVE);
        let idx = ctx.set("max_anims", "32");
        assert_eq!(idx, ctx.find_var_index("max_anims"));
        assert_eq!(ctx.variable_value("max_anims"), 32.0);
        assert!(ctx.find_var("max_anims").unwrap().flags.contains(CvarFlags::ARCHIVE));

        ctx.set("save_parallel", "off");
        assert_eq!(ctx.variable_string("save_parallel"), "off");
        assert_eq!(ctx.variable_value("save_parallel"), 0.0);
    }

    #[test]
    fn test_write_variables_round_trip() {
        let mut ctx = CvarContext::new();
        ctx.get("savedir", "my saves", CvarFlags::ARCHIVE);
        ctx.get("developer", "1", CvarFlags::empty());
        let mut buf = Vec::new();
        ctx.write_variables(&mut buf).unwrap();
        let output = String::from_utf8(buf).unwrap();
        assert!(output.contains("set savedir \"my saves\""));
        assert!(!output.contains("developer"));

        let mut other = CvarContext::new();
        assert_eq!(other.exec_text(&output), 1);
        assert_eq!(other.variable_string("savedir"), "my saves");
    }

    #[test]
    fn test_exec_text_skips_comments_and_garbage() {
        let mut ctx = CvarContext::new();
        let text = "// config\n\nset max_units 20\nbind x y\nset save_parallel \"0\"\n";
        assert_eq!(ctx.exec_text(text), 2);
        assert_eq!(ctx.variable_value("max_units"), 20.0);
        assert_eq!(ctx.variable_string("save_parallel"), "0");
    }

    #[test]
    fn test_global_context() {
        cvar_init();
        with_cvar_ctx(|c| c.get("test_global_var", "7", CvarFlags::empty()));
        assert_eq!(cvar_variable_value("test_global_var"), 7.0);
        cvar_set("test_global_var", "8");
        assert_eq!(cvar_variable_string("test_global_var"), "8");
        assert_eq!(with_cvar_ctx(|c| c.variable_value("test_global_var")), Some(8.0));
    }
}
