// cvar.rs — dynamic variable tracking
//
// Named scalar/string values backing the configuration surface. Consumers
// hold indices returned by `get`; lookups by name are O(1).

use crate::q_shared::{CVAR_LATCH, CVAR_NOSET, CVAR_SERVERINFO, CVAR_USERINFO};

use std::collections::HashMap;

/// A console variable.
#[derive(Debug, Clone)]
pub struct Cvar {
    pub name: String,
    pub string: String,
    /// Pending value for CVAR_LATCH vars, applied on the next map load.
    pub latched_string: Option<String>,
    pub flags: i32,
    /// Set each time the value changes; consumers clear it after reacting.
    pub modified: bool,
    pub value: f32,
}

/// Handle to a registered cvar.
pub type CvarHandle = usize;

/// The cvar registry. One per process; tests construct ephemeral ones.
#[derive(Default)]
pub struct CvarContext {
    vars: Vec<Cvar>,
    index: HashMap<String, usize>,
    pub userinfo_modified: bool,
    /// True between map load begin and end; LATCH sets are deferred.
    pub latch_active: bool,
}

impl CvarContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Info cvar names/values may not contain structural characters.
    fn info_validate(s: &str) -> bool {
        !s.contains('\\') && !s.contains('"') && !s.contains(';')
    }

    pub fn find(&self, name: &str) -> Option<&Cvar> {
        self.index.get(name).map(|&i| &self.vars[i])
    }

    pub fn find_handle(&self, name: &str) -> Option<CvarHandle> {
        self.index.get(name).copied()
    }

    /// Float value of a cvar, 0 if missing.
    pub fn variable_value(&self, name: &str) -> f32 {
        self.find(name).map_or(0.0, |v| v.value)
    }

    /// String value of a cvar, "" if missing.
    pub fn variable_string(&self, name: &str) -> &str {
        self.find(name).map_or("", |v| v.string.as_str())
    }

    pub fn var(&self, handle: CvarHandle) -> &Cvar {
        &self.vars[handle]
    }

    pub fn value(&self, handle: CvarHandle) -> f32 {
        self.vars[handle].value
    }

    pub fn string(&self, handle: CvarHandle) -> &str {
        &self.vars[handle].string
    }

    /// Take the modified flag, clearing it.
    pub fn take_modified(&mut self, handle: CvarHandle) -> bool {
        std::mem::take(&mut self.vars[handle].modified)
    }

    /// Get or create a cvar. If it already exists the value is unchanged
    /// but the flags are OR'd in.
    pub fn get(&mut self, name: &str, value: &str, flags: i32) -> Option<CvarHandle> {
        if flags & (CVAR_USERINFO | CVAR_SERVERINFO) != 0 && !Self::info_validate(name) {
            return None;
        }

        if let Some(&idx) = self.index.get(name) {
            self.vars[idx].flags |= flags;
            return Some(idx);
        }

        if flags & (CVAR_USERINFO | CVAR_SERVERINFO) != 0 && !Self::info_validate(value) {
            return None;
        }

        let idx = self.vars.len();
        self.vars.push(Cvar {
            name: name.to_string(),
            string: value.to_string(),
            latched_string: None,
            flags,
            modified: true,
            value: value.parse().unwrap_or(0.0),
        });
        self.index.insert(name.to_string(), idx);
        Some(idx)
    }

    /// Get or create, panicking on an invalid info name. For registration
    /// tables with literal names.
    pub fn register(&mut self, name: &str, value: &str, flags: i32) -> CvarHandle {
        self.get(name, value, flags).expect("invalid cvar name")
    }

    fn set2(&mut self, name: &str, value: &str, force: bool) -> Option<CvarHandle> {
        let idx = match self.index.get(name) {
            Some(&idx) => idx,
            None => return self.get(name, value, 0),
        };

        if self.vars[idx].flags & (CVAR_USERINFO | CVAR_SERVERINFO) != 0
            && !Self::info_validate(value)
        {
            return Some(idx);
        }

        if !force {
            if self.vars[idx].flags & CVAR_NOSET != 0 {
                return Some(idx); // write protected
            }

            if self.vars[idx].flags & CVAR_LATCH != 0 {
                match &self.vars[idx].latched_string {
                    Some(latched) if value == latched => return Some(idx),
                    None if value == self.vars[idx].string => return Some(idx),
                    _ => {}
                }
                if self.latch_active {
                    self.vars[idx].latched_string = Some(value.to_string());
                } else {
                    self.vars[idx].string = value.to_string();
                    self.vars[idx].value = value.parse().unwrap_or(0.0);
                    self.vars[idx].modified = true;
                }
                return Some(idx);
            }
        } else {
            self.vars[idx].latched_string = None;
        }

        if value == self.vars[idx].string {
            return Some(idx); // not changed
        }

        self.vars[idx].modified = true;
        if self.vars[idx].flags & CVAR_USERINFO != 0 {
            self.userinfo_modified = true;
        }
        self.vars[idx].string = value.to_string();
        self.vars[idx].value = value.parse().unwrap_or(0.0);
        Some(idx)
    }

    /// Set a cvar value, respecting NOSET and LATCH.
    pub fn set(&mut self, name: &str, value: &str) -> Option<CvarHandle> {
        self.set2(name, value, false)
    }

    /// Force-set, ignoring NOSET and LATCH.
    pub fn force_set(&mut self, name: &str, value: &str) -> Option<CvarHandle> {
        self.set2(name, value, true)
    }

    pub fn set_value(&mut self, name: &str, value: f32) -> Option<CvarHandle> {
        // write integers without a trailing .0, matching the console
        if value == value.trunc() {
            self.set(name, &format!("{}", value as i64))
        } else {
            self.set(name, &format!("{}", value))
        }
    }

    /// Apply all pending latched values. Called at the map-load boundary.
    pub fn apply_latched(&mut self) {
        for var in &mut self.vars {
            if let Some(latched) = var.latched_string.take() {
                var.value = latched.parse().unwrap_or(0.0);
                var.string = latched;
                var.modified = true;
            }
        }
    }

    /// All registered cvars, for `cvarlist`-style dumps.
    pub fn iter(&self) -> impl Iterator<Item = &Cvar> {
        self.vars.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::q_shared::CVAR_ARCHIVE;

    #[test]
    fn test_get_creates_and_parses() {
        let mut ctx = CvarContext::new();
        let h = ctx.register("r_fsr_scale", "0.75", CVAR_ARCHIVE);
        assert_eq!(ctx.value(h), 0.75);
        assert_eq!(ctx.string(h), "0.75");
        assert!(ctx.var(h).modified);
    }

    #[test]
    fn test_get_existing_keeps_value_ors_flags() {
        let mut ctx = CvarContext::new();
        let h = ctx.register("r_bloom", "1", 0);
        ctx.set("r_bloom", "0");
        let h2 = ctx.register("r_bloom", "1", CVAR_ARCHIVE);
        assert_eq!(h, h2);
        assert_eq!(ctx.value(h), 0.0);
        assert_ne!(ctx.var(h).flags & CVAR_ARCHIVE, 0);
    }

    #[test]
    fn test_noset_is_write_protected() {
        let mut ctx = CvarContext::new();
        let h = ctx.register("vk_driver", "native", CVAR_NOSET);
        ctx.set("vk_driver", "other");
        assert_eq!(ctx.string(h), "native");
        ctx.force_set("vk_driver", "other");
        assert_eq!(ctx.string(h), "other");
    }

    #[test]
    fn test_latch_defers_until_map_load() {
        let mut ctx = CvarContext::new();
        let h = ctx.register("vk_mode", "4", CVAR_LATCH);
        ctx.latch_active = true;
        ctx.take_modified(h);
        ctx.set("vk_mode", "6");
        assert_eq!(ctx.value(h), 4.0);
        assert_eq!(ctx.var(h).latched_string.as_deref(), Some("6"));
        assert!(!ctx.var(h).modified);
        ctx.apply_latched();
        assert_eq!(ctx.value(h), 6.0);
        assert!(ctx.var(h).modified);
    }

    #[test]
    fn test_latch_immediate_outside_map() {
        let mut ctx = CvarContext::new();
        let h = ctx.register("vk_picmip", "0", CVAR_LATCH);
        ctx.set("vk_picmip", "2");
        assert_eq!(ctx.value(h), 2.0);
    }

    #[test]
    fn test_set_unknown_creates() {
        let mut ctx = CvarContext::new();
        ctx.set("r_speeds", "1");
        assert_eq!(ctx.variable_value("r_speeds"), 1.0);
    }

    #[test]
    fn test_set_value_integer_formatting() {
        let mut ctx = CvarContext::new();
        ctx.register("r_msaa", "0", 0);
        ctx.set_value("r_msaa", 4.0);
        assert_eq!(ctx.variable_string("r_msaa"), "4");
        ctx.set_value("r_msaa", 0.5);
        assert_eq!(ctx.variable_string("r_msaa"), "0.5");
    }

    #[test]
    fn test_modified_is_taken_once() {
        let mut ctx = CvarContext::new();
        let h = ctx.register("vid_gamma", "0.6", 0);
        assert!(ctx.take_modified(h));
        assert!(!ctx.take_modified(h));
        ctx.set("vid_gamma", "0.8");
        assert!(ctx.take_modified(h));
    }
}
