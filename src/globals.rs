//! Script-global variable store and builtin constants.
//!
//! Globals are a nested dictionary addressed by dotted paths:
//! `set("Constants.DbCatConfig", v)` creates the intermediate `Constants`
//! object on demand. The builtin constant set is installed by an explicit
//! [`register_builtin_constants`] call from the host during startup; there
//! are no self-registering static initializers.

use std::sync::RwLock;

use serde_json::Value;

use crate::error::{ConfigError, Result};
use crate::Dictionary;

// ---------------------------------------------------------------------------
// ScriptGlobals
// ---------------------------------------------------------------------------

/// Process-wide script variables, owned by the host and shared by handle.
#[derive(Debug, Default)]
pub struct ScriptGlobals {
    globals: RwLock<Dictionary>,
}

impl ScriptGlobals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable, creating intermediate objects for each dotted
    /// segment. Fails if an intermediate segment already holds a
    /// non-object value.
    pub fn set(&self, name: &str, value: Value) -> Result<()> {
        if name.is_empty() {
            return Err(anyhow::anyhow!("script variable name must not be empty").into());
        }

        let mut tokens: Vec<&str> = name.split('.').collect();
        let last = tokens.pop().expect("split yields at least one token");

        let mut globals = self.globals.write().unwrap();
        let mut parent: &mut Dictionary = &mut globals;

        for token in tokens {
            let entry = parent
                .entry(token.to_string())
                .or_insert_with(|| Value::Object(Dictionary::new()));

            match entry {
                Value::Object(map) => parent = map,
                _ => {
                    return Err(anyhow::anyhow!(
                        "script variable segment '{token}' of '{name}' is not an object"
                    )
                    .into())
                }
            }
        }

        parent.insert(last.to_string(), value);
        Ok(())
    }

    /// Look up a variable by dotted path. Accessing an undefined variable
    /// is an error; use [`ScriptGlobals::get_or`] for a defaulted read.
    pub fn get(&self, name: &str) -> Result<Value> {
        self.lookup(name)
            .ok_or_else(|| ConfigError::UndefinedVariable(name.to_string()))
    }

    pub fn get_or(&self, name: &str, default: Value) -> Value {
        self.lookup(name).unwrap_or(default)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Clone of the full global dictionary, e.g. for diagnostics dumps.
    pub fn snapshot(&self) -> Dictionary {
        self.globals.read().unwrap().clone()
    }

    fn lookup(&self, name: &str) -> Option<Value> {
        let globals = self.globals.read().unwrap();
        let mut tokens = name.split('.');
        let mut current = globals.get(tokens.next()?)?;

        for token in tokens {
            current = current.as_object()?.get(token)?;
        }

        Some(current.clone())
    }
}

// ---------------------------------------------------------------------------
// Builtin constants
// ---------------------------------------------------------------------------

/// Persistence category bits, usable as a filter mask.
pub const DB_CAT_CONFIG: i64 = 1 << 0;
pub const DB_CAT_STATE: i64 = 1 << 1;
pub const DB_CAT_ACKNOWLEDGEMENT: i64 = 1 << 2;
pub const DB_CAT_COMMENT: i64 = 1 << 3;
pub const DB_CAT_DOWNTIME: i64 = 1 << 4;
pub const DB_CAT_EVENTHANDLER: i64 = 1 << 5;
pub const DB_CAT_EXTERNALCOMMAND: i64 = 1 << 6;
pub const DB_CAT_FLAPPING: i64 = 1 << 7;
pub const DB_CAT_CHECK: i64 = 1 << 8;
pub const DB_CAT_LOG: i64 = 1 << 9;
pub const DB_CAT_NOTIFICATION: i64 = 1 << 10;
pub const DB_CAT_PROGRAMSTATUS: i64 = 1 << 11;
pub const DB_CAT_RETENTION: i64 = 1 << 12;
pub const DB_CAT_STATEHISTORY: i64 = 1 << 13;
pub const DB_CAT_EVERYTHING: i64 = 0xFFFF_FFFF;

/// Service check states.
pub const SERVICE_OK: i64 = 0;
pub const SERVICE_WARNING: i64 = 1;
pub const SERVICE_CRITICAL: i64 = 2;
pub const SERVICE_UNKNOWN: i64 = 3;

/// Host check states.
pub const HOST_UP: i64 = 0;
pub const HOST_DOWN: i64 = 1;

/// Category-name to bit-value pairs, in declaration order. Used to resolve
/// category filter strings from user configuration.
pub fn category_filter_map() -> &'static [(&'static str, i64)] {
    &[
        ("DbCatConfig", DB_CAT_CONFIG),
        ("DbCatState", DB_CAT_STATE),
        ("DbCatAcknowledgement", DB_CAT_ACKNOWLEDGEMENT),
        ("DbCatComment", DB_CAT_COMMENT),
        ("DbCatDowntime", DB_CAT_DOWNTIME),
        ("DbCatEventHandler", DB_CAT_EVENTHANDLER),
        ("DbCatExternalCommand", DB_CAT_EXTERNALCOMMAND),
        ("DbCatFlapping", DB_CAT_FLAPPING),
        ("DbCatCheck", DB_CAT_CHECK),
        ("DbCatLog", DB_CAT_LOG),
        ("DbCatNotification", DB_CAT_NOTIFICATION),
        ("DbCatProgramStatus", DB_CAT_PROGRAMSTATUS),
        ("DbCatRetention", DB_CAT_RETENTION),
        ("DbCatStateHistory", DB_CAT_STATEHISTORY),
        ("DbCatEverything", DB_CAT_EVERYTHING),
    ]
}

/// Install the builtin constants under `Constants.*`. Called once by the
/// host before any configuration is compiled.
pub fn register_builtin_constants(globals: &ScriptGlobals) -> Result<()> {
    for (name, value) in category_filter_map() {
        globals.set(&format!("Constants.{name}"), Value::from(*value))?;
    }

    globals.set("Constants.ServiceOK", Value::from(SERVICE_OK))?;
    globals.set("Constants.ServiceWarning", Value::from(SERVICE_WARNING))?;
    globals.set("Constants.ServiceCritical", Value::from(SERVICE_CRITICAL))?;
    globals.set("Constants.ServiceUnknown", Value::from(SERVICE_UNKNOWN))?;

    globals.set("Constants.HostUp", Value::from(HOST_UP))?;
    globals.set("Constants.HostDown", Value::from(HOST_DOWN))?;

    Ok(())
}
