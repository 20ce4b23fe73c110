//! `refont.json` loading.
//!
//! Shape: `{ "fonts": { "<original>": { "replace": "<name>", "size": 14 } },
//! "debug": false }`. `size` is optional; its presence is what arms the
//! height override. A malformed file is a hard initialization failure - the
//! host is told to veto the attach rather than run with an unknown
//! substitution state.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use librefont::table::{FontRule, SubstitutionTable};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot read settings file: {0}")]
    Io(#[from] io::Error),

    #[error("malformed settings file: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type SettingsResult<T> = std::result::Result<T, SettingsError>;

#[derive(Debug, Clone, Deserialize)]
pub struct FontEntry {
    pub replace: String,
    #[serde(default)]
    pub size: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub fonts: HashMap<String, FontEntry>,

    #[serde(default)]
    pub debug: bool,
}

const TEMPLATE: &str = "{\n    \"fonts\": {},\n    \"debug\": false\n}\n";

impl Settings {
    pub fn load(path: &Path) -> SettingsResult<Self> {
        let text = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&text)?;

        Ok(settings)
    }

    /// Loads settings, writing a minimal template first if the file does
    /// not exist yet. A fresh template yields an empty table, which makes
    /// the installed hook a defined no-op.
    pub fn load_or_bootstrap(path: &Path) -> SettingsResult<Self> {
        if !path.exists() {
            log::info!("no settings at {}, writing template", path.display());
            fs::write(path, TEMPLATE)?;
        }

        Self::load(path)
    }

    pub fn build_table(&self) -> SubstitutionTable {
        let mut table = SubstitutionTable::new();

        for (original, entry) in &self.fonts {
            table.insert(original, FontRule::new(&entry.replace, entry.size));
        }

        table
    }
}
