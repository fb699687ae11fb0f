// src/config/overlay.rs

//! Deep merge of operator overrides onto generated config documents.
//!
//! Tables/objects merge recursively; anything else in the overlay replaces
//! the base value.

use std::path::Path;

use serde_json::Value;

use crate::errors::Result;
use crate::fs::FileSystem;

pub fn merge_toml(base: &mut toml::Table, overlay: &toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_toml(existing, incoming);
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

pub fn merge_json(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(existing), Value::Object(incoming)) => {
            for (key, value) in incoming {
                match existing.get_mut(key) {
                    Some(slot) => merge_json(slot, value),
                    None => {
                        existing.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (slot, value) => *slot = value.clone(),
    }
}

/// Merge `overlay` into the TOML file at `path`. A missing file starts empty.
pub fn apply_toml_overlay(fs: &dyn FileSystem, path: &Path, overlay: &toml::Table) -> Result<()> {
    if overlay.is_empty() {
        return Ok(());
    }
    let mut doc: toml::Table = if fs.exists(path) {
        toml::from_str(&fs.read_to_string(path)?)?
    } else {
        toml::Table::new()
    };
    merge_toml(&mut doc, overlay);
    fs.write(path, toml::to_string(&doc)?.as_bytes())?;
    Ok(())
}

/// Merge `overlay` into the JSON document at `path`.
pub fn apply_json_overlay(fs: &dyn FileSystem, path: &Path, overlay: &Value) -> Result<()> {
    let mut doc: Value = serde_json::from_str(&fs.read_to_string(path)?)?;
    merge_json(&mut doc, overlay);
    fs.write(path, serde_json::to_string_pretty(&doc)?.as_bytes())?;
    Ok(())
}
