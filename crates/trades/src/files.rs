use anyhow::{Context, Result};
use serde_json::Value;
use std::{
    fs::File,
    io::{Read, Write},
    path::Path,
};

use crate::report::to_pretty_json;

/// Reads a JSON file (e.g. a `getTrades` export), keeping key order.
pub fn read_json_file<P: AsRef<Path>>(path: P) -> Result<Value> {
    let path = path.as_ref();

    let mut file = File::open(path).with_context(|| format!("Cannot open {:?}", path))?;

    let mut contents = String::new();
    file.read_to_string(&mut contents)?;

    serde_json::from_str(&contents).with_context(|| format!("{:?} is not valid JSON", path))
}

/// Writes `value` as indented JSON, creating the parent directory if needed.
pub fn write_json_file<P: AsRef<Path>>(path: P, value: &Value) -> Result<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = File::create(path).with_context(|| format!("Cannot create file at {:?}", path))?;

    let formatted = to_pretty_json(value)?;
    file.write_all(formatted.as_bytes())?;

    Ok(())
}

/// Number of top-level entries in an export (sentinels included).
pub fn count_entries(value: &Value) -> usize {
    match value {
        Value::Object(map) => map.len(),
        Value::Array(arr) => arr.len(),
        _ => 0,
    }
}
