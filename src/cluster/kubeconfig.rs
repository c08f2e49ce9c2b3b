//! Merging cluster credentials into the user's kubeconfig.

use std::{fs, io::Write, path::Path};

use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::error::{Error, Result};

/// Named-entry lists that are merged by `name`.
const NAMED_SECTIONS: [&str; 3] = ["clusters", "contexts", "users"];

/// Merge `incoming` into `existing`.
///
/// Entries of `incoming` replace same-named entries in `existing`; everything
/// else in `existing` is preserved. `current-context` is taken from
/// `incoming` when it sets one.
pub fn merge_kubeconfig(existing: &str, incoming: &str) -> Result<String> {
    let mut base = parse_document(existing)?;
    let update = parse_document(incoming)?;

    for section in NAMED_SECTIONS {
        let Some(new_entries) = update.get(section).and_then(Value::as_sequence) else {
            continue;
        };

        let key = Value::from(section);
        let mut merged = base.get(&key).and_then(Value::as_sequence).cloned().unwrap_or_default();

        for entry in new_entries {
            let name = entry.get("name");
            merged.retain(|e| name.is_none() || e.get("name") != name);
            merged.push(entry.clone());
        }

        base.insert(key, Value::Sequence(merged));
    }

    if let Some(ctx) = update.get("current-context").filter(|v| !v.is_null()) {
        base.insert(Value::from("current-context"), ctx.clone());
    }

    for key in ["apiVersion", "kind"] {
        if !base.contains_key(key)
            && let Some(v) = update.get(key)
        {
            base.insert(Value::from(key), v.clone());
        }
    }

    Ok(serde_yaml::to_string(&Value::Mapping(base))?)
}

fn parse_document(contents: &str) -> Result<Mapping> {
    if contents.trim().is_empty() {
        return Ok(Mapping::new());
    }
    match serde_yaml::from_str::<Value>(contents)? {
        Value::Mapping(map) => Ok(map),
        Value::Null => Ok(Mapping::new()),
        _ => Err(Error::parse("kubeconfig is not a YAML mapping")),
    }
}

/// Write `incoming` into the kubeconfig at `path`.
///
/// When a kubeconfig already exists the two are merged, otherwise `incoming`
/// is used as-is. Either way the result goes to a temp file in the same
/// directory, is restricted to the owner, and then renamed over `path`, so
/// credentials are never readable by others even briefly.
pub fn install_kubeconfig(path: &Path, incoming: &str) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let contents = if path.exists() {
        let existing = fs::read_to_string(path)?;
        debug!(path = %path.display(), "merging into existing kubeconfig");
        merge_kubeconfig(&existing, incoming)?
    } else {
        debug!(path = %path.display(), "writing new kubeconfig");
        incoming.to_string()
    };

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    restrict_permissions(tmp.path())?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
