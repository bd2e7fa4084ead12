use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};

use crate::project;
use crate::settings::model::{JobSettings, SCHEMA_VERSION};

/// Serialize the settings to the fixed project location.
///
/// Write failures are real errors and propagate to the caller.
pub fn save(settings: &JobSettings) -> Result<()> {
    save_to(settings, Path::new(project::SETTINGS_FILE))
}

pub fn save_to(settings: &JobSettings, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Can't create settings directory {}", parent.display()))?;
        }
    }

    let json = serde_json::to_string_pretty(settings).context("Can't serialize settings")?;
    fs::write(path, json)
        .with_context(|| format!("Can't write settings to {}", path.display()))?;

    info!("Saved settings to {}", path.display());
    Ok(())
}

/// Load the settings from the fixed project location.
///
/// A missing file, unreadable content, or a snapshot written by another
/// version all degrade to `None`. Nothing here is worth crashing over, the
/// caller falls back to prompting for fresh settings.
pub fn load() -> Option<JobSettings> {
    load_from(Path::new(project::SETTINGS_FILE))
}

pub fn load_from(path: &Path) -> Option<JobSettings> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        // A fresh project has no snapshot yet
        Err(_) => return None,
    };

    let settings: JobSettings = match serde_json::from_str(&text) {
        Ok(settings) => settings,
        Err(err) => {
            warn!("Ignoring unreadable settings at {}: {}", path.display(), err);
            return None;
        }
    };

    if settings.schema_version != SCHEMA_VERSION {
        warn!(
            "Ignoring settings from another version (found {}, expected {})",
            settings.schema_version, SCHEMA_VERSION
        );
        return None;
    }

    Some(settings)
}
