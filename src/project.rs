//! Fixed project-relative locations for everything the tool writes
//!
//! All paths live under a single hidden folder in the project directory so
//! a project can be cleaned up by deleting that one folder.

use std::fs;
use std::io;
use std::path::Path;

pub const PROJECT_DIR: &str = ".tonttu";

/// Serialized settings snapshot
pub const SETTINGS_FILE: &str = ".tonttu/settings.json";

/// Scheduler stdout per job
pub const OUTPUT_DIR: &str = ".tonttu/output";
/// Scheduler stderr per job
pub const ERROR_DIR: &str = ".tonttu/error";
/// Captured stdout of the job command itself
pub const RUN_DIR: &str = ".tonttu/run";

/// Environment file written when the settings leave the path empty
pub const DEFAULT_ENV_FILE: &str = ".tonttu/environment.yml";
/// Requirements file written when the settings leave the path empty
pub const DEFAULT_REQ_FILE: &str = ".tonttu/requirements.txt";

/// Where `export` writes the script when no path is given
pub const DEFAULT_EXPORT_FILE: &str = "submit.sh";

/// Create the directories a submitted job writes into
pub fn ensure_dirs() -> io::Result<()> {
    for dir in [OUTPUT_DIR, ERROR_DIR, RUN_DIR] {
        if !Path::new(dir).is_dir() {
            fs::create_dir_all(dir)?;
        }
    }
    Ok(())
}
