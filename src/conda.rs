//! Conda environment boundary
//!
//! Listing and existence checks against the local conda installation, plus
//! generation of the environment and requirements files a job needs when the
//! settings leave those paths empty.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};
use log::{info, warn};
use serde::Serialize;
use tinytemplate::TinyTemplate;

use crate::project;
use crate::settings::model::JobSettings;

/// All environment names known to conda, and the active one if any
pub fn environments() -> Result<(HashSet<String>, Option<String>)> {
    let output = Command::new("conda")
        .args(["env", "list"])
        .output()
        .context("Can't run conda")?;

    Ok(parse_environments(&String::from_utf8_lossy(&output.stdout)))
}

fn parse_environments(text: &str) -> (HashSet<String>, Option<String>) {
    let mut names = HashSet::new();
    let mut active = None;

    for line in text.lines() {
        if line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }

        names.insert(fields[0].to_string());
        // conda marks the active environment with an asterisk column
        if fields.get(1) == Some(&"*") {
            active = Some(fields[0].to_string());
        }
    }

    (names, active)
}

pub fn environment_exists(name: &str) -> Result<bool> {
    Ok(environments()?.0.contains(name))
}

/// Remove an environment, returning false when it did not exist
pub fn delete_environment(name: &str) -> Result<bool> {
    if !environment_exists(name)? {
        return Ok(false);
    }

    let status = Command::new("conda")
        .args(["env", "remove", "-n", name, "-y"])
        .status()
        .context("Can't run conda")?;

    Ok(status.success())
}

#[derive(Serialize)]
struct EnvironmentFileContext {
    env_name: String,
    req_file: String,
}

/// Write a minimal environment file that installs the requirements via pip
pub fn write_environment_file(env_name: &str, env_path: &Path, req_file: &str) -> Result<()> {
    static ENVIRONMENT_YML: &str = include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/data/templates/environment_yml.txt"
    ));

    let mut tt = TinyTemplate::new();
    tt.set_default_formatter(&tinytemplate::format_unescaped);
    tt.add_template("environment_yml", ENVIRONMENT_YML)
        .expect("Template");

    let context = EnvironmentFileContext {
        env_name: env_name.to_string(),
        req_file: req_file.to_string(),
    };
    let content = tt
        .render("environment_yml", &context)
        .context("Can't render the environment file")?;

    info!("Writing environment file to {}", env_path.display());
    fs::write(env_path, content)
        .with_context(|| format!("Can't write the environment file to {}", env_path.display()))
}

/// Derive a requirements file from the imports the project actually uses
pub fn write_requirements_file(path: &Path) -> Result<()> {
    let output = Command::new("pipreqs")
        .args(["--force", "--print"])
        .output()
        .context("Can't run pipreqs")?;

    info!("Writing requirements file to {}", path.display());
    fs::write(path, &output.stdout)
        .with_context(|| format!("Can't write the requirements file to {}", path.display()))
}

/// Settings whose environment files exist on disk, and whether any were generated
pub struct EnvironmentFiles {
    pub settings: JobSettings,
    pub generated: bool,
}

/// Make sure the environment and requirements files a job references exist.
///
/// Empty path fields get files generated at the default project locations
/// and the returned settings point at them. A non-empty path that names a
/// missing file yields `None`: the settings are wrong and only the user can
/// decide whether to fix the path or clear it.
pub fn ensure_environment_files(settings: &JobSettings) -> Result<Option<EnvironmentFiles>> {
    let mut settings = settings.clone();
    let mut generated = false;

    if settings.req_file.is_empty() {
        fs::create_dir_all(project::PROJECT_DIR)
            .context("Can't create the project directory")?;
        write_requirements_file(Path::new(project::DEFAULT_REQ_FILE))?;
        settings.req_file = project::DEFAULT_REQ_FILE.to_string();
        generated = true;
    } else if !Path::new(&settings.req_file).is_file() {
        warn!("Requirements file not found at {}", settings.req_file);
        return Ok(None);
    }

    if settings.env_file.is_empty() {
        fs::create_dir_all(project::PROJECT_DIR)
            .context("Can't create the project directory")?;
        write_environment_file(
            &settings.env_name,
            Path::new(project::DEFAULT_ENV_FILE),
            &settings.req_file,
        )?;
        settings.env_file = project::DEFAULT_ENV_FILE.to_string();
        generated = true;
    } else if !Path::new(&settings.env_file).is_file() {
        warn!("Environment file not found at {}", settings.env_file);
        return Ok(None);
    }

    Ok(Some(EnvironmentFiles { settings, generated }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_listing_is_parsed() {
        let text = "\
# conda environments:
#
base                  *  /home/user/miniconda3
train-env                /home/user/miniconda3/envs/train-env
";
        let (names, active) = parse_environments(text);

        assert!(names.contains("base"));
        assert!(names.contains("train-env"));
        assert_eq!(names.len(), 2);
        assert_eq!(active.as_deref(), Some("base"));
    }

    #[test]
    fn test_no_active_environment() {
        let text = "\
# conda environments:
#
train-env                /home/user/miniconda3/envs/train-env
";
        let (names, active) = parse_environments(text);

        assert_eq!(names.len(), 1);
        assert_eq!(active, None);
    }

    #[test]
    fn test_empty_listing() {
        let (names, active) = parse_environments("");
        assert!(names.is_empty());
        assert_eq!(active, None);
    }
}
