use serde::{Deserialize, Serialize};

/// Bumped whenever the settings layout changes. Snapshots written by another
/// version are discarded on load instead of being coerced.
pub const SCHEMA_VERSION: u32 = 3;

/// Queues available on the cluster and whether they schedule onto GPU nodes
pub const QUEUES: &[(&str, bool)] = &[
    ("hpc", false),
    ("gpuv100", true),
    ("gpua100", true),
];

/// Everything needed to build a submission script for one project.
///
/// Treated as an immutable value: an edit builds a whole new record with
/// struct update syntax, so a half-applied change is never observable.
///
/// Empty optional fields mean "figure it out": an empty `working_dir` runs
/// from the current directory, empty `env_file`/`req_file` are generated on
/// demand, an empty `email` disables notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSettings {
    pub schema_version: u32,

    pub name: String,
    pub env_name: String,
    pub env_on_done_delete: bool,

    pub working_dir: String,
    pub env_file: String,
    pub req_file: String,
    pub script: String,

    pub time_max: String,
    pub queue: String,
    pub is_gpu_queue: bool,
    pub cpu_cores: u32,
    pub cpu_mem_per_core: String,
    pub cpu_mem_max: String,

    pub email: String,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            name: "job".to_string(),
            env_name: "job-env".to_string(),
            env_on_done_delete: false,
            working_dir: String::new(),
            env_file: String::new(),
            req_file: String::new(),
            script: "python main.py".to_string(),
            time_max: "24:00".to_string(),
            queue: "hpc".to_string(),
            is_gpu_queue: false,
            cpu_cores: 4,
            cpu_mem_per_core: "4GB".to_string(),
            cpu_mem_max: "5GB".to_string(),
            email: String::new(),
        }
    }
}

/// Whether a queue name is known and schedules onto GPU nodes
pub fn queue_is_gpu(queue: &str) -> Option<bool> {
    QUEUES
        .iter()
        .find(|(name, _)| *name == queue)
        .map(|(_, gpu)| *gpu)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_current_version() {
        assert_eq!(JobSettings::default().schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn test_default_queue_is_known() {
        let settings = JobSettings::default();
        assert_eq!(queue_is_gpu(&settings.queue), Some(settings.is_gpu_queue));
    }

    #[test]
    fn test_queue_lookup() {
        assert_eq!(queue_is_gpu("hpc"), Some(false));
        assert_eq!(queue_is_gpu("gpuv100"), Some(true));
        assert_eq!(queue_is_gpu("weekend-special"), None);
    }
}
