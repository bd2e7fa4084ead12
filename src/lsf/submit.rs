use std::io::Write;
use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};
use log::info;
use regex_lite::Regex;

use crate::lsf::script;
use crate::project;
use crate::settings::model::JobSettings;

/// Render the submission script and pipe it into `bsub`.
///
/// Returns the job id the scheduler assigned. Not being able to find one in
/// the reply is fatal for the submission, the raw reply is included so the
/// user can see what the scheduler actually said.
pub fn submit_job(settings: &JobSettings, extra_args: &[String]) -> Result<String> {
    project::ensure_dirs().context("Can't create the project directories")?;

    let script_text = script::render(settings, extra_args)?;

    let mut child = Command::new("bsub")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .context("Can't run bsub")?;

    let mut stdin = child.stdin.take().expect("Piped stdin");
    stdin
        .write_all(script_text.as_bytes())
        .context("Can't pipe the script into bsub")?;
    // closing stdin lets bsub read to the end
    drop(stdin);

    let output = child.wait_with_output().context("bsub did not finish")?;
    let stdout = String::from_utf8_lossy(&output.stdout);

    match extract_job_id(&stdout) {
        Some(job_id) => {
            info!("Scheduler assigned job id {job_id}");
            Ok(job_id)
        }
        None => bail!(
            "Submission did not return a job id\nstdout: {}\nstderr: {}",
            stdout.trim(),
            String::from_utf8_lossy(&output.stderr).trim()
        ),
    }
}

/// The scheduler acknowledges a submission with `Job <id> is submitted to queue ...`
fn extract_job_id(text: &str) -> Option<String> {
    let pattern = Regex::new(r"Job <(?P<id>\d+)>").expect("Pattern");
    pattern.captures(text).map(|caps| caps["id"].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_is_extracted_from_acknowledgement() {
        let reply = "Job <2151801> is submitted to queue <hpc>.\n";
        assert_eq!(extract_job_id(reply), Some("2151801".to_string()));
    }

    #[test]
    fn test_missing_job_id_is_none() {
        assert_eq!(extract_job_id("Request aborted by esub.\n"), None);
        assert_eq!(extract_job_id(""), None);
    }
}
