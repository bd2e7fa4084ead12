use std::collections::BTreeSet;
use std::process::Command;

use anyhow::{Context, Result};
use log::warn;
use regex_lite::Regex;

/// Outcome of a batch termination request.
///
/// `killed` and `still_alive` only cover ids the scheduler mentioned in its
/// reply; ids it stayed silent about are computed with [`KillReport::unmentioned`].
#[derive(Debug, Default, PartialEq)]
pub struct KillReport {
    pub killed: BTreeSet<String>,
    pub still_alive: BTreeSet<String>,
}

impl KillReport {
    /// Requested ids the scheduler never mentioned in its reply.
    ///
    /// These are reported as "not found", distinct from ids the scheduler
    /// explicitly refused to kill.
    pub fn unmentioned(&self, requested: &BTreeSet<String>) -> BTreeSet<String> {
        requested
            .iter()
            .filter(|id| !self.killed.contains(*id) && !self.still_alive.contains(*id))
            .cloned()
            .collect()
    }
}

/// Ask the scheduler to terminate all given jobs in one batch request.
///
/// An empty request set returns an empty report without running anything.
pub fn kill_jobs(ids: &BTreeSet<String>) -> Result<KillReport> {
    if ids.is_empty() {
        return Ok(KillReport::default());
    }

    let output = Command::new("bkill")
        .args(ids)
        .output()
        .context("Can't run bkill")?;

    // Replies end up on both streams depending on the outcome
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );

    Ok(classify_reply(&text))
}

/// Sort each reply line into killed or still-alive.
///
/// Lines that match no known pattern are logged and skipped so a new reply
/// format shows up in the logs instead of silently disappearing, and one
/// strange line never aborts the rest of the batch.
fn classify_reply(text: &str) -> KillReport {
    let terminated = Regex::new(r"^Job <(?P<id>\d+)> is being terminated$").expect("Pattern");
    let not_found = Regex::new(r"^Job <(?P<id>\d+)>: No matching job found$").expect("Pattern");
    let finished = Regex::new(r"^Job <(?P<id>\d+)>: Job has already finished$").expect("Pattern");

    let mut report = KillReport::default();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(caps) = terminated.captures(line) {
            report.killed.insert(caps["id"].to_string());
        } else if let Some(caps) = not_found
            .captures(line)
            .or_else(|| finished.captures(line))
        {
            report.still_alive.insert(caps["id"].to_string());
        } else {
            warn!("Unrecognized reply from scheduler: {line}");
        }
    }

    report
}
