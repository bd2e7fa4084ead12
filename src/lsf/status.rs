use std::collections::HashMap;
use std::process::Command;

use anyhow::{Context, Result};
use log::warn;

/// Details for one active job.
///
/// The base query always fills the mandatory fields. CPU and memory figures
/// stay `None` unless the matching query reported a parseable row for this
/// job id, so a consumer has to render a placeholder instead of assuming a
/// value is there.
#[derive(Debug, Clone, PartialEq)]
pub struct JobDetails {
    pub short_name: String,
    pub job_id: String,
    pub queue: String,
    pub status: String,
    pub time_start: String,
    pub time_elapsed: String,

    pub cpu_usage: Option<String>,
    pub mem_current: Option<String>,
    pub mem_avg: Option<String>,
    pub mem_max: Option<String>,
}

/// Query the scheduler for all active jobs, keyed by job id.
///
/// Three independent queries are merged: `bstat` establishes the records,
/// `bstat -C` and `bstat -M` refine them. The queries are not atomic, a job
/// can start or finish in between, so a partially filled record is accepted
/// as the best available answer.
pub fn get_active_jobs() -> Result<HashMap<String, JobDetails>> {
    let overview = run_bstat(&[])?;
    // No output means no jobs, the usage queries can't add anything
    if overview.trim().is_empty() {
        return Ok(HashMap::new());
    }

    let mut jobs = parse_overview(&overview);
    apply_cpu(&mut jobs, &run_bstat(&["-C"])?);
    apply_memory(&mut jobs, &run_bstat(&["-M"])?);

    Ok(jobs)
}

fn run_bstat(args: &[&str]) -> Result<String> {
    let output = Command::new("bstat")
        .args(args)
        .output()
        .with_context(|| format!("Can't run bstat {}", args.join(" ")))?;

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse the base query into one record per job.
///
/// Expected columns after the header line:
/// `JOBID USER QUEUE JOB_NAME NALLOC STAT START_TIME ELAPSED`.
/// A row that doesn't have enough columns is skipped, one odd line must not
/// take down the whole listing.
fn parse_overview(text: &str) -> HashMap<String, JobDetails> {
    let mut jobs = HashMap::new();

    for line in text.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 8 {
            if !fields.is_empty() {
                warn!("Skipping malformed status line: {line}");
            }
            continue;
        }

        jobs.insert(
            fields[0].to_string(),
            JobDetails {
                job_id: fields[0].to_string(),
                queue: fields[2].to_string(),
                short_name: fields[3].to_string(),
                status: fields[5].to_string(),
                time_start: fields[6].to_string(),
                time_elapsed: fields[7].to_string(),
                cpu_usage: None,
                mem_current: None,
                mem_avg: None,
                mem_max: None,
            },
        );
    }

    jobs
}

/// Fold CPU usage rows (`JOBID USER STAT EFFICIENCY`) into existing records.
///
/// A row for a job id the base query never saw is skipped: the job finished
/// or started between the two queries and there is no record to refine.
fn apply_cpu(jobs: &mut HashMap<String, JobDetails>, text: &str) {
    for line in text.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            continue;
        }

        match jobs.get_mut(fields[0]) {
            Some(job) => job.cpu_usage = Some(fields[3].to_string()),
            None => warn!("CPU usage reported for unknown job {}", fields[0]),
        }
    }
}

/// Fold memory rows (`JOBID USER STAT MEM AVG_MEM MAX_MEM`) into existing
/// records, with the same guard as the CPU rows.
fn apply_memory(jobs: &mut HashMap<String, JobDetails>, text: &str) {
    for line in text.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 6 {
            continue;
        }

        match jobs.get_mut(fields[0]) {
            Some(job) => {
                job.mem_current = Some(fields[3].to_string());
                job.mem_avg = Some(fields[4].to_string());
                job.mem_max = Some(fields[5].to_string());
            }
            None => warn!("Memory usage reported for unknown job {}", fields[0]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OVERVIEW: &str = "\
JOBID    USER      QUEUE      JOB_NAME   NALLOC STAT  START_TIME  ELAPSED
1001     s114514   hpc        train      4      RUN   10:04       02:11
1002     s114514   gpuv100    sample     1      PEND  -           -
";

    #[test]
    fn test_overview_establishes_base_records() {
        let jobs = parse_overview(OVERVIEW);
        assert_eq!(jobs.len(), 2);

        let train = &jobs["1001"];
        assert_eq!(train.short_name, "train");
        assert_eq!(train.queue, "hpc");
        assert_eq!(train.status, "RUN");
        assert_eq!(train.time_start, "10:04");
        assert_eq!(train.time_elapsed, "02:11");
    }

    #[test]
    fn test_usage_fields_absent_without_usage_rows() {
        let mut jobs = parse_overview(OVERVIEW);
        apply_cpu(&mut jobs, "JOBID USER STAT EFFICIENCY\n");
        apply_memory(&mut jobs, "");

        for job in jobs.values() {
            assert_eq!(job.cpu_usage, None);
            assert_eq!(job.mem_current, None);
            assert_eq!(job.mem_avg, None);
            assert_eq!(job.mem_max, None);
        }
    }

    #[test]
    fn test_cpu_rows_refine_existing_records() {
        let mut jobs = parse_overview(OVERVIEW);
        apply_cpu(
            &mut jobs,
            "JOBID    USER     STAT  EFFICIENCY\n1001     s114514  RUN   87.5%\n",
        );

        assert_eq!(jobs["1001"].cpu_usage.as_deref(), Some("87.5%"));
        assert_eq!(jobs["1002"].cpu_usage, None);
    }

    #[test]
    fn test_memory_rows_refine_existing_records() {
        let mut jobs = parse_overview(OVERVIEW);
        apply_memory(
            &mut jobs,
            "JOBID    USER     STAT  MEM    AVG_MEM  MAX_MEM\n1001     s114514  RUN   2.1GB  1.8GB    3.0GB\n",
        );

        let train = &jobs["1001"];
        assert_eq!(train.mem_current.as_deref(), Some("2.1GB"));
        assert_eq!(train.mem_avg.as_deref(), Some("1.8GB"));
        assert_eq!(train.mem_max.as_deref(), Some("3.0GB"));
    }

    #[test]
    fn test_usage_row_for_unknown_job_is_skipped() {
        let mut jobs = parse_overview(OVERVIEW);
        apply_cpu(
            &mut jobs,
            "JOBID    USER     STAT  EFFICIENCY\n9999     s114514  RUN   12.0%\n",
        );

        // nothing crashed and no phantom record appeared
        assert_eq!(jobs.len(), 2);
        assert!(!jobs.contains_key("9999"));
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let text = "\
JOBID    USER      QUEUE      JOB_NAME   NALLOC STAT  START_TIME  ELAPSED
1001     s114514   hpc        train      4      RUN   10:04       02:11
garbage line
1003     s114514   hpc        infer      2      RUN   11:30       00:40
";
        let jobs = parse_overview(text);
        assert_eq!(jobs.len(), 2);
        assert!(jobs.contains_key("1001"));
        assert!(jobs.contains_key("1003"));
    }

    #[test]
    fn test_empty_overview_is_empty_mapping() {
        assert!(parse_overview("").is_empty());
    }
}
