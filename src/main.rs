use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;

mod conda;
mod lsf;
mod project;
mod settings;

use crate::lsf::kill;
use crate::lsf::script;
use crate::lsf::status::{self, JobDetails};
use crate::lsf::submit;
use crate::settings::editor::{self, EditOutcome};
use crate::settings::model::JobSettings;
use crate::settings::store;

#[derive(Parser)]
#[command(name = "tonttu", version, about = "Boilerplate-free LSF job management")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit the job, passing extra arguments through to the job command
    Start {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Stop specific jobs, all jobs, or pick interactively
    Stop {
        job_ids: Vec<String>,
        /// Stop every active job
        #[arg(short, long)]
        all: bool,
    },
    /// Show details for all active jobs
    Status,
    /// Create or change the job settings
    Settings,
    /// Write the submission script to a file instead of submitting it
    Export { path: Option<PathBuf> },
    /// Print a job's captured output, error, or run file
    View {
        stream: Stream,
        job_id: String,
    },
}

#[derive(Copy, Clone, ValueEnum)]
enum Stream {
    Output,
    Error,
    Run,
}

impl Stream {
    fn dir(self) -> &'static str {
        match self {
            Stream::Output => project::OUTPUT_DIR,
            Stream::Error => project::ERROR_DIR,
            Stream::Run => project::RUN_DIR,
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();
    info!("moi! starting up");

    let cli = Cli::parse();
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Start { args } => start(&args),
        Commands::Stop { job_ids, all } => stop(job_ids, all),
        Commands::Status => show_status(),
        Commands::Settings => change_settings(),
        Commands::Export { path } => export(path),
        Commands::View { stream, job_id } => view(stream, &job_id),
    }
}

fn start(args: &[String]) -> Result<()> {
    let settings = load_or_create_settings()?;

    let Some(env) = conda::ensure_environment_files(&settings)? else {
        bail!(
            "An environment or requirements file named in the settings does not exist; \
             run \"tonttu settings\" to fix the path or clear it"
        );
    };
    if env.generated {
        println!("Generated environment files for \"{}\"", env.settings.env_name);
    }
    // Keep the generated paths so the next submission reuses the same files
    if env.settings != settings {
        store::save(&env.settings)?;
    }

    if conda::environment_exists(&env.settings.env_name)? {
        info!("Environment {} exists, the job will update it", env.settings.env_name);
    } else {
        info!("Environment {} will be created by the job", env.settings.env_name);
    }

    let job_id = submit::submit_job(&env.settings, args)?;

    let command = if args.is_empty() {
        env.settings.script.clone()
    } else {
        format!("{} {}", env.settings.script, args.join(" "))
    };
    println!(
        "Started job (name: \"{}\", id: \"{}\", command: \"{}\")",
        env.settings.name, job_id, command
    );

    Ok(())
}

fn stop(job_ids: Vec<String>, all: bool) -> Result<()> {
    let requested: BTreeSet<String> = if all {
        status::get_active_jobs()?.into_keys().collect()
    } else if job_ids.is_empty() {
        prompt_job_selection()?
    } else {
        job_ids.into_iter().collect()
    };

    if requested.is_empty() {
        println!("Nothing to stop.");
        return Ok(());
    }

    let report = kill::kill_jobs(&requested)?;
    for id in &report.killed {
        println!("Stopped job {id}");
    }
    for id in &report.still_alive {
        println!("Could not stop job {id}");
    }
    for id in report.unmentioned(&requested) {
        println!("No job {id} found");
    }

    // A killed job never reaches the teardown at the end of its script
    if !report.killed.is_empty() {
        if let Some(settings) = store::load() {
            if settings.env_on_done_delete && conda::delete_environment(&settings.env_name)? {
                println!("Removed environment \"{}\"", settings.env_name);
            }
        }
    }

    Ok(())
}

/// List the active jobs and let the user pick which ones to stop
fn prompt_job_selection() -> Result<BTreeSet<String>> {
    let jobs = status::get_active_jobs()?;
    if jobs.is_empty() {
        return Ok(BTreeSet::new());
    }

    print_status_table(&jobs);
    println!("Job ids to stop (space separated, empty aborts):");

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;

    Ok(line.split_whitespace().map(str::to_string).collect())
}

fn show_status() -> Result<()> {
    let jobs = status::get_active_jobs()?;
    if jobs.is_empty() {
        println!("No active jobs.");
        return Ok(());
    }

    print_status_table(&jobs);
    Ok(())
}

fn print_status_table(jobs: &HashMap<String, JobDetails>) {
    println!(
        "{:<10} {:<16} {:<10} {:<6} {:<12} {:<10} {:>8} {:>8} {:>8} {:>8}",
        "JOBID", "NAME", "QUEUE", "STAT", "START", "ELAPSED", "CPU", "MEM", "AVG", "MAX"
    );

    let mut rows: Vec<&JobDetails> = jobs.values().collect();
    rows.sort_by(|a, b| a.job_id.cmp(&b.job_id));

    for job in rows {
        println!(
            "{:<10} {:<16} {:<10} {:<6} {:<12} {:<10} {:>8} {:>8} {:>8} {:>8}",
            job.job_id,
            job.short_name,
            job.queue,
            job.status,
            job.time_start,
            job.time_elapsed,
            placeholder(&job.cpu_usage),
            placeholder(&job.mem_current),
            placeholder(&job.mem_avg),
            placeholder(&job.mem_max),
        );
    }
}

/// Usage numbers are only shown when the matching query reported the job
fn placeholder(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("-")
}

fn change_settings() -> Result<()> {
    let settings = store::load().unwrap_or_default();

    match edit_interactive(&settings)? {
        EditOutcome::Accepted(updated) => {
            store::save(&updated)?;
            println!("Settings saved.");
            Ok(())
        }
        EditOutcome::Cancelled => bail!("Settings unchanged"),
    }
}

fn export(path: Option<PathBuf>) -> Result<()> {
    let path = path.unwrap_or_else(|| PathBuf::from(project::DEFAULT_EXPORT_FILE));
    let settings = load_or_create_settings()?;

    let script_text = script::render(&settings, &[])?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Can't create directory {}", parent.display()))?;
        }
    }
    fs::write(&path, script_text)
        .with_context(|| format!("Failed writing the script to {}", path.display()))?;

    println!("Exported submission script to {}", path.display());
    Ok(())
}

fn view(stream: Stream, job_id: &str) -> Result<()> {
    let Some(settings) = store::load() else {
        bail!("No settings for this project; run \"tonttu settings\" first");
    };

    let path = Path::new(stream.dir()).join(format!("{}_{}.txt", settings.name, job_id));
    let contents = fs::read_to_string(&path)
        .with_context(|| format!("No captured file at {}", path.display()))?;

    print!("{contents}");
    Ok(())
}

/// Load the project settings, interactively creating them on first use
fn load_or_create_settings() -> Result<JobSettings> {
    if let Some(settings) = store::load() {
        return Ok(settings);
    }

    println!("No usable settings found for this project, let's set them up.");
    match edit_interactive(&JobSettings::default())? {
        EditOutcome::Accepted(settings) => {
            store::save(&settings)?;
            Ok(settings)
        }
        EditOutcome::Cancelled => bail!("Settings are required before a job can be submitted"),
    }
}

fn edit_interactive(settings: &JobSettings) -> Result<EditOutcome> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut out = io::stdout();
    Ok(editor::edit(settings, &mut input, &mut out)?)
}
