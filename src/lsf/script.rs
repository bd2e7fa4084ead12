use anyhow::{Context, Result};
use serde::Serialize;
use tinytemplate::TinyTemplate;

use crate::project;
use crate::settings::model::JobSettings;

/// Build the submission script for a job.
///
/// Pure text assembly: no I/O, and the same settings and arguments always
/// produce byte-identical output. The scheduler reads `#BSUB` directives
/// top-down, so sections are appended in a fixed order and a disabled
/// section is left out entirely rather than rendered empty.
pub fn render(settings: &JobSettings, extra_args: &[String]) -> Result<String> {
    let mut sections: Vec<String> = Vec::new();

    sections.push(render_header(settings)?);
    if settings.is_gpu_queue {
        sections.push(gpu_request());
    }
    sections.push(render_resources(settings)?);
    sections.push(render_redirect(settings)?);
    if !settings.email.is_empty() {
        sections.push(render_notify(settings)?);
    }
    sections.push(shell_bootstrap());
    if !settings.working_dir.is_empty() {
        sections.push(render_workdir(settings)?);
    }
    sections.push(render_environment(settings)?);
    sections.push(render_run(settings, extra_args)?);
    if settings.env_on_done_delete {
        sections.push(render_teardown(settings)?);
    }

    Ok(sections.concat())
}

/// Rendering context for the job name and queue directives
#[derive(Serialize)]
struct HeaderContext {
    name: String,
    queue: String,
}

fn render_header(settings: &JobSettings) -> Result<String> {
    static HEADER: &str =
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/header.txt"));
    let context = HeaderContext {
        name: settings.name.clone(),
        queue: settings.queue.clone(),
    };
    render_section("header", HEADER, &context)
}

/// The GPU request has no per-job parameters
fn gpu_request() -> String {
    static GPU: &str =
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/gpu.txt"));
    GPU.to_string()
}

/// Rendering context for core, memory, and wall time directives
#[derive(Serialize)]
struct ResourcesContext {
    cpu_cores: u32,
    mem_per_core: String,
    mem_max: String,
    time_max: String,
}

fn render_resources(settings: &JobSettings) -> Result<String> {
    static RESOURCES: &str =
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/resources.txt"));
    let context = ResourcesContext {
        cpu_cores: settings.cpu_cores,
        mem_per_core: settings.cpu_mem_per_core.clone(),
        mem_max: settings.cpu_mem_max.clone(),
        time_max: settings.time_max.clone(),
    };
    render_section("resources", RESOURCES, &context)
}

/// Rendering context for the scheduler output and error files
#[derive(Serialize)]
struct RedirectContext {
    name: String,
    output_dir: &'static str,
    error_dir: &'static str,
}

fn render_redirect(settings: &JobSettings) -> Result<String> {
    static REDIRECT: &str =
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/redirect.txt"));
    let context = RedirectContext {
        name: settings.name.clone(),
        output_dir: project::OUTPUT_DIR,
        error_dir: project::ERROR_DIR,
    };
    render_section("redirect", REDIRECT, &context)
}

/// Rendering context for mail notification directives
#[derive(Serialize)]
struct NotifyContext {
    email: String,
}

fn render_notify(settings: &JobSettings) -> Result<String> {
    static NOTIFY: &str =
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/notify.txt"));
    let context = NotifyContext {
        email: settings.email.clone(),
    };
    render_section("notify", NOTIFY, &context)
}

/// The shell bootstrap is the same for every job
fn shell_bootstrap() -> String {
    static BOOTSTRAP: &str =
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/bootstrap.txt"));
    BOOTSTRAP.to_string()
}

/// Rendering context for the working directory change
#[derive(Serialize)]
struct WorkdirContext {
    working_dir: String,
}

fn render_workdir(settings: &JobSettings) -> Result<String> {
    static WORKDIR: &str =
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/workdir.txt"));
    let context = WorkdirContext {
        working_dir: settings.working_dir.clone(),
    };
    render_section("workdir", WORKDIR, &context)
}

/// Rendering context for environment creation, update, and activation
#[derive(Serialize)]
struct EnvironmentContext {
    env_name: String,
    env_file: String,
}

fn render_environment(settings: &JobSettings) -> Result<String> {
    static ENVIRONMENT: &str =
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/environment.txt"));
    let env_file = if settings.env_file.is_empty() {
        // An unset path means the file is generated at the default location
        project::DEFAULT_ENV_FILE.to_string()
    } else {
        settings.env_file.clone()
    };
    let context = EnvironmentContext {
        env_name: settings.env_name.clone(),
        env_file,
    };
    render_section("environment", ENVIRONMENT, &context)
}

/// Rendering context for the job command itself
#[derive(Serialize)]
struct RunContext {
    script: String,
    extra_args: String,
    name: String,
    run_dir: &'static str,
}

fn render_run(settings: &JobSettings, extra_args: &[String]) -> Result<String> {
    static RUN: &str =
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/run.txt"));
    let extra_args = if extra_args.is_empty() {
        String::new()
    } else {
        format!(" {}", extra_args.join(" "))
    };
    let context = RunContext {
        script: settings.script.clone(),
        extra_args,
        name: settings.name.clone(),
        run_dir: project::RUN_DIR,
    };
    render_section("run", RUN, &context)
}

/// Rendering context for environment removal
#[derive(Serialize)]
struct TeardownContext {
    env_name: String,
}

fn render_teardown(settings: &JobSettings) -> Result<String> {
    static TEARDOWN: &str =
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/teardown.txt"));
    let context = TeardownContext {
        env_name: settings.env_name.clone(),
    };
    render_section("teardown", TEARDOWN, &context)
}

fn render_section<C: Serialize>(
    name: &'static str,
    template: &'static str,
    context: &C,
) -> Result<String> {
    let mut tt = TinyTemplate::new();
    // The output is shell text, not HTML
    tt.set_default_formatter(&tinytemplate::format_unescaped);
    tt.add_template(name, template).expect("Template");
    tt.render(name, context)
        .with_context(|| format!("Can't render the {name} section"))
}
