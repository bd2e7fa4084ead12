//! Interactive browse/edit loop over the settings fields
//!
//! The loop itself knows nothing about individual fields: every field is a
//! table entry owning its label, formatter, and validating applier. Adding a
//! field means adding a table entry.
//!
//! I/O goes through generic reader/writer handles so tests can drive the
//! whole state machine with scripted input.

use std::io::{self, BufRead, Write};
use std::path::Path;

use crate::settings::model::{queue_is_gpu, JobSettings, QUEUES};

/// Result of an editing session
#[derive(Debug, PartialEq)]
pub enum EditOutcome {
    /// The user saved; persisting the record is the caller's job
    Accepted(JobSettings),
    /// The user backed out; every edit made in the session is discarded
    Cancelled,
}

struct FieldSpec {
    label: &'static str,
    hint: &'static str,
    format: fn(&JobSettings) -> String,
    /// Validate the input and build the replacement record
    apply: fn(&JobSettings, &str) -> Result<JobSettings, String>,
    /// Reset the field to empty, for fields where empty is meaningful
    clear: Option<fn(&JobSettings) -> JobSettings>,
}

static FIELDS: &[FieldSpec] = &[
    FieldSpec {
        label: "Job name",
        hint: "no spaces",
        format: |s| s.name.clone(),
        apply: apply_name,
        clear: None,
    },
    FieldSpec {
        label: "Command",
        hint: "the command line the job runs, e.g. python main.py",
        format: |s| s.script.clone(),
        apply: apply_script,
        clear: None,
    },
    FieldSpec {
        label: "Environment name",
        hint: "no spaces",
        format: |s| s.env_name.clone(),
        apply: apply_env_name,
        clear: None,
    },
    FieldSpec {
        label: "Delete environment when done",
        hint: "yes or no",
        format: |s| yes_no(s.env_on_done_delete),
        apply: apply_env_on_done_delete,
        clear: None,
    },
    FieldSpec {
        label: "Environment file",
        hint: "path to an environment.yml, empty generates one, \"-\" clears",
        format: |s| or_placeholder(&s.env_file, "(generated)"),
        apply: apply_env_file,
        clear: Some(|s| JobSettings {
            env_file: String::new(),
            ..s.clone()
        }),
    },
    FieldSpec {
        label: "Requirements file",
        hint: "path to a requirements.txt, empty generates one, \"-\" clears",
        format: |s| or_placeholder(&s.req_file, "(generated)"),
        apply: apply_req_file,
        clear: Some(|s| JobSettings {
            req_file: String::new(),
            ..s.clone()
        }),
    },
    FieldSpec {
        label: "Working directory",
        hint: "empty runs from the current directory, \"-\" clears",
        format: |s| or_placeholder(&s.working_dir, "(current directory)"),
        apply: apply_working_dir,
        clear: Some(|s| JobSettings {
            working_dir: String::new(),
            ..s.clone()
        }),
    },
    FieldSpec {
        label: "Queue",
        hint: "one of: hpc, gpuv100, gpua100",
        format: format_queue,
        apply: apply_queue,
        clear: None,
    },
    FieldSpec {
        label: "Wall time",
        hint: "HH:MM before the job is killed",
        format: |s| s.time_max.clone(),
        apply: apply_time_max,
        clear: None,
    },
    FieldSpec {
        label: "CPU cores",
        hint: "between 1 and 64",
        format: |s| s.cpu_cores.to_string(),
        apply: apply_cpu_cores,
        clear: None,
    },
    FieldSpec {
        label: "Memory per core",
        hint: "e.g. 4GB or 512MB",
        format: |s| s.cpu_mem_per_core.clone(),
        apply: apply_mem_per_core,
        clear: None,
    },
    FieldSpec {
        label: "Memory limit",
        hint: "kill threshold, e.g. 5GB",
        format: |s| s.cpu_mem_max.clone(),
        apply: apply_mem_max,
        clear: None,
    },
    FieldSpec {
        label: "Notification email",
        hint: "empty disables mails, \"-\" clears",
        format: |s| or_placeholder(&s.email, "(none)"),
        apply: apply_email,
        clear: Some(|s| JobSettings {
            email: String::new(),
            ..s.clone()
        }),
    },
];

/// Run the editing session until the user saves or cancels.
///
/// End of input counts as cancelling, a half-finished session must never
/// produce a half-edited record.
pub fn edit<R: BufRead, W: Write>(
    settings: &JobSettings,
    input: &mut R,
    out: &mut W,
) -> io::Result<EditOutcome> {
    let mut current = settings.clone();

    loop {
        render_menu(&current, out)?;

        let Some(choice) = read_line(input)? else {
            return Ok(EditOutcome::Cancelled);
        };
        let choice = choice.trim().to_lowercase();

        match choice.as_str() {
            "s" | "save" => return Ok(EditOutcome::Accepted(current)),
            "c" | "cancel" => return Ok(EditOutcome::Cancelled),
            _ => {}
        }

        let field = match choice.parse::<usize>() {
            Ok(index) if (1..=FIELDS.len()).contains(&index) => &FIELDS[index - 1],
            _ => {
                writeln!(out, "Pick a field number, [s]ave, or [c]ancel")?;
                continue;
            }
        };

        match edit_field(field, current, input, out)? {
            Some(updated) => current = updated,
            None => return Ok(EditOutcome::Cancelled),
        }
    }
}

/// Prompt for one field until the input validates.
///
/// Empty input keeps the current value. Invalid input prints the reason and
/// asks again, it never falls back to anything silently.
fn edit_field<R: BufRead, W: Write>(
    field: &FieldSpec,
    settings: JobSettings,
    input: &mut R,
    out: &mut W,
) -> io::Result<Option<JobSettings>> {
    loop {
        writeln!(out)?;
        writeln!(out, "{} [{}]", field.label, (field.format)(&settings))?;
        writeln!(out, "({})", field.hint)?;
        write!(out, ">>> ")?;
        out.flush()?;

        let Some(line) = read_line(input)? else {
            return Ok(None);
        };
        let line = line.trim();

        if line.is_empty() {
            return Ok(Some(settings));
        }
        if line == "-" {
            if let Some(clear) = field.clear {
                return Ok(Some(clear(&settings)));
            }
        }

        match (field.apply)(&settings, line) {
            Ok(updated) => return Ok(Some(updated)),
            Err(reason) => writeln!(out, "{reason}")?,
        }
    }
}

fn render_menu<W: Write>(settings: &JobSettings, out: &mut W) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "Job settings")?;
    for (index, field) in FIELDS.iter().enumerate() {
        writeln!(
            out,
            "{:>3}. {:<30} {}",
            index + 1,
            field.label,
            (field.format)(settings)
        )?;
    }
    writeln!(out, "  s. Save and return")?;
    writeln!(out, "  c. Cancel without saving")?;
    write!(out, ">>> ")?;
    out.flush()
}

fn read_line<R: BufRead>(input: &mut R) -> io::Result<Option<String>> {
    let mut line = String::new();
    match input.read_line(&mut line)? {
        0 => Ok(None),
        _ => Ok(Some(line)),
    }
}

fn yes_no(value: bool) -> String {
    let text = if value { "yes" } else { "no" };
    text.to_string()
}

fn or_placeholder(value: &str, placeholder: &str) -> String {
    let text = if value.is_empty() { placeholder } else { value };
    text.to_string()
}

fn format_queue(settings: &JobSettings) -> String {
    if settings.is_gpu_queue {
        format!("{} (gpu)", settings.queue)
    } else {
        settings.queue.clone()
    }
}

fn word(input: &str) -> Result<String, String> {
    if input.contains(char::is_whitespace) {
        return Err("Spaces are not allowed here".to_string());
    }
    Ok(input.to_string())
}

fn apply_name(settings: &JobSettings, input: &str) -> Result<JobSettings, String> {
    Ok(JobSettings {
        name: word(input)?,
        ..settings.clone()
    })
}

fn apply_script(settings: &JobSettings, input: &str) -> Result<JobSettings, String> {
    Ok(JobSettings {
        script: input.to_string(),
        ..settings.clone()
    })
}

fn apply_env_name(settings: &JobSettings, input: &str) -> Result<JobSettings, String> {
    Ok(JobSettings {
        env_name: word(input)?,
        ..settings.clone()
    })
}

fn apply_env_on_done_delete(settings: &JobSettings, input: &str) -> Result<JobSettings, String> {
    Ok(JobSettings {
        env_on_done_delete: parse_bool(input)?,
        ..settings.clone()
    })
}

fn parse_bool(input: &str) -> Result<bool, String> {
    match input.to_lowercase().as_str() {
        "y" | "yes" | "true" => Ok(true),
        "n" | "no" | "false" => Ok(false),
        _ => Err("Answer yes or no".to_string()),
    }
}

fn existing_file(input: &str) -> Result<String, String> {
    if Path::new(input).is_file() {
        Ok(input.to_string())
    } else {
        Err(format!("No file at {input}"))
    }
}

fn apply_env_file(settings: &JobSettings, input: &str) -> Result<JobSettings, String> {
    Ok(JobSettings {
        env_file: existing_file(input)?,
        ..settings.clone()
    })
}

fn apply_req_file(settings: &JobSettings, input: &str) -> Result<JobSettings, String> {
    Ok(JobSettings {
        req_file: existing_file(input)?,
        ..settings.clone()
    })
}

fn apply_working_dir(settings: &JobSettings, input: &str) -> Result<JobSettings, String> {
    if !Path::new(input).is_dir() {
        return Err(format!("No directory at {input}"));
    }
    Ok(JobSettings {
        working_dir: input.to_string(),
        ..settings.clone()
    })
}

/// The queue choice drives two fields: the queue name and the GPU flag are
/// always replaced together, one is never updated without the other.
fn apply_queue(settings: &JobSettings, input: &str) -> Result<JobSettings, String> {
    let choice = input.to_lowercase();
    match queue_is_gpu(&choice) {
        Some(gpu) => Ok(JobSettings {
            queue: choice,
            is_gpu_queue: gpu,
            ..settings.clone()
        }),
        None => Err(format!(
            "Unknown queue, pick one of: {}",
            QUEUES
                .iter()
                .map(|(name, _)| *name)
                .collect::<Vec<_>>()
                .join(", ")
        )),
    }
}

fn apply_time_max(settings: &JobSettings, input: &str) -> Result<JobSettings, String> {
    let Some((hours, minutes)) = input.split_once(':') else {
        return Err("Use the HH:MM form, e.g. 24:00".to_string());
    };
    let hours_ok = !hours.is_empty() && hours.chars().all(|c| c.is_ascii_digit());
    let minutes_ok = minutes.len() == 2
        && minutes.chars().all(|c| c.is_ascii_digit())
        && minutes.parse::<u32>().unwrap_or(60) < 60;
    if !hours_ok || !minutes_ok {
        return Err("Use the HH:MM form, e.g. 24:00".to_string());
    }
    Ok(JobSettings {
        time_max: input.to_string(),
        ..settings.clone()
    })
}

fn apply_cpu_cores(settings: &JobSettings, input: &str) -> Result<JobSettings, String> {
    match input.parse::<u32>() {
        Ok(cores) if (1..=64).contains(&cores) => Ok(JobSettings {
            cpu_cores: cores,
            ..settings.clone()
        }),
        _ => Err("Core count must be between 1 and 64".to_string()),
    }
}

fn memory_amount(input: &str) -> Result<String, String> {
    let upper = input.to_uppercase();
    let digits = upper.trim_end_matches("GB").trim_end_matches("MB");
    let has_unit = upper.ends_with("GB") || upper.ends_with("MB");
    if !has_unit || digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err("Give an amount with a unit, e.g. 4GB or 512MB".to_string());
    }
    Ok(upper)
}

fn apply_mem_per_core(settings: &JobSettings, input: &str) -> Result<JobSettings, String> {
    Ok(JobSettings {
        cpu_mem_per_core: memory_amount(input)?,
        ..settings.clone()
    })
}

fn apply_mem_max(settings: &JobSettings, input: &str) -> Result<JobSettings, String> {
    Ok(JobSettings {
        cpu_mem_max: memory_amount(input)?,
        ..settings.clone()
    })
}

fn apply_email(settings: &JobSettings, input: &str) -> Result<JobSettings, String> {
    if !input.contains('@') {
        return Err("That does not look like an email address".to_string());
    }
    Ok(JobSettings {
        email: input.to_string(),
        ..settings.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn run_editor(settings: &JobSettings, script: &str) -> EditOutcome {
        let mut input = Cursor::new(script.to_string());
        let mut out = Vec::new();
        edit(settings, &mut input, &mut out).unwrap()
    }

    #[test]
    fn test_cancel_returns_no_change() {
        let outcome = run_editor(&JobSettings::default(), "c\n");
        assert_eq!(outcome, EditOutcome::Cancelled);
    }

    #[test]
    fn test_end_of_input_counts_as_cancel() {
        let outcome = run_editor(&JobSettings::default(), "");
        assert_eq!(outcome, EditOutcome::Cancelled);
    }

    #[test]
    fn test_save_without_edits_returns_the_same_record() {
        let settings = JobSettings::default();
        let outcome = run_editor(&settings, "s\n");
        assert_eq!(outcome, EditOutcome::Accepted(settings));
    }

    #[test]
    fn test_edited_field_lands_in_the_saved_record() {
        let outcome = run_editor(&JobSettings::default(), "1\nsimulate\ns\n");
        let EditOutcome::Accepted(settings) = outcome else {
            panic!("expected an accepted outcome");
        };
        assert_eq!(settings.name, "simulate");
    }

    #[test]
    fn test_cancel_discards_every_prior_edit() {
        let outcome = run_editor(&JobSettings::default(), "1\nsimulate\n10\n16\nc\n");
        assert_eq!(outcome, EditOutcome::Cancelled);
    }

    #[test]
    fn test_invalid_input_reprompts_until_valid() {
        let outcome = run_editor(&JobSettings::default(), "1\nbad name\ngood-name\ns\n");
        let EditOutcome::Accepted(settings) = outcome else {
            panic!("expected an accepted outcome");
        };
        assert_eq!(settings.name, "good-name");
    }

    #[test]
    fn test_empty_input_keeps_the_current_value() {
        let defaults = JobSettings::default();
        let outcome = run_editor(&defaults, "1\n\ns\n");
        assert_eq!(outcome, EditOutcome::Accepted(defaults));
    }

    #[test]
    fn test_queue_choice_updates_queue_and_gpu_flag_together() {
        let outcome = run_editor(&JobSettings::default(), "8\ngpuv100\ns\n");
        let EditOutcome::Accepted(settings) = outcome else {
            panic!("expected an accepted outcome");
        };
        assert_eq!(settings.queue, "gpuv100");
        assert!(settings.is_gpu_queue);

        let outcome = run_editor(&settings, "8\nhpc\ns\n");
        let EditOutcome::Accepted(settings) = outcome else {
            panic!("expected an accepted outcome");
        };
        assert_eq!(settings.queue, "hpc");
        assert!(!settings.is_gpu_queue);
    }

    #[test]
    fn test_unknown_queue_reprompts() {
        let outcome = run_editor(&JobSettings::default(), "8\nweekend-special\nhpc\ns\n");
        let EditOutcome::Accepted(settings) = outcome else {
            panic!("expected an accepted outcome");
        };
        assert_eq!(settings.queue, "hpc");
    }

    #[test]
    fn test_boolean_synonyms() {
        for (answer, expected) in [("y", true), ("yes", true), ("n", false), ("false", false)] {
            let outcome = run_editor(&JobSettings::default(), &format!("4\n{answer}\ns\n"));
            let EditOutcome::Accepted(settings) = outcome else {
                panic!("expected an accepted outcome");
            };
            assert_eq!(settings.env_on_done_delete, expected, "answer {answer}");
        }
    }

    #[test]
    fn test_dash_clears_the_email() {
        let settings = JobSettings {
            email: "user@example.org".to_string(),
            ..JobSettings::default()
        };
        let outcome = run_editor(&settings, "13\n-\ns\n");
        let EditOutcome::Accepted(settings) = outcome else {
            panic!("expected an accepted outcome");
        };
        assert_eq!(settings.email, "");
    }

    #[test]
    fn test_wall_time_validation() {
        let outcome = run_editor(&JobSettings::default(), "9\nsoon\n9:99\n72:30\ns\n");
        let EditOutcome::Accepted(settings) = outcome else {
            panic!("expected an accepted outcome");
        };
        assert_eq!(settings.time_max, "72:30");
    }

    #[test]
    fn test_core_count_bounds() {
        let outcome = run_editor(&JobSettings::default(), "10\n0\n500\n16\ns\n");
        let EditOutcome::Accepted(settings) = outcome else {
            panic!("expected an accepted outcome");
        };
        assert_eq!(settings.cpu_cores, 16);
    }

    #[test]
    fn test_memory_validation_normalizes_unit_case() {
        let outcome = run_editor(&JobSettings::default(), "11\nplenty\n8gb\ns\n");
        let EditOutcome::Accepted(settings) = outcome else {
            panic!("expected an accepted outcome");
        };
        assert_eq!(settings.cpu_mem_per_core, "8GB");
    }

    #[test]
    fn test_email_must_look_like_one() {
        let outcome = run_editor(
            &JobSettings::default(),
            "13\nnot-an-address\nuser@example.org\ns\n",
        );
        let EditOutcome::Accepted(settings) = outcome else {
            panic!("expected an accepted outcome");
        };
        assert_eq!(settings.email, "user@example.org");
    }

    #[test]
    fn test_menu_lists_every_field() {
        let mut input = Cursor::new("c\n".to_string());
        let mut out = Vec::new();
        edit(&JobSettings::default(), &mut input, &mut out).unwrap();

        let menu = String::from_utf8(out).unwrap();
        for field in FIELDS {
            assert!(menu.contains(field.label), "menu misses {}", field.label);
        }
        assert!(menu.contains("Save"));
        assert!(menu.contains("Cancel"));
    }
}
