//! Everything that talks to the LSF scheduler programs

/// Render the bsub submission script from the settings
pub mod script;
/// Pipe a rendered script into bsub and read back the job id
pub mod submit;
/// Merge the bstat status queries into per-job records
pub mod status;
/// Stop jobs with bkill and classify the replies
pub mod kill;
