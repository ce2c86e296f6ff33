//! Backend-safe job names.

use job_types::ResourceId;
use rand::distr::Alphanumeric;
use rand::Rng;

/// Longest job name we hand to the backend; leaves room for the pod suffix it appends.
pub const MAX_JOB_NAME_LENGTH: usize = 52;

const SUFFIX_LENGTH: usize = 10;

/// `_` becomes `.`, `/` and `:` are dropped, the rest is lower-cased and restricted to
/// `[a-z0-9.-]`.
fn sanitize(raw: &str) -> String {
    raw.chars()
        .filter_map(|c| match c {
            '_' => Some('.'),
            '/' | ':' => None,
            c => Some(c.to_ascii_lowercase()),
        })
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect()
}

fn random_suffix<R: Rng>(rng: &mut R) -> String {
    (0..SUFFIX_LENGTH)
        .map(|_| (rng.sample(Alphanumeric) as char).to_ascii_lowercase())
        .collect()
}

/// Name for one submission of `id`: `[<prefix>-]<kind>-<name>-<variant>`, sanitized, cut so the
/// random suffix fits, then suffixed. Repeated calls for one resource never collide.
pub fn create_job_name<R: Rng>(id: &ResourceId, prefix: Option<&str>, rng: &mut R) -> String {
    let mut base = format!("{}-{}-{}", id.resource_type, id.name, id.variant);
    if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
        base = format!("{}-{}", prefix, base);
    }
    let mut base = sanitize(&base);
    base.truncate(MAX_JOB_NAME_LENGTH - SUFFIX_LENGTH - 1);
    let base = base.trim_matches(|c| c == '.' || c == '-');
    let base = if base.is_empty() { "job" } else { base };
    format!("{}-{}", base, random_suffix(rng))
}

/// Name for work with no resource identity: `job-` and a v4 UUID drawn from `rng`.
pub fn random_job_name<R: Rng>(rng: &mut R) -> String {
    let id = uuid::Builder::from_random_bytes(rng.random()).into_uuid();
    let mut name = format!("job-{}", id.simple());
    name.truncate(MAX_JOB_NAME_LENGTH);
    name
}

/// Job name for `id`, falling back to a random one when `id` carries no name.
pub fn job_name_for<R: Rng>(id: Option<&ResourceId>, prefix: Option<&str>, rng: &mut R) -> String {
    match id {
        Some(id) if !id.name.is_empty() => create_job_name(id, prefix, rng),
        _ => random_job_name(rng),
    }
}

/// Name of the recurring schedule wrapping `job_name`.
pub fn cron_job_name(job_name: &str) -> String {
    format!("cron-{}", job_name)
}
