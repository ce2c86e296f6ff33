//! CPU/memory requests and limits, validated against the backend's quantity grammar.

use job_types::JobError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const CPU: &str = "cpu";
pub const MEMORY: &str = "memory";

const BINARY_SI: &[&str] = &["Ki", "Mi", "Gi", "Ti", "Pi", "Ei"];
const DECIMAL_SI: &[&str] = &["n", "u", "m", "", "k", "M", "G", "T", "P", "E"];

/// Requested container resources, as the catalog stores them. Empty strings mean "unset".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpecs {
    #[serde(default)]
    pub cpu_request: Option<String>,
    #[serde(default)]
    pub cpu_limit: Option<String>,
    #[serde(default)]
    pub memory_request: Option<String>,
    #[serde(default)]
    pub memory_limit: Option<String>,
}

/// Validated requests and limits, keyed by resource name (`cpu`, `memory`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    pub requests: BTreeMap<String, String>,
    pub limits: BTreeMap<String, String>,
}

impl ResourceRequirements {
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty() && self.limits.is_empty()
    }
}

fn split_number(s: &str) -> (&str, &str) {
    let end = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    s.split_at(end)
}

fn valid_number(n: &str) -> bool {
    match n.split_once('.') {
        None => !n.is_empty(),
        Some((int, frac)) => !(int.is_empty() && frac.is_empty()) && !frac.contains('.'),
    }
}

/// Check `raw` against `<number><suffix>` where suffix is binary SI, decimal SI or a decimal
/// exponent. Negative quantities are rejected.
pub fn parse_quantity(raw: &str) -> Result<(), String> {
    if raw.is_empty() {
        return Err("quantities must match the regular expression".to_string());
    }
    if raw.starts_with('-') {
        return Err(format!("negative quantity {:?}", raw));
    }
    let body = raw.strip_prefix('+').unwrap_or(raw);
    let (number, suffix) = split_number(body);
    if !valid_number(number) {
        return Err(format!("quantity {:?} has no numeric part", raw));
    }
    if BINARY_SI.contains(&suffix) || DECIMAL_SI.contains(&suffix) {
        return Ok(());
    }
    if let Some(exp) = suffix.strip_prefix(|c: char| c == 'e' || c == 'E') {
        let exp = exp.strip_prefix(|c: char| c == '+' || c == '-').unwrap_or(exp);
        if !exp.is_empty() && exp.chars().all(|c| c.is_ascii_digit()) {
            return Ok(());
        }
    }
    Err(format!("unable to parse quantity's suffix {:?}", suffix))
}

/// Validate every set field and sort it into requests or limits. The first invalid field wins
/// and is named in the error.
pub fn validate_job_limits(specs: &ResourceSpecs) -> Result<ResourceRequirements, JobError> {
    let fields = [
        ("cpu_request", "cpu request", &specs.cpu_request, CPU, true),
        ("cpu_limit", "cpu limit", &specs.cpu_limit, CPU, false),
        ("memory_request", "memory request", &specs.memory_request, MEMORY, true),
        ("memory_limit", "memory limit", &specs.memory_limit, MEMORY, false),
    ];
    let mut reqs = ResourceRequirements::default();
    for (key, label, value, resource, is_request) in fields {
        let Some(value) = value.as_deref().filter(|v| !v.is_empty()) else {
            continue;
        };
        parse_quantity(value).map_err(|e| {
            JobError::invalid_argument(format!("invalid {}: {}", label, e)).with_detail(key, value)
        })?;
        let target = if is_request {
            &mut reqs.requests
        } else {
            &mut reqs.limits
        };
        target.insert(resource.to_string(), value.to_string());
    }
    Ok(reqs)
}
