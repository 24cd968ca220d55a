//! Classification of a scheduler's job list into a fixed-column report.

use std::cmp::Ordering;
use std::fmt::Write as _;

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::error::EdgeError;
use crate::http::HttpTransport;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub name: String,
    #[serde(default)]
    pub last_success: Option<String>,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl JobStatus {
    pub fn new(name: &str, last_success: &str, last_error: &str) -> Self {
        Self {
            name: name.to_string(),
            last_success: Some(last_success.to_string()),
            last_error: Some(last_error.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Succeeded,
    ThrewError,
    Recovered,
}

impl JobState {
    pub const COLUMNS: [JobState; 4] = [
        JobState::Pending,
        JobState::Succeeded,
        JobState::ThrewError,
        JobState::Recovered,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Succeeded => "succeeded",
            JobState::ThrewError => "threw_error",
            JobState::Recovered => "recovered",
        }
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Integers compare numerically, RFC 3339 instants chronologically, and
/// anything else falls back to string order.
fn compare_timestamps(left: &str, right: &str) -> Ordering {
    if let (Ok(l), Ok(r)) = (left.parse::<i64>(), right.parse::<i64>()) {
        return l.cmp(&r);
    }
    if let (Ok(l), Ok(r)) = (
        DateTime::parse_from_rfc3339(left),
        DateTime::parse_from_rfc3339(right),
    ) {
        return l.cmp(&r);
    }
    left.cmp(right)
}

pub fn classify(job: &JobStatus) -> JobState {
    match (present(&job.last_success), present(&job.last_error)) {
        (None, None) => JobState::Pending,
        (Some(_), None) => JobState::Succeeded,
        (None, Some(_)) => JobState::ThrewError,
        (Some(success), Some(error)) => {
            if compare_timestamps(success, error) == Ordering::Greater {
                JobState::Recovered
            } else {
                JobState::ThrewError
            }
        }
    }
}

pub fn parse_job_list(json: &str) -> Result<Vec<JobStatus>, EdgeError> {
    serde_json::from_str(json).map_err(|err| EdgeError::JobList(err.to_string()))
}

pub fn fetch_job_list(
    transport: &dyn HttpTransport,
    url: &str,
) -> Result<Vec<JobStatus>, EdgeError> {
    parse_job_list(&transport.get_text(url)?)
}

/// Header plus one `0/1` flag row per job, tab separated.
pub fn render_report(jobs: &[JobStatus]) -> String {
    let mut out = String::from("name");
    for state in JobState::COLUMNS {
        out.push('\t');
        out.push_str(state.as_str());
    }
    out.push('\n');
    for job in jobs {
        let state = classify(job);
        out.push_str(&job.name);
        for column in JobState::COLUMNS {
            let _ = write!(out, "\t{}", u8::from(column == state));
        }
        out.push('\n');
    }
    out
}
