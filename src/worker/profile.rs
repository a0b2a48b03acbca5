//! Worker type registry and performance modes.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::FleetError;

/// The fixed set of worker archetypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerType {
    Survey,
    DataEntry,
    Content,
    Research,
}

impl WorkerType {
    pub const ALL: [WorkerType; 4] = [
        WorkerType::Survey,
        WorkerType::DataEntry,
        WorkerType::Content,
        WorkerType::Research,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Survey => "survey",
            Self::DataEntry => "data-entry",
            Self::Content => "content",
            Self::Research => "research",
        }
    }

    /// The registry profile for this type.
    pub fn profile(&self) -> &'static WorkerTypeProfile {
        profile_for(*self)
    }
}

impl fmt::Display for WorkerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerType {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WorkerType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| FleetError::UnknownType {
                name: s.to_string(),
            })
    }
}

/// Immutable template shared by every worker of one type.
#[derive(Debug)]
pub struct WorkerTypeProfile {
    pub name: &'static str,
    pub base_earning_per_task: f64,
    pub nominal_task_duration: Duration,
    pub base_success_probability: f64,
    /// Never empty.
    pub task_pool: &'static [&'static str],
}

static SURVEY: WorkerTypeProfile = WorkerTypeProfile {
    name: "Survey Worker",
    base_earning_per_task: 0.50,
    nominal_task_duration: Duration::from_secs(30),
    base_success_probability: 0.85,
    task_pool: &[
        "Complete Survey",
        "Answer Questions",
        "Provide Feedback",
        "Rate Products",
    ],
};

static DATA_ENTRY: WorkerTypeProfile = WorkerTypeProfile {
    name: "Data Entry",
    base_earning_per_task: 0.25,
    nominal_task_duration: Duration::from_secs(15),
    base_success_probability: 0.92,
    task_pool: &[
        "Enter Data",
        "Verify Information",
        "Update Records",
        "Process Forms",
    ],
};

static CONTENT: WorkerTypeProfile = WorkerTypeProfile {
    name: "Content Creator",
    base_earning_per_task: 2.00,
    nominal_task_duration: Duration::from_secs(120),
    base_success_probability: 0.78,
    task_pool: &[
        "Write Article",
        "Create Content",
        "Edit Text",
        "Generate Ideas",
    ],
};

static RESEARCH: WorkerTypeProfile = WorkerTypeProfile {
    name: "Research Assistant",
    base_earning_per_task: 1.50,
    nominal_task_duration: Duration::from_secs(90),
    base_success_probability: 0.88,
    task_pool: &[
        "Research Topic",
        "Gather Information",
        "Analyze Data",
        "Compile Report",
    ],
};

/// Registry lookup by type.
pub fn profile_for(worker_type: WorkerType) -> &'static WorkerTypeProfile {
    match worker_type {
        WorkerType::Survey => &SURVEY,
        WorkerType::DataEntry => &DATA_ENTRY,
        WorkerType::Content => &CONTENT,
        WorkerType::Research => &RESEARCH,
    }
}

/// Registry lookup by name, failing with `UnknownType` outside the fixed set.
pub fn lookup(name: &str) -> Result<(WorkerType, &'static WorkerTypeProfile), FleetError> {
    let worker_type: WorkerType = name.parse()?;
    Ok((worker_type, profile_for(worker_type)))
}

/// Named adjustment curve applied to a worker's duration and success rate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceMode {
    #[default]
    Balanced,
    Speed,
    Accuracy,
    Stealth,
}

/// Output of [`PerformanceMode::adjust`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeAdjustment {
    pub task_duration: Duration,
    pub success_probability: f64,
    /// Randomize the spacing between progress steps.
    pub jitter: bool,
}

impl PerformanceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Balanced => "balanced",
            Self::Speed => "speed",
            Self::Accuracy => "accuracy",
            Self::Stealth => "stealth",
        }
    }

    /// Apply this mode to a nominal duration and success probability.
    pub fn adjust(&self, duration: Duration, success: f64) -> ModeAdjustment {
        let (task_duration, success_probability, jitter) = match self {
            Self::Balanced => (duration, success, false),
            Self::Speed => (duration.mul_f64(0.7), success * 0.95, false),
            Self::Accuracy => (duration.mul_f64(1.3), (success * 1.05).min(1.0), false),
            Self::Stealth => (duration.mul_f64(1.5), success, true),
        };
        ModeAdjustment {
            task_duration,
            success_probability: success_probability.clamp(0.0, 1.0),
            jitter,
        }
    }
}

impl fmt::Display for PerformanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PerformanceMode {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "balanced" => Ok(Self::Balanced),
            "speed" => Ok(Self::Speed),
            "accuracy" => Ok(Self::Accuracy),
            "stealth" => Ok(Self::Stealth),
            other => Err(FleetError::UnknownMode {
                name: other.to_string(),
            }),
        }
    }
}
