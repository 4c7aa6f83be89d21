//! Production-quality diagnosis: rule-based issues, a 0-100 score and an A-F grade

mod clip_rules;
mod device_rules;
mod policy;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::track::Track;

pub use policy::{GradeBands, HealthPolicy, ParameterBound, Rule, SeverityWeights, Thresholds};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Critical,
    Warning,
    Info,
}

impl fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Critical => f.write_str("critical"),
            Self::Warning => f.write_str("warning"),
            Self::Info => f.write_str("info"),
        }
    }
}

/// Issue grouping; also the primary sort key of a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    DeviceChain,
    Parameters,
    Clips,
    Tracks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::F => "F",
        };
        f.write_str(letter)
    }
}

impl FromStr for Grade {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(Self::A),
            "B" => Ok(Self::B),
            "C" => Ok(Self::C),
            "D" => Ok(Self::D),
            "F" => Ok(Self::F),
            other => Err(format!("Unknown grade: {other}")),
        }
    }
}

/// A single production problem found by a rule
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    pub rule: Rule,
    pub category: Category,
    pub severity: IssueSeverity,
    pub description: String,
    pub affected_track: Option<String>,
    pub suggested_fix: String,
}

impl Issue {
    pub(crate) fn on_track(
        rule: Rule,
        severity: IssueSeverity,
        track: &Track,
        description: String,
        suggested_fix: impl Into<String>,
    ) -> Self {
        Self {
            rule,
            category: rule.category(),
            severity,
            description,
            affected_track: Some(track.name.clone()),
            suggested_fix: suggested_fix.into(),
        }
    }
}

/// Size of the analyzed project
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub tracks: usize,
    pub devices: usize,
    pub disabled_devices: usize,
    pub clips: usize,
    pub notes: usize,
    pub critical: usize,
    pub warning: usize,
    pub info: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub policy_version: String,
    pub score: u32,
    pub grade: Grade,
    pub issues: Vec<Issue>,
    pub summary: Summary,
}

/// Analyze with the default (v1) policy
pub fn analyze(doc: &Document) -> HealthReport {
    analyze_with(doc, &HealthPolicy::default())
}

pub fn analyze_with(doc: &Document, policy: &HealthPolicy) -> HealthReport {
    let mut rules: Vec<Rule> = Vec::with_capacity(policy.rules.len());
    for &rule in &policy.rules {
        if !rules.contains(&rule) {
            rules.push(rule);
        }
    }
    let mut issues: Vec<Issue> = rules.iter().flat_map(|rule| rule.check(doc, policy)).collect();
    issues.sort_by(|a, b| {
        (a.category, &a.affected_track, &a.description).cmp(&(
            b.category,
            &b.affected_track,
            &b.description,
        ))
    });

    let penalty = issues
        .iter()
        .map(|i| policy.weights.weight(i.severity))
        .fold(0, u32::saturating_add);
    let score = 100u32.saturating_sub(penalty);
    let summary = summarize(doc, &issues);

    tracing::debug!(
        policy = %policy.version,
        score,
        issues = issues.len(),
        "Analyzed project"
    );

    HealthReport {
        policy_version: policy.version.clone(),
        score,
        grade: policy.bands.grade(score),
        issues,
        summary,
    }
}

fn summarize(doc: &Document, issues: &[Issue]) -> Summary {
    let count = |severity| issues.iter().filter(|i| i.severity == severity).count();
    let mut summary = Summary {
        critical: count(IssueSeverity::Critical),
        warning: count(IssueSeverity::Warning),
        info: count(IssueSeverity::Info),
        ..Default::default()
    };
    for track in doc.all_tracks() {
        summary.tracks += 1;
        summary.devices += track.devices.len();
        summary.disabled_devices += track.disabled_device_count();
        summary.clips += track.clips().len();
        summary.notes += track.note_count();
    }
    summary
}
