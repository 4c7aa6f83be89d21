//! Plain-text rendering of reports for the terminal

use std::fmt::Write;

use sessionkit_core::diff::{DeviceChange, DiffReport, TrackDiff};
use sessionkit_core::{HealthReport, ParamValue, ValidationReport, Verdict};
use sessionkit_services::{Diagnosis, FileStatus, ScanOutcome};

pub fn diagnosis(d: &Diagnosis) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", d.path.display());
    out.push_str(&health(&d.health));
    out.push_str(&validation(&d.validation));
    out
}

pub fn health(report: &HealthReport) -> String {
    let mut out = String::new();
    let s = &report.summary;
    let _ = writeln!(
        out,
        "Health: {}/100 (grade {}, policy {})",
        report.score, report.grade, report.policy_version
    );
    let _ = writeln!(
        out,
        "  {} tracks, {} devices ({} disabled), {} clips, {} notes",
        s.tracks, s.devices, s.disabled_devices, s.clips, s.notes
    );
    for issue in &report.issues {
        let track = issue.affected_track.as_deref().unwrap_or("-");
        let _ = writeln!(out, "  [{}] {}: {}", issue.severity, track, issue.description);
        let _ = writeln!(out, "      fix: {}", issue.suggested_fix);
    }
    out
}

pub fn validation(report: &ValidationReport) -> String {
    let mut out = String::new();
    if report.findings.is_empty() {
        out.push_str("Validation: ok\n");
        return out;
    }
    let verdict = if report.is_loadable() { "loadable" } else { "NOT loadable" };
    let _ = writeln!(out, "Validation: {verdict}");
    for finding in &report.findings {
        let _ = writeln!(out, "  {finding}");
    }
    out
}

pub fn scan(outcome: &ScanOutcome) -> String {
    let mut out = String::new();
    for file in &outcome.files {
        let label = match file.status {
            FileStatus::Ok => "ok",
            FileStatus::Warning => "warning",
            FileStatus::Error => "error",
        };
        let detail = match (&file.health, &file.error) {
            (Some(h), _) => format!("{}/100 {}", h.score, h.grade),
            (None, Some(e)) => e.clone(),
            (None, None) => String::new(),
        };
        let _ = writeln!(out, "{label:<8} {}  {detail}", file.path.display());
    }
    let _ = writeln!(
        out,
        "{} file(s): {} ok, {} warning, {} error{}",
        outcome.discovered,
        outcome.count(FileStatus::Ok),
        outcome.count(FileStatus::Warning),
        outcome.count(FileStatus::Error),
        if outcome.cancelled { " (cancelled)" } else { "" }
    );
    out
}

pub fn diff(report: &DiffReport) -> String {
    let mut out = String::new();
    if report.is_empty() {
        out.push_str("No structural changes\n");
    }
    for t in &report.tracks_added {
        let _ = writeln!(out, "+ {} track {:?}", t.kind, t.name);
    }
    for t in &report.tracks_removed {
        let _ = writeln!(out, "- {} track {:?}", t.kind, t.name);
    }
    for t in &report.tracks_changed {
        track_diff(&mut out, t);
    }
    if let Some(tempo) = &report.tempo {
        let show = |v: Option<f64>| v.map_or("-".to_string(), |v| v.to_string());
        let _ = writeln!(out, "~ tempo {} -> {}", show(tempo.old), show(tempo.new));
    }
    for name in &report.locators_added {
        let _ = writeln!(out, "+ locator {name:?}");
    }
    for name in &report.locators_removed {
        let _ = writeln!(out, "- locator {name:?}");
    }
    let verdict = match report.verdict {
        Verdict::Improvement => "improvement",
        Verdict::Regression => "regression",
        Verdict::Neutral => "neutral",
    };
    let _ = writeln!(
        out,
        "Health {} -> {} ({:+}, {verdict})",
        report.old_score, report.new_score, report.health_delta
    );
    out
}

fn track_diff(out: &mut String, t: &TrackDiff) {
    let _ = writeln!(out, "~ {} track {:?}", t.kind, t.name);
    for change in &t.devices {
        let line = match change {
            DeviceChange::Added { device, position } => format!("+ {device} at {position}"),
            DeviceChange::Removed { device, position } => format!("- {device} from {position}"),
            DeviceChange::Reordered { device, from, to } => format!("~ {device} moved {from} -> {to}"),
            DeviceChange::Toggled { device, enabled } => {
                format!("~ {device} {}", if *enabled { "enabled" } else { "disabled" })
            }
            DeviceChange::ParameterChanged { device, parameter, old, new } => {
                format!("~ {device} {parameter}: {} -> {}", value(old), value(new))
            }
        };
        let _ = writeln!(out, "    {line}");
    }
    for m in &t.mixer {
        let _ = writeln!(out, "    ~ {} {} -> {}", m.parameter, m.old, m.new);
    }
    if let Some(c) = &t.clips {
        let _ = writeln!(
            out,
            "    clips {} -> {} (+{} -{}), notes {} -> {}",
            c.old_clips, c.new_clips, c.added, c.removed, c.old_notes, c.new_notes
        );
    }
}

fn value(v: &Option<ParamValue>) -> String {
    v.as_ref().map_or_else(|| "-".to_string(), ParamValue::to_string)
}
