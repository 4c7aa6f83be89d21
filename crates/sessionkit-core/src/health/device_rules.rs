//! Rules over device chains

use super::{HealthPolicy, Issue, IssueSeverity, Rule};
use crate::device::{BuiltinDevice, Device};
use crate::document::Document;

fn enabled(devices: &[Device]) -> Vec<&Device> {
    devices.iter().filter(|d| d.enabled).collect()
}

pub(super) fn disabled_clutter(doc: &Document, policy: &HealthPolicy) -> Vec<Issue> {
    let limits = &policy.thresholds;
    doc.all_tracks()
        .filter_map(|track| {
            let total = track.devices.len();
            let disabled = track.disabled_device_count();
            if total < limits.clutter_min_devices || total == 0 {
                return None;
            }
            let ratio = disabled as f64 / total as f64;
            (ratio > limits.disabled_ratio).then(|| {
                Issue::on_track(
                    Rule::DisabledDeviceClutter,
                    IssueSeverity::Warning,
                    track,
                    format!("{disabled} of {total} devices are disabled ({:.0}%)", ratio * 100.0),
                    "Delete the disabled devices or save the chain as a preset",
                )
            })
        })
        .collect()
}

pub(super) fn limiter_not_last(doc: &Document, _policy: &HealthPolicy) -> Vec<Issue> {
    let mut issues = Vec::new();
    for track in doc.all_tracks() {
        let chain = enabled(&track.devices);
        for pair in chain.windows(2) {
            if pair[0].kind.builtin() == Some(BuiltinDevice::Limiter) {
                issues.push(Issue::on_track(
                    Rule::LimiterNotLast,
                    IssueSeverity::Warning,
                    track,
                    format!("Limiter is followed by {}", pair[1].label()),
                    "Move the limiter to the end of the chain",
                ));
            }
        }
    }
    issues
}

pub(super) fn compressor_stack(doc: &Document, policy: &HealthPolicy) -> Vec<Issue> {
    let min_run = policy.thresholds.compressor_stack.max(2);
    let mut issues = Vec::new();
    for track in doc.all_tracks() {
        let mut run: Vec<String> = Vec::new();
        let chain = enabled(&track.devices);
        // A trailing `None` flushes the last run
        for device in chain.iter().map(Some).chain([None]) {
            if let Some(device) = device {
                if device.kind.builtin().is_some_and(BuiltinDevice::is_compressor) {
                    run.push(device.label());
                    continue;
                }
            }
            if run.len() >= min_run {
                issues.push(Issue::on_track(
                    Rule::CompressorStack,
                    IssueSeverity::Warning,
                    track,
                    format!("{} compressors in series: {}", run.len(), run.join(" > ")),
                    "Combine the stacked compressors into one or two stages",
                ));
            }
            run.clear();
        }
    }
    issues
}

pub(super) fn extreme_parameters(doc: &Document, policy: &HealthPolicy) -> Vec<Issue> {
    let mut issues = Vec::new();
    for track in doc.all_tracks() {
        for device in enabled(&track.devices) {
            let Some(builtin) = device.kind.builtin() else {
                continue;
            };
            for bound in policy.bounds_for(builtin) {
                let Some(value) = device.param_value(&bound.parameter) else {
                    continue;
                };
                if bound.contains(value) {
                    continue;
                }
                issues.push(Issue::on_track(
                    Rule::ExtremeParameter,
                    bound.severity,
                    track,
                    format!(
                        "{} {} is {value} (expected {} to {})",
                        device.label(),
                        bound.parameter,
                        bound.min,
                        bound.max
                    ),
                    format!("Bring {} back into range", bound.parameter),
                ));
            }
        }
    }
    issues
}
