//! Prometheus text exposition format.
//!
//! Renders registration counters and group snapshots for scraping by a
//! Prometheus server or compatible agent.

use crate::collector::{GroupSnapshot, Outcome, RegistrationMetrics};

fn header(out: &mut String, name: &str, help: &str, kind: &str) {
    out.push_str(&format!("# HELP {name} {help}\n"));
    out.push_str(&format!("# TYPE {name} {kind}\n"));
}

fn group_labels(g: &GroupSnapshot) -> String {
    format!(
        "application=\"{}\",group=\"{}\"",
        escape(&g.application_id),
        escape(&g.group_id)
    )
}

/// Escape a label value per the exposition format.
fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// Render counters and group snapshots into Prometheus text format.
pub fn render_prometheus(registrations: &RegistrationMetrics, groups: &[GroupSnapshot]) -> String {
    let mut out = String::new();

    header(
        &mut out,
        "updraft_event_registrations_total",
        "Event submissions by outcome.",
        "counter",
    );
    for outcome in Outcome::ALL {
        out.push_str(&format!(
            "updraft_event_registrations_total{{outcome=\"{}\"}} {}\n",
            outcome.as_str(),
            registrations.count(outcome)
        ));
    }

    header(
        &mut out,
        "updraft_rollout_evaluation_failures_total",
        "Recorded events whose rollout evaluation did not complete.",
        "counter",
    );
    out.push_str(&format!(
        "updraft_rollout_evaluation_failures_total {}\n",
        registrations.consequence_failures()
    ));

    header(
        &mut out,
        "updraft_group_instances",
        "Instances in a group by update status.",
        "gauge",
    );
    for g in groups {
        let labels = group_labels(g);
        for (status, count) in &g.instances_by_status {
            out.push_str(&format!(
                "updraft_group_instances{{{labels},status=\"{status}\"}} {count}\n"
            ));
        }
    }

    header(
        &mut out,
        "updraft_group_rollout_in_progress",
        "Whether the group's rollout is in progress (1) or not (0).",
        "gauge",
    );
    for g in groups {
        out.push_str(&format!(
            "updraft_group_rollout_in_progress{{{},version=\"{}\"}} {}\n",
            group_labels(g),
            escape(&g.version),
            u8::from(g.rollout_in_progress)
        ));
    }

    header(
        &mut out,
        "updraft_group_updates_enabled",
        "Whether updates are enabled for the group (1) or halted (0).",
        "gauge",
    );
    for g in groups {
        out.push_str(&format!(
            "updraft_group_updates_enabled{{{}}} {}\n",
            group_labels(g),
            u8::from(g.updates_enabled)
        ));
    }

    header(
        &mut out,
        "updraft_group_updates_attempted",
        "Instances that finished an update cycle toward the group's current version.",
        "gauge",
    );
    for g in groups {
        out.push_str(&format!(
            "updraft_group_updates_attempted{{{}}} {}\n",
            group_labels(g),
            g.stats.updates_to_current_version_attempted
        ));
    }

    out
}
