use std::fmt::Write;

use secdash_core::report::{EnrollmentReport, VpnReport, ZtnaReport};
use secdash_core::DashboardSnapshot;

const NO_DATA: &str = "no data";
const TOP_RESOURCES: usize = 10;

/// Plain-text rendering of one refresh, used by `once` and `watch`.
pub fn human(snapshot: &DashboardSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Secure Access Dashboard ===");
    let _ = writeln!(out, "Time:       {}", snapshot.ts.to_rfc3339());
    let _ = writeln!(out, "Refresh:    {} ms", snapshot.refresh_ms);
    if !snapshot.failures.is_empty() {
        let _ = writeln!(out, "Failures:   {}", snapshot.failures.join("; "));
    }

    let _ = writeln!(out, "--- Enrollment ---");
    match &snapshot.enrollment {
        Some(report) => enrollment(&mut out, report),
        None => {
            let _ = writeln!(out, "{NO_DATA}");
        }
    }

    let _ = writeln!(out, "--- Machine tunnel VPN ---");
    match &snapshot.vpn {
        Some(report) => vpn(&mut out, report),
        None => {
            let _ = writeln!(out, "{NO_DATA}");
        }
    }

    let _ = writeln!(out, "--- ZTNA private resources ---");
    match &snapshot.ztna {
        Some(report) => ztna(&mut out, report),
        None => {
            let _ = writeln!(out, "{NO_DATA}");
        }
    }

    out
}

fn enrollment(out: &mut String, report: &EnrollmentReport) {
    let _ = writeln!(
        out,
        "Identities: {}  enrolled={} unenrolled={} active={} ({:.1}%, remaining {:.1}%)",
        report.total_identities,
        report.enrolled.len(),
        report.unenrolled.len(),
        report.with_active_devices,
        report.active_percentage,
        report.remaining_percentage,
    );
    if !report.malformed_labels.is_empty() {
        let _ = writeln!(out, "Malformed:  {} labels skipped", report.malformed_labels.len());
    }
    if !report.multi_device.is_empty() {
        let _ = writeln!(out, "Multi-device users:");
        for row in &report.multi_device {
            let _ = writeln!(out, "  {:<32} {:<32} {}", row.usuario, row.correo, row.active_devices);
        }
    }
    let distribution = report
        .device_distribution
        .iter()
        .map(|bucket| format!("{}:{}", bucket.active_devices, bucket.users))
        .collect::<Vec<_>>()
        .join(", ");
    let _ = writeln!(out, "Active devices per user: [{distribution}]");
}

fn vpn(out: &mut String, report: &VpnReport) {
    let _ = writeln!(out, "Connections: {}", report.reported_total);
    for row in &report.rows {
        let _ = writeln!(
            out,
            "  {:<24} {:<16} {:<16} {:<20} {:>12}  {}",
            row.device_name,
            row.public_ip,
            row.assigned_ip,
            row.login_time,
            row.active_time,
            row.usuario,
        );
    }
}

fn ztna(out: &mut String, report: &ZtnaReport) {
    let _ = writeln!(
        out,
        "Window:     {} -> {}  entries={} new={} persisted={}",
        report.since, report.until, report.entries_total, report.new_entries, report.persisted_entries,
    );
    if report.truncated_windows > 0 {
        let _ = writeln!(out, "Truncated:  {} sub-windows hit the offset ceiling", report.truncated_windows);
    }
    for failed in report.failed_windows.iter().chain(&report.snapshot_errors) {
        let _ = writeln!(out, "Warning:    {failed}");
    }
    for resource in report.top_resources.iter().take(TOP_RESOURCES) {
        let _ = writeln!(out, "  {:<40} {}", resource.label, resource.count);
    }
    match &report.inactive_resources {
        Some(names) if names.is_empty() => {
            let _ = writeln!(out, "Inactive:   none");
        }
        Some(names) => {
            let _ = writeln!(out, "Inactive:   {}", names.join(", "));
        }
        None => {
            let _ = writeln!(out, "Inactive:   {NO_DATA}");
        }
    }
}
