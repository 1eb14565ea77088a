use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::error::ParseError;
use crate::ingest::{IngestOutcome, TimeWindow};
use crate::model::{VpnConnection, ZtnaActivityEntry};
use crate::reconcile::{IdentifierMap, Reconciliation, UnenrolledUser, UserRow};

pub const NOT_APPLICABLE: &str = "N/A";
const LOCAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Serialize)]
pub struct DeviceBucket {
    pub active_devices: u32,
    pub users: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrollmentReport {
    pub total_identities: usize,
    pub with_active_devices: usize,
    pub active_percentage: f64,
    pub remaining_percentage: f64,
    pub enrolled: Vec<UserRow>,
    pub unenrolled: Vec<UnenrolledUser>,
    pub multi_device: Vec<UserRow>,
    pub device_distribution: Vec<DeviceBucket>,
    pub malformed_labels: Vec<String>,
}

pub fn enrollment_report(total_identities: usize, reconciled: Reconciliation) -> EnrollmentReport {
    let with_active_devices = reconciled
        .enrolled
        .iter()
        .filter(|row| row.active_devices > 0)
        .count();
    let active_percentage = if total_identities > 0 {
        with_active_devices as f64 / total_identities as f64 * 100.0
    } else {
        0.0
    };

    let multi_device = reconciled
        .enrolled
        .iter()
        .filter(|row| row.active_devices > 1)
        .cloned()
        .collect();

    let mut distribution: BTreeMap<u32, usize> = BTreeMap::new();
    for row in &reconciled.enrolled {
        *distribution.entry(row.active_devices).or_default() += 1;
    }

    EnrollmentReport {
        total_identities,
        with_active_devices,
        active_percentage,
        remaining_percentage: 100.0 - active_percentage,
        multi_device,
        device_distribution: distribution
            .into_iter()
            .map(|(active_devices, users)| DeviceBucket {
                active_devices,
                users,
            })
            .collect(),
        malformed_labels: reconciled.malformed.into_iter().map(|i| i.label).collect(),
        enrolled: reconciled.enrolled,
        unenrolled: reconciled.unenrolled,
    }
}

/// Login times arrive as `Oct 18 2026 03:04:05 PM UTC`; RFC 3339 is accepted as well.
pub fn parse_login_time(raw: &str) -> Result<DateTime<Utc>, ParseError> {
    let trimmed = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }
    let naive_part = match trimmed.rsplit_once(' ') {
        Some((head, zone)) if zone.eq_ignore_ascii_case("UTC") || zone.eq_ignore_ascii_case("GMT") => head,
        _ => trimmed,
    };
    NaiveDateTime::parse_from_str(naive_part, "%b %d %Y %I:%M:%S %p")
        .map(|naive| naive.and_utc())
        .map_err(|_| ParseError::LoginTime(raw.to_string()))
}

pub fn format_active_duration(elapsed: TimeDelta) -> String {
    let total_minutes = elapsed.num_minutes().max(0);
    let days = total_minutes / (24 * 60);
    let hours = (total_minutes / 60) % 24;
    let minutes = total_minutes % 60;
    if days > 0 {
        format!("{days}d {hours}h {minutes:02}m")
    } else if hours > 0 {
        format!("{hours}h {minutes:02}m")
    } else {
        format!("{minutes}m")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VpnRow {
    pub device_name: String,
    pub public_ip: String,
    pub assigned_ip: String,
    pub login_time: String,
    pub active_time: String,
    #[serde(skip)]
    pub active_minutes: Option<i64>,
    pub usuario: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VpnReport {
    pub reported_total: u64,
    pub rows: Vec<VpnRow>,
}

/// Machine tunnel table, longest-lived sessions first; rows with unreadable login times go last.
pub fn vpn_report(
    connections: &[VpnConnection],
    identifiers: &IdentifierMap,
    reported_total: Option<u64>,
    now: DateTime<FixedOffset>,
) -> VpnReport {
    let mut rows: Vec<VpnRow> = connections
        .iter()
        .map(|conn| {
            let (login_time, active_time, active_minutes) = match parse_login_time(&conn.login_time) {
                Ok(login) => {
                    let elapsed = now.with_timezone(&Utc) - login;
                    (
                        login.with_timezone(now.offset()).format(LOCAL_FORMAT).to_string(),
                        format_active_duration(elapsed),
                        Some(elapsed.num_minutes()),
                    )
                }
                Err(_) => (NOT_APPLICABLE.to_string(), NOT_APPLICABLE.to_string(), None),
            };
            VpnRow {
                device_name: conn.device_name.clone(),
                public_ip: conn.public_ip.clone(),
                assigned_ip: conn
                    .assigned_ip
                    .clone()
                    .unwrap_or_else(|| NOT_APPLICABLE.to_string()),
                login_time,
                active_time,
                active_minutes,
                usuario: identifiers.attribute(&conn.device_name).to_string(),
            }
        })
        .collect();
    rows.sort_by(|a, b| b.active_minutes.cmp(&a.active_minutes));

    VpnReport {
        reported_total: reported_total.unwrap_or(rows.len() as u64),
        rows,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceActivity {
    pub label: String,
    pub count: usize,
}

/// Counts of private-application labels, busiest first.
pub fn resource_activity(entries: &[ZtnaActivityEntry]) -> Vec<ResourceActivity> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for label in entries.iter().flat_map(ZtnaActivityEntry::private_labels) {
        *counts.entry(label).or_default() += 1;
    }
    let mut out: Vec<ResourceActivity> = counts
        .into_iter()
        .map(|(label, count)| ResourceActivity {
            label: label.to_string(),
            count,
        })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    out
}

pub fn inactive_resources(catalog: &BTreeSet<String>, activity: &[ResourceActivity]) -> Vec<String> {
    let active: BTreeSet<&str> = activity.iter().map(|a| a.label.as_str()).collect();
    catalog
        .iter()
        .filter(|name| !active.contains(name.as_str()))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct ZtnaReport {
    pub since: String,
    pub until: String,
    pub window: TimeWindow,
    pub entries_total: usize,
    pub persisted_entries: usize,
    pub new_entries: usize,
    pub boundary_duplicates: usize,
    pub truncated_windows: usize,
    pub failed_windows: Vec<String>,
    pub snapshot_errors: Vec<String>,
    pub bucket: Option<String>,
    pub top_resources: Vec<ResourceActivity>,
    /// `None` when the resource catalog could not be fetched.
    pub inactive_resources: Option<Vec<String>>,
}

pub fn ztna_report(
    outcome: IngestOutcome,
    catalog: Option<&BTreeSet<String>>,
    now: DateTime<FixedOffset>,
) -> ZtnaReport {
    let top_resources = resource_activity(&outcome.entries);
    let inactive = catalog.map(|names| inactive_resources(names, &top_resources));
    ZtnaReport {
        since: outcome.day_start.format(LOCAL_FORMAT).to_string(),
        until: now.format(LOCAL_FORMAT).to_string(),
        window: outcome.window,
        entries_total: outcome.entries.len(),
        persisted_entries: outcome.persisted_count,
        new_entries: outcome.new_count,
        boundary_duplicates: outcome.boundary_duplicates,
        truncated_windows: outcome.truncated_windows,
        failed_windows: outcome.failed_windows,
        snapshot_errors: outcome.snapshot_errors,
        bucket: outcome.bucket,
        top_resources,
        inactive_resources: inactive,
    }
}
