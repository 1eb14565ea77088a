use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: i64,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceCertificateCounts {
    #[serde(default)]
    pub active: u32,
    #[serde(default)]
    pub expired: u32,
    #[serde(default)]
    pub revoked: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentSummary {
    #[serde(deserialize_with = "numeric_id")]
    pub user_id: i64,
    #[serde(default)]
    pub device_certificate_counts: DeviceCertificateCounts,
}

/// The summaries endpoint has been seen returning ids both as numbers and strings.
fn numeric_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(id) => Ok(id),
        Raw::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VpnConnection {
    pub device_name: String,
    pub public_ip: String,
    #[serde(default)]
    pub assigned_ip: Option<String>,
    pub login_time: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateResource {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationType {
    Private,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    #[serde(rename = "type")]
    pub kind: ApplicationType,
    #[serde(default)]
    pub label: Option<String>,
}

impl Application {
    pub fn label_or_unknown(&self) -> &str {
        self.label.as_deref().unwrap_or("Unknown")
    }
}

/// One ZTNA activity record. Fields the dashboard does not read are kept
/// so persisted snapshots hold what the server sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZtnaActivityEntry {
    #[serde(rename = "timestamp")]
    pub timestamp_millis: i64,
    #[serde(rename = "allapplications", default, deserialize_with = "applications")]
    pub applications: Vec<Application>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Entries sometimes carry non-object application values; those are skipped.
fn applications<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Application>, D::Error> {
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter(Value::is_object)
        .filter_map(|value| serde_json::from_value(value).ok())
        .collect())
}

impl ZtnaActivityEntry {
    pub fn private_labels(&self) -> impl Iterator<Item = &str> {
        self.applications
            .iter()
            .filter(|app| app.kind == ApplicationType::Private)
            .map(Application::label_or_unknown)
    }
}
