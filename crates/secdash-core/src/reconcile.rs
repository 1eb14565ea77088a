use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::warn;

use crate::error::ParseError;
use crate::model::{EnrollmentSummary, Identity};

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z]\d{7}").expect("identifier pattern compiles"));

pub const UNKNOWN_USER: &str = "Unknown";

/// Device/user code (letter + seven digits) embedded in an email or device name.
pub fn extract_identifier(text: &str) -> Option<&str> {
    IDENTIFIER_RE.find(text).map(|m| m.as_str())
}

/// Splits `"Usuario (Correo)"` into its two halves. Later ` (...)` groups are ignored.
pub fn split_label(identity: &Identity) -> Result<(String, String), ParseError> {
    let mut parts = identity.label.split(" (");
    let usuario = parts.next().unwrap_or_default();
    let Some(correo) = parts.next() else {
        return Err(ParseError::MissingEmail {
            id: identity.id,
            label: identity.label.clone(),
        });
    };
    Ok((usuario.to_string(), correo.replace(')', "")))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRow {
    pub id: i64,
    pub usuario: String,
    pub correo: String,
    pub active_devices: u32,
    pub expired_devices: u32,
    pub revoked_devices: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnenrolledUser {
    pub id: i64,
    pub usuario: String,
    pub correo: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Reconciliation {
    pub enrolled: Vec<UserRow>,
    pub unenrolled: Vec<UnenrolledUser>,
    pub malformed: Vec<Identity>,
}

pub fn reconcile(identities: &[Identity], summaries: &[EnrollmentSummary]) -> Reconciliation {
    let by_id: HashMap<i64, &EnrollmentSummary> =
        summaries.iter().map(|summary| (summary.user_id, summary)).collect();

    let mut out = Reconciliation::default();
    for identity in identities {
        let (usuario, correo) = match split_label(identity) {
            Ok(parts) => parts,
            Err(err) => {
                warn!(error = %err, "skipping identity with malformed label");
                out.malformed.push(identity.clone());
                continue;
            }
        };

        match by_id.get(&identity.id) {
            Some(summary) => {
                let counts = summary.device_certificate_counts;
                out.enrolled.push(UserRow {
                    id: identity.id,
                    usuario,
                    correo,
                    active_devices: counts.active,
                    expired_devices: counts.expired,
                    revoked_devices: counts.revoked,
                });
            }
            None => out.unenrolled.push(UnenrolledUser {
                id: identity.id,
                usuario,
                correo,
            }),
        }
    }
    out
}

#[derive(Debug, Clone, Default)]
pub struct IdentifierMap {
    users: HashMap<String, String>,
}

impl IdentifierMap {
    /// Rows whose email carries no code are left out; a repeated code keeps the last row.
    pub fn from_rows(rows: &[UserRow]) -> Self {
        let users = rows
            .iter()
            .filter_map(|row| {
                extract_identifier(&row.correo).map(|code| (code.to_string(), row.usuario.clone()))
            })
            .collect();
        Self { users }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn attribute(&self, device_name: &str) -> &str {
        extract_identifier(device_name)
            .and_then(|code| self.users.get(code))
            .map(String::as_str)
            .unwrap_or(UNKNOWN_USER)
    }
}
