use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// SSL certificate definition — APISIX-compatible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SslCertificate {
    pub id: String,

    /// SNI hostnames this cert applies to.
    #[serde(default)]
    pub snis: Vec<String>,

    /// PEM-encoded certificate.
    pub cert: String,

    /// PEM-encoded private key.
    pub key: String,

    /// PEM-encoded client CA certificate, for mutual TLS.
    #[serde(default)]
    pub client_cert: Option<String>,

    /// Enabled/disabled.
    #[serde(default = "default_status")]
    pub status: bool,

    /// Certificate expiry. Populated by the admin layer when a cert is
    /// uploaded; not required on input.
    #[serde(default)]
    pub validity_end: Option<chrono::DateTime<chrono::Utc>>,

    #[serde(default)]
    pub labels: HashMap<String, String>,

    #[serde(default)]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,

    #[serde(default)]
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

fn default_status() -> bool {
    true
}
