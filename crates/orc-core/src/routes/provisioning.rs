//! `GET /provisioning/qrcode` (§6): renders the QR payload string a freshly
//! unboxed device is enrolled with. Rendering that string into an actual QR
//! image is an external utility (§1 non-goal) — this endpoint hands back
//! only the wire-format string.

use axum::extract::Query;
use serde::Deserialize;

use orc_protocol::qr::{build_qr, QrFields};
use orc_protocol::DeviceId;

fn default_ntp_server() -> String {
    "pool.ntp.org".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

/// `DeviceID` doubles as its MQTT port (§4 Device), so the QR's `H=` field
/// is just `device_id`.
#[derive(Debug, Deserialize)]
pub struct QrcodeQuery {
    pub device_id: DeviceId,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub tls: bool,
    #[serde(default = "default_ntp_server")]
    pub ntp_server: String,
    #[serde(default)]
    pub wifi_ssid: Option<String>,
    #[serde(default)]
    pub wifi_password: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub subnet_mask: Option<String>,
    #[serde(default)]
    pub gateway: Option<String>,
    #[serde(default)]
    pub dns_server: Option<String>,
}

pub async fn qrcode(Query(q): Query<QrcodeQuery>) -> String {
    build_qr(&QrFields {
        mqtt_host: q.host,
        mqtt_port: Some(q.device_id.0),
        tls_enabled: q.tls,
        ntp_server: q.ntp_server,
        ip_address: q.ip_address,
        subnet_mask: q.subnet_mask,
        gateway: q.gateway,
        dns_server: q.dns_server,
        wifi_ssid: q.wifi_ssid,
        wifi_password: q.wifi_password,
    })
}
