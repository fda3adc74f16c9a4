//! Provisioning QR string codec (§6, §8). Rendering the string to an actual
//! QR image is out of scope (§1 non-goal) — only the string encoding and its
//! round-trip parse live here.

/// Fixed prefix every provisioning QR string begins with, following the
/// order used by the Console's own Setup Enrollment screen.
const MAGIC_PREFIX: &str = "AAIAAAAAAAAAAAAAAAAAAA==N=11";
const SUFFIX: &str = "U1FS";

#[derive(Debug, Clone, PartialEq)]
pub struct QrFields {
    pub mqtt_host: String,
    pub mqtt_port: Option<u16>,
    pub tls_enabled: bool,
    pub ntp_server: String,
    pub ip_address: Option<String>,
    pub subnet_mask: Option<String>,
    pub gateway: Option<String>,
    pub dns_server: Option<String>,
    pub wifi_ssid: Option<String>,
    pub wifi_password: Option<String>,
}

/// Build the QR payload string. `t=0` means TLS enabled (inverted boolean,
/// preserved from the original wire format).
pub fn build_qr(fields: &QrFields) -> String {
    let tls_flag = if fields.tls_enabled { 0 } else { 1 };
    let port = fields
        .mqtt_port
        .map(|p| p.to_string())
        .unwrap_or_default();

    let mut out = format!(
        "{MAGIC_PREFIX};E={};H={};t={}",
        fields.mqtt_host, port, tls_flag
    );
    if let Some(ssid) = fields.wifi_ssid.as_deref().filter(|s| !s.is_empty()) {
        out.push_str(&format!(";S={ssid}"));
    }
    if let Some(pw) = fields.wifi_password.as_deref().filter(|s| !s.is_empty()) {
        out.push_str(&format!(";P={pw}"));
    }
    if let Some(ip) = fields.ip_address.as_deref().filter(|s| !s.is_empty()) {
        out.push_str(&format!(";I={ip}"));
    }
    if let Some(mask) = fields.subnet_mask.as_deref().filter(|s| !s.is_empty()) {
        out.push_str(&format!(";K={mask}"));
    }
    if let Some(gw) = fields.gateway.as_deref().filter(|s| !s.is_empty()) {
        out.push_str(&format!(";G={gw}"));
    }
    if let Some(dns) = fields.dns_server.as_deref().filter(|s| !s.is_empty()) {
        out.push_str(&format!(";D={dns}"));
    }
    out.push_str(&format!(";T={};{SUFFIX}", fields.ntp_server));
    out
}

/// Parse a QR payload string back into its fields. Returns `None` if the
/// string doesn't carry the expected magic prefix/suffix.
pub fn parse_qr(s: &str) -> Option<QrFields> {
    let body = s.strip_prefix(MAGIC_PREFIX)?;
    let body = body.strip_suffix(&format!(";{SUFFIX}"))?;

    let mut mqtt_host = None;
    let mut mqtt_port = None;
    let mut tls_enabled = None;
    let mut ntp_server = None;
    let mut ip_address = None;
    let mut subnet_mask = None;
    let mut gateway = None;
    let mut dns_server = None;
    let mut wifi_ssid = None;
    let mut wifi_password = None;

    for segment in body.split(';').filter(|s| !s.is_empty()) {
        let (key, value) = segment.split_once('=')?;
        match key {
            "E" => mqtt_host = Some(value.to_string()),
            "H" => mqtt_port = value.parse::<u16>().ok(),
            "t" => tls_enabled = Some(value == "0"),
            "S" => wifi_ssid = Some(value.to_string()),
            "P" => wifi_password = Some(value.to_string()),
            "I" => ip_address = Some(value.to_string()),
            "K" => subnet_mask = Some(value.to_string()),
            "G" => gateway = Some(value.to_string()),
            "D" => dns_server = Some(value.to_string()),
            "T" => ntp_server = Some(value.to_string()),
            _ => return None,
        }
    }

    Some(QrFields {
        mqtt_host: mqtt_host?,
        mqtt_port,
        tls_enabled: tls_enabled?,
        ntp_server: ntp_server?,
        ip_address,
        subnet_mask,
        gateway,
        dns_server,
        wifi_ssid,
        wifi_password,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_fields() -> QrFields {
        QrFields {
            mqtt_host: "192.168.1.10".into(),
            mqtt_port: Some(1883),
            tls_enabled: true,
            ntp_server: "pool.ntp.org".into(),
            ip_address: None,
            subnet_mask: None,
            gateway: None,
            dns_server: None,
            wifi_ssid: None,
            wifi_password: None,
        }
    }

    #[test]
    fn build_qr_matches_wire_format_for_tls_enabled() {
        let s = build_qr(&minimal_fields());
        assert_eq!(
            s,
            "AAIAAAAAAAAAAAAAAAAAAA==N=11;E=192.168.1.10;H=1883;t=0;T=pool.ntp.org;U1FS"
        );
    }

    #[test]
    fn build_qr_sets_tls_flag_to_one_when_disabled() {
        let mut fields = minimal_fields();
        fields.tls_enabled = false;
        let s = build_qr(&fields);
        assert!(s.contains(";t=1;"));
    }

    #[test]
    fn round_trip_minimal_fields() {
        let fields = minimal_fields();
        let s = build_qr(&fields);
        let back = parse_qr(&s).unwrap();
        assert_eq!(back, fields);
    }

    #[test]
    fn round_trip_with_wifi_and_static_network() {
        let fields = QrFields {
            mqtt_host: "10.0.0.5".into(),
            mqtt_port: Some(8883),
            tls_enabled: false,
            ntp_server: "time.example.com".into(),
            ip_address: Some("10.0.0.50".into()),
            subnet_mask: Some("255.255.255.0".into()),
            gateway: Some("10.0.0.1".into()),
            dns_server: Some("10.0.0.1".into()),
            wifi_ssid: Some("my-ssid".into()),
            wifi_password: Some("hunter2".into()),
        };
        let s = build_qr(&fields);
        let back = parse_qr(&s).unwrap();
        assert_eq!(back, fields);
    }

    #[test]
    fn parse_qr_rejects_wrong_prefix() {
        assert!(parse_qr("not-a-qr-string").is_none());
    }
}
