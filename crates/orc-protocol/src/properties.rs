//! `PropertiesReport` — the flat, most-recently-reported device attributes,
//! and its partial-update merge function (§9: replaces deep-dict-merging
//! with a strongly-typed record and an explicit `merge`).

use serde::{Deserialize, Serialize};

/// Reported hardware identity. Mirrors the V1 `Hardware` envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hardware {
    #[serde(default)]
    pub sensor: String,
    #[serde(default)]
    pub sensor_id: String,
    #[serde(default)]
    pub application_processor: String,
}

/// Reported firmware/model version set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Versions {
    #[serde(default)]
    pub sensor_fw_version: String,
    #[serde(default)]
    pub sensor_loader_version: String,
    #[serde(default)]
    pub dnn_model_version: Vec<String>,
    #[serde(default)]
    pub ap_fw_version: String,
    #[serde(default)]
    pub ap_loader_version: String,
}

/// Reported OTA progress, as published on the telemetry stream during a
/// `FirmwareTask` or `ModelTask` (§4.4).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OtaStatus {
    #[serde(default)]
    pub update_progress: i64,
    /// One of `Downloading`, `Updating`, `Done`, `Failed`, or empty when idle.
    #[serde(default)]
    pub update_status: String,
    #[serde(default)]
    pub dnn_model_last_updated_date: Vec<String>,
}

/// Flat record of a device's most-recently reported attributes.
///
/// Invariant (§3, §8): `merge(target, source)` overwrites a field only when
/// the incoming value is non-default *and* differs from the target's
/// current value — this preserves prior knowledge across sparse partial
/// reports instead of clobbering fields the device didn't mention.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertiesReport {
    #[serde(default)]
    pub hardware: Hardware,
    #[serde(default)]
    pub versions: Versions,
    #[serde(default)]
    pub ota: OtaStatus,
    #[serde(default)]
    pub chip_temperature_celsius: Option<f64>,
}

/// Merge `source` into `target` field-by-field, following the "non-default
/// and differs" rule. `target` is mutated in place.
pub fn merge(target: &mut PropertiesReport, source: &PropertiesReport) {
    merge_field(&mut target.hardware.sensor, &source.hardware.sensor);
    merge_field(&mut target.hardware.sensor_id, &source.hardware.sensor_id);
    merge_field(
        &mut target.hardware.application_processor,
        &source.hardware.application_processor,
    );

    merge_field(
        &mut target.versions.sensor_fw_version,
        &source.versions.sensor_fw_version,
    );
    merge_field(
        &mut target.versions.sensor_loader_version,
        &source.versions.sensor_loader_version,
    );
    merge_vec(
        &mut target.versions.dnn_model_version,
        &source.versions.dnn_model_version,
    );
    merge_field(
        &mut target.versions.ap_fw_version,
        &source.versions.ap_fw_version,
    );
    merge_field(
        &mut target.versions.ap_loader_version,
        &source.versions.ap_loader_version,
    );

    merge_int(
        &mut target.ota.update_progress,
        source.ota.update_progress,
    );
    merge_field(&mut target.ota.update_status, &source.ota.update_status);
    merge_vec(
        &mut target.ota.dnn_model_last_updated_date,
        &source.ota.dnn_model_last_updated_date,
    );

    if let Some(incoming) = source.chip_temperature_celsius {
        if target.chip_temperature_celsius != Some(incoming) {
            target.chip_temperature_celsius = Some(incoming);
        }
    }
}

fn merge_field(target: &mut String, source: &String) {
    if !source.is_empty() && source != target {
        *target = source.clone();
    }
}

fn merge_vec<T: Clone + PartialEq>(target: &mut Vec<T>, source: &Vec<T>) {
    if !source.is_empty() && source != target {
        *target = source.clone();
    }
}

fn merge_int(target: &mut i64, source: i64) {
    if source != 0 && source != *target {
        *target = source;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_overwrites_non_default_differing_field() {
        let mut target = PropertiesReport::default();
        target.versions.sensor_fw_version = "020000".into();

        let mut source = PropertiesReport::default();
        source.versions.sensor_fw_version = "020100".into();

        merge(&mut target, &source);
        assert_eq!(target.versions.sensor_fw_version, "020100");
    }

    #[test]
    fn merge_preserves_target_when_source_is_default() {
        let mut target = PropertiesReport::default();
        target.versions.sensor_fw_version = "020000".into();
        target.hardware.sensor = "IMX500".into();

        // Source only reports OTA status — everything else is default/empty.
        let mut source = PropertiesReport::default();
        source.ota.update_status = "Downloading".into();

        merge(&mut target, &source);
        assert_eq!(target.versions.sensor_fw_version, "020000");
        assert_eq!(target.hardware.sensor, "IMX500");
        assert_eq!(target.ota.update_status, "Downloading");
    }

    #[test]
    fn merge_preserves_target_when_equal() {
        let mut target = PropertiesReport::default();
        target.versions.sensor_fw_version = "020000".into();
        let source = target.clone();
        merge(&mut target, &source);
        assert_eq!(target.versions.sensor_fw_version, "020000");
    }

    #[test]
    fn merge_handles_dnn_model_list() {
        let mut target = PropertiesReport::default();
        target.versions.dnn_model_version = vec!["model-a".into()];

        let mut source = PropertiesReport::default();
        source.versions.dnn_model_version = vec!["model-a".into(), "model-b".into()];

        merge(&mut target, &source);
        assert_eq!(
            target.versions.dnn_model_version,
            vec!["model-a".to_string(), "model-b".to_string()]
        );
    }

    #[test]
    fn merge_chip_temperature_respects_option_semantics() {
        let mut target = PropertiesReport::default();
        target.chip_temperature_celsius = Some(42.0);

        let mut source = PropertiesReport::default();
        source.chip_temperature_celsius = None;
        merge(&mut target, &source);
        assert_eq!(target.chip_temperature_celsius, Some(42.0));

        source.chip_temperature_celsius = Some(55.5);
        merge(&mut target, &source);
        assert_eq!(target.chip_temperature_celsius, Some(55.5));
    }
}
