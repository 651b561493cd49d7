//! Camera discovery.
//!
//! The camera library enumerates attached devices as one string of
//! `<d>key=value,...</d>` records:
//!
//! ```text
//! <d>interface=usb,address=0x01,id=0x22,firmwareRev=0x10,model=AltaU-16M,interfaceStatus="OK"</d>
//! ```
//!
//! A record is usable only when all six fields are present (`port` is
//! additionally required for ethernet cameras and folded into `address`).
//! The camera family is the part of `model` before the first `-`.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::OpenError;

/// Matches one record. Some firmware closes records with `<\d>` instead of `</d>`.
#[allow(clippy::expect_used)]
static RECORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<d>(.*?)<[/\\]d>").expect("Invalid device record regex"));

/// One parsed discovery record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceDescriptor {
    /// Link type (`usb` or `ethernet`).
    pub interface: String,
    /// Bus address, or `ip:port` for ethernet cameras.
    pub address: String,
    /// Device id as reported (hex text).
    pub id: String,
    /// Firmware revision as reported (hex text).
    pub firmware_rev: String,
    /// Full model name, e.g. `AltaU-16M`.
    pub model: String,
    /// Link status with quotes removed.
    pub interface_status: String,
    /// Camera family tag: `model` up to the first `-`.
    pub cam_type: String,
}

impl DeviceDescriptor {
    /// Firmware revision parsed from hex.
    pub fn firmware_rev_value(&self) -> Result<u16, OpenError> {
        parse_hex(&self.firmware_rev).ok_or_else(|| OpenError::InvalidDescriptor {
            field: "firmwareRev",
            value: self.firmware_rev.clone(),
        })
    }

    /// Device id parsed from hex.
    pub fn id_value(&self) -> Result<u16, OpenError> {
        parse_hex(&self.id).ok_or_else(|| OpenError::InvalidDescriptor {
            field: "id",
            value: self.id.clone(),
        })
    }

    /// Camera family for this record.
    pub fn kind(&self) -> Result<CameraKind, OpenError> {
        CameraKind::from_cam_type(&self.cam_type)
            .ok_or_else(|| OpenError::UnsupportedModel(self.cam_type.clone()))
    }
}

/// Supported camera families. Each family drives the same capability
/// interface; the tag only selects how the driver talks to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CameraKind {
    /// Alta series (USB `AltaU` and ethernet `AltaE`).
    Alta,
    /// Ascent series.
    Ascent,
}

impl CameraKind {
    /// Select the camera family from a discovery `camType` tag.
    pub fn from_cam_type(cam_type: &str) -> Option<Self> {
        match cam_type {
            "AltaU" | "AltaE" => Some(CameraKind::Alta),
            "Ascent" => Some(CameraKind::Ascent),
            _ => None,
        }
    }
}

impl std::fmt::Display for CameraKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraKind::Alta => write!(f, "Alta"),
            CameraKind::Ascent => write!(f, "Ascent"),
        }
    }
}

/// Parse a discovery string into its valid records, in order.
pub fn parse_device_str(device_str: &str) -> Vec<DeviceDescriptor> {
    RECORD_RE
        .captures_iter(device_str)
        .filter_map(|caps| caps.get(1))
        .filter_map(|body| parse_record(body.as_str()))
        .collect()
}

fn parse_record(body: &str) -> Option<DeviceDescriptor> {
    let field = |key: &str| -> Option<String> {
        body.split(',').find_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            (k.trim() == key).then(|| v.trim().to_string())
        })
    };

    let interface = field("interface")?;
    let mut address = field("address")?;
    if interface == "ethernet" {
        address = format!("{}:{}", address, field("port")?);
    }
    let model = field("model")?;
    let cam_type = model.split('-').next().unwrap_or_default().to_string();

    Some(DeviceDescriptor {
        interface,
        address,
        id: field("id")?,
        firmware_rev: field("firmwareRev")?,
        interface_status: field("interfaceStatus")?.replace('"', ""),
        model,
        cam_type,
    })
}

fn parse_hex(text: &str) -> Option<u16> {
    let digits = text
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X");
    u16::from_str_radix(digits, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usb_record_with_backslash_terminator() {
        let devices = parse_device_str(
            r#"<d>interface=usb,address=0x01,id=0x22,firmwareRev=0x10,model=AltaU-16M,interfaceStatus="OK"<\d>"#,
        );
        assert_eq!(devices.len(), 1);
        let dev = &devices[0];
        assert_eq!(dev.cam_type, "AltaU");
        assert_eq!(dev.address, "0x01");
        assert_eq!(dev.interface_status, "OK");
        assert_eq!(dev.kind().unwrap(), CameraKind::Alta);
        assert_eq!(dev.id_value().unwrap(), 0x22);
        assert_eq!(dev.firmware_rev_value().unwrap(), 0x10);
    }

    #[test]
    fn ethernet_address_includes_port() {
        let devices = parse_device_str(
            r#"<d>interface=ethernet,address=192.168.0.40,port=2571,id=0x1,firmwareRev=0x2e,model=AltaE-6,interfaceStatus="OK"</d>"#,
        );
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].address, "192.168.0.40:2571");
        assert_eq!(devices[0].kind().unwrap(), CameraKind::Alta);
    }

    #[test]
    fn incomplete_and_empty_records_are_skipped() {
        let devices = parse_device_str(concat!(
            "<d></d>",
            "<d>interface=usb,address=0x02,model=Ascent-A340</d>",
            "<d>interface=ethernet,address=10.0.0.2,id=0x1,firmwareRev=0x1,model=AltaE-6,interfaceStatus=OK</d>",
            "<d>interface=usb,address=0x03,id=0x5,firmwareRev=0x20,model=Ascent-A340,interfaceStatus=\"OK\"</d>",
        ));
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].model, "Ascent-A340");
        assert_eq!(devices[0].kind().unwrap(), CameraKind::Ascent);
    }

    #[test]
    fn unknown_family_is_unsupported() {
        assert_eq!(CameraKind::from_cam_type("Aspen"), None);
        let devices = parse_device_str(
            "<d>interface=usb,address=0x01,id=0x1,firmwareRev=0x1,model=Aspen-CG16,interfaceStatus=OK</d>",
        );
        assert_eq!(
            devices[0].kind(),
            Err(OpenError::UnsupportedModel("Aspen".to_string()))
        );
    }

    #[test]
    fn bad_hex_is_reported_with_field_name() {
        let devices = parse_device_str(
            "<d>interface=usb,address=0x01,id=zz,firmwareRev=0x1,model=AltaU-1,interfaceStatus=OK</d>",
        );
        assert!(matches!(
            devices[0].id_value(),
            Err(OpenError::InvalidDescriptor { field: "id", .. })
        ));
    }

    #[test]
    fn no_records_in_garbage() {
        assert!(parse_device_str("").is_empty());
        assert!(parse_device_str("interface=usb").is_empty());
    }
}
