// Docker volume plugin wire types
//
// Field names follow the plugin protocol (PascalCase, `ID` for the caller id).
// Absent fields are omitted from responses.

use crate::driver::{Capabilities, VolumeInfo};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const PLUGIN_CONTENT_TYPE: &str = "application/vnd.docker.plugins.v1.2+json";

pub const VOLUME_DRIVER: &str = "VolumeDriver";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActivateResponse {
    pub implements: Vec<String>,
}

impl ActivateResponse {
    pub fn volume_driver() -> Self {
        Self { implements: vec![VOLUME_DRIVER.to_string()] }
    }
}

/// Body of Create
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CreateRequest {
    pub name: String,
    pub opts: Option<HashMap<String, String>>,
}

/// Body of Remove, Path and Get
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NameRequest {
    pub name: String,
}

/// Body of Mount and Unmount
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MountRequest {
    pub name: String,
    #[serde(rename = "ID")]
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WireVolume {
    pub name: String,
    pub mountpoint: String,
}

impl From<VolumeInfo> for WireVolume {
    fn from(info: VolumeInfo) -> Self {
        Self { name: info.name, mountpoint: info.mountpoint.display().to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WireCapabilities {
    pub scope: String,
}

impl From<Capabilities> for WireCapabilities {
    fn from(caps: Capabilities) -> Self {
        Self { scope: caps.scope }
    }
}

/// Response shared by every VolumeDriver endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PluginResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mountpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<WireVolume>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volumes: Option<Vec<WireVolume>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<WireCapabilities>,
}

impl PluginResponse {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { err: Some(message.into()), ..Default::default() }
    }

    pub fn mountpoint(mountpoint: impl Into<String>) -> Self {
        Self { mountpoint: Some(mountpoint.into()), ..Default::default() }
    }

    pub fn volume(volume: Option<VolumeInfo>) -> Self {
        Self { volume: volume.map(WireVolume::from), ..Default::default() }
    }

    pub fn volumes(volumes: Vec<VolumeInfo>) -> Self {
        Self {
            volumes: Some(volumes.into_iter().map(WireVolume::from).collect()),
            ..Default::default()
        }
    }

    pub fn capabilities(caps: Capabilities) -> Self {
        Self { capabilities: Some(caps.into()), ..Default::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_create_request_decoding() {
        let json = r#"{"Name":"v1","Opts":{"src":"10.0.0.1:/export"}}"#;
        let req: CreateRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.name, "v1");
        assert_eq!(req.opts.unwrap().get("src").map(String::as_str), Some("10.0.0.1:/export"));
    }

    #[test]
    fn test_create_request_null_opts() {
        let req: CreateRequest = serde_json::from_str(r#"{"Name":"v1","Opts":null}"#).unwrap();
        assert!(req.opts.is_none());
    }

    #[test]
    fn test_mount_request_id_field() {
        let req: MountRequest = serde_json::from_str(r#"{"Name":"v1","ID":"abc123"}"#).unwrap();
        assert_eq!(req.id, "abc123");
    }

    #[test]
    fn test_empty_response_serializes_to_empty_object() {
        assert_eq!(serde_json::to_string(&PluginResponse::ok()).unwrap(), "{}");
    }

    #[test]
    fn test_error_response() {
        let json = serde_json::to_string(&PluginResponse::error("boom")).unwrap();
        assert_eq!(json, r#"{"Err":"boom"}"#);
    }

    #[test]
    fn test_volume_response() {
        let resp = PluginResponse::volume(Some(VolumeInfo {
            name: "v1".to_string(),
            mountpoint: PathBuf::from("/mnt/fs/v1"),
        }));
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"Volume":{"Name":"v1","Mountpoint":"/mnt/fs/v1"}}"#);
    }

    #[test]
    fn test_empty_volumes_list_is_present() {
        let json = serde_json::to_string(&PluginResponse::volumes(vec![])).unwrap();
        assert_eq!(json, r#"{"Volumes":[]}"#);
    }

    #[test]
    fn test_capabilities_response() {
        let resp = PluginResponse::capabilities(Capabilities { scope: "local".to_string() });
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"Capabilities":{"Scope":"local"}}"#);
    }

    #[test]
    fn test_activate_response() {
        let json = serde_json::to_string(&ActivateResponse::volume_driver()).unwrap();
        assert_eq!(json, r#"{"Implements":["VolumeDriver"]}"#);
    }
}
