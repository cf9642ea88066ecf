//! Registry entries returned by the `config/*_registry/list` commands.
//!
//! Only the commonly used fields are typed; everything else the server
//! sends is ignored.

use serde::{Deserialize, Serialize};

/// An area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HassArea {
    /// Area id.
    pub area_id: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Floor the area is on.
    #[serde(default)]
    pub floor_id: Option<String>,
}

/// A device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HassDevice {
    /// Device id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Area the device is assigned to.
    #[serde(default)]
    pub area_id: Option<String>,
    /// Manufacturer.
    #[serde(default)]
    pub manufacturer: Option<String>,
    /// Model.
    #[serde(default)]
    pub model: Option<String>,
}

/// An entity registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HassEntity {
    /// Entity id, e.g. `light.kitchen`.
    pub entity_id: String,
    /// Owning device.
    #[serde(default)]
    pub device_id: Option<String>,
    /// Area override.
    #[serde(default)]
    pub area_id: Option<String>,
    /// Integration providing the entity.
    #[serde(default)]
    pub platform: Option<String>,
    /// Display name override.
    #[serde(default)]
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_extra_fields_ignored() {
        let device: HassDevice = serde_json::from_value(json!({
            "id": "abc",
            "name": "Lamp",
            "via_device_id": null,
            "identifiers": [["hue", "1"]]
        }))
        .unwrap();
        assert_eq!(device.id, "abc");
        assert_eq!(device.area_id, None);
    }

    #[test]
    fn test_entity_requires_id() {
        assert!(serde_json::from_value::<HassEntity>(json!({ "platform": "hue" })).is_err());
    }
}
