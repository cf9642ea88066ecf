//! `input_boolean` and `input_number` helper entries.
//!
//! Returned by the `input_boolean/*` and `input_number/*` commands. The
//! helper id is the object id of the entity, so `input_number.volume` has
//! id `volume`.

use serde::{Deserialize, Serialize};

// ============================================================================
// InputBooleanHelper
// ============================================================================

/// An `input_boolean` helper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputBooleanHelper {
    /// Helper id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Icon, e.g. `mdi:lightbulb`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// State after a restart.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<bool>,
}

// ============================================================================
// InputNumberHelper
// ============================================================================

/// How an `input_number` is rendered in the frontend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputNumberMode {
    /// Numeric input field.
    Box,
    /// Slider.
    Slider,
}

/// An `input_number` helper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputNumberHelper {
    /// Helper id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Lower bound.
    pub min: f64,
    /// Upper bound.
    pub max: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<InputNumberMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

// ============================================================================
// NewInputNumber
// ============================================================================

/// Settings for `input_number/create`.
///
/// # Example
///
/// ```ignore
/// let volume = NewInputNumber::new("Volume", 0.0, 100.0)
///     .with_step(5.0)
///     .with_unit("%")
///     .with_mode(InputNumberMode::Slider);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInputNumber {
    /// Display name; the server derives the id from it.
    pub name: String,
    /// Lower bound.
    pub min: f64,
    /// Upper bound.
    pub max: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<InputNumberMode>,
}

impl NewInputNumber {
    /// Creates settings with only the required fields.
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            name: name.into(),
            min,
            max,
            step: None,
            initial: None,
            unit_of_measurement: None,
            mode: None,
        }
    }

    /// Sets the step size.
    #[inline]
    #[must_use]
    pub fn with_step(mut self, step: f64) -> Self {
        self.step = Some(step);
        self
    }

    /// Sets the value after a restart.
    #[inline]
    #[must_use]
    pub fn with_initial(mut self, initial: f64) -> Self {
        self.initial = Some(initial);
        self
    }

    /// Sets the unit of measurement.
    #[inline]
    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit_of_measurement = Some(unit.into());
        self
    }

    /// Sets the frontend mode.
    #[inline]
    #[must_use]
    pub fn with_mode(mut self, mode: InputNumberMode) -> Self {
        self.mode = Some(mode);
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_input_number_reply() {
        let helper: InputNumberHelper = serde_json::from_value(json!({
            "id": "mynumberhelper",
            "name": "MyNumberHelper",
            "min": 0.0,
            "max": 100.0,
            "step": 1.2,
            "initial": 10.0,
            "unit_of_measurement": "ml",
            "mode": "slider"
        }))
        .unwrap();

        assert_eq!(helper.id, "mynumberhelper");
        assert_eq!(helper.step, Some(1.2));
        assert_eq!(helper.mode, Some(InputNumberMode::Slider));
        assert_eq!(helper.icon, None);
    }

    #[test]
    fn test_input_boolean_minimal_reply() {
        let helper: InputBooleanHelper =
            serde_json::from_value(json!({ "id": "away", "name": "away", "editable": true })).unwrap();
        assert_eq!(helper.initial, None);
    }

    #[test]
    fn test_new_input_number_skips_unset_fields() {
        let value = serde_json::to_value(NewInputNumber::new("Volume", 0.0, 10.0).with_mode(InputNumberMode::Box))
            .unwrap();
        assert_eq!(value, json!({ "name": "Volume", "min": 0.0, "max": 10.0, "mode": "box" }));
    }
}
