//! Typed helpers for common server commands.
//!
//! | Method | Command |
//! |--------|---------|
//! | [`Client::get_states`] | `get_states` |
//! | [`Client::get_config`] | `get_config` |
//! | [`Client::get_services`] | `get_services` |
//! | [`Client::get_areas`] | `config/area_registry/list` |
//! | [`Client::get_devices`] | `config/device_registry/list` |
//! | [`Client::get_entities`] | `config/entity_registry/list` |
//! | [`Client::call_service`] | `call_service` |
//! | [`Client::fire_event`] | `fire_event` |
//! | [`Client::list_input_booleans`] | `input_boolean/list` |
//! | [`Client::create_input_boolean`] | `input_boolean/create` |
//! | [`Client::delete_input_boolean`] | `input_boolean/delete` |
//! | [`Client::list_input_numbers`] | `input_number/list` |
//! | [`Client::create_input_number`] | `input_number/create` |
//! | [`Client::delete_input_number`] | `input_number/delete` |
//! | [`Client::ping`] | `ping` |
//!
//! All of them go through [`Client::send_command`] and fail the same way.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use crate::error::Result;
use crate::protocol::{
    Command, HassArea, HassConfig, HassDevice, HassEntity, HassState, InputBooleanHelper,
    InputNumberHelper, NewInputNumber, ServiceTarget,
};

use super::core::Client;

// ============================================================================
// Client Commands
// ============================================================================

impl Client {
    /// Fetches every entity state.
    ///
    /// # Errors
    ///
    /// Same as [`Client::send_command`], plus [`Error::Json`](crate::Error::Json)
    /// for an unexpected reply shape.
    pub async fn get_states(&self) -> Result<Vec<HassState>> {
        self.send_command_as(&Command::GetStates).await
    }

    /// Fetches the server configuration.
    ///
    /// # Errors
    ///
    /// Same as [`get_states`](Self::get_states).
    pub async fn get_config(&self) -> Result<HassConfig> {
        self.send_command_as(&Command::GetConfig).await
    }

    /// Fetches the service catalogue, keyed by domain.
    ///
    /// # Errors
    ///
    /// Same as [`Client::send_command`].
    pub async fn get_services(&self) -> Result<Value> {
        self.send_command(&Command::GetServices).await
    }

    /// Lists areas.
    ///
    /// # Errors
    ///
    /// Same as [`get_states`](Self::get_states).
    pub async fn get_areas(&self) -> Result<Vec<HassArea>> {
        self.send_command_as(&Command::ListAreas).await
    }

    /// Lists devices.
    ///
    /// # Errors
    ///
    /// Same as [`get_states`](Self::get_states).
    pub async fn get_devices(&self) -> Result<Vec<HassDevice>> {
        self.send_command_as(&Command::ListDevices).await
    }

    /// Lists entity registry entries.
    ///
    /// # Errors
    ///
    /// Same as [`get_states`](Self::get_states).
    pub async fn get_entities(&self) -> Result<Vec<HassEntity>> {
        self.send_command_as(&Command::ListEntities).await
    }

    /// Calls `domain.service` and returns the raw result.
    ///
    /// # Errors
    ///
    /// Same as [`Client::send_command`]; an unknown service comes back as
    /// [`Error::Remote`](crate::Error::Remote).
    pub async fn call_service(
        &self,
        domain: &str,
        service: &str,
        data: Option<Value>,
        target: Option<ServiceTarget>,
    ) -> Result<Value> {
        self.send_command(&Command::call_service(domain, service, data, target))
            .await
    }

    /// Fires a custom event on the server bus.
    ///
    /// # Errors
    ///
    /// Same as [`Client::send_command`].
    pub async fn fire_event(&self, event_type: &str, data: Option<Value>) -> Result<()> {
        self.send_command(&Command::FireEvent {
            event_type: event_type.to_string(),
            event_data: data,
        })
        .await?;
        Ok(())
    }

    // ========================================================================
    // Input Helpers
    // ========================================================================

    /// Lists `input_boolean` helpers.
    ///
    /// # Errors
    ///
    /// Same as [`get_states`](Self::get_states).
    pub async fn list_input_booleans(&self) -> Result<Vec<InputBooleanHelper>> {
        let helpers: Option<Vec<InputBooleanHelper>> =
            self.send_command_as(&Command::ListInputBooleans).await?;
        Ok(helpers.unwrap_or_default())
    }

    /// Creates an `input_boolean` helper named `name`.
    ///
    /// # Errors
    ///
    /// Same as [`get_states`](Self::get_states).
    pub async fn create_input_boolean(&self, name: &str) -> Result<InputBooleanHelper> {
        self.send_command_as(&Command::CreateInputBoolean {
            name: name.to_string(),
        })
        .await
    }

    /// Deletes the `input_boolean` helper with id `id`.
    ///
    /// # Errors
    ///
    /// Same as [`Client::send_command`]; an unknown id comes back as
    /// [`Error::Remote`](crate::Error::Remote).
    pub async fn delete_input_boolean(&self, id: &str) -> Result<()> {
        self.send_command(&Command::DeleteInputBoolean {
            input_boolean_id: id.to_string(),
        })
        .await?;
        Ok(())
    }

    /// Lists `input_number` helpers.
    ///
    /// # Errors
    ///
    /// Same as [`get_states`](Self::get_states).
    pub async fn list_input_numbers(&self) -> Result<Vec<InputNumberHelper>> {
        let helpers: Option<Vec<InputNumberHelper>> =
            self.send_command_as(&Command::ListInputNumbers).await?;
        Ok(helpers.unwrap_or_default())
    }

    /// Creates an `input_number` helper.
    ///
    /// # Errors
    ///
    /// Same as [`get_states`](Self::get_states).
    pub async fn create_input_number(&self, settings: NewInputNumber) -> Result<InputNumberHelper> {
        self.send_command_as(&Command::CreateInputNumber(settings)).await
    }

    /// Deletes the `input_number` helper with id `id`.
    ///
    /// # Errors
    ///
    /// Same as [`delete_input_boolean`](Self::delete_input_boolean).
    pub async fn delete_input_number(&self, id: &str) -> Result<()> {
        self.send_command(&Command::DeleteInputNumber {
            input_number_id: id.to_string(),
        })
        .await?;
        Ok(())
    }

    /// Sends a ping and returns the round-trip time.
    ///
    /// # Errors
    ///
    /// Same as [`Client::send_command`].
    pub async fn ping(&self) -> Result<Duration> {
        let started = Instant::now();
        self.send_command(&Command::Ping).await?;
        Ok(started.elapsed())
    }
}
