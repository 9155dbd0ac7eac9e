//! Raw device capability and the typed client layered on it.
//!
//! Every controller interaction is one named operation with a JSON payload
//! and a `{ success, message, data }` reply. The typed client owns the
//! operation names and payload shapes; `success = false` becomes
//! `CoreError::DeviceRejected` carrying the device's message verbatim.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::models::{DeviceProgramEntry, MachineStatus};

/// Reply envelope every device operation returns.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct DeviceReply {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Value,
}

/// Transport to a machine controller. One call, one named operation.
#[async_trait]
pub trait DeviceCapability: Send + Sync {
    async fn call(&self, machine_uid: &str, op: &str, payload: Value) -> CoreResult<DeviceReply>;
}

/// Typed operations over the raw capability.
#[derive(Clone)]
pub struct DeviceClient {
    transport: Arc<dyn DeviceCapability>,
}

impl DeviceClient {
    pub fn new(transport: Arc<dyn DeviceCapability>) -> Self {
        Self { transport }
    }

    async fn invoke<T: DeserializeOwned>(
        &self,
        machine_uid: &str,
        op: &str,
        payload: Value,
    ) -> CoreResult<T> {
        debug!(machine = machine_uid, op, "device call");
        let reply = self.transport.call(machine_uid, op, payload).await?;
        if !reply.success {
            return Err(CoreError::device_rejected(reply.message));
        }
        serde_json::from_value(reply.data)
            .map_err(|e| CoreError::transport(format!("malformed {op} reply: {e}")))
    }

    /// Invoke an operation whose reply data carries nothing useful.
    async fn invoke_unit(&self, machine_uid: &str, op: &str, payload: Value) -> CoreResult<()> {
        debug!(machine = machine_uid, op, "device call");
        let reply = self.transport.call(machine_uid, op, payload).await?;
        if !reply.success {
            return Err(CoreError::device_rejected(reply.message));
        }
        Ok(())
    }

    /// List machine-resident programs.
    pub async fn program_list(&self, machine_uid: &str) -> CoreResult<Vec<DeviceProgramEntry>> {
        self.invoke(machine_uid, "GetProgListInfo", json!({})).await
    }

    /// Read the text of one machine-resident program. Legacy programs on
    /// multi-head controllers are addressed by number plus head type.
    pub async fn program_content(
        &self,
        machine_uid: &str,
        program_no: u32,
        head_type: Option<&str>,
    ) -> CoreResult<String> {
        let mut payload = json!({ "progNo": program_no });
        if let Some(head) = head_type {
            payload["headType"] = json!(head);
        }
        self.invoke(machine_uid, "GetProgDataInfo", payload).await
    }

    /// Write a program to the controller. `is_new` distinguishes register
    /// from overwrite; controllers reject a register of an existing number.
    pub async fn update_program(
        &self,
        machine_uid: &str,
        program_no: u32,
        head_type: Option<&str>,
        content: &str,
        is_new: bool,
    ) -> CoreResult<()> {
        let mut payload = json!({ "progNo": program_no, "data": content, "isNew": is_new });
        if let Some(head) = head_type {
            payload["headType"] = json!(head);
        }
        self.invoke_unit(machine_uid, "UpdateProgram", payload).await
    }

    /// Program number the controller reports as active.
    pub async fn active_program(&self, machine_uid: &str) -> CoreResult<u32> {
        self.invoke(machine_uid, "GetActivateProgInfo", json!({})).await
    }

    /// Select a program as active for the next cycle start.
    pub async fn activate_program(&self, machine_uid: &str, program_no: u32) -> CoreResult<()> {
        self.invoke_unit(
            machine_uid,
            "UpdateActivateProg",
            json!({ "progNo": program_no }),
        )
        .await
    }

    /// Tool-life counters.
    pub async fn tool_life(&self, machine_uid: &str) -> CoreResult<Value> {
        self.invoke(machine_uid, "GetToolLifeInfo", json!({})).await
    }

    /// Spindle and axis motor temperatures.
    pub async fn motor_temperature(&self, machine_uid: &str) -> CoreResult<Value> {
        self.invoke(machine_uid, "GetMotorTemperature", json!({})).await
    }

    /// Operator-panel IO status (cycle start, feed hold, and friends).
    pub async fn op_status(&self, machine_uid: &str) -> CoreResult<MachineStatus> {
        self.invoke(machine_uid, "GetOPStatus", json!({})).await
    }

    /// Drive the operator panel: `signal` is the panel line, `value` its
    /// target level. Used for remote cycle start and stop.
    pub async fn update_op_status(
        &self,
        machine_uid: &str,
        signal: &str,
        value: bool,
    ) -> CoreResult<()> {
        self.invoke_unit(
            machine_uid,
            "UpdateOPStatus",
            json!({ "signal": signal, "value": value }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct ScriptedDevice {
        replies: Mutex<Vec<DeviceReply>>,
        calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl DeviceCapability for ScriptedDevice {
        async fn call(&self, machine_uid: &str, op: &str, _payload: Value) -> CoreResult<DeviceReply> {
            self.calls.lock().push((machine_uid.into(), op.into()));
            Ok(self.replies.lock().remove(0))
        }
    }

    #[tokio::test]
    async fn rejected_reply_surfaces_device_message() {
        let device = Arc::new(ScriptedDevice {
            replies: Mutex::new(vec![DeviceReply {
                success: false,
                message: "CNC communication error (result -16)".into(),
                data: Value::Null,
            }]),
            calls: Mutex::new(Vec::new()),
        });
        let client = DeviceClient::new(device.clone());
        let err = client.active_program("m1").await.unwrap_err();
        assert_eq!(err.to_string(), "CNC communication error (result -16)");
        assert_eq!(device.calls.lock()[0].1, "GetActivateProgInfo");
    }

    #[tokio::test]
    async fn program_content_decodes_data() {
        let device = Arc::new(ScriptedDevice {
            replies: Mutex::new(vec![DeviceReply {
                success: true,
                message: String::new(),
                data: json!("O0012\nG0 X0\nM30"),
            }]),
            calls: Mutex::new(Vec::new()),
        });
        let client = DeviceClient::new(device);
        let text = client.program_content("m1", 12, None).await.unwrap();
        assert!(text.starts_with("O0012"));
    }
}
