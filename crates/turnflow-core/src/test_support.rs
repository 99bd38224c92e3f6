//! Recording host for engine unit tests.

use std::sync::Mutex;

use serde_json::Value;

use turnflow_types::activity::{Activity, ResourceResponse};
use turnflow_types::dialog::DialogTurnResult;
use turnflow_types::error::HostError;

use crate::dialog::host::DialogHost;
use crate::workflow::error::WorkflowError;

/// A host with one instance slot that records every call made to it.
///
/// Child dialogs are never run: `begin_dialog` reports `Waiting`.
#[derive(Default)]
pub struct RecordingHost {
    pub inbound: Mutex<Activity>,
    pub slot: Mutex<Option<Value>>,
    pub sent: Mutex<Vec<Activity>>,
    pub begun: Mutex<Vec<(String, Option<Value>)>>,
    pub ended: Mutex<Vec<Option<Value>>>,
    pub replaced: Mutex<Vec<(String, Option<Value>)>>,
}

impl RecordingHost {
    pub fn receive(&self, text: &str) {
        *self.inbound.lock().unwrap() = Activity::message(text).in_conversation("test", "conv-1");
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|a| a.text().to_string())
            .collect()
    }
}

impl DialogHost for RecordingHost {
    fn activity(&self) -> Activity {
        self.inbound.lock().unwrap().clone()
    }

    fn active_dialog_id(&self) -> Option<String> {
        Some("flow".to_string())
    }

    fn load_instance_state(&self) -> Result<Option<Value>, HostError> {
        Ok(self.slot.lock().unwrap().clone())
    }

    fn save_instance_state(&self, state: Value) -> Result<(), HostError> {
        *self.slot.lock().unwrap() = Some(state);
        Ok(())
    }

    async fn send_activity(&self, activity: Activity) -> Result<ResourceResponse, HostError> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(activity);
        Ok(ResourceResponse {
            id: format!("activity-{}", sent.len()),
        })
    }

    async fn begin_dialog(
        &self,
        dialog_id: &str,
        options: Option<Value>,
    ) -> Result<DialogTurnResult, WorkflowError> {
        self.begun
            .lock()
            .unwrap()
            .push((dialog_id.to_string(), options));
        Ok(DialogTurnResult::waiting())
    }

    async fn end_dialog(&self, result: Option<Value>) -> Result<DialogTurnResult, WorkflowError> {
        self.ended.lock().unwrap().push(result.clone());
        Ok(DialogTurnResult::complete(result))
    }

    async fn replace_dialog(
        &self,
        dialog_id: &str,
        options: Option<Value>,
    ) -> Result<DialogTurnResult, WorkflowError> {
        self.replaced
            .lock()
            .unwrap()
            .push((dialog_id.to_string(), options));
        Ok(DialogTurnResult::waiting())
    }
}
