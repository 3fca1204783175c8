//! In-memory adapter test doubles, used by the scenario tests in `tests/`.
//! Not compiled into the release binary (spec's adapters are I/O-bound by
//! nature, so exercising the worker pool and scanner against a real SMTP/push
//! provider in tests would be both slow and nondeterministic).

use std::sync::Mutex;

use async_trait::async_trait;

use crate::render::{RenderedMessage, TemplateKind};

use super::{Adapter, AdapterOutcome};

/// Records every `send` call and returns a pre-programmed outcome, cycling
/// through `scripted` in order and repeating the last entry once exhausted.
pub struct ScriptedAdapter {
    scripted: Vec<AdapterOutcome>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedAdapter {
    pub fn always(outcome: AdapterOutcome) -> Self {
        Self {
            scripted: vec![outcome],
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn sequence(outcomes: Vec<AdapterOutcome>) -> Self {
        Self {
            scripted: outcomes,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Adapter for ScriptedAdapter {
    async fn send(
        &self,
        channel_address: &str,
        message: &RenderedMessage,
        _kind: TemplateKind,
        _episode_id: &str,
    ) -> AdapterOutcome {
        let mut calls = self.calls.lock().unwrap();
        let idx = calls.len();
        calls.push((channel_address.to_string(), message.subject.clone()));
        self.scripted
            .get(idx)
            .or_else(|| self.scripted.last())
            .cloned()
            .unwrap_or(AdapterOutcome::TransientFail {
                reason: "no scripted outcome".into(),
            })
    }
}
