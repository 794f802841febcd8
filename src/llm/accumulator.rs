//! Tool-call accumulator: rebuilds whole tool calls from streaming deltas.
//!
//! Each call is tracked under a [`CallKey`] chosen by the adapter (vendor
//! call id, item id, content-block index, or a synthetic ordinal for vendors
//! without any per-call key). Argument text is appended verbatim in arrival
//! order and only parsed once, when the turn finishes.

use crate::llm::arguments::reconcile;
use crate::types::{Tool, ToolCall, ToolCallMetadata};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Identity of a call within one turn
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallKey {
    /// Vendor-issued call id
    Id(String),
    /// Vendor-issued output item id
    Item(String),
    /// Content-block or delta index
    Index(usize),
    /// Deterministic key for vendors that send no per-call identity
    Synthetic(usize),
}

/// Lifecycle of one pending call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Name known, no argument text yet
    Opened,
    /// Argument text appended at least once
    Accumulating,
    /// Arguments complete
    Finalized,
}

#[derive(Debug)]
enum Arguments {
    Raw(String),
    Structured(Value),
}

#[derive(Debug)]
struct PendingCall {
    id: Option<String>,
    name: String,
    arguments: Arguments,
    state: CallState,
}

/// Collects tool calls for one turn
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: IndexMap<CallKey, PendingCall>,
    next_synthetic: usize,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh synthetic key
    pub fn synthetic_key(&mut self) -> CallKey {
        let key = CallKey::Synthetic(self.next_synthetic);
        self.next_synthetic += 1;
        key
    }

    /// Start a call, or fill in the id and name of one already started
    pub fn open(&mut self, key: CallKey, id: Option<String>, name: impl Into<String>) {
        let name = name.into();
        let id = id.filter(|id| !id.is_empty());
        match self.calls.get_mut(&key) {
            Some(call) => {
                if call.id.is_none() {
                    call.id = id;
                }
                if call.name.is_empty() {
                    call.name = name;
                }
            }
            None => {
                tracing::debug!("🔧 Starting tool call {} ({:?})", name, key);
                self.calls.insert(
                    key,
                    PendingCall {
                        id,
                        name,
                        arguments: Arguments::Raw(String::new()),
                        state: CallState::Opened,
                    },
                );
            }
        }
    }

    /// Append argument text to a call.
    ///
    /// A delta for an unknown key opens a nameless call; it is dropped at
    /// finish unless a later `open` supplies a declared name.
    pub fn append(&mut self, key: &CallKey, delta: &str) {
        if !self.calls.contains_key(key) {
            tracing::warn!("🔧 Argument delta for unknown tool call {:?}", key);
            self.open(key.clone(), None, String::new());
        }
        if let Some(call) = self.calls.get_mut(key) {
            if call.state == CallState::Finalized {
                tracing::warn!("🔧 Ignoring argument delta after finalization for {:?}", key);
                return;
            }
            if let Arguments::Raw(raw) = &mut call.arguments {
                raw.push_str(delta);
            }
            call.state = CallState::Accumulating;
        }
    }

    /// Mark a call complete
    pub fn finalize(&mut self, key: &CallKey) {
        if let Some(call) = self.calls.get_mut(key) {
            call.state = CallState::Finalized;
        }
    }

    /// Mark a call complete, using `full` when no deltas arrived
    pub fn finalize_with(&mut self, key: &CallKey, full: &str) {
        if let Some(call) = self.calls.get_mut(key) {
            if let Arguments::Raw(raw) = &mut call.arguments {
                if raw.is_empty() {
                    raw.push_str(full);
                } else if raw != full {
                    tracing::debug!(
                        "🔧 Streamed arguments for {:?} differ from the final summary; keeping streamed text",
                        key
                    );
                }
            }
            call.state = CallState::Finalized;
        }
    }

    /// Insert a call whose arguments arrived already structured
    pub fn insert_complete(
        &mut self,
        id: Option<String>,
        name: impl Into<String>,
        arguments: Value,
    ) -> CallKey {
        let key = self.synthetic_key();
        self.calls.insert(
            key.clone(),
            PendingCall {
                id: id.filter(|id| !id.is_empty()),
                name: name.into(),
                arguments: Arguments::Structured(arguments),
                state: CallState::Finalized,
            },
        );
        key
    }

    /// Current state of a call
    pub fn state(&self, key: &CallKey) -> Option<CallState> {
        self.calls.get(key).map(|call| call.state)
    }

    /// Raw argument text accumulated so far
    pub fn raw_arguments(&self, key: &CallKey) -> Option<&str> {
        match &self.calls.get(key)?.arguments {
            Arguments::Raw(raw) => Some(raw),
            Arguments::Structured(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Finalize every call and convert to caller-visible tool calls.
    ///
    /// Calls naming a tool the caller did not declare are dropped. Missing
    /// or duplicate ids are replaced with fresh ones.
    pub fn finish(self, declared: &[Tool]) -> Vec<ToolCall> {
        let mut seen_ids = HashSet::new();
        let mut result = Vec::with_capacity(self.calls.len());

        for (key, call) in self.calls {
            let Some(tool) = declared.iter().find(|t| t.name == call.name) else {
                tracing::debug!(
                    "🔧 Dropping tool call {:?} for undeclared tool '{}'",
                    key,
                    call.name
                );
                continue;
            };

            let (arguments, parse_error) = match call.arguments {
                Arguments::Raw(raw) => {
                    let reconciled = reconcile(&raw);
                    (reconciled.arguments, reconciled.error)
                }
                Arguments::Structured(Value::Object(map)) => (map, None),
                Arguments::Structured(Value::Null) => (Map::new(), None),
                Arguments::Structured(other) => (
                    Map::new(),
                    Some(format!("Tool arguments must be a JSON object, got {}", other)),
                ),
            };

            let id = match call.id {
                Some(id) if !seen_ids.contains(&id) => id,
                Some(id) => {
                    let fresh = fresh_call_id();
                    tracing::debug!("🔧 Duplicate tool call id {} re-issued as {}", id, fresh);
                    fresh
                }
                None => fresh_call_id(),
            };
            seen_ids.insert(id.clone());

            if let Some(error) = &parse_error {
                tracing::warn!("🔧 Tool call {} arguments degraded: {}", call.name, error);
            }

            result.push(ToolCall {
                id,
                name: call.name,
                arguments,
                metadata: Some(ToolCallMetadata {
                    description: Some(tool.description.clone()),
                    input_schema: Some(tool.input_schema.clone()),
                    parse_error,
                }),
            });
        }

        result
    }
}

fn fresh_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tools(names: &[&str]) -> Vec<Tool> {
        names
            .iter()
            .map(|name| Tool::new(*name, "test tool", json!({"type": "object"})))
            .collect()
    }

    #[test]
    fn test_state_transitions() {
        let mut acc = ToolCallAccumulator::new();
        let key = CallKey::Index(0);
        acc.open(key.clone(), Some("call_1".to_string()), "read_file");
        assert_eq!(acc.state(&key), Some(CallState::Opened));
        acc.append(&key, "{\"path\":");
        assert_eq!(acc.state(&key), Some(CallState::Accumulating));
        acc.append(&key, "\"/tmp\"}");
        acc.finalize(&key);
        assert_eq!(acc.state(&key), Some(CallState::Finalized));

        let calls = acc.finish(&tools(&["read_file"]));
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].arguments["path"], json!("/tmp"));
        assert_eq!(calls[0].parse_error(), None);
    }

    #[test]
    fn test_deltas_concatenate_in_arrival_order_for_any_split() {
        let text = "{\"query\":\"streaming adapters\",\"limit\":5}";
        for split in 1..text.len() {
            let mut acc = ToolCallAccumulator::new();
            let key = CallKey::Id("call_x".to_string());
            acc.open(key.clone(), None, "search");
            let (a, b) = text.split_at(split);
            acc.append(&key, a);
            acc.append(&key, b);
            assert_eq!(acc.raw_arguments(&key), Some(text));
        }
    }

    #[test]
    fn test_undeclared_tools_are_dropped() {
        let mut acc = ToolCallAccumulator::new();
        acc.open(CallKey::Index(0), Some("srv_1".to_string()), "web_search");
        acc.open(CallKey::Index(1), Some("call_2".to_string()), "calculator");
        acc.append(&CallKey::Index(1), "{\"expr\":\"1+1\"}");

        let calls = acc.finish(&tools(&["calculator"]));
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "calculator");
    }

    #[test]
    fn test_missing_and_duplicate_ids_are_synthesized() {
        let mut acc = ToolCallAccumulator::new();
        acc.open(CallKey::Index(0), Some("dup".to_string()), "a");
        acc.open(CallKey::Index(1), Some("dup".to_string()), "a");
        acc.open(CallKey::Index(2), None, "a");

        let calls = acc.finish(&tools(&["a"]));
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].id, "dup");
        assert_ne!(calls[1].id, "dup");
        assert!(calls[2].id.starts_with("call_"));
        let unique: HashSet<_> = calls.iter().map(|c| c.id.clone()).collect();
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn test_malformed_arguments_degrade_to_empty_object() {
        let mut acc = ToolCallAccumulator::new();
        let key = CallKey::Index(0);
        acc.open(key.clone(), Some("call_1".to_string()), "a");
        acc.append(&key, "not json at all");

        let calls = acc.finish(&tools(&["a"]));
        assert!(calls[0].arguments.is_empty());
        assert!(calls[0].parse_error().is_some());
    }

    #[test]
    fn test_complete_calls_use_synthetic_keys_and_keep_order() {
        let mut acc = ToolCallAccumulator::new();
        let first = acc.insert_complete(None, "a", json!({"n": 1}));
        let second = acc.insert_complete(None, "a", json!({"n": 2}));
        assert_eq!(first, CallKey::Synthetic(0));
        assert_eq!(second, CallKey::Synthetic(1));

        let calls = acc.finish(&tools(&["a"]));
        assert_eq!(calls[0].arguments["n"], json!(1));
        assert_eq!(calls[1].arguments["n"], json!(2));
    }

    #[test]
    fn test_unknown_key_delta_opens_nameless_call() {
        let mut acc = ToolCallAccumulator::new();
        let key = CallKey::Index(3);
        acc.append(&key, "{\"a\":");
        acc.open(key.clone(), Some("call_9".to_string()), "a");
        acc.append(&key, "1}");

        let calls = acc.finish(&tools(&["a"]));
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_9");
        assert_eq!(calls[0].arguments["a"], json!(1));
    }

    #[test]
    fn test_finalize_with_fills_empty_arguments_only() {
        let mut acc = ToolCallAccumulator::new();
        let streamed = CallKey::Item("fc_1".to_string());
        let silent = CallKey::Item("fc_2".to_string());
        acc.open(streamed.clone(), Some("call_1".to_string()), "a");
        acc.open(silent.clone(), Some("call_2".to_string()), "a");
        acc.append(&streamed, "{\"x\":1}");
        acc.finalize_with(&streamed, "{\"x\":1}");
        acc.finalize_with(&silent, "{\"y\":2}");

        assert_eq!(acc.raw_arguments(&streamed), Some("{\"x\":1}"));
        assert_eq!(acc.raw_arguments(&silent), Some("{\"y\":2}"));
    }

    #[test]
    fn test_metadata_carries_declared_tool_details() {
        let mut acc = ToolCallAccumulator::new();
        acc.insert_complete(Some("c".to_string()), "a", json!({}));
        let calls = acc.finish(&tools(&["a"]));
        let meta = calls[0].metadata.as_ref().unwrap();
        assert_eq!(meta.description.as_deref(), Some("test tool"));
        assert_eq!(meta.input_schema, Some(json!({"type": "object"})));
    }
}
