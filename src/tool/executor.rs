use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::request::ChatTurn;

use super::accumulator::ToolCallFragment;
use super::args::ensure_json_string;
use super::registry::ToolSpec;

/// Executes completed tool calls against the registered handlers.
///
/// Calls within one batch run concurrently (fan-out/fan-in); results are
/// memoized by `(tool name, normalized arguments)` for the executor's
/// lifetime, so identical calls are never re-executed. One executor lives
/// per chat session.
pub struct ToolExecutor {
    cache: RwLock<FxHashMap<String, Arc<Vec<Value>>>>,
}

impl ToolExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(FxHashMap::default()),
        }
    }

    /// Execute every call and return one tool-role turn per call, in input
    /// order. Errors (unknown tool, unparseable arguments, handler failure)
    /// become `{"error": …}` results; no call is ever omitted and one call's
    /// failure never aborts its siblings.
    pub async fn execute(&self, calls: &[ToolCallFragment], tools: &[ToolSpec]) -> Vec<ChatTurn> {
        let futures = calls.iter().map(|call| self.execute_one(call, tools));
        futures_util::future::join_all(futures).await
    }

    async fn execute_one(&self, call: &ToolCallFragment, tools: &[ToolSpec]) -> ChatTurn {
        let normalized = ensure_json_string(&call.arguments);
        let key = cache_key(&call.name, &normalized);

        let cached = self.cache.read().get(&key).cloned();
        let result_list = match cached {
            Some(cached) => {
                tracing::debug!(tool = %call.name, "tool result served from cache");
                cached
            }
            None => match self.invoke(call, tools, &normalized).await {
                Ok(list) => {
                    let list = Arc::new(list);
                    self.cache.write().insert(key, list.clone());
                    list
                }
                Err(message) => {
                    tracing::warn!(tool = %call.name, error = %message, "tool call failed");
                    Arc::new(vec![serde_json::json!({ "error": message })])
                }
            },
        };

        let content =
            serde_json::to_string(result_list.as_ref()).unwrap_or_else(|_| "[]".to_string());
        ChatTurn::tool_result(&call.id, content)
    }

    /// Look up and run the handler, list-normalizing its result. Errors are
    /// returned as plain messages and not cached.
    async fn invoke(
        &self,
        call: &ToolCallFragment,
        tools: &[ToolSpec],
        normalized: &str,
    ) -> Result<Vec<Value>, String> {
        let Some(tool) = tools.iter().find(|tool| tool.name == call.name) else {
            return Err(format!("Tool handler for \"{}\" not found", call.name));
        };

        let args: Value = serde_json::from_str(normalized).map_err(|err| err.to_string())?;
        let value = tool.invoke(args).await.map_err(|err| err.to_string())?;

        Ok(match value {
            Value::Array(items) => items,
            other => vec![other],
        })
    }
}

impl Default for ToolExecutor {
    fn default() -> Self {
        Self::new()
    }
}

fn cache_key(name: &str, normalized_arguments: &str) -> String {
    let mut key = String::with_capacity(name.len() + 1 + normalized_arguments.len());
    key.push_str(name);
    key.push(':');
    key.push_str(normalized_arguments);
    key
}
