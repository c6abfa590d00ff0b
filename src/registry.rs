//! Collaborator seam over the tool registry.
//!
//! The registry itself (name → implementation + schema) lives outside this
//! crate; the applier only needs the thin execution adapter below.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::invocation::{ArgMap, ToolError, ToolInvocation, ToolResult};
use crate::policy::ToolExecutor;

/// The registry interface transports and the dispatch core consume.
#[async_trait]
pub trait ToolRegistry: Send + Sync {
    /// Execute an invocation against the named tool's implementation.
    ///
    /// # Errors
    ///
    /// Raises [`ToolError`] for errors the tool did not fold into a
    /// [`ToolResult`] itself.
    async fn invoke(&self, invocation: &ToolInvocation) -> Result<ToolResult, ToolError>;

    /// Schemas of every registered tool.
    fn list(&self) -> Vec<Value>;

    fn tool_names(&self) -> Vec<String>;
}

/// Adapts a [`ToolRegistry`] into the applier's [`ToolExecutor`] seam.
///
/// The applier may substitute a different tool name (the fallback) and
/// hook-rewritten arguments, so each execution builds a fresh pre-extracted
/// invocation rather than reusing the parsed one.
pub struct RegistryExecutor {
    registry: Arc<dyn ToolRegistry>,
}

impl RegistryExecutor {
    #[must_use]
    pub fn new(registry: Arc<dyn ToolRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ToolExecutor for RegistryExecutor {
    async fn execute(&self, tool: &str, args: &ArgMap) -> Result<ToolResult, ToolError> {
        let invocation = ToolInvocation::pre_extracted(tool, args.clone());
        self.registry.invoke(&invocation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct SingleToolRegistry;

    #[async_trait]
    impl ToolRegistry for SingleToolRegistry {
        async fn invoke(&self, invocation: &ToolInvocation) -> Result<ToolResult, ToolError> {
            if invocation.tool == "ping" {
                Ok(ToolResult::ok(json!("pong")))
            } else {
                Err(ToolError::new("UNKNOWN_TOOL", "no such tool"))
            }
        }

        fn list(&self) -> Vec<Value> {
            vec![json!({"name": "ping", "parameters": {"type": "object"}})]
        }

        fn tool_names(&self) -> Vec<String> {
            vec!["ping".to_string()]
        }
    }

    #[tokio::test]
    async fn executor_routes_through_registry() {
        let executor = RegistryExecutor::new(Arc::new(SingleToolRegistry));
        let result = executor.execute("ping", &ArgMap::new()).await.unwrap();
        assert!(result.success);

        let err = executor.execute("nope", &ArgMap::new()).await.unwrap_err();
        assert_eq!(err.code, "UNKNOWN_TOOL");
    }
}
