//! Handler registry for tools, resources, and prompts.
//!
//! The registry is filled once at startup and then handed to the
//! [`Dispatcher`](crate::mcp::dispatch::Dispatcher), which never mutates it.
//! Handlers own the business logic; the registry only stores and looks them up.
//!
//! ```rust
//! use release_mcp::mcp::registry::{Registry, ToolEffect};
//! use release_mcp::mcp::types::{CallToolResult, ToolDefinition};
//! use serde_json::json;
//!
//! let registry = Registry::new().tool(
//!     ToolDefinition {
//!         name: "echo".to_string(),
//!         description: None,
//!         input_schema: json!({"type": "object"}),
//!         annotations: None,
//!     },
//!     ToolEffect::ReadOnly,
//!     |_scope, args| async move { Ok(CallToolResult::json(&args)) },
//! );
//! assert!(registry.find_tool("echo").is_some());
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::HandlerError;
use crate::mcp::progress::CallScope;
use crate::mcp::types::{
    CallToolResult, GetPromptResult, PromptDefinition, ReadResourceResult, ResourceDefinition,
    ToolAnnotations, ToolDefinition,
};

/// Boxed future returned by every handler.
pub type HandlerFuture<T> = Pin<Box<dyn Future<Output = Result<T, HandlerError>> + Send>>;

/// Tool handler: receives the call scope and the caller's arguments.
pub type ToolHandler = Arc<dyn Fn(CallScope, Value) -> HandlerFuture<CallToolResult> + Send + Sync>;

/// Resource handler: receives the call scope and the requested URI.
pub type ResourceHandler =
    Arc<dyn Fn(CallScope, String) -> HandlerFuture<ReadResourceResult> + Send + Sync>;

/// Prompt handler: receives the call scope and the prompt arguments.
pub type PromptHandler =
    Arc<dyn Fn(CallScope, HashMap<String, String>) -> HandlerFuture<GetPromptResult> + Send + Sync>;

/// What a tool does to release state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolEffect {
    /// The tool only reads state.
    ReadOnly,
    /// A successful call changes state; state-dependent resources go stale.
    MutatesState,
}

/// A tool and its handler.
#[derive(Clone)]
pub struct RegisteredTool {
    /// Definition returned by tools/list.
    pub definition: ToolDefinition,
    /// Effect on release state.
    pub effect: ToolEffect,
    /// The handler.
    pub handler: ToolHandler,
}

/// A resource and its handler.
#[derive(Clone)]
pub struct RegisteredResource {
    /// Definition returned by resources/list.
    pub definition: ResourceDefinition,
    /// The handler.
    pub handler: ResourceHandler,
}

/// A prompt and its handler.
#[derive(Clone)]
pub struct RegisteredPrompt {
    /// Definition returned by prompts/list.
    pub definition: PromptDefinition,
    /// The handler.
    pub handler: PromptHandler,
}

/// Tables of registered handlers, keyed by tool name, resource URI, and
/// prompt name. Iteration follows registration order.
#[derive(Clone, Default)]
pub struct Registry {
    tools: IndexMap<String, RegisteredTool>,
    resources: IndexMap<String, RegisteredResource>,
    prompts: IndexMap<String, RegisteredPrompt>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool. A later registration under the same name replaces
    /// the earlier one.
    ///
    /// The definition's `readOnlyHint` annotation is derived from `effect`.
    #[must_use]
    pub fn tool<F, Fut>(mut self, mut definition: ToolDefinition, effect: ToolEffect, handler: F) -> Self
    where
        F: Fn(CallScope, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<CallToolResult, HandlerError>> + Send + 'static,
    {
        definition.annotations = Some(ToolAnnotations {
            read_only_hint: effect == ToolEffect::ReadOnly,
        });
        let boxed: ToolHandler = Arc::new(
            move |scope: CallScope, args: Value| -> HandlerFuture<CallToolResult> {
                Box::pin(handler(scope, args))
            },
        );
        self.tools.insert(
            definition.name.clone(),
            RegisteredTool {
                definition,
                effect,
                handler: boxed,
            },
        );
        self
    }

    /// Registers a resource under its URI.
    #[must_use]
    pub fn resource<F, Fut>(mut self, definition: ResourceDefinition, handler: F) -> Self
    where
        F: Fn(CallScope, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ReadResourceResult, HandlerError>> + Send + 'static,
    {
        let boxed: ResourceHandler = Arc::new(
            move |scope: CallScope, uri: String| -> HandlerFuture<ReadResourceResult> {
                Box::pin(handler(scope, uri))
            },
        );
        self.resources.insert(
            definition.uri.clone(),
            RegisteredResource {
                definition,
                handler: boxed,
            },
        );
        self
    }

    /// Registers a prompt under its name.
    #[must_use]
    pub fn prompt<F, Fut>(mut self, definition: PromptDefinition, handler: F) -> Self
    where
        F: Fn(CallScope, HashMap<String, String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<GetPromptResult, HandlerError>> + Send + 'static,
    {
        let boxed: PromptHandler = Arc::new(
            move |scope: CallScope, args: HashMap<String, String>| -> HandlerFuture<GetPromptResult> {
                Box::pin(handler(scope, args))
            },
        );
        self.prompts.insert(
            definition.name.clone(),
            RegisteredPrompt {
                definition,
                handler: boxed,
            },
        );
        self
    }

    /// Looks up a tool by name.
    #[must_use]
    pub fn find_tool(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }

    /// Looks up a resource by URI.
    #[must_use]
    pub fn find_resource(&self, uri: &str) -> Option<&RegisteredResource> {
        self.resources.get(uri)
    }

    /// Looks up a prompt by name.
    #[must_use]
    pub fn find_prompt(&self, name: &str) -> Option<&RegisteredPrompt> {
        self.prompts.get(name)
    }

    /// Tool definitions in registration order.
    pub fn tool_definitions(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.values().map(|t| &t.definition)
    }

    /// Resource definitions in registration order.
    pub fn resource_definitions(&self) -> impl Iterator<Item = &ResourceDefinition> {
        self.resources.values().map(|r| &r.definition)
    }

    /// Prompt definitions in registration order.
    pub fn prompt_definitions(&self) -> impl Iterator<Item = &PromptDefinition> {
        self.prompts.values().map(|p| &p.definition)
    }

    /// Returns `true` if at least one tool is registered.
    #[must_use]
    pub fn has_tools(&self) -> bool {
        !self.tools.is_empty()
    }

    /// Returns `true` if at least one resource is registered.
    #[must_use]
    pub fn has_resources(&self) -> bool {
        !self.resources.is_empty()
    }

    /// Returns `true` if at least one prompt is registered.
    #[must_use]
    pub fn has_prompts(&self) -> bool {
        !self.prompts.is_empty()
    }
}
