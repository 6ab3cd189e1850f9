use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use schemars::JsonSchema;
use schemars::schema::RootSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::handle::EventSink;
use crate::Result;
use crate::protocol::client_events::ClientEvent;
use crate::protocol::models::{Item, Response, Tool};

/// Advance to the next slide through [`Navigation::advance`].
pub const NEXT_SLIDE: &str = "next_slide";
/// Go back to the previous slide through [`Navigation::retreat`].
pub const PREVIOUS_SLIDE: &str = "previous_slide";

/// Deck navigation supplied by the host application.
pub trait Navigation: Send + Sync {
    fn advance(&self);
    fn retreat(&self);
    fn jump_to(&self, index: usize);
    fn current_index(&self) -> usize;
    fn total_count(&self) -> usize;
}

/// What a tool invocation reports back to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutcome {
    #[must_use]
    pub fn done(action: impl Into<String>) -> Self {
        Self { success: true, action: Some(action.into()), error: None }
    }

    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self { success: false, action: None, error: Some(error.into()) }
    }
}

/// State a tool handler may act on.
#[derive(Clone, Default)]
pub struct ToolContext {
    pub navigation: Option<Arc<dyn Navigation>>,
}

type ToolHandler = Box<dyn Fn(&ToolContext, Value) -> ToolOutcome + Send + Sync>;

#[derive(Clone, Debug)]
pub struct ToolDefinition {
    pub name: String,
    pub description: Option<String>,
    pub schema: RootSchema,
}

/// A function call taken from a completed response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingFunctionCall {
    pub name: String,
    pub call_id: String,
    pub arguments: String,
}

impl PendingFunctionCall {
    /// Function calls in a finished response's output, in output order.
    #[must_use]
    pub fn harvest(response: &Response) -> Vec<Self> {
        response
            .output_items()
            .iter()
            .filter_map(|item| match item {
                Item::FunctionCall { name, call_id, arguments, .. } => Some(Self {
                    name: name.clone(),
                    call_id: call_id.clone(),
                    arguments: arguments.clone(),
                }),
                _ => None,
            })
            .collect()
    }
}

#[derive(Default)]
pub struct ToolRegistry {
    defs: Vec<ToolDefinition>,
    handlers: HashMap<String, ToolHandler>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry").field("defs", &self.defs).finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct NoArgs {}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The two deck-navigation tools.
    #[must_use]
    pub fn navigation() -> Self {
        let mut registry = Self::new();
        registry.tool_with_description(
            NEXT_SLIDE,
            "Advance to the next slide. Call this when the current slide has been covered \
             or the user asks to move on.",
            |ctx: &ToolContext, _: NoArgs| {
                with_navigation(ctx, |nav| {
                    if nav.current_index() + 1 >= nav.total_count() {
                        return ToolOutcome::failed("already on the last slide");
                    }
                    nav.advance();
                    ToolOutcome::done("navigated_next")
                })
            },
        );
        registry.tool_with_description(
            PREVIOUS_SLIDE,
            "Go back to the previous slide. Call this when the user asks to revisit \
             something shown earlier.",
            |ctx: &ToolContext, _: NoArgs| {
                with_navigation(ctx, |nav| {
                    if nav.current_index() == 0 {
                        return ToolOutcome::failed("already on the first slide");
                    }
                    nav.retreat();
                    ToolOutcome::done("navigated_previous")
                })
            },
        );
        registry
    }

    #[must_use]
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.defs
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn tool<TArgs, F>(&mut self, name: &str, handler: F)
    where
        TArgs: DeserializeOwned + JsonSchema + 'static,
        F: Fn(&ToolContext, TArgs) -> ToolOutcome + Send + Sync + 'static,
    {
        self.register(name, None, handler);
    }

    pub fn tool_with_description<TArgs, F>(
        &mut self,
        name: &str,
        description: impl Into<String>,
        handler: F,
    )
    where
        TArgs: DeserializeOwned + JsonSchema + 'static,
        F: Fn(&ToolContext, TArgs) -> ToolOutcome + Send + Sync + 'static,
    {
        self.register(name, Some(description.into()), handler);
    }

    fn register<TArgs, F>(&mut self, name: &str, description: Option<String>, handler: F)
    where
        TArgs: DeserializeOwned + JsonSchema + 'static,
        F: Fn(&ToolContext, TArgs) -> ToolOutcome + Send + Sync + 'static,
    {
        let schema = schemars::schema_for!(TArgs);
        let name = name.to_string();
        self.defs.retain(|d| d.name != name);
        self.defs.push(ToolDefinition { name: name.clone(), description, schema });

        let handler = move |ctx: &ToolContext, value: Value| -> ToolOutcome {
            match serde_json::from_value::<TArgs>(value) {
                Ok(args) => handler(ctx, args),
                Err(e) => ToolOutcome::failed(format!("invalid arguments: {e}")),
            }
        };
        self.handlers.insert(name, Box::new(handler));
    }

    /// Convert all registered tools into protocol-level tool definitions.
    ///
    /// # Errors
    /// Returns an error if schema serialization fails.
    #[allow(clippy::result_large_err)]
    pub fn try_as_tools(&self) -> Result<Vec<Tool>> {
        let mut tools = Vec::with_capacity(self.defs.len());
        for def in &self.defs {
            let parameters = serde_json::to_value(&def.schema)?;
            tools.push(Tool::Function {
                name: def.name.clone(),
                description: def.description.clone(),
                parameters,
            });
        }
        Ok(tools)
    }

    /// Run one call. Never fails: problems are reported in the outcome.
    #[must_use]
    pub fn call(&self, ctx: &ToolContext, name: &str, arguments: &str) -> ToolOutcome {
        let Some(handler) = self.handlers.get(name) else {
            return ToolOutcome::failed(format!("unknown tool: {name}"));
        };
        let value = if arguments.trim().is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            match serde_json::from_str(arguments) {
                Ok(value) => value,
                Err(e) => return ToolOutcome::failed(format!("invalid arguments: {e}")),
            }
        };
        handler(ctx, value)
    }
}

fn with_navigation(ctx: &ToolContext, f: impl FnOnce(&dyn Navigation) -> ToolOutcome) -> ToolOutcome {
    ctx.navigation
        .as_deref()
        .map_or_else(|| ToolOutcome::failed("navigation unavailable"), f)
}

/// Answers remote function calls with local side effects.
pub struct ToolBridge {
    registry: ToolRegistry,
    navigation: RwLock<Option<Arc<dyn Navigation>>>,
}

impl ToolBridge {
    #[must_use]
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry,
            navigation: RwLock::new(None),
        }
    }

    #[must_use]
    pub const fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn register_navigation(&self, navigation: Arc<dyn Navigation>) {
        *self.navigation.write().unwrap_or_else(PoisonError::into_inner) = Some(navigation);
    }

    pub fn clear_navigation(&self) {
        *self.navigation.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    #[must_use]
    pub fn has_navigation(&self) -> bool {
        self.navigation.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    fn context(&self) -> ToolContext {
        ToolContext {
            navigation: self.navigation.read().unwrap_or_else(PoisonError::into_inner).clone(),
        }
    }

    /// Run one call, send its output, then resume generation.
    pub fn dispatch(&self, sink: &dyn EventSink, name: &str, call_id: &str, arguments: &str) {
        self.dispatch_batch(
            sink,
            &[PendingFunctionCall {
                name: name.to_string(),
                call_id: call_id.to_string(),
                arguments: arguments.to_string(),
            }],
        );
    }

    /// Answer every call of one response, then send a single `response.create`.
    pub fn dispatch_batch(&self, sink: &dyn EventSink, calls: &[PendingFunctionCall]) {
        if calls.is_empty() {
            return;
        }
        let ctx = self.context();
        for call in calls {
            let outcome = self.registry.call(&ctx, &call.name, &call.arguments);
            tracing::info!(tool = %call.name, call_id = %call.call_id, success = outcome.success, "Tool call handled");
            let output = serde_json::to_string(&outcome).unwrap_or_else(|_| {
                r#"{"success":false,"error":"unserializable result"}"#.to_string()
            });
            sink.send_event(&ClientEvent::item_create(Item::function_output(&call.call_id, output)));
        }
        sink.send_event(&ClientEvent::response_create());
    }
}

impl std::fmt::Debug for ToolBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolBridge")
            .field("registry", &self.registry)
            .field("navigation", &self.has_navigation())
            .finish()
    }
}
