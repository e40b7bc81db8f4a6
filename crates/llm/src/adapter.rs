//! Tool adaptation
//!
//! Converts application-defined tools into each provider's function-calling
//! representation. Pure and deterministic, no I/O. Unsupported parameter
//! types fail at bind time with a descriptive error so misconfiguration
//! surfaces before a call is live, never mid-conversation.

use std::collections::HashMap;

use jsonschema::JSONSchema;
use serde_json::Value;

use callflow_core::ToolDefinition;

use crate::LlmError;

/// Parameter types every supported provider can express
const SUPPORTED_TYPES: &[&str] = &["string", "number", "integer", "boolean", "array", "object"];

/// Builder for tool definitions with JSON Schema parameters
///
/// # Example
/// ```ignore
/// let tool = ToolBuilder::new("gather", "Collect caller input")
///     .param("timeout_ms", "integer", "Collection timeout in ms", false)
///     .build();
/// ```
#[derive(Debug, Clone, Default)]
pub struct ToolBuilder {
    name: String,
    description: String,
    properties: serde_json::Map<String, Value>,
    required: Vec<String>,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            properties: serde_json::Map::new(),
            required: Vec::new(),
        }
    }

    /// Add a parameter with type and description
    pub fn param(
        mut self,
        name: impl Into<String>,
        param_type: &str,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        let name = name.into();
        let mut prop = serde_json::Map::new();
        prop.insert("type".to_string(), Value::String(param_type.to_string()));
        prop.insert(
            "description".to_string(),
            Value::String(description.into()),
        );
        self.properties.insert(name.clone(), Value::Object(prop));
        if required {
            self.required.push(name);
        }
        self
    }

    /// Add enum constraint to an existing string parameter
    pub fn string_enum(mut self, name: &str, values: &[&str]) -> Self {
        if let Some(Value::Object(obj)) = self.properties.get_mut(name) {
            let enum_values: Vec<Value> =
                values.iter().map(|v| Value::String(v.to_string())).collect();
            obj.insert("enum".to_string(), Value::Array(enum_values));
        }
        self
    }

    pub fn build(self) -> ToolDefinition {
        let parameters = serde_json::json!({
            "type": "object",
            "properties": self.properties,
            "required": self.required,
        });
        ToolDefinition::new(self.name, self.description, parameters)
    }
}

/// Check a tool definition can be expressed to every supported provider.
///
/// Rejects non-object schemas, non-object properties, unsupported parameter
/// types and `required` entries with no matching property.
pub fn validate_bindable(tool: &ToolDefinition) -> Result<(), LlmError> {
    if tool.name.is_empty() {
        return Err(LlmError::Binding("tool name must not be empty".into()));
    }

    let schema = tool
        .parameters
        .as_object()
        .ok_or_else(|| binding_err(tool, "parameter schema must be a JSON object"))?;

    if schema.get("type").and_then(Value::as_str) != Some("object") {
        return Err(binding_err(tool, "parameter schema must have type \"object\""));
    }

    let properties = match schema.get("properties") {
        None => return Ok(()),
        Some(Value::Object(props)) => props,
        Some(_) => return Err(binding_err(tool, "\"properties\" must be an object")),
    };

    for (param, prop) in properties {
        let prop = prop
            .as_object()
            .ok_or_else(|| binding_err(tool, &format!("parameter {:?} must be an object", param)))?;
        match prop.get("type").and_then(Value::as_str) {
            Some(t) if SUPPORTED_TYPES.contains(&t) => {}
            Some(t) => {
                return Err(binding_err(
                    tool,
                    &format!("parameter {:?} has unsupported type {:?}", param, t),
                ))
            }
            None => {
                return Err(binding_err(
                    tool,
                    &format!("parameter {:?} is missing a type", param),
                ))
            }
        }
    }

    if let Some(required) = schema.get("required") {
        let required = required
            .as_array()
            .ok_or_else(|| binding_err(tool, "\"required\" must be an array"))?;
        for entry in required {
            let name = entry
                .as_str()
                .ok_or_else(|| binding_err(tool, "\"required\" entries must be strings"))?;
            if !properties.contains_key(name) {
                return Err(binding_err(
                    tool,
                    &format!("required parameter {:?} has no property definition", name),
                ));
            }
        }
    }

    Ok(())
}

fn binding_err(tool: &ToolDefinition, message: &str) -> LlmError {
    LlmError::Binding(format!("tool {:?}: {}", tool.name, message))
}

/// OpenAI-style function-calling representation (used by Groq and other
/// OpenAI-compatible providers)
pub fn to_openai_tool(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

/// Anthropic-style tool representation (native tool_use blocks)
pub fn to_anthropic_tool(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "name": tool.name,
        "description": tool.description,
        "input_schema": tool.parameters,
    })
}

/// A session's tool set, bind-time validated, with compiled argument
/// validators. Resolving a tool call by name yields the original tool's
/// parameter schema for argument validation.
pub struct BoundToolset {
    tools: Vec<ToolDefinition>,
    validators: HashMap<String, JSONSchema>,
}

impl BoundToolset {
    /// Validate and bind a tool set. Duplicate names and inexpressible
    /// schemas are rejected here, not at call time.
    pub fn new(tools: Vec<ToolDefinition>) -> Result<Self, LlmError> {
        let mut validators = HashMap::with_capacity(tools.len());

        for tool in &tools {
            validate_bindable(tool)?;
            if validators.contains_key(&tool.name) {
                return Err(LlmError::Binding(format!(
                    "duplicate tool name {:?}",
                    tool.name
                )));
            }
            let compiled = JSONSchema::compile(&tool.parameters)
                .map_err(|e| binding_err(tool, &format!("schema does not compile: {}", e)))?;
            validators.insert(tool.name.clone(), compiled);
        }

        Ok(Self { tools, validators })
    }

    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.tools
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Validate model-produced arguments against the named tool's schema
    pub fn validate_arguments(&self, name: &str, arguments: &Value) -> Result<(), LlmError> {
        let validator = self
            .validators
            .get(name)
            .ok_or_else(|| LlmError::InvalidArguments {
                tool: name.to_string(),
                message: "unknown tool".to_string(),
            })?;

        if let Err(errors) = validator.validate(arguments) {
            let message = errors
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(LlmError::InvalidArguments {
                tool: name.to_string(),
                message,
            });
        }
        Ok(())
    }
}
