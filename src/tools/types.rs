//! Tool definition and parameter types
//!
//! Parameters are carried as a tagged value type so that schema checks are
//! structural: a declared `boolean` only ever matches `ParamValue::Boolean`.

use crate::errors::{Result, SandboxError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Category for tools that touch the filesystem
pub const FILESYSTEM_CATEGORY: &str = "filesystem";

/// Capability string for filesystem reads
pub const PERMISSION_FS_READ: &str = "fs:read";

/// Capability string for filesystem writes
pub const PERMISSION_FS_WRITE: &str = "fs:write";

/// Name of the path-bearing parameter of filesystem tools
pub const PATH_PARAMETER: &str = "path";

/// Declared type of a tool parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParameterType::String => "string",
            ParameterType::Number => "number",
            ParameterType::Boolean => "boolean",
            ParameterType::Array => "array",
            ParameterType::Object => "object",
        };
        write!(f, "{}", name)
    }
}

/// Runtime value of a tool parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Boolean(bool),
    Number(f64),
    String(String),
    Array(Vec<ParamValue>),
    Object(BTreeMap<String, ParamValue>),
}

/// Named parameter bag passed to tools
pub type ToolParams = BTreeMap<String, ParamValue>;

impl ParamValue {
    /// Type tag of this value
    pub fn param_type(&self) -> ParameterType {
        match self {
            ParamValue::Boolean(_) => ParameterType::Boolean,
            ParamValue::Number(_) => ParameterType::Number,
            ParamValue::String(_) => ParameterType::String,
            ParamValue::Array(_) => ParameterType::Array,
            ParamValue::Object(_) => ParameterType::Object,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Convert a JSON value; `null` has no counterpart and maps to `None`.
    ///
    /// Nulls nested inside arrays and objects are dropped.
    pub fn from_json(value: serde_json::Value) -> Option<Self> {
        use serde_json::Value;

        match value {
            Value::Null => None,
            Value::Bool(b) => Some(ParamValue::Boolean(b)),
            Value::Number(n) => n.as_f64().map(ParamValue::Number),
            Value::String(s) => Some(ParamValue::String(s)),
            Value::Array(items) => Some(ParamValue::Array(
                items.into_iter().filter_map(ParamValue::from_json).collect(),
            )),
            Value::Object(map) => Some(ParamValue::Object(
                map.into_iter()
                    .filter_map(|(k, v)| ParamValue::from_json(v).map(|v| (k, v)))
                    .collect(),
            )),
        }
    }

    /// Convert back to JSON
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;

        match self {
            ParamValue::Boolean(b) => Value::Bool(*b),
            ParamValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ParamValue::String(s) => Value::String(s.clone()),
            ParamValue::Array(items) => Value::Array(items.iter().map(|v| v.to_json()).collect()),
            ParamValue::Object(map) => Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::String(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::String(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Boolean(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Number(value)
    }
}

/// Convert a JSON object into a parameter bag, dropping `null` members
pub fn params_from_json(value: serde_json::Value) -> Result<ToolParams> {
    match value {
        serde_json::Value::Object(map) => Ok(map
            .into_iter()
            .filter_map(|(k, v)| ParamValue::from_json(v).map(|v| (k, v)))
            .collect()),
        other => Err(SandboxError::Validation(format!(
            "Tool input must be a JSON object, got: {}",
            other
        ))),
    }
}

/// Render a parameter bag as a JSON object
pub fn params_to_json(params: &ToolParams) -> serde_json::Value {
    serde_json::Value::Object(
        params
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

/// Parameter declaration within a tool definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameter {
    /// Parameter name (unique within a tool)
    pub name: String,

    /// Declared type
    #[serde(rename = "type")]
    pub param_type: ParameterType,

    /// Human-readable description
    pub description: String,

    /// Whether the parameter must be supplied
    pub required: bool,

    /// Value used when an optional parameter is absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ParamValue>,
}

impl ToolParameter {
    /// Create a required parameter
    pub fn required(
        name: impl Into<String>,
        param_type: ParameterType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: description.into(),
            required: true,
            default: None,
        }
    }

    /// Create an optional parameter
    pub fn optional(
        name: impl Into<String>,
        param_type: ParameterType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }

    /// Set default value
    pub fn with_default(mut self, default: impl Into<ParamValue>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// `path` or `*_path`: confined before a filesystem tool runs
    pub fn is_path_bearing(&self) -> bool {
        self.name == PATH_PARAMETER || self.name.ends_with("_path")
    }
}

/// Schema of an invocable tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool id
    pub id: String,

    /// Display name
    pub name: String,

    /// Tool description
    pub description: String,

    /// Definition version
    pub version: String,

    /// Tool category (e.g. "filesystem")
    pub category: String,

    /// Ordered parameter schema
    #[serde(default)]
    pub parameters: Vec<ToolParameter>,

    /// Capabilities the tool requires (e.g. "fs:read")
    #[serde(default)]
    pub permissions: BTreeSet<String>,

    /// Example invocations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
}

impl ToolDefinition {
    /// Create new tool definition in the "general" category
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            version: "1.0.0".to_string(),
            category: "general".to_string(),
            parameters: Vec::new(),
            permissions: BTreeSet::new(),
            examples: Vec::new(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_parameter(mut self, parameter: ToolParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }

    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        self.examples.push(example.into());
        self
    }

    /// Parameters carrying filesystem paths
    pub fn path_parameters(&self) -> impl Iterator<Item = &ToolParameter> {
        self.parameters.iter().filter(|p| p.is_path_bearing())
    }

    /// First required string parameter; raw string input binds to it
    pub fn primary_parameter(&self) -> Option<&ToolParameter> {
        self.parameters
            .iter()
            .find(|p| p.required && p.param_type == ParameterType::String)
    }

    /// Whether the tool reaches the filesystem and therefore needs path confinement
    pub fn is_filesystem_affecting(&self) -> bool {
        self.category == FILESYSTEM_CATEGORY
            || self.permissions.iter().any(|p| p.starts_with("fs:"))
    }

    pub fn requires_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}

/// Input accepted by the executor: a raw string, structured parameters, or
/// an unchecked JSON value
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInput {
    Raw(String),
    Params(ToolParams),
    Json(serde_json::Value),
}

impl ToolInput {
    /// Resolve the input into a parameter bag for `definition`.
    ///
    /// A raw string shaped like a JSON object (`{...}`) must parse as one and
    /// becomes the parameters; any other raw string binds to the tool's
    /// primary parameter. JSON values other than objects are rejected.
    pub fn into_params(self, definition: &ToolDefinition) -> Result<ToolParams> {
        match self {
            ToolInput::Params(params) => Ok(params),
            ToolInput::Json(value) => params_from_json(value),
            ToolInput::Raw(raw) => {
                let trimmed = raw.trim();
                if trimmed.starts_with('{') && trimmed.ends_with('}') {
                    let value: serde_json::Value = serde_json::from_str(trimmed)?;
                    return params_from_json(value);
                }

                let primary = definition.primary_parameter().ok_or_else(|| {
                    SandboxError::Validation(format!(
                        "Tool '{}' takes no primary string parameter; pass structured parameters",
                        definition.id
                    ))
                })?;

                let mut params = ToolParams::new();
                params.insert(primary.name.clone(), ParamValue::String(raw));
                Ok(params)
            }
        }
    }

    /// Rendering stored in audit records
    pub fn render(&self) -> String {
        match self {
            ToolInput::Raw(raw) => raw.clone(),
            ToolInput::Params(params) => params_to_json(params).to_string(),
            ToolInput::Json(value) => value.to_string(),
        }
    }
}

impl From<&str> for ToolInput {
    fn from(value: &str) -> Self {
        ToolInput::Raw(value.to_string())
    }
}

impl From<String> for ToolInput {
    fn from(value: String) -> Self {
        ToolInput::Raw(value)
    }
}

impl From<ToolParams> for ToolInput {
    fn from(value: ToolParams) -> Self {
        ToolInput::Params(value)
    }
}

impl From<serde_json::Value> for ToolInput {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => ToolInput::Raw(s),
            other => ToolInput::Json(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn read_definition() -> ToolDefinition {
        ToolDefinition::new("file-read", "Read File", "Read a file")
            .with_category(FILESYSTEM_CATEGORY)
            .with_permission(PERMISSION_FS_READ)
            .with_parameter(ToolParameter::required(
                "path",
                ParameterType::String,
                "File to read",
            ))
    }

    #[test]
    fn test_param_value_types() {
        assert_eq!(ParamValue::from("x").param_type(), ParameterType::String);
        assert_eq!(ParamValue::from(true).param_type(), ParameterType::Boolean);
        assert_eq!(ParamValue::from(1.5).param_type(), ParameterType::Number);
        assert_eq!(
            ParamValue::Array(vec![]).param_type(),
            ParameterType::Array
        );
    }

    #[test]
    fn test_from_json_drops_null() {
        assert!(ParamValue::from_json(json!(null)).is_none());

        let params = params_from_json(json!({"path": "/tmp/a", "skip": null, "n": 3})).unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params["path"].as_str(), Some("/tmp/a"));
        assert_eq!(params["n"].as_f64(), Some(3.0));
    }

    #[test]
    fn test_params_from_non_object() {
        let result = params_from_json(json!([1, 2]));
        assert!(matches!(result, Err(SandboxError::Validation(_))));
    }

    #[test]
    fn test_untagged_deserialization() {
        let value: ParamValue = serde_json::from_value(json!({"a": [true, "x"]})).unwrap();
        assert_eq!(value.param_type(), ParameterType::Object);
        assert_eq!(value.to_json(), json!({"a": [true, "x"]}));
    }

    #[test]
    fn test_raw_input_binds_primary_parameter() {
        let params = ToolInput::from("/tmp/file.txt")
            .into_params(&read_definition())
            .unwrap();
        assert_eq!(params["path"].as_str(), Some("/tmp/file.txt"));
    }

    #[test]
    fn test_raw_json_input_parsed_as_params() {
        let params = ToolInput::from(r#"{"path": "/tmp/x", "recursive": true}"#)
            .into_params(&read_definition())
            .unwrap();
        assert_eq!(params["recursive"].as_bool(), Some(true));
    }

    #[test]
    fn test_raw_input_without_primary_parameter() {
        let definition = ToolDefinition::new("noop", "Noop", "Does nothing");
        let result = ToolInput::from("anything").into_params(&definition);
        assert!(matches!(result, Err(SandboxError::Validation(_))));
    }

    #[test]
    fn test_json_scalar_input_rejected() {
        for value in [json!(42), json!(true), json!(["/etc/passwd"]), json!(null)] {
            let result = ToolInput::from(value).into_params(&read_definition());
            assert!(
                matches!(result, Err(SandboxError::Validation(_))),
                "accepted {:?}",
                result
            );
        }

        let params = ToolInput::from(json!("/tmp/x"))
            .into_params(&read_definition())
            .unwrap();
        assert_eq!(params["path"].as_str(), Some("/tmp/x"));
    }

    #[test]
    fn test_malformed_json_object_input_rejected() {
        let result = ToolInput::from(r#"{"path": "/tmp/x""#).into_params(&read_definition());
        assert!(matches!(result, Ok(_)), "unterminated object is a plain path");

        let result = ToolInput::from(r#"{"path": /tmp/x}"#).into_params(&read_definition());
        assert!(matches!(result, Err(SandboxError::Serialization(_))));
    }

    #[test]
    fn test_path_parameters() {
        let definition = read_definition()
            .with_parameter(ToolParameter::required("dest_path", ParameterType::String, "Copy target"))
            .with_parameter(ToolParameter::optional("pathology", ParameterType::String, "Not a path"));

        let names: Vec<&str> = definition.path_parameters().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["path", "dest_path"]);
    }

    #[test]
    fn test_filesystem_classification() {
        assert!(read_definition().is_filesystem_affecting());

        let by_permission = ToolDefinition::new("t", "T", "t").with_permission(PERMISSION_FS_WRITE);
        assert!(by_permission.is_filesystem_affecting());

        let plain = ToolDefinition::new("echo", "Echo", "Echo input").with_permission("net:fetch");
        assert!(!plain.is_filesystem_affecting());
    }

    #[test]
    fn test_definition_serialization() {
        let json = serde_json::to_value(read_definition()).unwrap();
        assert_eq!(json["parameters"][0]["type"], "string");
        assert_eq!(json["permissions"][0], "fs:read");

        let back: ToolDefinition = serde_json::from_value(json).unwrap();
        assert_eq!(back, read_definition());
    }
}
