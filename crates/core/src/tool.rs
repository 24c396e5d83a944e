//! Tool descriptors and the function-calling schema they render to.
//!
//! A `Tool` describes one callable capability: a name, a description, and a
//! set of string-typed parameters. `function()` renders the shape the model
//! backend expects. When a tool declares zero parameters the `parameters` key
//! is omitted entirely — the backend treats a missing key and an empty object
//! differently, so the distinction is carried by `Option`, never collapsed.

use serde::{Deserialize, Serialize};

/// A named, schema-described capability an agent can ask the backend to select.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    /// Tool name, also the action name produced when selected
    pub name: String,

    /// What the tool does (sent to the model)
    pub description: String,

    /// Declared parameters, in declaration order. All string-typed.
    #[serde(default)]
    properties: Vec<ToolProperty>,

    /// Whether the raw user input should be injected as this tool's
    /// `userInput` argument when the model omits it
    #[serde(default)]
    pub user_input_as_argument: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ToolProperty {
    name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    enum_values: Option<Vec<String>>,
}

impl Tool {
    /// Create a tool with the given string-typed parameters.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        string_parameters: &[&str],
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            properties: string_parameters
                .iter()
                .map(|p| ToolProperty {
                    name: p.to_string(),
                    enum_values: None,
                })
                .collect(),
            user_input_as_argument: false,
        }
    }

    /// Mark the raw user input as an implicit argument of this tool.
    pub fn with_user_input_as_argument(mut self) -> Self {
        self.user_input_as_argument = true;
        self
    }

    /// Constrain a declared parameter to an enumerated set of values.
    ///
    /// Returns `false` when no parameter with that name was declared.
    pub fn set_enum_parameter(&mut self, name: &str, values: Vec<String>) -> bool {
        match self.properties.iter_mut().find(|p| p.name == name) {
            Some(property) => {
                property.enum_values = Some(values);
                true
            }
            None => false,
        }
    }

    /// Declared parameter names, in declaration order.
    pub fn parameter_names(&self) -> Vec<&str> {
        self.properties.iter().map(|p| p.name.as_str()).collect()
    }

    /// Render this tool to the function-calling schema shape.
    pub fn function(&self) -> FunctionDeclaration {
        let parameters = if self.properties.is_empty() {
            // Omitted, not empty — the backend distinguishes the two
            None
        } else {
            let mut properties = serde_json::Map::new();
            for property in &self.properties {
                let mut schema = serde_json::Map::new();
                schema.insert("type".into(), serde_json::json!("string"));
                if let Some(values) = &property.enum_values {
                    schema.insert("enum".into(), serde_json::json!(values));
                }
                properties.insert(property.name.clone(), serde_json::Value::Object(schema));
            }
            Some(ParametersSchema {
                schema_type: "object".into(),
                properties,
            })
        };

        FunctionDeclaration {
            declaration_type: "function".into(),
            function: FunctionSpec {
                name: self.name.clone(),
                description: self.description.clone(),
                parameters,
            },
        }
    }
}

/// The `{type:"function", function:{…}}` wrapper the backend consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    #[serde(rename = "type")]
    pub declaration_type: String,

    pub function: FunctionSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,

    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<ParametersSchema>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParametersSchema {
    #[serde(rename = "type")]
    pub schema_type: String,

    pub properties: serde_json::Map<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_parameters_omits_parameters_key() {
        let tool = Tool::new("summary", "Summarize the current page", &[]);
        let json = serde_json::to_value(tool.function()).unwrap();

        assert_eq!(json["type"], "function");
        assert_eq!(json["function"]["name"], "summary");
        assert!(
            json["function"].as_object().unwrap().get("parameters").is_none(),
            "parameters must be omitted entirely, not empty: {json}"
        );
    }

    #[test]
    fn declared_parameters_render_as_string_properties() {
        let tool = Tool::new("search", "Search the web", &["query", "site"]);
        let json = serde_json::to_value(tool.function()).unwrap();

        let properties = json["function"]["parameters"]["properties"]
            .as_object()
            .unwrap();
        assert_eq!(properties.len(), 2);
        assert_eq!(properties["query"]["type"], "string");
        assert_eq!(properties["site"]["type"], "string");
        assert_eq!(json["function"]["parameters"]["type"], "object");
    }

    #[test]
    fn enum_parameter_renders_values() {
        let mut tool = Tool::new("translate", "Translate text", &["language"]);
        assert!(tool.set_enum_parameter(
            "language",
            vec!["english".into(), "chinese".into()]
        ));
        let json = serde_json::to_value(tool.function()).unwrap();
        let lang = &json["function"]["parameters"]["properties"]["language"];
        assert_eq!(lang["enum"][0], "english");
        assert_eq!(lang["enum"][1], "chinese");
    }

    #[test]
    fn enum_on_undeclared_parameter_is_rejected() {
        let mut tool = Tool::new("search", "Search the web", &["query"]);
        assert!(!tool.set_enum_parameter("missing", vec!["a".into()]));
    }

    #[test]
    fn user_input_flag() {
        let tool = Tool::new("tasking", "Break a goal into tasks", &[]).with_user_input_as_argument();
        assert!(tool.user_input_as_argument);
    }
}
