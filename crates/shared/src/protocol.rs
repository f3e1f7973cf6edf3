use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    #[default]
    Template,
    Json,
}

impl RenderMode {
    pub fn from_json_flag(json_view: bool) -> Self {
        if json_view {
            RenderMode::Json
        } else {
            RenderMode::Template
        }
    }
}

/// Named variables handed to the view layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewModel {
    pub template: String,
    pub mode: RenderMode,
    pub variables: Map<String, Value>,
}

impl ViewModel {
    pub fn new(mode: RenderMode, template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            mode,
            variables: Map::new(),
        }
    }

    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.variables.insert(name.to_string(), value.into());
        self
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Body sent to the client: bare variables in json mode, the variables
    /// wrapped with their template name otherwise.
    pub fn into_body(self) -> Value {
        match self.mode {
            RenderMode::Json => Value::Object(self.variables),
            RenderMode::Template => serde_json::json!({
                "template": self.template,
                "variables": Value::Object(self.variables),
            }),
        }
    }
}

/// Redirect directive expressed as a named route plus route parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redirect {
    pub route: String,
    pub params: BTreeMap<String, String>,
}

impl Redirect {
    pub fn to_route(route: impl Into<String>) -> Self {
        Self {
            route: route.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn action(&self) -> Option<&str> {
        self.params.get("action").map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_mode_exposes_bare_variables() {
        let view = ViewModel::new(RenderMode::Json, "widget/edit").with("title", "Edit widget");
        assert_eq!(view.into_body(), serde_json::json!({ "title": "Edit widget" }));
    }

    #[test]
    fn template_mode_keeps_template_name() {
        let view = ViewModel::new(RenderMode::Template, "widget/index").with("route", "crud");
        let body = view.into_body();
        assert_eq!(body["template"], "widget/index");
        assert_eq!(body["variables"]["route"], "crud");
    }
}
