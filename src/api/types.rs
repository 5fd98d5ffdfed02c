use serde::Serialize;

use super::*;
use crate::executor::panic_message;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandsListing {
    pub product_name: String,
    pub commands: Vec<CommandInfo>,
}

#[derive(Serialize)]
pub struct CommandInfo {
    pub path: String,
    pub category: String,
    pub description: String,
    pub parameters: Vec<ParameterInfo>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: &'static str,
    pub default_value: Option<String>,
    pub auto_complete_options: Option<Vec<String>>,
}

#[derive(Serialize)]
pub struct Heartbeat {
    #[serde(rename = "GameVariables")]
    pub game_variables: serde_json::Map<String, serde_json::Value>,
    #[serde(rename = "LogResults")]
    pub log_results: Vec<String>,
}

impl CommandsListing {
    pub fn from_registry(product_name: &str, registry: Option<&OperationRegistry>, log: &ServerLog) -> Self {
        let commands = registry
            .map(|r| r.list_all())
            .unwrap_or_default()
            .iter()
            .map(|op| CommandInfo {
                path: op.path.clone(),
                category: op.category.clone(),
                description: op.description.clone(),
                parameters: op
                    .params
                    .iter()
                    .map(|p| ParameterInfo {
                        name: p.name.clone(),
                        ty: p.ty.name(),
                        default_value: p.default.as_ref().map(ToString::to_string),
                        auto_complete_options: p.autocomplete.as_ref().and_then(|auto| {
                            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| auto.options()))
                                .map_err(|payload| {
                                    log.warn(format!(
                                        "Autocomplete for '{}' on {} failed: {}",
                                        p.name,
                                        op.path,
                                        panic_message(&*payload)
                                    ));
                                })
                                .ok()
                        }),
                    })
                    .collect(),
            })
            .collect();
        Self {
            product_name: product_name.to_string(),
            commands,
        }
    }
}

/// Current value of every variable; a failing accessor reads as null.
pub fn variable_values(
    registry: Option<&OperationRegistry>,
    log: &ServerLog,
) -> serde_json::Map<String, serde_json::Value> {
    let mut values = serde_json::Map::new();
    for var in registry.map(|r| r.variables()).unwrap_or_default() {
        let value = match var.read() {
            Some(v) => serde_json::Value::String(v),
            None => {
                log.warn(format!("Game variable '{}' failed to read", var.name));
                serde_json::Value::Null
            }
        };
        values.insert(var.name.clone(), value);
    }
    values
}
