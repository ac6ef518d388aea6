//! Tables and views

use serde_json::Value;

use super::{Lifecycle, Mutability, alter_statements, delta, object_ref, property_clause};
use crate::error::{Error, Result};
use crate::identity::{ResourceType, Urn, normalize_identifier};
use crate::types::{Action, Properties};

fn unrenderable(urn: &Urn, action: Action) -> Error {
    Error::Execution {
        urn: urn.clone(),
        message: format!("cannot render {action} without properties"),
    }
}

fn is_true(properties: &Properties, key: &str) -> bool {
    properties.get(key) == Some(&Value::Bool(true))
}

fn query(properties: &Properties) -> Option<&str> {
    properties.get("as_").and_then(Value::as_str)
}

/// One column definition, from `{"name", "data_type", "not_null"}` or a raw string
fn column_sql(urn: &Urn, column: &Value) -> Result<String> {
    match column {
        Value::String(raw) => Ok(raw.clone()),
        Value::Object(def) => {
            let name = def
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::invalid(urn.to_string(), "column without a name"))?;
            let data_type = def
                .get("data_type")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::invalid(urn.to_string(), format!("column {name} has no data_type")))?;
            let mut sql = format!("{} {}", normalize_identifier(name), data_type.to_ascii_uppercase());
            if def.get("not_null") == Some(&Value::Bool(true)) {
                sql.push_str(" NOT NULL");
            }
            Ok(sql)
        }
        other => Err(Error::invalid(urn.to_string(), format!("bad column definition {other}"))),
    }
}

/// Tables, created from a column list or a query
pub struct TableLifecycle;

impl TableLifecycle {
    const STRUCTURAL: &'static [&'static str] = &["columns", "as_", "transient"];

    fn create(urn: &Urn, after: &Properties) -> Result<String> {
        let kind = if is_true(after, "transient") {
            "TRANSIENT "
        } else {
            ""
        };
        let options = property_clause(after, Self::STRUCTURAL);
        if let Some(query) = query(after) {
            return Ok(format!("CREATE {kind}{}{options} AS {query}", object_ref(urn)));
        }
        let columns = after
            .get("columns")
            .and_then(Value::as_array)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::invalid(urn.to_string(), "a table needs columns or as_"))?;
        let columns = columns
            .iter()
            .map(|c| column_sql(urn, c))
            .collect::<Result<Vec<_>>>()?;
        Ok(format!(
            "CREATE {kind}{} ({}){options}",
            object_ref(urn),
            columns.join(", ")
        ))
    }
}

impl Lifecycle for TableLifecycle {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Table
    }

    fn render(
        &self,
        urn: &Urn,
        action: Action,
        before: Option<&Properties>,
        after: Option<&Properties>,
    ) -> Result<Vec<String>> {
        match (action, after) {
            (Action::Add, Some(after)) => Ok(vec![Self::create(urn, after)?]),
            (Action::Change, Some(after)) => Ok(alter_statements(&object_ref(urn), &delta(before, after))),
            (Action::Remove, _) => Ok(vec![format!("DROP {}", object_ref(urn))]),
            _ => Err(unrenderable(urn, action)),
        }
    }

    fn field_mutability(&self, field: &str) -> Mutability {
        if Self::STRUCTURAL.contains(&field) {
            Mutability::ForbidsReplace
        } else {
            Mutability::Mutable
        }
    }

    fn needs_warehouse(&self, properties: &Properties) -> bool {
        query(properties).is_some()
    }
}

/// Views; the defining query cannot be altered, so a new query replaces the view
pub struct ViewLifecycle;

impl Lifecycle for ViewLifecycle {
    fn resource_type(&self) -> ResourceType {
        ResourceType::View
    }

    fn render(
        &self,
        urn: &Urn,
        action: Action,
        before: Option<&Properties>,
        after: Option<&Properties>,
    ) -> Result<Vec<String>> {
        match (action, after) {
            (Action::Add, Some(after)) => {
                let query = query(after)
                    .ok_or_else(|| Error::invalid(urn.to_string(), "a view needs as_"))?;
                let secure = if is_true(after, "secure") { "SECURE " } else { "" };
                Ok(vec![format!(
                    "CREATE {secure}{}{} AS {query}",
                    object_ref(urn),
                    property_clause(after, &["as_", "secure"])
                )])
            }
            (Action::Change, Some(after)) => {
                let target = object_ref(urn);
                let mut statements = Vec::new();
                let mut rest = Vec::new();
                for (key, value) in delta(before, after) {
                    if key == "secure" {
                        let verb = if value == &Value::Bool(true) { "SET" } else { "UNSET" };
                        statements.push(format!("ALTER {target} {verb} SECURE"));
                    } else {
                        rest.push((key, value));
                    }
                }
                statements.extend(alter_statements(&target, &rest));
                Ok(statements)
            }
            (Action::Remove, _) => Ok(vec![format!("DROP {}", object_ref(urn))]),
            _ => Err(unrenderable(urn, action)),
        }
    }

    fn field_mutability(&self, field: &str) -> Mutability {
        match field {
            "as_" | "columns" => Mutability::Immutable,
            _ => Mutability::Mutable,
        }
    }

    fn needs_schema_context(&self) -> bool {
        true
    }
}
