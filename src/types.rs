// src/types.rs

use std::fmt;

use serde::Deserialize;

/// Declared type of a release config variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarType {
    Bool,
    String,
    Int,
    /// A list of strings.
    List,
    /// A string restricted to the variable's declared `values`.
    Enum,
}

impl Default for VarType {
    fn default() -> Self {
        VarType::String
    }
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VarType::Bool => "bool",
            VarType::String => "string",
            VarType::Int => "int",
            VarType::List => "list",
            VarType::Enum => "enum",
        };
        f.write_str(s)
    }
}

/// A resolved (or literal) release config value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    Str(String),
    Int(i64),
    List(Vec<String>),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Whether this value can be stored in a variable of type `ty`.
    pub fn fits(&self, ty: VarType) -> bool {
        matches!(
            (self, ty),
            (Value::Bool(_), VarType::Bool)
                | (Value::Str(_), VarType::String)
                | (Value::Str(_), VarType::Enum)
                | (Value::Int(_), VarType::Int)
                | (Value::List(_), VarType::List)
        )
    }

    /// Parse a command-line override (`--set name=value`) for type `ty`.
    ///
    /// Lists are comma-separated; an empty string is the empty list.
    pub fn parse_as(ty: VarType, raw: &str) -> Result<Value, String> {
        match ty {
            VarType::Bool => match raw.trim() {
                "true" | "yes" | "1" => Ok(Value::Bool(true)),
                "false" | "no" | "0" => Ok(Value::Bool(false)),
                other => Err(format!("expected a boolean, got '{other}'")),
            },
            VarType::Int => raw
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|e| format!("expected an integer, got '{raw}': {e}")),
            VarType::String | VarType::Enum => Ok(Value::Str(raw.to_string())),
            VarType::List => {
                if raw.is_empty() {
                    Ok(Value::List(Vec::new()))
                } else {
                    Ok(Value::List(raw.split(',').map(str::to_string).collect()))
                }
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Str(s) => f.write_str(s),
            Value::Int(i) => write!(f, "{i}"),
            Value::List(items) => f.write_str(&items.join(" ")),
        }
    }
}
