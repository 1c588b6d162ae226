// src/schema/types.rs

use anyhow::{anyhow, Result};
use std::{fmt, str::FromStr};

/// Column types accepted in a `name:TYPE` schema declaration.
#[derive(Debug, PartialEq, Clone, Copy, Eq, Hash)]
pub enum ColumnType {
    Date,
    Integer,
    Float,
    String,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Date => "DATE",
            ColumnType::Integer => "INTEGER",
            ColumnType::Float => "FLOAT",
            ColumnType::String => "STRING",
        }
    }

    /// Standard-SQL spelling used in BigQuery DDL and casts.
    pub fn bigquery_ddl_type(&self) -> &'static str {
        match self {
            ColumnType::Date => "DATE",
            ColumnType::Integer => "INT64",
            ColumnType::Float => "FLOAT64",
            ColumnType::String => "STRING",
        }
    }
}

impl FromStr for ColumnType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DATE" => Ok(ColumnType::Date),
            "INTEGER" | "INT64" => Ok(ColumnType::Integer),
            "FLOAT" | "FLOAT64" => Ok(ColumnType::Float),
            "STRING" => Ok(ColumnType::String),
            other => Err(anyhow!("unsupported column type `{}`", other)),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single column of the target table.
#[derive(Debug, PartialEq, Clone, Eq, Hash)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}
