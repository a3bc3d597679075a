// SPDX-License-Identifier: MIT

//! Generic list-query features shared by the collection endpoints.
//!
//! Translates `?difficulty=easy&price[lte]=1500&sort=-price&fields=name,price`
//! style query strings into a [`ListQuery`] the database layer applies as
//! Firestore filters, ordering, and offset pagination. Field projection is
//! applied to the serialized documents after the fetch.

use std::collections::HashMap;

use crate::error::{AppError, Result};

/// Keys that are pagination/shaping controls, never field filters.
const RESERVED_KEYS: [&str; 4] = ["page", "sort", "limit", "fields"];

pub const DEFAULT_LIMIT: u32 = 100;
pub const MAX_LIMIT: u32 = 100;

/// Comparison operators accepted in `field[op]=value` filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl FilterOp {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            _ => None,
        }
    }
}

/// A filter value, parsed from the query string.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Number(f64),
    Bool(bool),
    Text(String),
}

impl FilterValue {
    fn parse(raw: &str) -> Self {
        if let Ok(n) = raw.parse::<f64>() {
            return Self::Number(n);
        }
        match raw {
            "true" => Self::Bool(true),
            "false" => Self::Bool(false),
            _ => Self::Text(raw.to_string()),
        }
    }
}

/// One field comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub op: FilterOp,
    pub value: FilterValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

/// Parsed list query: filters, ordering, projection, pagination.
#[derive(Debug, Clone)]
pub struct ListQuery {
    pub filters: Vec<FieldFilter>,
    pub sort: Vec<(String, SortDir)>,
    pub fields: Option<Vec<String>>,
    pub page: u32,
    pub limit: u32,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            // Newest first, matching the original API's default ordering
            sort: vec![("created_at".to_string(), SortDir::Desc)],
            fields: None,
            page: 1,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl ListQuery {
    /// Parse the raw query-string map.
    pub fn parse(params: &HashMap<String, String>) -> Result<Self> {
        let mut query = ListQuery::default();

        if let Some(raw) = params.get("page") {
            query.page = raw
                .parse::<u32>()
                .ok()
                .filter(|p| *p >= 1)
                .ok_or_else(|| bad("'page' must be a positive integer"))?;
        }

        if let Some(raw) = params.get("limit") {
            let limit = raw
                .parse::<u32>()
                .ok()
                .filter(|l| *l >= 1)
                .ok_or_else(|| bad("'limit' must be a positive integer"))?;
            query.limit = limit.min(MAX_LIMIT);
        }

        if let Some(raw) = params.get("sort") {
            query.sort = raw
                .split(',')
                .filter(|s| !s.is_empty())
                .map(|field| {
                    let (name, dir) = match field.strip_prefix('-') {
                        Some(rest) => (rest, SortDir::Desc),
                        None => (field, SortDir::Asc),
                    };
                    valid_field_name(name)?;
                    Ok((name.to_string(), dir))
                })
                .collect::<Result<Vec<_>>>()?;
            if query.sort.is_empty() {
                return Err(bad("'sort' must name at least one field"));
            }
        }

        if let Some(raw) = params.get("fields") {
            let fields: Vec<String> = raw
                .split(',')
                .filter(|f| !f.is_empty())
                .map(|f| {
                    valid_field_name(f)?;
                    Ok(f.to_string())
                })
                .collect::<Result<Vec<_>>>()?;
            if fields.is_empty() {
                return Err(bad("'fields' must name at least one field"));
            }
            query.fields = Some(fields);
        }

        for (key, value) in params {
            if RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            query.filters.push(parse_filter(key, value)?);
        }

        Ok(query)
    }

    /// Documents to skip for the requested page.
    pub fn offset(&self) -> u32 {
        (self.page - 1).saturating_mul(self.limit)
    }

    /// Add a fixed filter (used for nested routes and alias presets).
    pub fn with_filter(mut self, field: &str, op: FilterOp, value: FilterValue) -> Self {
        self.filters.push(FieldFilter {
            field: field.to_string(),
            op,
            value,
        });
        self
    }
}

/// Parse one `field` or `field[op]` key into a filter.
fn parse_filter(key: &str, value: &str) -> Result<FieldFilter> {
    let (field, op) = match key.split_once('[') {
        Some((field, rest)) => {
            let op_name = rest
                .strip_suffix(']')
                .ok_or_else(|| bad(&format!("Malformed filter key '{}'", key)))?;
            let op = FilterOp::parse(op_name)
                .ok_or_else(|| bad(&format!("Unknown filter operator '{}'", op_name)))?;
            (field, op)
        }
        None => (key, FilterOp::Eq),
    };
    valid_field_name(field)?;

    Ok(FieldFilter {
        field: field.to_string(),
        op,
        value: FilterValue::parse(value),
    })
}

fn valid_field_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(bad(&format!("Invalid field name '{}'", name)))
    }
}

fn bad(msg: &str) -> AppError {
    AppError::BadRequest(msg.to_string())
}

/// Keep only the requested fields of a serialized document.
/// `id` always survives so list entries stay addressable.
pub fn project_fields(value: serde_json::Value, fields: &[String]) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let kept = map
                .into_iter()
                .filter(|(key, _)| key == "id" || fields.iter().any(|f| f == key))
                .collect();
            serde_json::Value::Object(kept)
        }
        other => other,
    }
}
