//! List-query builder serialized in the backend's JSON query syntax.

use std::fmt;

use serde_json::{Value, json};

#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Equal { attribute: String, values: Vec<Value> },
    /// Array attribute containing the value.
    Contains { attribute: String, value: Value },
    /// Full-text search on an indexed attribute.
    Search { attribute: String, term: String },
    OrderAsc(String),
    OrderDesc(String),
    Limit(u32),
    Offset(u32),
    CursorAfter(String),
}

impl Query {
    pub fn equal(attribute: &str, value: impl Into<Value>) -> Self {
        Self::Equal {
            attribute: attribute.to_string(),
            values: vec![value.into()],
        }
    }

    pub fn contains(attribute: &str, value: impl Into<Value>) -> Self {
        Self::Contains {
            attribute: attribute.to_string(),
            value: value.into(),
        }
    }

    pub fn search(attribute: &str, term: &str) -> Self {
        Self::Search {
            attribute: attribute.to_string(),
            term: term.to_string(),
        }
    }

    pub fn order_asc(attribute: &str) -> Self {
        Self::OrderAsc(attribute.to_string())
    }

    pub fn order_desc(attribute: &str) -> Self {
        Self::OrderDesc(attribute.to_string())
    }

    pub fn limit(limit: u32) -> Self {
        Self::Limit(limit)
    }

    pub fn offset(offset: u32) -> Self {
        Self::Offset(offset)
    }

    pub fn cursor_after(id: &str) -> Self {
        Self::CursorAfter(id.to_string())
    }

    fn to_json(&self) -> Value {
        match self {
            Query::Equal { attribute, values } => {
                json!({ "method": "equal", "attribute": attribute, "values": values })
            }
            Query::Contains { attribute, value } => {
                json!({ "method": "contains", "attribute": attribute, "values": [value] })
            }
            Query::Search { attribute, term } => {
                json!({ "method": "search", "attribute": attribute, "values": [term] })
            }
            Query::OrderAsc(attribute) => json!({ "method": "orderAsc", "attribute": attribute }),
            Query::OrderDesc(attribute) => {
                json!({ "method": "orderDesc", "attribute": attribute })
            }
            Query::Limit(limit) => json!({ "method": "limit", "values": [limit] }),
            Query::Offset(offset) => json!({ "method": "offset", "values": [offset] }),
            Query::CursorAfter(id) => json!({ "method": "cursorAfter", "values": [id] }),
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}
