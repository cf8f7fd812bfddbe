//! Match predicate shared by the count and the search request.
//!
//! A [`Predicate`] is built once per request and handed to both store calls,
//! so the reported total and the returned page always describe the same
//! result set.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MatchOperator {
    And,
    Or,
}

impl MatchOperator {
    fn as_str(self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldBoost {
    pub field: String,
    pub boost: Option<f32>,
}

impl FieldBoost {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            boost: None,
        }
    }

    pub fn boosted(field: impl Into<String>, boost: f32) -> Self {
        Self {
            field: field.into(),
            boost: Some(boost),
        }
    }

    fn render(&self) -> String {
        match self.boost {
            Some(boost) => format!("{}^{}", self.field, boost),
            None => self.field.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchSettings {
    pub fields: Vec<FieldBoost>,
    pub operator: MatchOperator,
    pub minimum_should_match: Option<String>,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            fields: vec![FieldBoost::boosted("title", 2.0), FieldBoost::new("content")],
            operator: MatchOperator::Or,
            minimum_should_match: Some("75%".to_string()),
        }
    }
}

impl MatchSettings {
    /// Field names without boosts, in configured order.
    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|field| field.field.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    query: Value,
}

impl Predicate {
    pub fn build(text: &str, settings: &MatchSettings) -> Self {
        let fields = settings
            .fields
            .iter()
            .map(FieldBoost::render)
            .collect::<Vec<_>>();

        let mut multi_match = json!({
            "query": text,
            "type": "best_fields",
            "fields": fields,
            "operator": settings.operator.as_str(),
        });

        if let Some(minimum) = &settings.minimum_should_match {
            multi_match["minimum_should_match"] = json!(minimum);
        }

        Self {
            query: json!({ "multi_match": multi_match }),
        }
    }

    /// The `query` clause sent to the store.
    pub fn query(&self) -> &Value {
        &self.query
    }
}
