/// Collection queries: filters, ordering and limits
use serde_json::Value;
use std::cmp::Ordering;

use crate::document::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field equals value
    Equal(String, Value),
    /// Array field contains value
    ArrayContains(String, Value),
}

impl Filter {
    fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::Equal(field, expected) => doc.get(field) == Some(expected),
            Filter::ArrayContains(field, expected) => match doc.get(field) {
                Some(Value::Array(items)) => items.contains(expected),
                _ => false,
            },
        }
    }
}

/// Query over a single collection
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    collection: String,
    filters: Vec<Filter>,
    order_by: Option<(String, Direction)>,
    limit: Option<usize>,
}

impl Query {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Equal(field.into(), value.into()));
        self
    }

    pub fn where_array_contains(
        mut self,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.filters
            .push(Filter::ArrayContains(field.into(), value.into()));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Whether a document belongs to the result set, ignoring the limit.
    ///
    /// Documents without the order-by field never match an ordered query.
    pub fn matches(&self, doc: &Document) -> bool {
        if doc.collection != self.collection {
            return false;
        }
        if let Some((field, _)) = &self.order_by {
            if doc.get(field).is_none() {
                return false;
            }
        }
        self.filters.iter().all(|f| f.matches(doc))
    }

    /// Evaluate against a set of candidate documents.
    ///
    /// Ties on the order-by field (and unordered queries) fall back to the
    /// document id so results are deterministic.
    pub fn execute<'a>(&self, docs: impl IntoIterator<Item = &'a Document>) -> Vec<Document> {
        let mut results: Vec<Document> = docs
            .into_iter()
            .filter(|doc| self.matches(doc))
            .cloned()
            .collect();

        results.sort_by(|a, b| {
            let primary = match &self.order_by {
                Some((field, direction)) => {
                    let ord = compare_values(
                        a.get(field).unwrap_or(&Value::Null),
                        b.get(field).unwrap_or(&Value::Null),
                    );
                    match direction {
                        Direction::Ascending => ord,
                        Direction::Descending => ord.reverse(),
                    }
                }
                None => Ordering::Equal,
            };
            primary.then_with(|| a.id.cmp(&b.id))
        });

        if let Some(limit) = self.limit {
            results.truncate(limit);
        }
        results
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values: null < bool < number < string < array < object
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            match (x.as_i64(), y.as_i64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => {
                    let x = x.as_f64().unwrap_or(f64::NAN);
                    let y = y.as_f64().unwrap_or(f64::NAN);
                    x.partial_cmp(&y).unwrap_or(Ordering::Equal)
                }
            }
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (left, right) in x.iter().zip(y.iter()) {
                let ord = compare_values(left, right);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn doc(id: &str, fields: Value) -> Document {
        Document {
            id: id.to_string(),
            collection: "posts".to_string(),
            fields: fields.as_object().cloned().unwrap_or_default(),
            create_time: Utc::now(),
            update_time: Utc::now(),
        }
    }

    #[test]
    fn test_order_desc_with_limit() {
        let docs = vec![
            doc("a", json!({ "createdAt": 1 })),
            doc("b", json!({ "createdAt": 3 })),
            doc("c", json!({ "createdAt": 2 })),
        ];
        let query = Query::collection("posts")
            .order_by("createdAt", Direction::Descending)
            .limit(2);

        let ids: Vec<String> = query.execute(&docs).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn test_ordered_query_excludes_missing_field() {
        let docs = vec![doc("a", json!({ "createdAt": 1 })), doc("b", json!({}))];
        let query = Query::collection("posts").order_by("createdAt", Direction::Ascending);
        assert_eq!(query.execute(&docs).len(), 1);
    }

    #[test]
    fn test_array_contains_and_equal_filters() {
        let docs = vec![
            doc("a", json!({ "participants": ["u1", "u2"], "kind": "direct" })),
            doc("b", json!({ "participants": ["u3"], "kind": "direct" })),
            doc("c", json!({ "participants": "u1", "kind": "direct" })),
        ];
        let query = Query::collection("posts")
            .where_array_contains("participants", "u1")
            .where_eq("kind", "direct");

        let ids: Vec<String> = query.execute(&docs).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[test]
    fn test_compare_values_across_types() {
        assert_eq!(compare_values(&json!(null), &json!(1)), Ordering::Less);
        assert_eq!(compare_values(&json!(2), &json!(10)), Ordering::Less);
        assert_eq!(compare_values(&json!(1.5), &json!(1)), Ordering::Greater);
        assert_eq!(compare_values(&json!("b"), &json!("a")), Ordering::Greater);
        assert_eq!(compare_values(&json!(1), &json!("1")), Ordering::Less);
    }
}
