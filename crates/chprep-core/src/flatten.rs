//! Nested family flattening.
//!
//! The store keeps an array of structured records as parallel arrays, one per
//! member column. An input record carrying such a family as an array of objects
//!
//! ```json
//! {"items": [{"id": "a", "qty": 1}, {"id": "b"}]}
//! ```
//!
//! is rewritten into one sibling array per member, all of the same length:
//!
//! ```json
//! {"items.id": ["a", "b"], "items.qty": [1, null]}
//! ```

use serde_json::{Map, Value as JsonValue};

use crate::schema::ResolvedSchema;

/// A semi-structured input record.
pub type Record = Map<String, JsonValue>;

/// Rewrites every nested family present as an array into parallel member arrays.
///
/// Missing fields, and elements that are not objects, become `null` so every
/// member array has the length of the family array. The family key is removed.
/// Records where the family key is absent or not an array are left unchanged.
///
/// # Examples
///
/// ```
/// use chprep_core::flatten::{Record, flatten_nested};
/// use chprep_core::schema::resolve;
/// use chprep_core_common::DescribedColumn;
/// use serde_json::json;
///
/// let schema = resolve(&[
///     DescribedColumn::new("items.id", "Array(String)"),
///     DescribedColumn::new("items.qty", "Array(Int32)"),
/// ])
/// .unwrap();
///
/// let record: Record = serde_json::from_value(json!({
///     "items": [{"id": "a", "qty": 1}, {"id": "b"}]
/// }))
/// .unwrap();
///
/// let flat = flatten_nested(vec![record], &schema);
/// assert_eq!(flat[0]["items.id"], json!(["a", "b"]));
/// assert_eq!(flat[0]["items.qty"], json!([1, null]));
/// assert!(!flat[0].contains_key("items"));
/// ```
#[must_use]
pub fn flatten_nested(mut records: Vec<Record>, schema: &ResolvedSchema) -> Vec<Record> {
    let families: Vec<_> = schema.nested_families().collect();
    if families.is_empty() {
        return records;
    }

    for record in &mut records {
        for family in &families {
            if !matches!(record.get(&family.parent_name), Some(JsonValue::Array(_))) {
                continue;
            }
            let Some(JsonValue::Array(elements)) = record.remove(&family.parent_name) else {
                continue;
            };
            for member in &family.members {
                let child = member.child_name();
                let values = elements
                    .iter()
                    .map(|element| match element {
                        JsonValue::Object(fields) => {
                            fields.get(child).cloned().unwrap_or(JsonValue::Null)
                        },
                        _ => JsonValue::Null,
                    })
                    .collect();
                record.insert(member.name.clone(), JsonValue::Array(values));
            }
        }
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::resolve;
    use chprep_core_common::DescribedColumn;
    use serde_json::json;

    fn record(value: JsonValue) -> Record {
        serde_json::from_value(value).unwrap()
    }

    fn items_schema() -> ResolvedSchema {
        resolve(&[
            DescribedColumn::new("items.id", "Array(String)"),
            DescribedColumn::new("items.qty", "Array(Int32)"),
            DescribedColumn::new("campaign.id", "String"),
        ])
        .unwrap()
    }

    #[test]
    fn test_alignment_with_all_nulls() {
        let flat = flatten_nested(
            vec![record(json!({"items": [{}, null, "junk"]}))],
            &items_schema(),
        );
        assert_eq!(flat[0]["items.id"], json!([null, null, null]));
        assert_eq!(flat[0]["items.qty"], json!([null, null, null]));
    }

    #[test]
    fn test_empty_array_yields_empty_members() {
        let flat = flatten_nested(vec![record(json!({"items": []}))], &items_schema());
        assert_eq!(flat[0]["items.id"], json!([]));
        assert_eq!(flat[0]["items.qty"], json!([]));
    }

    #[test]
    fn test_non_array_family_is_untouched() {
        let input = vec![
            record(json!({"items": {"id": "a"}, "title": "x"})),
            record(json!({"title": "y"})),
        ];
        let flat = flatten_nested(input.clone(), &items_schema());
        assert_eq!(flat, input);
    }

    #[test]
    fn test_grouped_family_is_not_flattened() {
        let input = vec![record(json!({"campaign.id": "c1"}))];
        let flat = flatten_nested(input.clone(), &items_schema());
        assert_eq!(flat, input);
    }
}
