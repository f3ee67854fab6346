use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub String);

/// A row returned by the record store. Fields are kept as raw JSON because the
/// store's column types (text, multi-select, collaborator) vary per table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(default, rename = "createdTime", skip_serializing_if = "Option::is_none")]
    pub created_time: Option<String>,
}

impl Record {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: RecordId(id.into()), fields: Map::new(), created_time: None }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Text rendering of a field, or `None` when the field is absent or null.
    pub fn text(&self, field: &str) -> Option<String> {
        self.fields.get(field).and_then(value_text)
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::Array(items) => {
            let parts = items.iter().filter_map(value_text).collect::<Vec<_>>();
            Some(parts.join(", "))
        }
        Value::Object(object) => object.get("name").and_then(value_text),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::Record;

    #[test]
    fn text_renders_scalars_lists_and_collaborators() {
        let record = Record::new("rec1")
            .with_field("Name", "Rust Night")
            .with_field("Seats", 40)
            .with_field("Skillsets", json!(["Go", "Rust"]))
            .with_field("Slack User", json!({"id": "usr1", "name": "ferris"}))
            .with_field("Notes", json!(null));

        assert_eq!(record.text("Name").as_deref(), Some("Rust Night"));
        assert_eq!(record.text("Seats").as_deref(), Some("40"));
        assert_eq!(record.text("Skillsets").as_deref(), Some("Go, Rust"));
        assert_eq!(record.text("Slack User").as_deref(), Some("ferris"));
        assert_eq!(record.text("Notes"), None);
        assert_eq!(record.text("Channel"), None);
    }

    #[test]
    fn deserializes_store_payload_shape() {
        let record: Record = serde_json::from_value(json!({
            "id": "recABC",
            "fields": {"Name": "Meetup"},
            "createdTime": "2017-05-01T00:00:00.000Z"
        }))
        .expect("record should deserialize");

        assert_eq!(record.id.0, "recABC");
        assert_eq!(record.created_time.as_deref(), Some("2017-05-01T00:00:00.000Z"));
        assert_eq!(record.text("Name").as_deref(), Some("Meetup"));
    }
}
