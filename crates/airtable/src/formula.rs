//! Rendering of typed filters into Airtable's formula language.

use ocbot_core::records::RecordFilter;

pub fn render(filter: &RecordFilter) -> String {
    match filter {
        RecordFilter::Contains { field, needle } => {
            format!("FIND(\"{}\", {}) > 0", escape_string(needle), field_reference(field))
        }
    }
}

/// Escapes text for use inside a double-quoted formula string literal.
pub fn escape_string(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn field_reference(field: &str) -> String {
    format!("{{{}}}", field.replace('}', "\\}"))
}

#[cfg(test)]
mod tests {
    use ocbot_core::records::RecordFilter;

    use super::render;

    #[test]
    fn contains_renders_find_over_field() {
        let formula = render(&RecordFilter::contains("Skillsets", "Go"));
        assert_eq!(formula, "FIND(\"Go\", {Skillsets}) > 0");
    }

    #[test]
    fn user_text_cannot_break_out_of_string_literal() {
        let formula = render(&RecordFilter::contains("Language", "x\"), TRUE()) > 0 OR (\"\\"));
        assert_eq!(formula, "FIND(\"x\\\"), TRUE()) > 0 OR (\\\"\\\\\", {Language}) > 0");
    }

    #[test]
    fn field_names_with_spaces_are_wrapped() {
        let formula = render(&RecordFilter::contains("Slack User", "ferris"));
        assert_eq!(formula, "FIND(\"ferris\", {Slack User}) > 0");
    }
}
