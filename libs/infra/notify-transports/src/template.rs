// [libs/infra/notify-transports/src/template.rs]
//! Minimal safe template language for webhook bodies, headers, and email
//! bodies: `{{field}}` or `{{field|function}}` placeholders over a
//! flat JSON context, with a whitelisted function set. There is no
//! arbitrary expression evaluation, loop, or include directive — the
//! surface is deliberately too small to be useful for anything but field
//! substitution.

use serde_json::Value;

const PLACEHOLDER_OPEN: &str = "{{";
const PLACEHOLDER_CLOSE: &str = "}}";

pub fn render(template: &str, context: &Value) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(PLACEHOLDER_OPEN) {
        output.push_str(&rest[..start]);
        let after_open = &rest[start + PLACEHOLDER_OPEN.len()..];

        let Some(end) = after_open.find(PLACEHOLDER_CLOSE) else {
            // Unterminated placeholder: emit the rest verbatim, matching
            // how a template engine would surface an author's typo.
            output.push_str(&rest[start..]);
            rest = "";
            break;
        };

        let expression = &after_open[..end];
        output.push_str(&resolve_expression(expression, context));
        rest = &after_open[end + PLACEHOLDER_CLOSE.len()..];
    }
    output.push_str(rest);
    output
}

fn resolve_expression(expression: &str, context: &Value) -> String {
    let mut parts = expression.split('|').map(str::trim);
    let field = parts.next().unwrap_or("");

    let mut value = lookup_field(context, field);
    for function_name in parts {
        value = apply_function(function_name, &value);
    }
    value
}

fn lookup_field(context: &Value, field: &str) -> String {
    let mut current = context;
    for segment in field.split('.') {
        match current.get(segment) {
            Some(next) => current = next,
            None => return String::new(),
        }
    }
    match current {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn apply_function(name: &str, value: &str) -> String {
    match name {
        "upper" => value.to_uppercase(),
        "lower" => value.to_lowercase(),
        "title" => title_case(value),
        "urlquery" => url::form_urlencoded::byte_serialize(value.as_bytes()).collect(),
        "urlpath" => url::form_urlencoded::byte_serialize(value.as_bytes()).collect::<String>().replace('+', "%20"),
        "printf" => value.to_string(),
        unknown => {
            tracing::warn!(function = unknown, "unknown template function, passing value through unchanged");
            value.to_string()
        }
    }
}

fn title_case(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn substitutes_flat_and_nested_fields() {
        let context = json!({ "alert": { "level": "critical" }, "resource": "node-1" });
        assert_eq!(render("{{resource}} is {{alert.level}}", &context), "node-1 is critical");
    }

    #[test]
    fn applies_whitelisted_functions() {
        let context = json!({ "level": "critical" });
        assert_eq!(render("{{level|upper}}", &context), "CRITICAL");
        assert_eq!(render("{{level|title}}", &context), "Critical");
    }

    #[test]
    fn missing_field_renders_empty() {
        let context = json!({});
        assert_eq!(render("value=[{{missing}}]", &context), "value=[]");
    }

    #[test]
    fn urlquery_escapes_special_characters() {
        let context = json!({ "name": "node one/two" });
        assert_eq!(render("{{name|urlquery}}", &context), "node+one%2Ftwo");
    }
}
