// [libs/infra/notify-transports/src/redact.rs]
//! Secret redaction for transport logs: credentials and webhook URLs
//! must never appear in full in `tracing` output.

pub fn redact_secret(value: &str) -> String {
    if value.len() <= 4 {
        return "****".to_string();
    }
    let visible = &value[value.len() - 4..];
    format!("****{visible}")
}

/// Redacts everything in a URL except scheme and host, since query
/// strings and paths often carry webhook tokens.
pub fn redact_url(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => format!("{}://{}/<redacted>", parsed.scheme(), parsed.host_str().unwrap_or("?")),
        Err(_) => "<unparseable-url>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_short_and_long_secrets() {
        assert_eq!(redact_secret("ab"), "****");
        assert_eq!(redact_secret("supersecrettoken"), "****oken");
    }

    #[test]
    fn redacts_url_path_and_query() {
        assert_eq!(redact_url("https://hooks.example.com/services/T0/B0/xyz?token=abc"), "https://hooks.example.com/<redacted>");
    }
}
