//! Notification address validation, applied at the API boundary before a
//! request reaches the engine. Delivery itself is a structured log event
//! emitted by the runner.

/// Validates and normalizes a notification address. The error string is the
/// client-facing message.
pub fn validate_email(address: &str) -> Result<String, String> {
    let address = address.trim();
    let mut parts = address.split('@');
    let local = parts.next().unwrap_or_default();
    let domain = parts.next().unwrap_or_default();

    if parts.next().is_some() || local.is_empty() || domain.is_empty() {
        return Err(
            "The email address is not valid. It must have exactly one @-sign.".to_string(),
        );
    }
    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return Err(format!(
            "The domain name {} is not valid. It should have a period.",
            domain
        ));
    }
    if address.chars().any(char::is_whitespace) {
        return Err("The email address is not valid. It must not contain spaces.".to_string());
    }

    Ok(address.to_string())
}
