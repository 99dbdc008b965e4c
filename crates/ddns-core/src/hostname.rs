//! Hostname normalization and validation
//!
//! Hostnames are stored and compared lowercase without a trailing dot.

use crate::error::{Error, Result};

/// Lowercase `name` and strip surrounding whitespace and one trailing dot
pub fn normalize(name: &str) -> String {
    let trimmed = name.trim();
    trimmed
        .strip_suffix('.')
        .unwrap_or(trimmed)
        .to_ascii_lowercase()
}

/// Check an already-normalized hostname against RFC 1035 label rules
pub fn validate(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_input("Hostname cannot be empty"));
    }

    // Total length limit (RFC 1035: 253 chars max)
    if name.len() > 253 {
        return Err(Error::invalid_input(format!(
            "Hostname too long: {} chars (max 253)",
            name.len()
        )));
    }

    for label in name.split('.') {
        if label.is_empty() {
            return Err(Error::invalid_input(format!(
                "Hostname has empty label: '{}'",
                name
            )));
        }

        if label.len() > 63 {
            return Err(Error::invalid_input(format!(
                "Hostname label too long: {} chars (max 63). Label: '{}'",
                label.len(),
                label
            )));
        }

        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(Error::invalid_input(format!(
                "Hostname label contains invalid characters. Label: '{}'. \
                Valid: alphanumeric and hyphen only.",
                label
            )));
        }

        if label.starts_with('-') || label.ends_with('-') {
            return Err(Error::invalid_input(format!(
                "Hostname label cannot start or end with hyphen. Label: '{}'",
                label
            )));
        }
    }

    Ok(())
}

/// Whether `hostname` is `zone` itself or a name below it
pub fn is_within_zone(hostname: &str, zone: &str) -> bool {
    hostname == zone
        || hostname
            .strip_suffix(zone)
            .is_some_and(|prefix| prefix.ends_with('.'))
}
