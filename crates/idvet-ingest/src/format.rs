use idvet_types::ContactDetails;

use crate::error::FormatError;

/// Strip separators and whitespace from a phone number.
pub fn format_phone(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '-' | '.' | '(' | ')' | '+') && !c.is_whitespace())
        .collect()
}

/// Canonicalise an email address: drop dots from the local part and
/// lower-case the whole address.
pub fn format_email(raw: &str) -> Result<String, FormatError> {
    let trimmed = raw.trim();
    let mut parts = trimmed.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(FormatError::InvalidEmail(raw.to_string()));
    };
    if local.is_empty() || domain.is_empty() {
        return Err(FormatError::InvalidEmail(raw.to_string()));
    }
    let local: String = local.chars().filter(|c| *c != '.').collect();
    Ok(format!("{}@{}", local.to_lowercase(), domain.to_lowercase()))
}

/// Apply both formatters to a record's contact fields in place.
///
/// A phone number that formats to nothing is cleared.
pub fn format_contact(contact: &mut ContactDetails) -> Result<(), FormatError> {
    if let Some(email) = contact.email_address.take() {
        contact.email_address = Some(format_email(&email)?);
    }
    if let Some(phone) = contact.phone_number.take() {
        let formatted = format_phone(&phone);
        contact.phone_number = (!formatted.is_empty()).then_some(formatted);
    }
    Ok(())
}
