use crate::error::{MailerError, Result};

/// Syntax check for a recipient address.
///
/// Runs before the payload is decoded and before any relay contact; the
/// relay still applies its own policy to addresses that pass here.
pub fn validate_email(address: &str) -> Result<()> {
    if address.is_empty() {
        return Err(MailerError::InvalidEmail("address is empty".to_string()));
    }

    if address.chars().any(char::is_whitespace) {
        return Err(MailerError::InvalidEmail(format!(
            "'{address}' contains whitespace"
        )));
    }

    let Some((local, domain)) = address.split_once('@') else {
        return Err(MailerError::InvalidEmail(format!(
            "'{address}' is missing '@'"
        )));
    };

    if local.is_empty() || domain.is_empty() {
        return Err(MailerError::InvalidEmail(format!(
            "'{address}' has an empty local part or domain"
        )));
    }

    if domain.contains('@') {
        return Err(MailerError::InvalidEmail(format!(
            "'{address}' contains more than one '@'"
        )));
    }

    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return Err(MailerError::InvalidEmail(format!(
            "'{address}' has an invalid domain"
        )));
    }

    Ok(())
}
