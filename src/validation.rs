//! Name, password and chat text validation.

use std::collections::HashSet;

use crate::ids::CONTEXT_SEPARATOR;

/// Name validation errors with helpful messages
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("Name is too short (minimum {min} characters)")]
    TooShort { min: usize },

    #[error("Name is too long (maximum {max} characters)")]
    TooLong { max: usize },

    #[error("Name cannot start or end with whitespace")]
    InvalidWhitespace,

    #[error("Name contains invalid characters: {chars}")]
    InvalidCharacters { chars: String },

    #[error("Name is reserved")]
    Reserved,
}

impl NameError {
    pub fn message_key(&self) -> &'static str {
        match self {
            NameError::TooShort { .. } => "name.too-short",
            NameError::TooLong { .. } => "name.too-long",
            NameError::InvalidWhitespace => "name.whitespace",
            NameError::InvalidCharacters { .. } => "name.invalid-characters",
            NameError::Reserved => "name.reserved",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PasswordError {
    #[error("Password is too short (minimum {min} characters)")]
    TooShort { min: usize },

    #[error("Password is too long (maximum {max} bytes)")]
    TooLong { max: usize },
}

impl PasswordError {
    pub fn message_key(&self) -> &'static str {
        match self {
            PasswordError::TooShort { .. } => "password.too-short",
            PasswordError::TooLong { .. } => "password.too-long",
        }
    }
}

/// Validation rules for one kind of name
#[derive(Debug, Clone)]
pub struct NameRules {
    pub min_length: usize,
    pub max_length: usize,
    pub allow_spaces: bool,
}

impl NameRules {
    /// Account names: short, no spaces, usable in `@name` whispers.
    pub fn user() -> Self {
        NameRules {
            min_length: 2,
            max_length: 20,
            allow_spaces: false,
        }
    }

    /// World and room names.
    pub fn context() -> Self {
        NameRules {
            min_length: 1,
            max_length: 32,
            allow_spaces: true,
        }
    }
}

pub const PASSWORD_MIN_CHARS: usize = 6;
pub const PASSWORD_MAX_BYTES: usize = 128;
pub const CHAT_MAX_BYTES: usize = 1024;

fn reserved_names() -> HashSet<&'static str> {
    ["global", "server", "system", "everyone", "nobody"]
        .iter()
        .copied()
        .collect()
}

pub fn validate_name(name: &str, rules: &NameRules) -> Result<String, NameError> {
    let trimmed = name.trim();
    if trimmed != name {
        return Err(NameError::InvalidWhitespace);
    }
    let count = trimmed.chars().count();
    if count < rules.min_length {
        return Err(NameError::TooShort {
            min: rules.min_length,
        });
    }
    if count > rules.max_length {
        return Err(NameError::TooLong {
            max: rules.max_length,
        });
    }
    if reserved_names().contains(trimmed.to_lowercase().as_str()) {
        return Err(NameError::Reserved);
    }

    // The separator is never allowed: context ids are dotted paths.
    let invalid: Vec<char> = trimmed
        .chars()
        .filter(|&ch| {
            let ok = ch.is_alphanumeric() || ch == '_' || ch == '-' || (ch == ' ' && rules.allow_spaces);
            !ok || ch == CONTEXT_SEPARATOR
        })
        .collect::<HashSet<char>>()
        .into_iter()
        .collect();
    if !invalid.is_empty() {
        let mut chars: Vec<String> = invalid
            .iter()
            .map(|c| {
                if c.is_control() {
                    format!("\\u{{{:04x}}}", *c as u32)
                } else {
                    c.to_string()
                }
            })
            .collect();
        chars.sort();
        return Err(NameError::InvalidCharacters {
            chars: chars.join(", "),
        });
    }
    Ok(trimmed.to_string())
}

pub fn validate_user_name(name: &str) -> Result<String, NameError> {
    validate_name(name, &NameRules::user())
}

pub fn validate_context_name(name: &str) -> Result<String, NameError> {
    validate_name(name, &NameRules::context())
}

pub fn validate_password(password: &str) -> Result<(), PasswordError> {
    if password.chars().count() < PASSWORD_MIN_CHARS {
        return Err(PasswordError::TooShort {
            min: PASSWORD_MIN_CHARS,
        });
    }
    if password.len() > PASSWORD_MAX_BYTES {
        return Err(PasswordError::TooLong {
            max: PASSWORD_MAX_BYTES,
        });
    }
    Ok(())
}

/// Strip control characters (newlines kept) and cap the length on a char boundary.
pub fn sanitize_chat(text: &str) -> String {
    let mut out = String::with_capacity(text.len().min(CHAT_MAX_BYTES));
    for ch in text.chars() {
        if ch.is_control() && ch != '\n' {
            continue;
        }
        if out.len() + ch.len_utf8() > CHAT_MAX_BYTES {
            break;
        }
        out.push(ch);
    }
    out
}
