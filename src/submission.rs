//! Case submission payload and field validation.

use serde::{Deserialize, Serialize};

/// A case as posted by the public form and forwarded to the dashboard.
///
/// Required fields are optional here so that a missing field surfaces as a
/// validation message rather than a JSON error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseSubmission {
    pub subdomain: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub is_anonymous: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reporter_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reporter_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reporter_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// One failed field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: &'static str,
}

/// Render field errors as `field: message, field: message`.
pub fn describe(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join(", ")
}

impl CaseSubmission {
    /// Check every field, trimming free text on success.
    pub fn validate(mut self) -> Result<Self, Vec<FieldError>> {
        let mut errors = Vec::new();

        match self.subdomain.as_deref() {
            None => errors.push(required("subdomain")),
            Some(s) if s.len() < 3 => errors.push(FieldError {
                field: "subdomain",
                message: "Subdomain must be at least 3 characters",
            }),
            Some(s) if s.len() > 63 => errors.push(FieldError {
                field: "subdomain",
                message: "Subdomain must be less than 63 characters",
            }),
            Some(s) if !is_valid_subdomain(s) => errors.push(FieldError {
                field: "subdomain",
                message: "Invalid subdomain format",
            }),
            Some(_) => {}
        }

        self.title = self.title.map(|t| t.trim().to_string());
        match self.title.as_deref().map(|t| t.chars().count()) {
            None => errors.push(required("title")),
            Some(n) if n < 5 => errors.push(FieldError {
                field: "title",
                message: "Title must be at least 5 characters",
            }),
            Some(n) if n > 500 => errors.push(FieldError {
                field: "title",
                message: "Title must be less than 500 characters",
            }),
            Some(_) => {}
        }

        self.description = self.description.map(|d| d.trim().to_string());
        match self.description.as_deref().map(|d| d.chars().count()) {
            None => errors.push(required("description")),
            Some(n) if n < 10 => errors.push(FieldError {
                field: "description",
                message: "Description must be at least 10 characters",
            }),
            Some(n) if n > 5000 => errors.push(FieldError {
                field: "description",
                message: "Description must be less than 5000 characters",
            }),
            Some(_) => {}
        }

        if self.is_anonymous.is_none() {
            errors.push(required("isAnonymous"));
        }

        let email = self.reporter_email.as_deref().map(|e| e.trim().to_string());
        match email.as_deref() {
            Some("") => self.reporter_email = None,
            Some(email) if !looks_like_email(email) => errors.push(FieldError {
                field: "reporterEmail",
                message: "Please enter a valid email address",
            }),
            _ => {}
        }

        if errors.is_empty() {
            Ok(self)
        } else {
            Err(errors)
        }
    }
}

fn required(field: &'static str) -> FieldError {
    FieldError {
        field,
        message: "Required",
    }
}

/// `^[a-z0-9]([a-z0-9-]*[a-z0-9])?$`
fn is_valid_subdomain(s: &str) -> bool {
    let allowed = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    !s.is_empty()
        && s.chars().all(|c| allowed(c) || c == '-')
        && !s.starts_with('-')
        && !s.ends_with('-')
}

fn looks_like_email(s: &str) -> bool {
    match s.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && !s.contains(char::is_whitespace)
                && domain
                    .split_once('.')
                    .map(|(host, tld)| !host.is_empty() && !tld.is_empty())
                    .unwrap_or(false)
        }
        None => false,
    }
}
