//! Request validation.
//!
//! Each endpoint declares its rule set by calling the checks below on a
//! [`Validator`]; failures accumulate into a field -> messages map and
//! the request is rejected with a 422 envelope before any persistence
//! happens.

use crate::shared::models::ApiReply;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("invalid email regex"));

#[derive(Debug, Default)]
pub struct Validator {
    errors: BTreeMap<String, Vec<String>>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: String) {
        self.errors.entry(field.to_string()).or_default().push(message);
    }

    pub fn required(&mut self, field: &str, value: Option<&str>) {
        match value {
            Some(v) if !v.trim().is_empty() => {}
            _ => self.add(field, format!("The {} field is required.", field)),
        }
    }

    pub fn max_len(&mut self, field: &str, value: Option<&str>, max: usize) {
        if let Some(v) = value {
            if v.chars().count() > max {
                self.add(
                    field,
                    format!(
                        "The {} field must not be greater than {} characters.",
                        field, max
                    ),
                );
            }
        }
    }

    pub fn email(&mut self, field: &str, value: Option<&str>) {
        if let Some(v) = value {
            if !v.is_empty() && !EMAIL_RE.is_match(v) {
                self.add(
                    field,
                    format!("The {} field must be a valid email address.", field),
                );
            }
        }
    }

    pub fn one_of(&mut self, field: &str, value: Option<&str>, allowed: &[&str]) {
        if let Some(v) = value {
            if !allowed.contains(&v) {
                self.add(field, format!("The selected {} is invalid.", field));
            }
        }
    }

    pub fn url(&mut self, field: &str, value: Option<&str>) {
        if let Some(v) = value {
            let rest = v
                .strip_prefix("http://")
                .or_else(|| v.strip_prefix("https://"));
            if !rest.is_some_and(|r| !r.is_empty()) {
                self.add(field, format!("The {} field must be a valid URL.", field));
            }
        }
    }

    /// Free-form key/value payloads (metadata); JSON objects and arrays
    /// both pass, scalars do not.
    pub fn map(&mut self, field: &str, value: Option<&Value>) {
        if let Some(v) = value {
            if !v.is_object() && !v.is_array() {
                self.add(field, format!("The {} field must be an array.", field));
            }
        }
    }

    /// Bounded list of bounded strings (attachment references).
    pub fn string_list(&mut self, field: &str, value: Option<&Value>, max_items: usize, max_len: usize) {
        let Some(v) = value else { return };
        let Some(items) = v.as_array() else {
            self.add(field, format!("The {} field must be an array.", field));
            return;
        };
        if items.len() > max_items {
            self.add(
                field,
                format!("The {} field must not have more than {} items.", field, max_items),
            );
        }
        for (index, item) in items.iter().enumerate() {
            match item.as_str() {
                None => self.add(
                    &format!("{}.{}", field, index),
                    format!("The {}.{} field must be a string.", field, index),
                ),
                Some(s) if s.chars().count() > max_len => self.add(
                    &format!("{}.{}", field, index),
                    format!(
                        "The {}.{} field must not be greater than {} characters.",
                        field, index, max_len
                    ),
                ),
                Some(_) => {}
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn finish(self) -> Result<(), ApiReply> {
        if self.errors.is_empty() {
            return Ok(());
        }
        let mut map = serde_json::Map::new();
        for (field, messages) in self.errors {
            map.insert(
                field,
                Value::Array(messages.into_iter().map(Value::String).collect()),
            );
        }
        Err(ApiReply::validation_failed(Value::Object(map)))
    }
}
