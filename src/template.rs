//! Placeholder expansion and the message template catalog.
//!
//! Templates carry `{{name}}` placeholders in their subject and body.
//! [`render`] substitutes every placeholder whose name is present in the
//! variable map and leaves the rest in the text verbatim: the caller owns
//! supplying a complete variable set, so an unfilled placeholder is not an
//! error.
//!
//! Substitution is a single left-to-right pass over the original text, so a
//! variable value that itself contains `{{...}}` is never expanded again and
//! the order in which keys are supplied cannot change the result.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::Context;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::recipient::Channel;

/// Variable map used for placeholder substitution.
pub type TemplateVars = BTreeMap<String, String>;

static PLACEHOLDER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\{\{([^{}]+)\}\}").ok());

/// A subject/body pair ready to render or send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTemplate {
    /// Subject line. Email only; SMS adapters ignore it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Message body (HTML for email, plain text for SMS).
    pub body: String,
}

impl MessageTemplate {
    /// Create a template with a body and no subject.
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            subject: None,
            body: body.into(),
        }
    }

    /// Set the subject line.
    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Distinct placeholder names across subject and body, first-seen order.
    pub fn placeholders(&self) -> Vec<String> {
        let mut names = self
            .subject
            .as_deref()
            .map(placeholders)
            .unwrap_or_default();
        for name in placeholders(&self.body) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }
}

/// Expand placeholders in both subject and body.
pub fn render(template: &MessageTemplate, vars: &TemplateVars) -> MessageTemplate {
    MessageTemplate {
        subject: template
            .subject
            .as_deref()
            .map(|subject| render_text(subject, vars)),
        body: render_text(&template.body, vars),
    }
}

/// Expand placeholders in a single string.
pub fn render_text(text: &str, vars: &TemplateVars) -> String {
    if vars.is_empty() {
        return text.to_owned();
    }
    let Some(pattern) = PLACEHOLDER.as_ref() else {
        return text.to_owned();
    };
    pattern
        .replace_all(text, |caps: &Captures<'_>| {
            let whole = caps.get(0).map_or("", |m| m.as_str());
            caps.get(1)
                .and_then(|name| vars.get(name.as_str()))
                .map_or_else(|| whole.to_owned(), Clone::clone)
        })
        .into_owned()
}

/// Distinct placeholder names in `text`, first-seen order.
pub fn placeholders(text: &str) -> Vec<String> {
    let Some(pattern) = PLACEHOLDER.as_ref() else {
        return Vec::new();
    };
    let mut names: Vec<String> = Vec::new();
    for caps in pattern.captures_iter(text) {
        if let Some(name) = caps.get(1) {
            if !names.iter().any(|n| n == name.as_str()) {
                names.push(name.as_str().to_owned());
            }
        }
    }
    names
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Template lookup errors.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    /// No catalog entry under the requested key.
    #[error("template '{key}' not found (available: {available})")]
    UnknownTemplate {
        /// Requested key.
        key: String,
        /// Comma-separated list of known keys.
        available: String,
    },
}

/// One named template in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Human-readable name.
    pub name: String,
    /// Channel the template is written for.
    pub channel: Channel,
    /// Grouping label shown in listings.
    #[serde(default)]
    pub category: String,
    /// Subject line (email templates).
    #[serde(default)]
    pub subject: Option<String>,
    /// Body text.
    pub body: String,
    /// Declared variable names. Derived from the placeholders when empty.
    #[serde(default)]
    pub variables: Vec<String>,
}

impl CatalogEntry {
    /// The subject/body pair for rendering.
    pub fn template(&self) -> MessageTemplate {
        MessageTemplate {
            subject: self.subject.clone(),
            body: self.body.clone(),
        }
    }

    /// Declared variables, falling back to the placeholders in the text.
    pub fn declared_variables(&self) -> Vec<String> {
        if self.variables.is_empty() {
            self.template().placeholders()
        } else {
            self.variables.clone()
        }
    }

    /// Declared variables that `vars` does not supply.
    pub fn missing_variables(&self, vars: &TemplateVars) -> Vec<String> {
        self.declared_variables()
            .into_iter()
            .filter(|name| !vars.contains_key(name))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    templates: BTreeMap<String, CatalogEntry>,
}

/// Static mapping from template key to [`CatalogEntry`].
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    entries: BTreeMap<String, CatalogEntry>,
}

impl TemplateCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// The templates shipped with the binary.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        for (key, entry) in builtin_entries() {
            catalog.insert(key, entry);
        }
        catalog
    }

    /// Parse a catalog from TOML (`[templates.<key>]` tables).
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML does not match the catalog schema.
    pub fn from_toml(toml_str: &str) -> anyhow::Result<Self> {
        let file: CatalogFile =
            toml::from_str(toml_str).context("failed to parse template catalog TOML")?;
        Ok(Self {
            entries: file.templates,
        })
    }

    /// Load a catalog file from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read template catalog {}", path.display()))?;
        Self::from_toml(&contents)
            .with_context(|| format!("invalid template catalog {}", path.display()))
    }

    /// Add or replace an entry.
    pub fn insert(&mut self, key: impl Into<String>, entry: CatalogEntry) {
        self.entries.insert(key.into(), entry);
    }

    /// Merge `other` into this catalog; entries in `other` win on key clashes.
    pub fn extend(&mut self, other: Self) {
        self.entries.extend(other.entries);
    }

    /// Look up an entry by key.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::UnknownTemplate`] when the key is absent.
    pub fn get(&self, key: &str) -> Result<&CatalogEntry, TemplateError> {
        self.entries
            .get(key)
            .ok_or_else(|| TemplateError::UnknownTemplate {
                key: key.to_owned(),
                available: self.keys().join(", "),
            })
    }

    /// All keys in sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &CatalogEntry)> {
        self.entries.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn sms(name: &str, category: &str, body: &str, variables: &[&str]) -> CatalogEntry {
    CatalogEntry {
        name: name.to_owned(),
        channel: Channel::Sms,
        category: category.to_owned(),
        subject: None,
        body: body.to_owned(),
        variables: variables.iter().map(|v| (*v).to_owned()).collect(),
    }
}

fn email(name: &str, category: &str, subject: &str, body: &str) -> CatalogEntry {
    CatalogEntry {
        name: name.to_owned(),
        channel: Channel::Email,
        category: category.to_owned(),
        subject: Some(subject.to_owned()),
        body: body.to_owned(),
        variables: Vec::new(),
    }
}

fn builtin_entries() -> Vec<(&'static str, CatalogEntry)> {
    vec![
        (
            "welcome",
            sms(
                "Welcome SMS",
                "Onboarding",
                "Welcome to {{firmName}}! Your case {{caseType}} has been assigned to {{lawyerName}}. We'll keep you updated on your progress.",
                &["firmName", "caseType", "lawyerName"],
            ),
        ),
        (
            "reminder",
            sms(
                "Deadline Reminder",
                "Reminders",
                "URGENT: Your {{deadlineType}} is due {{dueDate}}. Please contact us immediately if you need assistance.",
                &["deadlineType", "dueDate"],
            ),
        ),
        (
            "update",
            sms(
                "Case Update",
                "Updates",
                "Your {{caseType}} has been updated. Check your email for details or call {{firmPhone}} for immediate assistance.",
                &["caseType", "firmPhone"],
            ),
        ),
        (
            "payment",
            sms(
                "Payment Reminder",
                "Billing",
                "Payment reminder: ${{amount}} due {{dueDate}}. Call {{firmPhone}} to arrange payment or discuss options.",
                &["amount", "dueDate", "firmPhone"],
            ),
        ),
        (
            "appointment",
            sms(
                "Appointment Confirmation",
                "Appointments",
                "Your appointment with {{lawyerName}} is confirmed for {{appointmentDate}} at {{appointmentTime}}. Location: {{firmAddress}}.",
                &["lawyerName", "appointmentDate", "appointmentTime", "firmAddress"],
            ),
        ),
        (
            "legalNotice",
            sms(
                "Legal Notice",
                "Legal",
                "LEGAL NOTICE: {{noticeType}} regarding {{caseType}}. Immediate response required. Contact {{lawyerName}} at {{firmPhone}}.",
                &["noticeType", "caseType", "lawyerName", "firmPhone"],
            ),
        ),
        (
            "welcomeEmail",
            email(
                "Welcome Email",
                "Onboarding",
                "Welcome to {{firmName}} - Your Legal Journey Begins",
                "<h2>Welcome, {{clientName}}!</h2>\
                 <p>On behalf of {{firmName}}, we are delighted to welcome you as our client.</p>\
                 <p><strong>Your Case Type:</strong> {{caseType}}<br>\
                 <strong>Assigned Attorney:</strong> {{lawyerName}}</p>\
                 <p>Questions? Call {{firmPhone}} or write to {{firmEmail}}.</p>",
            ),
        ),
        (
            "deadlineReminder",
            email(
                "Deadline Reminder Email",
                "Reminders",
                "URGENT: Deadline Reminder - {{deadlineType}} Due {{dueDate}}",
                "<p>Dear {{clientName}},</p>\
                 <p>Your <strong>{{deadlineType}}</strong> is due on <strong>{{dueDate}}</strong>.</p>\
                 <p>Please contact {{lawyerName}} at {{firmPhone}} if you need assistance.</p>",
            ),
        ),
    ]
}
