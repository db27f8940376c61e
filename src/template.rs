//! Email templates.
//!
//! The template set is closed: every [`TemplateName`] has its own parameter
//! struct, extracted from the loosely typed request options before anything
//! is rendered.

use serde_json::{Map, Value};

use crate::error::HandlerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateName {
    EmailVerification,
}

impl TemplateName {
    pub const ALL: [TemplateName; 1] = [TemplateName::EmailVerification];

    pub fn as_str(self) -> &'static str {
        match self {
            TemplateName::EmailVerification => "email_verification",
        }
    }

    pub fn parse(name: &str) -> Result<Self, HandlerError> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == name)
            .ok_or_else(|| HandlerError::UnknownTemplate(name.to_string()))
    }
}

/// Parameters of `email_verification`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailVerification {
    pub token: String,
}

/// Typed parameters for one template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateParams {
    EmailVerification(EmailVerification),
}

impl TemplateParams {
    pub fn from_options(
        name: TemplateName,
        options: &Map<String, Value>,
    ) -> Result<Self, HandlerError> {
        match name {
            TemplateName::EmailVerification => {
                Ok(TemplateParams::EmailVerification(EmailVerification {
                    token: required(options, name, "token")?,
                }))
            }
        }
    }
}

/// Strings are taken verbatim and scalars are stringified. `null` counts as
/// absent.
fn required(
    options: &Map<String, Value>,
    template: TemplateName,
    parameter: &'static str,
) -> Result<String, HandlerError> {
    let missing = || HandlerError::MissingParameter {
        template: template.as_str(),
        parameter,
    };

    match options.get(parameter) {
        None | Some(Value::Null) => Err(missing()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Bool(b)) => Ok(b.to_string()),
        Some(other) => Err(HandlerError::Decode(format!(
            "option \"{}\" must be a scalar, got {}",
            parameter, other
        ))),
    }
}

/// A rendered email. Built fresh on every render and never modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    app_url: String,
}

impl TemplateRenderer {
    pub fn new(app_url: &str) -> Self {
        Self {
            app_url: app_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn render(&self, params: &TemplateParams) -> Template {
        match params {
            TemplateParams::EmailVerification(p) => self.email_verification(p),
        }
    }

    fn email_verification(&self, params: &EmailVerification) -> Template {
        let link = format!("{}/api/v1/auth/verify/{}", self.app_url, params.token);

        Template {
            subject: "Onasty: verify your email".to_string(),
            body: format!(
                "To verify your email, please follow this link:\n\
                 <a href=\"{link}\">{link}</a>\n\
                 <br />\n\
                 <br />\n\
                 This link will expire after 24 hours."
            ),
        }
    }
}
