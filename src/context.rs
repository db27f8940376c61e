use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::mail::{self, MailProvider};
use crate::template::TemplateRenderer;

/// Collaborators shared by every context-bound handler.
///
/// Built once at startup and only ever handed out behind an `Arc`; nothing
/// in here is mutated afterwards.
pub struct SharedContext {
    pub mailer: Arc<dyn MailProvider>,
    pub renderer: TemplateRenderer,
}

impl SharedContext {
    pub fn new(mailer: Arc<dyn MailProvider>, renderer: TemplateRenderer) -> Self {
        Self { mailer, renderer }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            mail::from_config(config)?,
            TemplateRenderer::new(&config.app_url),
        ))
    }
}
