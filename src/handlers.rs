//! Request handlers bound to the `mailer.*` subjects.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::bus::Request;
use crate::context::SharedContext;
use crate::error::{success_reply, HandlerError, HandlerResult};
use crate::mail::OutboundEmail;
use crate::metrics;
use crate::template::{TemplateName, TemplateParams};

/// Payload of `mailer.send`.
#[derive(Debug, Clone, Deserialize)]
pub struct SendRequest {
    #[serde(default)]
    pub request_id: Option<String>,
    pub receiver: String,
    #[serde(rename = "templateName", alias = "template_name")]
    pub template_name: String,
    #[serde(default)]
    pub options: Map<String, Value>,
}

impl SendRequest {
    pub fn decode(payload: &[u8]) -> Result<Self, HandlerError> {
        let req: SendRequest = serde_json::from_slice(payload)?;

        if req.receiver.trim().is_empty() {
            return Err(HandlerError::Decode("receiver must not be empty".to_string()));
        }

        Ok(req)
    }
}

/// Liveness probe.
pub async fn ping(_request: Request) -> HandlerResult {
    Ok(json!({ "message": "pong" }))
}

/// Render the requested template and deliver it to `receiver`.
pub async fn send(ctx: Arc<SharedContext>, request: Request) -> HandlerResult {
    let req = SendRequest::decode(&request.payload)?;
    let request_id = req.request_id.as_deref().unwrap_or("-");

    let name = TemplateName::parse(&req.template_name)?;
    let params = TemplateParams::from_options(name, &req.options)?;
    let template = ctx.renderer.render(&params);

    let email = OutboundEmail {
        to: req.receiver,
        subject: template.subject,
        html: template.body,
    };

    match ctx.mailer.send(&email).await {
        Ok(()) => {
            metrics::record_sent();
            tracing::info!(
                request_id = %request_id,
                template_name = name.as_str(),
                provider = ctx.mailer.name(),
                "Email delivered"
            );
            Ok(success_reply())
        }
        Err(e) => {
            metrics::record_failed();
            tracing::error!(
                request_id = %request_id,
                template_name = name.as_str(),
                error = %e,
                "Failed to send email"
            );
            Err(e.into())
        }
    }
}
