use std::sync::Arc;

use super::CapabilityScope;
use crate::error::PluginError;
use crate::permissions::Permission;
use crate::store::{EmailMessage, EmailSender};

const MAX_RECIPIENTS: usize = 50;

/// Outbound email, `email:send`. Every message is attributed to the plugin.
pub struct EmailCapability {
    scope: Arc<CapabilityScope>,
    sender: Arc<dyn EmailSender>,
}

impl EmailCapability {
    pub fn new(scope: Arc<CapabilityScope>, sender: Arc<dyn EmailSender>) -> Self {
        Self { scope, sender }
    }

    pub async fn send(&self, mut message: EmailMessage) -> Result<(), PluginError> {
        self.scope.require(Permission::EmailSend)?;

        if message.to.is_empty() || message.to.len() > MAX_RECIPIENTS {
            return Err(PluginError::Email(format!(
                "message must have 1-{MAX_RECIPIENTS} recipients"
            )));
        }
        if let Some(bad) = message.to.iter().find(|to| !to.contains('@')) {
            return Err(PluginError::Email(format!("invalid recipient '{bad}'")));
        }
        if message.subject.trim().is_empty() {
            return Err(PluginError::Email("subject must not be empty".into()));
        }
        if message.text.is_none() && message.html.is_none() {
            return Err(PluginError::Email("message needs a text or html body".into()));
        }

        message.sent_by_plugin = Some(self.scope.plugin_name().to_string());
        self.sender.send(&message).await?;
        self.scope.audit("email.send", &message.to.join(","));
        Ok(())
    }
}
