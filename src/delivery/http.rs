//! Webhook message transport.

use reqwest::blocking::{Client, multipart};
use std::time::Duration;

use super::{DeliveryError, Envelope, MessageTransport};
use crate::config::{ProxyConfig, TransportConfig};

/// Posts messages to an HTTP endpoint.
///
/// Plain messages go out as JSON; messages with an attachment are sent as a
/// multipart form with the file under `attachment`. The `log` transport kind
/// writes the message to the process log instead.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    proxy: ProxyConfig,
}

impl HttpTransport {
    pub fn new(proxy: ProxyConfig) -> Self {
        Self { proxy }
    }

    fn client(&self, timeout: Duration) -> Result<Client, DeliveryError> {
        let mut builder = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("changewatch/", env!("CARGO_PKG_VERSION")));

        if self.proxy.enabled {
            if let Some(url) = &self.proxy.url {
                let mut proxy = reqwest::Proxy::all(url)?;
                if let Some(user) = &self.proxy.username {
                    proxy = proxy.basic_auth(user, self.proxy.password.as_deref().unwrap_or(""));
                }
                builder = builder.proxy(proxy);
            }
        }

        Ok(builder.build()?)
    }
}

impl MessageTransport for HttpTransport {
    fn send(&self, envelope: &Envelope, transport: &TransportConfig) -> Result<(), DeliveryError> {
        match transport {
            TransportConfig::Log => {
                tracing::info!(
                    target: "changewatch::delivery",
                    from = %envelope.from,
                    to = %envelope.to.join(", "),
                    subject = %envelope.subject,
                    attachment = ?envelope.attachment,
                    "{}",
                    envelope.body
                );
                Ok(())
            }
            TransportConfig::Webhook {
                url,
                timeout_secs,
                token,
            } => {
                let client = self.client(Duration::from_secs(*timeout_secs))?;
                let mut request = client.post(url);
                if let Some(token) = token {
                    request = request.bearer_auth(token);
                }

                let request = match &envelope.attachment {
                    Some(path) => {
                        let form = multipart::Form::new()
                            .text("from", envelope.from.clone())
                            .text("to", envelope.to.join(","))
                            .text("subject", envelope.subject.clone())
                            .text("body", envelope.body.clone())
                            .file("attachment", path)?;
                        request.multipart(form)
                    }
                    None => request.json(&serde_json::json!({
                        "from": envelope.from,
                        "to": envelope.to,
                        "subject": envelope.subject,
                        "body": envelope.body,
                    })),
                };

                let response = request.send()?;
                let status = response.status();
                if !status.is_success() {
                    return Err(DeliveryError::Rejected(format!("{url} answered {status}")));
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_transport_always_succeeds() {
        let transport = HttpTransport::default();
        let envelope = Envelope {
            from: "a@example.com".into(),
            to: vec!["b@example.com".into()],
            subject: "WATCHER NOTIFICATION - /data".into(),
            body: "/data >> CREATED FILE a.txt".into(),
            attachment: None,
        };
        assert!(transport.send(&envelope, &TransportConfig::Log).is_ok());
    }
}
