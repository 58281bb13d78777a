//! Extension points the application plugs into the gateway.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;

use crate::DeviceDirectory;
use crate::DeviceRecord;
use crate::Result;

/// Payload encryption. Inbound payloads pass through `decrypt` before they
/// are decoded, outbound ones through `encrypt` after they are encoded.
#[cfg_attr(test, automock)]
pub trait Crypto: Send + Sync + 'static {
    fn encrypt(
        &self,
        client_id: &str,
        payload: Bytes,
    ) -> Result<Bytes>;

    fn decrypt(
        &self,
        client_id: &str,
        payload: Bytes,
    ) -> Result<Bytes>;
}

/// Leaves payloads untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityCrypto;

impl Crypto for IdentityCrypto {
    fn encrypt(
        &self,
        _client_id: &str,
        payload: Bytes,
    ) -> Result<Bytes> {
        Ok(payload)
    }

    fn decrypt(
        &self,
        _client_id: &str,
        payload: Bytes,
    ) -> Result<Bytes> {
        Ok(payload)
    }
}

/// Decides whether a device that registers for the first time may join.
///
/// The gateway bounds the decision with the configured acceptance timeout;
/// an error or a timeout rejects the device.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DeviceAcceptor: Send + Sync + 'static {
    async fn accept(
        &self,
        device: &DeviceRecord,
    ) -> Result<bool>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

#[async_trait]
impl DeviceAcceptor for AcceptAll {
    async fn accept(
        &self,
        _device: &DeviceRecord,
    ) -> Result<bool> {
        Ok(true)
    }
}

/// Access decisions an embedding broker asks for. Every method allows by
/// default.
pub trait AuthPolicy: Send + Sync + 'static {
    fn authenticate(
        &self,
        _client_id: &str,
        _username: Option<&str>,
        _password: Option<&[u8]>,
    ) -> bool {
        true
    }

    fn authorize_publish(
        &self,
        _client_id: &str,
        _topic: &str,
    ) -> bool {
        true
    }

    fn authorize_subscribe(
        &self,
        _client_id: &str,
        _topic: &str,
    ) -> bool {
        true
    }

    fn authorize_forward(
        &self,
        _client_id: &str,
        _topic: &str,
    ) -> bool {
        true
    }
}

/// Username and password every client may authenticate with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub username: String,
    pub password: String,
}

/// Gateway-aware policy wrapped around an optional application policy.
///
/// The gateway itself always passes. Before registering, a client may only
/// publish to its own `register` and `response` topics and subscribe to its
/// own `register/response`, `deregister/response` and `request` topics.
/// Registered clients are handed to the application policy.
pub struct DefaultAuthPolicy {
    gateway_id: String,
    directory: Arc<DeviceDirectory>,
    account: Option<Account>,
    app: Option<Arc<dyn AuthPolicy>>,
}

impl DefaultAuthPolicy {
    pub fn new(
        gateway_id: &str,
        directory: Arc<DeviceDirectory>,
        account: Option<Account>,
        app: Option<Arc<dyn AuthPolicy>>,
    ) -> Self {
        Self {
            gateway_id: gateway_id.to_string(),
            directory,
            account,
            app,
        }
    }

    fn is_gateway(
        &self,
        client_id: &str,
    ) -> bool {
        client_id == self.gateway_id
    }
}

/// `a.b/c/` and `/a/b/c` both become `a/b/c`.
fn slash_path(topic: &str) -> String {
    topic.replace('.', "/").trim_matches('/').to_string()
}

impl AuthPolicy for DefaultAuthPolicy {
    fn authenticate(
        &self,
        client_id: &str,
        username: Option<&str>,
        password: Option<&[u8]>,
    ) -> bool {
        if self.is_gateway(client_id) {
            return true;
        }
        if let Some(account) = &self.account {
            if username == Some(account.username.as_str())
                && password == Some(account.password.as_bytes())
            {
                return true;
            }
        }
        match (&self.app, &self.account) {
            (Some(app), _) => app.authenticate(client_id, username, password),
            (None, None) => true,
            (None, Some(_)) => false,
        }
    }

    fn authorize_publish(
        &self,
        client_id: &str,
        topic: &str,
    ) -> bool {
        if self.is_gateway(client_id) {
            return true;
        }
        let topic = slash_path(topic);
        if topic == format!("register/{client_id}") || topic == format!("response/{client_id}") {
            return true;
        }
        if !self.directory.contains(client_id) {
            return false;
        }
        self.app
            .as_ref()
            .map_or(true, |app| app.authorize_publish(client_id, &topic))
    }

    fn authorize_subscribe(
        &self,
        client_id: &str,
        topic: &str,
    ) -> bool {
        if self.is_gateway(client_id) {
            return true;
        }
        let topic = slash_path(topic);
        if topic == format!("register/response/{client_id}")
            || topic == format!("deregister/response/{client_id}")
            || topic == format!("request/{client_id}")
        {
            return true;
        }
        if !self.directory.contains(client_id) {
            return false;
        }
        self.app
            .as_ref()
            .map_or(true, |app| app.authorize_subscribe(client_id, &topic))
    }

    fn authorize_forward(
        &self,
        client_id: &str,
        topic: &str,
    ) -> bool {
        if self.is_gateway(client_id) {
            return true;
        }
        self.app
            .as_ref()
            .map_or(true, |app| app.authorize_forward(client_id, topic))
    }
}

#[cfg(test)]
mod hooks_test;
