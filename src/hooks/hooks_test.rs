use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::sync::mpsc;

use super::*;
use crate::test_utils::obj_list;
use crate::DeviceAttrs;
use crate::MemDeviceStore;

struct DenyAll;

impl AuthPolicy for DenyAll {
    fn authenticate(
        &self,
        _client_id: &str,
        _username: Option<&str>,
        _password: Option<&[u8]>,
    ) -> bool {
        false
    }

    fn authorize_publish(
        &self,
        _client_id: &str,
        _topic: &str,
    ) -> bool {
        false
    }

    fn authorize_subscribe(
        &self,
        _client_id: &str,
        _topic: &str,
    ) -> bool {
        false
    }

    fn authorize_forward(
        &self,
        _client_id: &str,
        _topic: &str,
    ) -> bool {
        false
    }
}

fn directory_with(client_id: &str) -> Arc<DeviceDirectory> {
    let (expiry_tx, _) = mpsc::unbounded_channel();
    let (events, _) = broadcast::channel(8);
    let directory = Arc::new(DeviceDirectory::new(
        Arc::new(MemDeviceStore::new()),
        expiry_tx,
        events,
        Duration::from_secs(10),
    ));
    let attrs = DeviceAttrs {
        obj_list: Some(obj_list(&[(3303, &[0])])),
        ..Default::default()
    };
    directory.register(client_id, &attrs).unwrap();
    directory
}

fn account() -> Account {
    Account {
        username: "shep".into(),
        password: "secret".into(),
    }
}

#[tokio::test]
async fn gateway_always_passes() {
    let policy = DefaultAuthPolicy::new("gw", directory_with("dev-1"), Some(account()), Some(Arc::new(DenyAll)));

    assert!(policy.authenticate("gw", None, None));
    assert!(policy.authorize_publish("gw", "request/anyone"));
    assert!(policy.authorize_subscribe("gw", "register/#"));
    assert!(policy.authorize_forward("gw", "notify/dev-1"));
}

#[tokio::test]
async fn default_account_authenticates_anyone() {
    let policy = DefaultAuthPolicy::new("gw", directory_with("dev-1"), Some(account()), None);

    assert!(policy.authenticate("dev-7", Some("shep"), Some(b"secret".as_slice())));
    assert!(!policy.authenticate("dev-7", Some("shep"), Some(b"wrong".as_slice())));
    assert!(!policy.authenticate("dev-7", None, None));
}

#[tokio::test]
async fn without_account_or_app_everyone_authenticates() {
    let policy = DefaultAuthPolicy::new("gw", directory_with("dev-1"), None, None);
    assert!(policy.authenticate("dev-7", None, None));
}

#[tokio::test]
async fn unregistered_client_is_limited_to_its_own_handshake_topics() {
    let policy = DefaultAuthPolicy::new("gw", directory_with("dev-1"), None, None);

    assert!(policy.authorize_publish("dev-7", "register/dev-7"));
    assert!(policy.authorize_publish("dev-7", "/response/dev-7/"));
    assert!(policy.authorize_publish("dev-7", "register.dev-7"));
    assert!(!policy.authorize_publish("dev-7", "register/dev-8"));
    assert!(!policy.authorize_publish("dev-7", "notify/dev-7"));

    assert!(policy.authorize_subscribe("dev-7", "register/response/dev-7"));
    assert!(policy.authorize_subscribe("dev-7", "deregister/response/dev-7"));
    assert!(policy.authorize_subscribe("dev-7", "request/dev-7"));
    assert!(!policy.authorize_subscribe("dev-7", "request/#"));
}

#[tokio::test]
async fn registered_client_is_handed_to_application_policy() {
    let open = DefaultAuthPolicy::new("gw", directory_with("dev-1"), None, None);
    assert!(open.authorize_publish("dev-1", "notify/dev-1"));
    assert!(open.authorize_subscribe("dev-1", "announce"));

    let closed = DefaultAuthPolicy::new("gw", directory_with("dev-1"), None, Some(Arc::new(DenyAll)));
    assert!(!closed.authorize_publish("dev-1", "notify/dev-1"));
    assert!(!closed.authorize_subscribe("dev-1", "announce"));
    assert!(!closed.authorize_forward("dev-1", "notify/dev-1"));
    // handshake topics stay open regardless
    assert!(closed.authorize_publish("dev-1", "register/dev-1"));
}
