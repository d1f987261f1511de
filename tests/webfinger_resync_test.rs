//! Integration tests for reconciling stored webfinger endpoints with actor
//! profiles

use fingerpost::config::Config;
use fingerpost::instance::Instance;
use fingerpost::storage;
use fingerpost::webfinger::{JrdResource, REL_AVATAR, REL_BLOG};
use fingerpost::{HttpFetcher, Synchronizer};
use serde_json::{Value, json};
use std::path::Path;

fn instance(base_dir: &Path) -> Instance<HttpFetcher> {
    let config = Config {
        base_dir: base_dir.to_path_buf(),
        domain: "example.com".to_string(),
        ..Config::default()
    };
    Instance::with_fetcher(config, HttpFetcher::new())
}

fn write_json(path: &Path, value: &Value) {
    storage::save_json(path, value).unwrap();
}

fn bob_actor() -> Value {
    json!({
        "id": "https://example.com/users/bob",
        "type": "Person",
        "preferredUsername": "bob",
        "url": "https://example.com/@bob",
        "icon": {"type": "Image", "url": "https://example.com/avatar.png", "mediaType": "image/png"},
        "attachment": [
            {"name": "xmpp", "type": "PropertyValue", "value": "bob@xmpp.example"}
        ]
    })
}

fn setup(base_dir: &Path) -> Instance<HttpFetcher> {
    let instance = instance(base_dir);
    write_json(
        &instance.synchronizer.account_path("bob", "example.com").unwrap(),
        &bob_actor(),
    );
    write_json(
        &instance.endpoints.endpoint_path("bob@example.com").unwrap(),
        &json!({"subject": "acct:bob@example.com", "aliases": [], "links": []}),
    );
    instance
}

#[test]
fn test_resync_populates_empty_document() {
    let dir = tempfile::tempdir().unwrap();
    let instance = setup(dir.path());

    assert!(instance.resync("bob"));

    let stored: JrdResource = storage::load_json(&instance.endpoints.endpoint_path("bob@example.com").unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(stored.aliases.as_ref().unwrap(), &vec!["xmpp:bob@xmpp.example".to_string()]);

    let links = stored.links.as_ref().unwrap();
    let avatars: Vec<_> = links.iter().filter(|l| l.rel == REL_AVATAR).collect();
    assert_eq!(avatars.len(), 1);
    assert_eq!(avatars[0].href.as_deref(), Some("https://example.com/avatar.png"));
    assert_eq!(avatars[0].type_.as_deref(), Some("image/png"));

    let vcards: Vec<_> = links.iter().filter(|l| l.type_.as_deref() == Some("text/vcard")).collect();
    assert_eq!(vcards.len(), 1);
    assert_eq!(vcards[0].href.as_deref(), Some("https://example.com/@bob"));

    let blogs: Vec<_> = links.iter().filter(|l| l.rel == REL_BLOG).collect();
    assert_eq!(blogs.len(), 1);
    assert_eq!(blogs[0].href.as_deref(), Some("https://example.com/blog/bob"));
    assert_eq!(links.len(), 3);

    assert_eq!(instance.caches.webfingers.get("bob@example.com"), Some(stored));
}

#[test]
fn test_resync_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let instance = setup(dir.path());
    let path = instance.endpoints.endpoint_path("bob@example.com").unwrap();

    assert!(instance.resync("bob"));
    let first = std::fs::read(&path).unwrap();

    assert!(!instance.resync("bob"));
    assert_eq!(std::fs::read(&path).unwrap(), first);
}

#[test]
fn test_resync_follows_profile_edits() {
    let dir = tempfile::tempdir().unwrap();
    let instance = setup(dir.path());
    assert!(instance.resync("bob"));

    let mut actor = bob_actor();
    actor["icon"]["url"] = json!("https://example.com/new-avatar.webp");
    actor["icon"]["mediaType"] = json!("image/webp");
    actor["attachment"] = json!([
        {"name": "Matrix", "type": "PropertyValue", "value": "@bob:matrix.example"}
    ]);
    write_json(&instance.synchronizer.account_path("bob", "example.com").unwrap(), &actor);

    assert!(instance.resync("bob"));
    let cached = instance.caches.webfingers.get("bob@example.com").unwrap();
    assert_eq!(cached.aliases.unwrap(), vec!["matrix:@bob:matrix.example"]);
    let avatar = cached.links.as_ref().unwrap().iter().find(|l| l.rel == REL_AVATAR).unwrap();
    assert_eq!(avatar.href.as_deref(), Some("https://example.com/new-avatar.webp"));
}

#[test]
fn test_resync_without_files_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let instance = instance(dir.path());
    assert!(!instance.resync("bob"));

    write_json(
        &instance.endpoints.endpoint_path("bob@example.com").unwrap(),
        &json!({"subject": "acct:bob@example.com"}),
    );
    assert!(!instance.resync("bob"));
    assert!(instance.caches.webfingers.is_empty());
}

#[test]
fn test_resync_onion_handle_updates_clearnet_file() {
    let dir = tempfile::tempdir().unwrap();
    let instance = setup(dir.path());
    let synchronizer: &Synchronizer = &instance.synchronizer;

    assert!(synchronizer.resync("bob", "abcdef.onion", Some("abcdef.onion")));
    let stored: JrdResource = storage::load_json(&instance.endpoints.endpoint_path("bob@example.com").unwrap())
        .unwrap()
        .unwrap();
    assert!(stored.links.unwrap().iter().all(|l| !l.href.as_deref().unwrap_or("").contains(".onion")));
}
