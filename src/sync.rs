//! Keeps stored webfinger documents in step with actor profiles
//!
//! When an account edits its profile, the federated identity attachments,
//! avatar, vcard and blog links published through webfinger are reconciled
//! against the actor document. Every rule is idempotent.

use crate::actor::{ActorDocument, attachment_name, attachment_value, is_property_value};
use crate::cache::Caches;
use crate::endpoint::EndpointStore;
use crate::handle::full_domain;
use crate::storage;
use crate::webfinger::{JrdResource, Link, REL_AVATAR, REL_BLOG, REL_PROFILE_PAGE};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Profile attachment names and the alias scheme each is published under
pub const IDENTITY_ALIASES: &[(&str, &str)] = &[
    ("xmpp", "xmpp"),
    ("matrix", "matrix"),
    ("email", "mailto"),
    ("ssb", "ssb"),
    ("briar", "briar"),
    ("cwtch", "cwtch"),
    ("jami", "jami"),
    ("tox", "toxId"),
];

fn alias_scheme(name: &str) -> Option<&'static str> {
    let name = name.to_lowercase();
    IDENTITY_ALIASES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, scheme)| *scheme)
}

/// Strip URL and alias schemes from an attachment value
fn normalise_value<'a>(value: &'a str, scheme: &str) -> &'a str {
    let value = value.trim();
    let value = value.split_once("://").map_or(value, |(_, rest)| rest);
    value
        .strip_prefix(scheme)
        .and_then(|rest| rest.strip_prefix(':'))
        .unwrap_or(value)
}

/// Upsert `<scheme>:<value>` aliases from profile attachments and prune
/// aliases whose attachment has gone
pub fn update_aliases(document: &mut JrdResource, actor: &ActorDocument) -> bool {
    let aliases = document.aliases.get_or_insert_with(Vec::new);
    let mut changed = false;
    let mut not_found: Vec<&str> = IDENTITY_ALIASES.iter().map(|(_, scheme)| *scheme).collect();

    for attachment in &actor.attachment {
        let Some(scheme) = attachment_name(attachment).and_then(alias_scheme) else {
            continue;
        };
        not_found.retain(|s| *s != scheme);

        if !is_property_value(attachment) {
            continue;
        }
        let Some(value) = attachment_value(attachment) else {
            continue;
        };
        let value = normalise_value(value, scheme);
        if value.is_empty() {
            continue;
        }

        let prefix = format!("{}:", scheme);
        let new_alias = format!("{}{}", prefix, value);
        match aliases.iter_mut().find(|alias| alias.starts_with(&prefix)) {
            Some(alias) if *alias != new_alias => {
                *alias = new_alias;
                changed = true;
            }
            Some(_) => {}
            None => {
                aliases.push(new_alias);
                changed = true;
            }
        }
    }

    let before = aliases.len();
    aliases.retain(|alias| {
        !not_found
            .iter()
            .any(|scheme| alias.starts_with(&format!("{}:", scheme)))
    });
    changed || aliases.len() != before
}

/// Add or refresh the avatar link from the actor icon
pub fn update_avatar(document: &mut JrdResource, actor: &ActorDocument) -> bool {
    let Some(icon) = &actor.icon else {
        return false;
    };
    let links = document.links.get_or_insert_with(Vec::new);

    match links.iter_mut().find(|link| link.is_rel(REL_AVATAR)) {
        Some(link) => {
            if link.href.as_deref() == Some(icon.url.as_str()) && link.type_ == icon.media_type {
                return false;
            }
            link.href = Some(icon.url.clone());
            link.type_ = icon.media_type.clone();
            true
        }
        None => {
            links.push(Link::new(REL_AVATAR, icon.url.clone(), icon.media_type.as_deref()));
            true
        }
    }
}

/// Add a vcard profile link if none exists
pub fn update_vcard(document: &mut JrdResource, actor: &ActorDocument) -> bool {
    let Some(profile_url) = actor.profile_url() else {
        return false;
    };
    let links = document.links.get_or_insert_with(Vec::new);
    if links.iter().any(|link| link.type_.as_deref() == Some("text/vcard")) {
        return false;
    }
    links.push(Link::new(REL_PROFILE_PAGE, profile_url, Some("text/vcard")));
    true
}

/// Add or refresh the blog link derived from the actor id
pub fn update_blog_link(document: &mut JrdResource, actor: &ActorDocument) -> bool {
    let Some(blog_url) = actor.blog_url() else {
        return false;
    };
    let links = document.links.get_or_insert_with(Vec::new);

    match links.iter_mut().find(|link| link.is_rel(REL_BLOG)) {
        Some(link) if link.href.as_deref() == Some(blog_url.as_str()) => false,
        Some(link) => {
            link.href = Some(blog_url);
            true
        }
        None => {
            links.push(Link::new(REL_BLOG, blog_url, None));
            true
        }
    }
}

/// Apply every reconciliation rule. Returns true if anything changed.
pub fn update_from_profile(document: &mut JrdResource, actor: &ActorDocument) -> bool {
    let aliases = update_aliases(document, actor);
    let avatar = update_avatar(document, actor);
    let vcard = update_vcard(document, actor);
    let blog = update_blog_link(document, actor);
    aliases || avatar || vcard || blog
}

/// Reconciles stored endpoints with `<base>/accounts/<nick>@<domain>.json`
#[derive(Debug, Clone)]
pub struct Synchronizer {
    store: EndpointStore,
    caches: Arc<Caches>,
    domain: String,
    port: u16,
}

impl Synchronizer {
    /// `domain` and `port` are this instance's clearnet name
    pub fn new(store: EndpointStore, caches: Arc<Caches>, domain: &str, port: u16) -> Self {
        Self {
            store,
            caches,
            domain: domain.to_string(),
            port,
        }
    }

    /// `None` when the nickname or domain would leave `accounts/`
    pub fn account_path(&self, nickname: &str, domain: &str) -> Option<PathBuf> {
        storage::document_path(
            &self.store.base_dir().join("accounts"),
            &format!("{}@{}", nickname, domain),
        )
    }

    /// Reconcile the endpoint of `nickname@domain` with its profile.
    ///
    /// A handle on the onion name maps to the clearnet account, whose file
    /// holds the canonical document. Returns true when the document changed
    /// and was saved.
    pub fn resync(&self, nickname: &str, domain: &str, onion_domain: Option<&str>) -> bool {
        let domain = match onion_domain {
            Some(onion) if onion == domain => self.domain.as_str(),
            _ => domain,
        };
        let handle = format!("{}@{}", nickname, domain);
        let endpoint_handle = format!("{}@{}", nickname, full_domain(domain, self.port));

        let (Ok(path), Some(actor_path)) = (
            self.store.endpoint_path(&endpoint_handle),
            self.account_path(nickname, domain),
        ) else {
            warn!("Refusing to resync invalid handle {:?}", handle);
            return false;
        };

        let mut document: JrdResource = match storage::load_json(&path) {
            Ok(Some(document)) => document,
            Ok(None) => {
                debug!("No webfinger endpoint to resync for {}", endpoint_handle);
                return false;
            }
            Err(e) => {
                warn!("Unreadable webfinger endpoint for {}: {}", endpoint_handle, e);
                return false;
            }
        };

        let actor: ActorDocument = match storage::load_json(&actor_path) {
            Ok(Some(actor)) => actor,
            Ok(None) => {
                debug!("No actor profile at {}", actor_path.display());
                return false;
            }
            Err(e) => {
                warn!("Unreadable actor profile for {}: {}", handle, e);
                return false;
            }
        };

        if !update_from_profile(&mut document, &actor) {
            return false;
        }

        if let Err(e) = storage::save_json(&path, &document) {
            error!("Failed to save resynced webfinger for {}: {}", handle, e);
            return false;
        }
        self.caches.webfingers.store(&handle, document);
        debug!("Resynced webfinger endpoint for {}", handle);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn actor(value: serde_json::Value) -> ActorDocument {
        serde_json::from_value(value).unwrap()
    }

    fn empty_doc() -> JrdResource {
        JrdResource {
            subject: Some("acct:bob@example.com".to_string()),
            aliases: Some(vec![]),
            links: Some(vec![]),
            ..JrdResource::default()
        }
    }

    #[test]
    fn test_alias_upsert_preserves_position() {
        let mut doc = empty_doc();
        doc.aliases = Some(vec![
            "https://example.com/users/bob".to_string(),
            "xmpp:old@xmpp.example".to_string(),
            "https://example.com/@bob".to_string(),
        ]);
        let a = actor(json!({
            "id": "https://example.com/users/bob",
            "attachment": [{"type": "PropertyValue", "name": "XMPP", "value": "xmpp://bob@xmpp.example"}]
        }));

        assert!(update_aliases(&mut doc, &a));
        assert_eq!(doc.aliases.as_ref().unwrap()[1], "xmpp:bob@xmpp.example");
        assert_eq!(doc.aliases.as_ref().unwrap().len(), 3);
        assert!(!update_aliases(&mut doc, &a));
    }

    #[test]
    fn test_stale_aliases_are_pruned() {
        let mut doc = empty_doc();
        doc.aliases = Some(vec![
            "https://example.com/users/bob".to_string(),
            "matrix:@bob:example.com".to_string(),
            "mailto:bob@example.com".to_string(),
        ]);
        let a = actor(json!({
            "id": "https://example.com/users/bob",
            "attachment": [{"type": "PropertyValue", "name": "Email", "value": "mailto:bob@example.com"}]
        }));

        assert!(update_aliases(&mut doc, &a));
        assert_eq!(
            doc.aliases.unwrap(),
            vec!["https://example.com/users/bob", "mailto:bob@example.com"]
        );
    }

    #[test]
    fn test_named_attachment_without_value_keeps_alias() {
        let mut doc = empty_doc();
        doc.aliases = Some(vec!["toxId:ABCDEF".to_string()]);
        let a = actor(json!({
            "id": "https://example.com/users/bob",
            "attachment": [{"type": "PropertyValue", "name": "tox", "value": ""}]
        }));
        assert!(!update_aliases(&mut doc, &a));
        assert_eq!(doc.aliases.unwrap(), vec!["toxId:ABCDEF"]);
    }

    #[test]
    fn test_non_property_value_is_ignored() {
        let mut doc = empty_doc();
        let a = actor(json!({
            "id": "https://example.com/users/bob",
            "attachment": [{"type": "Link", "name": "matrix", "href": "https://matrix.to/#/@bob:example.com"}]
        }));
        assert!(!update_aliases(&mut doc, &a));
        assert!(doc.aliases.unwrap().is_empty());
    }

    #[test]
    fn test_avatar_refresh_in_place() {
        let mut doc = empty_doc();
        doc.links = Some(vec![
            Link::new("self", "https://example.com/users/bob", Some("application/activity+json")),
            Link::new(REL_AVATAR, "https://example.com/old.png", Some("image/png")),
        ]);
        let a = actor(json!({
            "id": "https://example.com/users/bob",
            "icon": {"type": "Image", "url": "https://example.com/new.webp", "mediaType": "image/webp"}
        }));

        assert!(update_avatar(&mut doc, &a));
        let links = doc.links.as_ref().unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[1].href.as_deref(), Some("https://example.com/new.webp"));
        assert_eq!(links[1].type_.as_deref(), Some("image/webp"));
        assert!(!update_avatar(&mut doc, &a));
    }

    #[test]
    fn test_missing_icon_and_url_are_skipped() {
        let mut doc = empty_doc();
        let a = actor(json!({"id": "https://example.com/actor"}));
        assert!(!update_from_profile(&mut doc, &a));
        assert!(doc.links.unwrap().is_empty());
    }

    #[test]
    fn test_blog_link_update() {
        let mut doc = empty_doc();
        doc.links = Some(vec![Link::new(REL_BLOG, "https://old.example/blog/bob", None)]);
        let a = actor(json!({"id": "https://example.com/@bob"}));
        assert!(update_blog_link(&mut doc, &a));
        assert_eq!(
            doc.links.as_ref().unwrap()[0].href.as_deref(),
            Some("https://example.com/blog/bob")
        );
        assert!(!update_blog_link(&mut doc, &a));
    }

    #[test]
    fn test_vcard_only_added_once() {
        let mut doc = empty_doc();
        let a = actor(json!({"id": "https://example.com/users/bob", "url": "https://example.com/@bob"}));
        assert!(update_vcard(&mut doc, &a));
        assert!(!update_vcard(&mut doc, &a));
        assert_eq!(doc.links.unwrap().len(), 1);
    }

    #[test]
    fn test_traversing_handles_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = EndpointStore::new(dir.path(), crate::handle::PathTemplates::default());
        let sync = Synchronizer::new(store, Arc::new(Caches::new(crate::cache::ActorCache::new())), "example.com", 443);

        assert_eq!(
            sync.account_path("bob", "example.com"),
            Some(dir.path().join("accounts").join("bob@example.com.json"))
        );
        assert!(sync.account_path("../wfendpoints/bob", "example.com").is_none());
        assert!(sync.account_path("bob", "example.com/..").is_none());
        assert!(!sync.resync("../../bob", "example.com", None));
    }
}
