//! Webfinger endpoints for local accounts
//!
//! Documents are kept under `<base>/wfendpoints/<nick>@<domain[:port]>.json`
//! and served for `/.well-known/webfinger` requests. Requests addressed to
//! the instance's onion or i2p name are answered from the same file with
//! hosts rewritten.

use crate::handle::{PathTemplates, full_domain, remove_domain_port};
use crate::query::QueryParams;
use crate::storage::{self, StorageError};
use crate::webfinger::{
    JrdResource, Link, REL_AVATAR, REL_BLOG, REL_MAGIC_PUBLIC_KEY, REL_PROFILE_PAGE, REL_SELF,
};
use base64::{Engine, engine::general_purpose::URL_SAFE};
use rsa::RsaPublicKey;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, warn};
use url::Url;

/// Reserved nickname of the instance actor
pub const INSTANCE_ACTOR_NICKNAME: &str = "inbox";

/// Name the instance actor is published under
pub const INSTANCE_ACTOR_NAME: &str = "actor";

pub const WEBFINGER_PATH: &str = "/.well-known/webfinger";

const ENDPOINTS_DIR: &str = "wfendpoints";

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("No local webfinger endpoint for {0}")]
    NotLocal(String),

    #[error("Not a valid endpoint handle: {0:?}")]
    InvalidHandle(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, EndpointError>;

/// Alternative network names this instance is reachable under
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlternateDomains {
    pub onion: Option<String>,
    pub i2p: Option<String>,
}

impl AlternateDomains {
    /// The alternate name matching `host`, if any
    pub fn matching(&self, host: &str) -> Option<&str> {
        [self.onion.as_deref(), self.i2p.as_deref()]
            .into_iter()
            .flatten()
            .find(|alt| *alt == host)
    }
}

/// Filesystem store of this instance's webfinger documents
#[derive(Debug, Clone)]
pub struct EndpointStore {
    base_dir: PathBuf,
    templates: PathTemplates,
}

impl EndpointStore {
    pub fn new(base_dir: impl Into<PathBuf>, templates: PathTemplates) -> Self {
        Self {
            base_dir: base_dir.into(),
            templates,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn endpoints_dir(&self) -> PathBuf {
        self.base_dir.join(ENDPOINTS_DIR)
    }

    /// File holding the document for `nick@domain[:port]`. Handles that
    /// would resolve outside `wfendpoints/` are rejected.
    pub fn endpoint_path(&self, handle: &str) -> Result<PathBuf> {
        storage::document_path(&self.endpoints_dir(), handle)
            .ok_or_else(|| EndpointError::InvalidHandle(handle.to_string()))
    }

    /// Persist a document for a local account.
    ///
    /// The instance actor is additionally stored as `<domain>@<domain>` so
    /// that bare-domain lookups find it.
    pub fn store_endpoint(
        &self,
        nickname: &str,
        domain: &str,
        port: u16,
        document: &JrdResource,
    ) -> Result<()> {
        let full = full_domain(domain, port);
        let mut handles = vec![format!("{}@{}", nickname, full)];
        if nickname == INSTANCE_ACTOR_NICKNAME {
            handles.push(format!("{}@{}", domain, full));
        }

        for handle in handles {
            let path = self.endpoint_path(&handle)?;
            if let Err(e) = storage::save_json(&path, document) {
                error!("Failed to store webfinger endpoint for {}: {}", handle, e);
                return Err(e.into());
            }
            debug!("Stored webfinger endpoint {}", path.display());
        }
        Ok(())
    }

    /// Delete the stored document for `nick@domain[:port]`
    pub fn remove_endpoint(&self, nickname: &str, domain: &str, port: u16) -> Result<bool> {
        let handle = format!("{}@{}", nickname, full_domain(domain, port));
        Ok(storage::remove_file(&self.endpoint_path(&handle)?)?)
    }

    /// Load a stored document, rewriting `clearnet` hosts to `alternate`
    /// when given. A file that cannot be parsed yields the placeholder.
    pub fn load(&self, handle: &str, rewrite: Option<(&str, &str)>) -> Result<JrdResource> {
        let path = self.endpoint_path(handle)?;
        let text = storage::read_text(&path)?
            .ok_or_else(|| EndpointError::NotLocal(handle.to_string()))?;

        let mut document = match serde_json::from_str::<JrdResource>(&text) {
            Ok(document) => document,
            Err(e) => {
                warn!("Malformed webfinger endpoint {}: {}", path.display(), e);
                return Ok(JrdResource::placeholder());
            }
        };

        if let Some((clearnet, alternate)) = rewrite {
            rewrite_hosts(&mut document, clearnet, alternate);
        }
        Ok(document)
    }

    /// Answer a `/.well-known/webfinger?resource=...` request target.
    ///
    /// Returns `None` when the request is malformed or names an account
    /// with no stored endpoint.
    pub fn lookup(
        &self,
        request_target: &str,
        domain: &str,
        alternates: &AlternateDomains,
        port: u16,
    ) -> Option<JrdResource> {
        let path = request_target.split('?').next().unwrap_or_default();
        if path != WEBFINGER_PATH {
            return None;
        }

        let params = QueryParams::from_request_target(request_target);
        let resource = params.first("resource")?.trim();
        let handle = self.resource_handle(resource)?;
        let (nickname, handle_domain) = handle.split_once('@')?;
        if !storage::is_safe_name(nickname) || !storage::is_safe_name(handle_domain) {
            debug!("Rejected webfinger resource {}", resource);
            return None;
        }

        let mut handle_domain = full_domain(handle_domain, port);
        let mut rewrite = None;
        if let Some(alternate) = alternates.matching(remove_domain_port(&handle_domain)) {
            rewrite = Some((domain.to_string(), alternate.to_string()));
            handle_domain = full_domain(domain, port);
        }

        let nickname = if nickname == remove_domain_port(&handle_domain)
            || nickname.eq_ignore_ascii_case(INSTANCE_ACTOR_NAME)
        {
            INSTANCE_ACTOR_NICKNAME
        } else {
            nickname
        };

        let handle = format!("{}@{}", nickname, handle_domain);
        let rewrite = rewrite.as_ref().map(|(c, a)| (c.as_str(), a.as_str()));
        match self.load(&handle, rewrite) {
            Ok(document) => Some(document),
            Err(EndpointError::NotLocal(_)) => {
                debug!("No webfinger endpoint for {}", handle);
                None
            }
            Err(e) => {
                warn!("Webfinger lookup for {} failed: {}", handle, e);
                None
            }
        }
    }

    /// Handle named by a `resource` value: `acct:nick@domain` or an actor URL
    fn resource_handle(&self, resource: &str) -> Option<String> {
        let handle = match resource.get(..5) {
            Some(scheme) if scheme.eq_ignore_ascii_case("acct:") => resource[5..].trim().to_string(),
            _ if resource.starts_with("https://") || resource.starts_with("http://") => {
                let parsed = self.templates.parse(resource)?;
                format!("{}@{}", parsed.nickname, parsed.domain)
            }
            _ => return None,
        };
        handle.contains('@').then_some(handle)
    }
}

/// Build the webfinger document for a local account
pub fn create_endpoint(
    nickname: &str,
    domain: &str,
    port: u16,
    scheme: &str,
    public_key_pem: Option<&str>,
    is_group: bool,
) -> JrdResource {
    let full = full_domain(domain, port);

    let instance_actor = nickname == INSTANCE_ACTOR_NICKNAME || nickname == domain;
    let (person_name, person_id, subject, profile_page) = if instance_actor {
        (
            INSTANCE_ACTOR_NAME.to_string(),
            format!("{}://{}/{}", scheme, full, INSTANCE_ACTOR_NAME),
            format!("acct:{}@{}", domain, domain),
            format!("{}://{}/about/more?instance_actor=true", scheme, full),
        )
    } else {
        (
            nickname.to_string(),
            format!("{}://{}/users/{}", scheme, full, nickname),
            format!("acct:{}@{}", nickname, domain),
            format!("{}://{}/@{}", scheme, full, nickname),
        )
    };

    let person_link = format!("{}://{}/@{}", scheme, full, person_name);
    let blog_url = format!("{}://{}/blog/{}", scheme, full, person_name);

    let mut self_link = Link::new(REL_SELF, person_id.clone(), Some("application/activity+json"));
    if is_group {
        self_link.properties = Some(HashMap::from([(
            "https://www.w3.org/ns/activitystreams#type".to_string(),
            Value::from("Group"),
        )]));
    }

    let mut links = vec![
        Link::new(REL_AVATAR, format!("{}/avatar.png", person_link), Some("image/png")),
        Link::new(REL_BLOG, blog_url, None),
        Link::new(REL_PROFILE_PAGE, profile_page.clone(), Some("text/html")),
        Link::new(REL_PROFILE_PAGE, profile_page, Some("text/vcard")),
        self_link,
    ];

    if let Some(pem) = public_key_pem {
        match magic_public_key(pem) {
            Some(key) => links.push(Link::new(REL_MAGIC_PUBLIC_KEY, key, None)),
            None => warn!("Skipping magic public key for {}@{}: unreadable PEM", nickname, domain),
        }
    }

    JrdResource {
        subject: Some(subject),
        aliases: Some(vec![person_link, person_id]),
        links: Some(links),
        ..JrdResource::default()
    }
}

/// Salmon magic key: `data:application/magic-public-key,RSA.<n>.<e>`
fn magic_public_key(pem: &str) -> Option<String> {
    let key = RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .ok()?;
    Some(format!(
        "data:application/magic-public-key,RSA.{}.{}",
        URL_SAFE.encode(key.n().to_bytes_be()),
        URL_SAFE.encode(key.e().to_bytes_be())
    ))
}

/// Rewrite hosts equal to `from` into `to` in the subject, aliases and
/// link hrefs. Other text is left alone.
pub fn rewrite_hosts(document: &mut JrdResource, from: &str, to: &str) {
    if let Some(subject) = &mut document.subject
        && let Some((account, host)) = subject.rsplit_once('@')
        && remove_domain_port(host) == from
    {
        *subject = format!("{}@{}", account, to);
    }

    if let Some(aliases) = &mut document.aliases {
        for alias in aliases.iter_mut() {
            if let Some(rewritten) = rewrite_url_host(alias, from, to) {
                *alias = rewritten;
            }
        }
    }

    if let Some(links) = &mut document.links {
        for href in links.iter_mut().filter_map(|link| link.href.as_mut()) {
            if let Some(rewritten) = rewrite_url_host(href, from, to) {
                *href = rewritten;
            }
        }
    }
}

fn rewrite_url_host(value: &str, from: &str, to: &str) -> Option<String> {
    let mut url = Url::parse(value).ok()?;
    if url.host_str()? != from {
        return None;
    }
    url.set_host(Some(to)).ok()?;
    Some(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, EndpointStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = EndpointStore::new(dir.path(), PathTemplates::default());
        (dir, store)
    }

    #[test]
    fn test_create_endpoint_for_user() {
        let doc = create_endpoint("bob", "example.com", 443, "https", None, false);
        assert_eq!(doc.subject.as_deref(), Some("acct:bob@example.com"));
        assert_eq!(
            doc.aliases.as_ref().unwrap(),
            &vec![
                "https://example.com/@bob".to_string(),
                "https://example.com/users/bob".to_string()
            ]
        );
        assert_eq!(doc.actor_url(), Some("https://example.com/users/bob"));
        assert_eq!(
            doc.find_link(REL_BLOG).unwrap().href.as_deref(),
            Some("https://example.com/blog/bob")
        );
        let vcards: Vec<_> = doc
            .find_links(REL_PROFILE_PAGE)
            .into_iter()
            .filter(|l| l.type_.as_deref() == Some("text/vcard"))
            .collect();
        assert_eq!(vcards.len(), 1);
        assert!(doc.find_link(REL_SELF).unwrap().properties.is_none());
    }

    #[test]
    fn test_create_endpoint_for_instance_actor() {
        for nickname in ["inbox", "example.com"] {
            let doc = create_endpoint(nickname, "example.com", 8080, "http", None, false);
            assert_eq!(doc.subject.as_deref(), Some("acct:example.com@example.com"));
            assert_eq!(doc.actor_url(), Some("http://example.com:8080/actor"));
            assert_eq!(
                doc.find_link(REL_PROFILE_PAGE).unwrap().href.as_deref(),
                Some("http://example.com:8080/about/more?instance_actor=true")
            );
        }
    }

    #[test]
    fn test_create_endpoint_for_group() {
        let doc = create_endpoint("knitting", "example.com", 443, "https", None, true);
        let props = doc.find_link(REL_SELF).unwrap().properties.as_ref().unwrap();
        assert_eq!(props["https://www.w3.org/ns/activitystreams#type"], "Group");
    }

    #[test]
    fn test_create_endpoint_with_bad_key_skips_magic_link() {
        let doc = create_endpoint("bob", "example.com", 443, "https", Some("garbage"), false);
        assert!(doc.find_link(REL_MAGIC_PUBLIC_KEY).is_none());
    }

    #[test]
    fn test_store_endpoint_instance_alias() {
        let (_dir, store) = store();
        let doc = create_endpoint("inbox", "example.com", 443, "https", None, false);
        store.store_endpoint("inbox", "example.com", 443, &doc).unwrap();
        assert!(store.endpoint_path("inbox@example.com").unwrap().is_file());
        assert!(store.endpoint_path("example.com@example.com").unwrap().is_file());
    }

    #[test]
    fn test_store_endpoint_with_port() {
        let (_dir, store) = store();
        let doc = create_endpoint("bob", "example.com", 8080, "https", None, false);
        store.store_endpoint("bob", "example.com", 8080, &doc).unwrap();
        assert!(store.endpoint_path("bob@example.com:8080").unwrap().is_file());
        assert!(store.remove_endpoint("bob", "example.com", 8080).unwrap());
        assert!(!store.endpoint_path("bob@example.com:8080").unwrap().exists());
    }

    #[test]
    fn test_lookup_variants() {
        let (_dir, store) = store();
        let doc = create_endpoint("bob", "example.com", 443, "https", None, false);
        store.store_endpoint("bob", "example.com", 443, &doc).unwrap();
        let none = AlternateDomains::default();

        for target in [
            "/.well-known/webfinger?resource=acct:bob@example.com",
            "/.well-known/webfinger?resource=acct%3Abob%40example.com",
            "/.well-known/webfinger?resource=acct:bob@example.com&rel=self",
            "/.well-known/webfinger?resource=https://example.com/users/bob",
        ] {
            assert_eq!(store.lookup(target, "example.com", &none, 443), Some(doc.clone()), "{}", target);
        }

        assert!(store.lookup("/.well-known/webfinger?resource=acct:alice@example.com", "example.com", &none, 443).is_none());
        assert!(store.lookup("/.well-known/webfinger?resource=acct:bob", "example.com", &none, 443).is_none());
        assert!(store.lookup("/.well-known/webfinger", "example.com", &none, 443).is_none());
        assert!(store.lookup("/.well-known/nodeinfo?resource=acct:bob@example.com", "example.com", &none, 443).is_none());
    }

    #[test]
    fn test_lookup_instance_actor_aliases() {
        let (_dir, store) = store();
        let doc = create_endpoint("inbox", "example.com", 443, "https", None, false);
        store.store_endpoint("inbox", "example.com", 443, &doc).unwrap();
        let none = AlternateDomains::default();

        for resource in ["actor@example.com", "Actor@example.com", "example.com@example.com", "inbox@example.com"] {
            let target = format!("/.well-known/webfinger?resource=acct:{}", resource);
            assert_eq!(store.lookup(&target, "example.com", &none, 443), Some(doc.clone()), "{}", resource);
        }
    }

    #[test]
    fn test_lookup_onion_rewrites_hosts() {
        let (_dir, store) = store();
        let doc = create_endpoint("bob", "example.com", 443, "https", None, false);
        store.store_endpoint("bob", "example.com", 443, &doc).unwrap();
        let alternates = AlternateDomains {
            onion: Some("abcdef.onion".to_string()),
            i2p: None,
        };

        let served = store
            .lookup("/.well-known/webfinger?resource=acct:bob@abcdef.onion", "example.com", &alternates, 443)
            .unwrap();
        assert_eq!(served.subject.as_deref(), Some("acct:bob@abcdef.onion"));
        assert_eq!(served.actor_url(), Some("https://abcdef.onion/users/bob"));
        assert!(served.aliases.unwrap().iter().all(|a| a.contains("abcdef.onion")));

        let stored: JrdResource = storage::load_json(&store.endpoint_path("bob@example.com").unwrap()).unwrap().unwrap();
        assert_eq!(stored, doc);
    }

    #[test]
    fn test_lookup_malformed_file_yields_placeholder() {
        let (_dir, store) = store();
        std::fs::create_dir_all(store.endpoints_dir()).unwrap();
        std::fs::write(store.endpoint_path("bob@example.com").unwrap(), "{broken").unwrap();

        let served = store
            .lookup("/.well-known/webfinger?resource=acct:bob@example.com", "example.com", &AlternateDomains::default(), 443)
            .unwrap();
        assert_eq!(served, JrdResource::placeholder());
    }

    #[test]
    fn test_lookup_never_leaves_endpoints_dir() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base");
        let store = EndpointStore::new(&base, PathTemplates::default());
        let doc = create_endpoint("alice", "example.com", 443, "https", None, false);
        store.store_endpoint("alice", "example.com", 443, &doc).unwrap();

        storage::save_json(
            &base.join("accounts").join("bob@example.com.json"),
            &serde_json::json!({"secretNote": "private"}),
        )
        .unwrap();
        storage::save_json(
            &dir.path().join("outside@example.com.json"),
            &serde_json::json!({"outside": "leaked"}),
        )
        .unwrap();

        let none = AlternateDomains::default();
        for target in [
            "/.well-known/webfinger?resource=acct:../accounts/bob@example.com",
            "/.well-known/webfinger?resource=acct%3A..%2Faccounts%2Fbob%40example.com",
            "/.well-known/webfinger?resource=acct%3A..%2F..%2Foutside%40example.com",
            "/.well-known/webfinger?resource=acct:bob@..%2Faccounts%2Fexample.com",
            "/.well-known/webfinger?resource=acct:..%5C..%5Coutside@example.com",
            "/.well-known/webfinger?resource=acct:bob%00@example.com",
        ] {
            assert!(store.lookup(target, "example.com", &none, 443).is_none(), "{}", target);
        }

        assert!(matches!(
            store.load("../accounts/bob@example.com", None),
            Err(EndpointError::InvalidHandle(_))
        ));
        assert!(store.store_endpoint("../evil", "example.com", 443, &doc).is_err());
        assert!(!base.join("evil@example.com.json").exists());
    }

    #[test]
    fn test_rewrite_leaves_other_text_alone() {
        let mut doc = JrdResource {
            subject: Some("acct:bob@example.com".to_string()),
            aliases: Some(vec![
                "xmpp:bob@example.com".to_string(),
                "https://notexample.com/example.com".to_string(),
            ]),
            ..JrdResource::default()
        };
        rewrite_hosts(&mut doc, "example.com", "abc.onion");
        assert_eq!(doc.subject.as_deref(), Some("acct:bob@abc.onion"));
        assert_eq!(
            doc.aliases.unwrap(),
            vec!["xmpp:bob@example.com", "https://notexample.com/example.com"]
        );
    }
}
