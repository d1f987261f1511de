//! Handle resolution against remote instances
//!
//! Resolves handles to webfinger documents and actor URLs to actor
//! documents, consulting the shared caches before touching the network and
//! populating them afterwards.

use crate::cache::Caches;
use crate::fetch::{ACTIVITYPUB_CONTENT_TYPE, FetchRequest, JsonFetcher};
use crate::handle::{Handle, PathTemplates};
use crate::webfinger::{JRD_CONTENT_TYPE, JrdResource};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("Not a recognisable handle: {0}")]
    BadHandle(String),

    #[error("Unable to webfinger {0}")]
    Unreachable(String),

    #[error("Actor {0} could not be fetched")]
    ActorUnavailable(String),

    #[error("Webfinger for {0} has no ActivityPub self link")]
    NoSelfLink(String),
}

pub type Result<T> = std::result::Result<T, ResolveError>;

/// How the `resource` parameter of a webfinger query is built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceStrategy {
    /// `acct:<nick>@<domain>`
    Acct,
    /// The input verbatim, or the reconstructed actor IRI when the input
    /// was already in canonical `nick@domain` form (RFC 7033 section 4.5)
    OriginalOrActorIri,
}

impl ResourceStrategy {
    pub fn resource(&self, input: &str, handle: &Handle, scheme: &str) -> String {
        let acct = handle.acct();
        match self {
            ResourceStrategy::Acct => format!("acct:{}", acct),
            ResourceStrategy::OriginalOrActorIri if input == acct => format!(
                "{}://{}/users/{}",
                scheme,
                handle.stripped_domain(),
                handle.nickname
            ),
            ResourceStrategy::OriginalOrActorIri => input.to_string(),
        }
    }
}

/// The default retry policy: `acct:` first, then the actor IRI
pub fn default_strategies() -> Vec<ResourceStrategy> {
    vec![ResourceStrategy::Acct, ResourceStrategy::OriginalOrActorIri]
}

/// Resolves handles and actors through the shared caches
#[derive(Debug)]
pub struct Resolver<F> {
    fetcher: F,
    caches: Arc<Caches>,
    templates: PathTemplates,
    scheme: String,
    strategies: Vec<ResourceStrategy>,
}

impl<F: JsonFetcher> Resolver<F> {
    pub fn new(fetcher: F, caches: Arc<Caches>, templates: PathTemplates, scheme: &str) -> Self {
        Self {
            fetcher,
            caches,
            templates,
            scheme: scheme.to_string(),
            strategies: default_strategies(),
        }
    }

    /// Replace the retry policy
    pub fn with_strategies(mut self, strategies: Vec<ResourceStrategy>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn strategies(&self) -> &[ResourceStrategy] {
        &self.strategies
    }

    pub fn caches(&self) -> &Arc<Caches> {
        &self.caches
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Resolve a handle or actor URL to its webfinger document.
    ///
    /// Issues at most one request per configured strategy and stops at the
    /// first usable document.
    pub async fn webfinger(&self, input: &str, origin_domain: &str) -> Result<JrdResource> {
        let handle = self
            .templates
            .parse(input)
            .ok_or_else(|| ResolveError::BadHandle(input.to_string()))?;
        let key = handle.acct();

        if let Some(cached) = self.caches.webfingers.get(&key) {
            debug!("Webfinger cache hit for {}", key);
            return Ok(cached);
        }

        let url = format!("{}://{}/.well-known/webfinger", self.scheme, handle.domain);
        let mut last_request = None;

        for strategy in &self.strategies {
            let resource = strategy.resource(input, &handle, &self.scheme);
            let request = FetchRequest::new(url.clone(), origin_domain, &self.scheme)
                .header("Accept", JRD_CONTENT_TYPE)
                .param("resource", &resource);

            match self.fetcher.get_json(&request).await {
                Ok(value) => {
                    if let Some(document) = JrdResource::from_value(value) {
                        self.caches.webfingers.store(&key, document.clone());
                        return Ok(document);
                    }
                    debug!("Unusable webfinger response for resource {}", resource);
                }
                Err(e) => debug!("Webfinger request for resource {} failed: {}", resource, e),
            }
            last_request = Some(request);
        }

        let (headers, params) = last_request
            .map(|r| (r.headers, r.params))
            .unwrap_or_default();
        warn!(
            "Unable to webfinger {} from_domain: {} nickname: {} handle: {} wf_handle: {} domain: {} headers: {:?} params: {:?}",
            url, origin_domain, handle.nickname, input, key, handle.domain, headers, params
        );
        Err(ResolveError::Unreachable(input.to_string()))
    }

    /// Resolve a handle to the actor URL advertised by its `self` link
    pub async fn actor_url(&self, input: &str, origin_domain: &str) -> Result<String> {
        let document = self.webfinger(input, origin_domain).await?;
        document
            .actor_url()
            .map(str::to_string)
            .ok_or_else(|| ResolveError::NoSelfLink(input.to_string()))
    }

    /// Fetch an actor document, serving it from the actor cache when possible
    pub async fn actor(&self, actor_url: &str, origin_domain: &str) -> Result<Value> {
        if let Some(actor) = self.caches.actors.get(actor_url) {
            return Ok(actor);
        }

        let url = actor_url.split('#').next().unwrap_or(actor_url);
        let request = FetchRequest::new(url, origin_domain, &self.scheme)
            .header("Accept", ACTIVITYPUB_CONTENT_TYPE);

        match self.fetcher.get_json(&request).await {
            Ok(actor) if actor.is_object() && actor.get("error").is_none() => {
                self.caches.actors.store(url, actor.clone());
                Ok(actor)
            }
            Ok(_) => {
                warn!("Actor {} returned an unusable document", url);
                Err(ResolveError::ActorUnavailable(url.to_string()))
            }
            Err(e) => {
                warn!("Failed to fetch actor {}: {}", url, e);
                Err(ResolveError::ActorUnavailable(url.to_string()))
            }
        }
    }

    /// Public key PEM for a key id such as `https://host/users/nick#main-key`
    pub async fn public_key_pem(&self, key_id: &str, origin_domain: &str) -> Result<String> {
        let actor = self.actor(key_id, origin_domain).await?;
        actor
            .get("publicKey")
            .and_then(|key| key.get("publicKeyPem"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ResolveError::ActorUnavailable(key_id.to_string()))
    }
}
