//! Wiring of the caches, resolver, endpoint store and synchronizer for one
//! instance

use crate::cache::Caches;
use crate::config::{Config, ConfigError};
use crate::endpoint::{self, EndpointStore};
use crate::fetch::{HttpFetcher, JsonFetcher};
use crate::resolver::Resolver;
use crate::sync::Synchronizer;
use crate::webfinger::JrdResource;
use std::sync::Arc;
use tracing::info;

/// Everything a running instance needs, constructed once at startup
#[derive(Debug)]
pub struct Instance<F> {
    pub config: Config,
    pub caches: Arc<Caches>,
    pub resolver: Resolver<F>,
    pub endpoints: EndpointStore,
    pub synchronizer: Synchronizer,
}

impl Instance<HttpFetcher> {
    /// Build an instance that fetches over HTTP, signing when configured
    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        let mut fetcher = HttpFetcher::new();
        if let Some(key) = config.signing_key()? {
            info!("Signing outbound requests as {}", key.key_id());
            fetcher = fetcher.with_signing_key(key);
        }
        Ok(Self::with_fetcher(config, fetcher))
    }
}

impl<F: JsonFetcher> Instance<F> {
    pub fn with_fetcher(config: Config, fetcher: F) -> Self {
        let caches = Arc::new(Caches::with_base_dir(&config.base_dir));
        let templates = config.templates();
        let resolver = Resolver::new(fetcher, caches.clone(), templates.clone(), &config.scheme);
        let endpoints = EndpointStore::new(config.base_dir.clone(), templates);
        let synchronizer = Synchronizer::new(endpoints.clone(), caches.clone(), &config.domain, config.port);

        Self {
            config,
            caches,
            resolver,
            endpoints,
            synchronizer,
        }
    }

    /// Answer an inbound `/.well-known/webfinger` request target
    pub fn lookup(&self, request_target: &str) -> Option<JrdResource> {
        self.endpoints.lookup(
            request_target,
            &self.config.domain,
            &self.config.alternate_domains(),
            self.config.port,
        )
    }

    /// Resolve a remote handle, attributing the request to this instance
    pub async fn resolve(&self, handle: &str) -> crate::resolver::Result<JrdResource> {
        self.resolver.webfinger(handle, &self.config.domain).await
    }

    /// Create and store the webfinger endpoint of a local account
    pub fn create_account_endpoint(
        &self,
        nickname: &str,
        public_key_pem: Option<&str>,
        is_group: bool,
    ) -> endpoint::Result<JrdResource> {
        let document = endpoint::create_endpoint(
            nickname,
            &self.config.domain,
            self.config.port,
            &self.config.scheme,
            public_key_pem,
            is_group,
        );
        self.endpoints
            .store_endpoint(nickname, &self.config.domain, self.config.port, &document)?;
        Ok(document)
    }

    /// Reconcile a local account's endpoint with its profile
    pub fn resync(&self, nickname: &str) -> bool {
        self.synchronizer
            .resync(nickname, &self.config.domain, self.config.onion_domain.as_deref())
    }

    /// Sweep expired actors from the cache
    pub fn expire_actors(&self) -> usize {
        self.caches.actors.expire()
    }
}
