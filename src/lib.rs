//! Actor and webfinger resolution for ActivityPub instances.
//!
//! This crate resolves human-readable handles (`nick@domain`) to federated
//! identities, caches actor documents and webfinger records, serves this
//! instance's own webfinger endpoints and keeps them consistent with actor
//! profile edits.
//!
//! See [RFC 7033](https://datatracker.ietf.org/doc/html/rfc7033) for the
//! WebFinger protocol and the
//! [W3C ActivityPub Specification](https://www.w3.org/TR/activitypub/) for actors.

pub mod actor;
pub mod cache;
pub mod config;
pub mod endpoint;
pub mod fetch;
pub mod handle;
pub mod instance;
pub mod query;
pub mod resolver;
pub mod signature;
pub mod storage;
pub mod sync;
pub mod webfinger;

pub use cache::{ActorCache, Caches, WebfingerCache};
pub use config::Config;
pub use endpoint::{AlternateDomains, EndpointStore};
pub use fetch::{FetchRequest, HttpFetcher, JsonFetcher};
pub use handle::{Handle, PathTemplates, parse_handle};
pub use instance::Instance;
pub use resolver::{ResolveError, ResourceStrategy, Resolver};
pub use sync::Synchronizer;
pub use webfinger::{JrdResource, Link};
