//! Handle parsing for federated account identifiers
//!
//! Accepts the three forms in circulation across the fediverse:
//! - `nick@domain` or `@nick@domain` (`!nick@domain` for group accounts)
//! - `domain/@nick`
//! - actor paths such as `https://domain/users/nick`

use serde::{Deserialize, Serialize};
use std::fmt;

/// Scheme markers stripped from a handle before it is split
pub const PROTOCOL_PREFIXES: &[&str] = &[
    "https://",
    "http://",
    "ftp://",
    "dat://",
    "i2p://",
    "gnunet://",
    "ipfs://",
    "ipns://",
    "hyper://",
    "gemini://",
    "gopher://",
];

/// Actor path segments used by common ActivityPub server implementations
pub const DEFAULT_USER_PATHS: &[&str] = &[
    "/users/",
    "/profile/",
    "/accounts/",
    "/channel/",
    "/u/",
    "/c/",
    "/m/",
    "/video-channels/",
    "/author/",
    "/activitypub/",
    "/actors/",
    "/snac/",
    "/@/",
    "/~/",
    "/fediverse/blog/",
    "/user/",
    "/@",
];

/// Actor path segments which denote a group account
pub const DEFAULT_GROUP_PATHS: &[&str] = &["/c/", "/video-channels/", "/m/"];

/// A parsed account handle
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Handle {
    pub nickname: String,
    /// Domain as written, possibly with a `:port` suffix
    pub domain: String,
    pub is_group: bool,
}

impl Handle {
    /// Domain with any port suffix removed
    pub fn stripped_domain(&self) -> &str {
        remove_domain_port(&self.domain)
    }

    /// Canonical cache key: `nick@domain` without port
    pub fn acct(&self) -> String {
        format!("{}@{}", self.nickname, self.stripped_domain())
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.nickname, self.domain)
    }
}

/// The configured set of actor path templates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathTemplates {
    pub user_paths: Vec<String>,
    pub group_paths: Vec<String>,
}

impl Default for PathTemplates {
    fn default() -> Self {
        Self {
            user_paths: DEFAULT_USER_PATHS.iter().map(|s| s.to_string()).collect(),
            group_paths: DEFAULT_GROUP_PATHS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl PathTemplates {
    /// Parse a handle string into its nickname, domain and group flag.
    ///
    /// Returns `None` when no nickname and domain can be located.
    pub fn parse(&self, handle: &str) -> Option<Handle> {
        if !handle.contains('.') {
            return None;
        }

        let working = strip_protocol(handle);
        let mut is_group = false;

        let (nickname, domain) = if let Some((domain, nickname)) = working.split_once("/@") {
            (nickname, domain)
        } else if working.contains('@') {
            let bare = match working.strip_prefix('!') {
                Some(rest) => {
                    is_group = true;
                    rest
                }
                None => working.as_str(),
            };
            let bare = bare.strip_prefix('@').unwrap_or(bare);
            bare.split_once('@')?
        } else {
            let path = self
                .user_paths
                .iter()
                .chain(self.group_paths.iter())
                .find(|path| working.contains(path.as_str()))?;
            is_group = self.group_paths.contains(path);
            let (domain, nickname) = working.split_once(path.as_str())?;
            (nickname, domain)
        };

        if nickname.is_empty() || domain.is_empty() {
            return None;
        }

        Some(Handle {
            nickname: nickname.to_string(),
            domain: domain.to_string(),
            is_group,
        })
    }

    /// Extract the nickname from an actor URL
    pub fn nickname_from_actor(&self, actor_url: &str) -> Option<String> {
        self.parse(actor_url).map(|handle| handle.nickname)
    }

    /// Extract the domain (with port) from an actor URL
    pub fn domain_from_actor(&self, actor_url: &str) -> Option<String> {
        self.parse(actor_url).map(|handle| handle.domain)
    }
}

/// Parse a handle using the default path templates
pub fn parse_handle(handle: &str) -> Option<Handle> {
    PathTemplates::default().parse(handle)
}

fn strip_protocol(handle: &str) -> String {
    PROTOCOL_PREFIXES
        .iter()
        .fold(handle.to_string(), |acc, prefix| acc.replace(prefix, ""))
}

/// Remove a trailing `:port` from a domain
pub fn remove_domain_port(domain: &str) -> &str {
    match domain.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => domain,
    }
}

/// Append a port to a domain unless it is a default port or already present
pub fn full_domain(domain: &str, port: u16) -> String {
    if port == 0 || port == 80 || port == 443 || domain.contains(':') {
        return domain.to_string();
    }
    format!("{}:{}", domain, port)
}
