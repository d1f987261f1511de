//! WebFinger documents based on RFC 7033
//!
//! JSON Resource Descriptor types shared by the resolver, the endpoint store
//! and the synchronizer: https://datatracker.ietf.org/doc/html/rfc7033

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Media type of a webfinger response
pub const JRD_CONTENT_TYPE: &str = "application/jrd+json";

pub const REL_AVATAR: &str = "http://webfinger.net/rel/avatar";
pub const REL_BLOG: &str = "http://webfinger.net/rel/blog";
pub const REL_PROFILE_PAGE: &str = "http://webfinger.net/rel/profile-page";
pub const REL_SELF: &str = "self";
pub const REL_MAGIC_PUBLIC_KEY: &str = "magic-public-key";

/// Link object as defined in RFC 7033
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Link {
    /// The "rel" parameter of a link contains a URI that
    /// describes the type of resource being linked
    #[serde(default)]
    pub rel: String,

    /// The "href" parameter of a link contains the target URI
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,

    /// The "type" parameter of a link contains the media type of the target resource
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    /// The "titles" parameter of a link contains human-readable labels for the link
    #[serde(skip_serializing_if = "Option::is_none")]
    pub titles: Option<HashMap<String, String>>,

    /// The "properties" parameter of a link contains additional information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<HashMap<String, Value>>,
}

impl Link {
    pub fn new(rel: &str, href: impl Into<String>, type_: Option<&str>) -> Self {
        Self {
            rel: rel.to_string(),
            href: Some(href.into()),
            type_: type_.map(str::to_string),
            titles: None,
            properties: None,
        }
    }

    /// True when the relation ends with the given `webfinger.net` relation,
    /// regardless of `http`/`https` scheme
    pub fn is_rel(&self, rel: &str) -> bool {
        match rel.split_once("://") {
            Some((_, tail)) => self.rel.ends_with(&format!("://{}", tail)),
            None => self.rel == rel,
        }
    }
}

/// JSON Resource Descriptor (JRD) as defined in RFC 7033
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JrdResource {
    /// The "subject" parameter identifies the entity that the JRD describes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// The "aliases" parameter is an array of zero or more URI strings
    /// that identify the same entity as the "subject" URI
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aliases: Option<Vec<String>>,

    /// The "properties" parameter contains additional information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<HashMap<String, Value>>,

    /// The "links" parameter contains links related to the entity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<Link>>,

    /// Members outside RFC 7033, preserved as-is
    #[serde(flatten)]
    pub additional_properties: Map<String, Value>,
}

impl JrdResource {
    /// Stand-in served when a stored endpoint exists but cannot be parsed
    pub fn placeholder() -> Self {
        let mut additional_properties = Map::new();
        additional_properties.insert("nickname".to_string(), Value::from("unknown"));
        Self {
            additional_properties,
            ..Self::default()
        }
    }

    /// Find a link with the specified relation type
    pub fn find_link(&self, rel: &str) -> Option<&Link> {
        self.links
            .as_ref()
            .and_then(|links| links.iter().find(|link| link.rel == rel))
    }

    /// Find all links with the specified relation type
    pub fn find_links(&self, rel: &str) -> Vec<&Link> {
        self.links.as_ref().map_or(Vec::new(), |links| {
            links.iter().filter(|link| link.rel == rel).collect()
        })
    }

    /// The actor URL advertised by the `self` link
    pub fn actor_url(&self) -> Option<&str> {
        self.links.as_ref()?.iter().find_map(|link| {
            let activity_type = link.type_.as_deref().is_some_and(|t| {
                t == "application/activity+json" || t.starts_with("application/ld+json")
            });
            if link.rel == REL_SELF && activity_type {
                link.href.as_deref()
            } else {
                None
            }
        })
    }

    /// Keep only links whose relation is in `rels`. An empty filter keeps all.
    pub fn filter_links(&mut self, rels: &[&str]) {
        if rels.is_empty() {
            return;
        }
        if let Some(links) = &mut self.links {
            links.retain(|link| rels.contains(&link.rel.as_str()));
        }
    }

    /// Parse a fetched value, rejecting error payloads
    pub fn from_value(value: Value) -> Option<Self> {
        let object = value.as_object()?;
        if object.is_empty() || object.contains_key("error") {
            return None;
        }
        serde_json::from_value(value).ok()
    }
}
