//! The subset of an ActivityPub actor document needed for identity records
//!
//! See the [W3C ActivityPub Specification](https://www.w3.org/TR/activitypub/#actor-objects).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Profile icon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Icon {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

/// Public key advertised for HTTP signature verification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKey {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub public_key_pem: String,
}

/// Profile attachment. The shape is defined by whichever server produced it,
/// so it is kept as an untyped map.
pub type Attachment = Map<String, Value>;

/// Actor document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorDocument {
    pub id: String,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub actor_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,

    /// Profile page, either a plain string or a link object
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<Icon>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachment: Vec<Attachment>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<PublicKey>,

    #[serde(flatten)]
    pub additional_properties: Map<String, Value>,
}

impl ActorDocument {
    /// Profile page URL as a string
    pub fn profile_url(&self) -> Option<&str> {
        match self.url.as_ref()? {
            Value::String(url) => Some(url.as_str()),
            Value::Object(link) => link.get("href").and_then(Value::as_str),
            Value::Array(items) => items.iter().find_map(|item| match item {
                Value::String(url) => Some(url.as_str()),
                Value::Object(link) => link.get("href").and_then(Value::as_str),
                _ => None,
            }),
            _ => None,
        }
    }

    /// Blog URL derived from the actor id: `<prefix>/blog/<nick>`
    pub fn blog_url(&self) -> Option<String> {
        blog_url_for(&self.id)
    }
}

/// Derive the blog URL from an actor id split on `/users/` or `/@`
pub fn blog_url_for(actor_id: &str) -> Option<String> {
    let (prefix, nickname) = actor_id
        .split_once("/users/")
        .or_else(|| actor_id.split_once("/@"))?;
    Some(format!("{}/blog/{}", prefix, nickname))
}

/// Name of a profile attachment, from `name` or `schema:name`
pub fn attachment_name(attachment: &Attachment) -> Option<&str> {
    ["name", "schema:name"]
        .iter()
        .find_map(|key| attachment.get(*key).and_then(Value::as_str))
}

/// Value of a profile attachment from the first populated value key
pub fn attachment_value(attachment: &Attachment) -> Option<&str> {
    ["value", "schema:value", "http://schema.org#value", "href"]
        .iter()
        .find_map(|key| attachment.get(*key).and_then(Value::as_str))
        .filter(|value| !value.is_empty())
}

/// True when the attachment is a `PropertyValue`
pub fn is_property_value(attachment: &Attachment) -> bool {
    attachment
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|t| t.ends_with("PropertyValue"))
}
