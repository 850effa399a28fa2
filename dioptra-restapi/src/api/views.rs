//! JSON shapes shared by every resource endpoint
//!
//! Refs are the compact form used when one object points at another;
//! [`ResourceView`] wraps a type's own fields with the ownership, timing
//! and tag information every resource carries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::resources::{ResourceIdentity, ResourceType};
use crate::db::tags::TagRecord;
use crate::API_V1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRef {
    pub id: i64,
    pub username: String,
    pub url: String,
}

impl UserRef {
    pub fn new(id: i64, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            url: format!("{}/users/{}", API_V1, id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupRef {
    pub id: i64,
    pub name: String,
    pub url: String,
}

impl GroupRef {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            url: format!("{}/groups/{}", API_V1, id),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TagRef {
    pub id: i64,
    pub name: String,
    pub group: GroupRef,
    pub url: String,
}

impl From<&TagRecord> for TagRef {
    fn from(tag: &TagRecord) -> Self {
        Self {
            id: tag.tag_id,
            name: tag.name.clone(),
            group: GroupRef::new(tag.group_id, tag.group_name.clone()),
            url: format!("{}/tags/{}", API_V1, tag.tag_id),
        }
    }
}

/// Compact reference to another resource
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    pub id: i64,
    pub resource_type: &'static str,
    pub group: GroupRef,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ResourceRef {
    /// None for rows whose type column is not a known resource type
    pub fn from_identity(identity: &ResourceIdentity) -> Option<Self> {
        let ty = ResourceType::parse(&identity.resource_type)?;
        Some(Self {
            id: identity.resource_id,
            resource_type: ty.as_str(),
            group: GroupRef::new(identity.group_id, identity.group_name.clone()),
            url: resource_url(ty, identity.resource_id, identity.parent_id),
            name: identity.name.clone(),
        })
    }
}

/// Route of the collection holding a top-level resource type
pub fn collection_url(ty: ResourceType) -> String {
    let segment = match ty {
        ResourceType::Queue => "queues",
        ResourceType::Experiment => "experiments",
        ResourceType::Model => "models",
        ResourceType::Artifact => "artifacts",
        ResourceType::Plugin | ResourceType::PluginFile => "plugins",
        ResourceType::PluginParameterType => "pluginParameterTypes",
        ResourceType::Job => "jobs",
    };
    format!("{}/{}", API_V1, segment)
}

/// Canonical URL of a resource; plugin files live under their plugin
pub fn resource_url(ty: ResourceType, id: i64, parent_id: Option<i64>) -> String {
    match (ty, parent_id) {
        (ResourceType::PluginFile, Some(plugin_id)) => {
            format!("{}/plugins/{}/files/{}", API_V1, plugin_id, id)
        }
        _ => format!("{}/{}", collection_url(ty), id),
    }
}

/// A resource snapshot with its type-specific body flattened in
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceView<B> {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<i64>,
    pub group: GroupRef,
    pub user: UserRef,
    pub created_on: DateTime<Utc>,
    pub last_modified_on: DateTime<Utc>,
    pub latest_snapshot: bool,
    pub tags: Vec<TagRef>,
    #[serde(flatten)]
    pub body: B,
}

/// Response to a successful delete
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub status: &'static str,
    pub id: Vec<i64>,
}

impl DeleteResponse {
    pub fn new(id: i64) -> Self {
        Self {
            status: "Success",
            id: vec![id],
        }
    }
}

/// `{"id": ...}` request body
#[derive(Debug, Clone, Deserialize)]
pub struct IdRequest {
    pub id: i64,
}

/// `{"ids": [...]}` request body
#[derive(Debug, Clone, Deserialize)]
pub struct IdsRequest {
    pub ids: Vec<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_file_url_nests_under_plugin() {
        assert_eq!(
            resource_url(ResourceType::PluginFile, 9, Some(4)),
            "/api/v1/plugins/4/files/9"
        );
        assert_eq!(resource_url(ResourceType::Queue, 2, None), "/api/v1/queues/2");
        assert_eq!(
            resource_url(ResourceType::PluginParameterType, 3, None),
            "/api/v1/pluginParameterTypes/3"
        );
    }

    #[test]
    fn test_view_flattens_body() {
        #[derive(Serialize)]
        struct Body {
            name: &'static str,
        }

        let now = Utc::now();
        let view = ResourceView {
            id: 1,
            snapshot: None,
            group: GroupRef::new(1, "public"),
            user: UserRef::new(1, "alice"),
            created_on: now,
            last_modified_on: now,
            latest_snapshot: true,
            tags: vec![],
            body: Body { name: "q" },
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["name"], "q");
        assert_eq!(json["latestSnapshot"], true);
        assert!(json.get("snapshot").is_none());
        assert_eq!(json["user"]["url"], "/api/v1/users/1");
    }

    #[test]
    fn test_delete_response_shape() {
        let json = serde_json::to_value(DeleteResponse::new(7)).unwrap();
        assert_eq!(json, serde_json::json!({"status": "Success", "id": [7]}));
    }
}
