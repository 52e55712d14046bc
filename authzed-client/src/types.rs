//! Wire types of the AuthZed HTTP API.
//!
//! All types serialize with the `camelCase` field names the API expects. They also implement
//! [`Deserialize`] so that test doubles of the service can decode the requests.

use serde::{Deserialize, Serialize};

/// A reference to an object, such as a resource or the object of a subject.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    /// The object definition name, for example `document`.
    pub object_type: String,
    /// The unique identifier of the object within its type.
    pub object_id: String,
}

impl ObjectReference {
    /// Creates a reference to the object `object_type:object_id`.
    pub fn new(object_type: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            object_id: object_id.into(),
        }
    }
}

/// The subject side of a relationship or permission check.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectReference {
    /// The subject object.
    pub object: ObjectReference,
    /// An optional relation on the subject, for subject sets such as `group:eng#member`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional_relation: Option<String>,
}

impl SubjectReference {
    /// Creates a subject referring to the object `object_type:object_id`.
    pub fn new(object_type: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            object: ObjectReference::new(object_type, object_id),
            optional_relation: None,
        }
    }
}

/// A relationship between a resource and a subject.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    /// The resource the relationship is defined on.
    pub resource: ObjectReference,
    /// The relation name, for example `viewer`.
    pub relation: String,
    /// The subject holding the relation.
    pub subject: SubjectReference,
}

impl Relationship {
    /// Creates the relationship `resource#relation@subject`.
    pub fn new(
        resource: ObjectReference,
        relation: impl Into<String>,
        subject: SubjectReference,
    ) -> Self {
        Self {
            resource,
            relation: relation.into(),
            subject,
        }
    }
}

/// The kind of mutation applied by a [`RelationshipUpdate`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Creates the relationship, failing if it already exists.
    #[serde(rename = "OPERATION_CREATE")]
    Create,
    /// Upserts the relationship.
    #[serde(rename = "OPERATION_TOUCH")]
    Touch,
    /// Removes the relationship.
    #[serde(rename = "OPERATION_DELETE")]
    Delete,
}

/// A single mutation within a [`WriteRelationshipsRequest`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipUpdate {
    /// The mutation to apply.
    pub operation: Operation,
    /// The relationship to mutate.
    pub relationship: Relationship,
}

/// Request body of `POST /v1/relationships/write`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteRelationshipsRequest {
    /// The updates, applied atomically.
    pub updates: Vec<RelationshipUpdate>,
}

/// An opaque revision token returned by the service.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ZedToken {
    /// The encoded revision.
    pub token: String,
}

/// Response body of `POST /v1/relationships/write`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteRelationshipsResponse {
    /// The revision at which the relationships were written.
    #[serde(default)]
    pub written_at: Option<ZedToken>,
}

/// The consistency requirement of a permission check.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(from = "ConsistencyRepr", into = "ConsistencyRepr")]
pub enum Consistency {
    /// Evaluate at the most recent revision.
    #[default]
    FullyConsistent,
    /// Let the service choose a revision that minimizes latency.
    MinimizeLatency,
}

#[derive(Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConsistencyRepr {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    minimize_latency: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    fully_consistent: bool,
}

impl From<ConsistencyRepr> for Consistency {
    fn from(repr: ConsistencyRepr) -> Self {
        if repr.minimize_latency && !repr.fully_consistent {
            Consistency::MinimizeLatency
        } else {
            Consistency::FullyConsistent
        }
    }
}

impl From<Consistency> for ConsistencyRepr {
    fn from(consistency: Consistency) -> Self {
        match consistency {
            Consistency::FullyConsistent => ConsistencyRepr {
                fully_consistent: true,
                ..Default::default()
            },
            Consistency::MinimizeLatency => ConsistencyRepr {
                minimize_latency: true,
                ..Default::default()
            },
        }
    }
}

/// Request body of `POST /v1/permissions/check`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckPermissionRequest {
    /// The consistency requirement for this check.
    pub consistency: Consistency,
    /// The resource to check the permission on.
    pub resource: ObjectReference,
    /// The permission name, for example `view`.
    pub permission: String,
    /// The subject whose permission is checked.
    pub subject: SubjectReference,
}

/// The result of a permission check.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Permissionship {
    /// The service did not specify a result.
    #[serde(rename = "PERMISSIONSHIP_UNSPECIFIED")]
    Unspecified,
    /// The subject does not have the permission.
    #[serde(rename = "PERMISSIONSHIP_NO_PERMISSION")]
    NoPermission,
    /// The subject has the permission.
    #[serde(rename = "PERMISSIONSHIP_HAS_PERMISSION")]
    HasPermission,
    /// The permission depends on caveat context that was not provided.
    #[serde(rename = "PERMISSIONSHIP_CONDITIONAL_PERMISSION")]
    ConditionalPermission,
    /// Any value unknown to this client.
    #[serde(other)]
    Unknown,
}

impl Permissionship {
    /// Returns `true` only for [`Permissionship::HasPermission`].
    pub fn has_permission(self) -> bool {
        self == Permissionship::HasPermission
    }
}

/// Response body of `POST /v1/permissions/check`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckPermissionResponse {
    /// The revision at which the check was evaluated.
    #[serde(default)]
    pub checked_at: Option<ZedToken>,
    /// The outcome of the check.
    pub permissionship: Permissionship,
}

/// Request body of `POST /v1/schema/write`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WriteSchemaRequest {
    /// The schema in the Zed schema language.
    pub schema: String,
}

/// Response body of `POST /v1/schema/write`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteSchemaResponse {
    /// The revision at which the schema was written.
    #[serde(default)]
    pub written_at: Option<ZedToken>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn check_request_uses_api_field_names() {
        let request = CheckPermissionRequest {
            consistency: Consistency::FullyConsistent,
            resource: ObjectReference::new("document", "doc_1"),
            permission: "view".into(),
            subject: SubjectReference::new("user", "alice"),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "consistency": { "fullyConsistent": true },
                "resource": { "objectType": "document", "objectId": "doc_1" },
                "permission": "view",
                "subject": { "object": { "objectType": "user", "objectId": "alice" } },
            })
        );
    }

    #[test]
    fn minimize_latency_roundtrips() {
        let value = serde_json::to_value(Consistency::MinimizeLatency).unwrap();
        assert_eq!(value, json!({ "minimizeLatency": true }));

        let parsed: Consistency = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, Consistency::MinimizeLatency);
    }

    #[test]
    fn write_request_uses_touch_operation() {
        let update = RelationshipUpdate {
            operation: Operation::Touch,
            relationship: Relationship::new(
                ObjectReference::new("document", "doc_1"),
                "editor",
                SubjectReference::new("user", "bob"),
            ),
        };

        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value["operation"], "OPERATION_TOUCH");
        assert_eq!(value["relationship"]["relation"], "editor");
        assert!(value["relationship"]["subject"].get("optionalRelation").is_none());
    }

    #[test]
    fn unknown_permissionship_is_not_allowed() {
        let response: CheckPermissionResponse = serde_json::from_value(json!({
            "checkedAt": { "token": "GhUKEzE3" },
            "permissionship": "PERMISSIONSHIP_SOMETHING_NEW",
        }))
        .unwrap();

        assert_eq!(response.permissionship, Permissionship::Unknown);
        assert!(!response.permissionship.has_permission());
    }
}
