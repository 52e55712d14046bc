use crate::{
    Client, Operation, Relationship, RelationshipUpdate, WriteRelationshipsRequest,
    WriteRelationshipsResponse,
};

impl Client {
    /// Applies the given updates atomically via `POST /v1/relationships/write`.
    pub async fn write_relationships(
        &self,
        updates: Vec<RelationshipUpdate>,
    ) -> crate::Result<WriteRelationshipsResponse> {
        let request = WriteRelationshipsRequest { updates };
        self.post_json("v1/relationships/write", &request).await
    }

    /// Upserts a single relationship.
    ///
    /// Touching is idempotent, writing the same relationship twice succeeds both times.
    pub async fn touch_relationship(
        &self,
        relationship: Relationship,
    ) -> crate::Result<WriteRelationshipsResponse> {
        let update = RelationshipUpdate {
            operation: Operation::Touch,
            relationship,
        };
        self.write_relationships(vec![update]).await
    }
}
