use crate::{Client, WriteSchemaRequest, WriteSchemaResponse};

impl Client {
    /// Replaces the schema of the permission system via `POST /v1/schema/write`.
    pub async fn write_schema(
        &self,
        schema: impl Into<String>,
    ) -> crate::Result<WriteSchemaResponse> {
        let request = WriteSchemaRequest {
            schema: schema.into(),
        };
        self.post_json("v1/schema/write", &request).await
    }
}
