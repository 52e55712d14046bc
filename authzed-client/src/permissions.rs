use crate::{
    CheckPermissionRequest, CheckPermissionResponse, Client, ObjectReference, SubjectReference,
};

impl Client {
    /// Checks whether `subject` has `permission` on `resource`.
    ///
    /// Returns `true` only if the service reports `PERMISSIONSHIP_HAS_PERMISSION`. Conditional or
    /// unknown results count as not permitted.
    pub async fn check_permission(
        &self,
        resource: ObjectReference,
        permission: impl Into<String>,
        subject: SubjectReference,
    ) -> crate::Result<bool> {
        let request = CheckPermissionRequest {
            consistency: self.inner.consistency,
            resource,
            permission: permission.into(),
            subject,
        };

        let response: CheckPermissionResponse =
            self.post_json("v1/permissions/check", &request).await?;
        Ok(response.permissionship.has_permission())
    }
}
