use async_trait::async_trait;
use uuid::Uuid;

/// Maps an authenticated subject (token `sub`) to an internal user id.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn resolve(
        &self,
        subject: &str,
    ) -> Result<Option<Uuid>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Directory for deployments where the token subject already is the user id.
pub struct SubjectUuidDirectory;

#[async_trait]
impl UserDirectory for SubjectUuidDirectory {
    async fn resolve(
        &self,
        subject: &str,
    ) -> Result<Option<Uuid>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Uuid::parse_str(subject).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subject_directory_parses_uuid_subjects() {
        let id = Uuid::new_v4();
        let directory = SubjectUuidDirectory;
        assert_eq!(directory.resolve(&id.to_string()).await.unwrap(), Some(id));
        assert_eq!(directory.resolve("guest-42").await.unwrap(), None);
    }
}
