use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::Client;

use crate::Result;

/// Storage engine for user records. Errors are returned as the engine
/// produced them, including its not-found signal.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Secret>;
    async fn list(&self) -> Result<Vec<Secret>>;
    async fn create(&self, secret: &Secret) -> Result<Secret>;
    async fn replace(&self, name: &str, secret: &Secret) -> Result<Secret>;
    async fn delete(&self, name: &str) -> Result<()>;
}

/// Secrets in one Kubernetes namespace.
pub struct KubeSecretStore {
    api: Api<Secret>,
}

impl KubeSecretStore {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
        }
    }
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    async fn get(&self, name: &str) -> Result<Secret> {
        Ok(self.api.get(name).await?)
    }

    async fn list(&self) -> Result<Vec<Secret>> {
        Ok(self.api.list(&ListParams::default()).await?.items)
    }

    async fn create(&self, secret: &Secret) -> Result<Secret> {
        Ok(self.api.create(&PostParams::default(), secret).await?)
    }

    async fn replace(&self, name: &str, secret: &Secret) -> Result<Secret> {
        Ok(self.api.replace(name, &PostParams::default(), secret).await?)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.api.delete(name, &DeleteParams::default()).await?;
        Ok(())
    }
}
