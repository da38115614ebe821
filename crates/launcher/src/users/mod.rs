//! Users stored as Kubernetes secrets, one secret per user.

mod secret;

pub use secret::{KubeSecretStore, SecretStore};

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::info;

use crate::Result;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserExtension {
    #[serde(default)]
    pub virtual_cluster: BTreeSet<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    /// Already encrypted by the caller.
    pub password: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub grouplist: BTreeSet<String>,
    #[serde(default)]
    pub extension: UserExtension,
}

impl User {
    /// Secret names must be DNS labels, so the username is hex encoded.
    pub fn secret_name(username: &str) -> String {
        hex::encode(username.as_bytes())
    }

    pub fn to_secret(&self) -> Result<Secret> {
        let data = BTreeMap::from([
            ("username".to_string(), ByteString(self.username.clone().into_bytes())),
            ("password".to_string(), ByteString(self.password.clone().into_bytes())),
            ("email".to_string(), ByteString(self.email.clone().into_bytes())),
            ("grouplist".to_string(), ByteString(serde_json::to_vec(&self.grouplist)?)),
            ("extension".to_string(), ByteString(serde_json::to_vec(&self.extension)?)),
        ]);
        Ok(Secret {
            metadata: ObjectMeta {
                name: Some(Self::secret_name(&self.username)),
                ..Default::default()
            },
            data: Some(data),
            ..Default::default()
        })
    }

    pub fn from_secret(secret: &Secret) -> Result<Self> {
        let empty = BTreeMap::new();
        let data = secret.data.as_ref().unwrap_or(&empty);
        let text = |key: &str| {
            data.get(key)
                .map(|v| String::from_utf8_lossy(&v.0).into_owned())
                .unwrap_or_default()
        };

        let grouplist = match data.get("grouplist") {
            Some(v) => serde_json::from_slice(&v.0)?,
            None => BTreeSet::new(),
        };
        let extension = match data.get("extension") {
            Some(v) => serde_json::from_slice(&v.0)?,
            None => UserExtension::default(),
        };

        Ok(Self {
            username: text("username"),
            password: text("password"),
            email: text("email"),
            grouplist,
            extension,
        })
    }
}

/// User CRUD and access checks over a [`SecretStore`].
///
/// Not-found errors from the store are returned unchanged; only
/// [`UserManager::create_user_if_absent`] looks at them.
pub struct UserManager {
    store: Arc<dyn SecretStore>,
    admin_group: String,
}

impl UserManager {
    pub fn new(store: Arc<dyn SecretStore>, admin_group: impl Into<String>) -> Self {
        Self {
            store,
            admin_group: admin_group.into(),
        }
    }

    pub async fn get_user(&self, username: &str) -> Result<User> {
        let secret = self.store.get(&User::secret_name(username)).await?;
        User::from_secret(&secret)
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        self.store
            .list()
            .await?
            .iter()
            .map(User::from_secret)
            .collect()
    }

    pub async fn create_user(&self, user: &User) -> Result<User> {
        let created = self.store.create(&user.to_secret()?).await?;
        info!("Created user {}", user.username);
        User::from_secret(&created)
    }

    pub async fn update_user(&self, user: &User) -> Result<User> {
        let name = User::secret_name(&user.username);
        let updated = self.store.replace(&name, &user.to_secret()?).await?;
        User::from_secret(&updated)
    }

    pub async fn delete_user(&self, username: &str) -> Result<()> {
        self.store.delete(&User::secret_name(username)).await?;
        info!("Deleted user {}", username);
        Ok(())
    }

    pub async fn is_admin(&self, username: &str) -> Result<bool> {
        let user = self.get_user(username).await?;
        Ok(user.grouplist.contains(&self.admin_group))
    }

    pub async fn check_user_group(&self, username: &str, group: &str) -> Result<bool> {
        let user = self.get_user(username).await?;
        Ok(user.grouplist.contains(group) || user.grouplist.contains(&self.admin_group))
    }

    pub async fn check_user_virtual_cluster(&self, username: &str, virtual_cluster: &str) -> Result<bool> {
        let user = self.get_user(username).await?;
        Ok(user.extension.virtual_cluster.contains(virtual_cluster)
            || user.grouplist.contains(&self.admin_group))
    }

    /// Creates `user` unless a user with that name already exists.
    pub async fn create_user_if_absent(&self, user: &User) -> Result<User> {
        match self.get_user(&user.username).await {
            Ok(existing) => Ok(existing),
            Err(e) if e.is_not_found() => self.create_user(user).await,
            Err(e) => Err(e),
        }
    }
}
