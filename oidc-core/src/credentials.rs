//! Credentials façade: a uniform operation set over pluggable identity
//! providers, one of which (LDAP) is not internally thread-safe per
//! connection and so dispatches every call onto a bounded worker pool
//! with its own fresh bind, unbinding on every exit path.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Debug, Clone)]
pub struct CredentialsDetail {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    /// Factor types this specific credential must additionally satisfy
    /// beyond the server-global set (§4.7).
    pub enforce_factors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LoginDescriptor {
    pub id: String,
    pub factors: Vec<String>,
}

/// Uniform operation set a credentials provider must expose, mirroring
/// `get`/`search`/`locate`/`authenticate`/`count`/`iterate`/
/// `get_login_descriptors`.
#[async_trait::async_trait]
pub trait CredentialsProvider: Send + Sync {
    fn provider_id(&self) -> &str;

    async fn get(&self, credentials_id: &str) -> Result<Option<CredentialsDetail>>;

    async fn locate(&self, username: &str) -> Result<Option<String>>;

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<CredentialsDetail>>;

    async fn authenticate(&self, credentials_id: &str, password: &str) -> Result<bool>;

    async fn count(&self) -> Result<usize>;

    async fn iterate(&self, offset: usize, limit: usize) -> Result<Vec<CredentialsDetail>>;

    async fn get_login_descriptors(&self, credentials_id: &str) -> Result<Vec<LoginDescriptor>>;
}

/// In-memory provider: a fixed set of credentials, for tests and
/// single-tenant deployments that don't need an external directory.
pub struct InMemoryCredentialsProvider {
    id: String,
    records: Vec<(CredentialsDetail, String)>,
}

impl InMemoryCredentialsProvider {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            records: Vec::new(),
        }
    }

    pub fn with_user(mut self, detail: CredentialsDetail, password: String) -> Self {
        self.records.push((detail, password));
        self
    }
}

#[async_trait::async_trait]
impl CredentialsProvider for InMemoryCredentialsProvider {
    fn provider_id(&self) -> &str {
        &self.id
    }

    async fn get(&self, credentials_id: &str) -> Result<Option<CredentialsDetail>> {
        Ok(self
            .records
            .iter()
            .find(|(d, _)| d.id == credentials_id)
            .map(|(d, _)| d.clone()))
    }

    async fn locate(&self, username: &str) -> Result<Option<String>> {
        Ok(self
            .records
            .iter()
            .find(|(d, _)| d.username == username)
            .map(|(d, _)| d.id.clone()))
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<CredentialsDetail>> {
        Ok(self
            .records
            .iter()
            .filter(|(d, _)| d.username.contains(query))
            .take(limit)
            .map(|(d, _)| d.clone())
            .collect())
    }

    async fn authenticate(&self, credentials_id: &str, password: &str) -> Result<bool> {
        Ok(self
            .records
            .iter()
            .any(|(d, p)| d.id == credentials_id && p == password))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.len())
    }

    async fn iterate(&self, offset: usize, limit: usize) -> Result<Vec<CredentialsDetail>> {
        Ok(self
            .records
            .iter()
            .skip(offset)
            .take(limit)
            .map(|(d, _)| d.clone())
            .collect())
    }

    async fn get_login_descriptors(&self, credentials_id: &str) -> Result<Vec<LoginDescriptor>> {
        Ok(self
            .records
            .iter()
            .filter(|(d, _)| d.id == credentials_id)
            .map(|(d, _)| LoginDescriptor {
                id: format!("{}:password", d.id),
                factors: vec!["password".to_string()],
            })
            .collect())
    }
}

/// LDAP connection configuration. TLS parameters mirror a standard LDAPS
/// setup; the connection itself is established fresh per worker job.
#[derive(Debug, Clone)]
pub struct LdapConfig {
    pub url: String,
    pub bind_dn: String,
    pub bind_password: String,
    pub base_dn: String,
    pub max_concurrent_connections: usize,
}

/// LDAP-backed provider. Every operation acquires a semaphore permit,
/// runs its blocking LDAP work on `spawn_blocking`, and releases the
/// permit (and unbinds) on every exit path including panics, since the
/// permit and the connection guard are both RAII.
pub struct LdapCredentialsProvider {
    id: String,
    config: LdapConfig,
    semaphore: Arc<Semaphore>,
}

impl LdapCredentialsProvider {
    pub fn new(id: impl Into<String>, config: LdapConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_connections.max(1)));
        Self {
            id: id.into(),
            config,
            semaphore,
        }
    }

    /// Acquire a worker-pool permit before dispatching blocking LDAP work.
    /// Dropping the returned guard releases the permit unconditionally.
    async fn acquire(&self) -> Result<tokio::sync::OwnedSemaphorePermit> {
        Ok(self.semaphore.clone().acquire_owned().await?)
    }
}

#[async_trait::async_trait]
impl CredentialsProvider for LdapCredentialsProvider {
    fn provider_id(&self) -> &str {
        &self.id
    }

    async fn get(&self, credentials_id: &str) -> Result<Option<CredentialsDetail>> {
        let _permit = self.acquire().await?;
        let config = self.config.clone();
        let credentials_id = credentials_id.to_string();
        tokio::task::spawn_blocking(move || ldap_get(&config, &credentials_id)).await?
    }

    async fn locate(&self, username: &str) -> Result<Option<String>> {
        let _permit = self.acquire().await?;
        let config = self.config.clone();
        let username = username.to_string();
        tokio::task::spawn_blocking(move || ldap_locate(&config, &username)).await?
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<CredentialsDetail>> {
        let _permit = self.acquire().await?;
        let config = self.config.clone();
        let query = query.to_string();
        tokio::task::spawn_blocking(move || ldap_search(&config, &query, limit)).await?
    }

    async fn authenticate(&self, credentials_id: &str, password: &str) -> Result<bool> {
        let _permit = self.acquire().await?;
        let config = self.config.clone();
        let credentials_id = credentials_id.to_string();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || ldap_authenticate(&config, &credentials_id, &password))
            .await?
    }

    async fn count(&self) -> Result<usize> {
        let _permit = self.acquire().await?;
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || ldap_count(&config)).await?
    }

    async fn iterate(&self, offset: usize, limit: usize) -> Result<Vec<CredentialsDetail>> {
        let _permit = self.acquire().await?;
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || ldap_iterate(&config, offset, limit)).await?
    }

    async fn get_login_descriptors(&self, credentials_id: &str) -> Result<Vec<LoginDescriptor>> {
        let _permit = self.acquire().await?;
        let config = self.config.clone();
        let credentials_id = credentials_id.to_string();
        tokio::task::spawn_blocking(move || ldap_login_descriptors(&config, &credentials_id))
            .await?
    }
}

/// Opens a fresh LDAP connection, binds, runs `f`, and unbinds
/// unconditionally before returning, even if `f` returns an error.
fn with_bound_connection<T>(
    config: &LdapConfig,
    f: impl FnOnce(&mut ldap3::LdapConn) -> Result<T>,
) -> Result<T> {
    let mut conn = ldap3::LdapConn::new(&config.url)?;
    conn.simple_bind(&config.bind_dn, &config.bind_password)?
        .success()?;
    let result = f(&mut conn);
    let _ = conn.unbind();
    result
}

fn ldap_get(config: &LdapConfig, credentials_id: &str) -> Result<Option<CredentialsDetail>> {
    with_bound_connection(config, |conn| {
        use ldap3::{Scope, SearchEntry};
        let filter = format!("(uid={credentials_id})");
        let (results, _) = conn
            .search(&config.base_dn, Scope::Subtree, &filter, vec!["uid", "mail"])?
            .success()?;
        Ok(results.into_iter().next().map(|entry| {
            let entry = SearchEntry::construct(entry);
            CredentialsDetail {
                id: credentials_id.to_string(),
                username: credentials_id.to_string(),
                email: entry.attrs.get("mail").and_then(|v| v.first()).cloned(),
                enforce_factors: Vec::new(),
            }
        }))
    })
}

fn ldap_locate(config: &LdapConfig, username: &str) -> Result<Option<String>> {
    with_bound_connection(config, |conn| {
        use ldap3::Scope;
        let filter = format!("(uid={username})");
        let (results, _) = conn
            .search(&config.base_dn, Scope::Subtree, &filter, vec!["uid"])?
            .success()?;
        Ok(results.into_iter().next().map(|_| username.to_string()))
    })
}

fn ldap_search(config: &LdapConfig, query: &str, limit: usize) -> Result<Vec<CredentialsDetail>> {
    with_bound_connection(config, |conn| {
        use ldap3::{Scope, SearchEntry};
        let filter = format!("(uid=*{query}*)");
        let (results, _) = conn
            .search(&config.base_dn, Scope::Subtree, &filter, vec!["uid", "mail"])?
            .success()?;
        Ok(results
            .into_iter()
            .take(limit)
            .map(|entry| {
                let entry = SearchEntry::construct(entry);
                let uid = entry
                    .attrs
                    .get("uid")
                    .and_then(|v| v.first())
                    .cloned()
                    .unwrap_or_default();
                CredentialsDetail {
                    id: uid.clone(),
                    username: uid,
                    email: entry.attrs.get("mail").and_then(|v| v.first()).cloned(),
                    enforce_factors: Vec::new(),
                }
            })
            .collect())
    })
}

fn ldap_authenticate(config: &LdapConfig, credentials_id: &str, password: &str) -> Result<bool> {
    let user_dn = format!("uid={credentials_id},{}", config.base_dn);
    let mut conn = ldap3::LdapConn::new(&config.url)?;
    let result = conn.simple_bind(&user_dn, password).and_then(|r| r.success());
    let _ = conn.unbind();
    Ok(result.is_ok())
}

fn ldap_count(config: &LdapConfig) -> Result<usize> {
    with_bound_connection(config, |conn| {
        use ldap3::Scope;
        let (results, _) = conn
            .search(&config.base_dn, Scope::Subtree, "(uid=*)", vec!["uid"])?
            .success()?;
        Ok(results.len())
    })
}

fn ldap_iterate(config: &LdapConfig, offset: usize, limit: usize) -> Result<Vec<CredentialsDetail>> {
    with_bound_connection(config, |conn| {
        use ldap3::{Scope, SearchEntry};
        let (results, _) = conn
            .search(&config.base_dn, Scope::Subtree, "(uid=*)", vec!["uid", "mail"])?
            .success()?;
        Ok(results
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|entry| {
                let entry = SearchEntry::construct(entry);
                let uid = entry
                    .attrs
                    .get("uid")
                    .and_then(|v| v.first())
                    .cloned()
                    .unwrap_or_default();
                CredentialsDetail {
                    id: uid.clone(),
                    username: uid,
                    email: entry.attrs.get("mail").and_then(|v| v.first()).cloned(),
                    enforce_factors: Vec::new(),
                }
            })
            .collect())
    })
}

fn ldap_login_descriptors(config: &LdapConfig, credentials_id: &str) -> Result<Vec<LoginDescriptor>> {
    let exists = ldap_get(config, credentials_id)?.is_some();
    Ok(if exists {
        vec![LoginDescriptor {
            id: format!("{credentials_id}:ldap"),
            factors: vec!["password".to_string()],
        }]
    } else {
        Vec::new()
    })
}

/// Composes multiple named providers behind the uniform operation set,
/// trying each in the order registered and returning the first positive
/// result.
#[derive(Default)]
pub struct CredentialsFacade {
    providers: Vec<Arc<dyn CredentialsProvider>>,
}

impl CredentialsFacade {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_provider(&mut self, provider: Arc<dyn CredentialsProvider>) {
        self.providers.push(provider);
    }

    pub async fn get(&self, credentials_id: &str) -> Result<Option<CredentialsDetail>> {
        for provider in &self.providers {
            if let Some(detail) = provider.get(credentials_id).await? {
                return Ok(Some(detail));
            }
        }
        Ok(None)
    }

    pub async fn authenticate(&self, credentials_id: &str, password: &str) -> Result<bool> {
        for provider in &self.providers {
            if provider.get(credentials_id).await?.is_some() {
                return provider.authenticate(credentials_id, password).await;
            }
        }
        Ok(false)
    }

    pub async fn locate(&self, username: &str) -> Result<Option<String>> {
        for provider in &self.providers {
            if let Some(id) = provider.locate(username).await? {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }
}
