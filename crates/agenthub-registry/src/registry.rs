//! Registry facade.
//!
//! Transport-agnostic entry points for a server layer. Every mutating call
//! takes the per-request [`Caller`]; anonymous callers and non-owners are
//! rejected with `Forbidden` before anything is written.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use agenthub_core::{
    AgentSpec, Artifact, ArtifactMetadata, ArtifactPatch, Caller, PrincipalId, Version,
};

use crate::catalog::Catalog;
use crate::config::RegistryConfig;
use crate::error::{RegistryError, Result};
use crate::ledger::Ledger;
use crate::query::{ArtifactFilter, ArtifactQuery, Page, QueryEngine, SortKey};
use crate::reference::{Resolved, Resolver};
use crate::store::{self, MemoryStore, RegistryStore};
use crate::version::VersionPolicy;

/// A version to publish.
#[derive(Debug, Clone, Default)]
pub struct PublishRequest {
    pub version: String,
    pub payload: Vec<u8>,
    pub changelog: String,
}

impl PublishRequest {
    /// A request with an empty changelog.
    pub fn new(version: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        PublishRequest {
            version: version.into(),
            payload: payload.into(),
            changelog: String::new(),
        }
    }

    /// Builder: set the changelog.
    pub fn with_changelog(mut self, changelog: impl Into<String>) -> Self {
        self.changelog = changelog.into();
        self
    }
}

/// An artifact with its latest version, if it has one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactInfo {
    pub artifact: Artifact,
    pub latest: Option<Version>,
}

/// Public catalog listing parameters.
#[derive(Debug, Clone, Default)]
pub struct ListRequest {
    pub category: Option<String>,
    pub search: Option<String>,
    pub namespace: Option<String>,
    pub sort: SortKey,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

/// A known category with its public artifact count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub id: String,
    pub label: String,
    pub count: u64,
}

/// The registry.
pub struct Registry {
    config: RegistryConfig,
    store: Arc<dyn RegistryStore>,
    catalog: Catalog,
    ledger: Ledger,
    resolver: Resolver,
    query: QueryEngine,
    policy: VersionPolicy,
}

impl Registry {
    /// Build a registry over an existing store.
    pub fn with_store(config: RegistryConfig, store: Arc<dyn RegistryStore>) -> Result<Self> {
        config.validate()?;
        Ok(Self::assemble(config, store))
    }

    fn assemble(config: RegistryConfig, store: Arc<dyn RegistryStore>) -> Self {
        let catalog = Catalog::new(Arc::clone(&store));
        let ledger = Ledger::new(Arc::clone(&store), config.max_payload_bytes);
        let resolver = Resolver::new(
            catalog.clone(),
            ledger.clone(),
            config.default_namespace.clone(),
        );
        let query = QueryEngine::new(Arc::clone(&store), config.paging);
        let policy = VersionPolicy::from_config(&config.publish);
        debug!(engine = store.engine(), "registry ready");
        Registry {
            config,
            store,
            catalog,
            ledger,
            resolver,
            query,
            policy,
        }
    }

    /// Open the configured store and build a registry over it.
    pub fn from_config(config: RegistryConfig) -> Result<Self> {
        config.validate()?;
        let store = store::open(&config.storage)?;
        Self::with_store(config, store)
    }

    /// A registry over a fresh in-memory store with default settings.
    pub fn in_memory() -> Self {
        Self::assemble(RegistryConfig::default(), Arc::new(MemoryStore::new()))
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RegistryStore> {
        &self.store
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn query_engine(&self) -> &QueryEngine {
        &self.query
    }

    fn principal<'a>(caller: &'a Caller, action: &str) -> Result<&'a PrincipalId> {
        caller
            .principal()
            .ok_or_else(|| RegistryError::forbidden(format!("{action} requires authentication")))
    }

    // --- artifacts ---

    /// Create an artifact owned by the caller. The configured namespace
    /// policy decides whether the caller may use `namespace`.
    pub fn create_artifact(
        &self,
        caller: &Caller,
        namespace: &str,
        name: &str,
        metadata: ArtifactMetadata,
    ) -> Result<Artifact> {
        let owner = Self::principal(caller, "create")?;
        if !self.config.publish.namespaces.permits(owner, namespace) {
            return Err(RegistryError::forbidden(format!("create under namespace '{namespace}'")));
        }
        self.catalog.create_artifact(namespace, name, metadata, owner.clone())
    }

    /// Artifact detail, `NotFound` when absent or not visible to `caller`.
    pub fn artifact(&self, caller: &Caller, namespace: &str, name: &str) -> Result<Artifact> {
        self.catalog.get_artifact(namespace, name, caller)
    }

    /// Apply a metadata patch. Owner only.
    pub fn update_artifact(
        &self,
        caller: &Caller,
        namespace: &str,
        name: &str,
        patch: &ArtifactPatch,
    ) -> Result<Artifact> {
        let artifact = self.catalog.get_artifact(namespace, name, caller)?;
        self.catalog.update_artifact(&artifact, patch, caller)
    }

    /// Remove an artifact with all of its versions. Owner only.
    pub fn delete_artifact(&self, caller: &Caller, namespace: &str, name: &str) -> Result<()> {
        let artifact = self.catalog.get_artifact(namespace, name, caller)?;
        self.catalog.delete_artifact(&artifact, caller)
    }

    // --- versions ---

    /// Publish a new version. Owner only.
    pub fn publish(
        &self,
        caller: &Caller,
        namespace: &str,
        name: &str,
        request: PublishRequest,
    ) -> Result<Version> {
        let artifact = self.catalog.get_artifact(namespace, name, caller)?;
        if !artifact.is_owned_by(caller) {
            return Err(RegistryError::forbidden(format!(
                "publish to {}",
                artifact.full_name()
            )));
        }
        let publisher = Self::principal(caller, "publish")?;

        self.policy.check(&request.version)?;
        if self.config.publish.validate_spec {
            let spec = AgentSpec::parse(&request.payload)?;
            debug!(
                artifact = %artifact.full_name(),
                runtime = spec.runtime.kind(),
                "validated agent spec"
            );
        }

        self.ledger.publish_version(
            &artifact,
            &request.version,
            request.payload,
            &request.changelog,
            publisher,
        )
    }

    /// Artifact detail with its latest version.
    pub fn info(&self, caller: &Caller, namespace: &str, name: &str) -> Result<ArtifactInfo> {
        let artifact = self.catalog.get_artifact(namespace, name, caller)?;
        let latest = self.store.latest_version(artifact.id)?;
        Ok(ArtifactInfo { artifact, latest })
    }

    /// Resolve a reference string. No side effects.
    pub fn resolve(&self, caller: &Caller, reference: &str) -> Result<Resolved> {
        self.resolver.resolve_str(reference, caller)
    }

    /// Resolve a reference and count the download on the artifact and the
    /// version.
    pub fn pull(&self, caller: &Caller, reference: &str) -> Result<Resolved> {
        let mut resolved = self.resolver.resolve_str(reference, caller)?;
        resolved.artifact.downloads = self.catalog.increment_downloads(resolved.artifact.id)?;
        resolved.version.downloads = self.ledger.record_download(&resolved.version)?;
        debug!(
            artifact = %resolved.artifact.full_name(),
            version = %resolved.version.version,
            downloads = resolved.artifact.downloads,
            "pulled version"
        );
        Ok(resolved)
    }

    /// All versions of an artifact, most recent first.
    pub fn versions(&self, caller: &Caller, namespace: &str, name: &str) -> Result<Vec<Version>> {
        let artifact = self.catalog.get_artifact(namespace, name, caller)?;
        self.ledger.list_versions(&artifact)
    }

    // --- listings ---

    /// Browse the public catalog.
    pub fn list(&self, request: &ListRequest) -> Result<Page<Artifact>> {
        let mut filter = ArtifactFilter::public();
        if let Some(category) = request.category.as_deref().filter(|c| !c.is_empty()) {
            filter = filter.with_category(category);
        }
        if let Some(namespace) = request.namespace.as_deref().filter(|n| !n.is_empty()) {
            filter = filter.with_namespace(namespace);
        }
        if let Some(search) = &request.search {
            filter = filter.with_search(search);
        }
        let page = self.query.page_request(request.page, request.page_size)?;
        self.query
            .list_page(&ArtifactQuery::new(filter, request.sort), page)
    }

    /// Everything the caller owns, any visibility, most recently updated first.
    pub fn mine(
        &self,
        caller: &Caller,
        page: Option<u32>,
        page_size: Option<u32>,
    ) -> Result<Page<Artifact>> {
        let owner = Self::principal(caller, "listing own artifacts")?.clone();
        let page = self.query.page_request(page, page_size)?;
        self.query.list_page(
            &ArtifactQuery::new(ArtifactFilter::owned_by(owner), SortKey::Updated),
            page,
        )
    }

    /// Public artifacts in one namespace.
    pub fn by_namespace(
        &self,
        namespace: &str,
        page: Option<u32>,
        page_size: Option<u32>,
    ) -> Result<Page<Artifact>> {
        let page = self.query.page_request(page, page_size)?;
        self.query.list_page(
            &ArtifactQuery::new(
                ArtifactFilter::public().with_namespace(namespace),
                SortKey::Updated,
            ),
            page,
        )
    }

    /// Free-text search over the public catalog.
    pub fn search(
        &self,
        text: &str,
        page: Option<u32>,
        page_size: Option<u32>,
    ) -> Result<Page<Artifact>> {
        if text.trim().is_empty() {
            return Err(RegistryError::invalid("search query is required"));
        }
        let page = self.query.page_request(page, page_size)?;
        self.query.list_page(
            &ArtifactQuery::new(ArtifactFilter::public().with_search(text), SortKey::Updated),
            page,
        )
    }

    /// Most downloaded public artifacts.
    pub fn trending(&self, limit: u32) -> Result<Vec<Artifact>> {
        self.top(SortKey::Downloads, limit)
    }

    /// Most liked public artifacts.
    pub fn featured(&self, limit: u32) -> Result<Vec<Artifact>> {
        self.top(SortKey::Likes, limit)
    }

    fn top(&self, sort: SortKey, limit: u32) -> Result<Vec<Artifact>> {
        let page = self.query.page_request(Some(1), Some(limit))?;
        let page = self
            .query
            .list_page(&ArtifactQuery::new(ArtifactFilter::public(), sort), page)?;
        Ok(page.items)
    }

    /// Known categories with public artifact counts, in facet order.
    pub fn categories(&self) -> Result<Vec<CategoryCount>> {
        Ok(self
            .query
            .category_counts()?
            .into_iter()
            .map(|(category, count)| CategoryCount {
                label: category.label().unwrap_or(category.as_str()).to_string(),
                id: category.as_str().to_string(),
                count,
            })
            .collect())
    }

    // --- social ---

    /// Add a like. Authenticated callers only.
    pub fn like(&self, caller: &Caller, namespace: &str, name: &str) -> Result<u64> {
        Self::principal(caller, "like")?;
        let artifact = self.catalog.get_artifact(namespace, name, caller)?;
        self.catalog.increment_likes(artifact.id)
    }

    /// Remove a like, never going below zero. Authenticated callers only.
    pub fn unlike(&self, caller: &Caller, namespace: &str, name: &str) -> Result<u64> {
        Self::principal(caller, "unlike")?;
        let artifact = self.catalog.get_artifact(namespace, name, caller)?;
        self.catalog.decrement_likes(artifact.id)
    }
}
