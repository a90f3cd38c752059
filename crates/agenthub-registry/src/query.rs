//! Catalog queries: filtering, sorting and pagination.
//!
//! A query is a conjunction of filters over the catalog plus one sort key.
//! Every sort key is followed by the artifact id as a tie-break, so the
//! ordering is total and pages never overlap or skip rows for a fixed
//! snapshot. The in-memory evaluation here is the reference semantics; the
//! SQLite store translates the same query to SQL.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use agenthub_core::{Artifact, Category, PrincipalId, Visibility};

use crate::config::PagingConfig;
use crate::error::{RegistryError, Result};
use crate::store::RegistryStore;

/// Which visibility slice of the catalog a query sees.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Scope {
    /// Public artifacts only.
    #[default]
    Public,
    /// Every artifact owned by this principal, whatever its visibility.
    OwnedBy(PrincipalId),
}

/// Conjunctive filter over artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArtifactFilter {
    pub scope: Scope,
    pub category: Option<Category>,
    pub owner: Option<PrincipalId>,
    pub namespace: Option<String>,
    /// Case-insensitive substring over name OR description.
    pub search: Option<String>,
}

impl ArtifactFilter {
    /// Filter over the public catalog.
    pub fn public() -> Self {
        Self::default()
    }

    /// Filter over everything `owner` owns.
    pub fn owned_by(owner: PrincipalId) -> Self {
        ArtifactFilter {
            scope: Scope::OwnedBy(owner),
            ..Default::default()
        }
    }

    /// Builder: restrict to a category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(Category::new(category));
        self
    }

    /// Builder: restrict to an owner.
    pub fn with_owner(mut self, owner: PrincipalId) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Builder: restrict to a namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Builder: free-text search. Blank text means no search filter.
    pub fn with_search(mut self, text: &str) -> Self {
        let text = text.trim();
        self.search = if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        };
        self
    }

    /// Evaluate the predicate against one artifact.
    pub fn matches(&self, artifact: &Artifact) -> bool {
        let in_scope = match &self.scope {
            Scope::Public => artifact.metadata.visibility == Visibility::Public,
            Scope::OwnedBy(owner) => artifact.owner == *owner,
        };
        in_scope
            && self
                .category
                .as_ref()
                .map_or(true, |c| artifact.metadata.category == *c)
            && self.owner.as_ref().map_or(true, |o| artifact.owner == *o)
            && self
                .namespace
                .as_ref()
                .map_or(true, |ns| artifact.namespace == *ns)
            && self.search.as_ref().map_or(true, |text| {
                contains_ci(&artifact.name, text) || contains_ci(&artifact.metadata.description, text)
            })
    }
}

/// Case-insensitive substring test used by search, in memory and in SQLite.
pub fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Primary sort key for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// `updated_at` descending.
    #[default]
    Updated,
    /// `downloads` descending.
    Downloads,
    /// `likes` descending.
    Likes,
    /// `name` ascending.
    Name,
}

impl SortKey {
    /// Total order: primary key, then artifact id ascending.
    pub fn compare(&self, a: &Artifact, b: &Artifact) -> Ordering {
        let primary = match self {
            SortKey::Updated => b.updated_at.cmp(&a.updated_at),
            SortKey::Downloads => b.downloads.cmp(&a.downloads),
            SortKey::Likes => b.likes.cmp(&a.likes),
            SortKey::Name => a.name.cmp(&b.name),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Updated => "updated",
            SortKey::Downloads => "downloads",
            SortKey::Likes => "likes",
            SortKey::Name => "name",
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "" | "updated" | "updated_at" => Ok(SortKey::Updated),
            "downloads" => Ok(SortKey::Downloads),
            "likes" => Ok(SortKey::Likes),
            "name" => Ok(SortKey::Name),
            other => Err(RegistryError::invalid(format!(
                "unknown sort key '{other}' (expected updated, downloads, likes or name)"
            ))),
        }
    }
}

/// Filter plus sort.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArtifactQuery {
    pub filter: ArtifactFilter,
    pub sort: SortKey,
}

impl ArtifactQuery {
    pub fn new(filter: ArtifactFilter, sort: SortKey) -> Self {
        ArtifactQuery { filter, sort }
    }
}

/// A validated 1-indexed page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    page_size: u32,
}

impl PageRequest {
    /// Validate `page >= 1` and `1 <= page_size <= max_page_size`.
    pub fn new(page: u32, page_size: u32, max_page_size: u32) -> Result<Self> {
        if page == 0 {
            return Err(RegistryError::invalid("page numbers start at 1"));
        }
        if page_size == 0 || page_size > max_page_size {
            return Err(RegistryError::invalid(format!(
                "page size must be between 1 and {max_page_size}, got {page_size}"
            )));
        }
        Ok(PageRequest { page, page_size })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Number of rows skipped before this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }
}

/// One page of results plus the total match count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Count of all matching rows before pagination.
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> Page<T> {
    /// Number of pages needed to cover `total`.
    pub fn total_pages(&self) -> u64 {
        self.total.div_ceil(u64::from(self.page_size))
    }

    pub fn has_next(&self) -> bool {
        u64::from(self.page) < self.total_pages()
    }
}

/// Evaluate a query over a materialized snapshot of the catalog.
pub(crate) fn evaluate(
    artifacts: impl IntoIterator<Item = Artifact>,
    query: &ArtifactQuery,
    page: PageRequest,
) -> Page<Artifact> {
    let mut matching: Vec<Artifact> = artifacts
        .into_iter()
        .filter(|a| query.filter.matches(a))
        .collect();
    matching.sort_by(|a, b| query.sort.compare(a, b));

    let total = matching.len() as u64;
    let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    let items = matching
        .into_iter()
        .skip(offset)
        .take(page.page_size() as usize)
        .collect();

    Page {
        items,
        total,
        page: page.page(),
        page_size: page.page_size(),
    }
}

/// Read-side query engine over a store.
#[derive(Clone)]
pub struct QueryEngine {
    store: Arc<dyn RegistryStore>,
    paging: PagingConfig,
}

impl QueryEngine {
    /// Create an engine bounded by `paging`.
    pub fn new(store: Arc<dyn RegistryStore>, paging: PagingConfig) -> Self {
        QueryEngine { store, paging }
    }

    /// Build a page request, substituting the default size when absent.
    pub fn page_request(&self, page: Option<u32>, page_size: Option<u32>) -> Result<PageRequest> {
        PageRequest::new(
            page.unwrap_or(1),
            page_size.unwrap_or(self.paging.default_page_size),
            self.paging.max_page_size,
        )
    }

    /// List artifacts matching `query`, one page at a time.
    pub fn list_artifacts(
        &self,
        query: &ArtifactQuery,
        page: u32,
        page_size: u32,
    ) -> Result<Page<Artifact>> {
        let request = PageRequest::new(page, page_size, self.paging.max_page_size)?;
        self.list_page(query, request)
    }

    /// List artifacts for an already validated page request.
    pub fn list_page(&self, query: &ArtifactQuery, request: PageRequest) -> Result<Page<Artifact>> {
        if let Some(category) = &query.filter.category {
            if !category.is_known() {
                return Err(RegistryError::invalid(format!(
                    "unknown category '{category}'"
                )));
            }
        }

        let page = self.store.query_artifacts(query, request)?;
        debug!(
            sort = %query.sort,
            page = page.page,
            page_size = page.page_size,
            total = page.total,
            returned = page.items.len(),
            "listed artifacts"
        );
        Ok(page)
    }

    /// Public artifact count for every known category, in facet order.
    pub fn category_counts(&self) -> Result<Vec<(Category, u64)>> {
        let counts = self.store.category_counts()?;
        Ok(Category::known()
            .map(|c| {
                let n = counts.get(&c).copied().unwrap_or(0);
                (c, n)
            })
            .collect())
    }
}
