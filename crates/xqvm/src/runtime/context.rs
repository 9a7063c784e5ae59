use super::collation::{Collation, CollationRegistry};
use super::factory::NodeFactory;
use crate::builders::AtomicValueFactory;
use crate::consts::CODEPOINT_URI;
use crate::error::{Error, ErrorCode, Result};
use crate::names::NameCache;
use chrono::{DateTime, FixedOffset, Utc};
use std::sync::Arc;

/// Read-only execution environment shared by every frame of a query.
#[derive(Debug)]
pub struct DynamicContext {
    now: DateTime<FixedOffset>,
    timezone: FixedOffset,
    default_collation: Arc<dyn Collation>,
    collations: Arc<CollationRegistry>,
    names: Arc<NameCache>,
    atomics: AtomicValueFactory,
    nodes: NodeFactory,
}

impl DynamicContext {
    pub fn builder() -> DynamicContextBuilder {
        DynamicContextBuilder::new()
    }

    /// Stable for the lifetime of the context, in the implicit timezone.
    pub fn now(&self) -> DateTime<FixedOffset> {
        self.now
    }

    pub fn implicit_timezone(&self) -> FixedOffset {
        self.timezone
    }

    pub fn default_collation(&self) -> &Arc<dyn Collation> {
        &self.default_collation
    }

    pub fn collations(&self) -> &CollationRegistry {
        &self.collations
    }

    /// The named collation, or the default one for `None`.
    pub fn collation(&self, uri: Option<&str>) -> Result<Arc<dyn Collation>> {
        match uri {
            Some(uri) => self.collations.resolve(uri),
            None => Ok(self.default_collation.clone()),
        }
    }

    pub fn name_cache(&self) -> &NameCache {
        &self.names
    }

    pub fn atomics(&self) -> &AtomicValueFactory {
        &self.atomics
    }

    pub fn nodes(&self) -> &NodeFactory {
        &self.nodes
    }
}

impl Default for DynamicContext {
    fn default() -> Self {
        let now = Utc::now().fixed_offset();
        Self {
            now,
            timezone: *now.offset(),
            default_collation: Arc::new(super::collation::CodepointCollation),
            collations: Arc::new(CollationRegistry::default()),
            names: Arc::new(NameCache::new()),
            atomics: AtomicValueFactory::new(),
            nodes: NodeFactory::default(),
        }
    }
}

#[derive(Debug, Default)]
pub struct DynamicContextBuilder {
    now: Option<DateTime<FixedOffset>>,
    timezone: Option<FixedOffset>,
    default_collation: Option<String>,
    collations: Option<Arc<CollationRegistry>>,
    names: Option<Arc<NameCache>>,
    node_ids: bool,
    tree_types: bool,
}

impl DynamicContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixed 'now' for deterministic date/time functions.
    pub fn with_now(mut self, now: DateTime<FixedOffset>) -> Self {
        self.now = Some(now);
        self
    }

    /// Implicit timezone; out-of-range offsets are ignored.
    pub fn with_timezone(mut self, offset_minutes: i32) -> Self {
        if let Some(tz) = FixedOffset::east_opt(offset_minutes * 60) {
            self.timezone = Some(tz);
        }
        self
    }

    pub fn with_default_collation(mut self, uri: impl Into<String>) -> Self {
        self.default_collation = Some(uri.into());
        self
    }

    pub fn with_collations(mut self, reg: Arc<CollationRegistry>) -> Self {
        self.collations = Some(reg);
        self
    }

    /// Names pre-interned while compiling the plan.
    pub fn with_name_cache(mut self, names: Arc<NameCache>) -> Self {
        self.names = Some(names);
        self
    }

    /// Constructed trees carry tree and node ids.
    pub fn with_node_ids(mut self, on: bool) -> Self {
        self.node_ids = on;
        self
    }

    /// Constructed trees carry type annotations.
    pub fn with_tree_types(mut self, on: bool) -> Self {
        self.tree_types = on;
        self
    }

    pub fn build(self) -> Result<DynamicContext> {
        let collations = self.collations.unwrap_or_default();
        let uri = self.default_collation.as_deref().unwrap_or(CODEPOINT_URI);
        let default_collation = collations.get(uri).ok_or_else(|| {
            Error::new(
                ErrorCode::FOCH0002,
                format!("unknown default collation URI: {uri}"),
            )
        })?;
        let base = self.now.unwrap_or_else(|| Utc::now().fixed_offset());
        let timezone = self.timezone.unwrap_or(*base.offset());
        Ok(DynamicContext {
            now: base.with_timezone(&timezone),
            timezone,
            default_collation,
            collations,
            names: self.names.unwrap_or_default(),
            atomics: AtomicValueFactory::new(),
            nodes: NodeFactory::new(self.node_ids, self.tree_types),
        })
    }
}
