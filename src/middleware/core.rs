use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace};

use crate::context::RequestContext;
use crate::error::DispatchError;
use crate::http::HandlerResponse;
use crate::registry::{filter_by_tag_value, Binding, BindingKey, Scope};

/// Well-known middleware group names
pub mod groups {
    pub const SEND_RESPONSE: &str = "send-response";
    pub const CORS: &str = "cors";
    pub const MIDDLEWARE: &str = "middleware";
    pub const FIND_ROUTE: &str = "find-route";
    pub const AUTHENTICATION: &str = "authentication";
    pub const PARSE_PARAMS: &str = "parse-params";
    pub const INVOKE_OPERATION: &str = "invoke-operation";
}

/// Group order of the REST chain, outermost first
pub const DEFAULT_GROUP_ORDER: [&str; 7] = [
    groups::SEND_RESPONSE,
    groups::CORS,
    groups::MIDDLEWARE,
    groups::FIND_ROUTE,
    groups::AUTHENTICATION,
    groups::PARSE_PARAMS,
    groups::INVOKE_OPERATION,
];

/// Name of the chain the dispatcher runs
pub const REST_CHAIN: &str = "middlewareChain.rest";

/// Tag carried by every middleware binding
pub const MIDDLEWARE_TAG: &str = "middleware";
/// Tag whose value names the chain an entry belongs to
pub const CHAIN_TAG: &str = "middleware.chain";
/// Tag whose value names the entry's group
pub const GROUP_TAG: &str = "middleware.group";

/// Outcome of a chain step: a response to send, nothing, or an error that
/// unwinds through the outer entries
pub type ChainResult = Result<Option<HandlerResponse>, DispatchError>;

/// A chain entry.
///
/// An entry may return without calling `next` (short-circuit), call
/// `next.run(ctx)` and inspect or replace its result (wrapping), or map an
/// error coming back from `next`.
pub trait Middleware: Send + Sync {
    fn handle(&self, ctx: &mut RequestContext, next: Next<'_>) -> ChainResult;
}

impl<F> Middleware for F
where
    F: Fn(&mut RequestContext, Next<'_>) -> ChainResult + Send + Sync,
{
    fn handle(&self, ctx: &mut RequestContext, next: Next<'_>) -> ChainResult {
        self(ctx, next)
    }
}

/// Named, grouped middleware registered for a chain
#[derive(Clone)]
pub struct MiddlewareEntry {
    name: String,
    group: String,
    chain: String,
    handler: Arc<dyn Middleware>,
}

impl MiddlewareEntry {
    /// Entry for the REST chain
    pub fn new<M>(name: &str, group: &str, handler: M) -> Self
    where
        M: Middleware + 'static,
    {
        Self::from_arc(name, group, Arc::new(handler))
    }

    #[must_use]
    pub fn from_arc(name: &str, group: &str, handler: Arc<dyn Middleware>) -> Self {
        Self {
            name: name.to_string(),
            group: group.to_string(),
            chain: REST_CHAIN.to_string(),
            handler,
        }
    }

    #[must_use]
    pub fn in_chain(mut self, chain: &str) -> Self {
        self.chain = chain.to_string();
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    #[must_use]
    pub fn chain(&self) -> &str {
        &self.chain
    }

    #[must_use]
    pub fn handler(&self) -> &Arc<dyn Middleware> {
        &self.handler
    }

    /// Binding under a generated `middleware.*` key, tagged for discovery
    #[must_use]
    pub fn into_binding(self) -> Binding {
        let key: BindingKey<MiddlewareEntry> = BindingKey::generate(MIDDLEWARE_TAG);
        let chain = self.chain.clone();
        let group = self.group.clone();
        Binding::constant(&key, self)
            .tag(MIDDLEWARE_TAG)
            .tag_value(CHAIN_TAG, chain)
            .tag_value(GROUP_TAG, group)
    }
}

impl fmt::Debug for MiddlewareEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareEntry")
            .field("name", &self.name)
            .field("group", &self.group)
            .field("chain", &self.chain)
            .finish_non_exhaustive()
    }
}

/// Register `entry` in `scope` so chain builders below it can discover it
pub fn register_middleware(scope: &Scope, entry: MiddlewareEntry) -> Arc<Binding> {
    debug!(
        name = %entry.name,
        group = %entry.group,
        chain = %entry.chain,
        "Middleware registered"
    );
    scope.add(entry.into_binding())
}

/// Continuation handed to each entry: runs the rest of the chain
pub struct Next<'a> {
    entries: &'a [Arc<MiddlewareEntry>],
    index: usize,
}

impl<'a> Next<'a> {
    fn new(entries: &'a [Arc<MiddlewareEntry>], index: usize) -> Self {
        Self { entries, index }
    }

    /// Run the remaining entries.
    ///
    /// Returns `Ok(None)` past the end of the chain and `RequestAborted` if
    /// the transport gave up on the request.
    pub fn run(self, ctx: &mut RequestContext) -> ChainResult {
        if ctx.is_aborted() {
            debug!(
                request_id = %ctx.request_id(),
                remaining = self.remaining(),
                "Request aborted - stopping chain"
            );
            return Err(DispatchError::aborted());
        }
        let Some(entry) = self.entries.get(self.index) else {
            return Ok(None);
        };

        trace!(
            request_id = %ctx.request_id(),
            entry = %entry.name,
            group = %entry.group,
            "Middleware entry start"
        );
        let started = Instant::now();
        let result = entry
            .handler
            .handle(ctx, Next::new(self.entries, self.index + 1));
        trace!(
            request_id = %ctx.request_id(),
            entry = %entry.name,
            ok = result.is_ok(),
            duration_us = started.elapsed().as_micros(),
            "Middleware entry finish"
        );
        result
    }

    /// Number of entries still to run
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.entries.len().saturating_sub(self.index)
    }
}

/// Chain construction failure
#[derive(Debug)]
pub enum ChainConfigError {
    /// An entry names a group missing from the order list
    UnknownGroup { entry: String, group: String },
    /// A group appears twice in the order list
    DuplicateGroup(String),
    /// A middleware binding could not be resolved
    Resolution(DispatchError),
}

impl fmt::Display for ChainConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainConfigError::UnknownGroup { entry, group } => write!(
                f,
                "middleware '{entry}' is in group '{group}', which is not in the chain's group order"
            ),
            ChainConfigError::DuplicateGroup(group) => {
                write!(f, "group '{group}' appears more than once in the group order")
            }
            ChainConfigError::Resolution(err) => {
                write!(f, "failed to resolve middleware binding: {err}")
            }
        }
    }
}

impl std::error::Error for ChainConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ChainConfigError::Resolution(err) => Some(err),
            _ => None,
        }
    }
}

/// Fixed-order chain, computed once and replayed for every request
#[derive(Clone, Debug)]
pub struct MiddlewareChain {
    name: String,
    entries: Vec<Arc<MiddlewareEntry>>,
}

impl MiddlewareChain {
    /// Run the chain from the first entry
    pub fn run(&self, ctx: &mut RequestContext) -> ChainResult {
        Next::new(&self.entries, 0).run(ctx)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn entries(&self) -> &[Arc<MiddlewareEntry>] {
        &self.entries
    }

    /// Entry names in execution order
    #[must_use]
    pub fn entry_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Orders entries by an explicit group list, then by registration order
#[derive(Debug, Clone)]
pub struct ChainBuilder {
    chain: String,
    groups: Vec<String>,
}

impl Default for ChainBuilder {
    fn default() -> Self {
        Self::new(REST_CHAIN)
    }
}

impl ChainBuilder {
    /// Builder for `chain` using the default REST group order
    #[must_use]
    pub fn new(chain: &str) -> Self {
        Self {
            chain: chain.to_string(),
            groups: DEFAULT_GROUP_ORDER.iter().map(|g| (*g).to_string()).collect(),
        }
    }

    /// Replace the group order
    #[must_use]
    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    /// Collect every entry registered for this chain in `scope` or its
    /// ancestors and order it.
    ///
    /// # Errors
    ///
    /// See [`ChainBuilder::build`].
    pub fn build_from_scope(&self, scope: &Arc<Scope>) -> Result<MiddlewareChain, ChainConfigError> {
        let view = scope.create_view(filter_by_tag_value(CHAIN_TAG, &self.chain));
        let entries = view
            .values::<MiddlewareEntry>()
            .map_err(ChainConfigError::Resolution)?;
        self.build(entries)
    }

    /// Order `entries` (given in registration order).
    ///
    /// # Errors
    ///
    /// `UnknownGroup` for an entry outside the group order, `DuplicateGroup`
    /// for a malformed order list.
    pub fn build(
        &self,
        entries: Vec<Arc<MiddlewareEntry>>,
    ) -> Result<MiddlewareChain, ChainConfigError> {
        for (i, group) in self.groups.iter().enumerate() {
            if self.groups[..i].contains(group) {
                return Err(ChainConfigError::DuplicateGroup(group.clone()));
            }
        }

        let mut ranked = Vec::with_capacity(entries.len());
        for entry in entries {
            let rank = self
                .groups
                .iter()
                .position(|g| *g == entry.group)
                .ok_or_else(|| ChainConfigError::UnknownGroup {
                    entry: entry.name.clone(),
                    group: entry.group.clone(),
                })?;
            ranked.push((rank, entry));
        }
        // stable: registration order survives within a group
        ranked.sort_by_key(|(rank, _)| *rank);

        let chain = MiddlewareChain {
            name: self.chain.clone(),
            entries: ranked.into_iter().map(|(_, e)| e).collect(),
        };
        info!(
            chain = %chain.name,
            entries = ?chain.entry_names(),
            "Middleware chain built"
        );
        Ok(chain)
    }
}
