//! Radix tree implementation for HTTP route matching
//!
//! Paths are split into segments and stored in a tree where:
//! - Each node represents a path segment
//! - Static segments (e.g., `recipes`) match exactly
//! - Parameter segments (e.g., `{id}`) match any single segment
//! - Routes are stored at terminal nodes in registration order, one per method
//!
//! Lookup is O(k) in the path length for static paths. Static children are
//! always tried before parameter children, and a failed branch backtracks so
//! that `/recipes/{id}/reviews` and `/recipes/featured` can coexist.
//! Parameter children at the same position are tried in the order they were
//! first registered.

use http::Method;
use std::borrow::Cow;
use std::sync::Arc;

use super::core::ParamVec;
use super::spec::RouteSpec;

/// Node in the radix tree
#[derive(Clone, Default)]
struct RadixNode {
    /// The path segment this node represents (without leading /)
    segment: Cow<'static, str>,
    /// Routes terminating at this node, in registration order
    routes: Vec<(Method, Arc<RouteSpec>)>,
    /// Parameter name if this segment is a path parameter (e.g., "{id}" -> Some("id"))
    param_name: Option<Arc<str>>,
    /// Static children
    children: Vec<RadixNode>,
    /// Parameter children, one per distinct parameter name, in registration order
    param_children: Vec<RadixNode>,
}

impl RadixNode {
    fn new(segment: Cow<'static, str>) -> Self {
        Self {
            segment,
            ..Self::default()
        }
    }

    fn new_param(param_name: &str) -> Self {
        Self {
            param_name: Some(Arc::from(param_name)),
            ..Self::default()
        }
    }

    fn insert(&mut self, segments: &[&str], route: Arc<RouteSpec>) {
        let Some((&segment, remaining)) = segments.split_first() else {
            self.routes.push((route.method.clone(), route));
            return;
        };

        if let Some(param_name) = param_name_of(segment) {
            if let Some(child) = self
                .param_children
                .iter_mut()
                .find(|c| c.param_name.as_deref() == Some(param_name))
            {
                child.insert(remaining, route);
                return;
            }
            let mut child = RadixNode::new_param(param_name);
            child.insert(remaining, route);
            self.param_children.push(child);
            return;
        }

        if let Some(child) = self.children.iter_mut().find(|c| c.segment == segment) {
            child.insert(remaining, route);
            return;
        }
        let mut child = RadixNode::new(Cow::Owned(segment.to_string()));
        child.insert(remaining, route);
        self.children.push(child);
    }

    fn route_for(&self, method: &Method) -> Option<&Arc<RouteSpec>> {
        self.routes
            .iter()
            .find(|(m, _)| m == method)
            .map(|(_, route)| route)
    }

    fn search(
        &self,
        segments: &[&str],
        method: &Method,
        params: &mut ParamVec,
    ) -> Option<Arc<RouteSpec>> {
        let Some((&segment, remaining)) = segments.split_first() else {
            return self.route_for(method).cloned();
        };

        for child in &self.children {
            if child.segment == segment {
                if let Some(route) = child.search(remaining, method, params) {
                    return Some(route);
                }
            }
        }

        for param_child in &self.param_children {
            if let Some(ref param_name) = param_child.param_name {
                params.push((Arc::clone(param_name), decode_segment(segment)));
                if let Some(route) = param_child.search(remaining, method, params) {
                    return Some(route);
                }
                // Backtrack: remove the parameter if the search fails
                params.pop();
            }
        }

        None
    }

    /// Collect the methods of every route whose pattern matches `segments`
    fn collect_methods(&self, segments: &[&str], allowed: &mut Vec<Method>) {
        let Some((&segment, remaining)) = segments.split_first() else {
            for (method, _) in &self.routes {
                if !allowed.contains(method) {
                    allowed.push(method.clone());
                }
            }
            return;
        };
        for child in self.children.iter().filter(|c| c.segment == segment) {
            child.collect_methods(remaining, allowed);
        }
        for param_child in &self.param_children {
            param_child.collect_methods(remaining, allowed);
        }
    }
}

/// `{name}` → `Some("name")`
pub(super) fn param_name_of(segment: &str) -> Option<&str> {
    segment
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
}

fn decode_segment(segment: &str) -> String {
    match urlencoding::decode(segment) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => segment.to_string(),
    }
}

/// Split a path into non-empty segments
pub(super) fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Segment tree over registered routes
#[derive(Clone, Default)]
pub struct RadixRouter {
    root: RadixNode,
}

impl RadixRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a route under an already-normalized pattern
    pub fn insert(&mut self, pattern: &str, route: Arc<RouteSpec>) {
        let segments = split_path(pattern);
        self.root.insert(&segments, route);
    }

    /// Match a request path, returning the route and decoded path parameters
    #[must_use]
    pub fn route(&self, method: &Method, path: &str) -> Option<(Arc<RouteSpec>, ParamVec)> {
        let segments = split_path(path);
        let mut params = ParamVec::new();
        let route = self.root.search(&segments, method, &mut params)?;
        Some((route, params))
    }

    /// Methods registered for any pattern matching `path`, in registration order
    #[must_use]
    pub fn allowed_methods(&self, path: &str) -> Vec<Method> {
        let segments = split_path(path);
        let mut allowed = Vec::new();
        self.root.collect_methods(&segments, &mut allowed);
        allowed
    }
}
