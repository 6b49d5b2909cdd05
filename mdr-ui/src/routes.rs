//! Route table lookup over the module registry

use mdr_common::modules::{ModuleDescriptor, ModuleRoute};
use mdr_common::ModuleRegistry;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A route resolved for a concrete path
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub module: Arc<ModuleDescriptor>,
    pub route: ModuleRoute,
    pub params: BTreeMap<String, String>,
}

fn segments(path: &str) -> Vec<&str> {
    let path = path.split(['?', '#']).next().unwrap_or("");
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Match one route pattern; returns captured params and the literal segment count
fn match_route(pattern: &str, exact: bool, path: &[&str]) -> Option<(BTreeMap<String, String>, usize)> {
    let pattern = segments(pattern);
    if pattern.len() > path.len() || (exact && pattern.len() != path.len()) {
        return None;
    }

    let mut params = BTreeMap::new();
    let mut literals = 0;
    for (p, s) in pattern.iter().zip(path) {
        match p.strip_prefix(':') {
            Some(name) => {
                params.insert(name.to_string(), s.to_string());
            }
            None if p == s => literals += 1,
            None => return None,
        }
    }
    Some((params, literals))
}

/// Find the most specific route of an enabled module for `path`
///
/// Longer patterns win over prefixes, then literal segments win over params,
/// so `/formulations/new` beats `/formulations/:id`.
pub fn resolve(registry: &ModuleRegistry, path: &str) -> Option<RouteMatch> {
    let path_segments = segments(path);
    let mut best: Option<((usize, usize), RouteMatch)> = None;

    for module in registry.enabled_modules() {
        for route in module.routes() {
            let Some((params, literals)) = match_route(&route.path, route.exact, &path_segments) else {
                continue;
            };
            let score = (segments(&route.path).len(), literals);
            if best.as_ref().map_or(true, |(s, _)| score > *s) {
                best = Some((
                    score,
                    RouteMatch {
                        module: module.clone(),
                        route: route.clone(),
                        params,
                    },
                ));
            }
        }
    }
    best.map(|(_, m)| m)
}
