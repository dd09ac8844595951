//! Route matching and the ambient `$route` value.
//!
//! The router is a thin collaborator over the engine: registered patterns
//! map paths to template ids. Navigation rewrites the `$route` cell
//! (path, bound `:param`s, parsed query string), updates the engine's
//! phase-1 template list, and fetches any still-pending route templates.
//!
//! Matching is first-registration-wins over exact segment counts; a miss
//! leaves `$route.params` empty and the template list cleared.

use std::cell::RefCell;

use serde_json::{Map, Value};

use crate::engine::Engine;

struct RouteDef {
    pattern: String,
    templates: Vec<String>,
}

pub struct Router {
    engine: Engine,
    routes: RefCell<Vec<RouteDef>>,
}

impl Router {
    pub fn new(engine: &Engine) -> Self {
        Self {
            engine: engine.clone(),
            routes: RefCell::new(Vec::new()),
        }
    }

    /// Register a pattern (`/users/:id`) and the template ids its views
    /// need loaded up front.
    pub fn register(&self, pattern: &str, templates: &[&str]) {
        self.routes.borrow_mut().push(RouteDef {
            pattern: pattern.to_string(),
            templates: templates.iter().map(|t| t.to_string()).collect(),
        });
    }

    /// Navigate to the starting location.
    pub fn init(&self) {
        self.push("/");
    }

    /// Navigate. Updates `$route` reactively and blocks on the matched
    /// route's templates.
    pub fn push(&self, location: &str) {
        let (path, query_text) = location.split_once('?').unwrap_or((location, ""));
        let mut params = Map::new();
        let mut templates = Vec::new();
        for route in self.routes.borrow().iter() {
            if let Some(bound) = match_pattern(&route.pattern, path) {
                params = bound;
                templates = route.templates.clone();
                break;
            }
        }
        *self.engine.inner().route_templates.borrow_mut() = templates;
        let mut route = Map::new();
        route.insert("path".to_string(), Value::String(path.to_string()));
        route.insert("params".to_string(), Value::Object(params));
        route.insert("query".to_string(), Value::Object(parse_query(query_text)));
        self.engine
            .write_cell(self.engine.route_cell(), Value::Object(route), false);
        self.engine.load_phase_one();
        self.engine.maybe_flush();
    }

    pub fn current(&self) -> Value {
        self.engine.peek_cell(self.engine.route_cell())
    }
}

/// Segment-wise match; `:name` segments bind their path segment.
fn match_pattern(pattern: &str, path: &str) -> Option<Map<String, Value>> {
    let pattern: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if pattern.len() != segments.len() {
        return None;
    }
    let mut params = Map::new();
    for (expected, actual) in pattern.iter().zip(&segments) {
        match expected.strip_prefix(':') {
            Some(name) => {
                params.insert(name.to_string(), Value::String((*actual).to_string()));
            }
            None if expected == actual => {}
            None => return None,
        }
    }
    Some(params)
}

fn parse_query(text: &str) -> Map<String, Value> {
    let mut query = Map::new();
    for pair in text.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        query.insert(key.to_string(), Value::String(value.to_string()));
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_pattern_params() {
        let params = match_pattern("/users/:id/posts/:post", "/users/7/posts/42").unwrap();
        assert_eq!(params["id"], Value::String("7".to_string()));
        assert_eq!(params["post"], Value::String("42".to_string()));
        assert!(match_pattern("/users/:id", "/teams/7").is_none());
        assert!(match_pattern("/users/:id", "/users").is_none());
        assert!(match_pattern("/", "/").unwrap().is_empty());
    }

    #[test]
    fn test_parse_query() {
        let query = parse_query("a=1&b=&flag");
        assert_eq!(query["a"], Value::String("1".to_string()));
        assert_eq!(query["b"], Value::String(String::new()));
        assert_eq!(query["flag"], Value::String(String::new()));
    }
}
