//! Template evaluation with compiled-template caching

use super::functions;
use super::parser::{parse_template, Expr, Segment, Template};
use super::value::Value;
use crate::error::{AuthzError, Result};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Upper bound on distinct compiled templates held at once; callers may
/// feed arbitrary text through `check_constraints`, so the cache must not
/// grow with the input
const TEMPLATE_CACHE_CAPACITY: usize = 1024;

/// Evaluates constraint text against an immutable context value.
///
/// Parsed templates are cached by source text in a capacity-bounded LRU;
/// the cache is thread-safe and the evaluator holds no per-request state,
/// so a single instance serves concurrent checks.
pub struct Evaluator {
    template_cache: Mutex<LruCache<String, Arc<Template>>>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::with_capacity(TEMPLATE_CACHE_CAPACITY)
    }
}

impl Evaluator {
    /// Create a new evaluator with the default cache capacity
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an evaluator holding at most `capacity` compiled templates
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            template_cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Evaluate constraint text against the context root.
    ///
    /// Returns `(matched, rendered_text)`. Text without delimiters is
    /// auto-wrapped as a single boolean expression. The rendered output is
    /// trimmed of blank lines and surrounding whitespace; a match is
    /// exactly the literal `true`.
    ///
    /// # Errors
    /// Malformed template text fails with a `Marshal` error. Predicate
    /// misuse inside a well-formed template degrades to a non-match.
    pub fn evaluate(&self, text: &str, root: &Value) -> Result<(bool, String)> {
        let template = self.compile(text)?;

        let mut rendered = String::new();
        for segment in &template.segments {
            match segment {
                Segment::Literal(literal) => rendered.push_str(literal),
                Segment::Action(expr) => rendered.push_str(&eval(expr, root).render()),
            }
        }

        let trimmed = trim_output(&rendered);
        let matched = trimmed == "true";
        Ok((matched, trimmed))
    }

    /// Number of templates currently cached
    pub fn cached_templates(&self) -> usize {
        self.template_cache.lock().len()
    }

    fn compile(&self, text: &str) -> Result<Arc<Template>> {
        if let Some(cached) = self.template_cache.lock().get(text) {
            return Ok(cached.clone());
        }

        let source = if text.contains(super::parser::OPEN_DELIM) {
            text.to_string()
        } else {
            format!("{{{{{}}}}}", text)
        };

        let template = parse_template(&source)
            .map_err(|e| AuthzError::marshal(e.to_string()))?;
        let template = Arc::new(template);
        self.template_cache
            .lock()
            .put(text.to_string(), template.clone());
        Ok(template)
    }
}

/// Evaluate an expression against the context root
fn eval(expr: &Expr, root: &Value) -> Value {
    match expr {
        Expr::Lit(value) => value.clone(),
        Expr::Field(path) => root.lookup(path).clone(),
        Expr::Call { name, args } => {
            let evaluated: Vec<Value> = args.iter().map(|arg| eval(arg, root)).collect();
            functions::apply(name, &evaluated, root)
        }
    }
}

/// Drop blank lines, trim each remaining line, and trim the whole output
fn trim_output(rendered: &str) -> String {
    rendered
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn context() -> Value {
        let mut principal = BTreeMap::new();
        principal.insert("Username".to_string(), Value::Str("alice".to_string()));
        principal.insert("Age".to_string(), Value::Str("21".to_string()));
        principal.insert("Roles".to_string(), Value::str_seq(["manager"]));
        principal.insert("Action".to_string(), Value::Str("read".to_string()));

        let mut resource = BTreeMap::new();
        resource.insert("Name".to_string(), Value::Str("report".to_string()));
        resource.insert("Capacity".to_string(), Value::Num(5.0));

        let mut root = BTreeMap::new();
        root.insert("Principal".to_string(), Value::Map(principal));
        root.insert("Resource".to_string(), Value::Map(resource));
        root.insert("Region".to_string(), Value::Str("us-west".to_string()));
        Value::Map(root)
    }

    #[test]
    fn test_auto_wrap_without_delimiters() {
        let evaluator = Evaluator::new();
        let (matched, rendered) = evaluator
            .evaluate("EQ .Principal.Age 21", &context())
            .unwrap();
        assert!(matched);
        assert_eq!(rendered, "true");
    }

    #[test]
    fn test_delimited_expression() {
        let evaluator = Evaluator::new();
        let (matched, _) = evaluator
            .evaluate(r#"{{HasRole "manager"}}"#, &context())
            .unwrap();
        assert!(matched);

        let (matched, _) = evaluator
            .evaluate(r#"{{HasRole "admin"}}"#, &context())
            .unwrap();
        assert!(!matched);
    }

    #[test]
    fn test_compound_expression() {
        let evaluator = Evaluator::new();
        let (matched, _) = evaluator
            .evaluate(
                r#"{{and (GE .Principal.Age 18) (BeginsWith .Region "us-")}}"#,
                &context(),
            )
            .unwrap();
        assert!(matched);
    }

    #[test]
    fn test_whitespace_is_trimmed_around_result() {
        let evaluator = Evaluator::new();
        let (matched, rendered) = evaluator
            .evaluate("\n   {{True .Principal.Username}}  \n\n", &context())
            .unwrap();
        assert!(matched);
        assert_eq!(rendered, "true");
    }

    #[test]
    fn test_non_true_output_is_a_non_match() {
        let evaluator = Evaluator::new();
        let (matched, rendered) = evaluator
            .evaluate("{{.Principal.Username}}", &context())
            .unwrap();
        assert!(!matched);
        assert_eq!(rendered, "alice");
    }

    #[test]
    fn test_missing_keys_are_falsy_not_errors() {
        let evaluator = Evaluator::new();
        let (matched, _) = evaluator
            .evaluate("{{True .Principal.DoesNotExist}}", &context())
            .unwrap();
        assert!(!matched);
    }

    #[test]
    fn test_malformed_text_is_marshal_error() {
        let evaluator = Evaluator::new();
        let err = evaluator.evaluate("{{NoSuchFn 1}}", &context());
        assert!(matches!(err, Err(AuthzError::Marshal(_))));

        let err = evaluator.evaluate("{{HasRole \"x\"", &context());
        assert!(matches!(err, Err(AuthzError::Marshal(_))));
    }

    #[test]
    fn test_template_cache_reuse() {
        let evaluator = Evaluator::new();
        let ctx = context();
        evaluator.evaluate("{{true}}", &ctx).unwrap();
        evaluator.evaluate("{{true}}", &ctx).unwrap();
        assert_eq!(evaluator.cached_templates(), 1);

        evaluator.evaluate("{{false}}", &ctx).unwrap();
        assert_eq!(evaluator.cached_templates(), 2);
    }

    #[test]
    fn test_template_cache_is_bounded() {
        let evaluator = Evaluator::with_capacity(2);
        let ctx = context();
        for n in 0..10 {
            let text = format!("{{{{EQ {n} {n}}}}}");
            let (matched, _) = evaluator.evaluate(&text, &ctx).unwrap();
            assert!(matched);
        }
        assert_eq!(evaluator.cached_templates(), 2);

        // Evicted templates still evaluate correctly on recompile
        let (matched, _) = evaluator.evaluate("{{EQ 0 0}}", &ctx).unwrap();
        assert!(matched);
    }

    #[test]
    fn test_nested_calls_render_numbers() {
        let evaluator = Evaluator::new();
        let (matched, _) = evaluator
            .evaluate("{{GT .Resource.Capacity 3}}", &context())
            .unwrap();
        assert!(matched);
    }
}
