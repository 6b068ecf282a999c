//! Topic exchange routing: queue bindings and routing key matching
//!
//! Routing keys are dot separated words. In a binding pattern `*` matches exactly one word
//! and `#` matches zero or more words.

use crate::configuration::Configuration;
use crate::jobs::Category;

/// Queue consumed by solver workers
pub const FEEDS_QUEUE: &str = "feeds";
/// Queue consumed by the result collector
pub const RESULTS_QUEUE: &str = "results";
/// Queue for tasks handled inside the orchestrating process
pub const LOCALS_QUEUE: &str = "locals";
/// Queue carrying cancellation requests to workers
pub const CONTROL_QUEUE: &str = "control";
pub const DEFAULT_QUEUE: &str = "default";

/// A queue bound to the exchange with a routing key pattern
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Binding {
    pub queue: String,
    pub pattern: String,
}

impl Binding {
    pub fn new(queue: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            pattern: pattern.into(),
        }
    }
}

/// Bindings of one topic exchange plus the key prefixes used to build routing keys
#[derive(Clone, Debug, PartialEq)]
pub struct RoutingTable {
    exchange: String,
    feed_prefix: String,
    result_prefix: String,
    control_key: String,
    bindings: Vec<Binding>,
}

impl RoutingTable {
    /// The standard queue layout for `config`
    pub fn from_configuration(config: &Configuration) -> Self {
        let control_word = config
            .control_key
            .split('.')
            .next()
            .unwrap_or(config.control_key.as_str());
        Self {
            exchange: config.exchange.clone(),
            feed_prefix: config.feed_prefix.clone(),
            result_prefix: config.result_prefix.clone(),
            control_key: config.control_key.clone(),
            bindings: vec![
                Binding::new(FEEDS_QUEUE, format!("{}.#", config.feed_prefix)),
                Binding::new(RESULTS_QUEUE, format!("{}.#", config.result_prefix)),
                Binding::new(LOCALS_QUEUE, "local.#"),
                Binding::new(CONTROL_QUEUE, format!("{control_word}.#")),
                Binding::new(DEFAULT_QUEUE, "task.#"),
            ],
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn with_binding(mut self, binding: Binding) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Routing key of requests of `category`
    pub fn feed_key(&self, category: Category) -> String {
        format!("{}.{}", self.feed_prefix, category)
    }

    /// Routing key of results of `category`
    pub fn result_key(&self, category: Category) -> String {
        format!("{}.{}", self.result_prefix, category)
    }

    pub fn control_key(&self) -> &str {
        &self.control_key
    }

    /// Queues a message with `routing_key` is delivered to, each at most once
    pub fn route(&self, routing_key: &str) -> Vec<&str> {
        let mut queues: Vec<&str> = Vec::new();
        for binding in &self.bindings {
            if topic_matches(&binding.pattern, routing_key) && !queues.contains(&binding.queue.as_str()) {
                queues.push(binding.queue.as_str());
            }
        }
        queues
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::from_configuration(&Configuration::current())
    }
}

/// Whether `routing_key` matches the binding `pattern`
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    matches_words(&pattern, &key)
}

fn matches_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| matches_words(rest, &key[skip..])),
        Some((word, rest)) => match key.split_first() {
            Some((key_word, key_rest)) => {
                (*word == "*" || word == key_word) && matches_words(rest, key_rest)
            }
            None => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcards() {
        assert!(topic_matches("feed.#", "feed.fba"));
        assert!(topic_matches("feed.#", "feed"));
        assert!(topic_matches("feed.#", "feed.fva.loopless"));
        assert!(!topic_matches("feed.#", "result.fba"));
        assert!(topic_matches("feed.*", "feed.fva"));
        assert!(!topic_matches("feed.*", "feed"));
        assert!(!topic_matches("feed.*", "feed.fva.loopless"));
        assert!(topic_matches("#.fba", "result.fba"));
        assert!(topic_matches("#", "anything.at.all"));
        assert!(topic_matches("*.fba.#", "feed.fba"));
        assert!(!topic_matches("feed.fba", "feed.fva"));
    }

    #[test]
    fn standard_layout_routes_by_prefix() {
        let table = RoutingTable::from_configuration(&Configuration::default());
        assert_eq!(table.feed_key(Category::Fba), "feed.fba");
        assert_eq!(table.result_key(Category::Fva), "result.fva");
        assert_eq!(table.route("feed.fva"), vec![FEEDS_QUEUE]);
        assert_eq!(table.route("result.fba"), vec![RESULTS_QUEUE]);
        assert_eq!(table.route(table.control_key()), vec![CONTROL_QUEUE]);
        assert_eq!(table.route("local.cleanup"), vec![LOCALS_QUEUE]);
        assert_eq!(table.route("task.default"), vec![DEFAULT_QUEUE]);
        assert!(table.route("unknown.key").is_empty());
    }

    #[test]
    fn extra_bindings_fan_out_once_per_queue() {
        let table = RoutingTable::from_configuration(&Configuration::default())
            .with_binding(Binding::new("audit", "#"))
            .with_binding(Binding::new("audit", "result.*"));
        assert_eq!(table.route("result.fba"), vec![RESULTS_QUEUE, "audit"]);
    }
}
