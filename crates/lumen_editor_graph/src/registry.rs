// SPDX-License-Identifier: MIT OR Apache-2.0
//! Ledgers: per-kind behavior registered once at editor bootstrap.
//!
//! One [`EditorRegistries`] object is built during application start-up and
//! passed by reference to the canvas and panels — there is no ambient
//! global. Lookups are by content class name; unregistered kinds fall back
//! to a default entry.

use crate::content::NodeContent;
use indexmap::IndexMap;

/// Factory pair for one content kind.
pub struct ContentFactory {
    create: Box<dyn Fn() -> Box<dyn NodeContent>>,
    deserialize: Box<dyn Fn(&serde_json::Value) -> Option<Box<dyn NodeContent>>>,
}

impl ContentFactory {
    /// Build a factory from a constructor and a payload deserializer
    pub fn new(
        create: impl Fn() -> Box<dyn NodeContent> + 'static,
        deserialize: impl Fn(&serde_json::Value) -> Option<Box<dyn NodeContent>> + 'static,
    ) -> Self {
        Self {
            create: Box::new(create),
            deserialize: Box::new(deserialize),
        }
    }

    /// Create a fresh content object with default fields
    pub fn create(&self) -> Box<dyn NodeContent> {
        (self.create)()
    }

    /// Rebuild a content object from its persisted payload
    pub fn deserialize(&self, payload: &serde_json::Value) -> Option<Box<dyn NodeContent>> {
        (self.deserialize)(payload)
    }
}

/// Maps content class names to their adapters' factories.
#[derive(Default)]
pub struct TypeLedger {
    factories: IndexMap<String, ContentFactory>,
}

impl TypeLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for a kind
    pub fn register(&mut self, kind: impl Into<String>, factory: ContentFactory) {
        self.factories.insert(kind.into(), factory);
    }

    /// Whether a kind is registered
    pub fn is_registered(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Create fresh content for a kind
    pub fn create(&self, kind: &str) -> Option<Box<dyn NodeContent>> {
        self.factories.get(kind).map(ContentFactory::create)
    }

    /// Rebuild content for a kind from its persisted payload
    pub fn deserialize(&self, kind: &str, payload: &serde_json::Value) -> Option<Box<dyn NodeContent>> {
        self.factories.get(kind)?.deserialize(payload)
    }

    /// Registered kind names, in registration order
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

/// Visual decoration for one node kind.
#[derive(Debug, Clone)]
pub struct DisplayRule {
    /// Header fill color
    pub header_color: [u8; 3],
    /// Header text override; `None` uses the content's display name
    pub header_text: Option<String>,
}

impl Default for DisplayRule {
    fn default() -> Self {
        Self {
            header_color: [70, 100, 130],
            header_text: None,
        }
    }
}

/// Maps node kinds to visual decoration rules.
#[derive(Default)]
pub struct DisplayLedger {
    rules: IndexMap<String, DisplayRule>,
    fallback: DisplayRule,
}

impl DisplayLedger {
    /// Create a ledger with the default fallback rule
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule for a kind
    pub fn register(&mut self, kind: impl Into<String>, rule: DisplayRule) {
        self.rules.insert(kind.into(), rule);
    }

    /// Rule for a kind, falling back to the default
    pub fn rule_for(&self, kind: &str) -> &DisplayRule {
        self.rules.get(kind).unwrap_or(&self.fallback)
    }
}

/// Maps node kinds to the id of the external property editor panel.
#[derive(Default)]
pub struct PropertyLedger {
    editors: IndexMap<String, String>,
}

impl PropertyLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a property editor id for a kind
    pub fn register(&mut self, kind: impl Into<String>, editor: impl Into<String>) {
        self.editors.insert(kind.into(), editor.into());
    }

    /// Editor id for a kind, falling back to the generic editor
    pub fn editor_for(&self, kind: &str) -> &str {
        self.editors.get(kind).map_or("generic", String::as_str)
    }
}

/// Entry in the "add node" search list.
#[derive(Debug, Clone)]
pub struct SearchEntry {
    /// Name shown in the search results
    pub display_name: String,
    /// Additional search keywords
    pub keywords: Vec<String>,
    /// Grouping category
    pub category: String,
}

/// Records which kinds are offered by the "add node" search.
#[derive(Default)]
pub struct NodeLedger {
    entries: IndexMap<String, SearchEntry>,
}

impl NodeLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a search entry for a kind
    pub fn register(&mut self, kind: impl Into<String>, entry: SearchEntry) {
        self.entries.insert(kind.into(), entry);
    }

    /// All entries in registration order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &SearchEntry)> {
        self.entries.iter().map(|(k, e)| (k.as_str(), e))
    }

    /// Kinds whose name or keywords contain the query (case-insensitive)
    pub fn search(&self, query: &str) -> Vec<&str> {
        let needle = query.to_lowercase();
        self.entries
            .iter()
            .filter(|(_, e)| {
                e.display_name.to_lowercase().contains(&needle)
                    || e.keywords.iter().any(|k| k.to_lowercase().contains(&needle))
            })
            .map(|(k, _)| k.as_str())
            .collect()
    }
}

/// The four ledgers bundled for pass-by-reference access.
#[derive(Default)]
pub struct EditorRegistries {
    /// Content adapters per kind
    pub types: TypeLedger,
    /// Visual decoration per kind
    pub display: DisplayLedger,
    /// Property editors per kind
    pub properties: PropertyLedger,
    /// "Add node" search entries
    pub nodes: NodeLedger,
}

impl EditorRegistries {
    /// Create empty registries
    pub fn new() -> Self {
        Self::default()
    }
}
