use std::collections::HashMap;

/// Symbol table for `DEF`/`USE` within one document.
///
/// Every identifier that ends up in a document goes through one registry, so
/// names are unique per export and resolvable per import.
#[derive(Debug)]
pub struct DefUseRegistry<T> {
    entries: HashMap<String, T>,
    order: Vec<String>,
}

impl<T> Default for DefUseRegistry<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }
}

impl<T> DefUseRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives a unique identifier from `raw_name` and records `object`
    /// under it. Spaces become underscores; collisions get `_1`, `_2`, …
    pub fn mint(&mut self, raw_name: &str, object: T) -> String {
        let base = match raw_name.trim() {
            "" => String::from("unnamed"),
            name => name.replace(' ', "_"),
        };

        let mut safe_name = base.clone();
        let mut suffix = 1;
        while self.entries.contains_key(&safe_name) {
            safe_name = format!("{}_{}", base, suffix);
            suffix += 1;
        }

        self.insert(safe_name.clone(), object);
        safe_name
    }

    /// Records a `DEF` read from a document. A repeated name replaces the
    /// earlier binding and returns it.
    pub fn register(&mut self, name: &str, object: T) -> Option<T> {
        let previous = self.entries.remove(name);
        if previous.is_some() {
            self.order.retain(|existing| existing != name);
        }
        self.insert(name.to_string(), object);
        previous
    }

    pub fn resolve_use(&self, name: &str) -> Option<&T> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Identifiers in the order they were minted or registered.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    fn insert(&mut self, name: String, object: T) {
        self.order.push(name.clone());
        self.entries.insert(name, object);
    }
}

impl<T: PartialEq> DefUseRegistry<T> {
    /// Reverse lookup: the first identifier bound to `object`.
    pub fn find_name(&self, object: &T) -> Option<&str> {
        self.order
            .iter()
            .find(|name| self.entries.get(*name) == Some(object))
            .map(String::as_str)
    }
}
