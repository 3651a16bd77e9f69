//! Ordered namespace tokens used to scope configuration trees.
//!
//! A namespace is a plain token — an environment name, a role, a hostname —
//! that selects which branches of a tree apply. Order matters: branches are
//! merged in token order, so later tokens override earlier ones on conflict.

/// Ordered collection of namespace tokens. Duplicates are dropped on add.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceSet {
    entries: Vec<String>,
}

impl NamespaceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a token, keeping the first occurrence if already present.
    pub fn add(&mut self, token: impl Into<String>) {
        let token = token.into();
        if !self.entries.contains(&token) {
            self.entries.push(token);
        }
    }

    /// Two sets combine by concatenation: `self`'s tokens first, then
    /// `other`'s that aren't already present.
    pub fn concat(&self, other: &NamespaceSet) -> NamespaceSet {
        let mut combined = self.clone();
        for token in &other.entries {
            combined.add(token.clone());
        }
        combined
    }

    pub fn contains(&self, token: &str) -> bool {
        self.entries.iter().any(|t| t == token)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<S: Into<String>> FromIterator<S> for NamespaceSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = NamespaceSet::new();
        for token in iter {
            set.add(token);
        }
        set
    }
}
