//! Insertion-ordered header map with case-insensitive names.

use indexmap::IndexMap;

/// Ordered header map. Iteration follows insertion order, which is also the
/// order headers are written on the wire. Names compare ASCII
/// case-insensitively; replacing a header keeps its original position and
/// spelling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    inner: IndexMap<String, String>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.inner.keys().position(|k| k.eq_ignore_ascii_case(name))
    }

    /// Set a header, overwriting any existing value under the same name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(idx) => {
                if let Some((_, slot)) = self.inner.get_index_mut(idx) {
                    *slot = value;
                }
            }
            None => {
                self.inner.insert(name, value);
            }
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name)
            .and_then(|idx| self.inner.get_index(idx))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Remove a header, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let idx = self.position(name)?;
        self.inner.shift_remove_index(idx).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.set(k, v);
        }
        headers
    }
}
