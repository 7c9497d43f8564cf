/// Insertion-ordered mapping from a key to an ordered list of string values.
///
/// Used for query parameters and headers: every value of a key is emitted in
/// order, and keys are emitted in the order they were first inserted. A key
/// mapped to an empty list contributes nothing to the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiValueMap {
    entries: Vec<(String, Vec<String>)>,
}

impl MultiValueMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all values of `key`, keeping its original position if present.
    pub fn insert<K, I, V>(&mut self, key: K, values: I) -> &mut Self
    where
        K: Into<String>,
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let slot = self.entry_mut(key.into());
        slot.clear();
        slot.extend(values.into_iter().map(Into::into));
        self
    }

    /// Append a single value to `key`.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.entry_mut(key.into()).push(value.into());
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Flattened `(key, value)` pairs in emission order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.iter()
            .flat_map(|(k, values)| values.iter().map(move |v| (k, v.as_str())))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry_mut(&mut self, key: String) -> &mut Vec<String> {
        let idx = self
            .entries
            .iter()
            .position(|(k, _)| *k == key)
            .unwrap_or_else(|| {
                self.entries.push((key, Vec::new()));
                self.entries.len() - 1
            });
        &mut self.entries[idx].1
    }
}

impl<K, I, V> FromIterator<(K, I)> for MultiValueMap
where
    K: Into<String>,
    I: IntoIterator<Item = V>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, I)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (key, values) in iter {
            map.entry_mut(key.into())
                .extend(values.into_iter().map(Into::into));
        }
        map
    }
}
