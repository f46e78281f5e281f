//! Named parameter values for one command.
//!
//! Names are unique case-insensitively and an `@` prefix is optional, so
//! `@CustomerId`, `customerid` and `CUSTOMERID` all address the same entry.
//! Insertion order is preserved; text commands bind in that order when they
//! use positional placeholders.

use crate::db::connection::same_parameter;
use crate::models::{NativeType, Value};

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    name: String,
    /// `None` means "not supplied": the procedure default applies.
    value: Option<Value>,
    native_type: Option<NativeType>,
}

/// The parameter values and explicit type overrides of a command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterStore {
    entries: Vec<Entry>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| same_parameter(&e.name, name))
    }

    fn entry_mut(&mut self, name: &str) -> &mut Entry {
        match self.position(name) {
            Some(i) => &mut self.entries[i],
            None => {
                self.entries.push(Entry {
                    name: name.to_string(),
                    value: None,
                    native_type: None,
                });
                let last = self.entries.len() - 1;
                &mut self.entries[last]
            }
        }
    }

    /// Set a value, replacing any previous value under the same name.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.entry_mut(name).value = Some(value.into());
    }

    /// Mark a parameter as not supplied without forgetting its type override.
    pub fn unset(&mut self, name: &str) {
        if let Some(i) = self.position(name) {
            self.entries[i].value = None;
        }
    }

    /// Remove a parameter entirely.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.position(name)
            .and_then(|i| self.entries.remove(i).value)
    }

    /// Explicitly set the native type a parameter is bound as.
    pub fn set_type(&mut self, name: &str, native_type: NativeType) {
        self.entry_mut(name).native_type = Some(native_type);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.position(name)
            .and_then(|i| self.entries[i].value.as_ref())
    }

    pub fn native_type(&self, name: &str) -> Option<NativeType> {
        self.position(name)
            .and_then(|i| self.entries[i].native_type)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterate over `(name, value)` in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Value>)> {
        self.entries
            .iter()
            .map(|e| (e.name.as_str(), e.value.as_ref()))
    }

    /// Iterate over `(name, value, native type)` in insertion order.
    pub(crate) fn entries(
        &self,
    ) -> impl Iterator<Item = (&str, Option<&Value>, Option<NativeType>)> {
        self.entries
            .iter()
            .map(|e| (e.name.as_str(), e.value.as_ref(), e.native_type))
    }
}

impl<N: AsRef<str>, V: Into<Value>> FromIterator<(N, V)> for ParameterStore {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut store = Self::new();
        for (name, value) in iter {
            store.set(name.as_ref(), value);
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_case_insensitive_and_prefix_agnostic() {
        let mut store = ParameterStore::new();
        store.set("@CustomerId", 1);
        store.set("customerid", 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("CUSTOMERID"), Some(&Value::Int(2)));
        // The first spelling is kept.
        assert_eq!(store.iter().next().map(|(n, _)| n), Some("@CustomerId"));
    }

    #[test]
    fn test_unset_keeps_type_override() {
        let mut store = ParameterStore::new();
        store.set_type("@amount", NativeType::Money);
        store.set("@amount", "12.5");
        store.unset("amount");
        assert_eq!(store.get("@amount"), None);
        assert!(store.contains("@amount"));
        assert_eq!(store.native_type("@AMOUNT"), Some(NativeType::Money));
    }

    #[test]
    fn test_remove_and_order() {
        let mut store: ParameterStore = [("a", 1), ("b", 2), ("c", 3)].into_iter().collect();
        assert_eq!(store.remove("B"), Some(Value::Int(2)));
        let names: Vec<_> = store.iter().map(|(n, _)| n.to_string()).collect();
        assert_eq!(names, vec!["a", "c"]);
        store.clear();
        assert!(store.is_empty());
    }
}
