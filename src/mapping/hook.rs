//! Per-field translation hooks.

use crate::mapping::FieldInfo;
use crate::models::Value;
use std::any::Any;
use std::fmt;

/// The outcome of a translation hook for one field.
pub enum Translation {
    /// Apply the default coercion to the raw value.
    Default,
    /// Assign this value verbatim. It must have the field's exact type.
    Override(Box<dyn Any>),
}

impl Translation {
    pub fn value<V: Any>(value: V) -> Self {
        Self::Override(Box::new(value))
    }

    pub fn is_override(&self) -> bool {
        matches!(self, Self::Override(_))
    }
}

impl fmt::Debug for Translation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("Default"),
            Self::Override(_) => f.write_str("Override(..)"),
        }
    }
}

/// Called with the field being assigned and the raw column value.
pub type TranslationHook = dyn Fn(&FieldInfo, &Value) -> Translation;
