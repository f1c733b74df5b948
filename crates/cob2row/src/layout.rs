//! Record layouts and the bindings built from them.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Cob2RowError, Result};

/// Largest digit count a packed or zoned field may declare.
pub const MAX_DECIMAL_DIGITS: u8 = 18;

/// Storage format of a leaf field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Picture {
    /// `PIC X(n)`.
    Alphanumeric { length: usize },
    /// `COMP` big-endian two's complement (or unsigned) integer.
    Binary { bytes: u8, signed: bool },
    /// `COMP-3`.
    PackedDecimal { digits: u8, scale: u8, signed: bool },
    /// `DISPLAY` numeric, one digit per byte.
    ZonedDecimal { digits: u8, scale: u8, signed: bool },
}

impl Picture {
    /// Bytes occupied by one value of this picture.
    pub fn byte_length(&self) -> usize {
        match *self {
            Picture::Alphanumeric { length } => length,
            Picture::Binary { bytes, .. } => bytes as usize,
            Picture::PackedDecimal { digits, .. } => digits as usize / 2 + 1,
            Picture::ZonedDecimal { digits, .. } => digits as usize,
        }
    }

    /// Whether values of this picture are integers and may act as counters.
    pub fn is_integer(&self) -> bool {
        match *self {
            Picture::Alphanumeric { .. } => false,
            Picture::Binary { .. } => true,
            Picture::PackedDecimal { scale, .. } | Picture::ZonedDecimal { scale, .. } => scale == 0,
        }
    }

    fn validate(&self, path: &str) -> Result<()> {
        let problem = match *self {
            Picture::Alphanumeric { length: 0 } => Some("alphanumeric length must be positive".to_string()),
            Picture::Binary { bytes, .. } if !matches!(bytes, 2 | 4 | 8) => {
                Some(format!("binary width {bytes} must be 2, 4 or 8 bytes"))
            }
            Picture::PackedDecimal { digits, scale, .. }
            | Picture::ZonedDecimal { digits, scale, .. } => {
                if digits == 0 || digits > MAX_DECIMAL_DIGITS {
                    Some(format!("digit count {digits} must be within 1..={MAX_DECIMAL_DIGITS}"))
                } else if scale > digits {
                    Some(format!("scale {scale} exceeds digit count {digits}"))
                } else {
                    None
                }
            }
            _ => None,
        };
        match problem {
            Some(problem) => Err(Cob2RowError::configuration(format!("{path}: {problem}"))),
            None => Ok(()),
        }
    }
}

/// Repetition of a field (`OCCURS`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurs {
    #[serde(default)]
    pub min: u32,
    pub max: u32,
    /// Name of an earlier integer leaf holding the actual count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depending_on: Option<String>,
}

impl Occurs {
    pub fn fixed(count: u32) -> Self {
        Self {
            min: count,
            max: count,
            depending_on: None,
        }
    }

    pub fn depending_on(min: u32, max: u32, counter: impl Into<String>) -> Self {
        Self {
            min,
            max,
            depending_on: Some(counter.into()),
        }
    }

    /// An optional group: present once or absent, as told by `counter`.
    pub fn optional(counter: impl Into<String>) -> Self {
        Self::depending_on(0, 1, counter)
    }
}

/// One node of a record layout: a leaf with a picture or a group of
/// children, either of which may repeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldLayout {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurs: Option<Occurs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<Picture>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldLayout>,
}

impl FieldLayout {
    pub fn leaf(name: impl Into<String>, picture: Picture) -> Self {
        Self {
            name: name.into(),
            occurs: None,
            picture: Some(picture),
            fields: Vec::new(),
        }
    }

    pub fn group(name: impl Into<String>, fields: Vec<FieldLayout>) -> Self {
        Self {
            name: name.into(),
            occurs: None,
            picture: None,
            fields,
        }
    }

    pub fn with_occurs(mut self, occurs: Occurs) -> Self {
        self.occurs = Some(occurs);
        self
    }

    pub fn is_group(&self) -> bool {
        self.picture.is_none()
    }

    fn max_occurrences(&self) -> usize {
        self.occurs
            .as_ref()
            .map_or(1, |o| usize::try_from(o.max).unwrap_or(usize::MAX))
    }

    // `None` when the size does not fit a usize.
    fn max_byte_length(&self) -> Option<usize> {
        let single = match &self.picture {
            Some(picture) => picture.byte_length(),
            None => self.fields.iter().try_fold(0usize, |total, field| {
                total.checked_add(field.max_byte_length()?)
            })?,
        };
        single.checked_mul(self.max_occurrences())
    }

    fn max_value_count(&self) -> Option<usize> {
        let single = match &self.picture {
            Some(_) => 1,
            None => self.fields.iter().try_fold(0usize, |total, field| {
                total.checked_add(field.max_value_count()?)
            })?,
        };
        single.checked_mul(self.max_occurrences())
    }

    /// Checks the tree in declaration order and resolves every
    /// `depending_on` to the path of the counter it names.
    fn validate(&self, parent: &str, repeated: bool, scope: &mut CounterScope) -> Result<()> {
        let path = if parent.is_empty() {
            self.name.clone()
        } else {
            format!("{parent}.{}", self.name)
        };
        let fail = |msg: String| Err(Cob2RowError::configuration(format!("{path}: {msg}")));

        if self.name.is_empty() {
            return fail("field name must not be empty".to_string());
        }
        if let Some(occurs) = &self.occurs {
            if occurs.min > occurs.max {
                return fail(format!("occurs min {} exceeds max {}", occurs.min, occurs.max));
            }
            match &occurs.depending_on {
                Some(counter) => match scope.visible.get(counter) {
                    Some(Some(counter_path)) => {
                        scope.resolved.insert(path.clone(), counter_path.clone());
                    }
                    Some(None) => {
                        return fail(format!("counter {counter} is declared more than once"));
                    }
                    None => {
                        return fail(format!(
                            "counter {counter} must be an integer field declared earlier, outside any repeating group"
                        ));
                    }
                },
                None if occurs.min != occurs.max => {
                    return fail("variable occurs needs a depending_on counter".to_string());
                }
                None => {}
            }
        }

        match &self.picture {
            Some(picture) => {
                if !self.fields.is_empty() {
                    return fail("a field cannot have both a picture and children".to_string());
                }
                picture.validate(&path)?;
                if picture.is_integer() && self.occurs.is_none() && !repeated {
                    scope
                        .visible
                        .entry(self.name.clone())
                        .and_modify(|seen| *seen = None)
                        .or_insert_with(|| Some(path.clone()));
                }
            }
            None => {
                if self.fields.is_empty() {
                    return fail("a group needs at least one child".to_string());
                }
                let repeated = repeated || self.occurs.is_some();
                for field in &self.fields {
                    field.validate(&path, repeated, scope)?;
                }
            }
        }
        Ok(())
    }
}

/// Counters seen so far while validating a layout.
#[derive(Debug, Default)]
struct CounterScope {
    /// Counter name to its path; `None` once the name is ambiguous.
    visible: HashMap<String, Option<String>>,
    /// Path of each variable field to the path of its counter.
    resolved: HashMap<String, String>,
}

/// A validated record layout, ready to drive decoding.
///
/// Bindings are immutable. Decoding state lives in each decode call, so one
/// binding may serve several threads at once.
#[derive(Debug, Clone)]
pub struct Binding {
    name: String,
    layout: Arc<FieldLayout>,
    byte_length: usize,
    max_value_count: usize,
    counters: Arc<HashMap<String, String>>,
    counter_paths: Arc<HashSet<String>>,
}

impl Binding {
    pub fn new(name: impl Into<String>, layout: FieldLayout) -> Result<Self> {
        let name = name.into();
        let mut scope = CounterScope::default();
        layout
            .validate("", false, &mut scope)
            .map_err(|err| match err {
                Cob2RowError::Configuration(msg) => {
                    Cob2RowError::configuration(format!("binding {name}: {msg}"))
                }
                other => other,
            })?;
        let too_large =
            || Cob2RowError::configuration(format!("binding {name}: layout too large"));
        let byte_length = layout.max_byte_length().ok_or_else(too_large)?;
        let max_value_count = layout.max_value_count().ok_or_else(too_large)?;
        if byte_length == 0 {
            return Err(Cob2RowError::configuration(format!(
                "binding {name}: layout occupies no bytes"
            )));
        }
        let counter_paths = scope.resolved.values().cloned().collect();
        Ok(Self {
            name,
            layout: Arc::new(layout),
            byte_length,
            max_value_count,
            counters: Arc::new(scope.resolved),
            counter_paths: Arc::new(counter_paths),
        })
    }

    /// Path of the counter driving the variable field at `field_path`.
    pub(crate) fn counter_for(&self, field_path: &str) -> Option<&str> {
        self.counters.get(field_path).map(String::as_str)
    }

    /// Whether the leaf at `leaf_path` is referenced as a counter.
    pub(crate) fn is_counter(&self, leaf_path: &str) -> bool {
        self.counter_paths.contains(leaf_path)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layout(&self) -> &FieldLayout {
        &self.layout
    }

    /// Largest encoded size of any record of this layout.
    pub fn byte_length(&self) -> usize {
        self.byte_length
    }

    /// Leaf values produced when every repeating field is at its maximum.
    pub fn max_value_count(&self) -> usize {
        self.max_value_count
    }
}

/// Allocates a buffer large enough for the largest record of `binding`.
pub fn new_host_record(binding: &Binding) -> Vec<u8> {
    vec![0u8; binding.byte_length()]
}
