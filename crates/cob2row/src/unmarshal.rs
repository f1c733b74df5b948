//! Flattening of host records into fixed-width rows.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::convert::{NativeValue, PrimitiveConverter};
use crate::error::{Cob2RowError, DecodeError, Result};
use crate::layout::{Binding, FieldLayout};

/// One cell of a decoded row.
///
/// The row model has a single integer type, so every integer width a
/// converter produces is widened to `Integer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Decimal(Decimal),
    Text(String),
}

impl From<NativeValue> for Value {
    fn from(value: NativeValue) -> Self {
        match value {
            NativeValue::Short(v) => Value::Integer(i64::from(v)),
            NativeValue::Int(v) => Value::Integer(i64::from(v)),
            NativeValue::Long(v) => Value::Integer(v),
            NativeValue::Decimal(v) => Value::Decimal(v),
            NativeValue::Text(v) => Value::Text(v),
        }
    }
}

pub type Row = Vec<Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DecodeStatus {
    /// Bytes of the input the record occupied; the next record starts here.
    pub bytes_consumed: usize,
}

/// Decodes one record at the start of `buffer` into a row of exactly
/// `target_width` values, padding with [`Value::Null`].
pub fn decode<C: PrimitiveConverter>(
    binding: &Binding,
    buffer: &[u8],
    target_width: usize,
    converter: &C,
) -> Result<(Row, DecodeStatus)> {
    let mut walker = Walker {
        binding,
        converter,
        buffer,
        offset: 0,
        counters: HashMap::new(),
        values: Vec::with_capacity(target_width),
    };
    walker.field(binding.layout(), "")?;

    let Walker { values, offset, .. } = walker;
    if values.len() > target_width {
        return Err(Cob2RowError::decode(
            binding.name(),
            offset,
            DecodeError::TooManyValues {
                produced: values.len(),
                width: target_width,
            },
        ));
    }
    let mut row: Row = values.into_iter().map(Value::from).collect();
    row.resize(target_width, Value::Null);
    Ok((
        row,
        DecodeStatus {
            bytes_consumed: offset,
        },
    ))
}

/// Depth-first cursor over one record.
struct Walker<'a, C> {
    binding: &'a Binding,
    converter: &'a C,
    buffer: &'a [u8],
    offset: usize,
    /// Counter values keyed by leaf path.
    counters: HashMap<String, i64>,
    values: Vec<NativeValue>,
}

impl<C: PrimitiveConverter> Walker<'_, C> {
    fn field(&mut self, field: &FieldLayout, parent: &str) -> Result<()> {
        let path = if parent.is_empty() {
            field.name.clone()
        } else {
            format!("{parent}.{}", field.name)
        };
        for _ in 0..self.occurrences(field, &path)? {
            match &field.picture {
                Some(picture) => {
                    let (value, len) = self
                        .converter
                        .convert(picture, self.buffer, self.offset)
                        .map_err(|err| Cob2RowError::decode(path.as_str(), self.offset, err))?;
                    if let Some(count) = value.as_i64().filter(|_| self.binding.is_counter(&path)) {
                        self.counters.insert(path.clone(), count);
                    }
                    self.values.push(value);
                    self.offset += len;
                }
                None => {
                    for child in &field.fields {
                        self.field(child, &path)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn occurrences(&self, field: &FieldLayout, path: &str) -> Result<u32> {
        let Some(occurs) = &field.occurs else {
            return Ok(1);
        };
        let Some(counter) = &occurs.depending_on else {
            return Ok(occurs.max);
        };
        let fail = |err| Cob2RowError::decode(path, self.offset, err);
        let value = self
            .binding
            .counter_for(path)
            .and_then(|counter_path| self.counters.get(counter_path))
            .copied()
            .ok_or_else(|| fail(DecodeError::UnknownCounter(counter.clone())))?;
        if value < i64::from(occurs.min) || value > i64::from(occurs.max) {
            return Err(fail(DecodeError::CounterOutOfRange {
                counter: counter.clone(),
                value,
                min: occurs.min,
                max: occurs.max,
            }));
        }
        Ok(value as u32)
    }
}

/// A binding paired with a converter and the row width it must fill.
#[derive(Debug, Clone)]
pub struct RecordUnmarshaller<C> {
    binding: Binding,
    converter: C,
    target_width: usize,
}

impl<C: PrimitiveConverter> RecordUnmarshaller<C> {
    /// Fails when the binding can produce more values than the row holds.
    pub fn new(binding: Binding, converter: C, target_width: usize) -> Result<Self> {
        if binding.max_value_count() > target_width {
            return Err(Cob2RowError::configuration(format!(
                "binding {} produces up to {} values but the row has {target_width} columns",
                binding.name(),
                binding.max_value_count()
            )));
        }
        Ok(Self::unchecked(binding, converter, target_width))
    }

    /// Skips the width check; records that overflow the row still fail when
    /// decoded.
    pub fn unchecked(binding: Binding, converter: C, target_width: usize) -> Self {
        Self {
            binding,
            converter,
            target_width,
        }
    }

    pub fn binding(&self) -> &Binding {
        &self.binding
    }

    pub fn target_width(&self) -> usize {
        self.target_width
    }

    pub fn decode(&self, buffer: &[u8]) -> Result<(Row, DecodeStatus)> {
        decode(&self.binding, buffer, self.target_width, &self.converter)
    }

    /// Iterates the records concatenated in `buffer`.
    pub fn records<'a>(&'a self, buffer: &'a [u8]) -> Records<'a, C> {
        Records {
            unmarshaller: self,
            buffer,
            offset: 0,
            done: false,
        }
    }
}

/// Iterator over concatenated records; stops after the first error.
#[derive(Debug)]
pub struct Records<'a, C> {
    unmarshaller: &'a RecordUnmarshaller<C>,
    buffer: &'a [u8],
    offset: usize,
    done: bool,
}

impl<'a, C> Records<'a, C> {
    /// Offset of the next record within the buffer.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl<C: PrimitiveConverter> Iterator for Records<'_, C> {
    type Item = Result<(Row, DecodeStatus)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.offset >= self.buffer.len() {
            return None;
        }
        match self.unmarshaller.decode(&self.buffer[self.offset..]) {
            Ok((row, status)) => {
                if status.bytes_consumed == 0 {
                    self.done = true;
                } else {
                    self.offset += status.bytes_consumed;
                }
                Some(Ok((row, status)))
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
