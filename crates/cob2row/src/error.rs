use std::path::PathBuf;

use thiserror::Error;

/// Failure raised while converting one leaf field or walking a record layout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("buffer truncated: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },
    #[error("invalid digit nibble 0x{nibble:X} in byte {byte_index}")]
    InvalidDigit { nibble: u8, byte_index: usize },
    #[error("invalid zone nibble 0x{zone:X} in byte {byte_index}")]
    InvalidZone { zone: u8, byte_index: usize },
    #[error("invalid sign nibble 0x{0:X}")]
    InvalidSign(u8),
    #[error("value {value} does not fit the declared representation")]
    OutOfRange { value: String },
    #[error("counter {counter} has value {value}, outside [{min}, {max}]")]
    CounterOutOfRange {
        counter: String,
        value: i64,
        min: u32,
        max: u32,
    },
    #[error("counter {0} was not read before it is referenced")]
    UnknownCounter(String),
    #[error("record produced {produced} values but the row holds {width}")]
    TooManyValues { produced: usize, width: usize },
}

/// Top-level error type for the cob2row crate.
#[derive(Debug, Error)]
pub enum Cob2RowError {
    #[error("scan failed on artifact {}: {reason}", .artifact.display())]
    Scan { artifact: PathBuf, reason: String },
    #[error("cannot install loading context for artifact {artifact}: {reason}")]
    LoaderInstall { artifact: String, reason: String },
    #[error("decode failed in {field} at offset {offset}: {source}")]
    Decode {
        field: String,
        offset: usize,
        #[source]
        source: DecodeError,
    },
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, Cob2RowError>;

impl Cob2RowError {
    pub fn scan(artifact: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Cob2RowError::Scan {
            artifact: artifact.into(),
            reason: reason.to_string(),
        }
    }

    pub fn loader_install(artifact: impl Into<String>, reason: impl ToString) -> Self {
        Cob2RowError::LoaderInstall {
            artifact: artifact.into(),
            reason: reason.to_string(),
        }
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Cob2RowError::Configuration(msg.into())
    }

    pub fn decode(field: impl Into<String>, offset: usize, source: DecodeError) -> Self {
        Cob2RowError::Decode {
            field: field.into(),
            offset,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_error_display_names_field_and_offset() {
        let err = Cob2RowError::decode(
            "Order.amount",
            12,
            DecodeError::Truncated {
                needed: 4,
                available: 2,
            },
        );
        assert_eq!(
            err.to_string(),
            "decode failed in Order.amount at offset 12: buffer truncated: needed 4 bytes, 2 available"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn scan_error_display_names_artifact() {
        let err = Cob2RowError::scan("/plugins/user/orders.jar", "expected value at line 1");
        assert!(matches!(err, Cob2RowError::Scan { .. }));
        assert!(err.to_string().contains("orders.jar"));
    }
}
