//! Decoding of COBOL copybook records into fixed-width rows.
//!
//! Bindings describe record layouts and ship in artifacts under a plugin's
//! user folder. The [`ArtifactScanner`] lists what is available as
//! `identifier[artifact]` tokens, the [`LoaderManager`] loads an artifact in
//! isolation and instantiates its bindings, and [`decode`] turns a host
//! buffer into a row of the width the consumer expects.

pub mod artifact;
pub mod composite;
pub mod config;
pub mod convert;
pub mod error;
pub mod layout;
pub mod loader;
pub mod scan;
pub mod unmarshal;

#[cfg(test)]
mod test_util;

pub use crate::artifact::{
    ArtifactError, ArtifactManifest, BINDING_MARKER, MANIFEST_FORMAT, TypeEntry,
};
pub use crate::composite::{CompositeIdentifier, decode_artifact, decode_identifier, encode};
pub use crate::config::{Cob2RowConfig, PluginLocation};
pub use crate::convert::{HostCharset, NativeValue, PrimitiveConverter, SimpleConverters};
pub use crate::error::{Cob2RowError, DecodeError, Result};
pub use crate::layout::{Binding, FieldLayout, Occurs, Picture, new_host_record};
pub use crate::loader::{ArtifactContext, BindingRegistry, ContextState, LoaderManager};
pub use crate::scan::{ArtifactScanner, scan};
pub use crate::unmarshal::{DecodeStatus, RecordUnmarshaller, Records, Row, Value, decode};
