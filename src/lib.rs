//! docbind - format-preserving binding between YAML/JSON documents and typed models
//!
//! Three passes over one document:
//! - decode: AST → records (`Slot` fields that remember their nodes)
//! - populate: record → plain domain struct
//! - sync: mutated domain struct → record + AST patched in place

pub mod ast;
pub mod decode;
pub mod error;
pub mod errors;
pub mod extensions;
pub mod hooks;
pub mod jsonpointer;
pub mod limits;
mod macros;
pub mod populate;
pub mod record;
pub mod registry;
pub mod sequenced_map;
pub mod slot;
pub mod sync;

#[cfg(any(test, feature = "test-fixtures"))]
pub mod test_fixtures;

pub use ast::NodeRef;
pub use decode::{Bind, Decoded, Decoder, Shape};
pub use error::{BindError, FixSuggestion, Result};
pub use errors::{Severity, ValidationError, ValidationErrorKind};
pub use extensions::{get_extension, set_extension, CoreExtensions, Extensions};
pub use hooks::{Either, Plain};
pub use limits::BindLimits;
pub use populate::{populate, FromCore};
pub use record::{Model, Record, RecordMeta};
pub use registry::{FieldDescriptor, Registry};
pub use sequenced_map::{MapKey, SequencedMap, UntypedMap};
pub use slot::Slot;
pub use sync::{sync, sync_in, sync_with, Source, SyncCore, SyncCtx};

/// Decode `node` (a document or any node) with the global registry
pub fn decode<T: Bind>(node: &NodeRef) -> Result<Decoded<T>> {
    Decoder::default().decode::<T>(node)
}

/// Load and decode YAML/JSON text with the global registry
pub fn decode_str<T: Bind>(text: &str) -> Result<Decoded<T>> {
    Decoder::default().decode_str::<T>(text)
}

/// Decode `text` and populate model `M` from the resulting record
pub fn load<M>(text: &str) -> Result<(M, Vec<ValidationError>)>
where
    M: Model + FromCore<<M as Model>::Core>,
{
    let (core, errors) = decode_str::<M::Core>(text)?;
    Ok((populate::<M>(&core)?, errors))
}
