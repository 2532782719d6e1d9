//! Domain types for the refix tool.
//!
//! A serialized script reference is the pair `{fileID: <FileId>, guid: <Guid>}`.
//!
//! - [`file_id`] - Numeric script type identifiers and the hash that derives them
//! - [`guid`] - Opaque content hashes
//!
//! Both types are re-exported at the crate root:
//!
//! ```
//! use refix_core::{FileId, Guid};
//! ```

mod file_id;
mod guid;

pub use file_id::FileId;
pub use guid::Guid;
