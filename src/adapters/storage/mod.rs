//! Provider metadata and publication state storage
//!
//! [`FileProviderStore`] keeps everything in one directory and implements
//! both [`ProviderStore`] and [`StateStorage`].

pub mod file;
pub mod traits;

pub use file::FileProviderStore;
pub use traits::{ProviderStore, StateStorage};
