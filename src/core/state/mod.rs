// Publication state: last published fingerprint per source

pub mod manager;
pub mod publication;

pub use manager::StateManager;
pub use publication::{PublicationRecord, PublicationRecordBuilder, PublicationStatus};
