//! CLI command implementations

pub mod export;
pub mod init;
pub mod publish;
pub mod status;
pub mod validate;
