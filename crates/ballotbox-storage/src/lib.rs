//! Concrete storage for the ballot store: key management, ballot sealing with
//! AES-256-GCM, and a JSON file-backed record store with atomic replace.

pub mod cipher;
pub mod json_file_store;
pub mod key_provider;
