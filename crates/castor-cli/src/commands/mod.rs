pub mod account;
pub mod attrs;
pub mod config;
pub mod mount;
