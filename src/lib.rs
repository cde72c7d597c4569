pub mod audit;
pub mod cipher;
pub mod classify;
pub mod cli;
pub mod config;
pub mod error;
pub mod keystore;
