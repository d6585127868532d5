#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod at;
pub mod config;
pub mod error;
pub mod modem;

pub use error::Error;
