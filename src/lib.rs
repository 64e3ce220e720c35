#[macro_use]
extern crate log;

pub mod cli;
pub mod env;
pub mod error;
pub mod ipc;
pub mod launch;
pub mod logger;
pub mod port;
pub mod process;
pub mod procs;
pub mod sentinel;
pub mod settings;
pub mod supervisor;

pub use miette::Result;
