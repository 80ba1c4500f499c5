//! Translates stack-machine VM code into Hack assembly.

pub mod ast;
pub mod config;
pub mod driver;
pub mod error;
pub mod log;
pub mod parser;
pub mod translator;

pub use config::{BootstrapPolicy, Config};
pub use driver::{plan, run, translate_units, Plan, Unit};
pub use error::{Error, Result};
pub use translator::{GeneratorState, Translator};
