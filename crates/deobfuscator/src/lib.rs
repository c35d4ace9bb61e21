//! Reverses the transformations applied by obfuscator.io style JavaScript obfuscators.
//!
//! [`deobfuscate`] parses a program, runs the enabled passes until a sweep changes nothing and
//! prints the result. [`Deobfuscator`] does the same for an already parsed module.

pub mod binding;
pub mod config;
mod deobfuscator;
pub mod matchers;
pub mod mutate;
pub mod proxy;
pub mod string_revealer;
pub mod transformation;
pub mod transformations;
pub mod utils;

pub use config::{Config, TransformationConfig, TransformationKey};
pub use deobfuscator::*;
pub use transformation::{Diagnostic, Outcome};
