//! Event source implementations.

#[cfg(feature = "scripted")]
pub mod scripted;

#[cfg(feature = "scripted")]
pub use scripted::ScriptedSource;
