/*!
 * Core Module
 * Primitive types shared across subsystems
 */

pub mod types;

pub use types::Pid;
