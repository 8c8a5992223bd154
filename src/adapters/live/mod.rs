//! Live adapters for real external interactions.

pub mod clock;
pub mod credentials;
pub mod emitter;
pub mod filesystem;
pub mod id_gen;
pub mod process;
pub mod source;
