//! Port traits defining external boundaries.
//!
//! Each trait represents a boundary between the synthesis core and an
//! external system (time, filesystem, child processes, IDs, the source
//! tree, test-file rendering, credentials). Implementations live in
//! `src/adapters/`.

pub mod clock;
pub mod credentials;
pub mod emitter;
pub mod filesystem;
pub mod id_gen;
pub mod process;
pub mod source;

pub use clock::Clock;
pub use credentials::CredentialProvider;
pub use emitter::TestFileEmitter;
pub use filesystem::FileSystem;
pub use id_gen::IdGenerator;
pub use process::{ProcessFuture, ProcessOutput, ProcessRequest, ProcessRunner};
pub use source::SourceResolver;
