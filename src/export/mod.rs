//! Artifact assembly and persistence.
//!
//! An [`Artifact`] is built by the group completion barrier and handed to an
//! [`ArtifactSink`] exactly once per group.

pub mod artifact;
pub mod sink;

pub use artifact::{Artifact, METADATA_KEY};
pub use sink::{ArtifactSink, FsArtifactSink, MemoryArtifactSink, StoredArtifact};
