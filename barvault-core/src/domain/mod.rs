//! Domain types: bars, resolutions, fingerprints, cache keys.

pub mod bar;
pub mod ids;
pub mod resolution;

pub use bar::{Bar, BarDefect};
pub use ids::{ArtifactKind, CacheKey, DatasetFingerprint, ParamFingerprint};
pub use resolution::{ParseResolutionError, Resolution};
