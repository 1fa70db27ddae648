//! eigenface-core — Appearance-based face recognition with eigenfaces.
//!
//! Trains PCA face spaces from groups of flattened face images and
//! recognizes a query face by its nearest projected training face.

pub mod builder;
pub mod cache;
pub mod face_space;
pub mod linalg;
pub mod registry;
pub mod types;

pub use builder::{BuildError, FaceSpaceBuilder};
pub use cache::{CacheError, ModelCache};
pub use face_space::{FaceSpace, FaceSpaceError};
pub use linalg::{DenseBackend, LinearAlgebra};
pub use registry::{BuildReport, CachePolicy, FaceSpaceRegistry, RegistryConfig, RegistryError};
pub use types::{DistanceMetric, MatchResult, QueryProjection, Recognition, TrainingGroup, TrainingSet};
