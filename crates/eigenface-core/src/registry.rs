//! Collection of face spaces, one per training group, queried as a whole.

use crate::builder::{BuildError, FaceSpaceBuilder};
use crate::cache::{cache_key, CacheError, ModelCache};
use crate::face_space::{FaceSpace, FaceSpaceError};
use crate::linalg::{DenseBackend, LinearAlgebra};
use crate::types::{DistanceMetric, MatchResult, Recognition, TrainingGroup};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Faces per training group when nothing else is configured.
pub const DEFAULT_GROUP_SIZE: usize = 2;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("invalid training set: {0}")]
    InvalidTrainingSet(String),
    #[error("build: {0}")]
    Build(#[from] BuildError),
    #[error("face space: {0}")]
    FaceSpace(#[from] FaceSpaceError),
    #[error("cache: {0}")]
    Cache(#[from] CacheError),
}

/// Registry settings, passed explicitly at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Faces per training group; every group must have exactly this many.
    pub group_size: usize,
    /// Eigenfaces retained per face space. `None` keeps `group_size - 1`,
    /// the rank of a mean-removed group (at least 1).
    pub components: Option<usize>,
    /// Maximum accepted match distance. `None` accepts the best match
    /// unconditionally.
    pub threshold: Option<f64>,
    pub metric: DistanceMetric,
    /// Where trained face spaces are cached. `None` disables persistence.
    pub cache_dir: Option<PathBuf>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            group_size: DEFAULT_GROUP_SIZE,
            components: None,
            threshold: None,
            metric: DistanceMetric::default(),
            cache_dir: None,
        }
    }
}

impl RegistryConfig {
    /// Effective number of retained eigenfaces.
    pub fn components(&self) -> usize {
        self.components
            .unwrap_or_else(|| self.group_size.saturating_sub(1).max(1))
    }
}

/// Whether [`FaceSpaceRegistry::build_with_policy`] may reuse cached spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Load cached spaces when present; build and store the rest.
    #[default]
    Reuse,
    /// Ignore existing entries; build every group and overwrite its entry.
    Refresh,
}

/// How each group's face space was obtained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub built: usize,
    pub loaded: usize,
}

pub struct FaceSpaceRegistry<L = DenseBackend> {
    config: RegistryConfig,
    builder: FaceSpaceBuilder<L>,
    cache: Option<ModelCache>,
    spaces: Vec<FaceSpace>,
}

impl FaceSpaceRegistry<DenseBackend> {
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_backend(config, DenseBackend)
    }
}

impl<L: LinearAlgebra> FaceSpaceRegistry<L> {
    pub fn with_backend(config: RegistryConfig, backend: L) -> Self {
        let cache = config.cache_dir.clone().map(ModelCache::new);
        Self {
            config,
            builder: FaceSpaceBuilder::with_backend(backend),
            cache,
            spaces: Vec::new(),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn spaces(&self) -> &[FaceSpace] {
        &self.spaces
    }

    pub fn len(&self) -> usize {
        self.spaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spaces.is_empty()
    }

    /// Add an already-trained face space after validating it. Every owned
    /// space must share one pixel count.
    pub fn insert(&mut self, space: FaceSpace) -> Result<(), RegistryError> {
        space.validate()?;
        if let Some(first) = self.spaces.first() {
            if first.pixels() != space.pixels() {
                return Err(FaceSpaceError::DimensionMismatch {
                    expected: first.pixels(),
                    got: space.pixels(),
                }
                .into());
            }
        }
        self.spaces.push(space);
        Ok(())
    }

    /// Build one face space per group, in group order, reusing cached spaces.
    pub fn build_from(&mut self, groups: Vec<TrainingGroup>) -> Result<BuildReport, RegistryError> {
        self.build_with_policy(groups, CachePolicy::Reuse)
    }

    /// Build one face space per group, in group order.
    ///
    /// The owned spaces are replaced only if every group succeeds.
    pub fn build_with_policy(
        &mut self,
        groups: Vec<TrainingGroup>,
        policy: CachePolicy,
    ) -> Result<BuildReport, RegistryError> {
        let group_size = self.config.group_size;
        let components = self.config.components();
        if group_size == 0 {
            return Err(RegistryError::InvalidTrainingSet("group size must be positive".into()));
        }

        let mut report = BuildReport::default();
        let mut spaces = Vec::with_capacity(groups.len());
        let mut group_pixels = None;

        for (index, group) in groups.into_iter().enumerate() {
            let pixels = group.width.checked_mul(group.height);
            match group_pixels {
                None => group_pixels = Some(pixels),
                Some(expected) if expected != pixels => {
                    return Err(RegistryError::InvalidTrainingSet(format!(
                        "group {index} is {}x{}, but group 0 has a different pixel count",
                        group.width, group.height
                    )));
                }
                Some(_) => {}
            }

            if group.identifiers.len() != group_size || group.faces.len() != group_size {
                return Err(RegistryError::InvalidTrainingSet(format!(
                    "group {index} has {} faces and {} identifiers, expected {group_size}",
                    group.faces.len(),
                    group.identifiers.len()
                )));
            }

            let set = group.into_training_set(components);
            let space = match &self.cache {
                Some(cache) => {
                    let key = cache_key(&set);
                    let cached = match policy {
                        CachePolicy::Reuse => cache.load(&key)?,
                        CachePolicy::Refresh => None,
                    };
                    match cached {
                        Some(space) => {
                            report.loaded += 1;
                            space
                        }
                        None => {
                            let space = self.builder.build(set)?;
                            cache.store(&key, &space)?;
                            report.built += 1;
                            space
                        }
                    }
                }
                None => {
                    report.built += 1;
                    self.builder.build(set)?
                }
            };

            tracing::debug!(group = index, identifiers = ?space.identifiers(), "face space ready");
            spaces.push(space);
        }

        tracing::info!(
            spaces = spaces.len(),
            built = report.built,
            loaded = report.loaded,
            "face space registry populated"
        );
        self.spaces = spaces;
        Ok(report)
    }

    /// Best match for `query` across every face space, gated by the
    /// configured threshold. `None` only when the registry is empty.
    pub fn recognize(&self, query: &[f64]) -> Result<Option<Recognition>, RegistryError> {
        self.recognize_with_threshold(query, self.config.threshold)
    }

    /// As [`recognize`](Self::recognize) with an explicit threshold.
    pub fn recognize_with_threshold(
        &self,
        query: &[f64],
        threshold: Option<f64>,
    ) -> Result<Option<Recognition>, RegistryError> {
        // Reject before projecting into any space.
        if let Some(space) = self.spaces.iter().find(|s| s.pixels() != query.len()) {
            return Err(FaceSpaceError::DimensionMismatch {
                expected: space.pixels(),
                got: query.len(),
            }
            .into());
        }

        let mut best: Option<(usize, MatchResult)> = None;
        for (index, space) in self.spaces.iter().enumerate() {
            let candidate = space.match_query(query, self.config.metric)?;
            tracing::debug!(
                space = index,
                identifier = %candidate.identifier,
                distance = candidate.distance,
                "space candidate"
            );
            if best.as_ref().map_or(true, |(_, b)| candidate.distance < b.distance) {
                best = Some((index, candidate));
            }
        }

        Ok(best.map(|(space, best)| {
            let accepted = threshold.map_or(true, |t| best.distance <= t);
            tracing::info!(
                identifier = %best.identifier,
                distance = best.distance,
                accepted,
                "recognition result"
            );
            Recognition {
                space,
                best,
                accepted,
            }
        }))
    }
}
