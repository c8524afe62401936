//! Owner of the live model artifact.
//!
//! Readers load an `Arc` to the current artifact without taking a lock and
//! then score against it. Reloads build the new artifact completely and then
//! swap the pointer, so readers observe either the old or the new artifact as
//! a whole.

use crate::error::{ScoringError, ScoringResult};
use crate::models::artifact::ModelArtifact;
use crate::models::loader::ModelLoader;
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

pub struct ModelHolder {
    current: ArcSwapOption<ModelArtifact>,
    /// Serializes writers so two reloads can't interleave their publishes
    reload_lock: Mutex<()>,
    loader: ModelLoader,
}

impl ModelHolder {
    /// Create an empty holder; the service is not ready until a load succeeds
    pub fn new(loader: ModelLoader) -> Self {
        Self {
            current: ArcSwapOption::empty(),
            reload_lock: Mutex::new(()),
            loader,
        }
    }

    /// Create a holder already serving `artifact`
    pub fn with_artifact(loader: ModelLoader, artifact: ModelArtifact) -> Self {
        let holder = Self::new(loader);
        holder.publish(artifact);
        holder
    }

    /// Load an artifact from disk without publishing it
    pub fn load<P: AsRef<Path>>(&self, path: P) -> ScoringResult<ModelArtifact> {
        self.loader.load(path)
    }

    /// The live artifact
    pub fn current(&self) -> ScoringResult<Arc<ModelArtifact>> {
        self.current.load_full().ok_or(ScoringError::ModelNotLoaded)
    }

    pub fn is_loaded(&self) -> bool {
        self.current.load().is_some()
    }

    /// Atomically make `artifact` the live one, returning the previous artifact
    pub fn publish(&self, artifact: ModelArtifact) -> Option<Arc<ModelArtifact>> {
        self.swap(Arc::new(artifact))
    }

    fn swap(&self, next: Arc<ModelArtifact>) -> Option<Arc<ModelArtifact>> {
        self.current.swap(Some(next))
    }

    /// Load `path` and publish it.
    ///
    /// On failure the currently serving artifact stays live.
    pub fn reload<P: AsRef<Path>>(&self, path: P) -> ScoringResult<Arc<ModelArtifact>> {
        let path = path.as_ref();
        let _writer = self.reload_lock.lock();

        let artifact = match self.loader.load(path) {
            Ok(artifact) => artifact,
            Err(e) => {
                let serving = self.current().ok();
                error!(
                    path = %path.display(),
                    serving_version = serving.as_deref().map(ModelArtifact::version),
                    error = %e,
                    "Model reload rejected, keeping current artifact"
                );
                return Err(e);
            }
        };

        let next = Arc::new(artifact);
        let previous = self.swap(Arc::clone(&next));
        info!(
            path = %path.display(),
            previous_version = previous.as_deref().map(ModelArtifact::version),
            new_version = %next.version(),
            "Model artifact reloaded"
        );

        Ok(next)
    }
}
