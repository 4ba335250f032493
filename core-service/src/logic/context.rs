//! Defense Context
//!
//! The constructed set of engines one process runs with. Replaces any
//! global state: callers hold a `DefenseContext` and pass it to the
//! admin surface.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::config::{ConfigHandle, RuntimeConfig};
use super::learning::LearningEngine;
use super::pipeline::DefensePipeline;
use super::replay::ReplayService;
use super::schedule::spawn_periodic;

#[derive(Clone)]
pub struct DefenseContext {
    pub config: ConfigHandle,
    pub pipeline: Arc<DefensePipeline>,
    pub replay: Arc<ReplayService>,
    pub learning: Arc<LearningEngine>,
}

impl DefenseContext {
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_pipeline(DefensePipeline::new(ConfigHandle::new(config)))
    }

    /// Build around an already-assembled pipeline (custom resolver, channels)
    pub fn with_pipeline(pipeline: DefensePipeline) -> Self {
        let pipeline = Arc::new(pipeline);
        let replay = Arc::new(ReplayService::new(pipeline.clone()));
        let learning = Arc::new(LearningEngine::new(&pipeline, replay.clone()));
        Self {
            config: pipeline.config().clone(),
            pipeline,
            replay,
            learning,
        }
    }

    /// Start the scheduled regression and training jobs. Abort the returned
    /// handles to stop them.
    pub fn start_schedules(&self, regression_every: Duration, training_every: Duration) -> Vec<JoinHandle<()>> {
        let replay = self.replay.clone();
        let regression = spawn_periodic("replay-regression", regression_every, move || {
            let replay = replay.clone();
            async move { replay.run_scheduled_regression().await.map(|_| ()) }
        });

        let learning = self.learning.clone();
        let training = spawn_periodic("defense-training", training_every, move || {
            let learning = learning.clone();
            async move { learning.run_scheduled_training().await.map(|_| ()) }
        });

        vec![regression, training]
    }
}

impl Default for DefenseContext {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}
