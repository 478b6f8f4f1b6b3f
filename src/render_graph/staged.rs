//! Multi-frame precompute sequences.
//!
//! Expensive one-off work (environment map convolution, LUT generation) is
//! spread over several frames. A [`StagedPrecompute`] is the explicit state
//! machine for such a sequence: exactly one pass owns the [`StageDriver`] and
//! advances it, every other pass holds a [`StageView`] and can only ask where
//! the sequence is. Dependent passes should also read a resource the driving
//! pass writes so the ordering shows up as a graph edge.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::PassError;

/// Where a staged precompute currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    /// Running stage `n`; stages below `n` have finished.
    Stage(usize),
    Complete,
}

/// A named sequence of stages shared by one driver and any number of views.
#[derive(Debug)]
pub struct StagedPrecompute {
    name: String,
    stages: Vec<String>,
    state: StageState,
}

impl StagedPrecompute {
    /// Create the sequence and split it into its driving and observing halves.
    ///
    /// A sequence without stages starts complete.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(name: impl Into<String>, stages: Vec<String>) -> (StageDriver, StageView) {
        let state = if stages.is_empty() {
            StageState::Complete
        } else {
            StageState::Stage(0)
        };
        let shared = Arc::new(RwLock::new(Self {
            name: name.into(),
            stages,
            state,
        }));
        (
            StageDriver {
                shared: Arc::clone(&shared),
            },
            StageView { shared },
        )
    }

    fn stage_name(&self) -> Option<&str> {
        match self.state {
            StageState::Stage(n) => self.stages.get(n).map(String::as_str),
            StageState::Complete => None,
        }
    }
}

/// The mutating half, owned by the coordinating pass.
#[derive(Debug)]
pub struct StageDriver {
    shared: Arc<RwLock<StagedPrecompute>>,
}

impl StageDriver {
    pub fn state(&self) -> StageState {
        self.shared.read().state
    }

    /// Name of the stage to run this frame, `None` once complete.
    pub fn current(&self) -> Option<String> {
        self.shared.read().stage_name().map(str::to_string)
    }

    /// Mark the current stage finished and move to the next one.
    ///
    /// Returns the new state. Advancing a complete sequence does nothing.
    pub fn advance(&self) -> StageState {
        let mut precompute = self.shared.write();
        if let StageState::Stage(n) = precompute.state {
            precompute.state = if n + 1 < precompute.stages.len() {
                StageState::Stage(n + 1)
            } else {
                StageState::Complete
            };
            match precompute.state {
                StageState::Stage(next) => log::trace!(
                    "{}: stage '{}' done, next '{}'",
                    precompute.name,
                    precompute.stages[n],
                    precompute.stages[next]
                ),
                StageState::Complete => {
                    log::debug!("{}: all {} stages complete", precompute.name, precompute.stages.len())
                }
            }
        }
        precompute.state
    }

    pub fn is_complete(&self) -> bool {
        self.state() == StageState::Complete
    }

    /// A new observing handle.
    pub fn view(&self) -> StageView {
        StageView {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// The read-only half, cloned into dependent passes.
#[derive(Debug, Clone)]
pub struct StageView {
    shared: Arc<RwLock<StagedPrecompute>>,
}

impl StageView {
    pub fn state(&self) -> StageState {
        self.shared.read().state
    }

    pub fn is_complete(&self) -> bool {
        self.state() == StageState::Complete
    }

    /// Index of the running stage, `None` once complete.
    pub fn current_stage(&self) -> Option<usize> {
        match self.state() {
            StageState::Stage(n) => Some(n),
            StageState::Complete => None,
        }
    }

    /// `Ok` once complete, otherwise [`PassError::NotReady`] naming the
    /// running stage.
    pub fn require_complete(&self) -> Result<(), PassError> {
        let precompute = self.shared.read();
        match precompute.stage_name() {
            None => Ok(()),
            Some(stage) => Err(PassError::NotReady(format!(
                "{} is at stage '{}'",
                precompute.name, stage
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stages() -> Vec<String> {
        ["irradiance", "prefilter", "brdf_lut"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_driver_advances_through_stages() {
        let (driver, view) = StagedPrecompute::new("IBL", stages());
        assert_eq!(driver.current().as_deref(), Some("irradiance"));
        assert_eq!(view.current_stage(), Some(0));

        assert_eq!(driver.advance(), StageState::Stage(1));
        assert_eq!(view.current_stage(), Some(1));
        driver.advance();
        assert_eq!(driver.advance(), StageState::Complete);

        assert!(view.is_complete());
        assert!(driver.current().is_none());
        assert_eq!(driver.advance(), StageState::Complete);
    }

    #[test]
    fn test_view_gates_until_complete() {
        let (driver, view) = StagedPrecompute::new("IBL", stages());
        let other = view.clone();
        assert_eq!(
            view.require_complete(),
            Err(PassError::NotReady("IBL is at stage 'irradiance'".into()))
        );
        for _ in 0..3 {
            driver.advance();
        }
        assert_eq!(other.require_complete(), Ok(()));
    }

    #[test]
    fn test_no_stages_is_complete() {
        let (driver, view) = StagedPrecompute::new("Nothing", Vec::new());
        assert!(driver.is_complete());
        assert!(view.require_complete().is_ok());
        assert!(driver.view().is_complete());
    }
}
