//! Cleaning engine: method dispatch and shared post-processing.

use std::sync::Arc;

use iactclean_core::{
    CameraGeometry, CleaningConfig, CleaningMethod, CleaningResult, Error, EventSignal, Result,
};
use log::debug;

use crate::nn::{clean_next_neighbor, IprCalibrationStore, IprSource};
use crate::size_cluster::clean_size_cluster;
use crate::state::CleaningState;
use crate::tailcut::clean_two_level;
use crate::time_cluster::clean_time_cluster;
use crate::time_diff::clean_time_difference;
use crate::trace_correlation::apply_trace_correlation;

/// Image cleaner for one run configuration.
///
/// The cleaner is immutable and can be shared between threads; every worker
/// needs its own [`CleaningState`]. NN cleaning additionally owns a
/// calibration store that is filled on first use of each telescope type.
#[derive(Debug, Clone)]
pub struct ImageCleaner {
    config: CleaningConfig,
    calibration: Option<Arc<IprCalibrationStore>>,
}

impl ImageCleaner {
    /// Creates a cleaner for a method that needs no calibration.
    ///
    /// # Errors
    /// Returns [`Error::Config`] for invalid parameters or when the method is
    /// NN cleaning, which needs an IPR source.
    pub fn new(config: CleaningConfig) -> Result<Self> {
        config.validate()?;
        if config.nn_params().is_some() {
            return Err(Error::Config(
                "next-neighbor cleaning requires an IPR source".into(),
            ));
        }
        Ok(Self {
            config,
            calibration: None,
        })
    }

    /// Creates a cleaner whose NN calibrations are built from `source`.
    ///
    /// The source is ignored by the other methods.
    ///
    /// # Errors
    /// Returns [`Error::Config`] for invalid parameters.
    pub fn with_ipr_source(
        config: CleaningConfig,
        source: impl IprSource + 'static,
    ) -> Result<Self> {
        config.validate()?;
        let calibration = config
            .nn_params()
            .map(|params| Arc::new(IprCalibrationStore::new(source, params.clone())));
        Ok(Self {
            config,
            calibration,
        })
    }

    /// Creates a cleaner sharing an existing calibration store.
    ///
    /// # Errors
    /// Returns [`Error::Config`] for invalid parameters or when the store
    /// was built for different NN parameters.
    pub fn with_calibration(
        config: CleaningConfig,
        store: Arc<IprCalibrationStore>,
    ) -> Result<Self> {
        config.validate()?;
        if let Some(params) = config.nn_params() {
            if params != store.params() {
                return Err(Error::Config(
                    "calibration store was built for different NN parameters".into(),
                ));
            }
        }
        Ok(Self {
            config,
            calibration: Some(store),
        })
    }

    /// Run configuration.
    #[must_use]
    pub fn config(&self) -> &CleaningConfig {
        &self.config
    }

    /// Calibration store, if the cleaner has one.
    #[must_use]
    pub fn calibration_store(&self) -> Option<&Arc<IprCalibrationStore>> {
        self.calibration.as_ref()
    }

    /// Fresh per-worker state.
    #[must_use]
    pub fn create_state(&self) -> CleaningState {
        CleaningState::new()
    }

    /// Cleans one camera image.
    ///
    /// # Errors
    /// Returns [`Error::InconsistentInput`] if the event does not match the
    /// geometry, and calibration errors of NN cleaning. An empty image is a
    /// valid result.
    pub fn clean(
        &self,
        geometry: &CameraGeometry,
        event: &EventSignal,
        state: &mut CleaningState,
    ) -> Result<CleaningResult> {
        event.validate(geometry.len())?;
        state.prepare(geometry, event);
        let mut result = CleaningResult::new(geometry.len());

        match &self.config.method {
            CleaningMethod::TwoLevel(params) => {
                clean_two_level(params, geometry, event, state, &mut result);
            }
            CleaningMethod::TimeDifference(params) => {
                clean_time_difference(params, geometry, event, state, &mut result);
            }
            CleaningMethod::TimeCluster(params) => {
                clean_time_cluster(params, geometry, event, state, &mut result);
            }
            CleaningMethod::SizeCluster(params) => {
                clean_size_cluster(params, geometry, event, state, &mut result);
            }
            CleaningMethod::NextNeighbor(params) => {
                let store = self.calibration.as_ref().ok_or_else(|| {
                    Error::Config("next-neighbor cleaning requires an IPR source".into())
                })?;
                let calibration = store.get_or_build(geometry)?;
                clean_next_neighbor(&calibration, params, geometry, event, state, &mut result);
            }
        }

        if let Some(params) = &self.config.trace_correlation {
            let added = apply_trace_correlation(params, geometry, event, state, &mut result);
            if added > 0 {
                debug!("trace correlation added {added} border pixels");
            }
        }

        result.assign_cluster_ids(geometry);
        result.compute_neighbor_closure(geometry);
        debug!(
            "{}: {} core, {} border, {} clusters",
            self.config.method.name(),
            result.n_core(),
            result.n_border(),
            result.n_clusters()
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use iactclean_core::{
        IprCurve, NnParams, PulseTraces, TelescopeType, TraceCorrelationParams, TwoLevelParams,
    };

    fn ipr_source() -> HashMap<TelescopeType, IprCurve> {
        let curve = IprCurve::new(
            vec![0.0, 5.0, 10.0, 15.0, 20.0],
            vec![1e8, 1e6, 1e4, 1e2, 1.0],
        )
        .unwrap();
        [(1, curve)].into()
    }

    #[test]
    fn test_cleaner_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ImageCleaner>();
    }

    #[test]
    fn test_nn_requires_source() {
        let config = CleaningConfig::new(CleaningMethod::NextNeighbor(NnParams::default()));
        let err = ImageCleaner::new(config.clone()).unwrap_err();
        assert!(err.is_configuration());
        assert!(ImageCleaner::with_ipr_source(config, ipr_source()).is_ok());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = CleaningConfig::new(CleaningMethod::TwoLevel(TwoLevelParams::fixed(2.0, 5.0)));
        assert!(matches!(ImageCleaner::new(config), Err(Error::Config(_))));
    }

    #[test]
    fn test_store_params_must_match() {
        let params = NnParams::default();
        let store = Arc::new(IprCalibrationStore::new(ipr_source(), params.clone()));
        let same = CleaningConfig::new(CleaningMethod::NextNeighbor(params.clone()));
        assert!(ImageCleaner::with_calibration(same, Arc::clone(&store)).is_ok());

        let other = CleaningConfig::new(CleaningMethod::NextNeighbor(
            params.with_fake_image_probability(1e-2),
        ));
        assert!(ImageCleaner::with_calibration(other, store).is_err());
    }

    #[test]
    fn test_mismatched_event_rejected() {
        let geometry = CameraGeometry::hexagonal(1, 2, 1.0);
        let cleaner = ImageCleaner::new(CleaningConfig::default()).unwrap();
        let mut state = cleaner.create_state();
        let event = EventSignal::new(geometry.len() - 1);
        assert!(matches!(
            cleaner.clean(&geometry, &event, &mut state),
            Err(Error::InconsistentInput { what: "charge", .. })
        ));
    }

    #[test]
    fn test_result_is_post_processed() {
        let geometry = CameraGeometry::hexagonal(1, 3, 1.0);
        let cleaner = ImageCleaner::new(CleaningConfig::new(CleaningMethod::TwoLevel(
            TwoLevelParams::fixed(10.0, 5.0),
        )))
        .unwrap();
        let a = geometry.nearest_pixel(0.0, 0.0).unwrap();
        let b = geometry.nearest_pixel(1.0, 0.0).unwrap();
        let mut event = EventSignal::new(geometry.len());
        event.charge[a] = 20.0;
        event.charge[b] = 7.0;

        let mut state = cleaner.create_state();
        let result = cleaner.clean(&geometry, &event, &mut state).unwrap();
        assert_eq!(result.cluster_id[a], 1);
        assert_eq!(result.cluster_id[b], 1);
        assert!(geometry.neighbors(b).iter().all(|&j| result.neighbor_of_image[j]));
        assert_eq!(state.events_processed(), 1);
    }

    #[test]
    fn test_trace_correlation_grows_image() {
        const PULSE: [f64; 5] = [0.0, 2.0, 5.0, 2.0, 0.0];
        let geometry = CameraGeometry::hexagonal(1, 3, 1.0);
        let center = geometry.nearest_pixel(0.0, 0.0).unwrap();
        let faint = geometry.nearest_pixel(1.0, 0.0).unwrap();

        let mut traces = vec![vec![0.0; PULSE.len()]; geometry.len()];
        traces[center] = PULSE.iter().map(|x| x * 10.0).collect();
        traces[faint] = PULSE.to_vec();
        let mut event = EventSignal::new(geometry.len());
        event.charge[center] = 20.0;
        event.traces = Some(PulseTraces::from_traces(&traces).unwrap());

        let method = CleaningMethod::TwoLevel(TwoLevelParams::fixed(10.0, 5.0));
        let plain = ImageCleaner::new(CleaningConfig::new(method.clone())).unwrap();
        let traced = ImageCleaner::new(
            CleaningConfig::new(method).with_trace_correlation(TraceCorrelationParams::default()),
        )
        .unwrap();
        let mut state = plain.create_state();

        let result = plain.clean(&geometry, &event, &mut state).unwrap();
        assert_eq!(result.n_image(), 1);
        assert!(!result.neighbor_of_image[geometry.nearest_pixel(2.0, 0.0).unwrap()]);

        let result = traced.clean(&geometry, &event, &mut state).unwrap();
        assert!(result.border[faint]);
        assert_eq!(result.cluster_id[faint], 1);
        assert_eq!(result.cluster_id[center], 1);
        assert_eq!(result.n_clusters(), 1);
        assert!(geometry.neighbors(faint).iter().all(|&j| result.neighbor_of_image[j]));
    }
}
