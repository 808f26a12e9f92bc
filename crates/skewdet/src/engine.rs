use std::sync::Arc;

use log::debug;
#[cfg(feature = "tracing")]
use tracing::instrument;
use skewdet_core::{decode_head, ensure_len, DecodedScale, HeadTensor};
use skewdet_loss::{GroundTruth, LossReport};
use skewdet_nms::Detection;

use crate::{EngineConfig, EngineError};

/// Entry point tying decoding, loss and post-processing to one validated
/// [`EngineConfig`].
///
/// The engine holds no per-call state; clones share the config and can be
/// used from several threads at once.
#[derive(Clone, Debug)]
pub struct RotatedDetectionEngine {
    config: Arc<EngineConfig>,
}

impl RotatedDetectionEngine {
    /// Validate `config` and build an engine around it.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        Self::from_shared(Arc::new(config))
    }

    /// Like [`RotatedDetectionEngine::new`] for an already shared config.
    pub fn from_shared(config: Arc<EngineConfig>) -> Result<Self, EngineError> {
        config.validate()?;
        debug!(
            "engine: {}px input, {} classes, {} scales",
            config.image_size,
            config.num_classes,
            config.anchors.num_scales()
        );
        Ok(Self { config })
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Decode one raw head per scale, finest first.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(heads = heads.len()))
    )]
    pub fn decode(&self, heads: &[HeadTensor]) -> Result<Vec<DecodedScale>, EngineError> {
        let cfg = &*self.config;
        ensure_len("head scales", cfg.anchors.num_scales(), heads.len())?;
        let batch = heads.first().map(|h| h.shape().batch).unwrap_or(0);
        heads
            .iter()
            .zip(&cfg.anchors.scales)
            .map(|(head, anchors)| {
                ensure_len("head classes", cfg.num_classes, head.num_classes())?;
                ensure_len("head batch size", batch, head.shape().batch)?;
                Ok(decode_head(head, anchors, cfg.image_size_f32())?)
            })
            .collect()
    }

    /// Training loss of raw heads against normalized ground truths.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(heads = heads.len(), targets = targets.len()))
    )]
    pub fn compute_loss(
        &self,
        heads: &[HeadTensor],
        targets: &[GroundTruth],
    ) -> Result<LossReport, EngineError> {
        let decoded = self.decode(heads)?;
        self.compute_loss_decoded(&decoded, targets)
    }

    pub fn compute_loss_decoded(
        &self,
        preds: &[DecodedScale],
        targets: &[GroundTruth],
    ) -> Result<LossReport, EngineError> {
        let cfg = &*self.config;
        Ok(skewdet_loss::compute_loss(preds, targets, &cfg.anchors, &cfg.loss)?)
    }

    /// Per-image detections from raw heads, boxes in input pixels.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(heads = heads.len()))
    )]
    pub fn post_process(&self, heads: &[HeadTensor]) -> Result<Vec<Vec<Detection>>, EngineError> {
        let decoded = self.decode(heads)?;
        self.post_process_decoded(&decoded)
    }

    pub fn post_process_decoded(
        &self,
        preds: &[DecodedScale],
    ) -> Result<Vec<Vec<Detection>>, EngineError> {
        Ok(skewdet_nms::post_process(preds, &self.config.nms)?)
    }
}
