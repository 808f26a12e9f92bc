//! One training-and-inference step on synthetic heads.
//!
//! ```text
//! cargo run -p skewdet --example synthetic_step [config.json]
//! ```
//!
//! Prints the loss breakdown and detection counts as JSON.

use std::{env, time::Instant};

use serde::Serialize;
use skewdet::core::{GridShape, HeadTensor};
use skewdet::loss::AssignmentMetrics;
use skewdet::{EngineConfig, GroundTruth, RotatedDetectionEngine};
#[cfg(feature = "tracing")]
use tracing_log::LogTracer;
#[cfg(feature = "tracing")]
use tracing_subscriber::EnvFilter;

const STRIDES: [u32; 3] = [8, 16, 32];
const BATCH: usize = 2;

#[derive(Serialize)]
struct StepReport {
    loss: std::collections::BTreeMap<String, f32>,
    metrics: Vec<AssignmentMetrics>,
    detections_per_image: Vec<usize>,
    elapsed_ms: f64,
}

/// Small deterministic logits so that a handful of cells clear the
/// confidence threshold.
fn synthetic_heads(cfg: &EngineConfig) -> Vec<HeadTensor> {
    let mut state = 0x2545_F491u32;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        (state as f32) / (u32::MAX as f32) - 0.5
    };
    STRIDES
        .iter()
        .zip(&cfg.anchors.scales)
        .map(|(&stride, scale)| {
            let shape = GridShape::new(BATCH, scale.len(), (cfg.image_size / stride) as usize);
            let mut head = HeadTensor::zeros(shape, cfg.num_classes);
            for flat in 0..shape.cells() {
                let v = head.cell_mut(shape.unravel(flat));
                for x in v.iter_mut() {
                    *x = next();
                }
                // Objectness mostly low, occasionally confident.
                v[5] = if next() > 0.499 { 3.0 } else { -4.0 };
            }
            head
        })
        .collect()
}

fn synthetic_targets(num_classes: usize) -> Vec<GroundTruth> {
    vec![
        GroundTruth::new(0, 0, 0.25, 0.30, 0.10, 0.04, 0.4),
        GroundTruth::new(0, 1 % num_classes, 0.70, 0.62, 0.22, 0.12, -1.1),
        GroundTruth::new(1, 0, 0.48, 0.51, 0.35, 0.30, 0.0),
    ]
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let config = match env::args().nth(1) {
        Some(path) => EngineConfig::from_json_path(path)?,
        None => EngineConfig::default(),
    };
    let engine = RotatedDetectionEngine::new(config)?;

    let started = Instant::now();
    let heads = synthetic_heads(engine.config());
    let decoded = engine.decode(&heads)?;
    let targets = synthetic_targets(engine.config().num_classes);
    let loss = engine.compute_loss_decoded(&decoded, &targets)?;
    let detections = engine.post_process_decoded(&decoded)?;

    let report = StepReport {
        loss: loss.items(),
        metrics: loss.scales.iter().map(|s| s.metrics).collect(),
        detections_per_image: detections.iter().map(Vec::len).collect(),
        elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn init_logging() {
    #[cfg(feature = "tracing")]
    {
        let _ = LogTracer::init();
        let filter = EnvFilter::try_from_env(skewdet::LOG_ENV)
            .unwrap_or_else(|_| EnvFilter::new("warn,skewdet=info"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    }
    #[cfg(not(feature = "tracing"))]
    {
        let env = env_logger::Env::default()
            .filter(skewdet::LOG_ENV)
            .default_filter_or("warn,skewdet=info");
        let _ = env_logger::Builder::from_env(env).try_init();
    }
}
