use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use stepseg_common::config::Config;
use stepseg_engine::segmenter::StepSegmenter;
use stepseg_engine::similarity::{FrameScorer, SsimScorer};
use stepseg_engine::source::DirectorySource;
use stepseg_engine::store::{persist_all, ConfiguredStore, StepStore};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        frames_dir = %config.source.frames_dir.display(),
        threshold = config.segmenter.similarity_threshold,
        min_gap_secs = config.segmenter.min_time_between_steps,
        recent_window = config.segmenter.recent_window,
        compare_against = ?config.segmenter.compare_against,
        backend = ?config.store.backend,
        "starting step segmentation"
    );

    let source = match DirectorySource::open(&config.source) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to open frame source");
            std::process::exit(1);
        }
    };

    let segmenter = match StepSegmenter::new(config.segmenter.clone(), SsimScorer) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "invalid segmenter settings");
            std::process::exit(1);
        }
    };

    // Ctrl-C stops the source; whatever was read so far is still segmented.
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, finishing with frames read so far");
                stop.store(true, Ordering::Relaxed);
            }
        });
    }

    let mut rx = source.spawn(config.source.channel_capacity, stop.clone());
    let scorer_name = segmenter.scorer().name().to_string();
    let steps = match tokio::task::spawn_blocking(move || {
        let mut segmenter = segmenter;
        while let Some(frame) = rx.blocking_recv() {
            segmenter.push(frame);
        }
        segmenter.finish()
    })
    .await
    {
        Ok(steps) => steps,
        Err(e) => {
            error!(error = %e, "segmentation task failed");
            std::process::exit(1);
        }
    };

    info!(
        steps = steps.len(),
        scorer = scorer_name,
        interrupted = stop.load(Ordering::Relaxed),
        "segmentation complete"
    );

    let store = match ConfiguredStore::from_config(&config.store).await {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to initialise step store");
            std::process::exit(1);
        }
    };

    match persist_all(&store, &steps).await {
        Ok(persisted) => {
            info!(
                steps = persisted.records.len(),
                manifest = %persisted.manifest,
                store = store.name(),
                "done"
            );
        }
        Err(e) => {
            error!(error = %e, "failed to persist steps");
            std::process::exit(1);
        }
    }
}
