//! Background worker: one job at a time, cancellation writes nothing.

mod common;

use common::*;
use kp_generator::{GenerationProgress, GeneratorConfig, KpError, PricingConfig, Worker};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::sync::{Arc, Mutex};

/// Holds the job at its first progress event until the test releases it.
struct Gate(Mutex<Receiver<()>>);

impl GenerationProgress for Gate {
    fn on_extraction_start(&self, _input: &Path, _kind: &str) {
        let _ = self.0.lock().unwrap().recv();
    }
}

/// Records written outputs.
#[derive(Default)]
struct Recorder(Mutex<Vec<PathBuf>>);

impl GenerationProgress for Recorder {
    fn on_generation_complete(&self, outputs: &[PathBuf]) {
        self.0.lock().unwrap().extend_from_slice(outputs);
    }
}

#[tokio::test]
async fn second_job_is_refused_and_cancel_writes_nothing() {
    let fx = Fixture::new();
    let input = bolt_and_nut(&fx);
    let (release, gate_rx) = channel();
    let config = GeneratorConfig::builder()
        .progress_callback(Arc::new(Gate(Mutex::new(gate_rx))))
        .build()
        .unwrap();
    let worker = Worker::new(Arc::new(fx.companies()), config);
    let request = fx.request(&input, None, vec![variant("alpha", PricingConfig::default())]);

    let handle = worker.submit(request.clone()).unwrap();
    assert!(worker.is_busy());
    assert!(matches!(worker.submit(request), Err(KpError::Busy)));

    handle.cancel();
    release.send(()).unwrap();
    let err = handle.wait().await.unwrap_err();
    assert!(matches!(err, KpError::Cancelled), "got: {err}");
    assert!(fx.outputs().is_empty());
    assert!(!worker.is_busy());
}

#[tokio::test]
async fn finished_job_reports_outputs() {
    let fx = Fixture::new();
    let input = bolt_and_nut(&fx);
    let recorder = Arc::new(Recorder::default());
    let config = GeneratorConfig::builder()
        .progress_callback(recorder.clone())
        .build()
        .unwrap();
    let worker = Worker::new(Arc::new(fx.companies()), config);
    let request = fx.request(
        &input,
        None,
        vec![
            variant("alpha", PricingConfig::default()),
            variant("beta", PricingConfig::default()),
        ],
    );

    let report = worker.submit(request).unwrap().wait().await.unwrap();
    assert_eq!(report.documents.len(), 2);
    assert_eq!(*recorder.0.lock().unwrap(), report.paths());
    assert_eq!(fx.outputs().len(), 2);
}

#[test]
fn blocking_wait_outside_a_runtime() {
    let fx = Fixture::new();
    let input = bolt_and_nut(&fx);
    let worker = Worker::new(Arc::new(fx.companies()), GeneratorConfig::default());
    let request = fx.request(&input, None, vec![variant("beta", PricingConfig::default())]);
    let report = worker.submit(request).unwrap().wait_blocking().unwrap();
    assert_eq!(report.documents[0].company_id, "beta");
}
