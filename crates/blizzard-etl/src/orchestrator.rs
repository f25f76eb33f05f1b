//! The batch orchestrator.
//!
//! Documents flow through a bounded channel to a fixed set of worker tasks;
//! each worker runs the whole [`Pipeline`] for one document at a time. Two
//! signals stop dispatch: a [`ShutdownHandle`] held by the caller, and the
//! run's own halt flag, raised by the first failure when `continue_on_error`
//! is off. Stopping never interrupts a document already in progress. Queued
//! and undispatched documents are reported as skipped. Each document runs in
//! its own task, so a panic fails that document and nothing else.

use std::{collections::HashSet, sync::Arc, time::Instant};

use blizzard_core::{
  outcome::{DocumentOutcome, OutcomeKind, RunReport},
  store::{DefinitionStore, FilingLoader},
};
use tokio::{
  sync::{Mutex, mpsc, watch},
  task::JoinSet,
};
use tracing::{debug, error, info, warn};

use crate::{
  config::EtlConfig,
  pipeline::{InputDocument, Pipeline},
};

// ─── Shutdown ────────────────────────────────────────────────────────────────

/// Requests a graceful drain of the orchestrator it came from.
#[derive(Clone)]
pub struct ShutdownHandle {
  tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
  /// Stop dispatching. In-flight documents finish; the rest are skipped.
  /// Applies to the current run and every later one.
  pub fn shutdown(&self) { self.tx.send_replace(true); }

  pub fn is_shutdown(&self) -> bool { *self.tx.borrow() }
}

/// Set once either shutdown or halt has been requested.
#[derive(Clone)]
struct StopSignal {
  shutdown: watch::Receiver<bool>,
  halt:     watch::Receiver<bool>,
}

impl StopSignal {
  fn is_set(&self) -> bool { *self.shutdown.borrow() || *self.halt.borrow() }

  async fn stopped(&mut self) {
    let Self { shutdown, halt } = self;
    tokio::select! {
      () = raised(shutdown) => {}
      () = raised(halt) => {}
    }
  }
}

/// Resolves once `rx` reads true; never resolves if its sender is gone.
async fn raised(rx: &mut watch::Receiver<bool>) {
  let closed = rx.wait_for(|set| *set).await.is_err();
  if closed {
    std::future::pending::<()>().await;
  }
}

// ─── Orchestrator ────────────────────────────────────────────────────────────

pub struct Orchestrator<S> {
  pipeline: Arc<Pipeline<S>>,
  config:   EtlConfig,
  shutdown: Arc<watch::Sender<bool>>,
}

impl<S> Orchestrator<S>
where
  S: DefinitionStore + FilingLoader + 'static,
{
  pub fn new(pipeline: Pipeline<S>, config: EtlConfig) -> Self {
    let (shutdown, _) = watch::channel(false);
    Self {
      pipeline: Arc::new(pipeline),
      config,
      shutdown: Arc::new(shutdown),
    }
  }

  pub fn pipeline(&self) -> &Pipeline<S> { &self.pipeline }

  pub fn config(&self) -> &EtlConfig { &self.config }

  pub fn shutdown_handle(&self) -> ShutdownHandle {
    ShutdownHandle { tx: Arc::clone(&self.shutdown) }
  }

  /// Process every document and summarize the outcomes.
  pub async fn run(&self, documents: Vec<InputDocument>) -> RunReport {
    let started = Instant::now();
    let (outcomes, halted) = self.dispatch(documents).await;

    let mut report = RunReport::new(self.config.max_failure_details);
    for outcome in &outcomes {
      report.record(outcome);
    }
    report.halted = halted;
    report.elapsed_ms =
      u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    info!(
      total = report.total,
      loaded = report.count(OutcomeKind::Loaded),
      duplicates = report.count(OutcomeKind::DuplicateFiling),
      skipped = report.count(OutcomeKind::Skipped),
      failed = report.failed(),
      schema_conflicts = report.schema_conflicts,
      elapsed_ms = report.elapsed_ms,
      halted,
      "run finished"
    );
    report
  }

  /// Process every document, returning exactly one outcome per input in
  /// input order.
  pub async fn run_outcomes(
    &self,
    documents: Vec<InputDocument>,
  ) -> Vec<DocumentOutcome> {
    self.dispatch(documents).await.0
  }

  async fn dispatch(
    &self,
    documents: Vec<InputDocument>,
  ) -> (Vec<DocumentOutcome>, bool) {
    let ids: Vec<String> = documents.iter().map(|d| d.id.clone()).collect();
    let workers = self.config.worker_count.max(1);
    let continue_on_error = self.config.continue_on_error;

    let halt = Arc::new(watch::channel(false).0);
    let signal = StopSignal {
      shutdown: self.shutdown.subscribe(),
      halt:     halt.subscribe(),
    };

    let (tx, rx) = mpsc::channel::<(usize, InputDocument)>(workers * 2);
    let rx = Arc::new(Mutex::new(rx));
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let in_flight = Arc::new(parking_lot::Mutex::new(HashSet::new()));

    let mut tasks = JoinSet::new();
    for worker in 0..workers {
      let pipeline = Arc::clone(&self.pipeline);
      let rx = Arc::clone(&rx);
      let halt = Arc::clone(&halt);
      let signal = signal.clone();
      let done = done_tx.clone();
      let in_flight = Arc::clone(&in_flight);
      tasks.spawn(async move {
        let mut processed = 0_usize;
        loop {
          let next = rx.lock().await.recv().await;
          let Some((index, input)) = next else { break };

          let outcome = if signal.is_set() {
            DocumentOutcome::skipped(input.id)
          } else {
            in_flight.lock().insert(index);
            isolated(&pipeline, input).await
          };
          // `send_replace` returns the previous flag; log the first halt only.
          if outcome.kind.is_failure()
            && !continue_on_error
            && !halt.send_replace(true)
          {
            warn!(
              document = %outcome.document_id,
              kind = %outcome.kind,
              "halting run after failure"
            );
          }
          processed += 1;
          // The collector holds the receiver until every worker is joined.
          let _ = done.send((index, outcome));
          in_flight.lock().remove(&index);
        }
        debug!(worker, processed, "worker finished");
      });
    }
    // Workers own the only receivers, so sends fail once they are all gone.
    drop(rx);
    drop(done_tx);

    let mut stop = signal;
    let feed = async move {
      for (index, input) in documents.into_iter().enumerate() {
        tokio::select! {
          biased;
          () = stop.stopped() => break,
          sent = tx.send((index, input)) => {
            if sent.is_err() {
              error!("all workers exited before dispatch finished");
              break;
            }
          }
        }
      }
    };
    let reap = async {
      while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
          error!(error = %e, "worker task failed");
          if !continue_on_error {
            halt.send_replace(true);
          }
        }
      }
    };
    tokio::join!(feed, reap);

    let mut outcomes: Vec<Option<DocumentOutcome>> = vec![None; ids.len()];
    while let Ok((index, outcome)) = done_rx.try_recv() {
      outcomes[index] = Some(outcome);
    }

    let aborted = std::mem::take(&mut *in_flight.lock());
    let outcomes = outcomes
      .into_iter()
      .zip(ids)
      .enumerate()
      .map(|(index, (outcome, id))| match outcome {
        Some(outcome) => outcome,
        None if aborted.contains(&index) => DocumentOutcome::failed(
          id,
          OutcomeKind::FatalStoreFailure,
          "worker task aborted",
        ),
        None => DocumentOutcome::skipped(id),
      })
      .collect();

    let halted = *halt.borrow();
    (outcomes, halted)
  }
}

/// Run one document in its own task so a panic fails that document only.
async fn isolated<S>(
  pipeline: &Arc<Pipeline<S>>,
  input: InputDocument,
) -> DocumentOutcome
where
  S: DefinitionStore + FilingLoader + 'static,
{
  let id = input.id.clone();
  let pipeline = Arc::clone(pipeline);
  match tokio::spawn(async move { pipeline.process(input).await }).await {
    Ok(outcome) => outcome,
    Err(e) => {
      error!(document = %id, error = %e, "document task panicked");
      DocumentOutcome::failed(
        id,
        OutcomeKind::FatalStoreFailure,
        format!("document task failed: {e}"),
      )
    }
  }
}
