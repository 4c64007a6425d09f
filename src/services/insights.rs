use crate::collaborators::InsightGenerator;
use crate::models::{Endpoint, NewInsight};
use crate::services::logger::Logger;
use crate::stores::RecordStore;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Work item for the insight worker.
#[derive(Debug, Clone)]
pub struct InsightJob {
    pub execution_id: String,
    pub endpoint: Endpoint,
    pub response: Value,
    pub model_key: String,
}

#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    stored: AtomicU64,
    skipped: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InsightStats {
    pub enqueued: u64,
    pub completed: u64,
    pub failed: u64,
    pub stored: u64,
    pub skipped: u64,
}

impl InsightStats {
    pub fn settled(&self) -> bool {
        self.completed + self.failed >= self.enqueued
    }
}

/// Fire-and-forget insight generation. Jobs go through an unbounded channel to a single worker
/// task; its failures end up in the log and the counters, never in the caller.
#[derive(Clone)]
pub struct InsightTrigger {
    sender: mpsc::UnboundedSender<InsightJob>,
    counters: Arc<Counters>,
    logger: Logger,
}

impl InsightTrigger {
    /// Starts the worker. Must be called inside a tokio runtime.
    pub fn spawn(
        generator: Arc<dyn InsightGenerator>,
        store: Arc<dyn RecordStore>,
        logger: Logger,
    ) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<InsightJob>();
        let counters = Arc::new(Counters::default());
        let logger = logger.child("insights");

        let worker_counters = counters.clone();
        let worker_logger = logger.clone();
        tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                process_job(&*generator, &*store, &worker_counters, &worker_logger, job).await;
            }
        });

        Self {
            sender,
            counters,
            logger,
        }
    }

    pub fn enqueue(&self, job: InsightJob) {
        self.counters.enqueued.fetch_add(1, Ordering::SeqCst);
        if let Err(err) = self.sender.send(job) {
            self.counters.failed.fetch_add(1, Ordering::SeqCst);
            self.logger.error(
                "Insight worker is gone, job dropped",
                Some(&json!({"execution_id": err.0.execution_id})),
            );
        }
    }

    pub fn stats(&self) -> InsightStats {
        InsightStats {
            enqueued: self.counters.enqueued.load(Ordering::SeqCst),
            completed: self.counters.completed.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
            stored: self.counters.stored.load(Ordering::SeqCst),
            skipped: self.counters.skipped.load(Ordering::SeqCst),
        }
    }

    /// Waits until every enqueued job has finished or `timeout` elapses.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.stats().settled() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

async fn process_job(
    generator: &dyn InsightGenerator,
    store: &dyn RecordStore,
    counters: &Counters,
    logger: &Logger,
    job: InsightJob,
) {
    let generated = match generator
        .generate_insights(&job.response, &job.endpoint, &job.model_key)
        .await
    {
        Ok(generated) => generated,
        Err(err) => {
            counters.failed.fetch_add(1, Ordering::SeqCst);
            logger.error(
                "Insight generation failed",
                Some(&json!({
                    "execution_id": job.execution_id,
                    "endpoint_id": job.endpoint.id,
                    "error": err.message,
                })),
            );
            return;
        }
    };

    for insight in generated.insights {
        let Some(category) = insight.category() else {
            counters.skipped.fetch_add(1, Ordering::SeqCst);
            logger.warn(
                "Skipping insight with unknown category",
                Some(&json!({"execution_id": job.execution_id, "category": insight.category})),
            );
            continue;
        };
        let record = NewInsight {
            execution_id: job.execution_id.clone(),
            ai_model: job.model_key.clone(),
            title: insight.title.clone(),
            description: insight.description.clone(),
            category,
            confidence: insight.confidence_score(),
            metadata: json!({}),
        };
        match store.create_insight(record).await {
            Ok(_) => {
                counters.stored.fetch_add(1, Ordering::SeqCst);
            }
            Err(err) => {
                logger.error(
                    "Failed to store insight",
                    Some(&json!({"execution_id": job.execution_id, "error": err.to_string()})),
                );
            }
        }
    }
    counters.completed.fetch_add(1, Ordering::SeqCst);
    logger.debug(
        "Insights generated",
        Some(&json!({"execution_id": job.execution_id})),
    );
}
