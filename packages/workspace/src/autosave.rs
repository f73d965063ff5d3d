//! Autosave driver.
//!
//! Runs the per-entity autosave machines on a background task: edits arrive
//! over a channel, saves are started when the debounce or max-interval
//! deadline passes, and completions are fed back into the machine. Every
//! save is a full replace of the entity's settings tagged with the machine's
//! revision, so duplicate or late arrivals are harmless on the server side.
//! A save the server reports as stale is not settled: the values go out
//! again under a revision above the one the server holds.

use crate::error::ServiceResult;
use crate::service::{BuilderService, SettingsReply};
use async_trait::async_trait;
use railspress_common::{EntityRef, Settings};
use railspress_editor::{Autosave, AutosaveConfig, SaveIndicator, SaveRequest};
use railspress_schema::SettingsWrite;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Destination of autosaved settings
#[async_trait]
pub trait SettingsSink: Send + Sync + 'static {
    async fn save_settings(&self, entity: &EntityRef, values: Settings, revision: u64) -> ServiceResult<SettingsReply>;
}

#[async_trait]
impl SettingsSink for BuilderService {
    async fn save_settings(&self, entity: &EntityRef, values: Settings, revision: u64) -> ServiceResult<SettingsReply> {
        self.apply_settings(entity, SettingsWrite::replace(values), Some(revision))
            .await
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("autosave driver has stopped")]
pub struct DriverStopped;

#[derive(Debug)]
enum Command {
    Edit(EntityRef, Settings),
    Flush,
    Shutdown,
}

struct Completion {
    entity: EntityRef,
    revision: u64,
    result: ServiceResult<SettingsReply>,
}

pub struct AutosaveHandle {
    commands: mpsc::Sender<Command>,
    indicator: watch::Receiver<SaveIndicator>,
    task: JoinHandle<()>,
}

impl AutosaveHandle {
    /// Start the driver on the current runtime
    pub fn spawn<S: SettingsSink>(sink: Arc<S>, config: AutosaveConfig) -> Self {
        let (commands, command_rx) = mpsc::channel(256);
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let (indicator_tx, indicator) = watch::channel(SaveIndicator::Saved);

        let driver = Driver {
            sink,
            machine: Autosave::new(config),
            done_tx,
            indicator: indicator_tx,
            in_flight: 0,
        };
        let task = tokio::spawn(driver.run(command_rx, done_rx));

        Self {
            commands,
            indicator,
            task,
        }
    }

    /// Record the complete newest settings of `entity`
    pub async fn edit(&self, entity: EntityRef, values: Settings) -> Result<(), DriverStopped> {
        self.commands
            .send(Command::Edit(entity, values))
            .await
            .map_err(|_| DriverStopped)
    }

    /// Save every dirty entity now instead of waiting for its deadline
    pub async fn flush(&self) -> Result<(), DriverStopped> {
        self.commands.send(Command::Flush).await.map_err(|_| DriverStopped)
    }

    pub fn indicator(&self) -> watch::Receiver<SaveIndicator> {
        self.indicator.clone()
    }

    /// Flush, wait for in-flight saves and stop the driver
    pub async fn shutdown(self) {
        if self.commands.send(Command::Shutdown).await.is_err() {
            return;
        }
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Autosave driver ended abnormally");
        }
    }
}

struct Driver<S> {
    sink: Arc<S>,
    machine: Autosave<EntityRef, Settings>,
    done_tx: mpsc::UnboundedSender<Completion>,
    indicator: watch::Sender<SaveIndicator>,
    in_flight: usize,
}

fn now() -> std::time::Instant {
    Instant::now().into_std()
}

impl<S: SettingsSink> Driver<S> {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut done: mpsc::UnboundedReceiver<Completion>,
    ) {
        let mut stopping = false;

        loop {
            let deadline = self.machine.next_deadline();
            let wake = deadline
                .map(Instant::from_std)
                .unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            tokio::select! {
                command = commands.recv(), if !stopping => match command {
                    Some(Command::Edit(entity, values)) => self.machine.edit(entity, values, now()),
                    Some(Command::Flush) => {
                        let due = self.machine.flush();
                        self.start(due);
                    }
                    Some(Command::Shutdown) | None => {
                        stopping = true;
                        let due = self.machine.flush();
                        self.start(due);
                    }
                },
                Some(completion) = done.recv() => self.settle(completion),
                _ = tokio::time::sleep_until(wake), if deadline.is_some() && !stopping => {
                    let due = self.machine.poll(now());
                    self.start(due);
                }
            }

            self.indicator.send_replace(self.machine.indicator());

            if stopping && self.in_flight == 0 {
                if self.machine.has_unsaved() {
                    tracing::warn!("Autosave stopped with unsaved edits");
                }
                break;
            }
        }
    }

    fn start(&mut self, due: Vec<SaveRequest<EntityRef, Settings>>) {
        for request in due {
            self.in_flight += 1;
            let sink = self.sink.clone();
            let done = self.done_tx.clone();
            tokio::spawn(async move {
                let result = sink
                    .save_settings(&request.key, request.values, request.revision)
                    .await;
                // Receiver lives as long as the driver
                let _ = done.send(Completion {
                    entity: request.key,
                    revision: request.revision,
                    result,
                });
            });
        }
    }

    fn settle(&mut self, completion: Completion) {
        self.in_flight = self.in_flight.saturating_sub(1);
        let Completion {
            entity,
            revision,
            result,
        } = completion;

        match result {
            Ok(reply) if reply.stale => {
                let accepted = reply.client_revision.unwrap_or(revision);
                tracing::info!(
                    entity = %entity,
                    revision,
                    accepted,
                    "Autosave behind the stored revision; resending"
                );
                self.machine.save_superseded(&entity, revision, accepted);
            }
            Ok(reply) => {
                if reply.outcome.has_errors() {
                    tracing::warn!(
                        entity = %entity,
                        revision,
                        fields = ?reply.outcome.errors.keys().collect::<Vec<_>>(),
                        "Autosave stored with rejected fields"
                    );
                }
                self.machine.save_succeeded(&entity, revision);
                self.machine.prune();
            }
            Err(e) => {
                self.machine.save_failed(&entity, revision, &e, now());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::store::StoreError;
    use railspress_schema::SettingsOutcome;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        saves: Mutex<Vec<(EntityRef, Settings, u64)>>,
        failures_left: AtomicUsize,
    }

    #[async_trait]
    impl SettingsSink for RecordingSink {
        async fn save_settings(&self, entity: &EntityRef, values: Settings, revision: u64) -> ServiceResult<SettingsReply> {
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(ServiceError::Store(StoreError::Unavailable("disk offline".into())));
            }
            self.saves.lock().unwrap().push((entity.clone(), values, revision));
            Ok(SettingsReply {
                entity: entity.clone(),
                stale: false,
                outcome: SettingsOutcome::default(),
                revision: Some(revision),
                client_revision: Some(revision),
            })
        }
    }

    fn heading(value: &str) -> Settings {
        Settings::from([("heading".to_string(), json!(value))])
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounced_edits_save_once() {
        let sink = Arc::new(RecordingSink::default());
        let handle = AutosaveHandle::spawn(sink.clone(), AutosaveConfig::default());
        let hero = EntityRef::section("index", "hero");

        handle.edit(hero.clone(), heading("Hel")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.edit(hero.clone(), heading("Hello")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let saves = sink.saves.lock().unwrap().clone();
        assert_eq!(saves, vec![(hero, heading("Hello"), 2)]);
        assert_eq!(*handle.indicator().borrow(), SaveIndicator::Saved);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_save_stays_dirty_and_retries() {
        let sink = Arc::new(RecordingSink {
            failures_left: AtomicUsize::new(1),
            ..Default::default()
        });
        let handle = AutosaveHandle::spawn(sink.clone(), AutosaveConfig::default());
        let hero = EntityRef::section("index", "hero");

        handle.edit(hero.clone(), heading("Hello")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(sink.saves.lock().unwrap().is_empty());
        assert!(matches!(*handle.indicator().borrow(), SaveIndicator::Failed { .. }));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(sink.saves.lock().unwrap().len(), 1);
        assert_eq!(*handle.indicator().borrow(), SaveIndicator::Saved);
    }

    /// Ignores revisions below the highest one it has stored
    struct RevisionCheckingSink {
        stored: Mutex<(u64, Option<Settings>)>,
    }

    #[async_trait]
    impl SettingsSink for RevisionCheckingSink {
        async fn save_settings(&self, entity: &EntityRef, values: Settings, revision: u64) -> ServiceResult<SettingsReply> {
            let mut stored = self.stored.lock().unwrap();
            let stale = revision < stored.0;
            if !stale {
                *stored = (revision, Some(values));
            }
            Ok(SettingsReply {
                entity: entity.clone(),
                stale,
                outcome: SettingsOutcome::default(),
                revision: None,
                client_revision: Some(stored.0),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_reply_is_resent_not_reported_saved() {
        let sink = Arc::new(RevisionCheckingSink {
            stored: Mutex::new((5, Some(heading("older session")))),
        });
        let handle = AutosaveHandle::spawn(sink.clone(), AutosaveConfig::default());
        let hero = EntityRef::section("index", "hero");

        handle.edit(hero.clone(), heading("Hello")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(*sink.stored.lock().unwrap(), (6, Some(heading("Hello"))));
        assert_eq!(*handle.indicator().borrow(), SaveIndicator::Saved);

        handle.edit(hero, heading("Hello again")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(*sink.stored.lock().unwrap(), (7, Some(heading("Hello again"))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_pending_edits() {
        let sink = Arc::new(RecordingSink::default());
        let handle = AutosaveHandle::spawn(sink.clone(), AutosaveConfig::default());

        handle
            .edit(EntityRef::theme("dawn"), heading("Dawn"))
            .await
            .unwrap();
        handle.shutdown().await;

        assert_eq!(sink.saves.lock().unwrap().len(), 1);
    }
}
