//! Scheduler owning the registry of scan units
//!
//! Registration happens at configuration time only. [`Scheduler::start`]
//! launches one supervised task per unit and hands back a
//! [`SchedulerHandle`] for shutdown. A scanner task that panics is logged
//! and restarted after one poll interval; it never takes other units or the
//! process down with it.

use crate::error::ScanError;
use crate::keys::validate_name;
use crate::processor::ProtocolParser;
use crate::records::ScanUnitKey;
use crate::scanner::{sleep_or_shutdown, ProtocolScanner, ScanSettings};
use crate::store::ProgressStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn, Instrument};

pub struct Scheduler {
    store: Arc<dyn ProgressStore>,
    settings: ScanSettings,
    /// chain name -> protocol name -> parser
    parsers: BTreeMap<String, BTreeMap<String, Arc<dyn ProtocolParser>>>,
    started: bool,
}

impl Scheduler {
    pub fn new(store: Arc<dyn ProgressStore>, settings: ScanSettings) -> Self {
        Self {
            store,
            settings,
            parsers: BTreeMap::new(),
            started: false,
        }
    }

    /// Register a (chain, protocol) scan unit.
    ///
    /// Rejected once the scheduler has started, for a duplicate unit, or for
    /// names that cannot form a checkpoint key.
    pub fn register_protocol(
        &mut self,
        chain: &str,
        protocol: &str,
        parser: Arc<dyn ProtocolParser>,
    ) -> Result<(), ScanError> {
        let reject = |reason: &str| ScanError::Registration {
            chain: chain.to_string(),
            protocol: protocol.to_string(),
            reason: reason.to_string(),
        };

        if self.started {
            return Err(reject("scheduler already started"));
        }
        validate_name("chain", chain)?;
        validate_name("protocol", protocol)?;

        let protocols = self.parsers.entry(chain.to_string()).or_default();
        if protocols.contains_key(protocol) {
            return Err(reject("already registered"));
        }
        protocols.insert(protocol.to_string(), parser);
        Ok(())
    }

    /// Registered units in key order.
    pub fn units(&self) -> Vec<ScanUnitKey> {
        self.parsers
            .iter()
            .flat_map(|(chain, protocols)| {
                protocols
                    .keys()
                    .map(move |protocol| ScanUnitKey::new(chain.clone(), protocol.clone()))
            })
            .collect()
    }

    /// Launch one task per registered unit and return immediately.
    ///
    /// Must be called from within a tokio runtime. Can only be called once.
    pub fn start(&mut self) -> Result<SchedulerHandle, ScanError> {
        if self.started {
            return Err(ScanError::Config("scheduler already started".to_string()));
        }
        self.started = true;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = JoinSet::new();
        let units = self.units();

        if units.is_empty() {
            warn!("Scheduler started with no registered scan units");
        }

        for (chain, protocols) in &self.parsers {
            for (protocol, parser) in protocols {
                let scanner = ProtocolScanner::new(
                    ScanUnitKey::new(chain.clone(), protocol.clone()),
                    parser.clone(),
                    self.store.clone(),
                    self.settings,
                );
                let span = tracing::info_span!("scan", chain = %chain, protocol = %protocol);
                tasks.spawn(
                    supervise(scanner, self.settings, shutdown_rx.clone()).instrument(span),
                );
            }
        }

        info!("Scheduler started {} scan units", units.len());
        Ok(SchedulerHandle {
            shutdown: shutdown_tx,
            tasks,
            units,
        })
    }
}

/// Aborts the wrapped task when dropped, so a cancelled supervisor never
/// leaves its scanner running detached.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Keep a scanner running, restarting it if its task panics.
async fn supervise(
    scanner: ProtocolScanner,
    settings: ScanSettings,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut restarts: u64 = 0;
    loop {
        let mut task = AbortOnDrop(tokio::spawn({
            let scanner = scanner.clone();
            let shutdown = shutdown.clone();
            async move { scanner.run(shutdown).await }.instrument(tracing::Span::current())
        }));

        match (&mut task.0).await {
            Ok(()) => break,
            Err(e) if e.is_panic() => {
                restarts += 1;
                error!(
                    "Scanner for {} panicked (restart #{}); restarting in {:?}",
                    scanner.key(),
                    restarts,
                    settings.poll_interval
                );
                if sleep_or_shutdown(settings.poll_interval, &mut shutdown).await {
                    break;
                }
            }
            Err(e) => {
                warn!("Scanner task for {} cancelled: {}", scanner.key(), e);
                break;
            }
        }
    }
}

/// Running scheduler.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    tasks: JoinSet<()>,
    units: Vec<ScanUnitKey>,
}

impl SchedulerHandle {
    pub fn units(&self) -> &[ScanUnitKey] {
        &self.units
    }

    /// Signal every scanner to stop and wait for all of them.
    pub async fn shutdown(mut self) {
        info!("Shutting down {} scan units", self.units.len());
        // Receivers live in the tasks; a send error means they are all gone.
        let _ = self.shutdown.send(true);
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                warn!("Supervisor task ended abnormally: {}", e);
            }
        }
    }
}
