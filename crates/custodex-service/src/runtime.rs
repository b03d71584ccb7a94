//! Process wiring for the reconciliation loops.

use std::sync::Arc;

use custodex_chain::{GatewayDialer, Keypair, Mailer};
use custodex_ledger::LedgerStore;
use custodex_reconcile::{
    ConfirmationSweep, DepositScanner, GatewayPool, Ticker, WithdrawalDispatcher, spawn_periodic,
};
use custodex_types::{ExchangeConfig, Notifier, constants};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Everything outside the core that a node is built from.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn LedgerStore>,
    pub dialer: Arc<dyn GatewayDialer>,
    pub keypair: Arc<dyn Keypair>,
    pub mailer: Arc<dyn Mailer>,
    pub notifier: Arc<dyn Notifier>,
}

pub struct Runtime;

impl Runtime {
    /// Spawn the deposit scan, confirmation sweep, withdrawal dispatch and
    /// withdrawal recovery loops. Must be called inside a tokio runtime.
    #[must_use]
    pub fn start(config: &ExchangeConfig, deps: &Collaborators) -> RuntimeHandle {
        let (shutdown, signal) = watch::channel(false);
        let gateways = Arc::new(GatewayPool::new(Arc::clone(&deps.dialer)));

        let scanner = Arc::new(DepositScanner::new(
            Arc::clone(&deps.store),
            Arc::clone(&gateways),
            Arc::clone(&deps.notifier),
        ));
        let sweep = Arc::new(ConfirmationSweep::new(
            Arc::clone(&deps.store),
            Arc::clone(&deps.notifier),
        ));
        let dispatcher = Arc::new(
            WithdrawalDispatcher::new(
                Arc::clone(&deps.store),
                gateways,
                Arc::clone(&deps.keypair),
                Arc::clone(&deps.mailer),
                Arc::clone(&deps.notifier),
                config.withdraw.passphrase.clone(),
            )
            .with_processing_timeout(config.withdraw.processing_timeout())
            .with_unknown_outcome_timeout(config.withdraw.unknown_outcome_timeout()),
        );

        let mut tasks = Vec::with_capacity(4);
        tasks.push(spawn_periodic(
            "deposit-scan",
            Ticker::new(config.deposit.scan_interval(), config.deposit.jitter()),
            signal.clone(),
            move || {
                let scanner = Arc::clone(&scanner);
                async move {
                    // Scans run detached; a chain still scanning is skipped.
                    if let Err(e) = scanner.tick().await {
                        tracing::warn!(error = %e, "deposit scan tick failed");
                    }
                }
            },
        ));
        tasks.push(spawn_periodic(
            "deposit-confirm",
            Ticker::new(config.deposit.sweep_interval(), config.deposit.jitter()),
            signal.clone(),
            move || {
                let sweep = Arc::clone(&sweep);
                async move {
                    match sweep.tick().await {
                        Ok(report) if report.credited + report.held > 0 => {
                            tracing::debug!(?report, "confirmation sweep");
                        }
                        Ok(_) => {}
                        Err(e) => tracing::warn!(error = %e, "confirmation sweep failed"),
                    }
                }
            },
        ));
        let dispatch = Arc::clone(&dispatcher);
        tasks.push(spawn_periodic(
            "withdraw-dispatch",
            Ticker::new(config.withdraw.interval(), config.withdraw.jitter()),
            signal.clone(),
            move || {
                let dispatch = Arc::clone(&dispatch);
                async move {
                    if let Err(e) = dispatch.tick().await {
                        tracing::warn!(error = %e, "withdrawal dispatch tick failed");
                    }
                }
            },
        ));
        tasks.push(spawn_periodic(
            "withdraw-recovery",
            Ticker::new(config.withdraw.recovery_interval(), config.withdraw.jitter()),
            signal,
            move || {
                let dispatcher = Arc::clone(&dispatcher);
                async move {
                    match dispatcher.recover_stale().await {
                        Ok(report) if report.requeued + report.finalized + report.failed > 0 => {
                            tracing::info!(?report, "stale withdrawals recovered");
                        }
                        Ok(_) => {}
                        Err(e) => tracing::warn!(error = %e, "withdrawal recovery failed"),
                    }
                }
            },
        ));

        tracing::info!(engine = constants::ENGINE_NAME, version = constants::VERSION, "runtime started");
        RuntimeHandle { shutdown, tasks }
    }
}

/// Stops the loops started by [`Runtime::start`].
pub struct RuntimeHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl RuntimeHandle {
    /// Signal every loop and wait for each to finish its current tick.
    pub async fn shutdown(self) {
        // Loops also stop when every receiver is gone, so a send error
        // means there is nothing left to stop.
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "loop task ended abnormally");
            }
        }
        tracing::info!("runtime stopped");
    }
}
