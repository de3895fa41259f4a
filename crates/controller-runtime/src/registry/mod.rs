//! # Module Registry
//!
//! Owns the CBT routing table, one bounded inbox per module, and the task
//! that drains each inbox.
//!
//! ## Lifecycle
//!
//! ```text
//! register()          start_all()                     stop_all()
//!     │                    │                               │
//!     ↓                    ↓                               ↓
//! Registered ──→ Starting ──→ Running ──────────────→ Stopped
//!                    │
//!                    └──(initialize failed)──→ Failed
//! ```
//!
//! Every inbox is created at registration, so a module may emit CBTs to any
//! other registered module from inside `initialize`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use cbt_bus::{Cbt, CbtRegistry, ControllerModule, ModuleContext, ModuleError, ModuleName};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval};
use tracing::{debug, info, warn};

use crate::container::RuntimeConfig;

/// Module lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleStatus {
    NotRegistered,
    Registered,
    Starting,
    Running,
    Stopped,
    Failed,
}

struct Entry {
    module: Arc<dyn ControllerModule>,
    inbox: Option<mpsc::Receiver<Cbt>>,
}

/// Registry of controller modules.
pub struct ModuleRegistry {
    /// Registered modules, in registration order.
    entries: Mutex<Vec<(ModuleName, Entry)>>,
    status: RwLock<HashMap<ModuleName, ModuleStatus>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    cbt_registry: Arc<CbtRegistry>,
    shutdown_tx: watch::Sender<bool>,
    config: RuntimeConfig,
}

impl ModuleRegistry {
    #[must_use]
    pub fn new(config: RuntimeConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            entries: Mutex::new(Vec::new()),
            status: RwLock::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
            cbt_registry: Arc::new(CbtRegistry::with_capacity(config.inbox_capacity)),
            shutdown_tx,
            config,
        }
    }

    /// The routing table shared by every module.
    #[must_use]
    pub fn cbt_registry(&self) -> Arc<CbtRegistry> {
        Arc::clone(&self.cbt_registry)
    }

    /// A receiver that flips to `true` once `stop_all` begins.
    #[must_use]
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Register a module and create its inbox.
    ///
    /// # Errors
    ///
    /// Returns `ModuleError::Initialization` if a module with the same name is
    /// already registered.
    pub fn register(&self, module: Arc<dyn ControllerModule>) -> Result<(), ModuleError> {
        let name = module.name().clone();
        let mut entries = self.entries.lock();
        if entries.iter().any(|(n, _)| *n == name) {
            return Err(ModuleError::Initialization {
                module: name,
                message: "module already registered".into(),
            });
        }

        info!("[Registry] Registering module: {}", name);
        let inbox = self.cbt_registry.register_module(name.clone());
        entries.push((
            name.clone(),
            Entry {
                module,
                inbox: Some(inbox),
            },
        ));
        self.status.write().insert(name, ModuleStatus::Registered);
        Ok(())
    }

    /// Initialize every registered module in registration order and start
    /// its inbox task.
    ///
    /// A module whose `initialize` fails is marked `Failed` and its inbox is
    /// removed; the remaining modules still start.
    pub async fn start_all(&self) -> Result<(), Vec<ModuleError>> {
        let mut errors = Vec::new();
        let pending: Vec<(ModuleName, Arc<dyn ControllerModule>, mpsc::Receiver<Cbt>)> = self
            .entries
            .lock()
            .iter_mut()
            .filter_map(|(name, entry)| {
                entry
                    .inbox
                    .take()
                    .map(|inbox| (name.clone(), Arc::clone(&entry.module), inbox))
            })
            .collect();

        for (name, module, inbox) in pending {
            info!("[Registry] Starting {}", name);
            self.set_status(&name, ModuleStatus::Starting);

            let ctx = ModuleContext::new(self.cbt_registry(), self.shutdown_signal());
            if let Err(e) = module.initialize(&ctx).await {
                warn!(module = %name, error = %e, "Module failed to initialize");
                self.cbt_registry.unregister(&name);
                self.set_status(&name, ModuleStatus::Failed);
                errors.push(e);
                continue;
            }

            let task = tokio::spawn(drive(
                module,
                inbox,
                self.shutdown_signal(),
                self.config.timer_interval(),
            ));
            self.tasks.lock().push(task);
            self.set_status(&name, ModuleStatus::Running);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Signal shutdown, terminate every running module and wait for the
    /// inbox tasks to finish within the grace period.
    pub async fn stop_all(&self) -> Result<(), Vec<ModuleError>> {
        self.shutdown_tx.send_replace(true);

        let mut errors = Vec::new();
        let modules: Vec<(ModuleName, Arc<dyn ControllerModule>)> = self
            .entries
            .lock()
            .iter()
            .map(|(name, entry)| (name.clone(), Arc::clone(&entry.module)))
            .collect();

        for (name, module) in modules {
            if self.status(&name) != ModuleStatus::Running {
                continue;
            }
            info!("[Registry] Stopping {}", name);
            match module.terminate().await {
                Ok(()) => self.set_status(&name, ModuleStatus::Stopped),
                Err(e) => {
                    warn!(module = %name, error = %e, "Module failed to terminate");
                    self.set_status(&name, ModuleStatus::Failed);
                    errors.push(e);
                }
            }
        }

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        let deadline = Instant::now() + self.config.shutdown_grace();
        for task in tasks {
            let abort = task.abort_handle();
            if tokio::time::timeout_at(deadline, task).await.is_err() {
                warn!("[Registry] Module task did not stop in time, aborting");
                abort.abort();
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Status of a module.
    #[must_use]
    pub fn status(&self, name: &ModuleName) -> ModuleStatus {
        self.status
            .read()
            .get(name)
            .copied()
            .unwrap_or(ModuleStatus::NotRegistered)
    }

    /// All statuses, in registration order.
    #[must_use]
    pub fn statuses(&self) -> Vec<(ModuleName, ModuleStatus)> {
        self.entries
            .lock()
            .iter()
            .map(|(name, _)| (name.clone(), self.status(name)))
            .collect()
    }

    /// True when every registered module is running.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.statuses()
            .iter()
            .all(|(_, status)| *status == ModuleStatus::Running)
    }

    /// Print registry status.
    pub fn print_status(&self) {
        info!("===========================================");
        info!("  MODULE REGISTRY STATUS");
        info!("===========================================");

        for (name, state) in self.statuses() {
            let icon = match state {
                ModuleStatus::Running => "✅",
                ModuleStatus::Failed => "❌",
                ModuleStatus::Stopped => "⏹️ ",
                _ => "⏳",
            };
            info!("  {} {:30} {:?}", icon, name, state);
        }

        info!("===========================================");
    }

    fn set_status(&self, name: &ModuleName, status: ModuleStatus) {
        self.status.write().insert(name.clone(), status);
    }
}

/// Drain one module's inbox until shutdown or until every sender is gone.
async fn drive(
    module: Arc<dyn ControllerModule>,
    mut inbox: mpsc::Receiver<Cbt>,
    mut shutdown: watch::Receiver<bool>,
    timer: Option<Duration>,
) {
    let mut ticker = timer.map(|period| tokio::time::interval_at(Instant::now() + period, period));

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            cbt = inbox.recv() => match cbt {
                Some(cbt) => module.process_cbt(cbt).await,
                None => break,
            },
            () = tick(&mut ticker) => module.timer_method().await,
        }
    }

    debug!(module = %module.name(), "Module task exited");
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cbt_bus::CbtPayload;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc::UnboundedSender;
    use tokio::time::timeout;

    /// Forwards every CBT it processes to a test channel.
    struct Probe {
        name: ModuleName,
        seen: UnboundedSender<Cbt>,
        fail_init: bool,
        ticks: AtomicUsize,
    }

    impl Probe {
        fn new(name: &str, seen: UnboundedSender<Cbt>) -> Arc<Self> {
            Arc::new(Self {
                name: name.into(),
                seen,
                fail_init: false,
                ticks: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ControllerModule for Probe {
        fn name(&self) -> &ModuleName {
            &self.name
        }

        async fn initialize(&self, _ctx: &ModuleContext) -> Result<(), ModuleError> {
            if self.fail_init {
                return Err(ModuleError::Initialization {
                    module: self.name.clone(),
                    message: "probe refused".into(),
                });
            }
            Ok(())
        }

        async fn process_cbt(&self, cbt: Cbt) {
            let _ = self.seen.send(cbt);
        }

        async fn timer_method(&self) {
            self.ticks.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn echo() -> CbtPayload {
        CbtPayload::Echo {
            interface_name: None,
        }
    }

    #[tokio::test]
    async fn test_lifecycle_and_delivery() {
        let registry = ModuleRegistry::new(RuntimeConfig::default());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        registry.register(Probe::new("LinkManager", tx)).unwrap();

        let name = ModuleName::from("LinkManager");
        assert_eq!(registry.status(&name), ModuleStatus::Registered);

        registry.start_all().await.unwrap();
        assert_eq!(registry.status(&name), ModuleStatus::Running);
        assert!(registry.is_healthy());

        registry
            .cbt_registry()
            .register_cbt("TincanInterface", "LinkManager", echo())
            .unwrap();
        let cbt = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timeout")
            .expect("cbt");
        assert_eq!(cbt.action, "DO_ECHO");

        registry.stop_all().await.unwrap();
        assert_eq!(registry.status(&name), ModuleStatus::Stopped);
    }

    #[tokio::test]
    async fn test_cbts_processed_in_arrival_order() {
        let registry = ModuleRegistry::new(RuntimeConfig::default());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        registry.register(Probe::new("Sink", tx)).unwrap();
        registry.start_all().await.unwrap();

        let cbt_registry = registry.cbt_registry();
        for initiator in ["A", "B", "C"] {
            cbt_registry.register_cbt(initiator, "Sink", echo()).unwrap();
        }

        for expected in ["A", "B", "C"] {
            let cbt = timeout(Duration::from_secs(1), rx.recv())
                .await
                .expect("timeout")
                .expect("cbt");
            assert_eq!(cbt.initiator, expected);
        }
        registry.stop_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_initialize_does_not_stop_others() {
        let registry = ModuleRegistry::new(RuntimeConfig::default());
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        registry
            .register(Arc::new(Probe {
                name: "Broken".into(),
                seen: tx.clone(),
                fail_init: true,
                ticks: AtomicUsize::new(0),
            }))
            .unwrap();
        registry.register(Probe::new("Healthy", tx)).unwrap();

        let errors = registry.start_all().await.unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].module(), &ModuleName::from("Broken"));

        assert_eq!(registry.status(&"Broken".into()), ModuleStatus::Failed);
        assert_eq!(registry.status(&"Healthy".into()), ModuleStatus::Running);
        assert!(!registry.cbt_registry().contains(&"Broken".into()));
        assert!(!registry.is_healthy());

        registry.stop_all().await.unwrap();
        assert_eq!(registry.status(&"Broken".into()), ModuleStatus::Failed);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = ModuleRegistry::new(RuntimeConfig::default());
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        registry.register(Probe::new("ArpCache", tx.clone())).unwrap();
        assert!(registry.register(Probe::new("ArpCache", tx)).is_err());
        assert_eq!(registry.statuses().len(), 1);
    }

    #[test]
    fn test_unknown_module_status() {
        let registry = ModuleRegistry::new(RuntimeConfig::default());
        assert_eq!(
            registry.status(&"Nobody".into()),
            ModuleStatus::NotRegistered
        );
    }

    #[tokio::test]
    async fn test_timer_hook_runs_periodically() {
        let config = RuntimeConfig {
            timer_interval_ms: Some(10),
            ..RuntimeConfig::default()
        };
        let registry = ModuleRegistry::new(config);
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let probe = Probe::new("Ticker", tx);
        registry.register(probe.clone()).unwrap();
        registry.start_all().await.unwrap();

        timeout(Duration::from_secs(2), async {
            while probe.ticks.load(Ordering::SeqCst) < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timer hook never ran");

        registry.stop_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_signal_observed() {
        let registry = ModuleRegistry::new(RuntimeConfig::default());
        let mut signal = registry.shutdown_signal();
        registry.stop_all().await.unwrap();
        assert!(signal.has_changed().unwrap());
        assert!(*signal.borrow_and_update());
    }
}
