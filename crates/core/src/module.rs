//! Module interface (C10).
//!
//! The original loads modules from shared objects at runtime via
//! `dlopen`; stable Rust has no ABI for that kind of dynamic
//! trait-object loading across a process boundary, so modules here are
//! statically linked implementations of the [`Module`] trait,
//! registered at startup. The observable contract survives: each
//! module declares an API revision that's checked at registration
//! (instead of at `dlopen` time), may own a dedicated worker thread fed
//! by a [`WorkQueue`], and is given hooks into the accounting and
//! control-plane surfaces.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::queue::{Signal, WorkItem, WorkQueue};

/// Bumped whenever the hooks below change shape. A module built
/// against a different revision is rejected at registration rather
/// than loaded and crashing later.
pub const MODULE_API_REVISION: u32 = 1;

/// Opaque accounting event a module's worker thread consumes from its
/// queue. Modules that don't need a worker thread can ignore this type
/// entirely.
#[derive(Debug, Clone)]
pub enum AccountingEvent {
    SessionCreated { session_id: u64 },
    SessionComplete { session_id: u64 },
    SessionExpired { session_id: u64 },
}

/// A statically-linked relay module.
pub trait Module: Send + Sync {
    fn name(&self) -> &'static str;

    fn api_revision(&self) -> u32 {
        MODULE_API_REVISION
    }

    /// Handle one accounting event. Called from the module's own
    /// worker thread if `wants_worker_thread` is true, otherwise
    /// inline on the caller's thread — implementations must be cheap
    /// in the inline case.
    fn on_event(&self, event: &AccountingEvent);

    /// Whether this module wants a dedicated worker thread fed by a
    /// [`WorkQueue`] rather than being called inline.
    fn wants_worker_thread(&self) -> bool {
        false
    }
}

struct RunningModule {
    module: Arc<dyn Module>,
    sender: Option<crate::queue::QueueSender<AccountingEvent, ()>>,
    handle: Option<JoinHandle<()>>,
}

/// Holds every registered module and, for the ones that asked for one,
/// its worker thread and queue.
pub struct ModuleRegistry {
    modules: Vec<RunningModule>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self { modules: Vec::new() }
    }

    /// Register and (if requested) start a module's worker thread.
    /// Rejects a module built against a different API revision.
    pub fn register(&mut self, module: Arc<dyn Module>) -> Result<(), crate::error::RtpProxyError> {
        if module.api_revision() != MODULE_API_REVISION {
            return Err(crate::error::RtpProxyError::Protocol(format!(
                "module {} built against API revision {}, expected {}",
                module.name(),
                module.api_revision(),
                MODULE_API_REVISION
            )));
        }

        if module.wants_worker_thread() {
            let queue: Arc<WorkQueue<AccountingEvent, ()>> = Arc::new(WorkQueue::new(256));
            let sender = queue.sender();
            let worker_module = module.clone();
            let handle = std::thread::Builder::new()
                .name(format!("module-{}", module.name()))
                .spawn(move || {
                    loop {
                        match queue.get(Duration::from_millis(500)) {
                            Some(WorkItem::Data(event)) => worker_module.on_event(&event),
                            Some(WorkItem::Signal(Signal::Term)) => break,
                            Some(WorkItem::Api(())) => {}
                            None => continue,
                        }
                    }
                })
                .expect("failed to spawn module worker thread");

            self.modules.push(RunningModule {
                module,
                sender: Some(sender),
                handle: Some(handle),
            });
        } else {
            self.modules.push(RunningModule {
                module,
                sender: None,
                handle: None,
            });
        }
        Ok(())
    }

    /// Fan an accounting event out to every registered module, either
    /// queuing it (worker-thread modules) or calling inline.
    pub fn dispatch(&self, event: AccountingEvent) {
        for m in &self.modules {
            match &m.sender {
                Some(sender) => {
                    sender.put(WorkItem::Data(event.clone()));
                }
                None => m.module.on_event(&event),
            }
        }
    }

    /// Signal every worker-thread module to stop and join its thread.
    pub fn shutdown(&mut self) {
        for m in &self.modules {
            if let Some(sender) = &m.sender {
                sender.put_term();
            }
        }
        for m in &mut self.modules {
            if let Some(handle) = m.handle.take() {
                let _ = handle.join();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ModuleRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}
