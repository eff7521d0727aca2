//! # Runtime Session
//!
//! [`Runtime`] owns everything built from one [`Declaration`]: the dispatch
//! table, the keyboard cache and the script and condition machinery. The
//! [`VariableStore`] outlives the declaration, so [`Runtime::reload`] swaps
//! the session while keeping every variable value.
//!
//! ```text
//! InboundEvent ─> Trigger ─> DispatchTable ─> EventContext
//!                                   │
//!                          [script] ─> [condition] ─> EffectExecutor ─> Messenger
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use strum_macros::{Display, IntoStaticStr};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::condition::ConditionEvaluator;
use crate::config::RuntimeConfig;
use crate::context::{EventContext, InboundEvent};
use crate::declaration::{BotMeta, Declaration};
use crate::dispatch::{DispatchTable, Trigger};
use crate::error::ConfigError;
use crate::executor::{EffectExecutor, EffectSummary};
use crate::keyboard::KeyboardCache;
use crate::lang::Limits;
use crate::messenger::Messenger;
use crate::script::ScriptRunner;
use crate::store::VariableStore;
use crate::template::TemplateEngine;
use crate::value::Value;

/// Which effect list of a handler ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr, Serialize)]
#[strum(serialize_all = "lowercase")]
pub enum Branch {
    Primary,
    Else,
}

/// Result of one dispatched event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub handler: String,
    pub trigger: Trigger,
    pub branch: Branch,
    /// The script raised an error and nothing it wrote was kept.
    pub script_failed: bool,
    pub summary: EffectSummary,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeStats {
    pub events: u64,
    pub handled: u64,
    pub unhandled: u64,
    pub script_errors: u64,
    pub effect_failures: u64,
    pub reloads: u64,
}

#[derive(Debug, Default)]
struct Counters {
    events: AtomicU64,
    handled: AtomicU64,
    unhandled: AtomicU64,
    script_errors: AtomicU64,
    effect_failures: AtomicU64,
    reloads: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    fn snapshot(&self) -> RuntimeStats {
        RuntimeStats {
            events: self.events.load(Ordering::Relaxed),
            handled: self.handled.load(Ordering::Relaxed),
            unhandled: self.unhandled.load(Ordering::Relaxed),
            script_errors: self.script_errors.load(Ordering::Relaxed),
            effect_failures: self.effect_failures.load(Ordering::Relaxed),
            reloads: self.reloads.load(Ordering::Relaxed),
        }
    }
}

/// Everything derived from one declaration.
struct Session {
    meta: BotMeta,
    dispatch: DispatchTable,
    executor: EffectExecutor,
    scripts: ScriptRunner,
    conditions: ConditionEvaluator,
}

impl Session {
    fn build(
        declaration: &Declaration,
        store: &VariableStore,
        config: &RuntimeConfig,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        let limits = Limits::from(&config.script);
        let keyboards = Arc::new(KeyboardCache::build(&declaration.keyboards));
        Self {
            meta: declaration.meta.clone(),
            dispatch: DispatchTable::from_handlers(&declaration.handlers),
            executor: EffectExecutor::new(store.clone(), keyboards, messenger),
            scripts: ScriptRunner::new(store.clone(), limits),
            conditions: ConditionEvaluator::new(TemplateEngine::new(store.clone()), limits),
        }
    }
}

pub struct Runtime {
    store: VariableStore,
    config: RuntimeConfig,
    messenger: Arc<dyn Messenger>,
    session: RwLock<Arc<Session>>,
    counters: Counters,
}

impl Runtime {
    /// Seeds the store and builds the session.
    ///
    /// Only the bot token is checked here. Declarations from
    /// [`crate::loader::load_declaration`] are already fully validated, and a
    /// hand-built one may reference a keyboard that does not exist: such
    /// messages go out without markup.
    pub fn new(
        declaration: Declaration,
        config: RuntimeConfig,
        messenger: Arc<dyn Messenger>,
    ) -> Result<Self, ConfigError> {
        if declaration.meta.token.trim().is_empty() {
            return Err(ConfigError::MissingToken);
        }
        let store = VariableStore::seeded(&declaration.variables);
        let session = Session::build(&declaration, &store, &config, messenger.clone());
        info!(
            bot = %declaration.meta.name,
            version = %declaration.meta.version,
            handlers = session.dispatch.len(),
            variables = store.len(),
            "runtime ready"
        );
        Ok(Self {
            store,
            config,
            messenger,
            session: RwLock::new(Arc::new(session)),
            counters: Counters::default(),
        })
    }

    /// Replaces keyboards and handlers. Variables already in the store keep
    /// their current values, new ones are seeded.
    #[instrument(level = "debug", skip(self, declaration), fields(bot = %declaration.meta.name))]
    pub async fn reload(&self, declaration: Declaration) -> Result<(), ConfigError> {
        if declaration.meta.token.trim().is_empty() {
            return Err(ConfigError::MissingToken);
        }
        let seeded = self.store.seed_missing(&declaration.variables);
        let session = Session::build(
            &declaration,
            &self.store,
            &self.config,
            self.messenger.clone(),
        );
        let handlers = session.dispatch.len();
        *self.session.write().await = Arc::new(session);
        Counters::bump(&self.counters.reloads, 1);
        info!(handlers, seeded, "declaration reloaded");
        Ok(())
    }

    /// Runs the handler registered for the event's trigger, if any.
    ///
    /// Script, condition and effect failures are logged and recovered, so
    /// this never fails. `None` means no handler matched.
    #[instrument(level = "debug", skip(self, event), fields(shape = event.shape(), chat_id = event.chat_id()))]
    pub async fn handle_event(&self, event: &InboundEvent) -> Option<Invocation> {
        // 読み取りロックはすぐ手放す
        let session = self.session.read().await.clone();
        Counters::bump(&self.counters.events, 1);

        let trigger = Trigger::from_event(event);
        let Some(handler) = session.dispatch.lookup(&trigger) else {
            debug!(%trigger, "no handler for trigger");
            Counters::bump(&self.counters.unhandled, 1);
            return None;
        };
        let context = EventContext::from_event(event);

        let mut script_failed = false;
        if let Some(source) = &handler.script {
            if let Err(e) = session.scripts.run(source, &context) {
                script_failed = true;
                Counters::bump(&self.counters.script_errors, 1);
                warn!(
                    handler = %handler.name,
                    error.kind = e.kind(),
                    error = %e,
                    "script failed, running effects without its changes"
                );
            }
        }

        let branch = match &handler.condition {
            Some(condition) if !session.conditions.check(condition, &context, &handler.name) => {
                Branch::Else
            }
            _ => Branch::Primary,
        };
        let effects = match branch {
            Branch::Primary => &handler.effects,
            Branch::Else => &handler.else_effects,
        };

        let summary = session.executor.run(effects, &context, &handler.name).await;
        Counters::bump(&self.counters.handled, 1);
        Counters::bump(&self.counters.effect_failures, summary.failed as u64);
        debug!(
            handler = %handler.name,
            %branch,
            executed = summary.executed,
            skipped = summary.skipped,
            failed = summary.failed,
            "event handled"
        );

        Some(Invocation {
            handler: handler.name.clone(),
            trigger,
            branch,
            script_failed,
            summary,
        })
    }

    /// Current variable values.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.store.snapshot()
    }

    pub fn store(&self) -> &VariableStore {
        &self.store
    }

    pub fn stats(&self) -> RuntimeStats {
        self.counters.snapshot()
    }

    pub async fn meta(&self) -> BotMeta {
        self.session.read().await.meta.clone()
    }

    pub async fn triggers(&self) -> Vec<Trigger> {
        let session = self.session.read().await;
        let mut triggers: Vec<Trigger> = session.dispatch.triggers().cloned().collect();
        triggers.sort_by_key(|t| t.to_string());
        triggers
    }
}
