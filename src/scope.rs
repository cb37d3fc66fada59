use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::node::{downcast, AnyValue, Dependency, Node, NodeId, Provided};
use crate::resolve::{BoxError, Inputs, ResolveError, WiringError};

type TeardownAction = Box<dyn FnOnce() -> Result<(), BoxError> + Send>;

static NEXT_SCOPE: AtomicU64 = AtomicU64::new(1);

/// Nodes being resolved by the current call chain
#[derive(Clone, Debug, Default)]
pub(crate) struct ResolutionPath(Vec<NodeId>);

impl ResolutionPath {
    fn contains(&self, id: NodeId) -> bool {
        self.0.contains(&id)
    }

    fn extend(&self, id: NodeId) -> Self {
        let mut path = self.0.clone();
        path.push(id);
        ResolutionPath(path)
    }
}

/// Teardown actions that failed. The remaining actions were still executed.
#[derive(Error, Debug)]
#[error("{} teardown action(s) failed", .failures.len())]
pub struct TeardownError {
    pub failures: Vec<BoxError>,
}

/// A resolution context.
///
/// The scope memoizes the result of each node resolved in it, holds the overrides registered
/// for it and the actions to run when it ends. Cloning a scope gives another handle on the
/// same context.
#[derive(Clone, Default)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

struct ScopeInner {
    id: u64,
    slots: Mutex<HashMap<NodeId, Arc<OnceCell<Provided>>>>,
    overrides: RwLock<HashMap<NodeId, Dependency>>,
    teardown: Mutex<Vec<TeardownAction>>,
    closed: AtomicBool,
}

impl Default for ScopeInner {
    fn default() -> Self {
        Self {
            id: NEXT_SCOPE.fetch_add(1, Ordering::Relaxed),
            slots: Mutex::default(),
            overrides: RwLock::default(),
            teardown: Mutex::default(),
            closed: AtomicBool::new(false),
        }
    }
}

impl Scope {
    /// Create a fresh scope with no cached value, override or teardown action
    pub fn new() -> Self {
        Self::default()
    }

    /// Obtain the value of a node, resolving it and its inputs on first use.
    ///
    /// The provider of a node runs at most once per scope, concurrent callers wait for the
    /// first one to finish. A fault reported by the provider is cached like a value.
    pub fn resolve<T: Clone + 'static>(&self, node: &Node<T>) -> Result<T, ResolveError> {
        let value = self.retrieve(node.dependency(), &ResolutionPath::default())?;
        downcast(&value, node.dependency().capability())
    }

    /// Obtain the value of a node, panicking if it can not be resolved
    #[track_caller]
    pub fn require<T: Clone + 'static>(&self, node: &Node<T>) -> T {
        match self.resolve(node) {
            Ok(value) => value,
            Err(e) => panic!("failed to resolve {}: {e}", node.dependency().capability().name()),
        }
    }

    /// Redirect the resolution of `target` to `replacement` in this scope.
    ///
    /// Return an error, leaving the scope unchanged, if the target has already been resolved here.
    pub fn override_with<T>(&self, target: &Node<T>, replacement: &Node<T>) -> Result<(), WiringError> {
        let capability = target.dependency().capability().name();
        if self.is_resolved(target) {
            warn!(scope = self.inner.id, node = %target.id(), capability, "ignoring override of a resolved node");
            return Err(WiringError::AlreadyResolved(capability));
        }
        trace!(scope = self.inner.id, node = %target.id(), replacement = %replacement.id(), "override");
        self.inner
            .overrides
            .write()
            .insert(target.id(), replacement.dependency().clone());
        Ok(())
    }

    /// Check if a node has a cached value or fault in this scope.
    ///
    /// A redirected node shares the outcome of its replacement once resolved through it.
    pub fn is_resolved<T>(&self, node: &Node<T>) -> bool {
        self.inner
            .slots
            .lock()
            .get(&node.id())
            .map_or(false, |slot| slot.get().is_some())
    }

    /// Register an action to run when the scope is torn down.
    ///
    /// Actions appended after the teardown are executed immediately.
    pub fn append_teardown<F, E>(&self, action: F)
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
        E: Into<BoxError>,
    {
        let action: TeardownAction = Box::new(move || action().map_err(Into::<BoxError>::into));
        {
            let mut actions = self.inner.teardown.lock();
            if !self.is_torn_down() {
                actions.push(action);
                return;
            }
        }
        warn!(scope = self.inner.id, "scope already torn down, running teardown action now");
        if let Err(e) = action() {
            warn!(scope = self.inner.id, error = %e, "teardown action failed");
        }
    }

    /// Run the teardown actions in registration order.
    ///
    /// Every action runs even if a previous one failed, the failures are collected in the
    /// returned error. Tearing down a scope twice does nothing.
    pub fn teardown(&self) -> Result<(), TeardownError> {
        let actions = {
            let mut actions = self.inner.teardown.lock();
            if self.inner.closed.swap(true, Ordering::SeqCst) {
                debug!(scope = self.inner.id, "scope already torn down");
                return Ok(());
            }
            std::mem::take(&mut *actions)
        };

        info!(scope = self.inner.id, actions = actions.len(), "tearing down scope");
        let mut failures = Vec::new();
        for (index, action) in actions.into_iter().enumerate() {
            if let Err(e) = action() {
                warn!(scope = self.inner.id, index, error = %e, "teardown action failed");
                failures.push(e);
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(TeardownError { failures })
        }
    }

    pub fn is_torn_down(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn retrieve(
        &self,
        dependency: &Dependency,
        path: &ResolutionPath,
    ) -> Result<AnyValue, ResolveError> {
        if self.is_torn_down() {
            return Err(ResolveError::ScopeClosed);
        }

        let (target, redirected) = self.redirect(dependency)?;
        let core = &target.0;
        if path.contains(core.id) {
            return Err(ResolveError::CyclicResolution(core.capability.name()));
        }

        let slot = self.slot(core.id, &redirected);
        let provided = slot.get_or_try_init(|| {
            debug!(scope = self.inner.id, node = %core.id, capability = core.capability.name(), "invoking provider");
            let path = path.extend(core.id);
            let mut inputs = Inputs::new(
                self,
                core.capability.name(),
                &core.dependencies,
                &core.inputs,
                &path,
            );
            let provided = core.provider.provide(&mut inputs)?;
            if let Err(e) = &provided {
                debug!(scope = self.inner.id, node = %core.id, error = %e, "caching provider fault");
            }
            Ok::<_, ResolveError>(provided)
        })?;
        provided.clone()
    }

    /// Follow the overrides registered for a node, returning the final target and
    /// the redirected nodes along the way
    fn redirect(&self, dependency: &Dependency) -> Result<(Dependency, Vec<NodeId>), ResolveError> {
        let overrides = self.inner.overrides.read();
        let mut current = dependency;
        let mut redirected = Vec::new();
        while let Some(replacement) = overrides.get(&current.id()) {
            if redirected.len() >= overrides.len() {
                return Err(ResolveError::CyclicResolution(dependency.capability().name()));
            }
            redirected.push(current.id());
            current = replacement;
        }
        Ok((current.clone(), redirected))
    }

    /// Slot of a node, shared with every node redirected to it
    fn slot(&self, id: NodeId, redirected: &[NodeId]) -> Arc<OnceCell<Provided>> {
        let mut slots = self.inner.slots.lock();
        let slot = slots.entry(id).or_default().clone();
        for alias in redirected {
            slots.insert(*alias, slot.clone());
        }
        slot
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.inner.id)
            .field("resolved", &self.inner.slots.lock().len())
            .field("overrides", &self.inner.overrides.read().len())
            .field("teardown", &self.inner.teardown.lock().len())
            .field("closed", &self.is_torn_down())
            .finish()
    }
}

/// A value threaded through call sites that carries its own scope.
///
/// The scope is created on first use and reused afterwards, so that code holding only the
/// carrier resolves against the same context.
pub trait Carrier {
    fn scope_slot(&self) -> &OnceCell<Scope>;

    fn scope(&self) -> &Scope {
        self.scope_slot().get_or_init(Scope::new)
    }
}

impl Carrier for OnceCell<Scope> {
    fn scope_slot(&self) -> &OnceCell<Scope> {
        self
    }
}
