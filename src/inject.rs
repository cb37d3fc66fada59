use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;

use crate::node::{AnyValue, AsDependency, Dependency, Node, Provide, Provided, TypeKey};
use crate::resolve::{provider_name, Outcome, ParameterKind, Requirements};
use crate::*;

/// Errors of a one-shot execution: the parameters could not be wired or resolved,
/// or the function itself failed.
#[derive(Error, Debug)]
pub enum ExecuteError {
    #[error(transparent)]
    Wiring(#[from] WiringError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Dependency injection registry.
///
/// Every node declared through the registry joins its implicit registry, which is searched in
/// declaration order when a parameter is not provided by the explicit dependencies of a provider.
/// The registry also owns a default scope, used by the operations that do not take one.
pub struct Tsumiki {
    nodes: RwLock<Vec<Dependency>>,
    scope: Scope,
}

impl Tsumiki {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::default(),
            scope: Scope::new(),
        }
    }

    pub fn default_scope(&self) -> &Scope {
        &self.scope
    }

    /// Number of nodes declared through this registry
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Declare a node built by an infallible provider.
    ///
    /// Each parameter of the provider is matched against the explicit dependencies first, then
    /// against the implicit registry. Return an error if some parameter can not be matched.
    pub fn declare<T, Args, F>(
        &self,
        provider: F,
        dependencies: &[&dyn AsDependency],
    ) -> Result<Node<T>, WiringError>
    where
        T: Send + Sync + 'static,
        Args: Params + 'static,
        F: Callable<Args, T> + Send + Sync + 'static,
    {
        self.install::<T, Args, T, F>(provider, |value, _| Ok(value), dependencies)
    }

    /// Declare a node built by a fallible provider.
    ///
    /// The provider returns either a `Result` or an `Option`, a missing value being reported as
    /// [ResolveError::Empty]. Faults are cached: the provider is never invoked again in the same scope.
    pub fn try_declare<T, Args, O, F>(
        &self,
        provider: F,
        dependencies: &[&dyn AsDependency],
    ) -> Result<Node<T>, WiringError>
    where
        T: Send + Sync + 'static,
        Args: Params + 'static,
        O: Outcome<T> + 'static,
        F: Callable<Args, O> + Send + Sync + 'static,
    {
        self.install::<T, Args, O, F>(provider, <O as Outcome<T>>::into_result, dependencies)
    }

    pub(crate) fn install<T, Args, O, F>(
        &self,
        provider: F,
        finish: fn(O, &'static str) -> Result<T, ResolveError>,
        dependencies: &[&dyn AsDependency],
    ) -> Result<Node<T>, WiringError>
    where
        T: Send + Sync + 'static,
        Args: Params + 'static,
        O: 'static,
        F: Callable<Args, O> + Send + Sync + 'static,
    {
        let dependencies: Vec<Dependency> = dependencies.iter().map(|d| d.as_dependency()).collect();
        let inputs = self.wire::<Args>(provider_name::<F>(), &dependencies)?;
        let provider = FnProvider {
            constructor: provider,
            finish,
            shape: PhantomData,
        };
        Ok(self.register(TypeKey::of::<T>(), dependencies, inputs, Box::new(provider)))
    }

    /// Match every requirement of a parameter list to a node
    fn wire<Args: Params>(
        &self,
        provider: &'static str,
        dependencies: &[Dependency],
    ) -> Result<Vec<Dependency>, WiringError> {
        let mut requirements = Requirements::new();
        Args::requirements(&mut requirements);

        let implicit = self.nodes.read();
        let candidates = || dependencies.iter().chain(implicit.iter());

        let mut inputs = Vec::with_capacity(requirements.kinds().len());
        for kind in requirements.kinds().iter().copied() {
            let matched = match kind {
                ParameterKind::SelfReference => continue,
                ParameterKind::Plain(key) => candidates()
                    .find(|d| d.provides(&key))
                    .ok_or(WiringError::Unresolvable {
                        provider,
                        missing: key.name(),
                    })?,
                ParameterKind::Aggregate { bundle, field, key } => candidates()
                    .find(|d| d.provides(&key))
                    .ok_or(WiringError::UnresolvableField {
                        provider,
                        bundle,
                        field,
                        missing: key.name(),
                    })?,
            };
            inputs.push(matched.clone());
        }
        Ok(inputs)
    }

    pub(crate) fn register<T>(
        &self,
        capability: TypeKey,
        dependencies: Vec<Dependency>,
        inputs: Vec<Dependency>,
        provider: Box<dyn Provide>,
    ) -> Node<T> {
        let dependency = Dependency::new(capability, dependencies, inputs, provider);
        debug!(node = %dependency.id(), capability = capability.name(), "declared node");
        self.nodes.write().push(dependency.clone());
        Node::from_dependency(dependency)
    }

    /// Resolve a node in the default scope
    pub fn resolve<T: Clone + 'static>(&self, node: &Node<T>) -> Result<T, ResolveError> {
        self.scope.resolve(node)
    }

    /// Resolve a node in the given scope, or in the default scope
    pub fn resolve_in<T: Clone + 'static>(
        &self,
        scope: Option<&Scope>,
        node: &Node<T>,
    ) -> Result<T, ResolveError> {
        scope.unwrap_or(&self.scope).resolve(node)
    }

    /// Resolve a node in the default scope, panicking on failure
    #[track_caller]
    pub fn require<T: Clone + 'static>(&self, node: &Node<T>) -> T {
        self.scope.require(node)
    }

    /// Redirect a node to a replacement in the default scope
    pub fn override_with<T>(&self, target: &Node<T>, replacement: &Node<T>) -> Result<(), WiringError> {
        self.scope.override_with(target, replacement)
    }

    /// Run the teardown actions of the default scope, closing it
    pub fn teardown(&self) -> Result<(), TeardownError> {
        self.scope.teardown()
    }

    /// Resolve the parameters of a function in the default scope and call it.
    ///
    /// Nothing is declared or memoized for the function itself.
    pub fn execute<R, Args, O, F>(&self, f: F, dependencies: &[&dyn AsDependency]) -> Result<R, ExecuteError>
    where
        Args: Params,
        O: Outcome<R>,
        F: Callable<Args, O>,
    {
        self.execute_in(&self.scope, f, dependencies)
    }

    /// Resolve the parameters of a function in the given scope and call it
    pub fn execute_in<R, Args, O, F>(
        &self,
        scope: &Scope,
        f: F,
        dependencies: &[&dyn AsDependency],
    ) -> Result<R, ExecuteError>
    where
        Args: Params,
        O: Outcome<R>,
        F: Callable<Args, O>,
    {
        let owner = provider_name::<F>();
        let dependencies: Vec<Dependency> = dependencies.iter().map(|d| d.as_dependency()).collect();
        let edges = self.wire::<Args>(owner, &dependencies)?;
        let path = Default::default();
        let mut inputs = Inputs::new(scope, owner, &dependencies, &edges, &path);
        let args = Args::fetch(&mut inputs)?;
        Ok(f.call(args).into_result(owner)?)
    }

    /// Execute a function that produces no value in the default scope
    pub fn run<Args, O, F>(&self, f: F, dependencies: &[&dyn AsDependency]) -> Result<(), ExecuteError>
    where
        Args: Params,
        O: Outcome<()>,
        F: Callable<Args, O>,
    {
        self.execute(f, dependencies)
    }

    /// Execute a function that produces no value in the given scope
    pub fn run_in<Args, O, F>(
        &self,
        scope: &Scope,
        f: F,
        dependencies: &[&dyn AsDependency],
    ) -> Result<(), ExecuteError>
    where
        Args: Params,
        O: Outcome<()>,
        F: Callable<Args, O>,
    {
        self.execute_in(scope, f, dependencies)
    }
}

impl Default for Tsumiki {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Tsumiki {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tsumiki")
            .field("nodes", &self.len())
            .field("scope", &self.scope)
            .finish()
    }
}

/// Provider calling a function after fetching its parameters
struct FnProvider<F, Args, O, T> {
    constructor: F,
    finish: fn(O, &'static str) -> Result<T, ResolveError>,
    shape: PhantomData<fn(Args) -> O>,
}

impl<F, Args, O, T> Provide for FnProvider<F, Args, O, T>
where
    F: Callable<Args, O> + Send + Sync,
    Args: Params,
    T: Send + Sync + 'static,
{
    fn provide(&self, inputs: &mut Inputs<'_>) -> Result<Provided, ResolveError> {
        let args = Args::fetch(inputs)?;
        let outcome = self.constructor.call(args);
        Ok((self.finish)(outcome, inputs.owner()).map(|value| Arc::new(value) as AnyValue))
    }
}

/*
 * The following is used to inject up to 10 parameters into any function
 * inspired by https://nickbryan.co.uk/software/using-a-type-map-for-dependency-injection-in-rust/
 */

/// A Callable has a ```call``` function with a single argument and a single return type.
///
/// This trait is implemented for all functions with up to 10 arguments, using a tuple to
/// wrap them all in a single type.
pub trait Callable<Args, Ret> {
    fn call(&self, args: Args) -> Ret;
}

macro_rules! callable_tuple ({ $($param:ident)* } => {
    impl<Func, Ret, $($param,)*> Callable<($($param,)*), Ret> for Func
    where
        Func: Fn($($param),*) -> Ret,
    {
        #[inline]
        #[allow(non_snake_case)]
        fn call(&self, ($($param,)*): ($($param,)*)) -> Ret {
            (self)($($param,)*)
        }
    }

    // Fetch such tuples parameter by parameter, in declaration order
    #[allow(clippy::unused_unit)]
    impl<$($param: Param,)*> Params for ($($param,)*) {
        #[inline]
        fn requirements(_requirements: &mut Requirements) {
            $(<$param as Param>::requirements(_requirements);)*
        }

        #[inline]
        fn fetch(_inputs: &mut Inputs<'_>) -> Result<Self, ResolveError> {
            Ok(($(<$param as Param>::fetch(_inputs)?,)*))
        }
    }
});

callable_tuple! {}
callable_tuple! { A }
callable_tuple! { A B }
callable_tuple! { A B C }
callable_tuple! { A B C D }
callable_tuple! { A B C D E }
callable_tuple! { A B C D E F }
callable_tuple! { A B C D E F G }
callable_tuple! { A B C D E F G H }
callable_tuple! { A B C D E F G H I }
callable_tuple! { A B C D E F G H I J }
