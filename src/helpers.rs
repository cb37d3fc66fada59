use std::fmt;
use std::sync::Arc;

use crate::node::{AnyValue, AsDependency, Node, Provide, Provided, TypeKey};
use crate::*;

/// Generic clone-based provider
pub(crate) struct SingletonProvider(AnyValue);

impl SingletonProvider {
    pub(crate) fn build<T: Send + Sync + 'static>(data: T) -> Self {
        SingletonProvider(Arc::new(data))
    }
}

impl Provide for SingletonProvider {
    fn provide(&self, _inputs: &mut Inputs<'_>) -> Result<Provided, ResolveError> {
        Ok(Ok(self.0.clone()))
    }
}

/// A callable resolved from a node.
///
/// The dependencies of a factory node are resolved once per scope and captured by the
/// function, which computes a fresh result on each call.
pub struct Factory<In, Out>(Arc<dyn Fn(In) -> Out + Send + Sync>);

impl<In, Out> Factory<In, Out> {
    pub fn new(f: impl Fn(In) -> Out + Send + Sync + 'static) -> Self {
        Factory(Arc::new(f))
    }

    pub fn call(&self, input: In) -> Out {
        (self.0)(input)
    }
}

impl<In, Out> Clone for Factory<In, Out> {
    fn clone(&self) -> Self {
        Factory(self.0.clone())
    }
}

impl<In, Out> fmt::Debug for Factory<In, Out> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Factory<{}>", std::any::type_name::<fn(In) -> Out>())
    }
}

impl Tsumiki {
    /// Wrap a concrete value into a node without dependencies.
    ///
    /// The value is exposed with the declared type, which may be narrower than its concrete type
    /// (for example a trait object).
    pub fn craft<T: Send + Sync + 'static>(&self, value: T) -> Node<T> {
        self.register(
            TypeKey::of::<T>(),
            Vec::new(),
            Vec::new(),
            Box::new(SingletonProvider::build(value)),
        )
    }

    /// Aggregate several nodes providing the same type into a node providing them all, in order.
    ///
    /// Each member is resolved through its own node: its provider is not invoked again if it has
    /// already been resolved in the scope.
    pub fn group<S: Clone + Send + Sync + 'static>(&self, members: &[&Node<S>]) -> Node<Vec<S>> {
        let nodes: Vec<Node<S>> = members.iter().map(|&m| m.clone()).collect();
        let dependencies = nodes.iter().map(|n| n.as_dependency()).collect();
        let provider = move |handle: Handle| -> Result<Vec<S>, ResolveError> {
            nodes.iter().map(|n| handle.resolve(n)).collect()
        };
        self.register(
            TypeKey::of::<Vec<S>>(),
            dependencies,
            Vec::new(),
            Box::new(HandleProvider(provider)),
        )
    }

    /// Declare a node providing a [Factory].
    ///
    /// The provider receives the resolved dependencies and returns the function to call. It runs
    /// once per scope, the returned function runs on every call of the factory.
    pub fn factory<In, Out, Args, G, F>(
        &self,
        provider: F,
        dependencies: &[&dyn AsDependency],
    ) -> Result<Node<Factory<In, Out>>, WiringError>
    where
        In: 'static,
        Out: 'static,
        Args: Params + 'static,
        G: Fn(In) -> Out + Send + Sync + 'static,
        F: Callable<Args, G> + Send + Sync + 'static,
    {
        self.install::<Factory<In, Out>, Args, G, F>(provider, |f, _| Ok(Factory::new(f)), dependencies)
    }

    /// Expose the value of a node under another capability type.
    ///
    /// The returned node depends on `node` only, and converts its value. This is how a concrete
    /// implementation is made available where a trait object is requested.
    pub fn expose<T, U, C>(&self, node: &Node<T>, convert: C) -> Node<U>
    where
        T: Clone + Send + Sync + 'static,
        U: Send + Sync + 'static,
        C: Fn(T) -> U + Send + Sync + 'static,
    {
        let source = node.clone();
        let provider = move |handle: Handle| -> Result<U, ResolveError> {
            handle.resolve(&source).map(&convert)
        };
        self.register(
            TypeKey::of::<U>(),
            vec![node.as_dependency()],
            Vec::new(),
            Box::new(HandleProvider(provider)),
        )
    }
}

/// Provider building its value from the self-reference handle only
struct HandleProvider<F>(F);

impl<F, T> Provide for HandleProvider<F>
where
    F: Fn(Handle) -> Result<T, ResolveError> + Send + Sync,
    T: Send + Sync + 'static,
{
    fn provide(&self, inputs: &mut Inputs<'_>) -> Result<Provided, ResolveError> {
        Ok((self.0)(inputs.handle()).map(|value| Arc::new(value) as AnyValue))
    }
}
