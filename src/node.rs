//! Declared nodes and their type-erased representation.
//!
//! A [Node] is a typed handle over an immutable core: the provider, the declared dependencies
//! and the input edges matched when the node was declared. The core never changes after
//! construction; everything that varies per resolution context lives in a [Scope].

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::resolve::{Inputs, ResolveError};
use crate::scope::{Carrier, Scope};

/// Resolved value shared by every consumer of a node within a scope
pub(crate) type AnyValue = Arc<dyn Any + Send + Sync>;

/// Cached outcome of a provider invocation: a value or the fault it reported
pub(crate) type Provided = Result<AnyValue, ResolveError>;

static NEXT_NODE: AtomicU64 = AtomicU64::new(1);

/// Identity of a declared node, stable for the lifetime of the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        NodeId(NEXT_NODE.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Stable identifier of a capability type.
///
/// Two keys are equal when they describe the same [TypeId], the name is only kept for diagnostics.
#[derive(Clone, Copy, Debug)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Type-erased provider stored in a node
pub(crate) trait Provide: Send + Sync {
    /// Fetch the parameters from the inputs and run the provider.
    ///
    /// The outer error reports a failure to resolve the inputs, which is not cached.
    /// The inner result is the provider outcome, which is.
    fn provide(&self, inputs: &mut Inputs<'_>) -> Result<Provided, ResolveError>;
}

pub(crate) struct NodeCore {
    pub(crate) id: NodeId,
    pub(crate) capability: TypeKey,
    pub(crate) dependencies: Vec<Dependency>,
    pub(crate) inputs: Vec<Dependency>,
    pub(crate) provider: Box<dyn Provide>,
}

/// Type-erased handle on a declared node.
///
/// This is how nodes are listed as dependencies and how a provider sees its own
/// dependencies through a [crate::Handle], which also resolves them.
#[derive(Clone)]
pub struct Dependency(pub(crate) Arc<NodeCore>);

impl Dependency {
    pub(crate) fn new(
        capability: TypeKey,
        dependencies: Vec<Dependency>,
        inputs: Vec<Dependency>,
        provider: Box<dyn Provide>,
    ) -> Self {
        Dependency(Arc::new(NodeCore {
            id: NodeId::next(),
            capability,
            dependencies,
            inputs,
            provider,
        }))
    }

    pub fn id(&self) -> NodeId {
        self.0.id
    }

    pub fn capability(&self) -> TypeKey {
        self.0.capability
    }

    /// Check if this node can be injected where a value of the given type is requested
    pub fn provides(&self, key: &TypeKey) -> bool {
        self.0.capability == *key
    }

    /// Dependencies listed when the node was declared
    pub fn dependencies(&self) -> &[Dependency] {
        &self.0.dependencies
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependency")
            .field("id", &self.0.id)
            .field("capability", &self.0.capability.name)
            .field("dependencies", &self.0.dependencies.len())
            .finish()
    }
}

/// Anything that can be listed as an explicit dependency of a provider
pub trait AsDependency {
    fn as_dependency(&self) -> Dependency;
}

impl AsDependency for Dependency {
    fn as_dependency(&self) -> Dependency {
        self.clone()
    }
}

impl<T> AsDependency for Node<T> {
    fn as_dependency(&self) -> Dependency {
        self.dependency.clone()
    }
}

/// A declared node providing a value of type `T`.
///
/// Nodes are created by a [crate::Tsumiki] registry and are cheap to clone: clones share the
/// same identity and are interchangeable.
pub struct Node<T> {
    dependency: Dependency,
    capability: PhantomData<fn() -> T>,
}

impl<T> Node<T> {
    pub(crate) fn from_dependency(dependency: Dependency) -> Self {
        Self {
            dependency,
            capability: PhantomData,
        }
    }

    pub fn id(&self) -> NodeId {
        self.dependency.id()
    }

    pub fn dependency(&self) -> &Dependency {
        &self.dependency
    }
}

impl<T: Clone + 'static> Node<T> {
    /// Resolve this node in the given scope
    pub fn resolve_in(&self, scope: &Scope) -> Result<T, ResolveError> {
        scope.resolve(self)
    }

    /// Resolve this node in the scope bound to a carrier, binding a fresh scope on first use
    pub fn get(&self, carrier: &impl Carrier) -> Result<T, ResolveError> {
        carrier.scope().resolve(self)
    }
}

impl<T> Clone for Node<T> {
    fn clone(&self) -> Self {
        Self::from_dependency(self.dependency.clone())
    }
}

impl<T> fmt::Debug for Node<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Node").field(&self.dependency).finish()
    }
}

pub(crate) fn downcast<T: Clone + 'static>(
    value: &AnyValue,
    found: TypeKey,
) -> Result<T, ResolveError> {
    value
        .downcast_ref::<T>()
        .cloned()
        .ok_or(ResolveError::TypeMismatch {
            expected: type_name::<T>(),
            found: found.name,
        })
}
