//! Traits and structs supporting the resolution of provider parameters
//!
//! The parameters of a provider are described by the [Param] trait. It serves two purposes:
//!
//! * When a node is declared, [Param::requirements] lists the capability types the parameter needs.
//!   The registry matches each of them against the declared dependencies (or its implicit registry)
//!   once, and stores the matched nodes as the input edges of the new node.
//! * When the node is resolved, [Param::fetch] consumes these edges in the same order to build the
//!   actual argument.
//!
//! Three kinds of parameters are supported:
//!
//! * Any `Clone + Send + Sync` type is a plain parameter, matched by type.
//! * A [Handle] gives the provider access to the active scope and its declared dependencies.
//! * A dependency bundle, declared with the [crate::bundle] macro, resolves each field as a plain
//!   parameter.

use std::any::type_name;
use std::slice;
use std::sync::Arc;

use thiserror::Error;

use crate::node::{downcast, Dependency, Node, TypeKey};
use crate::scope::{ResolutionPath, Scope};

/// Error type accepted from providers and teardown actions
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors triggered while declaring nodes
#[derive(Error, Debug)]
pub enum WiringError {
    #[error("unable to resolve dependency for {provider}: no node provides {missing}")]
    Unresolvable {
        provider: &'static str,
        missing: &'static str,
    },
    #[error("unable to resolve dependency for {provider}: no node provides {missing} for field {field} of {bundle}")]
    UnresolvableField {
        provider: &'static str,
        bundle: &'static str,
        field: &'static str,
        missing: &'static str,
    },
    #[error("Consistency error: {0} has already been resolved in this scope")]
    AlreadyResolved(&'static str),
}

/// Errors returned when resolving a node.
///
/// Faults reported by providers are cached in the scope: cloning this error shares the original
/// source, so every resolution of a failed node observes the same fault.
#[derive(Error, Debug, Clone)]
pub enum ResolveError {
    #[error("provider of {capability} failed: {source}")]
    Provider {
        capability: &'static str,
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },
    #[error("provider of {0} returned an empty value")]
    Empty(&'static str),
    #[error("Cyclic dependencies: {0} is already being resolved")]
    CyclicResolution(&'static str),
    #[error("resolved value of type {found} where {expected} was expected")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("no input left to resolve a parameter of {0}")]
    MissingInput(&'static str),
    #[error("the scope has been torn down")]
    ScopeClosed,
}

impl ResolveError {
    /// Wrap an error reported by a provider.
    ///
    /// A [ResolveError] returned by a provider, for example when resolving through a [Handle],
    /// is passed through unchanged.
    pub fn from_provider(capability: &'static str, error: BoxError) -> Self {
        match error.downcast::<ResolveError>() {
            Ok(inner) => *inner,
            Err(source) => ResolveError::Provider {
                capability,
                source: Arc::from(source),
            },
        }
    }
}

/// The kind of a provider parameter, with the capability types it requires
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParameterKind {
    Plain(TypeKey),
    SelfReference,
    Aggregate {
        bundle: &'static str,
        field: &'static str,
        key: TypeKey,
    },
}

/// Ordered list of the parameter kinds of a provider
#[derive(Debug, Default)]
pub struct Requirements(Vec<ParameterKind>);

impl Requirements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plain<T: 'static>(&mut self) {
        self.0.push(ParameterKind::Plain(TypeKey::of::<T>()));
    }

    pub fn field<T: 'static>(&mut self, bundle: &'static str, field: &'static str) {
        self.0.push(ParameterKind::Aggregate {
            bundle,
            field,
            key: TypeKey::of::<T>(),
        });
    }

    pub fn self_reference(&mut self) {
        self.0.push(ParameterKind::SelfReference);
    }

    pub fn kinds(&self) -> &[ParameterKind] {
        &self.0
    }
}

/// Inputs available while fetching the parameters of a provider
pub struct Inputs<'a> {
    scope: &'a Scope,
    owner: &'static str,
    dependencies: &'a [Dependency],
    edges: slice::Iter<'a, Dependency>,
    path: &'a ResolutionPath,
}

impl<'a> Inputs<'a> {
    pub(crate) fn new(
        scope: &'a Scope,
        owner: &'static str,
        dependencies: &'a [Dependency],
        edges: &'a [Dependency],
        path: &'a ResolutionPath,
    ) -> Self {
        Self {
            scope,
            owner,
            dependencies,
            edges: edges.iter(),
            path,
        }
    }

    /// Name of the capability being provided
    pub fn owner(&self) -> &'static str {
        self.owner
    }

    /// Resolve the next matched input edge as a value of type `T`
    pub fn plain<T: Clone + 'static>(&mut self) -> Result<T, ResolveError> {
        let edge = self
            .edges
            .next()
            .ok_or(ResolveError::MissingInput(self.owner))?;
        let value = self.scope.retrieve(edge, self.path)?;
        downcast(&value, edge.capability())
    }

    /// Build the self-reference handle of the provider
    pub fn handle(&self) -> Handle {
        Handle {
            scope: self.scope.clone(),
            dependencies: self.dependencies.to_vec(),
            path: self.path.clone(),
        }
    }
}

/// A parameter that can be injected into a provider
pub trait Param: Sized {
    /// List the capability types needed to build this parameter
    fn requirements(requirements: &mut Requirements);

    /// Build the parameter, consuming the edges matched for its requirements
    fn fetch(inputs: &mut Inputs<'_>) -> Result<Self, ResolveError>;
}

impl<T: Clone + Send + Sync + 'static> Param for T {
    fn requirements(requirements: &mut Requirements) {
        requirements.plain::<T>();
    }

    fn fetch(inputs: &mut Inputs<'_>) -> Result<Self, ResolveError> {
        inputs.plain::<T>()
    }
}

/// Parameter lists of providers, implemented for tuples of [Param]
pub trait Params: Sized {
    fn requirements(requirements: &mut Requirements);
    fn fetch(inputs: &mut Inputs<'_>) -> Result<Self, ResolveError>;
}

/// Self-reference handle: the active scope and the declared dependencies of the provider.
///
/// Providers typically use it to tie the release of a resource to the end of the scope.
pub struct Handle {
    scope: Scope,
    dependencies: Vec<Dependency>,
    path: ResolutionPath,
}

impl Handle {
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    /// Resolve another node in the active scope
    pub fn resolve<T: Clone + 'static>(&self, node: &Node<T>) -> Result<T, ResolveError> {
        self.resolve_erased(node.dependency())
    }

    /// Resolve the declared dependency at `index` as a value of type `T`
    pub fn resolve_dependency<T: Clone + 'static>(&self, index: usize) -> Result<T, ResolveError> {
        let dependency = self
            .dependencies
            .get(index)
            .ok_or(ResolveError::MissingInput(type_name::<T>()))?;
        self.resolve_erased(dependency)
    }

    // Cycles through the provider are detected along the path of the handle
    fn resolve_erased<T: Clone + 'static>(&self, dependency: &Dependency) -> Result<T, ResolveError> {
        let value = self.scope.retrieve(dependency, &self.path)?;
        downcast(&value, dependency.capability())
    }

    /// Register an action to run when the active scope is torn down
    pub fn append_teardown<F, E>(&self, action: F)
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
        E: Into<BoxError>,
    {
        self.scope.append_teardown(action);
    }
}

impl Param for Handle {
    fn requirements(requirements: &mut Requirements) {
        requirements.self_reference();
    }

    fn fetch(inputs: &mut Inputs<'_>) -> Result<Self, ResolveError> {
        Ok(inputs.handle())
    }
}

/// Result shapes accepted from fallible providers
pub trait Outcome<T> {
    fn into_result(self, capability: &'static str) -> Result<T, ResolveError>;
}

impl<T, E: Into<BoxError>> Outcome<T> for Result<T, E> {
    fn into_result(self, capability: &'static str) -> Result<T, ResolveError> {
        self.map_err(|e| ResolveError::from_provider(capability, e.into()))
    }
}

/// A missing value is reported as [ResolveError::Empty]
impl<T> Outcome<T> for Option<T> {
    fn into_result(self, capability: &'static str) -> Result<T, ResolveError> {
        self.ok_or(ResolveError::Empty(capability))
    }
}

impl Outcome<()> for () {
    fn into_result(self, _capability: &'static str) -> Result<(), ResolveError> {
        Ok(())
    }
}

pub(crate) fn provider_name<F>() -> &'static str {
    type_name::<F>()
}

/// Declare a dependency bundle: a struct injected field by field.
///
/// Each field is matched and resolved as a plain parameter. The generated struct implements
/// [Param] and must therefore not implement `Clone`.
///
/// ```
/// # use tsumiki::*;
/// bundle! {
///     pub struct ServerDeps {
///         pub port: u16,
///         pub name: String,
///     }
/// }
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let tsumiki = Tsumiki::new();
/// let port = tsumiki.craft(8080u16);
/// let name = tsumiki.craft("demo".to_string());
/// let address = tsumiki.declare(|deps: ServerDeps| format!("{}:{}", deps.name, deps.port), &[&port, &name])?;
/// assert_eq!(tsumiki.resolve(&address)?, "demo:8080");
/// # Ok(())
/// # }
/// ```
#[macro_export]
macro_rules! bundle {
    ($(#[$meta:meta])* $vis:vis struct $name:ident { $($fvis:vis $field:ident : $ty:ty),* $(,)? }) => {
        $(#[$meta])*
        $vis struct $name {
            $($fvis $field: $ty,)*
        }

        #[allow(unused_variables)]
        impl $crate::Param for $name {
            fn requirements(requirements: &mut $crate::Requirements) {
                $( requirements.field::<$ty>(stringify!($name), stringify!($field)); )*
            }

            fn fetch(inputs: &mut $crate::Inputs<'_>) -> ::std::result::Result<Self, $crate::ResolveError> {
                ::std::result::Result::Ok(Self {
                    $( $field: inputs.plain::<$ty>()?, )*
                })
            }
        }
    };
}
