//! Lazy dependency injection with scoped memoization and overrides.
//!
//! # Simple use case
//!
//! ```
//! # use std::sync::Arc;
//! # use tsumiki::*;
//! // Define traits and implementors
//! trait MyTrait: Send + Sync {
//!     fn cheers(&self) -> String;
//! }
//!
//! struct MyImpl {
//!     greeting: String,
//! }
//!
//! impl MyTrait for MyImpl {
//!     fn cheers(&self) -> String {
//!         format!("{} world", self.greeting)
//!     }
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Declare the nodes and their dependencies
//! let tsumiki = Tsumiki::new();
//! let greeting = tsumiki.declare(|| "Hello".to_string(), &[])?;
//! let service = tsumiki.declare(
//!     |greeting: String| -> Arc<dyn MyTrait> { Arc::new(MyImpl { greeting }) },
//!     &[&greeting],
//! )?;
//!
//! // Resolve them in a scope
//! let scope = Scope::new();
//! let a = scope.resolve(&service)?;
//! assert_eq!(a.cheers(), "Hello world");
//! scope.teardown()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Mechanism
//!
//! A [Node] pairs a provider with the nodes it depends on. Nodes are declared through a [Tsumiki]
//! registry, and nothing is built until a node is resolved in a [Scope].
//!
//! * Each parameter of a provider implements [Param]. Plain parameters are matched by type,
//!   first among the explicit dependencies given when declaring the node, then among every node
//!   previously declared in the registry. The matching happens once, at declaration:
//!   a parameter without candidate is a [WiringError], never a resolution failure.
//! * A [Handle] parameter gives the provider its own dependencies and the active scope, for
//!   example to register a teardown action. Structs declared with [bundle] are injected field
//!   by field.
//! * The scope memoizes the value, or the fault, of each provider. A provider runs at most once
//!   per scope, even when resolved concurrently, and a failed provider is never retried.
//! * A scope can redirect a node to a replacement before it is first resolved, without touching
//!   the declaring code. This is how dependencies are substituted in tests.
//!
//! The type of a provider is checked by the compiler, a provider can not be declared for another type:
//!
//! ```compile_fail
//! # use tsumiki::*;
//! let tsumiki = Tsumiki::new();
//! let node: Node<String> = tsumiki.declare(|| 42, &[]).unwrap();
//! ```

mod env;
mod helpers;
mod inject;
mod node;
mod resolve;
mod scope;

pub use env::{Environment, EnvironmentError};
pub use helpers::Factory;
pub use inject::{Callable, ExecuteError, Tsumiki};
pub use node::{AsDependency, Dependency, Node, NodeId, TypeKey};
pub use resolve::{
    BoxError, Handle, Inputs, Outcome, Param, ParameterKind, Params, Requirements, ResolveError,
    WiringError,
};
pub use scope::{Carrier, Scope, TeardownError};
