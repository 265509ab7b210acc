//! # eventgate - in-process event dispatch
//!
//! eventgate offers two notification models over one subscriber registry:
//!
//! - **Discrete events**: keys from a closed domain declared at startup, fired
//!   explicitly with [`Registry::emit`], optionally carrying a payload.
//! - **Conditional events**: [`Predicate`]s re-evaluated on every
//!   [`Registry::poll_conditions`] call, firing their subscribers while true.
//!
//! ## Core Concepts
//!
//! - **Registry**: an explicit instance owning all subscriptions; no globals
//! - **Handler**: a callback handle with an identity, so it can be unsubscribed
//! - **Predicate**: a condition keyed by identity, never by behaviour
//! - **ConditionCatalog**: well-known predicates seeded at construction
//! - **PollDriver**: optional worker that polls a registry on an interval
//!
//! ## Usage
//!
//! ```rust
//! use eventgate::{ConditionCatalog, Handler, Predicate, Registry, RegistryConfig};
//!
//! let registry: Registry<&str, String> =
//!     Registry::new(["started", "stopped"], ConditionCatalog::empty(), RegistryConfig::default());
//!
//! let on_start = Handler::new(|| println!("started"));
//! registry.subscribe(&"started", &on_start)?;
//! registry.emit(&"started", None)?;
//!
//! let always = Predicate::new(|| true);
//! registry.subscribe_condition(&always, &Handler::new(|| println!("tick")))?;
//! let report = registry.poll_conditions()?;
//! assert_eq!(report.fired, 1);
//! # Ok::<(), eventgate::DispatchError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod catalog;
pub mod driver;
pub mod error;
pub mod handler;
pub mod key;
pub mod predicate;
pub mod registry;

// Re-export primary types at crate root for convenience
pub use catalog::{
    CatalogBuilder, CatalogDefinition, CatalogMutability, ConditionCatalog, ConditionDefinition,
    FlagBoard, FlagDefinition,
};
pub use driver::{PollDriver, PollDriverConfig, PollDriverStats};
pub use error::{DispatchError, DispatchResult};
pub use handler::{Handler, HandlerId, PayloadHandler, Subscriber, SubscriberList};
pub use key::{EventDomain, EventKey};
pub use predicate::{Predicate, PredicateId};
pub use registry::{PollReport, Registry, RegistryConfig, TriggerMode};
