//! Live observers for Vellum.
//!
//! Each database runs one [`ObservationHub`]: a worker thread subscribed to
//! the engine's event bus rolls every observer's pinned connection forward
//! after each commit and computes what changed, and a single dispatcher
//! thread delivers the results to listeners in commit order.
//!
//! # Key Types
//!
//! - [`ObservationHub`] -- worker and dispatcher threads of one database
//! - [`ObjectObserver`] / [`CollectionObserver`] -- full-value observers of a key or a collection
//! - [`ViewObserver`] / [`FlatViewObserver`] -- row-level observers of a materialized view
//! - [`ViewUpdate`] -- section and row changes between two view states
//! - [`ViewListener`] -- bracketed change callbacks

pub mod collection;
pub mod diff;
pub mod dispatcher;
pub mod error;
pub mod flat;
pub mod hub;
pub mod listener;
pub mod object;
pub mod observer;
pub mod view;
mod worker;

pub use collection::CollectionObserver;
pub use diff::{ChangeKind, RowChange, SectionChange, SectionChangeKind, ViewUpdate};
pub use dispatcher::Dispatcher;
pub use error::{ObserveError, ObserveResult};
pub use flat::FlatViewObserver;
pub use hub::ObservationHub;
pub use listener::{ListenerId, ViewListener};
pub use object::ObjectObserver;
pub use observer::ObserverState;
pub use view::ViewObserver;
