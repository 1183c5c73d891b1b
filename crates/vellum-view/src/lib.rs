//! Materialized views for Vellum.
//!
//! A view groups and sorts the objects of one collection. Registering a view
//! installs an engine extension that keeps a persistent index up to date on
//! every commit; [`ViewMappings`] read that index at a snapshot and expose
//! the group / section / row layout consumers render.
//!
//! # Key Types
//!
//! - [`CollectionView`] -- view definition: filter into groups, compare within a group
//! - [`FilteredView`] / [`FlatView`] / [`ViewSpec`] -- composed view variants
//! - [`ViewHandle`] -- a view registered over a collection
//! - [`ViewMappings`] / [`IndexPath`] -- per-snapshot layout of a view

pub mod error;
pub mod filtered;
pub mod flat;
pub mod mappings;
pub mod materialize;
pub mod spec;
pub mod view;

pub use error::{ViewError, ViewResult};
pub use filtered::FilteredView;
pub use flat::{FlatView, FLAT_GROUP};
pub use mappings::{IndexPath, ViewMappings};
pub use materialize::{register, ViewExtension, ViewHandle};
pub use spec::ViewSpec;
pub use view::{compose_name, total_order, CollectionView, VIEW_IMPL, VIEW_IMPL_VERSION};
