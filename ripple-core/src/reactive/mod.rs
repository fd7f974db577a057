//! Reactive primitives (spec.md §4.5): `Dynamic<V, Δ>` and `partition_by_key`.

pub mod dynamic;
pub mod partition;

pub use dynamic::{Dynamic, Subscription};
pub use partition::{KeyChange, KeyChangeSubscription, Partition, Substream};
