//! # nearing
//!
//! `nearing` is a Rust library for progressive approximate k-nearest neighbor
//! search, designed to be used in Rust as well as compiled to WebAssembly
//! (WASM). It maintains an online k-d tree over a growing point set and puts
//! an explicit cost bound on every insertion, maintenance, and search call,
//! so the index stays responsive while data keeps streaming in.
//!
//! ## Features
//!
//! - **WASM-first**: Built with `wasm-bindgen` for seamless integration with JavaScript and TypeScript.
//! - **Progressive insertion**: Points enter a few at a time in O(depth) each; inserting never triggers a restructuring.
//! - **Budgeted maintenance**: `update` rebuilds the most imbalanced subtrees within an operation budget you choose.
//! - **Bounded search**: A per-query check budget trades accuracy for latency; an unlimited budget gives exact results.
//! - **Balance introspection**: Per-level imbalance ratios, tree depth, and leaf depth histograms are cheap to read out.
//!
//! ## Main Interface
//!
//! The primary entry point is the [`ProgressiveIndex`] struct, which owns the
//! point source and the tree and meters all work done on them.

mod error;
mod imbalance;
mod index;
mod metric;
mod results;
mod source;
mod tree;
pub mod wasm;

pub use error::KnnError;
pub use error::Result;
pub use index::IndexParams;
pub use index::ProgressiveIndex;
pub use index::SearchParams;
pub use metric::Metric;
pub use metric::L1;
pub use metric::L2;
pub use results::Neighbor;
pub use results::ResultSet;
pub use source::BinarySource;
pub use source::PointSource;
pub use source::VecSource;
