//! Engine for applying LLM-proposed code edits.
//!
//! A proposal arrives as a partial snippet for one file. The engine asks a
//! [`merge::MergeRequester`] to reconstruct the full updated file, stages the
//! result as an interactive diff against the live document, waits for the
//! user to resolve every hunk, and records the accepted patch together with
//! any lint diagnostics the edit introduced. Hosts plug in their own
//! document access, diff surface, and diagnostics provider through the traits
//! in [`document`], [`review`], and [`diagnostics`].

pub mod aggregate;
pub mod config;
pub mod diagnostics;
pub mod document;
pub mod engine;
pub mod error;
pub mod history;
pub mod merge;
pub mod patch;
pub mod proposals;
pub mod review;

pub use engine::ApplyEngine;
pub use error::ApplyErr;
pub use error::Result;
