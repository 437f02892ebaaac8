//! Remix Core - Rebase an image onto a different base
//!
//! The pipeline runs once per invocation:
//! - `inventory` probes the old image and lists its installed packages
//! - `recipe` turns that list into a Dockerfile on top of the new base
//! - `builder` hands the Dockerfile to the container engine
//!
//! `rebase` wires the three together behind a single entry point.

pub mod builder;
pub mod error;
pub mod inventory;
pub mod probe;
pub mod rebase;
pub mod recipe;

pub use builder::ImageBuilder;
pub use error::{BuildError, ExtractionError, ExtractionStage, RebaseError};
pub use inventory::{parse_probe_output, PackageExtractor, PackageInventory, PackageManagerKind};
pub use rebase::{RebaseOutcome, RebaseRequest, Rebaser};
pub use recipe::{generate, BuildRecipe};
