//! Deltapack: bsdiff binary patches and delta update packages in Rust.
//!
//! The crate provides:
//! - A pure-Rust bsdiff codec (`bsdiff`) with pluggable section compression
//!   (`compress`)
//! - A delta race over interchangeable codecs (`delta`)
//! - Update package assembly, loading and application (`package`)
//! - File-oriented helpers (`io`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```no_run
//! use deltapack::bsdiff::{self, DiffOptions};
//!
//! let old = b"hello old world";
//! let new = b"hello new world";
//!
//! let patch = bsdiff::encode(old, new, &DiffOptions::default()).unwrap();
//! let decoded = bsdiff::decode_to_vec(old, &patch).unwrap();
//! assert_eq!(decoded, new);
//! ```
//!
//! Packages:
//!
//! ```no_run
//! use std::path::Path;
//! use deltapack::delta::DeltaManager;
//! use deltapack::package::{PackageAssembler, PackageLoader, apply_package};
//!
//! let assembler = PackageAssembler::default();
//! assembler
//!     .assemble(Some(Path::new("v1")), Path::new("v2"), Path::new("update.tar.gz"))
//!     .unwrap();
//!
//! let package = PackageLoader::load(Path::new("update.tar.gz")).unwrap();
//! apply_package(&package, Some(Path::new("v1")), Path::new("v2-out"), &DeltaManager::default())
//!     .unwrap();
//! ```

pub mod bsdiff;
pub mod compress;
pub mod delta;
pub mod io;
pub mod package;

#[cfg(feature = "cli")]
pub mod cli;
