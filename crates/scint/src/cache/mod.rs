// SPDX-License-Identifier: MIT OR Apache-2.0

//! The global content/ABI-keyed on-disk cache: path algebra, manifest
//! format, validity predicate, and the atomic promotion protocol
//! (components C2-C5).

pub mod layout;
pub mod manifest;
pub mod promote;
pub mod validity;

pub use layout::CacheLayout;
pub use manifest::Manifest;
