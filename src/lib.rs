// Copyright 2026 Colorloop Contributors
// SPDX-License-Identifier: Apache-2.0

//! Colorloop library — automated variant-image harvester for parametric
//! character-maker pages.
//!
//! The [`engine::TraversalEngine`] walks the page's Item → Layer → Color
//! hierarchy through abstract page capabilities
//! ([`hierarchy::HierarchyScanner`], [`hierarchy::StateMutator`],
//! [`hierarchy::RenderObserver`]) and hands every rendered combination to a
//! [`capture::CaptureSink`] under a deterministic folder path and sequence
//! number.

pub mod capture;
pub mod cli;
pub mod engine;
pub mod error;
pub mod events;
pub mod hierarchy;
pub mod renderer;
