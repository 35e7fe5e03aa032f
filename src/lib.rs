//! Build container images from a declarative YAML spec.
//!
//! The pipeline is strictly sequential: [`config::load`] validates the build
//! file, [`pipeline::compile`] turns it into ordered steps,
//! [`pipeline::execute`] drives a [`docker::ContainerEngine`] through them
//! with fail-fast semantics, and [`pipeline::summarize`] reports the outcome.

pub mod config;
pub mod docker;
pub mod pipeline;
