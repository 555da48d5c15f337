//! Sampling strategies for the estimation loop.
//!
//! Samplers implement the shared [`Sampler`](crate::core::Sampler) trait and
//! own their random state, so two runs with the same seed draw the same
//! sequence of minimal samples.

pub mod uniform;

pub use uniform::UniformRandomSampler;
