//! The single outward call made per job.
//!
//! [`Generator`] is the seam between the batch engine and whatever produces
//! output for a job: the hosted image service ([`HttpGenerator`]), a feature's
//! ad-hoc closure ([`from_fn`]), or a test double.

pub mod client;
pub mod types;

use std::future::Future;

use crate::engine::Job;
use crate::error::GenerateError;

pub use client::HttpGenerator;
pub use types::{GenerateRequest, GenerateResponse, GeneratedImage};

/// Produces the output for one job. May be slow, may fail.
pub trait Generator<I, P>: Send + Sync {
    type Output;

    fn generate(
        &self,
        job: Job<I, P>,
    ) -> impl Future<Output = Result<Self::Output, GenerateError>> + Send;
}

/// A [`Generator`] backed by a closure.
pub struct FnGenerator<F> {
    f: F,
}

/// Wrap `f` so it can drive a batch.
pub fn from_fn<F>(f: F) -> FnGenerator<F> {
    FnGenerator { f }
}

impl<I, P, O, F, Fut> Generator<I, P> for FnGenerator<F>
where
    F: Fn(Job<I, P>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<O, GenerateError>> + Send,
{
    type Output = O;

    fn generate(&self, job: Job<I, P>) -> impl Future<Output = Result<O, GenerateError>> + Send {
        (self.f)(job)
    }
}
