//! Capability routing: fixed provider chains with fallback discipline.
//!
//! A chain is the sole arbiter of fallback order. Providers are tried one
//! at a time; a soft failure falls through to the next provider, a hard
//! failure aborts the chain, and a skipped precondition costs nothing.

pub mod captcha;
pub mod error;
pub mod providers;
pub mod router;

pub use captcha::{captcha_chain, CaptchaChallenge};
pub use error::{Attempt, AttemptDisposition, DispatchError};
pub use router::{CancelFlag, CapabilityRouter, ChainSuccess, ProviderChain};
