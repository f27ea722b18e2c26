//! Canonical job model shared by every genjob crate.
//!
//! Provider adapters, the poll scheduler, and the HTTP layer all speak in
//! terms of the types defined here: [`job::JobState`], [`job::JobResult`],
//! [`job::JobError`], and the poll budget in [`backoff::PollConfig`].

pub mod backoff;
pub mod error;
pub mod job;
pub mod provider;
pub mod types;
