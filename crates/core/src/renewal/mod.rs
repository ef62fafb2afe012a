//! Channel renewal
//!
//! One tick of work; the cron lifecycle lives in
//! `calmirror-infra::scheduling`.

pub mod service;

pub use service::ChannelRenewalService;
