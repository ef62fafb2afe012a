//! Google Calendar integration

pub mod client;
mod types;

pub use client::GoogleCalendarClient;
