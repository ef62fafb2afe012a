//! Domain types

pub mod channel;
pub mod delta;
pub mod event;
pub mod health;
pub mod notification;
pub mod report;

pub use channel::{ChannelState, SyncChannel};
pub use delta::{ChangeQuery, DeltaPage, PageCheckpoint, RemoteEvent, WatchRequest, WatchResponse};
pub use event::{EventStatus, MirrorEvent, Participant, ResponseState};
pub use health::{ChannelHealth, HealthSnapshot, HealthStatus};
pub use notification::{NotificationTarget, ResourceState, WebhookNotification};
pub use report::{RenewalReport, SyncReport};
