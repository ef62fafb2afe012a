//! Domain constants

/// Prefix of every calendar channel id; the webhook dispatches on it
pub const CALENDAR_CHANNEL_PREFIX: &str = "calendar-";

/// Calendar watched when no target is configured
pub const DEFAULT_TARGET_ID: &str = "primary";

// Google Calendar API v3
pub const GOOGLE_CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
/// Google's ceiling for event watch channels is 7 days
pub const MAX_CHANNEL_TTL_HOURS: u64 = 7 * 24;

// Webhook headers
pub const HEADER_CHANNEL_ID: &str = "x-goog-channel-id";
pub const HEADER_RESOURCE_ID: &str = "x-goog-resource-id";
pub const HEADER_RESOURCE_STATE: &str = "x-goog-resource-state";
pub const HEADER_CHANNEL_TOKEN: &str = "x-goog-channel-token";
pub const HEADER_MESSAGE_NUMBER: &str = "x-goog-message-number";
pub const HEADER_CHANNEL_EXPIRATION: &str = "x-goog-channel-expiration";

pub const DEFAULT_CALLBACK_PATH: &str = "/webhooks/calendar";
/// Every 3 hours, on the hour (seconds-first cron syntax)
pub const DEFAULT_RENEWAL_CRON: &str = "0 0 */3 * * *";
pub const DEFAULT_RENEWAL_WINDOW_HOURS: u64 = 24;
pub const DEFAULT_PAGE_SIZE: u32 = 250;
