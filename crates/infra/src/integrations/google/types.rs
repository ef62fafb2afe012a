//! Google Calendar API v3 wire types and their mapping to domain deltas

use calmirror_domain::{EventStatus, Participant, ProviderError, RemoteEvent, ResponseState};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EventsPage {
    #[serde(default)]
    pub items: Vec<GoogleEvent>,
    pub next_page_token: Option<String>,
    pub next_sync_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GoogleEvent {
    pub id: String,
    pub status: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub start: Option<EventDateTime>,
    pub end: Option<EventDateTime>,
    pub hangout_link: Option<String>,
    pub conference_data: Option<ConferenceData>,
    pub html_link: Option<String>,
    pub organizer: Option<Person>,
    pub attendees: Option<Vec<Attendee>>,
    pub updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EventDateTime {
    pub date_time: Option<DateTime<Utc>>,
    /// All-day events carry a bare date
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConferenceData {
    #[serde(default)]
    pub entry_points: Vec<EntryPoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EntryPoint {
    pub entry_point_type: Option<String>,
    pub uri: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Person {
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Attendee {
    pub email: Option<String>,
    pub response_status: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WatchBody<'a> {
    pub id: &'a str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub address: &'a str,
    pub token: &'a str,
    pub params: WatchParams,
}

#[derive(Debug, Serialize)]
pub(crate) struct WatchParams {
    /// Seconds, as a string
    pub ttl: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChannelResource {
    pub resource_id: Option<String>,
    /// Milliseconds since the epoch, as a string
    pub expiration: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StopBody<'a> {
    pub id: &'a str,
    pub resource_id: &'a str,
}

impl GoogleEvent {
    pub(crate) fn into_remote(self) -> Result<RemoteEvent, ProviderError> {
        let status = match self.status.as_deref() {
            Some("cancelled") => EventStatus::Cancelled,
            Some("tentative") => EventStatus::Tentative,
            _ => EventStatus::Confirmed,
        };
        let start = self.start.as_ref().map(EventDateTime::to_utc).transpose()?.flatten();
        let end = self.end.as_ref().map(EventDateTime::to_utc).transpose()?.flatten();
        let conference_link = self.hangout_link.or_else(|| {
            self.conference_data.and_then(|data| {
                data.entry_points
                    .into_iter()
                    .find(|point| point.entry_point_type.as_deref() == Some("video"))
                    .and_then(|point| point.uri)
            })
        });
        let participants = self
            .attendees
            .map(|list| list.into_iter().filter_map(|attendee| attendee.into_participant(&self.id)).collect());

        Ok(RemoteEvent {
            status,
            summary: self.summary,
            description: self.description,
            start,
            end,
            conference_link,
            view_link: self.html_link,
            organizer: self.organizer.and_then(|person| person.email),
            participants,
            updated: self.updated,
            id: self.id,
        })
    }
}

impl EventDateTime {
    /// Timed events keep their instant; all-day dates become UTC midnight
    fn to_utc(&self) -> Result<Option<DateTime<Utc>>, ProviderError> {
        if let Some(at) = self.date_time {
            return Ok(Some(at));
        }
        let Some(raw) = self.date.as_deref() else {
            return Ok(None);
        };
        let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|e| ProviderError::Decode { message: format!("invalid event date {raw:?}: {e}") })?;
        Ok(date.and_hms_opt(0, 0, 0).map(|midnight| midnight.and_utc()))
    }
}

impl Attendee {
    fn into_participant(self, event_id: &str) -> Option<Participant> {
        let address = self.email.map(|email| email.trim().to_string()).filter(|email| !email.is_empty());
        let Some(address) = address else {
            warn!(event_id, "attendee without email skipped");
            return None;
        };
        let response_state = match self.response_status.as_deref().map(str::parse::<ResponseState>) {
            Some(Ok(state)) => state,
            Some(Err(_)) => {
                warn!(event_id, "unknown attendee response status; treating as needs_action");
                ResponseState::NeedsAction
            }
            None => ResponseState::NeedsAction,
        };
        Some(Participant::new(address, response_state))
    }
}

impl ChannelResource {
    pub(crate) fn expiration(&self) -> Result<DateTime<Utc>, ProviderError> {
        let raw = self
            .expiration
            .as_deref()
            .ok_or_else(|| ProviderError::Decode { message: "watch response without expiration".into() })?;
        raw.parse::<i64>()
            .ok()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| ProviderError::Decode { message: format!("invalid channel expiration {raw:?}") })
    }
}
