//! Incremental tail of stack progress events

use colored::Colorize;
use tokio::sync::Mutex;
use tracing::info;

use crate::cloud::control_plane::ControlPlane;
use crate::errors::DeployError;
use crate::models::stack::StackEvent;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Streams the events of one stack operation, never repeating one and never
/// showing history older than the capture point.
#[derive(Debug)]
pub struct EventTail {
    /// Id of the newest event already seen (exclusive lower bound)
    cursor: Mutex<Option<String>>,
}

impl EventTail {
    /// Start a tail with no boundary (every event is new)
    pub fn new() -> Self {
        Self {
            cursor: Mutex::new(None),
        }
    }

    /// Start a tail at the newest event that already exists
    pub async fn capture(
        client: &dyn ControlPlane,
        stack_name_or_id: &str,
    ) -> Result<Self, DeployError> {
        let page = client.describe_stack_events(stack_name_or_id, None).await?;
        let cursor = page.events.first().map(|event| event.event_id.clone());

        Ok(Self {
            cursor: Mutex::new(cursor),
        })
    }

    pub async fn cursor(&self) -> Option<String> {
        self.cursor.lock().await.clone()
    }

    /// Fetch events newer than the cursor, log them oldest first and advance the cursor.
    /// Returns the emitted events in the order they were logged.
    pub async fn flush(
        &self,
        client: &dyn ControlPlane,
        stack_name_or_id: &str,
    ) -> Result<Vec<StackEvent>, DeployError> {
        let mut cursor = self.cursor.lock().await;
        let mut events = fetch_since(client, stack_name_or_id, cursor.as_deref()).await?;

        if let Some(newest) = events.first() {
            *cursor = Some(newest.event_id.clone());
        }

        events.reverse();
        for event in &events {
            info!("{}", format_event(event));
        }

        Ok(events)
    }
}

impl Default for EventTail {
    fn default() -> Self {
        Self::new()
    }
}

/// Newest-first events down to (excluding) `boundary`
async fn fetch_since(
    client: &dyn ControlPlane,
    stack_name_or_id: &str,
    boundary: Option<&str>,
) -> Result<Vec<StackEvent>, DeployError> {
    let mut collected = Vec::new();
    let mut next_token = None;

    loop {
        let page = client
            .describe_stack_events(stack_name_or_id, next_token)
            .await?;

        for event in page.events {
            if Some(event.event_id.as_str()) == boundary {
                return Ok(collected);
            }
            collected.push(event);
        }

        match page.next_token {
            Some(token) => next_token = Some(token),
            None => return Ok(collected),
        }
    }
}

/// One progress line: time, status, resource type, logical id and reason
pub fn format_event(event: &StackEvent) -> String {
    let status = format!("{:<20}", event.resource_status);
    let status = if event.resource_status.ends_with("_FAILED") {
        status.red()
    } else if event.resource_status.ends_with("_COMPLETE") {
        status.green()
    } else if event.resource_status.ends_with("_IN_PROGRESS") {
        status.yellow()
    } else {
        status.normal()
    };

    format!(
        "{:<20} {} {:<32} {} {}",
        event.timestamp.format(TIMESTAMP_FORMAT).to_string(),
        status,
        event.resource_type,
        event.logical_resource_id,
        event.resource_status_reason.as_deref().unwrap_or("")
    )
    .trim_end()
    .to_string()
}
