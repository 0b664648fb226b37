use rocket::{serde::json::Json, State};
use serde_json::Value;
use tracing::{debug, trace};

pub mod events;

use crate::webhooks::{Event, EventSender};

/// Accepts GitLab webhook deliveries.
///
/// Payload authenticity is assumed to be checked upstream (GitLab's secret
/// token header is verified by the reverse proxy in front of us), so the
/// route only classifies the payload and hands supported events to the relay
/// loop.
#[rocket::post("/api/webhooks/gitlab", format = "json", data = "<payload>")]
pub fn gitlab_webhook(payload: Json<Value>, sender: &State<EventSender>) -> &'static str {
    trace!("payload: {:?}", payload.0);

    match events::parse(&payload) {
        Some(event) => {
            debug!(
                "received {} event for project '{}'",
                event.kind(),
                event.project_name()
            );
            sender
                .0
                .send(Event::GitLab(event))
                .expect("mspc channel was closed / dropped");
        }
        None => debug!("ignoring unsupported webhook payload"),
    }

    "OK"
}
