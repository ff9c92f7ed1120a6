use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info};

use crate::commands::{HipchatColor, HipchatMessage};

#[derive(Serialize)]
struct Notification<'a> {
    message_format: &'static str,
    color: &'a str,
    notify: bool,
    message: &'a str,
}

pub(crate) async fn hipchat_message(
    HipchatMessage {
        room,
        message,
        token,
        server,
        color,
        notify,
        text,
    }: HipchatMessage,
) -> Result<(), reqwest::Error> {
    let notification = Notification {
        message_format: if text { "text" } else { "html" },
        color: color_name(color),
        notify,
        message: &message,
    };

    let url = format!("{}/v2/room/{room}/notification", server.trim_end_matches('/'));
    debug!(%url, "sending room notification");

    let response = Client::new()
        .post(url)
        .bearer_auth(token)
        .json(&notification)
        .send()
        .await?
        .error_for_status()?;

    info!(status = %response.status(), %room, "notification sent");

    Ok(())
}

fn color_name(color: HipchatColor) -> &'static str {
    match color {
        HipchatColor::Yellow => "yellow",
        HipchatColor::Green => "green",
        HipchatColor::Red => "red",
        HipchatColor::Purple => "purple",
        HipchatColor::Gray => "gray",
        HipchatColor::Random => "random",
    }
}
