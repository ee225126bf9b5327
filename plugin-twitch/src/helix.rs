use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use stream_tracker::{LiveStream, Platform, Streamer, StreamsApi, UsersApi};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use twitch_api2::{
    helix::{
        self,
        streams::{self, Stream},
        users::{get_users, User},
        ClientRequestError, HelixRequestDeleteError,
    },
    twitch_oauth2::{AppAccessToken, TwitchToken},
    types::{Nickname, UserId},
    HelixClient,
};

use crate::config::Config;
use crate::eventsub::CHAT_NOTIFICATION;
use crate::sub_tracker::ChatNotificationSubscriptions;

const EVENTSUB_URL: &str = "https://api.twitch.tv/helix/eventsub/subscriptions";
/// default page size of Get Streams, asking for more ids in one
/// request would need pagination
const STREAMS_BATCH: usize = 20;
const USERS_BATCH: usize = 100;

pub struct HelixApi {
    // The helix client and the client used for auth must be kept separate,
    // sharing one trips a higher ranked lifetime bug in rustc
    // https://github.com/rust-lang/rust/issues/70263
    client: HelixClient<'static, reqwest::Client>,
    http: reqwest::Client,

    // TODO refresh the token when it expires, app tokens last about 60 days
    token: AppAccessToken,

    app_secret: String,
    bot_user_id: String,
    callback_uri: String,
}

#[derive(Debug, Deserialize)]
struct EventSubList {
    data: Vec<EventSubEntry>,
}

#[derive(Debug, Deserialize)]
struct EventSubEntry {
    id: String,
    status: String,
    #[serde(rename = "type")]
    type_: String,
    condition: serde_json::Value,
}

impl EventSubEntry {
    fn broadcaster_user_id(&self) -> Option<&str> {
        self.condition
            .as_object()
            .and_then(|condition| condition.get("broadcaster_user_id"))
            .and_then(|v| v.as_str())
    }

    fn is_valid(&self) -> bool {
        matches!(
            self.status.as_str(),
            "enabled" | "webhook_callback_verification_pending"
        )
    }
}

impl HelixApi {
    pub async fn new(config: &Config) -> Result<Self> {
        let auth_client = reqwest::Client::default();
        let token = AppAccessToken::get_app_access_token(
            &auth_client,
            config.client_id.clone(),
            config.client_secret.clone(),
            vec![], // scopes
        )
        .await
        .context("Cannot get app access token")?;

        Ok(HelixApi {
            client: HelixClient::new(),
            http: reqwest::Client::default(),
            token,
            app_secret: config.app_secret.0.clone(),
            bot_user_id: config.bot_user_id.clone(),
            callback_uri: config.callback_uri.0.clone(),
        })
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("Client-Id", self.token.client_id().as_str())
            .bearer_auth(self.token.token().secret())
    }

    /// Existing chat notification subscription for this broadcaster, if any
    async fn find_chat_subscription(&self, broadcaster_id: &str) -> Result<Option<String>> {
        // TODO: handle pagination
        let resp = self
            .authed(self.http.get(EVENTSUB_URL))
            .query(&[("type", CHAT_NOTIFICATION)])
            .send()
            .await
            .context("Cannot list eventsub subscriptions")?
            .error_for_status()
            .context("Cannot list eventsub subscriptions")?;
        let subs: EventSubList = resp.json().await.context("Invalid eventsub list")?;

        Ok(subs
            .data
            .into_iter()
            .find(|s| {
                s.type_ == CHAT_NOTIFICATION
                    && s.is_valid()
                    && s.broadcaster_user_id() == Some(broadcaster_id)
            })
            .map(|s| s.id))
    }
}

fn is_not_found<E: std::error::Error + Send + Sync + 'static>(err: &ClientRequestError<E>) -> bool {
    let status = match err {
        ClientRequestError::HelixRequestDeleteError(HelixRequestDeleteError::Error {
            status, ..
        }) => status,
        ClientRequestError::HelixRequestDeleteError(HelixRequestDeleteError::InvalidResponse {
            status,
            ..
        }) => status,
        _ => return false,
    };
    status.as_u16() == 404
}

fn live_stream(stream: Stream) -> Result<LiveStream> {
    let started_at = OffsetDateTime::parse(stream.started_at.as_str(), &Rfc3339)
        .with_context(|| format!("invalid RFC3339 timestamp for started_at: {:?}", stream.started_at))?;
    Ok(LiveStream {
        platform: Platform::Twitch,
        id: stream.id.to_string(),
        user_id: stream.user_id.to_string(),
        user_name: stream.user_login.to_string(),
        user_display_name: stream.user_name.to_string(),
        title: stream.title.to_string(),
        game_name: stream.game_name.to_string(),
        viewers: stream.viewer_count as u64,
        started_at,
    })
}

fn streamer(user: User) -> Streamer {
    Streamer {
        platform: Platform::Twitch,
        id: user.id.to_string(),
        name: user.login.to_string(),
        display_name: user.display_name.to_string(),
    }
}

#[async_trait]
impl StreamsApi for HelixApi {
    async fn live_streams(&self, streamer_ids: &[String]) -> Result<Vec<LiveStream>> {
        let mut live = Vec::new();
        for batch in streamer_ids.chunks(STREAMS_BATCH) {
            let ids: Vec<UserId> = batch.iter().map(|id| id.as_str().into()).collect();
            let resp = self
                .client
                .req_get(
                    streams::GetStreamsRequest::builder().user_id(ids).build(),
                    &self.token,
                )
                .await
                .context("Can't get live streams")?;
            for stream in resp.data {
                live.push(live_stream(stream)?);
            }
        }
        Ok(live)
    }
}

#[async_trait]
impl UsersApi for HelixApi {
    async fn resolve_streamers(&self, names: &[String]) -> Result<Vec<Streamer>> {
        let mut users = Vec::new();
        for batch in names.chunks(USERS_BATCH) {
            let nicks: Vec<Nickname> = batch.iter().map(|n| n.as_str().into()).collect();
            let resp = self
                .client
                .req_get(get_users::GetUsersRequest::builder().login(nicks).build(), &self.token)
                .await
                .with_context(|| format!("Can't get users {:?}", batch))?;
            users.extend(resp.data.into_iter().map(streamer));
        }
        Ok(users)
    }
}

#[async_trait]
impl ChatNotificationSubscriptions for HelixApi {
    async fn subscribe(&self, broadcaster_id: &str) -> Result<String> {
        let body = serde_json::json!({
            "type": CHAT_NOTIFICATION,
            "version": "1",
            "condition": {
                "broadcaster_user_id": broadcaster_id,
                "user_id": self.bot_user_id,
            },
            "transport": {
                "method": "webhook",
                "callback": self.callback_uri,
                "secret": self.app_secret,
            },
        });

        let resp = self
            .authed(self.http.post(EVENTSUB_URL))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Cannot subscribe to chat notifications of {}", broadcaster_id))?;

        if resp.status() == reqwest::StatusCode::CONFLICT {
            log::info!(
                "chat notification subscription already exists for broadcaster {}",
                broadcaster_id
            );
            return self
                .find_chat_subscription(broadcaster_id)
                .await?
                .with_context(|| {
                    format!("Conflicting subscription for {} not found", broadcaster_id)
                });
        }

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!(
                "failed to create {} subscription for broadcaster {}: {} {}",
                CHAT_NOTIFICATION,
                broadcaster_id,
                status,
                text
            );
        }

        let created: EventSubList = resp.json().await.context("Invalid subscription response")?;
        created
            .data
            .into_iter()
            .next()
            .map(|s| s.id)
            .context("No subscription in twitch response")
    }

    async fn unsubscribe(&self, subscription_id: &str) -> Result<()> {
        log::info!("Deleting subscription {}", subscription_id);
        let res = self
            .client
            .req_delete(
                helix::eventsub::DeleteEventSubSubscriptionRequest::builder()
                    .id(subscription_id)
                    .build(),
                &self.token,
            )
            .await;

        match res {
            Ok(_) => Ok(()),
            Err(err) if is_not_found(&err) => {
                log::warn!("Subscription {} was already gone", subscription_id);
                Ok(())
            }
            Err(err) => Err(err)
                .with_context(|| format!("Failed to delete subscription {}", subscription_id)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use twitch_api2::helix::RequestDelete;

    fn delete_error(status: u16, body: &str) -> ClientRequestError<reqwest::Error> {
        let uri: http::Uri = "https://api.twitch.tv/helix/eventsub/subscriptions?id=deadbeef"
            .parse()
            .unwrap();
        let response = http::Response::builder()
            .status(status)
            .body(body.as_bytes().to_vec())
            .unwrap();
        match helix::eventsub::DeleteEventSubSubscriptionRequest::parse_response(
            None, &uri, response,
        ) {
            Ok(_) => panic!("status {} should be an error", status),
            Err(err) => err.into(),
        }
    }

    #[test]
    fn test_missing_subscription_is_not_found() {
        let gone = delete_error(
            404,
            r#"{"error": "Not Found", "status": 404, "message": "subscription not found"}"#,
        );
        assert!(is_not_found(&gone));
        assert!(is_not_found(&delete_error(404, "")));
    }

    #[test]
    fn test_other_delete_errors_are_kept() {
        assert!(!is_not_found(&delete_error(500, "")));
        assert!(!is_not_found(&delete_error(
            401,
            r#"{"error": "Unauthorized", "status": 401, "message": "Invalid OAuth token"}"#,
        )));
    }
}
