use crate::errors::{TwitchError, TwitchSigError};
use crate::eventsub::{self, Notification};
use anyhow::Context;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, status::StatusCode},
    response::IntoResponse,
    routing, Router,
};
use futures::Future;
use hmac::{Hmac, Mac, NewMac};
use std::{net::SocketAddr, num::ParseIntError, sync::Arc};
use stream_tracker::SubEvent;
use tokio::sync::mpsc;

pub const WEBHOOK_PATH: &str = "/touitche/coucou";

type HmacSha256 = Hmac<sha2::Sha256>;

fn decode_hex(s: &str) -> std::result::Result<Vec<u8>, ParseIntError> {
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(s.get(i..i + 2).unwrap_or("zz"), 16))
        .collect()
}

/// Everything needed to check a request came from twitch,
/// taken from the eventsub headers.
struct SignedHeaders {
    expected_sig: Vec<u8>,
    msg_id: Vec<u8>,
    msg_ts: String,
    msg_type: String,
}

impl SignedHeaders {
    fn verify(&self, sub_secret: &str, body: &[u8]) -> Result<(), TwitchSigError> {
        let mut mac =
            HmacSha256::new_from_slice(sub_secret.as_bytes()).map_err(|_| TwitchSigError::Invalid)?;
        mac.update(&self.msg_id);
        mac.update(self.msg_ts.as_bytes());
        mac.update(body);

        mac.verify(&self.expected_sig[..]).map_err(|_| {
            log::warn!("Signature verification failed!");
            TwitchSigError::Invalid
        })?;
        Ok(())
    }
}

fn header<'a>(parts: &'a Parts, name: &'static str) -> Result<&'a str, TwitchSigError> {
    match parts.headers.get(name) {
        Some(hdr) => Ok(hdr.to_str()?),
        None => Err(TwitchSigError::Missing(name)),
    }
}

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for SignedHeaders
where
    S: Send + Sync,
{
    type Rejection = TwitchSigError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let sig = header(parts, "Twitch-Eventsub-Message-Signature")?;
        let expected_sig = sig
            .strip_prefix("sha256=")
            .and_then(|hex| decode_hex(hex).ok())
            .ok_or(TwitchSigError::Invalid)?;

        Ok(SignedHeaders {
            expected_sig,
            msg_id: header(parts, "Twitch-Eventsub-Message-Id")?.as_bytes().to_vec(),
            msg_ts: header(parts, "Twitch-Eventsub-Message-Timestamp")?.to_string(),
            msg_type: header(parts, "Twitch-Eventsub-Message-Type")?.to_string(),
        })
    }
}

#[derive(Clone)]
pub struct ServerState {
    app_secret: Arc<String>,
    send_chan: mpsc::Sender<SubEvent>,
}

async fn webhook_post(
    headers: SignedHeaders,
    axum::extract::State(state): axum::extract::State<ServerState>,
    body: String,
) -> Result<axum::response::Response, TwitchError> {
    log::debug!("got something from twitch: {:?}", body);
    headers.verify(&state.app_secret, body.as_bytes())?;

    match eventsub::parse_payload(&headers.msg_type, &headers.msg_ts, &body)? {
        Notification::Challenge(challenge) => {
            log::info!("eventsub verification request received");
            Ok(challenge.into_response())
        }
        Notification::Revocation(sub) => {
            log::warn!(
                "eventsub subscription {} ({}) revoked: {}",
                sub.id,
                sub.type_,
                sub.status
            );
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        Notification::Sub(event) => {
            log::debug!("sub event: {:?}", event);
            state.send_chan.send(event).await.map_err(|err| {
                log::error!("{:?}", err);
                StatusCode::INTERNAL_SERVER_ERROR
            })?;
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        Notification::Ignored(what) => {
            log::debug!("Ignoring eventsub message: {}", what);
            Ok(StatusCode::NO_CONTENT.into_response())
        }
    }
}

pub(crate) fn init_router(app_secret: &str, tx: mpsc::Sender<SubEvent>) -> Router<()> {
    let server_state = ServerState {
        app_secret: Arc::new(app_secret.to_string()),
        send_chan: tx,
    };

    axum::Router::new()
        .route(WEBHOOK_PATH, routing::post(webhook_post))
        .with_state(server_state)
}

/// Serve the webhook until `shutdown` resolves.
pub(crate) async fn run<F>(
    bind: &str,
    port: u16,
    app_secret: &str,
    tx: mpsc::Sender<SubEvent>,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    let ip: std::net::IpAddr = bind
        .parse()
        .with_context(|| format!("Cannot parse {} as ipv4 or ipv6", bind))?;
    let addr = SocketAddr::new(ip, port);
    log::info!("eventsub webhook listening on {}", addr);

    axum::Server::try_bind(&addr)
        .with_context(|| format!("Cannot bind webhook server to {}", addr))?
        .serve(init_router(app_secret, tx).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
        .context("webhook server crashed")?;

    log::info!("eventsub webhook server stopped");
    Ok(())
}
