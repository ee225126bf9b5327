//! Payloads of the eventsub webhook, and their translation into
//! the sub events the session metrics understand.
use serde::Deserialize;
use stream_tracker::{Broadcaster, Platform, SubEvent, SubEventKind, Tier};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

pub const CHAT_NOTIFICATION: &str = "channel.chat.notification";

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub version: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    subscription: SubscriptionInfo,
    #[serde(default)]
    challenge: Option<String>,
    #[serde(default)]
    event: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatNotification {
    pub broadcaster_user_id: String,
    pub broadcaster_user_login: String,
    pub broadcaster_user_name: String,
    #[serde(default)]
    pub chatter_user_login: Option<String>,
    pub notice_type: String,
    #[serde(default)]
    pub sub: Option<SubNotice>,
    #[serde(default)]
    pub resub: Option<ResubNotice>,
    #[serde(default)]
    pub sub_gift: Option<SubGiftNotice>,
    #[serde(default)]
    pub community_sub_gift: Option<CommunitySubGiftNotice>,
    #[serde(default)]
    pub prime_paid_upgrade: Option<PrimePaidUpgradeNotice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubNotice {
    pub sub_tier: String,
    #[serde(default)]
    pub is_prime: bool,
    #[serde(default)]
    pub duration_months: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResubNotice {
    pub sub_tier: String,
    #[serde(default)]
    pub cumulative_months: u32,
    #[serde(default)]
    pub is_prime: bool,
    #[serde(default)]
    pub is_gift: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubGiftNotice {
    pub sub_tier: String,
    #[serde(default)]
    pub recipient_user_login: Option<String>,
    #[serde(default)]
    pub community_gift_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommunitySubGiftNotice {
    pub id: String,
    pub total: u32,
    pub sub_tier: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrimePaidUpgradeNotice {
    pub sub_tier: String,
}

impl ChatNotification {
    /// None for notices that aren't about subscriptions (raids, announcements…)
    pub fn kind(&self) -> Option<SubEventKind> {
        let kind = match self.notice_type.as_str() {
            "sub" => self.sub.as_ref().map(|s| SubEventKind::Sub {
                tier: Tier::parse(&s.sub_tier),
                is_prime: s.is_prime,
            }),
            "resub" => self.resub.as_ref().map(|s| SubEventKind::Resub {
                tier: Tier::parse(&s.sub_tier),
                is_gift: s.is_gift,
            }),
            "sub_gift" => self.sub_gift.as_ref().map(|s| SubEventKind::SubGift {
                tier: Tier::parse(&s.sub_tier),
            }),
            "community_sub_gift" => {
                self.community_sub_gift
                    .as_ref()
                    .map(|s| SubEventKind::CommunitySubGift {
                        tier: Tier::parse(&s.sub_tier),
                        total: s.total,
                    })
            }
            "gift_paid_upgrade" => Some(SubEventKind::GiftPaidUpgrade),
            "prime_paid_upgrade" => {
                self.prime_paid_upgrade
                    .as_ref()
                    .map(|s| SubEventKind::PrimePaidUpgrade {
                        tier: Tier::parse(&s.sub_tier),
                    })
            }
            _ => return None,
        };
        if kind.is_none() {
            log::warn!(
                "{} notice for {} without its {} object",
                self.notice_type,
                self.broadcaster_user_login,
                self.notice_type
            );
        }
        kind
    }

    pub fn into_sub_event(self, timestamp: OffsetDateTime) -> Option<SubEvent> {
        let kind = self.kind()?;
        Some(SubEvent {
            platform: Platform::Twitch,
            broadcaster: Broadcaster {
                id: self.broadcaster_user_id,
                name: self.broadcaster_user_login,
            },
            timestamp,
            kind,
        })
    }
}

#[derive(Debug)]
pub enum Notification {
    Challenge(String),
    Revocation(SubscriptionInfo),
    Sub(SubEvent),
    /// Something we are subscribed to but don't care about.
    Ignored(String),
}

/// Decode a webhook request body given the value of the
/// `Twitch-Eventsub-Message-Type` and `-Timestamp` headers.
pub fn parse_payload(
    message_type: &str,
    timestamp: &str,
    body: &str,
) -> Result<Notification, serde_json::Error> {
    let envelope: Envelope = serde_json::from_str(body)?;

    match message_type {
        "webhook_callback_verification" => Ok(match envelope.challenge {
            Some(challenge) => Notification::Challenge(challenge),
            None => Notification::Ignored("verification without challenge".to_string()),
        }),
        "revocation" => Ok(Notification::Revocation(envelope.subscription)),
        "notification" if envelope.subscription.type_ == CHAT_NOTIFICATION => {
            let event = match envelope.event {
                Some(event) => event,
                None => return Ok(Notification::Ignored("notification without event".to_string())),
            };
            let notification: ChatNotification = serde_json::from_value(event)?;
            let notice = notification.notice_type.clone();
            let timestamp = OffsetDateTime::parse(timestamp, &Rfc3339).unwrap_or_else(|err| {
                log::debug!("Invalid message timestamp {:?}: {}", timestamp, err);
                OffsetDateTime::now_utc()
            });
            Ok(notification
                .into_sub_event(timestamp)
                .map(Notification::Sub)
                .unwrap_or(Notification::Ignored(notice)))
        }
        other => Ok(Notification::Ignored(format!(
            "{} for {}",
            other, envelope.subscription.type_
        ))),
    }
}
