use std::fmt;
use std::str::FromStr;

use time::OffsetDateTime;

use crate::error::TrackerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Twitch,
    Youtube,
}

impl Platform {
    pub const ALL: [Platform; 2] = [Platform::Twitch, Platform::Youtube];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Twitch => "twitch",
            Platform::Youtube => "youtube",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| TrackerError::UnsupportedPlatform(s.to_string()))
    }
}

/// Identity of a session: the lowercased login name plus the platform.
/// Live streams and sub events carry names, not always ids, so sessions
/// are keyed on the name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamerKey(String);

impl StreamerKey {
    pub fn new(name: &str, platform: Platform) -> Self {
        StreamerKey(format!("{}-{}", name.to_lowercase(), platform))
    }
}

impl fmt::Display for StreamerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A resolved platform identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Streamer {
    pub platform: Platform,
    /// stable platform id, never changes even if the streamer is renamed
    pub id: String,
    /// login name, shown in the channel url
    pub name: String,
    pub display_name: String,
}

impl Streamer {
    pub fn key(&self) -> StreamerKey {
        StreamerKey::new(&self.name, self.platform)
    }
}

impl fmt::Display for Streamer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name, self.platform)
    }
}

/// One broadcast, as reported by a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveStream {
    pub platform: Platform,
    /// id of the stream itself, a new one for every broadcast
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub user_display_name: String,
    pub title: String,
    pub game_name: String,
    pub viewers: u64,
    pub started_at: OffsetDateTime,
}

impl LiveStream {
    pub fn key(&self) -> StreamerKey {
        StreamerKey::new(&self.user_name, self.platform)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    One,
    Two,
    Three,
}

impl Tier {
    /// Platforms encode tiers as "1000", "2000" and "3000".
    /// Anything else is counted as a tier 1 sub.
    pub fn parse(raw: &str) -> Tier {
        match raw {
            "2000" => Tier::Two,
            "3000" => Tier::Three,
            "1000" => Tier::One,
            _ => {
                log::debug!("Unknown sub tier {:?}, assuming tier 1", raw);
                Tier::One
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Broadcaster {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubEventKind {
    Sub { tier: Tier, is_prime: bool },
    Resub { tier: Tier, is_gift: bool },
    SubGift { tier: Tier },
    /// Announces a batch of gifts; each recipient then gets its own `SubGift`.
    CommunitySubGift { tier: Tier, total: u32 },
    /// A gifted sub converted into a paid one, no new subscriber.
    GiftPaidUpgrade,
    PrimePaidUpgrade { tier: Tier },
}

impl SubEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            SubEventKind::Sub { .. } => "sub",
            SubEventKind::Resub { .. } => "resub",
            SubEventKind::SubGift { .. } => "sub_gift",
            SubEventKind::CommunitySubGift { .. } => "community_sub_gift",
            SubEventKind::GiftPaidUpgrade => "gift_paid_upgrade",
            SubEventKind::PrimePaidUpgrade { .. } => "prime_paid_upgrade",
        }
    }

    /// Tier and gift flag of the subscription this event adds,
    /// None when the event does not add one.
    pub fn counted(&self) -> Option<(Tier, bool)> {
        match *self {
            SubEventKind::Sub { tier, .. } => Some((tier, false)),
            SubEventKind::Resub { tier, is_gift } => Some((tier, is_gift)),
            SubEventKind::SubGift { tier } => Some((tier, true)),
            SubEventKind::PrimePaidUpgrade { tier } => Some((tier, false)),
            SubEventKind::CommunitySubGift { .. } | SubEventKind::GiftPaidUpgrade => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubEvent {
    pub platform: Platform,
    pub broadcaster: Broadcaster,
    pub timestamp: OffsetDateTime,
    pub kind: SubEventKind,
}

impl SubEvent {
    pub fn key(&self) -> StreamerKey {
        StreamerKey::new(&self.broadcaster.name, self.platform)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_platform_from_str() {
        assert_eq!("twitch".parse::<Platform>().unwrap(), Platform::Twitch);
        assert_eq!("Twitch".parse::<Platform>().unwrap(), Platform::Twitch);
        assert!(matches!(
            "myspace".parse::<Platform>(),
            Err(TrackerError::UnsupportedPlatform(p)) if p == "myspace"
        ));
    }

    #[test]
    fn test_key_ignores_case() {
        assert_eq!(
            StreamerKey::new("Foo", Platform::Twitch),
            StreamerKey::new("foo", Platform::Twitch)
        );
        assert_eq!(StreamerKey::new("Foo", Platform::Twitch).to_string(), "foo-twitch");
        assert_ne!(
            StreamerKey::new("foo", Platform::Twitch),
            StreamerKey::new("foo", Platform::Youtube)
        );
    }

    #[test]
    fn test_parse_tier() {
        assert_eq!(Tier::parse("1000"), Tier::One);
        assert_eq!(Tier::parse("2000"), Tier::Two);
        assert_eq!(Tier::parse("3000"), Tier::Three);
        assert_eq!(Tier::parse("prime"), Tier::One, "unknown tiers count as tier 1");
    }

    #[test]
    fn test_counted_kinds() {
        assert_eq!(
            SubEventKind::Resub { tier: Tier::Two, is_gift: true }.counted(),
            Some((Tier::Two, true))
        );
        assert_eq!(SubEventKind::SubGift { tier: Tier::Three }.counted(), Some((Tier::Three, true)));
        assert_eq!(SubEventKind::GiftPaidUpgrade.counted(), None);
        assert_eq!(
            SubEventKind::CommunitySubGift { tier: Tier::One, total: 5 }.counted(),
            None
        );
    }
}
