//! Channel modes: capabilities requested for, and granted to, an attachment.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A capability granted per channel attachment.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelMode {
    /// Enter, update and leave the presence set
    Presence,
    /// Publish messages
    Publish,
    /// Receive messages
    Subscribe,
    /// Receive presence events
    PresenceSubscribe,
}

impl ChannelMode {
    /// Every mode, in the order the server reports the default grant.
    pub const ALL: [ChannelMode; 4] = [
        ChannelMode::Presence,
        ChannelMode::Publish,
        ChannelMode::Subscribe,
        ChannelMode::PresenceSubscribe,
    ];

    /// The modes granted when none are requested.
    pub fn defaults() -> Vec<ChannelMode> {
        Self::ALL.to_vec()
    }

    /// Wire name of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelMode::Presence => "presence",
            ChannelMode::Publish => "publish",
            ChannelMode::Subscribe => "subscribe",
            ChannelMode::PresenceSubscribe => "presence_subscribe",
        }
    }

    /// Parse a comma-separated mode list such as `"presence,subscribe"`.
    ///
    /// Whitespace around entries is ignored and duplicates are collapsed,
    /// keeping the first occurrence. An empty list is an error.
    pub fn parse_list(list: &str) -> Result<Vec<ChannelMode>, UnknownMode> {
        let mut modes = Vec::new();
        for entry in list.split(',') {
            let mode: ChannelMode = entry.trim().parse()?;
            if !modes.contains(&mode) {
                modes.push(mode);
            }
        }
        Ok(modes)
    }

    /// Join modes back into the comma-separated form.
    pub fn join(modes: &[ChannelMode]) -> String {
        modes
            .iter()
            .map(ChannelMode::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mode name outside the enumerated set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown channel mode: {0:?}")]
pub struct UnknownMode(pub String);

impl FromStr for ChannelMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "presence" => Ok(ChannelMode::Presence),
            "publish" => Ok(ChannelMode::Publish),
            "subscribe" => Ok(ChannelMode::Subscribe),
            "presence_subscribe" => Ok(ChannelMode::PresenceSubscribe),
            other => Err(UnknownMode(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case("subscribe", vec![ChannelMode::Subscribe])]
    #[case("presence,subscribe", vec![ChannelMode::Presence, ChannelMode::Subscribe])]
    #[case(" publish , presence_subscribe ", vec![ChannelMode::Publish, ChannelMode::PresenceSubscribe])]
    #[case("subscribe,subscribe", vec![ChannelMode::Subscribe])]
    fn test_parse_list(#[case] input: &str, #[case] expected: Vec<ChannelMode>) {
        assert_eq!(ChannelMode::parse_list(input).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("susribe")]
    #[case("publish,")]
    #[case("PUBLISH")]
    fn test_parse_list_rejects_unknown(#[case] input: &str) {
        assert!(ChannelMode::parse_list(input).is_err());
    }

    #[test]
    fn test_default_order() {
        assert_eq!(
            ChannelMode::join(&ChannelMode::defaults()),
            "presence,publish,subscribe,presence_subscribe"
        );
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&ChannelMode::PresenceSubscribe).unwrap();
        assert_eq!(json, "\"presence_subscribe\"");
    }

    proptest! {
        #[test]
        fn joined_subsets_parse_back(mask in 1u8..16) {
            let modes: Vec<ChannelMode> = ChannelMode::ALL
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, m)| *m)
                .collect();
            let parsed = ChannelMode::parse_list(&ChannelMode::join(&modes)).unwrap();
            prop_assert_eq!(parsed, modes);
        }
    }
}
