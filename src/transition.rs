//! Transition codes and visit provenance
//!
//! A transition code packs two values:
//! - the core action in the low byte (`code & 0xFF`)
//! - qualifier bitflags in the high 24 bits (`code & 0xFFFFFF00`)
//!
//! Source databases store the code as a signed 32-bit integer, so codes with
//! the server-redirect bit set come back negative. Decoding masks to 32 bits.

use std::fmt;

use serde::{Deserialize, Serialize};

const CORE_MASK: u32 = 0xFF;
const QUALIFIER_MASK: u32 = 0xFFFF_FF00;

/// How a visit was initiated (core action)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionCore {
    Link,
    Typed,
    AutoBookmark,
    AutoSubframe,
    ManualSubframe,
    Generated,
    StartPage,
    FormSubmit,
    Reload,
    Keyword,
    KeywordGenerated,
    /// A core value this version does not know about
    Other(u8),
}

impl TransitionCore {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => TransitionCore::Link,
            1 => TransitionCore::Typed,
            2 => TransitionCore::AutoBookmark,
            3 => TransitionCore::AutoSubframe,
            4 => TransitionCore::ManualSubframe,
            5 => TransitionCore::Generated,
            6 => TransitionCore::StartPage,
            7 => TransitionCore::FormSubmit,
            8 => TransitionCore::Reload,
            9 => TransitionCore::Keyword,
            10 => TransitionCore::KeywordGenerated,
            other => TransitionCore::Other(other),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            TransitionCore::Link => 0,
            TransitionCore::Typed => 1,
            TransitionCore::AutoBookmark => 2,
            TransitionCore::AutoSubframe => 3,
            TransitionCore::ManualSubframe => 4,
            TransitionCore::Generated => 5,
            TransitionCore::StartPage => 6,
            TransitionCore::FormSubmit => 7,
            TransitionCore::Reload => 8,
            TransitionCore::Keyword => 9,
            TransitionCore::KeywordGenerated => 10,
            TransitionCore::Other(code) => *code,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionCore::Link => "link",
            TransitionCore::Typed => "typed",
            TransitionCore::AutoBookmark => "auto_bookmark",
            TransitionCore::AutoSubframe => "auto_subframe",
            TransitionCore::ManualSubframe => "manual_subframe",
            TransitionCore::Generated => "generated",
            TransitionCore::StartPage => "start_page",
            TransitionCore::FormSubmit => "form_submit",
            TransitionCore::Reload => "reload",
            TransitionCore::Keyword => "keyword",
            TransitionCore::KeywordGenerated => "keyword_generated",
            TransitionCore::Other(_) => "other",
        }
    }
}

impl fmt::Display for TransitionCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionCore::Other(code) => write!(f, "other({})", code),
            core => write!(f, "{}", core.as_str()),
        }
    }
}

/// Qualifier bitflag set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TransitionQualifier(u32);

impl TransitionQualifier {
    pub const BLOCKED: Self = Self(0x0080_0000);
    pub const FORWARD_BACK: Self = Self(0x0100_0000);
    pub const FROM_ADDRESS_BAR: Self = Self(0x0200_0000);
    pub const HOME_PAGE: Self = Self(0x0400_0000);
    pub const FROM_API: Self = Self(0x0800_0000);
    pub const CHAIN_START: Self = Self(0x1000_0000);
    pub const CHAIN_END: Self = Self(0x2000_0000);
    pub const CLIENT_REDIRECT: Self = Self(0x4000_0000);
    pub const SERVER_REDIRECT: Self = Self(0x8000_0000);
    pub const IS_REDIRECT_MASK: Self = Self(0xC000_0000);

    const NAMED: [(Self, &'static str); 9] = [
        (Self::BLOCKED, "blocked"),
        (Self::FORWARD_BACK, "forward_back"),
        (Self::FROM_ADDRESS_BAR, "from_address_bar"),
        (Self::HOME_PAGE, "home_page"),
        (Self::FROM_API, "from_api"),
        (Self::CHAIN_START, "chain_start"),
        (Self::CHAIN_END, "chain_end"),
        (Self::CLIENT_REDIRECT, "client_redirect"),
        (Self::SERVER_REDIRECT, "server_redirect"),
    ];

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// True when every bit of `other` is set
    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when any bit of `other` is set
    pub fn intersects(&self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_redirect(&self) -> bool {
        self.intersects(Self::IS_REDIRECT_MASK)
    }

    /// Names of the known flags that are set
    pub fn names(&self) -> Vec<&'static str> {
        Self::NAMED
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl std::ops::BitOr for TransitionQualifier {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for TransitionQualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "-");
        }
        write!(f, "{}", self.names().join("|"))
    }
}

/// Packed transition code as stored in the visits table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transition(u32);

impl Transition {
    /// Decode a stored value, tolerating the signed 32-bit representation
    pub fn from_raw(raw: i64) -> Self {
        Self((raw & 0xFFFF_FFFF) as u32)
    }

    pub fn code(&self) -> u32 {
        self.0
    }

    /// Value written back to the store, always as a signed 32-bit integer.
    ///
    /// An unsigned source value such as `2684354560` is stored as `-1610612736`;
    /// both decode to the same code.
    pub fn to_raw(&self) -> i64 {
        i64::from(self.0 as i32)
    }

    pub fn core(&self) -> TransitionCore {
        TransitionCore::from_code((self.0 & CORE_MASK) as u8)
    }

    pub fn qualifier(&self) -> TransitionQualifier {
        TransitionQualifier(self.0 & QUALIFIER_MASK)
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let qualifier = self.qualifier();
        if qualifier.is_empty() {
            write!(f, "{}", self.core())
        } else {
            write!(f, "{} [{}]", self.core(), qualifier)
        }
    }
}

/// Where a visit came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisitSourceKind {
    Synced,
    Browsed,
    Extension,
    FirefoxImported,
    IeImported,
    SafariImported,
    Other(i64),
}

impl VisitSourceKind {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => VisitSourceKind::Synced,
            1 => VisitSourceKind::Browsed,
            2 => VisitSourceKind::Extension,
            3 => VisitSourceKind::FirefoxImported,
            4 => VisitSourceKind::IeImported,
            5 => VisitSourceKind::SafariImported,
            other => VisitSourceKind::Other(other),
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            VisitSourceKind::Synced => 0,
            VisitSourceKind::Browsed => 1,
            VisitSourceKind::Extension => 2,
            VisitSourceKind::FirefoxImported => 3,
            VisitSourceKind::IeImported => 4,
            VisitSourceKind::SafariImported => 5,
            VisitSourceKind::Other(code) => *code,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VisitSourceKind::Synced => "synced",
            VisitSourceKind::Browsed => "browsed",
            VisitSourceKind::Extension => "extension",
            VisitSourceKind::FirefoxImported => "firefox_imported",
            VisitSourceKind::IeImported => "ie_imported",
            VisitSourceKind::SafariImported => "safari_imported",
            VisitSourceKind::Other(_) => "other",
        }
    }
}

impl fmt::Display for VisitSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisitSourceKind::Other(code) => write!(f, "other({})", code),
            kind => write!(f, "{}", kind.as_str()),
        }
    }
}

impl Serialize for VisitSourceKind {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_i64(self.code())
    }
}

impl<'de> Deserialize<'de> for VisitSourceKind {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(VisitSourceKind::from_code(i64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_and_qualifier_split() {
        // typed from the address bar, chain start and end
        let t = Transition::from_raw(0x3200_0001);
        assert_eq!(t.core(), TransitionCore::Typed);
        let q = t.qualifier();
        assert!(q.contains(TransitionQualifier::FROM_ADDRESS_BAR));
        assert!(q.contains(TransitionQualifier::CHAIN_START | TransitionQualifier::CHAIN_END));
        assert!(!q.is_redirect());
        assert_eq!(q.names(), vec!["from_address_bar", "chain_start", "chain_end"]);
    }

    #[test]
    fn test_negative_code_decodes_server_redirect() {
        // 0x80000000 | chain end | link, stored as a signed int
        let raw = (0xA000_0000u32 as i32) as i64;
        assert!(raw < 0);
        let t = Transition::from_raw(raw);
        assert_eq!(t.core(), TransitionCore::Link);
        assert!(t.qualifier().contains(TransitionQualifier::SERVER_REDIRECT));
        assert!(t.qualifier().is_redirect());
        assert_eq!(t.to_raw(), raw);
    }

    #[test]
    fn test_unsigned_code_is_stored_signed() {
        let unsigned = Transition::from_raw(2_684_354_560);
        let signed = Transition::from_raw(-1_610_612_736);
        assert_eq!(unsigned, signed);
        assert_eq!(unsigned.to_raw(), -1_610_612_736);
        assert_eq!(Transition::from_raw(unsigned.to_raw()).code(), 0xA000_0000);
    }

    #[test]
    fn test_unknown_core_preserved() {
        let t = Transition::from_raw(0x2A);
        assert_eq!(t.core(), TransitionCore::Other(42));
        assert_eq!(t.core().code(), 42);
        assert_eq!(t.to_string(), "other(42)");
    }

    #[test]
    fn test_transition_display() {
        assert_eq!(Transition::from_raw(8).to_string(), "reload");
        assert_eq!(
            Transition::from_raw(0x0100_0000).to_string(),
            "link [forward_back]"
        );
    }

    #[test]
    fn test_visit_source_kind() {
        assert_eq!(VisitSourceKind::from_code(1), VisitSourceKind::Browsed);
        assert_eq!(VisitSourceKind::from_code(5).as_str(), "safari_imported");
        assert_eq!(VisitSourceKind::from_code(9), VisitSourceKind::Other(9));
        assert_eq!(VisitSourceKind::Other(9).code(), 9);
    }
}
