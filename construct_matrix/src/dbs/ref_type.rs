use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use strum::{EnumIter, IntoEnumIterator, IntoStaticStr};

/// Kinds of edge in the `event_refs` column. The discriminant is stored in
/// the high byte of the referer half of each key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum RefType {
    /// The referer lists the target in `prev_events`
    Next = 0,
    /// The referer lists the target in `auth_events`
    NextAuth = 1,
    /// The referer replaces the target in the room state
    NextState = 2,
    /// The target is the state the referer replaced
    PrevState = 3,
    /// The referer is a read receipt for the target
    #[strum(serialize = "M_RECEIPT__M_READ")]
    MReceiptMRead = 4,
    /// The referer relates to, or replies to, the target
    MRelates = 5,
    /// The referer redacts the target
    MRoomRedaction = 6,
}

impl RefType {
    pub fn name(self) -> &'static str {
        self.into()
    }

    pub fn flag(self) -> RefTypes {
        RefTypes::from_bits_truncate(1 << self as u8)
    }
}

impl TryFrom<u8> for RefType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        RefType::iter().find(|t| *t as u8 == value).ok_or(value)
    }
}

impl std::fmt::Display for RefType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    /// A selection of [`RefType`]s
    #[derive(Serialize,Deserialize)]
    pub struct RefTypes : u8
    {
        const NEXT = 1 << RefType::Next as u8;
        const NEXT_AUTH = 1 << RefType::NextAuth as u8;
        const NEXT_STATE = 1 << RefType::NextState as u8;
        const PREV_STATE = 1 << RefType::PrevState as u8;
        const M_RECEIPT__M_READ = 1 << RefType::MReceiptMRead as u8;
        const M_RELATES = 1 << RefType::MRelates as u8;
        const M_ROOM_REDACTION = 1 << RefType::MRoomRedaction as u8;
    }
}

impl RefTypes {
    pub fn has(self, kind: RefType) -> bool {
        self.contains(kind.flag())
    }
}
