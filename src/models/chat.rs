use rorm::fields::types::{BackRef, ForeignModel};
use rorm::{field, Model, Patch};
use uuid::Uuid;

use crate::models::User;

/// This represents a conversation in the database
#[derive(Model)]
pub struct Chat {
    /// The primary key of a chat
    #[rorm(primary_key)]
    pub uuid: Uuid,

    /// The title of the chat.
    ///
    /// Only set for group chats, direct chats are rendered with the
    /// other member's name.
    #[rorm(max_length = 255)]
    pub title: Option<String>,

    /// Whether this chat is a group chat.
    ///
    /// Derived from the member count at creation time (more than two
    /// members) and immutable afterwards.
    pub is_group: bool,

    /// The lifecycle state of the chat.
    ///
    /// A chat is retired when its last active member leaves. Retired
    /// chats are invisible to every read path.
    pub retired: bool,

    /// The point in time the chat was created
    #[rorm(auto_create_time)]
    pub created_at: chrono::NaiveDateTime,

    /// A backref to the members of this chat
    pub members: BackRef<field!(ChatMember::F.chat)>,
}

#[derive(Patch)]
#[rorm(model = "Chat")]
pub(crate) struct ChatInsert {
    pub(crate) uuid: Uuid,
    pub(crate) title: Option<String>,
    pub(crate) is_group: bool,
    pub(crate) retired: bool,
}

/// The member <-> chat relation.
///
/// A (chat, user) pair may have multiple rows over time: leaving ends a
/// membership, rejoining creates a new row. At most one row per pair may
/// be active at any time.
#[derive(Model)]
pub struct ChatMember {
    /// The primary key of a chat membership
    #[rorm(primary_key)]
    pub uuid: Uuid,

    /// The chat this membership belongs to
    #[rorm(on_delete = "Cascade", on_update = "Cascade")]
    pub chat: ForeignModel<Chat>,

    /// The user holding the membership
    #[rorm(on_delete = "Cascade", on_update = "Cascade")]
    pub member: ForeignModel<User>,

    /// Whether the membership is currently active.
    ///
    /// Kept alongside [Self::left_at] as the queryable state, while the
    /// timestamp records when the membership ended.
    pub active: bool,

    /// When the account joined the chat
    #[rorm(auto_create_time)]
    pub joined_at: chrono::NaiveDateTime,

    /// When the account left the chat, if it has
    pub left_at: Option<chrono::NaiveDateTime>,
}

#[derive(Patch)]
#[rorm(model = "ChatMember")]
pub(crate) struct ChatMemberInsert {
    pub(crate) uuid: Uuid,
    pub(crate) chat: ForeignModel<Chat>,
    pub(crate) member: ForeignModel<User>,
    pub(crate) active: bool,
    pub(crate) left_at: Option<chrono::NaiveDateTime>,
}
