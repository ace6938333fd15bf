//! The chat membership engine.
//!
//! This is the sole place where the group chat rules live: who may see a
//! chat, who may change it, and what happens when memberships end. All
//! mutating operations run their read-then-write steps inside a single
//! transaction so concurrent callers can not interleave on the same chat.

use std::fmt::{Display, Formatter};

use async_trait::async_trait;
use chrono::Utc;
use rorm::fields::types::ForeignModelByField;
use rorm::{and, insert, query, update, Database, FieldAccess, Model};
use uuid::Uuid;

use crate::models::{Chat, ChatInsert, ChatMember, ChatMemberInsert, User};

/// A member row of a chat, resolved to its user
#[derive(Clone, Debug)]
pub struct ChatMemberData {
    /// The uuid of the user holding the membership
    pub user: Uuid,
    /// The username of that user
    pub username: String,
    /// When the membership started
    pub joined_at: chrono::NaiveDateTime,
    /// When the membership ended, if it has
    pub left_at: Option<chrono::NaiveDateTime>,
}

impl ChatMemberData {
    /// Whether this membership is currently active
    pub fn is_active(&self) -> bool {
        self.left_at.is_none()
    }
}

/// A fully materialized chat, including all current and past members
#[derive(Clone, Debug)]
pub struct ChatData {
    /// The uuid of the chat
    pub uuid: Uuid,
    /// The title of the chat, only set for group chats
    pub title: Option<String>,
    /// Whether the chat is a group chat
    pub is_group: bool,
    /// When the chat was created
    pub created_at: chrono::NaiveDateTime,
    /// All membership rows of the chat
    pub members: Vec<ChatMemberData>,
}

/// The typed outcomes of the membership engine
#[derive(Debug)]
pub enum ChatEngineError {
    /// The chat does not exist (or is retired)
    ChatNotFound,
    /// The acting or targeted user holds no active membership in the chat
    NotChatMember,
    /// The operation is only allowed on group chats
    NotGroupChat,
    /// A user to be added already holds an active membership
    AlreadyMember,
    /// The targeted member is the last active one and can not be removed
    LastMember,
    /// A referenced user does not exist
    UserNotFound,
    /// All errors that are thrown by the database
    Database(rorm::Error),
}

impl Display for ChatEngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatEngineError::ChatNotFound => write!(f, "Chat not found"),
            ChatEngineError::NotChatMember => write!(f, "Not a member of this chat"),
            ChatEngineError::NotGroupChat => write!(f, "Not a group chat"),
            ChatEngineError::AlreadyMember => write!(f, "User is already a member"),
            ChatEngineError::LastMember => write!(f, "Cannot remove the last member"),
            ChatEngineError::UserNotFound => write!(f, "User not found"),
            ChatEngineError::Database(_) => write!(f, "Database error occurred"),
        }
    }
}

impl From<rorm::Error> for ChatEngineError {
    fn from(value: rorm::Error) -> Self {
        Self::Database(value)
    }
}

/// The operations of the membership engine.
///
/// Handlers depend on this trait instead of the concrete database backed
/// implementation.
#[async_trait]
pub trait ChatEngine: Send + Sync {
    /// Create a new chat with the given members.
    ///
    /// The creator is added to the member set if absent and duplicates
    /// are ignored. The chat becomes a group chat if more than two
    /// members remain.
    async fn create_chat(
        &self,
        creator: Uuid,
        title: Option<String>,
        member_ids: &[Uuid],
    ) -> Result<ChatData, ChatEngineError>;

    /// Retrieve a single chat the caller is an active member of
    async fn get_chat(&self, chat: Uuid, caller: Uuid) -> Result<ChatData, ChatEngineError>;

    /// Retrieve all chats the caller is an active member of
    async fn get_user_chats(&self, caller: Uuid) -> Result<Vec<ChatData>, ChatEngineError>;

    /// Set a new title on a group chat
    async fn update_chat_title(
        &self,
        chat: Uuid,
        caller: Uuid,
        title: String,
    ) -> Result<ChatData, ChatEngineError>;

    /// End the caller's membership.
    ///
    /// If the caller is the last active member, the chat is retired in
    /// the same transaction.
    async fn leave_chat(&self, chat: Uuid, caller: Uuid) -> Result<(), ChatEngineError>;

    /// Add new members to a group chat. All-or-nothing: a single
    /// conflicting or unknown user rejects the whole batch.
    async fn add_members(
        &self,
        chat: Uuid,
        caller: Uuid,
        new_member_ids: &[Uuid],
    ) -> Result<ChatData, ChatEngineError>;

    /// End the membership of another user.
    ///
    /// Unlike [ChatEngine::leave_chat] this refuses to touch the last
    /// active member.
    async fn remove_member(
        &self,
        chat: Uuid,
        caller: Uuid,
        target: Uuid,
    ) -> Result<(), ChatEngineError>;
}

/// The membership engine backed by the relational store
pub struct ChatService {
    db: Database,
}

impl ChatService {
    /// Create a new instance of the engine on top of the given database
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Load a chat with all its membership rows resolved to usernames.
    ///
    /// Retired chats are treated as absent.
    async fn load_chat(&self, chat: Uuid) -> Result<Option<ChatData>, rorm::Error> {
        let Some(row) = query!(&self.db, Chat)
            .condition(and!(
                Chat::F.uuid.equals(chat),
                Chat::F.retired.equals(false)
            ))
            .optional()
            .await?
        else {
            return Ok(None);
        };

        let members = query!(
            &self.db,
            (
                ChatMember::F.member.uuid,
                ChatMember::F.member.username,
                ChatMember::F.joined_at,
                ChatMember::F.left_at,
            )
        )
        .condition(ChatMember::F.chat.equals(chat))
        .all()
        .await?;

        Ok(Some(ChatData {
            uuid: row.uuid,
            title: row.title,
            is_group: row.is_group,
            created_at: row.created_at,
            members: members
                .into_iter()
                .map(|(user, username, joined_at, left_at)| ChatMemberData {
                    user,
                    username,
                    joined_at,
                    left_at,
                })
                .collect(),
        }))
    }
}

#[async_trait]
impl ChatEngine for ChatService {
    async fn create_chat(
        &self,
        creator: Uuid,
        title: Option<String>,
        member_ids: &[Uuid],
    ) -> Result<ChatData, ChatEngineError> {
        let members = assemble_member_set(creator, member_ids);

        let mut tx = self.db.start_transaction().await?;

        for member in &members {
            query!(&mut tx, (User::F.uuid,))
                .condition(User::F.uuid.equals(*member))
                .optional()
                .await?
                .ok_or(ChatEngineError::UserNotFound)?;
        }

        let chat_uuid = Uuid::new_v4();
        insert!(&mut tx, ChatInsert)
            .single(&ChatInsert {
                uuid: chat_uuid,
                title,
                is_group: derives_group(members.len()),
                retired: false,
            })
            .await?;

        for member in &members {
            insert!(&mut tx, ChatMemberInsert)
                .single(&ChatMemberInsert {
                    uuid: Uuid::new_v4(),
                    chat: ForeignModelByField::Key(chat_uuid),
                    member: ForeignModelByField::Key(*member),
                    active: true,
                    left_at: None,
                })
                .await?;
        }

        tx.commit().await?;

        self.load_chat(chat_uuid)
            .await?
            .ok_or(ChatEngineError::ChatNotFound)
    }

    async fn get_chat(&self, chat: Uuid, caller: Uuid) -> Result<ChatData, ChatEngineError> {
        let chat = self
            .load_chat(chat)
            .await?
            .ok_or(ChatEngineError::ChatNotFound)?;

        if !chat
            .members
            .iter()
            .any(|m| m.user == caller && m.is_active())
        {
            return Err(ChatEngineError::NotChatMember);
        }

        Ok(chat)
    }

    async fn get_user_chats(&self, caller: Uuid) -> Result<Vec<ChatData>, ChatEngineError> {
        let chat_uuids = query!(&self.db, (ChatMember::F.chat.uuid,))
            .condition(and!(
                ChatMember::F.member.equals(caller),
                ChatMember::F.active.equals(true)
            ))
            .all()
            .await?;

        let mut chats = Vec::with_capacity(chat_uuids.len());
        for (uuid,) in chat_uuids {
            // Retired chats drop out here
            if let Some(chat) = self.load_chat(uuid).await? {
                chats.push(chat);
            }
        }

        Ok(chats)
    }

    async fn update_chat_title(
        &self,
        chat: Uuid,
        caller: Uuid,
        title: String,
    ) -> Result<ChatData, ChatEngineError> {
        let mut tx = self.db.start_transaction().await?;

        // Lock the chat row, concurrent mutations on the same chat
        // serialize here
        update!(&mut tx, Chat)
            .set(Chat::F.retired, false)
            .condition(and!(
                Chat::F.uuid.equals(chat),
                Chat::F.retired.equals(false)
            ))
            .await?;

        let (is_group,) = query!(&mut tx, (Chat::F.is_group,))
            .condition(and!(
                Chat::F.uuid.equals(chat),
                Chat::F.retired.equals(false)
            ))
            .optional()
            .await?
            .ok_or(ChatEngineError::ChatNotFound)?;

        query!(&mut tx, (ChatMember::F.uuid,))
            .condition(and!(
                ChatMember::F.chat.equals(chat),
                ChatMember::F.member.equals(caller),
                ChatMember::F.active.equals(true)
            ))
            .optional()
            .await?
            .ok_or(ChatEngineError::NotChatMember)?;

        if !is_group {
            return Err(ChatEngineError::NotGroupChat);
        }

        update!(&mut tx, Chat)
            .set(Chat::F.title, Some(title))
            .condition(Chat::F.uuid.equals(chat))
            .await?;

        tx.commit().await?;

        self.load_chat(chat)
            .await?
            .ok_or(ChatEngineError::ChatNotFound)
    }

    async fn leave_chat(&self, chat: Uuid, caller: Uuid) -> Result<(), ChatEngineError> {
        let mut tx = self.db.start_transaction().await?;

        // Lock the chat row, concurrent mutations on the same chat
        // serialize here. Without it two concurrent leaves of the last
        // two members would both count two active rows and neither
        // would retire the chat.
        update!(&mut tx, Chat)
            .set(Chat::F.retired, false)
            .condition(and!(
                Chat::F.uuid.equals(chat),
                Chat::F.retired.equals(false)
            ))
            .await?;

        query!(&mut tx, (Chat::F.uuid,))
            .condition(and!(
                Chat::F.uuid.equals(chat),
                Chat::F.retired.equals(false)
            ))
            .optional()
            .await?
            .ok_or(ChatEngineError::ChatNotFound)?;

        let (member_row,) = query!(&mut tx, (ChatMember::F.uuid,))
            .condition(and!(
                ChatMember::F.chat.equals(chat),
                ChatMember::F.member.equals(caller),
                ChatMember::F.active.equals(true)
            ))
            .optional()
            .await?
            .ok_or(ChatEngineError::NotChatMember)?;

        let (active_members,) = query!(&mut tx, (ChatMember::F.uuid.count(),))
            .condition(and!(
                ChatMember::F.chat.equals(chat),
                ChatMember::F.active.equals(true)
            ))
            .one()
            .await?;

        if active_members == 1 {
            // The leaver is the last active member, retire the chat
            update!(&mut tx, Chat)
                .set(Chat::F.retired, true)
                .condition(Chat::F.uuid.equals(chat))
                .await?;
        }

        update!(&mut tx, ChatMember)
            .set(ChatMember::F.active, false)
            .set(ChatMember::F.left_at, Some(Utc::now().naive_utc()))
            .condition(ChatMember::F.uuid.equals(member_row))
            .await?;

        tx.commit().await?;

        Ok(())
    }

    async fn add_members(
        &self,
        chat: Uuid,
        caller: Uuid,
        new_member_ids: &[Uuid],
    ) -> Result<ChatData, ChatEngineError> {
        let additions = dedupe(new_member_ids);

        let mut tx = self.db.start_transaction().await?;

        // Lock the chat row, concurrent mutations on the same chat
        // serialize here. Without it two concurrent additions of the
        // same user would both pass the conflict check and insert
        // duplicate active rows.
        update!(&mut tx, Chat)
            .set(Chat::F.retired, false)
            .condition(and!(
                Chat::F.uuid.equals(chat),
                Chat::F.retired.equals(false)
            ))
            .await?;

        let (is_group,) = query!(&mut tx, (Chat::F.is_group,))
            .condition(and!(
                Chat::F.uuid.equals(chat),
                Chat::F.retired.equals(false)
            ))
            .optional()
            .await?
            .ok_or(ChatEngineError::ChatNotFound)?;

        query!(&mut tx, (ChatMember::F.uuid,))
            .condition(and!(
                ChatMember::F.chat.equals(chat),
                ChatMember::F.member.equals(caller),
                ChatMember::F.active.equals(true)
            ))
            .optional()
            .await?
            .ok_or(ChatEngineError::NotChatMember)?;

        if !is_group {
            return Err(ChatEngineError::NotGroupChat);
        }

        for member in &additions {
            query!(&mut tx, (User::F.uuid,))
                .condition(User::F.uuid.equals(*member))
                .optional()
                .await?
                .ok_or(ChatEngineError::UserNotFound)?;
        }

        let active: Vec<Uuid> = query!(&mut tx, (ChatMember::F.member.uuid,))
            .condition(and!(
                ChatMember::F.chat.equals(chat),
                ChatMember::F.active.equals(true)
            ))
            .all()
            .await?
            .into_iter()
            .map(|(uuid,)| uuid)
            .collect();

        if batch_conflicts(&active, &additions) {
            return Err(ChatEngineError::AlreadyMember);
        }

        for member in &additions {
            insert!(&mut tx, ChatMemberInsert)
                .single(&ChatMemberInsert {
                    uuid: Uuid::new_v4(),
                    chat: ForeignModelByField::Key(chat),
                    member: ForeignModelByField::Key(*member),
                    active: true,
                    left_at: None,
                })
                .await?;
        }

        tx.commit().await?;

        self.load_chat(chat)
            .await?
            .ok_or(ChatEngineError::ChatNotFound)
    }

    async fn remove_member(
        &self,
        chat: Uuid,
        caller: Uuid,
        target: Uuid,
    ) -> Result<(), ChatEngineError> {
        let mut tx = self.db.start_transaction().await?;

        // Lock the chat row, concurrent mutations on the same chat
        // serialize here
        update!(&mut tx, Chat)
            .set(Chat::F.retired, false)
            .condition(and!(
                Chat::F.uuid.equals(chat),
                Chat::F.retired.equals(false)
            ))
            .await?;

        let (is_group,) = query!(&mut tx, (Chat::F.is_group,))
            .condition(and!(
                Chat::F.uuid.equals(chat),
                Chat::F.retired.equals(false)
            ))
            .optional()
            .await?
            .ok_or(ChatEngineError::ChatNotFound)?;

        query!(&mut tx, (ChatMember::F.uuid,))
            .condition(and!(
                ChatMember::F.chat.equals(chat),
                ChatMember::F.member.equals(caller),
                ChatMember::F.active.equals(true)
            ))
            .optional()
            .await?
            .ok_or(ChatEngineError::NotChatMember)?;

        if !is_group {
            return Err(ChatEngineError::NotGroupChat);
        }

        let (member_row,) = query!(&mut tx, (ChatMember::F.uuid,))
            .condition(and!(
                ChatMember::F.chat.equals(chat),
                ChatMember::F.member.equals(target),
                ChatMember::F.active.equals(true)
            ))
            .optional()
            .await?
            .ok_or(ChatEngineError::NotChatMember)?;

        let (active_members,) = query!(&mut tx, (ChatMember::F.uuid.count(),))
            .condition(and!(
                ChatMember::F.chat.equals(chat),
                ChatMember::F.active.equals(true)
            ))
            .one()
            .await?;

        // Removal never retires a chat. Leaving does.
        if active_members == 1 {
            return Err(ChatEngineError::LastMember);
        }

        update!(&mut tx, ChatMember)
            .set(ChatMember::F.active, false)
            .set(ChatMember::F.left_at, Some(Utc::now().naive_utc()))
            .condition(ChatMember::F.uuid.equals(member_row))
            .await?;

        tx.commit().await?;

        Ok(())
    }
}

/// Whether a chat with the given member count is a group chat
pub(crate) fn derives_group(member_count: usize) -> bool {
    member_count > 2
}

/// Deduplicate a list of user ids while preserving order
pub(crate) fn dedupe(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = Vec::with_capacity(ids.len());
    for id in ids {
        if !seen.contains(id) {
            seen.push(*id);
        }
    }
    seen
}

/// Build the member set of a new chat: deduplicated, with the creator
/// added if absent
pub(crate) fn assemble_member_set(creator: Uuid, ids: &[Uuid]) -> Vec<Uuid> {
    let mut members = dedupe(ids);
    if !members.contains(&creator) {
        members.push(creator);
    }
    members
}

/// Whether any of the additions already holds an active membership
pub(crate) fn batch_conflicts(active: &[Uuid], additions: &[Uuid]) -> bool {
    additions.iter().any(|a| active.contains(a))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_members_make_a_direct_chat() {
        assert!(!derives_group(1));
        assert!(!derives_group(2));
        assert!(derives_group(3));
        assert!(derives_group(17));
    }

    #[test]
    fn creator_is_added_once() {
        let creator = Uuid::new_v4();
        let other = Uuid::new_v4();

        let members = assemble_member_set(creator, &[other]);
        assert_eq!(members, vec![other, creator]);

        let members = assemble_member_set(creator, &[other, creator, other]);
        assert_eq!(members, vec![other, creator]);
    }

    #[test]
    fn duplicate_ids_collapse() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert_eq!(dedupe(&[a, b, a, a, b]), vec![a, b]);
        assert!(dedupe(&[]).is_empty());
    }

    #[test]
    fn single_conflict_rejects_the_batch() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        assert!(batch_conflicts(&[a, b], &[c, b]));
        assert!(!batch_conflicts(&[a, b], &[c]));
        assert!(!batch_conflicts(&[], &[c]));
        assert!(!batch_conflicts(&[a], &[]));
    }
}
