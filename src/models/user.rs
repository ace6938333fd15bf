use rorm::fields::types::{BackRef, ForeignModel};
use rorm::{field, Model, Patch};
use uuid::Uuid;

use crate::models::ChatMember;

/// A user account
#[derive(Model)]
pub struct User {
    /// The primary key of a user.
    ///
    /// This will be a uuid.
    #[rorm(primary_key)]
    pub uuid: Uuid,

    /// The email address the user registered with
    #[rorm(max_length = 255, unique)]
    pub email: String,

    /// The username of the user
    #[rorm(max_length = 255, unique)]
    pub username: String,

    /// The first name that is displayed for this user
    #[rorm(max_length = 255)]
    pub first_name: Option<String>,

    /// The last name that is displayed for this user
    #[rorm(max_length = 255)]
    pub last_name: Option<String>,

    /// The password hash of the user.
    #[rorm(max_length = 1024)]
    pub password_hash: String,

    /// Whether the account is active.
    ///
    /// Accounts are never hard-deleted, they are deactivated.
    pub is_active: bool,

    /// The last time the user has logged in
    pub last_login: Option<chrono::NaiveDateTime>,

    /// The roles assigned to this user
    pub roles: BackRef<field!(UserRole::F.user)>,

    /// The chat memberships of this user
    pub chat_memberships: BackRef<field!(ChatMember::F.member)>,
}

#[derive(Patch)]
#[rorm(model = "User")]
pub(crate) struct UserInsert {
    pub(crate) uuid: Uuid,
    pub(crate) email: String,
    pub(crate) username: String,
    pub(crate) first_name: Option<String>,
    pub(crate) last_name: Option<String>,
    pub(crate) password_hash: String,
    pub(crate) is_active: bool,
    pub(crate) last_login: Option<chrono::NaiveDateTime>,
}

/// A role that can be assigned to users
#[derive(Model)]
pub struct Role {
    /// The primary key of a role
    #[rorm(primary_key)]
    pub uuid: Uuid,

    /// The unique name of the role.
    ///
    /// Role names end up in the token claims, so they should stay short.
    #[rorm(max_length = 255, unique)]
    pub name: String,

    /// A human readable description of the role
    #[rorm(max_length = 1024)]
    pub description: Option<String>,

    /// The users this role is assigned to
    pub users: BackRef<field!(UserRole::F.role)>,
}

#[derive(Patch)]
#[rorm(model = "Role")]
pub(crate) struct RoleInsert {
    pub(crate) uuid: Uuid,
    pub(crate) name: String,
    pub(crate) description: Option<String>,
}

/// The m2m relation between users and roles
#[derive(Model)]
pub struct UserRole {
    /// Primary key of a role assignment
    #[rorm(primary_key)]
    pub uuid: Uuid,

    /// The user the role is assigned to
    #[rorm(on_delete = "Cascade", on_update = "Cascade")]
    pub user: ForeignModel<User>,

    /// The assigned role
    #[rorm(on_delete = "Cascade", on_update = "Cascade")]
    pub role: ForeignModel<Role>,
}

#[derive(Patch)]
#[rorm(model = "UserRole")]
pub(crate) struct UserRoleInsert {
    pub(crate) uuid: Uuid,
    pub(crate) user: ForeignModel<User>,
    pub(crate) role: ForeignModel<Role>,
}
