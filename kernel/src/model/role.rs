//! Role derivation from user records that may carry legacy permission shapes.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString, VariantNames};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    VariantNames,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Role {
    Viewer,
    Requester,
    Approver,
    Admin,
}

impl Role {
    pub fn can_submit(self) -> bool {
        self >= Role::Requester
    }

    pub fn can_review(self) -> bool {
        self >= Role::Approver
    }

    pub fn can_administer(self) -> bool {
        self == Role::Admin
    }

    // 旧バージョンで使われていた名前も受け付ける
    fn from_canonical(name: &str) -> Option<Self> {
        let name = name.trim();
        name.parse().ok().or_else(|| {
            match name.to_ascii_lowercase().as_str() {
                "reviewer" => Some(Role::Approver),
                "user" | "submitter" => Some(Role::Requester),
                "administrator" => Some(Role::Admin),
                _ => None,
            }
        })
    }
}

/// 旧形式の `permissions` オブジェクト
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LegacyPermissions {
    pub can_submit_reservation: bool,
    pub can_create_events: bool,
    pub can_approve_reservations: bool,
    pub can_edit_events: bool,
    pub can_manage_settings: bool,
}

/// Every shape a role may be recorded in, highest precedence first.
#[derive(Debug, Clone, Copy)]
pub enum RoleSource<'a> {
    Canonical(&'a str),
    AdminFlag(bool),
    Permissions(&'a LegacyPermissions),
}

impl RoleSource<'_> {
    fn resolve(self) -> Option<Role> {
        match self {
            RoleSource::Canonical(name) => Role::from_canonical(name),
            RoleSource::AdminFlag(true) => Some(Role::Admin),
            RoleSource::AdminFlag(false) => None,
            RoleSource::Permissions(p) => {
                if p.can_manage_settings {
                    Some(Role::Admin)
                } else if p.can_approve_reservations || p.can_edit_events {
                    Some(Role::Approver)
                } else if p.can_submit_reservation || p.can_create_events {
                    Some(Role::Requester)
                } else {
                    None
                }
            }
        }
    }
}

/// 優先順位の高いものから順に評価し、最初に決まったロールを返す。
/// どれにも当てはまらない場合は閲覧者とする
pub fn derive_role<'a>(sources: impl IntoIterator<Item = RoleSource<'a>>) -> Role {
    sources
        .into_iter()
        .find_map(RoleSource::resolve)
        .unwrap_or(Role::Viewer)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Permissions {
    pub can_submit: bool,
    pub can_review: bool,
    pub can_administer: bool,
}

impl From<Role> for Permissions {
    fn from(role: Role) -> Self {
        Self {
            can_submit: role.can_submit(),
            can_review: role.can_review(),
            can_administer: role.can_administer(),
        }
    }
}
