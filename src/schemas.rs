use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} id: {value:?}")]
pub struct InvalidId {
    pub kind: &'static str,
    pub value: String,
}

// Ids travel as 24-char hex strings, both in JSON (where they are also used
// as map keys) and in the stored documents.
macro_rules! object_id_newtype {
    ($t:ident, $kind:literal) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(into = "String", try_from = "String")]
        pub struct $t(ObjectId);

        impl $t {
            pub fn new() -> Self {
                Self(ObjectId::new())
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0.to_hex())
            }
        }

        impl FromStr for $t {
            type Err = InvalidId;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                ObjectId::parse_str(s).map(Self).map_err(|_| InvalidId {
                    kind: $kind,
                    value: s.to_string(),
                })
            }
        }

        impl TryFrom<String> for $t {
            type Error = InvalidId;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$t> for String {
            fn from(value: $t) -> Self {
                value.to_string()
            }
        }
    };
}

object_id_newtype!(MemberId, "member");
object_id_newtype!(GroupId, "group");
object_id_newtype!(ExpenseId, "expense");

pub const DEFAULT_CATEGORY: &str = "general";

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: MemberId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub members: Vec<MemberId>,
    pub expenses: Vec<Expense>,
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub fn has_member(&self, member: MemberId) -> bool {
        self.members.contains(&member)
    }
}

/// A recorded payment. Never changed once it is part of a group's ledger.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: ExpenseId,
    pub description: String,
    pub amount: f64,
    pub category: String,
    pub paid_by: MemberId,
    pub split_between: Vec<MemberId>,
    pub created_at: DateTime<Utc>,
}

/// An expense as submitted, before validation and timestamping.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewExpense {
    pub description: String,
    pub amount: f64,
    #[serde(default)]
    pub category: Option<String>,
    pub paid_by: MemberId,
    pub split_between: Vec<MemberId>,
}
