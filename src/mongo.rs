use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{bson::doc, Client, Collection, Database};
use tokio::sync::Mutex as AsyncMutex;
use tracing::info;

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::{admit_expense, log_rejection, new_group, new_member, LedgerStore};
use crate::schemas::{Group, GroupId, Member, MemberId, NewExpense};

const MEMBERS: &str = "Members";
const GROUPS: &str = "Groups";

/// MongoDB-backed store. Members and groups live in their own collections and
/// a group document embeds its expenses.
///
/// Appends to one group are serialized through a per-group lock, which only
/// holds within this process.
pub struct MongoLedger {
    members: Collection<Member>,
    groups: Collection<Group>,
    append_locks: GroupLocks,
}

/// One async lock per group that has been appended to. Entries are only made
/// for groups that exist, so the map is bounded by the number of groups.
#[derive(Debug, Default)]
struct GroupLocks {
    locks: Mutex<HashMap<GroupId, Arc<AsyncMutex<()>>>>,
}

impl GroupLocks {
    fn for_group(&self, group_id: GroupId) -> LedgerResult<Arc<AsyncMutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| LedgerError::Storage("lock poisoned".to_string()))?;
        Ok(locks.entry(group_id).or_default().clone())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or_default()
    }
}

impl MongoLedger {
    pub async fn connect(uri: &str, database: &str) -> LedgerResult<Self> {
        let client = Client::with_uri_str(uri).await?;
        info!(database, "using MongoDB ledger");
        Ok(Self::new(&client.database(database)))
    }

    pub fn new(database: &Database) -> Self {
        Self {
            members: database.collection(MEMBERS),
            groups: database.collection(GROUPS),
            append_locks: GroupLocks::default(),
        }
    }
}

#[async_trait]
impl LedgerStore for MongoLedger {
    async fn create_member(&self, name: String) -> LedgerResult<Member> {
        let member = new_member(name, Utc::now())?;
        self.members.insert_one(&member, None).await?;
        info!(member_id = %member.id, "member created");
        Ok(member)
    }

    async fn get_member(&self, id: MemberId) -> LedgerResult<Member> {
        self.members
            .find_one(doc! { "id": id.to_string() }, None)
            .await?
            .ok_or_else(|| LedgerError::not_found("member", id))
    }

    async fn get_members(&self, ids: &[MemberId]) -> LedgerResult<Vec<Member>> {
        let wanted: Vec<String> = ids.iter().map(ToString::to_string).collect();
        let found: HashMap<MemberId, Member> = self
            .members
            .find(doc! { "id": { "$in": wanted } }, None)
            .await?
            .map_ok(|member| (member.id, member))
            .try_collect()
            .await?;
        ids.iter()
            .map(|id| {
                found
                    .get(id)
                    .cloned()
                    .ok_or_else(|| LedgerError::not_found("member", id))
            })
            .collect()
    }

    async fn create_group(&self, name: String, members: Vec<MemberId>) -> LedgerResult<Group> {
        let group = new_group(name, members, Utc::now())?;
        self.get_members(&group.members).await?;
        self.groups.insert_one(&group, None).await?;
        info!(group_id = %group.id, members = group.members.len(), "group created");
        Ok(group)
    }

    async fn get_group(&self, id: GroupId) -> LedgerResult<Group> {
        self.groups
            .find_one(doc! { "id": id.to_string() }, None)
            .await?
            .ok_or_else(|| LedgerError::not_found("group", id))
    }

    async fn append_expense(
        &self,
        group_id: GroupId,
        expense: NewExpense,
        now: DateTime<Utc>,
    ) -> LedgerResult<Group> {
        // Unknown groups are turned away before they get a lock entry.
        self.get_group(group_id).await?;
        let lock = self.append_locks.for_group(group_id)?;
        let _guard = lock.lock().await;

        let mut group = self.get_group(group_id).await?;
        let expense = admit_expense(&group, expense, now).inspect_err(|err| log_rejection(group_id, err))?;
        let result = self
            .groups
            .update_one(
                doc! { "id": group_id.to_string() },
                doc! { "$push": { "expenses": bson::to_bson(&expense)? } },
                None,
            )
            .await?;
        if result.matched_count == 0 {
            return Err(LedgerError::not_found("group", group_id));
        }
        info!(%group_id, expense_id = %expense.id, amount = expense.amount, "expense appended");
        group.expenses.push(expense);
        Ok(group)
    }
}
