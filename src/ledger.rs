//! Ledger storage: the store contract, the checks every store runs before
//! mutating a group, and an in-memory store.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::duplicate::find_duplicate;
use crate::error::{LedgerError, LedgerResult};
use crate::schemas::{Expense, ExpenseId, Group, GroupId, Member, MemberId, NewExpense, DEFAULT_CATEGORY};

/// Holds members, groups and their expense ledgers.
///
/// Implementations must serialize `append_expense` per group so that the
/// duplicate check and the append happen as one step.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn create_member(&self, name: String) -> LedgerResult<Member>;

    async fn get_member(&self, id: MemberId) -> LedgerResult<Member>;

    /// Resolves `ids` in the order given. Any unknown id is a `NotFound`.
    async fn get_members(&self, ids: &[MemberId]) -> LedgerResult<Vec<Member>>;

    async fn create_group(&self, name: String, members: Vec<MemberId>) -> LedgerResult<Group>;

    async fn get_group(&self, id: GroupId) -> LedgerResult<Group>;

    /// Validates `expense` against the group, rejects it if it repeats one
    /// already recorded on the same day, and otherwise appends it stamped
    /// with `now`. Returns the updated group.
    async fn append_expense(
        &self,
        group_id: GroupId,
        expense: NewExpense,
        now: DateTime<Utc>,
    ) -> LedgerResult<Group>;
}

pub fn new_member(name: String, now: DateTime<Utc>) -> LedgerResult<Member> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LedgerError::InvalidMember("name must not be empty".to_string()));
    }
    Ok(Member {
        id: MemberId::new(),
        name: name.to_string(),
        created_at: now,
    })
}

/// Builds an empty group. Repeated members are kept once, first occurrence wins.
pub fn new_group(name: String, members: Vec<MemberId>, now: DateTime<Utc>) -> LedgerResult<Group> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LedgerError::InvalidGroup("name must not be empty".to_string()));
    }
    let mut unique = Vec::with_capacity(members.len());
    for member in members {
        if !unique.contains(&member) {
            unique.push(member);
        }
    }
    Ok(Group {
        id: GroupId::new(),
        name: name.to_string(),
        members: unique,
        expenses: Vec::new(),
        created_at: now,
    })
}

/// Turns a submitted expense into one that may be appended to `group`.
///
/// Nothing is mutated here; a store appends the result only on `Ok`.
pub fn admit_expense(group: &Group, expense: NewExpense, now: DateTime<Utc>) -> LedgerResult<Expense> {
    let expense = validate_expense(group, expense, now)?;
    if let Some(existing) = find_duplicate(&expense, &group.expenses) {
        return Err(LedgerError::DuplicateExpense(format!(
            "'{}' for {} paid by {} was already recorded today as {}",
            expense.description, expense.amount, expense.paid_by, existing.id
        )));
    }
    Ok(expense)
}

fn validate_expense(group: &Group, expense: NewExpense, now: DateTime<Utc>) -> LedgerResult<Expense> {
    let description = expense.description.trim();
    if description.is_empty() {
        return Err(LedgerError::invalid_expense("description must not be empty"));
    }
    if !expense.amount.is_finite() || expense.amount <= 0.0 {
        return Err(LedgerError::invalid_expense(format!(
            "amount must be a positive number, got {}",
            expense.amount
        )));
    }
    if expense.split_between.is_empty() {
        return Err(LedgerError::invalid_expense("must be split between at least one member"));
    }
    if !group.has_member(expense.paid_by) {
        return Err(LedgerError::invalid_expense(format!(
            "payer {} is not a member of the group",
            expense.paid_by
        )));
    }
    for (idx, member) in expense.split_between.iter().enumerate() {
        if !group.has_member(*member) {
            return Err(LedgerError::invalid_expense(format!(
                "{member} is not a member of the group"
            )));
        }
        if expense.split_between[..idx].contains(member) {
            return Err(LedgerError::invalid_expense(format!("{member} is listed twice")));
        }
    }
    let category = expense
        .category
        .as_deref()
        .map(str::trim)
        .filter(|category| !category.is_empty())
        .unwrap_or(DEFAULT_CATEGORY);

    Ok(Expense {
        id: ExpenseId::new(),
        description: description.to_string(),
        amount: expense.amount,
        category: category.to_string(),
        paid_by: expense.paid_by,
        split_between: expense.split_between,
        created_at: now,
    })
}

pub(crate) fn log_rejection(group_id: GroupId, err: &LedgerError) {
    match err {
        LedgerError::DuplicateExpense(reason) => warn!(%group_id, %reason, "duplicate expense rejected"),
        LedgerError::InvalidExpense(reason) => info!(%group_id, %reason, "invalid expense rejected"),
        _ => {}
    }
}

/// In-process store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    members: RwLock<HashMap<MemberId, Member>>,
    groups: RwLock<HashMap<GroupId, Group>>,
}

fn poisoned<T>(_: T) -> LedgerError {
    LedgerError::Storage("lock poisoned".to_string())
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn create_member(&self, name: String) -> LedgerResult<Member> {
        let member = new_member(name, Utc::now())?;
        self.members
            .write()
            .map_err(poisoned)?
            .insert(member.id, member.clone());
        info!(member_id = %member.id, "member created");
        Ok(member)
    }

    async fn get_member(&self, id: MemberId) -> LedgerResult<Member> {
        self.members
            .read()
            .map_err(poisoned)?
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("member", id))
    }

    async fn get_members(&self, ids: &[MemberId]) -> LedgerResult<Vec<Member>> {
        let members = self.members.read().map_err(poisoned)?;
        ids.iter()
            .map(|id| {
                members
                    .get(id)
                    .cloned()
                    .ok_or_else(|| LedgerError::not_found("member", id))
            })
            .collect()
    }

    async fn create_group(&self, name: String, members: Vec<MemberId>) -> LedgerResult<Group> {
        let group = new_group(name, members, Utc::now())?;
        {
            let known = self.members.read().map_err(poisoned)?;
            if let Some(unknown) = group.members.iter().find(|id| !known.contains_key(*id)) {
                return Err(LedgerError::not_found("member", unknown));
            }
        }
        self.groups
            .write()
            .map_err(poisoned)?
            .insert(group.id, group.clone());
        info!(group_id = %group.id, members = group.members.len(), "group created");
        Ok(group)
    }

    async fn get_group(&self, id: GroupId) -> LedgerResult<Group> {
        self.groups
            .read()
            .map_err(poisoned)?
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("group", id))
    }

    async fn append_expense(
        &self,
        group_id: GroupId,
        expense: NewExpense,
        now: DateTime<Utc>,
    ) -> LedgerResult<Group> {
        // The write guard spans the duplicate check and the push.
        let mut groups = self.groups.write().map_err(poisoned)?;
        let group = groups
            .get_mut(&group_id)
            .ok_or_else(|| LedgerError::not_found("group", group_id))?;
        let expense = admit_expense(group, expense, now).inspect_err(|err| log_rejection(group_id, err))?;
        info!(%group_id, expense_id = %expense.id, amount = expense.amount, "expense appended");
        group.expenses.push(expense);
        Ok(group.clone())
    }
}
