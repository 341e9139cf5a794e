use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{LedgerError, LedgerResult};
use crate::schemas::{Expense, Group, Member, MemberId};

/// debtor -> creditor -> amount owed
pub type Balances = BTreeMap<MemberId, BTreeMap<MemberId, f64>>;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupBalances {
    pub group_name: String,
    pub members: Vec<Member>,
    pub balances: Balances,
}

/// Folds the ledger, in order, into who owes whom.
///
/// Every member in an expense's split owes the payer an equal share of the
/// amount. The payer's own share is never recorded, and debts in opposite
/// directions are kept apart rather than netted.
pub fn compute_balances(expenses: &[Expense]) -> LedgerResult<Balances> {
    let mut balances = Balances::new();
    for expense in expenses {
        if expense.split_between.is_empty() {
            return Err(LedgerError::invalid_expense(format!(
                "expense {} is not split between anyone",
                expense.id
            )));
        }
        let share = expense.amount / expense.split_between.len() as f64;
        for &debtor in &expense.split_between {
            if debtor == expense.paid_by {
                continue;
            }
            balances
                .entry(debtor)
                .or_default()
                .entry(expense.paid_by)
                .and_modify(|owed| *owed += share)
                .or_insert(share);
        }
    }
    Ok(balances)
}

/// Balance report for a group. `members` are the resolved member records, in
/// the group's member order.
pub fn group_balances(group: &Group, members: Vec<Member>) -> LedgerResult<GroupBalances> {
    Ok(GroupBalances {
        group_name: group.name.clone(),
        members,
        balances: compute_balances(&group.expenses)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::ExpenseId;
    use chrono::Utc;
    use proptest::prelude::*;

    const EPSILON: f64 = 1e-9;

    fn expense(amount: f64, paid_by: MemberId, split_between: Vec<MemberId>) -> Expense {
        Expense {
            id: ExpenseId::new(),
            description: "Groceries".to_string(),
            amount,
            category: "food".to_string(),
            paid_by,
            split_between,
            created_at: Utc::now(),
        }
    }

    fn owed(balances: &Balances, debtor: MemberId, creditor: MemberId) -> Option<f64> {
        balances.get(&debtor)?.get(&creditor).copied()
    }

    #[test]
    fn splits_evenly_and_skips_payer() {
        let (a, b, c) = (MemberId::new(), MemberId::new(), MemberId::new());
        let balances = compute_balances(&[expense(90.0, a, vec![a, b, c])]).unwrap();

        assert_eq!(owed(&balances, b, a), Some(30.0));
        assert_eq!(owed(&balances, c, a), Some(30.0));
        assert!(!balances.contains_key(&a));
    }

    #[test]
    fn accumulates_same_pair_across_expenses() {
        let (a, b) = (MemberId::new(), MemberId::new());
        let balances = compute_balances(&[
            expense(20.0, a, vec![a, b]),
            expense(7.5, a, vec![b]),
        ])
        .unwrap();

        assert_eq!(owed(&balances, b, a), Some(17.5));
    }

    #[test]
    fn opposite_debts_are_not_netted() {
        let (a, b) = (MemberId::new(), MemberId::new());
        let balances = compute_balances(&[
            expense(10.0, a, vec![a, b]),
            expense(4.0, b, vec![a, b]),
        ])
        .unwrap();

        assert_eq!(owed(&balances, b, a), Some(5.0));
        assert_eq!(owed(&balances, a, b), Some(2.0));
    }

    #[test]
    fn payer_outside_split_is_owed_everything() {
        let (a, b, c) = (MemberId::new(), MemberId::new(), MemberId::new());
        let balances = compute_balances(&[expense(10.0, a, vec![b, c])]).unwrap();

        assert_eq!(owed(&balances, b, a), Some(5.0));
        assert_eq!(owed(&balances, c, a), Some(5.0));
    }

    #[test]
    fn payer_alone_records_nothing() {
        let a = MemberId::new();
        let balances = compute_balances(&[expense(12.0, a, vec![a])]).unwrap();
        assert!(balances.is_empty());
    }

    #[test]
    fn thirds_tolerate_rounding() {
        let (a, b, c) = (MemberId::new(), MemberId::new(), MemberId::new());
        let balances = compute_balances(&[expense(10.0, a, vec![a, b, c])]).unwrap();

        let total = owed(&balances, b, a).unwrap() + owed(&balances, c, a).unwrap();
        assert!((total - 20.0 / 3.0).abs() < EPSILON);
    }

    #[test]
    fn repeated_split_member_counts_every_occurrence() {
        let (a, b) = (MemberId::new(), MemberId::new());
        let balances = compute_balances(&[expense(30.0, a, vec![a, b, b])]).unwrap();
        assert_eq!(owed(&balances, b, a), Some(20.0));
    }

    #[test]
    fn empty_split_is_rejected() {
        let a = MemberId::new();
        let err = compute_balances(&[expense(10.0, a, vec![])]).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidExpense(_)));
    }

    #[test]
    fn empty_ledger_has_no_balances() {
        assert!(compute_balances(&[]).unwrap().is_empty());
    }

    #[test]
    fn report_passes_name_and_members_through() {
        let (a, b) = (MemberId::new(), MemberId::new());
        let now = Utc::now();
        let group = Group {
            id: crate::schemas::GroupId::new(),
            name: "Flat".to_string(),
            members: vec![a, b],
            expenses: vec![expense(8.0, b, vec![a, b])],
            created_at: now,
        };
        let members = vec![
            Member { id: a, name: "Ann".to_string(), created_at: now },
            Member { id: b, name: "Bo".to_string(), created_at: now },
        ];

        let report = group_balances(&group, members.clone()).unwrap();
        assert_eq!(report.group_name, "Flat");
        assert_eq!(report.members, members);
        assert_eq!(owed(&report.balances, a, b), Some(4.0));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["groupName"], "Flat");
        assert_eq!(json["balances"][a.to_string()][b.to_string()], 4.0);
    }

    fn arb_expenses() -> impl Strategy<Value = (Vec<MemberId>, Vec<(f64, usize, Vec<usize>)>)> {
        (2usize..6).prop_flat_map(|n| {
            let members: Vec<MemberId> = (0..n).map(|_| MemberId::new()).collect();
            let expenses = prop::collection::vec(
                (
                    0.01f64..10_000.0,
                    0..n,
                    prop::collection::vec(0..n, 1..=n),
                ),
                1..12,
            );
            (Just(members), expenses)
        })
    }

    fn build(members: &[MemberId], raw: &[(f64, usize, Vec<usize>)]) -> Vec<Expense> {
        raw.iter()
            .map(|(amount, payer, split)| {
                expense(
                    *amount,
                    members[*payer],
                    split.iter().map(|&i| members[i]).collect(),
                )
            })
            .collect()
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        #[test]
        fn shares_conserve_each_expense((members, raw) in arb_expenses()) {
            for expense in build(&members, &raw) {
                let n = expense.split_between.len() as f64;
                let payer_slots = expense
                    .split_between
                    .iter()
                    .filter(|&&m| m == expense.paid_by)
                    .count() as f64;
                let balances = compute_balances(std::slice::from_ref(&expense)).unwrap();
                let recorded: f64 = balances.values().flat_map(|row| row.values()).sum();
                let expected = expense.amount * (n - payer_slots) / n;
                prop_assert!((recorded - expected).abs() < 1e-6 * expense.amount.max(1.0));
            }
        }

        #[test]
        fn never_records_self_debt((members, raw) in arb_expenses()) {
            let balances = compute_balances(&build(&members, &raw)).unwrap();
            for (debtor, row) in &balances {
                prop_assert!(!row.contains_key(debtor));
            }
        }

        #[test]
        fn totals_are_additive_and_order_independent((members, raw) in arb_expenses()) {
            let expenses = build(&members, &raw);
            let together = compute_balances(&expenses).unwrap();

            let mut summed = Balances::new();
            for expense in expenses.iter().rev() {
                for (debtor, row) in compute_balances(std::slice::from_ref(expense)).unwrap() {
                    for (creditor, amount) in row {
                        *summed.entry(debtor).or_default().entry(creditor).or_insert(0.0) += amount;
                    }
                }
            }

            prop_assert_eq!(together.len(), summed.len());
            for (debtor, row) in &together {
                for (creditor, amount) in row {
                    let other = summed[debtor][creditor];
                    prop_assert!((amount - other).abs() < 1e-6 * amount.max(1.0));
                }
            }
        }
    }
}
