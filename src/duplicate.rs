use chrono::{DateTime, Local, NaiveDate, Utc};

use crate::schemas::Expense;

/// Whether `candidate` repeats an expense already in `existing`.
///
/// Two expenses match when description, amount and payer are identical and
/// both were created on the same local calendar day. The split is not part
/// of the key, and the candidate's own timestamp stands for "now".
pub fn is_duplicate(candidate: &Expense, existing: &[Expense]) -> bool {
    find_duplicate(candidate, existing).is_some()
}

pub fn find_duplicate<'a>(candidate: &Expense, existing: &'a [Expense]) -> Option<&'a Expense> {
    let today = local_day(candidate.created_at);
    existing.iter().find(|expense| {
        expense.description == candidate.description
            && expense.amount == candidate.amount
            && expense.paid_by == candidate.paid_by
            && local_day(expense.created_at) == today
    })
}

fn local_day(at: DateTime<Utc>) -> NaiveDate {
    at.with_timezone(&Local).date_naive()
}
