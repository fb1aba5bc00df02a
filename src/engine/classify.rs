use crate::model::{ClassifiedTransaction, Rules, Transaction, UNCATEGORIZED};

/// Drops excluded transactions and labels the rest with their custom category.
///
/// Each transaction is judged by the rule set for its own flow type. A missing rule set excludes
/// nothing and labels everything `Uncategorized`. The input is left untouched and the output keeps
/// the input order.
pub fn apply_rules(transactions: &[Transaction], rules: &Rules) -> Vec<ClassifiedTransaction> {
    transactions
        .iter()
        .filter_map(|t| match rules.for_flow(t.flow_type()) {
            Some(rule_set) if rule_set.excludes(t) => None,
            Some(rule_set) => Some(ClassifiedTransaction::new(
                t.clone(),
                rule_set.category_for(t),
            )),
            None => Some(ClassifiedTransaction::new(t.clone(), UNCATEGORIZED)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Amount, FlowType, RuleSet};
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn txn(id: &str, amount: &str, merchant: &str) -> Transaction {
        Transaction::new(
            id,
            NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
            Amount::from_str(amount).unwrap(),
        )
        .with_merchant(merchant)
    }

    #[test]
    fn test_excluded_merchant_is_dropped() {
        let mut expense = RuleSet::default();
        expense.excluded_merchants.insert("Acme".into());
        let rules = Rules::new(None, Some(expense));
        let input = vec![txn("1", "50", "Acme"), txn("2", "30", "Bob's")];

        let out = apply_rules(&input, &rules);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].transaction().id(), "2");
        assert_eq!(out[0].custom_category(), UNCATEGORIZED);
        assert_eq!(input.len(), 2, "input must be untouched");
    }

    #[test]
    fn test_rule_set_is_chosen_by_flow_type() {
        // An income rule never affects an expense and vice versa.
        let mut income = RuleSet::default();
        income.excluded_ids.insert("1".into());
        income.id_category.insert("2".into(), "Salary".into());
        let rules = Rules::new(Some(income), None);
        let input = vec![
            txn("1", "10", "Acme"),
            txn("1", "-10", "Acme"),
            txn("2", "-99", "Employer"),
        ];

        let out = apply_rules(&input, &rules);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].flow_type(), FlowType::Expense);
        assert_eq!(out[0].custom_category(), UNCATEGORIZED);
        assert_eq!(out[1].transaction().id(), "2");
        assert_eq!(out[1].custom_category(), "Salary");
    }

    #[test]
    fn test_missing_rules_pass_through() {
        let input = vec![txn("1", "10", "Acme"), txn("2", "-5", "Acme")];
        let out = apply_rules(&input, &Rules::default());
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|c| c.custom_category() == UNCATEGORIZED));
    }

    #[test]
    fn test_deterministic() {
        let mut expense = RuleSet::default();
        expense.merchant_category.insert("Acme".into(), "Tools".into());
        let rules = Rules::new(None, Some(expense));
        let input = vec![txn("1", "10", "Acme"), txn("2", "20", "Other")];
        assert_eq!(apply_rules(&input, &rules), apply_rules(&input, &rules));
    }
}
