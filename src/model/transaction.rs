use crate::model::{Amount, FlowType, YearMonth};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// The category given to a transaction that no rule matched.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// The merchant label used when the provider did not supply a merchant name.
pub const UNKNOWN_MERCHANT: &str = "Unknown";

/// A transaction as reported by the transaction provider. Transactions are never modified after
/// they are fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Transaction {
    pub(crate) id: String,
    pub(crate) date: NaiveDate,
    /// Positive when money left the account. See `Amount::flow_type`.
    pub(crate) amount: Amount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) merchant_name: Option<String>,
    /// The provider's own top-level classification, e.g. `FOOD_AND_DRINK`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) primary_category: Option<String>,
    /// The provider's category hierarchy, most general first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) provider_categories: Vec<String>,
}

impl Transaction {
    pub fn new(id: impl Into<String>, date: NaiveDate, amount: Amount) -> Self {
        Self {
            id: id.into(),
            date,
            amount,
            merchant_name: None,
            primary_category: None,
            provider_categories: Vec::new(),
        }
    }

    pub fn with_merchant(mut self, merchant_name: impl Into<String>) -> Self {
        self.merchant_name = Some(merchant_name.into());
        self
    }

    pub fn with_primary_category(mut self, category: impl Into<String>) -> Self {
        self.primary_category = Some(category.into());
        self
    }

    pub fn with_provider_categories<S: Into<String>>(
        mut self,
        categories: impl IntoIterator<Item = S>,
    ) -> Self {
        self.provider_categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn merchant_name(&self) -> Option<&str> {
        self.merchant_name.as_deref()
    }

    pub fn flow_type(&self) -> FlowType {
        self.amount.flow_type()
    }

    pub fn month(&self) -> YearMonth {
        YearMonth::from_date(self.date)
    }
}

/// A transaction that survived the exclusion rules, along with the category the rules assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ClassifiedTransaction {
    #[serde(flatten)]
    pub(crate) transaction: Transaction,
    pub(crate) flow_type: FlowType,
    pub(crate) custom_category: String,
}

impl ClassifiedTransaction {
    pub(crate) fn new(transaction: Transaction, custom_category: impl Into<String>) -> Self {
        Self {
            flow_type: transaction.flow_type(),
            transaction,
            custom_category: custom_category.into(),
        }
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn flow_type(&self) -> FlowType {
        self.flow_type
    }

    pub fn is_expense(&self) -> bool {
        self.flow_type == FlowType::Expense
    }

    pub fn custom_category(&self) -> &str {
        &self.custom_category
    }

    /// The label used when grouping spending by category.
    ///
    /// A user-assigned category wins. Otherwise the provider's primary category is used, then the
    /// first of the provider's categories, and finally `Uncategorized`.
    pub fn breakdown_category(&self) -> &str {
        if self.custom_category != UNCATEGORIZED && !self.custom_category.is_empty() {
            return &self.custom_category;
        }
        self.transaction
            .primary_category
            .as_deref()
            .filter(|c| !c.is_empty())
            .or_else(|| {
                self.transaction
                    .provider_categories
                    .first()
                    .map(String::as_str)
                    .filter(|c| !c.is_empty())
            })
            .unwrap_or(UNCATEGORIZED)
    }

    /// The label used when grouping spending by merchant.
    pub fn merchant_label(&self) -> &str {
        self.transaction
            .merchant_name()
            .filter(|m| !m.is_empty())
            .unwrap_or(UNKNOWN_MERCHANT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn txn(amount: &str) -> Transaction {
        Transaction::new(
            "t1",
            NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
            Amount::from_str(amount).unwrap(),
        )
    }

    #[test]
    fn test_breakdown_category_prefers_custom() {
        let t = txn("10").with_primary_category("FOOD_AND_DRINK");
        let c = ClassifiedTransaction::new(t, "Groceries");
        assert_eq!(c.breakdown_category(), "Groceries");
    }

    #[test]
    fn test_breakdown_category_falls_back_to_provider() {
        let t = txn("10")
            .with_primary_category("FOOD_AND_DRINK")
            .with_provider_categories(["Food and Drink", "Restaurants"]);
        let c = ClassifiedTransaction::new(t, UNCATEGORIZED);
        assert_eq!(c.breakdown_category(), "FOOD_AND_DRINK");

        let t = txn("10").with_provider_categories(["Travel", "Taxi"]);
        let c = ClassifiedTransaction::new(t, UNCATEGORIZED);
        assert_eq!(c.breakdown_category(), "Travel");

        let c = ClassifiedTransaction::new(txn("10"), UNCATEGORIZED);
        assert_eq!(c.breakdown_category(), UNCATEGORIZED);
    }

    #[test]
    fn test_merchant_label() {
        let c = ClassifiedTransaction::new(txn("10").with_merchant("Acme"), UNCATEGORIZED);
        assert_eq!(c.merchant_label(), "Acme");
        let c = ClassifiedTransaction::new(txn("10"), UNCATEGORIZED);
        assert_eq!(c.merchant_label(), UNKNOWN_MERCHANT);
    }

    #[test]
    fn test_classified_carries_flow_type() {
        assert!(ClassifiedTransaction::new(txn("10"), UNCATEGORIZED).is_expense());
        assert!(!ClassifiedTransaction::new(txn("-10"), UNCATEGORIZED).is_expense());
    }
}
