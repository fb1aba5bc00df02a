use crate::model::{Transaction, UNCATEGORIZED};
use anyhow::bail;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Whether a transaction is money coming in or going out. Derived from the sign of the amount,
/// see `Amount::flow_type`.
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
    clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    Income,
    Expense,
}

serde_plain::derive_display_from_serialize!(FlowType);
serde_plain::derive_fromstr_from_deserialize!(FlowType);

impl FlowType {
    /// The document type under which the rule set for this flow type is stored.
    pub fn doctype(&self) -> &'static str {
        match self {
            FlowType::Income => "income",
            FlowType::Expense => "expenses",
        }
    }

    /// The inverse of `doctype`.
    pub fn from_doctype(doctype: &str) -> anyhow::Result<Self> {
        match doctype {
            "income" => Ok(FlowType::Income),
            "expenses" => Ok(FlowType::Expense),
            other => bail!("Unknown rule set doctype '{other}'"),
        }
    }
}

/// User-defined exclusions and category assignments for one family and one flow type.
///
/// An absent rule set behaves exactly like an empty one.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RuleSet {
    #[serde(default)]
    pub(crate) excluded_ids: BTreeSet<String>,
    #[serde(default)]
    pub(crate) excluded_merchants: BTreeSet<String>,
    #[serde(default)]
    pub(crate) id_category: BTreeMap<String, String>,
    #[serde(default)]
    pub(crate) merchant_category: BTreeMap<String, String>,
}

impl RuleSet {
    /// True if the transaction's id or merchant has been excluded.
    pub fn excludes(&self, transaction: &Transaction) -> bool {
        self.excluded_ids.contains(transaction.id())
            || transaction
                .merchant_name()
                .is_some_and(|m| self.excluded_merchants.contains(m))
    }

    /// The custom category for a transaction. A per-id rule beats a per-merchant rule.
    pub fn category_for(&self, transaction: &Transaction) -> &str {
        self.id_category
            .get(transaction.id())
            .or_else(|| {
                transaction
                    .merchant_name()
                    .and_then(|m| self.merchant_category.get(m))
            })
            .map(String::as_str)
            .unwrap_or(UNCATEGORIZED)
    }

    /// Applies a validated `RuleUpdate` to this rule set.
    pub(crate) fn apply(&mut self, update: &RuleUpdate) {
        let merchant = update.merchant.as_deref().filter(|_| update.apply_to_all);
        if update.exclude {
            if let Some(id) = &update.transaction_id {
                self.excluded_ids.insert(id.clone());
            }
            if let Some(merchant) = merchant {
                self.excluded_merchants.insert(merchant.to_string());
            }
        } else if let Some(category) = &update.category {
            if let Some(id) = &update.transaction_id {
                self.id_category.insert(id.clone(), category.clone());
            }
            if let Some(merchant) = merchant {
                self.merchant_category
                    .insert(merchant.to_string(), category.clone());
            }
        }
    }

    pub fn excluded_ids(&self) -> &BTreeSet<String> {
        &self.excluded_ids
    }

    pub fn excluded_merchants(&self) -> &BTreeSet<String> {
        &self.excluded_merchants
    }

    pub fn id_category(&self) -> &BTreeMap<String, String> {
        &self.id_category
    }

    pub fn merchant_category(&self) -> &BTreeMap<String, String> {
        &self.merchant_category
    }
}

/// Both of a family's rule sets.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Rules {
    pub(crate) income: Option<RuleSet>,
    pub(crate) expense: Option<RuleSet>,
}

impl Rules {
    pub fn new(income: Option<RuleSet>, expense: Option<RuleSet>) -> Self {
        Self { income, expense }
    }

    /// The rule set that governs transactions of `flow_type`, if there is one.
    pub fn for_flow(&self, flow_type: FlowType) -> Option<&RuleSet> {
        match flow_type {
            FlowType::Income => self.income.as_ref(),
            FlowType::Expense => self.expense.as_ref(),
        }
    }
}

/// A user's request to exclude or categorize a transaction, and optionally every transaction from
/// the same merchant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RuleUpdate {
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub merchant: Option<String>,
    /// When true the rule also applies to every transaction from `merchant`.
    #[serde(default)]
    pub apply_to_all: bool,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub exclude: bool,
    pub flow_type: FlowType,
}

impl RuleUpdate {
    /// Checks that the update would actually change something.
    pub(crate) fn validate(&self) -> crate::error::Res<()> {
        let has_id = self.transaction_id.as_deref().is_some_and(|s| !s.is_empty());
        let has_merchant =
            self.apply_to_all && self.merchant.as_deref().is_some_and(|s| !s.is_empty());
        if !has_id && !has_merchant {
            bail!("A rule needs a transaction id, or a merchant with apply_to_all set");
        }
        if !self.exclude && self.category.as_deref().map_or(true, str::is_empty) {
            bail!("A category is required unless the rule is an exclusion");
        }
        Ok(())
    }
}
