use crate::commands::{store_pipeline, Out};
use crate::model::{RuleSet, RuleUpdate};
use crate::{Config, Result};

/// Records an exclusion or a category assignment. The change is picked up by the next sync, which
/// recomputes the current month.
pub async fn rule(config: Config, family_id: &str, update: RuleUpdate) -> Result<Out<RuleSet>> {
    let rules = store_pipeline(&config)
        .update_rule(family_id, &update)
        .await?;
    let target = match (&update.transaction_id, &update.merchant) {
        (Some(id), _) if !id.is_empty() => format!("transaction '{id}'"),
        (_, Some(merchant)) => format!("merchant '{merchant}'"),
        _ => "the transaction".to_string(),
    };
    let action = if update.exclude {
        "excluded".to_string()
    } else {
        format!(
            "categorized as '{}'",
            update.category.as_deref().unwrap_or_default()
        )
    };
    Ok(Out::new(
        format!(
            "The {} {target} is now {action}, the next sync recomputes the current month",
            update.flow_type
        ),
        rules,
    ))
}
