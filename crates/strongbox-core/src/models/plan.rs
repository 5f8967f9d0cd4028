use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Subscription plan type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "subscription_plan", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionPlan {
    Free,
    Starter,
    Professional,
    Enterprise,
}

impl SubscriptionPlan {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionPlan::Free => "free",
            SubscriptionPlan::Starter => "starter",
            SubscriptionPlan::Professional => "professional",
            SubscriptionPlan::Enterprise => "enterprise",
        }
    }

    pub fn is_free(&self) -> bool {
        matches!(self, SubscriptionPlan::Free)
    }
}

impl fmt::Display for SubscriptionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionPlan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(SubscriptionPlan::Free),
            "starter" => Ok(SubscriptionPlan::Starter),
            "professional" => Ok(SubscriptionPlan::Professional),
            "enterprise" => Ok(SubscriptionPlan::Enterprise),
            other => Err(format!("unknown subscription plan: {}", other)),
        }
    }
}

/// Features toggled per plan
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct FeatureFlags {
    pub bank_sync: bool,
    pub ai_chat: bool,
    pub document_health: bool,
    pub priority_support: bool,
}

/// Limits and features a subscriber is entitled to on a given plan
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct Entitlements {
    pub document_limit: i64,
    pub bank_connection_limit: i32,
    pub monthly_chat_quota: i32,
    pub features: FeatureFlags,
}

/// Catalog entry as accepted by `PLAN_CATALOG_JSON`
#[derive(Debug, Clone, Deserialize)]
struct PlanCatalogEntry {
    plan: SubscriptionPlan,
    #[serde(flatten)]
    entitlements: Entitlements,
}

/// Single source of truth for plan → entitlements.
///
/// The forced downgrade, the document-excess computation and recovery all read
/// from the same catalog so they can never disagree about what a plan allows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanCatalog {
    plans: HashMap<SubscriptionPlan, Entitlements>,
}

impl Default for PlanCatalog {
    fn default() -> Self {
        let mut plans = HashMap::new();
        plans.insert(
            SubscriptionPlan::Free,
            Entitlements {
                document_limit: 25,
                bank_connection_limit: 0,
                monthly_chat_quota: 10,
                features: FeatureFlags::default(),
            },
        );
        plans.insert(
            SubscriptionPlan::Starter,
            Entitlements {
                document_limit: 250,
                bank_connection_limit: 2,
                monthly_chat_quota: 200,
                features: FeatureFlags {
                    bank_sync: true,
                    ai_chat: true,
                    document_health: false,
                    priority_support: false,
                },
            },
        );
        plans.insert(
            SubscriptionPlan::Professional,
            Entitlements {
                document_limit: 2_000,
                bank_connection_limit: 10,
                monthly_chat_quota: 2_000,
                features: FeatureFlags {
                    bank_sync: true,
                    ai_chat: true,
                    document_health: true,
                    priority_support: false,
                },
            },
        );
        plans.insert(
            SubscriptionPlan::Enterprise,
            Entitlements {
                document_limit: 20_000,
                bank_connection_limit: 50,
                monthly_chat_quota: 20_000,
                features: FeatureFlags {
                    bank_sync: true,
                    ai_chat: true,
                    document_health: true,
                    priority_support: true,
                },
            },
        );
        Self { plans }
    }
}

impl PlanCatalog {
    /// Parse a JSON array of `{plan, document_limit, bank_connection_limit, monthly_chat_quota, features}`.
    /// Plans missing from the array keep their built-in defaults.
    pub fn from_json(json: &str) -> Result<Self, anyhow::Error> {
        let entries: Vec<PlanCatalogEntry> = serde_json::from_str(json)
            .map_err(|e| anyhow::anyhow!("PLAN_CATALOG_JSON is not valid: {}", e))?;

        let mut catalog = Self::default();
        for entry in entries {
            if entry.entitlements.document_limit < 0 {
                return Err(anyhow::anyhow!(
                    "PLAN_CATALOG_JSON: document_limit for {} must not be negative",
                    entry.plan
                ));
            }
            catalog.plans.insert(entry.plan, entry.entitlements);
        }
        Ok(catalog)
    }

    /// Entitlements for a plan. Every plan has an entry, so this never fails.
    pub fn entitlements(&self, plan: SubscriptionPlan) -> Entitlements {
        self.plans
            .get(&plan)
            .copied()
            .unwrap_or_else(|| Self::default().plans[&plan])
    }

    pub fn free(&self) -> Entitlements {
        self.entitlements(SubscriptionPlan::Free)
    }

    /// Document cap a downgraded account must fit into
    pub fn free_document_limit(&self) -> i64 {
        self.free().document_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_covers_every_plan() {
        let catalog = PlanCatalog::default();
        for plan in [
            SubscriptionPlan::Free,
            SubscriptionPlan::Starter,
            SubscriptionPlan::Professional,
            SubscriptionPlan::Enterprise,
        ] {
            assert!(catalog.entitlements(plan).document_limit > 0);
        }
        assert!(!catalog.free().features.bank_sync);
    }

    #[test]
    fn test_catalog_json_overrides_single_plan() {
        let catalog = PlanCatalog::from_json(
            r#"[{"plan":"free","document_limit":5,"bank_connection_limit":0,"monthly_chat_quota":1,
                "features":{"bank_sync":false,"ai_chat":false,"document_health":false,"priority_support":false}}]"#,
        )
        .unwrap();
        assert_eq!(catalog.free_document_limit(), 5);
        assert_eq!(
            catalog.entitlements(SubscriptionPlan::Starter),
            PlanCatalog::default().entitlements(SubscriptionPlan::Starter)
        );
    }

    #[test]
    fn test_catalog_json_rejects_negative_limit() {
        let result = PlanCatalog::from_json(
            r#"[{"plan":"free","document_limit":-1,"bank_connection_limit":0,"monthly_chat_quota":1,
                "features":{"bank_sync":false,"ai_chat":false,"document_health":false,"priority_support":false}}]"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_plan_from_str() {
        assert_eq!(
            "Professional".parse::<SubscriptionPlan>().unwrap(),
            SubscriptionPlan::Professional
        );
        assert!("gold".parse::<SubscriptionPlan>().is_err());
    }
}
