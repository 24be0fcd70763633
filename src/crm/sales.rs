use super::{OpportunityStage, check_non_negative, check_sku, check_within, require_text};
use crate::core::{EntityId, Result};
use chrono::{DateTime, Utc};

crm_entity! {
    /// A potential deal moving through the pipeline.
    pub struct Opportunity: "opportunity" {
        name: String,
        organization_id: Option<EntityId>,
        contact_id: Option<EntityId>,
        stage: OpportunityStage,
        amount: f64,
        /// Win likelihood in percent.
        probability: i64,
        expected_close: Option<DateTime<Utc>>,
    }
}

impl Opportunity {
    /// Amount weighted by win probability.
    pub fn weighted_amount(&self) -> f64 {
        self.amount * self.probability as f64 / 100.0
    }

    fn check_draft(draft: &OpportunityDraft) -> Result<()> {
        require_text("name", &draft.name)?;
        check_non_negative("amount", draft.amount)?;
        check_within("probability", draft.probability, 0..=100)
    }

    fn check_patch(patch: &OpportunityPatch) -> Result<()> {
        if let Some(name) = &patch.name {
            require_text("name", name)?;
        }
        if let Some(amount) = patch.amount {
            check_non_negative("amount", amount)?;
        }
        if let Some(probability) = patch.probability {
            check_within("probability", probability, 0..=100)?;
        }
        Ok(())
    }
}

impl OpportunityDraft {
    pub fn new(name: impl Into<String>, amount: f64) -> Self {
        Self {
            name: name.into(),
            amount,
            probability: 10,
            ..Self::default()
        }
    }

    pub fn stage(mut self, stage: OpportunityStage) -> Self {
        self.stage = stage;
        self
    }

    pub fn probability(mut self, probability: i64) -> Self {
        self.probability = probability;
        self
    }
}

crm_entity! {
    /// Catalogue item that opportunities are quoted against.
    pub struct Product: "product" {
        name: String,
        sku: String,
        price: f64,
        category: Option<String>,
        active: bool,
    }
}

impl Product {
    fn check_draft(draft: &ProductDraft) -> Result<()> {
        require_text("name", &draft.name)?;
        check_sku(&draft.sku)?;
        check_non_negative("price", draft.price)
    }

    fn check_patch(patch: &ProductPatch) -> Result<()> {
        if let Some(name) = &patch.name {
            require_text("name", name)?;
        }
        if let Some(sku) = &patch.sku {
            check_sku(sku)?;
        }
        if let Some(price) = patch.price {
            check_non_negative("price", price)?;
        }
        Ok(())
    }
}

impl ProductDraft {
    pub fn new(name: impl Into<String>, sku: impl Into<String>, price: f64) -> Self {
        Self {
            name: name.into(),
            sku: sku.into(),
            price,
            category: None,
            active: true,
        }
    }
}
