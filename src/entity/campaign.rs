//! Campaign budget entity.
//!
//! Keyed by campaign id on a single unique scalar index. Unlike the other
//! entities this one is written on the serving path too: bankers debit
//! budgets through `update::<ByCampaignId>` as wins come back.

use core::cmp::Ordering;

use crate::arena::AllocError;
use crate::segment::Segment;

use super::{IndexSpec, IndexTag, LookupKey, Record};

/// Billing metric attached to a campaign.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MetricType {
    /// No metric configured.
    #[default]
    Undefined,
    /// Cost per mille.
    Cpm,
    /// Cost per click.
    Cpc,
    /// Cost per action.
    Cpa,
}

impl MetricType {
    fn as_u8(self) -> u8 {
        match self {
            MetricType::Undefined => 0,
            MetricType::Cpm => 1,
            MetricType::Cpc => 2,
            MetricType::Cpa => 3,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => MetricType::Cpm,
            2 => MetricType::Cpc,
            3 => MetricType::Cpa,
            _ => MetricType::Undefined,
        }
    }
}

/// A metric type and its configured value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Metric {
    /// Metric kind.
    pub metric_type: MetricType,
    /// Configured limit for the metric.
    pub value: u64,
}

/// Owned campaign budget state. All monetary values are micro-dollars.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CampaignBudget {
    /// Campaign id.
    pub campaign_id: u32,
    /// Remaining daily budget.
    pub day_budget_limit: u64,
    /// Spent so far today.
    pub day_budget_spent: u64,
    /// Spend beyond the daily limit.
    pub day_budget_overdraft: u64,
    /// Billing metric.
    pub metric: Metric,
}

impl CampaignBudget {
    /// A fresh budget with nothing spent.
    pub fn new(campaign_id: u32, day_budget_limit: u64) -> Self {
        CampaignBudget {
            campaign_id,
            day_budget_limit,
            ..CampaignBudget::default()
        }
    }

    /// Resets the daily limit.
    pub fn apply_budget(&mut self, value: u64) {
        self.day_budget_limit = value;
    }

    /// Debits a winning price, accounting overdraft when the remaining
    /// limit does not cover it.
    pub fn apply_price(&mut self, value: u64) {
        let spend = self.day_budget_limit.min(value);
        self.day_budget_limit -= spend;
        self.day_budget_spent += spend;
        if spend < value {
            self.day_budget_overdraft += value - spend;
        }
    }
}

/// Indexed fields supplied on insert.
#[derive(Clone, Copy, Debug)]
pub struct CampaignKey {
    /// Campaign id.
    pub campaign_id: u32,
}

/// Segment-resident campaign budget record.
#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct BudgetEntity {
    campaign_id: u32,
    metric_type: u8,
    _pad: [u8; 3],
    day_budget_limit: u64,
    day_budget_spent: u64,
    day_budget_overdraft: u64,
    metric_value: u64,
}

fn cmp_campaign_id(a: &BudgetEntity, b: &BudgetEntity, _seg: &Segment) -> Ordering {
    a.campaign_id.cmp(&b.campaign_id)
}

/// Unique scalar index on campaign id.
#[derive(Clone, Copy, Debug)]
pub struct ByCampaignId;

impl IndexTag for ByCampaignId {
    type Record = BudgetEntity;
    const ORDINAL: usize = 0;
}

// SAFETY: #[repr(C)], scalar fields only.
unsafe impl Record for BudgetEntity {
    type Key = CampaignKey;
    type Payload = CampaignBudget;

    const INDEXES: &'static [IndexSpec<Self>] = &[IndexSpec {
        name: "campaign_id",
        unique: true,
        cmp: cmp_campaign_id,
    }];

    fn store(
        key: &CampaignKey,
        payload: &CampaignBudget,
        _segment: &mut Segment,
    ) -> Result<Self, AllocError> {
        Ok(BudgetEntity {
            campaign_id: key.campaign_id,
            metric_type: payload.metric.metric_type.as_u8(),
            _pad: [0; 3],
            day_budget_limit: payload.day_budget_limit,
            day_budget_spent: payload.day_budget_spent,
            day_budget_overdraft: payload.day_budget_overdraft,
            metric_value: payload.metric.value,
        })
    }

    fn retrieve(&self, _segment: &Segment) -> CampaignBudget {
        CampaignBudget {
            campaign_id: self.campaign_id,
            day_budget_limit: self.day_budget_limit,
            day_budget_spent: self.day_budget_spent,
            day_budget_overdraft: self.day_budget_overdraft,
            metric: Metric {
                metric_type: MetricType::from_u8(self.metric_type),
                value: self.metric_value,
            },
        }
    }

    fn destroy(&self, _segment: &mut Segment) {}
}

impl LookupKey<ByCampaignId> for u32 {
    fn cmp_record(&self, rec: &BudgetEntity, _seg: &Segment) -> Ordering {
        self.cmp(&rec.campaign_id)
    }
}
