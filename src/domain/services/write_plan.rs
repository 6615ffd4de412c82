//! Turns validated rows into an insert set and an update set
//!
//! Rows are planned in input order against a [`LeadIndex`]. A row that
//! resolves to a lead already planned in this batch folds into that pending
//! write, so one batch never writes two records for the same identity.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::domain::lead::{LeadRecord, ValidatedLead};
use crate::domain::services::dedupe::{DedupeMode, LeadIndex};
use crate::domain::services::merge::{merge_lead, new_lead_record};

/// What happened to one planned row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannedAction {
    Created,
    Updated,
}

#[derive(Debug, Default, Clone)]
pub struct WritePlan {
    pub inserts: Vec<LeadRecord>,
    pub updates: Vec<LeadRecord>,
    pub created: usize,
    pub updated: usize,
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Insert(usize),
    Update(usize),
}

pub struct WritePlanner<'a> {
    tenant_id: &'a str,
    campaign_id: &'a str,
    mode: DedupeMode,
    default_status_id: Option<&'a str>,
    now: DateTime<Utc>,
    index: LeadIndex,
    slots: HashMap<String, Slot>,
    plan: WritePlan,
}

impl<'a> WritePlanner<'a> {
    pub fn new(
        tenant_id: &'a str,
        campaign_id: &'a str,
        mode: DedupeMode,
        default_status_id: Option<&'a str>,
        index: LeadIndex,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            tenant_id,
            campaign_id,
            mode,
            default_status_id,
            now,
            index,
            slots: HashMap::new(),
            plan: WritePlan::default(),
        }
    }

    pub fn push(&mut self, lead: ValidatedLead) -> PlannedAction {
        let matched = self
            .mode
            .lookup_key(&lead)
            .and_then(|key| self.index.lookup(&key).map(str::to_string));

        if let Some(id) = matched {
            if let Some(merged) = self.merge_into_target(&id, &lead) {
                self.index.register(&merged);
                self.plan.updated += 1;
                return PlannedAction::Updated;
            }
        }

        let record = new_lead_record(self.tenant_id, self.campaign_id, lead, self.default_status_id, self.now);
        self.index.register(&record);
        self.slots.insert(record.id.clone(), Slot::Insert(self.plan.inserts.len()));
        self.plan.inserts.push(record);
        self.plan.created += 1;
        PlannedAction::Created
    }

    pub fn finish(self) -> WritePlan {
        self.plan
    }

    fn merge_into_target(&mut self, id: &str, lead: &ValidatedLead) -> Option<LeadRecord> {
        match self.slots.get(id).copied() {
            Some(Slot::Insert(pos)) => {
                let merged = merge_lead(&self.plan.inserts[pos], lead, self.now);
                self.plan.inserts[pos] = merged.clone();
                Some(merged)
            }
            Some(Slot::Update(pos)) => {
                let merged = merge_lead(&self.plan.updates[pos], lead, self.now);
                self.plan.updates[pos] = merged.clone();
                Some(merged)
            }
            None => {
                let merged = merge_lead(self.index.existing(id)?, lead, self.now);
                self.slots.insert(id.to_string(), Slot::Update(self.plan.updates.len()));
                self.plan.updates.push(merged.clone());
                Some(merged)
            }
        }
    }
}
