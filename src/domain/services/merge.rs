//! Field-level merge of an incoming lead into an existing one

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::lead::{LeadRecord, ValidatedLead};

/// Merge `incoming` over `existing`.
///
/// Every standard field takes the incoming value when it is present and the
/// existing value otherwise. Custom fields merge key by key with incoming
/// keys winning. Identity, ownership scope and `created_at` are kept.
pub fn merge_lead(existing: &LeadRecord, incoming: &ValidatedLead, now: DateTime<Utc>) -> LeadRecord {
    let mut custom_fields = existing.custom_fields.clone();
    custom_fields.extend(incoming.custom_fields.clone());

    LeadRecord {
        id: existing.id.clone(),
        tenant_id: existing.tenant_id.clone(),
        campaign_id: existing.campaign_id.clone(),
        full_name: prefer(&incoming.full_name, &existing.full_name),
        company: prefer(&incoming.company, &existing.company),
        email: prefer(&incoming.email, &existing.email),
        phone: prefer(&incoming.phone, &existing.phone),
        external_id: prefer(&incoming.external_id, &existing.external_id),
        status_id: prefer(&incoming.status_id, &existing.status_id),
        owner_user_id: prefer(&incoming.owner_user_id, &existing.owner_user_id),
        next_follow_up_at: incoming.next_follow_up_at.or(existing.next_follow_up_at),
        custom_fields,
        created_at: existing.created_at,
        updated_at: now,
    }
}

/// Build a fresh record for an unmatched lead.
pub fn new_lead_record(
    tenant_id: &str,
    campaign_id: &str,
    incoming: ValidatedLead,
    default_status_id: Option<&str>,
    now: DateTime<Utc>,
) -> LeadRecord {
    LeadRecord {
        id: Uuid::new_v4().to_string(),
        tenant_id: tenant_id.to_string(),
        campaign_id: campaign_id.to_string(),
        full_name: incoming.full_name,
        company: incoming.company,
        email: incoming.email,
        phone: incoming.phone,
        external_id: incoming.external_id,
        status_id: incoming.status_id.or_else(|| default_status_id.map(str::to_string)),
        owner_user_id: incoming.owner_user_id,
        next_follow_up_at: incoming.next_follow_up_at,
        custom_fields: incoming.custom_fields,
        created_at: now,
        updated_at: now,
    }
}

fn prefer(incoming: &Option<String>, existing: &Option<String>) -> Option<String> {
    match incoming {
        Some(value) if !value.is_empty() => Some(value.clone()),
        _ => existing.clone(),
    }
}
