//! Shared engine state
//!
//! One store set and one audit log back every component service. All
//! mutation goes through the transition functions; nothing writes a status
//! outside them.

use crate::billing::{BillingBatch, BillingBatchItem};
use crate::claims::CollectionClaim;
use crate::dispatch::{Delivery, PlatformTask};
use crate::intake::{IntakeItem, SapPosting};
use crate::invoice::ClientInvoice;
use lexfin_store::{AuditLog, EntityStore};
use lexfin_types::EnginePolicy;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) policy: EnginePolicy,
    pub(crate) audit: Arc<AuditLog>,
    pub(crate) items: EntityStore<IntakeItem>,
    pub(crate) postings: EntityStore<SapPosting>,
    pub(crate) batches: EntityStore<BillingBatch>,
    pub(crate) batch_items: EntityStore<BillingBatchItem>,
    pub(crate) invoices: EntityStore<ClientInvoice>,
    pub(crate) deliveries: EntityStore<Delivery>,
    pub(crate) platform_tasks: EntityStore<PlatformTask>,
    pub(crate) claims: EntityStore<CollectionClaim>,
    /// Serializes batch assembly so membership checks and the totals
    /// snapshot observe a consistent view of the member items.
    pub(crate) batch_assembly: Mutex<()>,
}

impl Shared {
    pub(crate) fn new(policy: EnginePolicy, audit: Arc<AuditLog>) -> Self {
        Self {
            policy,
            audit,
            items: EntityStore::new(),
            postings: EntityStore::new(),
            batches: EntityStore::new(),
            batch_items: EntityStore::new(),
            invoices: EntityStore::new(),
            deliveries: EntityStore::new(),
            platform_tasks: EntityStore::new(),
            claims: EntityStore::new(),
            batch_assembly: Mutex::new(()),
        }
    }
}
