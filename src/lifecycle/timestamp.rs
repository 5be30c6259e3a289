//! Audit timestamping

use chrono::{DateTime, Utc};

use super::{ResourceRecord, Stamper};

/// Stamps `createdTime`/`createdBy` once and refreshes
/// `modifiedTime`/`modifiedBy` on every write.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampStamper;

impl Stamper for TimestampStamper {
    fn stamp_create(&self, record: &mut ResourceRecord, actor: &str, now: DateTime<Utc>) {
        let data = &mut record.system_data;
        data.created_time = Some(now);
        data.created_by = Some(actor.to_string());
        data.modified_time = Some(now);
        data.modified_by = Some(actor.to_string());
    }

    fn stamp_update(
        &self,
        record: &mut ResourceRecord,
        existing: &ResourceRecord,
        actor: &str,
        now: DateTime<Utc>,
    ) {
        let data = &mut record.system_data;
        data.created_time = existing.system_data.created_time;
        data.created_by = existing.system_data.created_by.clone();
        data.modified_time = Some(now);
        data.modified_by = Some(actor.to_string());
    }
}
