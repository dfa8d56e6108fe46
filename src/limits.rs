/// Rows per batch-insert record.
pub const BATCH_INSERT_CHUNK: usize = 1000;

/// Days accepted by one bulk schedule request.
pub const MAX_DAYS_PER_REQUEST: usize = 93;

/// Time windows accepted for one work day.
pub const MAX_WINDOWS_PER_DAY: usize = 96;

/// Schedules accepted by one bulk delete.
pub const MAX_SCHEDULES_PER_DELETE: usize = 500;

pub const MAX_SUB_SERVICES: usize = 16;

pub const MAX_NOTE_LEN: usize = 500;
pub const MAX_CANCEL_REASON_LEN: usize = 500;
pub const MAX_EXTRAS_LEN: usize = 1000;
pub const MAX_NAME_LEN: usize = 256;
