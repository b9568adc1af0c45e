// Hard limits on caller input. Planners and the store reject anything beyond these.

/// Most future weeks a pattern can be replicated to.
pub const MAX_REPLICATE_OCCURRENCES: u32 = 52;

/// Furthest ahead weekends can be pinned, in months.
pub const MAX_WEEKEND_HORIZON_MONTHS: u32 = 24;

/// Widest fetch window, in days.
pub const MAX_FETCH_WINDOW_DAYS: i64 = 400;

/// Most intents accepted in a single `apply_intents` batch.
pub const MAX_BATCH_INTENTS: usize = 10_000;

/// Longest booking metadata string (client name, service title).
pub const MAX_LABEL_LEN: usize = 256;
