//! Registry of config pointers the queue engine actually reads.
//!
//! [`crate::report_unused_keys`] flags any leaf outside this list so a typo
//! or a leftover key from a config template doesn't silently do nothing.

/// Top-level JSON pointers consumed by [`crate::QueueConfig`] and
/// [`crate::ProcessorConfig`]. A pointer here covers its whole subtree.
pub fn consumed_pointers() -> &'static [&'static str] {
    &[
        "/db/url_env",
        "/queue/db_table",
        "/queue/extra_fields",
        "/queue/fastest_polling_rate_ms",
        "/queue/slowest_polling_rate_ms",
        "/queue/polling_backoff_rate",
        "/processors",
    ]
}
