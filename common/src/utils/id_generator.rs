//! Run identifiers attached to tracing spans.

use uuid::Uuid;

/// Length of a run id in hex characters.
pub const RUN_ID_LEN: usize = 8;

/// Random hex id tagging one query run or CLI command in the logs.
pub fn run_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(RUN_ID_LEN);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_is_short_hex() {
        let id = run_id();
        assert_eq!(id.len(), RUN_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_run_ids_differ() {
        assert_ne!(run_id(), run_id());
    }
}
