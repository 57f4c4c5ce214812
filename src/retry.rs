//! Retry as a cross-cutting concern.
//!
//! One helper used uniformly by clone/fetch/push and by lookaside cache
//! operations. Unlike a typical retry helper there is no back-off and no
//! jitter between attempts — the spec this implements explicitly calls for
//! immediate retry, warn-logged, with an error-logged abort once attempts
//! are exhausted. `n` is a count of *attempts*, not of additional retries
//! after the first.

/// Run `op` up to `attempts` times. Each failed attempt before the last is
/// logged at `warn`; the final failure is logged at `error` via `label`
/// (used to name the operation in both log lines, e.g. `"clone destination
/// repository"`).
pub fn retry<T, E, F>(attempts: u32, label: &str, mut op: F) -> Option<T>
where
    F: FnMut(u32) -> Result<T, E>,
    E: std::fmt::Display,
{
    let attempts = attempts.max(1);
    let mut last_err = None;
    for attempt in 1..=attempts {
        match op(attempt) {
            Ok(value) => return Some(value),
            Err(e) => {
                if attempt < attempts {
                    log::warn!("{label} failed (attempt {attempt}/{attempts}): {e}");
                } else {
                    log::error!("{label} failed after {attempts} attempt(s): {e}");
                }
                last_err = Some(e);
            }
        }
    }
    let _ = last_err;
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn succeeds_immediately_without_retry() {
        let calls = Cell::new(0);
        let result = retry::<_, String, _>(3, "op", |_| {
            calls.set(calls.get() + 1);
            Ok(42)
        });
        assert_eq!(result, Some(42));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn retries_up_to_attempts_then_gives_up() {
        let calls = Cell::new(0);
        let result = retry::<(), _, _>(3, "op", |_| {
            calls.set(calls.get() + 1);
            Err("boom")
        });
        assert_eq!(result, None);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn succeeds_on_a_later_attempt() {
        let calls = Cell::new(0);
        let result = retry::<_, &str, _>(5, "op", |attempt| {
            calls.set(calls.get() + 1);
            if attempt < 3 { Err("not yet") } else { Ok(attempt) }
        });
        assert_eq!(result, Some(3));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn zero_attempts_is_treated_as_one() {
        let calls = Cell::new(0);
        let result = retry::<(), _, _>(0, "op", |_| {
            calls.set(calls.get() + 1);
            Err("boom")
        });
        assert_eq!(result, None);
        assert_eq!(calls.get(), 1);
    }
}
