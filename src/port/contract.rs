//! Precondition checks shared by every driver.
//!
//! Drivers call these at the top of each operation, before touching any
//! hardware state, so every binding reports the same error for the same
//! misuse.

use super::error::{BindingError, BindingResult};

/// Fail with `NotOpen` unless the binding is open.
pub fn ensure_open(is_open: bool) -> BindingResult<()> {
    if is_open {
        Ok(())
    } else {
        Err(BindingError::NotOpen)
    }
}

/// Fail with `AlreadyOpen` if the binding is open.
pub fn ensure_closed(is_open: bool) -> BindingResult<()> {
    if is_open {
        Err(BindingError::AlreadyOpen)
    } else {
        Ok(())
    }
}

/// Fail with `BufferTooSmall` unless `offset + length` fits in `capacity`.
pub fn check_read_bounds(capacity: usize, offset: usize, length: usize) -> BindingResult<()> {
    match offset.checked_add(length) {
        Some(end) if end <= capacity => Ok(()),
        _ => Err(BindingError::BufferTooSmall {
            offset,
            length,
            capacity,
        }),
    }
}

/// Checks `read` performs, in order: buffer bounds, then open state.
pub fn check_read(
    is_open: bool,
    capacity: usize,
    offset: usize,
    length: usize,
) -> BindingResult<()> {
    check_read_bounds(capacity, offset, length)?;
    ensure_open(is_open)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_state_checks() {
        assert!(ensure_open(true).is_ok());
        assert!(matches!(ensure_open(false), Err(BindingError::NotOpen)));
        assert!(ensure_closed(false).is_ok());
        assert!(matches!(ensure_closed(true), Err(BindingError::AlreadyOpen)));
    }

    #[test]
    fn test_bounds_edges() {
        assert!(check_read_bounds(10, 0, 10).is_ok());
        assert!(check_read_bounds(10, 10, 0).is_ok());
        assert!(check_read_bounds(0, 0, 0).is_ok());
        assert!(check_read_bounds(10, 5, 6).is_err());
        assert!(check_read_bounds(10, usize::MAX, 2).is_err());
    }

    #[test]
    fn test_bounds_checked_before_state() {
        assert!(matches!(
            check_read(false, 4, 2, 4),
            Err(BindingError::BufferTooSmall { .. })
        ));
        assert!(matches!(check_read(false, 4, 0, 4), Err(BindingError::NotOpen)));
        assert!(check_read(true, 4, 0, 4).is_ok());
    }

    proptest! {
        #[test]
        fn prop_bounds_match_capacity(
            capacity in 0usize..4096,
            offset in 0usize..8192,
            length in 0usize..8192,
        ) {
            let result = check_read_bounds(capacity, offset, length);
            prop_assert_eq!(result.is_ok(), offset + length <= capacity);
        }
    }
}
