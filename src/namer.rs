//! Deterministic account name generation.
//!
//! One batch uses a contiguous slot range 0..N-1; appending the (optionally
//! zero-padded) slot to the shared prefix guarantees distinct names within
//! the batch. Global uniqueness is enforced by the remote namespace.

/// Zero-pad `slot` to `digit_width` digits, or render it raw when the width is 0.
pub fn padded_slot(slot: usize, digit_width: usize) -> String {
    if digit_width > 0 {
        format!("{slot:0digit_width$}")
    } else {
        slot.to_string()
    }
}

/// Generate the storage account name for one batch slot.
pub fn account_name(prefix: &str, slot: usize, digit_width: usize) -> String {
    format!("{prefix}{}", padded_slot(slot, digit_width))
}
