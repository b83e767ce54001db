//! Assertions over recorded profile streams.

use super::ProfileRecord;
use crate::profile::{FrameId, ProfileEventKind};

/// Replays `records` as a call stack and returns the frames left open.
///
/// # Errors
///
/// Describes the first `Return`/`CReturn` that does not close the innermost
/// open frame.
pub fn open_frames(records: &[ProfileRecord]) -> Result<Vec<FrameId>, String> {
    let mut stack: Vec<FrameId> = Vec::new();
    for (index, record) in records.iter().enumerate() {
        match record.kind {
            ProfileEventKind::Call | ProfileEventKind::CCall => stack.push(record.frame),
            ProfileEventKind::Return | ProfileEventKind::CReturn => {
                if stack.pop() != Some(record.frame) {
                    return Err(format!(
                        "event {index}: {} of '{}' ({}) does not close the innermost frame",
                        record.kind, record.name, record.frame
                    ));
                }
            }
        }
    }
    Ok(stack)
}

/// Asserts every call in `records` is closed by a matching return, in order.
pub fn assert_profile_balanced(records: &[ProfileRecord]) {
    match open_frames(records) {
        Ok(open) => assert!(open.is_empty(), "Expected balanced profile events, frames still open: {open:?}"),
        Err(message) => panic!("Unbalanced profile events: {message}"),
    }
}

/// Asserts every return in `records` closes the innermost open frame.
pub fn assert_profile_well_nested(records: &[ProfileRecord]) {
    if let Err(message) = open_frames(records) {
        panic!("Badly nested profile events: {message}");
    }
}
