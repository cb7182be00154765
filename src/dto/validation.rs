//! Validation helpers for DTOs.

use validator::ValidationError;

use crate::state::{ROOM_CODE_ALPHABET, ROOM_CODE_LEN};

/// Team-name length bounds after whitespace cleanup.
pub const TEAM_NAME_MIN: usize = 2;
pub const TEAM_NAME_MAX: usize = 16;

/// Validates that an uppercased room code is exactly four characters from the
/// unambiguous alphabet (no `0/O/1/I`).
///
/// # Examples
///
/// ```ignore
/// validate_room_code("ABCD") // Ok
/// validate_room_code("AB0D") // Err - ambiguous digit
/// validate_room_code("ABC")  // Err - too short
/// ```
pub fn validate_room_code(code: &str) -> Result<(), ValidationError> {
    if code.len() != ROOM_CODE_LEN {
        let mut err = ValidationError::new("room_code_length");
        err.message = Some(
            format!(
                "Room code must be exactly {ROOM_CODE_LEN} characters (got {})",
                code.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !code.bytes().all(|b| ROOM_CODE_ALPHABET.contains(&b)) {
        let mut err = ValidationError::new("room_code_charset");
        err.message = Some("Room code contains characters outside the allowed alphabet".into());
        return Err(err);
    }

    Ok(())
}

/// Cleans a requested team name: runs of whitespace collapse to single
/// spaces, surrounding whitespace is trimmed, and the result must be
/// [`TEAM_NAME_MIN`]..=[`TEAM_NAME_MAX`] characters.
pub fn clean_team_name(raw: &str) -> Result<String, ValidationError> {
    let cleaned = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    let len = cleaned.chars().count();
    if !(TEAM_NAME_MIN..=TEAM_NAME_MAX).contains(&len) {
        let mut err = ValidationError::new("team_name_length");
        err.message = Some(
            format!("Team name must be {TEAM_NAME_MIN}-{TEAM_NAME_MAX} characters (got {len})")
                .into(),
        );
        return Err(err);
    }

    Ok(cleaned)
}
