//! Folio allocation.
//!
//! A folio is `OR-` followed by a zero-padded sequence number of at least four
//! digits. The next folio is derived from the greatest stored one; two callers
//! can derive the same candidate, and the unique constraint on `orders.folio`
//! decides which of them keeps it (see [`crate::orders::persist_order`]).

use diesel::prelude::*;
use diesel::PgConnection;

use crate::schema::orders;

pub const FOLIO_PREFIX: &str = "OR-";
const FOLIO_WIDTH: usize = 4;

/// Folios the allocator numbers from; anything else a client stored is
/// ignored when looking for the maximum.
const SEQUENCE_PATTERN: &str = "OR-[0-9]+";

diesel::define_sql_function!(fn char_length(value: diesel::sql_types::Text) -> diesel::sql_types::Integer);
diesel::define_sql_function!(fn substr(value: diesel::sql_types::Text, start: diesel::sql_types::Integer) -> diesel::sql_types::Text);
diesel::define_sql_function!(fn ltrim(value: diesel::sql_types::Text, characters: diesel::sql_types::Text) -> diesel::sql_types::Text);

/// Sequence number carried by a folio, if it has the `OR-<digits>` shape.
pub fn parse_folio_number(folio: &str) -> Option<u32> {
    let digits = folio.trim().strip_prefix(FOLIO_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

pub fn format_folio(number: u32) -> String {
    format!("{FOLIO_PREFIX}{number:0width$}", width = FOLIO_WIDTH)
}

/// Candidate that follows `current_max`.
///
/// A missing or unparsable maximum restarts the sequence at 1. When stored
/// data is inconsistent that candidate can already exist; the store then
/// rejects it instead of overwriting anything.
pub fn next_folio(current_max: Option<&str>) -> String {
    let current = current_max.and_then(parse_folio_number).unwrap_or(0);
    format_folio(current.saturating_add(1))
}

/// Client-supplied folios in the `OR-<digits>` shape must stay inside the
/// range the allocator can continue from.
pub fn check_client_folio(folio: &str) -> Result<(), &'static str> {
    let Some(digits) = folio.trim().strip_prefix(FOLIO_PREFIX) else {
        return Ok(());
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(());
    }
    match parse_folio_number(folio) {
        Some(number) if number < u32::MAX => Ok(()),
        _ => Err("sequence number is too large"),
    }
}

/// Greatest `OR-<digits>` folio currently stored, compared by numeric value:
/// leading zeros are dropped, then longer digit runs rank first so that
/// `OR-10000` is above `OR-9999`. Folios of any other shape are skipped.
pub fn current_max_folio(conn: &mut PgConnection) -> QueryResult<Option<String>> {
    let start = FOLIO_PREFIX.len() as i32 + 1;
    orders::table
        .filter(orders::folio.similar_to(SEQUENCE_PATTERN))
        .select(orders::folio)
        .order((
            char_length(ltrim(substr(orders::folio, start), "0")).desc(),
            ltrim(substr(orders::folio, start), "0").desc(),
        ))
        .first::<String>(conn)
        .optional()
}

pub fn allocate(conn: &mut PgConnection) -> QueryResult<String> {
    let current = current_max_folio(conn)?;
    Ok(next_folio(current.as_deref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_folio_on_empty_store() {
        assert_eq!(next_folio(None), "OR-0001");
    }

    #[test]
    fn increments_the_numeric_suffix() {
        assert_eq!(next_folio(Some("OR-0001")), "OR-0002");
        assert_eq!(next_folio(Some("OR-0099")), "OR-0100");
        assert_eq!(next_folio(Some("OR-9999")), "OR-10000");
    }

    #[test]
    fn unparsable_maximum_restarts_at_one() {
        assert_eq!(next_folio(Some("legacy-17")), "OR-0001");
        assert_eq!(next_folio(Some("OR-")), "OR-0001");
        assert_eq!(next_folio(Some("OR-12a")), "OR-0001");
    }

    #[test]
    fn parses_only_the_expected_shape() {
        assert_eq!(parse_folio_number("OR-0042"), Some(42));
        assert_eq!(parse_folio_number(" OR-0007 "), Some(7));
        assert_eq!(parse_folio_number("OR--12"), None);
        assert_eq!(parse_folio_number("or-0001"), None);
    }

    #[test]
    fn client_folios_must_leave_room_for_the_sequence() {
        assert_eq!(check_client_folio("ESPECIAL-1"), Ok(()));
        assert_eq!(check_client_folio("OR-0042"), Ok(()));
        assert_eq!(check_client_folio("OR-especial"), Ok(()));
        assert!(check_client_folio("OR-99999999999").is_err());
        assert!(check_client_folio(&format!("OR-{}", u32::MAX)).is_err());
    }

    #[test]
    fn serial_allocation_is_gap_free_and_increasing() {
        let mut current: Option<String> = None;
        let mut seen = Vec::new();
        for _ in 0..25 {
            let next = next_folio(current.as_deref());
            seen.push(next.clone());
            current = Some(next);
        }
        let numbers: Vec<u32> = seen.iter().filter_map(|f| parse_folio_number(f)).collect();
        assert_eq!(numbers, (1..=25).collect::<Vec<u32>>());
        assert!(seen.iter().all(|f| f.len() == 7 && f.starts_with("OR-")));
    }
}
