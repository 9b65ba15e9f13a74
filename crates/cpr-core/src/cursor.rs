//! Opaque pagination cursors.
//!
//! A cursor is compact JSON wrapped in URL-safe base64. It is a resumption
//! token only and carries no integrity protection.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::errors::{CprError, CprResult};
use crate::models::{ArtifactKind, CURSOR_VERSION, ORDER_SCHEME_ID};
use crate::store::layout::validate_segment;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub v: u32,
    pub kinds: Vec<ArtifactKind>,
    pub offset: usize,
    pub ps: usize,
    pub run_id: String,
    pub order_key: String,
}

impl Cursor {
    pub fn new(run_id: &str, kinds: Vec<ArtifactKind>, page_size: usize) -> Self {
        Self {
            v: CURSOR_VERSION,
            kinds,
            offset: 0,
            ps: page_size,
            run_id: run_id.to_string(),
            order_key: ORDER_SCHEME_ID.to_string(),
        }
    }

    /// Cursor for the page after the one ending at `end`. Offsets never move
    /// backwards.
    pub fn advanced_to(&self, end: usize) -> Self {
        Self {
            offset: end.max(self.offset),
            ..self.clone()
        }
    }
}

pub fn encode_cursor(cursor: &Cursor) -> CprResult<String> {
    let raw = serde_json::to_vec(cursor)?;
    Ok(URL_SAFE.encode(raw))
}

pub fn decode_cursor(token: &str) -> CprResult<Cursor> {
    let raw = URL_SAFE
        .decode(token.trim().as_bytes())
        .map_err(|e| CprError::InvalidCursor(format!("malformed cursor encoding: {e}")))?;
    let cursor: Cursor = serde_json::from_slice(&raw)
        .map_err(|e| CprError::InvalidCursor(format!("malformed cursor payload: {e}")))?;
    if cursor.order_key != ORDER_SCHEME_ID {
        return Err(CprError::InvalidCursor(
            "Cursor ordering changed; please restart without cursor.".to_string(),
        ));
    }
    if cursor.v != CURSOR_VERSION {
        return Err(CprError::InvalidCursor(format!(
            "unsupported cursor version {} (expected {CURSOR_VERSION})",
            cursor.v
        )));
    }
    if cursor.ps == 0 || i64::try_from(cursor.ps).is_err() {
        return Err(CprError::InvalidCursor(format!(
            "cursor page size out of range: {}",
            cursor.ps
        )));
    }
    validate_segment("run_id", &cursor.run_id)
        .map_err(|e| CprError::InvalidCursor(format!("cursor run id rejected: {e}")))?;
    Ok(cursor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Cursor {
        Cursor {
            offset: 40,
            ..Cursor::new(
                "cpr_20250101T000000000000Z",
                vec![ArtifactKind::Copybook, ArtifactKind::Program],
                20,
            )
        }
    }

    #[test]
    fn test_round_trip() {
        let cursor = sample();
        let token = encode_cursor(&cursor).unwrap();
        assert_eq!(decode_cursor(&token).unwrap(), cursor);
    }

    #[test]
    fn test_new_starts_at_zero() {
        let cursor = Cursor::new("run", ArtifactKind::ORDER.to_vec(), 5);
        assert_eq!(cursor.offset, 0);
        assert_eq!(cursor.order_key, ORDER_SCHEME_ID);
        assert_eq!(cursor.v, CURSOR_VERSION);
    }

    #[test]
    fn test_advance_never_decrements() {
        let cursor = sample();
        assert_eq!(cursor.advanced_to(60).offset, 60);
        assert_eq!(cursor.advanced_to(10).offset, 40);
    }

    #[test]
    fn test_order_scheme_mismatch_rejected() {
        let mut cursor = sample();
        cursor.order_key = "relpath-only".to_string();
        let token = encode_cursor(&cursor).unwrap();
        let err = decode_cursor(&token).unwrap_err();
        assert!(matches!(err, CprError::InvalidCursor(msg) if msg.contains("restart")));
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let mut cursor = sample();
        cursor.v = 99;
        let token = encode_cursor(&cursor).unwrap();
        assert!(matches!(decode_cursor(&token), Err(CprError::InvalidCursor(_))));
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        assert!(matches!(decode_cursor("%%%not base64%%%"), Err(CprError::InvalidCursor(_))));
        let not_json = URL_SAFE.encode(b"hello");
        assert!(matches!(decode_cursor(&not_json), Err(CprError::InvalidCursor(_))));
        let unknown_kind = URL_SAFE.encode(
            br#"{"v":1,"kinds":["jcl"],"offset":0,"ps":5,"run_id":"r","order_key":"krelpath"}"#,
        );
        assert!(matches!(decode_cursor(&unknown_kind), Err(CprError::InvalidCursor(_))));
    }

    #[test]
    fn test_escaping_run_id_rejected() {
        let mut cursor = sample();
        cursor.run_id = "../../etc".to_string();
        let token = encode_cursor(&cursor).unwrap();
        assert!(matches!(decode_cursor(&token), Err(CprError::InvalidCursor(_))));
    }

    #[test]
    fn test_oversized_page_size_rejected() {
        let token = URL_SAFE.encode(
            br#"{"v":1,"kinds":["program"],"offset":0,"ps":18446744073709551615,"run_id":"r","order_key":"krelpath"}"#,
        );
        assert!(matches!(decode_cursor(&token), Err(CprError::InvalidCursor(_))));
        let zero = URL_SAFE.encode(
            br#"{"v":1,"kinds":["program"],"offset":0,"ps":0,"run_id":"r","order_key":"krelpath"}"#,
        );
        assert!(matches!(decode_cursor(&zero), Err(CprError::InvalidCursor(_))));
    }
}
