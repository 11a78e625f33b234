//! `$(token)` scanning.

/// A piece of a value string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Piece<'a> {
    Text(&'a str),
    /// The text between `$(` and the next `)`.
    Reference(&'a str),
}

/// Split `value` into literal text and references, left to right.
///
/// Returns the byte offset of the first `$(` that has no closing `)`.
pub(crate) fn split(value: &str) -> Result<Vec<Piece<'_>>, usize> {
    let mut pieces = Vec::new();
    let mut rest = value;
    let mut offset = 0;

    while let Some(start) = rest.find("$(") {
        let Some(len) = rest[start + 2..].find(')') else {
            return Err(offset + start);
        };
        if start > 0 {
            pieces.push(Piece::Text(&rest[..start]));
        }
        pieces.push(Piece::Reference(rest[start + 2..start + 2 + len].trim()));
        let consumed = start + 2 + len + 1;
        rest = &rest[consumed..];
        offset += consumed;
    }
    if !rest.is_empty() {
        pieces.push(Piece::Text(rest));
    }
    Ok(pieces)
}

/// Whether `value` contains a `$(` without a closing `)`.
pub(crate) fn is_unterminated(value: &str) -> bool {
    split(value).is_err()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_text_and_references() {
        let pieces = split("-I$(Workspace.Directory)/include $(Define)").unwrap();
        assert_eq!(
            pieces,
            vec![
                Piece::Text("-I"),
                Piece::Reference("Workspace.Directory"),
                Piece::Text("/include "),
                Piece::Reference("Define"),
            ]
        );
    }

    #[test]
    fn plain_text_is_one_piece() {
        assert_eq!(split("a (b) $c").unwrap(), vec![Piece::Text("a (b) $c")]);
        assert!(split("").unwrap().is_empty());
    }

    #[test]
    fn unterminated_reference_reports_offset() {
        assert_eq!(split("ok $(A) then $(B"), Err(13));
        assert!(is_unterminated("$("));
        assert!(!is_unterminated("$()"));
    }
}
