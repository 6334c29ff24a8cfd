//! Field name sanitization for MongoDB compatibility.
//!
//! MongoDB restricts field names (keys) from containing certain characters like
//! dots and dollar signs, which carry meaning in its query syntax. Keys are
//! escaped on the way in and restored on the way out; values are stored as-is
//! so that equality filters on string values keep working.

use bson::{Bson, Document};

/// Escapes and restores document keys.
///
/// MongoDB does not allow field names (document keys) to contain:
/// - Dots (`.`) - used for nested field access in queries
/// - Dollar signs (`$`) - used for operators in queries
/// - Null bytes (`\0`) - field name terminators
pub(crate) struct KeySanitizer;

impl KeySanitizer {
    /// Character replacements for sanitization
    const REPLACEMENTS: [(&'static str, &'static str); 3] = [
        (".", "__dot__"),
        ("$", "__dollar__"),
        ("\0", "__null__"),
    ];

    /// Recursively escapes the keys of a document, including embedded documents
    /// and documents inside arrays.
    pub(crate) fn sanitize_document(document: Document) -> Document {
        document
            .into_iter()
            .map(|(k, v)| (Self::sanitize_string(&k), Self::sanitize_value(v)))
            .collect()
    }

    fn sanitize_value(value: Bson) -> Bson {
        match value {
            Bson::Array(arr) => Bson::Array(arr.into_iter().map(Self::sanitize_value).collect()),
            Bson::Document(doc) => Bson::Document(Self::sanitize_document(doc)),
            other => other,
        }
    }

    fn sanitize_string(input: &str) -> String {
        let mut sanitized = input.to_string();
        for (target, replacement) in Self::REPLACEMENTS.iter() {
            sanitized = sanitized.replace(*target, *replacement);
        }
        sanitized
    }

    /// Inverse of [`sanitize_document`](Self::sanitize_document).
    pub(crate) fn restore_document(document: Document) -> Document {
        document
            .into_iter()
            .map(|(k, v)| (Self::restore_string(&k), Self::restore_value(v)))
            .collect()
    }

    fn restore_value(value: Bson) -> Bson {
        match value {
            Bson::Array(arr) => Bson::Array(arr.into_iter().map(Self::restore_value).collect()),
            Bson::Document(doc) => Bson::Document(Self::restore_document(doc)),
            other => other,
        }
    }

    fn restore_string(input: &str) -> String {
        let mut restored = input.to_string();
        for (target, replacement) in Self::REPLACEMENTS.iter().rev() {
            restored = restored.replace(*replacement, *target);
        }
        restored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn keys_are_escaped_values_are_not() {
        let document = doc! { "a.b": "x.y", "nested": { "$k": 1 }, "list": [{ "c.d": 2 }] };

        let sanitized = KeySanitizer::sanitize_document(document.clone());
        assert_eq!(
            sanitized,
            doc! { "a__dot__b": "x.y", "nested": { "__dollar__k": 1 }, "list": [{ "c__dot__d": 2 }] }
        );
        assert_eq!(KeySanitizer::restore_document(sanitized), document);
    }

    #[test]
    fn plain_keys_are_untouched() {
        let document = doc! { "_id": 1, "user_id": "x" };

        assert_eq!(KeySanitizer::sanitize_document(document.clone()), document);
    }
}
