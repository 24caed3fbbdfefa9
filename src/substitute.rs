//! Placeholder substitution for rewrite targets and query templates.
//!
//! A template is processed segment by segment (`/`-split for text
//! templates, element-wise for segment lists):
//!
//! - `:name` with `name` present in the groups → the group value,
//!   percent-decoded
//! - `*` → the splat, verbatim (it is never decoded); empty when the match
//!   has no splat
//! - anything else → unchanged
//!
//! Only whole segments are substituted: `item-:id` stays as written.

use crate::error::SynthesisError;
use crate::params::{decode_component, MatchGroups, Query};
use crate::rewrite::Template;

/// Lookup of raw placeholder values.
///
/// Implemented for [`MatchGroups`] (pattern captures) and [`Query`] (the
/// request query, used when rewriting the `to` target).
pub trait GroupSource {
    /// Raw value for `name`, if any.
    fn raw(&self, name: &str) -> Option<&str>;
}

impl GroupSource for MatchGroups {
    fn raw(&self, name: &str) -> Option<&str> {
        self.get(name)
    }
}

impl GroupSource for Query {
    fn raw(&self, name: &str) -> Option<&str> {
        self.get(name)
    }
}

/// Substitute placeholders in `template`.
///
/// The result has the same shape as the input: text in, text out.
pub fn substitute<G: GroupSource + ?Sized>(
    template: &Template,
    groups: &G,
    splat: Option<&str>,
) -> Result<Template, SynthesisError> {
    match template {
        Template::Text(text) => {
            let segments = text
                .split('/')
                .map(|segment| substitute_segment(segment, groups, splat))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Template::Text(segments.join("/")))
        }
        Template::Segments(segments) => {
            let segments = segments
                .iter()
                .map(|segment| substitute_segment(segment, groups, splat))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Template::Segments(segments))
        }
    }
}

fn substitute_segment<G: GroupSource + ?Sized>(
    segment: &str,
    groups: &G,
    splat: Option<&str>,
) -> Result<String, SynthesisError> {
    if let Some(raw) = segment.strip_prefix(':').and_then(|name| groups.raw(name)) {
        return decode_component(raw).map(|decoded| decoded.into_owned());
    }
    if segment == "*" {
        return Ok(splat.unwrap_or_default().to_string());
    }
    Ok(segment.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groups(pairs: &[(&str, &str)]) -> MatchGroups {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_text_template() {
        let result = substitute(
            &Template::from("_show/bar/:id"),
            &groups(&[("id", "42")]),
            None,
        )
        .unwrap();
        assert_eq!(result, Template::from("_show/bar/42"));
    }

    #[test]
    fn test_values_are_decoded() {
        let result = substitute(
            &Template::from("_show/page/:name"),
            &groups(&[("name", "hello%20world")]),
            None,
        )
        .unwrap();
        assert_eq!(result, Template::from("_show/page/hello world"));
    }

    #[test]
    fn test_splat_is_raw() {
        let result = substitute(&Template::from("static/*"), &MatchGroups::new(), Some("a%20b/c")).unwrap();
        assert_eq!(result, Template::from("static/a%20b/c"));
    }

    #[test]
    fn test_missing_splat_is_empty() {
        let result = substitute(&Template::from("static/*"), &MatchGroups::new(), None).unwrap();
        assert_eq!(result, Template::from("static/"));

        let result = substitute(&Template::from(vec![":tag", "*"]), &groups(&[("tag", "a")]), None).unwrap();
        assert_eq!(result, Template::from(vec!["a", ""]));
    }

    #[test]
    fn test_segments_template() {
        let result = substitute(
            &Template::from(vec![":tag", "*", "{}"]),
            &groups(&[("tag", "rust")]),
            Some("tail"),
        )
        .unwrap();
        assert_eq!(result, Template::from(vec!["rust", "tail", "{}"]));
    }

    #[test]
    fn test_no_placeholders_is_identity() {
        let template = Template::from("_list/items/all");
        let result = substitute(&template, &groups(&[("id", "1")]), Some("x")).unwrap();
        assert_eq!(result, template);
    }

    #[test]
    fn test_partial_segment_not_substituted() {
        let result = substitute(&Template::from("item-:id/:id"), &groups(&[("id", "7")]), None).unwrap();
        assert_eq!(result, Template::from("item-:id/7"));
    }

    #[test]
    fn test_unknown_group_passes_through() {
        let result = substitute(&Template::from("_show/:missing"), &MatchGroups::new(), None).unwrap();
        assert_eq!(result, Template::from("_show/:missing"));
    }

    #[test]
    fn test_malformed_encoding_is_error() {
        let err = substitute(&Template::from(":id"), &groups(&[("id", "100%")]), None).unwrap_err();
        assert!(matches!(err, SynthesisError::MalformedEncoding { value } if value == "100%"));
    }

    #[test]
    fn test_query_as_group_source() {
        let query: Query = [("id", "99")].into_iter().collect();
        let result = substitute(&Template::from("_show/item/:id"), &query, None).unwrap();
        assert_eq!(result, Template::from("_show/item/99"));
    }
}
