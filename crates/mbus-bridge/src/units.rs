//! Free-text unit strings as reported by meters, e.g. `Volume (1e-3 m^3)`.

use regex::Regex;
use std::sync::OnceLock;

/// `<name>(<annotation>)` split of a unit string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUnit {
    pub display_name: String,
    pub annotation: Option<String>,
}

/// Power-of-ten factor and normalized symbol taken from an annotation
#[derive(Debug, Clone, PartialEq)]
pub struct ScaledUnit {
    pub scale_factor: Option<f64>,
    pub unit: String,
}

fn property_unit_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<name>.+?)(\((?P<annotation>.+)\))?$")
            .expect("Invalid regex pattern - this is a bug")
    })
}

fn factor_unit_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<factor>1e-\d)\s+(?P<unit>.+)$")
            .expect("Invalid regex pattern - this is a bug")
    })
}

/// Split a unit string into its label and optional parenthesized annotation.
///
/// Total over all inputs: text the pattern does not match (empty, multi-line) becomes
/// the display name verbatim with no annotation.
pub fn parse_property_unit(text: &str) -> ParsedUnit {
    match property_unit_regex().captures(text) {
        Some(caps) => ParsedUnit {
            display_name: caps
                .name("name")
                .map_or_else(|| text.to_string(), |m| m.as_str().to_string()),
            annotation: caps.name("annotation").map(|m| m.as_str().to_string()),
        },
        None => ParsedUnit {
            display_name: text.to_string(),
            annotation: None,
        },
    }
}

/// Extract a `1e-N <unit>` factor from an annotation.
///
/// Without a factor the annotation is used as the unit unchanged.
pub fn parse_scaled_unit(annotation: &str) -> ScaledUnit {
    let scaled = factor_unit_regex().captures(annotation).and_then(|caps| {
        let factor = caps.name("factor")?.as_str().parse::<f64>().ok()?;
        let unit = caps.name("unit")?.as_str();
        Some(ScaledUnit {
            scale_factor: Some(factor),
            unit: normalize_symbol(unit),
        })
    });
    scaled.unwrap_or_else(|| ScaledUnit {
        scale_factor: None,
        unit: annotation.to_string(),
    })
}

fn normalize_symbol(unit: &str) -> String {
    unit.replace("^2", "²").replace("^3", "³")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_name_and_annotation() {
        let parsed = parse_property_unit("Volume (1e-3 m^3)");
        assert_eq!(parsed.display_name, "Volume ");
        assert_eq!(parsed.annotation.as_deref(), Some("1e-3 m^3"));
    }

    #[test]
    fn plain_text_has_no_annotation() {
        let parsed = parse_property_unit("Status");
        assert_eq!(parsed.display_name, "Status");
        assert_eq!(parsed.annotation, None);
    }

    #[test]
    fn unmatched_text_falls_back_verbatim() {
        assert_eq!(
            parse_property_unit(""),
            ParsedUnit {
                display_name: String::new(),
                annotation: None
            }
        );
        let parsed = parse_property_unit("Energy\n(1e-1 Wh)");
        assert_eq!(parsed.display_name, "Energy\n(1e-1 Wh)");
        assert_eq!(parsed.annotation, None);
    }

    #[test]
    fn annotation_without_name_is_not_split() {
        // The name group needs at least one character before the parenthesis.
        let parsed = parse_property_unit("(date)");
        assert_eq!(parsed.display_name, "(date)");
        assert_eq!(parsed.annotation, None);
    }

    #[test]
    fn scaled_unit_with_factor() {
        let scaled = parse_scaled_unit("1e-3 m^3");
        assert_eq!(scaled.scale_factor, Some(1e-3));
        assert_eq!(scaled.unit, "m³");

        let scaled = parse_scaled_unit("1e-2 m^2/h");
        assert_eq!(scaled.scale_factor, Some(0.01));
        assert_eq!(scaled.unit, "m²/h");
    }

    #[test]
    fn annotation_without_factor_is_verbatim() {
        for text in ["date", "m^3", "1e3 Wh", "1e-3", "1e-12 Wh"] {
            let scaled = parse_scaled_unit(text);
            assert_eq!(scaled.scale_factor, None, "{text}");
            assert_eq!(scaled.unit, text);
        }
    }
}
