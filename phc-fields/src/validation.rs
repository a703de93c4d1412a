//! Type and constraint validation of submitted custom field values.
//!
//! Checks run in a fixed order and the first failure wins: existence,
//! required, pattern, options, then type coercion. A value that passes is
//! returned in its canonical [`TypedValue`] form, ready to be bound.

use std::collections::HashMap;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ValidationError;
use crate::registry::{compile_pattern, FieldCatalog};
use crate::types::FieldDef;
use crate::value::{is_blank, string_form, FieldValue, TypedValue};

/// A submitted value that passed validation, paired with its definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedField {
    pub def: FieldDef,
    pub value: TypedValue,
}

/// Validates values against field definitions.
///
/// Patterns are compiled once per engine.
#[derive(Debug, Default)]
pub struct ValidationEngine {
    patterns: HashMap<String, Regex>,
}

impl ValidationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// An engine with the patterns of every definition in `catalog` compiled.
    pub fn for_catalog(catalog: &FieldCatalog) -> Self {
        let patterns = catalog
            .all()
            .iter()
            .filter_map(|def| {
                let pattern = def.validation.as_deref()?;
                match compile_pattern(pattern) {
                    Ok(re) => Some((def.code.clone(), re)),
                    Err(e) => {
                        warn!(code = %def.code, error = %e, "custom field pattern does not compile");
                        None
                    }
                }
            })
            .collect();
        Self { patterns }
    }

    /// Validate one value against its definition.
    pub fn validate(&self, def: &FieldDef, value: &Value) -> Result<TypedValue, ValidationError> {
        let blank = is_blank(value);

        if def.required && blank {
            return Err(ValidationError::MissingRequired {
                code: def.code.clone(),
                name: def.display_name.clone(),
            });
        }

        if blank {
            return Ok(TypedValue::Null);
        }

        let text = string_form(value).unwrap_or_default();

        if let Some(pattern) = def.validation.as_deref() {
            if !self.matches(def, pattern, &text) {
                return Err(ValidationError::PatternMismatch {
                    code: def.code.clone(),
                    name: def.display_name.clone(),
                });
            }
        }

        if let Some(options) = def.effective_options() {
            if !options.iter().any(|o| *o == text) {
                return Err(ValidationError::InvalidOption {
                    code: def.code.clone(),
                    name: def.display_name.clone(),
                    options: options.to_vec(),
                });
            }
        }

        TypedValue::coerce(def.data_type, value).ok_or_else(|| ValidationError::TypeMismatch {
            code: def.code.clone(),
            name: def.display_name.clone(),
            expected: def.data_type.to_string(),
        })
    }

    /// Validate a batch in submission order, stopping at the first violation.
    pub fn validate_all(
        &self,
        catalog: &FieldCatalog,
        values: &[FieldValue],
    ) -> Result<Vec<ValidatedField>, ValidationError> {
        let mut validated = Vec::with_capacity(values.len());
        for field in values {
            let def = catalog
                .get(&field.code)
                .ok_or_else(|| ValidationError::UnknownField {
                    code: field.code.clone(),
                })?;
            let value = self.validate(def, &field.value)?;
            debug!(code = %def.code, data_type = %def.data_type, "custom field validated");
            validated.push(ValidatedField {
                def: def.clone(),
                value,
            });
        }
        Ok(validated)
    }

    fn matches(&self, def: &FieldDef, pattern: &str, text: &str) -> bool {
        if let Some(re) = self.patterns.get(&def.code) {
            return re.is_match(text);
        }
        match compile_pattern(pattern) {
            Ok(re) => re.is_match(text),
            // an unusable pattern can never be satisfied
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;
    use rstest::rstest;
    use serde_json::json;

    fn field(data_type: DataType) -> FieldDef {
        FieldDef::new("campo", "Campo", data_type)
    }

    fn select(options: &[&str]) -> FieldDef {
        let mut def = field(DataType::Select);
        def.options = Some(options.iter().map(|s| s.to_string()).collect());
        def
    }

    #[rstest]
    #[case(json!(null))]
    #[case(json!(""))]
    fn required_rejects_blank(#[case] value: Value) {
        let mut def = field(DataType::Text);
        def.required = true;
        let err = ValidationEngine::new().validate(&def, &value).unwrap_err();
        assert!(matches!(err, ValidationError::MissingRequired { .. }));
    }

    #[rstest]
    #[case(DataType::Number, json!("24"), true)]
    #[case(DataType::Number, json!("vinte"), false)]
    #[case(DataType::Decimal, json!(3.75), true)]
    #[case(DataType::Boolean, json!(false), true)]
    #[case(DataType::Boolean, json!("sim"), false)]
    #[case(DataType::Date, json!("2024-02-30"), false)]
    #[case(DataType::Date, json!("2024-02-29"), true)]
    #[case(DataType::Datetime, json!("2024-02-29 23:59:59"), true)]
    #[case(DataType::Json, json!([1, 2, 3]), true)]
    #[case(DataType::Json, json!("not json"), false)]
    #[case(DataType::Url, json!("anything goes"), true)]
    fn type_checks(#[case] data_type: DataType, #[case] value: Value, #[case] ok: bool) {
        let result = ValidationEngine::new().validate(&field(data_type), &value);
        match (ok, result) {
            (true, Ok(_)) => {}
            (false, Err(ValidationError::TypeMismatch { expected, .. })) => {
                assert_eq!(expected, data_type.as_str());
            }
            (ok, other) => panic!("expected ok={ok}, got {other:?}"),
        }
    }

    #[test]
    fn optional_blank_is_null() {
        let engine = ValidationEngine::new();
        assert_eq!(
            engine.validate(&field(DataType::Number), &json!("")).unwrap(),
            TypedValue::Null
        );
    }

    #[test]
    fn pattern_must_match_whole_value() {
        let mut def = field(DataType::Text);
        def.validation = Some("[0-9]{9}".into());
        let engine = ValidationEngine::new();
        assert!(engine.validate(&def, &json!("123456789")).is_ok());
        assert!(matches!(
            engine.validate(&def, &json!("1234567890")),
            Err(ValidationError::PatternMismatch { .. })
        ));
    }

    #[test]
    fn pattern_applies_to_string_form_of_numbers() {
        let mut def = field(DataType::Number);
        def.validation = Some("[0-9]+".into());
        let engine = ValidationEngine::new();
        assert!(engine.validate(&def, &json!(24)).is_ok());
        assert!(engine.validate(&def, &json!(2.5)).is_err());
    }

    #[test]
    fn pattern_skipped_for_blank_optional() {
        let mut def = field(DataType::Text);
        def.validation = Some("[0-9]+".into());
        assert_eq!(
            ValidationEngine::new().validate(&def, &json!(null)).unwrap(),
            TypedValue::Null
        );
    }

    #[test]
    fn select_outside_options_lists_them() {
        let def = select(&["Multibanco", "MBWay", "Transferência"]);
        let err = ValidationEngine::new()
            .validate(&def, &json!("Cheque"))
            .unwrap_err();
        match err {
            ValidationError::InvalidOption { options, .. } => assert_eq!(options.len(), 3),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            ValidationEngine::new().validate(&def, &json!("MBWay")).unwrap(),
            TypedValue::Text("MBWay".into())
        );
    }

    #[test]
    fn select_without_options_accepts_anything() {
        let def = select(&[]);
        assert!(ValidationEngine::new().validate(&def, &json!("x")).is_ok());
    }

    #[test]
    fn required_checked_before_pattern() {
        let mut def = field(DataType::Text);
        def.required = true;
        def.validation = Some("[a-z]+".into());
        assert!(matches!(
            ValidationEngine::new().validate(&def, &json!("")),
            Err(ValidationError::MissingRequired { .. })
        ));
    }

    #[test]
    fn pattern_checked_before_type() {
        let mut def = field(DataType::Number);
        def.validation = Some("[0-9]+".into());
        assert!(matches!(
            ValidationEngine::new().validate(&def, &json!("abc")),
            Err(ValidationError::PatternMismatch { .. })
        ));
    }

    #[test]
    fn batch_stops_at_first_violation() {
        let mut warranty = FieldDef::new("garantia_meses", "Warranty", DataType::Number);
        warranty.required = true;
        let catalog = FieldCatalog::new(vec![
            warranty,
            FieldDef::new("nota", "Note", DataType::Text),
        ]);
        let engine = ValidationEngine::for_catalog(&catalog);

        let ok = engine
            .validate_all(
                &catalog,
                &[
                    FieldValue::new("garantia_meses", 24),
                    FieldValue::new("nota", "fragile"),
                ],
            )
            .unwrap();
        assert_eq!(ok.len(), 2);
        assert_eq!(ok[0].value, TypedValue::Integer(24));

        let err = engine
            .validate_all(
                &catalog,
                &[
                    FieldValue::new("desconhecido", 1),
                    FieldValue::new("garantia_meses", "x"),
                ],
            )
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownField {
                code: "desconhecido".into()
            }
        );
    }

    #[test]
    fn declared_type_does_not_override_definition() {
        let catalog = FieldCatalog::new(vec![FieldDef::new("qtd", "Qty", DataType::Number)]);
        let engine = ValidationEngine::for_catalog(&catalog);
        let err = engine
            .validate_all(
                &catalog,
                &[FieldValue::new("qtd", "muitos").with_declared_type("text")],
            )
            .unwrap_err();
        assert!(matches!(err, ValidationError::TypeMismatch { .. }));
    }
}
